use tracing::{debug, error};

use crate::backend::{RegionCopy, SurfaceBackend};
use crate::color::ColorSurfaceCache;
use crate::error::{Result, SurfaceCacheError};
use crate::format::FormatTable;
use crate::handle::TextureId;

/// Texture and normalized sub-rectangle to scan out for a display request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationSource {
    pub texture: TextureId,
    /// `[u0, v0, u1, v1]`: top-left then bottom-right.
    pub uv: [f32; 4],
    /// Rows actually covered by the surface, after clipping.
    pub visible_height: u32,
}

/// Finds the cached surface backing a display buffer.
///
/// Never creates, evicts or touches entries.
pub(crate) fn resolve<B, T>(
    color: &ColorSurfaceCache,
    backend: &mut B,
    formats: &T,
    address: u32,
    width: u32,
    height: u32,
    pitch: u32,
) -> Result<PresentationSource>
where
    B: SurfaceBackend + ?Sized,
    T: FormatTable + ?Sized,
{
    let Some(info) = color.info(address) else {
        debug!(address = format_args!("0x{address:x}"), "no cached surface to present");
        return Err(SurfaceCacheError::NotCached { address });
    };

    if info.stride != pitch {
        debug!(requested = pitch, stored = info.stride, "presentation pitch mismatch");
        return Err(SurfaceCacheError::PitchMismatch {
            requested: pitch,
            stored: info.stride,
        });
    }

    let row_bytes = u64::from(pitch) * u64::from(formats.logical_bytes_per_pixel(info.format));
    let delta = u64::from(address - info.address);
    if row_bytes == 0 || delta % row_bytes != 0 {
        return Err(SurfaceCacheError::MisalignedRow {
            address,
            base: info.address,
        });
    }

    let stored_height = info.height;
    let start_line = delta / row_bytes;
    if start_line >= u64::from(stored_height) {
        error!(
            address = format_args!("0x{address:x}"),
            start_line,
            stored_height,
            "presentation starts below the cached surface"
        );
        return Err(SurfaceCacheError::SegmentOutOfBounds {
            base: info.address,
            start_line: start_line.min(u64::from(u32::MAX)) as u32,
            end_line: (start_line + u64::from(height)).min(u64::from(u32::MAX)) as u32,
            stored_height,
        });
    }
    let start_line = start_line as u32;
    let visible_height = height.min(stored_height - start_line);

    // Raw-stored surfaces present their filterable view, refreshed from the primary.
    let texture = match info.read_view {
        Some(read_view) => {
            backend.copy_texture_region(
                info.texture,
                read_view,
                &RegionCopy::whole(info.width, stored_height),
            )?;
            read_view
        }
        None => info.texture,
    };

    let stored_height = stored_height as f32;
    Ok(PresentationSource {
        texture,
        uv: [
            0.0,
            start_line as f32 / stored_height,
            width as f32 / info.width as f32,
            (start_line + visible_height) as f32 / stored_height,
        ],
        visible_height,
    })
}
