//! Byte relay between textures whose texel layouts differ.
//!
//! A region of the source is read, in the source's own layout, into a staging buffer; the buffer
//! is then uploaded into the destination under the destination's layout. No texel is converted.

use tracing::{debug, error};

use crate::backend::{SurfaceBackend, TextureRegion, TextureStorageDesc};
use crate::error::Result;
use crate::format::TexelLayout;
use crate::handle::{BufferId, TextureId};
use crate::stats::SurfaceCacheStats;

/// One typeless transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypelessCopy {
    pub dest: TextureId,
    pub source: TextureId,
    /// Storage the destination is re-specified with before the upload.
    pub dest_desc: TextureStorageDesc,
    pub source_layout: TexelLayout,
    /// Region of the source, in source texels.
    pub region: TextureRegion,
    /// Byte size of the whole source surface; the staging buffer is grown to at least this.
    pub total_source_bytes: u64,
}

impl TypelessCopy {
    /// Destination texels covered by the source region; the remainder of the destination is
    /// left zero.
    fn filled_region(&self) -> TextureRegion {
        let source_row_bytes =
            u64::from(self.region.width) * u64::from(self.source_layout.bytes_per_texel());
        let dest_texel = u64::from(self.dest_desc.layout.bytes_per_texel()).max(1);
        TextureRegion {
            x: 0,
            y: 0,
            width: (source_row_bytes / dest_texel).min(u64::from(self.dest_desc.width)) as u32,
            height: self.region.height.min(self.dest_desc.height),
        }
    }
}

/// Owner of the single, grow-only staging buffer.
#[derive(Debug, Default)]
pub(crate) struct TypelessCopier {
    buffer: Option<BufferId>,
    size: u64,
}

impl TypelessCopier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn staging_size(&self) -> u64 {
        self.size
    }

    pub(crate) fn copy<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stats: &SurfaceCacheStats,
        op: &TypelessCopy,
    ) -> Result<()> {
        let required = op.total_source_bytes.max(
            backend.staging_bytes_required(&op.region, op.source_layout.bytes_per_texel()),
        );
        let buffer = self.ensure_capacity(backend, stats, required)?;

        let bytes_per_row = backend
            .read_texture_into_buffer(op.source, op.source_layout, &op.region, buffer)
            .map_err(|err| {
                error!(source = ?op.source, %err, "typeless copy readback failed");
                err
            })?;
        let filled = op.filled_region();
        backend
            .write_buffer_into_texture(buffer, bytes_per_row, op.dest, &op.dest_desc, &filled)
            .map_err(|err| {
                error!(dest = ?op.dest, %err, "typeless copy upload failed");
                err
            })?;

        stats.inc_typeless_copies();
        Ok(())
    }

    fn ensure_capacity<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stats: &SurfaceCacheStats,
        required: u64,
    ) -> Result<BufferId> {
        let buffer = match self.buffer {
            Some(buffer) if required <= self.size => return Ok(buffer),
            Some(buffer) => {
                backend.resize_staging_buffer(buffer, required).map_err(|err| {
                    error!(required, %err, "unable to grow typeless copy buffer");
                    err
                })?;
                buffer
            }
            None => backend.create_staging_buffer(required).map_err(|err| {
                error!(required, %err, "unable to initialize a typeless copy buffer");
                err
            })?,
        };
        debug!(old = self.size, new = required, "typeless copy buffer grown");
        self.buffer = Some(buffer);
        self.size = required;
        stats.set_staging_bytes(required);
        Ok(buffer)
    }

    pub(crate) fn release<B: SurfaceBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(buffer) = self.buffer.take() {
            if let Err(err) = backend.destroy_buffer(buffer) {
                tracing::warn!(buffer = ?buffer, %err, "failed to destroy typeless copy buffer");
            }
        }
        self.size = 0;
    }

    pub(crate) fn forget(&mut self) {
        self.buffer = None;
        self.size = 0;
    }
}
