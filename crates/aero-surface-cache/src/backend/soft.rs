use hashbrown::HashMap;

use super::{
    FramebufferAttachments, FramebufferStatus, RegionCopy, SurfaceBackend, TextureRegion,
    TextureStorageDesc,
};
use crate::error::BackendError;
use crate::format::TexelLayout;
use crate::handle::{BufferId, FramebufferId, IdAllocator, TextureId};

#[derive(Debug, Default)]
struct SoftTexture {
    storage: Option<TextureStorageDesc>,
    data: Vec<u8>,
}

#[derive(Debug)]
struct SoftFramebuffer {
    attachments: FramebufferAttachments,
    clears: Vec<([f32; 4], f32)>,
}

/// CPU backing store: every texture is a tightly packed byte array.
///
/// Copies are plain byte moves, which makes the cache's data flow directly observable in tests.
/// Allocation failures can be injected with [`SoftSurfaceBackend::fail_next_allocations`].
#[derive(Debug, Default)]
pub struct SoftSurfaceBackend {
    texture_ids: IdAllocator,
    buffer_ids: IdAllocator,
    framebuffer_ids: IdAllocator,

    textures: HashMap<TextureId, SoftTexture>,
    buffers: HashMap<BufferId, Vec<u8>>,
    framebuffers: HashMap<FramebufferId, SoftFramebuffer>,

    skipped_before_failure: u32,
    pending_failures: u32,
    textures_created: u64,
}

impl SoftSurfaceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` object creations fail with [`BackendError::OutOfMemory`].
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.fail_allocations_after(0, count);
    }

    /// Lets `successes` object creations through, then fails the following `count`.
    pub fn fail_allocations_after(&mut self, successes: u32, count: u32) {
        self.skipped_before_failure = successes;
        self.pending_failures = count;
    }

    pub fn texture_storage(&self, texture: TextureId) -> Option<TextureStorageDesc> {
        self.textures.get(&texture)?.storage
    }

    pub fn texture_data(&self, texture: TextureId) -> Option<&[u8]> {
        let tex = self.textures.get(&texture)?;
        tex.storage.map(|_| tex.data.as_slice())
    }

    /// Overwrites a defined texture's contents, as a guest draw would.
    pub fn write_texture_data(
        &mut self,
        texture: TextureId,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let tex = self.texture_mut(texture)?;
        if data.len() != tex.data.len() {
            return Err(BackendError::InvalidResource(format!(
                "{texture:?} holds {} bytes, got {}",
                tex.data.len(),
                data.len()
            )));
        }
        tex.data.copy_from_slice(data);
        Ok(())
    }

    pub fn has_texture(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Total textures ever created, including destroyed ones.
    pub fn textures_created(&self) -> u64 {
        self.textures_created
    }

    pub fn buffer_len(&self, buffer: BufferId) -> Option<u64> {
        self.buffers.get(&buffer).map(|data| data.len() as u64)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn has_framebuffer(&self, framebuffer: FramebufferId) -> bool {
        self.framebuffers.contains_key(&framebuffer)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferId,
    ) -> Option<FramebufferAttachments> {
        self.framebuffers.get(&framebuffer).map(|fb| fb.attachments)
    }

    pub fn framebuffer_clears(&self, framebuffer: FramebufferId) -> &[([f32; 4], f32)] {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| fb.clears.as_slice())
            .unwrap_or(&[])
    }

    fn take_failure(&mut self, what: &str) -> Result<(), BackendError> {
        if self.pending_failures == 0 {
            return Ok(());
        }
        if self.skipped_before_failure > 0 {
            self.skipped_before_failure -= 1;
            return Ok(());
        }
        self.pending_failures -= 1;
        Err(BackendError::OutOfMemory(format!("injected {what} allocation failure")))
    }

    fn texture_mut(&mut self, texture: TextureId) -> Result<&mut SoftTexture, BackendError> {
        self.textures
            .get_mut(&texture)
            .filter(|tex| tex.storage.is_some())
            .ok_or_else(|| {
                BackendError::InvalidResource(format!("{texture:?} is not a defined texture"))
            })
    }

    fn defined(
        &self,
        texture: TextureId,
    ) -> Result<(&SoftTexture, TextureStorageDesc), BackendError> {
        let tex = self
            .textures
            .get(&texture)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {texture:?}")))?;
        let storage = tex
            .storage
            .ok_or_else(|| BackendError::InvalidResource(format!("{texture:?} has no storage")))?;
        Ok((tex, storage))
    }
}

fn region_fits(desc: &TextureStorageDesc, x: u32, y: u32, width: u32, height: u32) -> bool {
    u64::from(x) + u64::from(width) <= u64::from(desc.width)
        && u64::from(y) + u64::from(height) <= u64::from(desc.height)
}

fn out_of_bounds(
    texture: TextureId,
    desc: &TextureStorageDesc,
    region: TextureRegion,
) -> BackendError {
    BackendError::InvalidResource(format!(
        "{region:?} exceeds the {}x{} storage of {texture:?}",
        desc.width, desc.height
    ))
}

impl SurfaceBackend for SoftSurfaceBackend {
    fn create_texture(&mut self) -> Result<TextureId, BackendError> {
        self.take_failure("texture")?;
        let id = self
            .texture_ids
            .allocate()
            .map(TextureId::new)
            .ok_or_else(|| BackendError::OutOfMemory("texture ids exhausted".into()))?;
        self.textures.insert(id, SoftTexture::default());
        self.textures_created += 1;
        Ok(id)
    }

    fn define_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureStorageDesc,
    ) -> Result<(), BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidResource(format!(
                "define_texture {texture:?} width/height must be non-zero"
            )));
        }
        let len = usize::try_from(desc.byte_len()).map_err(|_| {
            BackendError::OutOfMemory(format!("{}x{} texture", desc.width, desc.height))
        })?;
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {texture:?}")))?;
        tex.storage = Some(*desc);
        tex.data.clear();
        tex.data.resize(len, 0);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) -> Result<(), BackendError> {
        self.textures
            .remove(&texture)
            .map(drop)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {texture:?}")))
    }

    fn copy_texture_region(
        &mut self,
        src: TextureId,
        dst: TextureId,
        region: &RegionCopy,
    ) -> Result<(), BackendError> {
        let (src_tex, src_desc) = self.defined(src)?;
        let (_, dst_desc) = self.defined(dst)?;
        let bpt = src_desc.layout.bytes_per_texel();
        if bpt != dst_desc.layout.bytes_per_texel() {
            return Err(BackendError::Unsupported(format!(
                "region copy between {:?} and {:?} texels",
                src_desc.layout.internal, dst_desc.layout.internal
            )));
        }
        if !region_fits(&src_desc, region.src_x, region.src_y, region.width, region.height) {
            let r = TextureRegion {
                x: region.src_x,
                y: region.src_y,
                width: region.width,
                height: region.height,
            };
            return Err(out_of_bounds(src, &src_desc, r));
        }
        if !region_fits(&dst_desc, region.dst_x, region.dst_y, region.width, region.height) {
            let r = TextureRegion {
                x: region.dst_x,
                y: region.dst_y,
                width: region.width,
                height: region.height,
            };
            return Err(out_of_bounds(dst, &dst_desc, r));
        }

        let bpt = bpt as usize;
        let row_len = region.width as usize * bpt;
        let src_pitch = src_desc.width as usize * bpt;
        let mut rows = Vec::with_capacity(row_len * region.height as usize);
        for row in 0..region.height as usize {
            let start = (region.src_y as usize + row) * src_pitch + region.src_x as usize * bpt;
            rows.extend_from_slice(&src_tex.data[start..start + row_len]);
        }

        let dst_pitch = dst_desc.width as usize * bpt;
        let dst_tex = self.texture_mut(dst)?;
        for (row, chunk) in rows.chunks_exact(row_len.max(1)).enumerate() {
            let start = (region.dst_y as usize + row) * dst_pitch + region.dst_x as usize * bpt;
            dst_tex.data[start..start + row_len].copy_from_slice(chunk);
        }
        Ok(())
    }

    fn create_staging_buffer(&mut self, size: u64) -> Result<BufferId, BackendError> {
        self.take_failure("buffer")?;
        let len = usize::try_from(size)
            .map_err(|_| BackendError::OutOfMemory(format!("{size} byte buffer")))?;
        let id = self
            .buffer_ids
            .allocate()
            .map(BufferId::new)
            .ok_or_else(|| BackendError::OutOfMemory("buffer ids exhausted".into()))?;
        self.buffers.insert(id, vec![0; len]);
        Ok(id)
    }

    fn resize_staging_buffer(&mut self, buffer: BufferId, size: u64) -> Result<(), BackendError> {
        let len = usize::try_from(size)
            .map_err(|_| BackendError::OutOfMemory(format!("{size} byte buffer")))?;
        let data = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {buffer:?}")))?;
        *data = vec![0; len];
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        self.buffers
            .remove(&buffer)
            .map(drop)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {buffer:?}")))
    }

    fn read_texture_into_buffer(
        &mut self,
        texture: TextureId,
        layout: TexelLayout,
        region: &TextureRegion,
        buffer: BufferId,
    ) -> Result<u32, BackendError> {
        let (tex, desc) = self.defined(texture)?;
        let bpt = desc.layout.bytes_per_texel();
        if layout.bytes_per_texel() != bpt {
            return Err(BackendError::Unsupported(format!(
                "reading {:?} texels as {:?}",
                desc.layout.internal, layout.internal
            )));
        }
        if !region_fits(&desc, region.x, region.y, region.width, region.height) {
            return Err(out_of_bounds(texture, &desc, *region));
        }

        let pitch = region.width * bpt;
        let row_len = pitch as usize;
        let tex_pitch = desc.width as usize * bpt as usize;
        let needed = row_len * region.height as usize;

        let mut packed = Vec::with_capacity(needed);
        for row in 0..region.height as usize {
            let start = (region.y as usize + row) * tex_pitch + region.x as usize * bpt as usize;
            packed.extend_from_slice(&tex.data[start..start + row_len]);
        }

        let data = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {buffer:?}")))?;
        if data.len() < needed {
            return Err(BackendError::InvalidResource(format!(
                "{buffer:?} holds {} bytes, readback needs {needed}",
                data.len()
            )));
        }
        data[..needed].copy_from_slice(&packed);
        Ok(pitch)
    }

    fn write_buffer_into_texture(
        &mut self,
        buffer: BufferId,
        bytes_per_row: u32,
        texture: TextureId,
        desc: &TextureStorageDesc,
        filled: &TextureRegion,
    ) -> Result<(), BackendError> {
        if filled.x != 0 || filled.y != 0 || !region_fits(desc, 0, 0, filled.width, filled.height) {
            return Err(out_of_bounds(texture, desc, *filled));
        }
        let bpt = desc.layout.bytes_per_texel() as usize;
        let pitch = bytes_per_row as usize;
        let fill_len = filled.width as usize * bpt;
        if fill_len > pitch {
            return Err(BackendError::Unsupported(format!(
                "buffer pitch {bytes_per_row} is shorter than a {}-texel row",
                filled.width
            )));
        }
        self.define_texture(texture, desc)?;
        if filled.width == 0 || filled.height == 0 {
            return Ok(());
        }

        let src = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {buffer:?}")))?;
        let rows = filled.height as usize;
        let needed = pitch * (rows - 1) + fill_len;
        if src.len() < needed {
            return Err(BackendError::InvalidResource(format!(
                "{buffer:?} holds {} bytes, upload needs {needed}",
                src.len()
            )));
        }

        let row_len = desc.width as usize * bpt;
        let mut data = vec![0u8; row_len * desc.height as usize];
        for row in 0..rows {
            data[row * row_len..row * row_len + fill_len]
                .copy_from_slice(&src[row * pitch..row * pitch + fill_len]);
        }
        self.texture_mut(texture)?.data = data;
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        attachments: &FramebufferAttachments,
    ) -> Result<(FramebufferId, FramebufferStatus), BackendError> {
        for texture in [attachments.color, attachments.depth_stencil] {
            if !self.textures.contains_key(&texture) {
                return Err(BackendError::InvalidResource(format!(
                    "framebuffer attachment {texture:?} does not exist"
                )));
            }
        }
        self.take_failure("framebuffer")?;

        let color = self.texture_storage(attachments.color);
        let depth = self.texture_storage(attachments.depth_stencil);
        let status = match (color, depth) {
            (Some(c), Some(d)) if (c.width, c.height) == (d.width, d.height) => {
                FramebufferStatus::Complete
            }
            (Some(c), Some(d)) => FramebufferStatus::Incomplete(format!(
                "color is {}x{} but depth-stencil is {}x{}",
                c.width, c.height, d.width, d.height
            )),
            _ => FramebufferStatus::Incomplete("attachment without storage".into()),
        };

        let id = self
            .framebuffer_ids
            .allocate()
            .map(FramebufferId::new)
            .ok_or_else(|| BackendError::OutOfMemory("framebuffer ids exhausted".into()))?;
        self.framebuffers.insert(
            id,
            SoftFramebuffer {
                attachments: *attachments,
                clears: Vec::new(),
            },
        );
        Ok((id, status))
    }

    fn clear_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        color: [f32; 4],
        depth: f32,
    ) -> Result<(), BackendError> {
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {framebuffer:?}")))?;
        fb.clears.push((color, depth));
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), BackendError> {
        self.framebuffers
            .remove(&framebuffer)
            .map(drop)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {framebuffer:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureFilter;
    use crate::format::{ColorBaseFormat, FormatTable, GxmFormatTable};

    fn rgba8(width: u32, height: u32) -> TextureStorageDesc {
        TextureStorageDesc {
            width,
            height,
            layout: GxmFormatTable.storage_layout(ColorBaseFormat::U8U8U8U8),
            filter: TextureFilter::Linear,
        }
    }

    #[test]
    fn region_copy_moves_rows() {
        let mut backend = SoftSurfaceBackend::new();
        let src = backend.create_texture().unwrap();
        let dst = backend.create_texture().unwrap();
        backend.define_texture(src, &rgba8(2, 2)).unwrap();
        backend.define_texture(dst, &rgba8(1, 1)).unwrap();
        backend
            .write_texture_data(src, &[0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3])
            .unwrap();

        let region = RegionCopy {
            src_x: 1,
            src_y: 1,
            width: 1,
            height: 1,
            ..RegionCopy::default()
        };
        backend.copy_texture_region(src, dst, &region).unwrap();
        assert_eq!(backend.texture_data(dst), Some(&[3u8, 3, 3, 3][..]));
    }

    #[test]
    fn region_copy_rejects_out_of_bounds() {
        let mut backend = SoftSurfaceBackend::new();
        let src = backend.create_texture().unwrap();
        let dst = backend.create_texture().unwrap();
        backend.define_texture(src, &rgba8(2, 2)).unwrap();
        backend.define_texture(dst, &rgba8(2, 2)).unwrap();
        let err = backend
            .copy_texture_region(src, dst, &RegionCopy::whole(3, 1))
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResource(_)));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut backend = SoftSurfaceBackend::new();
        backend.fail_next_allocations(1);
        assert!(matches!(backend.create_texture(), Err(BackendError::OutOfMemory(_))));
        assert!(backend.create_texture().is_ok());
    }

    #[test]
    fn mismatched_attachment_sizes_are_incomplete() {
        let mut backend = SoftSurfaceBackend::new();
        let color = backend.create_texture().unwrap();
        let depth = backend.create_texture().unwrap();
        backend.define_texture(color, &rgba8(4, 4)).unwrap();
        backend
            .define_texture(
                depth,
                &TextureStorageDesc {
                    layout: TexelLayout::DEPTH_STENCIL,
                    ..rgba8(8, 8)
                },
            )
            .unwrap();
        let (_, status) = backend
            .create_framebuffer(&FramebufferAttachments {
                color,
                color_point: crate::backend::ColorAttachmentPoint::Color0,
                depth_stencil: depth,
            })
            .unwrap();
        assert!(matches!(status, FramebufferStatus::Incomplete(_)));
    }
}
