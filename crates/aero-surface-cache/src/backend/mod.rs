//! The backing store: host texture, buffer and framebuffer objects.
//!
//! The cache decides *which* objects must exist and how data moves between them; a
//! [`SurfaceBackend`] performs the actual calls. Two implementations are provided:
//! - [`SoftSurfaceBackend`]: CPU-side byte arrays. Deterministic and inspectable, used by tests
//!   and headless builds.
//! - [`WgpuSurfaceBackend`]: real GPU textures through `wgpu`.

mod soft;
mod wgpu_backend;

pub use soft::SoftSurfaceBackend;
pub use wgpu_backend::WgpuSurfaceBackend;

use crate::error::BackendError;
use crate::format::TexelLayout;
use crate::handle::{BufferId, FramebufferId, TextureId};

/// Sampling filter hint attached to a texture's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Linear,
    Nearest,
}

/// Full storage specification of a 2D texture. Re-specifying a texture discards its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureStorageDesc {
    pub width: u32,
    pub height: u32,
    pub layout: TexelLayout,
    pub filter: TextureFilter,
}

impl TextureStorageDesc {
    pub fn byte_len(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.layout.bytes_per_texel())
    }
}

/// A rectangle of texels inside one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Texel-exact copy between two textures whose texels have the same byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegionCopy {
    pub src_x: u32,
    pub src_y: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionCopy {
    /// Copies `width x height` texels from the origin of one texture to the origin of another.
    pub fn whole(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

/// Where the color texture of a framebuffer is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorAttachmentPoint {
    /// The usual output slot.
    Color0,
    /// Secondary slot used by surfaces kept in raw integer storage; slot 0 stays unbound.
    Color1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferAttachments {
    pub color: TextureId,
    pub color_point: ColorAttachmentPoint,
    pub depth_stencil: TextureId,
}

/// Completeness of a freshly assembled framebuffer. Incomplete framebuffers are still usable
/// handles; draws into them may be dropped by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete(String),
}

pub trait SurfaceBackend {
    /// Creates a texture object without storage.
    fn create_texture(&mut self) -> Result<TextureId, BackendError>;

    /// (Re)specifies a texture's storage. Previous contents are undefined afterwards.
    fn define_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureStorageDesc,
    ) -> Result<(), BackendError>;

    fn destroy_texture(&mut self, texture: TextureId) -> Result<(), BackendError>;

    /// Copies a region between two defined textures with equal texel size.
    fn copy_texture_region(
        &mut self,
        src: TextureId,
        dst: TextureId,
        region: &RegionCopy,
    ) -> Result<(), BackendError>;

    fn create_staging_buffer(&mut self, size: u64) -> Result<BufferId, BackendError>;

    /// Reallocates a staging buffer to `size` bytes. Contents are not preserved.
    fn resize_staging_buffer(&mut self, buffer: BufferId, size: u64) -> Result<(), BackendError>;

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError>;

    /// Bytes of staging space [`Self::read_texture_into_buffer`] needs for `region`.
    fn staging_bytes_required(&self, region: &TextureRegion, bytes_per_texel: u32) -> u64 {
        u64::from(region.width) * u64::from(region.height) * u64::from(bytes_per_texel)
    }

    /// Reads `region` of `texture`, interpreted with `layout`, into the start of `buffer`.
    ///
    /// Returns the byte pitch between consecutive rows in the buffer.
    fn read_texture_into_buffer(
        &mut self,
        texture: TextureId,
        layout: TexelLayout,
        region: &TextureRegion,
        buffer: BufferId,
    ) -> Result<u32, BackendError>;

    /// Re-specifies `texture` with `desc` and fills `filled` (anchored at the origin) from
    /// `buffer`, whose rows are `bytes_per_row` apart. Texels outside `filled` are zero.
    fn write_buffer_into_texture(
        &mut self,
        buffer: BufferId,
        bytes_per_row: u32,
        texture: TextureId,
        desc: &TextureStorageDesc,
        filled: &TextureRegion,
    ) -> Result<(), BackendError>;

    fn create_framebuffer(
        &mut self,
        attachments: &FramebufferAttachments,
    ) -> Result<(FramebufferId, FramebufferStatus), BackendError>;

    fn clear_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        color: [f32; 4],
        depth: f32,
    ) -> Result<(), BackendError>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), BackendError>;
}

impl<B: SurfaceBackend + ?Sized> SurfaceBackend for Box<B> {
    fn create_texture(&mut self) -> Result<TextureId, BackendError> {
        (**self).create_texture()
    }

    fn define_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureStorageDesc,
    ) -> Result<(), BackendError> {
        (**self).define_texture(texture, desc)
    }

    fn destroy_texture(&mut self, texture: TextureId) -> Result<(), BackendError> {
        (**self).destroy_texture(texture)
    }

    fn copy_texture_region(
        &mut self,
        src: TextureId,
        dst: TextureId,
        region: &RegionCopy,
    ) -> Result<(), BackendError> {
        (**self).copy_texture_region(src, dst, region)
    }

    fn create_staging_buffer(&mut self, size: u64) -> Result<BufferId, BackendError> {
        (**self).create_staging_buffer(size)
    }

    fn resize_staging_buffer(&mut self, buffer: BufferId, size: u64) -> Result<(), BackendError> {
        (**self).resize_staging_buffer(buffer, size)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        (**self).destroy_buffer(buffer)
    }

    fn staging_bytes_required(&self, region: &TextureRegion, bytes_per_texel: u32) -> u64 {
        (**self).staging_bytes_required(region, bytes_per_texel)
    }

    fn read_texture_into_buffer(
        &mut self,
        texture: TextureId,
        layout: TexelLayout,
        region: &TextureRegion,
        buffer: BufferId,
    ) -> Result<u32, BackendError> {
        (**self).read_texture_into_buffer(texture, layout, region, buffer)
    }

    fn write_buffer_into_texture(
        &mut self,
        buffer: BufferId,
        bytes_per_row: u32,
        texture: TextureId,
        desc: &TextureStorageDesc,
        filled: &TextureRegion,
    ) -> Result<(), BackendError> {
        (**self).write_buffer_into_texture(buffer, bytes_per_row, texture, desc, filled)
    }

    fn create_framebuffer(
        &mut self,
        attachments: &FramebufferAttachments,
    ) -> Result<(FramebufferId, FramebufferStatus), BackendError> {
        (**self).create_framebuffer(attachments)
    }

    fn clear_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        color: [f32; 4],
        depth: f32,
    ) -> Result<(), BackendError> {
        (**self).clear_framebuffer(framebuffer, color, depth)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), BackendError> {
        (**self).destroy_framebuffer(framebuffer)
    }
}
