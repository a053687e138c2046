//! Guest-side surface descriptions handed to the cache by the renderer.

use bytemuck::{Pod, Zeroable};

use crate::format::ColorBaseFormat;
use crate::handle::TextureId;

/// A guest color surface: base address, extent and pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSurfaceRequest {
    pub address: u32,
    pub width: u32,
    pub height: u32,
    /// Row stride in pixels of `format`.
    pub stride: u32,
    pub format: ColorBaseFormat,
}

impl ColorSurfaceRequest {
    pub const fn new(
        address: u32,
        width: u32,
        height: u32,
        stride: u32,
        format: ColorBaseFormat,
    ) -> Self {
        Self {
            address,
            width,
            height,
            stride,
            format,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.stride == 0
    }
}

/// Why the renderer wants a color surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievePurpose {
    /// The surface is about to be rendered into.
    Writing,
    /// The surface is about to be sampled as a texture.
    Reading,
}

/// Guest depth-stencil surface descriptor.
///
/// Compared byte-for-byte: two descriptors name the same pool slot only if every field,
/// including the float background depth, has an identical bit pattern.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct DepthStencilSurface {
    pub zls_control: u32,
    pub depth_data: u32,
    pub stencil_data: u32,
    pub background_depth: f32,
    pub background_control: u32,
}

impl DepthStencilSurface {
    pub fn same_bytes(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

/// The active render target: dimensions plus the attachments used when a framebuffer retrieval
/// omits one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub color: TextureId,
    pub depth_stencil: TextureId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_compare_by_bit_pattern() {
        let a = DepthStencilSurface {
            depth_data: 0x8100_0000,
            background_depth: 0.0,
            ..Default::default()
        };
        let b = DepthStencilSurface {
            background_depth: -0.0,
            ..a
        };
        assert!(a.same_bytes(&DepthStencilSurface { ..a }));
        // 0.0 == -0.0 as floats, but the guest wrote different words.
        assert!(!a.same_bytes(&b));
    }
}
