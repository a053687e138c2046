//! GPU surface cache for an emulated GPU.
//!
//! Guest render targets live in guest memory and are described only by address, extent and
//! pixel format. The guest reuses, reshapes and frees that memory without telling anyone. This
//! crate keeps host textures coherent with it:
//!
//! - color surfaces are keyed by address and aliased by containment, with cropped and bit-cast
//!   views served from the same storage ([`SurfaceCache::retrieve_color_surface_for_read`]);
//! - depth-stencil surfaces come from a fixed pool of recycled slots;
//! - framebuffers are cached per attachment pair and die with either attachment;
//! - display buffers are resolved to a texture plus UV rectangle for presentation.
//!
//! All host calls go through [`SurfaceBackend`]. [`SoftSurfaceBackend`] keeps everything in CPU
//! memory; [`WgpuSurfaceBackend`] drives a real device.

pub mod backend;
mod cache;
pub mod clock;
mod color;
pub mod config;
mod depth_stencil;
mod error;
pub mod format;
mod framebuffer;
mod handle;
mod present;
mod recency;
pub mod stats;
mod surface;
mod typeless;

pub use backend::{
    ColorAttachmentPoint, FramebufferAttachments, FramebufferStatus, RegionCopy, SoftSurfaceBackend,
    SurfaceBackend, TextureFilter, TextureRegion, TextureStorageDesc, WgpuSurfaceBackend,
};
pub use cache::SurfaceCache;
pub use clock::{FakeHostClock, HostClock, StdHostClock};
pub use color::ColorSurfaceInfo;
pub use config::SurfaceCacheConfig;
pub use error::{BackendError, Result, SurfaceCacheError};
pub use format::{ColorBaseFormat, FormatTable, GxmFormatTable, TexelLayout};
pub use framebuffer::{FramebufferBinding, FramebufferKey};
pub use handle::{BufferId, FramebufferId, HandleOrZero, TextureId};
pub use present::PresentationSource;
pub use stats::{SurfaceCacheStats, SurfaceCacheStatsSnapshot};
pub use surface::{ColorSurfaceRequest, DepthStencilSurface, RenderTarget, RetrievePurpose};
pub use typeless::TypelessCopy;
