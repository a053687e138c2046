use std::time::Duration;

use tracing::{debug, error};

use crate::backend::{ColorAttachmentPoint, SurfaceBackend};
use crate::clock::{HostClock, StdHostClock};
use crate::color::{ColorSurfaceCache, ColorSurfaceInfo};
use crate::config::SurfaceCacheConfig;
use crate::depth_stencil::DepthStencilPool;
use crate::error::{Result, SurfaceCacheError};
use crate::format::{FormatTable, GxmFormatTable};
use crate::framebuffer::{FramebufferBinding, FramebufferCache, FramebufferKey};
use crate::handle::TextureId;
use crate::present::{self, PresentationSource};
use crate::stats::SurfaceCacheStats;
use crate::surface::{ColorSurfaceRequest, DepthStencilSurface, RenderTarget, RetrievePurpose};
use crate::typeless::{TypelessCopier, TypelessCopy};

/// Everything a sub-cache needs besides its own state, borrowed disjointly from [`SurfaceCache`].
pub(crate) struct CacheEnv<'a, B: ?Sized, T: ?Sized> {
    pub(crate) backend: &'a mut B,
    pub(crate) formats: &'a T,
    pub(crate) framebuffers: &'a mut FramebufferCache,
    pub(crate) staging: &'a mut TypelessCopier,
    pub(crate) stats: &'a SurfaceCacheStats,
    pub(crate) config: &'a SurfaceCacheConfig,
    pub(crate) now: Duration,
}

/// GPU surface cache for one rendering context.
///
/// Maps guest color and depth-stencil surfaces onto backing-store textures, composes them into
/// framebuffers and resolves display buffers for presentation. Single-threaded: every mutating
/// operation takes `&mut self`.
pub struct SurfaceCache<B, T = GxmFormatTable> {
    backend: B,
    formats: T,
    clock: Box<dyn HostClock>,
    config: SurfaceCacheConfig,
    stats: SurfaceCacheStats,
    render_target: Option<RenderTarget>,

    color: ColorSurfaceCache,
    depth_stencil: DepthStencilPool,
    framebuffers: FramebufferCache,
    staging: TypelessCopier,
}

impl<B: SurfaceBackend> SurfaceCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SurfaceCacheConfig::default())
    }

    pub fn with_config(backend: B, config: SurfaceCacheConfig) -> Self {
        Self::with_formats(backend, GxmFormatTable, config)
    }
}

impl<B: SurfaceBackend, T: FormatTable> SurfaceCache<B, T> {
    pub fn with_formats(backend: B, formats: T, mut config: SurfaceCacheConfig) -> Self {
        // Struct literals bypass `with_capacity`.
        config.capacity = config.capacity.max(1);
        let capacity = config.capacity;
        Self {
            backend,
            formats,
            clock: Box::new(StdHostClock::new()),
            config,
            stats: SurfaceCacheStats::new(),
            render_target: None,
            color: ColorSurfaceCache::new(),
            depth_stencil: DepthStencilPool::new(capacity),
            framebuffers: FramebufferCache::new(),
            staging: TypelessCopier::new(),
        }
    }

    /// Replaces the time source used to age cast views.
    pub fn with_clock(mut self, clock: impl HostClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &SurfaceCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &SurfaceCacheStats {
        &self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn formats(&self) -> &T {
        &self.formats
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.render_target.as_ref()
    }

    pub fn set_render_target(&mut self, target: Option<RenderTarget>) {
        self.render_target = target;
    }

    fn split(&mut self) -> (&mut ColorSurfaceCache, CacheEnv<'_, B, T>) {
        let now = self.clock.now();
        (
            &mut self.color,
            CacheEnv {
                backend: &mut self.backend,
                formats: &self.formats,
                framebuffers: &mut self.framebuffers,
                staging: &mut self.staging,
                stats: &self.stats,
                config: &self.config,
                now,
            },
        )
    }

    /// Texture to render a guest color surface into. Infers frees and reshapes from the request.
    pub fn retrieve_color_surface_for_write(
        &mut self,
        req: &ColorSurfaceRequest,
    ) -> Result<TextureId> {
        let (color, mut env) = self.split();
        color.retrieve_for_write(&mut env, req)
    }

    /// Texture to sample a guest color surface from, possibly a cropped or reinterpreted view.
    pub fn retrieve_color_surface_for_read(
        &mut self,
        req: &ColorSurfaceRequest,
    ) -> Result<TextureId> {
        let (color, mut env) = self.split();
        color.retrieve_for_read(&mut env, req)
    }

    pub fn retrieve_color_surface(
        &mut self,
        req: &ColorSurfaceRequest,
        purpose: RetrievePurpose,
    ) -> Result<TextureId> {
        match purpose {
            RetrievePurpose::Writing => self.retrieve_color_surface_for_write(req),
            RetrievePurpose::Reading => self.retrieve_color_surface_for_read(req),
        }
    }

    /// Up-to-date duplicate of the surface based exactly at `address`, safe to sample while the
    /// original stays bound for writing.
    pub fn retrieve_ping_pong_color_surface(&mut self, address: u32) -> Result<TextureId> {
        let (color, mut env) = self.split();
        color.retrieve_ping_pong(&mut env, address)
    }

    pub fn retrieve_depth_stencil(
        &mut self,
        descriptor: &DepthStencilSurface,
    ) -> Result<TextureId> {
        self.depth_stencil.retrieve(
            &mut self.backend,
            &mut self.framebuffers,
            &self.stats,
            self.render_target.as_ref(),
            descriptor,
        )
    }

    /// Framebuffer rendering into `color` and `depth_stencil`; an absent side falls back to the
    /// render target's default attachment.
    pub fn retrieve_framebuffer(
        &mut self,
        color: Option<&ColorSurfaceRequest>,
        depth_stencil: Option<&DepthStencilSurface>,
    ) -> Result<FramebufferBinding> {
        let Some(target) = self.render_target else {
            error!("unable to retrieve framebuffer with no active render target");
            return Err(SurfaceCacheError::NoRenderTarget);
        };
        if color.is_none() && depth_stencil.is_none() {
            error!("depth stencil and color surface are both absent");
            return Err(SurfaceCacheError::NoSurfaces);
        }

        let (color_texture, stored_height) = match color {
            Some(req) => {
                let texture = self.retrieve_color_surface_for_write(req)?;
                (texture, self.color.extent(req.address).map(|(_, height)| height))
            }
            None => (target.color, None),
        };
        let depth_texture = match depth_stencil {
            Some(descriptor) => self.retrieve_depth_stencil(descriptor)?,
            None => target.depth_stencil,
        };

        let key = FramebufferKey {
            color: color_texture,
            depth_stencil: depth_texture,
        };
        let framebuffer = match self.framebuffers.get(&key) {
            Some(framebuffer) => {
                self.stats.inc_framebuffer_hits();
                framebuffer
            }
            None => {
                self.stats.inc_framebuffer_misses();
                let raw = color.is_some_and(|req| self.formats.is_raw_stored(req.format));
                let point = if raw {
                    ColorAttachmentPoint::Color1
                } else {
                    ColorAttachmentPoint::Color0
                };
                self.framebuffers
                    .create(&mut self.backend, &self.config, key, point)?
            }
        };

        Ok(FramebufferBinding {
            framebuffer,
            color: color_texture,
            depth_stencil: depth_texture,
            stored_height,
        })
    }

    /// Locates the cached surface holding a display buffer and the visible part of it.
    pub fn source_for_presentation(
        &mut self,
        address: u32,
        width: u32,
        height: u32,
        pitch: u32,
    ) -> Result<PresentationSource> {
        present::resolve(
            &self.color,
            &mut self.backend,
            &self.formats,
            address,
            width,
            height,
            pitch,
        )
    }

    pub fn typeless_copy(&mut self, copy: &TypelessCopy) -> Result<()> {
        self.staging.copy(&mut self.backend, &self.stats, copy)
    }

    pub fn set_color_surface_dirty(&mut self, address: u32, dirty: bool) -> Result<()> {
        self.color.set_dirty(address, dirty)
    }

    /// Stored `(width, height)` of the surface covering `address`.
    pub fn color_surface_extent(&self, address: u32) -> Option<(u32, u32)> {
        self.color.extent(address)
    }

    pub fn color_surface_info(&self, address: u32) -> Option<ColorSurfaceInfo> {
        self.color.info(address)
    }

    /// Resident color surfaces ordered by address.
    pub fn color_surfaces(&self) -> Vec<ColorSurfaceInfo> {
        self.color.resident()
    }

    /// Resident color surface addresses from least to most recently used.
    pub fn color_recency(&self) -> Vec<u32> {
        self.color.recency_order()
    }

    pub fn color_surface_count(&self) -> usize {
        self.color.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn depth_stencil_slots_in_use(&self) -> usize {
        self.depth_stencil.in_use()
    }

    pub fn depth_stencil_textures(&self) -> Vec<TextureId> {
        self.depth_stencil.allocated_textures().collect()
    }

    pub fn staging_buffer_size(&self) -> u64 {
        self.staging.staging_size()
    }

    /// Destroys every backing-store object the cache owns.
    pub fn clear(&mut self) {
        self.framebuffers.clear(&mut self.backend, &self.stats);
        let (color, mut env) = self.split();
        color.clear(&mut env);
        self.depth_stencil.clear(&mut self.backend);
        self.staging.release(&mut self.backend);
        debug!("surface cache cleared");
    }

    /// Swaps in a new backing store after context loss.
    ///
    /// Handles issued by the old store are meaningless on the new one, so all bookkeeping is
    /// dropped without issuing destroy calls. The render target is unset. Returns the old store.
    pub fn replace_backend(&mut self, backend: B) -> B {
        let old = std::mem::replace(&mut self.backend, backend);
        self.color.forget();
        self.depth_stencil.forget();
        self.framebuffers.forget();
        self.staging.forget();
        self.render_target = None;
        self.stats.reset();
        debug!("surface cache backing store replaced");
        old
    }
}
