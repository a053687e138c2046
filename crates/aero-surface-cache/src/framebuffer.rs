use hashbrown::HashMap;
use tracing::{debug, error, warn};

use crate::backend::{
    ColorAttachmentPoint, FramebufferAttachments, FramebufferStatus, SurfaceBackend,
};
use crate::config::SurfaceCacheConfig;
use crate::error::Result;
use crate::handle::{FramebufferId, TextureId};
use crate::stats::SurfaceCacheStats;

/// Identity of a framebuffer: the pair of textures it renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub color: TextureId,
    pub depth_stencil: TextureId,
}

/// A framebuffer plus the attachments it was resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferBinding {
    pub framebuffer: FramebufferId,
    pub color: TextureId,
    pub depth_stencil: TextureId,
    /// Height of the stored color surface, when a color surface was supplied.
    pub stored_height: Option<u32>,
}

/// Pair-keyed framebuffer objects. Entries die with either attachment.
#[derive(Debug, Default)]
pub(crate) struct FramebufferCache {
    entries: HashMap<FramebufferKey, FramebufferId>,
}

impl FramebufferCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, key: &FramebufferKey) -> Option<FramebufferId> {
        self.entries.get(key).copied()
    }

    /// Assembles, clears and caches a framebuffer for `key`.
    ///
    /// An incomplete framebuffer is logged and cached anyway.
    pub(crate) fn create<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        config: &SurfaceCacheConfig,
        key: FramebufferKey,
        color_point: ColorAttachmentPoint,
    ) -> Result<FramebufferId> {
        let attachments = FramebufferAttachments {
            color: key.color,
            color_point,
            depth_stencil: key.depth_stencil,
        };
        let (framebuffer, status) = backend.create_framebuffer(&attachments).map_err(|err| {
            error!(%err, "can't initialize framebuffer");
            err
        })?;
        if let FramebufferStatus::Incomplete(reason) = status {
            warn!(
                framebuffer = ?framebuffer,
                %reason,
                "framebuffer is not complete, proceeding anyway"
            );
        }

        if let Err(err) =
            backend.clear_framebuffer(framebuffer, config.clear_color, config.clear_depth)
        {
            error!(framebuffer = ?framebuffer, %err, "failed to clear new framebuffer");
            if let Err(err) = backend.destroy_framebuffer(framebuffer) {
                warn!(framebuffer = ?framebuffer, %err, "failed to destroy framebuffer");
            }
            return Err(err.into());
        }

        debug!(
            framebuffer = ?framebuffer,
            color = ?key.color,
            depth_stencil = ?key.depth_stencil,
            ?color_point,
            "created framebuffer"
        );
        self.entries.insert(key, framebuffer);
        Ok(framebuffer)
    }

    pub(crate) fn remove_referencing_color<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stats: &SurfaceCacheStats,
        texture: TextureId,
    ) -> usize {
        self.remove_where(backend, stats, |key| key.color == texture)
    }

    pub(crate) fn remove_referencing_depth_stencil<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stats: &SurfaceCacheStats,
        texture: TextureId,
    ) -> usize {
        self.remove_where(backend, stats, |key| key.depth_stencil == texture)
    }

    fn remove_where<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stats: &SurfaceCacheStats,
        mut predicate: impl FnMut(&FramebufferKey) -> bool,
    ) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|key, framebuffer| {
            if !predicate(key) {
                return true;
            }
            if let Err(err) = backend.destroy_framebuffer(*framebuffer) {
                warn!(framebuffer = ?framebuffer, %err, "failed to destroy framebuffer");
            }
            removed += 1;
            false
        });
        if removed > 0 {
            stats.add_framebuffers_destroyed(removed as u64);
        }
        removed
    }

    pub(crate) fn clear<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stats: &SurfaceCacheStats,
    ) {
        self.remove_where(backend, stats, |_| true);
    }

    pub(crate) fn forget(&mut self) {
        self.entries.clear();
    }
}
