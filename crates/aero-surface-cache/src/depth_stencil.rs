use std::collections::VecDeque;

use tracing::{debug, error};

use crate::backend::{SurfaceBackend, TextureFilter, TextureStorageDesc};
use crate::error::{Result, SurfaceCacheError};
use crate::format::TexelLayout;
use crate::framebuffer::FramebufferCache;
use crate::handle::TextureId;
use crate::recency::RecencyList;
use crate::stats::SurfaceCacheStats;
use crate::surface::{DepthStencilSurface, RenderTarget};

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    descriptor: DepthStencilSurface,
    /// Allocated on first use and kept for the pool's lifetime.
    texture: Option<TextureId>,
    in_use: bool,
}

/// Fixed arena of depth-stencil slots with a free list and an LRU index.
///
/// Recycling a slot overwrites its descriptor and re-specifies its texture; the texture object
/// itself is never destroyed while the pool lives.
#[derive(Debug)]
pub(crate) struct DepthStencilPool {
    slots: Vec<Slot>,
    free: VecDeque<usize>,
    recency: RecencyList<usize>,
}

impl DepthStencilPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
            free: (0..capacity).collect(),
            recency: RecencyList::new(),
        }
    }

    pub(crate) fn in_use(&self) -> usize {
        self.recency.len()
    }

    pub(crate) fn allocated_textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.slots.iter().filter_map(|slot| slot.texture)
    }

    pub(crate) fn retrieve<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        framebuffers: &mut FramebufferCache,
        stats: &SurfaceCacheStats,
        target: Option<&RenderTarget>,
        descriptor: &DepthStencilSurface,
    ) -> Result<TextureId> {
        let Some(target) = target else {
            error!("unable to retrieve depth stencil texture with no active render target");
            return Err(SurfaceCacheError::NoRenderTarget);
        };

        let hit = self
            .slots
            .iter()
            .position(|slot| slot.in_use && slot.descriptor.same_bytes(descriptor));
        if let Some(index) = hit {
            if let Some(texture) = self.slots[index].texture {
                self.recency.touch(index);
                stats.inc_depth_stencil_hits();
                return Ok(texture);
            }
        }
        stats.inc_depth_stencil_misses();

        let index = if self.recency.len() >= self.slots.len() {
            let Some(victim) = self.recency.pop_front() else {
                return Err(SurfaceCacheError::NoFreeDepthStencilSlot);
            };
            if let Some(texture) = self.slots[victim].texture {
                framebuffers.remove_referencing_depth_stencil(backend, stats, texture);
            }
            self.slots[victim].in_use = false;
            stats.inc_depth_stencil_recycles();
            debug!(slot = victim, "recycling least recently used depth stencil slot");
            victim
        } else {
            match self.free.pop_front() {
                Some(index) => index,
                None => {
                    error!("no free depth stencil texture cache slot");
                    return Err(SurfaceCacheError::NoFreeDepthStencilSlot);
                }
            }
        };

        match self.fill_slot(backend, index, target, descriptor) {
            Ok(texture) => Ok(texture),
            Err(err) => {
                self.free.push_back(index);
                Err(err)
            }
        }
    }

    fn fill_slot<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
        target: &RenderTarget,
        descriptor: &DepthStencilSurface,
    ) -> Result<TextureId> {
        let slot = &mut self.slots[index];
        let texture = match slot.texture {
            Some(texture) => texture,
            None => {
                let texture = backend.create_texture().map_err(|err| {
                    error!(%err, "fail to initialize depth stencil texture");
                    err
                })?;
                slot.texture = Some(texture);
                texture
            }
        };

        backend
            .define_texture(
                texture,
                &TextureStorageDesc {
                    width: target.width,
                    height: target.height,
                    layout: TexelLayout::DEPTH_STENCIL,
                    filter: TextureFilter::Nearest,
                },
            )
            .map_err(|err| {
                error!(texture = ?texture, %err, "failed to specify depth stencil storage");
                err
            })?;

        slot.descriptor = *descriptor;
        slot.in_use = true;
        self.recency.touch(index);
        debug!(
            slot = index,
            texture = ?texture,
            width = target.width,
            height = target.height,
            "depth stencil slot assigned"
        );
        Ok(texture)
    }

    /// Destroys every slot texture. The pool is empty but usable afterwards.
    pub(crate) fn clear<B: SurfaceBackend + ?Sized>(&mut self, backend: &mut B) {
        for slot in &mut self.slots {
            if let Some(texture) = slot.texture.take() {
                if let Err(err) = backend.destroy_texture(texture) {
                    tracing::warn!(
                        texture = ?texture,
                        %err,
                        "failed to destroy depth stencil texture"
                    );
                }
            }
        }
        self.forget();
    }

    pub(crate) fn forget(&mut self) {
        let capacity = self.slots.len();
        *self = Self::new(capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoftSurfaceBackend;

    fn target(backend: &mut SoftSurfaceBackend) -> RenderTarget {
        RenderTarget {
            width: 16,
            height: 8,
            color: backend.create_texture().unwrap(),
            depth_stencil: backend.create_texture().unwrap(),
        }
    }

    fn descriptor(depth_data: u32) -> DepthStencilSurface {
        DepthStencilSurface {
            depth_data,
            ..Default::default()
        }
    }

    #[test]
    fn identical_descriptor_hits() {
        let mut backend = SoftSurfaceBackend::new();
        let mut framebuffers = FramebufferCache::new();
        let stats = SurfaceCacheStats::new();
        let target = target(&mut backend);
        let mut pool = DepthStencilPool::new(2);

        let first = pool
            .retrieve(&mut backend, &mut framebuffers, &stats, Some(&target), &descriptor(1))
            .unwrap();
        let again = pool
            .retrieve(&mut backend, &mut framebuffers, &stats, Some(&target), &descriptor(1))
            .unwrap();
        assert_eq!(first, again);
        let storage = backend.texture_storage(first).unwrap();
        assert_eq!((storage.width, storage.height), (16, 8));
        assert_eq!(storage.layout, TexelLayout::DEPTH_STENCIL);
    }

    #[test]
    fn failed_allocation_returns_slot_to_free_list() {
        let mut backend = SoftSurfaceBackend::new();
        let mut framebuffers = FramebufferCache::new();
        let stats = SurfaceCacheStats::new();
        let target = target(&mut backend);
        let mut pool = DepthStencilPool::new(1);

        backend.fail_next_allocations(1);
        assert!(pool
            .retrieve(&mut backend, &mut framebuffers, &stats, Some(&target), &descriptor(1))
            .is_err());
        assert_eq!(pool.in_use(), 0);
        assert!(pool
            .retrieve(&mut backend, &mut framebuffers, &stats, Some(&target), &descriptor(1))
            .is_ok());
    }

    #[test]
    fn missing_render_target_is_rejected() {
        let mut backend = SoftSurfaceBackend::new();
        let mut framebuffers = FramebufferCache::new();
        let stats = SurfaceCacheStats::new();
        let mut pool = DepthStencilPool::new(1);
        assert_eq!(
            pool.retrieve(&mut backend, &mut framebuffers, &stats, None, &descriptor(1)),
            Err(SurfaceCacheError::NoRenderTarget)
        );
    }
}
