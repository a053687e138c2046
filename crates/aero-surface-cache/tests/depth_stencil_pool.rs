mod common;

use aero_surface_cache::{DepthStencilSurface, SurfaceCacheConfig, SurfaceCacheError, TexelLayout};
use pretty_assertions::assert_eq;

use common::{install_render_target, rgba8, soft_cache};

fn descriptor(depth_data: u32) -> DepthStencilSurface {
    DepthStencilSurface {
        zls_control: 0x1,
        depth_data,
        stencil_data: depth_data + 0x100,
        background_depth: 1.0,
        background_control: 0,
    }
}

#[test]
fn identical_descriptors_share_a_texture() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    install_render_target(&mut cache, 32, 16);

    let first = cache.retrieve_depth_stencil(&descriptor(0x8000_0000)).unwrap();
    let again = cache.retrieve_depth_stencil(&descriptor(0x8000_0000)).unwrap();
    let other = cache.retrieve_depth_stencil(&descriptor(0x8001_0000)).unwrap();
    assert_eq!(first, again);
    assert_ne!(first, other);

    let storage = cache.backend().texture_storage(first).unwrap();
    assert_eq!((storage.width, storage.height), (32, 16));
    assert_eq!(storage.layout, TexelLayout::DEPTH_STENCIL);

    let snapshot = cache.stats().snapshot();
    assert_eq!(snapshot.depth_stencil_hits, 1);
    assert_eq!(snapshot.depth_stencil_misses, 2);
}

#[test]
fn recycling_keeps_texture_identity_and_drops_framebuffers() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default().with_capacity(2));
    install_render_target(&mut cache, 16, 16);

    let binding = cache
        .retrieve_framebuffer(Some(&rgba8(0x1000, 16, 16, 16)), Some(&descriptor(1)))
        .unwrap();
    let second = cache.retrieve_depth_stencil(&descriptor(2)).unwrap();

    // Both slots are taken; the least recently used one is repurposed.
    let third = cache.retrieve_depth_stencil(&descriptor(3)).unwrap();
    assert_eq!(third, binding.depth_stencil);
    assert_ne!(third, second);
    assert!(!cache.backend().has_framebuffer(binding.framebuffer));
    assert_eq!(cache.framebuffer_count(), 0);
    assert_eq!(cache.depth_stencil_slots_in_use(), 2);
    assert_eq!(cache.depth_stencil_textures().len(), 2);
    assert_eq!(cache.stats().snapshot().depth_stencil_recycles, 1);

    // The repurposed slot no longer answers to its old descriptor.
    let first_again = cache.retrieve_depth_stencil(&descriptor(1)).unwrap();
    assert_eq!(first_again, second);
    assert_eq!(cache.stats().snapshot().depth_stencil_recycles, 2);
}

#[test]
fn recycled_slot_takes_current_render_target_size() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default().with_capacity(1));
    install_render_target(&mut cache, 16, 16);
    let texture = cache.retrieve_depth_stencil(&descriptor(1)).unwrap();

    install_render_target(&mut cache, 64, 32);
    assert_eq!(cache.retrieve_depth_stencil(&descriptor(2)), Ok(texture));
    let storage = cache.backend().texture_storage(texture).unwrap();
    assert_eq!((storage.width, storage.height), (64, 32));
}

#[test]
fn depth_stencil_needs_a_render_target() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    assert_eq!(
        cache.retrieve_depth_stencil(&descriptor(1)),
        Err(SurfaceCacheError::NoRenderTarget)
    );
    assert_eq!(cache.depth_stencil_slots_in_use(), 0);
}

#[test]
fn zero_capacity_from_a_struct_literal_still_holds_one_slot() {
    let config = SurfaceCacheConfig {
        capacity: 0,
        ..SurfaceCacheConfig::default()
    };
    let (mut cache, _) = soft_cache(config);
    assert_eq!(cache.config().capacity, 1);
    install_render_target(&mut cache, 16, 16);

    let first = cache.retrieve_depth_stencil(&descriptor(1)).unwrap();
    assert_eq!(cache.retrieve_depth_stencil(&descriptor(2)), Ok(first));
    assert_eq!(cache.depth_stencil_slots_in_use(), 1);

    cache
        .retrieve_color_surface_for_write(&rgba8(0x1000, 16, 16, 16))
        .unwrap();
    assert_eq!(cache.color_surface_count(), 1);
}
