mod common;

use aero_surface_cache::config::DEFAULT_CLEAR_COLOR;
use aero_surface_cache::{
    ColorAttachmentPoint, DepthStencilSurface, SurfaceCacheConfig, SurfaceCacheError,
};
use pretty_assertions::assert_eq;

use common::{f16x4, install_render_target, rgba8, soft_cache};

#[test]
fn framebuffers_need_a_render_target_and_a_surface() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    let color = rgba8(0x1000, 16, 16, 16);
    assert_eq!(
        cache.retrieve_framebuffer(Some(&color), None),
        Err(SurfaceCacheError::NoRenderTarget)
    );

    install_render_target(&mut cache, 16, 16);
    assert_eq!(cache.retrieve_framebuffer(None, None), Err(SurfaceCacheError::NoSurfaces));
    assert_eq!(cache.color_surface_count(), 0);
}

#[test]
fn framebuffer_is_created_and_cleared_once() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    let target = install_render_target(&mut cache, 16, 16);
    let color = rgba8(0x1000, 16, 16, 16);

    let first = cache.retrieve_framebuffer(Some(&color), None).unwrap();
    assert_eq!(first.depth_stencil, target.depth_stencil);
    assert_eq!(first.stored_height, Some(16));
    assert_eq!(cache.color_surface_info(0x1000).map(|i| i.texture), Some(first.color));

    let second = cache.retrieve_framebuffer(Some(&color), None).unwrap();
    assert_eq!(second, first);
    assert_eq!(cache.framebuffer_count(), 1);
    assert_eq!(
        cache.backend().framebuffer_clears(first.framebuffer),
        &[(DEFAULT_CLEAR_COLOR, 1.0)][..]
    );

    let attachments = cache.backend().framebuffer_attachments(first.framebuffer).unwrap();
    assert_eq!(attachments.color_point, ColorAttachmentPoint::Color0);

    let snapshot = cache.stats().snapshot();
    assert_eq!(snapshot.framebuffer_misses, 1);
    assert_eq!(snapshot.framebuffer_hits, 1);
}

#[test]
fn clear_values_come_from_config() {
    let config = SurfaceCacheConfig::default()
        .with_clear_color([0.0, 0.0, 0.0, 0.0])
        .with_clear_depth(0.5);
    let (mut cache, _) = soft_cache(config);
    install_render_target(&mut cache, 16, 16);

    let binding = cache
        .retrieve_framebuffer(Some(&rgba8(0x1000, 16, 16, 16)), None)
        .unwrap();
    assert_eq!(
        cache.backend().framebuffer_clears(binding.framebuffer),
        &[([0.0, 0.0, 0.0, 0.0], 0.5)][..]
    );
}

#[test]
fn raw_color_surfaces_bind_to_the_secondary_attachment() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    install_render_target(&mut cache, 16, 16);

    let binding = cache
        .retrieve_framebuffer(Some(&f16x4(0x1000, 16, 16, 16)), None)
        .unwrap();
    let attachments = cache.backend().framebuffer_attachments(binding.framebuffer).unwrap();
    assert_eq!(attachments.color_point, ColorAttachmentPoint::Color1);
    // The framebuffer renders into the raw primary, not its read view.
    assert_eq!(attachments.color, binding.color);
    assert_eq!(cache.color_surface_info(0x1000).map(|i| i.texture), Some(binding.color));
}

#[test]
fn depth_only_framebuffer_uses_default_color() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    let target = install_render_target(&mut cache, 16, 16);

    let binding = cache
        .retrieve_framebuffer(None, Some(&DepthStencilSurface::default()))
        .unwrap();
    assert_eq!(binding.color, target.color);
    assert_ne!(binding.depth_stencil, target.depth_stencil);
    assert_eq!(binding.stored_height, None);
    assert_eq!(cache.depth_stencil_slots_in_use(), 1);
}

#[test]
fn reshaping_a_surface_drops_its_framebuffers() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    install_render_target(&mut cache, 32, 16);

    let old = cache
        .retrieve_framebuffer(Some(&rgba8(0x1000, 16, 16, 32)), None)
        .unwrap();
    let new = cache
        .retrieve_framebuffer(Some(&rgba8(0x1000, 32, 16, 32)), None)
        .unwrap();

    // Same texture handle, but the old framebuffer saw the old storage.
    assert_eq!(new.color, old.color);
    assert_ne!(new.framebuffer, old.framebuffer);
    assert!(!cache.backend().has_framebuffer(old.framebuffer));
    assert_eq!(cache.framebuffer_count(), 1);
    assert_eq!(cache.stats().snapshot().framebuffer_misses, 2);
}

#[test]
fn failed_framebuffer_creation_is_not_cached() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    install_render_target(&mut cache, 16, 16);
    let color = rgba8(0x1000, 16, 16, 16);
    cache.retrieve_color_surface_for_write(&color).unwrap();

    cache.backend_mut().fail_next_allocations(1);
    assert!(matches!(
        cache.retrieve_framebuffer(Some(&color), None),
        Err(SurfaceCacheError::Backend(_))
    ));
    assert_eq!(cache.framebuffer_count(), 0);
    assert_eq!(cache.backend().live_framebuffers(), 0);
}
