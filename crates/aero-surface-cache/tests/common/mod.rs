//! Shared helpers for `aero-surface-cache` integration tests.

use aero_surface_cache::{
    ColorBaseFormat, ColorSurfaceRequest, FakeHostClock, RenderTarget, SoftSurfaceBackend,
    SurfaceBackend, SurfaceCache, SurfaceCacheConfig, TexelLayout, TextureFilter,
    TextureStorageDesc,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn require_webgpu() -> bool {
    let Ok(raw) = std::env::var("AERO_REQUIRE_WEBGPU") else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

#[allow(dead_code)]
pub fn skip_or_panic(test_name: &str, reason: &str) {
    if require_webgpu() {
        panic!("AERO_REQUIRE_WEBGPU is enabled but {test_name} cannot run: {reason}");
    }
    eprintln!("skipping {test_name}: {reason}");
}

pub type SoftCache = SurfaceCache<SoftSurfaceBackend>;

/// Cache over the CPU backing store, driven by a clock the test controls.
#[allow(dead_code)]
pub fn soft_cache(config: SurfaceCacheConfig) -> (SoftCache, FakeHostClock) {
    init_tracing();
    let clock = FakeHostClock::new();
    let cache =
        SurfaceCache::with_config(SoftSurfaceBackend::new(), config).with_clock(clock.clone());
    (cache, clock)
}

#[allow(dead_code)]
pub fn rgba8(address: u32, width: u32, height: u32, stride: u32) -> ColorSurfaceRequest {
    ColorSurfaceRequest::new(address, width, height, stride, ColorBaseFormat::U8U8U8U8)
}

#[allow(dead_code)]
pub fn f16x4(address: u32, width: u32, height: u32, stride: u32) -> ColorSurfaceRequest {
    ColorSurfaceRequest::new(address, width, height, stride, ColorBaseFormat::F16F16F16F16)
}

/// Installs a `width x height` render target whose default attachments live in the backing store.
#[allow(dead_code)]
pub fn install_render_target(cache: &mut SoftCache, width: u32, height: u32) -> RenderTarget {
    let backend = cache.backend_mut();
    let color = backend.create_texture().unwrap();
    backend
        .define_texture(
            color,
            &TextureStorageDesc {
                width,
                height,
                layout: aero_surface_cache::FormatTable::storage_layout(
                    &aero_surface_cache::GxmFormatTable,
                    ColorBaseFormat::U8U8U8U8,
                ),
                filter: TextureFilter::Linear,
            },
        )
        .unwrap();
    let depth_stencil = backend.create_texture().unwrap();
    backend
        .define_texture(
            depth_stencil,
            &TextureStorageDesc {
                width,
                height,
                layout: TexelLayout::DEPTH_STENCIL,
                filter: TextureFilter::Nearest,
            },
        )
        .unwrap();

    let target = RenderTarget {
        width,
        height,
        color,
        depth_stencil,
    };
    cache.set_render_target(Some(target));
    target
}

/// Deterministic byte pattern; every byte differs from its neighbours.
#[allow(dead_code)]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}
