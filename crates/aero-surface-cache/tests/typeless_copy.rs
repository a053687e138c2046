mod common;

use aero_surface_cache::{
    BackendError, ColorBaseFormat, FormatTable, GxmFormatTable, SurfaceBackend, SurfaceCacheConfig,
    SurfaceCacheError, TextureFilter, TextureId, TextureRegion, TextureStorageDesc, TypelessCopy,
};
use pretty_assertions::assert_eq;

use common::{pattern, soft_cache, SoftCache};

fn defined_texture(
    cache: &mut SoftCache,
    format: ColorBaseFormat,
    width: u32,
    height: u32,
) -> TextureId {
    let backend = cache.backend_mut();
    let texture = backend.create_texture().unwrap();
    backend
        .define_texture(
            texture,
            &TextureStorageDesc {
                width,
                height,
                layout: GxmFormatTable.primary_layout(format),
                filter: TextureFilter::Linear,
            },
        )
        .unwrap();
    texture
}

fn half_float_copy(
    source: TextureId,
    dest: TextureId,
    region: TextureRegion,
    total_source_bytes: u64,
) -> TypelessCopy {
    TypelessCopy {
        dest,
        source,
        dest_desc: TextureStorageDesc {
            width: region.width / 2,
            height: region.height,
            layout: GxmFormatTable.storage_layout(ColorBaseFormat::F16F16F16F16),
            filter: TextureFilter::Linear,
        },
        source_layout: GxmFormatTable.primary_layout(ColorBaseFormat::U8U8U8U8),
        region,
        total_source_bytes,
    }
}

#[test]
fn bytes_are_relayed_unchanged() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    let source = defined_texture(&mut cache, ColorBaseFormat::U8U8U8U8, 4, 2);
    let data = pattern(4 * 2 * 4);
    cache.backend_mut().write_texture_data(source, &data).unwrap();
    let dest = cache.backend_mut().create_texture().unwrap();

    let region = TextureRegion {
        x: 0,
        y: 0,
        width: 4,
        height: 2,
    };
    cache.typeless_copy(&half_float_copy(source, dest, region, 32)).unwrap();

    let storage = cache.backend().texture_storage(dest).unwrap();
    assert_eq!((storage.width, storage.height), (2, 2));
    assert_eq!(cache.backend().texture_data(dest), Some(data.as_slice()));
    assert_eq!(cache.stats().snapshot().typeless_copies, 1);
}

#[test]
fn staging_buffer_grows_but_never_shrinks() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    let source = defined_texture(&mut cache, ColorBaseFormat::U8U8U8U8, 8, 8);
    let dest = cache.backend_mut().create_texture().unwrap();
    let region = TextureRegion {
        x: 0,
        y: 0,
        width: 8,
        height: 2,
    };

    cache.typeless_copy(&half_float_copy(source, dest, region, 64)).unwrap();
    assert_eq!(cache.staging_buffer_size(), 64);
    cache.typeless_copy(&half_float_copy(source, dest, region, 256)).unwrap();
    assert_eq!(cache.staging_buffer_size(), 256);
    // The readback itself needs 64 bytes; the declared total is smaller still.
    cache.typeless_copy(&half_float_copy(source, dest, region, 16)).unwrap();
    assert_eq!(cache.staging_buffer_size(), 256);

    assert_eq!(cache.backend().live_buffers(), 1);
    assert_eq!(cache.stats().snapshot().staging_bytes, 256);
}

#[test]
fn undefined_source_is_a_backend_error() {
    let (mut cache, _) = soft_cache(SurfaceCacheConfig::default());
    let source = cache.backend_mut().create_texture().unwrap();
    let dest = cache.backend_mut().create_texture().unwrap();
    let region = TextureRegion {
        x: 0,
        y: 0,
        width: 2,
        height: 2,
    };

    let err = cache
        .typeless_copy(&half_float_copy(source, dest, region, 16))
        .unwrap_err();
    assert!(matches!(
        err,
        SurfaceCacheError::Backend(BackendError::InvalidResource(_))
    ));
    assert_eq!(cache.stats().snapshot().typeless_copies, 0);
}
