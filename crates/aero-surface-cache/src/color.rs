//! Address-keyed cache of guest color surfaces.
//!
//! The guest never says when a surface dies. Ownership is inferred from address arithmetic: the
//! entry owning a byte is the one with the greatest base `<= address` whose range still covers
//! it. Entries never overlap; creating or growing one retires everything it overlaps.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::backend::{RegionCopy, SurfaceBackend, TextureFilter, TextureRegion, TextureStorageDesc};
use crate::cache::CacheEnv;
use crate::error::{Result, SurfaceCacheError};
use crate::format::{
    cast_compatibility, CastCompatibility, ColorBaseFormat, FormatTable, TexelLayout,
};
use crate::handle::TextureId;
use crate::recency::RecencyList;
use crate::surface::ColorSurfaceRequest;
use crate::typeless::TypelessCopy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Live,
    /// Retired by an aliasing rule; destroyed before the current operation returns.
    StalePendingEviction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StaleReason {
    /// A write landed inside the surface at a different base: the guest reallocated the memory.
    Freed,
    OutOfRange,
    /// A new surface was created over part of this one.
    Overlapped,
}

/// Backing storage of a color surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceStorage {
    /// Rendered into and sampled from the same texture.
    Filterable { texture: TextureId },
    /// Rendered into an opaque integer texture; reads go through `read_view`, a filterable
    /// texture refreshed from the primary on every read.
    Raw {
        texture: TextureId,
        read_view: TextureId,
    },
}

impl SurfaceStorage {
    fn primary(&self) -> TextureId {
        match *self {
            SurfaceStorage::Filterable { texture } | SurfaceStorage::Raw { texture, .. } => texture,
        }
    }

    fn read_view(&self) -> Option<TextureId> {
        match *self {
            SurfaceStorage::Filterable { .. } => None,
            SurfaceStorage::Raw { read_view, .. } => Some(read_view),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CastedView {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    format: ColorBaseFormat,
    texture: TextureId,
    last_used: Duration,
}

#[derive(Debug)]
struct ColorSurfaceEntry {
    base: u32,
    width: u32,
    height: u32,
    stride: u32,
    format: ColorBaseFormat,
    /// Always `stride * bytes_per_pixel(format) * height`.
    total_bytes: u64,
    dirty: bool,
    liveness: Liveness,
    storage: SurfaceStorage,
    ping_pong: Option<TextureId>,
    casts: Vec<CastedView>,
}

impl ColorSurfaceEntry {
    fn end(&self) -> u64 {
        u64::from(self.base) + self.total_bytes
    }

    fn owned_textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.casts
            .iter()
            .map(|view| view.texture)
            .chain(self.ping_pong)
            .chain(self.storage.read_view())
            .chain(std::iter::once(self.storage.primary()))
    }

    fn info(&self) -> ColorSurfaceInfo {
        ColorSurfaceInfo {
            address: self.base,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            total_bytes: self.total_bytes,
            dirty: self.dirty,
            texture: self.storage.primary(),
            read_view: self.storage.read_view(),
            ping_pong: self.ping_pong,
            cast_views: self.casts.len(),
        }
    }
}

/// Read-only description of a resident color surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSurfaceInfo {
    pub address: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: ColorBaseFormat,
    pub total_bytes: u64,
    pub dirty: bool,
    pub texture: TextureId,
    pub read_view: Option<TextureId>,
    pub ping_pong: Option<TextureId>,
    pub cast_views: usize,
}

/// The source side of a cast: a snapshot of the parent entry.
#[derive(Debug, Clone, Copy)]
struct CastSource {
    texture: TextureId,
    layout: TexelLayout,
    format: ColorBaseFormat,
    width: u32,
    height: u32,
    total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Crop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn request_bytes(formats: &(impl FormatTable + ?Sized), req: &ColorSurfaceRequest) -> u64 {
    u64::from(req.stride)
        * u64::from(formats.logical_bytes_per_pixel(req.format))
        * u64::from(req.height)
}

fn check_extent(req: &ColorSurfaceRequest) -> Result<()> {
    if req.is_empty() {
        error!(
            address = format_args!("0x{:x}", req.address),
            width = req.width,
            height = req.height,
            stride = req.stride,
            "color surface request has an empty extent"
        );
        return Err(SurfaceCacheError::EmptySurface {
            address: req.address,
            width: req.width,
            height: req.height,
            stride: req.stride,
        });
    }
    Ok(())
}

fn storage_descs(
    formats: &(impl FormatTable + ?Sized),
    req: &ColorSurfaceRequest,
) -> (TextureStorageDesc, TextureStorageDesc) {
    let raw = formats.is_raw_stored(req.format);
    let primary = TextureStorageDesc {
        width: req.width,
        height: req.height,
        layout: formats.primary_layout(req.format),
        filter: if raw {
            TextureFilter::Nearest
        } else {
            TextureFilter::Linear
        },
    };
    let view = TextureStorageDesc {
        layout: formats.storage_layout(req.format),
        filter: TextureFilter::Linear,
        ..primary
    };
    (primary, view)
}

fn destroy_quietly<B: SurfaceBackend + ?Sized>(backend: &mut B, texture: TextureId) {
    if let Err(err) = backend.destroy_texture(texture) {
        warn!(texture = ?texture, %err, "failed to destroy color surface texture");
    }
}

/// Creates and defines a texture, destroying it again if definition fails.
fn new_texture<B: SurfaceBackend + ?Sized>(
    backend: &mut B,
    desc: &TextureStorageDesc,
) -> Result<TextureId> {
    let texture = backend.create_texture()?;
    if let Err(err) = backend.define_texture(texture, desc) {
        destroy_quietly(backend, texture);
        return Err(err.into());
    }
    Ok(texture)
}

#[derive(Debug, Default)]
pub(crate) struct ColorSurfaceCache {
    entries: BTreeMap<u32, ColorSurfaceEntry>,
    recency: RecencyList<u32>,
}

impl ColorSurfaceCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The entry whose byte range contains `address`.
    fn lookup(&self, address: u32) -> Option<&ColorSurfaceEntry> {
        let (_, entry) = self.entries.range(..=address).next_back()?;
        (entry.liveness == Liveness::Live && u64::from(address) < entry.end()).then_some(entry)
    }

    pub(crate) fn info(&self, address: u32) -> Option<ColorSurfaceInfo> {
        self.lookup(address).map(ColorSurfaceEntry::info)
    }

    pub(crate) fn resident(&self) -> Vec<ColorSurfaceInfo> {
        self.entries.values().map(ColorSurfaceEntry::info).collect()
    }

    /// Resident addresses from least to most recently used.
    pub(crate) fn recency_order(&self) -> Vec<u32> {
        self.recency.iter().collect()
    }

    pub(crate) fn extent(&self, address: u32) -> Option<(u32, u32)> {
        self.lookup(address).map(|entry| (entry.width, entry.height))
    }

    pub(crate) fn set_dirty(&mut self, address: u32, dirty: bool) -> Result<()> {
        let base = self
            .lookup(address)
            .map(|entry| entry.base)
            .ok_or(SurfaceCacheError::NotCached { address })?;
        if let Some(entry) = self.entries.get_mut(&base) {
            entry.dirty = dirty;
        }
        Ok(())
    }

    pub(crate) fn retrieve_for_write<B, T>(
        &mut self,
        env: &mut CacheEnv<'_, B, T>,
        req: &ColorSurfaceRequest,
    ) -> Result<TextureId>
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        check_extent(req)?;
        let request_end = u64::from(req.address) + request_bytes(env.formats, req);

        if let Some(entry) = self.lookup(req.address) {
            let base = entry.base;
            let fits = request_end <= entry.end();
            let reshaped = req.width > entry.width
                || req.height > entry.height
                || req.format != entry.format;
            let primary = entry.storage.primary();

            if base != req.address {
                if fits {
                    env.stats.inc_color_freed_inferred();
                    self.retire(env, base, StaleReason::Freed);
                } else {
                    self.retire(env, base, StaleReason::OutOfRange);
                }
            } else if reshaped {
                self.reshape(env, base, req)?;
                self.recency.touch(base);
                return Ok(primary);
            } else if !fits {
                self.retire(env, base, StaleReason::OutOfRange);
            } else {
                self.recency.touch(base);
                env.stats.inc_color_hits();
                return Ok(primary);
            }
        }

        env.stats.inc_color_misses();
        self.create_entry(env, req)
    }

    pub(crate) fn retrieve_for_read<B, T>(
        &mut self,
        env: &mut CacheEnv<'_, B, T>,
        req: &ColorSurfaceRequest,
    ) -> Result<TextureId>
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        check_extent(req)?;
        let address = req.address;

        let Some(entry) = self.lookup(address) else {
            env.stats.inc_color_misses();
            debug!(address = format_args!("0x{address:x}"), "read of uncached color surface");
            return Err(SurfaceCacheError::NotCached { address });
        };
        let base = entry.base;

        // Same surface, same format, larger extent: the guest grew the surface in place.
        if base == address
            && req.format == entry.format
            && (req.width > entry.width || req.height > entry.height)
        {
            self.reshape(env, base, req)?;
        }

        let Some(entry) = self.entries.get_mut(&base) else {
            return Err(SurfaceCacheError::NotCached { address });
        };
        if u64::from(address) + request_bytes(env.formats, req) > entry.end() {
            env.stats.inc_color_misses();
            error!(
                address = format_args!("0x{address:x}"),
                base = format_args!("0x{base:x}"),
                "color surface read extends past the cached surface"
            );
            return Err(SurfaceCacheError::OutOfRange { address, base });
        }

        self.recency.touch(base);

        if entry.dirty {
            debug!(base = format_args!("0x{base:x}"), "refusing read of dirty color surface");
            return Err(SurfaceCacheError::Dirty { base });
        }

        match cast_compatibility(env.formats, req.format, req.stride, entry.format, entry.stride) {
            CastCompatibility::Compatible => {}
            CastCompatibility::NotCastable => {
                error!(
                    requested = format_args!("0x{:X}", req.format.code()),
                    stored = format_args!("0x{:X}", entry.format.code()),
                    "color surface formats are not castable"
                );
                return Err(SurfaceCacheError::NotCastable {
                    requested: req.format,
                    requested_stride: req.stride,
                    stored: entry.format,
                    stored_stride: entry.stride,
                });
            }
            CastCompatibility::PaddedStorage => {
                error!(
                    requested = format_args!("0x{:X}", req.format.code()),
                    stored = format_args!("0x{:X}", entry.format.code()),
                    "color surface formats do not support bit-casting in backing storage"
                );
                return Err(SurfaceCacheError::PaddedStorage {
                    requested: req.format,
                    stored: entry.format,
                });
            }
        }

        let bpp = u64::from(env.formats.logical_bytes_per_pixel(req.format));
        let row_bytes = u64::from(req.stride) * bpp;
        let delta = u64::from(address - base);
        let start_line = delta / row_bytes;
        let start_x = (delta % row_bytes) / bpp;

        let end_line = start_line + u64::from(req.height);
        if end_line > u64::from(entry.height) {
            error!(
                base = format_args!("0x{base:x}"),
                start_line,
                height = req.height,
                stored_height = entry.height,
                "read of non-existent segment in cached color surface"
            );
            return Err(SurfaceCacheError::SegmentOutOfBounds {
                base,
                start_line: start_line as u32,
                end_line: end_line.min(u64::from(u32::MAX)) as u32,
                stored_height: entry.height,
            });
        }
        // Both fit in u32: start_line < height and start_x < stride.
        let crop = Crop {
            x: start_x as u32,
            y: start_line as u32,
            width: req.width,
            height: req.height,
        };

        env.stats.inc_color_hits();

        if delta == 0
            && req.width == entry.width
            && req.height == entry.height
            && req.format == entry.format
        {
            return match entry.storage {
                SurfaceStorage::Filterable { texture } => Ok(texture),
                SurfaceStorage::Raw { texture, read_view } => {
                    env.backend.copy_texture_region(
                        texture,
                        read_view,
                        &RegionCopy::whole(entry.width, entry.height),
                    )?;
                    Ok(read_view)
                }
            };
        }

        Self::cast_view(env, entry, crop, req.format)
    }

    /// Serves a cropped and/or reinterpreted view of `entry`, reusing a matching child.
    fn cast_view<B, T>(
        env: &mut CacheEnv<'_, B, T>,
        entry: &mut ColorSurfaceEntry,
        crop: Crop,
        format: ColorBaseFormat,
    ) -> Result<TextureId>
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let now = env.now;
        let timeout = env.config.cast_idle_timeout;

        let mut purged = Vec::new();
        entry.casts.retain(|view| {
            let idle = now.saturating_sub(view.last_used) >= timeout;
            if idle {
                purged.push(view.texture);
            }
            !idle
        });
        if !purged.is_empty() {
            debug!(
                base = format_args!("0x{:x}", entry.base),
                count = purged.len(),
                "purging idle cast views"
            );
            env.stats.add_cast_views_purged(purged.len() as u64);
            for texture in purged {
                destroy_quietly(&mut *env.backend, texture);
            }
        }

        let source = CastSource {
            texture: entry.storage.primary(),
            layout: env.formats.primary_layout(entry.format),
            format: entry.format,
            width: entry.width,
            height: entry.height,
            total_bytes: entry.total_bytes,
        };

        if let Some(view) = entry.casts.iter_mut().find(|view| {
            view.format == format
                && (view.x, view.y, view.width, view.height)
                    == (crop.x, crop.y, crop.width, crop.height)
        }) {
            populate_cast(env, &source, view.texture, crop, format, false)?;
            view.last_used = now;
            env.stats.inc_cast_views_reused();
            return Ok(view.texture);
        }

        let texture = env.backend.create_texture().map_err(|err| {
            error!(%err, "failed to create cast color surface texture");
            SurfaceCacheError::from(err)
        })?;
        if let Err(err) = populate_cast(env, &source, texture, crop, format, true) {
            destroy_quietly(&mut *env.backend, texture);
            return Err(err);
        }

        entry.casts.push(CastedView {
            x: crop.x,
            y: crop.y,
            width: crop.width,
            height: crop.height,
            format,
            texture,
            last_used: now,
        });
        env.stats.inc_cast_views_created();
        debug!(
            base = format_args!("0x{:x}", entry.base),
            texture = ?texture,
            x = crop.x,
            y = crop.y,
            width = crop.width,
            height = crop.height,
            format = %format,
            "created cast view"
        );
        Ok(texture)
    }

    pub(crate) fn retrieve_ping_pong<B, T>(
        &mut self,
        env: &mut CacheEnv<'_, B, T>,
        address: u32,
    ) -> Result<TextureId>
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let Some(entry) = self.entries.get_mut(&address) else {
            error!(
                address = format_args!("0x{address:x}"),
                "no color surface for ping-pong duplicate"
            );
            return Err(SurfaceCacheError::NotCached { address });
        };

        let duplicate = match entry.ping_pong {
            Some(texture) => texture,
            None => {
                let desc = TextureStorageDesc {
                    width: entry.width,
                    height: entry.height,
                    layout: env.formats.storage_layout(entry.format),
                    filter: TextureFilter::Linear,
                };
                let texture = new_texture(&mut *env.backend, &desc).map_err(|err| {
                    error!(%err, "failed to initialise ping-pong surface texture");
                    err
                })?;
                entry.ping_pong = Some(texture);
                texture
            }
        };

        env.backend.copy_texture_region(
            entry.storage.primary(),
            duplicate,
            &RegionCopy::whole(entry.width, entry.height),
        )?;
        Ok(duplicate)
    }

    /// Re-specifies an entry's storage for a new extent/format. Key and primary handle survive;
    /// cast views and framebuffers bound to the old storage do not.
    fn reshape<B, T>(
        &mut self,
        env: &mut CacheEnv<'_, B, T>,
        base: u32,
        req: &ColorSurfaceRequest,
    ) -> Result<()>
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let Some(entry) = self.entries.get_mut(&base) else {
            return Err(SurfaceCacheError::NotCached { address: base });
        };

        env.framebuffers
            .remove_referencing_color(&mut *env.backend, env.stats, entry.storage.primary());
        if !entry.casts.is_empty() {
            env.stats.add_cast_views_purged(entry.casts.len() as u64);
            for view in entry.casts.drain(..) {
                destroy_quietly(&mut *env.backend, view.texture);
            }
        }

        match respecify(env, entry, req) {
            Ok(storage) => {
                debug!(
                    base = format_args!("0x{base:x}"),
                    old_width = entry.width,
                    old_height = entry.height,
                    width = req.width,
                    height = req.height,
                    format = %req.format,
                    "reshaped color surface in place"
                );
                entry.storage = storage;
                entry.width = req.width;
                entry.height = req.height;
                entry.stride = req.stride;
                entry.format = req.format;
                entry.total_bytes = request_bytes(env.formats, req);
                entry.dirty = false;
                entry.liveness = Liveness::Live;
                env.stats.inc_color_reshapes();
            }
            Err(err) => {
                error!(base = format_args!("0x{base:x}"), %err, "failed to reshape color surface");
                self.remove_entry(env, base);
                return Err(err);
            }
        }

        // A grown surface swallows whatever it now overlaps.
        let end = u64::from(base) + request_bytes(env.formats, req);
        self.retire_overlapping(env, u64::from(base), end, Some(base));
        Ok(())
    }

    fn create_entry<B, T>(
        &mut self,
        env: &mut CacheEnv<'_, B, T>,
        req: &ColorSurfaceRequest,
    ) -> Result<TextureId>
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let address = req.address;
        let total_bytes = request_bytes(env.formats, req);
        self.retire_overlapping(env, u64::from(address), u64::from(address) + total_bytes, None);

        let (primary_desc, view_desc) = storage_descs(env.formats, req);
        let texture = new_texture(&mut *env.backend, &primary_desc).map_err(|err| {
            error!(
                address = format_args!("0x{address:x}"),
                %err,
                "failed to initialise color surface texture"
            );
            err
        })?;
        let storage = if env.formats.is_raw_stored(req.format) {
            match new_texture(&mut *env.backend, &view_desc) {
                Ok(read_view) => SurfaceStorage::Raw { texture, read_view },
                Err(err) => {
                    error!(
                        address = format_args!("0x{address:x}"),
                        %err,
                        "failed to initialise color surface read view"
                    );
                    destroy_quietly(&mut *env.backend, texture);
                    return Err(err);
                }
            }
        } else {
            SurfaceStorage::Filterable { texture }
        };

        if self.recency.len() >= env.config.capacity {
            if let Some(victim) = self.recency.front() {
                env.stats.inc_color_evictions();
                debug!(
                    victim = format_args!("0x{victim:x}"),
                    "evicting least recently used color surface"
                );
                self.remove_entry(env, victim);
            }
        }

        self.entries.insert(
            address,
            ColorSurfaceEntry {
                base: address,
                width: req.width,
                height: req.height,
                stride: req.stride,
                format: req.format,
                total_bytes,
                dirty: false,
                liveness: Liveness::Live,
                storage,
                ping_pong: None,
                casts: Vec::new(),
            },
        );
        self.recency.touch(address);
        debug!(
            address = format_args!("0x{address:x}"),
            width = req.width,
            height = req.height,
            stride = req.stride,
            format = %req.format,
            texture = ?texture,
            "created color surface"
        );
        Ok(texture)
    }

    /// Retires every entry intersecting `[start, end)` other than `keep`.
    fn retire_overlapping<B, T>(
        &mut self,
        env: &mut CacheEnv<'_, B, T>,
        start: u64,
        end: u64,
        keep: Option<u32>,
    ) where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let overlapping: Vec<u32> = self
            .entries
            .values()
            .take_while(|entry| u64::from(entry.base) < end)
            .filter(|entry| entry.end() > start && Some(entry.base) != keep)
            .map(|entry| entry.base)
            .collect();
        for base in overlapping {
            self.retire(env, base, StaleReason::Overlapped);
        }
    }

    fn retire<B, T>(&mut self, env: &mut CacheEnv<'_, B, T>, base: u32, reason: StaleReason)
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        if let Some(entry) = self.entries.get_mut(&base) {
            entry.liveness = Liveness::StalePendingEviction;
            debug!(base = format_args!("0x{base:x}"), ?reason, "color surface is stale");
        }
        self.remove_entry(env, base);
    }

    /// Destroys an entry: framebuffers first, then every texture it owns.
    fn remove_entry<B, T>(&mut self, env: &mut CacheEnv<'_, B, T>, base: u32)
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let Some(entry) = self.entries.remove(&base) else {
            return;
        };
        self.recency.remove(&base);
        env.framebuffers
            .remove_referencing_color(&mut *env.backend, env.stats, entry.storage.primary());
        for texture in entry.owned_textures() {
            destroy_quietly(&mut *env.backend, texture);
        }
    }

    pub(crate) fn clear<B, T>(&mut self, env: &mut CacheEnv<'_, B, T>)
    where
        B: SurfaceBackend + ?Sized,
        T: FormatTable + ?Sized,
    {
        let bases: Vec<u32> = self.entries.keys().copied().collect();
        for base in bases {
            self.remove_entry(env, base);
        }
    }

    /// Drops all bookkeeping without touching the backing store.
    pub(crate) fn forget(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

/// Re-specifies every texture of `entry` for `req`, returning the storage variant to adopt.
fn respecify<B, T>(
    env: &mut CacheEnv<'_, B, T>,
    entry: &ColorSurfaceEntry,
    req: &ColorSurfaceRequest,
) -> Result<SurfaceStorage>
where
    B: SurfaceBackend + ?Sized,
    T: FormatTable + ?Sized,
{
    let (primary_desc, view_desc) = storage_descs(env.formats, req);
    let raw = env.formats.is_raw_stored(req.format);
    let backend = &mut *env.backend;

    backend.define_texture(entry.storage.primary(), &primary_desc)?;
    if let Some(duplicate) = entry.ping_pong {
        backend.define_texture(duplicate, &view_desc)?;
    }

    let storage = match (entry.storage, raw) {
        (SurfaceStorage::Filterable { texture }, false) => SurfaceStorage::Filterable { texture },
        (SurfaceStorage::Raw { texture, read_view }, true) => {
            backend.define_texture(read_view, &view_desc)?;
            SurfaceStorage::Raw { texture, read_view }
        }
        (SurfaceStorage::Filterable { texture }, true) => SurfaceStorage::Raw {
            texture,
            read_view: new_texture(backend, &view_desc)?,
        },
        (SurfaceStorage::Raw { texture, read_view }, false) => {
            destroy_quietly(backend, read_view);
            SurfaceStorage::Filterable { texture }
        }
    };
    Ok(storage)
}

/// Fills a cast view from its parent.
///
/// Equal backing texel sizes allow a direct region copy. Otherwise the bytes are relayed through
/// the staging buffer, with the crop converted to source texels.
fn populate_cast<B, T>(
    env: &mut CacheEnv<'_, B, T>,
    source: &CastSource,
    dest: TextureId,
    crop: Crop,
    format: ColorBaseFormat,
    define: bool,
) -> Result<()>
where
    B: SurfaceBackend + ?Sized,
    T: FormatTable + ?Sized,
{
    let dest_desc = TextureStorageDesc {
        width: crop.width,
        height: crop.height,
        layout: env.formats.storage_layout(format),
        filter: TextureFilter::Linear,
    };
    let height = crop.height.min(source.height.saturating_sub(crop.y));

    if env.formats.backing_bytes_per_pixel(format)
        == env.formats.backing_bytes_per_pixel(source.format)
    {
        if define {
            env.backend.define_texture(dest, &dest_desc)?;
        }
        let width = crop.width.min(source.width.saturating_sub(crop.x));
        if width > 0 && height > 0 {
            env.backend.copy_texture_region(
                source.texture,
                dest,
                &RegionCopy {
                    src_x: crop.x,
                    src_y: crop.y,
                    dst_x: 0,
                    dst_y: 0,
                    width,
                    height,
                },
            )?;
        }
        return Ok(());
    }

    let requested = u64::from(env.formats.logical_bytes_per_pixel(format));
    let stored = u64::from(env.formats.logical_bytes_per_pixel(source.format));
    let src_x = (u64::from(crop.x) * requested / stored).min(u64::from(source.width)) as u32;
    let src_width = (u64::from(crop.width) * requested)
        .div_ceil(stored)
        .min(u64::from(source.width - src_x)) as u32;
    if src_width == 0 || height == 0 {
        env.backend.define_texture(dest, &dest_desc)?;
        return Ok(());
    }

    let copy = TypelessCopy {
        dest,
        source: source.texture,
        dest_desc,
        source_layout: source.layout,
        region: TextureRegion {
            x: src_x,
            y: crop.y,
            width: src_width,
            height,
        },
        total_source_bytes: source.total_bytes,
    };
    env.staging.copy(&mut *env.backend, env.stats, &copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceCacheConfig;
    use crate::framebuffer::FramebufferCache;
    use crate::stats::SurfaceCacheStats;
    use crate::typeless::TypelessCopier;
    use crate::{GxmFormatTable, SoftSurfaceBackend};

    struct Harness {
        backend: SoftSurfaceBackend,
        framebuffers: FramebufferCache,
        staging: TypelessCopier,
        stats: SurfaceCacheStats,
        config: SurfaceCacheConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                backend: SoftSurfaceBackend::new(),
                framebuffers: FramebufferCache::new(),
                staging: TypelessCopier::new(),
                stats: SurfaceCacheStats::new(),
                config: SurfaceCacheConfig::default(),
            }
        }

        fn env(&mut self) -> CacheEnv<'_, SoftSurfaceBackend, GxmFormatTable> {
            CacheEnv {
                backend: &mut self.backend,
                formats: &GxmFormatTable,
                framebuffers: &mut self.framebuffers,
                staging: &mut self.staging,
                stats: &self.stats,
                config: &self.config,
                now: Duration::ZERO,
            }
        }
    }

    fn rgba(address: u32, width: u32, height: u32) -> ColorSurfaceRequest {
        ColorSurfaceRequest::new(address, width, height, width, ColorBaseFormat::U8U8U8U8)
    }

    #[test]
    fn lookup_is_exact_containment() {
        let mut h = Harness::new();
        let mut cache = ColorSurfaceCache::new();
        cache.retrieve_for_write(&mut h.env(), &rgba(0x1000, 4, 4)).unwrap();

        assert!(cache.lookup(0x0fff).is_none());
        assert_eq!(cache.lookup(0x1000).map(|e| e.base), Some(0x1000));
        assert_eq!(cache.lookup(0x103f).map(|e| e.base), Some(0x1000));
        assert!(cache.lookup(0x1040).is_none());
    }

    #[test]
    fn overlapping_creation_retires_neighbours() {
        let mut h = Harness::new();
        let mut cache = ColorSurfaceCache::new();
        cache.retrieve_for_write(&mut h.env(), &rgba(0x2000, 4, 4)).unwrap();
        // Starts before 0x2000 and runs into it.
        cache.retrieve_for_write(&mut h.env(), &rgba(0x1ff0, 4, 4)).unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.info(0x2000).is_some_and(|info| info.address == 0x1ff0));
        assert_eq!(h.backend.live_textures(), 1);
    }

    #[test]
    fn failed_read_view_allocation_rolls_back() {
        let mut h = Harness::new();
        let mut cache = ColorSurfaceCache::new();
        let req = ColorSurfaceRequest::new(0x4000, 8, 8, 8, ColorBaseFormat::F16F16F16F16);

        // The primary texture is created, the read view is not.
        h.backend.fail_allocations_after(1, 1);
        let err = cache.retrieve_for_write(&mut h.env(), &req).unwrap_err();
        assert!(matches!(err, SurfaceCacheError::Backend(_)));
        assert_eq!(cache.len(), 0);
        assert_eq!(h.backend.live_textures(), 0);

        cache.retrieve_for_write(&mut h.env(), &req).unwrap();
        assert!(cache.info(0x4000).and_then(|info| info.read_view).is_some());
    }
}
