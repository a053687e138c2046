use std::sync::atomic::{AtomicU64, Ordering};

/// Telemetry counters for the surface cache.
///
/// Updated on the render thread; safe to read from elsewhere.
#[derive(Debug, Default)]
pub struct SurfaceCacheStats {
    color_hits: AtomicU64,
    color_misses: AtomicU64,
    color_evictions: AtomicU64,
    color_reshapes: AtomicU64,
    color_freed_inferred: AtomicU64,
    cast_views_created: AtomicU64,
    cast_views_reused: AtomicU64,
    cast_views_purged: AtomicU64,
    depth_stencil_hits: AtomicU64,
    depth_stencil_misses: AtomicU64,
    depth_stencil_recycles: AtomicU64,
    framebuffer_hits: AtomicU64,
    framebuffer_misses: AtomicU64,
    framebuffers_destroyed: AtomicU64,
    typeless_copies: AtomicU64,
    staging_bytes: AtomicU64,
}

macro_rules! counters {
    ($($inc:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $inc(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl SurfaceCacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    counters! {
        inc_color_hits => color_hits,
        inc_color_misses => color_misses,
        inc_color_evictions => color_evictions,
        inc_color_reshapes => color_reshapes,
        inc_color_freed_inferred => color_freed_inferred,
        inc_cast_views_created => cast_views_created,
        inc_cast_views_reused => cast_views_reused,
        inc_depth_stencil_hits => depth_stencil_hits,
        inc_depth_stencil_misses => depth_stencil_misses,
        inc_depth_stencil_recycles => depth_stencil_recycles,
        inc_framebuffer_hits => framebuffer_hits,
        inc_framebuffer_misses => framebuffer_misses,
        inc_typeless_copies => typeless_copies,
    }

    pub fn add_cast_views_purged(&self, count: u64) {
        self.cast_views_purged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_framebuffers_destroyed(&self, count: u64) {
        self.framebuffers_destroyed
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Staging buffer size is a gauge rather than a counter.
    pub fn set_staging_bytes(&self, bytes: u64) {
        self.staging_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> SurfaceCacheStatsSnapshot {
        SurfaceCacheStatsSnapshot {
            color_hits: self.color_hits.load(Ordering::Relaxed),
            color_misses: self.color_misses.load(Ordering::Relaxed),
            color_evictions: self.color_evictions.load(Ordering::Relaxed),
            color_reshapes: self.color_reshapes.load(Ordering::Relaxed),
            color_freed_inferred: self.color_freed_inferred.load(Ordering::Relaxed),
            cast_views_created: self.cast_views_created.load(Ordering::Relaxed),
            cast_views_reused: self.cast_views_reused.load(Ordering::Relaxed),
            cast_views_purged: self.cast_views_purged.load(Ordering::Relaxed),
            depth_stencil_hits: self.depth_stencil_hits.load(Ordering::Relaxed),
            depth_stencil_misses: self.depth_stencil_misses.load(Ordering::Relaxed),
            depth_stencil_recycles: self.depth_stencil_recycles.load(Ordering::Relaxed),
            framebuffer_hits: self.framebuffer_hits.load(Ordering::Relaxed),
            framebuffer_misses: self.framebuffer_misses.load(Ordering::Relaxed),
            framebuffers_destroyed: self.framebuffers_destroyed.load(Ordering::Relaxed),
            typeless_copies: self.typeless_copies.load(Ordering::Relaxed),
            staging_bytes: self.staging_bytes.load(Ordering::Relaxed),
        }
    }

    /// Returns a JSON object as a string.
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceCacheStatsSnapshot {
    pub color_hits: u64,
    pub color_misses: u64,
    pub color_evictions: u64,
    pub color_reshapes: u64,
    pub color_freed_inferred: u64,
    pub cast_views_created: u64,
    pub cast_views_reused: u64,
    pub cast_views_purged: u64,
    pub depth_stencil_hits: u64,
    pub depth_stencil_misses: u64,
    pub depth_stencil_recycles: u64,
    pub framebuffer_hits: u64,
    pub framebuffer_misses: u64,
    pub framebuffers_destroyed: u64,
    pub typeless_copies: u64,
    pub staging_bytes: u64,
}

impl SurfaceCacheStatsSnapshot {
    pub fn to_json(&self) -> String {
        // Hand-built to keep serde out of the render path.
        format!(
            "{{\"color_hits\":{},\"color_misses\":{},\"color_evictions\":{},\"color_reshapes\":{},\
             \"color_freed_inferred\":{},\"cast_views_created\":{},\"cast_views_reused\":{},\
             \"cast_views_purged\":{},\"depth_stencil_hits\":{},\"depth_stencil_misses\":{},\
             \"depth_stencil_recycles\":{},\"framebuffer_hits\":{},\"framebuffer_misses\":{},\
             \"framebuffers_destroyed\":{},\"typeless_copies\":{},\"staging_bytes\":{}}}",
            self.color_hits,
            self.color_misses,
            self.color_evictions,
            self.color_reshapes,
            self.color_freed_inferred,
            self.cast_views_created,
            self.cast_views_reused,
            self.cast_views_purged,
            self.depth_stencil_hits,
            self.depth_stencil_misses,
            self.depth_stencil_recycles,
            self.framebuffer_hits,
            self.framebuffer_misses,
            self.framebuffers_destroyed,
            self.typeless_copies,
            self.staging_bytes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_contains_counters() {
        let stats = SurfaceCacheStats::new();
        stats.inc_color_hits();
        stats.inc_color_hits();
        stats.add_cast_views_purged(3);
        stats.set_staging_bytes(4096);

        let snap = stats.snapshot();
        assert_eq!(snap.color_hits, 2);
        assert_eq!(snap.cast_views_purged, 3);

        let json = stats.to_json();
        assert!(json.starts_with('{') && json.ends_with('}'));
        assert!(json.contains("\"color_hits\":2"));
        assert!(json.contains("\"staging_bytes\":4096"));
    }
}
