use std::time::Duration;

/// Default bound shared by the color cache and the depth-stencil pool.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default idle time after which a cast view is purged.
pub const DEFAULT_CAST_IDLE_TIMEOUT: Duration = Duration::from_secs(40);

/// Sentinel clear color applied once to freshly created framebuffers.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.968627450, 0.776470588, 0.0, 1.0];

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCacheConfig {
    /// Maximum resident color surfaces, and the number of depth-stencil slots.
    pub capacity: usize,
    pub cast_idle_timeout: Duration,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

impl SurfaceCacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_cast_idle_timeout(mut self, timeout: Duration) -> Self {
        self.cast_idle_timeout = timeout;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }
}

impl Default for SurfaceCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cast_idle_timeout: DEFAULT_CAST_IDLE_TIMEOUT,
            clear_color: DEFAULT_CLEAR_COLOR,
            clear_depth: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_never_drops_to_zero() {
        let config = SurfaceCacheConfig::default().with_capacity(0);
        assert_eq!(config.capacity, 1);
    }
}
