//! Opaque backing-store object identifiers.
//!
//! Every object handed out by a [`crate::SurfaceBackend`] is identified by a non-zero 32-bit id.
//! The renderer-facing ABI reserves `0` as the "unavailable" sentinel; [`HandleOrZero`] converts a
//! retrieval result into that raw form at the boundary.

use core::fmt;
use core::num::NonZeroU32;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            pub const fn new(raw: NonZeroU32) -> Self {
                Self(raw)
            }

            /// Builds a handle from a raw value; `0` yields `None`.
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            pub const fn get(self) -> u32 {
                self.0.get()
            }

            /// The 64-bit opaque value used by the renderer ABI.
            pub const fn raw(self) -> u64 {
                self.0.get() as u64
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> u64 {
                value.raw()
            }
        }
    };
}

define_handle!(
    /// A host texture owned by the backing store.
    TextureId,
    "tex"
);
define_handle!(
    /// A host buffer owned by the backing store (only the typeless staging buffer today).
    BufferId,
    "buf"
);
define_handle!(
    /// A host framebuffer (attachment set) owned by the backing store.
    FramebufferId,
    "fb"
);

/// Monotonic id allocator shared by the backing-store implementations.
#[derive(Debug, Clone)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn allocate(&mut self) -> Option<NonZeroU32> {
        let id = NonZeroU32::new(self.next)?;
        self.next = self.next.checked_add(1)?;
        Some(id)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapses a retrieval result into the raw handle ABI, where `0` means "skip this draw".
pub trait HandleOrZero {
    fn or_zero(&self) -> u64;
}

impl<H, E> HandleOrZero for Result<H, E>
where
    H: Copy + Into<u64>,
{
    fn or_zero(&self) -> u64 {
        match self {
            Ok(handle) => (*handle).into(),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_never_a_handle() {
        assert!(TextureId::from_raw(0).is_none());
        assert_eq!(TextureId::from_raw(7).map(TextureId::raw), Some(7));
    }

    #[test]
    fn failed_results_collapse_to_zero() {
        let ok: Result<TextureId, ()> = Ok(TextureId::from_raw(3).unwrap());
        let err: Result<TextureId, ()> = Err(());
        assert_eq!(ok.or_zero(), 3);
        assert_eq!(err.or_zero(), 0);
    }

    #[test]
    fn allocator_starts_at_one() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate().map(NonZeroU32::get), Some(1));
        assert_eq!(ids.allocate().map(NonZeroU32::get), Some(2));
    }
}
