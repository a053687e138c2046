use crate::format::ColorBaseFormat;

/// Failure reported by a [`crate::SurfaceBackend`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backing store is out of memory: {0}")]
    OutOfMemory(String),
    #[error("invalid backing-store resource: {0}")]
    InvalidResource(String),
    #[error("unsupported backing-store operation: {0}")]
    Unsupported(String),
    #[error("backing-store failure: {0}")]
    Internal(String),
}

/// Why a surface retrieval could not produce a handle.
///
/// None of these are fatal; callers speaking the raw handle ABI map every variant to `0` and
/// skip the dependent draw.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceCacheError {
    #[error("no render target is active")]
    NoRenderTarget,
    #[error("framebuffer retrieval needs a color or depth-stencil surface")]
    NoSurfaces,
    #[error("surface at 0x{address:x} has an empty extent ({width}x{height}, stride {stride})")]
    EmptySurface {
        address: u32,
        width: u32,
        height: u32,
        stride: u32,
    },
    #[error("no cached surface covers 0x{address:x}")]
    NotCached { address: u32 },
    #[error("request at 0x{address:x} extends past the surface at 0x{base:x}")]
    OutOfRange { address: u32, base: u32 },
    #[error("surface at 0x{base:x} is dirty")]
    Dirty { base: u32 },
    #[error("{requested} (stride {requested_stride}) cannot alias {stored} (stride {stored_stride})")]
    NotCastable {
        requested: ColorBaseFormat,
        requested_stride: u32,
        stored: ColorBaseFormat,
        stored_stride: u32,
    },
    #[error("{requested} cannot alias {stored}: backing storage is padded")]
    PaddedStorage {
        requested: ColorBaseFormat,
        stored: ColorBaseFormat,
    },
    #[error("rows {start_line}..{end_line} exceed the {stored_height} rows of the surface at 0x{base:x}")]
    SegmentOutOfBounds {
        base: u32,
        start_line: u32,
        end_line: u32,
        stored_height: u32,
    },
    #[error("presentation pitch {requested} does not match stored stride {stored}")]
    PitchMismatch { requested: u32, stored: u32 },
    #[error("0x{address:x} is not aligned to a row of the surface at 0x{base:x}")]
    MisalignedRow { address: u32, base: u32 },
    #[error("no depth-stencil slot is available")]
    NoFreeDepthStencilSlot,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T, E = SurfaceCacheError> = std::result::Result<T, E>;
