//! Guest color formats and their translation onto backing-store texel layouts.
//!
//! The cache never converts pixel values. It only needs to know, per guest format:
//! - which backing-store layout holds a surface written in that format,
//! - how many bytes a pixel occupies in guest memory and in the backing store,
//! - whether the surface must be kept as an opaque integer texture ("raw" storage).
//!
//! [`FormatTable`] is that seam; [`GxmFormatTable`] is the table used by the renderer.

use core::fmt;

/// Guest color-surface base format, identified by its hardware format code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ColorBaseFormat {
    U8U8U8U8 = 0x0000_0000,
    U8U8U8 = 0x1000_0000,
    U5U6U5 = 0x3000_0000,
    U1U5U5U5 = 0x4000_0000,
    U4U4U4U4 = 0x5000_0000,
    U8U3U3U2 = 0x6000_0000,
    F16 = 0xF000_0000,
    F16F16 = 0x0080_0000,
    F32 = 0x1080_0000,
    S16 = 0x2080_0000,
    S16S16 = 0x3080_0000,
    U16 = 0x4080_0000,
    U16U16 = 0x5080_0000,
    U2U10U10U10 = 0x6080_0000,
    U8 = 0x8080_0000,
    S8 = 0x9080_0000,
    S5S5U6 = 0xA080_0000,
    U8U8 = 0xB080_0000,
    S8S8 = 0xC080_0000,
    U8S8S8U8 = 0xD080_0000,
    S8S8S8S8 = 0xE080_0000,
    F16F16F16F16 = 0x0100_0000,
    F32F32 = 0x1100_0000,
    F11F11F10 = 0x2100_0000,
    SE5M9M9M9 = 0x3100_0000,
    U2F10F10F10 = 0x4100_0000,
}

impl ColorBaseFormat {
    pub const ALL: [ColorBaseFormat; 26] = [
        Self::U8U8U8U8,
        Self::U8U8U8,
        Self::U5U6U5,
        Self::U1U5U5U5,
        Self::U4U4U4U4,
        Self::U8U3U3U2,
        Self::F16,
        Self::F16F16,
        Self::F32,
        Self::S16,
        Self::S16S16,
        Self::U16,
        Self::U16U16,
        Self::U2U10U10U10,
        Self::U8,
        Self::S8,
        Self::S5S5U6,
        Self::U8U8,
        Self::S8S8,
        Self::U8S8S8U8,
        Self::S8S8S8S8,
        Self::F16F16F16F16,
        Self::F32F32,
        Self::F11F11F10,
        Self::SE5M9M9M9,
        Self::U2F10F10F10,
    ];

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.code() == code)
    }

    /// Size of one pixel in guest memory.
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::U8 | Self::S8 => 8,
            Self::U5U6U5
            | Self::U1U5U5U5
            | Self::U4U4U4U4
            | Self::U8U3U3U2
            | Self::F16
            | Self::S16
            | Self::U16
            | Self::S5S5U6
            | Self::U8U8
            | Self::S8S8 => 16,
            Self::U8U8U8 => 24,
            Self::U8U8U8U8
            | Self::F16F16
            | Self::F32
            | Self::S16S16
            | Self::U16U16
            | Self::U2U10U10U10
            | Self::U8S8S8U8
            | Self::S8S8S8S8
            | Self::F11F11F10
            | Self::SE5M9M9M9
            | Self::U2F10F10F10 => 32,
            Self::F16F16F16F16 | Self::F32F32 => 64,
        }
    }
}

impl fmt::Display for ColorBaseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:X})", self, self.code())
    }
}

/// Backing-store texel storage format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba16Float,
    Rgba16Uint,
    Rgb10A2Unorm,
    Depth24Stencil8,
}

impl InternalFormat {
    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Rgba8Snorm | Self::Rgb10A2Unorm | Self::Depth24Stencil8 => 4,
            Self::Rgba16Float | Self::Rgba16Uint => 8,
        }
    }
}

/// Channel arrangement used when uploading/reading texel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadFormat {
    Rgba,
    RgbaInteger,
    DepthStencil,
}

/// Per-channel component encoding used when uploading/reading texel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    UnsignedByte,
    Byte,
    HalfFloat,
    UnsignedShort,
    UnsignedInt2101010Rev,
    UnsignedInt248,
}

/// The backing-store format triple describing how a texture is stored and transferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TexelLayout {
    pub internal: InternalFormat,
    pub upload: UploadFormat,
    pub component: ComponentType,
}

impl TexelLayout {
    pub const DEPTH_STENCIL: TexelLayout = TexelLayout {
        internal: InternalFormat::Depth24Stencil8,
        upload: UploadFormat::DepthStencil,
        component: ComponentType::UnsignedInt248,
    };

    pub const fn bytes_per_texel(self) -> u32 {
        self.internal.bytes_per_texel()
    }
}

/// Format-compatibility collaborator: pure lookups from a guest format to backing-store facts.
pub trait FormatTable {
    fn internal_storage_format(&self, format: ColorBaseFormat) -> InternalFormat;
    fn upload_format(&self, format: ColorBaseFormat) -> UploadFormat;
    fn component_type(&self, format: ColorBaseFormat) -> ComponentType;
    fn logical_bytes_per_pixel(&self, format: ColorBaseFormat) -> u32;
    fn backing_bytes_per_pixel(&self, format: ColorBaseFormat) -> u32;
    /// Surfaces in these formats are rendered into an opaque integer texture rather than a
    /// filterable color texture.
    fn is_raw_stored(&self, format: ColorBaseFormat) -> bool;
    fn raw_internal_format(&self, format: ColorBaseFormat) -> InternalFormat;
    fn raw_upload_format(&self, format: ColorBaseFormat) -> UploadFormat;
    fn raw_component_type(&self, format: ColorBaseFormat) -> ComponentType;

    /// Filterable layout used for sampling a surface in `format`.
    fn storage_layout(&self, format: ColorBaseFormat) -> TexelLayout {
        TexelLayout {
            internal: self.internal_storage_format(format),
            upload: self.upload_format(format),
            component: self.component_type(format),
        }
    }

    fn raw_layout(&self, format: ColorBaseFormat) -> TexelLayout {
        TexelLayout {
            internal: self.raw_internal_format(format),
            upload: self.raw_upload_format(format),
            component: self.raw_component_type(format),
        }
    }

    /// Layout of the texture a surface in `format` is rendered into.
    fn primary_layout(&self, format: ColorBaseFormat) -> TexelLayout {
        if self.is_raw_stored(format) {
            self.raw_layout(format)
        } else {
            self.storage_layout(format)
        }
    }
}

/// Translation table for the emulated GPU's color formats.
///
/// Only the formats that can be bit-cast are mapped precisely; everything else falls back to an
/// 8-bit RGBA texture.
#[derive(Clone, Copy, Debug, Default)]
pub struct GxmFormatTable;

impl FormatTable for GxmFormatTable {
    fn internal_storage_format(&self, format: ColorBaseFormat) -> InternalFormat {
        match format {
            ColorBaseFormat::U8U8U8U8 => InternalFormat::Rgba8Unorm,
            ColorBaseFormat::S8S8S8S8 => InternalFormat::Rgba8Snorm,
            ColorBaseFormat::F16F16F16F16 => InternalFormat::Rgba16Float,
            ColorBaseFormat::U2U10U10U10 => InternalFormat::Rgb10A2Unorm,
            _ => InternalFormat::Rgba8Unorm,
        }
    }

    fn upload_format(&self, _format: ColorBaseFormat) -> UploadFormat {
        UploadFormat::Rgba
    }

    fn component_type(&self, format: ColorBaseFormat) -> ComponentType {
        match format {
            ColorBaseFormat::S8S8S8S8 => ComponentType::Byte,
            ColorBaseFormat::F16F16F16F16 => ComponentType::HalfFloat,
            ColorBaseFormat::U2U10U10U10 => ComponentType::UnsignedInt2101010Rev,
            _ => ComponentType::UnsignedByte,
        }
    }

    fn logical_bytes_per_pixel(&self, format: ColorBaseFormat) -> u32 {
        format.bits_per_pixel() >> 3
    }

    fn backing_bytes_per_pixel(&self, format: ColorBaseFormat) -> u32 {
        match format {
            ColorBaseFormat::F16F16F16F16 => 8,
            _ => 4,
        }
    }

    fn is_raw_stored(&self, format: ColorBaseFormat) -> bool {
        format == ColorBaseFormat::F16F16F16F16
    }

    fn raw_internal_format(&self, _format: ColorBaseFormat) -> InternalFormat {
        InternalFormat::Rgba16Uint
    }

    fn raw_upload_format(&self, _format: ColorBaseFormat) -> UploadFormat {
        UploadFormat::RgbaInteger
    }

    fn raw_component_type(&self, _format: ColorBaseFormat) -> ComponentType {
        ComponentType::UnsignedShort
    }
}

/// Outcome of checking whether a stored surface may be reinterpreted in a requested format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastCompatibility {
    Compatible,
    /// The stride/bytes-per-pixel relation does not allow a bit-cast.
    NotCastable,
    /// The arithmetic allows a cast, but at least one format is padded in the backing store.
    PaddedStorage,
}

/// Applies the bit-cast rule between a requested read and the stored surface.
///
/// Strides are in pixels of their respective formats.
pub fn cast_compatibility(
    formats: &(impl FormatTable + ?Sized),
    requested: ColorBaseFormat,
    requested_stride: u32,
    stored: ColorBaseFormat,
    stored_stride: u32,
) -> CastCompatibility {
    if requested == stored {
        return CastCompatibility::Compatible;
    }

    let r = formats.logical_bytes_per_pixel(requested);
    let s = formats.logical_bytes_per_pixel(stored);
    if r == 0 || s == 0 || requested_stride == 0 || stored_stride == 0 {
        return CastCompatibility::NotCastable;
    }

    let castable = if r > s {
        r % s == 0
            && stored_stride % requested_stride == 0
            && stored_stride / requested_stride == r / s
    } else {
        s % r == 0
            && requested_stride % stored_stride == 0
            && requested_stride / stored_stride == s / r
    };
    if !castable {
        return CastCompatibility::NotCastable;
    }

    if r != formats.backing_bytes_per_pixel(requested)
        || s != formats.backing_bytes_per_pixel(stored)
    {
        return CastCompatibility::PaddedStorage;
    }

    CastCompatibility::Compatible
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_codes_round_trip() {
        for format in ColorBaseFormat::ALL {
            assert_eq!(ColorBaseFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(ColorBaseFormat::from_code(0xDEAD_BEEF), None);
    }

    #[test]
    fn half_float_surfaces_are_stored_raw() {
        let table = GxmFormatTable;
        let layout = table.primary_layout(ColorBaseFormat::F16F16F16F16);
        assert_eq!(layout.internal, InternalFormat::Rgba16Uint);
        assert_eq!(layout.upload, UploadFormat::RgbaInteger);
        assert_eq!(
            table.storage_layout(ColorBaseFormat::F16F16F16F16).internal,
            InternalFormat::Rgba16Float
        );
        assert_eq!(
            table.primary_layout(ColorBaseFormat::U8U8U8U8).internal,
            InternalFormat::Rgba8Unorm
        );
    }

    #[test]
    fn wider_request_needs_matching_stride_ratio() {
        let table = GxmFormatTable;
        // 8-byte pixels over a 4-byte surface: the surface stride must be twice the request's.
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::F16F16F16F16,
                64,
                ColorBaseFormat::U8U8U8U8,
                128
            ),
            CastCompatibility::Compatible
        );
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::F16F16F16F16,
                64,
                ColorBaseFormat::U8U8U8U8,
                64
            ),
            CastCompatibility::NotCastable
        );
    }

    #[test]
    fn narrower_request_needs_matching_stride_ratio() {
        let table = GxmFormatTable;
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::U8U8U8U8,
                128,
                ColorBaseFormat::F16F16F16F16,
                64
            ),
            CastCompatibility::Compatible
        );
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::U8U8U8U8,
                96,
                ColorBaseFormat::F16F16F16F16,
                64
            ),
            CastCompatibility::NotCastable
        );
    }

    #[test]
    fn three_byte_request_over_four_byte_surface_is_rejected() {
        let table = GxmFormatTable;
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::U8U8U8,
                256,
                ColorBaseFormat::U8U8U8U8,
                256
            ),
            CastCompatibility::NotCastable
        );
    }

    #[test]
    fn padded_backing_storage_blocks_casts() {
        let table = GxmFormatTable;
        // U8U8 is two bytes in guest memory but lives in a 4-byte texture.
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::U8U8,
                256,
                ColorBaseFormat::U8U8U8U8,
                128
            ),
            CastCompatibility::PaddedStorage
        );
    }

    #[test]
    fn identical_formats_are_always_compatible() {
        let table = GxmFormatTable;
        assert_eq!(
            cast_compatibility(
                &table,
                ColorBaseFormat::U5U6U5,
                10,
                ColorBaseFormat::U5U6U5,
                20
            ),
            CastCompatibility::Compatible
        );
    }
}
