//! Pixel formats and colors.
//!
//! Formats carry the numeric codes used on the wire by the `ImageInfo`
//! message. Multi-byte formats are stored little-endian, so `Argb32` pixels
//! appear in memory as `B, G, R, A`.

use std::fmt;

/// A non-premultiplied ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color::argb(0, 0, 0, 0);
    /// The mid-gray used by the toolkit's `gray` constant (#a0a0a4).
    pub const GRAY: Color = Color::rgb(0xa0, 0xa0, 0xa4);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { a: 0xff, r, g, b }
    }

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color { a, r, g, b }
    }

    pub const fn from_argb32(value: u32) -> Self {
        Color {
            a: (value >> 24) as u8,
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    pub const fn to_argb32(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 0xff
    }

    /// Luminance in the 0..=255 range, weighted 11:16:5.
    pub fn gray(&self) -> u8 {
        ((u32::from(self.r) * 11 + u32::from(self.g) * 16 + u32::from(self.b) * 5) / 32) as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.to_argb32())
    }
}

/// Pixel layouts supported by window buffers and the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Invalid,
    Rgb32,
    Argb32,
    Argb32Premultiplied,
    /// 5-6-5 packed, the native layout of the e-paper framebuffer.
    Rgb16,
    Rgbx8888,
    Rgba8888,
    Grayscale8,
}

impl PixelFormat {
    pub fn from_code(code: i32) -> Option<PixelFormat> {
        match code {
            0 => Some(PixelFormat::Invalid),
            4 => Some(PixelFormat::Rgb32),
            5 => Some(PixelFormat::Argb32),
            6 => Some(PixelFormat::Argb32Premultiplied),
            7 => Some(PixelFormat::Rgb16),
            17 => Some(PixelFormat::Rgbx8888),
            18 => Some(PixelFormat::Rgba8888),
            24 => Some(PixelFormat::Grayscale8),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PixelFormat::Invalid => 0,
            PixelFormat::Rgb32 => 4,
            PixelFormat::Argb32 => 5,
            PixelFormat::Argb32Premultiplied => 6,
            PixelFormat::Rgb16 => 7,
            PixelFormat::Rgbx8888 => 17,
            PixelFormat::Rgba8888 => 18,
            PixelFormat::Grayscale8 => 24,
        }
    }

    /// Parses the lowercase names used in the configuration file.
    pub fn from_name(name: &str) -> Option<PixelFormat> {
        match name.to_lowercase().as_str() {
            "rgb32" => Some(PixelFormat::Rgb32),
            "argb32" => Some(PixelFormat::Argb32),
            "argb32_premultiplied" => Some(PixelFormat::Argb32Premultiplied),
            "rgb16" => Some(PixelFormat::Rgb16),
            "rgbx8888" => Some(PixelFormat::Rgbx8888),
            "rgba8888" => Some(PixelFormat::Rgba8888),
            "grayscale8" => Some(PixelFormat::Grayscale8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Invalid => 0,
            PixelFormat::Grayscale8 => 1,
            PixelFormat::Rgb16 => 2,
            PixelFormat::Rgb32
            | PixelFormat::Argb32
            | PixelFormat::Argb32Premultiplied
            | PixelFormat::Rgbx8888
            | PixelFormat::Rgba8888 => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Argb32 | PixelFormat::Argb32Premultiplied | PixelFormat::Rgba8888
        )
    }

    /// Bytes per line for `width` pixels, padded to a 4-byte boundary.
    pub fn stride_for(self, width: u32) -> usize {
        (width as usize * self.bytes_per_pixel() + 3) & !3
    }

    /// Color a fresh buffer is cleared to.
    pub fn background(self) -> Color {
        if self.has_alpha() {
            Color::TRANSPARENT
        } else {
            Color::WHITE
        }
    }

    /// Writes `color` into `out`, which must hold at least one pixel.
    pub fn encode(self, color: Color, out: &mut [u8]) {
        match self {
            PixelFormat::Invalid => {}
            PixelFormat::Grayscale8 => out[0] = color.gray(),
            PixelFormat::Rgb16 => {
                let value = (u16::from(color.r >> 3) << 11)
                    | (u16::from(color.g >> 2) << 5)
                    | u16::from(color.b >> 3);
                out[..2].copy_from_slice(&value.to_le_bytes());
            }
            PixelFormat::Rgb32 => {
                let value = Color { a: 0xff, ..color }.to_argb32();
                out[..4].copy_from_slice(&value.to_le_bytes());
            }
            PixelFormat::Argb32 => {
                out[..4].copy_from_slice(&color.to_argb32().to_le_bytes());
            }
            PixelFormat::Argb32Premultiplied => {
                let premul = |c: u8| ((u32::from(c) * u32::from(color.a) + 127) / 255) as u8;
                let value = Color::argb(color.a, premul(color.r), premul(color.g), premul(color.b))
                    .to_argb32();
                out[..4].copy_from_slice(&value.to_le_bytes());
            }
            PixelFormat::Rgbx8888 => out[..4].copy_from_slice(&[color.r, color.g, color.b, 0xff]),
            PixelFormat::Rgba8888 => {
                out[..4].copy_from_slice(&[color.r, color.g, color.b, color.a])
            }
        }
    }

    /// Reads one pixel from `bytes`.
    pub fn decode(self, bytes: &[u8]) -> Color {
        match self {
            PixelFormat::Invalid => Color::TRANSPARENT,
            PixelFormat::Grayscale8 => Color::rgb(bytes[0], bytes[0], bytes[0]),
            PixelFormat::Rgb16 => {
                let value = u16::from_le_bytes([bytes[0], bytes[1]]);
                let r5 = ((value >> 11) & 0x1f) as u8;
                let g6 = ((value >> 5) & 0x3f) as u8;
                let b5 = (value & 0x1f) as u8;
                Color::rgb((r5 << 3) | (r5 >> 2), (g6 << 2) | (g6 >> 4), (b5 << 3) | (b5 >> 2))
            }
            PixelFormat::Rgb32 => {
                let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Color { a: 0xff, ..Color::from_argb32(value) }
            }
            PixelFormat::Argb32 => {
                Color::from_argb32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            PixelFormat::Argb32Premultiplied => {
                let c = Color::from_argb32(u32::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ]));
                if c.a == 0 {
                    return Color::TRANSPARENT;
                }
                let unpremul =
                    |v: u8| ((u32::from(v) * 255 + u32::from(c.a) / 2) / u32::from(c.a)).min(255) as u8;
                Color::argb(c.a, unpremul(c.r), unpremul(c.g), unpremul(c.b))
            }
            PixelFormat::Rgbx8888 => Color::rgb(bytes[0], bytes[1], bytes[2]),
            PixelFormat::Rgba8888 => Color::argb(bytes[3], bytes[0], bytes[1], bytes[2]),
        }
    }

    /// Returns `color` as it reads back after being stored in this format.
    pub fn quantize(self, color: Color) -> Color {
        let mut scratch = [0u8; 4];
        self.encode(color, &mut scratch);
        self.decode(&scratch)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Invalid => "invalid",
            PixelFormat::Rgb32 => "rgb32",
            PixelFormat::Argb32 => "argb32",
            PixelFormat::Argb32Premultiplied => "argb32_premultiplied",
            PixelFormat::Rgb16 => "rgb16",
            PixelFormat::Rgbx8888 => "rgbx8888",
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Grayscale8 => "grayscale8",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const ALL: [PixelFormat; 7] = [
        PixelFormat::Rgb32,
        PixelFormat::Argb32,
        PixelFormat::Argb32Premultiplied,
        PixelFormat::Rgb16,
        PixelFormat::Rgbx8888,
        PixelFormat::Rgba8888,
        PixelFormat::Grayscale8,
    ];

    #[test]
    fn test_codes_and_names_are_consistent() {
        for format in ALL {
            assert_eq!(PixelFormat::from_code(format.code()), Some(format));
            assert_eq!(PixelFormat::from_name(&format.to_string()), Some(format));
        }
        assert_eq!(PixelFormat::from_code(0), Some(PixelFormat::Invalid));
        assert_eq!(PixelFormat::from_code(3), None);
        assert_eq!(PixelFormat::from_name("invalid"), None);
    }

    #[rstest]
    #[case(PixelFormat::Rgb16, 1404, 2808)]
    #[case(PixelFormat::Rgb16, 3, 8)]
    #[case(PixelFormat::Grayscale8, 5, 8)]
    #[case(PixelFormat::Argb32, 10, 40)]
    fn test_stride_is_padded(#[case] format: PixelFormat, #[case] width: u32, #[case] stride: usize) {
        assert_eq!(format.stride_for(width), stride);
    }

    #[test]
    fn test_black_and_white_survive_every_format() {
        for format in ALL {
            assert_eq!(format.quantize(Color::WHITE), Color::WHITE, "{}", format);
            assert_eq!(format.quantize(Color::BLACK), Color::BLACK, "{}", format);
        }
    }

    #[test]
    fn test_rgb16_quantizes_gray() {
        let gray = PixelFormat::Rgb16.quantize(Color::GRAY);
        assert_eq!(gray, Color::rgb(0xa5, 0xa2, 0xa5));
        assert_eq!(PixelFormat::Rgb16.quantize(gray), gray);
    }

    #[test]
    fn test_alpha_formats_keep_transparency() {
        for format in ALL.into_iter().filter(|f| f.has_alpha()) {
            assert_eq!(format.quantize(Color::TRANSPARENT), Color::TRANSPARENT);
            assert_eq!(format.background(), Color::TRANSPARENT);
        }
        assert_eq!(PixelFormat::Rgb16.background(), Color::WHITE);
    }

    #[test]
    fn test_argb32_memory_layout() {
        let mut bytes = [0u8; 4];
        PixelFormat::Argb32.encode(Color::argb(0x11, 0x22, 0x33, 0x44), &mut bytes);
        assert_eq!(bytes, [0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_gray_luminance() {
        assert_eq!(Color::WHITE.gray(), 255);
        assert_eq!(Color::GRAY.gray(), 160);
    }
}
