//! Frame buffers as delivered by a core, and the pixel formats they use.

use std::fmt;

/// Pixel layouts a libretro core can emit.
///
/// Discriminants match `enum retro_pixel_format` so the raw value passed
/// through `RETRO_ENVIRONMENT_SET_PIXEL_FORMAT` maps one-to-one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 0RGB1555, native-endian 16-bit. The libretro default.
    #[default]
    Rgb1555,
    /// XRGB8888, native-endian 32-bit.
    Xrgb8888,
    /// RGB565, native-endian 16-bit.
    Rgb565,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 3] = [Self::Rgb1555, Self::Xrgb8888, Self::Rgb565];

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rgb1555),
            1 => Some(Self::Xrgb8888),
            2 => Some(Self::Rgb565),
            _ => None,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Rgb1555 => 0,
            Self::Xrgb8888 => 1,
            Self::Rgb565 => 2,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb1555 | Self::Rgb565 => 2,
            Self::Xrgb8888 => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rgb1555 => "0RGB1555",
            Self::Xrgb8888 => "XRGB8888",
            Self::Rgb565 => "RGB565",
        })
    }
}

/// One emulated frame, borrowed from the core for the duration of a
/// `present` call.
///
/// Rows are `pitch` bytes apart; only the first `width * bpp` bytes of a
/// row carry pixels. The last row may be cut short to exactly that length.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Wrap a pixel slice, checking that it covers every row.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        pitch: usize,
        format: PixelFormat,
    ) -> Option<Self> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if pitch < row_bytes || data.len() < Self::required_len(width, height, pitch, format) {
            return None;
        }
        Some(Self {
            width,
            height,
            pitch,
            format,
            data,
        })
    }

    /// Minimum number of bytes a frame with this shape occupies.
    pub fn required_len(width: u32, height: u32, pitch: usize, format: PixelFormat) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        pitch * (height as usize - 1) + width as usize * format.bytes_per_pixel()
    }

    /// Pixel bytes of row `y`, without pitch padding.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.pitch;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Decode the pixel at (`x`, `y`) to 8-bit RGB.
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.pitch + x as usize * bpp;
        decode(self.format, &self.data[offset..offset + bpp])
    }
}

fn expand5(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

fn expand6(v: u16) -> u8 {
    let v = (v & 0x3F) as u8;
    (v << 2) | (v >> 4)
}

/// Decode one pixel in `format` to 8-bit RGB.
pub fn decode(format: PixelFormat, px: &[u8]) -> (u8, u8, u8) {
    match format {
        PixelFormat::Xrgb8888 => {
            let v = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
            ((v >> 16) as u8, (v >> 8) as u8, v as u8)
        }
        PixelFormat::Rgb565 => {
            let v = u16::from_ne_bytes([px[0], px[1]]);
            (expand5(v >> 11), expand6(v >> 5), expand5(v))
        }
        PixelFormat::Rgb1555 => {
            let v = u16::from_ne_bytes([px[0], px[1]]);
            (expand5(v >> 10), expand5(v >> 5), expand5(v))
        }
    }
}

/// Integer Rec. 601 luma.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// Convert `frame` to tightly packed XRGB8888 in `out`.
///
/// `out` is resized to `width * height * 4`; the converted frame has a pitch
/// of `width * 4`.
pub fn convert_to_xrgb8888(frame: &Frame<'_>, out: &mut Vec<u8>) {
    let w = frame.width as usize;
    out.clear();
    out.reserve(w * frame.height as usize * 4);

    if frame.format == PixelFormat::Xrgb8888 {
        for y in 0..frame.height {
            out.extend_from_slice(frame.row(y));
        }
        return;
    }

    for y in 0..frame.height {
        for px in frame.row(y).chunks_exact(2) {
            let (r, g, b) = decode(frame.format, px);
            let v = 0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32;
            out.extend_from_slice(&v.to_ne_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_follow_libretro_enum() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_raw(format.to_raw()), Some(format));
        }
        assert_eq!(PixelFormat::from_raw(3), None);
        assert_eq!(PixelFormat::default(), PixelFormat::Rgb1555);
    }

    #[test]
    fn frame_rejects_short_buffers() {
        let data = [0u8; 15];
        assert!(Frame::new(&data, 4, 2, 8, PixelFormat::Rgb565).is_none());
        let data = [0u8; 16];
        assert!(Frame::new(&data, 4, 2, 8, PixelFormat::Rgb565).is_some());
        // Pitch narrower than a row is never valid.
        assert!(Frame::new(&data, 4, 2, 6, PixelFormat::Rgb565).is_none());
    }

    #[test]
    fn last_row_may_skip_padding() {
        // 2x2 RGB565 with a 6-byte pitch: 6 + 4 bytes.
        let data = [0u8; 10];
        let frame = Frame::new(&data, 2, 2, 6, PixelFormat::Rgb565).unwrap();
        assert_eq!(frame.row(1).len(), 4);
    }

    #[test]
    fn decodes_white_and_primaries() {
        assert_eq!(decode(PixelFormat::Rgb565, &0xFFFFu16.to_ne_bytes()), (255, 255, 255));
        assert_eq!(decode(PixelFormat::Rgb565, &0xF800u16.to_ne_bytes()), (255, 0, 0));
        assert_eq!(decode(PixelFormat::Rgb1555, &0x03E0u16.to_ne_bytes()), (0, 255, 0));
        assert_eq!(
            decode(PixelFormat::Xrgb8888, &0x0000_00FFu32.to_ne_bytes()),
            (0, 0, 255)
        );
    }

    #[test]
    fn converts_rgb565_with_pitch_padding() {
        // 2x1 frame with two bytes of padding per row.
        let mut data = Vec::new();
        data.extend_from_slice(&0xF800u16.to_ne_bytes());
        data.extend_from_slice(&0x001Fu16.to_ne_bytes());
        data.extend_from_slice(&[0xAA, 0xAA]);
        let frame = Frame::new(&data, 2, 1, 6, PixelFormat::Rgb565).unwrap();

        let mut out = Vec::new();
        convert_to_xrgb8888(&frame, &mut out);
        assert_eq!(out.len(), 8);
        assert_eq!(u32::from_ne_bytes(out[0..4].try_into().unwrap()), 0xFFFF_0000);
        assert_eq!(u32::from_ne_bytes(out[4..8].try_into().unwrap()), 0xFF00_00FF);
    }

    #[test]
    fn luma_weights_green_highest() {
        assert_eq!(luma(255, 255, 255), 255);
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
        assert!(luma(255, 0, 0) > luma(0, 0, 255));
    }
}
