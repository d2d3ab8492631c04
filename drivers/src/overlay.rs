//! Frames-per-second counter drawn into the top-left corner of a frame.

use std::time::{Duration, Instant};

/// 4x5 glyphs, MSB-left, top four bits used.
const GLYPHS: &[(u8, [u8; 5])] = &[
    (b'0', [0x60, 0x90, 0x90, 0x90, 0x60]),
    (b'1', [0x20, 0x60, 0x20, 0x20, 0x70]),
    (b'2', [0x60, 0x90, 0x20, 0x40, 0xF0]),
    (b'3', [0x60, 0x90, 0x20, 0x90, 0x60]),
    (b'4', [0x90, 0x90, 0xF0, 0x10, 0x10]),
    (b'5', [0xF0, 0x80, 0xE0, 0x10, 0xE0]),
    (b'6', [0x60, 0x80, 0xE0, 0x90, 0x60]),
    (b'7', [0xF0, 0x10, 0x20, 0x40, 0x40]),
    (b'8', [0x60, 0x90, 0x60, 0x90, 0x60]),
    (b'9', [0x60, 0x90, 0x70, 0x10, 0x60]),
    (b'.', [0x00, 0x00, 0x00, 0x00, 0x40]),
];

const GLYPH_W: usize = 4;
const GLYPH_H: usize = 5;
const MARGIN: usize = 2;

const WHITE: u32 = 0xFFFF_FFFF;
const BLACK: u32 = 0xFF00_0000;

fn glyph(ch: u8) -> [u8; 5] {
    GLYPHS
        .iter()
        .find(|(c, _)| *c == ch)
        .map_or([0; 5], |(_, g)| *g)
}

/// Draw `text` onto a tightly packed XRGB8888 buffer `width` pixels wide,
/// white on a black box so it stays readable over a white playfield.
pub fn draw_text(buffer: &mut [u8], width: usize, text: &str) {
    let height = buffer.len() / (width * 4).max(1);
    let mut put = |x: usize, y: usize, color: u32| {
        if x < width && y < height {
            let offset = (y * width + x) * 4;
            buffer[offset..offset + 4].copy_from_slice(&color.to_ne_bytes());
        }
    };

    let box_w = text.len() * (GLYPH_W + 1) + 1;
    for y in MARGIN - 1..MARGIN + GLYPH_H + 1 {
        for x in MARGIN - 1..MARGIN + box_w {
            put(x, y, BLACK);
        }
    }

    for (i, ch) in text.bytes().enumerate() {
        let gx = MARGIN + i * (GLYPH_W + 1);
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x80 >> col) != 0 {
                    put(gx + col, MARGIN + row, WHITE);
                }
            }
        }
    }
}

/// Measures presented frames per second over one-second windows.
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    text: String,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            text: String::new(),
        }
    }

    /// Count one frame; returns the text to draw.
    pub fn tick(&mut self) -> &str {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f64 / elapsed.as_secs_f64();
            self.text = format!("{fps:.1}");
            self.frames = 0;
            self.window_start = Instant::now();
        }
        &self.text
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buffer: &[u8], width: usize, x: usize, y: usize) -> u32 {
        let o = (y * width + x) * 4;
        u32::from_ne_bytes([buffer[o], buffer[o + 1], buffer[o + 2], buffer[o + 3]])
    }

    #[test]
    fn digit_one_lights_its_stem() {
        let width = 16;
        let mut buffer = vec![0u8; width * 8 * 4];
        draw_text(&mut buffer, width, "1");
        // '1' row 0 is 0x20: only column 2 lit.
        assert_eq!(pixel(&buffer, width, MARGIN + 2, MARGIN), WHITE);
        assert_eq!(pixel(&buffer, width, MARGIN, MARGIN), BLACK);
        // Outside the box is untouched.
        assert_eq!(pixel(&buffer, width, 15, 7), 0);
    }

    #[test]
    fn drawing_is_clipped_to_the_buffer() {
        let width = 4;
        let mut buffer = vec![0u8; width * 3 * 4];
        draw_text(&mut buffer, width, "88.8");
    }

    #[test]
    fn counter_starts_blank() {
        let mut fps = FpsCounter::new();
        assert_eq!(fps.tick(), "");
    }
}
