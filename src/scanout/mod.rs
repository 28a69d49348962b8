pub mod timing;

use std::ops::Range;

use crate::framebuffer::{FramebufferDescriptor, PixelFormat};
use crate::palette::{PaletteTable, Rgb};
use crate::state::VideoStatus;
use timing::{VideoMode, VideoTiming};

/// Work for one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanlineDescriptor {
    /// Framebuffer row this line shows.
    pub row: u16,
    /// Source bytes in external memory.
    pub source: Range<usize>,
    /// Output pixels produced from the source (before border padding).
    pub dest_pixels: u16,
    /// Each source pixel is repeated this many times horizontally.
    pub pixel_repeat: u16,
    /// Consecutive output lines that reuse this source row.
    pub line_repeat: u16,
}

/// Where the beam is after a line completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAdvance {
    /// Still inside the frame.
    Next,
    /// Just crossed from the last visible line into vertical blank.
    VblankStart,
    /// Wrapped to line 0 of a new frame.
    FrameStart,
}

#[derive(Debug)]
pub struct ScanoutEngine {
    mode: VideoMode,
    timing: VideoTiming,
    line: u16,
    line_start_tick: u64,
    frame: u64,
}

impl ScanoutEngine {
    pub fn new(mode: VideoMode) -> Self {
        Self {
            mode,
            timing: mode.timing(),
            line: 0,
            line_start_tick: 0,
            frame: 0,
        }
    }

    pub fn mode(&self) -> VideoMode {
        self.mode
    }

    pub fn timing(&self) -> &VideoTiming {
        &self.timing
    }

    pub fn line(&self) -> u16 {
        self.line
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn line_start_tick(&self) -> u64 {
        self.line_start_tick
    }

    pub fn line_end_tick(&self) -> u64 {
        self.line_start_tick + self.timing.ticks_per_line()
    }

    pub fn in_active_line(&self) -> bool {
        self.timing.v.is_visible(self.line)
    }

    /// Move to the next line. The line that just finished ends at
    /// `line_end_tick()`.
    pub fn advance_line(&mut self) -> LineAdvance {
        self.line_start_tick = self.line_end_tick();
        self.line += 1;
        if self.line == self.timing.v.total() {
            self.line = 0;
            self.frame += 1;
            LineAdvance::FrameStart
        } else if self.line == self.timing.v.visible {
            LineAdvance::VblankStart
        } else {
            LineAdvance::Next
        }
    }

    /// Restart the timing generator at the top of vertical blank, with a
    /// possibly different mode. The current line keeps its start tick.
    pub fn restart(&mut self, mode: VideoMode) {
        self.mode = mode;
        self.timing = mode.timing();
        self.line = self.timing.v.visible;
    }

    /// Status flags for the beam at `tick`, which must fall inside the
    /// current line.
    pub fn status_at(&self, tick: u64, output_enabled: bool, chain_running: bool) -> VideoStatus {
        let column = tick.saturating_sub(self.line_start_tick).min(u16::MAX as u64) as u16;
        VideoStatus {
            vsync: self.timing.v.in_sync(self.line),
            hsync: self.timing.h.in_sync(column),
            display_active: output_enabled
                && self.timing.v.is_visible(self.line)
                && self.timing.h.is_visible(column),
            link_active: output_enabled && chain_running,
        }
    }

    /// Build the descriptor for visible output line `y`, or `None` if `y`
    /// falls below the configured image (border).
    pub fn scanline(&self, desc: &FramebufferDescriptor, y: u16) -> Option<ScanlineDescriptor> {
        let line_repeat = (self.timing.v.visible / desc.height).max(1);
        let pixel_repeat = (self.timing.h.visible / desc.width).max(1);
        let row = y / line_repeat;
        if row >= desc.height {
            return None;
        }
        let dest_pixels = (desc.width as u32 * pixel_repeat as u32).min(self.timing.h.visible as u32) as u16;
        Some(ScanlineDescriptor {
            row,
            source: desc.row_range(row),
            dest_pixels,
            pixel_repeat,
            line_repeat,
        })
    }
}

/// Read pixel `col` from a row of packed pixel data.
fn pixel_at(data: &[u8], col: usize, format: PixelFormat, palette: &PaletteTable) -> Rgb {
    match format {
        PixelFormat::Bpp1 => {
            let byte = data[col / 8];
            let shift = 7 - (col % 8);
            palette.get((byte >> shift) & 0x01)
        }
        PixelFormat::Bpp4 => {
            let byte = data[col / 2];
            palette.get(if col % 2 == 0 { byte >> 4 } else { byte & 0x0F })
        }
        PixelFormat::Bpp8 => palette.get(data[col]),
        PixelFormat::Rgb565 => {
            let i = col * 2;
            Rgb::from_rgb565(u16::from_le_bytes([data[i], data[i + 1]]))
        }
        PixelFormat::Rgb888 => {
            let i = col * 3;
            Rgb::new(data[i], data[i + 1], data[i + 2])
        }
    }
}

/// Convert one source row into `out`, applying the horizontal repeat and
/// padding with black up to `line_width`.
///
/// Palette entries are read live; a palette write racing this call may be
/// seen half applied.
pub fn convert_line(
    data: &[u8],
    format: PixelFormat,
    palette: &PaletteTable,
    line: &ScanlineDescriptor,
    line_width: u16,
    out: &mut Vec<Rgb>,
) {
    out.clear();
    let repeat = line.pixel_repeat.max(1) as usize;
    for x in 0..line.dest_pixels as usize {
        out.push(pixel_at(data, x / repeat, format, palette));
    }
    out.resize(line_width as usize, Rgb::BLACK);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::DEFAULT_PALETTE;

    fn desc(width: u16, height: u16, format: PixelFormat) -> FramebufferDescriptor {
        FramebufferDescriptor {
            base: 0x100,
            stride: format.row_bytes(width),
            width,
            height,
            format,
            start_line: 0,
        }
    }

    #[test]
    fn test_line_counter_wraps_with_vblank() {
        let mut s = ScanoutEngine::new(VideoMode::Vga640x480);
        let mut vblanks = 0;
        let mut frames = 0;
        for _ in 0..525 {
            match s.advance_line() {
                LineAdvance::VblankStart => {
                    vblanks += 1;
                    assert_eq!(s.line(), 480);
                }
                LineAdvance::FrameStart => frames += 1,
                LineAdvance::Next => {}
            }
        }
        assert_eq!((vblanks, frames), (1, 1));
        assert_eq!(s.line(), 0);
        assert_eq!(s.line_start_tick(), 420_000);
        assert_eq!(s.frame(), 1);
    }

    #[test]
    fn test_status_follows_beam() {
        let mut s = ScanoutEngine::new(VideoMode::Vga640x480);
        let st = s.status_at(10, true, true);
        assert!(st.display_active && !st.hsync && !st.vsync && st.link_active);
        let st = s.status_at(700, true, true);
        assert!(!st.display_active && st.hsync);
        let st = s.status_at(10, false, true);
        assert!(!st.display_active && !st.link_active);

        while s.line() != 490 {
            s.advance_line();
        }
        let st = s.status_at(s.line_start_tick() + 5, true, true);
        assert!(st.vsync && !st.display_active);
    }

    #[test]
    fn test_scanline_native_resolution() {
        let s = ScanoutEngine::new(VideoMode::Vga640x480);
        let d = desc(640, 480, PixelFormat::Rgb565);
        let line = s.scanline(&d, 3).unwrap();
        assert_eq!(line.row, 3);
        assert_eq!(line.source, 0x100 + 3 * 1280..0x100 + 4 * 1280);
        assert_eq!((line.dest_pixels, line.pixel_repeat, line.line_repeat), (640, 1, 1));
    }

    #[test]
    fn test_scanline_upscaled() {
        let s = ScanoutEngine::new(VideoMode::Vga640x480);
        let d = desc(320, 240, PixelFormat::Bpp8);
        let a = s.scanline(&d, 6).unwrap();
        let b = s.scanline(&d, 7).unwrap();
        assert_eq!(a.row, 3);
        assert_eq!(a.source, b.source);
        assert_eq!((a.pixel_repeat, a.line_repeat, a.dest_pixels), (2, 2, 640));
    }

    #[test]
    fn test_scanline_border_below_image() {
        let s = ScanoutEngine::new(VideoMode::Vga640x480);
        let d = desc(640, 400, PixelFormat::Bpp8);
        assert!(s.scanline(&d, 399).is_some());
        assert!(s.scanline(&d, 400).is_none());
    }

    #[test]
    fn test_convert_formats() {
        let pal = PaletteTable::new();
        let line = ScanlineDescriptor { row: 0, source: 0..0, dest_pixels: 8, pixel_repeat: 1, line_repeat: 1 };
        let mut out = Vec::new();

        convert_line(&[0b1000_0001], PixelFormat::Bpp1, &pal, &line, 8, &mut out);
        assert_eq!(out[0], DEFAULT_PALETTE[1]);
        assert_eq!(out[1], DEFAULT_PALETTE[0]);
        assert_eq!(out[7], DEFAULT_PALETTE[1]);

        let line4 = ScanlineDescriptor { dest_pixels: 2, ..line.clone() };
        convert_line(&[0x9C], PixelFormat::Bpp4, &pal, &line4, 4, &mut out);
        assert_eq!(&out[..], &[DEFAULT_PALETTE[9], DEFAULT_PALETTE[12], Rgb::BLACK, Rgb::BLACK]);

        let line16 = ScanlineDescriptor { dest_pixels: 1, ..line.clone() };
        convert_line(&0xF800u16.to_le_bytes(), PixelFormat::Rgb565, &pal, &line16, 1, &mut out);
        assert_eq!(out, vec![Rgb::new(255, 0, 0)]);

        convert_line(&[1, 2, 3], PixelFormat::Rgb888, &pal, &line16, 1, &mut out);
        assert_eq!(out, vec![Rgb::new(1, 2, 3)]);
    }

    #[test]
    fn test_convert_pixel_repeat() {
        let pal = PaletteTable::new();
        let line = ScanlineDescriptor { row: 0, source: 0..2, dest_pixels: 4, pixel_repeat: 2, line_repeat: 1 };
        let mut out = Vec::new();
        convert_line(&[1, 2], PixelFormat::Bpp8, &pal, &line, 4, &mut out);
        assert_eq!(out, vec![DEFAULT_PALETTE[1], DEFAULT_PALETTE[1], DEFAULT_PALETTE[2], DEFAULT_PALETTE[2]]);
    }
}
