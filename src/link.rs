use std::sync::{Arc, Mutex};

use crate::palette::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEdge {
    Assert,
    Deassert,
}

/// Consumer of the pixel stream.
pub trait DisplayLink {
    fn pixel(&mut self, tick: u64, rgb: Rgb);
    fn hsync(&mut self, tick: u64, edge: SyncEdge);
    fn vsync(&mut self, tick: u64, edge: SyncEdge);
}

/// One complete output frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Rgb>,
}

impl Frame {
    pub fn get(&self, x: usize, y: usize) -> Option<Rgb> {
        if x < self.width {
            self.pixels.get(y * self.width + x).copied()
        } else {
            None
        }
    }

    /// Packed RGB8 bytes, row-major.
    pub fn as_rgb_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

/// Rebuilds frames from the link stream: pixels fill the current line,
/// hsync ends a line that had pixels, vsync ends the frame.
#[derive(Debug, Default)]
pub struct FrameCapture {
    lines: Vec<Vec<Rgb>>,
    line: Vec<Rgb>,
    last: Option<Frame>,
    frames: u64,
    publish: Option<Arc<Mutex<Frame>>>,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also copy each completed frame into `target` (shared with a viewer).
    pub fn publishing(target: Arc<Mutex<Frame>>) -> Self {
        Self { publish: Some(target), ..Self::default() }
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last.as_ref()
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames
    }

    fn end_line(&mut self) {
        if !self.line.is_empty() {
            self.lines.push(std::mem::take(&mut self.line));
        }
    }

    fn end_frame(&mut self) {
        self.end_line();
        if self.lines.is_empty() {
            return;
        }
        let width = self.lines[0].len();
        let height = self.lines.len();
        let mut pixels = Vec::with_capacity(width * height);
        for line in self.lines.drain(..) {
            let mut line = line;
            line.resize(width, Rgb::BLACK);
            pixels.extend_from_slice(&line);
        }
        let frame = Frame { width, height, pixels };
        if let Some(target) = &self.publish {
            if let Ok(mut shared) = target.lock() {
                *shared = frame.clone();
            }
        }
        self.last = Some(frame);
        self.frames += 1;
    }
}

impl DisplayLink for FrameCapture {
    fn pixel(&mut self, _tick: u64, rgb: Rgb) {
        self.line.push(rgb);
    }

    fn hsync(&mut self, _tick: u64, edge: SyncEdge) {
        if edge == SyncEdge::Assert {
            self.end_line();
        }
    }

    fn vsync(&mut self, _tick: u64, edge: SyncEdge) {
        if edge == SyncEdge::Assert {
            self.end_frame();
        }
    }
}
