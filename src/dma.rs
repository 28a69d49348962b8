use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::fault::Fault;
use crate::framebuffer::FramebufferDescriptor;
use crate::link::{DisplayLink, SyncEdge};
use crate::palette::Rgb;
use crate::regs::ControlFlags;
use crate::scanout::{convert_line, ScanoutEngine};
use crate::state::HardwareState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Pixel,
    Blank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Armed,
    Complete,
}

/// One autonomous transfer unit and the unit it triggers on completion.
#[derive(Debug, Clone, Copy)]
pub struct TransferDescriptor {
    pub kind: TransferKind,
    pub state: TransferState,
    pub chain_to: TransferKind,
    pub completions: u64,
}

impl TransferDescriptor {
    fn new(kind: TransferKind, chain_to: TransferKind) -> Self {
        Self { kind, state: TransferState::Idle, chain_to, completions: 0 }
    }

    fn complete(&mut self) -> TransferKind {
        self.state = TransferState::Complete;
        self.completions += 1;
        self.chain_to
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaStats {
    pub lines: u64,
    pub pixel_lines: u64,
    pub underruns: u64,
    pub swaps: u64,
}

/// Two transfer descriptors linked into a ring. The pixel transfer streams
/// one line to the display link and hands off to the blank transfer, which
/// produces the sync edges and re-arms the pixel transfer.
#[derive(Debug)]
pub struct DmaChain {
    pixel: TransferDescriptor,
    blank: TransferDescriptor,
    frame: Option<FramebufferDescriptor>,
    pending_swap: Option<Option<FramebufferDescriptor>>,
    /// Last line successfully fetched, replayed on underrun.
    last_line: Vec<Rgb>,
    line_buf: Vec<Rgb>,
    memory_bytes_per_line: u32,
    stats: DmaStats,
}

impl DmaChain {
    pub fn new(frame: Option<FramebufferDescriptor>, memory_bytes_per_line: u32) -> Self {
        Self {
            pixel: TransferDescriptor::new(TransferKind::Pixel, TransferKind::Blank),
            blank: TransferDescriptor::new(TransferKind::Blank, TransferKind::Pixel),
            frame,
            pending_swap: None,
            last_line: Vec::new(),
            line_buf: Vec::new(),
            memory_bytes_per_line,
            stats: DmaStats::default(),
        }
    }

    /// Framebuffer the chain is streaming this frame.
    pub fn frame(&self) -> Option<FramebufferDescriptor> {
        self.frame
    }

    pub fn stats(&self) -> DmaStats {
        self.stats
    }

    pub fn descriptor(&self, kind: TransferKind) -> &TransferDescriptor {
        match kind {
            TransferKind::Pixel => &self.pixel,
            TransferKind::Blank => &self.blank,
        }
    }

    /// Ask for a different framebuffer. Takes effect at the next vblank
    /// boundary, never mid-frame.
    pub fn request_swap(&mut self, frame: Option<FramebufferDescriptor>) {
        self.pending_swap = Some(frame);
    }

    pub fn swap_pending(&self) -> bool {
        self.pending_swap.is_some()
    }

    /// Called at the vblank boundary.
    pub fn on_vblank(&mut self) {
        if let Some(frame) = self.pending_swap.take() {
            debug!(?frame, "framebuffer swap applied");
            self.frame = frame;
            self.stats.swaps += 1;
        }
    }

    /// Run the chain for the scanout engine's current line. The line is
    /// complete; all of its link events are emitted here.
    pub fn run_line<L: DisplayLink>(&mut self, scanout: &ScanoutEngine, state: &mut HardwareState, link: &mut L) {
        let first = if scanout.in_active_line() { TransferKind::Pixel } else { TransferKind::Blank };
        let mut queue = VecDeque::from([first]);
        while let Some(kind) = queue.pop_front() {
            match kind {
                TransferKind::Pixel => {
                    self.run_pixel(scanout, state, link);
                    queue.push_back(self.pixel.complete());
                }
                TransferKind::Blank => {
                    self.run_blank(scanout, link);
                    // Re-arm for the next line; the line itself ends here.
                    let next = self.blank.complete();
                    match next {
                        TransferKind::Pixel => self.pixel.state = TransferState::Armed,
                        TransferKind::Blank => self.blank.state = TransferState::Armed,
                    }
                }
            }
        }
        self.stats.lines += 1;
    }

    fn run_pixel<L: DisplayLink>(&mut self, scanout: &ScanoutEngine, state: &mut HardwareState, link: &mut L) {
        let timing = scanout.timing();
        let width = timing.h.visible;
        let y = scanout.line();
        self.stats.pixel_lines += 1;

        let output = state.regs.control().contains(ControlFlags::ENABLE_OUTPUT);
        let line = match self.frame {
            Some(frame) if output => scanout.scanline(&frame, y).map(|line| (frame, line)),
            _ => None,
        };

        match line {
            None => {
                self.line_buf.clear();
                self.line_buf.resize(width as usize, Rgb::BLACK);
            }
            Some((frame, line)) => {
                let fetched = if line.source.len() > self.memory_bytes_per_line as usize {
                    None
                } else {
                    state.memory.get(line.source.clone())
                };
                match fetched {
                    Some(data) => {
                        convert_line(data, frame.format, &state.palette, &line, width, &mut self.line_buf);
                        self.last_line.clone_from(&self.line_buf);
                    }
                    None => {
                        trace!(y, bytes = line.source.len(), "pixel fetch underrun");
                        state.faults.record(Fault::ScanoutUnderrun);
                        self.stats.underruns += 1;
                        self.line_buf.clone_from(&self.last_line);
                        self.line_buf.resize(width as usize, Rgb::BLACK);
                    }
                }
            }
        }

        let start = scanout.line_start_tick();
        for (x, &rgb) in self.line_buf.iter().enumerate() {
            link.pixel(start + x as u64, rgb);
        }
    }

    fn run_blank<L: DisplayLink>(&mut self, scanout: &ScanoutEngine, link: &mut L) {
        let timing = scanout.timing();
        let start = scanout.line_start_tick();
        let line = scanout.line();

        if line == timing.v.sync_start() {
            link.vsync(start, SyncEdge::Assert);
        } else if line == timing.v.sync_end() {
            link.vsync(start, SyncEdge::Deassert);
        }
        link.hsync(start + timing.h.sync_start() as u64, SyncEdge::Assert);
        link.hsync(start + timing.h.sync_end() as u64, SyncEdge::Deassert);
    }
}
