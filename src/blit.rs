use std::ops::Range;

use tracing::{debug, trace};

use crate::config::BLIT_COMMAND_SIZE;
use crate::error::BlitError;
use crate::framebuffer::ExternalMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitOp {
    Copy,
    Fill(u8),
    Xor,
}

impl BlitOp {
    pub fn from_code(op: u8, fill: u8) -> Result<Self, BlitError> {
        match op {
            0 => Ok(Self::Copy),
            1 => Ok(Self::Fill(fill)),
            2 => Ok(Self::Xor),
            _ => Err(BlitError::UnknownOp(op)),
        }
    }

    fn reads_source(&self) -> bool {
        !matches!(self, Self::Fill(_))
    }
}

/// A rectangular byte-wise operation in external memory. Widths and
/// strides are in bytes, so the engine is independent of pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitCommand {
    pub src: u32,
    pub dst: u32,
    pub width: u16,
    pub height: u16,
    /// 0 means `width`.
    pub src_stride: u16,
    /// 0 means `width`.
    pub dst_stride: u16,
    pub op: BlitOp,
}

impl BlitCommand {
    pub fn copy(src: u32, dst: u32, width: u16, height: u16, stride: u16) -> Self {
        Self { src, dst, width, height, src_stride: stride, dst_stride: stride, op: BlitOp::Copy }
    }

    pub fn fill(dst: u32, width: u16, height: u16, stride: u16, value: u8) -> Self {
        Self { src: 0, dst, width, height, src_stride: 0, dst_stride: stride, op: BlitOp::Fill(value) }
    }

    /// Decode the little-endian command block a register-triggered blit
    /// reads from memory.
    pub fn decode(block: &[u8; BLIT_COMMAND_SIZE as usize]) -> Result<Self, BlitError> {
        let u24 = |i: usize| u32::from_le_bytes([block[i], block[i + 1], block[i + 2], 0]);
        let u16_at = |i: usize| u16::from_le_bytes([block[i], block[i + 1]]);
        Ok(Self {
            src: u24(0),
            dst: u24(3),
            width: u16_at(6),
            height: u16_at(8),
            op: BlitOp::from_code(block[10], block[11])?,
            src_stride: u16_at(12),
            dst_stride: u16_at(14),
        })
    }

    fn stride(stride: u16, width: u16) -> u64 {
        if stride == 0 { width as u64 } else { stride as u64 }
    }

    fn span(base: u32, stride: u64, width: u16, height: u16) -> Range<u64> {
        let start = base as u64;
        if width == 0 || height == 0 {
            return start..start;
        }
        start..start + (height as u64 - 1) * stride + width as u64
    }

    pub fn source_span(&self) -> Range<u64> {
        Self::span(self.src, Self::stride(self.src_stride, self.width), self.width, self.height)
    }

    pub fn dest_span(&self) -> Range<u64> {
        Self::span(self.dst, Self::stride(self.dst_stride, self.width), self.width, self.height)
    }

    fn src_row(&self, row: u16) -> Range<usize> {
        let start = self.src as usize + row as usize * Self::stride(self.src_stride, self.width) as usize;
        start..start + self.width as usize
    }

    fn dst_row(&self, row: u16) -> Range<usize> {
        let start = self.dst as usize + row as usize * Self::stride(self.dst_stride, self.width) as usize;
        start..start + self.width as usize
    }

    /// Rows must run bottom-up when the destination overlaps the source
    /// further along in memory.
    fn runs_backwards(&self) -> bool {
        if !self.op.reads_source() {
            return false;
        }
        let (s, d) = (self.source_span(), self.dest_span());
        d.start > s.start && d.start < s.end
    }

    fn check(&self, capacity: u64) -> Result<(), BlitError> {
        let mut spans = vec![self.dest_span()];
        if self.op.reads_source() {
            spans.push(self.source_span());
        }
        for span in spans {
            if span.end > capacity {
                return Err(BlitError::Bounds { start: span.start, end: span.end, capacity });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitProgress {
    Idle,
    /// Ran out of budget; resumes next vblank.
    Partial { rows_done: u16 },
    Complete,
}

#[derive(Debug, Clone, Copy)]
struct ActiveBlit {
    cmd: BlitCommand,
    rows_done: u16,
    backwards: bool,
}

/// Validates commands on submit and runs them only during vertical blank.
#[derive(Debug, Default)]
pub struct BlitEngine {
    active: Option<ActiveBlit>,
    completed: u64,
    slices: u64,
}

impl BlitEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Blanking intervals that did blit work.
    pub fn slices(&self) -> u64 {
        self.slices
    }

    /// Accept a command for execution at the next vblank. Nothing in memory
    /// is touched until then.
    pub fn submit(&mut self, cmd: BlitCommand, capacity: u64) -> Result<(), BlitError> {
        if self.active.is_some() {
            return Err(BlitError::Busy);
        }
        cmd.check(capacity)?;
        debug!(?cmd, "blit accepted");
        self.active = Some(ActiveBlit { cmd, rows_done: 0, backwards: cmd.runs_backwards() });
        Ok(())
    }

    /// Run as many whole rows as `budget` bytes allows, at least one.
    pub fn run_slice(&mut self, memory: &mut ExternalMemory, budget: u64) -> BlitProgress {
        let Some(blit) = self.active.as_mut() else {
            return BlitProgress::Idle;
        };
        self.slices += 1;

        let cmd = blit.cmd;
        let row_cost = (cmd.width as u64).max(1);
        let mut spent = 0;
        let bytes = memory.as_mut_slice();
        while blit.rows_done < cmd.height && (spent == 0 || spent + row_cost <= budget) {
            let row = if blit.backwards { cmd.height - 1 - blit.rows_done } else { blit.rows_done };
            let dst = cmd.dst_row(row);
            match cmd.op {
                BlitOp::Copy => bytes.copy_within(cmd.src_row(row), dst.start),
                BlitOp::Fill(value) => bytes[dst].fill(value),
                BlitOp::Xor => {
                    let src = bytes[cmd.src_row(row)].to_vec();
                    for (d, s) in bytes[dst].iter_mut().zip(src) {
                        *d ^= s;
                    }
                }
            }
            blit.rows_done += 1;
            spent += row_cost;
        }

        if blit.rows_done < cmd.height {
            trace!(rows_done = blit.rows_done, height = cmd.height, "blit slice");
            return BlitProgress::Partial { rows_done: blit.rows_done };
        }
        debug!(?cmd, "blit complete");
        self.active = None;
        self.completed += 1;
        BlitProgress::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_pattern(size: u32) -> ExternalMemory {
        let mut mem = ExternalMemory::new(size);
        for (i, b) in mem.as_mut_slice().iter_mut().enumerate() {
            *b = (i * 7 % 251) as u8;
        }
        mem
    }

    #[test]
    fn test_decode_block() {
        let block = [
            0x00, 0x10, 0x00, // src 0x1000
            0x00, 0x20, 0x01, // dst 0x12000
            100, 0, 50, 0, // 100 x 50
            1, 0xAA, // fill 0xAA
            0x80, 0x02, 0x00, 0x00, // strides 640, 0
        ];
        let cmd = BlitCommand::decode(&block).unwrap();
        assert_eq!(cmd.src, 0x1000);
        assert_eq!(cmd.dst, 0x12000);
        assert_eq!((cmd.width, cmd.height), (100, 50));
        assert_eq!(cmd.op, BlitOp::Fill(0xAA));
        assert_eq!((cmd.src_stride, cmd.dst_stride), (640, 0));

        let mut bad = block;
        bad[10] = 9;
        assert_eq!(BlitCommand::decode(&bad), Err(BlitError::UnknownOp(9)));
    }

    #[test]
    fn test_bounds_rejected_without_touching_memory() {
        let mut engine = BlitEngine::new();
        let cmd = BlitCommand::copy(0, 900, 20, 10, 20);
        let err = engine.submit(cmd, 1000).unwrap_err();
        assert!(matches!(err, BlitError::Bounds { end: 1100, .. }));
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_fill_ignores_source() {
        let mut engine = BlitEngine::new();
        let mut mem = ExternalMemory::new(64);
        let cmd = BlitCommand { src: 0xFF_FFFF, ..BlitCommand::fill(8, 4, 2, 8, 0x55) };
        engine.submit(cmd, 64).unwrap();
        assert_eq!(engine.run_slice(&mut mem, 1000), BlitProgress::Complete);
        assert_eq!(&mem.as_slice()[8..12], &[0x55; 4]);
        assert_eq!(&mem.as_slice()[12..16], &[0; 4]);
        assert_eq!(&mem.as_slice()[16..20], &[0x55; 4]);
    }

    #[test]
    fn test_busy_until_complete() {
        let mut engine = BlitEngine::new();
        let mut mem = ExternalMemory::new(4096);
        engine.submit(BlitCommand::fill(0, 10, 10, 0, 1), 4096).unwrap();
        assert_eq!(engine.submit(BlitCommand::fill(0, 1, 1, 0, 1), 4096), Err(BlitError::Busy));
        assert_eq!(engine.run_slice(&mut mem, 30), BlitProgress::Partial { rows_done: 3 });
        assert_eq!(engine.run_slice(&mut mem, 30), BlitProgress::Partial { rows_done: 6 });
        assert_eq!(engine.run_slice(&mut mem, 50), BlitProgress::Complete);
        assert!(!engine.is_busy());
        assert_eq!(engine.run_slice(&mut mem, 50), BlitProgress::Idle);
        assert_eq!((engine.completed(), engine.slices()), (1, 3));
    }

    #[test]
    fn test_tiny_budget_still_progresses() {
        let mut engine = BlitEngine::new();
        let mut mem = ExternalMemory::new(4096);
        engine.submit(BlitCommand::fill(0, 100, 2, 0, 1), 4096).unwrap();
        assert_eq!(engine.run_slice(&mut mem, 1), BlitProgress::Partial { rows_done: 1 });
    }

    #[test]
    fn test_overlapping_copy_down() {
        let mut engine = BlitEngine::new();
        let mut mem = memory_with_pattern(1024);
        let before = mem.as_slice().to_vec();
        // Shift a 16x8 block down two rows within a 16-byte stride.
        engine.submit(BlitCommand::copy(0, 32, 16, 8, 16), 1024).unwrap();
        engine.run_slice(&mut mem, 1 << 20);
        assert_eq!(&mem.as_slice()[32..160], &before[0..128]);
    }

    #[test]
    fn test_overlapping_copy_up() {
        let mut engine = BlitEngine::new();
        let mut mem = memory_with_pattern(1024);
        let before = mem.as_slice().to_vec();
        engine.submit(BlitCommand::copy(32, 0, 16, 8, 16), 1024).unwrap();
        engine.run_slice(&mut mem, 1 << 20);
        assert_eq!(&mem.as_slice()[0..128], &before[32..160]);
    }

    #[test]
    fn test_xor_twice_restores() {
        let mut engine = BlitEngine::new();
        let mut mem = memory_with_pattern(1024);
        let before = mem.as_slice().to_vec();
        let cmd = BlitCommand { op: BlitOp::Xor, ..BlitCommand::copy(0, 512, 32, 4, 64) };
        engine.submit(cmd, 1024).unwrap();
        engine.run_slice(&mut mem, 1 << 20);
        assert_ne!(mem.as_slice(), &before[..]);
        engine.submit(cmd, 1024).unwrap();
        engine.run_slice(&mut mem, 1 << 20);
        assert_eq!(mem.as_slice(), &before[..]);
    }

    #[test]
    fn test_zero_sized_completes() {
        let mut engine = BlitEngine::new();
        let mut mem = ExternalMemory::new(16);
        engine.submit(BlitCommand::copy(0, 8, 16, 0, 0), 16).unwrap();
        assert_eq!(engine.run_slice(&mut mem, 10), BlitProgress::Complete);
        assert_eq!(mem.as_slice(), &[0; 16]);
    }
}
