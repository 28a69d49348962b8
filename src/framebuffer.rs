use std::ops::Range;

use crate::error::ResolveError;
use crate::regs::AddressRegisters;

/// Pixel formats selectable through the pixel-format register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 1bpp, MSB is the leftmost pixel, palette entries 0 and 1.
    Bpp1,
    /// 4bpp, high nibble is the leftmost pixel.
    Bpp4,
    /// 8bpp palette index.
    Bpp8,
    /// 16bpp little-endian 5:6:5, red in the top bits.
    Rgb565,
    /// 24bpp, bytes in R, G, B order.
    Rgb888,
}

impl PixelFormat {
    pub fn from_register(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Bpp1),
            1 => Some(Self::Bpp4),
            2 => Some(Self::Bpp8),
            3 => Some(Self::Rgb565),
            4 => Some(Self::Rgb888),
            _ => None,
        }
    }

    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Bpp1 => 1,
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
            Self::Rgb565 => 16,
            Self::Rgb888 => 24,
        }
    }

    /// Whole bytes per pixel, rounded up for the packed formats.
    pub fn bytes_per_pixel(&self) -> u32 {
        self.bits_per_pixel().div_ceil(8)
    }

    pub fn uses_palette(&self) -> bool {
        matches!(self, Self::Bpp1 | Self::Bpp4 | Self::Bpp8)
    }

    /// Bytes occupied by `width` pixels.
    pub fn row_bytes(&self, width: u16) -> u32 {
        (width as u32 * self.bits_per_pixel()).div_ceil(8)
    }
}

/// Resolved framebuffer view, derived from the active address registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub base: u32,
    pub stride: u32,
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    /// Display start, in lines from `base`.
    pub start_line: u16,
}

impl FramebufferDescriptor {
    /// Byte range of framebuffer row `row` (0 = first displayed row).
    pub fn row_range(&self, row: u16) -> Range<usize> {
        let start = self.base as usize + (self.start_line as usize + row as usize) * self.stride as usize;
        start..start + self.format.row_bytes(self.width) as usize
    }

    /// First byte past the last row scanout can touch.
    pub fn end(&self) -> u64 {
        let lines = self.start_line as u64 + self.height as u64;
        let by_stride = self.base as u64 + lines * self.stride as u64;
        let by_last_row = self.base as u64
            + (lines - 1) * self.stride as u64
            + self.format.row_bytes(self.width) as u64;
        by_stride.max(by_last_row)
    }
}

/// Turn address registers into a descriptor, validating it against the
/// memory capacity. Pure; the caller keeps the previous descriptor when
/// this fails.
pub fn resolve(regs: &AddressRegisters, capacity: u64) -> Result<FramebufferDescriptor, ResolveError> {
    let format = PixelFormat::from_register(regs.pixel_format)
        .ok_or(ResolveError::UnknownPixelFormat(regs.pixel_format))?;

    let (width, height) = (regs.width(), regs.height());
    if width == 0 || height == 0 {
        return Err(ResolveError::ZeroSize { width, height });
    }

    let stride = match regs.stride_override() {
        0 => format.row_bytes(width),
        s => s,
    };

    let desc = FramebufferDescriptor {
        base: regs.base(),
        stride,
        width,
        height,
        format,
        start_line: regs.start_address as u16,
    };

    let end = desc.end();
    if end > capacity {
        return Err(ResolveError::ExceedsMemory { end, capacity });
    }
    Ok(desc)
}

/// External memory shared by the pixel DMA, the blit engine and the host.
#[derive(Debug, Clone)]
pub struct ExternalMemory {
    bytes: Box<[u8]>,
}

impl ExternalMemory {
    pub fn new(size: u32) -> Self {
        Self { bytes: vec![0u8; size as usize].into_boxed_slice() }
    }

    pub fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn contains(&self, range: &Range<u64>) -> bool {
        range.start <= range.end && range.end <= self.capacity()
    }

    pub fn get(&self, range: Range<usize>) -> Option<&[u8]> {
        self.bytes.get(range)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Copy `data` in at `addr`, clipped to the memory size.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let start = (addr as usize).min(self.bytes.len());
        let end = (start + data.len()).min(self.bytes.len());
        self.bytes[start..end].copy_from_slice(&data[..end - start]);
    }
}
