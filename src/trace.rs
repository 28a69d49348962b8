use crate::bus::{BusAddress, BusSample};
use crate::palette::Rgb;
use crate::regs::*;

/// Default I/O cycle: strobe held 500ns, next access 1us later.
pub const STROBE_NS: u64 = 500;
pub const CYCLE_NS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    /// Bus lines at an instant.
    Bus(BusSample),
    /// Write through the memory-mapped window.
    Memory { time_ns: u64, addr: u32, data: Vec<u8> },
    /// Nothing happens on the bus until `time_ns`.
    Idle { time_ns: u64 },
}

pub struct TraceBuilder {
    pub ops: Vec<HostOp>,
    pub time_ns: u64,
    base: BusAddress,
}

impl TraceBuilder {
    pub fn new(base: BusAddress) -> Self {
        Self { ops: Vec::new(), time_ns: 0, base }
    }

    fn cycle(&mut self, address: BusAddress, data: u8, ior: bool, iow: bool, aen: bool) {
        let t = self.time_ns;
        self.ops.push(HostOp::Bus(BusSample { time_ns: t, address, data, ior, iow, aen }));
        self.ops.push(HostOp::Bus(BusSample::idle(t + STROBE_NS, address)));
        self.time_ns += CYCLE_NS;
    }

    /// `OUT base+offset, value`.
    pub fn write(&mut self, offset: u8, value: u8) {
        self.cycle(self.base + offset as u16, value, false, true, false);
    }

    /// `IN base+offset`.
    pub fn read(&mut self, offset: u8) {
        self.cycle(self.base + offset as u16, 0, true, false, false);
    }

    /// Write to an absolute I/O address, ours or not.
    pub fn write_port(&mut self, address: BusAddress, value: u8) {
        self.cycle(address, value, false, true, false);
    }

    /// A DMA controller cycle that happens to carry our address.
    pub fn dma_write(&mut self, offset: u8, value: u8) {
        self.cycle(self.base + offset as u16, value, false, true, true);
    }

    /// Low byte first, into `lo` and `lo + 1`.
    pub fn write_u16(&mut self, lo: u8, value: u16) {
        let [l, h] = value.to_le_bytes();
        self.write(lo, l);
        self.write(lo + 1, h);
    }

    pub fn write_u24(&mut self, lo: u8, value: u32) {
        let [a, b, c, _] = value.to_le_bytes();
        self.write(lo, a);
        self.write(lo + 1, b);
        self.write(lo + 2, c);
    }

    /// Program consecutive palette entries starting at `index`.
    pub fn set_palette(&mut self, index: u8, colors: &[Rgb]) {
        self.write(REG_PALETTE_ADDR, index);
        for c in colors {
            self.write(REG_PALETTE_DATA, c.r);
            self.write(REG_PALETTE_DATA, c.g);
            self.write(REG_PALETTE_DATA, c.b);
        }
    }

    /// Stage a full framebuffer configuration.
    pub fn set_mode(&mut self, base: u32, width: u16, height: u16, format: u8) {
        self.write_u24(REG_FB_ADDR_LO, base);
        self.write_u16(REG_HRES_LO, width);
        self.write_u16(REG_VRES_LO, height);
        self.write(REG_PIXEL_FORMAT, format);
    }

    pub fn memory(&mut self, addr: u32, data: &[u8]) {
        self.ops.push(HostOp::Memory { time_ns: self.time_ns, addr, data: data.to_vec() });
        self.time_ns += CYCLE_NS;
    }

    pub fn idle(&mut self, ns: u64) {
        self.time_ns += ns;
        self.ops.push(HostOp::Idle { time_ns: self.time_ns });
    }

    pub fn finish(self) -> Vec<HostOp> {
        self.ops
    }
}

pub const DEMO_WIDTH: u16 = 320;
pub const DEMO_HEIGHT: u16 = 240;
/// Rows of pixel data loaded; twice the screen so the scroll has content.
pub const DEMO_ROWS: u16 = DEMO_HEIGHT * 2;

/// Bring the card up in 320x240 8bpp (doubled to 640x480) over a diagonal
/// gradient, then have the blit engine fill a box.
pub fn demo_setup(base: BusAddress, blit_command_addr: u32) -> Vec<HostOp> {
    let mut tb = TraceBuilder::new(base);

    let mut pixels = Vec::with_capacity(DEMO_WIDTH as usize * DEMO_ROWS as usize);
    for y in 0..DEMO_ROWS {
        for x in 0..DEMO_WIDTH {
            pixels.push(((x + y) % 256) as u8);
        }
    }
    tb.memory(0, &pixels);

    let ramp: Vec<Rgb> = (0..16u8).map(|i| Rgb::new(i * 17, i * 17, i * 17)).collect();
    tb.set_palette(240, &ramp);
    tb.set_mode(0, DEMO_WIDTH, DEMO_HEIGHT, 2);

    let dst = 40 * DEMO_WIDTH as u32 + 40;
    let mut block = [0u8; 16];
    block[3..6].copy_from_slice(&dst.to_le_bytes()[..3]);
    block[6..8].copy_from_slice(&64u16.to_le_bytes());
    block[8..10].copy_from_slice(&48u16.to_le_bytes());
    block[10] = 1;
    block[11] = 15;
    block[14..16].copy_from_slice(&DEMO_WIDTH.to_le_bytes());
    tb.memory(blit_command_addr, &block);

    tb.write(
        REG_DMA_CONTROL,
        (DmaControlFlags::CHAIN_ENABLE | DmaControlFlags::BLIT_ENABLE | DmaControlFlags::BLIT_START).bits(),
    );
    tb.write(REG_CONTROL, (ControlFlags::ENABLE_OUTPUT | ControlFlags::IRQ_ENABLE).bits());
    tb.finish()
}

/// One page-flip step: scroll the display start to `line` and acknowledge
/// the vblank interrupt.
pub fn scroll_step(base: BusAddress, line: u8) -> Vec<HostOp> {
    let mut tb = TraceBuilder::new(base);
    tb.read(REG_STATUS);
    tb.write(REG_START_ADDR, line);
    tb.finish()
}
