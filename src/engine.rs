use tracing::{trace, warn};

use crate::bus::{BusAddress, BusEdge, DecodeWindow, Strobe};
use crate::fault::Fault;
use crate::regs::{ControlFlags, DmaControlFlags, RegisterRole};
use crate::state::HardwareState;

/// What the engine did with one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusResponse {
    /// Read dispatched; this byte is on the data lines until release.
    Drive(u8),
    /// Write dispatched.
    Accepted,
    /// Not ours (decode miss) or a DMA cycle (AEN). Data lines stay tri-stated.
    Ignored,
    /// Edge arrived while the previous dispatch was still running; dropped.
    Missed,
    /// Strobe released.
    Released,
}

/// Reactive interface for anything that consumes host-bus edges.
pub trait BusEdgeHandler {
    fn on_bus_edge(&mut self, edge: BusEdge) -> BusResponse;
}

/// Outcome of decoding one strobe edge. Every edge goes idle, decode,
/// then one of these, then back to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    DispatchRead,
    DispatchWrite,
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub reads: u64,
    pub writes: u64,
    pub ignored: u64,
    pub missed: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    strobe: Strobe,
    completes_at_ns: u64,
}

pub struct BusEngine {
    window: DecodeWindow,
    dispatch_ns: u64,
    busy_until_ns: u64,
    in_flight: Option<InFlight>,
    driven: Option<u8>,
    stats: EngineStats,
}

impl BusEngine {
    pub fn new(window: DecodeWindow, dispatch_ns: u64) -> Self {
        Self {
            window,
            dispatch_ns,
            busy_until_ns: 0,
            in_flight: None,
            driven: None,
            stats: EngineStats::default(),
        }
    }

    pub fn window(&self) -> DecodeWindow {
        self.window
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Byte currently driven onto the data lines, if any.
    pub fn driven(&self) -> Option<u8> {
        self.driven
    }

    /// Process one bus edge against the shared hardware state.
    pub fn on_edge(&mut self, state: &mut HardwareState, edge: BusEdge) -> BusResponse {
        match edge {
            BusEdge::Assert { time_ns, strobe, address, data, aen } => {
                let decoded = self.decode(strobe, address, aen);
                trace!(time_ns, address, ?strobe, ?decoded, "decoded");
                // Cycles we ignore never count as missed, busy or not.
                if decoded != Decoded::Ignore && time_ns < self.busy_until_ns {
                    self.stats.missed += 1;
                    warn!(time_ns, busy_until_ns = self.busy_until_ns, "strobe edge during dispatch");
                    state.faults.record(Fault::ProtocolTiming);
                    return BusResponse::Missed;
                }

                let offset = self.window.offset(address);
                let response = match decoded {
                    Decoded::DispatchRead => {
                        let value = self.dispatch_read(state, offset);
                        self.driven = Some(value);
                        self.stats.reads += 1;
                        BusResponse::Drive(value)
                    }
                    Decoded::DispatchWrite => {
                        self.dispatch_write(state, offset, data);
                        self.stats.writes += 1;
                        BusResponse::Accepted
                    }
                    Decoded::Ignore => {
                        self.stats.ignored += 1;
                        return BusResponse::Ignored;
                    }
                };

                self.busy_until_ns = time_ns + self.dispatch_ns;
                self.in_flight = Some(InFlight { strobe, completes_at_ns: self.busy_until_ns });
                response
            }
            BusEdge::Release { time_ns, strobe } => {
                if let Some(flight) = self.in_flight {
                    if flight.strobe == strobe {
                        if time_ns < flight.completes_at_ns {
                            warn!(time_ns, completes_at_ns = flight.completes_at_ns, "strobe released before dispatch completed");
                            state.faults.record(Fault::ProtocolTiming);
                        }
                        self.in_flight = None;
                        if strobe == Strobe::Read {
                            self.driven = None;
                        }
                    }
                }
                BusResponse::Released
            }
        }
    }

    fn decode(&self, strobe: Strobe, address: BusAddress, aen: bool) -> Decoded {
        if aen || !self.window.hits(address) {
            return Decoded::Ignore;
        }
        match strobe {
            Strobe::Read => Decoded::DispatchRead,
            Strobe::Write => Decoded::DispatchWrite,
        }
    }

    fn dispatch_read(&mut self, state: &mut HardwareState, offset: u8) -> u8 {
        match state.regs.role(offset) {
            RegisterRole::Status => {
                let value = state.status().bits();
                // Reading status acknowledges the vblank interrupt.
                state.irq_pending = false;
                value
            }
            RegisterRole::DmaControl => state.dma_control_readback().bits(),
            _ => state.regs.read(offset, |_| 0),
        }
    }

    fn dispatch_write(&mut self, state: &mut HardwareState, offset: u8, value: u8) {
        let role = state.regs.role(offset);
        match role {
            RegisterRole::Control => {
                let flags = ControlFlags::from_bits_retain(value);
                if flags.contains(ControlFlags::RESET_TIMING) {
                    state.timing_reset_pending = true;
                }
                let mut stored = flags;
                stored.set(ControlFlags::RESET_TIMING, state.timing_reset_pending);
                state.regs.set_control(stored);
            }
            RegisterRole::Status => {}
            RegisterRole::PaletteAddress => state.palette.set_index(value),
            RegisterRole::PaletteData => {
                state.palette.write_data(value);
            }
            RegisterRole::FramebufferAddressLo
            | RegisterRole::FramebufferAddressHi
            | RegisterRole::FramebufferAddressExt
            | RegisterRole::HResLo
            | RegisterRole::HResHi
            | RegisterRole::VResLo
            | RegisterRole::VResHi
            | RegisterRole::PixelFormat
            | RegisterRole::LineOffset
            | RegisterRole::StartAddress => state.shadow_mut().set(role, value),
            RegisterRole::DmaControl => {
                let flags = DmaControlFlags::from_bits_retain(value);
                state.faults.clear(flags & DmaControlFlags::STICKY);
                state.regs.set_dma_control(flags & (DmaControlFlags::CHAIN_ENABLE | DmaControlFlags::BLIT_ENABLE));
                if flags.contains(DmaControlFlags::BLIT_START) {
                    state.blit_start_requested = true;
                }
            }
            RegisterRole::CursorControl => state.regs.write(offset, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{PaletteCursor, Rgb};
    use crate::regs::*;
    use crate::state::VideoStatus;
    use proptest::prelude::*;

    const BASE: u16 = 0x300;

    fn make_engine() -> (BusEngine, HardwareState) {
        (BusEngine::new(DecodeWindow::new(BASE, 0xFFF0), 60), HardwareState::new(1 << 20))
    }

    /// Drive one full write cycle: assert, then release 500ns later.
    fn write(engine: &mut BusEngine, state: &mut HardwareState, t: &mut u64, offset: u8, value: u8) -> BusResponse {
        let r = engine.on_edge(state, BusEdge::write(*t, BASE + offset as u16, value));
        engine.on_edge(state, BusEdge::release(*t + 500, Strobe::Write));
        *t += 1000;
        r
    }

    fn read(engine: &mut BusEngine, state: &mut HardwareState, t: &mut u64, offset: u8) -> BusResponse {
        let r = engine.on_edge(state, BusEdge::read(*t, BASE + offset as u16));
        engine.on_edge(state, BusEdge::release(*t + 500, Strobe::Read));
        *t += 1000;
        r
    }

    #[test]
    fn test_palette_protocol_via_bus() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        write(&mut e, &mut s, &mut t, REG_PALETTE_ADDR, 10);
        write(&mut e, &mut s, &mut t, REG_PALETTE_DATA, 0x12);
        write(&mut e, &mut s, &mut t, REG_PALETTE_DATA, 0x34);
        assert_eq!(s.palette.get(10).r, 0x12);
        assert_eq!(s.palette.get(10).g, 0x34);
        assert_eq!(s.palette.cursor(), PaletteCursor { index: 10, channel: 2 });

        write(&mut e, &mut s, &mut t, REG_PALETTE_DATA, 0x56);
        assert_eq!(s.palette.get(10), Rgb::new(0x12, 0x34, 0x56));
        assert_eq!(s.palette.cursor(), PaletteCursor { index: 11, channel: 0 });
    }

    #[test]
    fn test_address_class_goes_to_shadow() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        write(&mut e, &mut s, &mut t, REG_HRES_LO, 0x40);
        write(&mut e, &mut s, &mut t, REG_HRES_HI, 0x01);
        write(&mut e, &mut s, &mut t, REG_PIXEL_FORMAT, 3);
        assert_eq!(s.shadow().width(), 320);
        assert_eq!(s.shadow().pixel_format, 3);
        assert_eq!(s.active().width(), 640);
        assert_eq!(s.descriptor().unwrap().width, 640);
    }

    #[test]
    fn test_control_applies_and_defers_reset() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        write(&mut e, &mut s, &mut t, REG_CONTROL, 0x23);
        assert!(s.regs.control().contains(ControlFlags::ENABLE_OUTPUT | ControlFlags::IRQ_ENABLE));
        assert!(s.timing_reset_pending);
        // Pending reset reads back until honoured, even if the host writes 0 to the bit.
        write(&mut e, &mut s, &mut t, REG_CONTROL, 0x01);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_CONTROL), BusResponse::Drive(0x03));
    }

    #[test]
    fn test_status_read_is_computed_and_acks_irq() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        s.video = VideoStatus { vsync: true, hsync: true, display_active: false, link_active: true };
        s.irq_pending = true;
        assert_eq!(read(&mut e, &mut s, &mut t, REG_STATUS), BusResponse::Drive(0x8B));
        assert!(!s.irq_pending);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_STATUS), BusResponse::Drive(0x0B));
    }

    #[test]
    fn test_write_only_reads_stable_zero() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        write(&mut e, &mut s, &mut t, REG_PIXEL_FORMAT, 4);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_PIXEL_FORMAT), BusResponse::Drive(0));
        assert_eq!(read(&mut e, &mut s, &mut t, REG_PIXEL_FORMAT), BusResponse::Drive(0));
    }

    #[test]
    fn test_status_write_ignored() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        assert_eq!(write(&mut e, &mut s, &mut t, REG_STATUS, 0xFF), BusResponse::Accepted);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_STATUS), BusResponse::Drive(0));
    }

    #[test]
    fn test_dma_control_sticky_bits_write_one_to_clear() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        s.faults.record(Fault::ScanoutUnderrun);
        s.faults.record(Fault::BlitBounds);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_DMA_CONTROL), BusResponse::Drive(0x01 | 0x20 | 0x08));
        write(&mut e, &mut s, &mut t, REG_DMA_CONTROL, 0x01 | 0x20);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_DMA_CONTROL), BusResponse::Drive(0x01 | 0x08));
    }

    #[test]
    fn test_dma_control_blit_start_request() {
        let (mut e, mut s) = make_engine();
        let mut t = 0;
        write(&mut e, &mut s, &mut t, REG_DMA_CONTROL, 0x07);
        assert!(s.blit_start_requested);
        assert_eq!(s.regs.dma_control(), DmaControlFlags::CHAIN_ENABLE | DmaControlFlags::BLIT_ENABLE);
        assert_eq!(read(&mut e, &mut s, &mut t, REG_DMA_CONTROL), BusResponse::Drive(0x07));
    }

    #[test]
    fn test_aen_cycle_ignored() {
        let (mut e, mut s) = make_engine();
        let edge = BusEdge::Assert { time_ns: 0, strobe: Strobe::Write, address: BASE + 2, data: 9, aen: true };
        assert_eq!(e.on_edge(&mut s, edge), BusResponse::Ignored);
        assert_eq!(s.palette.cursor(), PaletteCursor::default());
        assert_eq!(e.driven(), None);
    }

    #[test]
    fn test_second_edge_during_dispatch_is_missed() {
        let (mut e, mut s) = make_engine();
        s.regs.write(REG_CURSOR_CONTROL, 0x5A);
        assert_eq!(e.on_edge(&mut s, BusEdge::read(1000, BASE + 0xF)), BusResponse::Drive(0x5A));
        // 20ns later, well inside the 60ns dispatch.
        assert_eq!(e.on_edge(&mut s, BusEdge::read(1020, BASE + 0x1)), BusResponse::Missed);
        assert_eq!(e.driven(), Some(0x5A));
        assert_eq!(s.faults.count(Fault::ProtocolTiming), 1);
        assert_eq!(e.stats().missed, 1);

        // The next well-spaced access resynchronizes.
        e.on_edge(&mut s, BusEdge::release(1500, Strobe::Read));
        assert_eq!(e.on_edge(&mut s, BusEdge::read(2000, BASE + 0xF)), BusResponse::Drive(0x5A));
    }

    #[test]
    fn test_early_release_is_timing_fault() {
        let (mut e, mut s) = make_engine();
        e.on_edge(&mut s, BusEdge::write(0, BASE + 0xF, 1));
        e.on_edge(&mut s, BusEdge::release(30, Strobe::Write));
        assert_eq!(s.faults.count(Fault::ProtocolTiming), 1);
        // The write itself still landed.
        assert_eq!(s.regs.raw(REG_CURSOR_CONTROL), 1);
    }

    #[test]
    fn test_foreign_cycles_during_dispatch_leave_state_alone() {
        let (mut e, mut s) = make_engine();
        assert_eq!(e.on_edge(&mut s, BusEdge::write(0, BASE + 0xF, 1)), BusResponse::Accepted);
        let before = s.dma_control_readback();

        let dma = BusEdge::Assert { time_ns: 20, strobe: Strobe::Write, address: 0x3F8, data: 0, aen: true };
        assert_eq!(e.on_edge(&mut s, dma), BusResponse::Ignored);
        assert_eq!(e.on_edge(&mut s, BusEdge::read(30, 0x3F8)), BusResponse::Ignored);
        let ours_under_aen = BusEdge::Assert { time_ns: 40, strobe: Strobe::Write, address: BASE + 2, data: 9, aen: true };
        assert_eq!(e.on_edge(&mut s, ours_under_aen), BusResponse::Ignored);

        assert_eq!(s.dma_control_readback(), before);
        assert_eq!(s.faults.count(Fault::ProtocolTiming), 0);
        assert_eq!(e.stats().missed, 0);
        assert_eq!(e.stats().ignored, 3);
        assert_eq!(s.palette.cursor(), PaletteCursor::default());
    }

    proptest! {
        #[test]
        fn prop_out_of_window_changes_nothing(address in any::<u16>(), data in any::<u8>(), is_read in any::<bool>(), aen in any::<bool>()) {
            prop_assume!(aen || address & 0xFFF0 != BASE);
            let (mut e, mut s) = make_engine();
            let strobe = if is_read { Strobe::Read } else { Strobe::Write };
            let edge = BusEdge::Assert { time_ns: 0, strobe, address, data, aen };
            prop_assert_eq!(e.on_edge(&mut s, edge), BusResponse::Ignored);
            prop_assert_eq!(e.driven(), None);
            prop_assert_eq!(s.palette.cursor(), PaletteCursor::default());
            prop_assert_eq!(*s.shadow(), AddressRegisters::default());
            prop_assert_eq!(s.regs.control(), ControlFlags::empty());
            prop_assert_eq!(s.regs.dma_control(), DmaControlFlags::CHAIN_ENABLE);
            prop_assert!(!s.timing_reset_pending && !s.blit_start_requested);
        }

        #[test]
        fn prop_ignored_cycle_while_busy_changes_nothing(address in any::<u16>(), is_read in any::<bool>(), aen in any::<bool>(), delay in 0u64..60) {
            prop_assume!(aen || address & 0xFFF0 != BASE);
            let (mut e, mut s) = make_engine();
            e.on_edge(&mut s, BusEdge::write(0, BASE + 0xF, 1));
            let before = s.dma_control_readback();
            let strobe = if is_read { Strobe::Read } else { Strobe::Write };
            let edge = BusEdge::Assert { time_ns: delay, strobe, address, data: 0xFF, aen };
            prop_assert_eq!(e.on_edge(&mut s, edge), BusResponse::Ignored);
            prop_assert_eq!(s.dma_control_readback(), before);
            prop_assert_eq!(s.faults.count(Fault::ProtocolTiming), 0);
            prop_assert_eq!(e.stats().missed, 0);
        }
    }
}
