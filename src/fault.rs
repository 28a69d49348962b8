use tracing::{trace, warn};
use crate::regs::DmaControlFlags;

/// Soft faults. Counted and latched into a sticky DMA control bit; none of
/// them stop the engine or scanout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A strobe edge arrived while the previous dispatch was still running,
    /// or a strobe was released before its dispatch completed.
    ProtocolTiming,
    /// A latched configuration would not fit in external memory.
    OutOfRangeConfiguration,
    /// The pixel source could not keep up; the previous line was repeated.
    ScanoutUnderrun,
    /// A blit command touched memory outside external memory.
    BlitBounds,
}

impl Fault {
    const ALL: [Fault; 4] = [
        Fault::ProtocolTiming,
        Fault::OutOfRangeConfiguration,
        Fault::ScanoutUnderrun,
        Fault::BlitBounds,
    ];

    fn slot(self) -> usize {
        match self {
            Fault::ProtocolTiming => 0,
            Fault::OutOfRangeConfiguration => 1,
            Fault::ScanoutUnderrun => 2,
            Fault::BlitBounds => 3,
        }
    }

    /// The DMA control bit that latches this fault.
    pub fn sticky_bit(self) -> DmaControlFlags {
        match self {
            Fault::ProtocolTiming => DmaControlFlags::TIMING_FAULT,
            Fault::OutOfRangeConfiguration => DmaControlFlags::CONFIG_FAULT,
            Fault::ScanoutUnderrun => DmaControlFlags::UNDERRUN,
            Fault::BlitBounds => DmaControlFlags::BLIT_FAULT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FaultLog {
    counts: [u64; 4],
    sticky: u8,
}

impl FaultLog {
    /// Count `fault` and latch its sticky bit. Only the occurrence that sets
    /// the bit logs a warning; repeats while it stays latched go to trace.
    /// Returns whether this call set the bit.
    pub fn record(&mut self, fault: Fault) -> bool {
        self.counts[fault.slot()] += 1;
        let count = self.counts[fault.slot()];
        let latched = !self.is_set(fault);
        self.sticky |= fault.sticky_bit().bits();
        if latched {
            warn!(?fault, count, "fault recorded");
        } else {
            trace!(?fault, count, "fault repeated");
        }
        latched
    }

    pub fn count(&self, fault: Fault) -> u64 {
        self.counts[fault.slot()]
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.sticky & fault.sticky_bit().bits() != 0
    }

    /// Sticky bits as they appear in the DMA control readback.
    pub fn sticky(&self) -> DmaControlFlags {
        DmaControlFlags::from_bits_retain(self.sticky)
    }

    /// Write-1-to-clear. Counters are not reset.
    pub fn clear(&mut self, mask: DmaControlFlags) {
        for fault in Fault::ALL {
            if mask.contains(fault.sticky_bit()) {
                self.sticky &= !fault.sticky_bit().bits();
            }
        }
    }
}
