use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::fault::{Fault, FaultLog};
use crate::framebuffer::{resolve, ExternalMemory, FramebufferDescriptor};
use crate::palette::PaletteTable;
use crate::regs::{AddressRegisters, DmaControlFlags, RegisterFile, StatusFlags};

/// Live scanout position flags, refreshed by the scanout engine before
/// every bus dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoStatus {
    pub vsync: bool,
    pub hsync: bool,
    pub display_active: bool,
    pub link_active: bool,
}

/// Hardware-visible state shared by the bus engine and scanout. The shadow
/// to active latch happens in one step, in `latch`.
#[derive(Debug)]
pub struct HardwareState {
    pub regs: RegisterFile,
    pub palette: PaletteTable,
    pub memory: ExternalMemory,
    pub faults: FaultLog,
    pub video: VideoStatus,
    shadow: AddressRegisters,
    shadow_dirty: bool,
    active: AddressRegisters,
    descriptor: Option<FramebufferDescriptor>,
    pub irq_pending: bool,
    pub timing_reset_pending: bool,
    /// Set by a blit-start write, consumed by the bridge.
    pub blit_start_requested: bool,
    /// Mirror of the blit engine's busy state for the DMA control readback.
    pub blit_busy: bool,
}

impl HardwareState {
    pub fn new(memory_size: u32) -> Self {
        let mut state = Self {
            regs: RegisterFile::new(),
            palette: PaletteTable::new(),
            memory: ExternalMemory::new(memory_size),
            faults: FaultLog::default(),
            video: VideoStatus::default(),
            shadow: AddressRegisters::default(),
            shadow_dirty: false,
            active: AddressRegisters::default(),
            descriptor: None,
            irq_pending: false,
            timing_reset_pending: false,
            blit_start_requested: false,
            blit_busy: false,
        };
        state.reset();
        state
    }

    /// Configuration reset: registers and both address copies go back to
    /// power-on values. Memory and the palette contents are kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.shadow = AddressRegisters::default();
        self.active = AddressRegisters::default();
        self.shadow_dirty = false;
        self.descriptor = resolve(&self.active, self.memory.capacity()).ok();
        self.irq_pending = false;
        self.timing_reset_pending = false;
        self.blit_start_requested = false;
    }

    pub fn shadow(&self) -> &AddressRegisters {
        &self.shadow
    }

    pub fn shadow_mut(&mut self) -> &mut AddressRegisters {
        self.shadow_dirty = true;
        &mut self.shadow
    }

    pub fn active(&self) -> &AddressRegisters {
        &self.active
    }

    /// The descriptor scanout is currently using, if any configuration has
    /// ever resolved.
    pub fn descriptor(&self) -> Option<FramebufferDescriptor> {
        self.descriptor
    }

    /// Copy the shadow registers into the active set. Called only at the
    /// vertical-blank boundary. A configuration that does not resolve is
    /// flagged and the previous one stays in force.
    ///
    /// Returns `Ok(None)` when nothing was staged since the last latch.
    pub fn latch(&mut self) -> Result<Option<FramebufferDescriptor>, ResolveError> {
        if !self.shadow_dirty {
            return Ok(None);
        }
        self.shadow_dirty = false;

        let candidate = self.shadow;
        match resolve(&candidate, self.memory.capacity()) {
            Ok(desc) => {
                self.active = candidate;
                self.descriptor = Some(desc);
                debug!(?desc, "latched framebuffer configuration");
                Ok(Some(desc))
            }
            Err(e) => {
                warn!(error = %e, "rejected framebuffer configuration, keeping previous");
                self.faults.record(Fault::OutOfRangeConfiguration);
                Err(e)
            }
        }
    }

    /// Value of the status register right now.
    pub fn status(&self) -> StatusFlags {
        let mut flags = StatusFlags::empty();
        flags.set(StatusFlags::VSYNC, self.video.vsync);
        flags.set(StatusFlags::HSYNC, self.video.hsync);
        flags.set(StatusFlags::DISPLAY_ENABLED, self.video.display_active);
        flags.set(StatusFlags::LINK_ACTIVE, self.video.link_active);
        flags.set(StatusFlags::CONFIG_FAULT, self.faults.is_set(Fault::OutOfRangeConfiguration));
        flags.set(StatusFlags::IRQ_PENDING, self.irq_pending);
        flags
    }

    /// Value of the DMA control register as the host reads it.
    pub fn dma_control_readback(&self) -> DmaControlFlags {
        let stored = self.regs.dma_control()
            & (DmaControlFlags::CHAIN_ENABLE | DmaControlFlags::BLIT_ENABLE);
        let mut flags = stored | self.faults.sticky();
        flags.set(DmaControlFlags::BLIT_START, self.blit_busy || self.blit_start_requested);
        flags
    }
}
