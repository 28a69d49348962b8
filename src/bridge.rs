use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::blit::{BlitCommand, BlitEngine, BlitProgress};
use crate::bus::{BusEdge, BusSample, BusSampler};
use crate::config::{BridgeConfig, BLIT_COMMAND_SIZE};
use crate::dma::DmaChain;
use crate::engine::{BusEdgeHandler, BusEngine, BusResponse};
use crate::error::{BlitError, ConfigError};
use crate::fault::Fault;
use crate::framebuffer::FramebufferDescriptor;
use crate::link::DisplayLink;
use crate::regs::{ControlFlags, DmaControlFlags};
use crate::scanout::timing::VideoMode;
use crate::scanout::{LineAdvance, ScanoutEngine};
use crate::state::HardwareState;
use crate::trace::HostOp;

/// Notifications for the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Vertical blank `frame` started at `time_ns`.
    Vblank { frame: u64, time_ns: u64 },
    BlitComplete,
}

/// Maps bus time to pixel clocks. Rebased whenever the pixel clock changes.
#[derive(Debug, Clone, Copy)]
struct TimeBase {
    ns: u64,
    tick: u64,
    clock_hz: u32,
}

impl TimeBase {
    fn tick_at(&self, ns: u64) -> u64 {
        let elapsed = ns.saturating_sub(self.ns) as u128;
        self.tick + (elapsed * self.clock_hz as u128 / 1_000_000_000) as u64
    }

    fn ns_at(&self, tick: u64) -> u64 {
        let elapsed = tick.saturating_sub(self.tick) as u128;
        self.ns + (elapsed * 1_000_000_000 / self.clock_hz as u128) as u64
    }
}

pub struct Bridge<L: DisplayLink> {
    config: BridgeConfig,
    state: HardwareState,
    engine: BusEngine,
    sampler: BusSampler,
    scanout: ScanoutEngine,
    chain: DmaChain,
    blit: BlitEngine,
    link: L,
    time: TimeBase,
    now_ns: u64,
    vblanks: u64,
    events: Option<Sender<BridgeEvent>>,
}

impl<L: DisplayLink> Bridge<L> {
    pub fn new(config: BridgeConfig, link: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = HardwareState::new(config.memory_size);
        let mode = VideoMode::from_mode_select(state.regs.control().mode_select());
        let scanout = ScanoutEngine::new(mode);
        let chain = DmaChain::new(state.descriptor(), config.memory_bytes_per_line);
        let time = TimeBase { ns: 0, tick: 0, clock_hz: scanout.timing().pixel_clock_hz };
        info!(
            io_base = config.io_base,
            memory_size = config.memory_size,
            ?mode,
            "bridge powered on"
        );
        Ok(Self {
            engine: BusEngine::new(config.decode_window(), config.dispatch_ns),
            sampler: BusSampler::new(),
            blit: BlitEngine::new(),
            config,
            state,
            scanout,
            chain,
            link,
            time,
            now_ns: 0,
            vblanks: 0,
            events: None,
        })
    }

    /// Report vblanks and blit completion on `tx`.
    pub fn with_events(mut self, tx: Sender<BridgeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> &HardwareState {
        &self.state
    }

    pub fn engine(&self) -> &BusEngine {
        &self.engine
    }

    pub fn scanout(&self) -> &ScanoutEngine {
        &self.scanout
    }

    pub fn chain(&self) -> &DmaChain {
        &self.chain
    }

    pub fn blit_engine(&self) -> &BlitEngine {
        &self.blit
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    pub fn vblanks(&self) -> u64 {
        self.vblanks
    }

    /// Descriptor scanout uses for the next frame.
    pub fn active_descriptor(&self) -> Option<FramebufferDescriptor> {
        self.state.descriptor()
    }

    /// Level of the interrupt request line.
    pub fn irq_asserted(&self) -> bool {
        self.state.irq_pending && self.state.regs.control().contains(ControlFlags::IRQ_ENABLE)
    }

    /// Host write through the memory-mapped window into external memory.
    pub fn load_memory(&mut self, addr: u32, data: &[u8]) {
        self.state.memory.load(addr, data);
    }

    /// Feed one level sample of the host-bus lines.
    pub fn sample(&mut self, s: BusSample) -> Vec<BusResponse> {
        let edges = self.sampler.sample(s);
        if edges.is_empty() {
            self.advance_to(s.time_ns);
        }
        edges.into_iter().map(|edge| self.on_bus_edge(edge)).collect()
    }

    /// Play a host trace. Trace times are relative to the current time.
    pub fn replay(&mut self, ops: &[HostOp]) -> Vec<BusResponse> {
        let origin = self.now_ns;
        let mut responses = Vec::new();
        for op in ops {
            match op {
                HostOp::Bus(s) => {
                    let s = BusSample { time_ns: origin + s.time_ns, ..*s };
                    responses.extend(self.sample(s));
                }
                HostOp::Memory { time_ns, addr, data } => {
                    self.advance_to(origin + time_ns);
                    self.load_memory(*addr, data);
                }
                HostOp::Idle { time_ns } => self.advance_to(origin + time_ns),
            }
        }
        responses
    }

    /// Run scanout up to bus time `ns`.
    pub fn advance_to(&mut self, ns: u64) {
        while self.scanout.line_end_tick() <= self.time.tick_at(ns) {
            self.finish_line();
        }
        self.now_ns = self.now_ns.max(ns);
    }

    /// Run scanout until `frames` more vertical blanks have started.
    pub fn run_frames(&mut self, frames: u64) {
        let target = self.vblanks + frames;
        while self.vblanks < target {
            self.finish_line();
        }
        self.now_ns = self.now_ns.max(self.time.ns_at(self.scanout.line_start_tick()));
    }

    /// Queue a blit for the next vertical blank.
    pub fn submit_blit(&mut self, cmd: BlitCommand) -> Result<(), BlitError> {
        let result = self.blit.submit(cmd, self.state.memory.capacity());
        if let Err(e) = &result {
            self.reject_blit(e);
        }
        self.state.blit_busy = self.blit.is_busy();
        result
    }

    fn reject_blit(&mut self, e: &BlitError) {
        warn!(error = %e, "blit rejected");
        if *e != BlitError::Busy {
            self.state.faults.record(Fault::BlitBounds);
        }
    }

    fn start_register_blit(&mut self) -> Result<(), BlitError> {
        if !self.state.regs.dma_control().contains(DmaControlFlags::BLIT_ENABLE) {
            return Err(BlitError::Disabled);
        }
        let start = self.config.blit_command_addr() as usize;
        let block: [u8; BLIT_COMMAND_SIZE as usize] = self
            .state
            .memory
            .get(start..start + BLIT_COMMAND_SIZE as usize)
            .and_then(|b| b.try_into().ok())
            .ok_or(BlitError::Bounds {
                start: start as u64,
                end: start as u64 + BLIT_COMMAND_SIZE as u64,
                capacity: self.state.memory.capacity(),
            })?;
        let cmd = BlitCommand::decode(&block)?;
        self.blit.submit(cmd, self.state.memory.capacity())
    }

    fn finish_line(&mut self) {
        if self.state.regs.dma_control().contains(DmaControlFlags::CHAIN_ENABLE) {
            self.chain.run_line(&self.scanout, &mut self.state, &mut self.link);
        }
        match self.scanout.advance_line() {
            LineAdvance::VblankStart => self.on_vblank(),
            LineAdvance::Next | LineAdvance::FrameStart => {}
        }
    }

    /// The single synchronization point between the host side and scanout.
    fn on_vblank(&mut self) {
        self.vblanks += 1;

        if let Ok(Some(desc)) = self.state.latch() {
            self.chain.request_swap(Some(desc));
        }
        self.chain.on_vblank();

        if self.state.timing_reset_pending {
            self.restart_timing();
        }

        if std::mem::take(&mut self.state.blit_start_requested) {
            if let Err(e) = self.start_register_blit() {
                self.reject_blit(&e);
            }
        }
        let budget = self.scanout.timing().vblank_ticks() * self.config.blit_bytes_per_tick as u64;
        if self.blit.run_slice(&mut self.state.memory, budget) == BlitProgress::Complete {
            self.notify(BridgeEvent::BlitComplete);
        }
        self.state.blit_busy = self.blit.is_busy();

        if self.state.regs.control().contains(ControlFlags::IRQ_ENABLE) {
            self.state.irq_pending = true;
        }

        let time_ns = self.time.ns_at(self.scanout.line_start_tick());
        debug!(frame = self.vblanks, time_ns, "vblank");
        self.notify(BridgeEvent::Vblank { frame: self.vblanks, time_ns });
    }

    fn restart_timing(&mut self) {
        let control = self.state.regs.control();
        let mode = VideoMode::from_mode_select(control.mode_select());
        let tick = self.scanout.line_start_tick();
        let ns = self.time.ns_at(tick);
        self.scanout.restart(mode);
        self.time = TimeBase { ns, tick, clock_hz: self.scanout.timing().pixel_clock_hz };
        self.state.timing_reset_pending = false;
        self.state.regs.set_control(control - ControlFlags::RESET_TIMING);
        info!(?mode, "timing generator restarted");
    }

    fn notify(&mut self, event: BridgeEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("event receiver gone");
                self.events = None;
            }
        }
    }
}

impl<L: DisplayLink> BusEdgeHandler for Bridge<L> {
    fn on_bus_edge(&mut self, edge: BusEdge) -> BusResponse {
        let time_ns = edge.time_ns();
        self.advance_to(time_ns);

        let output = self.state.regs.control().contains(ControlFlags::ENABLE_OUTPUT);
        let chain = self.state.regs.dma_control().contains(DmaControlFlags::CHAIN_ENABLE);
        self.state.video = self.scanout.status_at(self.time.tick_at(time_ns), output, chain);

        self.engine.on_edge(&mut self.state, edge)
    }
}
