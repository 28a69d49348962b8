/// Host-bus address as asserted on the address lines.
pub type BusAddress = u16;

/// A snapshot of the host-bus lines taken at one instant.
///
/// Strobe fields are "asserted" levels (the physical lines are active-low,
/// `true` here means the host is pulling the strobe low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSample {
    pub time_ns: u64,
    pub address: BusAddress,
    pub data: u8,
    pub ior: bool,
    pub iow: bool,
    /// DMA cycle in progress; the host DMA controller owns the bus.
    pub aen: bool,
}

impl BusSample {
    /// All strobes released, AEN low.
    pub fn idle(time_ns: u64, address: BusAddress) -> Self {
        Self { time_ns, address, data: 0, ior: false, iow: false, aen: false }
    }
}

/// Which strobe produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strobe {
    Read,
    Write,
}

/// A strobe transition recovered from the sampled bus lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEdge {
    /// Strobe falling edge: start of an access.
    Assert {
        time_ns: u64,
        strobe: Strobe,
        address: BusAddress,
        data: u8,
        aen: bool,
    },
    /// Strobe rising edge: the host stops sampling/driving.
    Release { time_ns: u64, strobe: Strobe },
}

impl BusEdge {
    pub fn read(time_ns: u64, address: BusAddress) -> Self {
        Self::Assert { time_ns, strobe: Strobe::Read, address, data: 0, aen: false }
    }

    pub fn write(time_ns: u64, address: BusAddress, data: u8) -> Self {
        Self::Assert { time_ns, strobe: Strobe::Write, address, data, aen: false }
    }

    pub fn release(time_ns: u64, strobe: Strobe) -> Self {
        Self::Release { time_ns, strobe }
    }

    pub fn time_ns(&self) -> u64 {
        match *self {
            Self::Assert { time_ns, .. } | Self::Release { time_ns, .. } => time_ns,
        }
    }
}

/// Turns a stream of level samples into strobe edges.
#[derive(Debug, Default)]
pub struct BusSampler {
    last: Option<BusSample>,
}

impl BusSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; returns the edges it completes, releases first.
    ///
    /// The very first sample only primes the sampler unless a strobe is
    /// already asserted in it.
    pub fn sample(&mut self, s: BusSample) -> Vec<BusEdge> {
        let (prev_ior, prev_iow) = match self.last {
            Some(p) => (p.ior, p.iow),
            None => (false, false),
        };
        self.last = Some(s);

        let mut edges = Vec::new();
        if prev_ior && !s.ior {
            edges.push(BusEdge::release(s.time_ns, Strobe::Read));
        }
        if prev_iow && !s.iow {
            edges.push(BusEdge::release(s.time_ns, Strobe::Write));
        }
        if !prev_ior && s.ior {
            edges.push(BusEdge::Assert {
                time_ns: s.time_ns,
                strobe: Strobe::Read,
                address: s.address,
                data: s.data,
                aen: s.aen,
            });
        }
        if !prev_iow && s.iow {
            edges.push(BusEdge::Assert {
                time_ns: s.time_ns,
                strobe: Strobe::Write,
                address: s.address,
                data: s.data,
                aen: s.aen,
            });
        }
        edges
    }
}

/// The contiguous range of I/O addresses the bridge claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeWindow {
    pub base: BusAddress,
    pub decode_mask: BusAddress,
}

impl DecodeWindow {
    pub const OFFSET_MASK: BusAddress = 0x000F;

    pub fn new(base: BusAddress, decode_mask: BusAddress) -> Self {
        Self { base, decode_mask }
    }

    /// Returns true if this address selects one of our registers.
    pub fn hits(&self, address: BusAddress) -> bool {
        address & self.decode_mask == self.base
    }

    /// Register offset (0-15) for an address.
    pub fn offset(&self, address: BusAddress) -> u8 {
        (address & Self::OFFSET_MASK) as u8
    }
}
