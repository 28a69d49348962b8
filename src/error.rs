/// Top-level error for the front-end and file handling.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("frame capture is empty")]
    NoFrame,

    #[error("viewer error: {0}")]
    Viewer(#[from] eframe::Error),
}

/// Rejected `BridgeConfig`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("decode mask {mask:#06x} must leave the low 4 address bits undecoded")]
    DecodeMaskTooNarrow { mask: u16 },

    #[error("I/O base {base:#06x} has bits outside decode mask {mask:#06x}")]
    BaseOutsideMask { base: u16, mask: u16 },

    #[error("memory size {0} is outside 1..=16 MiB")]
    MemorySize(u32),

    #[error("blit command block at {addr:#08x} does not fit in {size} bytes of memory")]
    BlitCommandAddr { addr: u32, size: u32 },

    #[error("{0} must be non-zero")]
    Zero(&'static str),
}

/// Why a latched framebuffer configuration was refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown pixel format {0}")]
    UnknownPixelFormat(u8),

    #[error("zero-sized mode {width}x{height}")]
    ZeroSize { width: u16, height: u16 },

    #[error("framebuffer end {end:#x} exceeds memory capacity {capacity:#x}")]
    ExceedsMemory { end: u64, capacity: u64 },
}

/// A blit command that could not be accepted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BlitError {
    #[error("blit region {start:#x}..{end:#x} outside memory of {capacity:#x} bytes")]
    Bounds { start: u64, end: u64, capacity: u64 },

    #[error("blit engine busy")]
    Busy,

    #[error("blit engine disabled")]
    Disabled,

    #[error("unknown blit operation {0}")]
    UnknownOp(u8),
}
