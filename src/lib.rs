pub mod blit;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod dma;
pub mod engine;
pub mod error;
pub mod fault;
pub mod framebuffer;
pub mod link;
pub mod palette;
pub mod regs;
pub mod scanout;
pub mod screenshot;
pub mod state;
pub mod trace;

pub use bridge::{Bridge, BridgeEvent};
pub use config::BridgeConfig;
pub use engine::{BusEdgeHandler, BusResponse};
pub use error::{BlitError, BridgeError, ConfigError, ResolveError};
pub use link::{DisplayLink, Frame, FrameCapture};
