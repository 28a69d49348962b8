use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bus::DecodeWindow;
use crate::error::{BridgeError, ConfigError};

pub const MAX_MEMORY_SIZE: u32 = 1 << 24;
pub const BLIT_COMMAND_SIZE: u32 = 16;

/// Board configuration. Everything the base-address jumpers / EEPROM
/// would otherwise provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub io_base: u16,
    pub decode_mask: u16,
    /// External memory in bytes.
    pub memory_size: u32,
    /// Time one register dispatch keeps the bus engine busy.
    pub dispatch_ns: u64,
    /// Bytes the memory can hand the pixel transfer in one line period.
    pub memory_bytes_per_line: u32,
    /// Blit throughput during blanking, bytes per pixel clock.
    pub blit_bytes_per_tick: u32,
    /// Where a register-triggered blit reads its command block. Unset means
    /// the last 16 bytes of memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blit_command_addr: Option<u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            io_base: 0x300,
            decode_mask: 0xFFF0,
            memory_size: 2 * 1024 * 1024,
            dispatch_ns: 60,
            memory_bytes_per_line: 4096,
            blit_bytes_per_tick: 1,
            blit_command_addr: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decode_mask & DecodeWindow::OFFSET_MASK != 0 {
            return Err(ConfigError::DecodeMaskTooNarrow { mask: self.decode_mask });
        }
        if self.io_base & !self.decode_mask != 0 {
            return Err(ConfigError::BaseOutsideMask { base: self.io_base, mask: self.decode_mask });
        }
        if self.memory_size == 0 || self.memory_size > MAX_MEMORY_SIZE {
            return Err(ConfigError::MemorySize(self.memory_size));
        }
        if self.memory_size < BLIT_COMMAND_SIZE {
            return Err(ConfigError::MemorySize(self.memory_size));
        }
        let addr = self.blit_command_addr();
        if addr as u64 + BLIT_COMMAND_SIZE as u64 > self.memory_size as u64 {
            return Err(ConfigError::BlitCommandAddr { addr, size: self.memory_size });
        }
        if self.dispatch_ns == 0 {
            return Err(ConfigError::Zero("dispatch_ns"));
        }
        if self.blit_bytes_per_tick == 0 {
            return Err(ConfigError::Zero("blit_bytes_per_tick"));
        }
        Ok(())
    }

    /// Address of the blit command block.
    pub fn blit_command_addr(&self) -> u32 {
        self.blit_command_addr
            .unwrap_or_else(|| self.memory_size.saturating_sub(BLIT_COMMAND_SIZE))
    }

    pub fn decode_window(&self) -> DecodeWindow {
        DecodeWindow::new(self.io_base, self.decode_mask)
    }
}
