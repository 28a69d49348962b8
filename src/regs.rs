use bitflags::bitflags;

pub const REG_CONTROL: u8 = 0x0;
pub const REG_STATUS: u8 = 0x1;
pub const REG_PALETTE_ADDR: u8 = 0x2;
pub const REG_PALETTE_DATA: u8 = 0x3;
pub const REG_FB_ADDR_LO: u8 = 0x4;
pub const REG_FB_ADDR_HI: u8 = 0x5;
pub const REG_FB_ADDR_EXT: u8 = 0x6;
pub const REG_HRES_LO: u8 = 0x7;
pub const REG_HRES_HI: u8 = 0x8;
pub const REG_VRES_LO: u8 = 0x9;
pub const REG_VRES_HI: u8 = 0xA;
pub const REG_PIXEL_FORMAT: u8 = 0xB;
pub const REG_DMA_CONTROL: u8 = 0xC;
pub const REG_LINE_OFFSET: u8 = 0xD;
pub const REG_START_ADDR: u8 = 0xE;
pub const REG_CURSOR_CONTROL: u8 = 0xF;

pub const REGISTER_COUNT: usize = 16;

/// What a register offset means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRole {
    Control,
    Status,
    PaletteAddress,
    PaletteData,
    FramebufferAddressLo,
    FramebufferAddressHi,
    FramebufferAddressExt,
    HResLo,
    HResHi,
    VResLo,
    VResHi,
    PixelFormat,
    DmaControl,
    LineOffset,
    StartAddress,
    CursorControl,
}

/// How the host may access a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Plain storage, reads return the last written value.
    ReadWrite,
    /// Writes trigger a side effect; reads return zero.
    WriteOnly,
    /// Synthesized on every read; writes are ignored.
    ReadComputed,
}

/// Fixed offset to role table.
pub const ROLE_TABLE: [RegisterRole; REGISTER_COUNT] = [
    RegisterRole::Control,
    RegisterRole::Status,
    RegisterRole::PaletteAddress,
    RegisterRole::PaletteData,
    RegisterRole::FramebufferAddressLo,
    RegisterRole::FramebufferAddressHi,
    RegisterRole::FramebufferAddressExt,
    RegisterRole::HResLo,
    RegisterRole::HResHi,
    RegisterRole::VResLo,
    RegisterRole::VResHi,
    RegisterRole::PixelFormat,
    RegisterRole::DmaControl,
    RegisterRole::LineOffset,
    RegisterRole::StartAddress,
    RegisterRole::CursorControl,
];

impl RegisterRole {
    pub fn at(offset: u8) -> Self {
        ROLE_TABLE[(offset & 0x0F) as usize]
    }

    pub fn kind(&self) -> RegisterKind {
        match self {
            Self::Control | Self::DmaControl | Self::CursorControl => RegisterKind::ReadWrite,
            Self::Status => RegisterKind::ReadComputed,
            Self::PaletteAddress
            | Self::PaletteData
            | Self::FramebufferAddressLo
            | Self::FramebufferAddressHi
            | Self::FramebufferAddressExt
            | Self::HResLo
            | Self::HResHi
            | Self::VResLo
            | Self::VResHi
            | Self::PixelFormat
            | Self::LineOffset
            | Self::StartAddress => RegisterKind::WriteOnly,
        }
    }

    /// Address-class registers are staged in the shadow copy and only
    /// become visible to scanout at vertical blank.
    pub fn is_address_class(&self) -> bool {
        matches!(
            self,
            Self::FramebufferAddressLo
                | Self::FramebufferAddressHi
                | Self::FramebufferAddressExt
                | Self::HResLo
                | Self::HResHi
                | Self::VResLo
                | Self::VResHi
                | Self::PixelFormat
                | Self::LineOffset
                | Self::StartAddress
        )
    }
}

bitflags! {
    /// Control register (0x0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        const ENABLE_OUTPUT = 0x01;
        /// Deferred: honoured at the next vertical blank.
        const RESET_TIMING = 0x02;
        const MODE_SELECT = 0x1C;
        const IRQ_ENABLE = 0x20;
    }
}

impl ControlFlags {
    pub fn mode_select(&self) -> u8 {
        (self.bits() & Self::MODE_SELECT.bits()) >> 2
    }
}

bitflags! {
    /// Status register (0x1), computed on read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const VSYNC = 0x01;
        const HSYNC = 0x02;
        const DISPLAY_ENABLED = 0x04;
        const LINK_ACTIVE = 0x08;
        const CONFIG_FAULT = 0x10;
        const IRQ_PENDING = 0x80;
    }
}

bitflags! {
    /// DMA control register (0xC).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaControlFlags: u8 {
        const CHAIN_ENABLE = 0x01;
        const BLIT_ENABLE = 0x02;
        /// Write: start the blit in the command block. Read: blit busy.
        const BLIT_START = 0x04;
        const BLIT_FAULT = 0x08;
        const CONFIG_FAULT = 0x10;
        const UNDERRUN = 0x20;
        const TIMING_FAULT = 0x40;

        const STICKY = Self::BLIT_FAULT.bits()
            | Self::CONFIG_FAULT.bits()
            | Self::UNDERRUN.bits()
            | Self::TIMING_FAULT.bits();
    }
}

/// One addressable cell: its role plus the raw stored byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub role: RegisterRole,
    pub raw: u8,
}

/// Storage for the plain read/write cells.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    cells: [Register; REGISTER_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        let mut cells = [Register { role: RegisterRole::Control, raw: 0 }; REGISTER_COUNT];
        for (cell, role) in cells.iter_mut().zip(ROLE_TABLE) {
            cell.role = role;
        }
        let mut file = Self { cells };
        file.reset();
        file
    }

    /// Power-on values: output off, DMA chain running.
    pub fn reset(&mut self) {
        for cell in self.cells.iter_mut() {
            cell.raw = 0;
        }
        self.cells[REG_DMA_CONTROL as usize].raw = DmaControlFlags::CHAIN_ENABLE.bits();
    }

    pub fn role(&self, offset: u8) -> RegisterRole {
        self.cells[(offset & 0x0F) as usize].role
    }

    /// Read a cell. `computed` synthesizes read-only-computed roles.
    pub fn read(&self, offset: u8, computed: impl FnOnce(RegisterRole) -> u8) -> u8 {
        let cell = &self.cells[(offset & 0x0F) as usize];
        match cell.role.kind() {
            RegisterKind::ReadWrite => cell.raw,
            RegisterKind::WriteOnly => 0,
            RegisterKind::ReadComputed => computed(cell.role),
        }
    }

    /// Store a raw byte. Only plain read/write cells keep the value.
    pub fn write(&mut self, offset: u8, value: u8) {
        let cell = &mut self.cells[(offset & 0x0F) as usize];
        if cell.role.kind() == RegisterKind::ReadWrite {
            cell.raw = value;
        }
    }

    pub fn raw(&self, offset: u8) -> u8 {
        self.cells[(offset & 0x0F) as usize].raw
    }

    pub fn control(&self) -> ControlFlags {
        ControlFlags::from_bits_retain(self.raw(REG_CONTROL))
    }

    pub fn set_control(&mut self, flags: ControlFlags) {
        self.cells[REG_CONTROL as usize].raw = flags.bits();
    }

    pub fn dma_control(&self) -> DmaControlFlags {
        DmaControlFlags::from_bits_retain(self.raw(REG_DMA_CONTROL))
    }

    pub fn set_dma_control(&mut self, flags: DmaControlFlags) {
        self.cells[REG_DMA_CONTROL as usize].raw = flags.bits();
    }
}

/// The address-class register group. Used twice: once as the shadow copy
/// the bus writes into and once as the active copy scanout reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRegisters {
    pub fb_addr: [u8; 3],
    pub h_res: [u8; 2],
    pub v_res: [u8; 2],
    pub pixel_format: u8,
    /// Stride in units of 8 bytes, 0 = derived from width and format.
    pub line_offset: u8,
    /// Display start, in lines.
    pub start_address: u8,
}

impl Default for AddressRegisters {
    /// 640x480, 8bpp palette, base 0, auto stride.
    fn default() -> Self {
        Self {
            fb_addr: [0; 3],
            h_res: 640u16.to_le_bytes(),
            v_res: 480u16.to_le_bytes(),
            pixel_format: 2,
            line_offset: 0,
            start_address: 0,
        }
    }
}

impl AddressRegisters {
    /// Stage one byte. Non address-class roles are ignored.
    pub fn set(&mut self, role: RegisterRole, value: u8) {
        match role {
            RegisterRole::FramebufferAddressLo => self.fb_addr[0] = value,
            RegisterRole::FramebufferAddressHi => self.fb_addr[1] = value,
            RegisterRole::FramebufferAddressExt => self.fb_addr[2] = value,
            RegisterRole::HResLo => self.h_res[0] = value,
            RegisterRole::HResHi => self.h_res[1] = value,
            RegisterRole::VResLo => self.v_res[0] = value,
            RegisterRole::VResHi => self.v_res[1] = value,
            RegisterRole::PixelFormat => self.pixel_format = value,
            RegisterRole::LineOffset => self.line_offset = value,
            RegisterRole::StartAddress => self.start_address = value,
            RegisterRole::Control
            | RegisterRole::Status
            | RegisterRole::PaletteAddress
            | RegisterRole::PaletteData
            | RegisterRole::DmaControl
            | RegisterRole::CursorControl => {}
        }
    }

    /// 24-bit base address, little-endian composed.
    pub fn base(&self) -> u32 {
        u32::from_le_bytes([self.fb_addr[0], self.fb_addr[1], self.fb_addr[2], 0])
    }

    pub fn width(&self) -> u16 {
        u16::from_le_bytes(self.h_res)
    }

    pub fn height(&self) -> u16 {
        u16::from_le_bytes(self.v_res)
    }

    pub fn stride_override(&self) -> u32 {
        self.line_offset as u32 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_table_is_one_role_per_offset() {
        for (i, a) in ROLE_TABLE.iter().enumerate() {
            for b in &ROLE_TABLE[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(RegisterRole::at(REG_STATUS), RegisterRole::Status);
        assert_eq!(RegisterRole::at(REG_CURSOR_CONTROL), RegisterRole::CursorControl);
    }

    #[test]
    fn test_write_only_reads_zero() {
        let mut regs = RegisterFile::new();
        regs.write(REG_PALETTE_ADDR, 0x55);
        assert_eq!(regs.read(REG_PALETTE_ADDR, |_| 0xEE), 0);
        assert_eq!(regs.read(REG_PIXEL_FORMAT, |_| 0xEE), 0);
    }

    #[test]
    fn test_read_write_cell() {
        let mut regs = RegisterFile::new();
        regs.write(REG_CURSOR_CONTROL, 0xA5);
        assert_eq!(regs.read(REG_CURSOR_CONTROL, |_| 0), 0xA5);
    }

    #[test]
    fn test_status_is_computed() {
        let mut regs = RegisterFile::new();
        regs.write(REG_STATUS, 0xFF);
        assert_eq!(regs.raw(REG_STATUS), 0);
        assert_eq!(regs.read(REG_STATUS, |role| {
            assert_eq!(role, RegisterRole::Status);
            0x05
        }), 0x05);
    }

    #[test]
    fn test_reset_defaults() {
        let regs = RegisterFile::new();
        assert_eq!(regs.control(), ControlFlags::empty());
        assert_eq!(regs.dma_control(), DmaControlFlags::CHAIN_ENABLE);
    }

    #[test]
    fn test_mode_select_bits() {
        let c = ControlFlags::from_bits_retain(0b0000_1001);
        assert_eq!(c.mode_select(), 2);
        assert!(c.contains(ControlFlags::ENABLE_OUTPUT));
    }

    #[test]
    fn test_address_registers_compose() {
        let mut a = AddressRegisters::default();
        a.set(RegisterRole::FramebufferAddressLo, 0x34);
        a.set(RegisterRole::FramebufferAddressHi, 0x12);
        a.set(RegisterRole::FramebufferAddressExt, 0x05);
        a.set(RegisterRole::HResLo, 0x40);
        a.set(RegisterRole::HResHi, 0x01);
        a.set(RegisterRole::LineOffset, 80);
        assert_eq!(a.base(), 0x05_1234);
        assert_eq!(a.width(), 320);
        assert_eq!(a.height(), 480);
        assert_eq!(a.stride_override(), 640);
    }
}
