/// One axis of a video timing, in pixel clocks (horizontal) or lines
/// (vertical). Ordered visible, front porch, sync pulse, back porch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Axis {
    pub visible: u16,
    pub front_porch: u16,
    pub sync: u16,
    pub back_porch: u16,
}

impl Axis {
    pub const fn new(visible: u16, front_porch: u16, sync: u16, back_porch: u16) -> Self {
        Self { visible, front_porch, sync, back_porch }
    }

    pub const fn total(&self) -> u16 {
        self.visible + self.front_porch + self.sync + self.back_porch
    }

    pub const fn blank(&self) -> u16 {
        self.total() - self.visible
    }

    pub const fn sync_start(&self) -> u16 {
        self.visible + self.front_porch
    }

    pub const fn sync_end(&self) -> u16 {
        self.sync_start() + self.sync
    }

    pub fn is_visible(&self, pos: u16) -> bool {
        pos < self.visible
    }

    pub fn in_sync(&self, pos: u16) -> bool {
        pos >= self.sync_start() && pos < self.sync_end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTiming {
    pub pixel_clock_hz: u32,
    pub h: Axis,
    pub v: Axis,
}

impl VideoTiming {
    /// 640 x 480 @ 60 Hz
    pub const fn make_640x480() -> Self {
        Self {
            pixel_clock_hz: 25_175_000,
            h: Axis::new(640, 16, 96, 48),
            v: Axis::new(480, 10, 2, 33),
        }
    }

    /// 640 x 400 @ 70 Hz
    pub const fn make_640x400() -> Self {
        Self {
            pixel_clock_hz: 25_175_000,
            h: Axis::new(640, 16, 96, 48),
            v: Axis::new(400, 12, 2, 35),
        }
    }

    /// 800 x 600 @ 60 Hz
    pub const fn make_800x600() -> Self {
        Self {
            pixel_clock_hz: 40_000_000,
            h: Axis::new(800, 40, 128, 88),
            v: Axis::new(600, 1, 4, 23),
        }
    }

    pub const fn ticks_per_line(&self) -> u64 {
        self.h.total() as u64
    }

    pub const fn ticks_per_frame(&self) -> u64 {
        self.h.total() as u64 * self.v.total() as u64
    }

    /// Pixel clocks available to the blit engine in one vertical blank.
    pub const fn vblank_ticks(&self) -> u64 {
        self.h.total() as u64 * self.v.blank() as u64
    }
}

/// Output timing chosen by the control register's mode-select field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    Vga640x480,
    Vga640x400,
    Svga800x600,
}

impl VideoMode {
    /// Unassigned mode-select values fall back to 640x480.
    pub fn from_mode_select(select: u8) -> Self {
        match select {
            1 => Self::Vga640x400,
            2 => Self::Svga800x600,
            _ => Self::Vga640x480,
        }
    }

    pub fn timing(&self) -> VideoTiming {
        match self {
            Self::Vga640x480 => VideoTiming::make_640x480(),
            Self::Vga640x400 => VideoTiming::make_640x400(),
            Self::Svga800x600 => VideoTiming::make_800x600(),
        }
    }
}
