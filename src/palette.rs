use bytemuck::{Pod, Zeroable};

/// One 24-bit colour, as stored in a palette entry and as sent to the link.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Expand a 5:6:5 pixel (red in bits 15:11) to 8 bits per channel.
    pub fn from_rgb565(raw: u16) -> Self {
        let r5 = ((raw >> 11) & 0x1F) as u8;
        let g6 = ((raw >> 5) & 0x3F) as u8;
        let b5 = (raw & 0x1F) as u8;
        Self {
            r: (r5 << 3) | (r5 >> 2),
            g: (g6 << 2) | (g6 >> 4),
            b: (b5 << 3) | (b5 >> 2),
        }
    }

    pub fn channel(&self, channel: u8) -> u8 {
        match channel {
            0 => self.r,
            1 => self.g,
            _ => self.b,
        }
    }

    fn set_channel(&mut self, channel: u8, value: u8) {
        match channel {
            0 => self.r = value,
            1 => self.g = value,
            _ => self.b = value,
        }
    }
}

pub const PALETTE_SIZE: usize = 256;

/// Power-on palette: the 256-colour terminal table.
/// 0-15 ANSI colours, 16-231 a 6x6x6 cube, 232-255 a grey ramp.
pub const DEFAULT_PALETTE: [Rgb; PALETTE_SIZE] = {
    let mut p = [Rgb::BLACK; PALETTE_SIZE];

    p[1] = Rgb::new(205, 0, 0);
    p[2] = Rgb::new(0, 205, 0);
    p[3] = Rgb::new(205, 205, 0);
    p[4] = Rgb::new(0, 0, 238);
    p[5] = Rgb::new(205, 0, 205);
    p[6] = Rgb::new(0, 205, 205);
    p[7] = Rgb::new(229, 229, 229);
    p[8] = Rgb::new(127, 127, 127);
    p[9] = Rgb::new(255, 0, 0);
    p[10] = Rgb::new(0, 255, 0);
    p[11] = Rgb::new(255, 255, 0);
    p[12] = Rgb::new(92, 92, 255);
    p[13] = Rgb::new(255, 0, 255);
    p[14] = Rgb::new(0, 255, 255);
    p[15] = Rgb::new(255, 255, 255);

    let levels: [u8; 6] = [0, 95, 135, 175, 215, 255];
    let mut i = 16;
    let mut ri = 0;
    while ri < 6 {
        let mut gi = 0;
        while gi < 6 {
            let mut bi = 0;
            while bi < 6 {
                p[i] = Rgb::new(levels[ri], levels[gi], levels[bi]);
                i += 1;
                bi += 1;
            }
            gi += 1;
        }
        ri += 1;
    }

    let mut g = 0u16;
    while g < 24 {
        let v = (8 + g * 10) as u8;
        p[232 + g as usize] = Rgb::new(v, v, v);
        g += 1;
    }

    p
};

/// Position of the DAC-style write cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaletteCursor {
    pub index: u8,
    /// 0 = red, 1 = green, 2 = blue.
    pub channel: u8,
}

/// Indexed colour lookup with a sequential R,G,B write protocol.
///
/// A sequence of fewer than three data writes leaves the entry partially
/// updated and the cursor parked on it; the next data write continues
/// from the parked channel.
#[derive(Debug, Clone)]
pub struct PaletteTable {
    entries: Box<[Rgb; PALETTE_SIZE]>,
    cursor: PaletteCursor,
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PaletteTable {
    pub fn new() -> Self {
        Self {
            entries: Box::new(DEFAULT_PALETTE),
            cursor: PaletteCursor::default(),
        }
    }

    pub fn cursor(&self) -> PaletteCursor {
        self.cursor
    }

    /// Palette-address register write.
    pub fn set_index(&mut self, index: u8) {
        self.cursor = PaletteCursor { index, channel: 0 };
    }

    /// Palette-data register write. Returns true when this byte completed
    /// an entry.
    pub fn write_data(&mut self, value: u8) -> bool {
        let PaletteCursor { index, channel } = self.cursor;
        self.entries[index as usize].set_channel(channel, value);
        if channel == 2 {
            self.cursor = PaletteCursor { index: index.wrapping_add(1), channel: 0 };
            true
        } else {
            self.cursor.channel = channel + 1;
            false
        }
    }

    pub fn get(&self, index: u8) -> Rgb {
        self.entries[index as usize]
    }

    pub fn entries(&self) -> &[Rgb; PALETTE_SIZE] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_palette_ansi_colors() {
        assert_eq!(DEFAULT_PALETTE[0], Rgb::BLACK);
        assert_eq!(DEFAULT_PALETTE[1], Rgb::new(205, 0, 0));
        assert_eq!(DEFAULT_PALETTE[15], Rgb::new(255, 255, 255));
    }

    #[test]
    fn test_default_palette_cube_and_ramp() {
        assert_eq!(DEFAULT_PALETTE[21], Rgb::new(0, 0, 255));
        assert_eq!(DEFAULT_PALETTE[196], Rgb::new(255, 0, 0));
        assert_eq!(DEFAULT_PALETTE[232], Rgb::new(8, 8, 8));
        assert_eq!(DEFAULT_PALETTE[255], Rgb::new(238, 238, 238));
    }

    #[test]
    fn test_rgb565_expansion() {
        assert_eq!(Rgb::from_rgb565(0xFFFF), Rgb::new(255, 255, 255));
        assert_eq!(Rgb::from_rgb565(0xF800), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::from_rgb565(0x07E0), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_rgb565(0x001F), Rgb::new(0, 0, 255));
        assert_eq!(Rgb::from_rgb565(0x0000), Rgb::BLACK);
    }

    #[test]
    fn test_full_triplet_advances_cursor() {
        let mut pal = PaletteTable::new();
        pal.set_index(7);
        assert!(!pal.write_data(0x11));
        assert!(!pal.write_data(0x22));
        assert!(pal.write_data(0x33));
        assert_eq!(pal.get(7), Rgb::new(0x11, 0x22, 0x33));
        assert_eq!(pal.cursor(), PaletteCursor { index: 8, channel: 0 });
    }

    #[test]
    fn test_partial_triplet_parks_cursor() {
        let mut pal = PaletteTable::new();
        let old_b = pal.get(10).b;
        pal.set_index(10);
        pal.write_data(0x12);
        pal.write_data(0x34);
        assert_eq!(pal.get(10), Rgb::new(0x12, 0x34, old_b));
        assert_eq!(pal.cursor(), PaletteCursor { index: 10, channel: 2 });
    }

    #[test]
    fn test_index_write_resets_channel() {
        let mut pal = PaletteTable::new();
        pal.set_index(3);
        pal.write_data(0xAA);
        pal.set_index(4);
        assert_eq!(pal.cursor(), PaletteCursor { index: 4, channel: 0 });
    }

    #[test]
    fn test_cursor_wraps_at_255() {
        let mut pal = PaletteTable::new();
        pal.set_index(255);
        pal.write_data(1);
        pal.write_data(2);
        pal.write_data(3);
        assert_eq!(pal.get(255), Rgb::new(1, 2, 3));
        assert_eq!(pal.cursor().index, 0);
    }

    proptest! {
        #[test]
        fn prop_256_triplets_return_cursor(start in any::<u8>(), seed in any::<u8>()) {
            let mut pal = PaletteTable::new();
            pal.set_index(start);
            for i in 0..256u32 {
                let v = (i as u8).wrapping_add(seed);
                pal.write_data(v);
                pal.write_data(v ^ 0x55);
                pal.write_data(v ^ 0xAA);
            }
            prop_assert_eq!(pal.cursor(), PaletteCursor { index: start, channel: 0 });
        }

        #[test]
        fn prop_triplet_lands_at_index(index in any::<u8>(), r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let mut pal = PaletteTable::new();
            pal.set_index(index);
            pal.write_data(r);
            pal.write_data(g);
            pal.write_data(b);
            prop_assert_eq!(pal.get(index), Rgb::new(r, g, b));
            prop_assert_eq!(pal.cursor(), PaletteCursor { index: index.wrapping_add(1), channel: 0 });
        }
    }
}
