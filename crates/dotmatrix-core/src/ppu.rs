// Screen resolution produced by the pixel unit
const SCREEN_WIDTH: usize = 160;
const SCREEN_HEIGHT: usize = 144;

// Timing per LCD mode in clock ticks. Pixel transfer stretches by the fine
// horizontal scroll (SCX & 7) and H-blank shrinks by the same amount, so a
// scanline is always 456 ticks.
const OAM_SCAN_TICKS: u16 = 84;
const TRANSFER_BASE_TICKS: u16 = 172;
const HBLANK_BASE_TICKS: u16 = 200;
const LINE_TICKS: u16 = 456;

// Number of lines spent in V-blank
const VBLANK_LINES: u8 = 10;

// On the final V-blank line, LY reads back 0 from this tick onward even
// though the line still runs to its full length.
const LAST_LINE_LY_RESET_TICK: u16 = 56;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

// Internal memory sizes
const VRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// VRAM layout constants
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const TILE_DATA_0_BASE: usize = 0x0000;
const TILE_DATA_1_BASE: usize = 0x0800;

/// LCD controller mode, exposed in STAT bits 1-0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    HBlank,
    VBlank,
    OamScan,
    PixelTransfer,
}

impl Mode {
    pub fn bits(self) -> u8 {
        match self {
            Mode::HBlank => 0,
            Mode::VBlank => 1,
            Mode::OamScan => 2,
            Mode::PixelTransfer => 3,
        }
    }
}

#[derive(Copy, Clone, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
}

pub struct Ppu {
    pub vram: [u8; VRAM_SIZE],
    pub oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_eq_ly: bool,
    /// Last value written to the DMA register; the transfer itself is
    /// carried out by the bus.
    pub dma: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal window line counter
    win_line_counter: u8,

    pub mode: Mode,
    mode_clock: u16,
    /// SCX & 7, latched when pixel transfer begins.
    transfer_extra: u16,
    last_line_ly_cleared: bool,

    /// Latched sprites for the current scanline, in OAM table order
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    line_color_zero: [bool; SCREEN_WIDTH],

    /// Palette-mapped shade (0-3) per pixel
    pub framebuffer: [u8; SCREEN_WIDTH * SCREEN_HEIGHT],
    /// Indicates a completed frame is available in `framebuffer`
    frame_ready: bool,
    stat_irq_line: bool,
    frame_counter: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_eq_ly: false,
            dma: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            win_line_counter: 0,
            mode: Mode::OamScan,
            mode_clock: 0,
            transfer_extra: 0,
            last_line_ly_cleared: false,
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            line_color_zero: [false; SCREEN_WIDTH],
            framebuffer: [0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frame_ready: false,
            stat_irq_line: false,
            frame_counter: 0,
        }
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & 0x80 != 0
    }

    /// VRAM is only blocked from the CPU while the display is on and pixels
    /// are being transferred.
    pub fn vram_accessible(&self) -> bool {
        !self.lcd_enabled() || self.mode != Mode::PixelTransfer
    }

    pub fn oam_accessible(&self) -> bool {
        !self.lcd_enabled() || self.mode != Mode::PixelTransfer
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    /// Returns true if a full frame has been rendered and is ready to display.
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    /// Clears the frame ready flag after a frame has been consumed.
    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// Returns the number of frames completed since power on.
    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    pub fn framebuffer(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.framebuffer
    }

    /// Returns the current value of the internal window line counter.
    pub fn window_line_counter(&self) -> u8 {
        self.win_line_counter
    }

    /// All LY changes funnel through here so the LY==LYC comparison can
    /// never go stale.
    fn set_ly(&mut self, val: u8) {
        self.ly = val;
        self.update_lyc_compare();
    }

    fn update_lyc_compare(&mut self) {
        if self.lcd_enabled() {
            self.lyc_eq_ly = self.ly == self.lyc;
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                (self.stat & 0x78)
                    | 0x80
                    | self.mode.bits()
                    | if self.lyc_eq_ly { 0x04 } else { 0 }
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF46 => self.dma,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.lcdc = val;
                if was_on && !self.lcd_enabled() {
                    self.mode = Mode::HBlank;
                    self.mode_clock = 0;
                    self.transfer_extra = 0;
                    self.win_line_counter = 0;
                    self.last_line_ly_cleared = false;
                    self.ly = 0;
                } else if !was_on && self.lcd_enabled() {
                    // Turning the display on restarts scanning from line 0.
                    self.mode = Mode::OamScan;
                    self.mode_clock = 0;
                    self.set_ly(0);
                }
            }
            0xFF41 => self.stat = (self.stat & 0x07) | (val & 0xF8),
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => self.set_ly(0),
            0xFF45 => {
                self.lyc = val;
                self.update_lyc_compare();
            }
            0xFF46 => self.dma = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    pub fn step(&mut self, ticks: u16, if_reg: &mut u8) {
        let mut remaining = ticks;
        while remaining > 0 {
            let increment = remaining.min(4);
            remaining -= increment;

            if !self.lcd_enabled() {
                self.mode = Mode::HBlank;
                self.ly = 0;
                self.mode_clock = 0;
                self.win_line_counter = 0;
                continue;
            }

            self.update_lyc_compare();
            self.mode_clock += increment;

            match self.mode {
                Mode::OamScan => {
                    if self.mode_clock >= OAM_SCAN_TICKS {
                        self.mode_clock -= OAM_SCAN_TICKS;
                        self.oam_scan();
                        self.transfer_extra = (self.scx & 0x07) as u16;
                        self.mode = Mode::PixelTransfer;
                    }
                }
                Mode::PixelTransfer => {
                    if self.mode_clock >= TRANSFER_BASE_TICKS + self.transfer_extra {
                        self.mode_clock -= TRANSFER_BASE_TICKS + self.transfer_extra;
                        self.render_scanline();
                        self.mode = Mode::HBlank;
                    }
                }
                Mode::HBlank => {
                    if self.mode_clock >= HBLANK_BASE_TICKS - self.transfer_extra {
                        self.mode_clock -= HBLANK_BASE_TICKS - self.transfer_extra;
                        self.set_ly(self.ly + 1);
                        if self.ly == SCREEN_HEIGHT as u8 {
                            self.mode = Mode::VBlank;
                            self.frame_ready = true;
                            self.frame_counter = self.frame_counter.wrapping_add(1);
                            *if_reg |= 0x01;
                        } else {
                            self.mode = Mode::OamScan;
                        }
                    }
                }
                Mode::VBlank => {
                    if !self.last_line_ly_cleared
                        && self.ly == SCREEN_HEIGHT as u8 + VBLANK_LINES - 1
                        && self.mode_clock >= LAST_LINE_LY_RESET_TICK
                    {
                        self.last_line_ly_cleared = true;
                        self.set_ly(0);
                    }
                    if self.mode_clock >= LINE_TICKS {
                        self.mode_clock -= LINE_TICKS;
                        if self.last_line_ly_cleared {
                            self.last_line_ly_cleared = false;
                            self.win_line_counter = 0;
                            self.mode = Mode::OamScan;
                        } else {
                            self.set_ly(self.ly + 1);
                        }
                    }
                }
            }

            self.update_stat_irq(if_reg);
        }
    }

    /// One level-triggered line ORs every enabled STAT source; the interrupt
    /// flag is set only on the line's rising edge. A source that is already
    /// holding the line high masks any source that joins it.
    fn update_stat_irq(&mut self, if_reg: &mut u8) {
        let coincidence = self.lyc_eq_ly && self.stat & 0x40 != 0;
        let mode_signal = match self.mode {
            Mode::HBlank => self.stat & 0x08 != 0,
            Mode::VBlank => self.stat & 0x10 != 0,
            Mode::OamScan => self.stat & 0x20 != 0,
            Mode::PixelTransfer => false,
        };
        let current = coincidence || mode_signal;
        if current && !self.stat_irq_line {
            *if_reg |= 0x02;
        }
        self.stat_irq_line = current;
    }

    /// Collect up to 10 sprites visible on the current scanline, in OAM
    /// table order.
    fn oam_scan(&mut self) {
        let sprite_height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = self.oam[base] as i16 - 16;
            if self.ly as i16 >= y && (self.ly as i16) < y + sprite_height {
                self.line_sprites[self.sprite_count] = Sprite {
                    x: self.oam[base + 1] as i16 - 8,
                    y,
                    tile: self.oam[base + 2],
                    flags: self.oam[base + 3],
                };
                self.sprite_count += 1;
            }
        }
    }

    #[inline(always)]
    fn shade(palette: u8, color_id: u8) -> u8 {
        (palette >> (color_id * 2)) & 0x03
    }

    fn tile_data_addr(&self, tile_index: u8) -> usize {
        if self.lcdc & 0x10 != 0 {
            TILE_DATA_0_BASE + tile_index as usize * 16
        } else {
            TILE_DATA_1_BASE + ((tile_index as i8 as i16 + 128) as usize) * 16
        }
    }

    fn render_scanline(&mut self) {
        if !self.lcd_enabled() || self.ly as usize >= SCREEN_HEIGHT {
            return;
        }

        let bg_enabled = self.lcdc & 0x01 != 0;

        // Pre-fill the scanline. With the background disabled the hardware
        // outputs color 0 everywhere and sprites treat the whole line as
        // color 0.
        let fill = Self::shade(self.bgp, 0);
        let row = self.ly as usize * SCREEN_WIDTH;
        for x in 0..SCREEN_WIDTH {
            self.framebuffer[row + x] = fill;
            self.line_color_zero[x] = true;
        }

        if bg_enabled {
            let tile_map_base = if self.lcdc & 0x08 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };

            for x in 0..SCREEN_WIDTH as u16 {
                let px = x.wrapping_add(self.scx as u16) & 0xFF;
                let py = (self.ly as u16 + self.scy as u16) & 0xFF;
                let tile_col = (px / 8) as usize;
                let tile_row = (py / 8) as usize;
                let tile_y = (py % 8) as usize;

                let tile_index = self.vram[tile_map_base + tile_row * 32 + tile_col];
                let addr = self.tile_data_addr(tile_index);
                let bit = 7 - (px % 8) as usize;
                let lo = self.vram[addr + tile_y * 2];
                let hi = self.vram[addr + tile_y * 2 + 1];
                let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);

                self.framebuffer[row + x as usize] = Self::shade(self.bgp, color_id);
                self.line_color_zero[x as usize] = color_id == 0;
            }

            // window
            let mut window_drawn = false;
            if self.lcdc & 0x20 != 0 && self.ly >= self.wy && self.wx <= WINDOW_X_MAX {
                let wx = self.wx.wrapping_sub(7) as u16;
                let window_map_base = if self.lcdc & 0x40 != 0 {
                    BG_MAP_1_BASE
                } else {
                    BG_MAP_0_BASE
                };
                let window_y = self.win_line_counter as usize;
                for x in wx..SCREEN_WIDTH as u16 {
                    let window_x = (x - wx) as usize;
                    let tile_col = window_x / 8;
                    let tile_row = window_y / 8;
                    let tile_y = window_y % 8;

                    let tile_index = self.vram[window_map_base + tile_row * 32 + tile_col];
                    let addr = self.tile_data_addr(tile_index);
                    let bit = 7 - window_x % 8;
                    let lo = self.vram[addr + tile_y * 2];
                    let hi = self.vram[addr + tile_y * 2 + 1];
                    let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);

                    self.framebuffer[row + x as usize] = Self::shade(self.bgp, color_id);
                    self.line_color_zero[x as usize] = color_id == 0;
                }
                window_drawn = true;
            }
            if window_drawn {
                self.win_line_counter = self.win_line_counter.wrapping_add(1);
            }
        }

        // sprites
        if self.lcdc & 0x02 != 0 {
            let sprite_height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
            let mut drawn = [false; SCREEN_WIDTH];
            for s in &self.line_sprites[..self.sprite_count] {
                let mut tile = s.tile;
                if sprite_height == 16 {
                    tile &= 0xFE;
                }
                let mut line_idx = self.ly as i16 - s.y;
                if s.flags & 0x40 != 0 {
                    line_idx = sprite_height - 1 - line_idx;
                }
                let addr = (tile as usize + (line_idx as usize >> 3)) * 16
                    + (line_idx as usize & 7) * 2;
                let lo = self.vram[addr];
                let hi = self.vram[addr + 1];
                let palette = if s.flags & 0x10 != 0 {
                    self.obp1
                } else {
                    self.obp0
                };
                for px in 0..8 {
                    let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                    let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                    if color_id == 0 {
                        continue;
                    }
                    let sx = s.x + px as i16;
                    if !(0i16..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                        continue;
                    }
                    let bg_zero = !bg_enabled || self.line_color_zero[sx as usize];
                    if s.flags & 0x80 != 0 && !bg_zero {
                        continue;
                    }
                    self.framebuffer[row + sx as usize] = Self::shade(palette, color_id);
                    drawn[sx as usize] = true;
                }
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}
