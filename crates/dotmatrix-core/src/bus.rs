use crate::{
    apu::Apu, cartridge::Cartridge, input::Input, ppu::Ppu, serial::Serial, timer::Timer,
    watch::WatchEngine,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;

/// The 64 KiB address space and the clock fan-out.
///
/// Every `read`/`write` costs one machine cycle: the timer and the pixel
/// unit are advanced by 4 ticks before the byte is produced or committed,
/// so instruction timing falls out of the bus traffic each opcode issues.
pub struct Bus {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub serial: Serial,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    pub watch: WatchEngine,
    /// Program counter of the instruction performing the current access.
    /// Set by the `Cpu` helpers so watch hits can attribute the access to
    /// the originating instruction.
    pub last_pc: Option<u16>,
    ticks: u64,
}

impl Bus {
    pub fn new() -> Self {
        let mut timer = Timer::new();
        // Power-on DIV phase of a late-revision unit, so the first
        // instructions after the hand-off observe the expected timing.
        timer.div = 0xABCC;

        // Hand-off register pattern: display running with the usual
        // background palette, line 0 just starting.
        let mut ppu = Ppu::new();
        ppu.write_reg(0xFF40, 0x91);
        ppu.write_reg(0xFF47, 0xFC);

        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            if_reg: 0xE1,
            ie_reg: 0,
            serial: Serial::new(),
            ppu,
            apu: Apu::new(),
            timer,
            input: Input::new(),
            watch: WatchEngine::default(),
            last_pc: None,
            ticks: 0,
        }
    }

    pub fn insert(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    /// Total ticks elapsed since power on.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the clocked units. The timer is stepped before the pixel
    /// unit so a timer interrupt raised this cycle is visible to STAT
    /// evaluation in the same window.
    fn tick(&mut self, ticks: u16) {
        self.ticks += ticks as u64;
        self.timer.step(ticks, &mut self.if_reg);
        self.ppu.step(ticks, &mut self.if_reg);
    }

    /// One machine cycle with no memory traffic (internal CPU work).
    pub fn idle(&mut self) {
        self.tick(4);
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.tick(4);
        let value = self.read_routed(addr);
        self.watch.note_read(self.last_pc, addr, value);
        value
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.tick(4);
        self.watch.note_write(self.last_pc, addr, val);
        self.write_routed(addr, val);
    }

    fn read_routed(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF),
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize]
                } else {
                    0xFF
                }
            }
            0xA000..=0xBFFF => self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_reg(addr),
            0xFF46 => self.ppu.dma,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    fn write_routed(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize] = val;
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val, &mut self.if_reg),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF46 => {
                self.ppu.write_reg(addr, val);
                self.dma_copy(val);
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    /// Side-effect-free view of the address space. Skips the clocks, the
    /// watch hooks and the mode-based lockouts; used by the OAM transfer
    /// and by hosts that inspect memory without disturbing it.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_reg(addr),
            0xFF46 => self.ppu.dma,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    /// Copy 160 bytes from `page << 8` into OAM. The transfer is applied in
    /// one shot when the register is written. Sources above 0xFE00 fold
    /// down into the echo region, as on hardware.
    fn dma_copy(&mut self, page: u8) {
        let src = (page as u16) << 8;
        for i in 0..0xA0u16 {
            let byte = self.dma_read(src.wrapping_add(i));
            self.ppu.oam[i as usize] = byte;
        }
    }

    fn dma_read(&self, addr: u16) -> u8 {
        let addr = if (0xFE00..=0xFF9F).contains(&addr) {
            addr.wrapping_sub(0x2000)
        } else {
            addr
        };
        self.peek(addr)
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_ram_mirrors_wram_both_ways() {
        let mut bus = Bus::new();
        bus.write(0xC123, 0x5A);
        assert_eq!(bus.read(0xE123), 0x5A);
        bus.write(0xFDFF, 0xA5);
        assert_eq!(bus.read(0xDDFF), 0xA5);
    }

    #[test]
    fn each_access_costs_four_ticks() {
        let mut bus = Bus::new();
        let before = bus.ticks();
        let _ = bus.read(0xC000);
        bus.write(0xC000, 0);
        bus.idle();
        assert_eq!(bus.ticks() - before, 12);
    }

    #[test]
    fn unusable_region_reads_ff_and_drops_writes() {
        let mut bus = Bus::new();
        bus.write(0xFEA0, 0x12);
        assert_eq!(bus.read(0xFEA0), 0xFF);
    }

    #[test]
    fn interrupt_flag_write_keeps_high_bits() {
        let mut bus = Bus::new();
        bus.write(0xFF0F, 0xFF);
        assert_eq!(bus.read(0xFF0F) & 0x1F, 0x1F);
        assert_eq!(bus.read(0xFF0F) & 0xE0, 0xE0);
    }
}
