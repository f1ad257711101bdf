/// Audio register file (0xFF10-0xFF3F).
///
/// Sound synthesis is out of scope for this core; programs read back what
/// they wrote so audio driver code runs unmodified, but no samples are
/// produced.
pub struct Apu {
    regs: [u8; 0x30],
}

impl Apu {
    pub fn new() -> Self {
        Self { regs: [0; 0x30] }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF10..=0xFF3F => self.regs[(addr - 0xFF10) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        if let 0xFF10..=0xFF3F = addr {
            self.regs[(addr - 0xFF10) as usize] = val;
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
