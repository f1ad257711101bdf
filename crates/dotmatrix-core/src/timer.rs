pub struct Timer {
    /// 16-bit internal divider counter. The DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    /// Ticks accumulated towards the next TIMA increment.
    tima_counter: u16,
    /// A TIMA wrap happened; the TMA reload and the interrupt flag are
    /// applied on the next step, one machine cycle later.
    overflow_pending: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            tima_counter: 0,
            overflow_pending: false,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.div = 0,
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & 0x07,
            _ => {}
        }
    }

    /// Advance the timer by `ticks` clock cycles, setting the IF timer bit
    /// when a delayed overflow completes.
    pub fn step(&mut self, ticks: u16, if_reg: &mut u8) {
        if self.overflow_pending {
            self.overflow_pending = false;
            self.tima = self.tma;
            *if_reg |= 0x04;
        }

        self.div = self.div.wrapping_add(ticks);

        if self.tac & 0x04 == 0 {
            return;
        }
        self.tima_counter += ticks;
        let period = self.period();
        while self.tima_counter >= period {
            self.tima_counter -= period;
            if self.tima == 0xFF {
                // The reload value and interrupt become visible one machine
                // cycle later; until then TIMA reads back as zero.
                self.tima = 0;
                self.overflow_pending = true;
            } else {
                self.tima += 1;
            }
        }
    }

    fn period(&self) -> u16 {
        match self.tac & 0x03 {
            0x00 => 1024,
            0x01 => 16,
            0x02 => 64,
            _ => 256,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
