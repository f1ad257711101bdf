/// Serial registers with no link partner attached.
///
/// Starting a transfer with the internal clock (SC bit 7 set) completes it
/// immediately: the outgoing byte is appended to an output buffer for the
/// host, SB shifts in all 1s as an open line would, and the serial interrupt
/// flag is raised. Test programs that report through the serial port work
/// against this without any cable emulation.
pub struct Serial {
    sb: u8,
    sc: u8,
    out_buf: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0x7E,
            out_buf: Vec::new(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, if_reg: &mut u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                if val & 0x80 != 0 {
                    self.out_buf.push(self.sb);
                    self.sb = 0xFF;
                    self.sc &= 0x7F;
                    *if_reg |= 0x08;
                }
            }
            _ => {}
        }
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_captures_byte_and_requests_irq() {
        let mut serial = Serial::new();
        let mut if_reg = 0u8;

        serial.write(0xFF01, 0x42, &mut if_reg);
        serial.write(0xFF02, 0x81, &mut if_reg);

        assert_eq!(serial.peek_output(), &[0x42]);
        assert_eq!(serial.read(0xFF01), 0xFF);
        assert_eq!(serial.read(0xFF02) & 0x80, 0);
        assert_ne!(if_reg & 0x08, 0);
    }

    #[test]
    fn sc_write_without_start_bit_is_inert() {
        let mut serial = Serial::new();
        let mut if_reg = 0u8;

        serial.write(0xFF01, 0x42, &mut if_reg);
        serial.write(0xFF02, 0x01, &mut if_reg);

        assert!(serial.peek_output().is_empty());
        assert_eq!(serial.read(0xFF01), 0x42);
        assert_eq!(if_reg, 0);
    }

    #[test]
    fn take_output_drains_in_order() {
        let mut serial = Serial::new();
        let mut if_reg = 0u8;

        for b in [0x01, 0x02, 0x03] {
            serial.write(0xFF01, b, &mut if_reg);
            serial.write(0xFF02, 0x81, &mut if_reg);
        }

        assert_eq!(serial.take_output(), vec![0x01, 0x02, 0x03]);
        assert!(serial.peek_output().is_empty());
    }
}
