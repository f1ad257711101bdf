use std::fmt;

use crate::alu::{self, Flags};
use crate::bus::Bus;

// Interrupt vectors, lowest IF bit first
const VECTOR_VBLANK: u16 = 0x40;
const VECTOR_STAT: u16 = 0x48;
const VECTOR_TIMER: u16 = 0x50;
const VECTOR_SERIAL: u16 = 0x58;
const VECTOR_INPUT: u16 = 0x60;

// Register pattern at the boot hand-off (gbdev.io/pandocs/Power_Up_State.html,
// late-revision DMG)
const BOOT_A: u8 = 0x01;
const BOOT_F: u8 = 0xB0;
const BOOT_B: u8 = 0x00;
const BOOT_C: u8 = 0x13;
const BOOT_D: u8 = 0x00;
const BOOT_E: u8 = 0xD8;
const BOOT_H: u8 = 0x01;
const BOOT_L: u8 = 0x4D;
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

/// Fatal runtime condition. Once recorded, the CPU refuses to run and the
/// host decides what to do with the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    IllegalOpcode { opcode: u8, pc: u16 },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::IllegalOpcode { opcode, pc } => {
                write!(f, "illegal opcode {opcode:02X} at PC {pc:04X}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
}

/// One 8-bit operand slot of the instruction encoding: a register, or the
/// byte at (HL). Going through `read_operand`/`write_operand` means memory
/// operands pick up their extra machine cycle automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Register(Reg8),
    MemHl,
}

impl Operand {
    fn decode(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Operand::Register(Reg8::B),
            1 => Operand::Register(Reg8::C),
            2 => Operand::Register(Reg8::D),
            3 => Operand::Register(Reg8::E),
            4 => Operand::Register(Reg8::H),
            5 => Operand::Register(Reg8::L),
            6 => Operand::MemHl,
            _ => Operand::Register(Reg8::A),
        }
    }
}

pub struct Cpu {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    /// The four condition flags, kept unpacked. They are assembled into the
    /// F byte layout only by PUSH AF / POP AF and the debug formatter.
    pub flags: Flags,
    pub pc: u16,
    pub sp: u16,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    /// EI takes effect after the following instruction; 2 counts down to 0
    /// across the next two step boundaries and IME asserts at 0.
    ime_delay: u8,
    /// Address of the opcode currently executing, for watch attribution.
    instr_pc: u16,
    fault: Option<Fault>,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: BOOT_A,
            b: BOOT_B,
            c: BOOT_C,
            d: BOOT_D,
            e: BOOT_E,
            h: BOOT_H,
            l: BOOT_L,
            flags: Flags::from_byte(BOOT_F),
            pc: BOOT_PC,
            sp: BOOT_SP,
            ime: false,
            halted: false,
            stopped: false,
            ime_delay: 0,
            instr_pc: BOOT_PC,
            fault: None,
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    fn get_bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    fn get_de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn get_hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    fn reg(&self, r: Reg8) -> u8 {
        match r {
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::A => self.a,
        }
    }

    fn set_reg(&mut self, r: Reg8, val: u8) {
        match r {
            Reg8::B => self.b = val,
            Reg8::C => self.c = val,
            Reg8::D => self.d = val,
            Reg8::E => self.e = val,
            Reg8::H => self.h = val,
            Reg8::L => self.l = val,
            Reg8::A => self.a = val,
        }
    }

    #[inline(always)]
    fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        bus.last_pc = Some(self.pc);
        let val = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    #[inline(always)]
    fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    #[inline(always)]
    fn read8(&mut self, bus: &mut Bus, addr: u16) -> u8 {
        bus.last_pc = Some(self.instr_pc);
        bus.read(addr)
    }

    #[inline(always)]
    fn write8(&mut self, bus: &mut Bus, addr: u16, val: u8) {
        bus.last_pc = Some(self.instr_pc);
        bus.write(addr, val);
    }

    fn read_operand(&mut self, bus: &mut Bus, op: Operand) -> u8 {
        match op {
            Operand::Register(r) => self.reg(r),
            Operand::MemHl => {
                let addr = self.get_hl();
                self.read8(bus, addr)
            }
        }
    }

    fn write_operand(&mut self, bus: &mut Bus, op: Operand, val: u8) {
        match op {
            Operand::Register(r) => self.set_reg(r, val),
            Operand::MemHl => {
                let addr = self.get_hl();
                self.write8(bus, addr, val);
            }
        }
    }

    fn push_stack(&mut self, bus: &mut Bus, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, val as u8);
    }

    fn pop_stack(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.read8(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    fn next_interrupt(pending: u8) -> (u8, u16) {
        if pending & 0x01 != 0 {
            (0x01, VECTOR_VBLANK)
        } else if pending & 0x02 != 0 {
            (0x02, VECTOR_STAT)
        } else if pending & 0x04 != 0 {
            (0x04, VECTOR_TIMER)
        } else if pending & 0x08 != 0 {
            (0x08, VECTOR_SERIAL)
        } else {
            (0x10, VECTOR_INPUT)
        }
    }

    /// Wake-up and dispatch. A halted CPU resumes on any raised IF bit,
    /// enabled or not; an actual dispatch additionally needs IME and the
    /// matching IE bit. Dispatch costs 5 machine cycles: two internal, two
    /// for the PC push, one more before control reaches the vector.
    fn handle_interrupts(&mut self, bus: &mut Bus) {
        if self.halted && bus.if_reg & 0x1F != 0 {
            self.halted = false;
        }

        let pending = (bus.if_reg & bus.ie_reg) & 0x1F;
        if pending == 0 || !self.ime || self.ime_delay != 0 {
            return;
        }

        let (bit, vector) = Self::next_interrupt(pending);
        bus.if_reg &= !bit;
        self.ime = false;

        bus.idle();
        bus.idle();
        self.push_stack(bus, self.pc);
        bus.idle();
        self.pc = vector;
    }

    pub fn step(&mut self, bus: &mut Bus) {
        if self.fault.is_some() {
            return;
        }

        if self.ime_delay > 0 {
            self.ime_delay -= 1;
            if self.ime_delay == 0 {
                self.ime = true;
            }
        }

        if self.stopped {
            if bus.if_reg & 0x10 != 0 {
                self.stopped = false;
            } else {
                bus.idle();
                return;
            }
        }

        self.handle_interrupts(bus);

        if self.halted {
            bus.idle();
            return;
        }

        let pc = self.pc;
        self.instr_pc = pc;
        let opcode = self.fetch8(bus);
        bus.watch.note_exec(pc, opcode);

        match opcode {
            0x00 => {}
            0x01 => {
                let val = self.fetch16(bus);
                self.set_bc(val);
            }
            0x02 => {
                let addr = self.get_bc();
                self.write8(bus, addr, self.a);
            }
            0x03 => {
                let val = self.get_bc().wrapping_add(1);
                self.set_bc(val);
                bus.idle();
            }
            0x04 => {
                let (res, flags) = alu::inc(self.b, self.flags.carry);
                self.b = res;
                self.flags = flags;
            }
            0x05 => {
                let (res, flags) = alu::dec(self.b, self.flags.carry);
                self.b = res;
                self.flags = flags;
            }
            0x06 => {
                self.b = self.fetch8(bus);
            }
            0x07 => {
                let (res, mut flags) = alu::rlc(self.a);
                flags.zero = false;
                self.a = res;
                self.flags = flags;
            }
            0x08 => {
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.sp as u8);
                self.write8(bus, addr.wrapping_add(1), (self.sp >> 8) as u8);
            }
            0x09 => {
                let (res, flags) = alu::add16(self.get_hl(), self.get_bc(), self.flags.zero);
                self.set_hl(res);
                self.flags = flags;
                bus.idle();
            }
            0x0A => {
                let addr = self.get_bc();
                self.a = self.read8(bus, addr);
            }
            0x0B => {
                let val = self.get_bc().wrapping_sub(1);
                self.set_bc(val);
                bus.idle();
            }
            0x0C => {
                let (res, flags) = alu::inc(self.c, self.flags.carry);
                self.c = res;
                self.flags = flags;
            }
            0x0D => {
                let (res, flags) = alu::dec(self.c, self.flags.carry);
                self.c = res;
                self.flags = flags;
            }
            0x0E => {
                self.c = self.fetch8(bus);
            }
            0x0F => {
                let (res, mut flags) = alu::rrc(self.a);
                flags.zero = false;
                self.a = res;
                self.flags = flags;
            }
            0x10 => {
                // STOP carries a padding byte
                let _ = self.fetch8(bus);
                self.stopped = true;
            }
            0x11 => {
                let val = self.fetch16(bus);
                self.set_de(val);
            }
            0x12 => {
                let addr = self.get_de();
                self.write8(bus, addr, self.a);
            }
            0x13 => {
                let val = self.get_de().wrapping_add(1);
                self.set_de(val);
                bus.idle();
            }
            0x14 => {
                let (res, flags) = alu::inc(self.d, self.flags.carry);
                self.d = res;
                self.flags = flags;
            }
            0x15 => {
                let (res, flags) = alu::dec(self.d, self.flags.carry);
                self.d = res;
                self.flags = flags;
            }
            0x16 => {
                self.d = self.fetch8(bus);
            }
            0x17 => {
                let (res, mut flags) = alu::rl(self.a, self.flags.carry);
                flags.zero = false;
                self.a = res;
                self.flags = flags;
            }
            0x18 => {
                let offset = self.fetch8(bus) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                bus.idle();
            }
            0x19 => {
                let (res, flags) = alu::add16(self.get_hl(), self.get_de(), self.flags.zero);
                self.set_hl(res);
                self.flags = flags;
                bus.idle();
            }
            0x1A => {
                let addr = self.get_de();
                self.a = self.read8(bus, addr);
            }
            0x1B => {
                let val = self.get_de().wrapping_sub(1);
                self.set_de(val);
                bus.idle();
            }
            0x1C => {
                let (res, flags) = alu::inc(self.e, self.flags.carry);
                self.e = res;
                self.flags = flags;
            }
            0x1D => {
                let (res, flags) = alu::dec(self.e, self.flags.carry);
                self.e = res;
                self.flags = flags;
            }
            0x1E => {
                self.e = self.fetch8(bus);
            }
            0x1F => {
                let (res, mut flags) = alu::rr(self.a, self.flags.carry);
                flags.zero = false;
                self.a = res;
                self.flags = flags;
            }
            0x20 => {
                let offset = self.fetch8(bus) as i8;
                if !self.flags.zero {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    bus.idle();
                }
            }
            0x21 => {
                let val = self.fetch16(bus);
                self.set_hl(val);
            }
            0x22 => {
                let addr = self.get_hl();
                self.write8(bus, addr, self.a);
                self.set_hl(addr.wrapping_add(1));
            }
            0x23 => {
                let val = self.get_hl().wrapping_add(1);
                self.set_hl(val);
                bus.idle();
            }
            0x24 => {
                let (res, flags) = alu::inc(self.h, self.flags.carry);
                self.h = res;
                self.flags = flags;
            }
            0x25 => {
                let (res, flags) = alu::dec(self.h, self.flags.carry);
                self.h = res;
                self.flags = flags;
            }
            0x26 => {
                self.h = self.fetch8(bus);
            }
            0x27 => {
                let (res, flags) = alu::daa(self.a, self.flags);
                self.a = res;
                self.flags = flags;
            }
            0x28 => {
                let offset = self.fetch8(bus) as i8;
                if self.flags.zero {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    bus.idle();
                }
            }
            0x29 => {
                let hl = self.get_hl();
                let (res, flags) = alu::add16(hl, hl, self.flags.zero);
                self.set_hl(res);
                self.flags = flags;
                bus.idle();
            }
            0x2A => {
                let addr = self.get_hl();
                self.a = self.read8(bus, addr);
                self.set_hl(addr.wrapping_add(1));
            }
            0x2B => {
                let val = self.get_hl().wrapping_sub(1);
                self.set_hl(val);
                bus.idle();
            }
            0x2C => {
                let (res, flags) = alu::inc(self.l, self.flags.carry);
                self.l = res;
                self.flags = flags;
            }
            0x2D => {
                let (res, flags) = alu::dec(self.l, self.flags.carry);
                self.l = res;
                self.flags = flags;
            }
            0x2E => {
                self.l = self.fetch8(bus);
            }
            0x2F => {
                self.a ^= 0xFF;
                self.flags.negate = true;
                self.flags.half = true;
            }
            0x30 => {
                let offset = self.fetch8(bus) as i8;
                if !self.flags.carry {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    bus.idle();
                }
            }
            0x31 => {
                self.sp = self.fetch16(bus);
            }
            0x32 => {
                let addr = self.get_hl();
                self.write8(bus, addr, self.a);
                self.set_hl(addr.wrapping_sub(1));
            }
            0x33 => {
                self.sp = self.sp.wrapping_add(1);
                bus.idle();
            }
            0x34 => {
                let addr = self.get_hl();
                let old = self.read8(bus, addr);
                let (res, flags) = alu::inc(old, self.flags.carry);
                self.write8(bus, addr, res);
                self.flags = flags;
            }
            0x35 => {
                let addr = self.get_hl();
                let old = self.read8(bus, addr);
                let (res, flags) = alu::dec(old, self.flags.carry);
                self.write8(bus, addr, res);
                self.flags = flags;
            }
            0x36 => {
                let val = self.fetch8(bus);
                let addr = self.get_hl();
                self.write8(bus, addr, val);
            }
            0x37 => {
                self.flags.negate = false;
                self.flags.half = false;
                self.flags.carry = true;
            }
            0x38 => {
                let offset = self.fetch8(bus) as i8;
                if self.flags.carry {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    bus.idle();
                }
            }
            0x39 => {
                let (res, flags) = alu::add16(self.get_hl(), self.sp, self.flags.zero);
                self.set_hl(res);
                self.flags = flags;
                bus.idle();
            }
            0x3A => {
                let addr = self.get_hl();
                self.a = self.read8(bus, addr);
                self.set_hl(addr.wrapping_sub(1));
            }
            0x3B => {
                self.sp = self.sp.wrapping_sub(1);
                bus.idle();
            }
            0x3C => {
                let (res, flags) = alu::inc(self.a, self.flags.carry);
                self.a = res;
                self.flags = flags;
            }
            0x3D => {
                let (res, flags) = alu::dec(self.a, self.flags.carry);
                self.a = res;
                self.flags = flags;
            }
            0x3E => {
                self.a = self.fetch8(bus);
            }
            0x3F => {
                self.flags.negate = false;
                self.flags.half = false;
                self.flags.carry = !self.flags.carry;
            }
            0x76 => {
                self.halted = true;
            }
            opcode @ 0x40..=0x7F => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                self.write_operand(bus, Operand::decode(opcode >> 3), val);
            }
            opcode @ 0x80..=0x87 => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::add(self.a, val, false);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0x88..=0x8F => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::add(self.a, val, self.flags.carry);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0x90..=0x97 => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::sub(self.a, val, false);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0x98..=0x9F => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::sub(self.a, val, self.flags.carry);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0xA0..=0xA7 => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::and(self.a, val);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0xA8..=0xAF => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::xor(self.a, val);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0xB0..=0xB7 => {
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (res, flags) = alu::or(self.a, val);
                self.a = res;
                self.flags = flags;
            }
            opcode @ 0xB8..=0xBF => {
                // CP discards the difference
                let val = self.read_operand(bus, Operand::decode(opcode));
                let (_, flags) = alu::sub(self.a, val, false);
                self.flags = flags;
            }
            0xC0 => {
                bus.idle();
                if !self.flags.zero {
                    self.pc = self.pop_stack(bus);
                    bus.idle();
                }
            }
            0xC1 => {
                let val = self.pop_stack(bus);
                self.set_bc(val);
            }
            0xC2 => {
                let addr = self.fetch16(bus);
                if !self.flags.zero {
                    self.pc = addr;
                    bus.idle();
                }
            }
            0xC3 => {
                self.pc = self.fetch16(bus);
                bus.idle();
            }
            0xC4 => {
                let addr = self.fetch16(bus);
                if !self.flags.zero {
                    bus.idle();
                    self.push_stack(bus, self.pc);
                    self.pc = addr;
                }
            }
            0xC5 => {
                let val = self.get_bc();
                bus.idle();
                self.push_stack(bus, val);
            }
            0xC6 => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::add(self.a, val, false);
                self.a = res;
                self.flags = flags;
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let target = (opcode & 0x38) as u16;
                bus.idle();
                self.push_stack(bus, self.pc);
                self.pc = target;
            }
            0xC8 => {
                bus.idle();
                if self.flags.zero {
                    self.pc = self.pop_stack(bus);
                    bus.idle();
                }
            }
            0xC9 => {
                self.pc = self.pop_stack(bus);
                bus.idle();
            }
            0xCA => {
                let addr = self.fetch16(bus);
                if self.flags.zero {
                    self.pc = addr;
                    bus.idle();
                }
            }
            0xCB => {
                let op = self.fetch8(bus);
                self.handle_cb(op, bus);
            }
            0xCC => {
                let addr = self.fetch16(bus);
                if self.flags.zero {
                    bus.idle();
                    self.push_stack(bus, self.pc);
                    self.pc = addr;
                }
            }
            0xCD => {
                let addr = self.fetch16(bus);
                bus.idle();
                self.push_stack(bus, self.pc);
                self.pc = addr;
            }
            0xCE => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::add(self.a, val, self.flags.carry);
                self.a = res;
                self.flags = flags;
            }
            0xD0 => {
                bus.idle();
                if !self.flags.carry {
                    self.pc = self.pop_stack(bus);
                    bus.idle();
                }
            }
            0xD1 => {
                let val = self.pop_stack(bus);
                self.set_de(val);
            }
            0xD2 => {
                let addr = self.fetch16(bus);
                if !self.flags.carry {
                    self.pc = addr;
                    bus.idle();
                }
            }
            0xD4 => {
                let addr = self.fetch16(bus);
                if !self.flags.carry {
                    bus.idle();
                    self.push_stack(bus, self.pc);
                    self.pc = addr;
                }
            }
            0xD5 => {
                let val = self.get_de();
                bus.idle();
                self.push_stack(bus, val);
            }
            0xD6 => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::sub(self.a, val, false);
                self.a = res;
                self.flags = flags;
            }
            0xD8 => {
                bus.idle();
                if self.flags.carry {
                    self.pc = self.pop_stack(bus);
                    bus.idle();
                }
            }
            0xD9 => {
                // RETI enables interrupts with no activation delay
                self.pc = self.pop_stack(bus);
                self.ime = true;
                self.ime_delay = 0;
                bus.idle();
            }
            0xDA => {
                let addr = self.fetch16(bus);
                if self.flags.carry {
                    self.pc = addr;
                    bus.idle();
                }
            }
            0xDC => {
                let addr = self.fetch16(bus);
                if self.flags.carry {
                    bus.idle();
                    self.push_stack(bus, self.pc);
                    self.pc = addr;
                }
            }
            0xDE => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::sub(self.a, val, self.flags.carry);
                self.a = res;
                self.flags = flags;
            }
            0xE0 => {
                let offset = self.fetch8(bus);
                let addr = 0xFF00u16 | offset as u16;
                self.write8(bus, addr, self.a);
            }
            0xE1 => {
                let val = self.pop_stack(bus);
                self.set_hl(val);
            }
            0xE2 => {
                let addr = 0xFF00u16 | self.c as u16;
                self.write8(bus, addr, self.a);
            }
            0xE5 => {
                let val = self.get_hl();
                bus.idle();
                self.push_stack(bus, val);
            }
            0xE6 => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::and(self.a, val);
                self.a = res;
                self.flags = flags;
            }
            0xE8 => {
                let offset = self.fetch8(bus) as i8;
                let (res, flags) = alu::add_sp(self.sp, offset);
                self.sp = res;
                self.flags = flags;
                bus.idle();
                bus.idle();
            }
            0xE9 => {
                self.pc = self.get_hl();
            }
            0xEA => {
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.a);
            }
            0xEE => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::xor(self.a, val);
                self.a = res;
                self.flags = flags;
            }
            0xF0 => {
                let offset = self.fetch8(bus);
                let addr = 0xFF00u16 | offset as u16;
                self.a = self.read8(bus, addr);
            }
            0xF1 => {
                let val = self.pop_stack(bus);
                self.a = (val >> 8) as u8;
                self.flags = Flags::from_byte(val as u8);
            }
            0xF2 => {
                let addr = 0xFF00u16 | self.c as u16;
                self.a = self.read8(bus, addr);
            }
            0xF3 => {
                self.ime = false;
                self.ime_delay = 0;
            }
            0xF5 => {
                let val = ((self.a as u16) << 8) | self.flags.to_byte() as u16;
                bus.idle();
                self.push_stack(bus, val);
            }
            0xF6 => {
                let val = self.fetch8(bus);
                let (res, flags) = alu::or(self.a, val);
                self.a = res;
                self.flags = flags;
            }
            0xF8 => {
                let offset = self.fetch8(bus) as i8;
                let (res, flags) = alu::add_sp(self.sp, offset);
                self.set_hl(res);
                self.flags = flags;
                bus.idle();
            }
            0xF9 => {
                self.sp = self.get_hl();
                bus.idle();
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.a = self.read8(bus, addr);
            }
            0xFB => {
                if !self.ime {
                    self.ime_delay = 2;
                }
            }
            0xFE => {
                let val = self.fetch8(bus);
                let (_, flags) = alu::sub(self.a, val, false);
                self.flags = flags;
            }
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                let at = self.pc.wrapping_sub(1);
                log::error!("illegal opcode {opcode:02X} at PC {at:04X}, freezing CPU");
                self.fault = Some(Fault::IllegalOpcode { opcode, pc: at });
            }
        }
    }

    fn handle_cb(&mut self, opcode: u8, bus: &mut Bus) {
        let op = Operand::decode(opcode);
        match opcode {
            0x00..=0x07 => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::rlc(val);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x08..=0x0F => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::rrc(val);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x10..=0x17 => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::rl(val, self.flags.carry);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x18..=0x1F => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::rr(val, self.flags.carry);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x20..=0x27 => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::sla(val);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x28..=0x2F => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::sra(val);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x30..=0x37 => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::swap(val);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x38..=0x3F => {
                let val = self.read_operand(bus, op);
                let (res, flags) = alu::srl(val);
                self.write_operand(bus, op, res);
                self.flags = flags;
            }
            0x40..=0x7F => {
                // BIT only reads its operand
                let bit = (opcode - 0x40) >> 3;
                let val = self.read_operand(bus, op);
                self.flags = alu::bit(val, bit, self.flags.carry);
            }
            0x80..=0xBF => {
                let bit = (opcode - 0x80) >> 3;
                let val = self.read_operand(bus, op);
                self.write_operand(bus, op, val & !(1 << bit));
            }
            0xC0..=0xFF => {
                let bit = (opcode - 0xC0) >> 3;
                let val = self.read_operand(bus, op);
                self.write_operand(bus, op, val | 1 << bit);
            }
        }
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X}",
            ((self.a as u16) << 8) | self.flags.to_byte() as u16,
            self.get_bc(),
            self.get_de(),
            self.get_hl(),
            self.pc,
            self.sp
        )
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
