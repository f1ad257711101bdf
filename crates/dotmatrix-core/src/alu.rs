//! Pure arithmetic/logic helpers shared by every operand form of the CPU.
//!
//! Each helper returns the result together with the full flag set it
//! produces; the caller decides which flags to keep (INC/DEC preserve carry,
//! the accumulator rotate short forms clear zero, and so on).

/// CPU flags as four independent booleans.
///
/// The packed F-register layout (Z/N/H/C in bits 7-4) only exists at the
/// PUSH AF / POP AF boundary via [`Flags::to_byte`] and [`Flags::from_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub zero: bool,
    pub negate: bool,
    pub half: bool,
    pub carry: bool,
}

impl Flags {
    pub fn to_byte(self) -> u8 {
        (self.zero as u8) << 7 | (self.negate as u8) << 6 | (self.half as u8) << 5 | (self.carry as u8) << 4
    }

    pub fn from_byte(val: u8) -> Self {
        Self {
            zero: val & 0x80 != 0,
            negate: val & 0x40 != 0,
            half: val & 0x20 != 0,
            carry: val & 0x10 != 0,
        }
    }
}

pub fn add(a: u8, b: u8, carry_in: bool) -> (u8, Flags) {
    let c = carry_in as u8;
    let res = a.wrapping_add(b).wrapping_add(c);
    let flags = Flags {
        zero: res == 0,
        negate: false,
        half: (a & 0x0F) + (b & 0x0F) + c > 0x0F,
        carry: a as u16 + b as u16 + c as u16 > 0xFF,
    };
    (res, flags)
}

pub fn sub(a: u8, b: u8, carry_in: bool) -> (u8, Flags) {
    let c = carry_in as u8;
    let res = a.wrapping_sub(b).wrapping_sub(c);
    let flags = Flags {
        zero: res == 0,
        negate: true,
        half: (a & 0x0F) < (b & 0x0F) + c,
        carry: (a as u16) < b as u16 + c as u16,
    };
    (res, flags)
}

pub fn and(a: u8, b: u8) -> (u8, Flags) {
    let res = a & b;
    let flags = Flags {
        zero: res == 0,
        negate: false,
        half: true,
        carry: false,
    };
    (res, flags)
}

pub fn or(a: u8, b: u8) -> (u8, Flags) {
    let res = a | b;
    (res, Flags { zero: res == 0, ..Flags::default() })
}

pub fn xor(a: u8, b: u8) -> (u8, Flags) {
    let res = a ^ b;
    (res, Flags { zero: res == 0, ..Flags::default() })
}

/// INC: carry is passed through untouched.
pub fn inc(val: u8, carry: bool) -> (u8, Flags) {
    let res = val.wrapping_add(1);
    let flags = Flags {
        zero: res == 0,
        negate: false,
        half: val & 0x0F == 0x0F,
        carry,
    };
    (res, flags)
}

/// DEC: carry is passed through untouched.
pub fn dec(val: u8, carry: bool) -> (u8, Flags) {
    let res = val.wrapping_sub(1);
    let flags = Flags {
        zero: res == 0,
        negate: true,
        half: val & 0x0F == 0,
        carry,
    };
    (res, flags)
}

/// ADD HL,rr: zero is passed through untouched; half/carry come from
/// bits 11 and 15 of the 16-bit sum.
pub fn add16(a: u16, b: u16, zero: bool) -> (u16, Flags) {
    let res = a.wrapping_add(b);
    let flags = Flags {
        zero,
        negate: false,
        half: (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF,
        carry: a as u32 + b as u32 > 0xFFFF,
    };
    (res, flags)
}

/// ADD SP,e8 and LD HL,SP+e8: half/carry come from the unsigned low-byte
/// addition regardless of the offset's sign.
pub fn add_sp(sp: u16, offset: i8) -> (u16, Flags) {
    let off = offset as u16;
    let res = sp.wrapping_add(off);
    let flags = Flags {
        zero: false,
        negate: false,
        half: (sp & 0x0F) + (off & 0x0F) > 0x0F,
        carry: (sp & 0xFF) + (off & 0xFF) > 0xFF,
    };
    (res, flags)
}

/// Decimal-adjust the accumulator after BCD arithmetic.
///
/// The correction is chosen from the N/H/C flags left by the previous
/// ADD/ADC/SUB/SBC, so it must run before anything else clobbers them.
pub fn daa(a: u8, flags: Flags) -> (u8, Flags) {
    let mut adjust = if flags.carry { 0x60u8 } else { 0x00 };
    if flags.half {
        adjust |= 0x06;
    }
    let res = if !flags.negate {
        if a & 0x0F > 0x09 {
            adjust |= 0x06;
        }
        if a > 0x99 {
            adjust |= 0x60;
        }
        a.wrapping_add(adjust)
    } else {
        a.wrapping_sub(adjust)
    };
    let flags = Flags {
        zero: res == 0,
        negate: flags.negate,
        half: false,
        carry: adjust >= 0x60,
    };
    (res, flags)
}

pub fn rlc(val: u8) -> (u8, Flags) {
    let res = val.rotate_left(1);
    (res, rotate_flags(res, val & 0x80 != 0))
}

pub fn rrc(val: u8) -> (u8, Flags) {
    let res = val.rotate_right(1);
    (res, rotate_flags(res, val & 0x01 != 0))
}

pub fn rl(val: u8, carry_in: bool) -> (u8, Flags) {
    let res = (val << 1) | carry_in as u8;
    (res, rotate_flags(res, val & 0x80 != 0))
}

pub fn rr(val: u8, carry_in: bool) -> (u8, Flags) {
    let res = (val >> 1) | (carry_in as u8) << 7;
    (res, rotate_flags(res, val & 0x01 != 0))
}

pub fn sla(val: u8) -> (u8, Flags) {
    let res = val << 1;
    (res, rotate_flags(res, val & 0x80 != 0))
}

/// Arithmetic shift right: bit 7 is duplicated.
pub fn sra(val: u8) -> (u8, Flags) {
    let res = (val >> 1) | (val & 0x80);
    (res, rotate_flags(res, val & 0x01 != 0))
}

pub fn srl(val: u8) -> (u8, Flags) {
    let res = val >> 1;
    (res, rotate_flags(res, val & 0x01 != 0))
}

pub fn swap(val: u8) -> (u8, Flags) {
    let res = val.rotate_left(4);
    (res, rotate_flags(res, false))
}

/// BIT n: result is flag-only; carry is passed through untouched.
pub fn bit(val: u8, n: u8, carry: bool) -> Flags {
    Flags {
        zero: val & (1 << n) == 0,
        negate: false,
        half: true,
        carry,
    }
}

fn rotate_flags(res: u8, carry: bool) -> Flags {
    Flags {
        zero: res == 0,
        negate: false,
        half: false,
        carry,
    }
}
