/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    ---------------------------------------------------------------------------

    cpu_common::alu.rs

    ALU operation traits for 8, 16 and 32-bit operands. Each arithmetic operation returns
    (result, carry, overflow, aux_carry) so that the caller can commit flags in one place.

*/

/* ----------------------- Addition & Subtraction ------------------------- */

pub trait AluNeg: Sized {
    fn alu_neg(self) -> (Self, bool, bool, bool);
}

pub trait AluSub<Rhs = Self>: Sized {
    fn alu_sub(self, rhs: Rhs) -> (Self, bool, bool, bool);
}

pub trait AluSbb<Rhs = Self>: Sized {
    fn alu_sbb(self, rhs: Rhs, carry: bool) -> (Self, bool, bool, bool);
}

pub trait AluAdd<Rhs = Self>: Sized {
    fn alu_add(self, rhs: Rhs) -> (Self, bool, bool, bool);
}

pub trait AluAdc<Rhs = Self>: Sized {
    fn alu_adc(self, rhs: Rhs, carry: bool) -> (Self, bool, bool, bool);
}

macro_rules! impl_arith {
    ($prim:ty) => {
        impl AluNeg for $prim {
            /// NEG is SUB(0, x) with identical flags.
            fn alu_neg(self) -> (Self, bool, bool, bool) {
                (0 as $prim).alu_sub(self)
            }
        }

        impl AluSub for $prim {
            fn alu_sub(self, rhs: Self) -> (Self, bool, bool, bool) {
                let (result, carry) = self.overflowing_sub(rhs);
                let overflow = (self ^ rhs) & (self ^ result) & (1 << (<$prim>::BITS - 1)) != 0;
                let aux_carry = ((self ^ rhs ^ result) & 0x10) != 0;
                (result, carry, overflow, aux_carry)
            }
        }

        impl AluAdd for $prim {
            fn alu_add(self, rhs: Self) -> (Self, bool, bool, bool) {
                let (result, carry) = self.overflowing_add(rhs);
                let overflow = (self ^ result) & (rhs ^ result) & (1 << (<$prim>::BITS - 1)) != 0;
                let aux_carry = ((self ^ rhs ^ result) & 0x10) != 0;
                (result, carry, overflow, aux_carry)
            }
        }

        impl AluSbb for $prim {
            /// DEST := DEST - (SRC + CF), computed in 64 bits so the borrow out of the
            /// operand width is visible for every size including u32.
            fn alu_sbb(self, rhs: Self, carry_in: bool) -> (Self, bool, bool, bool) {
                let lhs_w = self as u64;
                let rhs_w = rhs as u64;
                let result = lhs_w.wrapping_sub(rhs_w + carry_in as u64);
                let carry = result & (u64::MAX << <$prim>::BITS) != 0;
                let overflow = (lhs_w ^ rhs_w) & (lhs_w ^ result) & (1 << (<$prim>::BITS - 1)) != 0;
                let aux_carry = ((lhs_w ^ rhs_w ^ result) & 0x10) != 0;
                (result as Self, carry, overflow, aux_carry)
            }
        }

        impl AluAdc for $prim {
            /// DEST := DEST + SRC + CF
            fn alu_adc(self, rhs: Self, carry_in: bool) -> (Self, bool, bool, bool) {
                let lhs_w = self as u64;
                let rhs_w = rhs as u64;
                let result = lhs_w + rhs_w + carry_in as u64;
                let carry = result & (u64::MAX << <$prim>::BITS) != 0;
                let overflow = (lhs_w ^ result) & (rhs_w ^ result) & (1 << (<$prim>::BITS - 1)) != 0;
                let aux_carry = ((lhs_w ^ rhs_w ^ result) & 0x10) != 0;
                (result as Self, carry, overflow, aux_carry)
            }
        }
    };
}

impl_arith!(u8);
impl_arith!(u16);
impl_arith!(u32);

/* ------------------------- Shifts and rotates ---------------------------- */

// Counts passed to these traits are already masked by the caller (to 5 bits on 286+).
// A count of zero returns the operand unchanged with carry false; callers must not commit
// flags in that case.

pub trait AluShiftLeft: Sized {
    fn alu_shl(self, count: u8) -> (Self, bool);
}

pub trait AluShiftRight: Sized {
    fn alu_shr(self, count: u8) -> (Self, bool);
}

pub trait AluShiftArithmeticRight: Sized {
    fn alu_sar(self, count: u8) -> (Self, bool);
}

pub trait AluRotateLeft: Sized {
    fn alu_rol(self, count: u8) -> (Self, bool);
}

pub trait AluRotateRight: Sized {
    fn alu_ror(self, count: u8) -> (Self, bool);
}

pub trait AluRotateCarryLeft: Sized {
    fn alu_rcl(self, count: u8, carry: bool) -> (Self, bool);
}

pub trait AluRotateCarryRight: Sized {
    fn alu_rcr(self, count: u8, carry: bool) -> (Self, bool);
}

macro_rules! impl_shifts {
    ($prim:ty, $signed:ty) => {
        impl AluShiftLeft for $prim {
            fn alu_shl(self, count: u8) -> (Self, bool) {
                let count = count as u32;
                if count == 0 {
                    return (self, false);
                }
                if count > <$prim>::BITS {
                    return (0, false);
                }
                let wide = (self as u64) << count;
                let carry = wide & (1u64 << <$prim>::BITS) != 0;
                (wide as $prim, carry)
            }
        }

        impl AluShiftRight for $prim {
            fn alu_shr(self, count: u8) -> (Self, bool) {
                let count = count as u32;
                if count == 0 {
                    return (self, false);
                }
                if count > <$prim>::BITS {
                    return (0, false);
                }
                let carry = (self as u64 >> (count - 1)) & 1 != 0;
                ((self as u64 >> count) as $prim, carry)
            }
        }

        impl AluShiftArithmeticRight for $prim {
            fn alu_sar(self, count: u8) -> (Self, bool) {
                let count = (count as u32).min(<$prim>::BITS);
                if count == 0 {
                    return (self, false);
                }
                let signed = self as $signed as i64;
                let carry = (signed >> (count - 1)) & 1 != 0;
                ((signed >> count) as $prim, carry)
            }
        }

        impl AluRotateLeft for $prim {
            fn alu_rol(self, count: u8) -> (Self, bool) {
                if count == 0 {
                    return (self, false);
                }
                let result = self.rotate_left(count as u32 % <$prim>::BITS);
                (result, result & 1 != 0)
            }
        }

        impl AluRotateRight for $prim {
            fn alu_ror(self, count: u8) -> (Self, bool) {
                if count == 0 {
                    return (self, false);
                }
                let result = self.rotate_right(count as u32 % <$prim>::BITS);
                (result, result >> (<$prim>::BITS - 1) != 0)
            }
        }

        impl AluRotateCarryLeft for $prim {
            fn alu_rcl(mut self, count: u8, carry: bool) -> (Self, bool) {
                let mut carry = carry;
                for _ in 0..(count as u32 % (<$prim>::BITS + 1)) {
                    let out = self >> (<$prim>::BITS - 1) != 0;
                    self = (self << 1) | carry as $prim;
                    carry = out;
                }
                (self, carry)
            }
        }

        impl AluRotateCarryRight for $prim {
            fn alu_rcr(mut self, count: u8, carry: bool) -> (Self, bool) {
                let mut carry = carry;
                for _ in 0..(count as u32 % (<$prim>::BITS + 1)) {
                    let out = self & 1 != 0;
                    self = (self >> 1) | ((carry as $prim) << (<$prim>::BITS - 1));
                    carry = out;
                }
                (self, carry)
            }
        }
    };
}

impl_shifts!(u8, i8);
impl_shifts!(u16, i16);
impl_shifts!(u32, i32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alu_add_flags() {
        let (result, carry, overflow, aux) = 0x7Fu8.alu_add(1);
        assert_eq!(result, 0x80);
        assert_eq!(carry, false);
        assert_eq!(overflow, true);
        assert_eq!(aux, true);

        let (result, carry, overflow, _) = 0xFFFF_FFFFu32.alu_add(1);
        assert_eq!(result, 0);
        assert_eq!(carry, true);
        assert_eq!(overflow, false);
    }

    #[test]
    fn test_alu_adc_u32_carry() {
        // Carry out of bit 31 must be visible with a carry-in.
        let (result, carry, _, _) = 0xFFFF_FFFFu32.alu_adc(0, true);
        assert_eq!(result, 0);
        assert_eq!(carry, true);

        let (result, carry, _, _) = 0xFFFFu16.alu_adc(0xFFFF, true);
        assert_eq!(result, 0xFFFF);
        assert_eq!(carry, true);
    }

    #[test]
    fn test_alu_sbb_u32_borrow() {
        let (result, carry, _, _) = 0u32.alu_sbb(0, true);
        assert_eq!(result, 0xFFFF_FFFF);
        assert_eq!(carry, true);

        let (result, carry, overflow, _) = 0x8000_0000u32.alu_sbb(1, false);
        assert_eq!(result, 0x7FFF_FFFF);
        assert_eq!(carry, false);
        assert_eq!(overflow, true);
    }

    #[test]
    fn test_alu_neg() {
        let (result, carry, overflow, _) = 0x80u8.alu_neg();
        assert_eq!(result, 0x80);
        assert_eq!(carry, true);
        assert_eq!(overflow, true);
        let (result, carry, _, _) = 0u16.alu_neg();
        assert_eq!(result, 0);
        assert_eq!(carry, false);
    }

    #[test]
    fn test_alu_shr() {
        let (result, carry) = 0x80u8.alu_shr(7);
        assert_eq!(result, 1);
        assert_eq!(carry, false);
        let (result, carry) = 0x04u8.alu_shr(3);
        assert_eq!(result, 0);
        assert_eq!(carry, true);

        let (result, carry) = 0x8000_0001u32.alu_shr(1);
        assert_eq!(result, 0x4000_0000);
        assert_eq!(carry, true);
    }

    #[test]
    fn test_alu_shl() {
        let (result, carry) = 0x80u8.alu_shl(1);
        assert_eq!(result, 0);
        assert_eq!(carry, true);
        let (result, carry) = 0xFF00u16.alu_shl(8);
        assert_eq!(result, 0x0000);
        assert_eq!(carry, true);
        let (result, carry) = 0x0000_0001u32.alu_shl(31);
        assert_eq!(result, 0x8000_0000);
        assert_eq!(carry, false);
    }

    #[test]
    fn test_alu_sar() {
        let (result, carry) = 0x80u8.alu_sar(3);
        assert_eq!(result, 0xF0);
        assert_eq!(carry, false);
        let (result, carry) = 0x8001u16.alu_sar(1);
        assert_eq!(result, 0xC000);
        assert_eq!(carry, true);
        let (result, _) = 0x8000_0000u32.alu_sar(31);
        assert_eq!(result, 0xFFFF_FFFF);
    }

    #[test]
    fn test_alu_rcl_rcr() {
        let (result, carry) = 0x80u8.alu_rcl(1, false);
        assert_eq!(result, 0x00);
        assert_eq!(carry, true);

        // RCL by width+1 is the identity.
        let (result, carry) = 0xDEADu16.alu_rcl(17, false);
        assert_eq!(result, 0xDEAD);
        assert_eq!(carry, false);

        let (result, carry) = 0x00u8.alu_rcr(1, true);
        assert_eq!(result, 0x80);
        assert_eq!(carry, false);
        let (result, carry) = 0x01u32.alu_rcr(1, false);
        assert_eq!(result, 0);
        assert_eq!(carry, true);
    }

    #[test]
    fn test_rol_ror() {
        let (result, carry) = 0x80u8.alu_rol(1);
        assert_eq!(result, 0x01);
        assert_eq!(carry, true);
        let (result, carry) = 0x0001u16.alu_ror(1);
        assert_eq!(result, 0x8000);
        assert_eq!(carry, true);
        let (result, carry) = 0x1234_5678u32.alu_rol(8);
        assert_eq!(result, 0x3456_7812);
        assert_eq!(carry, false);
    }
}
