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

    cpu_x86::x87.rs

    x87 coprocessor register state: the eight-entry register stack, tag word, and the
    status and control words.

    Stack values are held as f64. Extended precision is not modeled.

*/

use modular_bitfield::{bitfield, prelude::*};

pub const FPU_CW_DEFAULT: u16 = 0x037F;

// Exception flag bits shared by the status word and the control word masks.
pub const FPU_EX_INVALID: u8 = 1 << 0;
pub const FPU_EX_DENORMAL: u8 = 1 << 1;
pub const FPU_EX_ZERO_DIVIDE: u8 = 1 << 2;
pub const FPU_EX_OVERFLOW: u8 = 1 << 3;
pub const FPU_EX_UNDERFLOW: u8 = 1 << 4;
pub const FPU_EX_PRECISION: u8 = 1 << 5;

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusWord {
    pub exceptions: B6,
    pub stack_fault: bool,
    pub error_summary: bool,
    pub c0: bool,
    pub c1: bool,
    pub c2: bool,
    pub top: B3,
    pub c3: bool,
    pub busy: bool,
}

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControlWord {
    pub exception_masks: B6,
    #[skip]
    reserved0: B2,
    pub precision_control: B2,
    pub rounding_control: B2,
    pub infinity_control: bool,
    #[skip]
    reserved1: B3,
}

impl StatusWord {
    pub fn to_u16(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

impl ControlWord {
    pub fn from_u16(value: u16) -> Self {
        ControlWord::from_bytes(value.to_le_bytes())
    }

    pub fn to_u16(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FpuTag {
    Valid,
    Zero,
    Special,
    #[default]
    Empty,
}

impl FpuTag {
    fn for_value(value: f64) -> FpuTag {
        if value == 0.0 {
            FpuTag::Zero
        }
        else if value.is_finite() {
            FpuTag::Valid
        }
        else {
            FpuTag::Special
        }
    }

    fn bits(&self) -> u16 {
        match self {
            FpuTag::Valid => 0,
            FpuTag::Zero => 1,
            FpuTag::Special => 2,
            FpuTag::Empty => 3,
        }
    }
}

/// Condition code results of a comparison, in (C3, C2, C0) order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FpuCompare {
    Greater,
    Less,
    Equal,
    Unordered,
}

impl FpuCompare {
    pub fn of(a: f64, b: f64) -> FpuCompare {
        if a.is_nan() || b.is_nan() {
            FpuCompare::Unordered
        }
        else if a > b {
            FpuCompare::Greater
        }
        else if a < b {
            FpuCompare::Less
        }
        else {
            FpuCompare::Equal
        }
    }

    /// (C3, C2, C0)
    pub fn condition_codes(&self) -> (bool, bool, bool) {
        match self {
            FpuCompare::Greater => (false, false, false),
            FpuCompare::Less => (false, false, true),
            FpuCompare::Equal => (true, false, false),
            FpuCompare::Unordered => (true, true, true),
        }
    }
}

#[derive(Clone, Debug)]
pub struct X87State {
    regs: [f64; 8],
    tags: [FpuTag; 8],
    pub status: StatusWord,
    pub control: ControlWord,
}

impl Default for X87State {
    fn default() -> Self {
        let mut state = Self {
            regs: [0.0; 8],
            tags: [FpuTag::Empty; 8],
            status: StatusWord::new(),
            control: ControlWord::from_u16(FPU_CW_DEFAULT),
        };
        state.init();
        state
    }
}

impl X87State {
    /// FNINIT
    pub fn init(&mut self) {
        self.control = ControlWord::from_u16(FPU_CW_DEFAULT);
        self.status = StatusWord::new();
        self.tags = [FpuTag::Empty; 8];
    }

    #[inline]
    pub fn top(&self) -> usize {
        self.status.top() as usize
    }

    #[inline]
    fn phys(&self, i: usize) -> usize {
        (self.top() + i) & 0x07
    }

    pub fn tag_word(&self) -> u16 {
        self.tags
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, tag)| acc | (tag.bits() << (i * 2)))
    }

    pub fn is_empty(&self, i: usize) -> bool {
        self.tags[self.phys(i)] == FpuTag::Empty
    }

    /// Raise exception flags. Returns true if any of them is unmasked.
    pub fn raise(&mut self, flags: u8) -> bool {
        self.status.set_exceptions(self.status.exceptions() | flags);
        let unmasked = flags & !self.control.exception_masks() != 0;
        if unmasked {
            self.status.set_error_summary(true);
        }
        unmasked
    }

    fn stack_fault(&mut self, overflow: bool) {
        self.status.set_stack_fault(true);
        self.status.set_c1(overflow);
        self.raise(FPU_EX_INVALID);
    }

    /// Read ST(i). An empty register is a stack underflow and reads as the default NaN.
    pub fn st(&mut self, i: usize) -> f64 {
        let p = self.phys(i);
        if self.tags[p] == FpuTag::Empty {
            self.stack_fault(false);
            return f64::NAN;
        }
        self.regs[p]
    }

    /// Peek ST(i) without underflow side effects.
    pub fn peek(&self, i: usize) -> f64 {
        self.regs[self.phys(i)]
    }

    pub fn set_st(&mut self, i: usize, value: f64) {
        let p = self.phys(i);
        self.regs[p] = value;
        self.tags[p] = FpuTag::for_value(value);
    }

    pub fn push(&mut self, value: f64) {
        let new_top = (self.top() + 7) & 0x07;
        if self.tags[new_top] != FpuTag::Empty {
            self.stack_fault(true);
        }
        self.status.set_top(new_top as u8);
        self.set_st(0, value);
    }

    pub fn pop(&mut self) -> f64 {
        let value = self.st(0);
        let p = self.phys(0);
        self.tags[p] = FpuTag::Empty;
        self.status.set_top(((self.top() + 1) & 0x07) as u8);
        value
    }

    /// EMMS: tag every register empty.
    pub fn free_all(&mut self) {
        self.tags = [FpuTag::Empty; 8];
    }

    pub fn exchange(&mut self, i: usize) {
        let a = self.st(0);
        let b = self.st(i);
        self.set_st(0, b);
        self.set_st(i, a);
    }

    pub fn set_compare(&mut self, result: FpuCompare) {
        let (c3, c2, c0) = result.condition_codes();
        self.status.set_c3(c3);
        self.status.set_c2(c2);
        self.status.set_c0(c0);
        self.status.set_c1(false);
    }

    /// Round a value to an integer according to the rounding control field.
    pub fn round(&self, value: f64) -> f64 {
        match self.control.rounding_control() {
            0 => {
                // Round to nearest even
                let r = value.round();
                if (value - value.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
                    r - value.signum()
                }
                else {
                    r
                }
            }
            1 => value.floor(),
            2 => value.ceil(),
            _ => value.trunc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_words() {
        let fpu = X87State::default();
        assert_eq!(fpu.control.to_u16(), 0x037F);
        assert_eq!(fpu.status.to_u16(), 0);
        assert_eq!(fpu.tag_word(), 0xFFFF);
    }

    #[test]
    fn test_stack() {
        let mut fpu = X87State::default();
        fpu.push(1.0);
        fpu.push(2.0);
        assert_eq!(fpu.top(), 6);
        assert_eq!(fpu.status.to_u16() >> 11 & 7, 6);
        assert_eq!(fpu.st(0), 2.0);
        assert_eq!(fpu.st(1), 1.0);
        fpu.exchange(1);
        assert_eq!(fpu.pop(), 1.0);
        assert_eq!(fpu.pop(), 2.0);
        assert_eq!(fpu.top(), 0);
        assert!(!fpu.status.stack_fault());
    }

    #[test]
    fn test_underflow_masked() {
        let mut fpu = X87State::default();
        assert!(fpu.st(0).is_nan());
        assert!(fpu.status.stack_fault());
        assert_eq!(fpu.status.exceptions() & FPU_EX_INVALID, FPU_EX_INVALID);
        // Masked by default, so no error summary.
        assert!(!fpu.status.error_summary());
    }

    #[test]
    fn test_rounding() {
        let mut fpu = X87State::default();
        assert_eq!(fpu.round(2.5), 2.0);
        assert_eq!(fpu.round(3.5), 4.0);
        assert_eq!(fpu.round(-2.5), -2.0);
        fpu.control.set_rounding_control(3);
        assert_eq!(fpu.round(-2.7), -2.0);
    }
}
