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

    cpu_x86::execute::mod.rs

    Instruction execution units. Handlers live in submodules grouped by unit; this module
    holds the shared ALU dispatch and the operand cost helpers they use.

    Every handler reads all of its operands before it mutates architectural state, so a
    fault raised by an operand fetch unwinds the instruction without a partial commit.

*/

pub mod control;
pub mod fpu;
pub mod integer;
pub mod mmx;
pub mod sse;

use crate::{
    cpu_common::{alu::*, features::CpuFeatures, features::CR0_EM, features::CR0_TS, CpuFault},
    cpu_x86::{addressing::ModRm, CpuContext, Flag, OperandWidth},
};

/// The eight ALU operations of the 00-3F block and group 1, in encoding order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    pub fn from_index(idx: u8) -> AluOp {
        match idx & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Or,
            2 => AluOp::Adc,
            3 => AluOp::Sbb,
            4 => AluOp::And,
            5 => AluOp::Sub,
            6 => AluOp::Xor,
            _ => AluOp::Cmp,
        }
    }

    /// CMP only updates flags.
    #[inline]
    pub fn writes_result(&self) -> bool {
        *self != AluOp::Cmp
    }
}

/// Shift group 2 operations, in /reg order. /6 is an undocumented alias of SHL.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sal,
    Sar,
}

impl ShiftOp {
    pub fn from_index(idx: u8) -> ShiftOp {
        match idx & 0x07 {
            0 => ShiftOp::Rol,
            1 => ShiftOp::Ror,
            2 => ShiftOp::Rcl,
            3 => ShiftOp::Rcr,
            4 => ShiftOp::Shl,
            5 => ShiftOp::Shr,
            6 => ShiftOp::Sal,
            _ => ShiftOp::Sar,
        }
    }

    #[inline]
    fn is_rotate(&self) -> bool {
        matches!(self, ShiftOp::Rol | ShiftOp::Ror | ShiftOp::Rcl | ShiftOp::Rcr)
    }
}

/// Run an arithmetic trait method at the given operand width, widening the result to u32.
macro_rules! arith_width {
    ($width:expr, $a:expr, $method:ident ( $($arg:expr),* )) => {
        match $width {
            OperandWidth::Byte => {
                let (r, c, o, x) = ($a as u8).$method($($arg as u8),*);
                (r as u32, c, o, x)
            }
            OperandWidth::Word => {
                let (r, c, o, x) = ($a as u16).$method($($arg as u16),*);
                (r as u32, c, o, x)
            }
            OperandWidth::Dword => $a.$method($($arg),*),
        }
    };
}

macro_rules! shift_width {
    ($width:expr, $a:expr, $method:ident ( $($arg:expr),* )) => {
        match $width {
            OperandWidth::Byte => {
                let (r, c) = ($a as u8).$method($($arg),*);
                (r as u32, c)
            }
            OperandWidth::Word => {
                let (r, c) = ($a as u16).$method($($arg),*);
                (r as u32, c)
            }
            OperandWidth::Dword => $a.$method($($arg),*),
        }
    };
}

impl CpuContext {
    /// Perform an ALU operation and commit its flags. Returns the result, which the caller
    /// discards for CMP.
    pub(crate) fn alu_op(&mut self, op: AluOp, a: u32, b: u32, width: OperandWidth) -> u32 {
        let carry_in = self.get_flag(Flag::Carry);
        let (result, carry, overflow, aux) = match op {
            AluOp::Add => arith_width!(width, a, alu_add(b)),
            AluOp::Adc => match width {
                OperandWidth::Byte => {
                    let (r, c, o, x) = (a as u8).alu_adc(b as u8, carry_in);
                    (r as u32, c, o, x)
                }
                OperandWidth::Word => {
                    let (r, c, o, x) = (a as u16).alu_adc(b as u16, carry_in);
                    (r as u32, c, o, x)
                }
                OperandWidth::Dword => a.alu_adc(b, carry_in),
            },
            AluOp::Sub | AluOp::Cmp => arith_width!(width, a, alu_sub(b)),
            AluOp::Sbb => match width {
                OperandWidth::Byte => {
                    let (r, c, o, x) = (a as u8).alu_sbb(b as u8, carry_in);
                    (r as u32, c, o, x)
                }
                OperandWidth::Word => {
                    let (r, c, o, x) = (a as u16).alu_sbb(b as u16, carry_in);
                    (r as u32, c, o, x)
                }
                OperandWidth::Dword => a.alu_sbb(b, carry_in),
            },
            AluOp::Or => ((a | b) & width.mask(), false, false, false),
            AluOp::And => ((a & b) & width.mask(), false, false, false),
            AluOp::Xor => ((a ^ b) & width.mask(), false, false, false),
        };
        self.set_flag_state(Flag::Carry, carry);
        self.set_flag_state(Flag::Overflow, overflow);
        self.set_flag_state(Flag::AuxCarry, aux);
        self.set_szp_flags_from_result(result, width);
        result
    }

    /// INC and DEC leave the carry flag alone.
    pub(crate) fn inc_dec(&mut self, a: u32, dec: bool, width: OperandWidth) -> u32 {
        let (result, _carry, overflow, aux) = if dec {
            arith_width!(width, a, alu_sub(1u32))
        }
        else {
            arith_width!(width, a, alu_add(1u32))
        };
        self.set_flag_state(Flag::Overflow, overflow);
        self.set_flag_state(Flag::AuxCarry, aux);
        self.set_szp_flags_from_result(result, width);
        result
    }

    pub(crate) fn neg_op(&mut self, a: u32, width: OperandWidth) -> u32 {
        let (result, _carry, overflow, aux) = arith_width!(width, a, alu_neg());
        self.set_flag_state(Flag::Carry, a & width.mask() != 0);
        self.set_flag_state(Flag::Overflow, overflow);
        self.set_flag_state(Flag::AuxCarry, aux);
        self.set_szp_flags_from_result(result, width);
        result
    }

    /// Perform a shift or rotate. A count of zero changes nothing, flags included. The 286
    /// and later mask the count to five bits.
    pub(crate) fn shift_op(&mut self, op: ShiftOp, a: u32, count: u8, width: OperandWidth) -> u32 {
        let count = if self.model.is286 { count & 0x1F } else { count };
        if count == 0 {
            return a;
        }
        let carry_in = self.get_flag(Flag::Carry);
        let (result, carry) = match op {
            ShiftOp::Rol => shift_width!(width, a, alu_rol(count)),
            ShiftOp::Ror => shift_width!(width, a, alu_ror(count)),
            ShiftOp::Rcl => shift_width!(width, a, alu_rcl(count, carry_in)),
            ShiftOp::Rcr => shift_width!(width, a, alu_rcr(count, carry_in)),
            ShiftOp::Shl | ShiftOp::Sal => shift_width!(width, a, alu_shl(count)),
            ShiftOp::Shr => shift_width!(width, a, alu_shr(count)),
            ShiftOp::Sar => shift_width!(width, a, alu_sar(count)),
        };

        let msb = result & width.sign_bit() != 0;
        let next = result & (width.sign_bit() >> 1) != 0;
        let overflow = match op {
            ShiftOp::Rol | ShiftOp::Rcl | ShiftOp::Shl | ShiftOp::Sal => msb ^ carry,
            ShiftOp::Ror | ShiftOp::Rcr => msb ^ next,
            ShiftOp::Shr => a & width.sign_bit() != 0,
            ShiftOp::Sar => false,
        };
        self.set_flag_state(Flag::Carry, carry);
        self.set_flag_state(Flag::Overflow, overflow);
        if !op.is_rotate() {
            self.set_szp_flags_from_result(result, width);
        }
        result
    }

    /// Charge a reg,r/m operation that reads memory: rr for a register source, otherwise
    /// rm (rml for dwords).
    pub(crate) fn charge_rm(&mut self, modrm: &ModRm, width: OperandWidth) {
        let cost = if modrm.is_register() {
            self.timing.rr
        }
        else if width.is_long() {
            self.timing.rml
        }
        else {
            self.timing.rm
        };
        cycles!(self, cost);
    }

    /// Charge an r/m,reg operation that writes memory: rr for a register destination,
    /// otherwise mr (mrl for dwords).
    pub(crate) fn charge_mr(&mut self, modrm: &ModRm, width: OperandWidth) {
        let cost = if modrm.is_register() {
            self.timing.rr
        }
        else if width.is_long() {
            self.timing.mrl
        }
        else {
            self.timing.mr
        };
        cycles!(self, cost);
    }

    /// Charge a read-modify-write r/m operation.
    pub(crate) fn charge_mm(&mut self, modrm: &ModRm, width: OperandWidth) {
        let cost = if modrm.is_register() {
            self.timing.rr
        }
        else if width.is_long() {
            self.timing.mml
        }
        else {
            self.timing.mm
        };
        cycles!(self, cost);
    }

    /// MMX instructions raise #UD while the feature is off or CR0.EM is set, and #NM while a
    /// task switch is pending.
    pub(crate) fn check_mmx(&self) -> Result<(), CpuFault> {
        if !self.model.features.has(CpuFeatures::MMX) || self.regs.cr0 & CR0_EM != 0 {
            return Err(CpuFault::ud(self.i.opcode));
        }
        if self.regs.cr0 & CR0_TS != 0 {
            return Err(CpuFault::nm());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        bus::BusInterface,
        cpu_common::{models::find_model, CpuError, Segment, StepResult},
        cpu_x86::registers::REGISTER_ESP,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    pub const CODE_SEGMENT: u16 = 0x0100;
    pub const DATA_SEGMENT: u16 = 0x2000;
    pub const STACK_SEGMENT: u16 = 0x3000;

    /// A core for the named model with code loaded at CS:0000 and real-mode segments set up
    /// for data and stack.
    pub fn cpu_with_code(name: &str, code: &[u8]) -> CpuContext {
        let (manufacturer, idx) = find_model(name).unwrap();
        let mut cpu = CpuContext::new(BusInterface::new(0x100000));
        cpu.configure(manufacturer.index(), idx).unwrap();
        cpu.reset();
        cpu.bus.copy_from(code, (CODE_SEGMENT as usize) << 4);
        cpu.set_entry_point(CODE_SEGMENT, 0);
        cpu.regs.load_segment(Segment::DS, DATA_SEGMENT);
        cpu.regs.load_segment(Segment::ES, DATA_SEGMENT);
        cpu.regs.load_segment(Segment::SS, STACK_SEGMENT);
        cpu.regs.set_reg16(REGISTER_ESP as u8, 0x1000);
        cpu
    }

    pub fn step_n(cpu: &mut CpuContext, n: usize) -> Result<StepResult, CpuError> {
        let mut result = StepResult::Normal;
        for _ in 0..n {
            result = cpu.step()?;
        }
        Ok(result)
    }

    /// Fill the general purpose registers with seeded noise, leaving the stack pointer alone.
    pub fn randomize_gprs(cpu: &mut CpuContext, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for (i, reg) in cpu.regs.gpr.iter_mut().enumerate() {
            if i != REGISTER_ESP {
                *reg = rng.gen();
            }
        }
    }

    #[test]
    fn test_alu_op_flags() {
        let mut cpu = cpu_with_code("286/12", &[]);
        let r = cpu.alu_op(AluOp::Add, 0xFF, 0x01, OperandWidth::Byte);
        assert_eq!(r, 0);
        assert!(cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Zero));
        assert!(cpu.get_flag(Flag::AuxCarry));

        cpu.alu_op(AluOp::Cmp, 0x1000, 0x2000, OperandWidth::Word);
        assert!(cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Sign));

        // Logical operations clear CF and OF.
        cpu.alu_op(AluOp::Xor, 0x8000_0000, 0, OperandWidth::Dword);
        assert!(!cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Sign));

        cpu.set_flag(Flag::Carry);
        let r = cpu.inc_dec(0x7FFF, false, OperandWidth::Word);
        assert_eq!(r, 0x8000);
        assert!(cpu.get_flag(Flag::Overflow));
        assert!(cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn test_shift_op() {
        let mut cpu = cpu_with_code("i386DX/33", &[]);
        let r = cpu.shift_op(ShiftOp::Shl, 0x81, 1, OperandWidth::Byte);
        assert_eq!(r, 0x02);
        assert!(cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Overflow));

        let r = cpu.shift_op(ShiftOp::Sar, 0x8000, 4, OperandWidth::Word);
        assert_eq!(r, 0xF800);

        // Zero count leaves the flags alone.
        cpu.set_flag(Flag::Carry);
        cpu.shift_op(ShiftOp::Shr, 0x10, 0x20, OperandWidth::Word);
        assert!(cpu.get_flag(Flag::Carry));

        cpu.clear_flag(Flag::Carry);
        let r = cpu.shift_op(ShiftOp::Rcl, 0x8000_0000, 1, OperandWidth::Dword);
        assert_eq!(r, 0);
        assert!(cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn test_8088_does_not_mask_count() {
        let mut cpu = cpu_with_code("8088/4.77", &[]);
        let r = cpu.shift_op(ShiftOp::Shl, 0x0001, 0x21, OperandWidth::Word);
        assert_eq!(r, 0);
        let mut cpu = cpu_with_code("286/12", &[]);
        let r = cpu.shift_op(ShiftOp::Shl, 0x0001, 0x21, OperandWidth::Word);
        assert_eq!(r, 0x0002);
    }
}
