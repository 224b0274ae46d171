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

    cpu_x86::execute::fpu.rs

    x87 instruction handlers, reached through the escape maps in dispatch::fpu.

    Unmasked exceptions leave the destination unchanged and set the error summary bit. The
    fault itself is reported by the next waiting instruction.

*/

use crate::{
    cpu_common::CpuFault,
    cpu_x86::{
        addressing::ModRm,
        registers::REGISTER_EAX,
        x87::{ControlWord, FpuCompare, FPU_EX_INVALID, FPU_EX_OVERFLOW, FPU_EX_ZERO_DIVIDE},
        CpuContext,
        Flag,
    },
};

const FADD_CYCLES: u32 = 8;
const FMUL_CYCLES: u32 = 16;
const FDIV_CYCLES: u32 = 73;
const FSQRT_CYCLES: u32 = 85;
const FLD_CYCLES: u32 = 4;
const FST_CYCLES: u32 = 7;
const FILD_CYCLES: u32 = 9;
const FIST_CYCLES: u32 = 29;
const FCOM_CYCLES: u32 = 4;
const FXCH_CYCLES: u32 = 4;
const FCHS_CYCLES: u32 = 6;
const FABS_CYCLES: u32 = 3;
const FLD_CONST_CYCLES: u32 = 4;
const FINIT_CYCLES: u32 = 17;
const FSTSW_CYCLES: u32 = 3;
const FLDCW_CYCLES: u32 = 4;
const FCMOV_CYCLES: u32 = 2;
const FCOMI_CYCLES: u32 = 3;

/// Operand size of an integer memory form: DB is a dword, DF a word.
#[derive(Copy, Clone, PartialEq)]
enum IntSize {
    Word,
    Dword,
}

impl CpuContext {
    #[inline]
    fn fpu_modrm(&self) -> ModRm {
        self.i.modrm.unwrap_or_default()
    }

    /// Apply one of the eight arithmetic operations selected by the ModRM reg field.
    /// `a` is ST(0) and `b` the other operand. Returns None for the compare forms.
    fn fpu_arith(&mut self, op: u8, a: f64, b: f64) -> Option<f64> {
        let (result, cost) = match op {
            0 => (a + b, FADD_CYCLES),
            1 => (a * b, FMUL_CYCLES),
            2 | 3 => {
                self.fpu_compare(a, b, true);
                cycles!(self, FCOM_CYCLES);
                return None;
            }
            4 => (a - b, FADD_CYCLES),
            5 => (b - a, FADD_CYCLES),
            6 => (a / b, FDIV_CYCLES),
            _ => (b / a, FDIV_CYCLES),
        };
        cycles!(self, cost);

        let mut flags = 0;
        if result.is_nan() && !a.is_nan() && !b.is_nan() {
            flags |= FPU_EX_INVALID;
        }
        else if result.is_infinite() && a.is_finite() && b.is_finite() {
            let divisor = if op == 6 { b } else { a };
            flags |= if op >= 6 && divisor == 0.0 { FPU_EX_ZERO_DIVIDE } else { FPU_EX_OVERFLOW };
        }
        if flags != 0 && self.fpu.raise(flags) {
            log::trace!("x87 unmasked exception {:02X} in {}", flags, self.i.mnemonic);
            return None;
        }
        Some(result)
    }

    /// Ordered compares raise invalid on any NaN operand.
    fn fpu_compare(&mut self, a: f64, b: f64, ordered: bool) -> FpuCompare {
        let result = FpuCompare::of(a, b);
        if ordered && result == FpuCompare::Unordered {
            self.fpu.raise(FPU_EX_INVALID);
        }
        self.fpu.set_compare(result);
        result
    }

    fn fpu_read_real(&mut self, modrm: &ModRm, double: bool) -> Result<f64, CpuFault> {
        let ea = self.memory_operand(modrm)?;
        if double {
            Ok(f64::from_bits(self.read_u64(ea.segment, ea.offset)?))
        }
        else {
            Ok(f32::from_bits(self.read_u32(ea.segment, ea.offset)?) as f64)
        }
    }

    /// D8 memory forms: ST(0) op m32real
    pub(crate) fn op_farith_m32(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let b = self.fpu_read_real(&modrm, false)?;
        self.farith_mem(modrm.reg, b);
        Ok(())
    }

    /// DC memory forms: ST(0) op m64real
    pub(crate) fn op_farith_m64(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let b = self.fpu_read_real(&modrm, true)?;
        self.farith_mem(modrm.reg, b);
        Ok(())
    }

    fn farith_mem(&mut self, op: u8, b: f64) {
        let a = self.fpu.st(0);
        if let Some(r) = self.fpu_arith(op, a, b) {
            self.fpu.set_st(0, r);
        }
        if op == 3 {
            self.fpu.pop();
        }
    }

    /// D8 register forms: ST(0) <- ST(0) op ST(i)
    pub(crate) fn op_farith_st0(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let i = modrm.rm as usize;
        let a = self.fpu.st(0);
        let b = self.fpu.st(i);
        if let Some(r) = self.fpu_arith(modrm.reg, a, b) {
            self.fpu.set_st(0, r);
        }
        if modrm.reg == 3 {
            self.fpu.pop();
        }
        Ok(())
    }

    /// DC and DE register forms: ST(i) <- ST(0) op ST(i). DE pops the stack afterwards.
    pub(crate) fn op_farith_sti(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let pops = self.i.opcode == 0xDE;
        let i = modrm.rm as usize;

        if pops && modrm.reg == 3 && i != 1 {
            // Only DE D9 is FCOMPP.
            return Err(CpuFault::ud(self.i.opcode));
        }

        let a = self.fpu.st(0);
        let b = self.fpu.st(i);
        if let Some(r) = self.fpu_arith(modrm.reg, a, b) {
            self.fpu.set_st(i, r);
        }

        match (pops, modrm.reg) {
            (true, 3) => {
                self.fpu.pop();
                self.fpu.pop();
            }
            (true, _) | (false, 3) => {
                self.fpu.pop();
            }
            _ => {}
        }
        Ok(())
    }

    /// D9 /0, DD /0: FLD m32real/m64real
    pub(crate) fn op_fld_m(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let value = self.fpu_read_real(&modrm, self.i.opcode == 0xDD)?;
        self.fpu.push(value);
        cycles!(self, FLD_CYCLES);
        Ok(())
    }

    /// D9 /2-3, DD /2-3: FST and FSTP to memory.
    pub(crate) fn op_fst_m(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let ea = self.memory_operand(&modrm)?;
        let value = self.fpu.st(0);
        if self.i.opcode == 0xDD {
            self.write_u64(ea.segment, ea.offset, value.to_bits())?;
        }
        else {
            let narrowed = value as f32;
            if narrowed.is_infinite() && value.is_finite() && self.fpu.raise(FPU_EX_OVERFLOW) {
                cycles!(self, FST_CYCLES);
                return Ok(());
            }
            self.write_u32(ea.segment, ea.offset, narrowed.to_bits())?;
        }
        if modrm.reg == 3 {
            self.fpu.pop();
        }
        cycles!(self, FST_CYCLES);
        Ok(())
    }

    /// D9 /5
    pub(crate) fn op_fldcw(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let ea = self.memory_operand(&modrm)?;
        let cw = self.read_u16(ea.segment, ea.offset)?;
        self.fpu.control = ControlWord::from_u16(cw);
        // Unmasking a pending exception raises the error summary immediately.
        let pending = self.fpu.status.exceptions() & !self.fpu.control.exception_masks() != 0;
        self.fpu.status.set_error_summary(pending);
        cycles!(self, FLDCW_CYCLES);
        Ok(())
    }

    /// D9 /7
    pub(crate) fn op_fnstcw(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let ea = self.memory_operand(&modrm)?;
        self.write_u16(ea.segment, ea.offset, self.fpu.control.to_u16())?;
        cycles!(self, FSTSW_CYCLES);
        Ok(())
    }

    /// D9 C0+i
    pub(crate) fn op_fld_sti(&mut self) -> Result<(), CpuFault> {
        let i = self.fpu_modrm().rm as usize;
        let value = self.fpu.st(i);
        self.fpu.push(value);
        cycles!(self, FLD_CYCLES);
        Ok(())
    }

    /// D9 C8+i
    pub(crate) fn op_fxch(&mut self) -> Result<(), CpuFault> {
        let i = self.fpu_modrm().rm as usize;
        self.fpu.exchange(i);
        cycles!(self, FXCH_CYCLES);
        Ok(())
    }

    /// FNOP, FCHS, FABS, FSQRT and the 287 FSETPM.
    pub(crate) fn op_fpu_misc(&mut self) -> Result<(), CpuFault> {
        match (self.i.opcode, self.fpu_modrm().byte) {
            (0xD9, 0xE0) => {
                let v = self.fpu.st(0);
                self.fpu.set_st(0, -v);
                cycles!(self, FCHS_CYCLES);
            }
            (0xD9, 0xE1) => {
                let v = self.fpu.st(0);
                self.fpu.set_st(0, v.abs());
                cycles!(self, FABS_CYCLES);
            }
            (0xD9, 0xFA) => {
                let v = self.fpu.st(0);
                if v < 0.0 && self.fpu.raise(FPU_EX_INVALID) {
                    cycles!(self, FSQRT_CYCLES);
                    return Ok(());
                }
                self.fpu.set_st(0, v.sqrt());
                cycles!(self, FSQRT_CYCLES);
            }
            _ => {
                // FNOP, FSETPM
                cycles!(self, 3);
            }
        }
        Ok(())
    }

    /// FLD1, FLDPI, FLDZ
    pub(crate) fn op_fld_const(&mut self) -> Result<(), CpuFault> {
        let value = match self.fpu_modrm().byte {
            0xE8 => 1.0,
            0xEB => std::f64::consts::PI,
            _ => 0.0,
        };
        self.fpu.push(value);
        cycles!(self, FLD_CONST_CYCLES);
        Ok(())
    }

    fn int_size(&self) -> IntSize {
        if self.i.opcode == 0xDF {
            IntSize::Word
        }
        else {
            IntSize::Dword
        }
    }

    /// DB /0, DF /0: FILD
    pub(crate) fn op_fild_m(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let ea = self.memory_operand(&modrm)?;
        let value = match self.int_size() {
            IntSize::Word => self.read_u16(ea.segment, ea.offset)? as i16 as f64,
            IntSize::Dword => self.read_u32(ea.segment, ea.offset)? as i32 as f64,
        };
        self.fpu.push(value);
        cycles!(self, FILD_CYCLES);
        Ok(())
    }

    /// DB /2-3, DF /2-3: FIST and FISTP. Out of range values store the integer indefinite.
    pub(crate) fn op_fist_m(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let ea = self.memory_operand(&modrm)?;
        let size = self.int_size();
        let value = self.fpu.st(0);
        let rounded = self.fpu.round(value);

        let (min, max) = match size {
            IntSize::Word => (i16::MIN as f64, i16::MAX as f64),
            IntSize::Dword => (i32::MIN as f64, i32::MAX as f64),
        };
        let in_range = rounded.is_finite() && rounded >= min && rounded <= max;
        if !in_range && self.fpu.raise(FPU_EX_INVALID) {
            cycles!(self, FIST_CYCLES);
            return Ok(());
        }

        match size {
            IntSize::Word => {
                let v = if in_range { rounded as i16 as u16 } else { 0x8000 };
                self.write_u16(ea.segment, ea.offset, v)?;
            }
            IntSize::Dword => {
                let v = if in_range { rounded as i32 as u32 } else { 0x8000_0000 };
                self.write_u32(ea.segment, ea.offset, v)?;
            }
        }
        if modrm.reg == 3 {
            self.fpu.pop();
        }
        cycles!(self, FIST_CYCLES);
        Ok(())
    }

    /// DB E2 FNCLEX, DB E3 FNINIT
    pub(crate) fn op_fpu_control(&mut self) -> Result<(), CpuFault> {
        if self.fpu_modrm().byte == 0xE3 {
            self.fpu.init();
            cycles!(self, FINIT_CYCLES);
        }
        else {
            self.fpu.status.set_exceptions(0);
            self.fpu.status.set_stack_fault(false);
            self.fpu.status.set_error_summary(false);
            self.fpu.status.set_busy(false);
            cycles!(self, FSTSW_CYCLES);
        }
        Ok(())
    }

    /// DD /7 to memory, DF E0 to AX.
    pub(crate) fn op_fnstsw(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let sw = self.fpu.status.to_u16();
        if self.i.opcode == 0xDF {
            self.regs.set_reg16(REGISTER_EAX as u8, sw);
        }
        else {
            let ea = self.memory_operand(&modrm)?;
            self.write_u16(ea.segment, ea.offset, sw)?;
        }
        cycles!(self, FSTSW_CYCLES);
        Ok(())
    }

    /// DD D0+i FST ST(i), DD D8+i FSTP ST(i)
    pub(crate) fn op_fst_sti(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let value = self.fpu.st(0);
        self.fpu.set_st(modrm.rm as usize, value);
        if modrm.reg == 3 {
            self.fpu.pop();
        }
        cycles!(self, FLD_CYCLES);
        Ok(())
    }

    /// DA/DB C0-DF: FCMOVcc. DB holds the negated conditions.
    pub(crate) fn op_fcmov(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let cond = match modrm.reg & 0x03 {
            0 => self.get_flag(Flag::Carry),
            1 => self.get_flag(Flag::Zero),
            2 => self.get_flag(Flag::Carry) || self.get_flag(Flag::Zero),
            _ => self.get_flag(Flag::Parity),
        };
        if cond != (self.i.opcode == 0xDB) {
            let value = self.fpu.st(modrm.rm as usize);
            self.fpu.set_st(0, value);
        }
        cycles!(self, FCMOV_CYCLES);
        Ok(())
    }

    /// DB/DF E8-F7: FUCOMI, FCOMI and the popping DF forms. Results go to ZF, PF and CF.
    pub(crate) fn op_fcomi(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fpu_modrm();
        let a = self.fpu.st(0);
        let b = self.fpu.st(modrm.rm as usize);
        let result = FpuCompare::of(a, b);
        if modrm.reg == 6 && result == FpuCompare::Unordered {
            self.fpu.raise(FPU_EX_INVALID);
        }
        let (zf, pf, cf) = result.condition_codes();
        self.set_flag_state(Flag::Zero, zf);
        self.set_flag_state(Flag::Parity, pf);
        self.set_flag_state(Flag::Carry, cf);
        self.clear_flag(Flag::Overflow);
        self.clear_flag(Flag::Sign);
        self.clear_flag(Flag::AuxCarry);
        if self.i.opcode == 0xDF {
            self.fpu.pop();
        }
        cycles!(self, FCOMI_CYCLES);
        Ok(())
    }
}
