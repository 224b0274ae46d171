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

    cpu_x86::execute::integer.rs

    Integer unit: ALU, data movement, stack, multiply/divide and flag instructions.

*/

use crate::{
    cpu_common::{CpuException, CpuFault, FaultDetail, Segment},
    cpu_x86::{
        execute::{AluOp, ShiftOp},
        registers::{REGISTER_EAX, REGISTER_ECX, REGISTER_EDX, REGISTER_ESP},
        CpuContext,
        Flag,
        OperandWidth,
        CPU_FLAGS_ARITH_MASK,
    },
};

const AL: u8 = REGISTER_EAX as u8;
const AH: u8 = 4;
const CL: u8 = REGISTER_ECX as u8;
const SP: u8 = REGISTER_ESP as u8;

impl CpuContext {
    /// Width of an opcode whose low bit selects byte or full size.
    #[inline]
    fn opcode_width(&self) -> OperandWidth {
        if self.i.opcode & 0x01 == 0 {
            OperandWidth::Byte
        }
        else {
            self.op_width()
        }
    }

    /// The segment register named by a 3-bit sreg field. FS and GS only exist on the 386.
    fn sreg_operand(&self, sreg: u8) -> Result<Segment, CpuFault> {
        match Segment::from_sreg(sreg) {
            Some(seg) if sreg < 4 || self.model.is386 => Ok(seg),
            _ => Err(CpuFault::ud(self.i.opcode)),
        }
    }

    fn divide_error(&self) -> CpuFault {
        CpuFault::new(CpuException::DivideError, None, FaultDetail::None)
    }

    /// 00-3D: ALU op in all six encodings.
    pub(crate) fn op_alu(&mut self) -> Result<(), CpuFault> {
        let op = AluOp::from_index(self.i.opcode >> 3);
        let width = self.opcode_width();

        match self.i.opcode & 0x07 {
            0 | 1 => {
                let modrm = self.fetch_modrm()?;
                let dst = self.read_rm(&modrm, width)?;
                let src = self.reg_read(width, modrm.reg);
                let result = self.alu_op(op, dst, src, width);
                if op.writes_result() {
                    self.write_rm(&modrm, width, result)?;
                    self.charge_mr(&modrm, width);
                }
                else {
                    self.charge_rm(&modrm, width);
                }
            }
            2 | 3 => {
                let modrm = self.fetch_modrm()?;
                let src = self.read_rm(&modrm, width)?;
                let dst = self.reg_read(width, modrm.reg);
                let result = self.alu_op(op, dst, src, width);
                if op.writes_result() {
                    self.reg_write(width, modrm.reg, result);
                }
                self.charge_rm(&modrm, width);
            }
            _ => {
                let imm = self.fetch_imm(width)?;
                let dst = self.reg_read(width, AL);
                let result = self.alu_op(op, dst, imm, width);
                if op.writes_result() {
                    self.reg_write(width, AL, result);
                }
                cycles!(self, self.timing.rr);
            }
        }
        Ok(())
    }

    /// 80-83: ALU op with an immediate.
    pub(crate) fn op_grp1(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;
        let imm = if self.i.opcode == 0x83 {
            self.fetch_i8()? & width.mask()
        }
        else {
            self.fetch_imm(width)?
        };
        let op = AluOp::from_index(modrm.reg);
        let dst = self.read_rm(&modrm, width)?;
        let result = self.alu_op(op, dst, imm, width);
        if op.writes_result() {
            self.write_rm(&modrm, width, result)?;
            self.charge_mr(&modrm, width);
        }
        else {
            self.charge_rm(&modrm, width);
        }
        Ok(())
    }

    /// 84-85: TEST r/m, reg
    pub(crate) fn op_test_rm(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;
        let a = self.read_rm(&modrm, width)?;
        let b = self.reg_read(width, modrm.reg);
        self.alu_op(AluOp::And, a, b, width);
        self.charge_rm(&modrm, width);
        Ok(())
    }

    /// A8-A9: TEST AL/eAX, imm
    pub(crate) fn op_test_acc(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let imm = self.fetch_imm(width)?;
        let a = self.reg_read(width, AL);
        self.alu_op(AluOp::And, a, imm, width);
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// 40-4F
    pub(crate) fn op_inc_dec_reg(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let reg = self.i.opcode & 0x07;
        let value = self.reg_read(width, reg);
        let result = self.inc_dec(value, self.i.opcode & 0x08 != 0, width);
        self.reg_write(width, reg, result);
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// FE: INC/DEC r/m8
    pub(crate) fn op_grp4(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fetch_modrm()?;
        if modrm.reg > 1 {
            return Err(CpuFault::ud(self.i.opcode));
        }
        let value = self.read_rm(&modrm, OperandWidth::Byte)?;
        let result = self.inc_dec(value, modrm.reg == 1, OperandWidth::Byte);
        self.write_rm(&modrm, OperandWidth::Byte, result)?;
        self.charge_mm(&modrm, OperandWidth::Byte);
        Ok(())
    }

    /// C0-C1, D0-D3: shift group 2.
    pub(crate) fn op_grp2(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;
        let count = match self.i.opcode {
            0xC0 | 0xC1 => self.fetch_u8()?,
            0xD0 | 0xD1 => 1,
            _ => self.regs.reg8(CL),
        };
        let value = self.read_rm(&modrm, width)?;
        let result = self.shift_op(ShiftOp::from_index(modrm.reg), value, count, width);
        self.write_rm(&modrm, width, result)?;
        self.charge_mm(&modrm, width);
        Ok(())
    }

    /// F6-F7: TEST/NOT/NEG/MUL/IMUL/DIV/IDIV
    pub(crate) fn op_grp3(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;

        match modrm.reg {
            0 | 1 => {
                let imm = self.fetch_imm(width)?;
                let value = self.read_rm(&modrm, width)?;
                self.alu_op(AluOp::And, value, imm, width);
                let cost = match (self.model.is486, modrm.is_register()) {
                    (true, true) => 1,
                    (true, false) => 2,
                    (false, true) => 2,
                    (false, false) => 5,
                };
                cycles!(self, cost);
            }
            2 => {
                let value = self.read_rm(&modrm, width)?;
                self.write_rm(&modrm, width, !value & width.mask())?;
                self.charge_mm(&modrm, width);
            }
            3 => {
                let value = self.read_rm(&modrm, width)?;
                let result = self.neg_op(value, width);
                self.write_rm(&modrm, width, result)?;
                self.charge_mm(&modrm, width);
            }
            4 | 5 => {
                let value = self.read_rm(&modrm, width)?;
                self.multiply(value, width, modrm.reg == 5);
            }
            _ => {
                let value = self.read_rm(&modrm, width)?;
                self.divide(value, width, modrm.reg == 7)?;
            }
        }
        Ok(())
    }

    /// MUL and IMUL into the accumulator pair. CF and OF report whether the upper half is
    /// significant.
    fn multiply(&mut self, src: u32, width: OperandWidth, signed: bool) {
        let acc = self.reg_read(width, AL);
        let product: u64 = match (width, signed) {
            (OperandWidth::Byte, false) => acc as u64 * src as u64,
            (OperandWidth::Byte, true) => (acc as u8 as i8 as i64 * src as u8 as i8 as i64) as u64,
            (OperandWidth::Word, false) => acc as u64 * src as u64,
            (OperandWidth::Word, true) => (acc as u16 as i16 as i64 * src as u16 as i16 as i64) as u64,
            (OperandWidth::Dword, false) => acc as u64 * src as u64,
            (OperandWidth::Dword, true) => (acc as i32 as i64 * src as i32 as i64) as u64,
        };

        let bits = width.bytes() * 8;
        let low = product as u32 & width.mask();
        let high = (product >> bits) as u32 & width.mask();
        let significant = if signed {
            // The upper half must be the sign extension of the lower half.
            let extended = if low & width.sign_bit() != 0 { width.mask() } else { 0 };
            high != extended
        }
        else {
            high != 0
        };

        match width {
            OperandWidth::Byte => self.regs.set_reg16(AL, product as u16),
            _ => {
                self.reg_write(width, REGISTER_EAX as u8, low);
                self.reg_write(width, REGISTER_EDX as u8, high);
            }
        }
        self.set_flag_state(Flag::Carry, significant);
        self.set_flag_state(Flag::Overflow, significant);
        self.set_szp_flags_from_result(low, width);

        let cost = match (width, signed) {
            (OperandWidth::Byte, false) => 13,
            (OperandWidth::Byte, true) => 14,
            (OperandWidth::Word, false) => 21,
            (OperandWidth::Word, true) => 22,
            (OperandWidth::Dword, false) => 21,
            (OperandWidth::Dword, true) => 38,
        };
        cycles!(self, cost);
    }

    /// DIV and IDIV. A zero divisor or a quotient that does not fit raises #DE before any
    /// register is written.
    fn divide(&mut self, divisor: u32, width: OperandWidth, signed: bool) -> Result<(), CpuFault> {
        if divisor & width.mask() == 0 {
            return Err(self.divide_error());
        }
        let bits = width.bytes() * 8;
        let dividend: u64 = match width {
            OperandWidth::Byte => self.regs.reg16(AL) as u64,
            _ => {
                ((self.reg_read(width, REGISTER_EDX as u8) as u64) << bits)
                    | self.reg_read(width, REGISTER_EAX as u8) as u64
            }
        };

        let (quotient, remainder) = if signed {
            let shift = 64 - 2 * bits;
            let n = ((dividend << shift) as i64) >> shift;
            let d = ((divisor as u64) << (64 - bits)) as i64 >> (64 - bits);
            let (Some(q), Some(r)) = (n.checked_div(d), n.checked_rem(d))
            else {
                return Err(self.divide_error());
            };
            let max = (width.sign_bit() - 1) as i64;
            let min = -(width.sign_bit() as i64);
            if q > max || q < min {
                return Err(self.divide_error());
            }
            (q as u32 & width.mask(), r as u32 & width.mask())
        }
        else {
            let d = (divisor & width.mask()) as u64;
            let q = dividend / d;
            if q > width.mask() as u64 {
                return Err(self.divide_error());
            }
            (q as u32, (dividend % d) as u32)
        };

        match width {
            OperandWidth::Byte => {
                self.regs.set_reg8(AL, quotient as u8);
                self.regs.set_reg8(AH, remainder as u8);
            }
            _ => {
                self.reg_write(width, REGISTER_EAX as u8, quotient);
                self.reg_write(width, REGISTER_EDX as u8, remainder);
            }
        }

        let is486 = self.model.is486;
        let cost = match (width, signed) {
            (OperandWidth::Byte, false) => if is486 { 16 } else { 14 },
            (OperandWidth::Byte, true) => 19,
            (OperandWidth::Word, false) => if is486 { 24 } else { 22 },
            (OperandWidth::Word, true) => 27,
            (OperandWidth::Dword, false) => if is486 { 40 } else { 38 },
            (OperandWidth::Dword, true) => 43,
        };
        cycles!(self, cost);
        Ok(())
    }

    /// 86-87: XCHG r/m, reg
    pub(crate) fn op_xchg_rm(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;
        let a = self.read_rm(&modrm, width)?;
        let b = self.reg_read(width, modrm.reg);
        self.write_rm(&modrm, width, b)?;
        self.reg_write(width, modrm.reg, a);
        cycles!(self, if modrm.is_register() { 3 } else { 5 });
        Ok(())
    }

    /// 91-97: XCHG eAX, reg
    pub(crate) fn op_xchg_acc(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let reg = self.i.opcode & 0x07;
        let a = self.reg_read(width, AL);
        let b = self.reg_read(width, reg);
        self.reg_write(width, AL, b);
        self.reg_write(width, reg, a);
        cycles!(self, 3);
        Ok(())
    }

    /// 88-8B
    pub(crate) fn op_mov_rm(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;
        if self.i.opcode & 0x02 == 0 {
            let value = self.reg_read(width, modrm.reg);
            self.write_rm(&modrm, width, value)?;
            self.charge_mr(&modrm, width);
        }
        else {
            let value = self.read_rm(&modrm, width)?;
            self.reg_write(width, modrm.reg, value);
            self.charge_rm(&modrm, width);
        }
        Ok(())
    }

    /// C6-C7: MOV r/m, imm
    pub(crate) fn op_mov_rm_imm(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let modrm = self.fetch_modrm()?;
        let imm = self.fetch_imm(width)?;
        self.write_rm(&modrm, width, imm)?;
        self.charge_mr(&modrm, width);
        Ok(())
    }

    /// B0-BF: MOV reg, imm
    pub(crate) fn op_mov_reg_imm(&mut self) -> Result<(), CpuFault> {
        let width = if self.i.opcode < 0xB8 {
            OperandWidth::Byte
        }
        else {
            self.op_width()
        };
        let imm = self.fetch_imm(width)?;
        self.reg_write(width, self.i.opcode & 0x07, imm);
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// A0-A3: MOV between the accumulator and a direct memory offset.
    pub(crate) fn op_mov_moffs(&mut self) -> Result<(), CpuFault> {
        let width = self.opcode_width();
        let offset = if self.i.addr32 {
            self.fetch_u32()?
        }
        else {
            self.fetch_u16()? as u32
        };
        let segment = self.i.segment_override.unwrap_or(Segment::DS);
        if self.i.opcode & 0x02 == 0 {
            let value = self.read_width(segment, offset, width)?;
            self.reg_write(width, AL, value);
        }
        else {
            let value = self.reg_read(width, AL);
            self.write_width(segment, offset, width, value)?;
        }
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// 8C: MOV r/m16, sreg
    pub(crate) fn op_store_sreg(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fetch_modrm()?;
        let segment = self.sreg_operand(modrm.reg)?;
        let selector = self.regs.seg(segment).selector as u32;
        // A register destination takes the full operand size, zero extended.
        let width = if modrm.is_register() { self.op_width() } else { OperandWidth::Word };
        self.write_rm(&modrm, width, selector)?;
        self.charge_mr(&modrm, OperandWidth::Word);
        Ok(())
    }

    /// 8E: MOV sreg, r/m16
    pub(crate) fn op_load_sreg(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fetch_modrm()?;
        let segment = self.sreg_operand(modrm.reg)?;
        if segment == Segment::CS && self.model.is286 {
            return Err(CpuFault::ud(self.i.opcode));
        }
        let selector = self.read_rm(&modrm, OperandWidth::Word)? as u16;
        self.regs.load_segment(segment, selector);
        self.charge_rm(&modrm, OperandWidth::Word);
        Ok(())
    }

    /// 8D: LEA
    pub(crate) fn op_lea(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fetch_modrm()?;
        let ea = self.memory_operand(&modrm)?;
        let width = self.op_width();
        self.reg_write(width, modrm.reg, ea.offset);
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// 0F B6/B7/BE/BF: MOVZX and MOVSX
    pub(crate) fn op_movx(&mut self) -> Result<(), CpuFault> {
        let src_width = if self.i.opcode & 0x01 == 0 {
            OperandWidth::Byte
        }
        else {
            OperandWidth::Word
        };
        let modrm = self.fetch_modrm()?;
        let value = self.read_rm(&modrm, src_width)?;
        let value = if self.i.opcode & 0x08 != 0 {
            match src_width {
                OperandWidth::Byte => value as u8 as i8 as i32 as u32,
                _ => value as u16 as i16 as i32 as u32,
            }
        }
        else {
            value
        };
        self.reg_write(self.op_width(), modrm.reg, value);
        self.charge_rm(&modrm, src_width);
        Ok(())
    }

    /// 0F 40-4F: CMOVcc. The source is read whether or not the move happens.
    pub(crate) fn op_cmov(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let modrm = self.fetch_modrm()?;
        let value = self.read_rm(&modrm, width)?;
        if self.condition(self.i.opcode & 0x0F) {
            self.reg_write(width, modrm.reg, value);
        }
        self.charge_rm(&modrm, width);
        Ok(())
    }

    /// 90
    pub(crate) fn op_nop(&mut self) -> Result<(), CpuFault> {
        cycles!(self, if self.model.is486 { 1 } else { 3 });
        Ok(())
    }

    /// 98: CBW/CWDE
    pub(crate) fn op_cbw(&mut self) -> Result<(), CpuFault> {
        if self.i.op32 {
            let ax = self.regs.reg16(AL);
            self.regs.set_reg32(AL, ax as i16 as i32 as u32);
        }
        else {
            let al = self.regs.reg8(AL);
            self.regs.set_reg16(AL, al as i8 as i16 as u16);
        }
        cycles!(self, 3);
        Ok(())
    }

    /// 99: CWD/CDQ
    pub(crate) fn op_cwd(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let acc = self.reg_read(width, AL);
        let fill = if acc & width.sign_bit() != 0 { width.mask() } else { 0 };
        self.reg_write(width, REGISTER_EDX as u8, fill);
        cycles!(self, 2);
        Ok(())
    }

    /// 06/0E/16/1E, 0F A0/A8: PUSH sreg
    pub(crate) fn op_push_sreg(&mut self) -> Result<(), CpuFault> {
        let segment = self.sreg_operand((self.i.opcode >> 3) & 0x07)?;
        let selector = self.regs.seg(segment).selector as u32;
        self.push(selector, self.op_width())?;
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// 07/17/1F, 0F A1/A9: POP sreg
    pub(crate) fn op_pop_sreg(&mut self) -> Result<(), CpuFault> {
        let segment = self.sreg_operand((self.i.opcode >> 3) & 0x07)?;
        let selector = self.pop(self.op_width())? as u16;
        self.regs.load_segment(segment, selector);
        cycles!(self, if self.model.is486 { 3 } else { 7 });
        Ok(())
    }

    /// 50-57: PUSH reg. The 8088 pushes the already decremented SP for PUSH SP.
    pub(crate) fn op_push_reg(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let reg = self.i.opcode & 0x07;
        let mut value = self.reg_read(width, reg);
        if reg == SP && !self.model.is286 {
            value = value.wrapping_sub(2) & 0xFFFF;
        }
        self.push(value, width)?;
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// 58-5F: POP reg
    pub(crate) fn op_pop_reg(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let value = self.pop(width)?;
        self.reg_write(width, self.i.opcode & 0x07, value);
        cycles!(self, if self.model.is486 { 1 } else { 4 });
        Ok(())
    }

    /// 68/6A: PUSH imm
    pub(crate) fn op_push_imm(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let imm = if self.i.opcode == 0x6A {
            self.fetch_i8()? & width.mask()
        }
        else {
            self.fetch_imm(width)?
        };
        self.push(imm, width)?;
        cycles!(self, self.timing.rr);
        Ok(())
    }

    /// 8F: POP r/m. The stack pointer only moves once the destination has been written.
    pub(crate) fn op_pop_rm(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let modrm = self.fetch_modrm()?;
        if modrm.reg != 0 {
            return Err(CpuFault::ud(self.i.opcode));
        }
        let value = self.peek_stack(0, width)?;
        self.write_rm(&modrm, width, value)?;
        let sp = self.regs.reg16(SP).wrapping_add(width.bytes() as u16);
        self.regs.set_reg16(SP, sp);
        cycles!(self, if modrm.is_register() { 4 } else { 5 });
        Ok(())
    }

    /// 9C: PUSHF/PUSHFD. VM and RF are never pushed.
    pub(crate) fn op_pushf(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let flags = self.regs.eflags & 0x00FC_FFFF;
        self.push(flags, width)?;
        cycles!(self, if self.model.is486 { 4 } else { 3 });
        Ok(())
    }

    /// 9D: POPF/POPFD
    pub(crate) fn op_popf(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let value = self.pop(width)?;
        self.set_flags(value, width);
        cycles!(self, 5);
        Ok(())
    }

    /// 9E: SAHF
    pub(crate) fn op_sahf(&mut self) -> Result<(), CpuFault> {
        let ah = self.regs.reg8(AH) as u32;
        let arith_low = CPU_FLAGS_ARITH_MASK & 0xFF;
        self.regs.eflags = (self.regs.eflags & !arith_low) | (ah & arith_low);
        cycles!(self, 3);
        Ok(())
    }

    /// 9F: LAHF
    pub(crate) fn op_lahf(&mut self) -> Result<(), CpuFault> {
        self.regs.set_reg8(AH, self.regs.eflags as u8);
        cycles!(self, 3);
        Ok(())
    }

    /// F5, F8-FD: flag manipulation. CLI and STI check IOPL in protected mode.
    pub(crate) fn op_flag(&mut self) -> Result<(), CpuFault> {
        let iopl = ((self.regs.eflags >> 12) & 0x03) as u8;
        match self.i.opcode {
            0xF5 => {
                let carry = self.get_flag(Flag::Carry);
                self.set_flag_state(Flag::Carry, !carry);
            }
            0xF8 => self.clear_flag(Flag::Carry),
            0xF9 => self.set_flag(Flag::Carry),
            0xFA | 0xFB => {
                if self.protected_mode() && self.cpl() > iopl {
                    return Err(CpuFault::gp(FaultDetail::None));
                }
                self.set_flag_state(Flag::Interrupt, self.i.opcode == 0xFB);
                cycles!(self, 1);
            }
            0xFC => self.clear_flag(Flag::Direction),
            _ => self.set_flag(Flag::Direction),
        }
        cycles!(self, 2);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cpu_common::{features::CR0_PE, StepResult},
        cpu_x86::{
            execute::tests::{cpu_with_code, randomize_gprs, step_n, DATA_SEGMENT},
            registers::{REGISTER_EBX, REGISTER_ESI},
        },
    };

    const DATA_BASE: u32 = (DATA_SEGMENT as u32) << 4;

    #[test]
    fn test_alu_encodings() {
        let code = [
            0x01, 0xD8, // ADD AX, BX
            0x29, 0x47, 0x02, // SUB [BX+2], AX
            0x3C, 0x05, // CMP AL, 5
            0x80, 0x37, 0xFF, // XOR byte [BX], FF
            0x83, 0xC0, 0xFF, // ADD AX, -1
        ];
        let mut cpu = cpu_with_code("286/12", &code);
        cpu.regs.set_reg16(AL, 0x0003);
        cpu.regs.set_reg16(REGISTER_EBX as u8, 0x0010);
        cpu.bus.write_u16(DATA_BASE + 0x12, 0x0100);
        cpu.bus.write_u8(DATA_BASE + 0x10, 0x0F);

        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.regs.reg16(AL), 0x0013);
        assert_eq!(cpu.bus.read_u16(DATA_BASE + 0x12), 0x00ED);

        step_n(&mut cpu, 1).unwrap();
        assert!(!cpu.get_flag(Flag::Zero));
        assert!(!cpu.get_flag(Flag::Carry));

        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.bus.read_u8(DATA_BASE + 0x10), 0xF0);

        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.reg16(AL), 0x0012);
        assert!(cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn test_mov_and_stack() {
        let code = [
            0xB8, 0x34, 0x12, // MOV AX, 1234
            0x50, // PUSH AX
            0x8F, 0x06, 0x00, 0x01, // POP [0100]
            0x8B, 0x1E, 0x00, 0x01, // MOV BX, [0100]
            0x8C, 0xD9, // MOV CX, DS
            0x8D, 0x70, 0x05, // LEA SI, [BX+SI+5]
        ];
        let mut cpu = cpu_with_code("i386DX/33", &code);
        cpu.regs.set_reg16(REGISTER_ESI as u8, 0x0001);
        let sp = cpu.regs.reg16(SP);

        step_n(&mut cpu, 3).unwrap();
        assert_eq!(cpu.bus.read_u16(DATA_BASE + 0x100), 0x1234);
        assert_eq!(cpu.regs.reg16(SP), sp);

        step_n(&mut cpu, 3).unwrap();
        assert_eq!(cpu.regs.reg16(REGISTER_EBX as u8), 0x1234);
        assert_eq!(cpu.regs.reg16(CL), DATA_SEGMENT);
        assert_eq!(cpu.regs.reg16(REGISTER_ESI as u8), 0x123A);
    }

    #[test]
    fn test_operand_size_prefix() {
        let code = [
            0x66, 0xB8, 0x78, 0x56, 0x34, 0x12, // MOV EAX, 12345678
            0x66, 0x98, // CWDE
            0x0F, 0xBE, 0xD8, // MOVSX BX, AL
            0x66, 0x0F, 0xB7, 0xC8, // MOVZX ECX, AX
        ];
        let mut cpu = cpu_with_code("i486DX2/66", &code);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.gpr[REGISTER_EAX], 0x1234_5678);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.gpr[REGISTER_EAX], 0x0000_5678);
        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.regs.reg16(REGISTER_EBX as u8), 0x0078);
        assert_eq!(cpu.regs.gpr[REGISTER_ECX], 0x0000_5678);
    }

    #[test]
    fn test_mul_div() {
        let code = [
            0xF7, 0xE3, // MUL BX
            0xF7, 0xF3, // DIV BX
            0xF6, 0xFB, // IDIV BL
        ];
        let mut cpu = cpu_with_code("286/12", &code);
        cpu.regs.set_reg16(AL, 0x1234);
        cpu.regs.set_reg16(REGISTER_EBX as u8, 0x0100);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.reg16(AL), 0x3400);
        assert_eq!(cpu.regs.reg16(REGISTER_EDX as u8), 0x0012);
        assert!(cpu.get_flag(Flag::Carry));

        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.reg16(AL), 0x1234);
        assert_eq!(cpu.regs.reg16(REGISTER_EDX as u8), 0);

        // -7 / 2 in AX / BL
        cpu.regs.set_reg16(AL, (-7i16) as u16);
        cpu.regs.set_reg8(REGISTER_EBX as u8, 2);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.reg8(AL) as i8, -3);
        assert_eq!(cpu.regs.reg8(AH) as i8, -1);
    }

    #[test]
    fn test_divide_error_delivered_through_ivt() {
        let code = [0xF6, 0xF3]; // DIV BL
        let mut cpu = cpu_with_code("8088/4.77", &code);
        // Vector 0 points at 0500:0000
        cpu.bus.write_u16(0, 0x0000);
        cpu.bus.write_u16(2, 0x0500);
        cpu.regs.set_reg16(AL, 0x1234);
        cpu.regs.set_reg8(REGISTER_EBX as u8, 0);
        cpu.set_flag(Flag::Interrupt);

        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::DivideError));
        assert_eq!(cpu.regs.seg(Segment::CS).selector, 0x0500);
        assert_eq!(cpu.regs.eip, 0);
        assert!(!cpu.get_flag(Flag::Interrupt));
        // AX survived, and the pushed IP points back at the DIV.
        assert_eq!(cpu.regs.reg16(AL), 0x1234);
        assert_eq!(cpu.peek_stack(0, OperandWidth::Word).unwrap(), 0);
    }

    #[test]
    fn test_flag_ops() {
        let code = [0xF9, 0xF5, 0xFD, 0xFB, 0x9F, 0xB4, 0xD5, 0x9E];
        let mut cpu = cpu_with_code("i386DX/33", &code);
        step_n(&mut cpu, 2).unwrap();
        assert!(!cpu.get_flag(Flag::Carry));
        step_n(&mut cpu, 2).unwrap();
        assert!(cpu.get_flag(Flag::Direction));
        assert!(cpu.get_flag(Flag::Interrupt));
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.reg8(AH) & 0x02, 0x02);
        // MOV AH, D5; SAHF
        step_n(&mut cpu, 2).unwrap();
        assert!(cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Sign));
        assert!(cpu.get_flag(Flag::Zero));
    }

    /// Memory-operand instructions that fault must not commit registers, flags or memory.
    #[test]
    fn test_faulting_operand_leaves_state() {
        let cases: [&[u8]; 6] = [
            &[0x01, 0x07],       // ADD [BX], AX
            &[0x87, 0x07],       // XCHG [BX], AX
            &[0x8F, 0x07],       // POP [BX]
            &[0xF7, 0x37],       // DIV word [BX]
            &[0xD1, 0x27],       // SHL word [BX], 1
            &[0x0F, 0xB7, 0x07], // MOVZX AX, [BX]
        ];
        for (i, code) in cases.iter().enumerate() {
            let mut cpu = cpu_with_code("i486DX2/66", code);
            // Protected mode leaves the fault pending instead of vectoring through the IVT.
            cpu.regs.cr0 |= CR0_PE;
            randomize_gprs(&mut cpu, 0x5EED + i as u64);
            // Keep the word operand inside the segment limit so the page fault is what fires.
            cpu.regs.gpr[REGISTER_EBX] &= 0xFFFF_7FFE;
            for page in 0..16 {
                cpu.bus.set_page_fault(DATA_BASE + page * 0x1000, true);
            }
            cpu.regs.eflags |= 0x0001;
            let regs = cpu.regs.clone();

            let result = cpu.step().unwrap();
            match result {
                StepResult::Exception(fault) => assert_eq!(fault.exception, CpuException::PageFault),
                other => panic!("case {}: expected a page fault, got {:?}", i, other),
            }
            assert_eq!(cpu.regs.gpr, regs.gpr, "case {}", i);
            assert_eq!(cpu.regs.eflags, regs.eflags, "case {}", i);
            assert_eq!(cpu.regs.eip, regs.eip, "case {}", i);
            assert!(cpu.pending_exception().is_some());
        }
    }

    #[test]
    fn test_cycle_sums() {
        let code = [
            0x01, 0xD8, // ADD AX, BX
            0x31, 0xC9, // XOR CX, CX
            0xEB, 0x00, // JMP $+2
            0x74, 0x00, // JZ $+2 (not taken)
        ];
        let mut cpu = cpu_with_code("286/12", &code);
        assert_eq!(cpu.timing.rr, 2);
        assert_eq!(cpu.timing.bt, 4);

        let before = cpu.cycle_count();
        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.cycle_count() - before, 4);

        let before = cpu.cycle_count();
        step_n(&mut cpu, 1).unwrap();
        let expected = cpu.timing.bt + cpu.timing.bnt + cpu.bus_timing.prefetch_cycles;
        assert_eq!(cpu.cycle_count() - before, expected as u64);

        // XOR set ZF, so clear it to make the JZ fall through.
        cpu.clear_flag(Flag::Zero);
        let before = cpu.cycle_count();
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.cycle_count() - before, cpu.timing.bnt as u64);
    }
}
