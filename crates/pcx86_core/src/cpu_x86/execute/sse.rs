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

    cpu_x86::execute::sse.rs

    SSE handlers: packed single moves, arithmetic, logic and compares, plus the integer
    mnemonics SSE adds to the MMX set.

    The shared integer mnemonics operate on the MM bank while CR4.OSFXSR is clear and on the
    XMM bank once the OS has enabled SSE state.

*/

use crate::{
    cpu_common::{
        features::{CR0_EM, CR0_TS},
        CpuFault,
        FaultDetail,
        Segment,
        OPCODE_PREFIX_REPE,
    },
    cpu_x86::{
        addressing::ModRm,
        execute::mmx::{map_u16, map_u8},
        registers::{SimdReg, XmmReg},
        CpuContext,
        OperandWidth,
    },
};

/// CMPPS/CMPSS predicates, selected by the low 3 bits of the immediate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpPredicate {
    Eq,
    Lt,
    Le,
    Unord,
    Neq,
    Nlt,
    Nle,
    Ord,
}

impl CmpPredicate {
    pub fn from_imm(imm: u8) -> CmpPredicate {
        match imm & 0x07 {
            0 => CmpPredicate::Eq,
            1 => CmpPredicate::Lt,
            2 => CmpPredicate::Le,
            3 => CmpPredicate::Unord,
            4 => CmpPredicate::Neq,
            5 => CmpPredicate::Nlt,
            6 => CmpPredicate::Nle,
            _ => CmpPredicate::Ord,
        }
    }

    /// Evaluate the predicate. UNORD and ORD return a fixed mask regardless of NaN operands.
    pub fn eval(&self, a: f32, b: f32) -> bool {
        match self {
            CmpPredicate::Eq => a == b,
            CmpPredicate::Lt => a < b,
            CmpPredicate::Le => a <= b,
            CmpPredicate::Unord => false,
            CmpPredicate::Neq => a != b,
            CmpPredicate::Nlt => !(a < b),
            CmpPredicate::Nle => !(a <= b),
            CmpPredicate::Ord => true,
        }
    }
}

/// The integer operations SSE adds to the MMX set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SharedOp {
    Pavgb,
    Pavgw,
    Pminub,
    Pmaxub,
    Pminsw,
    Pmaxsw,
    Pmulhuw,
    Psadbw,
}

impl SharedOp {
    pub fn from_opcode(opcode: u8) -> Option<SharedOp> {
        match opcode {
            0xE0 => Some(SharedOp::Pavgb),
            0xE3 => Some(SharedOp::Pavgw),
            0xDA => Some(SharedOp::Pminub),
            0xDE => Some(SharedOp::Pmaxub),
            0xEA => Some(SharedOp::Pminsw),
            0xEE => Some(SharedOp::Pmaxsw),
            0xE4 => Some(SharedOp::Pmulhuw),
            0xF6 => Some(SharedOp::Psadbw),
            _ => None,
        }
    }
}

/// Apply a shared operation over either register width.
pub(crate) fn shared_packed<const N: usize>(op: SharedOp, a: &SimdReg<N>, b: &SimdReg<N>) -> SimdReg<N> {
    match op {
        SharedOp::Pavgb => map_u8(a, b, |x, y| ((x as u16 + y as u16 + 1) >> 1) as u8),
        SharedOp::Pavgw => map_u16(a, b, |x, y| ((x as u32 + y as u32 + 1) >> 1) as u16),
        SharedOp::Pminub => map_u8(a, b, |x, y| x.min(y)),
        SharedOp::Pmaxub => map_u8(a, b, |x, y| x.max(y)),
        SharedOp::Pminsw => map_u16(a, b, |x, y| (x as i16).min(y as i16) as u16),
        SharedOp::Pmaxsw => map_u16(a, b, |x, y| (x as i16).max(y as i16) as u16),
        SharedOp::Pmulhuw => map_u16(a, b, |x, y| ((x as u32 * y as u32) >> 16) as u16),
        SharedOp::Psadbw => {
            // One sum of absolute differences per quadword, in its low word.
            let mut r = SimdReg::<N>::default();
            for q in 0..N / 8 {
                let sum: u16 = (0..8)
                    .map(|i| a.lane_u8(q * 8 + i).abs_diff(b.lane_u8(q * 8 + i)) as u16)
                    .sum();
                r.set_lane_u16(q * 4, sum);
            }
            r
        }
    }
}

fn xmm_from_u128(bytes: [u8; 16]) -> XmmReg {
    SimdReg(bytes)
}

impl CpuContext {
    /// SSE instructions raise #UD unless the OS has enabled SSE state and CR0.EM is clear, and
    /// #NM while a task switch is pending.
    pub(crate) fn check_sse(&self) -> Result<(), CpuFault> {
        if !self.sse_enabled() || self.regs.cr0 & CR0_EM != 0 {
            return Err(CpuFault::ud(self.i.opcode));
        }
        if self.regs.cr0 & CR0_TS != 0 {
            return Err(CpuFault::nm());
        }
        Ok(())
    }

    #[inline]
    fn sse_scalar(&self) -> bool {
        self.i.prefixes & OPCODE_PREFIX_REPE != 0
    }

    /// Read the 128-bit source operand: XMM[rm] or memory. `aligned` forms require a 16-byte
    /// aligned linear address.
    fn xmm_source(&mut self, modrm: &ModRm, aligned: bool) -> Result<XmmReg, CpuFault> {
        match modrm.ea {
            None => Ok(self.regs.xmm[modrm.rm as usize]),
            Some(ea) => {
                if aligned {
                    self.check_alignment(ea.segment, ea.offset)?;
                }
                Ok(xmm_from_u128(self.read_u128(ea.segment, ea.offset)?))
            }
        }
    }

    fn check_alignment(&self, segment: Segment, offset: u32) -> Result<(), CpuFault> {
        let linear = self.regs.seg(segment).base.wrapping_add(offset);
        if linear & 0x0F != 0 {
            return Err(CpuFault::gp(FaultDetail::Memory {
                address: linear,
                write: false,
            }));
        }
        Ok(())
    }

    /// PAVGB, PAVGW, PMINUB, PMAXUB, PMINSW, PMAXSW, PMULHUW and PSADBW.
    pub(crate) fn op_simd_shared(&mut self) -> Result<(), CpuFault> {
        let op = SharedOp::from_opcode(self.i.opcode).ok_or_else(|| CpuFault::ud(self.i.opcode))?;
        if self.sse_enabled() {
            self.check_sse()?;
            let modrm = self.fetch_modrm()?;
            let src = self.xmm_source(&modrm, false)?;
            let dst = self.regs.xmm[modrm.reg as usize];
            self.regs.xmm[modrm.reg as usize] = shared_packed(op, &dst, &src);
            self.charge_rm(&modrm, OperandWidth::Dword);
        }
        else {
            self.check_mmx()?;
            let modrm = self.fetch_modrm()?;
            let src = self.mmx_source(&modrm)?;
            let dst = self.regs.mm[modrm.reg as usize];
            self.regs.mm[modrm.reg as usize] = shared_packed(op, &dst, &src);
            self.charge_rm(&modrm, OperandWidth::Dword);
        }
        Ok(())
    }

    /// 0F C4: PINSRW reg, r32/m16, imm8
    pub(crate) fn op_pinsrw(&mut self) -> Result<(), CpuFault> {
        let xmm = self.sse_enabled();
        if xmm {
            self.check_sse()?;
        }
        else {
            self.check_mmx()?;
        }
        let modrm = self.fetch_modrm()?;
        let imm = self.fetch_u8()? as usize;
        let value = self.read_rm(&modrm, OperandWidth::Word)? as u16;
        let reg = modrm.reg as usize;
        if xmm {
            self.regs.xmm[reg].set_lane_u16(imm & 7, value);
        }
        else {
            self.regs.mm[reg].set_lane_u16(imm & 3, value);
        }
        self.charge_rm(&modrm, OperandWidth::Word);
        Ok(())
    }

    /// 0F C5: PEXTRW r32, reg, imm8. Register source only.
    pub(crate) fn op_pextrw(&mut self) -> Result<(), CpuFault> {
        let xmm = self.sse_enabled();
        if xmm {
            self.check_sse()?;
        }
        else {
            self.check_mmx()?;
        }
        let modrm = self.fetch_modrm()?;
        let imm = self.fetch_u8()? as usize;
        if !modrm.is_register() {
            return Err(CpuFault::ud(self.i.opcode));
        }
        let rm = modrm.rm as usize;
        let value = if xmm {
            self.regs.xmm[rm].lane_u16(imm & 7)
        }
        else {
            self.regs.mm[rm].lane_u16(imm & 3)
        };
        self.regs.set_reg32(modrm.reg, value as u32);
        cycles!(self, 1);
        Ok(())
    }

    /// 0F 10 MOVUPS, 0F 28 MOVAPS: load
    pub(crate) fn op_movps_load(&mut self) -> Result<(), CpuFault> {
        self.check_sse()?;
        let modrm = self.fetch_modrm()?;
        let value = self.xmm_source(&modrm, self.i.opcode == 0x28)?;
        self.regs.xmm[modrm.reg as usize] = value;
        self.charge_rm(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// 0F 11 MOVUPS, 0F 29 MOVAPS: store
    pub(crate) fn op_movps_store(&mut self) -> Result<(), CpuFault> {
        self.check_sse()?;
        let modrm = self.fetch_modrm()?;
        let value = self.regs.xmm[modrm.reg as usize];
        match modrm.ea {
            None => self.regs.xmm[modrm.rm as usize] = value,
            Some(ea) => {
                if self.i.opcode == 0x29 {
                    self.check_alignment(ea.segment, ea.offset)?;
                }
                self.write_u128(ea.segment, ea.offset, &value.0)?;
            }
        }
        self.charge_mr(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// ADDPS, MULPS, SUBPS, DIVPS and their F3-prefixed scalar forms.
    pub(crate) fn op_sse_arith(&mut self) -> Result<(), CpuFault> {
        self.check_sse()?;
        let modrm = self.fetch_modrm()?;
        let scalar = self.sse_scalar();
        let src = self.xmm_source(&modrm, !scalar)?;
        let mut dst = self.regs.xmm[modrm.reg as usize];

        let op: fn(f32, f32) -> f32 = match self.i.opcode {
            0x58 => |a, b| a + b,
            0x59 => |a, b| a * b,
            0x5C => |a, b| a - b,
            _ => |a, b| a / b,
        };
        let lanes = if scalar { 1 } else { 4 };
        for i in 0..lanes {
            dst.set_lane_f32(i, op(dst.lane_f32(i), src.lane_f32(i)));
        }
        self.regs.xmm[modrm.reg as usize] = dst;

        self.charge_rm(&modrm, OperandWidth::Dword);
        if self.i.opcode == 0x5E {
            cycles!(self, if scalar { 17 } else { 35 });
        }
        Ok(())
    }

    /// ANDPS, ORPS, XORPS
    pub(crate) fn op_sse_logic(&mut self) -> Result<(), CpuFault> {
        self.check_sse()?;
        let modrm = self.fetch_modrm()?;
        let src = self.xmm_source(&modrm, true)?;
        let reg = modrm.reg as usize;
        let dst = self.regs.xmm[reg];
        let (lo, hi) = (dst.lane_u64(0), dst.lane_u64(1));
        let (slo, shi) = (src.lane_u64(0), src.lane_u64(1));
        let (rlo, rhi) = match self.i.opcode {
            0x54 => (lo & slo, hi & shi),
            0x56 => (lo | slo, hi | shi),
            _ => (lo ^ slo, hi ^ shi),
        };
        self.regs.xmm[reg].set_lane_u64(0, rlo);
        self.regs.xmm[reg].set_lane_u64(1, rhi);
        self.charge_rm(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// 0F C2: CMPPS, and CMPSS with an F3 prefix. Each compared lane becomes an all-ones or
    /// all-zeros mask.
    pub(crate) fn op_cmpps(&mut self) -> Result<(), CpuFault> {
        self.check_sse()?;
        let modrm = self.fetch_modrm()?;
        let imm = self.fetch_u8()?;
        let scalar = self.sse_scalar();
        let src = self.xmm_source(&modrm, !scalar)?;
        let predicate = CmpPredicate::from_imm(imm);

        let reg = modrm.reg as usize;
        let lanes = if scalar { 1 } else { 4 };
        for i in 0..lanes {
            let hit = predicate.eval(self.regs.xmm[reg].lane_f32(i), src.lane_f32(i));
            self.regs.xmm[reg].set_lane_u32(i, if hit { 0xFFFF_FFFF } else { 0 });
        }
        self.charge_rm(&modrm, OperandWidth::Dword);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cpu_common::{features::CR4_OSFXSR, CpuException, StepResult},
        cpu_x86::{
            execute::tests::{cpu_with_code, step_n, DATA_SEGMENT},
            registers::{MmReg, REGISTER_EAX, REGISTER_EBX},
        },
    };

    const P2_OVERDRIVE: &str = "Pentium II OverDrive 300/66";

    #[test]
    fn test_shared_mnemonic_selects_bank() {
        // PAVGB reg0, reg1
        let code = [0x0F, 0xE0, 0xC1];

        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        cpu.regs.mm[0] = SimdReg([0x10; 8]);
        cpu.regs.mm[1] = SimdReg([0x21; 8]);
        cpu.regs.xmm[0] = SimdReg([0x10; 16]);
        cpu.regs.xmm[1] = SimdReg([0x21; 16]);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.mm[0].0, [0x19; 8]);
        assert_eq!(cpu.regs.xmm[0].0, [0x10; 16]);

        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        cpu.regs.cr4 |= CR4_OSFXSR;
        cpu.regs.mm[0] = SimdReg([0x10; 8]);
        cpu.regs.mm[1] = SimdReg([0x21; 8]);
        cpu.regs.xmm[0] = SimdReg([0x10; 16]);
        cpu.regs.xmm[1] = SimdReg([0x21; 16]);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.xmm[0].0, [0x19; 16]);
        assert_eq!(cpu.regs.mm[0].0, [0x10; 8]);
    }

    #[test]
    fn test_psadbw_widths() {
        let a = MmReg::default();
        let b = SimdReg([1, 2, 3, 4, 5, 6, 7, 8]);
        let r = shared_packed(SharedOp::Psadbw, &a, &b);
        assert_eq!(r.lane_u16(0), 36);
        assert_eq!(r.lane_u16(1), 0);

        let a = XmmReg::default();
        let b = SimdReg([0xFF; 16]);
        let r = shared_packed(SharedOp::Psadbw, &a, &b);
        assert_eq!(r.lane_u16(0), 8 * 255);
        assert_eq!(r.lane_u16(4), 8 * 255);
    }

    #[test]
    fn test_shared_op_decode() {
        assert_eq!(SharedOp::from_opcode(0xF6), Some(SharedOp::Psadbw));
        assert_eq!(SharedOp::from_opcode(0xE4), Some(SharedOp::Pmulhuw));
        // Opcodes outside the shared set never decode as one of its operations.
        for opcode in [0x00, 0x58, 0xE1, 0xF7, 0xFC] {
            assert_eq!(SharedOp::from_opcode(opcode), None, "{:02X}", opcode);
        }
    }

    #[test]
    fn test_shared_op_outside_set_is_invalid() {
        // Dispatch PADDB's encoding straight into the shared handler.
        let mut cpu = cpu_with_code(P2_OVERDRIVE, &[0xC1]);
        cpu.regs.mm[0] = SimdReg([0x10; 8]);
        cpu.i.opcode = 0xFC;
        let fault = cpu.op_simd_shared().unwrap_err();
        assert_eq!(fault.exception, CpuException::InvalidOpcode);
        assert_eq!(cpu.regs.mm[0].0, [0x10; 8]);
    }

    #[test]
    fn test_pinsrw_pextrw_lanes() {
        let code = [
            0x0F, 0xC4, 0xC0, 0x07, // PINSRW reg0, EAX, 7
            0x0F, 0xC5, 0xD8, 0x07, // PEXTRW EBX, reg0, 7
        ];
        // Four lanes on the MM bank: index 7 wraps to 3.
        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        cpu.regs.gpr[REGISTER_EAX] = 0xBEEF;
        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.regs.mm[0].lane_u16(3), 0xBEEF);
        assert_eq!(cpu.regs.gpr[REGISTER_EBX], 0xBEEF);

        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        cpu.regs.cr4 |= CR4_OSFXSR;
        cpu.regs.gpr[REGISTER_EAX] = 0xBEEF;
        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.regs.xmm[0].lane_u16(7), 0xBEEF);
        assert_eq!(cpu.regs.mm[0].lane_u16(3), 0);
    }

    #[test]
    fn test_cmpps_predicates() {
        let nan = f32::NAN;
        let cases = [
            (0, 1.0, 1.0, true),
            (0, 1.0, 2.0, false),
            (1, 1.0, 2.0, true),
            (1, 2.0, 2.0, false),
            (2, 2.0, 2.0, true),
            (4, 1.0, 2.0, true),
            (4, nan, nan, true),
            (5, 3.0, 2.0, true),
            (5, nan, 1.0, true),
            (6, 2.0, 2.0, false),
            (6, 3.0, 2.0, true),
        ];
        for (imm, a, b, expected) in cases {
            assert_eq!(CmpPredicate::from_imm(imm).eval(a, b), expected, "imm {} {} {}", imm, a, b);
        }
        // Fixed masks for the NaN-sensitive predicates.
        assert!(!CmpPredicate::Unord.eval(nan, 1.0));
        assert!(CmpPredicate::Ord.eval(nan, 1.0));
        assert_eq!(CmpPredicate::from_imm(0x0B), CmpPredicate::Unord);
    }

    #[test]
    fn test_packed_and_scalar_arith() {
        let code = [
            0x0F, 0x58, 0xC1, // ADDPS xmm0, xmm1
            0xF3, 0x0F, 0x59, 0xC1, // MULSS xmm0, xmm1
            0x0F, 0xC2, 0xC1, 0x01, // CMPPS xmm0, xmm1, LT
        ];
        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        cpu.regs.cr4 |= CR4_OSFXSR;
        for i in 0..4 {
            cpu.regs.xmm[0].set_lane_f32(i, i as f32);
            cpu.regs.xmm[1].set_lane_f32(i, 2.0);
        }
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.xmm[0].lane_f32(3), 5.0);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.xmm[0].lane_f32(0), 4.0);
        assert_eq!(cpu.regs.xmm[0].lane_f32(1), 3.0);
        step_n(&mut cpu, 1).unwrap();
        // 4.0, 3.0, 4.0, 5.0 against 2.0
        assert_eq!(cpu.regs.xmm[0].lane_u32(0), 0);
        assert_eq!(cpu.regs.xmm[0].lane_u32(1), 0);
    }

    #[test]
    fn test_movaps_alignment() {
        let code = [
            0x0F, 0x28, 0x06, 0x08, 0x00, // MOVAPS xmm0, [0008]
            0x0F, 0x10, 0x06, 0x08, 0x00, // MOVUPS xmm0, [0008]
        ];
        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        cpu.regs.cr4 |= CR4_OSFXSR;
        let data = (DATA_SEGMENT as u32) << 4;
        for i in 0..16 {
            cpu.bus.write_u8(data + 8 + i, i as u8);
        }
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::GeneralProtection));
        assert_eq!(cpu.regs.xmm[0], XmmReg::default());

        // The same load through MOVUPS succeeds.
        cpu.set_entry_point(0x0100, 5);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.xmm[0].lane_u8(15), 15);
    }

    #[test]
    fn test_sse_requires_osfxsr() {
        let code = [0x0F, 0x57, 0xC0]; // XORPS xmm0, xmm0
        let mut cpu = cpu_with_code(P2_OVERDRIVE, &code);
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::InvalidOpcode));
    }
}
