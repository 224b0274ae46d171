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

    cpu_x86::dispatch::fpu.rs

    The x87 escape maps (D8-DF). A map has one slot per (escape, ModRM) pair. Memory forms
    are keyed on the reg field alone and fill every mod/rm combination for it.

*/

use lazy_static::lazy_static;

use crate::{
    cpu_common::{features::CR0_EM, features::CR0_MP, features::CR0_NE, features::CR0_TS, CpuException, CpuFault, CpuType, FaultDetail},
    cpu_x86::{
        dispatch::{OpEntry, OpHandler},
        CpuContext,
    },
};

pub const FPU_MAP_LEN: usize = 8 * 256;

/// Which coprocessor instruction set is installed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FpuVariant {
    #[default]
    None,
    Fpu287,
    Fpu387,
    /// 387 plus FCMOVcc and FCOMI.
    Fpu686,
}

impl FpuVariant {
    pub fn select(cpu_type: CpuType, hasfpu: bool) -> FpuVariant {
        if !hasfpu {
            return FpuVariant::None;
        }
        match cpu_type {
            CpuType::Intel286 => FpuVariant::Fpu287,
            CpuType::Cx6x86MX | CpuType::PentiumPro | CpuType::Pentium2OverDrive => FpuVariant::Fpu686,
            _ => FpuVariant::Fpu387,
        }
    }

    /// The escape map for the variant. None if no coprocessor is present.
    pub fn map(&self) -> Option<&'static [OpEntry]> {
        match self {
            FpuVariant::None => None,
            FpuVariant::Fpu287 => Some(&FPU_287_MAP),
            FpuVariant::Fpu387 => Some(&FPU_387_MAP),
            FpuVariant::Fpu686 => Some(&FPU_686_MAP),
        }
    }
}

struct FpuMapBuilder {
    map: Vec<OpEntry>,
}

impl FpuMapBuilder {
    fn new() -> Self {
        Self {
            map: vec![OpEntry::INVALID; FPU_MAP_LEN],
        }
    }

    #[inline]
    fn index(esc: u8, modrm: u8) -> usize {
        (((esc - 0xD8) as usize) << 8) | modrm as usize
    }

    /// A memory form: every ModRM with mod != 3 and the given reg field.
    fn mem(&mut self, esc: u8, reg: u8, mnemonic: &'static str, handler: OpHandler) {
        for modrm in 0..0xC0u8 {
            if (modrm >> 3) & 0x07 == reg {
                self.map[Self::index(esc, modrm)] = OpEntry { mnemonic, handler };
            }
        }
    }

    /// A register form over a range of ModRM bytes (C0-FF).
    fn reg(&mut self, esc: u8, modrms: std::ops::RangeInclusive<u8>, mnemonic: &'static str, handler: OpHandler) {
        for modrm in modrms {
            self.map[Self::index(esc, modrm)] = OpEntry { mnemonic, handler };
        }
    }

    fn build(self) -> Box<[OpEntry]> {
        self.map.into_boxed_slice()
    }
}

const ARITH_MNEMONICS: [&str; 8] = ["FADD", "FMUL", "FCOM", "FCOMP", "FSUB", "FSUBR", "FDIV", "FDIVR"];
/// DC and DE register forms swap the reversed subtract and divide encodings.
const ARITH_ST_MNEMONICS: [&str; 8] = ["FADD", "FMUL", "FCOM", "FCOMP", "FSUBR", "FSUB", "FDIVR", "FDIV"];
const ARITH_POP_MNEMONICS: [&str; 8] = ["FADDP", "FMULP", "FCOMP", "FCOMPP", "FSUBRP", "FSUBP", "FDIVRP", "FDIVP"];
const FCMOV_MNEMONICS: [&str; 8] = ["FCMOVB", "FCMOVE", "FCMOVBE", "FCMOVU", "FCMOVNB", "FCMOVNE", "FCMOVNBE", "FCMOVNU"];

fn build_fpu_map(variant: FpuVariant) -> Box<[OpEntry]> {
    let mut b = FpuMapBuilder::new();

    for (reg, mnemonic) in ARITH_MNEMONICS.iter().enumerate() {
        let base = 0xC0 + ((reg as u8) << 3);
        b.mem(0xD8, reg as u8, *mnemonic, CpuContext::op_farith_m32);
        b.mem(0xDC, reg as u8, *mnemonic, CpuContext::op_farith_m64);
        b.reg(0xD8, base..=base + 7, *mnemonic, CpuContext::op_farith_st0);
        b.reg(0xDC, base..=base + 7, ARITH_ST_MNEMONICS[reg], CpuContext::op_farith_sti);
        b.reg(0xDE, base..=base + 7, ARITH_POP_MNEMONICS[reg], CpuContext::op_farith_sti);
    }

    // D9
    b.mem(0xD9, 0, "FLD", CpuContext::op_fld_m);
    b.mem(0xD9, 2, "FST", CpuContext::op_fst_m);
    b.mem(0xD9, 3, "FSTP", CpuContext::op_fst_m);
    b.mem(0xD9, 5, "FLDCW", CpuContext::op_fldcw);
    b.mem(0xD9, 7, "FNSTCW", CpuContext::op_fnstcw);
    b.reg(0xD9, 0xC0..=0xC7, "FLD", CpuContext::op_fld_sti);
    b.reg(0xD9, 0xC8..=0xCF, "FXCH", CpuContext::op_fxch);
    b.reg(0xD9, 0xD0..=0xD0, "FNOP", CpuContext::op_fpu_misc);
    b.reg(0xD9, 0xE0..=0xE0, "FCHS", CpuContext::op_fpu_misc);
    b.reg(0xD9, 0xE1..=0xE1, "FABS", CpuContext::op_fpu_misc);
    b.reg(0xD9, 0xE8..=0xE8, "FLD1", CpuContext::op_fld_const);
    b.reg(0xD9, 0xEB..=0xEB, "FLDPI", CpuContext::op_fld_const);
    b.reg(0xD9, 0xEE..=0xEE, "FLDZ", CpuContext::op_fld_const);
    b.reg(0xD9, 0xFA..=0xFA, "FSQRT", CpuContext::op_fpu_misc);

    // DB
    b.mem(0xDB, 0, "FILD", CpuContext::op_fild_m);
    b.mem(0xDB, 2, "FIST", CpuContext::op_fist_m);
    b.mem(0xDB, 3, "FISTP", CpuContext::op_fist_m);
    b.reg(0xDB, 0xE2..=0xE2, "FNCLEX", CpuContext::op_fpu_control);
    b.reg(0xDB, 0xE3..=0xE3, "FNINIT", CpuContext::op_fpu_control);

    // DD
    b.mem(0xDD, 0, "FLD", CpuContext::op_fld_m);
    b.mem(0xDD, 2, "FST", CpuContext::op_fst_m);
    b.mem(0xDD, 3, "FSTP", CpuContext::op_fst_m);
    b.mem(0xDD, 7, "FNSTSW", CpuContext::op_fnstsw);
    b.reg(0xDD, 0xD0..=0xD7, "FST", CpuContext::op_fst_sti);
    b.reg(0xDD, 0xD8..=0xDF, "FSTP", CpuContext::op_fst_sti);

    // DF
    b.mem(0xDF, 0, "FILD", CpuContext::op_fild_m);
    b.mem(0xDF, 2, "FIST", CpuContext::op_fist_m);
    b.mem(0xDF, 3, "FISTP", CpuContext::op_fist_m);
    b.reg(0xDF, 0xE0..=0xE0, "FNSTSW", CpuContext::op_fnstsw);

    match variant {
        FpuVariant::Fpu287 => {
            // FSETPM is a no-op outside the 287.
            b.reg(0xDB, 0xE4..=0xE4, "FSETPM", CpuContext::op_fpu_misc);
        }
        FpuVariant::Fpu686 => {
            for (i, mnemonic) in FCMOV_MNEMONICS.iter().enumerate() {
                let esc = if i < 4 { 0xDA } else { 0xDB };
                let base = 0xC0 + (((i & 3) as u8) << 3);
                b.reg(esc, base..=base + 7, *mnemonic, CpuContext::op_fcmov);
            }
            b.reg(0xDB, 0xE8..=0xEF, "FUCOMI", CpuContext::op_fcomi);
            b.reg(0xDB, 0xF0..=0xF7, "FCOMI", CpuContext::op_fcomi);
            b.reg(0xDF, 0xE8..=0xEF, "FUCOMIP", CpuContext::op_fcomi);
            b.reg(0xDF, 0xF0..=0xF7, "FCOMIP", CpuContext::op_fcomi);
        }
        _ => {}
    }
    b.build()
}

lazy_static! {
    static ref FPU_287_MAP: Box<[OpEntry]> = build_fpu_map(FpuVariant::Fpu287);
    static ref FPU_387_MAP: Box<[OpEntry]> = build_fpu_map(FpuVariant::Fpu387);
    static ref FPU_686_MAP: Box<[OpEntry]> = build_fpu_map(FpuVariant::Fpu686);
}

impl CpuContext {
    /// D8-DF. Decodes the ModRM and dispatches through the installed escape map. Without a
    /// coprocessor the escape consumes its operand and does nothing unless CR0.EM requests
    /// emulation.
    pub(crate) fn op_fpu_escape(&mut self) -> Result<(), CpuFault> {
        let esc = self.i.opcode;
        let modrm = self.fetch_modrm()?;

        if self.model.is286 && self.regs.cr0 & (CR0_EM | CR0_TS) != 0 {
            return Err(CpuFault::nm());
        }

        let Some(map) = self.fpu_variant.map()
        else {
            if self.model.is286 {
                // Without a coprocessor the 286 and later expect CR0.EM to trap escapes.
                log::trace!("FPU escape {:02X} {:02X} with no coprocessor", esc, modrm.byte);
            }
            return Ok(());
        };

        let entry = map[FpuMapBuilder::index(esc, modrm.byte)];
        self.i.mnemonic = entry.mnemonic;

        // Wait forms report a pending unmasked exception before executing.
        if !entry.mnemonic.starts_with("FN") && self.fpu.status.error_summary() {
            self.fpu_error_pending_fault()?;
        }
        (entry.handler)(self)
    }

    /// WAIT/FWAIT
    pub(crate) fn op_wait(&mut self) -> Result<(), CpuFault> {
        if self.model.is286 && self.regs.cr0 & (CR0_MP | CR0_TS) == (CR0_MP | CR0_TS) {
            return Err(CpuFault::nm());
        }
        if self.fpu_variant != FpuVariant::None && self.fpu.status.error_summary() {
            self.fpu_error_pending_fault()?;
        }
        cycles!(self, 3);
        Ok(())
    }

    /// Report a pending x87 error: #MF when CR0.NE is set, otherwise the external error
    /// latch (IRQ13) is raised and execution continues.
    fn fpu_error_pending_fault(&mut self) -> Result<(), CpuFault> {
        if self.model.is486 && self.regs.cr0 & CR0_NE != 0 {
            return Err(CpuFault::new(CpuException::FloatingPointError, None, FaultDetail::None));
        }
        self.set_fpu_error_latch(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select() {
        assert_eq!(FpuVariant::select(CpuType::Intel286, false), FpuVariant::None);
        assert_eq!(FpuVariant::select(CpuType::Intel286, true), FpuVariant::Fpu287);
        assert_eq!(FpuVariant::select(CpuType::Intel486DX, true), FpuVariant::Fpu387);
        assert_eq!(FpuVariant::select(CpuType::PentiumPro, true), FpuVariant::Fpu686);
        assert!(FpuVariant::None.map().is_none());
    }

    #[test]
    fn test_maps() {
        let m387 = FpuVariant::Fpu387.map().unwrap();
        let m686 = FpuVariant::Fpu686.map().unwrap();
        let m287 = FpuVariant::Fpu287.map().unwrap();
        let at = |map: &[OpEntry], esc: u8, modrm: u8| map[FpuMapBuilder::index(esc, modrm)].mnemonic;

        // D8 /6 with a memory operand, and the register form.
        assert_eq!(at(m387, 0xD8, 0x36), "FDIV");
        assert_eq!(at(m387, 0xD8, 0xF1), "FDIV");
        assert_eq!(at(m387, 0xDC, 0xF1), "FDIVR");
        assert_eq!(at(m387, 0xDE, 0xF9), "FDIVP");
        assert_eq!(at(m387, 0xDD, 0x3E), "FNSTSW");
        assert_eq!(at(m387, 0xDF, 0xE0), "FNSTSW");
        assert_eq!(at(m387, 0xDA, 0xC8), "INVALID");
        assert_eq!(at(m686, 0xDA, 0xC8), "FCMOVE");
        assert_eq!(at(m686, 0xDB, 0xD0), "FCMOVNBE");
        assert_eq!(at(m686, 0xDB, 0xF1), "FCOMI");
        assert_eq!(at(m287, 0xDB, 0xE4), "FSETPM");
        assert_eq!(at(m387, 0xDB, 0xE4), "INVALID");
    }
}
