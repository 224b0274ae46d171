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

    cpu_x86::family::p6.rs

    Pentium Pro and Pentium II OverDrive CPUID and the P6 model specific register bank:
    memory type range registers, PAT, APIC base, performance counters and SYSENTER.

*/

use crate::{
    cpu_common::{
        features::{
            CPUID_CMOV,
            CPUID_CMPXCHG8B,
            CPUID_FPU,
            CPUID_FXSR,
            CPUID_MMX,
            CPUID_MSR,
            CPUID_PSE,
            CPUID_SEP,
            CPUID_TSC,
            CPUID_VME,
        },
        CpuFault,
        CpuType,
    },
    cpu_x86::{
        family::{invalid_msr, CpuidResult, ModelSpecific, VENDOR_INTEL},
        model_state::{ModelState, P6_EBL_CR_POWERON},
    },
};

const P6_FEATURES: u32 =
    CPUID_FPU | CPUID_VME | CPUID_PSE | CPUID_TSC | CPUID_MSR | CPUID_CMPXCHG8B | CPUID_SEP | CPUID_CMOV;

// Leaf 2 cache and TLB descriptors.
const PPRO_DESCRIPTORS: CpuidResult = CpuidResult::new(0x03020101, 0, 0, 0x06040A42);
const P2D_DESCRIPTORS: CpuidResult = CpuidResult::new(0x03020101, 0, 0, 0x0C040844);

pub const MSR_SYSENTER_CS: u32 = 0x174;
pub const MSR_SYSENTER_ESP: u32 = 0x175;
pub const MSR_SYSENTER_EIP: u32 = 0x176;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct P6Family;

impl P6Family {
    /// Index 0x17 only exists on the Pentium II OverDrive, and the SYSENTER registers are
    /// absent on the Pentium Pro.
    fn implemented(cpu_type: CpuType, index: u32) -> bool {
        match index {
            0x17 => cpu_type == CpuType::Pentium2OverDrive,
            MSR_SYSENTER_CS..=MSR_SYSENTER_EIP => cpu_type != CpuType::PentiumPro,
            _ => true,
        }
    }
}

impl ModelSpecific for P6Family {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult {
        let p2 = state.cpu_type == CpuType::Pentium2OverDrive;
        match leaf {
            0 => CpuidResult::vendor(2, VENDOR_INTEL),
            1 => {
                let mut edx = P6_FEATURES;
                if p2 {
                    edx |= CPUID_MMX | CPUID_FXSR;
                }
                CpuidResult::signature(state.cpuid, edx)
            }
            2 if p2 => P2D_DESCRIPTORS,
            2 => PPRO_DESCRIPTORS,
            _ => CpuidResult::default(),
        }
    }

    fn rdmsr(&self, state: &ModelState, tsc: u64, index: u32) -> Result<u64, CpuFault> {
        if !Self::implemented(state.cpu_type, index) {
            return Err(invalid_msr(index));
        }
        let msr = &state.msr;
        let value = match index {
            0x10 => tsc,
            0x17 => msr.ecx17,
            0x1B => msr.apic_base,
            0x2A => P6_EBL_CR_POWERON as u64,
            0x79 => msr.ecx79,
            0x88..=0x8B => msr.ecx8x[(index - 0x88) as usize],
            0xC1..=0xC8 => msr.pmc[(index - 0xC1) as usize],
            0xFE => msr.mtrr_cap,
            0x116 => msr.ecx116,
            0x118..=0x11B => msr.ecx11x[(index - 0x118) as usize],
            0x11E => msr.ecx11e,
            MSR_SYSENTER_CS => msr.sysenter_cs as u64,
            MSR_SYSENTER_ESP => msr.sysenter_esp as u64,
            MSR_SYSENTER_EIP => msr.sysenter_eip as u64,
            0x186 => msr.ecx186,
            0x187 => msr.ecx187,
            0x1E0 => msr.ecx1e0,
            0x200..=0x20F => {
                let idx = ((index - 0x200) >> 1) as usize;
                if index & 1 != 0 {
                    msr.mtrr_physmask[idx]
                }
                else {
                    msr.mtrr_physbase[idx]
                }
            }
            0x250 => msr.mtrr_fix64k_8000,
            0x258 => msr.mtrr_fix16k_8000,
            0x259 => msr.mtrr_fix16k_a000,
            0x268..=0x26F => msr.mtrr_fix4k[(index - 0x268) as usize],
            0x277 => msr.pat,
            0x2FF => msr.mtrr_deftype,
            0x570 => msr.ecx570,
            _ => return Err(invalid_msr(index)),
        };
        Ok(value)
    }

    fn wrmsr(&self, state: &mut ModelState, tsc: &mut u64, index: u32, value: u64) -> Result<(), CpuFault> {
        if !Self::implemented(state.cpu_type, index) {
            return Err(invalid_msr(index));
        }
        let msr = &mut state.msr;
        match index {
            0x10 => *tsc = value,
            0x17 => msr.ecx17 = value,
            0x1B => msr.apic_base = value,
            0x79 => msr.ecx79 = value,
            0x88..=0x8B => msr.ecx8x[(index - 0x88) as usize] = value,
            0xC1..=0xC8 => msr.pmc[(index - 0xC1) as usize] = value,
            0xFE => msr.mtrr_cap = value,
            0x116 => msr.ecx116 = value,
            0x118..=0x11B => msr.ecx11x[(index - 0x118) as usize] = value,
            0x11E => msr.ecx11e = value,
            MSR_SYSENTER_CS => msr.sysenter_cs = value as u16,
            MSR_SYSENTER_ESP => msr.sysenter_esp = value as u32,
            MSR_SYSENTER_EIP => msr.sysenter_eip = value as u32,
            0x186 => msr.ecx186 = value,
            0x187 => msr.ecx187 = value,
            0x1E0 => msr.ecx1e0 = value,
            0x200..=0x20F => {
                let idx = ((index - 0x200) >> 1) as usize;
                if index & 1 != 0 {
                    msr.mtrr_physmask[idx] = value;
                }
                else {
                    msr.mtrr_physbase[idx] = value;
                }
            }
            0x250 => msr.mtrr_fix64k_8000 = value,
            0x258 => msr.mtrr_fix16k_8000 = value,
            0x259 => msr.mtrr_fix16k_a000 = value,
            0x268..=0x26F => msr.mtrr_fix4k[(index - 0x268) as usize] = value,
            0x277 => msr.pat = value,
            0x2FF => msr.mtrr_deftype = value,
            0x570 => msr.ecx570 = value,
            // 0x2A (EBL_CR_POWERON) is read only.
            _ => return Err(invalid_msr(index)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_x86::{family::tests::state_for, model_state::P6_MTRR_CAP_RESET};

    #[test]
    fn test_cpuid() {
        let state = state_for("Pentium Pro 200").unwrap();
        assert_eq!(P6Family.cpuid(&state, 0).eax, 2);
        assert_eq!(P6Family.cpuid(&state, 1), CpuidResult::new(0x617, 0, 0, 0x0000_893B));
        // 8K L1 code and data, 256K L2, and the TLB descriptors, as the Pentium Pro reports them.
        assert_eq!(P6Family.cpuid(&state, 2), CpuidResult::new(0x03020101, 0, 0, 0x06040A42));
        assert_eq!(P6Family.cpuid(&state, 3), CpuidResult::default());

        let state = state_for("Pentium II OverDrive 333").unwrap();
        assert_eq!(P6Family.cpuid(&state, 1), CpuidResult::new(0x1632, 0, 0, 0x0180_893B));
        assert_eq!(P6Family.cpuid(&state, 2).edx, 0x0C040844);
    }

    #[test]
    fn test_mtrr_bank() {
        let mut state = state_for("Pentium Pro 180").unwrap();
        state.msr.mtrr_cap = P6_MTRR_CAP_RESET;
        let mut tsc = 0;
        assert_eq!(P6Family.rdmsr(&state, tsc, 0xFE).unwrap(), 0x508);
        assert_eq!(P6Family.rdmsr(&state, tsc, 0x2A).unwrap(), 0xC580_0000);
        assert!(P6Family.wrmsr(&mut state, &mut tsc, 0x2A, 0).is_err());

        P6Family.wrmsr(&mut state, &mut tsc, 0x204, 0x0800_0006).unwrap();
        P6Family.wrmsr(&mut state, &mut tsc, 0x205, 0xF_F800_0800).unwrap();
        assert_eq!(state.msr.mtrr_physbase[2], 0x0800_0006);
        assert_eq!(P6Family.rdmsr(&state, tsc, 0x205).unwrap(), 0xF_F800_0800);

        P6Family.wrmsr(&mut state, &mut tsc, 0x26F, 0x0606_0606_0606_0606).unwrap();
        assert_eq!(P6Family.rdmsr(&state, tsc, 0x26F).unwrap(), 0x0606_0606_0606_0606);
    }

    #[test]
    fn test_model_gated_msrs() {
        let mut ppro = state_for("Pentium Pro 200").unwrap();
        let mut tsc = 0;
        assert!(P6Family.rdmsr(&ppro, tsc, 0x17).is_err());
        assert!(P6Family.wrmsr(&mut ppro, &mut tsc, MSR_SYSENTER_CS, 8).is_err());

        let mut p2 = state_for("Pentium II OverDrive 266").unwrap();
        P6Family.wrmsr(&mut p2, &mut tsc, MSR_SYSENTER_CS, 0x1234_0008).unwrap();
        assert_eq!(P6Family.rdmsr(&p2, tsc, MSR_SYSENTER_CS).unwrap(), 0x0008);
        P6Family.wrmsr(&mut p2, &mut tsc, MSR_SYSENTER_EIP, 0xFFFF_FFFF_8000_0000).unwrap();
        assert_eq!(P6Family.rdmsr(&p2, tsc, MSR_SYSENTER_EIP).unwrap(), 0x8000_0000);
        P6Family.wrmsr(&mut p2, &mut tsc, 0x17, 0x0012_0000_0000_0000).unwrap();
        assert_eq!(P6Family.rdmsr(&p2, tsc, 0x17).unwrap(), 0x0012_0000_0000_0000);
    }
}
