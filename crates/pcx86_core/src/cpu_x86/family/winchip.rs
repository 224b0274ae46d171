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

    cpu_x86::family::winchip.rs

    IDT WinChip CPUID and model specific registers.

    The feature control register (FCR, MSR 0x107) switches MMX and CPUID on and off at runtime,
    and FCR2/FCR3 can replace the vendor string reported by CPUID leaf 0.

*/

use crate::{
    cpu_common::{
        features::{CpuFeatures, CPUID_CMPXCHG8B, CPUID_FPU, CPUID_MMX, CPUID_MSR, CPUID_TSC},
        CpuFault,
    },
    cpu_x86::{
        family::{invalid_msr, CpuidResult, ModelSpecific, VENDOR_CENTAUR},
        model_state::{ModelState, FCR2_VENDOR_OVERRIDE, FCR_CPUID_DISABLE, FCR_CX8_ENABLE, FCR_MMX_ENABLE},
    },
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WinChipFamily;

impl ModelSpecific for WinChipFamily {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult {
        let msr = &state.msr;
        match leaf {
            0 => {
                if msr.fcr2 & FCR2_VENDOR_OVERRIDE != 0 {
                    CpuidResult::new(1, (msr.fcr3 >> 32) as u32, msr.fcr3 as u32, (msr.fcr2 >> 32) as u32)
                }
                else {
                    CpuidResult::vendor(1, VENDOR_CENTAUR)
                }
            }
            1 => {
                let mut edx = CPUID_FPU | CPUID_TSC | CPUID_MSR;
                if msr.fcr & FCR_CX8_ENABLE != 0 {
                    edx |= CPUID_CMPXCHG8B;
                }
                if msr.fcr & FCR_MMX_ENABLE != 0 {
                    edx |= CPUID_MMX;
                }
                CpuidResult::signature(state.cpuid, edx)
            }
            _ => CpuidResult::default(),
        }
    }

    fn rdmsr(&self, state: &ModelState, tsc: u64, index: u32) -> Result<u64, CpuFault> {
        let msr = &state.msr;
        match index {
            0x02 => Ok(msr.tr1 as u64),
            0x0E => Ok(msr.tr12 as u64),
            0x10 => Ok(tsc),
            0x11 => Ok(msr.cesr as u64),
            0x107 => Ok(msr.fcr as u64),
            0x108 => Ok(msr.fcr2),
            0x10A => Ok(state.multi as u64 & 3),
            _ => Err(invalid_msr(index)),
        }
    }

    fn wrmsr(&self, state: &mut ModelState, tsc: &mut u64, index: u32, value: u64) -> Result<(), CpuFault> {
        let lo = value as u32;
        match index {
            0x02 => state.msr.tr1 = lo & 0x02,
            0x0E => state.msr.tr12 = lo & 0x228,
            0x10 => *tsc = value,
            0x11 => state.msr.cesr = lo & 0x00FF_00FF,
            0x107 => {
                state.msr.fcr = lo;
                state.features.set(CpuFeatures::MMX, lo & FCR_MMX_ENABLE != 0);
                state.cpuid = if lo & FCR_CPUID_DISABLE != 0 {
                    0
                }
                else {
                    state.descriptor.cpuid_model
                };
            }
            0x108 => state.msr.fcr2 = value,
            0x109 => state.msr.fcr3 = value,
            _ => return Err(invalid_msr(index)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_x86::{family::tests::state_for, model_state::WINCHIP_FCR_RESET};

    fn winchip() -> ModelState {
        let mut state = state_for("WinChip 200").unwrap();
        state.msr.fcr = WINCHIP_FCR_RESET;
        state.features = CpuFeatures::from_bits(CpuFeatures::MMX);
        state
    }

    #[test]
    fn test_cpuid() {
        let state = winchip();
        let r = WinChipFamily.cpuid(&state, 0);
        // "CentaurHauls"
        assert_eq!(r, CpuidResult::new(1, 0x746e6543, 0x736c7561, 0x48727561));
        let r = WinChipFamily.cpuid(&state, 1);
        assert_eq!(r.eax, 0x540);
        assert_eq!(r.edx, CPUID_FPU | CPUID_TSC | CPUID_MSR | CPUID_MMX);
    }

    #[test]
    fn test_write_masks() {
        let mut state = winchip();
        let mut tsc = 0;
        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x02, 0xFFFF_FFFF).unwrap();
        assert_eq!(WinChipFamily.rdmsr(&state, tsc, 0x02).unwrap(), 0x02);
        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x0E, 0xFFFF_FFFF).unwrap();
        assert_eq!(WinChipFamily.rdmsr(&state, tsc, 0x0E).unwrap(), 0x228);
        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x11, 0xFFFF_FFFF).unwrap();
        assert_eq!(WinChipFamily.rdmsr(&state, tsc, 0x11).unwrap(), 0x00FF_00FF);
        // Multiplier 3.0
        assert_eq!(WinChipFamily.rdmsr(&state, tsc, 0x10A).unwrap(), 3);
        // FCR3 is write only, the multiplier read only.
        assert!(WinChipFamily.rdmsr(&state, tsc, 0x109).is_err());
        assert!(WinChipFamily.wrmsr(&mut state, &mut tsc, 0x10A, 0).is_err());
    }

    #[test]
    fn test_fcr_toggles_features() {
        let mut state = winchip();
        let mut tsc = 0;
        let fcr = WINCHIP_FCR_RESET & !FCR_MMX_ENABLE | FCR_CPUID_DISABLE | FCR_CX8_ENABLE;
        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x107, fcr as u64).unwrap();
        assert!(!state.features.has(CpuFeatures::MMX));
        assert_eq!(state.cpuid, 0);
        assert_eq!(WinChipFamily.cpuid(&state, 1).edx & (CPUID_MMX | CPUID_CMPXCHG8B), CPUID_CMPXCHG8B);

        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x107, WINCHIP_FCR_RESET as u64).unwrap();
        assert!(state.features.has(CpuFeatures::MMX));
        assert_eq!(state.cpuid, 0x540);
    }

    #[test]
    fn test_vendor_override() {
        let mut state = winchip();
        let mut tsc = 0;
        // "GenuineIntel": EBX from FCR3 high, ECX from FCR3 low, EDX from FCR2 high.
        let fcr3 = (0x756e6547u64 << 32) | 0x6c65746e;
        let fcr2 = (0x49656e69u64 << 32) | FCR2_VENDOR_OVERRIDE;
        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x109, fcr3).unwrap();
        WinChipFamily.wrmsr(&mut state, &mut tsc, 0x108, fcr2).unwrap();
        let r = WinChipFamily.cpuid(&state, 0);
        assert_eq!(r, CpuidResult::new(1, 0x756e6547, 0x6c65746e, 0x49656e69));
    }
}
