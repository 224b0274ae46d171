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

    cpu_x86::family::cyrix.rs

    Cyrix 6x86, 6x86L, MediaGX and 6x86MX CPUID and model specific registers. The
    configuration control registers are reached through ports 22h/23h, not MSRs; see ports.rs.

*/

use crate::{
    cpu_common::{
        features::{CPUID_CMOV, CPUID_CMPXCHG8B, CPUID_FPU, CPUID_MMX, CPUID_MSR, CPUID_TSC},
        CpuFault,
        CpuType,
    },
    cpu_x86::{
        family::{invalid_msr, CpuidResult, ModelSpecific, VENDOR_CYRIX},
        model_state::ModelState,
    },
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CyrixFamily;

impl CyrixFamily {
    fn features(cpu_type: CpuType) -> u32 {
        match cpu_type {
            CpuType::Cx6x86L => CPUID_FPU | CPUID_CMPXCHG8B,
            CpuType::CxGX1 => CPUID_FPU | CPUID_TSC | CPUID_MSR | CPUID_CMPXCHG8B,
            CpuType::Cx6x86MX => CPUID_FPU | CPUID_TSC | CPUID_MSR | CPUID_CMPXCHG8B | CPUID_CMOV | CPUID_MMX,
            _ => CPUID_FPU,
        }
    }
}

impl ModelSpecific for CyrixFamily {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult {
        match leaf {
            0 => CpuidResult::vendor(1, VENDOR_CYRIX),
            1 => CpuidResult::signature(state.cpuid, Self::features(state.cpu_type)),
            _ => CpuidResult::default(),
        }
    }

    fn rdmsr(&self, _state: &ModelState, tsc: u64, index: u32) -> Result<u64, CpuFault> {
        match index {
            0x10 => Ok(tsc),
            _ => Err(invalid_msr(index)),
        }
    }

    fn wrmsr(&self, _state: &mut ModelState, tsc: &mut u64, index: u32, value: u64) -> Result<(), CpuFault> {
        match index {
            0x10 => {
                *tsc = value;
                Ok(())
            }
            _ => Err(invalid_msr(index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_x86::family::tests::state_for;

    #[test]
    fn test_cpuid() {
        let state = state_for("Cx6x86MX/PR233").unwrap();
        let r = CyrixFamily.cpuid(&state, 0);
        assert_eq!(r, CpuidResult::new(1, 0x69727943, 0x64616574, 0x736e4978));
        assert_eq!(CyrixFamily.cpuid(&state, 1), CpuidResult::new(0x600, 0, 0, 0x0080_8131));

        let state = state_for("Cx6x86/PR200+").unwrap();
        assert_eq!(CyrixFamily.cpuid(&state, 1).edx, CPUID_FPU);
        let state = state_for("Cx6x86L/PR166+").unwrap();
        assert_eq!(CyrixFamily.cpuid(&state, 1).edx, CPUID_FPU | CPUID_CMPXCHG8B);
    }
}
