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

    cpu_x86::family::pentium.rs

    Intel Pentium and Pentium MMX CPUID and model specific registers.

*/

use crate::{
    cpu_common::{
        features::{CPUID_CMPXCHG8B, CPUID_FPU, CPUID_MMX, CPUID_MSR, CPUID_PSE, CPUID_TSC, CPUID_VME},
        CpuFault,
        CpuType,
    },
    cpu_x86::{
        family::{invalid_msr, CpuidResult, ModelSpecific, VENDOR_INTEL},
        model_state::ModelState,
    },
};

const PENTIUM_FEATURES: u32 = CPUID_FPU | CPUID_VME | CPUID_PSE | CPUID_TSC | CPUID_MSR | CPUID_CMPXCHG8B;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PentiumFamily;

impl ModelSpecific for PentiumFamily {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult {
        match leaf {
            0 => CpuidResult::vendor(1, VENDOR_INTEL),
            1 => {
                let mut edx = PENTIUM_FEATURES;
                if state.cpu_type == CpuType::PentiumMmx {
                    edx |= CPUID_MMX;
                }
                CpuidResult::signature(state.cpuid, edx)
            }
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
        let state = state_for("Pentium 133").unwrap();
        let r = PentiumFamily.cpuid(&state, 0);
        assert_eq!(r, CpuidResult::new(1, 0x756e6547, 0x6c65746e, 0x49656e69));
        assert_eq!(PentiumFamily.cpuid(&state, 1), CpuidResult::new(0x52c, 0, 0, 0x0000_013B));

        let state = state_for("Pentium MMX 233").unwrap();
        assert_eq!(PentiumFamily.cpuid(&state, 1), CpuidResult::new(0x543, 0, 0, 0x0080_013B));
        assert_eq!(PentiumFamily.cpuid(&state, 2), CpuidResult::default());
    }
}
