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

    cpu_x86::family::legacy.rs

    486-class CPUID. Processors before the Pentium implement no model specific registers.

*/

use crate::{
    cpu_common::{
        features::{CPUID_FPU, CPUID_VME},
        CpuFault,
        CpuType,
    },
    cpu_x86::{
        family::{invalid_msr, CpuidResult, ModelSpecific, VENDOR_AMD, VENDOR_INTEL},
        model_state::ModelState,
    },
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyFamily;

impl ModelSpecific for LegacyFamily {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult {
        let (vendor, edx) = match state.cpu_type {
            CpuType::Intel486SX => (VENDOR_INTEL, 0),
            CpuType::Intel486DX => (VENDOR_INTEL, CPUID_FPU),
            CpuType::IntelDX4 => (VENDOR_INTEL, CPUID_FPU | CPUID_VME),
            CpuType::Am486SX => (VENDOR_AMD, 0),
            CpuType::Am486DX => (VENDOR_AMD, CPUID_FPU),
            // No CPUID instruction.
            _ => return CpuidResult::default(),
        };
        match leaf {
            0 => CpuidResult::vendor(1, vendor),
            1 => CpuidResult::signature(state.cpuid, edx),
            _ => CpuidResult::default(),
        }
    }

    fn rdmsr(&self, _state: &ModelState, _tsc: u64, index: u32) -> Result<u64, CpuFault> {
        Err(invalid_msr(index))
    }

    fn wrmsr(&self, _state: &mut ModelState, _tsc: &mut u64, index: u32, _value: u64) -> Result<(), CpuFault> {
        Err(invalid_msr(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_x86::family::tests::state_for;

    #[test]
    fn test_486_cpuid() {
        let state = state_for("i486DX2/66").unwrap();
        let r = LegacyFamily.cpuid(&state, 0);
        assert_eq!(r, CpuidResult::new(1, 0x756e6547, 0x6c65746e, 0x49656e69));
        let r = LegacyFamily.cpuid(&state, 1);
        assert_eq!(r, CpuidResult::new(0x435, 0, 0, CPUID_FPU));

        let state = state_for("iDX4/100").unwrap();
        assert_eq!(LegacyFamily.cpuid(&state, 1).edx, CPUID_FPU | CPUID_VME);
    }

    #[test]
    fn test_am486_cpuid() {
        let state = state_for("Am486SX2/66").unwrap();
        let r = LegacyFamily.cpuid(&state, 0);
        // "AuthenticAMD"
        assert_eq!((r.ebx, r.edx, r.ecx), (0x68747541, 0x69746e65, 0x444d4163));
        assert_eq!(LegacyFamily.cpuid(&state, 1), CpuidResult::new(0x45b, 0, 0, 0));
    }
}
