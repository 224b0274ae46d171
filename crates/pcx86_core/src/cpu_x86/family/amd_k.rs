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

    cpu_x86::family::amd_k.rs

    AMD K5, 5k86 and K6 CPUID and model specific registers.

*/

use crate::{
    cpu_common::{
        features::{CPUID_AMDSEP, CPUID_CMPXCHG8B, CPUID_FPU, CPUID_MSR, CPUID_PSE, CPUID_TSC, CPUID_VME},
        CpuFault,
        CpuType,
    },
    cpu_x86::{
        family::{invalid_msr, CpuidResult, ModelSpecific, VENDOR_AMD},
        model_state::ModelState,
    },
};

const K5_FEATURES: u32 = CPUID_FPU | CPUID_TSC | CPUID_MSR | CPUID_CMPXCHG8B;
const K6_FEATURES: u32 = K5_FEATURES | CPUID_VME | CPUID_PSE;

pub const MSR_STAR: u32 = 0xC000_0081;
pub const MSR_SFMASK: u32 = 0xC000_0084;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AmdKFamily;

impl AmdKFamily {
    /// Extended leaves of the 5k86: "AMD-K5(tm) Processor" and the L1 cache descriptors.
    fn cpuid_5k86_ext(state: &ModelState, leaf: u32) -> CpuidResult {
        match leaf {
            0x8000_0000 => CpuidResult::new(0x8000_0005, 0, 0, 0),
            0x8000_0001 => CpuidResult::signature(state.cpuid, K5_FEATURES),
            0x8000_0002 => CpuidResult::new(0x2D444D41, 0x7428354B, 0x5020296D, 0x65636F72),
            0x8000_0003 => CpuidResult::new(0x726F7373, 0, 0, 0),
            0x8000_0005 => CpuidResult::new(0, 0x04800000, 0x08040120, 0x10040120),
            _ => CpuidResult::default(),
        }
    }

    /// Extended leaves of the K6: "AMD-K6tm w/ multimedia extensions", the L1 descriptors
    /// and the NexGen signature leaf.
    fn cpuid_k6_ext(state: &ModelState, leaf: u32) -> CpuidResult {
        match leaf {
            0x8000_0000 => CpuidResult::new(0x8000_0005, 0, 0, 0),
            0x8000_0001 => CpuidResult::signature(state.cpuid + 0x100, K6_FEATURES | CPUID_AMDSEP),
            0x8000_0002 => CpuidResult::new(0x2D444D41, 0x6D74364B, 0x202F7720, 0x746C756D),
            0x8000_0003 => CpuidResult::new(0x64656D69, 0x65206169, 0x6E657478, 0x6E6F6973),
            0x8000_0004 => CpuidResult::new(0x73, 0, 0, 0),
            0x8000_0005 => CpuidResult::new(0, 0x02800140, 0x20020220, 0x20020220),
            // "NexGenerationAMD"
            0x8FFF_FFFF => CpuidResult::new(0x4778654E, 0x72656E65, 0x6F697461, 0x444D416E),
            _ => CpuidResult::default(),
        }
    }
}

impl ModelSpecific for AmdKFamily {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult {
        let features = match state.cpu_type {
            CpuType::AmdK6 => K6_FEATURES,
            _ => K5_FEATURES,
        };
        match leaf {
            0 => CpuidResult::vendor(1, VENDOR_AMD),
            1 => CpuidResult::signature(state.cpuid, features),
            _ => match state.cpu_type {
                CpuType::Amd5k86 => Self::cpuid_5k86_ext(state, leaf),
                CpuType::AmdK6 => Self::cpuid_k6_ext(state, leaf),
                _ => CpuidResult::default(),
            },
        }
    }

    fn rdmsr(&self, state: &ModelState, tsc: u64, index: u32) -> Result<u64, CpuFault> {
        match index {
            0x0E => Ok(state.msr.tr12 as u64),
            0x10 => Ok(tsc),
            0x83 => Ok(state.msr.ecx83),
            MSR_STAR => Ok(state.msr.star),
            MSR_SFMASK => Ok(state.msr.sfmask),
            _ => Err(invalid_msr(index)),
        }
    }

    fn wrmsr(&self, state: &mut ModelState, tsc: &mut u64, index: u32, value: u64) -> Result<(), CpuFault> {
        match index {
            0x0E => state.msr.tr12 = value as u32 & 0x228,
            0x10 => *tsc = value,
            0x83 => state.msr.ecx83 = value,
            MSR_STAR => state.msr.star = value,
            MSR_SFMASK => state.msr.sfmask = value,
            _ => return Err(invalid_msr(index)),
        }
        Ok(())
    }
}
