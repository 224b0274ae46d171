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

    cpu_x86::family::mod.rs

    Per-family CPUID and model specific register strategies.

    Each processor family answers CPUID and RDMSR/WRMSR differently. The configurator installs
    the strategy for the active model; instruction handlers call through [ModelSpecific]
    without knowing which family is active.

*/

pub mod amd_k;
pub mod cyrix;
pub mod legacy;
pub mod p6;
pub mod pentium;
pub mod winchip;

use enum_dispatch::enum_dispatch;

use crate::{
    cpu_common::{features::vendor_registers, CpuFamily, CpuFault, FaultDetail},
    cpu_x86::model_state::ModelState,
};

pub use amd_k::AmdKFamily;
pub use cyrix::CyrixFamily;
pub use legacy::LegacyFamily;
pub use p6::P6Family;
pub use pentium::PentiumFamily;
pub use winchip::WinChipFamily;

pub const VENDOR_INTEL: &[u8; 12] = b"GenuineIntel";
pub const VENDOR_AMD: &[u8; 12] = b"AuthenticAMD";
pub const VENDOR_CYRIX: &[u8; 12] = b"CyrixInstead";
pub const VENDOR_CENTAUR: &[u8; 12] = b"CentaurHauls";

/// Register results of a CPUID leaf.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl CpuidResult {
    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }

    /// Leaf 0: the highest standard leaf and the vendor string.
    pub fn vendor(max_leaf: u32, vendor: &[u8; 12]) -> Self {
        let (ebx, edx, ecx) = vendor_registers(vendor);
        Self {
            eax: max_leaf,
            ebx,
            ecx,
            edx,
        }
    }

    /// Leaf 1: the processor signature and the feature flags.
    pub fn signature(cpuid: u32, edx: u32) -> Self {
        Self {
            eax: cpuid,
            ebx: 0,
            ecx: 0,
            edx,
        }
    }
}

#[enum_dispatch]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FamilyDispatch {
    LegacyFamily,
    WinChipFamily,
    AmdKFamily,
    PentiumFamily,
    CyrixFamily,
    P6Family,
}

impl Default for FamilyDispatch {
    fn default() -> Self {
        LegacyFamily.into()
    }
}

impl From<CpuFamily> for FamilyDispatch {
    fn from(family: CpuFamily) -> Self {
        match family {
            CpuFamily::Legacy => LegacyFamily.into(),
            CpuFamily::WinChip => WinChipFamily.into(),
            CpuFamily::AmdK => AmdKFamily.into(),
            CpuFamily::Pentium => PentiumFamily.into(),
            CpuFamily::Cyrix6x86 => CyrixFamily.into(),
            CpuFamily::P6 => P6Family.into(),
        }
    }
}

/// CPUID and MSR behavior for a processor family.
///
/// `tsc` is the live time stamp counter, which every family with MSRs exposes at index 0x10.
#[enum_dispatch(FamilyDispatch)]
pub trait ModelSpecific {
    fn cpuid(&self, state: &ModelState, leaf: u32) -> CpuidResult;
    fn rdmsr(&self, state: &ModelState, tsc: u64, index: u32) -> Result<u64, CpuFault>;
    fn wrmsr(&self, state: &mut ModelState, tsc: &mut u64, index: u32, value: u64) -> Result<(), CpuFault>;
}

/// #GP(0) for an MSR index the family does not implement.
pub(crate) fn invalid_msr(index: u32) -> CpuFault {
    log::warn!("Invalid MSR: {:08X}", index);
    CpuFault::gp(FaultDetail::Msr(index))
}
