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

    cpu_x86::model_state.rs

    The mutable view of the active processor model: derived capability flags, the live
    CPUID signature, the installed feature set, the CR4 write mask and the vendor MSR bank.

*/

use crate::cpu_common::{
    features::CpuFeatures,
    models::{CpuModelDescriptor, INTEL_MODELS},
    CpuFamily,
    CpuType,
    Manufacturer,
};

/// The WinChip feature control register after reset.
pub const WINCHIP_FCR_RESET: u32 = (1 << 8) | (1 << 9) | (1 << 12) | (1 << 16) | (1 << 19) | (1 << 21);
pub const FCR_CX8_ENABLE: u32 = 1 << 1;
pub const FCR_MMX_ENABLE: u32 = 1 << 9;
pub const FCR_CPUID_DISABLE: u32 = 1 << 29;
pub const FCR2_VENDOR_OVERRIDE: u64 = 1 << 14;

pub const P6_MTRR_CAP_RESET: u64 = 0x508;
pub const P6_EBL_CR_POWERON: u32 = 0xC580_0000;

/// Model specific registers for every family. Only the registers belonging to the active
/// family are reachable through RDMSR/WRMSR.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MsrBank {
    // IDT WinChip
    pub tr1: u32,
    pub tr12: u32,
    pub cesr: u32,
    pub fcr: u32,
    pub fcr2: u64,
    pub fcr3: u64,

    // AMD K5/K6
    pub ecx83: u64,
    pub star: u64,
    pub sfmask: u64,

    // P6
    pub ecx17: u64,
    pub apic_base: u64,
    pub ecx79: u64,
    pub ecx8x: [u64; 4],
    pub pmc: [u64; 8],
    pub mtrr_cap: u64,
    pub ecx116: u64,
    pub ecx11x: [u64; 4],
    pub ecx11e: u64,
    pub sysenter_cs: u16,
    pub sysenter_esp: u32,
    pub sysenter_eip: u32,
    pub ecx186: u64,
    pub ecx187: u64,
    pub ecx1e0: u64,
    pub mtrr_physbase: [u64; 8],
    pub mtrr_physmask: [u64; 8],
    pub mtrr_fix64k_8000: u64,
    pub mtrr_fix16k_8000: u64,
    pub mtrr_fix16k_a000: u64,
    pub mtrr_fix4k: [u64; 8],
    pub pat: u64,
    pub mtrr_deftype: u64,
    pub ecx570: u64,
}

#[derive(Clone, Debug)]
pub struct ModelState {
    pub manufacturer: Manufacturer,
    pub model_idx: usize,
    pub descriptor: CpuModelDescriptor,
    pub cpu_type: CpuType,
    pub family: CpuFamily,

    pub is8086: bool,
    pub is286: bool,
    pub is386: bool,
    pub is486: bool,
    pub is_pentium: bool,
    pub israpidcad: bool,
    pub hasfpu: bool,
    pub cpu_iscyrix: bool,
    pub isibmcpu: bool,
    pub cpu_16bitbus: bool,

    /// The CPUID signature currently visible to software. Zero hides CPUID.
    pub cpuid: u32,
    pub features: CpuFeatures,
    pub cr4_mask: u32,
    pub msr: MsrBank,

    /// Cyrix configuration control registers CCR0-CCR6.
    pub ccr: [u8; 7],
    pub cyrix_index: u8,

    pub multi: f64,
    pub busspeed: u32,
    pub isa_cycles: u32,
    pub atclk_div: u32,
    pub pci_burst: u32,
    pub pci_nonburst: u32,
}

impl Default for ModelState {
    fn default() -> Self {
        let descriptor = INTEL_MODELS[0];
        Self {
            manufacturer: Manufacturer::Intel,
            model_idx: 0,
            descriptor,
            cpu_type: descriptor.cpu_type,
            family: descriptor.cpu_type.family(),
            is8086: false,
            is286: false,
            is386: false,
            is486: false,
            is_pentium: false,
            israpidcad: false,
            hasfpu: false,
            cpu_iscyrix: false,
            isibmcpu: false,
            cpu_16bitbus: false,
            cpuid: 0,
            features: CpuFeatures::empty(),
            cr4_mask: 0,
            msr: MsrBank::default(),
            ccr: [0; 7],
            cyrix_index: 0,
            multi: descriptor.multi,
            busspeed: descriptor.busspeed(),
            isa_cycles: 0,
            atclk_div: descriptor.atclk_div,
            pci_burst: 1,
            pci_nonburst: 4,
        }
    }
}

impl ModelState {
    /// Derive the capability flags from the processor type ordering.
    pub fn derive_flags(&mut self, external_fpu: bool) {
        let t = self.cpu_type;
        self.family = t.family();
        self.is8086 = t > CpuType::Intel8088;
        self.is286 = t >= CpuType::Intel286;
        self.is386 = t >= CpuType::Intel386SX;
        self.israpidcad = t == CpuType::RapidCad;
        self.is486 = t >= CpuType::Intel486SX || matches!(t, CpuType::Cx486SLC | CpuType::Cx486DLC | CpuType::RapidCad);
        self.is_pentium = t >= CpuType::WinChip;
        self.hasfpu = t >= CpuType::Intel486DX || t == CpuType::RapidCad;
        if external_fpu && t.accepts_external_fpu() {
            self.hasfpu = true;
        }
        self.cpu_iscyrix = t.is_cyrix();
        self.isibmcpu = false;
        self.cpu_16bitbus = t.has_16bit_bus();
    }

    /// Cyrix CCR3 MAPEN field gates access to CCR4-CCR6.
    #[inline]
    pub fn cyrix_mapen(&self) -> bool {
        (self.ccr[3] & 0xF0) == 0x10
    }

    #[inline]
    pub fn has_cpuid(&self) -> bool {
        self.cpuid != 0
    }

    /// The physical address mask for the processor's address bus.
    pub fn address_mask(&self) -> u32 {
        match self.cpu_type {
            CpuType::Intel8088 | CpuType::Intel8086 => 0x000F_FFFF,
            CpuType::Intel286 | CpuType::Intel386SX | CpuType::Cx486SLC => 0x00FF_FFFF,
            _ => 0xFFFF_FFFF,
        }
    }
}
