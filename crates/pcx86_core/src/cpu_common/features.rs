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

    cpu_common::features.rs

    CPUID feature bits, the installed-feature bitset and control register bit definitions.

*/

// CPUID leaf 1 EDX bits
pub const CPUID_FPU: u32 = 1 << 0;
pub const CPUID_VME: u32 = 1 << 1;
pub const CPUID_PSE: u32 = 1 << 3;
pub const CPUID_TSC: u32 = 1 << 4;
pub const CPUID_MSR: u32 = 1 << 5;
pub const CPUID_CMPXCHG8B: u32 = 1 << 8;
pub const CPUID_AMDSEP: u32 = 1 << 10;
pub const CPUID_SEP: u32 = 1 << 11;
pub const CPUID_CMOV: u32 = 1 << 15;
pub const CPUID_MMX: u32 = 1 << 23;
pub const CPUID_FXSR: u32 = 1 << 24;

// CR0 bits
pub const CR0_PE: u32 = 1 << 0;
pub const CR0_MP: u32 = 1 << 1;
pub const CR0_EM: u32 = 1 << 2;
pub const CR0_TS: u32 = 1 << 3;
pub const CR0_ET: u32 = 1 << 4;
pub const CR0_NE: u32 = 1 << 5;
pub const CR0_WP: u32 = 1 << 16;
pub const CR0_CD: u32 = 1 << 30;
pub const CR0_PG: u32 = 1 << 31;

// CR4 bits
pub const CR4_VME: u32 = 1 << 0;
pub const CR4_PVI: u32 = 1 << 1;
pub const CR4_TSD: u32 = 1 << 2;
pub const CR4_DE: u32 = 1 << 3;
pub const CR4_PSE: u32 = 1 << 4;
pub const CR4_MCE: u32 = 1 << 6;
pub const CR4_PCE: u32 = 1 << 8;
pub const CR4_OSFXSR: u32 = 1 << 9;

/// The set of optional features installed for the active model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuFeatures(u32);

impl CpuFeatures {
    pub const RDTSC: u32 = 1 << 0;
    pub const MSR: u32 = 1 << 1;
    pub const MMX: u32 = 1 << 2;
    pub const CR4: u32 = 1 << 3;
    pub const VME: u32 = 1 << 4;

    pub const fn empty() -> Self {
        CpuFeatures(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        CpuFeatures(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn has(&self, feature: u32) -> bool {
        self.0 & feature != 0
    }

    #[inline]
    pub fn set(&mut self, feature: u32, state: bool) {
        if state {
            self.0 |= feature;
        }
        else {
            self.0 &= !feature;
        }
    }
}

/// Pack a 12-byte vendor string into the (EBX, EDX, ECX) order returned by CPUID leaf 0.
pub fn vendor_registers(vendor: &[u8; 12]) -> (u32, u32, u32) {
    let ebx = u32::from_le_bytes([vendor[0], vendor[1], vendor[2], vendor[3]]);
    let edx = u32::from_le_bytes([vendor[4], vendor[5], vendor[6], vendor[7]]);
    let ecx = u32::from_le_bytes([vendor[8], vendor[9], vendor[10], vendor[11]]);
    (ebx, edx, ecx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_registers() {
        let (ebx, edx, ecx) = vendor_registers(b"GenuineIntel");
        assert_eq!(ebx, 0x756e6547);
        assert_eq!(edx, 0x49656e69);
        assert_eq!(ecx, 0x6c65746e);

        let (ebx, edx, ecx) = vendor_registers(b"CyrixInstead");
        assert_eq!(ebx, 0x69727943);
        assert_eq!(edx, 0x736e4978);
        assert_eq!(ecx, 0x64616574);
    }

    #[test]
    fn test_feature_set() {
        let mut f = CpuFeatures::empty();
        f.set(CpuFeatures::MMX, true);
        f.set(CpuFeatures::RDTSC, true);
        assert!(f.has(CpuFeatures::MMX));
        f.set(CpuFeatures::MMX, false);
        assert!(!f.has(CpuFeatures::MMX));
        assert!(f.has(CpuFeatures::RDTSC));
    }
}
