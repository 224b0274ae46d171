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

    cpu_x86::registers.rs

    The architectural register file: general purpose registers, segment register caches,
    control registers, the time stamp counter and the MMX/SSE register banks.

*/

use crate::cpu_common::Segment;
use bytemuck::pod_read_unaligned;

pub const REGISTER_EAX: usize = 0;
pub const REGISTER_ECX: usize = 1;
pub const REGISTER_EDX: usize = 2;
pub const REGISTER_EBX: usize = 3;
pub const REGISTER_ESP: usize = 4;
pub const REGISTER_EBP: usize = 5;
pub const REGISTER_ESI: usize = 6;
pub const REGISTER_EDI: usize = 7;

/// A segment register and its hidden descriptor cache.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentCache {
    pub selector: u16,
    pub base: u32,
    pub limit: u32,
}

impl SegmentCache {
    /// A segment loaded with real-address semantics.
    pub fn real(selector: u16) -> Self {
        Self {
            selector,
            base: (selector as u32) << 4,
            limit: 0xFFFF,
        }
    }
}

/// A SIMD register stored as little-endian bytes. MMX registers are 8 bytes wide and XMM
/// registers 16 bytes; lane accessors index by element size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimdReg<const N: usize>(pub [u8; N]);

pub type MmReg = SimdReg<8>;
pub type XmmReg = SimdReg<16>;

impl<const N: usize> Default for SimdReg<N> {
    fn default() -> Self {
        SimdReg([0; N])
    }
}

impl<const N: usize> SimdReg<N> {
    pub const BYTES: usize = N;

    #[inline]
    pub fn lane_u8(&self, idx: usize) -> u8 {
        self.0[idx]
    }

    #[inline]
    pub fn set_lane_u8(&mut self, idx: usize, value: u8) {
        self.0[idx] = value;
    }

    #[inline]
    pub fn lane_i8(&self, idx: usize) -> i8 {
        self.0[idx] as i8
    }

    #[inline]
    pub fn lane_u16(&self, idx: usize) -> u16 {
        u16::from_le(pod_read_unaligned(&self.0[idx * 2..idx * 2 + 2]))
    }

    #[inline]
    pub fn set_lane_u16(&mut self, idx: usize, value: u16) {
        self.0[idx * 2..idx * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn lane_i16(&self, idx: usize) -> i16 {
        self.lane_u16(idx) as i16
    }

    #[inline]
    pub fn set_lane_i16(&mut self, idx: usize, value: i16) {
        self.set_lane_u16(idx, value as u16);
    }

    #[inline]
    pub fn lane_u32(&self, idx: usize) -> u32 {
        u32::from_le(pod_read_unaligned(&self.0[idx * 4..idx * 4 + 4]))
    }

    #[inline]
    pub fn set_lane_u32(&mut self, idx: usize, value: u32) {
        self.0[idx * 4..idx * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn lane_i32(&self, idx: usize) -> i32 {
        self.lane_u32(idx) as i32
    }

    #[inline]
    pub fn lane_f32(&self, idx: usize) -> f32 {
        f32::from_bits(self.lane_u32(idx))
    }

    #[inline]
    pub fn set_lane_f32(&mut self, idx: usize, value: f32) {
        self.set_lane_u32(idx, value.to_bits());
    }

    #[inline]
    pub fn lane_u64(&self, idx: usize) -> u64 {
        u64::from_le(pod_read_unaligned(&self.0[idx * 8..idx * 8 + 8]))
    }

    #[inline]
    pub fn set_lane_u64(&mut self, idx: usize, value: u64) {
        self.0[idx * 8..idx * 8 + 8].copy_from_slice(&value.to_le_bytes());
    }
}

/// The architectural register file.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    pub gpr: [u32; 8],
    pub segs: [SegmentCache; 6],
    pub eip: u32,
    pub eflags: u32,
    pub cr0: u32,
    pub cr2: u32,
    pub cr3: u32,
    pub cr4: u32,
    pub tsc: u64,
    pub mm: [MmReg; 8],
    pub xmm: [XmmReg; 8],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            gpr: [0; 8],
            segs: [SegmentCache::real(0); 6],
            eip: 0,
            eflags: 0x0002,
            cr0: 0,
            cr2: 0,
            cr3: 0,
            cr4: 0,
            tsc: 0,
            mm: [MmReg::default(); 8],
            xmm: [XmmReg::default(); 8],
        }
    }
}

impl RegisterFile {
    /// Read an 8-bit register by ModRM encoding (AL, CL, DL, BL, AH, CH, DH, BH).
    #[inline]
    pub fn reg8(&self, idx: u8) -> u8 {
        let idx = (idx & 0x07) as usize;
        if idx < 4 {
            self.gpr[idx] as u8
        }
        else {
            (self.gpr[idx - 4] >> 8) as u8
        }
    }

    #[inline]
    pub fn set_reg8(&mut self, idx: u8, value: u8) {
        let idx = (idx & 0x07) as usize;
        if idx < 4 {
            self.gpr[idx] = (self.gpr[idx] & 0xFFFF_FF00) | value as u32;
        }
        else {
            self.gpr[idx - 4] = (self.gpr[idx - 4] & 0xFFFF_00FF) | ((value as u32) << 8);
        }
    }

    #[inline]
    pub fn reg16(&self, idx: u8) -> u16 {
        self.gpr[(idx & 0x07) as usize] as u16
    }

    #[inline]
    pub fn set_reg16(&mut self, idx: u8, value: u16) {
        let r = &mut self.gpr[(idx & 0x07) as usize];
        *r = (*r & 0xFFFF_0000) | value as u32;
    }

    #[inline]
    pub fn reg32(&self, idx: u8) -> u32 {
        self.gpr[(idx & 0x07) as usize]
    }

    #[inline]
    pub fn set_reg32(&mut self, idx: u8, value: u32) {
        self.gpr[(idx & 0x07) as usize] = value;
    }

    #[inline]
    pub fn seg(&self, segment: Segment) -> &SegmentCache {
        &self.segs[segment.index()]
    }

    /// Load a segment register with real-address semantics.
    pub fn load_segment(&mut self, segment: Segment, selector: u16) {
        self.segs[segment.index()] = SegmentCache::real(selector);
    }

    #[inline]
    pub fn ip(&self) -> u16 {
        self.eip as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg8_aliasing() {
        let mut regs = RegisterFile::default();
        regs.gpr[REGISTER_EAX] = 0x1234_5678;
        assert_eq!(regs.reg8(0), 0x78);
        assert_eq!(regs.reg8(4), 0x56);

        regs.set_reg8(4, 0xAB);
        assert_eq!(regs.gpr[REGISTER_EAX], 0x1234_AB78);
        regs.set_reg16(REGISTER_EAX as u8, 0xBEEF);
        assert_eq!(regs.gpr[REGISTER_EAX], 0x1234_BEEF);
    }

    #[test]
    fn test_simd_lanes() {
        let mut mm = MmReg::default();
        mm.set_lane_u16(1, 0xA1B2);
        assert_eq!(mm.0, [0, 0, 0xB2, 0xA1, 0, 0, 0, 0]);
        assert_eq!(mm.lane_u8(3), 0xA1);
        assert_eq!(mm.lane_i16(1), 0xA1B2u16 as i16);

        let mut xmm = XmmReg::default();
        xmm.set_lane_f32(3, 1.5);
        assert_eq!(xmm.lane_f32(3), 1.5);
        assert_eq!(xmm.lane_u32(3), 0x3FC0_0000);
        xmm.set_lane_u64(0, 0x0102_0304_0506_0708);
        assert_eq!(xmm.lane_u8(0), 0x08);
        assert_eq!(xmm.lane_u32(1), 0x0102_0304);
    }

    #[test]
    fn test_segment_real() {
        let mut regs = RegisterFile::default();
        regs.load_segment(Segment::DS, 0xB800);
        assert_eq!(regs.seg(Segment::DS).base, 0xB8000);
        assert_eq!(regs.seg(Segment::DS).limit, 0xFFFF);
    }
}
