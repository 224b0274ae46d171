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

    cpu_x86::execute::mmx.rs

    MMX handlers and the packed integer lane helpers they share with the SSE unit.

    The MM bank is held apart from the x87 register stack. EMMS empties the x87 tag word.

*/

use crate::{
    cpu_common::CpuFault,
    cpu_x86::{
        addressing::ModRm,
        registers::{MmReg, SimdReg},
        CpuContext,
        OperandWidth,
    },
};

/// Apply `f` to each byte lane.
pub(crate) fn map_u8<const N: usize>(a: &SimdReg<N>, b: &SimdReg<N>, f: impl Fn(u8, u8) -> u8) -> SimdReg<N> {
    let mut r = SimdReg::<N>::default();
    for i in 0..N {
        r.set_lane_u8(i, f(a.lane_u8(i), b.lane_u8(i)));
    }
    r
}

/// Apply `f` to each word lane.
pub(crate) fn map_u16<const N: usize>(a: &SimdReg<N>, b: &SimdReg<N>, f: impl Fn(u16, u16) -> u16) -> SimdReg<N> {
    let mut r = SimdReg::<N>::default();
    for i in 0..N / 2 {
        r.set_lane_u16(i, f(a.lane_u16(i), b.lane_u16(i)));
    }
    r
}

/// Apply `f` to each dword lane.
pub(crate) fn map_u32<const N: usize>(a: &SimdReg<N>, b: &SimdReg<N>, f: impl Fn(u32, u32) -> u32) -> SimdReg<N> {
    let mut r = SimdReg::<N>::default();
    for i in 0..N / 4 {
        r.set_lane_u32(i, f(a.lane_u32(i), b.lane_u32(i)));
    }
    r
}

#[inline]
fn mask8(c: bool) -> u8 {
    if c {
        0xFF
    }
    else {
        0
    }
}

#[inline]
fn mask16(c: bool) -> u16 {
    if c {
        0xFFFF
    }
    else {
        0
    }
}

#[inline]
fn mask32(c: bool) -> u32 {
    if c {
        0xFFFF_FFFF
    }
    else {
        0
    }
}

/// The MMX packed integer operations, keyed by the second opcode byte.
pub(crate) fn mmx_packed(opcode: u8, a: &MmReg, b: &MmReg) -> MmReg {
    match opcode {
        0xFC => map_u8(a, b, |x, y| x.wrapping_add(y)),
        0xFD => map_u16(a, b, |x, y| x.wrapping_add(y)),
        0xFE => map_u32(a, b, |x, y| x.wrapping_add(y)),
        0xEC => map_u8(a, b, |x, y| (x as i8).saturating_add(y as i8) as u8),
        0xED => map_u16(a, b, |x, y| (x as i16).saturating_add(y as i16) as u16),
        0xDC => map_u8(a, b, |x, y| x.saturating_add(y)),
        0xDD => map_u16(a, b, |x, y| x.saturating_add(y)),
        0xF8 => map_u8(a, b, |x, y| x.wrapping_sub(y)),
        0xF9 => map_u16(a, b, |x, y| x.wrapping_sub(y)),
        0xFA => map_u32(a, b, |x, y| x.wrapping_sub(y)),
        0xE8 => map_u8(a, b, |x, y| (x as i8).saturating_sub(y as i8) as u8),
        0xE9 => map_u16(a, b, |x, y| (x as i16).saturating_sub(y as i16) as u16),
        0xD8 => map_u8(a, b, |x, y| x.saturating_sub(y)),
        0xD9 => map_u16(a, b, |x, y| x.saturating_sub(y)),
        0xD5 => map_u16(a, b, |x, y| (x as i16 as i32).wrapping_mul(y as i16 as i32) as u16),
        0xE5 => map_u16(a, b, |x, y| ((x as i16 as i32 * y as i16 as i32) >> 16) as u16),
        0xF5 => {
            let mut r = MmReg::default();
            for i in 0..2 {
                let lo = a.lane_i16(i * 2) as i32 * b.lane_i16(i * 2) as i32;
                let hi = a.lane_i16(i * 2 + 1) as i32 * b.lane_i16(i * 2 + 1) as i32;
                r.set_lane_u32(i, lo.wrapping_add(hi) as u32);
            }
            r
        }
        0xDB => SimdReg((a.lane_u64(0) & b.lane_u64(0)).to_le_bytes()),
        0xDF => SimdReg((!a.lane_u64(0) & b.lane_u64(0)).to_le_bytes()),
        0xEB => SimdReg((a.lane_u64(0) | b.lane_u64(0)).to_le_bytes()),
        0xEF => SimdReg((a.lane_u64(0) ^ b.lane_u64(0)).to_le_bytes()),
        0x74 => map_u8(a, b, |x, y| mask8(x == y)),
        0x75 => map_u16(a, b, |x, y| mask16(x == y)),
        0x76 => map_u32(a, b, |x, y| mask32(x == y)),
        0x64 => map_u8(a, b, |x, y| mask8((x as i8) > (y as i8))),
        0x65 => map_u16(a, b, |x, y| mask16((x as i16) > (y as i16))),
        _ => map_u32(a, b, |x, y| mask32((x as i32) > (y as i32))),
    }
}

impl CpuContext {
    /// Read the 64-bit source operand: MM[rm] or a quadword in memory.
    pub(crate) fn mmx_source(&mut self, modrm: &ModRm) -> Result<MmReg, CpuFault> {
        match modrm.ea {
            None => Ok(self.regs.mm[modrm.rm as usize]),
            Some(ea) => Ok(SimdReg(self.read_u64(ea.segment, ea.offset)?.to_le_bytes())),
        }
    }

    /// 0F 6E: MOVD mm, r/m32
    pub(crate) fn op_movd_load(&mut self) -> Result<(), CpuFault> {
        self.check_mmx()?;
        let modrm = self.fetch_modrm()?;
        let value = self.read_rm(&modrm, OperandWidth::Dword)?;
        let mut r = MmReg::default();
        r.set_lane_u32(0, value);
        self.regs.mm[modrm.reg as usize] = r;
        self.charge_rm(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// 0F 7E: MOVD r/m32, mm
    pub(crate) fn op_movd_store(&mut self) -> Result<(), CpuFault> {
        self.check_mmx()?;
        let modrm = self.fetch_modrm()?;
        let value = self.regs.mm[modrm.reg as usize].lane_u32(0);
        self.write_rm(&modrm, OperandWidth::Dword, value)?;
        self.charge_mr(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// 0F 6F: MOVQ mm, mm/m64
    pub(crate) fn op_movq_load(&mut self) -> Result<(), CpuFault> {
        self.check_mmx()?;
        let modrm = self.fetch_modrm()?;
        let value = self.mmx_source(&modrm)?;
        self.regs.mm[modrm.reg as usize] = value;
        self.charge_rm(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// 0F 7F: MOVQ mm/m64, mm
    pub(crate) fn op_movq_store(&mut self) -> Result<(), CpuFault> {
        self.check_mmx()?;
        let modrm = self.fetch_modrm()?;
        let value = self.regs.mm[modrm.reg as usize];
        match modrm.ea {
            None => self.regs.mm[modrm.rm as usize] = value,
            Some(ea) => self.write_u64(ea.segment, ea.offset, value.lane_u64(0))?,
        }
        self.charge_mr(&modrm, OperandWidth::Dword);
        Ok(())
    }

    /// 0F 77
    pub(crate) fn op_emms(&mut self) -> Result<(), CpuFault> {
        self.check_mmx()?;
        self.fpu.free_all();
        cycles!(self, 1);
        Ok(())
    }

    /// Packed add, subtract, multiply, logic and compare on the MM bank.
    pub(crate) fn op_mmx_arith(&mut self) -> Result<(), CpuFault> {
        self.check_mmx()?;
        let modrm = self.fetch_modrm()?;
        let src = self.mmx_source(&modrm)?;
        let dst = &self.regs.mm[modrm.reg as usize];
        let result = mmx_packed(self.i.opcode, dst, &src);
        self.regs.mm[modrm.reg as usize] = result;
        self.charge_rm(&modrm, OperandWidth::Dword);
        if matches!(self.i.opcode, 0xD5 | 0xE5 | 0xF5) {
            // Multiplier latency.
            cycles!(self, 2);
        }
        Ok(())
    }
}
