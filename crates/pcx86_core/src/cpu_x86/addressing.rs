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

    cpu_x86::addressing.rs

    Implements instruction fetch, ModRM decoding, the 16 and 32-bit effective address
    calculators and operand loading routines.

*/

use crate::{
    cpu_common::{CpuFault, FaultDetail, Segment},
    cpu_x86::{registers::*, CpuContext, OperandWidth, MAX_INSTRUCTION_LEN},
};

pub const MODRM_REG_MASK: u8 = 0b00_111_000;
pub const MODRM_MOD_REGISTER: u8 = 0b11;

/// A resolved memory operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EffectiveAddress {
    pub segment: Segment,
    pub offset: u32,
}

/// A decoded ModRM byte. `ea` is None for register operands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModRm {
    pub byte: u8,
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
    pub ea: Option<EffectiveAddress>,
}

impl ModRm {
    #[inline]
    pub fn is_register(&self) -> bool {
        self.ea.is_none()
    }
}

impl CpuContext {
    /// Fetch the next instruction byte from CS:EIP. Instructions longer than the architectural
    /// limit raise #GP.
    pub fn fetch_u8(&mut self) -> Result<u8, CpuFault> {
        if self.i.bytes.len() >= MAX_INSTRUCTION_LEN {
            log::trace!("Instruction exceeds {} bytes", MAX_INSTRUCTION_LEN);
            return Err(CpuFault::gp(FaultDetail::None));
        }
        let address = self.linear_address(Segment::CS, self.regs.eip, 1, false)?;
        let byte = self.bus.read_u8(address);
        // Code segments are 16-bit.
        self.regs.eip = self.regs.eip.wrapping_add(1) & 0xFFFF;
        self.i.bytes.push(byte);
        Ok(byte)
    }

    pub fn fetch_u16(&mut self) -> Result<u16, CpuFault> {
        let lo = self.fetch_u8()?;
        let hi = self.fetch_u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub fn fetch_u32(&mut self) -> Result<u32, CpuFault> {
        let lo = self.fetch_u16()?;
        let hi = self.fetch_u16()?;
        Ok((hi as u32) << 16 | lo as u32)
    }

    /// Fetch an 8-bit displacement or immediate, sign extended to 32 bits.
    #[inline]
    pub fn fetch_i8(&mut self) -> Result<u32, CpuFault> {
        Ok(self.fetch_u8()? as i8 as i32 as u32)
    }

    /// Fetch an immediate of the given width.
    pub fn fetch_imm(&mut self, width: OperandWidth) -> Result<u32, CpuFault> {
        match width {
            OperandWidth::Byte => Ok(self.fetch_u8()? as u32),
            OperandWidth::Word => Ok(self.fetch_u16()? as u32),
            OperandWidth::Dword => self.fetch_u32(),
        }
    }

    /// Fetch a relative branch displacement at the current operand size.
    pub fn fetch_rel(&mut self) -> Result<u32, CpuFault> {
        if self.i.op32 {
            self.fetch_u32()
        }
        else {
            Ok(self.fetch_u16()? as i16 as i32 as u32)
        }
    }

    /// Fetch and decode a ModRM byte, along with any SIB byte and displacement.
    pub fn fetch_modrm(&mut self) -> Result<ModRm, CpuFault> {
        let byte = self.fetch_u8()?;
        let mut modrm = ModRm {
            byte,
            mode: byte >> 6,
            reg: (byte & MODRM_REG_MASK) >> 3,
            rm: byte & 0x07,
            ea: None,
        };
        if modrm.mode != MODRM_MOD_REGISTER {
            modrm.ea = Some(if self.i.addr32 {
                self.calc_ea32(modrm.mode, modrm.rm)?
            }
            else {
                self.calc_ea16(modrm.mode, modrm.rm)?
            });
        }
        self.i.modrm = Some(modrm);
        Ok(modrm)
    }

    /// 16-bit addressing. Modes that reference BP use the stack segment unless overridden.
    fn calc_ea16(&mut self, mode: u8, rm: u8) -> Result<EffectiveAddress, CpuFault> {
        let r = |idx: usize| self.regs.gpr[idx] as u16;
        let (default_seg, base) = match rm {
            0 => (Segment::DS, r(REGISTER_EBX).wrapping_add(r(REGISTER_ESI))),
            1 => (Segment::DS, r(REGISTER_EBX).wrapping_add(r(REGISTER_EDI))),
            2 => (Segment::SS, r(REGISTER_EBP).wrapping_add(r(REGISTER_ESI))),
            3 => (Segment::SS, r(REGISTER_EBP).wrapping_add(r(REGISTER_EDI))),
            4 => (Segment::DS, r(REGISTER_ESI)),
            5 => (Segment::DS, r(REGISTER_EDI)),
            6 if mode == 0 => (Segment::DS, 0),
            6 => (Segment::SS, r(REGISTER_EBP)),
            _ => (Segment::DS, r(REGISTER_EBX)),
        };
        let disp = match mode {
            0 if rm == 6 => self.fetch_u16()?,
            0 => 0,
            1 => self.fetch_u8()? as i8 as u16,
            _ => self.fetch_u16()?,
        };
        Ok(EffectiveAddress {
            segment: self.i.segment_override.unwrap_or(default_seg),
            offset: base.wrapping_add(disp) as u32,
        })
    }

    /// 32-bit addressing with SIB. ESP and EBP bases default to the stack segment.
    fn calc_ea32(&mut self, mode: u8, rm: u8) -> Result<EffectiveAddress, CpuFault> {
        let mut default_seg = Segment::DS;
        let mut offset: u32;

        if rm == 4 {
            let sib = self.fetch_u8()?;
            let scale = sib >> 6;
            let index = ((sib >> 3) & 0x07) as usize;
            let base = (sib & 0x07) as usize;

            offset = if base == REGISTER_EBP && mode == 0 {
                self.fetch_u32()?
            }
            else {
                if base == REGISTER_ESP || base == REGISTER_EBP {
                    default_seg = Segment::SS;
                }
                self.regs.gpr[base]
            };
            // An index of ESP means no index.
            if index != REGISTER_ESP {
                offset = offset.wrapping_add(self.regs.gpr[index] << scale);
            }
        }
        else if rm == 5 && mode == 0 {
            offset = self.fetch_u32()?;
        }
        else {
            if rm as usize == REGISTER_EBP {
                default_seg = Segment::SS;
            }
            offset = self.regs.gpr[rm as usize];
        }

        match mode {
            1 => offset = offset.wrapping_add(self.fetch_i8()?),
            2 => offset = offset.wrapping_add(self.fetch_u32()?),
            _ => {}
        }
        Ok(EffectiveAddress {
            segment: self.i.segment_override.unwrap_or(default_seg),
            offset,
        })
    }

    /// Read the r/m operand: a register, or memory at the decoded effective address.
    pub fn read_rm(&mut self, modrm: &ModRm, width: OperandWidth) -> Result<u32, CpuFault> {
        match modrm.ea {
            None => Ok(self.reg_read(width, modrm.rm)),
            Some(ea) => self.read_width(ea.segment, ea.offset, width),
        }
    }

    pub fn write_rm(&mut self, modrm: &ModRm, width: OperandWidth, value: u32) -> Result<(), CpuFault> {
        match modrm.ea {
            None => {
                self.reg_write(width, modrm.rm, value);
                Ok(())
            }
            Some(ea) => self.write_width(ea.segment, ea.offset, width, value),
        }
    }

    /// The effective address of a memory operand. Register forms raise #UD.
    pub fn memory_operand(&self, modrm: &ModRm) -> Result<EffectiveAddress, CpuFault> {
        modrm.ea.ok_or(CpuFault::ud(self.i.opcode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusInterface;

    fn cpu_with_code(code: &[u8]) -> CpuContext {
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.configure(0, 14).unwrap();
        cpu.reset();
        cpu.bus.copy_from(code, 0x1000);
        cpu.set_entry_point(0x0100, 0x0000);
        cpu
    }

    #[test]
    fn test_ea16() {
        // [BP+SI+0x10], [BX+DI-2], [0x1234]
        let mut cpu = cpu_with_code(&[0x42, 0x10, 0x41, 0xFE, 0x06, 0x34, 0x12]);
        cpu.regs.set_reg16(REGISTER_EBP as u8, 0x1000);
        cpu.regs.set_reg16(REGISTER_ESI as u8, 0x0020);
        cpu.regs.set_reg16(REGISTER_EBX as u8, 0x0001);
        cpu.regs.set_reg16(REGISTER_EDI as u8, 0x0000);

        let m = cpu.fetch_modrm().unwrap();
        assert_eq!(m.reg, 0);
        assert_eq!(m.ea, Some(EffectiveAddress { segment: Segment::SS, offset: 0x1030 }));
        let m = cpu.fetch_modrm().unwrap();
        assert_eq!(m.ea, Some(EffectiveAddress { segment: Segment::DS, offset: 0xFFFF }));
        let m = cpu.fetch_modrm().unwrap();
        assert_eq!(m.ea, Some(EffectiveAddress { segment: Segment::DS, offset: 0x1234 }));
        assert_eq!(cpu.regs.eip, 7);
    }

    #[test]
    fn test_ea32_sib() {
        // [EBP+ECX*4+8], [disp32], [ESP]
        let mut cpu = cpu_with_code(&[0x44, 0x8D, 0x08, 0x05, 0x78, 0x56, 0x34, 0x12, 0x04, 0x24]);
        cpu.i.addr32 = true;
        cpu.regs.gpr[REGISTER_EBP] = 0x100;
        cpu.regs.gpr[REGISTER_ECX] = 0x3;
        cpu.regs.gpr[REGISTER_ESP] = 0x80;

        let m = cpu.fetch_modrm().unwrap();
        assert_eq!(m.ea, Some(EffectiveAddress { segment: Segment::SS, offset: 0x114 }));
        let m = cpu.fetch_modrm().unwrap();
        assert_eq!(m.ea, Some(EffectiveAddress { segment: Segment::DS, offset: 0x1234_5678 }));
        cpu.i.segment_override = Some(Segment::ES);
        let m = cpu.fetch_modrm().unwrap();
        assert_eq!(m.ea, Some(EffectiveAddress { segment: Segment::ES, offset: 0x80 }));
    }

    #[test]
    fn test_register_form() {
        let mut cpu = cpu_with_code(&[0xD8]);
        let m = cpu.fetch_modrm().unwrap();
        assert!(m.is_register());
        assert_eq!((m.reg, m.rm), (3, 0));
        assert!(cpu.memory_operand(&m).is_err());
    }

    #[test]
    fn test_instruction_length_limit() {
        let mut cpu = cpu_with_code(&[0x90; 32]);
        for _ in 0..MAX_INSTRUCTION_LEN {
            cpu.fetch_u8().unwrap();
        }
        let fault = cpu.fetch_u8().unwrap_err();
        assert_eq!(fault.vector(), 13);
    }
}
