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

    cpu_x86::memory.rs

    Segmented memory access and the stack. Every access is checked against the segment
    limit and the page-fault map before any byte is committed, so a faulting instruction
    leaves memory untouched.

*/

use crate::{
    bus::BusInterface,
    cpu_common::{CpuException, CpuFault, FaultDetail, Segment},
    cpu_x86::{registers::REGISTER_ESP, CpuContext, OperandWidth},
};

impl CpuContext {
    /// Translate segment:offset to a physical address for an access of `size` bytes.
    pub fn linear_address(&mut self, segment: Segment, offset: u32, size: u32, write: bool) -> Result<u32, CpuFault> {
        let seg = *self.regs.seg(segment);
        if self.model.is286 && offset.wrapping_add(size - 1) > seg.limit {
            let exception = if segment == Segment::SS {
                CpuException::StackFault
            }
            else {
                CpuException::GeneralProtection
            };
            log::trace!("{:?}:{:08X} exceeds segment limit {:08X}", segment, offset, seg.limit);
            return Err(CpuFault::new(
                exception,
                Some(0),
                FaultDetail::SegmentLimit { segment, offset },
            ));
        }
        let address = seg.base.wrapping_add(offset) & self.bus.address_mask();
        if self.bus.is_page_fault(address, size) {
            self.regs.cr2 = address;
            log::trace!("Page fault at {:08X} (write: {})", address, write);
            return Err(CpuFault::new(
                CpuException::PageFault,
                Some((write as u32) << 1),
                FaultDetail::Memory { address, write },
            ));
        }
        Ok(address)
    }

    /// Charge the bus cost of a data access. Accesses served from the internal cache are free,
    /// except for the video aperture which is never cached.
    fn charge_memory_access(&mut self, address: u32, size: u32, write: bool) {
        if BusInterface::is_video_address(address) {
            let cost = match size {
                1 => self.bus_timing.video_b,
                2 => self.bus_timing.video_w,
                _ => self.bus_timing.video_l * (size / 4),
            };
            cycles!(self, cost);
        }
        else if !self.settings.cache.internal {
            let t = &self.bus_timing;
            let cost = match (size, write) {
                (1 | 2, false) => t.cycles_read,
                (1 | 2, true) => t.cycles_write,
                (_, false) => t.cycles_read_l * (size / 4),
                (_, true) => t.cycles_write_l * (size / 4),
            };
            cycles!(self, cost);
        }
        if size > 1 && (address & 0x03) + size > 4 {
            cycles!(self, self.timing.misaligned);
        }
    }

    pub fn read_u8(&mut self, segment: Segment, offset: u32) -> Result<u8, CpuFault> {
        let address = self.linear_address(segment, offset, 1, false)?;
        self.charge_memory_access(address, 1, false);
        Ok(self.bus.read_u8(address))
    }

    pub fn read_u16(&mut self, segment: Segment, offset: u32) -> Result<u16, CpuFault> {
        let address = self.linear_address(segment, offset, 2, false)?;
        self.charge_memory_access(address, 2, false);
        Ok(self.bus.read_u16(address))
    }

    pub fn read_u32(&mut self, segment: Segment, offset: u32) -> Result<u32, CpuFault> {
        let address = self.linear_address(segment, offset, 4, false)?;
        self.charge_memory_access(address, 4, false);
        Ok(self.bus.read_u32(address))
    }

    pub fn read_u64(&mut self, segment: Segment, offset: u32) -> Result<u64, CpuFault> {
        let address = self.linear_address(segment, offset, 8, false)?;
        self.charge_memory_access(address, 8, false);
        Ok(self.bus.read_u64(address))
    }

    /// Read a 128-bit SSE operand as little-endian bytes.
    pub fn read_u128(&mut self, segment: Segment, offset: u32) -> Result<[u8; 16], CpuFault> {
        let address = self.linear_address(segment, offset, 16, false)?;
        self.charge_memory_access(address, 16, false);
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.bus.read_u64(address).to_le_bytes());
        bytes[8..].copy_from_slice(&self.bus.read_u64(address.wrapping_add(8)).to_le_bytes());
        Ok(bytes)
    }

    pub fn write_u8(&mut self, segment: Segment, offset: u32, data: u8) -> Result<(), CpuFault> {
        let address = self.linear_address(segment, offset, 1, true)?;
        self.charge_memory_access(address, 1, true);
        self.bus.write_u8(address, data);
        Ok(())
    }

    pub fn write_u16(&mut self, segment: Segment, offset: u32, data: u16) -> Result<(), CpuFault> {
        let address = self.linear_address(segment, offset, 2, true)?;
        self.charge_memory_access(address, 2, true);
        self.bus.write_u16(address, data);
        Ok(())
    }

    pub fn write_u32(&mut self, segment: Segment, offset: u32, data: u32) -> Result<(), CpuFault> {
        let address = self.linear_address(segment, offset, 4, true)?;
        self.charge_memory_access(address, 4, true);
        self.bus.write_u32(address, data);
        Ok(())
    }

    pub fn write_u64(&mut self, segment: Segment, offset: u32, data: u64) -> Result<(), CpuFault> {
        let address = self.linear_address(segment, offset, 8, true)?;
        self.charge_memory_access(address, 8, true);
        self.bus.write_u64(address, data);
        Ok(())
    }

    pub fn write_u128(&mut self, segment: Segment, offset: u32, data: &[u8; 16]) -> Result<(), CpuFault> {
        let address = self.linear_address(segment, offset, 16, true)?;
        self.charge_memory_access(address, 16, true);
        for (i, b) in data.iter().enumerate() {
            self.bus.write_u8(address.wrapping_add(i as u32), *b);
        }
        Ok(())
    }

    pub fn read_width(&mut self, segment: Segment, offset: u32, width: OperandWidth) -> Result<u32, CpuFault> {
        match width {
            OperandWidth::Byte => Ok(self.read_u8(segment, offset)? as u32),
            OperandWidth::Word => Ok(self.read_u16(segment, offset)? as u32),
            OperandWidth::Dword => self.read_u32(segment, offset),
        }
    }

    pub fn write_width(
        &mut self,
        segment: Segment,
        offset: u32,
        width: OperandWidth,
        value: u32,
    ) -> Result<(), CpuFault> {
        match width {
            OperandWidth::Byte => self.write_u8(segment, offset, value as u8),
            OperandWidth::Word => self.write_u16(segment, offset, value as u16),
            OperandWidth::Dword => self.write_u32(segment, offset, value),
        }
    }

    /// Push a word or dword. SP is only updated once the write has succeeded.
    pub fn push(&mut self, value: u32, width: OperandWidth) -> Result<(), CpuFault> {
        let sp = self.regs.reg16(REGISTER_ESP as u8).wrapping_sub(width.bytes() as u16);
        self.write_width(Segment::SS, sp as u32, width, value)?;
        self.regs.set_reg16(REGISTER_ESP as u8, sp);
        Ok(())
    }

    pub fn pop(&mut self, width: OperandWidth) -> Result<u32, CpuFault> {
        let sp = self.regs.reg16(REGISTER_ESP as u8);
        let value = self.read_width(Segment::SS, sp as u32, width)?;
        self.regs
            .set_reg16(REGISTER_ESP as u8, sp.wrapping_add(width.bytes() as u16));
        Ok(value)
    }

    /// Read the value `depth` bytes above the top of stack without popping it.
    pub fn peek_stack(&mut self, depth: u16, width: OperandWidth) -> Result<u32, CpuFault> {
        let sp = self.regs.reg16(REGISTER_ESP as u8).wrapping_add(depth);
        self.read_width(Segment::SS, sp as u32, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_common::models::find_model;

    fn cpu_for(name: &str) -> CpuContext {
        let (manufacturer, idx) = find_model(name).unwrap();
        let mut cpu = CpuContext::new(BusInterface::new(0x200000));
        cpu.configure(manufacturer.index(), idx).unwrap();
        cpu.reset();
        cpu
    }

    #[test]
    fn test_segment_limit() {
        let mut cpu = cpu_for("286/12");
        cpu.regs.load_segment(Segment::DS, 0x2000);
        cpu.write_u16(Segment::DS, 0xFFFE, 0x1234).unwrap();
        assert_eq!(cpu.read_u16(Segment::DS, 0xFFFE).unwrap(), 0x1234);

        let fault = cpu.read_u16(Segment::DS, 0xFFFF).unwrap_err();
        assert_eq!(fault.exception, CpuException::GeneralProtection);
        let fault = cpu.read_u32(Segment::SS, 0xFFFE).unwrap_err();
        assert_eq!(fault.exception, CpuException::StackFault);
    }

    #[test]
    fn test_8088_wraps() {
        let mut cpu = cpu_for("8088/4.77");
        cpu.regs.load_segment(Segment::ES, 0xFFFF);
        // FFFF:0010 wraps to physical 0 on a 20-bit bus.
        cpu.write_u8(Segment::ES, 0x10, 0xAB).unwrap();
        assert_eq!(cpu.bus.read_u8(0), 0xAB);
        assert!(cpu.read_u16(Segment::ES, 0xFFFF).is_ok());
    }

    #[test]
    fn test_page_fault() {
        let mut cpu = cpu_for("i486DX2/66");
        cpu.regs.load_segment(Segment::DS, 0x0100);
        cpu.bus.set_page_fault(0x2000, true);
        cpu.bus.write_u8(0x1FFF, 0x11);

        let fault = cpu.write_u16(Segment::DS, 0x0FFF, 0xBEEF).unwrap_err();
        assert_eq!(fault.exception, CpuException::PageFault);
        assert_eq!(fault.error_code, Some(2));
        assert_eq!(cpu.regs.cr2, 0x1FFF);
        // Nothing was committed.
        assert_eq!(cpu.bus.read_u8(0x1FFF), 0x11);
    }

    #[test]
    fn test_stack() {
        let mut cpu = cpu_for("i386DX/33");
        cpu.regs.load_segment(Segment::SS, 0x3000);
        cpu.regs.set_reg16(REGISTER_ESP as u8, 0x0100);
        cpu.push(0x1122_3344, OperandWidth::Dword).unwrap();
        cpu.push(0x5566, OperandWidth::Word).unwrap();
        assert_eq!(cpu.regs.reg16(REGISTER_ESP as u8), 0x00FA);
        assert_eq!(cpu.peek_stack(2, OperandWidth::Dword).unwrap(), 0x1122_3344);
        assert_eq!(cpu.pop(OperandWidth::Word).unwrap(), 0x5566);
        assert_eq!(cpu.pop(OperandWidth::Dword).unwrap(), 0x1122_3344);
        assert_eq!(cpu.regs.reg16(REGISTER_ESP as u8), 0x0100);
    }

    #[test]
    fn test_faulting_push_keeps_sp() {
        let mut cpu = cpu_for("i386DX/33");
        cpu.regs.load_segment(Segment::SS, 0x3000);
        cpu.regs.set_reg16(REGISTER_ESP as u8, 0x0000);
        cpu.bus.set_page_fault(0x3FFFE, true);
        assert!(cpu.push(0xAAAA, OperandWidth::Word).is_err());
        assert_eq!(cpu.regs.reg16(REGISTER_ESP as u8), 0x0000);
    }

    #[test]
    fn test_access_cost() {
        let mut cpu = cpu_for("i386DX/33");
        cpu.set_cache_enabled(false, false);
        cpu.regs.load_segment(Segment::DS, 0);

        let before = cpu.cycle_count();
        cpu.read_u32(Segment::DS, 0x100).unwrap();
        assert_eq!(cpu.cycle_count() - before, 6);

        // A dword crossing a 4-byte boundary pays the misaligned penalty.
        let before = cpu.cycle_count();
        cpu.read_u32(Segment::DS, 0x102).unwrap();
        assert_eq!(cpu.cycle_count() - before, 6 + cpu.timing.misaligned as u64);

        cpu.set_cache_enabled(true, false);
        let before = cpu.cycle_count();
        cpu.read_u32(Segment::DS, 0x100).unwrap();
        assert_eq!(cpu.cycle_count(), before);
    }
}
