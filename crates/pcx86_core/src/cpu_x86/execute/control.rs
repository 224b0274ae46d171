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

    cpu_x86::execute::control.rs

    Control transfer, interrupts, port IO and the system instructions: control registers,
    CPUID, RDTSC and the model specific registers.

    Segment loads use real-address semantics in every mode. Descriptor tables are not
    emulated, so protected-mode gates are unavailable and software interrupts raise #GP.

*/

use crate::{
    cpu_common::{
        features::{CpuFeatures, CR0_ET, CR0_PE, CR0_TS, CR4_TSD},
        CpuFault,
        FaultDetail,
        Segment,
    },
    cpu_x86::{
        family::ModelSpecific,
        registers::{REGISTER_EAX, REGISTER_EBX, REGISTER_ECX, REGISTER_EDX, REGISTER_ESP},
        CpuContext,
        Flag,
        OperandWidth,
    },
};

const SP: u8 = REGISTER_ESP as u8;

/// Low 4 bits of CR0 (PE, MP, EM, TS) form the 286 machine status word.
const MSW_MASK: u32 = 0x0F;

pub const INT_OVERFLOW: u8 = 4;
pub const INT_BREAKPOINT: u8 = 3;

impl CpuContext {
    /// A taken branch pays the taken cost, the decode cost and a prefetch queue refill.
    fn charge_branch_taken(&mut self) {
        cycles!(
            self,
            self.timing.bt + self.timing.bnt + self.bus_timing.prefetch_cycles
        );
    }

    /// Resolve a near branch target. Code segments are 16-bit, so targets beyond the CS limit
    /// raise #GP.
    fn near_target(&self, target: u32) -> Result<u32, CpuFault> {
        let target = if self.i.op32 { target } else { target & 0xFFFF };
        if target > self.regs.seg(Segment::CS).limit {
            return Err(CpuFault::gp(FaultDetail::SegmentLimit {
                segment: Segment::CS,
                offset: target,
            }));
        }
        Ok(target)
    }

    /// Protected-mode IO and flag instructions require CPL <= IOPL.
    fn check_iopl(&self, port: u16) -> Result<(), CpuFault> {
        let iopl = ((self.regs.eflags >> 12) & 0x03) as u8;
        if self.protected_mode() && self.cpl() > iopl {
            return Err(CpuFault::gp(FaultDetail::Port(port)));
        }
        Ok(())
    }

    /// Privileged instructions require CPL 0 in protected mode.
    fn check_cpl0(&self) -> Result<(), CpuFault> {
        if self.protected_mode() && self.cpl() > 0 {
            return Err(CpuFault::gp(FaultDetail::None));
        }
        Ok(())
    }

    /// Write a group of stack values below SP and commit SP only once all writes succeed.
    /// `values` are in push order.
    fn push_all(&mut self, values: &[u32], width: OperandWidth) -> Result<(), CpuFault> {
        let mut sp = self.regs.reg16(SP);
        for value in values {
            sp = sp.wrapping_sub(width.bytes() as u16);
            self.write_width(Segment::SS, sp as u32, width, *value)?;
        }
        self.regs.set_reg16(SP, sp);
        Ok(())
    }

    /// Load CS:EIP for a far transfer.
    fn far_jump(&mut self, selector: u16, offset: u32) {
        self.regs.load_segment(Segment::CS, selector);
        self.regs.eip = offset & 0xFFFF;
    }

    /// Deliver an interrupt through the real-mode interrupt vector table.
    pub(crate) fn interrupt_real(&mut self, vector: u8, return_ip: u32) -> Result<(), CpuFault> {
        let entry = (vector as u32) * 4;
        let offset = self.bus.read_u16(entry);
        let selector = self.bus.read_u16(entry + 2);

        let flags = self.regs.eflags & 0xFFFF;
        let cs = self.regs.seg(Segment::CS).selector as u32;
        self.push_all(&[flags, cs, return_ip], OperandWidth::Word)?;

        self.clear_flag(Flag::Interrupt);
        self.clear_flag(Flag::Trap);
        self.far_jump(selector, offset as u32);
        cycles!(self, self.timing.int_rm);
        Ok(())
    }

    /// Software interrupts. Protected-mode delivery needs an IDT, which is not emulated.
    fn software_interrupt(&mut self, vector: u8) -> Result<(), CpuFault> {
        if self.regs.cr0 & CR0_PE != 0 {
            log::warn!(
                "INT {:02X}h in protected mode: descriptor tables not emulated",
                vector
            );
            return Err(CpuFault::gp(FaultDetail::None));
        }
        let return_ip = self.regs.eip;
        self.interrupt_real(vector, return_ip)
    }

    /// 8088 0F: POP CS
    pub(crate) fn op_pop_cs(&mut self) -> Result<(), CpuFault> {
        let selector = self.pop(OperandWidth::Word)? as u16;
        self.regs.load_segment(Segment::CS, selector);
        cycles!(self, 7);
        Ok(())
    }

    /// 70-7F: Jcc rel8
    pub(crate) fn op_jcc(&mut self) -> Result<(), CpuFault> {
        let rel = self.fetch_i8()?;
        if self.condition(self.i.opcode & 0x0F) {
            self.regs.eip = self.near_target(self.regs.eip.wrapping_add(rel))?;
            self.charge_branch_taken();
        }
        else {
            cycles!(self, self.timing.bnt);
        }
        Ok(())
    }

    /// 0F 80-8F: Jcc rel16/32
    pub(crate) fn op_jcc_near(&mut self) -> Result<(), CpuFault> {
        let rel = self.fetch_rel()?;
        if self.condition(self.i.opcode & 0x0F) {
            self.regs.eip = self.near_target(self.regs.eip.wrapping_add(rel))?;
            self.charge_branch_taken();
        }
        else {
            cycles!(self, self.timing.bnt);
        }
        Ok(())
    }

    /// EB
    pub(crate) fn op_jmp_short(&mut self) -> Result<(), CpuFault> {
        let rel = self.fetch_i8()?;
        self.regs.eip = self.near_target(self.regs.eip.wrapping_add(rel))?;
        self.charge_branch_taken();
        Ok(())
    }

    /// E9
    pub(crate) fn op_jmp_near(&mut self) -> Result<(), CpuFault> {
        let rel = self.fetch_rel()?;
        self.regs.eip = self.near_target(self.regs.eip.wrapping_add(rel))?;
        self.charge_branch_taken();
        Ok(())
    }

    /// E8
    pub(crate) fn op_call_near(&mut self) -> Result<(), CpuFault> {
        let rel = self.fetch_rel()?;
        let target = self.near_target(self.regs.eip.wrapping_add(rel))?;
        self.call_near_to(target)
    }

    pub(crate) fn call_near_to(&mut self, target: u32) -> Result<(), CpuFault> {
        let target = self.near_target(target)?;
        self.push(self.regs.eip, self.op_width())?;
        self.regs.eip = target;
        self.charge_branch_taken();
        Ok(())
    }

    pub(crate) fn jump_near_to(&mut self, target: u32) -> Result<(), CpuFault> {
        self.regs.eip = self.near_target(target)?;
        self.charge_branch_taken();
        Ok(())
    }

    /// EA: JMP ptr16:16/32
    pub(crate) fn op_jmp_far(&mut self) -> Result<(), CpuFault> {
        let offset = self.fetch_imm(self.op_width())?;
        let selector = self.fetch_u16()?;
        self.jump_far_to(selector, offset);
        Ok(())
    }

    pub(crate) fn jump_far_to(&mut self, selector: u16, offset: u32) {
        self.far_jump(selector, offset);
        let cost = if self.protected_mode() { self.timing.jmp_pm } else { self.timing.jmp_rm };
        cycles!(self, cost);
    }

    /// 9A: CALL ptr16:16/32
    pub(crate) fn op_call_far(&mut self) -> Result<(), CpuFault> {
        let offset = self.fetch_imm(self.op_width())?;
        let selector = self.fetch_u16()?;
        self.call_far_to(selector, offset)
    }

    pub(crate) fn call_far_to(&mut self, selector: u16, offset: u32) -> Result<(), CpuFault> {
        let cs = self.regs.seg(Segment::CS).selector as u32;
        self.push_all(&[cs, self.regs.eip], self.op_width())?;
        self.far_jump(selector, offset);
        let cost = if self.protected_mode() { self.timing.call_pm } else { self.timing.call_rm };
        cycles!(self, cost);
        Ok(())
    }

    /// FF: INC, DEC, CALL, CALLF, JMP, JMPF and PUSH on a register or memory operand.
    pub(crate) fn op_grp5(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let modrm = self.fetch_modrm()?;
        match modrm.reg {
            0 | 1 => {
                let value = self.read_rm(&modrm, width)?;
                let result = self.inc_dec(value, modrm.reg == 1, width);
                self.write_rm(&modrm, width, result)?;
                self.charge_mm(&modrm, width);
            }
            2 => {
                let target = self.read_rm(&modrm, width)?;
                self.call_near_to(target)?;
            }
            4 => {
                let target = self.read_rm(&modrm, width)?;
                self.jump_near_to(target)?;
            }
            3 | 5 => {
                // Far pointers only exist in memory.
                let ea = self.memory_operand(&modrm)?;
                let offset = self.read_width(ea.segment, ea.offset, width)?;
                let selector = self.read_u16(ea.segment, ea.offset.wrapping_add(width.bytes()))?;
                if modrm.reg == 3 {
                    self.call_far_to(selector, offset)?;
                }
                else {
                    self.jump_far_to(selector, offset);
                }
            }
            6 => {
                let value = self.read_rm(&modrm, width)?;
                self.push(value, width)?;
                cycles!(self, if modrm.is_register() { self.timing.rr } else { self.timing.mr });
            }
            _ => return Err(CpuFault::ud(self.i.opcode)),
        }
        Ok(())
    }

    /// C2/C3 (and the 8088 aliases C0/C1): RET near, with an optional stack release.
    pub(crate) fn op_ret_near(&mut self) -> Result<(), CpuFault> {
        let release = if self.i.opcode & 0x01 == 0 { self.fetch_u16()? } else { 0 };
        let width = self.op_width();
        let target = self.peek_stack(0, width)?;
        let target = self.near_target(target)?;
        let sp = self
            .regs
            .reg16(SP)
            .wrapping_add(width.bytes() as u16)
            .wrapping_add(release);
        self.regs.set_reg16(SP, sp);
        self.regs.eip = target;
        self.charge_branch_taken();
        Ok(())
    }

    /// CA/CB (and the 8088 aliases C8/C9): RET far.
    pub(crate) fn op_retf(&mut self) -> Result<(), CpuFault> {
        let release = if self.i.opcode & 0x01 == 0 { self.fetch_u16()? } else { 0 };
        let width = self.op_width();
        let offset = self.peek_stack(0, width)?;
        let selector = self.peek_stack(width.bytes() as u16, width)? as u16;
        let sp = self
            .regs
            .reg16(SP)
            .wrapping_add(2 * width.bytes() as u16)
            .wrapping_add(release);
        self.regs.set_reg16(SP, sp);
        self.far_jump(selector, offset);
        let cost = if self.protected_mode() { self.timing.retf_pm } else { self.timing.retf_rm };
        cycles!(self, cost);
        Ok(())
    }

    /// CC
    pub(crate) fn op_int3(&mut self) -> Result<(), CpuFault> {
        self.software_interrupt(INT_BREAKPOINT)
    }

    /// CD
    pub(crate) fn op_int(&mut self) -> Result<(), CpuFault> {
        let vector = self.fetch_u8()?;
        self.software_interrupt(vector)
    }

    /// CE
    pub(crate) fn op_into(&mut self) -> Result<(), CpuFault> {
        if self.get_flag(Flag::Overflow) {
            self.software_interrupt(INT_OVERFLOW)
        }
        else {
            cycles!(self, self.timing.bnt);
            Ok(())
        }
    }

    /// CF: IRET/IRETD
    pub(crate) fn op_iret(&mut self) -> Result<(), CpuFault> {
        let width = self.op_width();
        let step = width.bytes() as u16;
        let offset = self.peek_stack(0, width)?;
        let selector = self.peek_stack(step, width)? as u16;
        let flags = self.peek_stack(2 * step, width)?;
        self.regs.set_reg16(SP, self.regs.reg16(SP).wrapping_add(3 * step));
        self.far_jump(selector, offset);
        self.set_flags(flags, width);
        let cost = if self.protected_mode() { self.timing.iret_pm } else { self.timing.iret_rm };
        cycles!(self, cost);
        Ok(())
    }

    /// E0-E3: LOOPNE, LOOPE, LOOP and JCXZ. The address size selects CX or ECX.
    pub(crate) fn op_loop(&mut self) -> Result<(), CpuFault> {
        let rel = self.fetch_i8()?;
        let count_width = if self.i.addr32 { OperandWidth::Dword } else { OperandWidth::Word };
        let count = self.reg_read(count_width, REGISTER_ECX as u8);

        let (new_count, taken) = match self.i.opcode {
            0xE3 => (count, count == 0),
            op => {
                let c = count.wrapping_sub(1) & count_width.mask();
                let zf = self.get_flag(Flag::Zero);
                let taken = match op {
                    0xE0 => c != 0 && !zf,
                    0xE1 => c != 0 && zf,
                    _ => c != 0,
                };
                (c, taken)
            }
        };

        if taken {
            let target = self.near_target(self.regs.eip.wrapping_add(rel))?;
            self.reg_write(count_width, REGISTER_ECX as u8, new_count);
            self.regs.eip = target;
            self.charge_branch_taken();
        }
        else {
            self.reg_write(count_width, REGISTER_ECX as u8, new_count);
            cycles!(self, self.timing.bnt);
        }
        Ok(())
    }

    /// E4/E5/EC/ED: IN
    pub(crate) fn op_in(&mut self) -> Result<(), CpuFault> {
        let width = if self.i.opcode & 0x01 == 0 { OperandWidth::Byte } else { self.op_width() };
        let port = if self.i.opcode & 0x08 == 0 {
            self.fetch_u8()? as u16
        }
        else {
            self.regs.reg16(REGISTER_EDX as u8)
        };
        self.check_iopl(port)?;
        let value = self.port_in(port, width);
        self.reg_write(width, REGISTER_EAX as u8, value);
        Ok(())
    }

    /// E6/E7/EE/EF: OUT
    pub(crate) fn op_out(&mut self) -> Result<(), CpuFault> {
        let width = if self.i.opcode & 0x01 == 0 { OperandWidth::Byte } else { self.op_width() };
        let port = if self.i.opcode & 0x08 == 0 {
            self.fetch_u8()? as u16
        }
        else {
            self.regs.reg16(REGISTER_EDX as u8)
        };
        self.check_iopl(port)?;
        let value = self.reg_read(width, REGISTER_EAX as u8);
        self.port_out(port, width, value);
        Ok(())
    }

    /// F4
    pub(crate) fn op_hlt(&mut self) -> Result<(), CpuFault> {
        self.check_cpl0()?;
        self.set_halted(true);
        cycles!(self, 100);
        Ok(())
    }

    /// 0F 01: only the machine status word forms (SMSW, LMSW) are implemented.
    pub(crate) fn op_grp7(&mut self) -> Result<(), CpuFault> {
        let modrm = self.fetch_modrm()?;
        match modrm.reg {
            4 => {
                let width = if modrm.is_register() { self.op_width() } else { OperandWidth::Word };
                self.write_rm(&modrm, width, self.regs.cr0)?;
                cycles!(self, 2);
            }
            6 => {
                self.check_cpl0()?;
                let msw = self.read_rm(&modrm, OperandWidth::Word)?;
                // LMSW can set PE but never clear it.
                let pe = self.regs.cr0 & CR0_PE;
                self.regs.cr0 = (self.regs.cr0 & !MSW_MASK) | (msw & MSW_MASK) | pe;
                cycles!(self, 3);
            }
            _ => {
                log::warn!("0F 01 /{}: descriptor tables not emulated", modrm.reg);
                return Err(CpuFault::ud(self.i.opcode));
            }
        }
        Ok(())
    }

    /// 0F 06
    pub(crate) fn op_clts(&mut self) -> Result<(), CpuFault> {
        self.check_cpl0()?;
        self.regs.cr0 &= !CR0_TS;
        cycles!(self, 5);
        Ok(())
    }

    /// Decode the register operands of MOV to and from control registers. The mod field is
    /// ignored and always treated as a register form.
    fn fetch_cr_operands(&mut self) -> Result<(u8, u8), CpuFault> {
        let byte = self.fetch_u8()?;
        let cr = (byte >> 3) & 0x07;
        let valid = match cr {
            0 | 2 | 3 => true,
            4 => self.model.features.has(CpuFeatures::CR4),
            _ => false,
        };
        if !valid {
            return Err(CpuFault::ud(self.i.opcode));
        }
        self.check_cpl0()?;
        Ok((cr, byte & 0x07))
    }

    /// 0F 20: MOV r32, CRn
    pub(crate) fn op_mov_from_cr(&mut self) -> Result<(), CpuFault> {
        let (cr, reg) = self.fetch_cr_operands()?;
        let value = match cr {
            0 => self.regs.cr0,
            2 => self.regs.cr2,
            3 => self.regs.cr3,
            _ => self.regs.cr4,
        };
        self.regs.set_reg32(reg, value);
        cycles!(self, 6);
        Ok(())
    }

    /// 0F 22: MOV CRn, r32. CR4 writes are masked to the bits the model implements.
    pub(crate) fn op_mov_to_cr(&mut self) -> Result<(), CpuFault> {
        let (cr, reg) = self.fetch_cr_operands()?;
        let value = self.regs.reg32(reg);
        match cr {
            0 => {
                let mut cr0 = value;
                if self.model.is486 || (self.model.hasfpu && self.model.is386) {
                    cr0 |= CR0_ET;
                }
                if (cr0 ^ self.regs.cr0) & CR0_PE != 0 {
                    log::debug!("CR0.PE -> {}", cr0 & CR0_PE != 0);
                }
                self.regs.cr0 = cr0;
                cycles!(self, 10);
            }
            2 => {
                self.regs.cr2 = value;
                cycles!(self, 4);
            }
            3 => {
                self.regs.cr3 = value;
                cycles!(self, 5);
            }
            _ => {
                let masked = value & self.model.cr4_mask;
                if masked != value {
                    log::trace!("CR4 write {:08X} masked to {:08X}", value, masked);
                }
                self.regs.cr4 = masked;
                cycles!(self, 4);
            }
        }
        Ok(())
    }

    /// 0F 08/09: INVD and WBINVD. There is no cache contents to model, only the cost.
    pub(crate) fn op_invd(&mut self) -> Result<(), CpuFault> {
        self.check_cpl0()?;
        cycles!(self, if self.i.opcode == 0x08 { 1000 } else { 10000 });
        Ok(())
    }

    /// 0F A2. Raises #UD while the model has CPUID hidden.
    pub(crate) fn op_cpuid(&mut self) -> Result<(), CpuFault> {
        if self.model.cpuid == 0 {
            return Err(CpuFault::ud(self.i.opcode));
        }
        let leaf = self.regs.gpr[REGISTER_EAX];
        let r = self.family.cpuid(&self.model, leaf);
        log::trace!("CPUID {:08X}: {:08X} {:08X} {:08X} {:08X}", leaf, r.eax, r.ebx, r.ecx, r.edx);
        self.regs.gpr[REGISTER_EAX] = r.eax;
        self.regs.gpr[REGISTER_EBX] = r.ebx;
        self.regs.gpr[REGISTER_ECX] = r.ecx;
        self.regs.gpr[REGISTER_EDX] = r.edx;
        cycles!(self, 9);
        Ok(())
    }

    /// 0F 31
    pub(crate) fn op_rdtsc(&mut self) -> Result<(), CpuFault> {
        if !self.model.features.has(CpuFeatures::RDTSC) {
            return Err(CpuFault::ud(self.i.opcode));
        }
        if self.regs.cr4 & CR4_TSD != 0 && self.cpl() > 0 {
            return Err(CpuFault::gp(FaultDetail::None));
        }
        cycles!(self, 1);
        let tsc = self.regs.tsc;
        self.regs.gpr[REGISTER_EAX] = tsc as u32;
        self.regs.gpr[REGISTER_EDX] = (tsc >> 32) as u32;
        Ok(())
    }

    /// 0F 32
    pub(crate) fn op_rdmsr(&mut self) -> Result<(), CpuFault> {
        if !self.model.features.has(CpuFeatures::MSR) {
            return Err(CpuFault::ud(self.i.opcode));
        }
        self.check_cpl0()?;
        let index = self.regs.gpr[REGISTER_ECX];
        let value = self.family.rdmsr(&self.model, self.regs.tsc, index)?;
        log::trace!("RDMSR {:08X} -> {:016X}", index, value);
        self.regs.gpr[REGISTER_EAX] = value as u32;
        self.regs.gpr[REGISTER_EDX] = (value >> 32) as u32;
        cycles!(self, 9);
        Ok(())
    }

    /// 0F 30
    pub(crate) fn op_wrmsr(&mut self) -> Result<(), CpuFault> {
        if !self.model.features.has(CpuFeatures::MSR) {
            return Err(CpuFault::ud(self.i.opcode));
        }
        self.check_cpl0()?;
        let index = self.regs.gpr[REGISTER_ECX];
        let value = (self.regs.gpr[REGISTER_EDX] as u64) << 32 | self.regs.gpr[REGISTER_EAX] as u64;
        log::trace!("WRMSR {:08X} <- {:016X}", index, value);
        let family = self.family;
        family.wrmsr(&mut self.model, &mut self.regs.tsc, index, value)?;
        cycles!(self, 9);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cpu_common::{features::vendor_registers, CpuException, StepResult},
        cpu_x86::{
            execute::tests::{cpu_with_code, step_n},
            family::VENDOR_INTEL,
        },
    };

    #[test]
    fn test_call_ret() {
        let code = [
            0xE8, 0x03, 0x00, // CALL +3
            0x90, 0x90, 0x90, // NOPs
            0xC3, // RET
        ];
        let mut cpu = cpu_with_code("286/12", &code);
        let sp = cpu.regs.reg16(SP);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.eip, 6);
        assert_eq!(cpu.regs.reg16(SP), sp - 2);
        assert_eq!(cpu.peek_stack(0, OperandWidth::Word).unwrap(), 3);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.eip, 3);
        assert_eq!(cpu.regs.reg16(SP), sp);
    }

    #[test]
    fn test_far_call_retf() {
        let code = [
            0x9A, 0x00, 0x00, 0x00, 0x02, // CALL 0200:0000
        ];
        let mut cpu = cpu_with_code("i386DX/33", &code);
        cpu.bus.write_u8(0x2000, 0xCA); // RETF 2
        cpu.bus.write_u16(0x2001, 0x0002);
        let sp = cpu.regs.reg16(SP);

        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.seg(Segment::CS).selector, 0x0200);
        assert_eq!(cpu.regs.reg16(SP), sp - 4);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.seg(Segment::CS).selector, 0x0100);
        assert_eq!(cpu.regs.eip, 5);
        assert_eq!(cpu.regs.reg16(SP), sp + 2);
    }

    #[test]
    fn test_int_iret() {
        let code = [0xCD, 0x21]; // INT 21h
        let mut cpu = cpu_with_code("i486DX2/66", &code);
        cpu.bus.write_u16(0x21 * 4, 0x0010);
        cpu.bus.write_u16(0x21 * 4 + 2, 0x0300);
        cpu.bus.write_u8(0x3010, 0xCF); // IRET
        cpu.set_flag(Flag::Interrupt);
        cpu.set_flag(Flag::Carry);

        let before = cpu.cycle_count();
        step_n(&mut cpu, 1).unwrap();
        assert!(cpu.cycle_count() - before >= cpu.timing.int_rm as u64);
        assert_eq!(cpu.regs.seg(Segment::CS).selector, 0x0300);
        assert_eq!(cpu.regs.eip, 0x0010);
        assert!(!cpu.get_flag(Flag::Interrupt));

        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.seg(Segment::CS).selector, 0x0100);
        assert_eq!(cpu.regs.eip, 2);
        assert!(cpu.get_flag(Flag::Interrupt));
        assert!(cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn test_software_int_in_protected_mode() {
        let code = [0xCD, 0x21];
        let mut cpu = cpu_with_code("i486DX2/66", &code);
        cpu.regs.cr0 |= CR0_PE;
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::GeneralProtection));
        assert_eq!(cpu.regs.eip, 0);
    }

    #[test]
    fn test_loop() {
        let code = [
            0xE2, 0xFE, // LOOP $
            0xE3, 0x02, // JCXZ +2
        ];
        let mut cpu = cpu_with_code("286/12", &code);
        cpu.regs.set_reg16(REGISTER_ECX as u8, 3);
        step_n(&mut cpu, 3).unwrap();
        assert_eq!(cpu.regs.reg16(REGISTER_ECX as u8), 0);
        assert_eq!(cpu.regs.eip, 2);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.eip, 6);
    }

    #[test]
    fn test_cpuid_and_hidden_cpuid() {
        let code = [0x0F, 0xA2, 0x0F, 0xA2];
        let mut cpu = cpu_with_code("Pentium 100/66", &code);
        cpu.regs.gpr[REGISTER_EAX] = 0;
        step_n(&mut cpu, 1).unwrap();
        let (ebx, edx, ecx) = vendor_registers(VENDOR_INTEL);
        assert_eq!(cpu.regs.gpr[REGISTER_EBX], ebx);
        assert_eq!(cpu.regs.gpr[REGISTER_EDX], edx);
        assert_eq!(cpu.regs.gpr[REGISTER_ECX], ecx);

        // The 6x86 powers up with CPUID hidden.
        let mut cpu = cpu_with_code("Cx6x86/PR150+", &code);
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::InvalidOpcode));
    }

    #[test]
    fn test_msr_instructions() {
        let code = [
            0x0F, 0x32, // RDMSR
            0x0F, 0x30, // WRMSR
        ];
        let mut cpu = cpu_with_code("Pentium Pro 200", &code);
        cpu.regs.gpr[REGISTER_ECX] = 0xFE;
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.gpr[REGISTER_EAX], 0x508);
        assert_eq!(cpu.regs.gpr[REGISTER_EDX], 0);

        // An unknown index raises #GP(0).
        cpu.regs.gpr[REGISTER_ECX] = 0xDEAD;
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.vector() == 13 && f.error_code == Some(0)));
    }

    #[test]
    fn test_rdtsc_tracks_cycles() {
        let code = [0x0F, 0x31, 0x0F, 0x31];
        let mut cpu = cpu_with_code("Pentium 100/66", &code);
        step_n(&mut cpu, 1).unwrap();
        let first = (cpu.regs.gpr[REGISTER_EDX] as u64) << 32 | cpu.regs.gpr[REGISTER_EAX] as u64;
        step_n(&mut cpu, 1).unwrap();
        let second = (cpu.regs.gpr[REGISTER_EDX] as u64) << 32 | cpu.regs.gpr[REGISTER_EAX] as u64;
        assert!(second > first);
        assert_eq!(cpu.regs.tsc, cpu.cycle_count());

        let mut cpu = cpu_with_code("i486DX2/66", &code);
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::InvalidOpcode));
    }

    #[test]
    fn test_cr4_write_masked() {
        let code = [
            0x0F, 0x22, 0xE0, // MOV CR4, EAX
            0x0F, 0x20, 0xE3, // MOV EBX, CR4
        ];
        let mut cpu = cpu_with_code("Pentium 100/66", &code);
        cpu.regs.gpr[REGISTER_EAX] = 0xFFFF_FFFF;
        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.regs.cr4, cpu.model.cr4_mask);
        assert_eq!(cpu.regs.gpr[REGISTER_EBX], cpu.model.cr4_mask);

        // No CR4 on the 386.
        let mut cpu = cpu_with_code("i386DX/33", &code);
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::InvalidOpcode));
    }

    #[test]
    fn test_lmsw_cannot_clear_pe() {
        let code = [
            0x0F, 0x01, 0xF0, // LMSW AX
            0x0F, 0x01, 0xF0, // LMSW AX
            0x0F, 0x01, 0xE3, // SMSW BX
        ];
        let mut cpu = cpu_with_code("286/12", &code);
        cpu.regs.set_reg16(REGISTER_EAX as u8, 0x0001);
        step_n(&mut cpu, 1).unwrap();
        assert!(cpu.protected_mode());
        cpu.regs.set_reg16(REGISTER_EAX as u8, 0x0000);
        step_n(&mut cpu, 2).unwrap();
        assert!(cpu.protected_mode());
        assert_eq!(cpu.regs.reg16(REGISTER_EBX as u8) & 0x0F, 0x01);
    }

    #[test]
    fn test_io_instructions() {
        let code = [
            0xB0, 0xC0, // MOV AL, C0
            0xE6, 0x22, // OUT 22h, AL
            0xB0, 0x5A, // MOV AL, 5A
            0xE6, 0x23, // OUT 23h, AL
            0xE4, 0x23, // IN AL, 23h
        ];
        let mut cpu = cpu_with_code("Cx486DX2/66", &code);
        step_n(&mut cpu, 4).unwrap();
        assert_eq!(cpu.model.ccr[0], 0x5A);
        cpu.regs.set_reg8(REGISTER_EAX as u8, 0);
        step_n(&mut cpu, 1).unwrap();
        assert_eq!(cpu.regs.reg8(REGISTER_EAX as u8), 0x5A);
    }

    #[test]
    fn test_hlt() {
        let mut cpu = cpu_with_code("8088/4.77", &[0xF4]);
        assert_eq!(cpu.step().unwrap(), StepResult::Halt);
        assert!(cpu.is_halted());
    }
}
