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

    cpu_x86::step.rs

    Implements a single instruction step for the x86 core.

*/

use crate::{
    cpu_common::{
        format_instruction_bytes,
        CpuError,
        CpuFault,
        Segment,
        StepResult,
        TraceMode,
        OPCODE_PREFIX_ADDRESS_SIZE,
        OPCODE_PREFIX_LOCK,
        OPCODE_PREFIX_OPERAND_SIZE,
        OPCODE_PREFIX_REPE,
        OPCODE_PREFIX_REPNE,
        OPCODE_PREFIX_SEG_OVERRIDE,
    },
    cpu_x86::{dispatch::OpcodeTable, CpuContext, InstructionState},
};

impl CpuContext {
    /// Run a single instruction.
    ///
    /// Prefixes are consumed here; the first non-prefix byte selects a handler from the installed
    /// one-byte map. A faulting instruction is unwound to its first byte before the fault is
    /// delivered, so a restarted instruction sees the same register state. Real-mode faults vector
    /// through the IVT immediately. Protected-mode faults are left pending for the caller, as
    /// descriptor tables are not emulated.
    pub fn step(&mut self) -> Result<StepResult, CpuError> {
        if self.halted {
            return Ok(StepResult::Halt);
        }

        self.instr_cycles = 0;
        self.i = InstructionState {
            start_eip: self.regs.eip,
            ..InstructionState::default()
        };
        let start_cs = self.regs.seg(Segment::CS).selector;

        let result = self.decode_prefixes().and_then(|opcode| {
            self.i.opcode = opcode;
            let entry = *self.opcode_table.maps().one_byte(self.i.op32, opcode);
            self.i.mnemonic = entry.mnemonic;
            (entry.handler)(self)
        });

        let step_result = match result {
            Ok(()) => {
                if self.halted {
                    StepResult::Halt
                }
                else {
                    StepResult::Normal
                }
            }
            Err(fault) => {
                log::trace!(
                    "{} at {:04X}:{:04X} ({})",
                    fault,
                    start_cs,
                    self.i.start_eip,
                    self.i.mnemonic
                );
                self.regs.eip = self.i.start_eip;
                if self.protected_mode() {
                    self.set_pending_exception(fault);
                }
                else if let Err(double) = self.interrupt_real(fault.vector(), self.i.start_eip) {
                    // Nowhere to push the frame. A real CPU would shut down here.
                    log::error!("Fault {} while delivering {}, halting", double, fault);
                    self.halted = true;
                }
                StepResult::Exception(fault)
            }
        };

        let cycles = self.instr_cycles;
        self.bus.run_devices(cycles);

        if self.trace_mode == TraceMode::Instruction {
            let line = format!(
                "{:04X}:{:04X} {:<30} {:<8} {}",
                start_cs,
                self.i.start_eip,
                format_instruction_bytes(&self.i.bytes),
                self.i.mnemonic,
                cycles
            );
            self.trace_logger.println(&line);
        }

        self.instruction_count += 1;
        Ok(step_result)
    }

    /// Consume prefix bytes and return the opcode byte that follows them. The FS and GS overrides
    /// and the size prefixes exist on the 386 and later only; on older parts those bytes fall
    /// through to the opcode map.
    fn decode_prefixes(&mut self) -> Result<u8, CpuFault> {
        loop {
            let byte = self.fetch_u8()?;
            match byte {
                0x26 | 0x2E | 0x36 | 0x3E => {
                    self.i.segment_override = Segment::from_sreg((byte >> 3) & 0x03);
                    self.i.prefixes |= OPCODE_PREFIX_SEG_OVERRIDE;
                }
                0x64 | 0x65 if self.model.is386 => {
                    self.i.segment_override = Some(if byte == 0x64 { Segment::FS } else { Segment::GS });
                    self.i.prefixes |= OPCODE_PREFIX_SEG_OVERRIDE;
                }
                0x66 if self.model.is386 => {
                    self.i.op32 = true;
                    self.i.prefixes |= OPCODE_PREFIX_OPERAND_SIZE;
                }
                0x67 if self.model.is386 => {
                    self.i.addr32 = true;
                    self.i.prefixes |= OPCODE_PREFIX_ADDRESS_SIZE;
                }
                0xF0 => self.i.prefixes |= OPCODE_PREFIX_LOCK,
                0xF2 => self.i.prefixes |= OPCODE_PREFIX_REPNE,
                0xF3 => self.i.prefixes |= OPCODE_PREFIX_REPE,
                _ => return Ok(byte),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cpu_common::{CpuException, StepResult},
        cpu_x86::{
            execute::tests::{cpu_with_code, step_n},
            registers::{REGISTER_EAX, REGISTER_EBX},
        },
    };

    #[test]
    fn test_operand_size_prefix() {
        let code = [
            0x66, 0xB8, 0x78, 0x56, 0x34, 0x12, // MOV EAX, 12345678
            0xB8, 0xCD, 0xAB, // MOV AX, ABCD
        ];
        let mut cpu = cpu_with_code("i386DX/33", &code);
        step_n(&mut cpu, 2).unwrap();
        assert_eq!(cpu.regs.gpr[REGISTER_EAX], 0x1234_ABCD);
        assert_eq!(cpu.regs.eip, 9);
        assert_eq!(cpu.instruction_count(), 2);
    }

    #[test]
    fn test_size_prefix_invalid_on_286() {
        let code = [0x66, 0x90];
        let mut cpu = cpu_with_code("286/12", &code);
        let result = cpu.step().unwrap();
        // Real mode, so the #UD was vectored through the IVT.
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::InvalidOpcode));
    }

    #[test]
    fn test_segment_override() {
        let code = [0x26, 0x8B, 0x1E, 0x10, 0x00]; // MOV BX, ES:[0010]
        let mut cpu = cpu_with_code("8088/4.77", &code);
        cpu.regs.load_segment(crate::cpu_common::Segment::ES, 0x4000);
        cpu.bus.write_u16(0x40010, 0xBEEF);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.reg16(REGISTER_EBX as u8), 0xBEEF);
        assert_eq!(cpu.i.mnemonic, "MOV");
    }

    #[test]
    fn test_instruction_length_limit() {
        // Fifteen segment overrides leave no room for the opcode.
        let mut code = vec![0x2E; 15];
        code.push(0x90);
        let mut cpu = cpu_with_code("i486DX2/66", &code);
        cpu.regs.cr0 |= crate::cpu_common::features::CR0_PE;
        let result = cpu.step().unwrap();
        assert!(matches!(result, StepResult::Exception(f) if f.exception == CpuException::GeneralProtection));
        assert_eq!(cpu.regs.eip, 0);
    }

    #[test]
    fn test_cycles_reset_per_step() {
        let code = [0x90, 0x90];
        let mut cpu = cpu_with_code("Pentium 100/66", &code);
        cpu.step().unwrap();
        let first = cpu.instr_cycles();
        cpu.step().unwrap();
        assert_eq!(cpu.instr_cycles(), first);
        assert_eq!(cpu.cycle_count(), 2 * first as u64);
    }
}
