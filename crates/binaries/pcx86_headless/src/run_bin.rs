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

    run_bin.rs

    Loads a flat binary image into memory and runs it until HLT or an instruction limit.

*/

use std::path::Path;

use anyhow::{bail, Result};

use pcx86_core::{
    cpu_common::{calc_linear_address, Segment, StepResult},
    cpu_x86::{registers::REGISTER_ESP, CpuContext},
};

pub const DEFAULT_BIN_SEG: u16 = 0x1000;
pub const DEFAULT_MAX_INSTRUCTIONS: u64 = 10_000_000;

#[derive(Debug, Default)]
pub struct RunStats {
    pub instructions: u64,
    pub cycles: u64,
    pub exceptions: u64,
    pub halted: bool,
}

/// Copy `image` to seg:ofs and point every segment register at `seg`, COM style.
pub fn load_image(cpu: &mut CpuContext, image: &[u8], seg: u16, ofs: u16) -> Result<()> {
    let address = calc_linear_address(seg, ofs) as usize;
    if address + image.len() > cpu.bus.size() {
        bail!(
            "Image of {} bytes at {:04X}:{:04X} doesn't fit in {} bytes of memory",
            image.len(),
            seg,
            ofs,
            cpu.bus.size()
        );
    }
    cpu.bus.copy_from(image, address);

    for segment in [Segment::DS, Segment::ES, Segment::SS] {
        cpu.regs.load_segment(segment, seg);
    }
    cpu.regs.set_reg16(REGISTER_ESP as u8, 0xFFFE);
    cpu.set_entry_point(seg, ofs);
    log::debug!("Loaded {} bytes at {:04X}:{:04X}", image.len(), seg, ofs);
    Ok(())
}

/// Step until HLT. Real-mode exceptions are delivered through the IVT and counted; a
/// protected-mode exception has no handler to go to and ends the run.
pub fn run(cpu: &mut CpuContext, max_instructions: u64) -> Result<RunStats> {
    let mut stats = RunStats::default();
    let start_cycles = cpu.cycle_count();

    while stats.instructions < max_instructions {
        match cpu.step()? {
            StepResult::Normal => {}
            StepResult::Halt => {
                stats.halted = true;
                break;
            }
            StepResult::Exception(fault) => {
                stats.exceptions += 1;
                log::debug!("{} at instruction {}", fault, stats.instructions);
                if let Some(fault) = cpu.take_pending_exception() {
                    bail!("Unhandled protected mode exception: {}", fault);
                }
            }
        }
        stats.instructions += 1;
    }
    stats.cycles = cpu.cycle_count() - start_cycles;
    cpu.trace_flush();
    Ok(stats)
}

pub fn run_file(
    cpu: &mut CpuContext,
    path: &Path,
    seg: Option<u16>,
    ofs: Option<u16>,
    max_instructions: Option<u64>,
) -> Result<RunStats> {
    let image = std::fs::read(path)?;
    load_image(cpu, &image, seg.unwrap_or(DEFAULT_BIN_SEG), ofs.unwrap_or(0))?;
    run(cpu, max_instructions.unwrap_or(DEFAULT_MAX_INSTRUCTIONS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcx86_core::{cpu_x86::registers::REGISTER_EAX, CpuBuilder};

    #[test]
    fn test_run_to_halt() {
        let code = [
            0xB8, 0x34, 0x12, // MOV AX, 1234
            0x50, // PUSH AX
            0x5B, // POP BX
            0xF4, // HLT
        ];
        let mut cpu = CpuBuilder::new().with_model_name("8088/4.77").build().unwrap();
        load_image(&mut cpu, &code, 0x2000, 0x100).unwrap();
        let stats = run(&mut cpu, 100).unwrap();
        assert!(stats.halted);
        assert_eq!(stats.instructions, 3);
        assert_eq!(stats.exceptions, 0);
        assert!(stats.cycles > 0);
        assert_eq!(cpu.regs.reg16(REGISTER_EAX as u8), 0x1234);
        assert_eq!(cpu.regs.reg16(3), 0x1234);
    }

    #[test]
    fn test_instruction_limit() {
        let code = [0xEB, 0xFE]; // JMP $
        let mut cpu = CpuBuilder::new().with_model_name("i386DX/33").build().unwrap();
        load_image(&mut cpu, &code, DEFAULT_BIN_SEG, 0).unwrap();
        let stats = run(&mut cpu, 50).unwrap();
        assert!(!stats.halted);
        assert_eq!(stats.instructions, 50);
    }

    #[test]
    fn test_image_too_large() {
        let mut cpu = CpuBuilder::new().with_model_name("8088/4.77").build().unwrap();
        assert!(load_image(&mut cpu, &[0x90; 0x100], 0xFFFF, 0xFFF0).is_err());
    }

    #[test]
    fn test_run_file() {
        let path = std::env::temp_dir().join("pcx86_run_file_test.bin");
        std::fs::write(&path, [0x40, 0x40, 0xF4]).unwrap(); // INC AX; INC AX; HLT
        let mut cpu = CpuBuilder::new().with_model_name("286/12").build().unwrap();
        let stats = run_file(&mut cpu, &path, None, None, None).unwrap();
        assert!(stats.halted);
        assert_eq!(cpu.regs.reg16(REGISTER_EAX as u8), 2);
        _ = std::fs::remove_file(&path);
    }
}
