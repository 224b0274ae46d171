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

    cpu_x86::mod.rs

    Implements the x86 processor core context. A single CpuContext owns the register file,
    the model state, the installed dispatch tables and the system bus.

*/

#![allow(dead_code)]

pub mod addressing;
pub mod configure;
pub mod dispatch;
pub mod execute;
pub mod family;
pub mod memory;
pub mod model_state;
pub mod ports;
pub mod registers;
pub mod step;
pub mod timing;
pub mod x87;

use crate::{
    bus::BusInterface,
    cpu_common::{
        features::{CR0_ET, CR0_PE, CR4_OSFXSR},
        CpuFault,
        CpuType,
        Segment,
        TraceMode,
    },
    cpu_x86::{
        addressing::ModRm,
        dispatch::{fpu::FpuVariant, OpcodeTableDispatch, Table8088},
        family::FamilyDispatch,
        model_state::ModelState,
        registers::{RegisterFile, SegmentCache},
        timing::{BusTiming, CacheConfig, TimingConstants, VideoTimingPreset},
        x87::X87State,
    },
    tracelogger::TraceLogger,
};

pub const CPU_FLAG_CARRY: u32 = 0b0000_0000_0000_0001;
pub const CPU_FLAG_RESERVED1: u32 = 0b0000_0000_0000_0010;
pub const CPU_FLAG_PARITY: u32 = 0b0000_0000_0000_0100;
pub const CPU_FLAG_AUX_CARRY: u32 = 0b0000_0000_0001_0000;
pub const CPU_FLAG_ZERO: u32 = 0b0000_0000_0100_0000;
pub const CPU_FLAG_SIGN: u32 = 0b0000_0000_1000_0000;
pub const CPU_FLAG_TRAP: u32 = 0b0000_0001_0000_0000;
pub const CPU_FLAG_INT_ENABLE: u32 = 0b0000_0010_0000_0000;
pub const CPU_FLAG_DIRECTION: u32 = 0b0000_0100_0000_0000;
pub const CPU_FLAG_OVERFLOW: u32 = 0b0000_1000_0000_0000;

/// Bits 12-15 of FLAGS always read as set on the 8088 and 8086.
pub const CPU_FLAGS_808X_ON: u32 = 0xF000;
pub const CPU_FLAGS_ARITH_MASK: u32 =
    CPU_FLAG_CARRY | CPU_FLAG_PARITY | CPU_FLAG_AUX_CARRY | CPU_FLAG_ZERO | CPU_FLAG_SIGN | CPU_FLAG_OVERFLOW;

/// Longest legal instruction, prefixes included.
pub const MAX_INSTRUCTION_LEN: usize = 15;

pub const PARITY_TABLE: [bool; 256] = {
    let mut table = [false; 256];
    let mut index = 0;
    loop {
        table[index] = index.count_ones() % 2 == 0;
        index += 1;

        if index == 256 {
            break;
        }
    }
    table
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flag {
    Carry,
    Parity,
    AuxCarry,
    Zero,
    Sign,
    Trap,
    Interrupt,
    Direction,
    Overflow,
}

/// Operand width selected by the opcode and the operand size attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandWidth {
    Byte,
    Word,
    Dword,
}

impl OperandWidth {
    #[inline]
    pub const fn from_bits(bits: u8) -> OperandWidth {
        match bits {
            8 => OperandWidth::Byte,
            16 => OperandWidth::Word,
            _ => OperandWidth::Dword,
        }
    }

    #[inline]
    pub const fn bytes(&self) -> u32 {
        match self {
            OperandWidth::Byte => 1,
            OperandWidth::Word => 2,
            OperandWidth::Dword => 4,
        }
    }

    #[inline]
    pub const fn mask(&self) -> u32 {
        match self {
            OperandWidth::Byte => 0xFF,
            OperandWidth::Word => 0xFFFF,
            OperandWidth::Dword => 0xFFFF_FFFF,
        }
    }

    #[inline]
    pub const fn sign_bit(&self) -> u32 {
        match self {
            OperandWidth::Byte => 0x80,
            OperandWidth::Word => 0x8000,
            OperandWidth::Dword => 0x8000_0000,
        }
    }

    #[inline]
    pub fn is_long(&self) -> bool {
        matches!(self, OperandWidth::Dword)
    }
}

/// Decode state for the instruction being executed. Reset at the start of every step.
#[derive(Clone, Debug, Default)]
pub struct InstructionState {
    pub opcode: u8,
    pub two_byte: bool,
    pub prefixes: u32,
    pub op32: bool,
    pub addr32: bool,
    pub segment_override: Option<Segment>,
    pub modrm: Option<ModRm>,
    pub start_eip: u32,
    pub bytes: Vec<u8>,
    pub mnemonic: &'static str,
}

/// Host-side settings that feed the configurator and the wait-state model.
#[derive(Copy, Clone, Debug, Default)]
pub struct CpuSettings {
    pub waitstates: u32,
    pub cache: CacheConfig,
    pub external_fpu: bool,
    pub video_timing: VideoTimingPreset,
}

pub struct CpuContext {
    pub regs: RegisterFile,
    pub fpu: X87State,
    pub model: ModelState,
    pub timing: TimingConstants,
    pub bus_timing: BusTiming,
    pub family: FamilyDispatch,
    pub opcode_table: OpcodeTableDispatch,
    pub fpu_variant: FpuVariant,
    pub bus: BusInterface,
    pub settings: CpuSettings,

    pub i: InstructionState,
    instr_cycles: u32,
    cycle_num: u64,
    instruction_count: u64,
    halted: bool,
    pending_exception: Option<CpuFault>,
    fpu_error_latch: bool,

    trace_logger: TraceLogger,
    trace_mode: TraceMode,
}

impl CpuContext {
    /// Create a core attached to the given bus. The core is unconfigured until
    /// [CpuContext::configure] installs a model.
    pub fn new(bus: BusInterface) -> Self {
        Self {
            regs: RegisterFile::default(),
            fpu: X87State::default(),
            model: ModelState::default(),
            timing: TimingConstants::for_type(CpuType::Intel8088),
            bus_timing: BusTiming::default(),
            family: FamilyDispatch::default(),
            opcode_table: Table8088.into(),
            fpu_variant: FpuVariant::None,
            bus,
            settings: CpuSettings::default(),
            i: InstructionState::default(),
            instr_cycles: 0,
            cycle_num: 0,
            instruction_count: 0,
            halted: false,
            pending_exception: None,
            fpu_error_latch: false,
            trace_logger: TraceLogger::None,
            trace_mode: TraceMode::None,
        }
    }

    /// Reset the processor to its power-on register state. The installed model and
    /// configuration registers are kept.
    pub fn reset(&mut self) {
        self.regs = RegisterFile::default();
        self.fpu.init();

        let t = self.model.cpu_type;
        if !self.model.is286 {
            self.regs.segs[Segment::CS.index()] = SegmentCache::real(0xFFFF);
            self.regs.eip = 0;
            self.regs.eflags |= CPU_FLAGS_808X_ON;
        }
        else {
            // The code segment base is set to the top of the address space, below the
            // visible selector F000.
            self.regs.segs[Segment::CS.index()] = SegmentCache {
                selector: 0xF000,
                base: self.model.address_mask() & 0xFFFF_0000,
                limit: 0xFFFF,
            };
            self.regs.eip = 0xFFF0;
        }
        if t == CpuType::Intel286 {
            // MSW reserved bits read as set.
            self.regs.cr0 = 0xFFF0;
        }
        else if self.model.hasfpu && self.model.is386 {
            self.regs.cr0 = CR0_ET;
        }
        self.regs.gpr[registers::REGISTER_EDX] = self.model.descriptor.edx_reset;

        self.i = InstructionState::default();
        self.halted = false;
        self.pending_exception = None;
        self.fpu_error_latch = false;
        log::debug!(
            "CPU reset: {} CS:IP {:04X}:{:04X}",
            self.model.descriptor.name,
            self.regs.seg(Segment::CS).selector,
            self.regs.eip
        );
    }

    /// Point CS:IP at an entry point with real-address semantics.
    pub fn set_entry_point(&mut self, segment: u16, offset: u16) {
        self.regs.load_segment(Segment::CS, segment);
        self.regs.eip = offset as u32;
        self.halted = false;
    }

    pub fn set_trace_logger(&mut self, logger: TraceLogger, mode: TraceMode) {
        self.trace_logger = logger;
        self.trace_mode = mode;
    }

    pub fn trace_flush(&mut self) {
        self.trace_logger.flush();
    }

    #[inline]
    pub fn charge_cycles(&mut self, n: u32) {
        self.instr_cycles += n;
        self.cycle_num += n as u64;
        self.regs.tsc = self.regs.tsc.wrapping_add(n as u64);
    }

    #[inline]
    pub fn instr_cycles(&self) -> u32 {
        self.instr_cycles
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_num
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn pending_exception(&self) -> Option<CpuFault> {
        self.pending_exception
    }

    pub fn take_pending_exception(&mut self) -> Option<CpuFault> {
        self.pending_exception.take()
    }

    pub fn fpu_error_pending(&self) -> bool {
        self.fpu_error_latch
    }

    pub fn cpu_type(&self) -> CpuType {
        self.model.cpu_type
    }

    #[inline]
    pub fn protected_mode(&self) -> bool {
        self.regs.cr0 & CR0_PE != 0
    }

    /// Current privilege level. Always 0 outside protected mode.
    #[inline]
    pub fn cpl(&self) -> u8 {
        if self.protected_mode() {
            (self.regs.seg(Segment::CS).selector & 0x03) as u8
        }
        else {
            0
        }
    }

    /// Shared MMX/SSE mnemonics operate on the XMM bank while the OS has enabled SSE state.
    #[inline]
    pub fn sse_enabled(&self) -> bool {
        self.regs.cr4 & CR4_OSFXSR != 0
    }

    pub fn set_flag(&mut self, flag: Flag) {
        self.regs.eflags |= match flag {
            Flag::Carry => CPU_FLAG_CARRY,
            Flag::Parity => CPU_FLAG_PARITY,
            Flag::AuxCarry => CPU_FLAG_AUX_CARRY,
            Flag::Zero => CPU_FLAG_ZERO,
            Flag::Sign => CPU_FLAG_SIGN,
            Flag::Trap => CPU_FLAG_TRAP,
            Flag::Interrupt => CPU_FLAG_INT_ENABLE,
            Flag::Direction => CPU_FLAG_DIRECTION,
            Flag::Overflow => CPU_FLAG_OVERFLOW,
        };
    }

    pub fn clear_flag(&mut self, flag: Flag) {
        self.regs.eflags &= match flag {
            Flag::Carry => !CPU_FLAG_CARRY,
            Flag::Parity => !CPU_FLAG_PARITY,
            Flag::AuxCarry => !CPU_FLAG_AUX_CARRY,
            Flag::Zero => !CPU_FLAG_ZERO,
            Flag::Sign => !CPU_FLAG_SIGN,
            Flag::Trap => !CPU_FLAG_TRAP,
            Flag::Interrupt => !CPU_FLAG_INT_ENABLE,
            Flag::Direction => !CPU_FLAG_DIRECTION,
            Flag::Overflow => !CPU_FLAG_OVERFLOW,
        };
    }

    #[inline(always)]
    pub fn set_flag_state(&mut self, flag: Flag, state: bool) {
        if state {
            self.set_flag(flag)
        }
        else {
            self.clear_flag(flag)
        }
    }

    pub fn get_flag(&self, flag: Flag) -> bool {
        self.regs.eflags
            & match flag {
                Flag::Carry => CPU_FLAG_CARRY,
                Flag::Parity => CPU_FLAG_PARITY,
                Flag::AuxCarry => CPU_FLAG_AUX_CARRY,
                Flag::Zero => CPU_FLAG_ZERO,
                Flag::Sign => CPU_FLAG_SIGN,
                Flag::Trap => CPU_FLAG_TRAP,
                Flag::Interrupt => CPU_FLAG_INT_ENABLE,
                Flag::Direction => CPU_FLAG_DIRECTION,
                Flag::Overflow => CPU_FLAG_OVERFLOW,
            }
            != 0
    }

    /// Load FLAGS from a popped value. Reserved bits are forced to their fixed state for the
    /// processor generation.
    pub fn set_flags(&mut self, value: u32, width: OperandWidth) {
        const WRITABLE: u32 = 0x0000_0FD5;
        let keep = self.regs.eflags & !width.mask();
        let mut flags = (value & WRITABLE & width.mask()) | CPU_FLAG_RESERVED1 | keep;
        if !self.model.is286 {
            flags |= CPU_FLAGS_808X_ON;
        }
        else if self.model.is386 {
            // IOPL and NT are writable in real mode on the 386 and later.
            flags |= value & width.mask() & 0x7000;
        }
        self.regs.eflags = flags;
    }

    /// Set the sign, zero and parity flags from a result of the given width.
    #[inline]
    pub fn set_szp_flags_from_result(&mut self, result: u32, width: OperandWidth) {
        let result = result & width.mask();
        self.set_flag_state(Flag::Sign, result & width.sign_bit() != 0);
        self.set_flag_state(Flag::Zero, result == 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[(result & 0xFF) as usize]);
    }

    /// Evaluate a condition code (the low nibble of Jcc, SETcc and CMOVcc opcodes).
    pub fn condition(&self, cc: u8) -> bool {
        let result = match (cc >> 1) & 0x07 {
            0 => self.get_flag(Flag::Overflow),
            1 => self.get_flag(Flag::Carry),
            2 => self.get_flag(Flag::Zero),
            3 => self.get_flag(Flag::Carry) || self.get_flag(Flag::Zero),
            4 => self.get_flag(Flag::Sign),
            5 => self.get_flag(Flag::Parity),
            6 => self.get_flag(Flag::Sign) != self.get_flag(Flag::Overflow),
            _ => self.get_flag(Flag::Zero) || (self.get_flag(Flag::Sign) != self.get_flag(Flag::Overflow)),
        };
        result ^ (cc & 0x01 != 0)
    }

    /// Read a general purpose register at the given width. 8-bit indices use the AL-BH encoding.
    #[inline]
    pub fn reg_read(&self, width: OperandWidth, idx: u8) -> u32 {
        match width {
            OperandWidth::Byte => self.regs.reg8(idx) as u32,
            OperandWidth::Word => self.regs.reg16(idx) as u32,
            OperandWidth::Dword => self.regs.reg32(idx),
        }
    }

    #[inline]
    pub fn reg_write(&mut self, width: OperandWidth, idx: u8, value: u32) {
        match width {
            OperandWidth::Byte => self.regs.set_reg8(idx, value as u8),
            OperandWidth::Word => self.regs.set_reg16(idx, value as u16),
            OperandWidth::Dword => self.regs.set_reg32(idx, value),
        }
    }

    /// Operand width for a 16/32-bit form, from the current operand size attribute.
    #[inline]
    pub fn op_width(&self) -> OperandWidth {
        if self.i.op32 {
            OperandWidth::Dword
        }
        else {
            OperandWidth::Word
        }
    }

    pub(crate) fn set_halted(&mut self, state: bool) {
        self.halted = state;
    }

    pub(crate) fn set_pending_exception(&mut self, fault: CpuFault) {
        self.pending_exception = Some(fault);
    }

    pub(crate) fn set_fpu_error_latch(&mut self, state: bool) {
        self.fpu_error_latch = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_table() {
        assert!(PARITY_TABLE[0]);
        assert!(!PARITY_TABLE[1]);
        assert!(PARITY_TABLE[3]);
        assert!(PARITY_TABLE[0xFF]);
    }

    #[test]
    fn test_flags() {
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.set_flag(Flag::Carry);
        cpu.set_flag_state(Flag::Overflow, true);
        assert!(cpu.get_flag(Flag::Carry));
        assert_eq!(cpu.regs.eflags, 0x0803);
        cpu.clear_flag(Flag::Carry);
        assert!(!cpu.get_flag(Flag::Carry));

        cpu.set_szp_flags_from_result(0x8000, OperandWidth::Word);
        assert!(cpu.get_flag(Flag::Sign));
        assert!(cpu.get_flag(Flag::Parity));
        assert!(!cpu.get_flag(Flag::Zero));
        cpu.set_szp_flags_from_result(0x100, OperandWidth::Byte);
        assert!(cpu.get_flag(Flag::Zero));
    }

    #[test]
    fn test_conditions() {
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.set_flag(Flag::Zero);
        assert!(cpu.condition(0x4)); // E
        assert!(!cpu.condition(0x5)); // NE
        assert!(cpu.condition(0x6)); // BE
        cpu.set_flag(Flag::Sign);
        assert!(cpu.condition(0xC)); // L
        assert!(cpu.condition(0xE)); // LE
        assert!(!cpu.condition(0xD)); // GE
    }

    #[test]
    fn test_set_flags_reserved() {
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.configure(0, 0).unwrap();
        cpu.set_flags(0x0000, OperandWidth::Word);
        assert_eq!(cpu.regs.eflags & 0xF002, 0xF002);

        cpu.configure(0, 11).unwrap();
        cpu.set_flags(0xFFFF, OperandWidth::Word);
        assert_eq!(cpu.regs.eflags & 0xF000, 0);
    }
}
