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

    cpu_x86::dispatch::mod.rs

    Opcode dispatch tables.

    Each processor generation has its own pair of handler maps: the one-byte map and the
    two-byte (0F) map, each with a 16-bit and a 32-bit operand size half. The maps are built
    once and shared; the configurator installs a generation's maps as a unit by selecting an
    [OpcodeTable] implementation. Every slot holds a handler, with undefined encodings
    pointing at the #UD handler.

*/

pub mod fpu;

use enum_dispatch::enum_dispatch;
use lazy_static::lazy_static;

use crate::{
    cpu_common::{CpuFault, CpuType, Segment},
    cpu_x86::CpuContext,
};

/// An instruction handler. Handlers return Err to unwind a faulting instruction.
pub type OpHandler = fn(&mut CpuContext) -> Result<(), CpuFault>;

/// Entries per map: 256 opcodes for each operand size.
pub const OPCODE_MAP_LEN: usize = 512;

#[derive(Copy, Clone)]
pub struct OpEntry {
    pub mnemonic: &'static str,
    pub handler: OpHandler,
}

impl std::fmt::Debug for OpEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpEntry({})", self.mnemonic)
    }
}

impl OpEntry {
    pub const INVALID: OpEntry = OpEntry {
        mnemonic: "INVALID",
        handler: CpuContext::op_invalid,
    };
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Map {
    OneByte,
    TwoByte,
}

/// The one-byte and two-byte maps for a processor generation.
pub struct OpMaps {
    one_byte: Box<[OpEntry]>,
    two_byte: Box<[OpEntry]>,
}

impl OpMaps {
    fn new() -> Self {
        Self {
            one_byte: vec![OpEntry::INVALID; OPCODE_MAP_LEN].into_boxed_slice(),
            two_byte: vec![OpEntry::INVALID; OPCODE_MAP_LEN].into_boxed_slice(),
        }
    }

    #[inline]
    fn index(op32: bool, opcode: u8) -> usize {
        ((op32 as usize) << 8) | opcode as usize
    }

    #[inline]
    pub fn one_byte(&self, op32: bool, opcode: u8) -> &OpEntry {
        &self.one_byte[Self::index(op32, opcode)]
    }

    #[inline]
    pub fn two_byte(&self, op32: bool, opcode: u8) -> &OpEntry {
        &self.two_byte[Self::index(op32, opcode)]
    }

    /// Install a handler with separate 16 and 32-bit mnemonics.
    fn set_w(&mut self, map: Map, opcode: u8, m16: &'static str, m32: &'static str, handler: OpHandler) {
        let table = match map {
            Map::OneByte => &mut self.one_byte,
            Map::TwoByte => &mut self.two_byte,
        };
        table[Self::index(false, opcode)] = OpEntry {
            mnemonic: m16,
            handler,
        };
        table[Self::index(true, opcode)] = OpEntry {
            mnemonic: m32,
            handler,
        };
    }

    fn set(&mut self, map: Map, opcode: u8, mnemonic: &'static str, handler: OpHandler) {
        self.set_w(map, opcode, mnemonic, mnemonic, handler);
    }

    fn set_range(&mut self, map: Map, opcodes: std::ops::RangeInclusive<u8>, mnemonic: &'static str, handler: OpHandler) {
        for opcode in opcodes {
            self.set(map, opcode, mnemonic, handler);
        }
    }

    fn set_list(&mut self, map: Map, entries: &[(u8, &'static str)], handler: OpHandler) {
        for (opcode, mnemonic) in entries {
            self.set(map, *opcode, *mnemonic, handler);
        }
    }

    /// Count the slots that decode to something other than #UD.
    pub fn defined_count(&self) -> usize {
        self.one_byte
            .iter()
            .chain(self.two_byte.iter())
            .filter(|e| e.mnemonic != OpEntry::INVALID.mnemonic)
            .count()
    }
}

/// What a generation's maps contain beyond the base instruction set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Generation {
    I8088,
    I286,
    I386,
    I486,
    Pentium,
}

#[derive(Copy, Clone, Debug)]
struct MapFeatures {
    gen: Generation,
    mmx: bool,
    cmov: bool,
    sse: bool,
}

impl MapFeatures {
    const fn new(gen: Generation) -> Self {
        Self {
            gen,
            mmx: false,
            cmov: false,
            sse: false,
        }
    }

    const fn mmx(mut self) -> Self {
        self.mmx = true;
        self
    }

    const fn cmov(mut self) -> Self {
        self.cmov = true;
        self
    }

    const fn sse(mut self) -> Self {
        self.sse = true;
        self
    }
}

const ALU_MNEMONICS: [&str; 8] = ["ADD", "OR", "ADC", "SBB", "AND", "SUB", "XOR", "CMP"];
const JCC_MNEMONICS: [&str; 16] = [
    "JO", "JNO", "JB", "JNB", "JZ", "JNZ", "JBE", "JNBE", "JS", "JNS", "JP", "JNP", "JL", "JNL", "JLE", "JNLE",
];
const CMOV_MNEMONICS: [&str; 16] = [
    "CMOVO", "CMOVNO", "CMOVB", "CMOVNB", "CMOVZ", "CMOVNZ", "CMOVBE", "CMOVNBE", "CMOVS", "CMOVNS", "CMOVP",
    "CMOVNP", "CMOVL", "CMOVNL", "CMOVLE", "CMOVNLE",
];

fn install_base(m: &mut OpMaps, gen: Generation) {
    use Map::OneByte as One;

    for (i, mnemonic) in ALU_MNEMONICS.iter().enumerate() {
        let base = (i as u8) << 3;
        m.set_range(One, base..=base + 5, *mnemonic, CpuContext::op_alu);
    }
    m.set_list(One, &[(0x06, "PUSH"), (0x0E, "PUSH"), (0x16, "PUSH"), (0x1E, "PUSH")], CpuContext::op_push_sreg);
    m.set_list(One, &[(0x07, "POP"), (0x17, "POP"), (0x1F, "POP")], CpuContext::op_pop_sreg);
    if gen == Generation::I8088 {
        m.set(One, 0x0F, "POP", CpuContext::op_pop_cs);
    }
    else {
        m.set(One, 0x0F, "0F", CpuContext::op_two_byte);
    }
    m.set_range(One, 0x40..=0x47, "INC", CpuContext::op_inc_dec_reg);
    m.set_range(One, 0x48..=0x4F, "DEC", CpuContext::op_inc_dec_reg);
    m.set_range(One, 0x50..=0x57, "PUSH", CpuContext::op_push_reg);
    m.set_range(One, 0x58..=0x5F, "POP", CpuContext::op_pop_reg);

    for (cc, mnemonic) in JCC_MNEMONICS.iter().enumerate() {
        m.set(One, 0x70 + cc as u8, *mnemonic, CpuContext::op_jcc);
        if gen == Generation::I8088 {
            // 60-6F alias the short conditional jumps on the 8088.
            m.set(One, 0x60 + cc as u8, *mnemonic, CpuContext::op_jcc);
        }
    }

    m.set_range(One, 0x80..=0x83, "GRP1", CpuContext::op_grp1);
    m.set_range(One, 0x84..=0x85, "TEST", CpuContext::op_test_rm);
    m.set_range(One, 0x86..=0x87, "XCHG", CpuContext::op_xchg_rm);
    m.set_range(One, 0x88..=0x8B, "MOV", CpuContext::op_mov_rm);
    m.set(One, 0x8C, "MOV", CpuContext::op_store_sreg);
    m.set(One, 0x8D, "LEA", CpuContext::op_lea);
    m.set(One, 0x8E, "MOV", CpuContext::op_load_sreg);
    m.set(One, 0x8F, "POP", CpuContext::op_pop_rm);
    m.set(One, 0x90, "NOP", CpuContext::op_nop);
    m.set_range(One, 0x91..=0x97, "XCHG", CpuContext::op_xchg_acc);
    m.set_w(One, 0x98, "CBW", "CWDE", CpuContext::op_cbw);
    m.set_w(One, 0x99, "CWD", "CDQ", CpuContext::op_cwd);
    m.set(One, 0x9A, "CALLF", CpuContext::op_call_far);
    m.set(One, 0x9B, "WAIT", CpuContext::op_wait);
    m.set_w(One, 0x9C, "PUSHF", "PUSHFD", CpuContext::op_pushf);
    m.set_w(One, 0x9D, "POPF", "POPFD", CpuContext::op_popf);
    m.set(One, 0x9E, "SAHF", CpuContext::op_sahf);
    m.set(One, 0x9F, "LAHF", CpuContext::op_lahf);
    m.set_range(One, 0xA0..=0xA3, "MOV", CpuContext::op_mov_moffs);
    m.set_range(One, 0xA8..=0xA9, "TEST", CpuContext::op_test_acc);
    m.set_range(One, 0xB0..=0xBF, "MOV", CpuContext::op_mov_reg_imm);

    m.set(One, 0xC2, "RETN", CpuContext::op_ret_near);
    m.set(One, 0xC3, "RETN", CpuContext::op_ret_near);
    m.set_range(One, 0xC6..=0xC7, "MOV", CpuContext::op_mov_rm_imm);
    m.set(One, 0xCA, "RETF", CpuContext::op_retf);
    m.set(One, 0xCB, "RETF", CpuContext::op_retf);
    if gen == Generation::I8088 {
        m.set(One, 0xC0, "RETN", CpuContext::op_ret_near);
        m.set(One, 0xC1, "RETN", CpuContext::op_ret_near);
        m.set(One, 0xC8, "RETF", CpuContext::op_retf);
        m.set(One, 0xC9, "RETF", CpuContext::op_retf);
    }
    else {
        m.set_range(One, 0xC0..=0xC1, "GRP2", CpuContext::op_grp2);
        m.set_w(One, 0x68, "PUSH", "PUSH", CpuContext::op_push_imm);
        m.set_w(One, 0x6A, "PUSH", "PUSH", CpuContext::op_push_imm);
    }
    m.set(One, 0xCC, "INT3", CpuContext::op_int3);
    m.set(One, 0xCD, "INT", CpuContext::op_int);
    m.set(One, 0xCE, "INTO", CpuContext::op_into);
    m.set_w(One, 0xCF, "IRET", "IRETD", CpuContext::op_iret);
    m.set_range(One, 0xD0..=0xD3, "GRP2", CpuContext::op_grp2);
    m.set_range(One, 0xD8..=0xDF, "ESC", CpuContext::op_fpu_escape);

    m.set(One, 0xE0, "LOOPNE", CpuContext::op_loop);
    m.set(One, 0xE1, "LOOPE", CpuContext::op_loop);
    m.set(One, 0xE2, "LOOP", CpuContext::op_loop);
    m.set(One, 0xE3, "JCXZ", CpuContext::op_loop);
    m.set_range(One, 0xE4..=0xE5, "IN", CpuContext::op_in);
    m.set_range(One, 0xE6..=0xE7, "OUT", CpuContext::op_out);
    m.set(One, 0xE8, "CALL", CpuContext::op_call_near);
    m.set(One, 0xE9, "JMP", CpuContext::op_jmp_near);
    m.set(One, 0xEA, "JMPF", CpuContext::op_jmp_far);
    m.set(One, 0xEB, "JMP", CpuContext::op_jmp_short);
    m.set_range(One, 0xEC..=0xED, "IN", CpuContext::op_in);
    m.set_range(One, 0xEE..=0xEF, "OUT", CpuContext::op_out);

    m.set(One, 0xF4, "HLT", CpuContext::op_hlt);
    m.set(One, 0xF5, "CMC", CpuContext::op_flag);
    m.set_range(One, 0xF6..=0xF7, "GRP3", CpuContext::op_grp3);
    m.set(One, 0xF8, "CLC", CpuContext::op_flag);
    m.set(One, 0xF9, "STC", CpuContext::op_flag);
    m.set(One, 0xFA, "CLI", CpuContext::op_flag);
    m.set(One, 0xFB, "STI", CpuContext::op_flag);
    m.set(One, 0xFC, "CLD", CpuContext::op_flag);
    m.set(One, 0xFD, "STD", CpuContext::op_flag);
    m.set(One, 0xFE, "GRP4", CpuContext::op_grp4);
    m.set(One, 0xFF, "GRP5", CpuContext::op_grp5);
}

fn install_two_byte(m: &mut OpMaps, f: MapFeatures) {
    use Map::TwoByte as Two;

    if f.gen >= Generation::I286 {
        m.set(Two, 0x01, "GRP7", CpuContext::op_grp7);
        m.set(Two, 0x06, "CLTS", CpuContext::op_clts);
    }
    if f.gen >= Generation::I386 {
        m.set(Two, 0x20, "MOV", CpuContext::op_mov_from_cr);
        m.set(Two, 0x22, "MOV", CpuContext::op_mov_to_cr);
        for (cc, mnemonic) in JCC_MNEMONICS.iter().enumerate() {
            m.set(Two, 0x80 + cc as u8, *mnemonic, CpuContext::op_jcc_near);
        }
        m.set_list(Two, &[(0xA0, "PUSH"), (0xA8, "PUSH")], CpuContext::op_push_sreg);
        m.set_list(Two, &[(0xA1, "POP"), (0xA9, "POP")], CpuContext::op_pop_sreg);
        m.set_list(Two, &[(0xB6, "MOVZX"), (0xB7, "MOVZX")], CpuContext::op_movx);
        m.set_list(Two, &[(0xBE, "MOVSX"), (0xBF, "MOVSX")], CpuContext::op_movx);
    }
    if f.gen >= Generation::I486 {
        m.set(Two, 0x08, "INVD", CpuContext::op_invd);
        m.set(Two, 0x09, "WBINVD", CpuContext::op_invd);
        m.set(Two, 0xA2, "CPUID", CpuContext::op_cpuid);
    }
    if f.gen >= Generation::Pentium {
        m.set(Two, 0x30, "WRMSR", CpuContext::op_wrmsr);
        m.set(Two, 0x31, "RDTSC", CpuContext::op_rdtsc);
        m.set(Two, 0x32, "RDMSR", CpuContext::op_rdmsr);
    }
    if f.cmov {
        for (cc, mnemonic) in CMOV_MNEMONICS.iter().enumerate() {
            m.set(Two, 0x40 + cc as u8, *mnemonic, CpuContext::op_cmov);
        }
    }
    if f.mmx {
        install_mmx(m);
    }
    if f.sse {
        install_sse(m);
    }
}

fn install_mmx(m: &mut OpMaps) {
    use Map::TwoByte as Two;

    m.set(Two, 0x6E, "MOVD", CpuContext::op_movd_load);
    m.set(Two, 0x7E, "MOVD", CpuContext::op_movd_store);
    m.set(Two, 0x6F, "MOVQ", CpuContext::op_movq_load);
    m.set(Two, 0x7F, "MOVQ", CpuContext::op_movq_store);
    m.set(Two, 0x77, "EMMS", CpuContext::op_emms);
    m.set_list(
        Two,
        &[
            (0xFC, "PADDB"),
            (0xFD, "PADDW"),
            (0xFE, "PADDD"),
            (0xEC, "PADDSB"),
            (0xED, "PADDSW"),
            (0xDC, "PADDUSB"),
            (0xDD, "PADDUSW"),
            (0xF8, "PSUBB"),
            (0xF9, "PSUBW"),
            (0xFA, "PSUBD"),
            (0xE8, "PSUBSB"),
            (0xE9, "PSUBSW"),
            (0xD8, "PSUBUSB"),
            (0xD9, "PSUBUSW"),
            (0xD5, "PMULLW"),
            (0xE5, "PMULHW"),
            (0xF5, "PMADDWD"),
            (0xDB, "PAND"),
            (0xDF, "PANDN"),
            (0xEB, "POR"),
            (0xEF, "PXOR"),
            (0x74, "PCMPEQB"),
            (0x75, "PCMPEQW"),
            (0x76, "PCMPEQD"),
            (0x64, "PCMPGTB"),
            (0x65, "PCMPGTW"),
            (0x66, "PCMPGTD"),
        ],
        CpuContext::op_mmx_arith,
    );
}

fn install_sse(m: &mut OpMaps) {
    use Map::TwoByte as Two;

    m.set_list(
        Two,
        &[
            (0xE0, "PAVGB"),
            (0xE3, "PAVGW"),
            (0xDA, "PMINUB"),
            (0xDE, "PMAXUB"),
            (0xEA, "PMINSW"),
            (0xEE, "PMAXSW"),
            (0xE4, "PMULHUW"),
            (0xF6, "PSADBW"),
        ],
        CpuContext::op_simd_shared,
    );
    m.set(Two, 0xC4, "PINSRW", CpuContext::op_pinsrw);
    m.set(Two, 0xC5, "PEXTRW", CpuContext::op_pextrw);

    m.set(Two, 0x10, "MOVUPS", CpuContext::op_movps_load);
    m.set(Two, 0x11, "MOVUPS", CpuContext::op_movps_store);
    m.set(Two, 0x28, "MOVAPS", CpuContext::op_movps_load);
    m.set(Two, 0x29, "MOVAPS", CpuContext::op_movps_store);
    m.set_list(
        Two,
        &[(0x58, "ADDPS"), (0x59, "MULPS"), (0x5C, "SUBPS"), (0x5E, "DIVPS")],
        CpuContext::op_sse_arith,
    );
    m.set_list(Two, &[(0x54, "ANDPS"), (0x56, "ORPS"), (0x57, "XORPS")], CpuContext::op_sse_logic);
    m.set(Two, 0xC2, "CMPPS", CpuContext::op_cmpps);
}

fn build_maps(f: MapFeatures) -> OpMaps {
    let mut maps = OpMaps::new();
    install_base(&mut maps, f.gen);
    install_two_byte(&mut maps, f);
    log::trace!("Built opcode maps for {:?}: {} defined slots", f, maps.defined_count());
    maps
}

lazy_static! {
    static ref MAPS_8088: OpMaps = build_maps(MapFeatures::new(Generation::I8088));
    static ref MAPS_286: OpMaps = build_maps(MapFeatures::new(Generation::I286));
    static ref MAPS_386: OpMaps = build_maps(MapFeatures::new(Generation::I386));
    static ref MAPS_486: OpMaps = build_maps(MapFeatures::new(Generation::I486));
    static ref MAPS_PENTIUM: OpMaps = build_maps(MapFeatures::new(Generation::Pentium));
    static ref MAPS_PENTIUM_MMX: OpMaps = build_maps(MapFeatures::new(Generation::Pentium).mmx());
    static ref MAPS_6X86MX: OpMaps = build_maps(MapFeatures::new(Generation::Pentium).mmx().cmov());
    static ref MAPS_PPRO: OpMaps = build_maps(MapFeatures::new(Generation::Pentium).cmov());
    static ref MAPS_P2: OpMaps = build_maps(MapFeatures::new(Generation::Pentium).mmx().cmov().sse());
}

#[enum_dispatch]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpcodeTableDispatch {
    Table8088,
    Table286,
    Table386,
    Table486,
    TableWinChip,
    TablePentium,
    TablePentiumMmx,
    Table6x86Mx,
    TablePentiumPro,
    TablePentium2,
}

/// A generation's instruction maps.
#[enum_dispatch(OpcodeTableDispatch)]
pub trait OpcodeTable {
    fn name(&self) -> &'static str;
    fn maps(&self) -> &'static OpMaps;
}

macro_rules! opcode_table {
    ($table:ident, $name:expr, $maps:ident) => {
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
        pub struct $table;

        impl OpcodeTable for $table {
            fn name(&self) -> &'static str {
                $name
            }
            fn maps(&self) -> &'static OpMaps {
                &*$maps
            }
        }
    };
}

opcode_table!(Table8088, "8088", MAPS_8088);
opcode_table!(Table286, "80286", MAPS_286);
opcode_table!(Table386, "80386", MAPS_386);
opcode_table!(Table486, "80486", MAPS_486);
opcode_table!(TableWinChip, "WinChip", MAPS_PENTIUM_MMX);
opcode_table!(TablePentium, "Pentium", MAPS_PENTIUM);
opcode_table!(TablePentiumMmx, "Pentium MMX", MAPS_PENTIUM_MMX);
opcode_table!(Table6x86Mx, "6x86MX", MAPS_6X86MX);
opcode_table!(TablePentiumPro, "Pentium Pro", MAPS_PPRO);
opcode_table!(TablePentium2, "Pentium II", MAPS_P2);

/// Select the instruction maps for a processor type.
pub fn table_for(cpu_type: CpuType) -> OpcodeTableDispatch {
    match cpu_type {
        CpuType::Intel8088 | CpuType::Intel8086 => Table8088.into(),
        CpuType::Intel286 => Table286.into(),
        CpuType::Intel386SX | CpuType::Intel386DX | CpuType::RapidCad => Table386.into(),
        CpuType::Cx486SLC
        | CpuType::Cx486DLC
        | CpuType::Intel486SX
        | CpuType::Am486SX
        | CpuType::Cx486S
        | CpuType::Intel486DX
        | CpuType::Am486DX
        | CpuType::Cx486DX
        | CpuType::IntelDX4
        | CpuType::Cx5x86 => Table486.into(),
        CpuType::WinChip => TableWinChip.into(),
        CpuType::Pentium | CpuType::Cx6x86 | CpuType::Cx6x86L | CpuType::CxGX1 => TablePentium.into(),
        CpuType::PentiumMmx | CpuType::AmdK5 | CpuType::Amd5k86 | CpuType::AmdK6 => TablePentiumMmx.into(),
        CpuType::Cx6x86MX => Table6x86Mx.into(),
        CpuType::PentiumPro => TablePentiumPro.into(),
        CpuType::Pentium2OverDrive => TablePentium2.into(),
    }
}

impl CpuContext {
    /// The #UD handler for undefined encodings.
    pub(crate) fn op_invalid(&mut self) -> Result<(), CpuFault> {
        log::trace!(
            "Invalid opcode {}{:02X} at {:04X}:{:04X}",
            if self.i.two_byte { "0F " } else { "" },
            self.i.opcode,
            self.regs.seg(Segment::CS).selector,
            self.i.start_eip
        );
        Err(CpuFault::ud(self.i.opcode))
    }

    /// The 0F escape. Fetches the second opcode byte and dispatches through the two-byte map.
    pub(crate) fn op_two_byte(&mut self) -> Result<(), CpuFault> {
        let opcode = self.fetch_u8()?;
        self.i.opcode = opcode;
        self.i.two_byte = true;
        let entry = *self.opcode_table.maps().two_byte(self.i.op32, opcode);
        self.i.mnemonic = entry.mnemonic;
        (entry.handler)(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_feature_slots_follow_type() {
        use CpuType::*;
        for cpu_type in CpuType::iter() {
            let table = table_for(cpu_type);
            let maps = table.maps();
            let installed = |opcode: u8, handler: OpHandler| {
                let entry = maps.two_byte(false, opcode);
                entry.mnemonic != OpEntry::INVALID.mnemonic && entry.handler as usize == handler as usize
            };
            let cmov = matches!(cpu_type, Cx6x86MX | PentiumPro | Pentium2OverDrive);
            let mmx = matches!(
                cpu_type,
                WinChip | PentiumMmx | AmdK5 | Amd5k86 | AmdK6 | Cx6x86MX | Pentium2OverDrive
            );
            let sse = cpu_type == Pentium2OverDrive;
            assert_eq!(installed(0x44, CpuContext::op_cmov), cmov, "{} CMOVZ", cpu_type);
            assert_eq!(installed(0x6E, CpuContext::op_movd_load), mmx, "{} MOVD", cpu_type);
            assert_eq!(installed(0x58, CpuContext::op_sse_arith), sse, "{} ADDPS", cpu_type);
            assert_eq!(
                maps.one_byte(false, 0x0F).handler as usize == CpuContext::op_two_byte as usize,
                !matches!(cpu_type, Intel8088 | Intel8086),
                "{} 0F escape",
                cpu_type
            );
        }
    }

    #[test]
    fn test_defined_counts() {
        assert_eq!(OpMaps::new().defined_count(), 0);
        // Nothing reaches the two-byte map on the 8088.
        let t8088 = table_for(CpuType::Intel8088).maps();
        assert!(t8088.two_byte.iter().all(|e| e.mnemonic == OpEntry::INVALID.mnemonic));

        // Each extension adds its opcodes for both operand sizes and nothing else.
        let count = |t: CpuType| table_for(t).maps().defined_count();
        let pentium = count(CpuType::Pentium);
        assert_eq!(count(CpuType::PentiumMmx) - pentium, 2 * 32);
        assert_eq!(count(CpuType::PentiumPro) - pentium, 2 * 16);
        assert_eq!(count(CpuType::Cx6x86MX) - pentium, 2 * (32 + 16));
        assert_eq!(count(CpuType::Pentium2OverDrive) - count(CpuType::Cx6x86MX), 2 * 22);
    }

    #[test]
    fn test_generations_differ() {
        let t8088 = table_for(CpuType::Intel8088);
        let t286 = table_for(CpuType::Intel286);
        // POP CS on the 8088, the two-byte escape on the 286.
        assert_eq!(t8088.maps().one_byte(false, 0x0F).mnemonic, "POP");
        assert_eq!(t286.maps().one_byte(false, 0x0F).mnemonic, "0F");
        assert_eq!(t8088.maps().one_byte(false, 0x64).mnemonic, "JZ");
        assert_eq!(t286.maps().one_byte(false, 0x64).mnemonic, "INVALID");

        let p2 = table_for(CpuType::Pentium2OverDrive);
        assert_eq!(p2.maps().two_byte(false, 0x58).mnemonic, "ADDPS");
        assert_eq!(p2.maps().two_byte(false, 0x44).mnemonic, "CMOVZ");
        let ppro = table_for(CpuType::PentiumPro);
        assert_eq!(ppro.maps().two_byte(false, 0xFC).mnemonic, "INVALID");
        assert_eq!(ppro.maps().two_byte(false, 0x44).mnemonic, "CMOVZ");
        let p5 = table_for(CpuType::Pentium);
        assert_eq!(p5.maps().two_byte(false, 0x31).mnemonic, "RDTSC");
        assert_eq!(p5.maps().two_byte(false, 0x44).mnemonic, "INVALID");
    }

    #[test]
    fn test_operand_size_mnemonics() {
        let maps = table_for(CpuType::Intel386DX).maps();
        assert_eq!(maps.one_byte(false, 0x98).mnemonic, "CBW");
        assert_eq!(maps.one_byte(true, 0x98).mnemonic, "CWDE");
        assert_eq!(maps.two_byte(true, 0xB6).mnemonic, "MOVZX");
    }

    #[test]
    fn test_defined_counts_grow() {
        let count = |t: CpuType| table_for(t).maps().defined_count();
        assert!(count(CpuType::Intel386DX) > count(CpuType::Intel286));
        assert!(count(CpuType::Intel486DX) > count(CpuType::Intel386DX));
        assert!(count(CpuType::Pentium2OverDrive) > count(CpuType::Cx6x86MX));
    }
}
