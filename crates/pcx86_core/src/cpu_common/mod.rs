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

    cpu_common::mod.rs

    Implements common types shared by every emulated processor model.

*/

#![allow(dead_code)]

pub mod alu;
pub mod builder;
pub mod error;
pub mod features;
pub mod models;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer};
use strum_macros::EnumIter;

pub use error::{CpuError, CpuFault, FaultDetail};

// Instruction prefixes
pub const OPCODE_PREFIX_OPERAND_SIZE: u32 = 0b_0000_0000_0001;
pub const OPCODE_PREFIX_ADDRESS_SIZE: u32 = 0b_0000_0000_0010;
pub const OPCODE_PREFIX_SEG_OVERRIDE: u32 = 0b_0000_0000_0100;
pub const OPCODE_PREFIX_LOCK: u32 = 0b_0000_1000_0000;
pub const OPCODE_PREFIX_REPNE: u32 = 0b_0001_0000_0000;
pub const OPCODE_PREFIX_REPE: u32 = 0b_0010_0000_0000;
pub const OPCODE_PREFIX_REPMASK: u32 = 0b_0011_0000_0000;

/// Charge a number of cycles to the instruction being executed. Every timing cost in the core
/// goes through this macro so that the cycle counter and the TSC stay in step.
#[macro_export]
macro_rules! cycles {
    ($self:ident, $n:expr) => {{
        $self.charge_cycles($n)
    }};
}

/// The processor types known to the core. The declaration order is significant: capability
/// flags are derived from ranges of this enum, so new types must be inserted where the
/// original generation ordering places them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default, EnumIter)]
pub enum CpuType {
    #[default]
    Intel8088,
    Intel8086,
    Intel286,
    Intel386SX,
    Intel386DX,
    RapidCad,
    Cx486SLC,
    Cx486DLC,
    Intel486SX,
    Am486SX,
    Cx486S,
    Intel486DX,
    Am486DX,
    Cx486DX,
    IntelDX4,
    Cx5x86,
    WinChip,
    Pentium,
    PentiumMmx,
    Cx6x86,
    Cx6x86MX,
    Cx6x86L,
    CxGX1,
    AmdK5,
    Amd5k86,
    AmdK6,
    PentiumPro,
    Pentium2OverDrive,
}

impl CpuType {
    const NAMES: [(&'static str, CpuType); 28] = [
        ("intel8088", CpuType::Intel8088),
        ("intel8086", CpuType::Intel8086),
        ("intel286", CpuType::Intel286),
        ("intel386sx", CpuType::Intel386SX),
        ("intel386dx", CpuType::Intel386DX),
        ("rapidcad", CpuType::RapidCad),
        ("cx486slc", CpuType::Cx486SLC),
        ("cx486dlc", CpuType::Cx486DLC),
        ("intel486sx", CpuType::Intel486SX),
        ("am486sx", CpuType::Am486SX),
        ("cx486s", CpuType::Cx486S),
        ("intel486dx", CpuType::Intel486DX),
        ("am486dx", CpuType::Am486DX),
        ("cx486dx", CpuType::Cx486DX),
        ("inteldx4", CpuType::IntelDX4),
        ("cx5x86", CpuType::Cx5x86),
        ("winchip", CpuType::WinChip),
        ("pentium", CpuType::Pentium),
        ("pentiummmx", CpuType::PentiumMmx),
        ("cx6x86", CpuType::Cx6x86),
        ("cx6x86mx", CpuType::Cx6x86MX),
        ("cx6x86l", CpuType::Cx6x86L),
        ("cxgx1", CpuType::CxGX1),
        ("amdk5", CpuType::AmdK5),
        ("amd5k86", CpuType::Amd5k86),
        ("amdk6", CpuType::AmdK6),
        ("pentiumpro", CpuType::PentiumPro),
        ("pentium2overdrive", CpuType::Pentium2OverDrive),
    ];

    fn from_name(name: &str) -> Option<CpuType> {
        let name = name.to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name.as_str())
            .map(|(_, t)| *t)
    }

    /// Return the model-specific strategy family for this processor type.
    pub fn family(&self) -> CpuFamily {
        match self {
            CpuType::WinChip => CpuFamily::WinChip,
            CpuType::AmdK5 | CpuType::Amd5k86 | CpuType::AmdK6 => CpuFamily::AmdK,
            CpuType::Pentium | CpuType::PentiumMmx => CpuFamily::Pentium,
            CpuType::Cx6x86 | CpuType::Cx6x86MX | CpuType::Cx6x86L | CpuType::CxGX1 => CpuFamily::Cyrix6x86,
            CpuType::PentiumPro | CpuType::Pentium2OverDrive => CpuFamily::P6,
            _ => CpuFamily::Legacy,
        }
    }

    pub fn is_cyrix(&self) -> bool {
        matches!(
            self,
            CpuType::Cx486SLC
                | CpuType::Cx486DLC
                | CpuType::Cx486S
                | CpuType::Cx486DX
                | CpuType::Cx5x86
                | CpuType::Cx6x86
                | CpuType::Cx6x86MX
                | CpuType::Cx6x86L
                | CpuType::CxGX1
        )
    }

    /// True for CPUs with a 16-bit external data bus.
    pub fn has_16bit_bus(&self) -> bool {
        matches!(self, CpuType::Intel286 | CpuType::Intel386SX | CpuType::Cx486SLC)
    }

    /// True for CPUs that can be paired with an external coprocessor in a socket.
    pub fn accepts_external_fpu(&self) -> bool {
        matches!(
            self,
            CpuType::Intel286 | CpuType::Intel386SX | CpuType::Intel386DX | CpuType::Intel486SX
        )
    }
}

impl fmt::Display for CpuType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = Self::NAMES
            .iter()
            .find(|(_, t)| t == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown");
        write!(f, "{}", name)
    }
}

impl<'de> Deserialize<'de> for CpuType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CpuTypeVisitor;

        impl<'de> serde::de::Visitor<'de> for CpuTypeVisitor {
            type Value = CpuType;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a CPU type string like 'Intel486DX', 'Cx6x86MX'")
            }

            fn visit_str<E>(self, value: &str) -> Result<CpuType, E>
            where
                E: serde::de::Error,
            {
                CpuType::from_name(value).ok_or_else(|| E::custom(format!("unknown CpuType '{}'", value)))
            }
        }

        deserializer.deserialize_any(CpuTypeVisitor)
    }
}

impl FromStr for CpuType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        CpuType::from_name(s).ok_or_else(|| "Bad value for cputype".to_string())
    }
}

/// Processor vendors. The discriminant is the manufacturer index used for model selection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, EnumIter)]
pub enum Manufacturer {
    #[default]
    Intel,
    Amd,
    Cyrix,
    Idt,
}

impl Manufacturer {
    pub fn from_index(idx: usize) -> Option<Manufacturer> {
        match idx {
            0 => Some(Manufacturer::Intel),
            1 => Some(Manufacturer::Amd),
            2 => Some(Manufacturer::Cyrix),
            3 => Some(Manufacturer::Idt),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Manufacturer::Intel => write!(f, "Intel"),
            Manufacturer::Amd => write!(f, "AMD"),
            Manufacturer::Cyrix => write!(f, "Cyrix"),
            Manufacturer::Idt => write!(f, "IDT"),
        }
    }
}

impl<'de> Deserialize<'de> for Manufacturer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ManufacturerVisitor;

        impl<'de> serde::de::Visitor<'de> for ManufacturerVisitor {
            type Value = Manufacturer;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a manufacturer name like 'Intel', 'AMD', 'Cyrix' or 'IDT'")
            }

            fn visit_str<E>(self, value: &str) -> Result<Manufacturer, E>
            where
                E: serde::de::Error,
            {
                value
                    .parse::<Manufacturer>()
                    .map_err(|_| E::custom(format!("unknown Manufacturer '{}'", value)))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Manufacturer, E>
            where
                E: serde::de::Error,
            {
                Manufacturer::from_index(value as usize)
                    .ok_or_else(|| E::custom(format!("manufacturer index {} out of range", value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Manufacturer, E>
            where
                E: serde::de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("manufacturer index {} out of range", value)));
                }
                self.visit_u64(value as u64)
            }
        }

        deserializer.deserialize_any(ManufacturerVisitor)
    }
}

impl FromStr for Manufacturer {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "intel" => Ok(Manufacturer::Intel),
            "amd" => Ok(Manufacturer::Amd),
            "cyrix" => Ok(Manufacturer::Cyrix),
            "idt" | "centaur" => Ok(Manufacturer::Idt),
            _ => Err("Bad value for manufacturer".to_string()),
        }
    }
}

/// Selects the CPUID/MSR strategy used for a processor type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CpuFamily {
    Legacy,
    WinChip,
    AmdK,
    Pentium,
    Cyrix6x86,
    P6,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Segment {
    ES,
    #[default]
    CS,
    SS,
    DS,
    FS,
    GS,
}

impl Segment {
    pub fn from_sreg(idx: u8) -> Option<Segment> {
        match idx & 0x07 {
            0 => Some(Segment::ES),
            1 => Some(Segment::CS),
            2 => Some(Segment::SS),
            3 => Some(Segment::DS),
            4 => Some(Segment::FS),
            5 => Some(Segment::GS),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Register8 {
    AL,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
}

impl Register8 {
    pub fn from_modrm(idx: u8) -> Register8 {
        match idx & 0x07 {
            0 => Register8::AL,
            1 => Register8::CL,
            2 => Register8::DL,
            3 => Register8::BL,
            4 => Register8::AH,
            5 => Register8::CH,
            6 => Register8::DH,
            _ => Register8::BH,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Register32 {
    EAX,
    ECX,
    EDX,
    EBX,
    ESP,
    EBP,
    ESI,
    EDI,
}

impl Register32 {
    pub fn from_modrm(idx: u8) -> Register32 {
        match idx & 0x07 {
            0 => Register32::EAX,
            1 => Register32::ECX,
            2 => Register32::EDX,
            3 => Register32::EBX,
            4 => Register32::ESP,
            5 => Register32::EBP,
            6 => Register32::ESI,
            _ => Register32::EDI,
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Default)]
pub enum TraceMode {
    #[default]
    None,
    Instruction,
}

impl FromStr for TraceMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "none" => Ok(TraceMode::None),
            "instruction" => Ok(TraceMode::Instruction),
            _ => Err("Bad value for tracemode".to_string()),
        }
    }
}

/// Architectural exceptions the core can raise.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CpuException {
    DivideError,
    InvalidOpcode,
    DeviceNotAvailable,
    StackFault,
    GeneralProtection,
    PageFault,
    FloatingPointError,
    SimdFloatingPoint,
}

impl CpuException {
    pub fn vector(&self) -> u8 {
        match self {
            CpuException::DivideError => 0,
            CpuException::InvalidOpcode => 6,
            CpuException::DeviceNotAvailable => 7,
            CpuException::StackFault => 12,
            CpuException::GeneralProtection => 13,
            CpuException::PageFault => 14,
            CpuException::FloatingPointError => 16,
            CpuException::SimdFloatingPoint => 19,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            CpuException::DivideError => "#DE",
            CpuException::InvalidOpcode => "#UD",
            CpuException::DeviceNotAvailable => "#NM",
            CpuException::StackFault => "#SS",
            CpuException::GeneralProtection => "#GP",
            CpuException::PageFault => "#PF",
            CpuException::FloatingPointError => "#MF",
            CpuException::SimdFloatingPoint => "#XM",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum StepResult {
    Normal,
    /// The CPU executed HLT, or is halted.
    Halt,
    /// The instruction raised an exception. It was delivered through the IVT in real mode,
    /// or left pending for the outer loop in protected mode.
    Exception(CpuFault),
}

pub fn calc_linear_address(segment: u16, offset: u16) -> u32 {
    ((segment as u32) << 4) + offset as u32
}

pub fn format_instruction_bytes(bytes: &[u8]) -> String {
    let mut s = String::new();
    for b in bytes {
        s.push_str(&format!("{:02X} ", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_cputype_ordering() {
        assert!(CpuType::Intel286 < CpuType::Intel386SX);
        assert!(CpuType::Cx486S < CpuType::Intel486DX);
        assert!(CpuType::WinChip < CpuType::Pentium);
        assert!(CpuType::Cx6x86 <= CpuType::CxGX1);
        assert!(CpuType::AmdK6 < CpuType::PentiumPro);
    }

    #[test]
    fn test_cputype_names_roundtrip() {
        for cpu_type in CpuType::iter() {
            let name = cpu_type.to_string();
            assert_eq!(name.parse::<CpuType>(), Ok(cpu_type));
        }
        assert!("Pentium4".parse::<CpuType>().is_err());
    }

    #[test]
    fn test_cputype_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            cpu: CpuType,
        }
        let w: Wrapper = toml::from_str("cpu = 'Cx6x86MX'").unwrap();
        assert_eq!(w.cpu, CpuType::Cx6x86MX);

        let bad: Result<Wrapper, _> = toml::from_str("cpu = 'Z80'");
        let err = bad.err().unwrap().to_string();
        assert!(err.contains("unknown CpuType 'Z80'"));
    }

    #[test]
    fn test_manufacturer_parse() {
        assert_eq!("AMD".parse::<Manufacturer>(), Ok(Manufacturer::Amd));
        assert_eq!("centaur".parse::<Manufacturer>(), Ok(Manufacturer::Idt));
        assert_eq!(Manufacturer::from_index(2), Some(Manufacturer::Cyrix));
        assert_eq!(Manufacturer::from_index(9), None);
    }

    #[test]
    fn test_family_mapping() {
        assert_eq!(CpuType::Amd5k86.family(), CpuFamily::AmdK);
        assert_eq!(CpuType::CxGX1.family(), CpuFamily::Cyrix6x86);
        assert_eq!(CpuType::Pentium2OverDrive.family(), CpuFamily::P6);
        assert_eq!(CpuType::Cx5x86.family(), CpuFamily::Legacy);
    }

    #[test]
    fn test_exception_vectors() {
        assert_eq!(CpuException::GeneralProtection.vector(), 13);
        assert_eq!(CpuException::InvalidOpcode.vector(), 6);
        assert_eq!(CpuException::SimdFloatingPoint.vector(), 19);
    }
}
