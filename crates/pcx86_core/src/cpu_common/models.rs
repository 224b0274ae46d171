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

    cpu_common::models.rs

    The static processor model table. Models are grouped by manufacturer and selected with a
    (manufacturer index, model index) pair, or by name.

*/

use crate::cpu_common::{CpuError, CpuType, Manufacturer};
use fxhash::FxHashMap;
use lazy_static::lazy_static;
use strum::IntoEnumIterator;

/// An immutable description of one selectable processor model.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CpuModelDescriptor {
    pub name: &'static str,
    pub cpu_type: CpuType,
    /// Rated core clock in Hz.
    pub rspeed: u32,
    /// Core clock multiplier over the external bus.
    pub multi: f64,
    /// PCI clock in Hz, for models that sit on a PCI board.
    pub pci_speed: Option<u32>,
    /// EDX contents after reset (the processor signature).
    pub edx_reset: u32,
    /// CPUID signature. Zero if the model has no CPUID instruction.
    pub cpuid_model: u32,
    /// Cyrix DIR0/DIR1 device id.
    pub cyrix_id: u16,
    pub mem_read_cycles: u32,
    pub mem_write_cycles: u32,
    pub cache_read_cycles: u32,
    pub cache_write_cycles: u32,
    pub atclk_div: u32,
}

impl CpuModelDescriptor {
    /// External bus clock in Hz.
    pub fn busspeed(&self) -> u32 {
        (self.rspeed as f64 / self.multi) as u32
    }

    const fn with_pci(mut self, pci_speed: u32) -> Self {
        self.pci_speed = Some(pci_speed);
        self
    }
}

#[allow(clippy::too_many_arguments)]
const fn model(
    name: &'static str,
    cpu_type: CpuType,
    rspeed: u32,
    multi: f64,
    edx_reset: u32,
    cpuid_model: u32,
    cyrix_id: u16,
    cycles: [u32; 4],
    atclk_div: u32,
) -> CpuModelDescriptor {
    CpuModelDescriptor {
        name,
        cpu_type,
        rspeed,
        multi,
        pci_speed: None,
        edx_reset,
        cpuid_model,
        cyrix_id,
        mem_read_cycles: cycles[0],
        mem_write_cycles: cycles[1],
        cache_read_cycles: cycles[2],
        cache_write_cycles: cycles[3],
        atclk_div,
    }
}

const PCI_25: u32 = 25_000_000;
const PCI_27: u32 = 27_500_000;
const PCI_30: u32 = 30_000_000;
const PCI_33: u32 = 33_333_333;
const PCI_37: u32 = 37_500_000;
const PCI_41: u32 = 41_666_666;

use CpuType::*;

#[rustfmt::skip]
pub static INTEL_MODELS: &[CpuModelDescriptor] = &[
    model("8088/4.77",           Intel8088,   4_772_728, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8088/7.16",           Intel8088,   7_159_092, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8088/8",              Intel8088,   8_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8088/10",             Intel8088,  10_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8088/12",             Intel8088,  12_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8088/16",             Intel8088,  16_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8086/7.16",           Intel8086,   7_159_092, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8086/8",              Intel8086,   8_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8086/10",             Intel8086,  10_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8086/12",             Intel8086,  12_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 1),
    model("8086/16",             Intel8086,  16_000_000, 1.0, 0, 0, 0, [0, 0, 0, 0], 2),
    model("286/6",               Intel286,    6_000_000, 1.0, 0, 0, 0, [2, 2, 2, 2], 1),
    model("286/8",               Intel286,    8_000_000, 1.0, 0, 0, 0, [2, 2, 2, 2], 1),
    model("286/10",              Intel286,   10_000_000, 1.0, 0, 0, 0, [2, 2, 2, 2], 1),
    model("286/12",              Intel286,   12_500_000, 1.0, 0, 0, 0, [3, 3, 3, 3], 2),
    model("286/16",              Intel286,   16_000_000, 1.0, 0, 0, 0, [3, 3, 3, 3], 2),
    model("286/20",              Intel286,   20_000_000, 1.0, 0, 0, 0, [4, 4, 4, 4], 3),
    model("286/25",              Intel286,   25_000_000, 1.0, 0, 0, 0, [4, 4, 4, 4], 3),
    model("i386SX/16",           Intel386SX, 16_000_000, 1.0, 0x2308, 0, 0, [3, 3, 3, 3], 2),
    model("i386SX/20",           Intel386SX, 20_000_000, 1.0, 0x2308, 0, 0, [4, 4, 3, 3], 3),
    model("i386SX/25",           Intel386SX, 25_000_000, 1.0, 0x2308, 0, 0, [4, 4, 3, 3], 3),
    model("i386SX/33",           Intel386SX, 33_333_333, 1.0, 0x2308, 0, 0, [6, 6, 3, 3], 4),
    model("i386SX/40",           Intel386SX, 40_000_000, 1.0, 0x2308, 0, 0, [7, 7, 3, 3], 5),
    model("i386DX/16",           Intel386DX, 16_000_000, 1.0, 0x0308, 0, 0, [3, 3, 3, 3], 2),
    model("i386DX/20",           Intel386DX, 20_000_000, 1.0, 0x0308, 0, 0, [4, 4, 3, 3], 3),
    model("i386DX/25",           Intel386DX, 25_000_000, 1.0, 0x0308, 0, 0, [4, 4, 3, 3], 3),
    model("i386DX/33",           Intel386DX, 33_333_333, 1.0, 0x0308, 0, 0, [6, 6, 3, 3], 4),
    model("i386DX/40",           Intel386DX, 40_000_000, 1.0, 0x0308, 0, 0, [7, 7, 3, 3], 5),
    model("RapidCAD/25",         RapidCad,   25_000_000, 1.0, 0x0340, 0, 0, [4, 4, 3, 3], 3),
    model("RapidCAD/33",         RapidCad,   33_333_333, 1.0, 0x0340, 0, 0, [6, 6, 3, 3], 4),
    model("RapidCAD/40",         RapidCad,   40_000_000, 1.0, 0x0340, 0, 0, [7, 7, 3, 3], 5),
    model("i486SX/16",           Intel486SX, 16_000_000, 1.0, 0x420, 0, 0, [3, 3, 3, 3], 2),
    model("i486SX/20",           Intel486SX, 20_000_000, 1.0, 0x420, 0, 0, [4, 4, 3, 3], 3),
    model("i486SX/25",           Intel486SX, 25_000_000, 1.0, 0x422, 0, 0, [4, 4, 3, 3], 3),
    model("i486SX/33",           Intel486SX, 33_333_333, 1.0, 0x42a, 0, 0, [6, 6, 3, 3], 4),
    model("i486SX2/50",          Intel486SX, 50_000_000, 2.0, 0x45b, 0, 0, [8, 8, 6, 6], 6),
    model("i486DX/25",           Intel486DX, 25_000_000, 1.0, 0x404, 0, 0, [4, 4, 3, 3], 3),
    model("i486DX/33",           Intel486DX, 33_333_333, 1.0, 0x414, 0, 0, [6, 6, 3, 3], 4),
    model("i486DX/50",           Intel486DX, 50_000_000, 1.0, 0x411, 0, 0, [8, 8, 4, 4], 6),
    model("i486DX2/40",          Intel486DX, 40_000_000, 2.0, 0x430, 0x430, 0, [7, 7, 6, 6], 5),
    model("i486DX2/50",          Intel486DX, 50_000_000, 2.0, 0x433, 0x433, 0, [8, 8, 6, 6], 6),
    model("i486DX2/66",          Intel486DX, 66_666_666, 2.0, 0x435, 0x435, 0, [12, 12, 6, 6], 8),
    model("iDX4/75",             IntelDX4,   75_000_000, 3.0, 0x480, 0x480, 0, [12, 12, 9, 9], 9),
    model("iDX4/100",            IntelDX4,  100_000_000, 3.0, 0x483, 0x483, 0, [18, 18, 9, 9], 12),
    model("Pentium 60",          Pentium,    60_000_000, 1.0, 0x517, 0x517, 0, [6, 6, 3, 3], 7).with_pci(PCI_30),
    model("Pentium 66",          Pentium,    66_666_666, 1.0, 0x517, 0x517, 0, [6, 6, 3, 3], 8).with_pci(PCI_33),
    model("Pentium 75",          Pentium,    75_000_000, 1.5, 0x524, 0x524, 0, [7, 7, 4, 4], 9).with_pci(PCI_25),
    model("Pentium 90",          Pentium,    90_000_000, 1.5, 0x524, 0x524, 0, [9, 9, 4, 4], 10).with_pci(PCI_30),
    model("Pentium 100/66",      Pentium,   100_000_000, 1.5, 0x526, 0x526, 0, [9, 9, 4, 4], 12).with_pci(PCI_33),
    model("Pentium 120",         Pentium,   120_000_000, 2.0, 0x526, 0x526, 0, [12, 12, 6, 6], 14).with_pci(PCI_30),
    model("Pentium 133",         Pentium,   133_333_333, 2.0, 0x52c, 0x52c, 0, [12, 12, 6, 6], 16).with_pci(PCI_33),
    model("Pentium 150",         Pentium,   150_000_000, 2.5, 0x52c, 0x52c, 0, [15, 15, 7, 7], 17).with_pci(PCI_30),
    model("Pentium 166",         Pentium,   166_666_666, 2.5, 0x52c, 0x52c, 0, [15, 15, 7, 7], 20).with_pci(PCI_33),
    model("Pentium 200",         Pentium,   200_000_000, 3.0, 0x52c, 0x52c, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("Pentium OverDrive MMX 75",  PentiumMmx,  75_000_000, 1.5, 0x1542, 0x1542, 0, [7, 7, 4, 4], 9).with_pci(PCI_25),
    model("Pentium OverDrive MMX 200", PentiumMmx, 200_000_000, 3.0, 0x1542, 0x1542, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("Pentium MMX 166",     PentiumMmx, 166_666_666, 2.5, 0x543, 0x543, 0, [15, 15, 7, 7], 20).with_pci(PCI_33),
    model("Pentium MMX 200",     PentiumMmx, 200_000_000, 3.0, 0x543, 0x543, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("Pentium MMX 233",     PentiumMmx, 233_333_333, 3.5, 0x543, 0x543, 0, [21, 21, 10, 10], 28).with_pci(PCI_33),
    model("Pentium Pro 150",     PentiumPro, 150_000_000, 2.5, 0x612, 0x612, 0, [15, 15, 7, 7], 17).with_pci(PCI_30),
    model("Pentium Pro 166",     PentiumPro, 166_666_666, 2.5, 0x617, 0x617, 0, [15, 15, 7, 7], 20).with_pci(PCI_33),
    model("Pentium Pro 180",     PentiumPro, 180_000_000, 3.0, 0x617, 0x617, 0, [18, 18, 9, 9], 21).with_pci(PCI_30),
    model("Pentium Pro 200",     PentiumPro, 200_000_000, 3.0, 0x617, 0x617, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("Pentium II OverDrive 233",    Pentium2OverDrive, 233_333_333, 3.5, 0x1632, 0x1632, 0, [21, 21, 10, 10], 28).with_pci(PCI_33),
    model("Pentium II OverDrive 266",    Pentium2OverDrive, 266_666_666, 4.0, 0x1632, 0x1632, 0, [24, 24, 12, 12], 32).with_pci(PCI_33),
    model("Pentium II OverDrive 300/66", Pentium2OverDrive, 300_000_000, 4.5, 0x1632, 0x1632, 0, [25, 25, 12, 12], 36).with_pci(PCI_33),
    model("Pentium II OverDrive 333",    Pentium2OverDrive, 333_333_333, 5.0, 0x1632, 0x1632, 0, [27, 27, 13, 13], 40).with_pci(PCI_33),
];

#[rustfmt::skip]
pub static AMD_MODELS: &[CpuModelDescriptor] = &[
    model("Am386SX/16",          Intel386SX, 16_000_000, 1.0, 0x2308, 0, 0, [3, 3, 3, 3], 2),
    model("Am386SX/20",          Intel386SX, 20_000_000, 1.0, 0x2308, 0, 0, [4, 4, 3, 3], 3),
    model("Am386SX/25",          Intel386SX, 25_000_000, 1.0, 0x2308, 0, 0, [4, 4, 3, 3], 3),
    model("Am386SX/33",          Intel386SX, 33_333_333, 1.0, 0x2308, 0, 0, [6, 6, 3, 3], 4),
    model("Am386SX/40",          Intel386SX, 40_000_000, 1.0, 0x2308, 0, 0, [7, 7, 3, 3], 5),
    model("Am386DX/25",          Intel386DX, 25_000_000, 1.0, 0x0308, 0, 0, [4, 4, 3, 3], 3),
    model("Am386DX/33",          Intel386DX, 33_333_333, 1.0, 0x0308, 0, 0, [6, 6, 3, 3], 4),
    model("Am386DX/40",          Intel386DX, 40_000_000, 1.0, 0x0308, 0, 0, [7, 7, 3, 3], 5),
    model("Am486SX/33",          Am486SX,    33_333_333, 1.0, 0x42a, 0, 0, [6, 6, 3, 3], 4),
    model("Am486SX/40",          Am486SX,    40_000_000, 1.0, 0x42a, 0, 0, [7, 7, 3, 3], 5),
    model("Am486SX2/50",         Am486SX,    50_000_000, 2.0, 0x45b, 0x45b, 0, [8, 8, 6, 6], 6),
    model("Am486SX2/66",         Am486SX,    66_666_666, 2.0, 0x45b, 0x45b, 0, [12, 12, 6, 6], 8),
    model("Am486DX/33",          Am486DX,    33_333_333, 1.0, 0x430, 0, 0, [6, 6, 3, 3], 4),
    model("Am486DX/40",          Am486DX,    40_000_000, 1.0, 0x430, 0, 0, [7, 7, 3, 3], 5),
    model("Am486DX2/50",         Am486DX,    50_000_000, 2.0, 0x470, 0x470, 0, [8, 8, 6, 6], 6),
    model("Am486DX2/66",         Am486DX,    66_666_666, 2.0, 0x470, 0x470, 0, [12, 12, 6, 6], 8),
    model("Am486DX2/80",         Am486DX,    80_000_000, 2.0, 0x470, 0x470, 0, [14, 14, 6, 6], 10),
    model("Am486DX4/75",         Am486DX,    75_000_000, 3.0, 0x482, 0x482, 0, [12, 12, 9, 9], 9),
    model("Am486DX4/90",         Am486DX,    90_000_000, 3.0, 0x482, 0x482, 0, [15, 15, 9, 9], 12),
    model("Am486DX4/100",        Am486DX,   100_000_000, 3.0, 0x482, 0x482, 0, [15, 15, 9, 9], 12),
    model("Am486DX4/120",        Am486DX,   120_000_000, 3.0, 0x482, 0x482, 0, [21, 21, 9, 9], 15),
    model("Am5x86/P75",          Am486DX,   133_333_333, 4.0, 0x4e0, 0x4e0, 0, [24, 24, 12, 12], 16),
    model("Am5x86/P75+",         Am486DX,   150_000_000, 3.0, 0x482, 0x482, 0, [28, 28, 12, 12], 20),
    model("Am5x86/P90",          Am486DX,   160_000_000, 4.0, 0x4e0, 0x4e0, 0, [28, 28, 12, 12], 20),
    model("K5 (5k86) 75 (P75)",  AmdK5,      75_000_000, 1.5, 0x500, 0x500, 0, [7, 7, 4, 4], 9).with_pci(PCI_25),
    model("K5 (SSA/5) 75 (PR75)",   AmdK5,   75_000_000, 1.5, 0x501, 0x501, 0, [7, 7, 4, 4], 9).with_pci(PCI_25),
    model("K5 (SSA/5) 90 (PR90)",   AmdK5,   90_000_000, 1.5, 0x501, 0x501, 0, [9, 9, 4, 4], 10).with_pci(PCI_30),
    model("K5 (SSA/5) 100 (PR100)", AmdK5,  100_000_000, 1.5, 0x501, 0x501, 0, [9, 9, 4, 4], 12).with_pci(PCI_33),
    model("K5 (5k86) 90 (PR120)",   Amd5k86, 120_000_000, 2.0, 0x511, 0x511, 0, [12, 12, 6, 6], 14).with_pci(PCI_30),
    model("K5 (5k86) 100 (PR133)",  Amd5k86, 133_333_333, 2.0, 0x514, 0x514, 0, [12, 12, 6, 6], 16).with_pci(PCI_33),
    model("K5 (5k86) 105 (PR150)",  Amd5k86, 150_000_000, 2.5, 0x524, 0x524, 0, [15, 15, 7, 7], 17).with_pci(PCI_30),
    model("K5 (5k86) 116.5 (PR166)", Amd5k86, 166_666_666, 2.5, 0x524, 0x524, 0, [15, 15, 7, 7], 20).with_pci(PCI_33),
    model("K5 (5k86) 133 (PR200)",  Amd5k86, 200_000_000, 3.0, 0x534, 0x534, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("K6 (Model 6) 166",    AmdK6,     166_666_666, 2.5, 0x561, 0x561, 0, [15, 15, 7, 7], 20).with_pci(PCI_33),
    model("K6 (Model 6) 200",    AmdK6,     200_000_000, 3.0, 0x561, 0x561, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("K6 (Model 6) 233",    AmdK6,     233_333_333, 3.5, 0x561, 0x561, 0, [21, 21, 10, 10], 28).with_pci(PCI_33),
    model("K6 (Model 7) 200",    AmdK6,     200_000_000, 3.0, 0x570, 0x570, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("K6 (Model 7) 233",    AmdK6,     233_333_333, 3.5, 0x570, 0x570, 0, [21, 21, 10, 10], 28).with_pci(PCI_33),
    model("K6 (Model 7) 266",    AmdK6,     266_666_666, 4.0, 0x570, 0x570, 0, [24, 24, 12, 12], 32).with_pci(PCI_33),
    model("K6 (Model 7) 300",    AmdK6,     300_000_000, 4.5, 0x570, 0x570, 0, [27, 27, 13, 13], 36).with_pci(PCI_33),
];

#[rustfmt::skip]
pub static CYRIX_MODELS: &[CpuModelDescriptor] = &[
    model("Cx486SLC/20",         Cx486SLC,   20_000_000, 1.0, 0x400, 0, 0x0000, [4, 4, 3, 3], 3),
    model("Cx486SLC/25",         Cx486SLC,   25_000_000, 1.0, 0x400, 0, 0x0000, [4, 4, 3, 3], 3),
    model("Cx486SLC/33",         Cx486SLC,   33_333_333, 1.0, 0x400, 0, 0x0000, [6, 6, 3, 3], 4),
    model("Cx486SRx2/32",        Cx486SLC,   32_000_000, 2.0, 0x406, 0, 0x0006, [6, 6, 6, 6], 4),
    model("Cx486SRx2/40",        Cx486SLC,   40_000_000, 2.0, 0x406, 0, 0x0006, [8, 8, 6, 6], 6),
    model("Cx486SRx2/50",        Cx486SLC,   50_000_000, 2.0, 0x406, 0, 0x0006, [8, 8, 6, 6], 6),
    model("Cx486DLC/25",         Cx486DLC,   25_000_000, 1.0, 0x401, 0, 0x0001, [4, 4, 3, 3], 3),
    model("Cx486DLC/33",         Cx486DLC,   33_333_333, 1.0, 0x401, 0, 0x0001, [6, 6, 3, 3], 4),
    model("Cx486DLC/40",         Cx486DLC,   40_000_000, 1.0, 0x401, 0, 0x0001, [7, 7, 3, 3], 5),
    model("Cx486DRx2/32",        Cx486DLC,   32_000_000, 2.0, 0x407, 0, 0x0007, [6, 6, 6, 6], 4),
    model("Cx486DRx2/40",        Cx486DLC,   40_000_000, 2.0, 0x407, 0, 0x0007, [8, 8, 6, 6], 6),
    model("Cx486DRx2/50",        Cx486DLC,   50_000_000, 2.0, 0x407, 0, 0x0007, [8, 8, 6, 6], 6),
    model("Cx486DRx2/66",        Cx486DLC,   66_666_666, 2.0, 0x407, 0, 0x0007, [12, 12, 6, 6], 8),
    model("Cx486S/25",           Cx486S,     25_000_000, 1.0, 0x420, 0, 0x0010, [4, 4, 3, 3], 3),
    model("Cx486S/33",           Cx486S,     33_333_333, 1.0, 0x420, 0, 0x0010, [6, 6, 3, 3], 4),
    model("Cx486S/40",           Cx486S,     40_000_000, 1.0, 0x420, 0, 0x0010, [7, 7, 3, 3], 5),
    model("Cx486DX/33",          Cx486DX,    33_333_333, 1.0, 0x430, 0, 0x051a, [6, 6, 3, 3], 4),
    model("Cx486DX/40",          Cx486DX,    40_000_000, 1.0, 0x430, 0, 0x051a, [7, 7, 3, 3], 5),
    model("Cx486DX2/50",         Cx486DX,    50_000_000, 2.0, 0x430, 0, 0x081b, [8, 8, 6, 6], 6),
    model("Cx486DX2/66",         Cx486DX,    66_666_666, 2.0, 0x430, 0, 0x0b1b, [12, 12, 6, 6], 8),
    model("Cx486DX2/80",         Cx486DX,    80_000_000, 2.0, 0x430, 0, 0x311b, [14, 14, 6, 6], 10),
    model("Cx486DX4/75",         Cx486DX,    75_000_000, 3.0, 0x480, 0, 0x361f, [12, 12, 9, 9], 9),
    model("Cx486DX4/100",        Cx486DX,   100_000_000, 3.0, 0x480, 0, 0x361f, [15, 15, 9, 9], 12),
    model("Cx5x86/80",           Cx5x86,     80_000_000, 2.0, 0x480, 0, 0x002f, [14, 14, 6, 6], 10),
    model("Cx5x86/100",          Cx5x86,    100_000_000, 3.0, 0x480, 0, 0x002f, [15, 15, 9, 9], 12),
    model("Cx5x86/120",          Cx5x86,    120_000_000, 3.0, 0x480, 0, 0x002f, [21, 21, 9, 9], 15),
    model("Cx5x86/133",          Cx5x86,    133_333_333, 4.0, 0x480, 0, 0x002f, [24, 24, 12, 12], 16),
    model("Cx6x86/P90",          Cx6x86,     80_000_000, 2.0, 0x520, 0x520, 0x1731, [8, 8, 6, 6], 10).with_pci(20_000_000),
    model("Cx6x86/PR120+",       Cx6x86,    100_000_000, 2.0, 0x520, 0x520, 0x1731, [10, 10, 6, 6], 12).with_pci(PCI_25),
    model("Cx6x86/PR133+",       Cx6x86,    110_000_000, 2.0, 0x520, 0x520, 0x1731, [10, 10, 6, 6], 14).with_pci(PCI_27),
    model("Cx6x86/PR150+",       Cx6x86,    120_000_000, 2.0, 0x520, 0x520, 0x1731, [12, 12, 6, 6], 14).with_pci(PCI_30),
    model("Cx6x86/PR166+",       Cx6x86,    133_333_333, 2.0, 0x520, 0x520, 0x1731, [12, 12, 6, 6], 16).with_pci(PCI_33),
    model("Cx6x86/PR200+",       Cx6x86,    150_000_000, 2.0, 0x520, 0x520, 0x1731, [12, 12, 6, 6], 18).with_pci(PCI_37),
    model("Cx6x86L/PR133+",      Cx6x86L,   110_000_000, 2.0, 0x540, 0x540, 0x2231, [10, 10, 6, 6], 14).with_pci(PCI_27),
    model("Cx6x86L/PR150+",      Cx6x86L,   120_000_000, 2.0, 0x540, 0x540, 0x2231, [12, 12, 6, 6], 14).with_pci(PCI_30),
    model("Cx6x86L/PR166+",      Cx6x86L,   133_333_333, 2.0, 0x540, 0x540, 0x2231, [12, 12, 6, 6], 16).with_pci(PCI_33),
    model("Cx6x86L/PR200+",      Cx6x86L,   150_000_000, 2.0, 0x540, 0x540, 0x2231, [12, 12, 6, 6], 18).with_pci(PCI_37),
    model("MediaGX/180",         CxGX1,     180_000_000, 3.0, 0x540, 0x540, 0x0441, [18, 18, 9, 9], 21).with_pci(PCI_30),
    model("MediaGX/200",         CxGX1,     200_000_000, 3.0, 0x540, 0x540, 0x0441, [18, 18, 9, 9], 24).with_pci(PCI_33),
    model("MediaGX/233",         CxGX1,     233_333_333, 3.5, 0x540, 0x540, 0x0441, [21, 21, 10, 10], 28).with_pci(PCI_33),
    model("Cx6x86MX/PR166",      Cx6x86MX,  133_333_333, 2.0, 0x600, 0x600, 0x0451, [12, 12, 6, 6], 16).with_pci(PCI_33),
    model("Cx6x86MX/PR200",      Cx6x86MX,  166_666_666, 2.5, 0x600, 0x600, 0x0452, [15, 15, 7, 7], 20).with_pci(PCI_33),
    model("Cx6x86MX/PR233",      Cx6x86MX,  187_500_000, 2.5, 0x600, 0x600, 0x0452, [15, 15, 7, 7], 22).with_pci(PCI_37),
    model("Cx6x86MX/PR266",      Cx6x86MX,  208_333_333, 2.5, 0x600, 0x600, 0x0452, [17, 17, 7, 7], 25).with_pci(PCI_41),
    model("MII/PR300",           Cx6x86MX,  233_333_333, 3.5, 0x601, 0x601, 0x0852, [21, 21, 11, 11], 28).with_pci(PCI_33),
    model("MII/PR333",           Cx6x86MX,  250_000_000, 3.0, 0x601, 0x601, 0x0853, [23, 23, 9, 9], 30).with_pci(PCI_41),
];

#[rustfmt::skip]
pub static IDT_MODELS: &[CpuModelDescriptor] = &[
    model("WinChip 75",          WinChip,    75_000_000, 1.5, 0x540, 0x540, 0, [8, 8, 4, 4], 9).with_pci(PCI_25),
    model("WinChip 90",          WinChip,    90_000_000, 1.5, 0x540, 0x540, 0, [9, 9, 4, 4], 10).with_pci(PCI_30),
    model("WinChip 100",         WinChip,   100_000_000, 1.5, 0x540, 0x540, 0, [9, 9, 4, 4], 12).with_pci(PCI_33),
    model("WinChip 120",         WinChip,   120_000_000, 2.0, 0x540, 0x540, 0, [12, 12, 6, 6], 14).with_pci(PCI_30),
    model("WinChip 133",         WinChip,   133_333_333, 2.0, 0x540, 0x540, 0, [12, 12, 6, 6], 16).with_pci(PCI_33),
    model("WinChip 150",         WinChip,   150_000_000, 2.5, 0x540, 0x540, 0, [15, 15, 7, 7], 17).with_pci(PCI_30),
    model("WinChip 166",         WinChip,   166_666_666, 2.5, 0x540, 0x540, 0, [15, 15, 7, 7], 40).with_pci(PCI_33),
    model("WinChip 200",         WinChip,   200_000_000, 3.0, 0x540, 0x540, 0, [18, 18, 9, 9], 24).with_pci(PCI_33),
];

lazy_static! {
    /// Lowercased model name to (manufacturer, model index).
    static ref MODEL_INDEX: FxHashMap<String, (Manufacturer, usize)> = {
        let mut map = FxHashMap::default();
        for manufacturer in Manufacturer::iter() {
            for (idx, descriptor) in manufacturer_models(manufacturer).iter().enumerate() {
                map.insert(descriptor.name.to_lowercase(), (manufacturer, idx));
            }
        }
        map
    };
}

/// Return the model list for a manufacturer.
pub fn manufacturer_models(manufacturer: Manufacturer) -> &'static [CpuModelDescriptor] {
    match manufacturer {
        Manufacturer::Intel => INTEL_MODELS,
        Manufacturer::Amd => AMD_MODELS,
        Manufacturer::Cyrix => CYRIX_MODELS,
        Manufacturer::Idt => IDT_MODELS,
    }
}

/// Resolve a (manufacturer index, model index) pair to a model descriptor.
pub fn lookup(manufacturer_idx: usize, model_idx: usize) -> Result<&'static CpuModelDescriptor, CpuError> {
    let manufacturer = Manufacturer::from_index(manufacturer_idx).ok_or(CpuError::InvalidManufacturer(manufacturer_idx))?;
    manufacturer_models(manufacturer)
        .get(model_idx)
        .ok_or(CpuError::InvalidModel(manufacturer_idx, model_idx))
}

/// Find a model by name, case insensitively.
pub fn find_model(name: &str) -> Result<(Manufacturer, usize), CpuError> {
    MODEL_INDEX
        .get(&name.to_lowercase())
        .copied()
        .ok_or_else(|| CpuError::UnknownModelName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let m = lookup(0, 14).unwrap();
        assert_eq!(m.name, "286/12");
        assert_eq!(m.cpu_type, CpuType::Intel286);
        assert_eq!(m.rspeed, 12_500_000);
        assert_eq!(m.atclk_div, 2);

        assert!(matches!(lookup(7, 0), Err(CpuError::InvalidManufacturer(7))));
        assert!(matches!(lookup(3, 500), Err(CpuError::InvalidModel(3, 500))));
    }

    #[test]
    fn test_find_model() {
        let (manufacturer, idx) = find_model("cx6x86mx/pr200").unwrap();
        assert_eq!(manufacturer, Manufacturer::Cyrix);
        let m = &manufacturer_models(manufacturer)[idx];
        assert_eq!(m.multi, 2.5);
        assert_eq!(m.cyrix_id, 0x0452);
        assert_eq!(m.busspeed(), 66_666_666);

        assert!(find_model("Pentium 4").is_err());
    }

    #[test]
    fn test_names_unique() {
        let total: usize = Manufacturer::iter().map(|m| manufacturer_models(m).len()).sum();
        assert_eq!(MODEL_INDEX.len(), total);
    }

    #[test]
    fn test_cpuid_without_reset_signature() {
        // A model that reports CPUID must also have a reset signature.
        for manufacturer in Manufacturer::iter() {
            for m in manufacturer_models(manufacturer) {
                if m.cpuid_model != 0 {
                    assert_ne!(m.edx_reset, 0, "{}", m.name);
                }
            }
        }
    }
}
