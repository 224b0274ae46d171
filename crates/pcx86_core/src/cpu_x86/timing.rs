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

    cpu_x86::timing.rs

    Per-model instruction cost tables and the derived bus wait-state model.

    The cost tables are literal per-model values. Bus timings are derived from the model's
    memory and cache cycle costs, the wait state setting and the cache configuration.

*/

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer};
use strum_macros::EnumIter;

use crate::cpu_common::{models::CpuModelDescriptor, CpuType};

/// Fixed point shift applied to the ISA cycle ratio.
pub const ISA_CYCLES_SHIFT: u32 = 6;
pub const ISA_CLOCK: u64 = 8_000_000;

/// Instruction cost table for the active model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TimingConstants {
    /// register, register
    pub rr: u32,
    /// register <- memory
    pub rm: u32,
    /// memory <- register
    pub mr: u32,
    /// memory, memory
    pub mm: u32,
    pub rml: u32,
    pub mrl: u32,
    pub mml: u32,
    /// branch taken (added to bnt)
    pub bt: u32,
    /// branch not taken
    pub bnt: u32,

    pub int: u32,
    pub int_rm: u32,
    pub int_v86: u32,
    pub int_pm: u32,
    pub int_pm_outer: u32,
    pub iret_rm: u32,
    pub iret_v86: u32,
    pub iret_pm: u32,
    pub iret_pm_outer: u32,
    pub call_rm: u32,
    pub call_pm: u32,
    pub call_pm_gate: u32,
    pub call_pm_gate_inner: u32,
    pub retf_rm: u32,
    pub retf_pm: u32,
    pub retf_pm_outer: u32,
    pub jmp_rm: u32,
    pub jmp_pm: u32,
    pub jmp_pm_gate: u32,

    pub misaligned: u32,
}

impl TimingConstants {
    const fn basic(costs: [u32; 9]) -> Self {
        TimingConstants {
            rr: costs[0],
            rm: costs[1],
            mr: costs[2],
            mm: costs[3],
            rml: costs[4],
            mrl: costs[5],
            mml: costs[6],
            bt: costs[7],
            bnt: costs[8],
            int: 0,
            int_rm: 0,
            int_v86: 0,
            int_pm: 0,
            int_pm_outer: 0,
            iret_rm: 0,
            iret_v86: 0,
            iret_pm: 0,
            iret_pm_outer: 0,
            call_rm: 0,
            call_pm: 0,
            call_pm_gate: 0,
            call_pm_gate_inner: 0,
            retf_rm: 0,
            retf_pm: 0,
            retf_pm_outer: 0,
            jmp_rm: 0,
            jmp_pm: 0,
            jmp_pm_gate: 0,
            misaligned: 0,
        }
    }

    /// Set the far transfer matrix. Arguments are grouped as
    /// [int, rm, v86, pm, pm_outer], [iret rm, v86, pm, pm_outer], [call rm, pm, gate, gate_inner],
    /// [retf rm, pm, pm_outer], [jmp rm, pm, gate].
    const fn far(mut self, int: [u32; 5], iret: [u32; 4], call: [u32; 4], retf: [u32; 3], jmp: [u32; 3]) -> Self {
        self.int = int[0];
        self.int_rm = int[1];
        self.int_v86 = int[2];
        self.int_pm = int[3];
        self.int_pm_outer = int[4];
        self.iret_rm = iret[0];
        self.iret_v86 = iret[1];
        self.iret_pm = iret[2];
        self.iret_pm_outer = iret[3];
        self.call_rm = call[0];
        self.call_pm = call[1];
        self.call_pm_gate = call[2];
        self.call_pm_gate_inner = call[3];
        self.retf_rm = retf[0];
        self.retf_pm = retf[1];
        self.retf_pm_outer = retf[2];
        self.jmp_rm = jmp[0];
        self.jmp_pm = jmp[1];
        self.jmp_pm_gate = jmp[2];
        self
    }

    const fn misaligned(mut self, misaligned: u32) -> Self {
        self.misaligned = misaligned;
        self
    }

    /// Return the literal cost table for a processor type.
    pub fn for_type(cpu_type: CpuType) -> TimingConstants {
        use CpuType::*;
        match cpu_type {
            // The 808x has no cost table of its own in the model configuration; these are
            // datasheet base costs for the register and memory forms.
            Intel8088 | Intel8086 => {
                TimingConstants::basic([3, 9, 16, 16, 9, 16, 16, 12, 4]).far([0, 51, 0, 0, 0], [24, 0, 0, 0], [28, 0, 0, 0], [26, 0, 0], [15, 0, 0])
            }
            Intel286 => TimingConstants::basic([2, 7, 7, 7, 9, 11, 11, 4, 3]).far(
                [0, 23, 0, 40, 78],
                [17, 0, 31, 55],
                [13, 26, 52, 82],
                [15, 25, 55],
                [11, 23, 38],
            ),
            Intel386SX => TimingConstants::basic([2, 6, 7, 6, 8, 11, 10, 4, 3]).far(
                [0, 37, 59, 99, 119],
                [22, 60, 38, 82],
                [17, 34, 52, 86],
                [18, 32, 68],
                [12, 27, 45],
            ),
            Intel386DX => TimingConstants::basic([2, 6, 7, 6, 6, 7, 6, 4, 3]).far(
                [0, 37, 59, 99, 119],
                [22, 60, 38, 82],
                [17, 34, 52, 86],
                [18, 32, 68],
                [12, 27, 45],
            ),
            RapidCad => TimingConstants::basic([1, 2, 3, 3, 2, 3, 3, 2, 1]).far(
                [4, 26, 82, 44, 71],
                [15, 36, 20, 36],
                [18, 20, 35, 69],
                [13, 17, 35],
                [17, 19, 32],
            ),
            Intel486SX | Intel486DX | IntelDX4 | Am486SX | Am486DX => {
                TimingConstants::basic([1, 2, 3, 3, 2, 3, 3, 2, 1])
                    .far(
                        [4, 26, 82, 44, 71],
                        [15, 36, 20, 36],
                        [18, 20, 35, 69],
                        [13, 17, 35],
                        [17, 19, 32],
                    )
                    .misaligned(3)
            }
            Cx486SLC => TimingConstants::basic([1, 3, 5, 3, 5, 7, 7, 5, 1])
                .far(
                    [4, 14, 82, 49, 77],
                    [14, 66, 31, 66],
                    [12, 30, 41, 83],
                    [13, 26, 61],
                    [9, 26, 37],
                )
                .misaligned(3),
            Cx486DLC => TimingConstants::basic([1, 3, 3, 3, 3, 3, 3, 5, 1])
                .far(
                    [4, 14, 82, 49, 77],
                    [14, 66, 31, 66],
                    [12, 30, 41, 83],
                    [13, 26, 61],
                    [9, 26, 37],
                )
                .misaligned(3),
            Cx486S | Cx486DX => TimingConstants::basic([1, 3, 3, 3, 3, 3, 3, 3, 1])
                .far(
                    [4, 14, 82, 49, 77],
                    [14, 66, 31, 66],
                    [12, 30, 41, 83],
                    [13, 26, 61],
                    [9, 26, 37],
                )
                .misaligned(3),
            Cx5x86 => TimingConstants::basic([1, 1, 2, 2, 1, 2, 2, 4, 1])
                .far([0, 9, 82, 21, 32], [7, 26, 10, 26], [4, 15, 26, 35], [4, 7, 23], [5, 7, 17])
                .misaligned(2),
            WinChip => TimingConstants::basic([1, 2, 2, 3, 2, 2, 3, 2, 1])
                .far([0, 26, 82, 44, 71], [7, 26, 10, 26], [4, 15, 26, 35], [4, 7, 23], [5, 7, 17])
                .misaligned(2),
            Pentium => TimingConstants::basic([1, 2, 3, 3, 2, 3, 3, 0, 2])
                .far([6, 11, 54, 25, 42], [7, 27, 10, 27], [4, 4, 22, 44], [4, 4, 23], [3, 3, 18])
                .misaligned(3),
            PentiumMmx => TimingConstants::basic([1, 2, 3, 3, 2, 3, 3, 0, 1])
                .far([6, 11, 54, 25, 42], [7, 27, 10, 27], [4, 4, 22, 44], [4, 4, 23], [3, 3, 18])
                .misaligned(3),
            Cx6x86 | Cx6x86L | Cx6x86MX => TimingConstants::basic([1, 1, 2, 2, 1, 2, 2, 0, 2])
                .far([0, 9, 46, 21, 32], [7, 26, 10, 26], [3, 4, 15, 26], [4, 4, 23], [1, 4, 14])
                .misaligned(2),
            CxGX1 => TimingConstants::basic([1, 1, 2, 2, 1, 2, 2, 4, 1]).misaligned(2),
            AmdK5 | Amd5k86 | AmdK6 => TimingConstants::basic([1, 2, 3, 3, 2, 3, 3, 0, 1]).misaligned(3),
            PentiumPro | Pentium2OverDrive => TimingConstants::basic([1, 1, 1, 1, 1, 1, 1, 0, 1]).misaligned(3),
        }
    }
}

/// The kind of bus a video timing preset is specified against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VideoBusKind {
    Isa,
    Bus,
}

/// Video memory access timing presets, from 8-bit ISA through fast VLB/PCI.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, EnumIter)]
pub enum VideoTimingPreset {
    #[default]
    Isa8Bit,
    Isa16BitSlow,
    Isa16BitFast,
    BusSlow,
    BusMedium,
    BusFast,
}

impl VideoTimingPreset {
    /// (bus kind, byte, word, long) in bus clocks.
    pub fn table(&self) -> (VideoBusKind, u32, u32, u32) {
        match self {
            VideoTimingPreset::Isa8Bit => (VideoBusKind::Isa, 8, 16, 32),
            VideoTimingPreset::Isa16BitSlow => (VideoBusKind::Isa, 6, 8, 16),
            VideoTimingPreset::Isa16BitFast => (VideoBusKind::Isa, 3, 3, 6),
            VideoTimingPreset::BusSlow => (VideoBusKind::Bus, 4, 8, 16),
            VideoTimingPreset::BusMedium => (VideoBusKind::Bus, 4, 5, 10),
            VideoTimingPreset::BusFast => (VideoBusKind::Bus, 3, 3, 4),
        }
    }

    pub fn from_index(idx: usize) -> Option<VideoTimingPreset> {
        match idx {
            0 => Some(VideoTimingPreset::Isa8Bit),
            1 => Some(VideoTimingPreset::Isa16BitSlow),
            2 => Some(VideoTimingPreset::Isa16BitFast),
            3 => Some(VideoTimingPreset::BusSlow),
            4 => Some(VideoTimingPreset::BusMedium),
            5 => Some(VideoTimingPreset::BusFast),
            _ => None,
        }
    }
}

impl fmt::Display for VideoTimingPreset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VideoTimingPreset::Isa8Bit => "isa8",
            VideoTimingPreset::Isa16BitSlow => "isa16_slow",
            VideoTimingPreset::Isa16BitFast => "isa16_fast",
            VideoTimingPreset::BusSlow => "bus_slow",
            VideoTimingPreset::BusMedium => "bus_medium",
            VideoTimingPreset::BusFast => "bus_fast",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for VideoTimingPreset {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "isa8" | "0" => Ok(VideoTimingPreset::Isa8Bit),
            "isa16_slow" | "1" => Ok(VideoTimingPreset::Isa16BitSlow),
            "isa16_fast" | "2" => Ok(VideoTimingPreset::Isa16BitFast),
            "bus_slow" | "vlb_slow" | "3" => Ok(VideoTimingPreset::BusSlow),
            "bus_medium" | "vlb_medium" | "4" => Ok(VideoTimingPreset::BusMedium),
            "bus_fast" | "vlb_fast" | "5" => Ok(VideoTimingPreset::BusFast),
            _ => Err("Bad value for video timing".to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for VideoTimingPreset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PresetVisitor;

        impl<'de> serde::de::Visitor<'de> for PresetVisitor {
            type Value = VideoTimingPreset;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a video timing preset name like 'isa8' or 'bus_fast', or an index 0-5")
            }

            fn visit_str<E>(self, value: &str) -> Result<VideoTimingPreset, E>
            where
                E: serde::de::Error,
            {
                value
                    .parse::<VideoTimingPreset>()
                    .map_err(|_| E::custom(format!("unknown VideoTimingPreset '{}'", value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<VideoTimingPreset, E>
            where
                E: serde::de::Error,
            {
                usize::try_from(value)
                    .ok()
                    .and_then(VideoTimingPreset::from_index)
                    .ok_or_else(|| E::custom(format!("video timing index {} out of range", value)))
            }

            fn visit_u64<E>(self, value: u64) -> Result<VideoTimingPreset, E>
            where
                E: serde::de::Error,
            {
                VideoTimingPreset::from_index(value as usize)
                    .ok_or_else(|| E::custom(format!("video timing index {} out of range", value)))
            }
        }

        deserializer.deserialize_any(PresetVisitor)
    }
}

/// Cache configuration that feeds the wait-state model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheConfig {
    pub internal: bool,
    pub external: bool,
}

/// Derived per-access bus costs, in CPU cycles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusTiming {
    pub prefetch_width: u32,
    pub prefetch_cycles: u32,
    pub cycles_read: u32,
    pub cycles_read_l: u32,
    pub cycles_write: u32,
    pub cycles_write_l: u32,
    pub video_b: u32,
    pub video_w: u32,
    pub video_l: u32,
}

impl BusTiming {
    /// Recompute memory wait states and prefetch costs from the model and cache state.
    pub fn update_waitstates(&mut self, model: &CpuModelDescriptor, waitstates: u32, cache: CacheConfig) {
        let bus16 = model.cpu_type.has_16bit_bus();
        let long_factor = if bus16 { 2 } else { 1 };
        self.prefetch_width = if bus16 { 2 } else { 4 };

        if cache.internal {
            // Prefetch is free when fetching from the internal cache.
            self.prefetch_cycles = 0;
        }
        else if waitstates > 0 && (CpuType::Intel286..=CpuType::Intel386DX).contains(&model.cpu_type) {
            let ws = waitstates + 1;
            self.prefetch_cycles = ws;
            self.cycles_read = ws;
            self.cycles_read_l = long_factor * ws;
            self.cycles_write = ws;
            self.cycles_write_l = long_factor * ws;
        }
        else if cache.external {
            self.prefetch_cycles = model.cache_read_cycles;
            self.cycles_read = model.cache_read_cycles;
            self.cycles_read_l = long_factor * model.cache_read_cycles;
            self.cycles_write = model.cache_write_cycles;
            self.cycles_write_l = long_factor * model.cache_write_cycles;
        }
        else {
            self.prefetch_cycles = model.mem_read_cycles;
            self.cycles_read = model.mem_read_cycles;
            self.cycles_read_l = long_factor * model.mem_read_cycles;
            self.cycles_write = model.mem_write_cycles;
            self.cycles_write_l = long_factor * model.mem_write_cycles;
        }
    }

    /// Recompute video memory access costs for a preset.
    pub fn update_video_timing(&mut self, model: &CpuModelDescriptor, preset: VideoTimingPreset) {
        let (kind, b, w, l) = preset.table();
        let scale = match kind {
            VideoBusKind::Isa => model.rspeed as f64 / ISA_CLOCK as f64,
            VideoBusKind::Bus => model.rspeed as f64 / model.busspeed().max(1) as f64,
        };
        self.video_b = (scale * b as f64) as u32;
        self.video_w = (scale * w as f64) as u32;
        self.video_l = (scale * l as f64) as u32;
        if model.cpu_type.has_16bit_bus() {
            self.video_l = self.video_w * 2;
        }
    }
}

/// ISA cycle ratio in 1/64ths of a CPU clock per 8MHz ISA clock.
pub fn isa_cycles(rspeed: u32) -> u32 {
    (((rspeed as u64) << ISA_CYCLES_SHIFT) / ISA_CLOCK) as u32
}

/// Return (burst, nonburst) PCI transfer times in CPU cycles.
pub fn pci_times(model: &CpuModelDescriptor) -> (u32, u32) {
    match model.pci_speed {
        Some(pci) if pci > 0 => (model.rspeed / pci, (4 * model.rspeed as u64 / pci as u64) as u32),
        _ => (1, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_common::models::{find_model, manufacturer_models};

    fn model(name: &str) -> CpuModelDescriptor {
        let (m, idx) = find_model(name).unwrap();
        manufacturer_models(m)[idx]
    }

    #[test]
    fn test_timing_tables() {
        let t = TimingConstants::for_type(CpuType::Intel286);
        assert_eq!(t.rr, 2);
        assert_eq!(t.bt, 4);
        assert_eq!(t.bnt, 3);
        assert_eq!(t.int_rm, 23);
        assert_eq!(t.misaligned, 0);

        let t = TimingConstants::for_type(CpuType::Cx6x86MX);
        assert_eq!(t.jmp_rm, 1);
        assert_eq!(t.int_v86, 46);
        assert_eq!(t.misaligned, 2);

        let t = TimingConstants::for_type(CpuType::PentiumPro);
        assert_eq!(t.int_rm, 0);
        assert_eq!(t.rm, 1);
    }

    #[test]
    fn test_waitstates_override() {
        let m = model("286/12");
        let mut bus = BusTiming::default();
        bus.update_waitstates(&m, 1, CacheConfig::default());
        assert_eq!(bus.cycles_read, 2);
        assert_eq!(bus.cycles_read_l, 4);
        assert_eq!(bus.prefetch_width, 2);

        // Waitstates are ignored outside 286-386DX.
        let m = model("i486DX/33");
        bus.update_waitstates(&m, 1, CacheConfig::default());
        assert_eq!(bus.cycles_read, 6);
        assert_eq!(bus.cycles_read_l, 6);
        assert_eq!(bus.prefetch_width, 4);
    }

    #[test]
    fn test_cache_timings() {
        let m = model("i486DX2/66");
        let mut bus = BusTiming::default();
        bus.update_waitstates(
            &m,
            0,
            CacheConfig {
                internal: false,
                external: true,
            },
        );
        assert_eq!(bus.cycles_write, 6);
        assert_eq!(bus.prefetch_cycles, 6);

        bus.update_waitstates(
            &m,
            0,
            CacheConfig {
                internal: true,
                external: true,
            },
        );
        assert_eq!(bus.prefetch_cycles, 0);
    }

    #[test]
    fn test_video_timing() {
        let m = model("i386SX/16");
        let mut bus = BusTiming::default();
        bus.update_video_timing(&m, VideoTimingPreset::Isa8Bit);
        assert_eq!(bus.video_b, 16);
        assert_eq!(bus.video_w, 32);
        // 16-bit bus: long is two word accesses.
        assert_eq!(bus.video_l, 64);

        let m = model("i486DX2/66");
        bus.update_video_timing(&m, VideoTimingPreset::BusFast);
        assert_eq!(bus.video_b, 6);
        assert_eq!(bus.video_l, 8);
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("BUS_FAST".parse::<VideoTimingPreset>(), Ok(VideoTimingPreset::BusFast));
        assert_eq!("2".parse::<VideoTimingPreset>(), Ok(VideoTimingPreset::Isa16BitFast));
        assert!("agp".parse::<VideoTimingPreset>().is_err());
    }

    #[test]
    fn test_bus_clocks() {
        assert_eq!(isa_cycles(8_000_000), 64);
        let m = model("Pentium 100/66");
        assert_eq!(pci_times(&m), (3, 12));
        let m = model("i486DX/33");
        assert_eq!(pci_times(&m), (1, 4));
    }
}
