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

    cpu_x86::configure.rs

    The processor model configurator.

    configure() installs everything that depends on the selected model: the derived capability
    flags, the dispatch tables, the cost table, the installed features and the CR4 write mask,
    the default MSR and CCR contents, the core's port handlers and the derived bus timing.
    It may be called again at any time to switch models.

*/

use crate::{
    bus::IoDeviceType,
    cpu_common::{
        features::{CpuFeatures, CR4_DE, CR4_MCE, CR4_OSFXSR, CR4_PCE, CR4_PSE, CR4_PVI, CR4_TSD, CR4_VME},
        models::{lookup, CpuModelDescriptor},
        CpuError,
        CpuType,
        Manufacturer,
    },
    cpu_x86::{
        dispatch::{fpu::FpuVariant, table_for, OpcodeTable},
        family::FamilyDispatch,
        model_state::{MsrBank, P6_MTRR_CAP_RESET, WINCHIP_FCR_RESET},
        timing::{isa_cycles, pci_times, TimingConstants, VideoTimingPreset},
        CpuContext,
    },
};

pub const CYRIX_PORTS: std::ops::RangeInclusive<u16> = 0x22..=0x23;
pub const FPU_PORTS: std::ops::RangeInclusive<u16> = 0xF0..=0xFF;

const CR4_PENTIUM_MASK: u32 = CR4_VME | CR4_PVI | CR4_TSD | CR4_DE | CR4_PSE | CR4_MCE | CR4_PCE;

/// Features and CR4 mask installed for a processor type.
fn model_features(cpu_type: CpuType) -> (u32, u32) {
    use CpuType::*;
    match cpu_type {
        Intel8088 | Intel8086 | Intel286 | Intel386SX | Intel386DX | RapidCad => (0, 0),
        Cx486SLC | Cx486DLC | Intel486SX | Am486SX | Cx486S | Intel486DX | Am486DX | Cx486DX | Cx5x86 => (0, 0),
        IntelDX4 => (CpuFeatures::CR4 | CpuFeatures::VME, CR4_VME | CR4_PVI),
        WinChip => (
            CpuFeatures::RDTSC | CpuFeatures::MMX | CpuFeatures::MSR | CpuFeatures::CR4,
            CR4_TSD | CR4_DE | CR4_MCE | CR4_PCE,
        ),
        Pentium => (
            CpuFeatures::RDTSC | CpuFeatures::MSR | CpuFeatures::CR4 | CpuFeatures::VME,
            CR4_PENTIUM_MASK,
        ),
        PentiumMmx => (
            CpuFeatures::RDTSC | CpuFeatures::MSR | CpuFeatures::CR4 | CpuFeatures::VME | CpuFeatures::MMX,
            CR4_PENTIUM_MASK,
        ),
        Cx6x86 | Cx6x86L => (CpuFeatures::RDTSC, 0),
        CxGX1 => (
            CpuFeatures::RDTSC | CpuFeatures::MSR | CpuFeatures::CR4,
            CR4_TSD | CR4_DE | CR4_PCE,
        ),
        Cx6x86MX => (
            CpuFeatures::RDTSC | CpuFeatures::MMX | CpuFeatures::MSR | CpuFeatures::CR4,
            CR4_TSD | CR4_DE | CR4_PCE,
        ),
        AmdK5 | Amd5k86 => (
            CpuFeatures::RDTSC | CpuFeatures::MMX | CpuFeatures::MSR | CpuFeatures::CR4,
            CR4_TSD | CR4_DE | CR4_MCE | CR4_PCE,
        ),
        AmdK6 => (
            CpuFeatures::RDTSC | CpuFeatures::MMX | CpuFeatures::MSR | CpuFeatures::CR4 | CpuFeatures::VME,
            CR4_PENTIUM_MASK,
        ),
        PentiumPro => (
            CpuFeatures::RDTSC | CpuFeatures::MSR | CpuFeatures::CR4 | CpuFeatures::VME,
            CR4_PENTIUM_MASK,
        ),
        Pentium2OverDrive => (
            CpuFeatures::RDTSC | CpuFeatures::MSR | CpuFeatures::CR4 | CpuFeatures::VME | CpuFeatures::MMX,
            CR4_PENTIUM_MASK | CR4_OSFXSR,
        ),
    }
}

impl CpuContext {
    /// Configure the core for the model at (manufacturer index, model index).
    pub fn configure(&mut self, manufacturer_idx: usize, model_idx: usize) -> Result<(), CpuError> {
        let descriptor = *lookup(manufacturer_idx, model_idx)?;
        let manufacturer =
            Manufacturer::from_index(manufacturer_idx).ok_or(CpuError::InvalidManufacturer(manufacturer_idx))?;
        self.configure_model(manufacturer, model_idx, descriptor);
        Ok(())
    }

    /// Configure the core from a descriptor. Panics if the descriptor cannot be clocked; the
    /// built-in tables never produce one.
    pub fn configure_model(&mut self, manufacturer: Manufacturer, model_idx: usize, descriptor: CpuModelDescriptor) {
        if descriptor.rspeed == 0 || descriptor.multi <= 0.0 {
            log::error!(
                "configure(): model '{}' ({}) has no usable clock: rspeed {} multi {}",
                descriptor.name,
                descriptor.cpu_type,
                descriptor.rspeed,
                descriptor.multi
            );
            panic!(
                "unsupported CPU model '{}' ({}): invalid clock configuration",
                descriptor.name, descriptor.cpu_type
            );
        }

        let cpu_type = descriptor.cpu_type;
        let m = &mut self.model;
        m.manufacturer = manufacturer;
        m.model_idx = model_idx;
        m.descriptor = descriptor;
        m.cpu_type = cpu_type;
        m.derive_flags(self.settings.external_fpu);

        // Tables are installed as a unit.
        self.opcode_table = table_for(cpu_type);
        self.fpu_variant = FpuVariant::select(cpu_type, self.model.hasfpu);
        self.family = FamilyDispatch::from(self.model.family);
        self.timing = TimingConstants::for_type(cpu_type);

        self.install_model_features();
        self.install_port_handlers();
        self.bus.set_address_mask(self.model.address_mask());

        let m = &mut self.model;
        m.multi = descriptor.multi;
        m.busspeed = descriptor.busspeed();
        m.isa_cycles = isa_cycles(descriptor.rspeed);
        m.atclk_div = descriptor.atclk_div;
        let (burst, nonburst) = pci_times(&descriptor);
        m.pci_burst = burst;
        m.pci_nonburst = nonburst;
        if descriptor.pci_speed.is_some() {
            log::debug!("PCI burst={} nonburst={}", burst, nonburst);
        }
        self.update_bus_timing();

        log::debug!(
            "Configured {} {} ({}): tables {} fpu {:?} features {:04X} cr4 mask {:08X}",
            manufacturer,
            descriptor.name,
            cpu_type,
            self.opcode_table.name(),
            self.fpu_variant,
            self.model.features.bits(),
            self.model.cr4_mask
        );
    }

    /// Set the features, CR4 mask, CPUID visibility and the MSR and CCR reset values.
    fn install_model_features(&mut self) {
        let m = &mut self.model;
        let (features, cr4_mask) = model_features(m.cpu_type);
        m.features = CpuFeatures::from_bits(features);
        m.cr4_mask = cr4_mask;
        m.cpuid = m.descriptor.cpuid_model;

        m.msr = MsrBank::default();
        match m.cpu_type {
            CpuType::WinChip => m.msr.fcr = WINCHIP_FCR_RESET,
            CpuType::PentiumPro | CpuType::Pentium2OverDrive => m.msr.mtrr_cap = P6_MTRR_CAP_RESET,
            _ => {}
        }

        m.ccr = [0; 7];
        m.cyrix_index = 0;
        match m.cpu_type {
            // CPUID is hidden until CCR4 CPUIDEN is set.
            CpuType::Cx6x86 => m.cpuid = 0,
            CpuType::Cx6x86L | CpuType::Cx6x86MX => m.ccr[4] = 0x80,
            _ => {}
        }

        // Clear any CR4 bits the new model cannot hold.
        self.regs.cr4 &= self.model.cr4_mask;
    }

    fn install_port_handlers(&mut self) {
        if self.model.cpu_iscyrix {
            self.bus
                .install_io_handler(CYRIX_PORTS, IoDeviceType::CyrixConfig, "Cyrix Configuration");
        }
        else {
            self.bus.remove_io_handler(CYRIX_PORTS, IoDeviceType::CyrixConfig);
        }

        if self.model.hasfpu {
            self.bus.install_io_handler(FPU_PORTS, IoDeviceType::FpuControl, "FPU Control");
        }
        else {
            self.bus.remove_io_handler(FPU_PORTS, IoDeviceType::FpuControl);
        }
    }

    /// Recompute the wait-state, prefetch and video timings from the current settings.
    pub fn update_bus_timing(&mut self) {
        let descriptor = self.model.descriptor;
        self.bus_timing
            .update_waitstates(&descriptor, self.settings.waitstates, self.settings.cache);
        self.bus_timing
            .update_video_timing(&descriptor, self.settings.video_timing);
    }

    pub fn set_waitstates(&mut self, waitstates: u32) {
        self.settings.waitstates = waitstates;
        self.update_bus_timing();
    }

    pub fn set_cache_enabled(&mut self, internal: bool, external: bool) {
        self.settings.cache.internal = internal;
        self.settings.cache.external = external;
        self.update_bus_timing();
    }

    pub fn set_video_timing(&mut self, preset: VideoTimingPreset) {
        self.settings.video_timing = preset;
        self.update_bus_timing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::BusInterface,
        cpu_common::{
            features::{CPUID_MMX, CPUID_TSC},
            models::{find_model, manufacturer_models},
            CpuException,
            StepResult,
        },
        cpu_x86::{
            execute::tests::{cpu_with_code, CODE_SEGMENT},
            family::ModelSpecific,
            registers::{REGISTER_EAX, REGISTER_ECX},
            Flag,
        },
    };
    use strum::IntoEnumIterator;

    fn cpu_for(name: &str) -> CpuContext {
        let (manufacturer, idx) = find_model(name).unwrap();
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.configure(manufacturer.index(), idx).unwrap();
        cpu
    }

    #[test]
    fn test_configure_every_model() {
        for manufacturer in Manufacturer::iter() {
            for (idx, descriptor) in manufacturer_models(manufacturer).iter().enumerate() {
                let mut cpu = CpuContext::new(BusInterface::default());
                cpu.configure(manufacturer.index(), idx).unwrap();
                assert_eq!(cpu.model.cpu_type, descriptor.cpu_type);
                assert_eq!(cpu.model.busspeed, descriptor.busspeed());
                // CPUID feature bits agree with the installed features.
                let edx = cpu.family.cpuid(&cpu.model, 1).edx;
                if cpu.model.has_cpuid() && edx & CPUID_TSC != 0 {
                    assert!(cpu.model.features.has(CpuFeatures::RDTSC), "{}", descriptor.name);
                }
                if cpu.model.has_cpuid() && edx & CPUID_MMX != 0 {
                    assert!(cpu.model.features.has(CpuFeatures::MMX), "{}", descriptor.name);
                }
            }
        }
    }

    #[test]
    fn test_invalid_indices() {
        let mut cpu = CpuContext::new(BusInterface::default());
        assert!(matches!(cpu.configure(4, 0), Err(CpuError::InvalidManufacturer(4))));
        assert!(matches!(cpu.configure(0, 1000), Err(CpuError::InvalidModel(0, 1000))));
    }

    #[test]
    #[should_panic(expected = "unsupported CPU model")]
    fn test_unclockable_model_is_fatal() {
        let mut descriptor = manufacturer_models(Manufacturer::Intel)[0];
        descriptor.rspeed = 0;
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.configure_model(Manufacturer::Intel, 0, descriptor);
    }

    #[test]
    fn test_port_handlers_follow_model() {
        let mut cpu = cpu_for("Cx486DX2/66");
        assert_eq!(cpu.bus.io_device_type(0x22), Some(IoDeviceType::CyrixConfig));
        assert_eq!(cpu.bus.io_device_type(0xF1), Some(IoDeviceType::FpuControl));

        let (m, idx) = find_model("i486SX/33").unwrap();
        cpu.configure(m.index(), idx).unwrap();
        assert_eq!(cpu.bus.io_device_type(0x22), None);
        assert_eq!(cpu.bus.io_device_type(0xF1), None);

        // An external coprocessor on a 486SX.
        cpu.settings.external_fpu = true;
        cpu.configure(m.index(), idx).unwrap();
        assert!(cpu.model.hasfpu);
        assert_eq!(cpu.bus.io_device_type(0xF0), Some(IoDeviceType::FpuControl));
    }

    #[test]
    fn test_model_switch_replaces_state() {
        let mut cpu = cpu_for("Pentium II OverDrive 300/66");
        assert_eq!(cpu.opcode_table.name(), "Pentium II");
        assert_eq!(cpu.fpu_variant, FpuVariant::Fpu686);
        assert_eq!(cpu.model.msr.mtrr_cap, 0x508);
        assert_eq!(cpu.model.cr4_mask & CR4_OSFXSR, CR4_OSFXSR);
        cpu.regs.cr4 = CR4_OSFXSR | CR4_TSD;

        let (m, idx) = find_model("286/12").unwrap();
        cpu.configure(m.index(), idx).unwrap();
        assert_eq!(cpu.opcode_table.name(), "80286");
        assert_eq!(cpu.fpu_variant, FpuVariant::None);
        assert_eq!(cpu.model.msr, MsrBank::default());
        assert_eq!(cpu.model.features, CpuFeatures::empty());
        assert_eq!(cpu.regs.cr4, 0);
        assert_eq!(cpu.bus.address_mask(), 0x00FF_FFFF);
        assert_eq!(cpu.timing.rr, 2);
    }

    #[test]
    fn test_model_switch_removes_handlers() {
        let code = [
            0x0F, 0x44, 0xC1, // CMOVZ AX, CX
            0x0F, 0x58, 0xC1, // ADDPS XMM0, XMM1
        ];
        let is_ud = |result: StepResult| matches!(result, StepResult::Exception(f) if f.exception == CpuException::InvalidOpcode);

        let mut cpu = cpu_with_code("Pentium II OverDrive 300/66", &code);
        cpu.regs.cr4 |= CR4_OSFXSR;
        cpu.regs.set_reg16(REGISTER_ECX as u8, 0x5A5A);
        cpu.set_flag(Flag::Zero);
        assert!(matches!(cpu.step().unwrap(), StepResult::Normal));
        assert!(matches!(cpu.step().unwrap(), StepResult::Normal));
        assert_eq!(cpu.regs.reg16(REGISTER_EAX as u8), 0x5A5A);

        for name in ["Pentium 100/66", "286/12"] {
            let (m, idx) = find_model(name).unwrap();
            cpu.configure(m.index(), idx).unwrap();
            // SSE stays switched on, so only the installed maps can refuse ADDPS.
            cpu.regs.cr4 |= CR4_OSFXSR;
            for ofs in [0u16, 3] {
                cpu.set_entry_point(CODE_SEGMENT, ofs);
                assert!(is_ud(cpu.step().unwrap()), "{} executed 0F {:02X}", name, code[ofs as usize + 1]);
            }
        }

        // Back on a P6 part CMOV is reachable again, but SSE is not.
        let (m, idx) = find_model("Pentium Pro 200").unwrap();
        cpu.configure(m.index(), idx).unwrap();
        cpu.set_entry_point(CODE_SEGMENT, 0);
        cpu.regs.set_reg16(REGISTER_EAX as u8, 0);
        cpu.regs.set_reg16(REGISTER_ECX as u8, 0x1234);
        cpu.set_flag(Flag::Zero);
        assert!(matches!(cpu.step().unwrap(), StepResult::Normal));
        assert_eq!(cpu.regs.reg16(REGISTER_EAX as u8), 0x1234);
        assert!(is_ud(cpu.step().unwrap()));
    }

    #[test]
    fn test_cyrix_ccr_reset() {
        let cpu = cpu_for("Cx6x86/PR166+");
        assert_eq!(cpu.model.cpuid, 0);
        assert_eq!(cpu.model.ccr, [0; 7]);

        let cpu = cpu_for("Cx6x86MX/PR200");
        assert_eq!(cpu.model.ccr[4], 0x80);
        assert_eq!(cpu.model.cpuid, 0x600);
        assert!(cpu.model.features.has(CpuFeatures::MMX));
        assert!(!cpu.model.features.has(CpuFeatures::VME));
    }

    #[test]
    fn test_bus_clocks() {
        let cpu = cpu_for("Pentium 100/66");
        assert_eq!(cpu.model.busspeed, 66_666_666);
        assert_eq!(cpu.model.isa_cycles, 800);
        assert_eq!((cpu.model.pci_burst, cpu.model.pci_nonburst), (3, 12));
        assert_eq!(cpu.model.atclk_div, 12);
    }

    #[test]
    fn test_settings_update_timing() {
        let mut cpu = cpu_for("i386DX/33");
        assert_eq!(cpu.bus_timing.cycles_read, 6);
        cpu.set_waitstates(2);
        assert_eq!(cpu.bus_timing.cycles_read, 3);
        cpu.set_cache_enabled(true, false);
        assert_eq!(cpu.bus_timing.prefetch_cycles, 0);
        cpu.set_video_timing(VideoTimingPreset::Isa16BitFast);
        assert_eq!(cpu.bus_timing.video_b, (33_333_333.0f64 / 8_000_000.0 * 3.0) as u32);
    }
}
