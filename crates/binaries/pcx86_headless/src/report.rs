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

    report.rs

    Model listing and per-model reports for the headless front-end.

*/

use colored::Colorize;
use strum::IntoEnumIterator;

use pcx86_core::{
    cpu_common::{features::CpuFeatures, models::manufacturer_models, Manufacturer},
    cpu_x86::{dispatch::OpcodeTable, family::ModelSpecific, CpuContext},
};

/// Leaves shown in a report. Unknown leaves read as zero and are skipped.
const REPORT_LEAVES: [u32; 6] = [0, 1, 2, 0x8000_0000, 0x8000_0001, 0x8000_0005];

pub fn list_models() {
    for manufacturer in Manufacturer::iter() {
        println!("{} ({})", manufacturer.to_string().bold(), manufacturer.index());
        for (i, model) in manufacturer_models(manufacturer).iter().enumerate() {
            println!(
                "  {:>2}: {:<28} {:<12} {:>4} MHz",
                i,
                model.name,
                model.cpu_type.to_string(),
                model.rspeed / 1_000_000
            );
        }
    }
}

fn mhz(hz: u32) -> f64 {
    hz as f64 / 1_000_000.0
}

/// Build the report lines for a configured core.
pub fn model_report(cpu: &CpuContext) -> Vec<String> {
    let m = &cpu.model;
    let d = &m.descriptor;
    let mut lines = vec![
        format!("Model:      {} ({}, {})", d.name, m.manufacturer, m.cpu_type),
        format!(
            "Clock:      {:.2} MHz core, {:.2} MHz bus, x{}",
            mhz(d.rspeed),
            mhz(m.busspeed),
            m.multi
        ),
        format!("Tables:     {} opcode maps, FPU {:?}", cpu.opcode_table.name(), cpu.fpu_variant),
    ];

    let mut flags = Vec::new();
    for (set, name) in [
        (m.is286, "286"),
        (m.is386, "386"),
        (m.is486, "486"),
        (m.is_pentium, "pentium"),
        (m.hasfpu, "fpu"),
        (m.cpu_iscyrix, "cyrix"),
        (m.cpu_16bitbus, "16bitbus"),
    ] {
        if set {
            flags.push(name);
        }
    }
    lines.push(format!("Flags:      {}", flags.join(" ")));

    let mut features = Vec::new();
    for (bit, name) in [
        (CpuFeatures::RDTSC, "RDTSC"),
        (CpuFeatures::MSR, "MSR"),
        (CpuFeatures::MMX, "MMX"),
        (CpuFeatures::CR4, "CR4"),
        (CpuFeatures::VME, "VME"),
    ] {
        if m.features.has(bit) {
            features.push(name);
        }
    }
    lines.push(format!("Features:   {} CR4 mask {:08X}", features.join(" "), m.cr4_mask));

    if m.cpuid == 0 {
        lines.push("CPUID:      not available".to_string());
    }
    else {
        for leaf in REPORT_LEAVES {
            let r = cpu.family.cpuid(m, leaf);
            if leaf != 0 && r.eax == 0 && r.ebx == 0 && r.ecx == 0 && r.edx == 0 {
                continue;
            }
            lines.push(format!(
                "CPUID {:08X}: EAX={:08X} EBX={:08X} ECX={:08X} EDX={:08X}",
                leaf, r.eax, r.ebx, r.ecx, r.edx
            ));
        }
    }

    let t = &cpu.timing;
    lines.push(format!(
        "Timing:     rr {} rm {} mr {} mm {} bt {} bnt {} int_rm {}",
        t.rr, t.rm, t.mr, t.mm, t.bt, t.bnt, t.int_rm
    ));
    let b = &cpu.bus_timing;
    lines.push(format!(
        "Bus:        read {} read_l {} write {} prefetch {}x{}",
        b.cycles_read, b.cycles_read_l, b.cycles_write, b.prefetch_width, b.prefetch_cycles
    ));
    lines.push(format!(
        "Slow bus:   ISA {} atclk_div {} PCI burst {} nonburst {}",
        m.isa_cycles, m.atclk_div, m.pci_burst, m.pci_nonburst
    ));
    lines
}

pub fn print_report(cpu: &CpuContext) {
    let mut lines = model_report(cpu).into_iter();
    if let Some(first) = lines.next() {
        println!("{}", first.bold());
    }
    for line in lines {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcx86_core::CpuBuilder;

    #[test]
    fn test_pentium_report() {
        let cpu = CpuBuilder::new().with_model_name("Pentium 100/66").build().unwrap();
        let lines = model_report(&cpu);
        assert!(lines[0].contains("Pentium 100/66"));
        assert!(lines.iter().any(|l| l.starts_with("Features:") && l.contains("RDTSC")));
        // "GenuineIntel" leaf 0.
        assert!(lines.iter().any(|l| l.contains("CPUID 00000000") && l.contains("EBX=756E6547")));
    }

    #[test]
    fn test_386_has_no_cpuid() {
        let cpu = CpuBuilder::new().with_model_name("i386DX/33").build().unwrap();
        let lines = model_report(&cpu);
        assert!(lines.iter().any(|l| l == "CPUID:      not available"));
    }
}
