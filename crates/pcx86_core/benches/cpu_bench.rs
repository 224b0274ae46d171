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

    benches::cpu_bench.rs

    Benchmarks for the CPU core.

*/

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pcx86_core::{cpu_common::models::find_model, CpuBuilder, CpuContext};

const CODE_SEGMENT: u16 = 0x0100;

/// A loop of ALU, memory and branch work: 0100:0000
///   MOV CX, 1000
/// L: ADD AX, [BX]
///    XOR DX, AX
///    INC BX
///    LOOP L
///    HLT
const ALU_LOOP: [u8; 12] = [0xB9, 0xE8, 0x03, 0x03, 0x07, 0x31, 0xC2, 0x43, 0xE2, 0xF9, 0xF4, 0x90];

/// x87 work: FLD1, FADD ST(0), ST(0), FSQRT, FSTP ST(0), repeated.
const FPU_LOOP: [u8; 15] = [
    0xB9, 0xE8, 0x03, // MOV CX, 1000
    0xD9, 0xE8, // FLD1
    0xD8, 0xC0, // FADD ST(0), ST(0)
    0xD9, 0xFA, // FSQRT
    0xDD, 0xD8, // FSTP ST(0)
    0xE2, 0xF6, // LOOP
    0xF4, 0x90,
];

fn cpu_with_program(name: &str, code: &[u8]) -> CpuContext {
    let mut cpu = CpuBuilder::new().with_model_name(name).build().unwrap();
    cpu.bus.copy_from(code, (CODE_SEGMENT as usize) << 4);
    cpu
}

fn run_to_halt(cpu: &mut CpuContext) -> u64 {
    cpu.set_entry_point(CODE_SEGMENT, 0);
    while !cpu.is_halted() {
        cpu.step().unwrap();
    }
    cpu.cycle_count()
}

pub fn cpu_step_bench(c: &mut Criterion) {
    let mut cpu = cpu_with_program("i486DX2/66", &ALU_LOOP);

    c.bench_function("cpu_step_alu_loop", |b| {
        b.iter(|| black_box(run_to_halt(&mut cpu)));
    });

    let mut cpu = cpu_with_program("Pentium 100/66", &FPU_LOOP);

    c.bench_function("cpu_step_fpu_loop", |b| {
        b.iter(|| black_box(run_to_halt(&mut cpu)));
    });
}

pub fn cpu_configure_bench(c: &mut Criterion) {
    let (manufacturer, idx) = find_model("Pentium Pro 200").unwrap();
    let mut cpu = CpuBuilder::new().with_model_name("8088/4.77").build().unwrap();

    c.bench_function("cpu_configure", |b| {
        b.iter(|| {
            cpu.configure(black_box(manufacturer.index()), black_box(idx)).unwrap();
        });
    });
}

criterion_group!(benches, cpu_step_bench, cpu_configure_bench);
criterion_main!(benches);
