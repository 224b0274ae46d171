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

    lib.rs

    The pcx86 headless front-end. Resolves the configuration, builds a CPU and either reports on
    it or runs a flat binary on it.

*/

#![forbid(unsafe_code)]

pub mod config;
pub mod report;
pub mod run_bin;

use colored::Colorize;

use pcx86_core::CpuBuilder;

pub fn run() {
    env_logger::init();

    // Resolve the configuration by parsing the configuration toml and merging it with
    // command line arguments.
    let config = match config::read_config_file("./pcx86.toml") {
        Ok(config) => config,
        Err(e) => match e.downcast_ref::<std::io::Error>() {
            Some(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("Configuration file given with --configfile was not found.");
                std::process::exit(1);
            }
            Some(e) => {
                eprintln!("Unknown IO error reading configuration file:\n{}", e);
                std::process::exit(1);
            }
            None => {
                eprintln!(
                    "Failed to parse configuration file. There may be a typo or otherwise invalid toml:\n{}",
                    e
                );
                std::process::exit(1);
            }
        },
    };

    if config.emulator.list_models {
        report::list_models();
        std::process::exit(0);
    }

    let mut cpu = CpuBuilder::from_config(&config.cpu).build().unwrap_or_else(|e| {
        eprintln!("Failed to build CPU: {}", e);
        std::process::exit(1);
    });

    if config.emulator.report || config.emulator.run_bin.is_none() {
        report::print_report(&cpu);
    }

    if let Some(path) = config.emulator.run_bin.as_ref() {
        match run_bin::run_file(
            &mut cpu,
            path,
            config.emulator.run_bin_seg,
            config.emulator.run_bin_ofs,
            config.emulator.max_instructions,
        ) {
            Ok(stats) => {
                let status = if stats.halted {
                    "halted".green()
                }
                else {
                    "instruction limit reached".yellow()
                };
                println!(
                    "{}: {} instructions, {} cycles, {} exceptions, {}",
                    path.display(),
                    stats.instructions,
                    stats.cycles,
                    stats.exceptions,
                    status
                );
                if config.emulator.report {
                    for line in cpu.bus.dump_io_stats() {
                        println!("{}", line);
                    }
                }
            }
            Err(e) => {
                eprintln!("{} {}", "Run failed:".red(), e);
                std::process::exit(1);
            }
        }
    }
}
