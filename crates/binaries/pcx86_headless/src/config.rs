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

    config.rs

    Reads the headless front-end configuration from a TOML file and overlays command line
    arguments on top of it.

*/

use std::path::{Path, PathBuf};

use bpaf::Bpaf;
use serde_derive::Deserialize;

use pcx86_core::{
    coreconfig::{CpuConfig, ModelSelect},
    cpu_common::{Manufacturer, TraceMode},
    cpu_x86::timing::VideoTimingPreset,
};

#[derive(Debug, Default, Bpaf)]
#[bpaf(options, version, generate(cli_args))]
pub struct CmdLineArgs {
    #[bpaf(long("config_file"), long("configfile"))]
    pub config_file: Option<PathBuf>,

    /// Print the model table and exit
    #[bpaf(long("list_models"), switch)]
    pub list_models: bool,

    /// Print CPUID, feature and timing details for the configured model
    #[bpaf(long, switch)]
    pub report: bool,

    #[bpaf(long)]
    pub manufacturer: Option<Manufacturer>,
    /// Model name or index
    #[bpaf(long)]
    pub model: Option<ModelSelect>,
    #[bpaf(long)]
    pub waitstates: Option<u32>,
    #[bpaf(long("no_cache"), switch)]
    pub no_cache: bool,
    #[bpaf(long("external_fpu"), switch)]
    pub external_fpu: bool,
    #[bpaf(long("video_timing"))]
    pub video_timing: Option<VideoTimingPreset>,

    #[bpaf(long("trace_mode"))]
    pub trace_mode: Option<TraceMode>,
    #[bpaf(long("trace_file"))]
    pub trace_file: Option<PathBuf>,

    #[bpaf(long("run_bin"))]
    pub run_bin: Option<PathBuf>,
    #[bpaf(long("run_bin_seg"))]
    pub run_bin_seg: Option<u16>,
    #[bpaf(long("run_bin_ofs"))]
    pub run_bin_ofs: Option<u16>,
    #[bpaf(long("max_instructions"))]
    pub max_instructions: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Emulator {
    #[serde(default)]
    pub list_models: bool,
    #[serde(default)]
    pub report: bool,
    pub run_bin: Option<PathBuf>,
    pub run_bin_seg: Option<u16>,
    pub run_bin_ofs: Option<u16>,
    pub max_instructions: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFileParams {
    #[serde(default)]
    pub emulator: Emulator,
    #[serde(default)]
    pub cpu: CpuConfig,
}

impl ConfigFileParams {
    pub fn overlay(&mut self, shell_args: CmdLineArgs) {
        self.emulator.list_models |= shell_args.list_models;
        self.emulator.report |= shell_args.report;

        if let Some(manufacturer) = shell_args.manufacturer {
            self.cpu.manufacturer = manufacturer;
        }
        if let Some(model) = shell_args.model {
            self.cpu.model = model;
        }
        if let Some(waitstates) = shell_args.waitstates {
            self.cpu.waitstates = waitstates;
        }
        if shell_args.no_cache {
            self.cpu.cache_internal = false;
            self.cpu.cache_external = false;
        }
        self.cpu.external_fpu |= shell_args.external_fpu;
        if let Some(video_timing) = shell_args.video_timing {
            self.cpu.video_timing = video_timing;
        }

        if let Some(trace_mode) = shell_args.trace_mode {
            self.cpu.trace_mode = trace_mode;
        }
        if let Some(trace_file) = shell_args.trace_file {
            self.cpu.trace_file = Some(trace_file);
        }

        if let Some(run_bin) = shell_args.run_bin {
            self.emulator.run_bin = Some(run_bin);
        }
        if let Some(run_bin_seg) = shell_args.run_bin_seg {
            self.emulator.run_bin_seg = Some(run_bin_seg);
        }
        if let Some(run_bin_ofs) = shell_args.run_bin_ofs {
            self.emulator.run_bin_ofs = Some(run_bin_ofs);
        }
        if let Some(max_instructions) = shell_args.max_instructions {
            self.emulator.max_instructions = Some(max_instructions);
        }
    }
}

pub fn read_config(toml_string: impl AsRef<str>, shell_args: CmdLineArgs) -> Result<ConfigFileParams, anyhow::Error> {
    let mut toml_args: ConfigFileParams = toml::from_str(toml_string.as_ref())?;

    // Command line arguments override config file arguments
    toml_args.overlay(shell_args);
    Ok(toml_args)
}

/// Read the TOML configuration from a file path, parse and overlay command line arguments.
///
/// A missing file at the default path is not an error; the headless front-end can be driven
/// entirely from the command line. A missing file named with --config_file is.
pub fn read_config_file<P>(default_path: P) -> Result<ConfigFileParams, anyhow::Error>
where
    P: AsRef<Path>,
{
    log::debug!("Reading command line arguments...");
    let shell_args = cli_args().run();

    let toml_string = if let Some(configfile_path) = shell_args.config_file.as_ref() {
        std::fs::read_to_string(configfile_path)?
    }
    else {
        match std::fs::read_to_string(default_path.as_ref()) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "No configuration file at {}, using defaults",
                    default_path.as_ref().display()
                );
                String::new()
            }
            Err(e) => return Err(e.into()),
        }
    };

    read_config(toml_string, shell_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [emulator]
        run_bin = "test.bin"
        run_bin_seg = 0x1000

        [cpu]
        manufacturer = "AMD"
        model = 2
        waitstates = 1
        video_timing = "isa16_fast"
    "#;

    #[test]
    fn test_file_only() {
        let config = read_config(CONFIG, CmdLineArgs::default()).unwrap();
        assert_eq!(config.cpu.manufacturer, Manufacturer::Amd);
        assert_eq!(config.cpu.model, ModelSelect::Index(2));
        assert_eq!(config.cpu.video_timing, VideoTimingPreset::Isa16BitFast);
        assert_eq!(config.emulator.run_bin_seg, Some(0x1000));
        assert_eq!(config.emulator.run_bin_ofs, None);
        assert!(config.cpu.cache_internal);
    }

    #[test]
    fn test_command_line_wins() {
        let args = CmdLineArgs {
            model: Some(ModelSelect::Name("Pentium Pro 200".to_string())),
            waitstates: Some(3),
            no_cache: true,
            trace_mode: Some(TraceMode::Instruction),
            run_bin_seg: Some(0x2000),
            ..Default::default()
        };
        let config = read_config(CONFIG, args).unwrap();
        assert_eq!(config.cpu.model, ModelSelect::Name("Pentium Pro 200".to_string()));
        assert_eq!(config.cpu.waitstates, 3);
        assert!(!config.cpu.cache_internal);
        assert_eq!(config.cpu.trace_mode, TraceMode::Instruction);
        assert_eq!(config.emulator.run_bin_seg, Some(0x2000));
        // Untouched by the command line.
        assert_eq!(config.cpu.manufacturer, Manufacturer::Amd);
        assert_eq!(config.emulator.run_bin, Some(PathBuf::from("test.bin")));
    }

    #[test]
    fn test_empty_config() {
        let config = read_config("", CmdLineArgs::default()).unwrap();
        assert_eq!(config.cpu.model, ModelSelect::Index(0));
        assert!(!config.emulator.report);
    }

    #[test]
    fn test_bad_config() {
        assert!(read_config("[cpu]\nvideo_timing = \"agp\"", CmdLineArgs::default()).is_err());
    }
}
