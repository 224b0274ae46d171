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

    cpu_common::builder.rs

    Implements a builder that assembles and configures a CpuContext from front-end settings.

*/

use crate::{
    bus::BusInterface,
    coreconfig::{CoreConfig, ModelSelect},
    cpu_common::{Manufacturer, TraceMode},
    cpu_x86::{timing::VideoTimingPreset, CpuContext},
    tracelogger::TraceLogger,
};
use anyhow::{bail, Result};

/// Default conventional memory size for a bare core.
pub const DEFAULT_MEMORY_SIZE: usize = 0x10_0000;

#[derive(Default)]
pub struct CpuBuilder {
    manufacturer: Manufacturer,
    model: Option<ModelSelect>,
    memory_size: Option<usize>,
    waitstates: u32,
    cache: Option<(bool, bool)>,
    external_fpu: bool,
    video_timing: VideoTimingPreset,
    trace_mode: TraceMode,
    trace_logger: Option<TraceLogger>,
}

impl CpuBuilder {
    pub fn new() -> CpuBuilder {
        CpuBuilder { ..Default::default() }
    }

    /// Seed every field from a front-end configuration. Later `with_` calls still apply.
    pub fn from_config(config: &impl CoreConfig) -> CpuBuilder {
        let mut builder = CpuBuilder::new()
            .with_manufacturer(config.get_manufacturer())
            .with_model(config.get_model())
            .with_waitstates(config.get_waitstates())
            .with_cache(config.get_cache())
            .with_external_fpu(config.get_external_fpu())
            .with_video_timing(config.get_video_timing())
            .with_trace_mode(config.get_trace_mode());
        if let Some(path) = config.get_trace_file() {
            builder = builder.with_trace_logger(TraceLogger::from_filename(path));
        }
        builder
    }

    /// Build and configure the core, then reset it to its power-on state.
    pub fn build(&mut self) -> Result<CpuContext> {
        let Some(model) = self.model.as_ref()
        else {
            bail!("A CPU model is required.");
        };

        let (manufacturer_idx, model_idx) = match model.resolve(self.manufacturer) {
            Ok(indices) => indices,
            Err(e) => bail!("Couldn't resolve CPU model {}: {}", model, e),
        };

        let mut cpu = CpuContext::new(BusInterface::new(self.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE)));
        cpu.settings.external_fpu = self.external_fpu;
        cpu.settings.waitstates = self.waitstates;
        if let Some((internal, external)) = self.cache {
            cpu.settings.cache.internal = internal;
            cpu.settings.cache.external = external;
        }
        cpu.settings.video_timing = self.video_timing;

        cpu.configure(manufacturer_idx, model_idx)?;

        let logger = self.trace_logger.take().unwrap_or_default();
        if self.trace_mode != TraceMode::None && !logger.is_some() {
            log::warn!("Trace mode {:?} selected without a trace destination", self.trace_mode);
        }
        cpu.set_trace_logger(logger, self.trace_mode);
        cpu.reset();

        log::debug!(
            "Built CPU: {} ({}) with {} waitstates",
            cpu.model.descriptor.name,
            cpu.cpu_type(),
            self.waitstates
        );
        Ok(cpu)
    }

    pub fn with_manufacturer(mut self, manufacturer: Manufacturer) -> Self {
        self.manufacturer = manufacturer;
        self
    }

    pub fn with_model(mut self, model: ModelSelect) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_model_name(mut self, name: &str) -> Self {
        self.model = Some(ModelSelect::Name(name.to_string()));
        self
    }

    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = Some(size);
        self
    }

    pub fn with_waitstates(mut self, waitstates: u32) -> Self {
        self.waitstates = waitstates;
        self
    }

    pub fn with_cache(mut self, (internal, external): (bool, bool)) -> Self {
        self.cache = Some((internal, external));
        self
    }

    pub fn with_external_fpu(mut self, external_fpu: bool) -> Self {
        self.external_fpu = external_fpu;
        self
    }

    pub fn with_video_timing(mut self, preset: VideoTimingPreset) -> Self {
        self.video_timing = preset;
        self
    }

    pub fn with_trace_mode(mut self, trace_mode: TraceMode) -> Self {
        self.trace_mode = trace_mode;
        self
    }

    pub fn with_trace_logger(mut self, trace_logger: TraceLogger) -> Self {
        self.trace_logger = Some(trace_logger);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coreconfig::CpuConfig, cpu_common::CpuType};

    #[test]
    fn test_build_by_name() {
        let cpu = CpuBuilder::new().with_model_name("Pentium MMX 200").build().unwrap();
        assert_eq!(cpu.cpu_type(), CpuType::PentiumMmx);
        assert_eq!(cpu.regs.eip, 0xFFF0);
    }

    #[test]
    fn test_build_requires_model() {
        assert!(CpuBuilder::new().build().is_err());
        assert!(CpuBuilder::new().with_model_name("68000").build().is_err());
        assert!(CpuBuilder::new()
            .with_manufacturer(Manufacturer::Idt)
            .with_model(ModelSelect::Index(99))
            .build()
            .is_err());
    }

    #[test]
    fn test_build_from_config() {
        let config = CpuConfig {
            manufacturer: Manufacturer::Intel,
            model: ModelSelect::Name("286/12".to_string()),
            external_fpu: true,
            waitstates: 1,
            ..Default::default()
        };
        let cpu = CpuBuilder::from_config(&config).build().unwrap();
        assert_eq!(cpu.cpu_type(), CpuType::Intel286);
        assert!(cpu.model.hasfpu);
        assert_eq!(cpu.settings.waitstates, 1);
    }
}
