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

    coreconfig.rs

    Defines the processor section of a front-end configuration file, and the CoreConfig trait
    a front-end implements to hand its resolved settings to the core.

*/

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Deserializer};

use crate::{
    cpu_common::{models::find_model, Manufacturer, TraceMode},
    cpu_x86::timing::VideoTimingPreset,
};

/// A model is selected either by its table name ("Pentium 100/66") or by its index within the
/// manufacturer's table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSelect {
    Name(String),
    Index(usize),
}

impl Default for ModelSelect {
    fn default() -> Self {
        ModelSelect::Index(0)
    }
}

impl fmt::Display for ModelSelect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelSelect::Name(name) => write!(f, "{}", name),
            ModelSelect::Index(idx) => write!(f, "#{}", idx),
        }
    }
}

impl FromStr for ModelSelect {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().parse::<usize>() {
            Ok(idx) => Ok(ModelSelect::Index(idx)),
            Err(_) if !s.trim().is_empty() => Ok(ModelSelect::Name(s.trim().to_string())),
            Err(_) => Err("Empty model name".to_string()),
        }
    }
}

impl ModelSelect {
    /// Resolve to (manufacturer index, model index). A name carries its own manufacturer and
    /// overrides the one given.
    pub fn resolve(&self, manufacturer: Manufacturer) -> Result<(usize, usize), String> {
        match self {
            ModelSelect::Index(idx) => Ok((manufacturer.index(), *idx)),
            ModelSelect::Name(name) => find_model(name)
                .map(|(m, idx)| (m.index(), idx))
                .map_err(|e| e.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for ModelSelect {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ModelVisitor;

        impl<'de> serde::de::Visitor<'de> for ModelVisitor {
            type Value = ModelSelect;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a model name like 'Pentium 100/66', or a model index")
            }

            fn visit_str<E>(self, value: &str) -> Result<ModelSelect, E>
            where
                E: serde::de::Error,
            {
                value.parse::<ModelSelect>().map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<ModelSelect, E>
            where
                E: serde::de::Error,
            {
                Ok(ModelSelect::Index(value as usize))
            }

            fn visit_i64<E>(self, value: i64) -> Result<ModelSelect, E>
            where
                E: serde::de::Error,
            {
                usize::try_from(value)
                    .map(ModelSelect::Index)
                    .map_err(|_| E::custom(format!("model index {} out of range", value)))
            }
        }

        deserializer.deserialize_any(ModelVisitor)
    }
}

fn _default_true() -> bool {
    true
}

/// The `[cpu]` table of a configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct CpuConfig {
    #[serde(default)]
    pub manufacturer: Manufacturer,
    #[serde(default)]
    pub model: ModelSelect,
    #[serde(default)]
    pub waitstates: u32,
    #[serde(default = "_default_true")]
    pub cache_internal: bool,
    #[serde(default)]
    pub cache_external: bool,
    #[serde(default)]
    pub external_fpu: bool,
    #[serde(default)]
    pub video_timing: VideoTimingPreset,
    #[serde(default)]
    pub trace_mode: TraceMode,
    pub trace_file: Option<PathBuf>,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            manufacturer: Manufacturer::default(),
            model: ModelSelect::default(),
            waitstates: 0,
            cache_internal: true,
            cache_external: false,
            external_fpu: false,
            video_timing: VideoTimingPreset::default(),
            trace_mode: TraceMode::None,
            trace_file: None,
        }
    }
}

/// Settings a front-end provides to build a core.
pub trait CoreConfig {
    fn get_manufacturer(&self) -> Manufacturer;
    fn get_model(&self) -> ModelSelect;
    fn get_waitstates(&self) -> u32;
    fn get_cache(&self) -> (bool, bool);
    fn get_external_fpu(&self) -> bool;
    fn get_video_timing(&self) -> VideoTimingPreset;
    fn get_trace_mode(&self) -> TraceMode;
    fn get_trace_file(&self) -> Option<PathBuf>;
}

impl CoreConfig for CpuConfig {
    fn get_manufacturer(&self) -> Manufacturer {
        self.manufacturer
    }
    fn get_model(&self) -> ModelSelect {
        self.model.clone()
    }
    fn get_waitstates(&self) -> u32 {
        self.waitstates
    }
    fn get_cache(&self) -> (bool, bool) {
        (self.cache_internal, self.cache_external)
    }
    fn get_external_fpu(&self) -> bool {
        self.external_fpu
    }
    fn get_video_timing(&self) -> VideoTimingPreset {
        self.video_timing
    }
    fn get_trace_mode(&self) -> TraceMode {
        self.trace_mode
    }
    fn get_trace_file(&self) -> Option<PathBuf> {
        self.trace_file.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_name() {
        let config: CpuConfig = toml::from_str(
            r#"
            manufacturer = "Cyrix"
            model = "Cx6x86/PR150+"
            waitstates = 2
            video_timing = "bus_fast"
            trace_mode = "Instruction"
            "#,
        )
        .unwrap();
        assert_eq!(config.manufacturer, Manufacturer::Cyrix);
        assert_eq!(config.model, ModelSelect::Name("Cx6x86/PR150+".to_string()));
        assert_eq!(config.video_timing, VideoTimingPreset::BusFast);
        assert_eq!(config.trace_mode, TraceMode::Instruction);
        assert!(config.cache_internal);
        let (m, idx) = config.model.resolve(config.manufacturer).unwrap();
        assert_eq!(m, Manufacturer::Cyrix.index());
        assert_eq!(crate::cpu_common::models::lookup(m, idx).unwrap().name, "Cx6x86/PR150+");
    }

    #[test]
    fn test_parse_by_index() {
        let config: CpuConfig = toml::from_str("manufacturer = 1\nmodel = 3\nvideo_timing = 4").unwrap();
        assert_eq!(config.manufacturer, Manufacturer::Amd);
        assert_eq!(config.model, ModelSelect::Index(3));
        assert_eq!(config.video_timing, VideoTimingPreset::BusMedium);
        assert_eq!(config.model.resolve(config.manufacturer).unwrap(), (1, 3));
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert!(toml::from_str::<CpuConfig>("manufacturer = \"Motorola\"").is_err());
        assert!(toml::from_str::<CpuConfig>("video_timing = \"agp\"").is_err());
        assert!(toml::from_str::<CpuConfig>("video_timing = 6").is_err());
        let config: CpuConfig = toml::from_str("model = \"80787\"").unwrap();
        // Numeric strings select by index.
        assert_eq!(config.model, ModelSelect::Index(80787));
        let config: CpuConfig = toml::from_str("model = \"Z80\"").unwrap();
        assert!(config.model.resolve(Manufacturer::Intel).is_err());
    }
}
