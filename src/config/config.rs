/*
 * Copyright (c) 2024 Yunshan Networks
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use backtrace_utils::{CaptureOptions, NATIVE_CODE_PATH};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("log-level invalid: {0}")]
    LogLevelInvalid(String),
    #[error("native-code-path is empty")]
    NativeCodePathEmpty,
    #[error("yaml config invalid: {0}")]
    YamlConfigInvalid(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => Err(format!("unknown output format `{}`", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub log_level: String,
    pub log_file: Option<String>,
    pub native_code_path: String,
    pub ignored_top_frames: usize,
    pub ignored_bottom_frames: usize,
    pub include_debug: bool,
    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
            native_code_path: NATIVE_CODE_PATH.into(),
            ignored_top_frames: 0,
            ignored_bottom_frames: 0,
            include_debug: false,
            output: OutputFormat::default(),
        }
    }
}

impl Config {
    pub fn load_from_file<T: AsRef<Path>>(path: T) -> Result<Self, ConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::YamlConfigInvalid(e.to_string()))?;
        Self::load(&contents)
    }

    pub fn load<C: AsRef<str>>(contents: C) -> Result<Self, ConfigError> {
        let contents = contents.as_ref();
        if contents.trim().is_empty() {
            // parsing empty string leads to EOF error
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(contents)
            .map_err(|e| ConfigError::YamlConfigInvalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // flexi_logger specs such as "info, backtrace_utils=trace" are accepted
        // as long as the global level parses
        let global = self.log_level.split(',').next().unwrap_or("").trim();
        if !global.contains('=') && LevelFilter::from_str(global).is_err() {
            return Err(ConfigError::LogLevelInvalid(self.log_level.clone()));
        }
        if self.native_code_path.is_empty() {
            return Err(ConfigError::NativeCodePathEmpty);
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            ignored_top_frames: self.ignored_top_frames,
            ignored_bottom_frames: self.ignored_bottom_frames,
            include_debug: self.include_debug,
            native_code_path: self.native_code_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_contents_give_defaults() {
        assert_eq!(Config::load("").unwrap(), Config::default());
        assert_eq!(Config::load("\n  \n").unwrap(), Config::default());
    }

    #[test]
    fn kebab_case_keys() {
        let cfg = Config::load(
            "log-level: debug\n\
             native-code-path: <native>\n\
             ignored-top-frames: 2\n\
             ignored-bottom-frames: 1\n\
             include-debug: true\n\
             output: json\n",
        )
        .unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.output, OutputFormat::Json);
        let options = cfg.capture_options();
        assert_eq!(options.ignored_top_frames, 2);
        assert_eq!(options.ignored_bottom_frames, 1);
        assert!(options.include_debug);
        assert_eq!(options.native_code_path, "<native>");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::load("log-level: loud\n"),
            Err(ConfigError::LogLevelInvalid(_))
        ));
        assert!(matches!(
            Config::load("native-code-path: ''\n"),
            Err(ConfigError::NativeCodePathEmpty)
        ));
        assert!(matches!(
            Config::load("output: xml\n"),
            Err(ConfigError::YamlConfigInvalid(_))
        ));
    }

    #[test]
    fn module_specs_in_log_level() {
        let cfg = Config::load("log-level: warn, backtrace_utils=trace\n").unwrap();
        assert_eq!(cfg.log_level, "warn, backtrace_utils=trace");
    }

    #[test]
    fn output_format_from_cli() {
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
