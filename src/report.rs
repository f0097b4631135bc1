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

//! Capturing the threads of a loaded image and rendering the results.

use std::fmt::Write;

use log::{debug, info};
use serde::Serialize;

use backtrace_utils::vm::image::LoadedImage;
use backtrace_utils::{
    backtrace_locations, caller_locations, CaptureOptions, Location, Runtime,
};

use crate::config::OutputFormat;
use crate::error::{Error, Result};

/// Locations of one thread; `None` when the thread is dead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadReport {
    pub thread: String,
    pub locations: Option<Vec<Location>>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Only this thread, all threads when unset.
    pub thread: Option<String>,
    /// Use caller semantics on the current thread.
    pub caller: bool,
}

pub fn capture(
    image: &LoadedImage,
    selection: &Selection,
    options: &CaptureOptions,
) -> Result<Vec<ThreadReport>> {
    let vm = &image.vm;
    if selection.caller {
        let current = vm.current_thread();
        let name = image
            .threads()
            .iter()
            .find(|(_, id)| *id == current)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| current.to_string());
        info!("capturing caller locations of thread {}", name);
        return Ok(vec![ThreadReport {
            thread: name,
            locations: caller_locations(vm, options)?,
        }]);
    }

    let threads: Vec<_> = match &selection.thread {
        Some(wanted) => {
            let found = image
                .threads()
                .iter()
                .find(|(name, _)| name == wanted)
                .ok_or_else(|| Error::ThreadNotFound(wanted.clone()))?;
            vec![found.clone()]
        }
        None => image.threads().to_vec(),
    };
    let mut reports = Vec::with_capacity(threads.len());
    for (name, id) in threads {
        let locations = backtrace_locations(vm, id, options)?;
        debug!(
            "thread {}: {}",
            name,
            locations
                .as_ref()
                .map_or("dead".to_string(), |l| format!("{} locations", l.len()))
        );
        reports.push(ThreadReport {
            thread: name,
            locations,
        });
    }
    Ok(reports)
}

pub fn render(reports: &[ThreadReport], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(reports)? + "\n"),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(reports)?),
        OutputFormat::Text => Ok(render_text(reports)),
    }
}

fn render_text(reports: &[ThreadReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let Some(locations) = &report.locations else {
            let _ = writeln!(out, "thread {} (dead)", report.thread);
            continue;
        };
        let _ = writeln!(out, "thread {}", report.thread);
        for location in locations {
            let _ = write!(out, "  {}  {}", location, location.qualified_method_name);
            if location.path_is_synthetic {
                out.push_str(" (synthetic)");
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(path: &str, line_number: u32, label: &str, name: &str, synthetic: bool) -> Location {
        Location {
            absolute_path: Some(path.to_string()),
            base_label: Some(label.to_string()),
            label: Some(label.to_string()),
            line_number,
            relative_path: Some(path.to_string()),
            qualified_method_name: name.to_string(),
            path_is_synthetic: synthetic,
            debug: None,
        }
    }

    #[test]
    fn text_rendering() {
        let reports = vec![
            ThreadReport {
                thread: "main".into(),
                locations: Some(vec![
                    location("/app/a.rb", 3, "times", "Integer#times", true),
                    location("/app/a.rb", 3, "<main>", "Object$<main>#<main>", false),
                ]),
            },
            ThreadReport {
                thread: "worker".into(),
                locations: None,
            },
        ];
        assert_eq!(
            render(&reports, OutputFormat::Text).unwrap(),
            "thread main\n\
             \x20 /app/a.rb:3:in 'times'  Integer#times (synthetic)\n\
             \x20 /app/a.rb:3:in '<main>'  Object$<main>#<main>\n\
             thread worker (dead)\n"
        );
    }

    #[test]
    fn json_rendering_keeps_dead_threads() {
        let reports = vec![ThreadReport {
            thread: "worker".into(),
            locations: None,
        }];
        let value: serde_json::Value =
            serde_json::from_str(&render(&reports, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(value[0]["thread"], "worker");
        assert!(value[0]["locations"].is_null());
    }
}
