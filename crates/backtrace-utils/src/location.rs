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

use std::fmt;

use serde::Serialize;

use crate::capture::CaptureOptions;
use crate::frames::{
    frame_label, naming_rule, profile_frame, propagate, qualified_method_name, NamingRule,
    ProfileFrame, RawFrame, SourcePosition,
};
use crate::vm::{MethodKind, Runtime};

/// One resolved frame of a backtrace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub absolute_path: Option<String>,
    pub base_label: Option<String>,
    pub label: Option<String>,
    pub line_number: u32,
    pub relative_path: Option<String>,
    pub qualified_method_name: String,
    pub path_is_synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Raw classification data, attached on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub ruby_frame: bool,
    pub self_is_real_self: bool,
    pub self_or_self_class: String,
    pub pc: Option<usize>,
    pub method_kind: Option<MethodKind>,
    pub naming_rule: NamingRule,
    pub profile_frame: Option<ProfileFrame>,
}

impl Location {
    fn new<R: Runtime>(
        runtime: &R,
        frame: &RawFrame,
        position: SourcePosition,
        include_debug: bool,
    ) -> Self {
        let debug = include_debug.then(|| DebugInfo {
            ruby_frame: frame.is_interpreted,
            self_is_real_self: frame.receiver.is_real_self(),
            self_or_self_class: runtime.inspect(frame.receiver.value()),
            pc: frame.pc,
            method_kind: frame.method_kind,
            naming_rule: naming_rule(runtime, frame),
            profile_frame: profile_frame(runtime, frame),
        });
        Location {
            absolute_path: position.absolute_path,
            base_label: frame_label(frame, true),
            label: frame_label(frame, false),
            line_number: position.line_number,
            relative_path: position.path,
            qualified_method_name: qualified_method_name(runtime, frame),
            path_is_synthetic: position.synthetic,
            debug,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.relative_path.as_deref().unwrap_or("");
        let label = self.label.as_deref().unwrap_or("");
        if self.line_number != 0 {
            write!(f, "{}:{}:in '{}'", path, self.line_number, label)
        } else {
            write!(f, "{}:in '{}'", path, label)
        }
    }
}

/// Builds the locations of `frames` (newest first), dropping the
/// requested number of frames at each end. Positions are propagated over
/// the whole sequence before anything is dropped.
pub fn materialize<R: Runtime>(
    runtime: &R,
    frames: &[RawFrame],
    options: &CaptureOptions,
) -> Vec<Location> {
    let positions = propagate(frames, &options.native_code_path);
    let end = frames.len().saturating_sub(options.ignored_bottom_frames);
    let start = options.ignored_top_frames.min(end);
    frames[start..end]
        .iter()
        .zip(positions.into_iter().skip(start))
        .map(|(frame, position)| Location::new(runtime, frame, position, options.include_debug))
        .collect()
}
