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

use super::RawFrame;

/// Path given to native frames with no interpreted frame below them.
pub const NATIVE_CODE_PATH: &str = "(in native code)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub absolute_path: Option<String>,
    pub path: Option<String>,
    pub line_number: u32,
    pub synthetic: bool,
}

impl SourcePosition {
    fn of(frame: &RawFrame) -> Self {
        let iseq = frame.iseq.as_deref();
        SourcePosition {
            absolute_path: iseq.and_then(|i| i.absolute_path.clone()),
            path: iseq.and_then(|i| i.path.clone()),
            line_number: frame.line_number,
            synthetic: false,
        }
    }

    fn native(native_code_path: &str) -> Self {
        SourcePosition {
            absolute_path: Some(native_code_path.to_string()),
            path: Some(native_code_path.to_string()),
            line_number: 0,
            synthetic: true,
        }
    }
}

/// Source positions for `frames` (newest first). Native frames take the
/// position of the closest older interpreted frame.
pub fn propagate(frames: &[RawFrame], native_code_path: &str) -> Vec<SourcePosition> {
    let mut positions = Vec::with_capacity(frames.len());
    let mut last_interpreted: Option<SourcePosition> = None;
    for frame in frames.iter().rev() {
        let position = if frame.is_interpreted {
            let own = SourcePosition::of(frame);
            last_interpreted = Some(own.clone());
            own
        } else {
            match &last_interpreted {
                Some(source) => SourcePosition {
                    synthetic: true,
                    ..source.clone()
                },
                None => SourcePosition::native(native_code_path),
            }
        };
        positions.push(position);
    }
    positions.reverse();
    positions
}

/// The frame at `index` if interpreted, otherwise the closest older
/// interpreted one.
pub fn nearest_interpreted(frames: &[RawFrame], index: usize) -> Option<&RawFrame> {
    frames.get(index..)?.iter().find(|f| f.is_interpreted)
}

pub fn frame_filename(frames: &[RawFrame], index: usize, absolute: bool) -> Option<String> {
    let iseq = nearest_interpreted(frames, index)?.iseq.as_deref()?;
    if absolute {
        iseq.absolute_path.clone()
    } else {
        iseq.path.clone()
    }
}

pub fn frame_line_number(frames: &[RawFrame], index: usize) -> u32 {
    nearest_interpreted(frames, index).map_or(0, |f| f.line_number)
}
