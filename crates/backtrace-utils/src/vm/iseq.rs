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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IseqType {
    Top,
    Method,
    Block,
    Class,
    Rescue,
    Ensure,
    Eval,
    Main,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    pub position: usize,
    pub line: u32,
}

/// An instruction sequence: a compiled body of interpreted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iseq {
    pub kind: IseqType,
    pub label: String,
    pub base_label: String,
    pub path: Option<String>,
    pub absolute_path: Option<String>,
    pub first_lineno: u32,
    // name of the enclosing method body, if any
    pub method_name: Option<String>,
    pub size: usize,
    // sorted by position
    pub line_table: Vec<LineEntry>,
}

const DEFAULT_SIZE: usize = 64;

impl Iseq {
    fn new(kind: IseqType, label: String, base_label: String, path: &str, first_lineno: u32) -> Self {
        Iseq {
            kind,
            label,
            base_label,
            path: Some(path.to_string()),
            absolute_path: Some(path.to_string()),
            first_lineno,
            method_name: None,
            size: DEFAULT_SIZE,
            line_table: vec![LineEntry {
                position: 0,
                line: first_lineno,
            }],
        }
    }

    pub fn top(path: &str) -> Self {
        Self::new(IseqType::Top, "<main>".into(), "<main>".into(), path, 1)
    }

    pub fn method(name: &str, path: &str, first_lineno: u32) -> Self {
        let mut iseq = Self::new(IseqType::Method, name.into(), name.into(), path, first_lineno);
        iseq.method_name = Some(name.to_string());
        iseq
    }

    /// Body of `class Name` (or `module Name` when `module` is set).
    pub fn class_body(name: &str, module: bool, path: &str, first_lineno: u32) -> Self {
        let label = if module {
            format!("<module:{}>", name)
        } else {
            format!("<class:{}>", name)
        };
        Self::new(IseqType::Class, label.clone(), label, path, first_lineno)
    }

    /// A block nested directly in `parent`.
    pub fn block_in(parent: &Iseq, first_lineno: u32) -> Self {
        let depth = match parent.kind {
            IseqType::Block => parent.block_depth() + 1,
            _ => 1,
        };
        let label = if depth == 1 {
            format!("block in {}", parent.base_label)
        } else {
            format!("block ({} levels) in {}", depth, parent.base_label)
        };
        Iseq {
            kind: IseqType::Block,
            label,
            base_label: parent.base_label.clone(),
            path: parent.path.clone(),
            absolute_path: parent.absolute_path.clone(),
            first_lineno,
            method_name: parent.method_name.clone(),
            size: DEFAULT_SIZE,
            line_table: vec![LineEntry {
                position: 0,
                line: first_lineno,
            }],
        }
    }

    /// Code compiled by `eval` inside `parent`.
    pub fn eval_in(parent: &Iseq, first_lineno: u32) -> Self {
        Iseq {
            kind: IseqType::Eval,
            label: parent.label.clone(),
            base_label: parent.base_label.clone(),
            path: Some("(eval)".into()),
            absolute_path: None,
            first_lineno,
            method_name: parent.method_name.clone(),
            size: DEFAULT_SIZE,
            line_table: vec![LineEntry {
                position: 0,
                line: first_lineno,
            }],
        }
    }

    pub fn with_lines(mut self, lines: &[(usize, u32)]) -> Self {
        self.line_table = lines
            .iter()
            .map(|&(position, line)| LineEntry { position, line })
            .collect();
        self.line_table.sort_by_key(|e| e.position);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_absolute_path(mut self, absolute_path: Option<&str>) -> Self {
        self.absolute_path = absolute_path.map(str::to_string);
        self
    }

    pub fn is_block_or_eval(&self) -> bool {
        matches!(self.kind, IseqType::Block | IseqType::Eval)
    }

    /// Line of the last table entry at or before `position`.
    pub fn line_at(&self, position: usize) -> u32 {
        let idx = self.line_table.partition_point(|e| e.position <= position);
        match idx {
            0 => self.first_lineno,
            n => self.line_table[n - 1].line,
        }
    }

    fn block_depth(&self) -> usize {
        let Some(rest) = self.label.strip_prefix("block (") else {
            return 1;
        };
        rest.split_once(' ')
            .and_then(|(n, _)| n.parse().ok())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_block_labels() {
        let m = Iseq::method("work", "/app/w.rb", 3);
        let b1 = Iseq::block_in(&m, 4);
        let b2 = Iseq::block_in(&b1, 5);
        let b3 = Iseq::block_in(&b2, 6);
        assert_eq!(b1.label, "block in work");
        assert_eq!(b2.label, "block (2 levels) in work");
        assert_eq!(b3.label, "block (3 levels) in work");
        assert_eq!(b3.base_label, "work");
        assert_eq!(b3.method_name.as_deref(), Some("work"));
    }

    #[test]
    fn line_lookup_takes_last_entry_not_after_position() {
        let iseq = Iseq::method("m", "/a.rb", 10).with_lines(&[(0, 10), (4, 11), (9, 14)]);
        assert_eq!(iseq.line_at(0), 10);
        assert_eq!(iseq.line_at(3), 10);
        assert_eq!(iseq.line_at(4), 11);
        assert_eq!(iseq.line_at(8), 11);
        assert_eq!(iseq.line_at(40), 14);
    }

    #[test]
    fn empty_line_table_falls_back_to_first_line() {
        let iseq = Iseq::method("m", "/a.rb", 7).with_lines(&[]);
        assert_eq!(iseq.line_at(5), 7);
    }
}
