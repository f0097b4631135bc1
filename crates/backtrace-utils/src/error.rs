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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("unknown {kind} reference `{id}` in vm image")]
    UnknownReference { kind: &'static str, id: String },
    #[error("vm image: {0}")]
    Image(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Image(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Image(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
