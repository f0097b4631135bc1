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

use flexi_logger::{colored_opt_format, Duplicate, FileSpec, Logger, LoggerHandle};

use crate::config::Config;
use crate::error::Result;

/// Starts logging to stderr, or to `log-file` with a copy on stderr.
///
/// The returned handle must be kept alive for as long as logs are wanted.
pub fn init(config: &Config) -> Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str(&config.log_level)?.format(colored_opt_format);
    let logger = match &config.log_file {
        Some(path) => logger
            .log_to_file(FileSpec::try_from(path)?)
            .append()
            .duplicate_to_stderr(Duplicate::All),
        None => logger.log_to_stderr(),
    };
    Ok(logger.start()?)
}
