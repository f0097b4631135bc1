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

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::info;

use ::backtracie::{
    backtrace_utils::vm::image::VmImage,
    config::{Config, OutputFormat},
    logger,
    report::{self, Selection},
};

#[derive(Parser)]
struct Opts {
    /// Specify config file location
    #[clap(short = 'f', long)]
    config_file: Option<String>,

    /// VM image to capture from, JSON for .json files and YAML otherwise
    #[clap(short, long, required_unless_present = "version")]
    image: Option<String>,

    /// Only capture this thread of the image
    #[clap(short, long)]
    thread: Option<String>,

    /// Capture caller locations of the image's current thread
    #[clap(long, conflicts_with = "thread")]
    caller: bool,

    /// Attach raw frame data to every location
    #[clap(long)]
    debug: bool,

    /// Output format: text, json or yaml
    #[clap(long)]
    output: Option<OutputFormat>,

    /// Display the version
    #[clap(short, long, action = ArgAction::SetTrue)]
    version: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    if opts.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = match &opts.config_file {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config file {}", path))?,
        None => Config::default(),
    };
    if opts.debug {
        config.include_debug = true;
    }
    if let Some(output) = opts.output {
        config.output = output;
    }
    let _logger = logger::init(&config)?;

    let image_path = opts.image.context("no vm image given")?;
    let image = VmImage::load_from_file(&image_path)
        .and_then(|image| image.build())
        .with_context(|| format!("loading vm image {}", image_path))?;
    info!("loaded {} threads from {}", image.threads().len(), image_path);

    let selection = Selection {
        thread: opts.thread,
        caller: opts.caller,
    };
    let reports = report::capture(&image, &selection, &config.capture_options())?;
    print!("{}", report::render(&reports, config.output)?);
    Ok(())
}
