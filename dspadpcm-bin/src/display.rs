// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A module for a fancy output for "dspadpcm-bin".

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use termcolor::Color;
use termcolor::ColorChoice;
use termcolor::ColorSpec;
use termcolor::StandardStream;
use termcolor::WriteColor;

const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
    Some(v) => v,
    None => "unknown",
};
const DEFAULT_CONFIG_NAME: &str = "[default]";
const UNKNOWN_CONFIG_NAME: &str = "[unknown]";
const UNKNOWN_INPUT_NAME: &str = "[unknown]";
const UNKNOWN_OUTPUT_NAME: &str = "[unknown]";

pub struct IoArgs {
    config_path: Option<PathBuf>,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl IoArgs {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        config_path: &Option<P>,
        input_path: Q,
        output_path: R,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().map(|x| x.as_ref().to_path_buf()),
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
        }
    }

    pub fn output_name(&self) -> String {
        self.output_path.file_name().map_or_else(
            || UNKNOWN_OUTPUT_NAME.to_owned(),
            |s| s.to_string_lossy().to_string(),
        )
    }

    pub fn input_name(&self) -> String {
        self.input_path.file_name().map_or_else(
            || UNKNOWN_INPUT_NAME.to_owned(),
            |s| s.to_string_lossy().to_string(),
        )
    }

    pub fn config_name(&self) -> String {
        self.config_path.as_ref().map_or_else(
            || DEFAULT_CONFIG_NAME.to_owned(),
            |p| {
                p.file_stem().map_or_else(
                    || UNKNOWN_CONFIG_NAME.to_owned(),
                    |n| n.to_string_lossy().to_string(),
                )
            },
        )
    }
}

pub enum Progress {
    Started,
    Done {
        encode_time: Duration,
        bytes_written: usize,
        sample_count: usize,
    },
}

/// Returns encoding throughput in samples per millisecond.
pub fn samples_per_millisecond(sample_count: usize, elapsed: Duration) -> f64 {
    let millis = elapsed.as_secs_f64() * 1000.0;
    if millis > 0.0 {
        sample_count as f64 / millis
    } else {
        0.0
    }
}

fn terminal_output() -> StandardStream {
    StandardStream::stderr(ColorChoice::Auto)
}

/// Show the initial banner.
pub fn show_banner() -> Result<(), std::io::Error> {
    let termout = terminal_output();
    let mut termout = termout.lock();
    termout.set_color(ColorSpec::new().set_bold(true))?;
    write!(termout, "\n{:>10} ", "dspenc")?;
    termout.reset()?;
    writeln!(
        termout,
        "(engine v{}, CLI v{})",
        dspadpcm::constant::build_info::CRATE_VERSION,
        CRATE_VERSION
    )
}

pub fn show_progress(io: &IoArgs, progress: &Progress) -> Result<(), std::io::Error> {
    let termout = terminal_output();
    let mut termout = termout.lock();
    match *progress {
        Progress::Started => {
            termout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
            write!(termout, "{:>10} ", "Encoding")?;
            termout.reset()?;
            writeln!(
                termout,
                "{} => {} [{}]",
                io.input_name(),
                io.output_name(),
                io.config_name()
            )
        }
        Progress::Done {
            encode_time,
            bytes_written,
            sample_count,
        } => {
            termout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
            write!(termout, "{:>10} ", "Encoded")?;
            termout.reset()?;
            writeln!(termout, "{} [{} bytes]", io.output_name(), bytes_written)?;
            termout.set_color(ColorSpec::new().set_bold(true))?;
            write!(termout, "{:>10} ", "Time")?;
            termout.reset()?;
            writeln!(
                termout,
                "{:.3} ms ({:.1} samples/ms)",
                encode_time.as_secs_f64() * 1000.0,
                samples_per_millisecond(sample_count, encode_time)
            )?;
            writeln!(termout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_names() {
        let io = IoArgs::new(&Some("conf/fast.toml"), "in/a.wav", "out/a.dsp");
        assert_eq!(io.config_name(), "fast");
        assert_eq!(io.input_name(), "a.wav");
        assert_eq!(io.output_name(), "a.dsp");

        let io = IoArgs::new::<&str, _, _>(&None, "a.wav", "a.dsp");
        assert_eq!(io.config_name(), DEFAULT_CONFIG_NAME);
    }

    #[test]
    fn throughput() {
        let rate = samples_per_millisecond(32000, Duration::from_millis(16));
        assert!((rate - 2000.0).abs() < 1e-6);
        assert_eq!(samples_per_millisecond(100, Duration::ZERO), 0.0);
    }
}
