// Copyright 2022 Google LLC
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

// Note that clippy attributes should be in sync with those declared in "lib.rs"
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use clap::Parser;
use log::info;

use dspadpcm::config;
use dspadpcm::error::Verify;
use dspadpcm::source::Source;

mod display;
mod source;

use display::Progress;
use source::HoundSource;

/// DSP-ADPCM encoder.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path for the output .dsp file.
    #[clap(short, long)]
    output: String,
    /// Path for the input WAV file (16-bit integer PCM).
    source: String,
    /// If set, load config from the specified file.
    #[clap(short, long)]
    config: Option<String>,
    /// If set, dump the config used to the specified path.
    #[clap(long)]
    dump_config: Option<String>,
    /// Loop start in samples. Must be given with `--loop-end`.
    #[clap(long, requires = "loop_end")]
    loop_start: Option<usize>,
    /// Loop end in samples. Must be given with `--loop-start`.
    #[clap(long, requires = "loop_start")]
    loop_end: Option<usize>,
}

/// Exit codes of the encoder process.
enum ExitCode {
    #[allow(dead_code)]
    Normal = 0,
    InvalidConfig = -1,
}

/// Writes the finished .dsp image to `path`.
///
/// The image is fully built before this function is called, so the target
/// file is only created when encoding succeeded.
fn write_dsp_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> std::io::Result<usize> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(bytes.len())
}

fn log_build_constants() {
    info!(
        target: "dspadpcm-bin::build_info::jsonl",
        "{{ version: \"{}\", cli_version: \"{}\" }}",
        dspadpcm::constant::build_info::CRATE_VERSION,
        env!("CARGO_PKG_VERSION"),
    );
}

#[allow(clippy::let_underscore_must_use, clippy::expect_used)]
fn main_body(args: Args) -> Result<(), i32> {
    let io_info = display::IoArgs::new(&args.config, &args.source, &args.output);
    let _ = display::show_banner();
    log_build_constants();
    let encoder_config = args.config.map_or_else(config::Encoder::default, |path| {
        let conf_str = std::fs::read_to_string(path).expect("Config file read error.");
        toml::from_str(&conf_str).expect("Config file syntax error.")
    });
    if let Err(e) = encoder_config.verify() {
        eprintln!("Error: {}", e.within("encoder_config"));
        return Err(ExitCode::InvalidConfig as i32);
    }

    let _ = display::show_progress(&io_info, &Progress::Started);

    let mut source = HoundSource::from_path(&args.source).expect("Failed to load input source.");
    if let (Some(start), Some(end)) = (args.loop_start, args.loop_end) {
        source = source.with_loop(start, end);
    }
    info!(
        target: "dspadpcm-bin::source::jsonl",
        "{{ file_size: {:?}, duration_secs: {} }}",
        source.file_size(),
        source.duration_as_secs(),
    );
    let sample_count = source.len();
    let encoder_start = Instant::now();

    let bytes = dspadpcm::encode_to_dsp(&encoder_config, &source).expect("Encoder error.");
    let encode_time = encoder_start.elapsed();

    if let Some(path) = args.dump_config {
        let mut file = File::create(path).expect("Failed to create a file.");
        file.write_all(
            toml::to_string(&encoder_config)
                .expect("Config serialization failed.")
                .as_bytes(),
        )
        .expect("File write failed.");
    }

    let bytes_written = write_dsp_file(&args.output, &bytes).expect("Failed to write the output.");

    let _ = display::show_progress(
        &io_info,
        &Progress::Done {
            encode_time,
            bytes_written,
            sample_count,
        },
    );
    Ok(())
}

fn main() -> Result<(), i32> {
    env_logger::Builder::from_env("DSPENC_LOG")
        .format_timestamp(None)
        .init();
    main_body(Args::parse())
}
