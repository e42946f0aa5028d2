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

#![doc = include_str!("../README.md")]
// Note that clippy attributes should be in sync with those declared in "main.rs"
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
// Some of clippy::pedantic rules are actually useful, so use it with a lot of
// ad-hoc exceptions.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_const_for_fn,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::wildcard_dependencies
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

#[cfg(feature = "log")]
#[macro_use]
extern crate log;

pub mod adpcm;
pub mod bytesink;
pub(crate) mod coding;
pub mod coefs;
pub mod component;
pub mod config;
pub mod constant;
pub mod container;
pub mod error;
#[cfg(feature = "par")]
pub(crate) mod par;
#[cfg(any(test, feature = "__export_sigen"))]
pub mod sigen;
pub mod source;

#[cfg(test)]
pub mod test_helper;

// import global entry points
pub use coding::encode_channel;
pub use coding::encode_stream;
pub use coding::encode_to_dsp;

#[cfg(all(test, feature = "serde"))]
mod test {
    // end-to-end, but transparent test.
    use super::*;
    use crate::sigen::Signal;
    use crate::source::PcmBuffer;
    use crate::source::Source;
    use rstest::rstest;

    const CONFIGS: [&str; 5] = [
        "",
        r"
multithread = false
        ",
        r"
workers = 2
        ",
        r"
[container]
samples_per_interleave = 7168
        ",
        r"
[container]
loop_point_alignment = 1792
trim_file = false
        ",
    ];

    fn make_source(channels: usize, len: usize) -> PcmBuffer {
        let signals: Vec<Box<dyn Signal>> = (0..channels)
            .map(|ch| {
                Box::new(
                    sigen::Sine::new(36 + ch * 17, 0.4)
                        .noise_with_seed(ch as u64 + 123, 0.01),
                ) as Box<dyn Signal>
            })
            .collect();
        let refs: Vec<&dyn Signal> = signals.iter().map(AsRef::as_ref).collect();
        sigen::to_pcm_buffer(&refs, len, 32000)
    }

    #[rstest]
    fn e2e_with_generated_sinusoids(
        #[values(1, 2, 3)] channels: usize,
        #[values(CONFIGS[0], CONFIGS[1], CONFIGS[2], CONFIGS[3], CONFIGS[4])] config: &str,
        #[values(false, true)] looping: bool,
    ) {
        let signal_len = 16123;
        let config: config::Encoder = toml::from_str(config).expect("config parsing error");
        let mut src = make_source(channels, signal_len);
        if looping {
            src = src.with_loop(100, signal_len - 50);
        }
        test_helper::integrity_test(&config, &src, 15.0);
    }

    #[test]
    fn encoding_is_deterministic() {
        let src = make_source(3, 5000).with_loop(1234, 4000);
        let sequential = config::Encoder {
            multithread: false,
            ..config::Encoder::default()
        };
        let first = encode_to_dsp(&sequential, &src).expect("encoding should succeed");
        let second = encode_to_dsp(&sequential, &src).expect("encoding should succeed");
        assert_eq!(first, second);
        let parallel = encode_to_dsp(&config::Encoder::default(), &src).expect("encoding should succeed");
        assert_eq!(first, parallel);
    }

    #[test]
    fn silence_is_encoded_exactly() {
        let src = PcmBuffer::from_channels(vec![vec![0i16; 1000]; 2], 22050);
        let decoded = test_helper::integrity_test(&config::Encoder::default(), &src, 0.0);
        for ch in decoded {
            assert!(ch.iter().all(|x| *x == 0));
        }
        let bytes = encode_to_dsp(&config::Encoder::default(), &src).expect("encoding should succeed");
        assert!(bytes[0xC0..].iter().all(|b| *b == 0));
    }

    #[test]
    fn single_frame_source() {
        let src = PcmBuffer::from_channels(vec![vec![1000i16, -1000, 500]], 8000);
        let bytes = encode_to_dsp(&config::Encoder::default(), &src).expect("encoding should succeed");
        let header = test_helper::parse_header(&bytes);
        assert_eq!(header.sample_count, 3);
        assert_eq!(header.nibble_count, 5);
        assert_eq!(header.end_address, 4);
        assert_eq!(bytes.len(), 0x60 + 3);
        assert_eq!(src.len(), 3);
    }
}
