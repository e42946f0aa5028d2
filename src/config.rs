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

//! Encoder configuration structs.

use std::num::NonZeroUsize;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::container::DEFAULT_SAMPLES_PER_INTERLEAVE;
use super::constant::container::MAX_SAMPLES;
use super::constant::BYTES_PER_FRAME;
use super::constant::SAMPLES_PER_FRAME;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;

/// Configuration for encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Encoder {
    /// If set to false, channels are encoded one after another on the
    /// calling thread. Only effective when "par" feature is enabled.
    pub multithread: bool,
    /// Number of worker threads. `None` means the available parallelism.
    pub workers: Option<NonZeroUsize>,
    /// Configuration for the .dsp container.
    pub container: Dsp,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            multithread: cfg!(feature = "par"),
            workers: None,
            container: Dsp::default(),
        }
    }
}

impl Verify for Encoder {
    fn verify(&self) -> Result<(), VerifyError> {
        self.container.verify().map_err(|e| e.within("container"))
    }
}

/// Configuration for the .dsp container layout.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Dsp {
    /// Number of samples per interleave block in multi-channel files.
    ///
    /// Must be a multiple of 14 (a whole number of frames). Zero disables
    /// interleaving, which is only allowed for monaural streams.
    pub samples_per_interleave: usize,
    /// Loop start is moved forward to a multiple of this value. Loop end is
    /// moved by the same amount. Zero or one disables alignment. Must not
    /// exceed the number of samples a .dsp file can address.
    pub loop_point_alignment: usize,
    /// If set, samples after the loop end are not written.
    pub trim_file: bool,
}

impl Default for Dsp {
    fn default() -> Self {
        Self {
            samples_per_interleave: DEFAULT_SAMPLES_PER_INTERLEAVE,
            loop_point_alignment: 0,
            trim_file: true,
        }
    }
}

impl Dsp {
    /// Returns the number of bytes in an interleave block.
    pub const fn bytes_per_interleave(&self) -> usize {
        self.frames_per_interleave() * BYTES_PER_FRAME
    }

    /// Returns the number of frames in an interleave block.
    pub const fn frames_per_interleave(&self) -> usize {
        self.samples_per_interleave / SAMPLES_PER_FRAME
    }
}

impl Verify for Dsp {
    fn verify(&self) -> Result<(), VerifyError> {
        let frame_size = SAMPLES_PER_FRAME;
        verify_true!(
            "samples_per_interleave",
            self.samples_per_interleave % frame_size == 0,
            "must be a multiple of {frame_size}"
        )?;
        verify_range!(
            "samples_per_interleave",
            self.frames_per_interleave(),
            ..=(i16::MAX as usize)
        )?;
        verify_range!(
            "loop_point_alignment",
            self.loop_point_alignment,
            ..=MAX_SAMPLES
        )?;
        Ok(())
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn serialization() {
        let config = Encoder::default();
        assert!(toml::to_string(&config).is_ok());
    }

    #[test]
    fn deserialization() {
        let src = "
workers = 3

[container]
loop_point_alignment = 14336
";
        let config: Encoder = toml::from_str(src).expect("Parse error.");
        assert_eq!(config.workers, NonZeroUsize::new(3));
        assert_eq!(config.container.loop_point_alignment, 14336);

        // Check the rest is default.
        assert_eq!(
            config.container.samples_per_interleave,
            DEFAULT_SAMPLES_PER_INTERLEAVE
        );
        assert!(config.container.trim_file);
        assert!(config.verify().is_ok());
    }

    #[test]
    fn if_empty_source_yields_default_config() {
        let empty_src = "";
        let config: Encoder = toml::from_str(empty_src).expect("Parse error.");
        let default_config: Encoder = Encoder::default();
        eprintln!(
            "## Current default config\n\n{}",
            toml::to_string(&config).unwrap()
        );
        assert_eq!(config, default_config);
    }

    #[test]
    fn zero_workers_is_rejected_by_parser() {
        let src = "workers = 0";
        assert!(toml::from_str::<Encoder>(src).is_err());
    }

    #[test]
    fn interleave_verification() {
        let mut config = Encoder::default();
        config.container.samples_per_interleave = 15;
        let err = config.verify().expect_err("should be rejected");
        assert_eq!(err.path(), "container.samples_per_interleave");

        config.container.samples_per_interleave = 14 * (i16::MAX as usize + 1);
        assert!(config.verify().is_err());

        config.container.samples_per_interleave = 0;
        assert!(config.verify().is_ok());
        assert_eq!(config.container.bytes_per_interleave(), 0);
    }

    #[test]
    fn alignment_verification() {
        let mut config = Encoder::default();
        config.container.loop_point_alignment = MAX_SAMPLES;
        assert!(config.verify().is_ok());

        for alignment in [MAX_SAMPLES + 1, usize::MAX / 2, usize::MAX] {
            config.container.loop_point_alignment = alignment;
            let err = config.verify().expect_err("should be rejected");
            assert_eq!(err.path(), "container.loop_point_alignment");
        }
    }

    #[test]
    fn default_interleave_is_0x2000_bytes() {
        let config = Dsp::default();
        assert_eq!(config.bytes_per_interleave(), 0x2000);
        assert_eq!(config.frames_per_interleave(), 0x400);
    }
}
