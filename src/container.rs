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

//! Layout of the .dsp container: trimming, loop alignment and addressing.

use std::cmp::max;

use super::adpcm::sample_count_to_byte_count;
use super::adpcm::sample_count_to_nibble_count;
use super::adpcm::sample_to_nibble;
use super::component::AdpcmStream;
use super::component::ChannelHeader;
use super::component::Dsp;
use super::config;
use super::constant::container::MAX_SAMPLES;
use super::constant::BYTES_PER_FRAME;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;
use super::source::next_multiple;
use super::source::LoopPoints;

/// Checks that `config` can lay out a stream with `channels` channels and
/// `loop_points`.
///
/// # Errors
///
/// Returns `VerifyError` if `config` is invalid, if interleaving is disabled
/// for a multi-channel stream, or if the loop end after alignment cannot be
/// addressed by the header fields.
///
/// # Examples
///
/// ```
/// # use dspadpcm::*;
/// # use dspadpcm::source::LoopPoints;
/// let config = config::Dsp {
///     loop_point_alignment: 1 << 30,
///     ..config::Dsp::default()
/// };
/// assert!(container::verify_layout(&config, 1, None).is_ok());
/// assert!(container::verify_layout(&config, 1, Some(LoopPoints::new(1, 500))).is_ok());
/// assert!(container::verify_layout(&config, 1, Some(LoopPoints::new(1 << 30, (1 << 31) - 1))).is_err());
/// ```
pub fn verify_layout(
    config: &config::Dsp,
    channels: usize,
    loop_points: Option<LoopPoints>,
) -> Result<(), VerifyError> {
    config.verify()?;
    verify_true!(
        "samples_per_interleave",
        channels <= 1 || config.samples_per_interleave > 0,
        "must be positive for multi-channel streams"
    )?;
    if let Some(lp) = loop_points {
        aligned_loop_points(config, lp)?;
    }
    Ok(())
}

/// Returns `lp` after alignment, or an error if the loop end is moved beyond
/// the addressable range.
fn aligned_loop_points(config: &config::Dsp, lp: LoopPoints) -> Result<LoopPoints, VerifyError> {
    match lp.aligned(config.loop_point_alignment) {
        Some(aligned) if aligned.end <= MAX_SAMPLES => Ok(aligned),
        _ => Err(VerifyError::new(
            "loop_point_alignment",
            &format!("moves the loop end beyond {MAX_SAMPLES} samples"),
        )),
    }
}

/// Sample-domain layout shared by all channels of a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Layout {
    sample_count: usize,
    loop_points: Option<LoopPoints>,
}

impl Layout {
    fn new(config: &config::Dsp, stream: &AdpcmStream) -> Result<Self, VerifyError> {
        let loop_points = stream
            .loop_points()
            .map(|lp| aligned_loop_points(config, lp))
            .transpose()?;
        let sample_count = match loop_points {
            Some(lp) if config.trim_file => lp.end,
            Some(lp) => max(stream.sample_count(), lp.end),
            None => stream.sample_count(),
        };
        Ok(Self {
            sample_count,
            loop_points,
        })
    }

    fn loop_start(&self) -> usize {
        self.loop_points.map_or(0, |lp| lp.start)
    }

    fn start_address(&self) -> usize {
        sample_to_nibble(self.loop_start())
    }

    fn end_address(&self) -> usize {
        sample_to_nibble(
            self.loop_points
                .map_or(self.sample_count.saturating_sub(1), |lp| lp.end),
        )
    }

    fn channel_budget(&self, channels: usize) -> usize {
        let multiple = if channels == 1 { 1 } else { BYTES_PER_FRAME };
        next_multiple(sample_count_to_byte_count(self.sample_count), multiple)
    }
}

/// Lays out `stream` as a .dsp file image.
///
/// # Errors
///
/// Returns `VerifyError` if `stream` is inconsistent or `config` cannot be
/// used for the stream.
///
/// # Examples
///
/// ```
/// # use dspadpcm::*;
/// # use dspadpcm::component::*;
/// # use dspadpcm::source::*;
/// let src = PcmBuffer::from_channels(vec![vec![0i16; 100]], 32000);
/// let stream = encode_stream(&config::Encoder::default(), &src).unwrap();
/// let dsp = container::build(&config::Dsp::default(), &stream).unwrap();
/// assert_eq!(dsp.headers()[0].nibble_count(), 116);
/// assert_eq!(dsp.count_bytes(), 0x60 + 58);
/// ```
pub fn build(config: &config::Dsp, stream: &AdpcmStream) -> Result<Dsp, VerifyError> {
    stream.verify().map_err(|e| e.within("stream"))?;
    let channels = stream.channel_count();
    verify_layout(config, channels, stream.loop_points()).map_err(|e| e.within("config"))?;

    let layout = Layout::new(config, stream).map_err(|e| e.within("config"))?;
    let budget = layout.channel_budget(channels);
    let (channel_count, frames_per_interleave) = if channels == 1 {
        (0, 0)
    } else {
        (channels, config.frames_per_interleave())
    };

    let mut headers = Vec::with_capacity(channels);
    let mut data = Vec::with_capacity(channels);
    for channel in stream.channels() {
        headers.push(ChannelHeader {
            sample_count: layout.sample_count,
            nibble_count: sample_count_to_nibble_count(layout.sample_count),
            sample_rate: stream.sample_rate(),
            looping: stream.is_looping(),
            start_address: layout.start_address(),
            end_address: layout.end_address(),
            current_address: sample_to_nibble(0),
            coefs: *channel.coefs(),
            gain: channel.gain(),
            start_context: channel.start_context(),
            loop_context: channel.context_at(layout.loop_start()),
            channel_count,
            frames_per_interleave,
        });
        let mut bytes = channel.data().to_vec();
        bytes.resize(budget, 0u8);
        data.push(bytes);
    }

    Ok(Dsp {
        headers,
        data,
        bytes_per_interleave: if channels == 1 {
            0
        } else {
            config.bytes_per_interleave()
        },
    })
}
