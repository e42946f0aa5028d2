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

//! Module for input source handling.

use super::constant::container::MAX_SAMPLES;
use super::error::SourceError;
use super::error::SourceErrorReason;

/// Loop region given in sample indices.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LoopPoints {
    pub start: usize,
    pub end: usize,
}

impl LoopPoints {
    /// Constructs `LoopPoints`.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns loop points moved forward so that `start` is a multiple of
    /// `alignment`.
    ///
    /// Both points are moved by the same amount, so the loop length is kept.
    /// Returns `None` if the moved points do not fit in `usize`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dspadpcm::source::LoopPoints;
    /// let aligned = LoopPoints::new(100, 1000).aligned(14);
    /// assert_eq!(aligned, Some(LoopPoints::new(112, 1012)));
    ///
    /// // 0 and 1 disable the alignment.
    /// assert_eq!(LoopPoints::new(100, 1000).aligned(0), Some(LoopPoints::new(100, 1000)));
    ///
    /// assert_eq!(LoopPoints::new(1, 10).aligned(usize::MAX), None);
    /// ```
    #[must_use]
    pub fn aligned(&self, alignment: usize) -> Option<Self> {
        let shift = padding_to_multiple(self.start, alignment);
        Some(Self {
            start: self.start.checked_add(shift)?,
            end: self.end.checked_add(shift)?,
        })
    }
}

/// Returns the distance from `value` to the next multiple of `multiple`.
const fn padding_to_multiple(value: usize, multiple: usize) -> usize {
    if multiple == 0 || value % multiple == 0 {
        0
    } else {
        multiple - value % multiple
    }
}

/// Returns the smallest multiple of `multiple` that is not less than `value`.
pub(crate) const fn next_multiple(value: usize, multiple: usize) -> usize {
    value + padding_to_multiple(value, multiple)
}

/// Trait for the in-memory PCM signal given to the encoder.
pub trait Source {
    /// Returns the number of channels.
    fn channels(&self) -> usize;
    /// Returns sampling rate in Hz.
    fn sample_rate(&self) -> usize;
    /// Returns samples of the given channel.
    fn channel(&self, ch: usize) -> &[i16];
    /// Returns loop points if the signal loops.
    fn loop_points(&self) -> Option<LoopPoints> {
        None
    }

    /// Returns the number of samples per channel.
    fn len(&self) -> usize {
        if self.channels() == 0 {
            0
        } else {
            self.channel(0).len()
        }
    }

    /// Returns `true` if the source contains no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source with preloaded samples.
#[derive(Clone, Debug)]
pub struct PcmBuffer {
    channels: Vec<Vec<i16>>,
    sample_rate: usize,
    loop_points: Option<LoopPoints>,
}

impl PcmBuffer {
    /// Constructs `PcmBuffer` from per-channel sample vectors.
    pub fn from_channels(channels: Vec<Vec<i16>>, sample_rate: usize) -> Self {
        Self {
            channels,
            sample_rate,
            loop_points: None,
        }
    }

    /// Constructs `PcmBuffer` by deinterleaving `interleaved` samples.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dspadpcm::source::*;
    /// let pcm = PcmBuffer::from_interleaved(&[1, -1, 2, -2, 3, -3], 2, 32000);
    /// assert_eq!(pcm.channel(0), &[1, 2, 3]);
    /// assert_eq!(pcm.channel(1), &[-1, -2, -3]);
    /// ```
    pub fn from_interleaved(interleaved: &[i16], channels: usize, sample_rate: usize) -> Self {
        let mut dest = vec![Vec::with_capacity(interleaved.len() / channels.max(1)); channels];
        if channels > 0 {
            for frame in interleaved.chunks_exact(channels) {
                for (ch, x) in frame.iter().enumerate() {
                    dest[ch].push(*x);
                }
            }
        }
        Self::from_channels(dest, sample_rate)
    }

    /// Sets loop points.
    #[must_use]
    pub fn with_loop(self, start: usize, end: usize) -> Self {
        Self {
            loop_points: Some(LoopPoints::new(start, end)),
            ..self
        }
    }
}

impl Source for PcmBuffer {
    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    fn channel(&self, ch: usize) -> &[i16] {
        &self.channels[ch]
    }

    fn loop_points(&self) -> Option<LoopPoints> {
        self.loop_points
    }
}

/// Checks the source before any encoding work.
///
/// # Errors
///
/// Returns `SourceError` if channels have different lengths, the sample rate
/// is zero or too large, loop points are reversed or out of range, or the
/// signal is too large for the container header fields.
///
/// # Examples
///
/// ```
/// # use dspadpcm::source::*;
/// let pcm = PcmBuffer::from_channels(vec![vec![0; 100], vec![0; 99]], 32000);
/// assert!(validate_source(&pcm).is_err());
///
/// let pcm = PcmBuffer::from_channels(vec![vec![0; 100]], 32000).with_loop(10, 100);
/// assert!(validate_source(&pcm).is_ok());
/// ```
pub fn validate_source<S: Source + ?Sized>(src: &S) -> Result<(), SourceError> {
    if src.channels() == 0 {
        return Err(SourceError::by_reason(SourceErrorReason::NoChannel));
    }
    if src.channels() > i16::MAX as usize {
        return Err(SourceError::by_reason(SourceErrorReason::TooManyChannels(
            src.channels(),
        )));
    }
    let expected = src.channel(0).len();
    for ch in 1..src.channels() {
        let actual = src.channel(ch).len();
        if actual != expected {
            return Err(SourceError::by_reason(
                SourceErrorReason::ChannelLengthMismatch {
                    channel: ch,
                    expected,
                    actual,
                },
            ));
        }
    }
    if src.sample_rate() == 0 || src.sample_rate() > i32::MAX as usize {
        return Err(SourceError::by_reason(SourceErrorReason::InvalidSampleRate));
    }
    if expected > MAX_SAMPLES {
        return Err(SourceError::by_reason(SourceErrorReason::TooManySamples(
            expected,
        )));
    }
    if let Some(LoopPoints { start, end }) = src.loop_points() {
        if start >= end || end > expected {
            return Err(SourceError::by_reason(
                SourceErrorReason::InvalidLoopPoints { start, end },
            ));
        }
    }
    Ok(())
}
