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

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::adpcm::derive_context;
use crate::adpcm::sample_count_to_byte_count;
use crate::constant::COEFFICIENT_PAIRS;
use crate::source::LoopPoints;

/// Eight predictor coefficient pairs in Q11 fixed-point.
///
/// Stored as `[c1_0, c2_0, c1_1, c2_1, ...]` where `c1` is applied to the
/// last decoded sample and `c2` to the one before it.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Coefficients([i16; COEFFICIENT_PAIRS * 2]);

impl Coefficients {
    /// Constructs `Coefficients` from the flattened pairs.
    pub const fn new(coefs: [i16; COEFFICIENT_PAIRS * 2]) -> Self {
        Self(coefs)
    }

    /// Returns the flattened pairs.
    pub const fn as_array(&self) -> &[i16; COEFFICIENT_PAIRS * 2] {
        &self.0
    }

    /// Returns `(c1, c2)` of the pair at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than 8.
    #[inline]
    pub const fn pair(&self, index: usize) -> (i16, i16) {
        (self.0[index * 2], self.0[index * 2 + 1])
    }
}

/// Decoder registers at a frame boundary or in the middle of a frame.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct AdpcmContext {
    /// Header byte of the frame being decoded.
    pub predictor_scale: u8,
    /// Last decoded sample.
    pub hist1: i16,
    /// The sample decoded before `hist1`.
    pub hist2: i16,
}

/// Encoded channel.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct AdpcmChannel {
    coefs: Coefficients,
    data: Vec<u8>,
    sample_count: usize,
    gain: i16,
    loop_snapshot: Option<(usize, AdpcmContext)>,
}

impl AdpcmChannel {
    /// Constructs `AdpcmChannel` from the encoded bytes.
    ///
    /// `loop_snapshot` is the decoder context captured right before the
    /// sample at the given index while encoding.
    pub(crate) fn new(
        coefs: Coefficients,
        data: Vec<u8>,
        sample_count: usize,
        loop_snapshot: Option<(usize, AdpcmContext)>,
    ) -> Self {
        Self {
            coefs,
            data,
            sample_count,
            gain: 0,
            loop_snapshot,
        }
    }

    /// Returns the predictor coefficients.
    #[inline]
    pub const fn coefs(&self) -> &Coefficients {
        &self.coefs
    }

    /// Returns the encoded frames as bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of samples encoded.
    #[inline]
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Returns the gain. Always zero for the streams made by this crate.
    #[inline]
    pub const fn gain(&self) -> i16 {
        self.gain
    }

    /// Returns the decoder context at the beginning of the stream.
    pub fn start_context(&self) -> AdpcmContext {
        AdpcmContext {
            predictor_scale: self.data.first().copied().unwrap_or(0),
            hist1: 0,
            hist2: 0,
        }
    }

    /// Returns the loop-start index and context captured while encoding.
    #[inline]
    pub const fn loop_snapshot(&self) -> Option<&(usize, AdpcmContext)> {
        self.loop_snapshot.as_ref()
    }

    /// Returns the decoder context right before the sample at `index`.
    ///
    /// The snapshot taken while encoding is used if it was taken at `index`.
    /// Otherwise the context is derived by decoding the channel, and the
    /// bytes after the encoded data are treated as zeros.
    pub fn context_at(&self, index: usize) -> AdpcmContext {
        match self.loop_snapshot {
            Some((snapshot_index, ctx)) if snapshot_index == index => ctx,
            _ => derive_context(&self.data, &self.coefs, index),
        }
    }

    #[inline]
    pub(crate) const fn expected_data_len(&self) -> usize {
        sample_count_to_byte_count(self.sample_count)
    }
}

/// Encoded multi-channel stream.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct AdpcmStream {
    sample_rate: usize,
    sample_count: usize,
    loop_points: Option<LoopPoints>,
    channels: Vec<AdpcmChannel>,
}

impl AdpcmStream {
    /// Constructs `AdpcmStream` without channels.
    pub const fn new(
        sample_rate: usize,
        sample_count: usize,
        loop_points: Option<LoopPoints>,
    ) -> Self {
        Self {
            sample_rate,
            sample_count,
            loop_points,
            channels: vec![],
        }
    }

    /// Appends an encoded channel.
    pub fn add_channel(&mut self, channel: AdpcmChannel) {
        self.channels.push(channel);
    }

    /// Returns sampling rate in Hz.
    #[inline]
    pub const fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    /// Returns the number of samples per channel.
    #[inline]
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Returns loop points in sample indices before alignment.
    #[inline]
    pub const fn loop_points(&self) -> Option<LoopPoints> {
        self.loop_points
    }

    /// Returns `true` if the stream loops.
    #[inline]
    pub const fn is_looping(&self) -> bool {
        self.loop_points.is_some()
    }

    /// Returns channels.
    #[inline]
    pub fn channels(&self) -> &[AdpcmChannel] {
        &self.channels
    }

    /// Returns the number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Per-channel header of a .dsp file.
///
/// Fields hold the values after trimming and loop alignment. Addresses are
/// nibble addresses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelHeader {
    pub(crate) sample_count: usize,
    pub(crate) nibble_count: usize,
    pub(crate) sample_rate: usize,
    pub(crate) looping: bool,
    pub(crate) start_address: usize,
    pub(crate) end_address: usize,
    pub(crate) current_address: usize,
    pub(crate) coefs: Coefficients,
    pub(crate) gain: i16,
    pub(crate) start_context: AdpcmContext,
    pub(crate) loop_context: AdpcmContext,
    /// Zero for monaural files.
    pub(crate) channel_count: usize,
    /// Zero for monaural files.
    pub(crate) frames_per_interleave: usize,
}

impl ChannelHeader {
    /// Returns the number of samples written.
    #[inline]
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Returns the number of nibbles written.
    #[inline]
    pub const fn nibble_count(&self) -> usize {
        self.nibble_count
    }

    /// Returns the nibble address of the loop start.
    #[inline]
    pub const fn start_address(&self) -> usize {
        self.start_address
    }

    /// Returns the nibble address of the loop end.
    #[inline]
    pub const fn end_address(&self) -> usize {
        self.end_address
    }

    /// Returns the decoder context at the loop start.
    #[inline]
    pub const fn loop_context(&self) -> &AdpcmContext {
        &self.loop_context
    }
}

/// In-memory image of a .dsp file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dsp {
    pub(crate) headers: Vec<ChannelHeader>,
    /// Audio bytes of each channel, padded to the per-channel budget.
    pub(crate) data: Vec<Vec<u8>>,
    /// Zero when the data is written contiguously.
    pub(crate) bytes_per_interleave: usize,
}

impl Dsp {
    /// Returns channel headers.
    #[inline]
    pub fn headers(&self) -> &[ChannelHeader] {
        &self.headers
    }

    /// Returns the number of audio bytes stored for each channel.
    #[inline]
    pub fn channel_budget(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficient_pairs() {
        let mut arr = [0i16; 16];
        for (i, p) in arr.iter_mut().enumerate() {
            *p = i as i16 * 100 - 700;
        }
        let coefs = Coefficients::new(arr);
        assert_eq!(coefs.pair(0), (-700, -600));
        assert_eq!(coefs.pair(7), (700, 800));
    }

    #[test]
    fn start_context_uses_first_header() {
        let ch = AdpcmChannel::new(Coefficients::default(), vec![0x35, 0, 0, 0, 0, 0, 0, 0], 14, None);
        assert_eq!(
            ch.start_context(),
            AdpcmContext {
                predictor_scale: 0x35,
                hist1: 0,
                hist2: 0
            }
        );
        let empty = AdpcmChannel::new(Coefficients::default(), vec![], 0, None);
        assert_eq!(empty.start_context(), AdpcmContext::default());
    }

    #[test]
    fn snapshot_is_preferred_on_matching_index() {
        let snapshot = AdpcmContext {
            predictor_scale: 0x12,
            hist1: 5,
            hist2: 6,
        };
        let ch = AdpcmChannel::new(Coefficients::default(), vec![0u8; 16], 28, Some((20, snapshot)));
        assert_eq!(ch.context_at(20), snapshot);
        // All-zero data decodes to silence.
        assert_eq!(ch.context_at(21), AdpcmContext::default());
    }
}
