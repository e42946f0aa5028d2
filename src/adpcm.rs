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

//! Frame-level DSP-ADPCM arithmetic: addressing, frame encoder and decoder.

use super::component::AdpcmContext;
use super::component::Coefficients;
use super::constant::adpcm::COEFFICIENT_ONE;
use super::constant::adpcm::COEFFICIENT_SHIFT;
use super::constant::adpcm::MAX_NIBBLE;
use super::constant::adpcm::MAX_SCALE_POWER;
use super::constant::adpcm::MIN_NIBBLE;
use super::constant::adpcm::ROUNDING_OFFSET;
use super::constant::BYTES_PER_FRAME;
use super::constant::COEFFICIENT_PAIRS;
use super::constant::NIBBLES_PER_FRAME;
use super::constant::SAMPLES_PER_FRAME;

/// Returns the nibble address of the sample at `index`.
///
/// # Examples
///
/// ```
/// # use dspadpcm::adpcm::*;
/// assert_eq!(sample_to_nibble(0), 2);
/// assert_eq!(sample_to_nibble(13), 15);
/// assert_eq!(sample_to_nibble(14), 18);
/// ```
#[inline]
pub const fn sample_to_nibble(index: usize) -> usize {
    let frames = index / SAMPLES_PER_FRAME;
    let rem = index % SAMPLES_PER_FRAME;
    frames * NIBBLES_PER_FRAME + rem + 2
}

/// Returns the number of nibbles needed for storing `count` samples.
///
/// # Examples
///
/// ```
/// # use dspadpcm::adpcm::*;
/// assert_eq!(sample_count_to_nibble_count(0), 0);
/// assert_eq!(sample_count_to_nibble_count(14), 16);
/// assert_eq!(sample_count_to_nibble_count(100), 116);
/// ```
#[inline]
pub const fn sample_count_to_nibble_count(count: usize) -> usize {
    let frames = count / SAMPLES_PER_FRAME;
    let rem = count % SAMPLES_PER_FRAME;
    let extra = if rem == 0 { 0 } else { rem + 2 };
    frames * NIBBLES_PER_FRAME + extra
}

/// Returns the number of bytes needed for storing `count` samples.
#[inline]
pub const fn sample_count_to_byte_count(count: usize) -> usize {
    sample_count_to_nibble_count(count).div_ceil(2)
}

#[inline]
const fn high_nibble(byte: u8) -> u8 {
    byte >> 4
}

#[inline]
const fn low_nibble(byte: u8) -> u8 {
    byte & 0x0F
}

#[inline]
const fn signed_nibble(nibble: u8) -> i32 {
    ((nibble as i8) << 4 >> 4) as i32
}

#[inline]
const fn combine_nibbles(high: i32, low: i32) -> u8 {
    (((high & 0x0F) << 4) | (low & 0x0F)) as u8
}

#[inline]
fn clamp_16(x: i32) -> i32 {
    x.clamp(i32::from(i16::MIN), i32::from(i16::MAX))
}

/// Fixed-point second-order prediction in Q11.
///
/// Wrapping arithmetic is used to stay bit-identical with the hardware.
#[inline]
fn predict(coefs: (i16, i16), hist1: i32, hist2: i32) -> i32 {
    i32::from(coefs.0)
        .wrapping_mul(hist1)
        .wrapping_add(i32::from(coefs.1).wrapping_mul(hist2))
}

/// Reconstructs a sample from a prediction and a residual code.
#[inline]
fn reconstruct(predicted: i32, nibble: i32, scale: i32) -> i32 {
    clamp_16(
        predicted
            .wrapping_add(nibble.wrapping_mul(scale))
            .wrapping_add(ROUNDING_OFFSET)
            >> COEFFICIENT_SHIFT,
    )
}

/// Predictor history threaded through the frame loop.
///
/// `hist1` is the last decoded sample and `hist2` is the one before it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EncoderState {
    pub hist1: i16,
    pub hist2: i16,
}

impl EncoderState {
    /// Constructs `EncoderState`.
    pub const fn new(hist1: i16, hist2: i16) -> Self {
        Self { hist1, hist2 }
    }
}

/// Result of encoding one frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedFrame {
    bytes: [u8; BYTES_PER_FRAME],
    /// History before this frame followed by the decoded samples.
    history: [i16; SAMPLES_PER_FRAME + 2],
}

impl EncodedFrame {
    /// Returns the 8-byte frame.
    #[inline]
    pub const fn bytes(&self) -> &[u8; BYTES_PER_FRAME] {
        &self.bytes
    }

    /// Returns the header byte (coefficient index and scale exponent).
    #[inline]
    pub const fn header(&self) -> u8 {
        self.bytes[0]
    }

    /// Returns the coefficient-pair index selected for this frame.
    #[inline]
    pub const fn coef_index(&self) -> usize {
        high_nibble(self.bytes[0]) as usize
    }

    /// Returns the scale exponent selected for this frame.
    #[inline]
    pub const fn scale_power(&self) -> u8 {
        low_nibble(self.bytes[0])
    }

    /// Returns the samples a decoder reconstructs from this frame.
    #[inline]
    pub fn decoded(&self) -> &[i16] {
        &self.history[2..]
    }

    /// Returns the predictor history after this frame.
    #[inline]
    pub const fn next_state(&self) -> EncoderState {
        EncoderState {
            hist1: self.history[SAMPLES_PER_FRAME + 1],
            hist2: self.history[SAMPLES_PER_FRAME],
        }
    }

    /// Returns the decoder state right before the sample at `offset` in this
    /// frame.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not less than 14.
    #[inline]
    pub fn context_before(&self, offset: usize) -> AdpcmContext {
        assert!(offset < SAMPLES_PER_FRAME);
        AdpcmContext {
            predictor_scale: self.header(),
            hist1: self.history[offset + 1],
            hist2: self.history[offset],
        }
    }
}

/// Trial encoding of one frame with a fixed coefficient pair.
struct Trial {
    nibbles: [i32; SAMPLES_PER_FRAME],
    history: [i32; SAMPLES_PER_FRAME + 2],
    scale_power: i32,
    error: f64,
}

/// Rounds the scaled residual to the nearest integer.
///
/// The division is done in single precision as the reference encoder does.
#[inline]
fn quantize(distance: i32, scale: i32) -> i32 {
    let ratio = f64::from(distance as f32 / scale as f32);
    if distance > 0 {
        (ratio + 0.499_999_9) as i32
    } else {
        (ratio - 0.499_999_9) as i32
    }
}

fn encode_with_pair(pcm: &[i32; SAMPLES_PER_FRAME + 2], coefs: (i16, i16)) -> Trial {
    // Rough estimate of the scale from the prediction on the original signal.
    let mut max_distance: i32 = 0;
    for s in 0..SAMPLES_PER_FRAME {
        let predicted = predict(coefs, pcm[s + 1], pcm[s]) / COEFFICIENT_ONE;
        let distance = clamp_16(pcm[s + 2].wrapping_sub(predicted));
        if distance.abs() > max_distance.abs() {
            max_distance = distance;
        }
    }
    let mut scale_power: i32 = 0;
    while scale_power <= MAX_SCALE_POWER && !(MIN_NIBBLE..=MAX_NIBBLE).contains(&max_distance) {
        max_distance /= 2;
        scale_power += 1;
    }
    scale_power = if scale_power <= 1 { -1 } else { scale_power - 2 };

    let mut trial = Trial {
        nibbles: [0; SAMPLES_PER_FRAME],
        history: [0; SAMPLES_PER_FRAME + 2],
        scale_power,
        error: 0.0,
    };
    trial.history[0] = pcm[0];
    trial.history[1] = pcm[1];
    loop {
        trial.scale_power += 1;
        let scale = (1 << trial.scale_power) * COEFFICIENT_ONE;
        trial.error = 0.0;
        let mut max_overflow = 0;

        for s in 0..SAMPLES_PER_FRAME {
            let predicted = predict(coefs, trial.history[s + 1], trial.history[s]);
            let distance = (pcm[s + 2] * COEFFICIENT_ONE).wrapping_sub(predicted);
            let unclamped = quantize(distance, scale);
            let nibble = unclamped.clamp(MIN_NIBBLE, MAX_NIBBLE);
            if nibble != unclamped {
                max_overflow = max_overflow.max((unclamped - nibble).abs());
            }
            trial.nibbles[s] = nibble;

            let decoded = reconstruct(predicted, nibble, scale);
            trial.history[s + 2] = decoded;
            let diff = f64::from(pcm[s + 2] - decoded);
            trial.error += diff * diff;
        }

        let mut x = max_overflow + 8;
        while x > 256 {
            trial.scale_power = (trial.scale_power + 1).min(MAX_SCALE_POWER - 1);
            x >>= 1;
        }

        if trial.scale_power >= MAX_SCALE_POWER || max_overflow <= 1 {
            break;
        }
    }
    trial
}

/// Encodes up to 14 samples into one frame.
///
/// `samples` shorter than a frame are zero-padded. Every coefficient pair is
/// tried, and the one with the smallest squared reconstruction error is
/// selected. Ties are resolved to the lowest pair index.
///
/// # Panics
///
/// Panics if `samples` is longer than 14.
pub fn encode_frame(coefs: &Coefficients, state: &EncoderState, samples: &[i16]) -> EncodedFrame {
    assert!(samples.len() <= SAMPLES_PER_FRAME);
    let mut pcm = [0i32; SAMPLES_PER_FRAME + 2];
    pcm[0] = i32::from(state.hist2);
    pcm[1] = i32::from(state.hist1);
    for (dst, src) in pcm[2..].iter_mut().zip(samples) {
        *dst = i32::from(*src);
    }

    let mut best_index = 0;
    let mut best = encode_with_pair(&pcm, coefs.pair(0));
    for index in 1..COEFFICIENT_PAIRS {
        let trial = encode_with_pair(&pcm, coefs.pair(index));
        if trial.error < best.error {
            best_index = index;
            best = trial;
        }
    }

    let mut bytes = [0u8; BYTES_PER_FRAME];
    bytes[0] = combine_nibbles(best_index as i32, best.scale_power);
    for (dst, pair) in bytes[1..].iter_mut().zip(best.nibbles.chunks_exact(2)) {
        *dst = combine_nibbles(pair[0], pair[1]);
    }
    let mut history = [0i16; SAMPLES_PER_FRAME + 2];
    for (dst, src) in history.iter_mut().zip(best.history.iter()) {
        // values are already clamped to 16 bits.
        *dst = *src as i16;
    }
    EncodedFrame { bytes, history }
}

/// Decodes `sample_count` samples from `bytes`.
///
/// Bytes missing at the end of `bytes` are read as zeros. Both histories
/// start at zero.
pub(crate) fn decode(bytes: &[u8], coefs: &Coefficients, sample_count: usize) -> Vec<i16> {
    let byte_at = |i: usize| bytes.get(i).copied().unwrap_or(0);
    let mut ret = Vec::with_capacity(sample_count);
    let mut hist1: i32 = 0;
    let mut hist2: i32 = 0;
    let mut frame_head = 0;
    while ret.len() < sample_count {
        let header = byte_at(frame_head);
        let pair = coefs.pair(high_nibble(header) as usize % COEFFICIENT_PAIRS);
        let scale = (1 << low_nibble(header)) * COEFFICIENT_ONE;
        let samples = (sample_count - ret.len()).min(SAMPLES_PER_FRAME);
        for s in 0..samples {
            let byte = byte_at(frame_head + 1 + s / 2);
            let nibble = if s % 2 == 0 {
                signed_nibble(high_nibble(byte))
            } else {
                signed_nibble(low_nibble(byte))
            };
            let decoded = reconstruct(predict(pair, hist1, hist2), nibble, scale);
            hist2 = hist1;
            hist1 = decoded;
            ret.push(decoded as i16);
        }
        frame_head += BYTES_PER_FRAME;
    }
    ret
}

/// Computes the decoder state right before the sample at `index`.
pub(crate) fn derive_context(bytes: &[u8], coefs: &Coefficients, index: usize) -> AdpcmContext {
    let decoded = decode(bytes, coefs, index);
    let frame_head = (index / SAMPLES_PER_FRAME) * BYTES_PER_FRAME;
    AdpcmContext {
        predictor_scale: bytes.get(frame_head).copied().unwrap_or(0),
        hist1: decoded.last().copied().unwrap_or(0),
        hist2: decoded.iter().rev().nth(1).copied().unwrap_or(0),
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use crate::sigen;
    use crate::sigen::Signal;

    use rstest::rstest;

    fn test_coefs() -> Coefficients {
        Coefficients::new([
            0, 0, 2048, 0, 3600, -1800, 4096, -2048, 1024, 512, -1024, 0, 2800, -1200, 1800,
            -600,
        ])
    }

    #[test]
    fn address_consistency() {
        for n in 1..200 {
            // The address of the last sample is the last nibble.
            assert_eq!(sample_to_nibble(n - 1) + 1, sample_count_to_nibble_count(n));
        }
        assert_eq!(sample_count_to_byte_count(100), 58);
        assert_eq!(sample_count_to_byte_count(14), 8);
        assert_eq!(sample_count_to_byte_count(15), 10);
    }

    #[test]
    fn signed_nibbles() {
        assert_eq!(signed_nibble(0x7), 7);
        assert_eq!(signed_nibble(0x8), -8);
        assert_eq!(signed_nibble(0xF), -1);
        assert_eq!(combine_nibbles(-1, 7), 0xF7);
        assert_eq!(combine_nibbles(3, -8), 0x38);
    }

    #[test]
    fn silent_frame() {
        let frame = encode_frame(&test_coefs(), &EncoderState::default(), &[0i16; 14]);
        assert_eq!(frame.coef_index(), 0);
        assert_eq!(frame.scale_power(), 0);
        assert_eq!(frame.bytes(), &[0u8; 8]);
        assert_eq!(frame.next_state(), EncoderState::default());
    }

    #[test]
    fn frame_decodes_to_reported_history() {
        let coefs = test_coefs();
        let samples: Vec<i16> = (0..14).map(|t| (t * 1500 - 9000) as i16).collect();
        let state = EncoderState::new(-10500, -12000);
        let frame = encode_frame(&coefs, &state, &samples);

        // Decode with the same predictor starting from the given state.
        let pair = coefs.pair(frame.coef_index());
        let scale = (1 << frame.scale_power()) * COEFFICIENT_ONE;
        let mut hist1 = i32::from(state.hist1);
        let mut hist2 = i32::from(state.hist2);
        for s in 0..14 {
            let byte = frame.bytes()[1 + s / 2];
            let nibble = if s % 2 == 0 {
                signed_nibble(high_nibble(byte))
            } else {
                signed_nibble(low_nibble(byte))
            };
            let decoded = reconstruct(predict(pair, hist1, hist2), nibble, scale);
            assert_eq!(decoded as i16, frame.decoded()[s]);
            hist2 = hist1;
            hist1 = decoded;
        }
        assert_eq!(frame.next_state(), EncoderState::new(hist1 as i16, hist2 as i16));
    }

    #[test]
    fn lowest_index_wins_on_tie() {
        // All pairs are identical, so every trial gives the same error.
        let coefs = Coefficients::new([1000; 16]);
        let samples = [300i16, -200, 100, 50, -20, 0, 10, 1, 2, 3, 4, 5, 6, 7];
        let frame = encode_frame(&coefs, &EncoderState::default(), &samples);
        assert_eq!(frame.coef_index(), 0);
    }

    #[test]
    fn extreme_input_does_not_overflow() {
        let coefs = Coefficients::new([
            i16::MAX,
            i16::MIN,
            i16::MIN,
            i16::MIN,
            i16::MIN,
            i16::MAX,
            i16::MAX,
            i16::MAX,
            0,
            0,
            -1,
            -1,
            1,
            1,
            2048,
            2048,
        ]);
        let samples = [
            i16::MIN,
            i16::MAX,
            i16::MIN,
            i16::MAX,
            i16::MIN,
            i16::MIN,
            i16::MAX,
            i16::MAX,
            0,
            i16::MIN,
            i16::MAX,
            -1,
            1,
            i16::MIN,
        ];
        let frame = encode_frame(&coefs, &EncoderState::new(i16::MIN, i16::MAX), &samples);
        assert!(frame.scale_power() <= 12);
    }

    #[rstest]
    fn round_trip_error_is_bounded(#[values(0, 1, 13, 14, 15, 100, 1000)] len: usize) {
        let coefs = test_coefs();
        let signal = sigen::Sine::new(37, 0.6)
            .noise(0.05)
            .to_vec_quantized(len);
        let mut state = EncoderState::default();
        let mut bytes = vec![];
        let mut headers = vec![];
        for chunk in signal.chunks(SAMPLES_PER_FRAME) {
            let frame = encode_frame(&coefs, &state, chunk);
            state = frame.next_state();
            headers.push(frame.header());
            bytes.extend_from_slice(frame.bytes());
        }
        let decoded = decode(&bytes, &coefs, len);
        assert_eq!(decoded.len(), len);
        for (t, (orig, dec)) in signal.iter().zip(decoded.iter()).enumerate() {
            let scale = i32::from(low_nibble(headers[t / SAMPLES_PER_FRAME]));
            let bound = (3 << scale) / 2 + 2;
            let diff = (i32::from(*orig) - i32::from(*dec)).abs();
            assert!(diff <= bound, "t={t} orig={orig} dec={dec} bound={bound}");
        }
    }

    #[test]
    fn context_derivation_matches_encoder_history() {
        let coefs = test_coefs();
        let signal = sigen::Sine::new(50, 0.4).to_vec_quantized(140);
        let mut state = EncoderState::default();
        let mut bytes = vec![];
        let mut frames = vec![];
        for chunk in signal.chunks(SAMPLES_PER_FRAME) {
            let frame = encode_frame(&coefs, &state, chunk);
            state = frame.next_state();
            bytes.extend_from_slice(frame.bytes());
            frames.push(frame);
        }
        for index in [0, 1, 2, 13, 14, 15, 27, 28, 77, 139] {
            let expected = frames[index / SAMPLES_PER_FRAME].context_before(index % SAMPLES_PER_FRAME);
            let derived = derive_context(&bytes, &coefs, index);
            assert_eq!(derived, expected, "index={index}");
        }
    }

    #[test]
    fn decoding_past_the_end_reads_zeros() {
        let coefs = test_coefs();
        let decoded = decode(&[], &coefs, 30);
        assert_eq!(decoded, vec![0i16; 30]);
    }
}
