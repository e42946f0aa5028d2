// Copyright 2022-2024 Google LLC
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

#![allow(clippy::missing_panics_doc)]

use super::component::AdpcmContext;
use super::component::Coefficients;
use super::config;
use super::source::Source;

#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let err = ($actual - $expected).abs();
        #[allow(clippy::suboptimal_flops)]
        let tol = $rtol * ($expected).abs() + $atol;
        assert!(err < tol, "{} is not close to {}", $actual, $expected);
    }};
    ($actual:expr, $expected:expr) => {{
        assert_close!($actual, $expected, rtol = 0.00001, atol = 0.00001);
    }};
}

/// Straightforward decoder used for cross-checking the encoder.
///
/// Bytes beyond `bytes` are read as zeros.
pub fn decode_channel(bytes: &[u8], coefs: &Coefficients, sample_count: usize) -> Vec<i16> {
    let byte_at = |i: usize| bytes.get(i).copied().unwrap_or(0);
    let mut hist1: i32 = 0;
    let mut hist2: i32 = 0;
    let mut ret = Vec::with_capacity(sample_count);
    let mut frame = 0;
    while ret.len() < sample_count {
        let header = byte_at(frame * 8);
        let (c1, c2) = coefs.pair((header >> 4) as usize);
        let scale = 1i32 << (header & 0x0F);
        for n in 0..14 {
            if ret.len() >= sample_count {
                break;
            }
            let byte = byte_at(frame * 8 + 1 + n / 2);
            let nibble = if n % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            let nibble = if nibble >= 8 {
                i32::from(nibble) - 16
            } else {
                i32::from(nibble)
            };
            let predicted = i32::from(c1)
                .wrapping_mul(hist1)
                .wrapping_add(i32::from(c2).wrapping_mul(hist2));
            let sample = ((nibble * scale) << 11)
                .wrapping_add(1024)
                .wrapping_add(predicted)
                >> 11;
            let sample = sample.clamp(-32768, 32767);
            hist2 = hist1;
            hist1 = sample;
            ret.push(sample as i16);
        }
        frame += 1;
    }
    ret
}

/// Header fields of a .dsp channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedHeader {
    pub sample_count: u32,
    pub nibble_count: u32,
    pub sample_rate: u32,
    pub looping: bool,
    pub format: u16,
    pub start_address: usize,
    pub end_address: usize,
    pub current_address: usize,
    pub coefs: [i16; 16],
    pub gain: i16,
    pub start_context: AdpcmContext,
    pub loop_context: AdpcmContext,
    pub channel_count: u16,
    pub frames_per_interleave: u16,
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn be_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn parse_context(bytes: &[u8], offset: usize) -> AdpcmContext {
    assert_eq!(bytes[offset], 0, "predictor/scale must fit in a byte");
    AdpcmContext {
        predictor_scale: bytes[offset + 1],
        hist1: be_i16(bytes, offset + 2),
        hist2: be_i16(bytes, offset + 4),
    }
}

/// Parses a 0x60-byte channel header at the beginning of `bytes`.
pub fn parse_header(bytes: &[u8]) -> ParsedHeader {
    assert!(bytes.len() >= 0x60);
    assert!(bytes[0x4E..0x60].iter().all(|b| *b == 0), "reserved bytes must be zero");
    let mut coefs = [0i16; 16];
    for (i, c) in coefs.iter_mut().enumerate() {
        *c = be_i16(bytes, 0x1C + i * 2);
    }
    ParsedHeader {
        sample_count: be_u32(bytes, 0x00),
        nibble_count: be_u32(bytes, 0x04),
        sample_rate: be_u32(bytes, 0x08),
        looping: be_u16(bytes, 0x0C) != 0,
        format: be_u16(bytes, 0x0E),
        start_address: be_u32(bytes, 0x10) as usize,
        end_address: be_u32(bytes, 0x14) as usize,
        current_address: be_u32(bytes, 0x18) as usize,
        coefs,
        gain: be_i16(bytes, 0x3C),
        start_context: parse_context(bytes, 0x3E),
        loop_context: parse_context(bytes, 0x44),
        channel_count: be_u16(bytes, 0x4A),
        frames_per_interleave: be_u16(bytes, 0x4C),
    }
}

/// Splits interleaved audio data into per-channel byte vectors of `budget`
/// bytes each.
pub fn deinterleave(data: &[u8], channels: usize, block_size: usize, budget: usize) -> Vec<Vec<u8>> {
    assert_eq!(data.len(), channels * budget);
    let mut ret = vec![Vec::with_capacity(budget); channels];
    let mut offset = 0;
    let mut pos = 0;
    while offset < budget {
        let len = std::cmp::min(block_size, budget - offset);
        for ch in ret.iter_mut() {
            ch.extend_from_slice(&data[pos..pos + len]);
            pos += len;
        }
        offset += len;
    }
    ret
}

/// Returns the signal-to-noise ratio of `decoded` against `reference` in dB.
pub fn snr_db(reference: &[i16], decoded: &[i16]) -> f64 {
    assert_eq!(reference.len(), decoded.len());
    let mut signal = 0.0f64;
    let mut noise = 0.0f64;
    for (x, y) in reference.iter().zip(decoded) {
        let x = f64::from(*x);
        signal += x * x;
        noise += (x - f64::from(*y)).powi(2);
    }
    if noise == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (signal / noise).log10()
}

/// Encodes `src` into a .dsp image, parses it back, and checks the headers
/// and decoded audio against `src`.
///
/// Returns the decoded channels.
pub fn integrity_test(config: &config::Encoder, src: &dyn Source, min_snr_db: f64) -> Vec<Vec<i16>> {
    let bytes = crate::encode_to_dsp(config, src).expect("encoding should succeed");
    let channels = src.channels();
    let headers: Vec<ParsedHeader> = (0..channels)
        .map(|ch| parse_header(&bytes[ch * 0x60..]))
        .collect();

    let sample_count = headers[0].sample_count as usize;
    let budget = (bytes.len() - 0x60 * channels) / channels;
    assert_eq!(bytes.len(), (0x60 + budget) * channels);
    let data = &bytes[0x60 * channels..];
    let per_channel = if channels == 1 {
        vec![data.to_vec()]
    } else {
        deinterleave(
            data,
            channels,
            config.container.samples_per_interleave / 14 * 8,
            budget,
        )
    };

    let mut decoded_channels = vec![];
    for (ch, header) in headers.iter().enumerate() {
        assert_eq!(header.format, 0);
        assert_eq!(header.current_address, 2);
        assert_eq!(header.sample_rate as usize, src.sample_rate());
        assert_eq!(header.looping, src.loop_points().is_some());
        assert_eq!(header.sample_count, headers[0].sample_count);
        assert_eq!(header.start_context.hist1, 0);
        assert_eq!(header.start_context.hist2, 0);
        assert_eq!(header.start_context.predictor_scale, per_channel[ch][0]);
        if channels == 1 {
            assert_eq!(header.channel_count, 0);
            assert_eq!(header.frames_per_interleave, 0);
        } else {
            assert_eq!(header.channel_count as usize, channels);
        }

        let coefs = Coefficients::new(header.coefs);
        let decoded = decode_channel(&per_channel[ch], &coefs, sample_count);
        let compared = std::cmp::min(sample_count, src.len());
        let snr = snr_db(&src.channel(ch)[..compared], &decoded[..compared]);
        assert!(snr >= min_snr_db, "channel {ch}: snr = {snr} dB");

        if header.looping {
            let start = sample_count_from_nibble(header.start_address);
            let ctx = &header.loop_context;
            assert_eq!(ctx.hist1, start.checked_sub(1).map_or(0, |i| decoded[i]));
            assert_eq!(ctx.hist2, start.checked_sub(2).map_or(0, |i| decoded[i]));
        }
        decoded_channels.push(decoded);
    }
    decoded_channels
}

/// Converts a nibble address back to a sample index.
pub fn sample_count_from_nibble(address: usize) -> usize {
    let frame = address / 16;
    frame * 14 + address % 16 - 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_decoder_reads_silence() {
        let coefs = Coefficients::default();
        assert_eq!(decode_channel(&[], &coefs, 20), vec![0i16; 20]);
    }

    #[test]
    fn reference_decoder_applies_scale() {
        let coefs = Coefficients::default();
        // scale 2^3, first nibble +1, second -1.
        let bytes = [0x03, 0x1F, 0, 0, 0, 0, 0, 0];
        let decoded = decode_channel(&bytes, &coefs, 2);
        assert_eq!(decoded, vec![8, -8]);
    }

    #[test]
    fn nibble_address_inverse() {
        for i in [0, 1, 13, 14, 27, 28, 1000] {
            assert_eq!(sample_count_from_nibble(crate::adpcm::sample_to_nibble(i)), i);
        }
    }

    #[test]
    fn deinterleave_with_remainder() {
        let data = [1, 1, 2, 2, 1, 2];
        let ch = deinterleave(&data, 2, 2, 3);
        assert_eq!(ch, vec![vec![1, 1, 1], vec![2, 2, 2]]);
    }
}
