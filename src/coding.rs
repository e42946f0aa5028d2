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

//! Controller connecting coding algorithms.

use super::adpcm;
use super::adpcm::sample_count_to_byte_count;
use super::adpcm::EncoderState;
use super::bytesink::MemSink;
use super::coefs;
use super::component::AdpcmChannel;
use super::component::AdpcmStream;
use super::component::ByteRepr;
use super::config;
use super::constant::BYTES_PER_FRAME;
use super::constant::COEFFICIENT_PAIRS;
use super::constant::SAMPLES_PER_FRAME;
use super::container;
use super::error::EncodeError;
use super::error::OutputError;
use super::error::SourceError;
use super::error::Verify;
use super::source::validate_source;
use super::source::Source;

/// Encodes one channel of PCM samples.
///
/// Coefficients are estimated from the whole channel first, and then frames
/// are encoded one by one while threading the decoder history through. If
/// `loop_start` is given, the decoder context right before that sample is
/// recorded in the returned channel.
///
/// # Examples
///
/// ```
/// # use dspadpcm::*;
/// let samples = vec![0i16; 100];
/// let channel = encode_channel(&samples, Some(20));
/// assert_eq!(channel.sample_count(), 100);
/// assert_eq!(channel.data().len(), 58);
/// assert!(channel.loop_snapshot().is_some());
/// ```
pub fn encode_channel(samples: &[i16], loop_start: Option<usize>) -> AdpcmChannel {
    let coefs = coefs::analyze(samples);
    let mut data = Vec::with_capacity(sample_count_to_byte_count(samples.len()));
    let mut state = EncoderState::default();
    let mut snapshot = None;

    for (frame_index, chunk) in samples.chunks(SAMPLES_PER_FRAME).enumerate() {
        let frame = adpcm::encode_frame(&coefs, &state, chunk);
        if let Some(ls) = loop_start {
            if ls / SAMPLES_PER_FRAME == frame_index {
                snapshot = Some((ls, frame.context_before(ls % SAMPLES_PER_FRAME)));
            }
        }
        data.extend_from_slice(&frame.bytes()[..sample_count_to_byte_count(chunk.len())]);
        state = frame.next_state();
    }

    AdpcmChannel::new(coefs, data, samples.len(), snapshot)
}

/// Counts how many frames used each coefficient pair.
#[cfg_attr(not(feature = "log"), allow(dead_code))]
fn coefficient_usage(channel: &AdpcmChannel) -> [usize; COEFFICIENT_PAIRS] {
    let mut counts = [0usize; COEFFICIENT_PAIRS];
    for frame in channel.data().chunks(BYTES_PER_FRAME) {
        counts[(frame[0] >> 4) as usize] += 1;
    }
    counts
}

fn encode_channels_sequential<T: Source + ?Sized>(
    src: &T,
    loop_start: Option<usize>,
) -> Vec<AdpcmChannel> {
    (0..src.channels())
        .map(|ch| encode_channel(src.channel(ch), loop_start))
        .collect()
}

#[cfg(feature = "par")]
fn encode_channels<T: Source + ?Sized>(
    config: &config::Encoder,
    src: &T,
    loop_start: Option<usize>,
) -> Result<Vec<AdpcmChannel>, SourceError> {
    if config.multithread {
        super::par::encode_channels(config, src, loop_start)
    } else {
        Ok(encode_channels_sequential(src, loop_start))
    }
}

#[cfg(not(feature = "par"))]
#[allow(clippy::unnecessary_wraps)]
fn encode_channels<T: Source + ?Sized>(
    _config: &config::Encoder,
    src: &T,
    loop_start: Option<usize>,
) -> Result<Vec<AdpcmChannel>, SourceError> {
    Ok(encode_channels_sequential(src, loop_start))
}

/// Encodes all channels of `src` into an `AdpcmStream`.
///
/// The loop context of each channel is captured at the loop start after
/// applying `config.container.loop_point_alignment`. The stream itself keeps
/// the loop points given by `src`.
///
/// # Errors
///
/// Returns `EncodeError::Config` when `config` is invalid, and
/// `EncodeError::Source` when `src` is not encodable.
///
/// # Examples
///
/// ```
/// # use dspadpcm::*;
/// # use dspadpcm::source::*;
/// let src = PcmBuffer::from_interleaved(&[0i16; 200], 2, 44100).with_loop(0, 100);
/// let stream = encode_stream(&config::Encoder::default(), &src).unwrap();
/// assert_eq!(stream.channel_count(), 2);
/// assert_eq!(stream.sample_count(), 100);
/// assert!(stream.is_looping());
/// ```
pub fn encode_stream<T: Source + ?Sized>(
    config: &config::Encoder,
    src: &T,
) -> Result<AdpcmStream, EncodeError> {
    config.verify()?;
    validate_source(src)?;

    let loop_points = src.loop_points();
    let loop_start = loop_points
        .and_then(|lp| lp.aligned(config.container.loop_point_alignment))
        .map(|lp| lp.start);
    let channels = encode_channels(config, src, loop_start)?;

    let mut stream = AdpcmStream::new(src.sample_rate(), src.len(), loop_points);
    for (_ch, channel) in channels.into_iter().enumerate() {
        #[cfg(feature = "log")]
        info!(
            target: "dspadpcm::coding::jsonl",
            "{{ channel: {}, sample_count: {}, frame_count: {}, coef_usage: {:?} }}",
            _ch,
            channel.sample_count(),
            channel.data().len().div_ceil(BYTES_PER_FRAME),
            coefficient_usage(&channel),
        );
        stream.add_channel(channel);
    }
    Ok(stream)
}

/// Encodes `src` into the bytes of a .dsp file.
///
/// # Errors
///
/// Returns `EncodeError::Config` when `config` is invalid or cannot lay out
/// `src`, `EncodeError::Source` when `src` is not encodable, and
/// `EncodeError::Range` when the result exceeds the header fields.
///
/// # Examples
///
/// ```
/// # use dspadpcm::*;
/// # use dspadpcm::source::*;
/// let src = PcmBuffer::from_channels(vec![vec![0i16; 100]; 2], 32000);
/// let bytes = encode_to_dsp(&config::Encoder::default(), &src).unwrap();
/// assert_eq!(bytes.len(), (0x60 + 64) * 2);
/// ```
pub fn encode_to_dsp<T: Source + ?Sized>(
    config: &config::Encoder,
    src: &T,
) -> Result<Vec<u8>, EncodeError> {
    config.verify()?;
    container::verify_layout(&config.container, src.channels(), src.loop_points())
        .map_err(|e| e.within("container"))?;
    let stream = encode_stream(config, src)?;
    let dsp = container::build(&config.container, &stream)?;

    let mut sink = MemSink::with_capacity(dsp.count_bytes());
    dsp.write(&mut sink).map_err(OutputError::into_range_error)?;
    Ok(sink.into_inner())
}
