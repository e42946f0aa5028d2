// Copyright 2023-2024 Google LLC
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

//! A module for signal sources for "dspadpcm-bin".

use std::path::Path;

use dspadpcm::error::SourceError;
use dspadpcm::error::SourceErrorReason;
use dspadpcm::source::LoopPoints;
use dspadpcm::source::PcmBuffer;
use dspadpcm::source::Source;

#[allow(clippy::wildcard_enum_match_arm)]
fn convert_hound_error(e: hound::Error) -> SourceError {
    match e {
        hound::Error::IoError(e) => SourceError::from_io_error(e),
        hound::Error::Unsupported => SourceError::by_reason(SourceErrorReason::UnsupportedFormat),
        _ => SourceError::by_reason(SourceErrorReason::InvalidFormat),
    }
}

/// An implementation of `dspadpcm::source::Source` loaded by `hound`.
///
/// The whole file is read into memory on construction. Only 16-bit integer
/// PCM is accepted.
#[allow(clippy::module_name_repetitions)]
pub struct HoundSource {
    buffer: PcmBuffer,
    file_size: Option<usize>,
}

impl HoundSource {
    /// Constructs `HoundSource` from `path`.
    ///
    /// # Errors
    ///
    /// The function fails when file is not found or has invalid format. WAVs
    /// with IEEE float samples or with sample widths other than 16 bits are
    /// rejected with `SourceErrorReason::UnsupportedFormat`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file_size = path.metadata().ok().map(|x| x.len() as usize);
        let reader = hound::WavReader::open(path)
            .map_err(|e| convert_hound_error(e).set_path(path))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(
                SourceError::by_reason(SourceErrorReason::UnsupportedFormat).set_path(path),
            );
        }
        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<i16>, _>>()
            .map_err(|e| convert_hound_error(e).set_path(path))?;
        let buffer = PcmBuffer::from_interleaved(
            &samples,
            spec.channels as usize,
            spec.sample_rate as usize,
        );
        Ok(Self { buffer, file_size })
    }

    /// Sets loop points in sample indices.
    #[must_use]
    pub fn with_loop(self, start: usize, end: usize) -> Self {
        Self {
            buffer: self.buffer.with_loop(start, end),
            ..self
        }
    }

    pub const fn file_size(&self) -> Option<usize> {
        self.file_size
    }

    pub fn duration_as_secs(&self) -> f32 {
        self.buffer.len() as f32 / self.buffer.sample_rate() as f32
    }
}

impl Source for HoundSource {
    #[inline]
    fn channels(&self) -> usize {
        self.buffer.channels()
    }

    #[inline]
    fn sample_rate(&self) -> usize {
        self.buffer.sample_rate()
    }

    #[inline]
    fn channel(&self, ch: usize) -> &[i16] {
        self.buffer.channel(ch)
    }

    #[inline]
    fn loop_points(&self) -> Option<LoopPoints> {
        self.buffer.loop_points()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dspadpcm::sigen;
    use dspadpcm::sigen::Signal;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i32]) {
        let mut writer = hound::WavWriter::create(path, spec).expect("cannot create wav");
        for s in samples {
            writer.write_sample(*s).expect("write failed");
        }
        writer.finalize().expect("finalize failed");
    }

    #[test]
    fn load_stereo_wav() {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let path = dir.path().join("stereo.wav");
        let signal = sigen::Sine::new(30, 0.5).to_vec_quantized(200);
        let interleaved: Vec<i32> = signal
            .iter()
            .flat_map(|s| [i32::from(*s), -i32::from(*s)])
            .collect();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 32000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, &interleaved);

        let src = HoundSource::from_path(&path).expect("should be loaded");
        assert_eq!(src.channels(), 2);
        assert_eq!(src.sample_rate(), 32000);
        assert_eq!(src.len(), 200);
        assert_eq!(src.channel(0), &signal[..]);
        assert_eq!(src.channel(1)[10], -signal[10]);
        assert!(src.loop_points().is_none());
        assert_eq!(src.with_loop(10, 20).loop_points(), Some(LoopPoints::new(10, 20)));
    }

    #[test]
    fn reject_8bit_wav() {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let path = dir.path().join("8bit.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, &[0, 1, -1, 2]);

        let err = HoundSource::from_path(&path)
            .err()
            .expect("8-bit wav should be rejected");
        assert!(matches!(
            err.reason(),
            SourceErrorReason::UnsupportedFormat
        ));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let err = HoundSource::from_path(dir.path().join("missing.wav"))
            .err()
            .expect("should fail");
        assert!(matches!(err.reason(), SourceErrorReason::IO(_)));
    }
}
