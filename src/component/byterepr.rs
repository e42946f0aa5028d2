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

#[cfg(test)]
use crate::bytesink::MemSink;

use crate::bytesink::ByteSink;
use crate::constant::container::FORMAT_ADPCM;
use crate::constant::container::HEADER_SIZE;
use crate::error::fit_field;
use crate::error::OutputError;

use super::datatype::AdpcmContext;
use super::datatype::ChannelHeader;
use super::datatype::Dsp;

/// Number of bytes taken by the header fields. The rest is reserved.
const HEADER_FIELDS_SIZE: usize = 0x4E;

pub mod seal_byte_repr {
    pub trait Sealed {}
    impl Sealed for super::ChannelHeader {}
    impl Sealed for super::Dsp {}
}

/// .dsp components that can be represented in a byte sequence.
pub trait ByteRepr: seal_byte_repr::Sealed {
    /// Counts the number of bytes required to store the component.
    fn count_bytes(&self) -> usize;

    /// Writes the byte sequence to `ByteSink`.
    ///
    /// # Errors
    ///
    /// This function returns error if `self` contains a value that does not
    /// fit to the fixed-width fields, or if a `ByteSink` method returned an
    /// error.
    fn write<S: ByteSink>(&self, dest: &mut S) -> Result<(), OutputError<S>>;

    /// Test utility for obtaining bytes as a [`Vec`] of [`u8`].
    #[cfg(test)]
    fn to_bytes(&self) -> Vec<u8> {
        let mut sink = MemSink::new();
        self.write(&mut sink).expect("No error expected");
        sink.into_inner()
    }

    /// Checks if the number of bytes actually written equals to the expected
    /// number of bytes.
    ///
    /// # Errors
    ///
    /// Returns `Err((expected_bytes, actual_bytes))` on mismatch.
    #[cfg(test)]
    fn verify_byte_counter(&self) -> Result<usize, (usize, usize)> {
        let expected = self.count_bytes();
        let actual = self.to_bytes().len();
        if expected == actual {
            Ok(expected)
        } else {
            Err((expected, actual))
        }
    }
}

fn write_context<S: ByteSink>(dest: &mut S, ctx: &AdpcmContext) -> Result<(), OutputError<S>> {
    dest.write(i16::from(ctx.predictor_scale))
        .map_err(OutputError::<S>::from_sink)?;
    dest.write(ctx.hist1).map_err(OutputError::<S>::from_sink)?;
    dest.write(ctx.hist2).map_err(OutputError::<S>::from_sink)?;
    Ok(())
}

impl ByteRepr for ChannelHeader {
    #[inline]
    fn count_bytes(&self) -> usize {
        HEADER_SIZE
    }

    fn write<S: ByteSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let sample_count: i32 = fit_field("sample_count", self.sample_count)?;
        let nibble_count: i32 = fit_field("nibble_count", self.nibble_count)?;
        let sample_rate: i32 = fit_field("sample_rate", self.sample_rate)?;
        let start_address: i32 = fit_field("start_address", self.start_address)?;
        let end_address: i32 = fit_field("end_address", self.end_address)?;
        let current_address: i32 = fit_field("current_address", self.current_address)?;
        let channel_count: i16 = fit_field("channel_count", self.channel_count)?;
        let frames_per_interleave: i16 =
            fit_field("frames_per_interleave", self.frames_per_interleave)?;

        dest.write(sample_count)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(nibble_count)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(sample_rate).map_err(OutputError::<S>::from_sink)?;
        dest.write(i16::from(self.looping))
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(FORMAT_ADPCM)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(start_address)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(end_address).map_err(OutputError::<S>::from_sink)?;
        dest.write(current_address)
            .map_err(OutputError::<S>::from_sink)?;
        for c in self.coefs.as_array() {
            dest.write(*c).map_err(OutputError::<S>::from_sink)?;
        }
        dest.write(self.gain).map_err(OutputError::<S>::from_sink)?;
        write_context(dest, &self.start_context)?;
        write_context(dest, &self.loop_context)?;
        dest.write(channel_count)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(frames_per_interleave)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_zeros(HEADER_SIZE - HEADER_FIELDS_SIZE)
            .map_err(OutputError::<S>::from_sink)?;
        Ok(())
    }
}

impl ByteRepr for Dsp {
    fn count_bytes(&self) -> usize {
        self.headers.len() * HEADER_SIZE + self.data.iter().map(Vec::len).sum::<usize>()
    }

    fn write<S: ByteSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        for header in &self.headers {
            header.write(dest)?;
        }
        if self.bytes_per_interleave == 0 {
            for data in &self.data {
                dest.write_bytes(data).map_err(OutputError::<S>::from_sink)?;
            }
            return Ok(());
        }

        let budget = self.channel_budget();
        let mut offset = 0;
        while offset < budget {
            let end = std::cmp::min(budget, offset + self.bytes_per_interleave);
            for data in &self.data {
                dest.write_bytes(&data[offset..end])
                    .map_err(OutputError::<S>::from_sink)?;
            }
            offset = end;
        }
        Ok(())
    }
}
