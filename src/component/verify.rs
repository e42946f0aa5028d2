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

use super::datatype::AdpcmChannel;
use super::datatype::AdpcmStream;
use crate::constant::BYTES_PER_FRAME;
use crate::constant::COEFFICIENT_PAIRS;
use crate::constant::adpcm::MAX_SCALE_POWER;
use crate::error::verify_range;
use crate::error::verify_true;
use crate::error::Verify;
use crate::error::VerifyError;

impl Verify for AdpcmChannel {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_true!(
            "data.len",
            self.data().len() == self.expected_data_len(),
            "must match the number of bytes for `sample_count`"
        )?;
        for (i, frame) in self.data().chunks(BYTES_PER_FRAME).enumerate() {
            let coef_index = (frame[0] >> 4) as usize;
            let scale_power = i32::from(frame[0] & 0x0F);
            verify_range!("coef_index", coef_index, ..=(COEFFICIENT_PAIRS - 1))
                .and_then(|()| verify_range!("scale_power", scale_power, ..=MAX_SCALE_POWER))
                .map_err(|e| e.within(&format!("frame[{i}]")))?;
        }
        if let Some((index, _)) = self.loop_snapshot() {
            verify_true!(
                "loop_snapshot.index",
                *index < self.sample_count(),
                "must be less than `sample_count`"
            )?;
        }
        Ok(())
    }
}

impl Verify for AdpcmStream {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_true!(
            "channels",
            !self.channels().is_empty(),
            "must have at least one channel"
        )?;
        verify_range!("sample_rate", self.sample_rate(), 1..)?;
        if let Some(lp) = self.loop_points() {
            verify_true!(
                "loop_points",
                lp.start < lp.end,
                "start must be less than end"
            )?;
            verify_range!("loop_points.end", lp.end, ..=(self.sample_count()))?;
        }
        for (ch, channel) in self.channels().iter().enumerate() {
            channel
                .verify()
                .and_then(|()| {
                    verify_true!(
                        "sample_count",
                        channel.sample_count() == self.sample_count(),
                        "must be identical for all channels"
                    )
                })
                .map_err(|e| e.within(&format!("channels[{ch}]")))?;
        }
        Ok(())
    }
}
