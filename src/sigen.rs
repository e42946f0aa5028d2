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

//! Test signal generator module.
//!
//! This module is primarily intended to be used for tests. Unlike
//! `test_helper.rs`, it can be exported with "__export_sigen" feature so
//! external test drivers can synthesize inputs.

use rand::Rng;
use rand::SeedableRng;

use super::source::PcmBuffer;

/// Test signal generators.
///
/// Generators produce floating-point samples in the nominal range of
/// `[-1.0, 1.0]`, and they are quantized to 16-bit PCM on request.
pub trait Signal: std::fmt::Debug {
    /// Generates a signal from t=`sample_offset` and fills the buffer `dest`.
    fn fill_buffer(&self, sample_offset: usize, dest: &mut [f32]);

    /// Generates `len` samples and returns them as 16-bit PCM.
    ///
    /// Values outside of the nominal range are saturated.
    fn to_vec_quantized(&self, len: usize) -> Vec<i16> {
        let mut buffer = vec![0.0f32; len];
        self.fill_buffer(0, &mut buffer);
        buffer
            .iter()
            .map(|x| {
                (32768.0 * x)
                    .round()
                    .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
            })
            .collect()
    }

    /// Mixes uniform white noise.
    fn noise(self, amplitude: f32) -> Mix<Self, Noise>
    where
        Self: Sized,
    {
        self.mix(Noise::new(amplitude))
    }

    /// Mixes uniform white noise generated from the given seed.
    fn noise_with_seed(self, seed0: u64, amplitude: f32) -> Mix<Self, Noise>
    where
        Self: Sized,
    {
        self.mix(Noise::with_seed(seed0, amplitude))
    }

    /// Mixes signal from the other generator.
    fn mix<T: Signal + Sized>(self, other: T) -> Mix<Self, T>
    where
        Self: Sized,
    {
        Mix::new(1.0, self, 1.0, other)
    }

    /// Concats `other` signal after `offset_time` samples are generated.
    fn concat<T: Signal + Sized>(self, offset_time: usize, other: T) -> Switch<Self, T>
    where
        Self: Sized,
    {
        Switch::new(self, offset_time, other)
    }
}

impl<T: Signal + ?Sized> Signal for Box<T> {
    fn fill_buffer(&self, sample_offset: usize, dest: &mut [f32]) {
        self.as_ref().fill_buffer(sample_offset, dest);
    }
}

/// Builds a [`PcmBuffer`] with one channel per generator.
pub fn to_pcm_buffer(signals: &[&dyn Signal], len: usize, sample_rate: usize) -> PcmBuffer {
    let channels = signals.iter().map(|s| s.to_vec_quantized(len)).collect();
    PcmBuffer::from_channels(channels, sample_rate)
}

/// Generator for constant signals.
#[derive(Clone, Debug)]
pub struct Dc {
    offset: f32,
}

impl Dc {
    /// Constructs new `Dc` signal.
    pub fn new(offset: f32) -> Self {
        Self { offset }
    }
}

impl Signal for Dc {
    fn fill_buffer(&self, _offset: usize, dest: &mut [f32]) {
        dest.fill(self.offset);
    }
}

/// Generator for a sinusoidal wave.
#[derive(Clone, Debug)]
pub struct Sine {
    period: f32,
    amplitude: f32,
    initial_phase: f32,
}

impl Sine {
    /// Constructs new sine wave signal with `period` (in samples) and
    /// `amplitude`.
    pub fn new(period: usize, amplitude: f32) -> Self {
        Self::with_initial_phase(period, amplitude, 0.0)
    }

    /// Constructs new sine wave signal starting from `initial_phase`.
    pub fn with_initial_phase(period: usize, amplitude: f32, initial_phase: f32) -> Self {
        Self {
            period: period as f32,
            amplitude,
            initial_phase,
        }
    }

    /// Constructs a tone of `frequency` Hz for the given sampling rate.
    pub fn tone(frequency: f32, sample_rate: usize, amplitude: f32) -> Self {
        Self {
            period: sample_rate as f32 / frequency,
            amplitude,
            initial_phase: 0.0,
        }
    }
}

impl Signal for Sine {
    fn fill_buffer(&self, offset: usize, dest: &mut [f32]) {
        for (t, p) in dest.iter_mut().enumerate() {
            let t = (t + offset) as f32;
            *p = self.amplitude
                * f32::sin(self.initial_phase + 2.0 * std::f32::consts::PI * t / self.period);
        }
    }
}

/// Generator for a uniform random white noise.
#[derive(Clone, Debug)]
pub struct Noise {
    seed0: u64,
    amplitude: f32,
}

impl Noise {
    /// Constructs new noise generator.
    pub fn new(amplitude: f32) -> Self {
        let seed0: u64 = rand::thread_rng().gen();
        Self { seed0, amplitude }
    }

    /// Constructs new noise generator with specifying a seed.
    pub fn with_seed(seed0: u64, amplitude: f32) -> Self {
        Self { seed0, amplitude }
    }
}

impl Signal for Noise {
    /// Fills buffer with the uniform random values.
    ///
    /// The output depends on `offset`, so filling a buffer in two calls gives
    /// a different signal than filling it at once.
    fn fill_buffer(&self, offset: usize, dest: &mut [f32]) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed0.wrapping_add(offset as u64));
        for p in dest {
            *p = self.amplitude * 2.0 * (rng.sample::<f32, _>(rand::distributions::Open01) - 0.5);
        }
    }
}

/// Decorator that mixes outputs from the inner generators.
#[derive(Clone, Debug)]
pub struct Mix<T1: Signal + Sized, T2: Signal + Sized> {
    weight1: f32,
    weight2: f32,
    signal1: T1,
    signal2: T2,
}

impl<T1: Signal + Sized, T2: Signal + Sized> Mix<T1, T2> {
    /// Constructs new two-inputs mixer.
    pub fn new(weight1: f32, signal1: T1, weight2: f32, signal2: T2) -> Self {
        Self {
            weight1,
            weight2,
            signal1,
            signal2,
        }
    }
}

impl<T1: Signal + Sized, T2: Signal + Sized> Signal for Mix<T1, T2> {
    fn fill_buffer(&self, offset: usize, dest: &mut [f32]) {
        let mut buf = vec![0.0f32; dest.len()];
        self.signal1.fill_buffer(offset, dest);
        for p in &mut *dest {
            *p *= self.weight1;
        }
        self.signal2.fill_buffer(offset, &mut buf);
        for (p, x) in dest.iter_mut().zip(buf.iter()) {
            *p += self.weight2 * *x;
        }
    }
}

/// Decorator that switches to the second generator at a fixed time.
#[derive(Clone, Debug)]
pub struct Switch<T1: Signal + Sized, T2: Signal + Sized> {
    input1: T1,
    offset: usize,
    input2: T2,
}

impl<T1: Signal + Sized, T2: Signal + Sized> Switch<T1, T2> {
    /// Constructs a switcher.
    pub fn new(input1: T1, offset: usize, input2: T2) -> Self {
        Self {
            input1,
            offset,
            input2,
        }
    }
}

impl<T1: Signal + Sized, T2: Signal + Sized> Signal for Switch<T1, T2> {
    fn fill_buffer(&self, offset: usize, dest: &mut [f32]) {
        let split = self.offset.saturating_sub(offset).min(dest.len());
        let (head, tail) = dest.split_at_mut(split);
        self.input1.fill_buffer(offset, head);
        self.input2.fill_buffer(offset + split, tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    #[test]
    fn quantization_saturates() {
        let pcm = Dc::new(2.0).concat(3, Dc::new(-2.0)).to_vec_quantized(6);
        assert_eq!(pcm, vec![32767, 32767, 32767, -32768, -32768, -32768]);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let a = Noise::with_seed(7, 0.5).to_vec_quantized(100);
        let b = Noise::with_seed(7, 0.5).to_vec_quantized(100);
        assert_eq!(a, b);
        assert!(a.iter().all(|x| x.abs() <= 16384));
    }

    #[test]
    fn switch_handles_offsets_beyond_buffer() {
        let sig = Dc::new(0.5).concat(100, Dc::new(-0.5));
        let pcm = sig.to_vec_quantized(10);
        assert!(pcm.iter().all(|x| *x == 16384));

        let mut buf = vec![0.0; 10];
        sig.fill_buffer(95, &mut buf);
        assert_eq!(buf[4], 0.5);
        assert_eq!(buf[5], -0.5);
    }

    #[test]
    fn multichannel_buffer() {
        let left = Sine::tone(440.0, 32000, 0.5);
        let right = Dc::new(0.0);
        let pcm = to_pcm_buffer(&[&left, &right], 1000, 32000);
        assert_eq!(pcm.channels(), 2);
        assert_eq!(pcm.len(), 1000);
        assert!(pcm.channel(1).iter().all(|x| *x == 0));
    }
}
