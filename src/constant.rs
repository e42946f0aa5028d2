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

//! Format constants

// Constance sorted in an alphabetical-order.  Top-level constants first, and
// then sub-modules. Constants that are used only in a specific sub-module or
// its caller should be placed in the corresponding submodule.

/// Number of bytes in an ADPCM frame (1 header byte + 7 data bytes).
pub const BYTES_PER_FRAME: usize = 8;

/// Number of coefficient pairs stored for each channel.
pub const COEFFICIENT_PAIRS: usize = 8;

/// Number of nibbles in an ADPCM frame (2 header nibbles + 14 data nibbles).
pub const NIBBLES_PER_FRAME: usize = 16;

/// Number of samples encoded in an ADPCM frame.
pub const SAMPLES_PER_FRAME: usize = 14;

/// Sub-module containing constants related to build-time information.
pub mod build_info {
    pub const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
        Some(v) => v,
        None => "unknown",
    };
}

/// Constants for the fixed-point arithmetic shared with the decoder.
pub mod adpcm {
    /// Coefficients are Q11 fixed-point numbers.
    pub const COEFFICIENT_SHIFT: u32 = 11;

    /// `1 << COEFFICIENT_SHIFT`.
    pub const COEFFICIENT_ONE: i32 = 1 << COEFFICIENT_SHIFT;

    /// Rounding offset added before shifting predictions back to samples.
    pub const ROUNDING_OFFSET: i32 = 1 << (COEFFICIENT_SHIFT - 1);

    /// Largest scale exponent the frame encoder may select.
    pub const MAX_SCALE_POWER: i32 = 12;

    /// Range of a signed residual nibble.
    pub const MIN_NIBBLE: i32 = -8;
    pub const MAX_NIBBLE: i32 = 7;
}

/// Constants related to the coefficient analysis.
pub mod analysis {
    /// Frames with the energy term below this are skipped.
    pub const MIN_FRAME_ENERGY: f64 = 10.0;

    /// Reflection coefficients are clipped to stay inside the unit circle.
    pub const MAX_REFLECTION: f64 = 0.999_999_999_9;

    /// Pivots smaller than this ratio make a frame ill-conditioned.
    pub const MIN_PIVOT_RATIO: f64 = 1.0e-10;

    /// Number of splitting rounds. `1 << SPLIT_ROUNDS` must equal
    /// [`COEFFICIENT_PAIRS`].
    ///
    /// [`COEFFICIENT_PAIRS`]: super::COEFFICIENT_PAIRS
    pub const SPLIT_ROUNDS: usize = 3;

    /// Perturbation applied to the first-order term when splitting clusters.
    pub const SPLIT_PERTURBATION: f64 = 0.01;

    /// Number of refinement passes per splitting round.
    pub const REFINEMENT_PASSES: usize = 2;
}

/// Constants for the .dsp container.
pub mod container {
    /// Size of a channel header in bytes.
    pub const HEADER_SIZE: usize = 0x60;

    /// Format field value for DSP-ADPCM.
    pub const FORMAT_ADPCM: i16 = 0;

    /// Default interleave block size in samples (0x2000 bytes).
    pub const DEFAULT_SAMPLES_PER_INTERLEAVE: usize = 0x3800;

    /// Maximum number of samples per channel. Nibble addresses up to this
    /// sample index fit in the signed 32-bit header fields.
    pub const MAX_SAMPLES: usize =
        (i32::MAX as usize / super::NIBBLES_PER_FRAME) * super::SAMPLES_PER_FRAME;
}

/// Constants related to keys for the environment variables.
pub(crate) mod envvar_key {
    /// Environment variable name for specifying the number of threads.
    #[cfg(feature = "par")]
    pub const DEFAULT_PARALLELISM: &str = "DSPADPCM_WORKERS";
}

/// Module for internal error messages.
///
/// Use `panic!` and those messages only for env-related unrecoverable errors.
/// It's okay to use them in tests, but it's not okay to add another variable
/// only for test functions.
#[cfg(feature = "par")]
pub(crate) mod panic_msg {
    pub const ARC_DESTRUCT_FAILED: &str = "INTERNAL ERROR: Arc destruction failed.";
    pub const MPMC_RECV_FAILED: &str =
        "INTERNAL ERROR: Critical error occured in multi-thread communication channel.";
    pub const MPMC_SEND_FAILED: &str =
        "INTERNAL ERROR: Critical error occured in multi-thread communication channel.";
    pub const MUTEX_LOCK_FAILED: &str = "INTERNAL ERROR: Couldn't get lock for mutex.";
    pub const MUTEX_DROP_FAILED: &str = "INTERNAL ERROR: Couldn't discard mutex.";
    pub const RESULT_MISSING: &str = "INTERNAL ERROR: A channel was not encoded by any worker.";
    pub const THREAD_JOIN_FAILED: &str = "INTERNAL ERROR: Failed to wait thread termination.";
}
