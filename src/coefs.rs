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

//! Coefficient analysis for the second-order predictors.
//!
//! Each frame of the input is analyzed with the covariance method, and the
//! per-frame predictors are clustered into [`COEFFICIENT_PAIRS`] groups by
//! repeated splitting and refinement. Clustering is done in the
//! autocorrelation domain, and cluster centroids are converted back to
//! predictors with the Levinson-Durbin recursion.

use super::component::Coefficients;
use super::constant::adpcm::COEFFICIENT_ONE;
use super::constant::analysis::MAX_REFLECTION;
use super::constant::analysis::MIN_FRAME_ENERGY;
use super::constant::analysis::MIN_PIVOT_RATIO;
use super::constant::analysis::REFINEMENT_PASSES;
use super::constant::analysis::SPLIT_PERTURBATION;
use super::constant::analysis::SPLIT_ROUNDS;
use super::constant::COEFFICIENT_PAIRS;
use super::constant::SAMPLES_PER_FRAME;

/// Second-order vector with the implicit leading term at index 0.
type Vec3 = [f64; 3];

/// Matrix indexed from 1 like `Vec3`. Row and column 0 are scratch space.
type Mat3 = [[f64; 3]; 3];

/// Previous frame followed by the current frame.
type History = [i16; SAMPLES_PER_FRAME * 2];

/// Computes negated correlations between the current frame and its lags.
fn correlate_lags(pcm: &History) -> Vec3 {
    let mut ret = [0.0; 3];
    for (i, p) in ret.iter_mut().enumerate() {
        for x in 0..SAMPLES_PER_FRAME {
            *p -= f64::from(pcm[SAMPLES_PER_FRAME + x - i])
                * f64::from(pcm[SAMPLES_PER_FRAME + x]);
        }
    }
    ret
}

/// Computes the covariance matrix of the lagged frames.
fn covariance(pcm: &History) -> Mat3 {
    let mut ret = [[0.0; 3]; 3];
    for x in 1..=2 {
        for y in 1..=2 {
            for z in 0..SAMPLES_PER_FRAME {
                ret[x][y] += f64::from(pcm[SAMPLES_PER_FRAME + z - x])
                    * f64::from(pcm[SAMPLES_PER_FRAME + z - y]);
            }
        }
    }
    ret
}

/// LU-decomposes `mtx` in place with partial pivoting.
///
/// Returns the pivot order, or `None` if the matrix is ill-conditioned.
fn decompose(mtx: &mut Mat3) -> Option<[usize; 3]> {
    let mut pivots = [0usize; 3];
    let mut recips = [0.0f64; 3];

    for x in 1..=2 {
        let val = mtx[x][1].abs().max(mtx[x][2].abs());
        if val < f64::EPSILON {
            return None;
        }
        recips[x] = 1.0 / val;
    }

    let mut max_index = 0;
    for i in 1..=2 {
        for x in 1..i {
            let mut tmp = mtx[x][i];
            for y in 1..x {
                tmp -= mtx[x][y] * mtx[y][i];
            }
            mtx[x][i] = tmp;
        }

        let mut val = 0.0;
        for x in i..=2 {
            let mut tmp = mtx[x][i];
            for y in 1..i {
                tmp -= mtx[x][y] * mtx[y][i];
            }
            mtx[x][i] = tmp;
            let scaled = tmp.abs() * recips[x];
            if scaled >= val {
                val = scaled;
                max_index = x;
            }
        }

        if max_index != i {
            for y in 1..=2 {
                let tmp = mtx[max_index][y];
                mtx[max_index][y] = mtx[i][y];
                mtx[i][y] = tmp;
            }
            recips[max_index] = recips[i];
        }
        pivots[i] = max_index;

        if mtx[i][i] == 0.0 {
            return None;
        }
        if i != 2 {
            let tmp = 1.0 / mtx[i][i];
            for x in (i + 1)..=2 {
                mtx[x][i] *= tmp;
            }
        }
    }

    let mut min = f64::MAX;
    let mut max = 0.0f64;
    for i in 1..=2 {
        let tmp = mtx[i][i].abs();
        min = min.min(tmp);
        max = max.max(tmp);
    }
    if min / max < MIN_PIVOT_RATIO {
        None
    } else {
        Some(pivots)
    }
}

/// Solves the decomposed system in place. `vec[0]` is set to one.
fn substitute(mtx: &Mat3, pivots: &[usize; 3], vec: &mut Vec3) {
    let mut first_nonzero = 0;
    for i in 1..=2 {
        let index = pivots[i];
        let mut tmp = vec[index];
        vec[index] = vec[i];
        if first_nonzero != 0 {
            for y in first_nonzero..i {
                tmp -= vec[y] * mtx[i][y];
            }
        } else if tmp != 0.0 {
            first_nonzero = i;
        }
        vec[i] = tmp;
    }

    for i in (1..=2).rev() {
        let mut tmp = vec[i];
        for y in (i + 1)..=2 {
            tmp -= vec[y] * mtx[i][y];
        }
        vec[i] = tmp / mtx[i][i];
    }

    vec[0] = 1.0;
}

/// Converts a predictor to reflection coefficients in place.
///
/// Returns `false` if the predictor is not stable.
fn to_reflection(vec: &mut Vec3) -> bool {
    let k2 = vec[2];
    let denom = 1.0 - k2 * k2;
    if denom == 0.0 {
        return false;
    }
    vec[0] = (vec[0] - k2 * k2) / denom;
    vec[1] = (vec[1] - vec[1] * k2) / denom;
    vec[1].abs() <= 1.0
}

/// Converts reflection coefficients to a predictor after clipping them into
/// the stable region.
fn from_reflection(reflection: &Vec3) -> Vec3 {
    let mut k = *reflection;
    for z in 1..=2 {
        k[z] = k[z].clamp(-MAX_REFLECTION, MAX_REFLECTION);
    }
    [1.0, k[2] * k[1] + k[1], k[2]]
}

/// Converts a predictor to the normalized autocorrelation it models.
fn to_autocorrelation(predictor: &Vec3) -> Vec3 {
    let mut mtx = [[0.0; 3]; 3];
    mtx[2][0] = 1.0;
    for i in 1..=2 {
        mtx[2][i] = -predictor[i];
    }
    for i in (1..=2).rev() {
        let val = 1.0 - mtx[i][i] * mtx[i][i];
        for y in 1..=i {
            mtx[i - 1][y] = (mtx[i][i] * mtx[i][y] + mtx[i][y]) / val;
        }
    }

    let mut ret = [1.0, 0.0, 0.0];
    for i in 1..=2 {
        for y in 1..=i {
            ret[i] += mtx[i][y] * ret[i - y];
        }
    }
    ret
}

/// Levinson-Durbin recursion from an autocorrelation to a predictor.
fn levinson(autocorr: &Vec3) -> Vec3 {
    let mut reflection = [0.0; 3];
    let mut ret = [1.0, 0.0, 0.0];
    let mut err = autocorr[0];
    for i in 1..=2 {
        let mut acc = 0.0;
        for y in 1..i {
            acc += ret[y] * autocorr[i - y];
        }
        ret[i] = if err > 0.0 {
            -(acc + autocorr[i]) / err
        } else {
            0.0
        };
        reflection[i] = ret[i];
        for y in 1..i {
            ret[y] += ret[i] * ret[i - y];
        }
        err *= 1.0 - ret[i] * ret[i];
    }
    from_reflection(&reflection)
}

/// Distance between a cluster centroid and a frame predictor.
fn contrast(centroid: &Vec3, record: &Vec3) -> f64 {
    let val = (record[2] * record[1] - record[1]) / (1.0 - record[2] * record[2]);
    let val1 = centroid[0] * centroid[0] + centroid[1] * centroid[1] + centroid[2] * centroid[2];
    let val2 = centroid[0] * centroid[1] + centroid[1] * centroid[2];
    let val3 = centroid[0] * centroid[2];
    val1 + 2.0 * val * val2 + 2.0 * (-record[1] * val - record[2]) * val3
}

/// Collects stable per-frame predictors.
///
/// Frames with too little energy or an ill-conditioned covariance are
/// skipped. The last partial frame is zero-padded.
fn collect_records(samples: &[i16]) -> Vec<Vec3> {
    let mut records = Vec::with_capacity(samples.len().div_ceil(SAMPLES_PER_FRAME));
    let mut pcm: History = [0; SAMPLES_PER_FRAME * 2];
    for frame in samples.chunks(SAMPLES_PER_FRAME) {
        pcm[SAMPLES_PER_FRAME..].fill(0);
        pcm[SAMPLES_PER_FRAME..SAMPLES_PER_FRAME + frame.len()].copy_from_slice(frame);

        let mut vec = correlate_lags(&pcm);
        if vec[0].abs() > MIN_FRAME_ENERGY {
            let mut mtx = covariance(&pcm);
            if let Some(pivots) = decompose(&mut mtx) {
                substitute(&mtx, &pivots, &mut vec);
                if to_reflection(&mut vec) {
                    records.push(from_reflection(&vec));
                }
            }
        }

        pcm.copy_within(SAMPLES_PER_FRAME.., 0);
    }
    records
}

/// Assigns records to the nearest centroids and recomputes the centroids.
fn refine(centroids: &mut [Vec3], records: &[Vec3]) {
    for _pass in 0..REFINEMENT_PASSES {
        let mut sums = vec![[0.0f64; 3]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for record in records {
            let mut index = 0;
            let mut best = 1.0e30;
            for (i, centroid) in centroids.iter().enumerate() {
                let d = contrast(centroid, record);
                if d < best {
                    best = d;
                    index = i;
                }
            }
            counts[index] += 1;
            let autocorr = to_autocorrelation(record);
            for (s, a) in sums[index].iter_mut().zip(autocorr.iter()) {
                *s += a;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums.iter_mut()).zip(counts) {
            if count > 0 {
                for s in sum.iter_mut() {
                    *s /= count as f64;
                }
            }
            *centroid = levinson(sum);
        }
    }
}

/// Converts a predictor term to a Q11 coefficient.
fn quantize(term: f64) -> i16 {
    let d = -term * f64::from(COEFFICIENT_ONE);
    if d.is_finite() {
        d.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    } else {
        0
    }
}

/// Derives the predictor coefficient pairs for one channel.
///
/// Silent or near-silent input yields all-zero coefficients.
///
/// # Examples
///
/// ```
/// # use dspadpcm::coefs::analyze;
/// let coefs = analyze(&[0i16; 1000]);
/// assert!(coefs.as_array().iter().all(|c| *c == 0));
/// ```
pub fn analyze(samples: &[i16]) -> Coefficients {
    let records = collect_records(samples);
    analyze_records(&records)
}

fn analyze_records(records: &[Vec3]) -> Coefficients {
    if records.is_empty() {
        return Coefficients::default();
    }

    let mut mean = [1.0, 0.0, 0.0];
    for record in records {
        let autocorr = to_autocorrelation(record);
        mean[1] += autocorr[1];
        mean[2] += autocorr[2];
    }
    mean[1] /= records.len() as f64;
    mean[2] /= records.len() as f64;

    let mut centroids = [[0.0f64; 3]; COEFFICIENT_PAIRS];
    centroids[0] = levinson(&mean);
    for round in 0..SPLIT_ROUNDS {
        let n = 1 << round;
        for i in 0..n {
            centroids[n + i] = centroids[i];
            centroids[n + i][1] -= SPLIT_PERTURBATION;
        }
        refine(&mut centroids[..2 * n], records);
    }

    let mut ret = [0i16; COEFFICIENT_PAIRS * 2];
    for (pair, centroid) in ret.chunks_exact_mut(2).zip(centroids.iter()) {
        pair[0] = quantize(centroid[1]);
        pair[1] = quantize(centroid[2]);
    }
    Coefficients::new(ret)
}
