//! Built-in diabetes cohort
//!
//! Deterministic stand-in for the classic 442-patient diabetes study: ten
//! baseline measurements in their natural units and a disease-progression
//! score one year later. Serum measurements are correlated the way the real
//! panel is (LDL tracks total cholesterol, s4 is the TC/HDL ratio).

use super::{Dataset, FEATURE_COLUMNS};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Population means of the baseline features
const MEANS: [f64; 10] = [48.5, 1.47, 26.4, 94.6, 189.1, 115.4, 49.8, 4.07, 4.64, 91.3];
/// Population standard deviations of the baseline features
const STDS: [f64; 10] = [13.1, 0.5, 4.42, 13.8, 34.6, 30.4, 12.9, 1.29, 0.52, 11.5];
/// Progression effect per standard deviation of each feature
const EFFECTS: [f64; 10] = [0.5, -11.0, 24.0, 15.0, -8.0, 5.0, -10.0, 4.0, 22.0, 3.0];

const BASELINE: f64 = 152.1;
const NOISE_STD: f64 = 50.0;
const TARGET_RANGE: (f64, f64) = (25.0, 346.0);

/// Seeded generator for the diabetes cohort
#[derive(Debug, Clone)]
pub struct DiabetesCohort {
    n_samples: usize,
    seed: u64,
}

impl DiabetesCohort {
    pub fn new(n_samples: usize, seed: u64) -> Self {
        Self { n_samples, seed }
    }

    /// Same `(n_samples, seed)` always yields the same table.
    pub fn generate(&self) -> Result<Dataset> {
        if self.n_samples == 0 {
            return Err(PipelineError::DataError("cohort size must be positive".to_string()));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let normal = |mean: f64, std: f64| {
            Normal::new(mean, std).map_err(|e| PipelineError::DataError(e.to_string()))
        };
        let age_d = normal(MEANS[0], STDS[0])?;
        let bmi_d = normal(MEANS[2], STDS[2])?;
        let bp_d = normal(MEANS[3], STDS[3])?;
        let tc_d = normal(MEANS[4], STDS[4])?;
        let ldl_noise = normal(0.0, 17.0)?;
        let hdl_d = normal(MEANS[6], STDS[6])?;
        let ltg_d = normal(MEANS[8], STDS[8])?;
        let glu_d = normal(MEANS[9], STDS[9])?;
        let noise = normal(0.0, NOISE_STD)?;

        let mut features = Array2::zeros((self.n_samples, FEATURE_COLUMNS.len()));
        let mut target = Array1::zeros(self.n_samples);

        for i in 0..self.n_samples {
            let age = age_d.sample(&mut rng).clamp(19.0, 79.0).round();
            let sex = if rng.gen_bool(0.47) { 2.0 } else { 1.0 };
            let bmi = round_to(bmi_d.sample(&mut rng).clamp(18.0, 42.2), 1);
            let bp = round_to(bp_d.sample(&mut rng).clamp(62.0, 133.0), 2);
            let s1 = tc_d.sample(&mut rng).clamp(97.0, 301.0).round();
            let s2 = round_to(
                (0.77 * (s1 - MEANS[4]) + MEANS[5] + ldl_noise.sample(&mut rng)).clamp(41.6, 242.4),
                1,
            );
            let s3 = hdl_d.sample(&mut rng).clamp(22.0, 99.0).round();
            let s4 = round_to(s1 / s3, 2);
            let s5 = round_to(ltg_d.sample(&mut rng).clamp(3.26, 6.11), 4);
            let s6 = glu_d.sample(&mut rng).clamp(58.0, 124.0).round();

            let row = [age, sex, bmi, bp, s1, s2, s3, s4, s5, s6];
            let signal: f64 = row
                .iter()
                .zip(MEANS.iter().zip(STDS.iter()))
                .zip(EFFECTS.iter())
                .map(|((&x, (&m, &s)), &e)| e * (x - m) / s)
                .sum();
            let y = (BASELINE + signal + noise.sample(&mut rng))
                .clamp(TARGET_RANGE.0, TARGET_RANGE.1)
                .round();

            for (j, v) in row.iter().enumerate() {
                features[[i, j]] = *v;
            }
            target[i] = y;
        }

        Dataset::new(
            FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            features,
            target,
        )
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
