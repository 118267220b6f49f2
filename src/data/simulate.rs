//! Synthetic hierarchical test-score generation with known ground truth.
//!
//! Each school gets its own intercept and air-quality slope. Students are
//! assigned to schools uniformly at random, and their score is
//!
//! ```text
//! y = global_intercept + poi * hours_studying
//!     + intercept[s] + slope[s] * air_quality + N(0, school_noise)
//!     + N(0, individual_noise)
//! ```
//!
//! The returned [`Parameters`] record the truth in the same shape the fitters
//! report estimates: the mean slope goes to `air_quality` and the per-school
//! slopes are stored as deviations from that mean.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::domain::{Dataset, Noise, Observation, Parameters};
use crate::error::AppError;

/// Mean and standard deviation of every covariate and per-school coefficient.
const COVARIATE_MEAN: f64 = 10.0;
const COVARIATE_SD: f64 = 1.0;

/// Global coefficients are drawn as integers in `[0, GLOBAL_COEF_MAX)`.
const GLOBAL_COEF_MAX: i64 = 10;

/// Generator for a fixed number of schools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataGeneration {
    num_schools: usize,
}

impl DataGeneration {
    pub fn new(num_schools: usize) -> Self {
        Self { num_schools }
    }

    /// Draw `data_points` rows and the parameters that generated them.
    ///
    /// `data_points = 0` yields an empty dataset; zero noise yields scores that
    /// are an exact function of the covariates.
    pub fn simulate_data<R: Rng + ?Sized>(
        &self,
        data_points: usize,
        noise: Noise,
        rng: &mut R,
    ) -> Result<(Dataset, Parameters), AppError> {
        if self.num_schools == 0 {
            return Err(AppError::input("Number of schools must be > 0."));
        }
        let school_count = u32::try_from(self.num_schools)
            .map_err(|_| AppError::input("Number of schools does not fit in a school id."))?;

        let covariate = normal(COVARIATE_MEAN, COVARIATE_SD)?;
        let school_eps = normal(0.0, f64::from(noise.school_noise))?;
        let individual_eps = normal(0.0, f64::from(noise.individual_noise))?;

        let school_intercepts: Vec<f64> = draw(&covariate, self.num_schools, rng);
        let school_slopes: Vec<f64> = draw(&covariate, self.num_schools, rng);

        let air_quality: Vec<f64> = draw(&covariate, data_points, rng);
        let schools: Vec<u32> = (0..data_points)
            .map(|_| rng.gen_range(0..school_count))
            .collect();

        let school_impact: Vec<f64> = schools
            .iter()
            .zip(air_quality.iter())
            .map(|(&s, &aq)| {
                let s = s as usize;
                school_intercepts[s] + school_slopes[s] * aq + school_eps.sample(rng)
            })
            .collect();

        let global_intercept = rng.gen_range(0..GLOBAL_COEF_MAX) as f64;
        let parameter_of_interest = rng.gen_range(0..GLOBAL_COEF_MAX) as f64;
        let hours_studying: Vec<f64> = draw(&covariate, data_points, rng);

        let mut data = Dataset::with_capacity(data_points);
        for i in 0..data_points {
            let test_scores = global_intercept
                + parameter_of_interest * hours_studying[i]
                + school_impact[i]
                + individual_eps.sample(rng);
            data.push(Observation {
                test_scores,
                hours_studying: hours_studying[i],
                school: schools[i],
                air_quality: air_quality[i],
            });
        }

        let mean_slope = school_slopes.iter().sum::<f64>() / self.num_schools as f64;
        let truth = Parameters {
            global_intercept,
            parameter_of_interest,
            air_quality: mean_slope,
            school_intercepts,
            school_air_quality: school_slopes.iter().map(|s| s - mean_slope).collect(),
        };

        tracing::debug!(
            rows = data.len(),
            schools = self.num_schools,
            individual_noise = noise.individual_noise,
            school_noise = noise.school_noise,
            "simulated dataset"
        );

        Ok((data, truth))
    }
}

fn normal(mean: f64, sd: f64) -> Result<Normal<f64>, AppError> {
    Normal::new(mean, sd).map_err(|e| AppError::input(format!("Noise distribution error: {e}")))
}

fn draw<R: Rng + ?Sized>(dist: &Normal<f64>, n: usize, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| dist.sample(rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn shapes_match_rows_and_schools() {
        let mut rng = StdRng::seed_from_u64(7);
        for schools in [1, 2, 4, 9] {
            for rows in [1, 10, 500] {
                let noise = Noise { individual_noise: 1, school_noise: 1 };
                let (data, truth) = DataGeneration::new(schools)
                    .simulate_data(rows, noise, &mut rng)
                    .unwrap();
                assert_eq!(data.len(), rows);
                assert_eq!(truth.school_intercepts.len(), schools);
                assert_eq!(truth.school_air_quality.len(), schools);
                assert!(data.school.iter().all(|&s| (s as usize) < schools));
            }
        }
    }

    #[test]
    fn zero_noise_scores_are_exact() {
        let mut rng = StdRng::seed_from_u64(11);
        let (data, truth) = DataGeneration::new(3)
            .simulate_data(200, Noise::default(), &mut rng)
            .unwrap();

        for obs in data.rows() {
            let s = obs.school as usize;
            let slope = truth.air_quality + truth.school_air_quality[s];
            let expected = truth.global_intercept
                + truth.parameter_of_interest * obs.hours_studying
                + truth.school_intercepts[s]
                + slope * obs.air_quality;
            assert!(
                (obs.test_scores - expected).abs() < 1e-9,
                "expected {expected}, got {}",
                obs.test_scores
            );
        }
    }

    #[test]
    fn truth_slope_deviations_sum_to_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let (_, truth) = DataGeneration::new(6)
            .simulate_data(10, Noise::default(), &mut rng)
            .unwrap();
        let total: f64 = truth.school_air_quality.iter().sum();
        assert!(total.abs() < 1e-9);
        assert!((0.0..10.0).contains(&truth.global_intercept));
        assert_eq!(truth.parameter_of_interest.fract(), 0.0);
    }

    #[test]
    fn zero_rows_is_degenerate_but_allowed() {
        let mut rng = StdRng::seed_from_u64(1);
        let (data, truth) = DataGeneration::new(2)
            .simulate_data(0, Noise::default(), &mut rng)
            .unwrap();
        assert!(data.is_empty());
        assert_eq!(truth.school_intercepts.len(), 2);
    }

    #[test]
    fn zero_schools_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = DataGeneration::new(0)
            .simulate_data(10, Noise::default(), &mut rng)
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
