use ndarray::{Array1, Array2, ArrayD};
use serde::{Serialize, Deserialize};

use crate::compartment::CompartmentModel;
use crate::errors::*;
use crate::observe::ObservationNoise;

/// Priors and structure of the single-region model.
///
/// Durations are in time steps; `*_shape` and `*_conc` control how tightly
/// the priors concentrate around the `*_est` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeirConfig {
    pub compartment_model: CompartmentModel,
    pub num_steps: usize,
    pub population: f64,
    pub forecast_steps: usize,

    pub e_duration_est: f64,
    pub i_duration_est: f64,
    pub r0_est: f64,
    pub beta_shape: f64,
    pub sigma_shape: f64,
    pub gamma_shape: f64,

    pub det_rate_est: f64,
    pub det_rate_conc: f64,
    pub det_noise_scale: f64,

    pub rw_scale: f64,
    /// Sample a drift for the transmission-rate random walk with this prior
    /// scale; without it the drift is zero.
    pub drift_prior_scale: Option<f64>,

    pub use_hospitalization: bool,
    pub hosp_rate_est: f64,
    pub hosp_rate_conc: f64,
    pub hosp_noise_scale: f64,

    pub observation_noise: ObservationNoise,
}

impl Default for SeirConfig {
    fn default() -> Self {
        Self {
            compartment_model: CompartmentModel::Seir,
            num_steps: 50,
            population: 1e5,
            forecast_steps: 0,
            e_duration_est: 4.0,
            i_duration_est: 2.0,
            r0_est: 3.0,
            beta_shape: 1.0,
            sigma_shape: 5.0,
            gamma_shape: 5.0,
            det_rate_est: 0.3,
            det_rate_conc: 50.0,
            det_noise_scale: 0.15,
            rw_scale: 0.1,
            drift_prior_scale: None,
            use_hospitalization: false,
            hosp_rate_est: 0.15,
            hosp_rate_conc: 30.0,
            hosp_noise_scale: 0.3,
            observation_noise: ObservationNoise::Normal,
        }
    }
}

/// Priors of the multi-region model. Region-level parameters are centered
/// on the `*_est` values shifted by a shared bias and a covariate effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalConfig {
    pub num_steps: usize,
    /// One population for every region, or one per region.
    pub population: Vec<f64>,
    pub forecast_steps: usize,

    pub e_duration_est: f64,
    pub i_duration_est: f64,
    pub r0_est: f64,

    pub det_rate_est: f64,
    pub det_rate_conc: f64,
    pub det_noise_scale: f64,

    pub rw_scale: f64,

    pub observation_noise: ObservationNoise,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            num_steps: 50,
            population: vec![1e5],
            forecast_steps: 0,
            e_duration_est: 4.5,
            i_duration_est: 3.0,
            r0_est: 4.5,
            det_rate_est: 0.3,
            det_rate_conc: 50.0,
            det_noise_scale: 0.2,
            rw_scale: 0.1,
            observation_noise: ObservationNoise::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ModelConfig {
    Stochastic(SeirConfig),
    Hierarchical(HierarchicalConfig),
}

impl ModelConfig {
    /// Parses a model configuration, reporting an unrecognized
    /// `compartment_model` as such rather than as malformed JSON.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        check_compartment_model(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn num_steps(&self) -> usize {
        match self {
            ModelConfig::Stochastic(c) => c.num_steps,
            ModelConfig::Hierarchical(c) => c.num_steps,
        }
    }

    pub fn forecast_steps(&self) -> usize {
        match self {
            ModelConfig::Stochastic(c) => c.forecast_steps,
            ModelConfig::Hierarchical(c) => c.forecast_steps,
        }
    }
}

pub fn check_compartment_model(model: &serde_json::Value) -> Result<()> {
    if let Some(name) = model.get("compartment_model").and_then(|v| v.as_str()) {
        name.parse::<CompartmentModel>()?;
    }
    Ok(())
}

/// Observed cumulative counts for one region. `null` marks a missing day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeirData {
    pub confirmed: Option<Vec<Option<f64>>>,
    pub hospitalized: Option<Vec<Option<f64>>>,
}

impl SeirData {
    pub fn confirmed_series(&self) -> Option<ArrayD<f64>> {
        self.confirmed.as_ref().map(|s| series_to_array(s))
    }

    pub fn hospitalized_series(&self) -> Option<ArrayD<f64>> {
        self.hospitalized.as_ref().map(|s| series_to_array(s))
    }
}

/// Region covariates (one row per region) and optional observed counts
/// (one row per region, one column per time step).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalData {
    pub covariates: Vec<Vec<f64>>,
    pub confirmed: Option<Vec<Vec<Option<f64>>>>,
}

impl HierarchicalData {
    pub fn num_places(&self) -> usize {
        self.covariates.len()
    }

    pub fn covariate_matrix(&self) -> Result<Array2<f64>> {
        let rows = self.covariates.len();
        let cols = self.covariates.first().map(|r| r.len()).unwrap_or(0);
        if let Some(row) = self.covariates.iter().find(|r| r.len() != cols) {
            return Err(Error::shape_mismatch("covariate rows", &[row.len()], &[cols]));
        }
        let values = self.covariates.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows, cols), values).map_err(
            |_| Error::shape_mismatch("covariates", &[rows, cols], &[rows * cols])
        )
    }

    pub fn confirmed_matrix(&self) -> Result<Option<ArrayD<f64>>> {
        let confirmed = match &self.confirmed {
            Some(confirmed) => confirmed,
            None => return Ok(None),
        };
        let rows = confirmed.len();
        let cols = confirmed.first().map(|r| r.len()).unwrap_or(0);
        if let Some(row) = confirmed.iter().find(|r| r.len() != cols) {
            return Err(Error::shape_mismatch("confirmed rows", &[row.len()], &[cols]));
        }
        let values = confirmed.iter().flatten().map(|v| v.unwrap_or(f64::NAN)).collect();
        let matrix = Array2::from_shape_vec((rows, cols), values).map_err(
            |_| Error::shape_mismatch("confirmed", &[rows, cols], &[rows * cols])
        )?;
        Ok(Some(matrix.into_dyn()))
    }
}

/// Missing entries become NaN, which the observation link masks out.
pub fn series_to_array(series: &[Option<f64>]) -> ArrayD<f64> {
    Array1::from(series.iter().map(|v| v.unwrap_or(f64::NAN)).collect::<Vec<_>>()).into_dyn()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub rng_seed: Option<u32>,
    /// Prior draws weighed against the data.
    pub num_draws: usize,
    /// Posterior draws kept after resampling.
    pub num_samples: usize,
    /// Individual paths included with each summary.
    pub num_sample_paths: usize,
    /// Truncate summaries to this many time steps.
    pub horizon: Option<usize>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            num_draws: 2000,
            num_samples: 200,
            num_sample_paths: 0,
            horizon: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"variant": "stochastic", "num_steps": 30, "drift_prior_scale": 0.05}"#
        ).unwrap();
        assert_eq!(config.num_steps(), 30);
        assert_eq!(config.forecast_steps(), 0);
        match config {
            ModelConfig::Stochastic(c) => {
                assert_eq!(c.num_steps, 30);
                assert_eq!(c.drift_prior_scale, Some(0.05));
                assert_eq!(c.r0_est, 3.0);
                assert_eq!(c.compartment_model, CompartmentModel::Seir);
                assert_eq!(c.observation_noise, ObservationNoise::Normal);
            },
            other => panic!("unexpected {:?}", other),
        }

        let config: ModelConfig = serde_json::from_str(
            r#"{"variant": "hierarchical", "observation_noise": "binomial_approx"}"#
        ).unwrap();
        match config {
            ModelConfig::Hierarchical(c) => {
                assert_eq!(c.population, vec![1e5]);
                assert_eq!(c.r0_est, 4.5);
                assert_eq!(c.observation_noise, ObservationNoise::BinomialApprox);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_compartment_model_rejected() {
        let value = serde_json::json!({"variant": "stochastic", "compartment_model": "SEIRS"});
        match ModelConfig::from_value(value) {
            Err(Error::UnknownCompartmentModel(name)) => assert_eq!(name, "SEIRS"),
            other => panic!("unexpected {:?}", other),
        }

        let result: std::result::Result<SeirConfig, _> = serde_json::from_str(
            r#"{"compartment_model": "SEIRS"}"#
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("unknown compartment model"), "{}", message);
    }

    #[test]
    fn test_compartment_model_by_name() {
        let value = serde_json::json!({"variant": "stochastic", "compartment_model": "SIR"});
        match ModelConfig::from_value(value).unwrap() {
            ModelConfig::Stochastic(c) => assert_eq!(c.compartment_model, CompartmentModel::Sir),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(serde_json::to_string(&CompartmentModel::Seir).unwrap(), r#""SEIR""#);
    }

    #[test]
    fn test_null_observations_become_nan() {
        let data: SeirData = serde_json::from_str(r#"{"confirmed": [1, null, 3]}"#).unwrap();
        let y = data.confirmed_series().unwrap();
        assert_eq!(y[[0]], 1.0);
        assert!(y[[1]].is_nan());
        assert!(data.hospitalized_series().is_none());
    }

    #[test]
    fn test_ragged_covariates_rejected() {
        let data = HierarchicalData {
            covariates: vec![vec![1.0, 2.0], vec![3.0]],
            confirmed: None,
        };
        assert!(data.covariate_matrix().is_err());

        let data = HierarchicalData {
            covariates: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            confirmed: Some(vec![vec![Some(1.0), None], vec![Some(2.0), Some(5.0)]]),
        };
        assert_eq!(data.num_places(), 2);
        assert_eq!(data.covariate_matrix().unwrap().shape(), &[2, 2]);
        let y = data.confirmed_matrix().unwrap().unwrap();
        assert!(y[[0, 1]].is_nan());
        assert_eq!(y[[1, 1]], 5.0);
    }
}
