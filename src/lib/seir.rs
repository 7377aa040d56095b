//! Single-region stochastic SEIR model.
//!
//! Initial seeding, rate parameters and the detection rate are drawn from
//! their priors; the transmission rate follows an exponentiated random walk
//! around `beta0`; the compartment dynamics are deterministic given those
//! draws; cumulative infections are observed with noise.

use ndarray::{s, Array1, Array2, ArrayD};
use tracing::warn;

use crate::arrays::*;
use crate::compartment::{CompartmentModel, Rates};
use crate::config::{SeirConfig, SeirData};
use crate::distributions::*;
use crate::errors::*;
use crate::host::{SampleSite, SamplingHost};
use crate::inference::GenerativeModel;
use crate::observe::{observe, ObservationNoise};
use crate::summary::ForecastPath;
use crate::trace::{SegmentNames, Segments};

#[derive(Debug, Clone)]
pub struct SeirModel {
    pub config: SeirConfig,
    pub data: SeirData,
}

#[derive(Debug, Clone)]
pub struct SeirOutput {
    pub compartment_model: CompartmentModel,
    /// One transmission rate per transition in the data period.
    pub beta: Array1<f64>,
    pub beta_future: Option<Array1<f64>>,
    pub trajectory: Segments,
    pub confirmed: Segments,
    /// All zeros when hospitalizations are not modeled.
    pub hospitalized: Segments,
    pub det_rate: f64,
    pub hosp_rate: Option<f64>,
    pub sigma: f64,
    pub gamma: f64,
}

impl SeirOutput {
    pub fn path(&self) -> Result<ForecastPath> {
        let trajectory = into_2d("trajectory", self.trajectory.concat()?)?;
        let mut beta = self.beta.to_vec();
        if let Some(future) = &self.beta_future {
            beta.extend(future.iter());
        }
        Ok(ForecastPath {
            compartment_model: self.compartment_model,
            trajectory,
            confirmed: into_1d("confirmed", self.confirmed.concat()?)?,
            hospitalized: into_1d("hospitalized", self.hospitalized.concat()?)?,
            beta: Array1::from(beta),
            gamma: self.gamma,
        })
    }
}

/// Noise parameter of the observation link: a relative scale for the
/// Normal link, a concentration for the Binomial one.
pub(crate) fn noise_param(noise: ObservationNoise, scale: f64, concentration: f64) -> f64 {
    match noise {
        ObservationNoise::Normal => scale,
        ObservationNoise::BinomialApprox => concentration,
    }
}

pub(crate) fn sample_scalar<H: SamplingHost + ?Sized>(
    host: &mut H, name: &str, dist: &dyn Distribution
) -> Result<f64> {
    Ok(item(&host.sample(SampleSite::new(name, dist))?))
}

/// Splits a series into its first value and the rest, checking its length.
fn split_observations(name: &str, series: Option<ArrayD<f64>>, num_steps: usize)
    -> Result<(Option<ArrayD<f64>>, Option<ArrayD<f64>>)>
{
    match series {
        None => Ok((None, None)),
        Some(series) => {
            if series.ndim() != 1 || series.len() != num_steps {
                return Err(Error::shape_mismatch(name, series.shape(), &[num_steps]));
            }
            let first = series.slice(s![0]).to_owned().into_dyn();
            let rest = series.slice(s![1..]).to_owned().into_dyn();
            Ok((Some(first), Some(rest)))
        }
    }
}

/// Parameters held fixed over one run of the dynamics.
struct Params {
    sigma: f64,
    gamma: f64,
    drift: f64,
    det_rate: f64,
    hosp_rate: Option<f64>,
}

struct Dynamics {
    beta: Array1<f64>,
    x: Array2<f64>,
    y: ArrayD<f64>,
    z: Option<ArrayD<f64>>,
}

impl SeirModel {
    pub fn new(config: SeirConfig, data: SeirData) -> Self {
        Self { config, data }
    }

    /// Runs `num_steps` time points from `x0` (transmission rate random
    /// walk, ODE, observations) and records everything after `x0`.
    fn dynamics<H: SamplingHost + ?Sized>(
        &self, host: &mut H, future: bool, num_steps: usize, beta0: f64, x0: &Array1<f64>,
        params: &Params, obs: Option<&ArrayD<f64>>, hosp: Option<&ArrayD<f64>>,
    ) -> Result<Dynamics> {
        let c = &self.config;
        let model = c.compartment_model;

        let walk = ExponentialRandomWalk::new(scalar(beta0), c.rw_scale, params.drift, num_steps - 1)?;
        let beta = host.sample(SampleSite::new(SegmentNames::new("beta").series(future), &walk))?;
        let beta: Array1<f64> = beta.iter().copied().collect();

        let rates = Rates { beta: beta.as_slice().unwrap_or(&[]), sigma: params.sigma, gamma: params.gamma };
        let x = model.run(num_steps, x0.view(), &rates)?;
        let x = x.slice(s![1.., ..]).to_owned();
        host.deterministic(SegmentNames::new("x").series(future), &x.clone().into_dyn())?;

        let latent = x.column(model.cumulative_index()).to_owned().into_dyn();
        let y = observe(
            host, SegmentNames::new("y").series(future), &latent, &scalar(params.det_rate),
            noise_param(c.observation_noise, c.det_noise_scale, c.det_rate_conc), obs,
            c.observation_noise,
        )?;
        let z = match params.hosp_rate {
            Some(hosp_rate) => Some(observe(
                host, SegmentNames::new("z").series(future), &latent, &scalar(hosp_rate),
                noise_param(c.observation_noise, c.hosp_noise_scale, c.hosp_rate_conc), hosp,
                c.observation_noise,
            )?),
            None => None,
        };
        Ok(Dynamics { beta, x, y, z })
    }
}

impl GenerativeModel for SeirModel {
    type Output = SeirOutput;

    fn run<H: SamplingHost + ?Sized>(&self, host: &mut H) -> Result<SeirOutput> {
        let c = &self.config;
        let model = c.compartment_model;
        if c.num_steps == 0 {
            return Err(Error::InvalidParameter {
                distribution: "SEIR model", parameter: "num_steps", value: 0.0
            });
        }

        let seed_prior = Uniform::new(scalar(0.0), scalar(0.02 * c.population))?;
        let i0 = sample_scalar(host, "I0", &seed_prior)?;
        let e0 = match model {
            CompartmentModel::Seir => sample_scalar(host, "E0", &seed_prior)?,
            CompartmentModel::Sir => 0.0,
        };

        let sigma = match model {
            CompartmentModel::Seir => sample_scalar(
                host, "sigma", &Gamma::scalar(c.sigma_shape, c.sigma_shape * c.e_duration_est)?
            )?,
            CompartmentModel::Sir => 0.0,
        };
        let gamma = sample_scalar(
            host, "gamma", &Gamma::scalar(c.gamma_shape, c.gamma_shape * c.i_duration_est)?
        )?;
        let beta0 = sample_scalar(
            host, "beta0", &Gamma::scalar(c.beta_shape, c.beta_shape * c.i_duration_est / c.r0_est)?
        )?;

        let det_rate = sample_scalar(
            host, "det_rate", &Beta::mean_concentration(scalar(c.det_rate_est), scalar(c.det_rate_conc))?
        )?;
        let hosp_rate = if c.use_hospitalization {
            let prior = Beta::mean_concentration(scalar(c.hosp_rate_est), scalar(c.hosp_rate_conc))?;
            Some(det_rate * sample_scalar(host, "hosp_rate", &prior)?)
        }
        else {
            None
        };
        let drift = match c.drift_prior_scale {
            Some(scale) => sample_scalar(host, "drift", &Normal::scalar(0.0, scale)?)?,
            None => 0.0,
        };

        let x0 = model.seed(c.population, i0, e0)?;
        host.deterministic("x0", &x0.clone().into_dyn())?;

        let (obs0, obs) = split_observations("confirmed", self.data.confirmed_series(), c.num_steps)?;
        let (hosp0, hosp) = if c.use_hospitalization {
            split_observations("hospitalized", self.data.hospitalized_series(), c.num_steps)?
        }
        else {
            if self.data.hospitalized.is_some() {
                warn!("hospitalization data given but hospitalizations are not modeled; ignoring");
            }
            (None, None)
        };

        let cumulative = scalar(x0[model.cumulative_index()]);
        let y0 = observe(
            host, "y0", &cumulative, &scalar(det_rate),
            noise_param(c.observation_noise, c.det_noise_scale, c.det_rate_conc), obs0.as_ref(),
            c.observation_noise,
        )?;
        let z0 = match hosp_rate {
            Some(hosp_rate) => observe(
                host, "z0", &cumulative, &scalar(hosp_rate),
                noise_param(c.observation_noise, c.hosp_noise_scale, c.hosp_rate_conc), hosp0.as_ref(),
                c.observation_noise,
            )?,
            None => scalar(0.0),
        };

        let params = Params { sigma, gamma, drift, det_rate, hosp_rate };
        let main = self.dynamics(host, false, c.num_steps, beta0, &x0, &params, obs.as_ref(), hosp.as_ref())?;
        let zeros = |n: usize| Array1::<f64>::zeros(n).into_dyn();

        let mut trajectory = Segments::new(x0.clone().into_dyn(), main.x.clone().into_dyn(), 0)?;
        let mut confirmed = Segments::new(y0, main.y, 0)?;
        let mut hospitalized = Segments::new(
            z0, main.z.unwrap_or_else(|| zeros(c.num_steps - 1)), 0
        )?;
        let mut beta_future = None;

        if c.forecast_steps > 0 {
            let last_beta = main.beta.iter().last().copied().unwrap_or(beta0);
            let last_x = if main.x.nrows() > 0 { main.x.row(main.x.nrows() - 1).to_owned() } else { x0 };
            let future = self.dynamics(
                host, true, c.forecast_steps + 1, last_beta, &last_x, &params, None, None
            )?;
            trajectory = trajectory.with_future(future.x.into_dyn())?;
            confirmed = confirmed.with_future(future.y)?;
            hospitalized = hospitalized.with_future(
                future.z.unwrap_or_else(|| zeros(c.forecast_steps))
            )?;
            beta_future = Some(future.beta);
        }

        Ok(SeirOutput {
            compartment_model: model,
            beta: main.beta,
            beta_future,
            trajectory,
            confirmed,
            hospitalized,
            det_rate,
            hosp_rate,
            sigma,
            gamma,
        })
    }

    fn predictive(&self, forecast_steps: usize) -> Self {
        Self::new(SeirConfig { forecast_steps, ..self.config.clone() }, SeirData::default())
    }

    fn paths(&self, output: &SeirOutput) -> Result<Vec<ForecastPath>> {
        Ok(vec![output.path()?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Tracer;
    use crate::trace::{SiteKind, Trace};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use rand_xoshiro::rand_core::SeedableRng;

    fn run_model(config: SeirConfig, data: SeirData, seed: u64) -> (SeirOutput, Trace) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut host = Tracer::new(&mut rng);
        let output = SeirModel::new(config, data).run(&mut host).unwrap();
        (output, host.into_trace())
    }

    #[test]
    fn test_prior_run_shapes_and_invariants() {
        let config = SeirConfig { num_steps: 10, ..SeirConfig::default() };
        let (output, trace) = run_model(config, SeirData::default(), 0);
        let x = output.trajectory.concat().unwrap();
        assert_eq!(x.shape(), &[10, 5]);
        assert_eq!(output.confirmed.len(), 10);
        assert!(output.confirmed.concat().unwrap().iter().all(|v| *v >= 0.0));
        assert_eq!(output.hospitalized.concat().unwrap(), Array1::<f64>::zeros(10).into_dyn());
        assert_eq!(output.beta.len(), 9);
        for t in 1..10 {
            assert!(x[[t, 4]] >= x[[t - 1, 4]]);
        }
        assert!(!trace.contains("hosp_rate"));
        assert!(!trace.contains("drift"));
        assert!(!trace.contains("z"));
        assert_eq!(trace.get("x").unwrap().kind, SiteKind::Deterministic);
        assert!(trace.contains("mean_y0"));
    }

    #[test]
    fn test_forecast_extends_and_preserves_data_period() {
        let base = SeirConfig { num_steps: 10, ..SeirConfig::default() };
        let (plain, _) = run_model(base.clone(), SeirData::default(), 42);
        let (extended, trace) = run_model(SeirConfig { forecast_steps: 5, ..base }, SeirData::default(), 42);

        let x = extended.trajectory.concat().unwrap();
        assert_eq!(x.shape(), &[15, 5]);
        assert_eq!(extended.confirmed.len(), 15);
        assert_eq!(extended.hospitalized.len(), 15);
        assert_eq!(extended.beta_future.as_ref().unwrap().len(), 5);
        assert_eq!(x.slice(s![..10, ..]).into_dyn(), plain.trajectory.concat().unwrap());
        assert!(trace.contains("beta_future"));
        assert!(trace.contains("x_future"));
        assert!(trace.contains("y_future"));

        let path = extended.path().unwrap();
        assert_eq!(path.len(), 15);
        assert_eq!(path.beta.len(), 14);
    }

    #[test]
    fn test_toggles_change_latent_sites() {
        let config = SeirConfig {
            num_steps: 8,
            use_hospitalization: true,
            drift_prior_scale: Some(0.05),
            ..SeirConfig::default()
        };
        let data = SeirData {
            confirmed: Some(vec![Some(1.0); 8]),
            hospitalized: Some(vec![None; 8]),
        };
        let (output, trace) = run_model(config, data, 3);
        assert!(trace.contains("hosp_rate"));
        assert!(trace.contains("drift"));
        assert_eq!(trace.get("z").unwrap().kind, SiteKind::Observed);
        let hosp_rate = output.hosp_rate.unwrap();
        assert!(hosp_rate < output.det_rate);
        // every hospitalization is missing, so only confirmed counts score
        assert_eq!(trace.get("z").unwrap().log_prob, 0.0);
        assert_eq!(trace.get("z0").unwrap().log_prob, 0.0);
        assert!(trace.get("y").unwrap().log_prob.is_finite());
    }

    #[test]
    fn test_sir_variant_has_no_exposed_sites() {
        let config = SeirConfig {
            compartment_model: CompartmentModel::Sir,
            num_steps: 6,
            ..SeirConfig::default()
        };
        let (output, trace) = run_model(config, SeirData::default(), 5);
        assert!(!trace.contains("E0"));
        assert!(!trace.contains("sigma"));
        assert_eq!(output.trajectory.concat().unwrap().shape(), &[6, 4]);
    }

    #[test]
    fn test_observation_length_checked() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut host = Tracer::new(&mut rng);
        let model = SeirModel::new(
            SeirConfig { num_steps: 10, ..SeirConfig::default() },
            SeirData { confirmed: Some(vec![Some(1.0); 7]), hospitalized: None },
        );
        assert!(matches!(model.run(&mut host), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_zero_noise_walk_holds_beta_constant() {
        let config = SeirConfig { num_steps: 12, rw_scale: 0.0, ..SeirConfig::default() };
        let (output, trace) = run_model(config, SeirData::default(), 9);
        let beta0 = item(trace.value("beta0").unwrap());
        assert!(output.beta.iter().all(|b| (b - beta0).abs() < 1e-9 * beta0));
    }
}
