//! Multi-region SEIR model with covariate-driven priors.
//!
//! Each region's R0, durations and detection rate are centered on a
//! global estimate shifted by a shared bias and a linear effect of the
//! region's covariates. Given those draws every region evolves
//! independently.

use ndarray::{s, Array1, Array2, ArrayD, Axis};

use crate::arrays::*;
use crate::compartment::CompartmentModel;
use crate::config::{HierarchicalConfig, HierarchicalData};
use crate::distributions::*;
use crate::errors::*;
use crate::host::{SampleSite, SamplingHost};
use crate::inference::GenerativeModel;
use crate::observe::observe;
use crate::seir::{noise_param, sample_scalar};
use crate::summary::ForecastPath;
use crate::trace::{SegmentNames, Segments};

const PLATE: &str = "num_places";
const MODEL: CompartmentModel = CompartmentModel::Seir;

#[derive(Debug, Clone)]
pub struct HierarchicalModel {
    pub config: HierarchicalConfig,
    pub data: HierarchicalData,
}

#[derive(Debug, Clone)]
pub struct HierarchicalOutput {
    /// Regions × transitions.
    pub beta: Array2<f64>,
    pub beta_future: Option<Array2<f64>>,
    /// Regions × time × compartments.
    pub trajectory: Segments,
    /// Regions × time.
    pub confirmed: Segments,
    pub det_rate: Array1<f64>,
    pub sigma: Array1<f64>,
    pub gamma: Array1<f64>,
}

impl HierarchicalOutput {
    pub fn num_places(&self) -> usize {
        self.beta.nrows()
    }

    pub fn paths(&self) -> Result<Vec<ForecastPath>> {
        let trajectory = self.trajectory.concat()?;
        let confirmed = into_2d("confirmed", self.confirmed.concat()?)?;
        let beta = match &self.beta_future {
            Some(future) => ndarray::concatenate(Axis(1), &[self.beta.view(), future.view()]).map_err(
                |_| Error::shape_mismatch("beta", self.beta.shape(), future.shape())
            )?,
            None => self.beta.clone(),
        };
        (0..self.num_places()).map(|p| {
            let region = into_2d("trajectory", trajectory.index_axis(Axis(0), p).to_owned())?;
            Ok(ForecastPath {
                compartment_model: MODEL,
                hospitalized: Array1::zeros(region.nrows()),
                trajectory: region,
                confirmed: confirmed.row(p).to_owned(),
                beta: beta.row(p).to_owned(),
                gamma: self.gamma[p],
            })
        }).collect()
    }
}

/// `X · theta`, one entry per region.
pub fn linear_predictor(covariates: &Array2<f64>, theta: &Array1<f64>) -> Result<Array1<f64>> {
    if covariates.ncols() != theta.len() {
        return Err(Error::shape_mismatch(
            "covariates vs coefficients", covariates.shape(), theta.shape()
        ));
    }
    Ok(covariates.dot(theta))
}

fn sample_places<H: SamplingHost + ?Sized>(
    host: &mut H, name: &str, dist: &dyn Distribution, num_places: usize
) -> Result<Array1<f64>> {
    into_1d(name, host.sample(SampleSite::new(name, dist).plate(PLATE, num_places))?)
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

struct Params {
    sigma: Array1<f64>,
    gamma: Array1<f64>,
    /// Regions × 1, for broadcasting over time.
    det_rate: ArrayD<f64>,
}

struct Dynamics {
    beta: Array2<f64>,
    x: ArrayD<f64>,
    y: ArrayD<f64>,
}

impl HierarchicalModel {
    pub fn new(config: HierarchicalConfig, data: HierarchicalData) -> Self {
        Self { config, data }
    }

    fn populations(&self, num_places: usize) -> Result<Array1<f64>> {
        match self.config.population.len() {
            1 => Ok(Array1::from_elem(num_places, self.config.population[0])),
            n if n == num_places => Ok(Array1::from(self.config.population.clone())),
            n => Err(Error::shape_mismatch("population", &[n], &[num_places])),
        }
    }

    /// Draws the bias and coefficients for one parameter and records the
    /// per-region mean `inverse_link(center + bias + X · theta)`.
    fn region_mean<H: SamplingHost + ?Sized>(
        &self, host: &mut H, name: &str, scale: f64, covariates: &Array2<f64>,
        center: f64, inverse_link: fn(f64) -> f64,
    ) -> Result<Array1<f64>> {
        let prior = Normal::scalar(0.0, scale)?;
        let bias = sample_scalar(host, &format!("bias_{}", name), &prior)?;
        let theta = host.sample(
            SampleSite::new(&format!("theta_{}", name), &prior).sample_shape(&[covariates.ncols()])
        )?;
        let theta = into_1d("theta", theta)?;
        let mean = linear_predictor(covariates, &theta)?.mapv(|v| inverse_link(center + bias + v));
        host.deterministic(&format!("mean_{}", name), &mean.clone().into_dyn())?;
        Ok(mean)
    }

    fn dynamics<H: SamplingHost + ?Sized>(
        &self, host: &mut H, future: bool, num_steps: usize, beta0: &Array1<f64>, x0: &Array2<f64>,
        params: &Params, obs: Option<&ArrayD<f64>>,
    ) -> Result<Dynamics> {
        let c = &self.config;
        let num_places = beta0.len();

        let loc = beta0.clone().insert_axis(Axis(1)).into_dyn();
        let walk = ExponentialRandomWalk::new(loc, c.rw_scale, 0.0, num_steps - 1)?;
        let beta = host.sample(
            SampleSite::new(SegmentNames::new("beta").series(future), &walk).plate(PLATE, num_places)
        )?;
        let beta = into_2d("beta", beta)?;

        let x = MODEL.run_batched(
            num_steps, x0.view(), beta.view(), params.sigma.view(), params.gamma.view()
        )?;
        let x = x.slice(s![.., 1.., ..]).to_owned().into_dyn();
        host.deterministic(SegmentNames::new("x").series(future), &x)?;

        let latent = x.index_axis(Axis(2), MODEL.cumulative_index()).to_owned();
        let y = observe(
            host, SegmentNames::new("y").series(future), &latent, &params.det_rate,
            noise_param(c.observation_noise, c.det_noise_scale, c.det_rate_conc), obs,
            c.observation_noise,
        )?;
        Ok(Dynamics { beta, x, y })
    }
}

impl GenerativeModel for HierarchicalModel {
    type Output = HierarchicalOutput;

    fn run<H: SamplingHost + ?Sized>(&self, host: &mut H) -> Result<HierarchicalOutput> {
        let c = &self.config;
        if c.num_steps == 0 {
            return Err(Error::InvalidParameter {
                distribution: "hierarchical SEIR model", parameter: "num_steps", value: 0.0
            });
        }
        let covariates = self.data.covariate_matrix()?;
        let num_places = self.data.num_places();
        if num_places == 0 {
            return Err(Error::shape_mismatch("covariates", &[0], &[1]));
        }
        let population = self.populations(num_places)?;

        let r0_mean = self.region_mean(host, "R0", 0.1, &covariates, c.r0_est.ln(), f64::exp)?;
        let e_mean = self.region_mean(
            host, "E_duration", 0.05, &covariates, c.e_duration_est.ln(), f64::exp
        )?;
        let i_mean = self.region_mean(
            host, "I_duration", 0.05, &covariates, c.i_duration_est.ln(), f64::exp
        )?;
        let det_mean = self.region_mean(
            host, "det_rate", 0.05, &covariates, logit(c.det_rate_est), sigmoid
        )?;

        let r0 = sample_places(host, "R0", &Gamma::mean_var(r0_mean.into_dyn(), scalar(0.1))?, num_places)?;
        let e_duration = sample_places(
            host, "E_duration", &Gamma::mean_var(e_mean.into_dyn(), scalar(0.05))?, num_places
        )?;
        let i_duration = sample_places(
            host, "I_duration", &Gamma::mean_var(i_mean.into_dyn(), scalar(0.05))?, num_places
        )?;
        let det_rate = sample_places(
            host, "det_rate", &Beta::mean_concentration(det_mean.into_dyn(), scalar(c.det_rate_conc))?,
            num_places
        )?;

        let sigma = e_duration.mapv(|d| 1.0 / d);
        let gamma = i_duration.mapv(|d| 1.0 / d);
        let beta0 = &r0 * &gamma;

        let seed_prior = Uniform::new(scalar(0.0), population.mapv(|n| 0.02 * n).into_dyn())?;
        let i0 = sample_places(host, "I0", &seed_prior, num_places)?;
        let e0 = sample_places(host, "E0", &seed_prior, num_places)?;

        let mut x0 = Array2::zeros((num_places, MODEL.num_compartments()));
        for p in 0..num_places {
            x0.row_mut(p).assign(&MODEL.seed(population[p], i0[p], e0[p])?);
        }
        host.deterministic("x0", &x0.clone().into_dyn())?;

        let (obs0, obs) = match self.data.confirmed_matrix()? {
            Some(obs) => {
                if obs.shape() != &[num_places, c.num_steps] {
                    return Err(Error::shape_mismatch("confirmed", obs.shape(), &[num_places, c.num_steps]));
                }
                (
                    Some(obs.slice(s![.., 0]).to_owned().into_dyn()),
                    Some(obs.slice(s![.., 1..]).to_owned().into_dyn()),
                )
            },
            None => (None, None),
        };

        let y0 = observe(
            host, "y0", &x0.column(MODEL.cumulative_index()).to_owned().into_dyn(),
            &det_rate.clone().into_dyn(),
            noise_param(c.observation_noise, c.det_noise_scale, c.det_rate_conc), obs0.as_ref(),
            c.observation_noise,
        )?;

        let params = Params {
            sigma: sigma.clone(),
            gamma: gamma.clone(),
            det_rate: det_rate.clone().insert_axis(Axis(1)).into_dyn(),
        };
        let main = self.dynamics(host, false, c.num_steps, &beta0, &x0, &params, obs.as_ref())?;

        let mut trajectory = Segments::new(x0.clone().into_dyn(), main.x.clone(), 1)?;
        let mut confirmed = Segments::new(y0, main.y, 1)?;
        let mut beta_future = None;

        if c.forecast_steps > 0 {
            let last_beta = if main.beta.ncols() > 0 {
                main.beta.column(main.beta.ncols() - 1).to_owned()
            }
            else {
                beta0.clone()
            };
            let last_x = into_2d("trajectory", trajectory.last())?;
            let future = self.dynamics(host, true, c.forecast_steps + 1, &last_beta, &last_x, &params, None)?;
            trajectory = trajectory.with_future(future.x)?;
            confirmed = confirmed.with_future(future.y)?;
            beta_future = Some(future.beta);
        }

        Ok(HierarchicalOutput {
            beta: main.beta,
            beta_future,
            trajectory,
            confirmed,
            det_rate,
            sigma,
            gamma,
        })
    }

    fn predictive(&self, forecast_steps: usize) -> Self {
        Self::new(
            HierarchicalConfig { forecast_steps, ..self.config.clone() },
            HierarchicalData { covariates: self.data.covariates.clone(), confirmed: None },
        )
    }

    fn paths(&self, output: &HierarchicalOutput) -> Result<Vec<ForecastPath>> {
        output.paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Tracer;
    use crate::trace::{SiteKind, SiteRecord, Trace};
    use ndarray::array;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use rand_xoshiro::rand_core::SeedableRng;

    fn latent(trace: &mut Trace, name: &str, value: ArrayD<f64>) {
        trace.insert(name, SiteRecord { kind: SiteKind::Latent, value, log_prob: 0.0 }).unwrap();
    }

    fn model(covariates: Vec<Vec<f64>>, num_steps: usize) -> HierarchicalModel {
        HierarchicalModel::new(
            HierarchicalConfig { num_steps, ..HierarchicalConfig::default() },
            HierarchicalData { covariates, confirmed: None },
        )
    }

    #[test]
    fn test_zero_covariates_and_bias_recover_estimates() {
        let mut fixed = Trace::new();
        for name in &["bias_R0", "bias_E_duration", "bias_I_duration", "bias_det_rate"] {
            latent(&mut fixed, name, scalar(0.0));
        }
        let m = model(vec![vec![0.0, 0.0]; 3], 6);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut host = Tracer::new(&mut rng).substitute(&fixed);
        m.run(&mut host).unwrap();
        let trace = host.into_trace();
        for (name, est) in &[
            ("mean_R0", 4.5), ("mean_E_duration", 4.5), ("mean_I_duration", 3.0), ("mean_det_rate", 0.3)
        ] {
            let mean = trace.value(name).unwrap();
            assert_eq!(mean.shape(), &[3]);
            assert!(mean.iter().all(|m| (m - est).abs() < 1e-12), "{} = {:?}", name, mean);
        }
    }

    #[test]
    fn test_coefficients_shift_region_means() {
        let run_with = |theta: f64| {
            let mut fixed = Trace::new();
            latent(&mut fixed, "bias_R0", scalar(0.0));
            latent(&mut fixed, "theta_R0", vector(vec![theta]));
            latent(&mut fixed, "bias_det_rate", scalar(0.0));
            latent(&mut fixed, "theta_det_rate", vector(vec![theta]));
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
            let mut host = Tracer::new(&mut rng).substitute(&fixed);
            model(vec![vec![1.0], vec![2.0]], 5).run(&mut host).unwrap();
            let trace = host.into_trace();
            (trace.value("mean_R0").unwrap().clone(), trace.value("mean_det_rate").unwrap().clone())
        };
        let (r0_low, det_low) = run_with(0.1);
        let (r0_high, det_high) = run_with(0.3);
        for p in 0..2 {
            assert!(r0_high[[p]] > r0_low[[p]]);
            assert!(det_high[[p]] > det_low[[p]]);
        }
        // the region with the larger covariate moves further
        assert!(r0_high[[1]] / r0_low[[1]] > r0_high[[0]] / r0_low[[0]]);
    }

    #[test]
    fn test_coefficient_shape_mismatch() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(linear_predictor(&x, &Array1::from(vec![1.0, 1.0, 1.0])).is_err());
        assert_eq!(linear_predictor(&x, &Array1::from(vec![1.0, 0.5])).unwrap(), array![2.0, 5.0]);

        let mut fixed = Trace::new();
        latent(&mut fixed, "theta_R0", vector(vec![0.1, 0.2, 0.3]));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut host = Tracer::new(&mut rng).substitute(&fixed);
        match model(vec![vec![1.0, 2.0]; 2], 5).run(&mut host) {
            Err(Error::ShapeMismatch { .. }) => {},
            other => panic!("unexpected {:?}", other.map(|o| o.num_places())),
        }
    }

    #[test]
    fn test_regions_run_independently_with_forecast() {
        let mut m = model(vec![vec![0.5], vec![-0.5], vec![0.0]], 8);
        m.config.population = vec![1e4, 5e4, 2e5];
        m.config.forecast_steps = 4;
        m.data.confirmed = Some(vec![vec![Some(1.0); 8], vec![None; 8], vec![Some(3.0); 8]]);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let mut host = Tracer::new(&mut rng);
        let output = m.run(&mut host).unwrap();
        let trace = host.into_trace();

        assert_eq!(output.trajectory.concat().unwrap().shape(), &[3, 12, 5]);
        assert_eq!(output.confirmed.concat().unwrap().shape(), &[3, 12]);
        assert_eq!(output.beta.shape(), &[3, 7]);
        assert_eq!(output.beta_future.as_ref().unwrap().shape(), &[3, 4]);
        assert_eq!(trace.get("y").unwrap().kind, SiteKind::Observed);
        assert_eq!(trace.get("y_future").unwrap().kind, SiteKind::Latent);

        let paths = output.paths().unwrap();
        assert_eq!(paths.len(), 3);
        for (p, path) in paths.iter().enumerate() {
            assert_eq!(path.len(), 12);
            assert_eq!(path.beta.len(), 11);
            let total: f64 = path.trajectory.slice(s![11, 0..4]).sum();
            assert!((total - m.config.population[p]).abs() < 1e-6 * total);
        }
    }

    #[test]
    fn test_population_length_checked() {
        let mut m = model(vec![vec![0.0]; 3], 5);
        m.config.population = vec![1e4, 2e4];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut host = Tracer::new(&mut rng);
        assert!(matches!(m.run(&mut host), Err(Error::ShapeMismatch { .. })));
    }
}
