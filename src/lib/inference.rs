//! Drives generative models: prior draws, an importance-resampling
//! posterior, and forecasts replayed from posterior traces.

use rand::{Rng, RngCore};
use tracing::{debug, info};

use crate::config::InferenceConfig;
use crate::errors::*;
use crate::host::{SamplingHost, Tracer};
use crate::summary::ForecastPath;
use crate::trace::Trace;

pub trait GenerativeModel {
    type Output;

    /// Evaluates the model once against `host`.
    fn run<H: SamplingHost + ?Sized>(&self, host: &mut H) -> Result<Self::Output>;

    /// The same priors conditioned on nothing, extended `forecast_steps`
    /// past the data period.
    fn predictive(&self, forecast_steps: usize) -> Self where Self: Sized;

    /// One path per region.
    fn paths(&self, output: &Self::Output) -> Result<Vec<ForecastPath>>;
}

/// Weighted prior draws resampled into an unweighted posterior sample.
#[derive(Debug, Clone)]
pub struct Posterior {
    pub traces: Vec<Trace>,
    pub effective_sample_size: f64,
    pub log_marginal_likelihood: f64,
}

/// Likelihood weighting: draws `num_draws` traces from the prior with the
/// observations conditioned, weighs each by its likelihood and keeps
/// `num_samples` of them by systematic resampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceSampler {
    pub num_draws: usize,
    pub num_samples: usize,
}

impl ImportanceSampler {
    pub fn new(num_draws: usize, num_samples: usize) -> Self {
        Self { num_draws, num_samples }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(config.num_draws, config.num_samples)
    }

    pub fn run<M: GenerativeModel>(&self, model: &M, rng: &mut dyn RngCore) -> Result<Posterior> {
        let mut traces = Vec::with_capacity(self.num_draws);
        for draw in 0..self.num_draws {
            let mut host = Tracer::new(&mut *rng);
            model.run(&mut host)?;
            let trace = host.into_trace();
            debug!(draw, log_likelihood = trace.log_likelihood(), "prior draw");
            traces.push(trace);
        }

        let log_weights: Vec<f64> = traces.iter().map(|t| t.log_likelihood()).collect();
        let (weights, log_marginal_likelihood) = normalize_log_weights(&log_weights)?;
        let effective_sample_size = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        info!(
            num_draws = self.num_draws, effective_sample_size, log_marginal_likelihood,
            "importance weights"
        );

        let traces = systematic_resample(&weights, self.num_samples, rng).into_iter().map(
            |i| traces[i].clone()
        ).collect();
        Ok(Posterior { traces, effective_sample_size, log_marginal_likelihood })
    }
}

/// Normalized weights and the log of their mean unnormalized value.
/// Draws with a non-finite log weight get weight zero.
pub fn normalize_log_weights(log_weights: &[f64]) -> Result<(Vec<f64>, f64)> {
    let max = log_weights.iter().copied().filter(|w| w.is_finite()).fold(
        f64::NEG_INFINITY, f64::max
    );
    if !max.is_finite() {
        return Err(Error::DegenerateWeights);
    }
    let unnormalized: Vec<f64> = log_weights.iter().map(
        |w| if w.is_finite() { (w - max).exp() } else { 0.0 }
    ).collect();
    let total: f64 = unnormalized.iter().sum();
    let log_mean = max + (total / log_weights.len() as f64).ln();
    Ok((unnormalized.iter().map(|w| w / total).collect(), log_mean))
}

/// Indices of `n` draws chosen with one uniform offset and evenly spaced
/// positions through the cumulative weights.
pub fn systematic_resample(weights: &[f64], n: usize, rng: &mut dyn RngCore) -> Vec<usize> {
    if n == 0 || weights.is_empty() {
        return vec![];
    }
    let offset: f64 = rng.gen::<f64>() / n as f64;
    let mut indices = Vec::with_capacity(n);
    let mut cumulative = weights[0];
    let mut i = 0;
    for j in 0..n {
        let u = offset + j as f64 / n as f64;
        while cumulative < u && i + 1 < weights.len() {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
    }
    indices
}

/// Draws `num_samples` outputs from the prior predictive.
pub fn sample_prior<M: GenerativeModel>(
    model: &M, num_samples: usize, rng: &mut dyn RngCore
) -> Result<Vec<M::Output>> {
    (0..num_samples).map(|_| {
        let mut host = Tracer::new(&mut *rng);
        model.run(&mut host)
    }).collect()
}

/// Replays each posterior trace's latent values through the predictive
/// form of `model`, drawing everything past the data period afresh.
pub fn forecast<M: GenerativeModel>(
    model: &M, posterior: &[Trace], forecast_steps: usize, rng: &mut dyn RngCore
) -> Result<Vec<M::Output>> {
    let predictive = model.predictive(forecast_steps);
    let outputs = posterior.iter().map(|trace| {
        let mut host = Tracer::new(&mut *rng).substitute(trace);
        predictive.run(&mut host)
    }).collect::<Result<Vec<_>>>()?;
    info!(num_paths = outputs.len(), forecast_steps, "forecast");
    Ok(outputs)
}

/// Regroups model outputs into one list of paths per region.
pub fn region_paths<M: GenerativeModel>(
    model: &M, outputs: &[M::Output]
) -> Result<Vec<Vec<ForecastPath>>> {
    let mut regions: Vec<Vec<ForecastPath>> = vec![];
    for output in outputs {
        let paths = model.paths(output)?;
        if regions.is_empty() {
            regions = paths.iter().map(|_| Vec::with_capacity(outputs.len())).collect();
        }
        if paths.len() != regions.len() {
            return Err(Error::shape_mismatch("region paths", &[paths.len()], &[regions.len()]));
        }
        for (region, path) in regions.iter_mut().zip(paths) {
            region.push(path);
        }
    }
    Ok(regions)
}
