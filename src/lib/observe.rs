//! Links latent cumulative counts to noisy, possibly incomplete observations.

use ndarray::{ArrayD, Zip};
use serde::{Serialize, Deserialize};

use crate::arrays::*;
use crate::distributions::{BinomialApprox, Distribution, Normal};
use crate::errors::*;
use crate::host::{SampleSite, SamplingHost};

/// Added to observations (and, divided by the detection rate, to the
/// latent counts) so that neither the mean nor an observation is zero.
pub const REGULARIZER: f64 = 0.5;

/// Which noise model links expected counts to observed counts.
///
/// The meaning of the `noise_param` passed to [`observe`] depends on the
/// choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationNoise {
    /// `Normal(mean, noise_param · mean + 1)`: standard deviation grows
    /// linearly with the expected count. Cheap, unbounded support, and
    /// tolerant of observations above the latent count.
    Normal,
    /// Continuous Binomial relaxation with `noise_param` as the detection
    /// concentration, capped at the regularized latent count so it is never
    /// tighter than a true Binomial. Observations must stay below the
    /// (regularized) latent count or they score as impossible.
    BinomialApprox,
}

impl Default for ObservationNoise {
    fn default() -> Self {
        ObservationNoise::Normal
    }
}

/// Observes `detection_rate · latent` through the configured noise model.
///
/// Records `mean_<name>` as a deterministic site, then samples `<name>`, or
/// conditions it on `observed` with non-finite entries masked out of the
/// score. Returns the sampled value, or the regularized observations.
pub fn observe<H: SamplingHost + ?Sized>(
    host: &mut H,
    name: &str,
    latent: &ArrayD<f64>,
    detection_rate: &ArrayD<f64>,
    noise_param: f64,
    observed: Option<&ArrayD<f64>>,
    noise: ObservationNoise,
) -> Result<ArrayD<f64>> {
    let context = format!("detection rate for {}", name);
    let det_rate = broadcast_to(&context, detection_rate, latent.shape())?.to_owned();
    let latent = Zip::from(latent).and(&det_rate).map_collect(|&l, &d| l + REGULARIZER / d);

    let mask = observed.map(|obs| obs.mapv(f64::is_finite));
    let placeholder = |l: f64| match noise {
        ObservationNoise::Normal => 0.0,
        ObservationNoise::BinomialApprox => 0.5 * l,
    };
    let observed = match observed {
        Some(obs) => {
            let obs = broadcast_to(&format!("observations for {}", name), obs, latent.shape())?;
            Some(Zip::from(&obs).and(&latent).map_collect(|&y, &l| {
                let y = if y.is_finite() { y } else { placeholder(l) };
                y + REGULARIZER
            }))
        },
        None => None,
    };

    let mean = mul(&context, &det_rate, &latent)?;
    host.deterministic(&format!("mean_{}", name), &mean)?;

    let dist: Box<dyn Distribution> = match noise {
        ObservationNoise::Normal => {
            let scale = mean.mapv(|m| noise_param * m + 1.0);
            Box::new(Normal::new(mean, scale)?)
        },
        ObservationNoise::BinomialApprox => {
            let concentration = latent.mapv(|l| noise_param.min(l));
            let n = Zip::from(&latent).and(&det_rate).map_collect(|&l, &d| l + REGULARIZER / d);
            Box::new(BinomialApprox::new(n, det_rate, Some(concentration))?)
        },
    };

    host.sample(
        SampleSite::new(name, dist.as_ref())
            .observed(observed.as_ref())
            .mask(mask.as_ref())
    )
}
