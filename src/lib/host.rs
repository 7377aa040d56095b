//! The seam between generative models and whatever drives them.
//!
//! A model never draws random numbers itself: it describes each random
//! quantity as a [`SampleSite`] and asks its [`SamplingHost`] for a value.
//! The host decides whether to draw, replay or condition on an
//! observation, and keeps the score.

use ndarray::ArrayD;
use rand::RngCore;
use tracing::debug;

use crate::arrays::*;
use crate::distributions::Distribution;
use crate::errors::*;
use crate::trace::*;

/// Declares that a site's rightmost batch dimension holds `size`
/// independent replicates (one per region, say).
#[derive(Debug, Clone, PartialEq)]
pub struct Plate {
    pub name: String,
    pub size: usize,
}

pub struct SampleSite<'a> {
    pub name: &'a str,
    pub dist: &'a dyn Distribution,
    pub observed: Option<&'a ArrayD<f64>>,
    pub mask: Option<&'a ArrayD<bool>>,
    pub sample_shape: Vec<usize>,
    pub plate: Option<Plate>,
}

impl<'a> SampleSite<'a> {
    pub fn new(name: &'a str, dist: &'a dyn Distribution) -> Self {
        Self {
            name,
            dist,
            observed: None,
            mask: None,
            sample_shape: vec![],
            plate: None,
        }
    }

    pub fn observed(self, observed: Option<&'a ArrayD<f64>>) -> Self {
        Self { observed, ..self }
    }

    /// Entries where `mask` is false do not contribute to the score.
    pub fn mask(self, mask: Option<&'a ArrayD<bool>>) -> Self {
        Self { mask, ..self }
    }

    pub fn sample_shape(self, shape: &[usize]) -> Self {
        Self { sample_shape: shape.to_vec(), ..self }
    }

    pub fn plate(self, name: &str, size: usize) -> Self {
        Self { plate: Some(Plate { name: name.into(), size }), ..self }
    }

    /// Shape of one draw's batch: sample shape followed by the
    /// distribution's batch shape broadcast against the plate.
    pub fn batch_shape(&self) -> Result<Vec<usize>> {
        let mut batch = self.dist.batch_shape();
        if let Some(plate) = &self.plate {
            let context = format!("plate {} at site {}", plate.name, self.name);
            batch = broadcast_shape(&context, &batch, &[plate.size])?;
            if batch.last() != Some(&plate.size) {
                return Err(Error::shape_mismatch(&context, &batch, &[plate.size]));
            }
        }
        let mut shape = self.sample_shape.clone();
        shape.extend(batch);
        Ok(shape)
    }

    pub fn value_shape(&self) -> Result<Vec<usize>> {
        let mut shape = self.batch_shape()?;
        shape.extend(self.dist.event_shape());
        Ok(shape)
    }
}

pub trait SamplingHost {
    /// Draws (or conditions on `site.observed`) and returns the site's value.
    fn sample(&mut self, site: SampleSite<'_>) -> Result<ArrayD<f64>>;

    /// Records a non-random derived quantity.
    fn deterministic(&mut self, name: &str, value: &ArrayD<f64>) -> Result<()>;
}

/// Sum of the log density of `value` over the entries kept by `mask`.
pub fn masked_log_prob(
    dist: &dyn Distribution, value: &ArrayD<f64>, mask: Option<&ArrayD<bool>>
) -> Result<f64> {
    let lp = dist.log_prob(value)?;
    match mask {
        None => Ok(lp.sum()),
        Some(mask) => {
            let keep = broadcast_to("mask", mask, lp.shape())?;
            Ok(
                lp.iter().zip(keep.iter())
                    .filter(|(_, keep)| **keep)
                    .map(|(lp, _)| *lp)
                    .sum()
            )
        }
    }
}

/// A host that evaluates a model once and records everything in a [`Trace`].
///
/// Unobserved sites are drawn from the RNG, unless a substitution trace
/// holds a latent value under the same name, in which case that value is
/// replayed. Observed sites take the observation and add its masked log
/// density to the likelihood.
pub struct Tracer<'a> {
    rng: &'a mut dyn RngCore,
    substitutions: Option<&'a Trace>,
    trace: Trace,
}

impl<'a> Tracer<'a> {
    pub fn new(rng: &'a mut dyn RngCore) -> Self {
        Self { rng, substitutions: None, trace: Trace::new() }
    }

    pub fn substitute(self, trace: &'a Trace) -> Self {
        Self { substitutions: Some(trace), ..self }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn into_trace(self) -> Trace {
        self.trace
    }

    fn replayed(&self, name: &str) -> Option<&'a SiteRecord> {
        self.substitutions
            .and_then(|t| t.get(name))
            .filter(|r| r.kind == SiteKind::Latent)
    }
}

impl<'a> SamplingHost for Tracer<'a> {
    fn sample(&mut self, site: SampleSite<'_>) -> Result<ArrayD<f64>> {
        let shape = site.value_shape()?;
        let (kind, value) = match site.observed {
            Some(observed) => {
                if observed.shape() != &shape[..] {
                    return Err(Error::shape_mismatch(
                        &format!("observation at site {}", site.name), observed.shape(), &shape
                    ));
                }
                (SiteKind::Observed, observed.clone())
            },
            None => match self.replayed(site.name) {
                Some(record) => {
                    if record.value.shape() != &shape[..] {
                        return Err(Error::shape_mismatch(
                            &format!("replayed site {}", site.name), record.value.shape(), &shape
                        ));
                    }
                    (SiteKind::Latent, record.value.clone())
                },
                None => {
                    let batch_shape = site.batch_shape()?;
                    (SiteKind::Latent, site.dist.sample(&mut *self.rng, &batch_shape)?)
                }
            },
        };

        let log_prob = masked_log_prob(site.dist, &value, site.mask)?;
        debug!(site = site.name, dist = site.dist.name(), kind = kind.as_str(), log_prob, "sample site");
        self.trace.insert(site.name, SiteRecord { kind, value: value.clone(), log_prob })?;
        Ok(value)
    }

    fn deterministic(&mut self, name: &str, value: &ArrayD<f64>) -> Result<()> {
        self.trace.insert(name, SiteRecord {
            kind: SiteKind::Deterministic,
            value: value.clone(),
            log_prob: 0.0,
        })
    }
}
