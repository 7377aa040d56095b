use indexmap::IndexMap;
use ndarray::{ArrayD, Axis};
use serde::{Serialize, Deserialize};

use crate::errors::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Latent,
    Observed,
    Deterministic,
}

impl SiteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteKind::Latent => "latent",
            SiteKind::Observed => "observed",
            SiteKind::Deterministic => "deterministic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "latent" => Some(SiteKind::Latent),
            "observed" => Some(SiteKind::Observed),
            "deterministic" => Some(SiteKind::Deterministic),
            _ => None,
        }
    }
}

/// A single named value recorded during one model evaluation.
///
/// `log_prob` is the masked log density of the value for sample sites and
/// zero for deterministic sites.
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub kind: SiteKind,
    pub value: ArrayD<f64>,
    pub log_prob: f64,
}

/// All sites recorded during one evaluation of a generative model, in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    sites: IndexMap<String, SiteRecord>,
}

impl Trace {
    pub fn new() -> Self {
        Self { sites: IndexMap::new() }
    }

    pub fn insert(&mut self, name: &str, record: SiteRecord) -> Result<()> {
        if self.sites.contains_key(name) {
            return Err(Error::DuplicateSite(name.into()));
        }
        self.sites.insert(name.into(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SiteRecord> {
        self.sites.get(name)
    }

    pub fn value(&self, name: &str) -> Result<&ArrayD<f64>> {
        self.sites.get(name).map(|r| &r.value).ok_or_else(
            || Error::MissingSite(name.into())
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sites.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SiteRecord)> {
        self.sites.iter()
    }

    pub fn latent_sites(&self) -> impl Iterator<Item = (&String, &SiteRecord)> {
        self.sites.iter().filter(|(_, r)| r.kind == SiteKind::Latent)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    fn total_log_prob(&self, kind: SiteKind) -> f64 {
        self.sites.values().filter(|r| r.kind == kind).map(|r| r.log_prob).sum()
    }

    pub fn log_prior(&self) -> f64 {
        self.total_log_prob(SiteKind::Latent)
    }

    pub fn log_likelihood(&self) -> f64 {
        self.total_log_prob(SiteKind::Observed)
    }
}

/// Site names for a quantity that is recorded in pieces: the seed-time
/// value, the main series, and the forecast extension.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentNames {
    pub seed: String,
    pub main: String,
    pub future: String,
}

impl SegmentNames {
    pub fn new(base: &str) -> Self {
        Self {
            seed: format!("{}0", base),
            main: base.into(),
            future: format!("{}_future", base),
        }
    }

    /// Name of the main or forecast piece.
    pub fn series(&self, future: bool) -> &str {
        if future { &self.future } else { &self.main }
    }
}

/// A time series assembled from a seed-time value, the main series and an
/// optional forecast extension, concatenated along `time_axis`.
///
/// `seed` has no time axis; `main` and `future` agree with it on every
/// other axis.
#[derive(Debug, Clone)]
pub struct Segments {
    pub seed: ArrayD<f64>,
    pub main: ArrayD<f64>,
    pub future: Option<ArrayD<f64>>,
    pub time_axis: usize,
}

impl Segments {
    pub fn new(seed: ArrayD<f64>, main: ArrayD<f64>, time_axis: usize) -> Result<Self> {
        check_segment("Segments main", &seed, &main, time_axis)?;
        Ok(Self { seed, main, future: None, time_axis })
    }

    pub fn with_future(mut self, future: ArrayD<f64>) -> Result<Self> {
        check_segment("Segments future", &self.seed, &future, self.time_axis)?;
        self.future = Some(future);
        Ok(self)
    }

    /// Total number of time steps.
    pub fn len(&self) -> usize {
        1 + self.main.len_of(Axis(self.time_axis))
            + self.future.as_ref().map(|f| f.len_of(Axis(self.time_axis))).unwrap_or(0)
    }

    pub fn concat(&self) -> Result<ArrayD<f64>> {
        let axis = Axis(self.time_axis);
        let seed = self.seed.clone().insert_axis(axis);
        let mut parts = vec![seed.view(), self.main.view()];
        if let Some(future) = &self.future {
            parts.push(future.view());
        }
        ndarray::concatenate(axis, &parts).map_err(
            |_| Error::shape_mismatch("Segments concat", seed.shape(), self.main.shape())
        )
    }

    /// The last time slice of the concatenated series.
    pub fn last(&self) -> ArrayD<f64> {
        let axis = Axis(self.time_axis);
        let tail = self.future.as_ref().filter(|f| f.len_of(axis) > 0).or(
            Some(&self.main).filter(|m| m.len_of(axis) > 0)
        );
        match tail {
            Some(series) => series.index_axis(axis, series.len_of(axis) - 1).to_owned(),
            None => self.seed.clone(),
        }
    }

    /// Reassembles the pieces recorded under `SegmentNames::new(base)`.
    pub fn from_trace(trace: &Trace, base: &str, time_axis: usize) -> Result<Self> {
        let names = SegmentNames::new(base);
        let segments = Self::new(
            trace.value(&names.seed)?.clone(),
            trace.value(&names.main)?.clone(),
            time_axis,
        )?;
        match trace.get(&names.future) {
            Some(future) => segments.with_future(future.value.clone()),
            None => Ok(segments),
        }
    }
}

fn check_segment(context: &str, seed: &ArrayD<f64>, series: &ArrayD<f64>, time_axis: usize) -> Result<()> {
    let ok = series.ndim() == seed.ndim() + 1 && time_axis < series.ndim() && {
        let mut other = series.shape().to_vec();
        other.remove(time_axis);
        other == seed.shape()
    };
    if ok { Ok(()) } else { Err(Error::shape_mismatch(context, seed.shape(), series.shape())) }
}
