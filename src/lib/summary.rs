//! Posterior predictive summaries: per-time medians, means and 10/90
//! percentile bands over a collection of forecast paths.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Serialize, Deserialize};

use crate::compartment::CompartmentModel;
use crate::errors::*;

/// One draw's full path (data period followed by the forecast) for a
/// single region.
#[derive(Debug, Clone)]
pub struct ForecastPath {
    pub compartment_model: CompartmentModel,
    /// Time × compartments.
    pub trajectory: Array2<f64>,
    pub confirmed: Array1<f64>,
    pub hospitalized: Array1<f64>,
    /// Transmission rate for each transition (one fewer than time steps).
    pub beta: Array1<f64>,
    pub gamma: f64,
}

impl ForecastPath {
    pub fn len(&self) -> usize {
        self.trajectory.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    S,
    E,
    I,
    R,
    C,
    #[serde(rename = "y")]
    Confirmed,
    #[serde(rename = "z")]
    Hospitalized,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::S => "susceptible",
            Field::E => "exposed",
            Field::I => "infectious",
            Field::R => "removed",
            Field::C => "total infections",
            Field::Confirmed => "total confirmed",
            Field::Hospitalized => "total hospitalized",
        }
    }

    fn compartment(&self) -> Option<&'static str> {
        match self {
            Field::S => Some("S"),
            Field::E => Some("E"),
            Field::I => Some("I"),
            Field::R => Some("R"),
            Field::C => Some("C"),
            Field::Confirmed | Field::Hospitalized => None,
        }
    }

    pub fn series<'a>(&self, path: &'a ForecastPath) -> Result<ArrayView1<'a, f64>> {
        match self.compartment() {
            Some(name) => {
                let k = path.compartment_model.index_of(name)?;
                Ok(path.trajectory.column(k))
            },
            None => match self {
                Field::Hospitalized => Ok(path.hospitalized.view()),
                _ => Ok(path.confirmed.view()),
            },
        }
    }
}

/// Per-time-step statistics across draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub median: Vec<f64>,
    pub mean: Vec<f64>,
    pub p10: Vec<f64>,
    pub p90: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub field: Field,
    pub label: String,
    #[serde(flatten)]
    pub band: Band,
    /// Evenly thinned individual draws.
    pub samples: Vec<Vec<f64>>,
}

/// Percentile `q` (0 to 100) of sorted values, interpolating linearly
/// between neighbouring ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn band(rows: &[Vec<f64>], len: usize) -> Band {
    let mut band = Band { median: vec![], mean: vec![], p10: vec![], p90: vec![] };
    for t in 0..len {
        let mut column: Vec<f64> = rows.iter().map(|r| r[t]).collect();
        column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        band.median.push(percentile(&column, 50.0));
        band.mean.push(column.iter().sum::<f64>() / column.len() as f64);
        band.p10.push(percentile(&column, 10.0));
        band.p90.push(percentile(&column, 90.0));
    }
    band
}

/// Indices of at most `n` draws spaced evenly through `total`.
pub fn thin(total: usize, n: usize) -> Vec<usize> {
    let n = n.min(total);
    if n == 0 {
        return vec![];
    }
    let step = total / n;
    (0..n).map(|i| i * step).collect()
}

fn common_length(lengths: &[usize], horizon: Option<usize>) -> Result<usize> {
    let first = *lengths.first().ok_or(Error::NoSamples)?;
    if let Some(len) = lengths.iter().find(|l| **l != first) {
        return Err(Error::shape_mismatch("forecast paths", &[*len], &[first]));
    }
    Ok(horizon.map(|h| h.min(first)).unwrap_or(first))
}

fn summarize_rows(field: Field, rows: Vec<Vec<f64>>, len: usize, n_samples: usize) -> FieldSummary {
    let samples = thin(rows.len(), n_samples).into_iter().map(
        |i| rows[i][..len].to_vec()
    ).collect();
    FieldSummary {
        field,
        label: field.label().into(),
        band: band(&rows, len),
        samples,
    }
}

/// Summarizes each field over `paths`, truncated to `horizon` time steps
/// when given, with up to `n_samples` thinned individual draws.
pub fn summarize(
    paths: &[ForecastPath], fields: &[Field], horizon: Option<usize>, n_samples: usize
) -> Result<Vec<FieldSummary>> {
    let lengths: Vec<usize> = paths.iter().map(|p| p.len()).collect();
    let len = common_length(&lengths, horizon)?;
    fields.iter().map(|field| {
        let rows = paths.iter().map(
            |p| Ok(field.series(p)?.to_vec())
        ).collect::<Result<Vec<_>>>()?;
        Ok(summarize_rows(*field, rows, len, n_samples))
    }).collect()
}

/// Basic reproduction number over time, `beta_t / gamma`.
pub fn summarize_r0(paths: &[ForecastPath], horizon: Option<usize>) -> Result<Band> {
    let lengths: Vec<usize> = paths.iter().map(|p| p.beta.len()).collect();
    let len = common_length(&lengths, horizon)?;
    let rows: Vec<Vec<f64>> = paths.iter().map(
        |p| p.beta.iter().map(|b| b / p.gamma).collect()
    ).collect();
    Ok(band(&rows, len))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub region: usize,
    pub fields: Vec<FieldSummary>,
    pub r0: Band,
}

/// Summarizes each region's paths; `paths[p]` holds every draw for region `p`.
pub fn summarize_regions(
    paths: &[Vec<ForecastPath>], fields: &[Field], horizon: Option<usize>, n_samples: usize
) -> Result<Vec<RegionSummary>> {
    paths.iter().enumerate().map(|(region, paths)| {
        Ok(RegionSummary {
            region,
            fields: summarize(paths, fields, horizon, n_samples)?,
            r0: summarize_r0(paths, horizon)?,
        })
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(model: CompartmentModel, scale: f64, len: usize) -> ForecastPath {
        let k = model.num_compartments();
        let trajectory = Array2::from_shape_fn((len, k), |(t, j)| scale * (t * k + j) as f64);
        ForecastPath {
            compartment_model: model,
            trajectory,
            confirmed: Array1::from_shape_fn(len, |t| scale * t as f64),
            hospitalized: Array1::zeros(len),
            beta: Array1::from_elem(len - 1, 0.5 * scale),
            gamma: 0.25,
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert!((percentile(&values, 10.0) - 1.4).abs() < 1e-12);
        assert!((percentile(&values, 90.0) - 4.6).abs() < 1e-12);
        assert_eq!(percentile(&[7.0], 90.0), 7.0);
    }

    #[test]
    fn test_thin() {
        assert_eq!(thin(10, 3), vec![0, 3, 6]);
        assert_eq!(thin(2, 5), vec![0, 1]);
        assert!(thin(10, 0).is_empty());
    }

    #[test]
    fn test_summary_bands_bracket_median() {
        let paths: Vec<_> = (1..=20).map(|i| path(CompartmentModel::Seir, i as f64, 8)).collect();
        let summaries = summarize(&paths, &[Field::I, Field::Confirmed], Some(5), 4).unwrap();
        assert_eq!(summaries.len(), 2);
        for s in &summaries {
            assert_eq!(s.band.median.len(), 5);
            assert!(s.samples.len() <= 4);
            assert!(s.samples.iter().all(|r| r.len() == 5));
            for t in 0..5 {
                assert!(s.band.p10[t] <= s.band.median[t]);
                assert!(s.band.median[t] <= s.band.p90[t]);
            }
        }
        assert_eq!(summaries[0].label, "infectious");
        assert_eq!(summaries[1].label, "total confirmed");
        // I is column 2 of SEIR; draw i has I[1] = i * 7
        assert!((summaries[0].band.mean[1] - 7.0 * 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_field_for_variant() {
        let paths = vec![path(CompartmentModel::Sir, 1.0, 4)];
        assert!(summarize(&paths, &[Field::C], None, 0).is_ok());
        match summarize(&paths, &[Field::E], None, 0) {
            Err(Error::MissingCompartment { model, field }) => {
                assert_eq!(model, "SIR");
                assert_eq!(field, "E");
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_r0_over_time() {
        let paths: Vec<_> = (1..=3).map(|i| path(CompartmentModel::Seir, i as f64, 6)).collect();
        let r0 = summarize_r0(&paths, None).unwrap();
        assert_eq!(r0.median.len(), 5);
        // beta / gamma = 0.5 * i / 0.25
        assert!((r0.median[0] - 4.0).abs() < 1e-12);
        assert!((r0.mean[4] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_regions_summarized_separately() {
        let regions = vec![
            (1..=4).map(|i| path(CompartmentModel::Seir, i as f64, 5)).collect::<Vec<_>>(),
            (1..=4).map(|i| path(CompartmentModel::Seir, 10.0 * i as f64, 5)).collect::<Vec<_>>(),
        ];
        let summaries = summarize_regions(&regions, &[Field::C], None, 2).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].region, 1);
        let c0 = &summaries[0].fields[0].band.median;
        let c1 = &summaries[1].fields[0].band.median;
        assert!((c1[3] - 10.0 * c0[3]).abs() < 1e-9);

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["fields"][0]["field"], "C");
        assert_eq!(json["fields"][0]["label"], "total infections");
        assert!(json["fields"][0]["p90"].is_array());
    }

    #[test]
    fn test_empty_and_ragged_paths() {
        assert!(summarize(&[], &[Field::S], None, 0).is_err());
        let paths = vec![path(CompartmentModel::Seir, 1.0, 4), path(CompartmentModel::Seir, 1.0, 5)];
        assert!(summarize(&paths, &[Field::S], None, 0).is_err());
    }
}
