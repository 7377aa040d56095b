//! Deterministic compartment dynamics.
//!
//! `run` integrates the ODE one unit of time at a time, holding the rates
//! for step `t` constant over `[t, t + 1)`, with a fixed-step RK4
//! integrator. The returned trajectory starts with the initial state.

use std::convert::TryFrom;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2};
use serde::{Serialize, Deserialize};

use crate::errors::*;

const SUBSTEPS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum CompartmentModel {
    #[serde(rename = "SIR")]
    Sir,
    #[serde(rename = "SEIR")]
    Seir,
}

impl FromStr for CompartmentModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SIR" => Ok(CompartmentModel::Sir),
            "SEIR" => Ok(CompartmentModel::Seir),
            _ => Err(Error::UnknownCompartmentModel(s.into())),
        }
    }
}

impl TryFrom<String> for CompartmentModel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Rate parameters for one run. `beta` holds either a single constant
/// value or one value per transition (`num_steps - 1` of them).
#[derive(Debug, Clone)]
pub struct Rates<'a> {
    pub beta: &'a [f64],
    pub sigma: f64,
    pub gamma: f64,
}

impl CompartmentModel {
    pub fn name(&self) -> &'static str {
        match self {
            CompartmentModel::Sir => "SIR",
            CompartmentModel::Seir => "SEIR",
        }
    }

    pub fn compartments(&self) -> &'static [&'static str] {
        match self {
            CompartmentModel::Sir => &["S", "I", "R", "C"],
            CompartmentModel::Seir => &["S", "E", "I", "R", "C"],
        }
    }

    pub fn num_compartments(&self) -> usize {
        self.compartments().len()
    }

    pub fn index_of(&self, field: &str) -> Result<usize> {
        self.compartments().iter().position(|c| *c == field).ok_or_else(
            || Error::MissingCompartment { model: self.name(), field: field.into() }
        )
    }

    /// Index of the cumulative-infections compartment.
    pub fn cumulative_index(&self) -> usize {
        self.num_compartments() - 1
    }

    pub fn seed(&self, population: f64, infectious: f64, exposed: f64) -> Result<Array1<f64>> {
        for &(parameter, value) in &[
            ("population", population), ("infectious", infectious), ("exposed", exposed)
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidParameter { distribution: "seed", parameter, value });
            }
        }
        match self {
            CompartmentModel::Sir => {
                if exposed != 0.0 {
                    return Err(Error::InvalidParameter {
                        distribution: "SIR seed", parameter: "exposed", value: exposed
                    });
                }
                Ok(Array1::from(vec![population - infectious, infectious, 0.0, infectious]))
            },
            CompartmentModel::Seir => {
                Ok(Array1::from(vec![
                    population - exposed - infectious, exposed, infectious, 0.0, infectious
                ]))
            },
        }
    }

    fn derivative(&self, x: &[f64], beta: f64, sigma: f64, gamma: f64, dx: &mut [f64]) {
        match self {
            CompartmentModel::Sir => {
                let (s, i, r) = (x[0], x[1], x[2]);
                let n = s + i + r;
                let infection = if n > 0.0 { beta * s * i / n } else { 0.0 };
                dx[0] = -infection;
                dx[1] = infection - gamma * i;
                dx[2] = gamma * i;
                dx[3] = infection;
            },
            CompartmentModel::Seir => {
                let (s, e, i, r) = (x[0], x[1], x[2], x[3]);
                let n = s + e + i + r;
                let infection = if n > 0.0 { beta * s * i / n } else { 0.0 };
                dx[0] = -infection;
                dx[1] = infection - sigma * e;
                dx[2] = sigma * e - gamma * i;
                dx[3] = gamma * i;
                // incidence
                dx[4] = sigma * e;
            },
        }
    }

    fn rk4_step(&self, x: &mut Vec<f64>, beta: f64, sigma: f64, gamma: f64, h: f64) {
        let k = x.len();
        let mut k1 = vec![0.0; k];
        let mut k2 = vec![0.0; k];
        let mut k3 = vec![0.0; k];
        let mut k4 = vec![0.0; k];
        fn shifted(x: &[f64], d: &[f64], f: f64) -> Vec<f64> {
            x.iter().zip(d).map(|(a, b)| a + f * b).collect()
        }
        self.derivative(x, beta, sigma, gamma, &mut k1);
        self.derivative(&shifted(x, &k1, h / 2.0), beta, sigma, gamma, &mut k2);
        self.derivative(&shifted(x, &k2, h / 2.0), beta, sigma, gamma, &mut k3);
        self.derivative(&shifted(x, &k3, h), beta, sigma, gamma, &mut k4);

        let c = self.cumulative_index();
        let c_before = x[c];
        for j in 0..k {
            x[j] = (x[j] + h / 6.0 * (k1[j] + 2.0 * k2[j] + 2.0 * k3[j] + k4[j])).max(0.0);
        }
        x[c] = x[c].max(c_before);
    }

    /// Runs the dynamics for `num_steps` time points starting at `x0`; row 0
    /// of the result is `x0` itself.
    pub fn run(&self, num_steps: usize, x0: ArrayView1<f64>, rates: &Rates) -> Result<Array2<f64>> {
        let k = self.num_compartments();
        if x0.len() != k {
            return Err(Error::shape_mismatch("initial state", &[x0.len()], &[k]));
        }
        let transitions = num_steps.saturating_sub(1);
        if transitions > 0 && rates.beta.len() != 1 && rates.beta.len() != transitions {
            return Err(Error::shape_mismatch("beta", &[rates.beta.len()], &[transitions]));
        }
        for &(parameter, value) in &[("sigma", rates.sigma), ("gamma", rates.gamma)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidParameter { distribution: self.name(), parameter, value });
            }
        }

        let mut out = Array2::zeros((num_steps, k));
        if num_steps == 0 {
            return Ok(out);
        }
        let mut x = x0.to_vec();
        out.row_mut(0).assign(&x0);
        let h = 1.0 / SUBSTEPS as f64;
        for t in 0..transitions {
            let beta = if rates.beta.len() == 1 { rates.beta[0] } else { rates.beta[t] };
            if !(beta.is_finite() && beta >= 0.0) {
                return Err(Error::InvalidParameter { distribution: self.name(), parameter: "beta", value: beta });
            }
            for _ in 0..SUBSTEPS {
                self.rk4_step(&mut x, beta, rates.sigma, rates.gamma, h);
            }
            out.row_mut(t + 1).assign(&ArrayView1::from(&x[..]));
        }
        Ok(out)
    }

    /// Runs each region independently: `x0` is (regions × compartments),
    /// `beta` is (regions × transitions) and `sigma`/`gamma` have one entry per
    /// region. Returns (regions × num_steps × compartments).
    pub fn run_batched(
        &self, num_steps: usize, x0: ArrayView2<f64>, beta: ArrayView2<f64>,
        sigma: ArrayView1<f64>, gamma: ArrayView1<f64>,
    ) -> Result<Array3<f64>> {
        let regions = x0.nrows();
        for (context, len) in &[("beta", beta.nrows()), ("sigma", sigma.len()), ("gamma", gamma.len())] {
            if *len != regions {
                return Err(Error::shape_mismatch(context, &[*len], &[regions]));
            }
        }
        let mut out = Array3::zeros((regions, num_steps, self.num_compartments()));
        for p in 0..regions {
            let beta_p = beta.row(p).to_vec();
            let rates = Rates { beta: &beta_p, sigma: sigma[p], gamma: gamma[p] };
            let x = self.run(num_steps, x0.row(p), &rates)?;
            out.slice_mut(s![p, .., ..]).assign(&x);
        }
        Ok(out)
    }
}
