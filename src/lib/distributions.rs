//! Parametrized distributions used by the generative models.
//!
//! Every distribution has a batch shape (from broadcasting its array
//! parameters) and an event shape (empty except for
//! [`ExponentialRandomWalk`], whose event is a whole sequence). Drawing
//! takes the RNG from the sampling host; `log_prob` returns one log
//! density per batch element.

use std::fmt::Debug;

use ndarray::{ArrayD, ArrayView1, Axis, IxDyn};
use rand::RngCore;
use rand::distributions::Distribution as RandDistribution;
use rand::distributions::uniform::Uniform as RandUniform;
use rand_distr::StandardNormal;
use statrs::distribution::{Beta as BetaDensity, Continuous, Gamma as GammaDensity, Normal as NormalDensity};

use crate::arrays::*;
use crate::errors::*;

pub trait Distribution: Debug {
    fn name(&self) -> &'static str;

    fn batch_shape(&self) -> Vec<usize>;

    fn event_shape(&self) -> Vec<usize> {
        vec![]
    }

    /// Draws one value for every element of `batch_shape`, which must be a
    /// broadcast of the distribution's own batch shape.
    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>>;

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>>;
}

fn sample_elementwise<F>(
    context: &str, p1: &ArrayD<f64>, p2: &ArrayD<f64>, batch_shape: &[usize], mut draw: F
) -> Result<ArrayD<f64>> where F: FnMut(f64, f64) -> Result<f64> {
    let v1 = broadcast_to(context, p1, batch_shape)?;
    let v2 = broadcast_to(context, p2, batch_shape)?;
    let values = v1.iter().zip(v2.iter()).map(
        |(a, b)| draw(*a, *b)
    ).collect::<Result<Vec<_>>>()?;
    ArrayD::from_shape_vec(IxDyn(batch_shape), values).map_err(
        |_| Error::shape_mismatch(context, p1.shape(), batch_shape)
    )
}

fn log_prob_elementwise<F>(
    context: &str, p1: &ArrayD<f64>, p2: &ArrayD<f64>, value: &ArrayD<f64>, f: F
) -> Result<ArrayD<f64>> where F: Fn(f64, f64, f64) -> Result<f64> {
    let params_shape = broadcast_shape(context, p1.shape(), p2.shape())?;
    let shape = broadcast_shape(context, &params_shape, value.shape())?;
    let v1 = broadcast_to(context, p1, &shape)?;
    let v2 = broadcast_to(context, p2, &shape)?;
    let x = broadcast_to(context, value, &shape)?;
    let values = v1.iter().zip(v2.iter()).zip(x.iter()).map(
        |((a, b), x)| f(*a, *b, *x)
    ).collect::<Result<Vec<_>>>()?;
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(
        |_| Error::shape_mismatch(context, value.shape(), &shape)
    )
}

fn normal_density(loc: f64, scale: f64) -> Result<NormalDensity> {
    NormalDensity::new(loc, scale).map_err(
        |_| Error::InvalidParameter { distribution: "Normal", parameter: "scale", value: scale }
    )
}

fn standard_normal(rng: &mut dyn RngCore) -> f64 {
    StandardNormal.sample(rng)
}

#[derive(Debug, Clone)]
pub struct Normal {
    loc: ArrayD<f64>,
    scale: ArrayD<f64>,
}

impl Normal {
    pub fn new(loc: ArrayD<f64>, scale: ArrayD<f64>) -> Result<Self> {
        check_all(&loc, "Normal", "loc", f64::is_finite)?;
        check_all(&scale, "Normal", "scale", |s| s.is_finite() && s > 0.0)?;
        broadcast_shape("Normal", loc.shape(), scale.shape())?;
        Ok(Self { loc, scale })
    }

    pub fn scalar(loc: f64, scale: f64) -> Result<Self> {
        Self::new(scalar(loc), scalar(scale))
    }
}

impl Distribution for Normal {
    fn name(&self) -> &'static str {
        "Normal"
    }

    fn batch_shape(&self) -> Vec<usize> {
        broadcast_shape("Normal", self.loc.shape(), self.scale.shape()).unwrap_or_default()
    }

    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>> {
        sample_elementwise("Normal", &self.loc, &self.scale, batch_shape, |m, s| {
            Ok(m + s * standard_normal(&mut *rng))
        })
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        log_prob_elementwise("Normal", &self.loc, &self.scale, value, |m, s, x| {
            Ok(normal_density(m, s)?.ln_pdf(x))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Uniform {
    low: ArrayD<f64>,
    high: ArrayD<f64>,
}

impl Uniform {
    pub fn new(low: ArrayD<f64>, high: ArrayD<f64>) -> Result<Self> {
        check_all(&low, "Uniform", "low", f64::is_finite)?;
        check_all(&high, "Uniform", "high", f64::is_finite)?;
        let width = zip_map("Uniform", &high, &low, |h, l| h - l)?;
        check_all(&width, "Uniform", "high - low", |w| w > 0.0)?;
        Ok(Self { low, high })
    }
}

impl Distribution for Uniform {
    fn name(&self) -> &'static str {
        "Uniform"
    }

    fn batch_shape(&self) -> Vec<usize> {
        broadcast_shape("Uniform", self.low.shape(), self.high.shape()).unwrap_or_default()
    }

    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>> {
        sample_elementwise("Uniform", &self.low, &self.high, batch_shape, |l, h| {
            Ok(RandUniform::new(l, h).sample(&mut *rng))
        })
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        log_prob_elementwise("Uniform", &self.low, &self.high, value, |l, h, x| {
            Ok(if x >= l && x <= h { -(h - l).ln() } else { f64::NEG_INFINITY })
        })
    }
}

/// Gamma distribution in shape/rate form.
#[derive(Debug, Clone)]
pub struct Gamma {
    shape: ArrayD<f64>,
    rate: ArrayD<f64>,
}

impl Gamma {
    pub fn new(shape: ArrayD<f64>, rate: ArrayD<f64>) -> Result<Self> {
        check_all(&shape, "Gamma", "shape", |k| k.is_finite() && k > 0.0)?;
        check_all(&rate, "Gamma", "rate", |r| r.is_finite() && r > 0.0)?;
        broadcast_shape("Gamma", shape.shape(), rate.shape())?;
        Ok(Self { shape, rate })
    }

    pub fn scalar(shape: f64, rate: f64) -> Result<Self> {
        Self::new(scalar(shape), scalar(rate))
    }

    /// Gamma with the given mean and dispersion (variance = mean² · dispersion).
    pub fn mean_dispersion(mean: ArrayD<f64>, dispersion: ArrayD<f64>) -> Result<Self> {
        check_all(&mean, "Gamma", "mean", |m| m.is_finite() && m > 0.0)?;
        check_all(&dispersion, "Gamma", "dispersion", |d| d.is_finite() && d > 0.0)?;
        let shape = dispersion.mapv(|d| 1.0 / d);
        let rate = zip_map("GammaMeanDispersion", &shape, &mean, |k, m| k / m)?;
        Self::new(shape, rate)
    }

    /// Gamma with the given mean and variance.
    pub fn mean_var(mean: ArrayD<f64>, variance: ArrayD<f64>) -> Result<Self> {
        check_all(&mean, "Gamma", "mean", |m| m.is_finite() && m > 0.0)?;
        check_all(&variance, "Gamma", "variance", |v| v.is_finite() && v > 0.0)?;
        let shape = zip_map("GammaMeanVar", &mean, &variance, |m, v| m * m / v)?;
        let rate = zip_map("GammaMeanVar", &shape, &mean, |k, m| k / m)?;
        Self::new(shape, rate)
    }

    pub fn mean(&self) -> Result<ArrayD<f64>> {
        zip_map("Gamma", &self.shape, &self.rate, |k, r| k / r)
    }

    pub fn variance(&self) -> Result<ArrayD<f64>> {
        zip_map("Gamma", &self.shape, &self.rate, |k, r| k / (r * r))
    }
}

impl Distribution for Gamma {
    fn name(&self) -> &'static str {
        "Gamma"
    }

    fn batch_shape(&self) -> Vec<usize> {
        broadcast_shape("Gamma", self.shape.shape(), self.rate.shape()).unwrap_or_default()
    }

    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>> {
        sample_elementwise("Gamma", &self.shape, &self.rate, batch_shape, |k, r| {
            // rand_distr parametrizes by scale
            let gamma = rand_distr::Gamma::new(k, 1.0 / r).map_err(
                |_| Error::InvalidParameter { distribution: "Gamma", parameter: "shape", value: k }
            )?;
            Ok(gamma.sample(&mut *rng))
        })
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        log_prob_elementwise("Gamma", &self.shape, &self.rate, value, |k, r, x| {
            if x <= 0.0 {
                return Ok(f64::NEG_INFINITY);
            }
            let gamma = GammaDensity::new(k, r).map_err(
                |_| Error::InvalidParameter { distribution: "Gamma", parameter: "shape", value: k }
            )?;
            Ok(gamma.ln_pdf(x))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Beta {
    a: ArrayD<f64>,
    b: ArrayD<f64>,
}

impl Beta {
    pub fn new(a: ArrayD<f64>, b: ArrayD<f64>) -> Result<Self> {
        check_all(&a, "Beta", "alpha", |a| a.is_finite() && a > 0.0)?;
        check_all(&b, "Beta", "beta", |b| b.is_finite() && b > 0.0)?;
        broadcast_shape("Beta", a.shape(), b.shape())?;
        Ok(Self { a, b })
    }

    /// Beta with mean `mean` and concentration `conc` (a + b = conc).
    pub fn mean_concentration(mean: ArrayD<f64>, conc: ArrayD<f64>) -> Result<Self> {
        check_all(&mean, "Beta", "mean", |m| m > 0.0 && m < 1.0)?;
        let a = mul("Beta", &mean, &conc)?;
        let b = zip_map("Beta", &mean, &conc, |m, c| (1.0 - m) * c)?;
        Self::new(a, b)
    }
}

impl Distribution for Beta {
    fn name(&self) -> &'static str {
        "Beta"
    }

    fn batch_shape(&self) -> Vec<usize> {
        broadcast_shape("Beta", self.a.shape(), self.b.shape()).unwrap_or_default()
    }

    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>> {
        sample_elementwise("Beta", &self.a, &self.b, batch_shape, |a, b| {
            let beta = rand_distr::Beta::new(a, b).map_err(
                |_| Error::InvalidParameter { distribution: "Beta", parameter: "alpha", value: a }
            )?;
            Ok(beta.sample(&mut *rng))
        })
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        log_prob_elementwise("Beta", &self.a, &self.b, value, |a, b, x| {
            if x <= 0.0 || x >= 1.0 {
                return Ok(f64::NEG_INFINITY);
            }
            let beta = BetaDensity::new(a, b).map_err(
                |_| Error::InvalidParameter { distribution: "Beta", parameter: "alpha", value: a }
            )?;
            Ok(beta.ln_pdf(x))
        })
    }
}

/// Continuous relaxation of Binomial(n, p): the distribution of n · Beta(c·p, c·(1 − p)).
///
/// With concentration c = n the variance is close to the Binomial's; a
/// smaller concentration makes the distribution overdispersed.
#[derive(Debug, Clone)]
pub struct BinomialApprox {
    n: ArrayD<f64>,
    beta: Beta,
}

impl BinomialApprox {
    pub fn new(n: ArrayD<f64>, p: ArrayD<f64>, concentration: Option<ArrayD<f64>>) -> Result<Self> {
        check_all(&n, "BinomialApprox", "n", |n| n.is_finite() && n > 0.0)?;
        check_all(&p, "BinomialApprox", "p", |p| p > 0.0 && p < 1.0)?;
        let conc = concentration.unwrap_or_else(|| n.clone());
        let a = mul("BinomialApprox", &conc, &p)?;
        let b = zip_map("BinomialApprox", &conc, &p, |c, p| c * (1.0 - p))?;
        let beta = Beta::new(a, b)?;
        broadcast_shape("BinomialApprox", n.shape(), &beta.batch_shape())?;
        Ok(Self { n, beta })
    }
}

impl Distribution for BinomialApprox {
    fn name(&self) -> &'static str {
        "BinomialApprox"
    }

    fn batch_shape(&self) -> Vec<usize> {
        broadcast_shape("BinomialApprox", self.n.shape(), &self.beta.batch_shape())
            .unwrap_or_default()
    }

    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>> {
        let fraction = self.beta.sample(rng, batch_shape)?;
        mul("BinomialApprox", &fraction, &self.n)
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let fraction = zip_map("BinomialApprox", value, &self.n, |y, n| y / n)?;
        let lp = self.beta.log_prob(&fraction)?;
        zip_map("BinomialApprox", &lp, &self.n, |lp, n| lp - n.ln())
    }
}

/// Exponentiated Gaussian random walk with drift.
///
/// In log space, `log x_t = log(loc) + drift·t + w_t` where
/// `w_t = w_{t-1} + eps_t`, `w_{-1} = 0`, `eps_t ~ N(0, scale)`. The event
/// axis is the last axis; `loc` may carry batch dimensions (e.g. one
/// row per region, shape `(P, 1)`).
#[derive(Debug, Clone)]
pub struct ExponentialRandomWalk {
    log_loc: ArrayD<f64>,
    scale: f64,
    num_steps: usize,
}

impl ExponentialRandomWalk {
    pub fn new(loc: ArrayD<f64>, scale: f64, drift: f64, num_steps: usize) -> Result<Self> {
        check_all(&loc, "ExponentialRandomWalk", "loc", |l| l.is_finite() && l > 0.0)?;
        if !(scale.is_finite() && scale >= 0.0) {
            return Err(Error::InvalidParameter {
                distribution: "ExponentialRandomWalk", parameter: "scale", value: scale
            });
        }
        if !drift.is_finite() {
            return Err(Error::InvalidParameter {
                distribution: "ExponentialRandomWalk", parameter: "drift", value: drift
            });
        }
        let trend = vector((0..num_steps).map(|t| drift * t as f64).collect());
        let log_loc = add("ExponentialRandomWalk", &loc.mapv(f64::ln), &trend)?;
        Ok(Self { log_loc, scale, num_steps })
    }

    fn lane_log_prob(&self, x: ArrayView1<f64>, log_loc: ArrayView1<f64>) -> Result<f64> {
        let innovation = if self.scale > 0.0 { Some(normal_density(0.0, self.scale)?) } else { None };
        let mut previous = 0.0;
        let mut lp = 0.0;
        for (&x, &l) in x.iter().zip(log_loc.iter()) {
            if !(x > 0.0) {
                return Ok(f64::NEG_INFINITY);
            }
            let w = x.ln() - l;
            let step = w - previous;
            previous = w;
            lp += match &innovation {
                Some(normal) => normal.ln_pdf(step),
                None if step.abs() < 1e-12 => 0.0,
                None => f64::NEG_INFINITY,
            };
            // Jacobian of the exp transform
            lp -= x.ln();
        }
        Ok(lp)
    }
}

impl Distribution for ExponentialRandomWalk {
    fn name(&self) -> &'static str {
        "ExponentialRandomWalk"
    }

    fn batch_shape(&self) -> Vec<usize> {
        let shape = self.log_loc.shape();
        shape[..shape.len() - 1].to_vec()
    }

    fn event_shape(&self) -> Vec<usize> {
        vec![self.num_steps]
    }

    fn sample(&self, rng: &mut dyn RngCore, batch_shape: &[usize]) -> Result<ArrayD<f64>> {
        let mut shape = batch_shape.to_vec();
        shape.push(self.num_steps);
        let mut x = broadcast_to("ExponentialRandomWalk", &self.log_loc, &shape)?.to_owned();
        let axis = Axis(shape.len() - 1);
        for mut lane in x.lanes_mut(axis) {
            let mut w = 0.0;
            for v in lane.iter_mut() {
                if self.scale > 0.0 {
                    w += self.scale * standard_normal(rng);
                }
                *v = (*v + w).exp();
            }
        }
        Ok(x)
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let context = "ExponentialRandomWalk";
        if value.ndim() == 0 || value.shape()[value.ndim() - 1] != self.num_steps {
            return Err(Error::shape_mismatch(context, value.shape(), &self.event_shape()));
        }
        let shape = broadcast_shape(context, self.log_loc.shape(), value.shape())?;
        let x = broadcast_to(context, value, &shape)?;
        let log_loc = broadcast_to(context, &self.log_loc, &shape)?;
        let axis = Axis(shape.len() - 1);
        let values = x.lanes(axis).into_iter().zip(log_loc.lanes(axis)).map(
            |(x, l)| self.lane_log_prob(x, l)
        ).collect::<Result<Vec<_>>>()?;
        let batch = &shape[..shape.len() - 1];
        ArrayD::from_shape_vec(IxDyn(batch), values).map_err(
            |_| Error::shape_mismatch(context, value.shape(), &shape)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use ndarray::array;
    use proptest::prelude::*;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use rand_xoshiro::rand_core::SeedableRng;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs()))
    }

    proptest! {
        #[test]
        fn gamma_mean_dispersion_moments(mean in 1e-3f64..1e4, dispersion in 1e-3f64..1e2) {
            let d = Gamma::mean_dispersion(scalar(mean), scalar(dispersion)).unwrap();
            prop_assert!(close(item(&d.mean().unwrap()), mean, 1e-9));
            prop_assert!(close(item(&d.variance().unwrap()), mean * mean * dispersion, 1e-9));
        }

        #[test]
        fn gamma_mean_var_moments(mean in 1e-3f64..1e4, variance in 1e-3f64..1e4) {
            let d = Gamma::mean_var(scalar(mean), scalar(variance)).unwrap();
            prop_assert!(close(item(&d.mean().unwrap()), mean, 1e-9));
            prop_assert!(close(item(&d.variance().unwrap()), variance, 1e-9));
        }
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(Gamma::mean_dispersion(scalar(0.0), scalar(1.0)).is_err());
        assert!(Gamma::mean_var(scalar(1.0), scalar(-1.0)).is_err());
        assert!(BinomialApprox::new(scalar(10.0), scalar(1.0), None).is_err());
        assert!(BinomialApprox::new(scalar(0.0), scalar(0.5), None).is_err());
        assert!(Normal::scalar(0.0, 0.0).is_err());
        assert!(Uniform::new(scalar(1.0), scalar(1.0)).is_err());
    }

    #[test]
    fn test_gamma_sample_mean() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let d = Gamma::mean_var(scalar(3.0), scalar(0.1)).unwrap();
        let x = d.sample(&mut rng, &[20000]).unwrap();
        let mean = x.mean().unwrap();
        println!("gamma sample mean: {}", mean);
        assert!((mean - 3.0).abs() < 0.02);
    }

    #[test]
    fn test_normal_log_prob() {
        let d = Normal::scalar(1.0, 2.0).unwrap();
        let lp = item(&d.log_prob(&scalar(1.0)).unwrap());
        assert!((lp - (-(2.0f64).ln() - 0.5 * (2.0 * PI).ln())).abs() < 1e-12);
    }

    #[test]
    fn test_gamma_and_beta_log_prob_closed_form() {
        // Gamma(2, rate 3) at 0.5: 9 · 0.5 · exp(-1.5)
        let gamma = Gamma::scalar(2.0, 3.0).unwrap();
        let lp = item(&gamma.log_prob(&scalar(0.5)).unwrap());
        assert!((lp - (4.5f64.ln() - 1.5)).abs() < 1e-10);
        assert_eq!(item(&gamma.log_prob(&scalar(-1.0)).unwrap()), f64::NEG_INFINITY);

        // Beta(2, 3) at 0.4: 12 · 0.4 · 0.6²
        let beta = Beta::new(scalar(2.0), scalar(3.0)).unwrap();
        let lp = item(&beta.log_prob(&scalar(0.4)).unwrap());
        assert!((lp - 1.728f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_beta_log_prob_uniform_case() {
        let d = Beta::new(scalar(1.0), scalar(1.0)).unwrap();
        let lp = d.log_prob(&vector(vec![0.2, 0.7, 1.5])).unwrap();
        assert!(lp[[0]].abs() < 1e-12);
        assert!(lp[[1]].abs() < 1e-12);
        assert_eq!(lp[[2]], f64::NEG_INFINITY);
    }

    #[test]
    fn test_binomial_approx_support_and_mean() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let d = BinomialApprox::new(scalar(200.0), scalar(0.3), None).unwrap();
        let x = d.sample(&mut rng, &[5000]).unwrap();
        assert!(x.iter().all(|v| *v > 0.0 && *v < 200.0));
        assert!((x.mean().unwrap() - 60.0).abs() < 1.0);
        assert_eq!(item(&d.log_prob(&scalar(250.0)).unwrap()), f64::NEG_INFINITY);
    }

    #[test]
    fn test_binomial_approx_overdispersion() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let tight = BinomialApprox::new(scalar(1000.0), scalar(0.5), None).unwrap();
        let loose = BinomialApprox::new(scalar(1000.0), scalar(0.5), Some(scalar(10.0))).unwrap();
        let var = |x: ArrayD<f64>| x.var(0.0);
        let v_tight = var(tight.sample(&mut rng, &[4000]).unwrap());
        let v_loose = var(loose.sample(&mut rng, &[4000]).unwrap());
        assert!(v_loose > 10.0 * v_tight);
    }

    #[test]
    fn test_random_walk_zero_scale_is_constant() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let d = ExponentialRandomWalk::new(scalar(0.7), 0.0, 0.0, 6).unwrap();
        let x = d.sample(&mut rng, &[]).unwrap();
        assert_eq!(x.shape(), &[6]);
        assert!(x.iter().all(|v| (*v - 0.7).abs() < 1e-12));
        // no innovation cost, only the exp Jacobian at each step
        let lp = item(&d.log_prob(&x).unwrap());
        assert!((lp - (-6.0 * 0.7f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_random_walk_drift_without_noise() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let d = ExponentialRandomWalk::new(scalar(1.0), 0.0, 0.1, 4).unwrap();
        let x = d.sample(&mut rng, &[]).unwrap();
        for t in 0..4 {
            assert!((x[[t]] - (0.1 * t as f64).exp()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_random_walk_batched_loc() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let loc = array![[0.5], [2.0]].into_dyn();
        let d = ExponentialRandomWalk::new(loc, 0.1, 0.0, 10).unwrap();
        assert_eq!(d.batch_shape(), vec![2]);
        let x = d.sample(&mut rng, &[2]).unwrap();
        assert_eq!(x.shape(), &[2, 10]);
        assert!(x.iter().all(|v| *v > 0.0));
        let lp = d.log_prob(&x).unwrap();
        assert_eq!(lp.shape(), &[2]);
        assert!(lp.iter().all(|v| v.is_finite()));
        assert!(d.log_prob(&ndarray::Array2::<f64>::ones((2, 9)).into_dyn()).is_err());
    }

    #[test]
    fn test_random_walk_log_prob_single_step() {
        // One step: x_0 = loc · exp(eps), eps ~ N(0, s)
        let d = ExponentialRandomWalk::new(scalar(2.0), 0.5, 0.0, 1).unwrap();
        let x: f64 = 3.0;
        let expected = normal_density(0.0, 0.5).unwrap().ln_pdf((x / 2.0).ln()) - x.ln();
        let lp = item(&d.log_prob(&vector(vec![x])).unwrap());
        assert!((lp - expected).abs() < 1e-12);
    }
}
