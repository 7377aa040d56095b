//! Broadcasting helpers over dynamic-dimension arrays.
//!
//! ndarray panics when binary operands cannot be co-broadcast; the model
//! code routes every mixed-shape operation through these helpers so a
//! mismatch surfaces as `Error::ShapeMismatch` at the offending operation.

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, IxDyn, Zip};

use crate::errors::*;

pub fn scalar(x: f64) -> ArrayD<f64> {
    ndarray::arr0(x).into_dyn()
}

pub fn vector(v: Vec<f64>) -> ArrayD<f64> {
    Array1::from(v).into_dyn()
}

/// The single value of a one-element array.
pub fn item(a: &ArrayD<f64>) -> f64 {
    a.iter().next().copied().unwrap_or(f64::NAN)
}

pub fn into_1d(context: &str, a: ArrayD<f64>) -> Result<Array1<f64>> {
    let shape = a.shape().to_vec();
    a.into_dimensionality().map_err(
        |_| Error::shape_mismatch(context, &shape, &[shape.iter().product::<usize>()])
    )
}

pub fn into_2d(context: &str, a: ArrayD<f64>) -> Result<Array2<f64>> {
    let shape = a.shape().to_vec();
    a.into_dimensionality().map_err(
        |_| Error::shape_mismatch(context, &shape, &[])
    )
}

pub fn broadcast_shape(context: &str, a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let n = a.len().max(b.len());
    let dim = |s: &[usize], i: usize| {
        if i < n - s.len() { 1 } else { s[i - (n - s.len())] }
    };
    let mut shape = Vec::with_capacity(n);
    for i in 0..n {
        let (da, db) = (dim(a, i), dim(b, i));
        if da == db || db == 1 {
            shape.push(da);
        }
        else if da == 1 {
            shape.push(db);
        }
        else {
            return Err(Error::shape_mismatch(context, a, b));
        }
    }
    Ok(shape)
}

pub fn broadcast_to<'a, T>(
    context: &str, a: &'a ArrayD<T>, shape: &[usize]
) -> Result<ArrayViewD<'a, T>> {
    a.broadcast(IxDyn(shape)).ok_or_else(
        || Error::shape_mismatch(context, a.shape(), shape)
    )
}

pub fn zip_map<F>(
    context: &str, a: &ArrayD<f64>, b: &ArrayD<f64>, f: F
) -> Result<ArrayD<f64>> where F: Fn(f64, f64) -> f64 {
    let shape = broadcast_shape(context, a.shape(), b.shape())?;
    let av = broadcast_to(context, a, &shape)?;
    let bv = broadcast_to(context, b, &shape)?;
    Ok(Zip::from(&av).and(&bv).map_collect(|&x, &y| f(x, y)))
}

pub fn add(context: &str, a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    zip_map(context, a, b, |x, y| x + y)
}

pub fn mul(context: &str, a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    zip_map(context, a, b, |x, y| x * y)
}

/// Checks that every entry satisfies `valid`, reporting the first offender.
pub fn check_all<F>(
    a: &ArrayD<f64>, distribution: &'static str, parameter: &'static str, valid: F
) -> Result<()> where F: Fn(f64) -> bool {
    match a.iter().find(|x| !valid(**x)) {
        Some(x) => Err(Error::InvalidParameter { distribution, parameter, value: *x }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_broadcast_shape() {
        assert_eq!(broadcast_shape("t", &[3, 1], &[4]).unwrap(), vec![3, 4]);
        assert_eq!(broadcast_shape("t", &[], &[2, 5]).unwrap(), vec![2, 5]);
        assert!(broadcast_shape("t", &[3], &[4]).is_err());
    }

    #[test]
    fn test_zip_map_broadcasts_column() {
        let a = array![[1.0], [2.0]].into_dyn();
        let b = array![10.0, 20.0, 30.0].into_dyn();
        let c = add("t", &a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c[[1, 2]], 32.0);
    }

    #[test]
    fn test_dimensionality_checked() {
        assert_eq!(into_1d("t", vector(vec![1.0, 2.0])).unwrap().len(), 2);
        assert!(into_1d("t", scalar(1.0)).is_err());
        assert!(into_2d("t", vector(vec![1.0])).is_err());
    }
}
