use ndarray::{Array, Dimension};

use crate::error::{Error, Result};

/// Box shaped subset of R^n given by elementwise lower and upper bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    low: na::DVector<f64>,
    high: na::DVector<f64>,
}

impl BoxSpace {
    pub fn new(low: na::DVector<f64>, high: na::DVector<f64>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(Error::shape("space bounds", low.len(), high.len()));
        }
        if low.iter().zip(high.iter()).any(|(l, h)| l > h) {
            return Err(Error::InvalidArgument(
                "space lower bound exceeds upper bound".into(),
            ));
        }
        Ok(Self { low, high })
    }

    /// `[-bounds, bounds]`.
    pub fn symmetric(bounds: na::DVector<f64>) -> Self {
        let high = bounds.abs();
        Self { low: -&high, high }
    }

    /// Same bounds on every dimension.
    pub fn uniform(dim: usize, low: f64, high: f64) -> Result<Self> {
        Self::new(
            na::DVector::from_element(dim, low),
            na::DVector::from_element(dim, high),
        )
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &na::DVector<f64> {
        &self.low
    }

    pub fn high(&self) -> &na::DVector<f64> {
        &self.high
    }

    pub fn contains(&self, x: &na::DVector<f64>) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(v, (l, h))| *l <= *v && *v <= *h)
    }

    pub fn clip(&self, x: &na::DVector<f64>) -> na::DVector<f64> {
        na::DVector::from_fn(x.len(), |i, _| x[i].clamp(self.low[i], self.high[i]))
    }

    /// Clips an array in place, the last axis indexes the space dimension.
    pub fn clip_array<D: Dimension>(&self, x: &mut Array<f64, D>) {
        let dim = self.dim();
        for (i, v) in x.iter_mut().enumerate() {
            let k = i % dim;
            *v = v.clamp(self.low[k], self.high[k]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_inverted_bounds() {
        let low = na::dvector![0.0, 1.0];
        let high = na::dvector![1.0, 0.0];
        assert!(matches!(
            BoxSpace::new(low, high),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            BoxSpace::new(na::dvector![0.0], na::dvector![1.0, 2.0]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn clip_array_uses_last_axis() {
        let space = BoxSpace::new(na::dvector![-1.0, -10.0], na::dvector![1.0, 10.0]).unwrap();
        let mut x = array![[5.0, 5.0], [-5.0, -50.0], [0.5, 20.0]];
        space.clip_array(&mut x);
        assert_eq!(x, array![[1.0, 5.0], [-1.0, -10.0], [0.5, 10.0]]);
    }

    #[test]
    fn contains_and_clip() {
        let space = BoxSpace::uniform(1, -2.0, 2.0).unwrap();
        assert!(space.contains(&na::dvector![2.0]));
        assert!(!space.contains(&na::dvector![2.4]));
        assert_eq!(space.clip(&na::dvector![2.4]), na::dvector![2.0]);

        let space = BoxSpace::symmetric(na::dvector![f64::INFINITY, -8.0]);
        assert_eq!(space.low(), &na::dvector![f64::NEG_INFINITY, -8.0]);
        assert_eq!(space.high(), &na::dvector![f64::INFINITY, 8.0]);
    }
}
