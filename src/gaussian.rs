use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Error, Result};

/// Multivariate normal distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    mean: na::DVector<f64>,
    covariance: na::DMatrix<f64>,
}

impl Gaussian {
    pub fn new(mean: na::DVector<f64>, covariance: na::DMatrix<f64>) -> Result<Self> {
        let n = mean.len();
        if covariance.shape() != (n, n) {
            return Err(Error::shape(
                "gaussian covariance",
                format!("{n}x{n}"),
                format!("{}x{}", covariance.nrows(), covariance.ncols()),
            ));
        }
        Ok(Self { mean, covariance })
    }

    /// Zero mean, identity covariance.
    pub fn standard(dim: usize) -> Self {
        Self {
            mean: na::DVector::zeros(dim),
            covariance: na::DMatrix::identity(dim, dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &na::DVector<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &na::DMatrix<f64> {
        &self.covariance
    }

    pub fn sampler(&self) -> Result<GaussianSampler> {
        GaussianSampler::new(self.mean.clone(), &self.covariance)
    }

    /// Normalized product of the two densities (fusion of two estimates).
    pub fn product(&self, rhs: &Gaussian) -> Result<Gaussian> {
        if self.dim() != rhs.dim() {
            return Err(Error::shape("gaussian product", self.dim(), rhs.dim()));
        }
        let s = (&self.covariance + &rhs.covariance)
            .cholesky()
            .ok_or(Error::NotPositiveDefinite)?;
        let mean = &self.mean + &self.covariance * s.solve(&(&rhs.mean - &self.mean));
        let cov = &self.covariance - &self.covariance * s.solve(&self.covariance);
        let covariance = (&cov + cov.transpose()) * 0.5;
        Ok(Gaussian { mean, covariance })
    }
}

/// Sum of independent random variables.
///
/// # Panics
/// If the dimensions differ.
impl core::ops::Add for Gaussian {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            mean: self.mean + rhs.mean,
            covariance: self.covariance + rhs.covariance,
        }
    }
}

/// Difference of independent random variables, the covariances add up.
///
/// # Panics
/// If the dimensions differ.
impl core::ops::Sub for Gaussian {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            mean: self.mean - rhs.mean,
            covariance: self.covariance + rhs.covariance,
        }
    }
}

/// `a X`
impl core::ops::Mul<f64> for Gaussian {
    type Output = Gaussian;

    fn mul(self, rhs: f64) -> Gaussian {
        Gaussian {
            mean: self.mean * rhs,
            covariance: self.covariance * (rhs * rhs),
        }
    }
}

/// Gaussian with a pre-factored covariance, `x = mean + L z` with `z ~ N(0, I)`.
#[derive(Debug, Clone)]
pub struct GaussianSampler {
    mean: na::DVector<f64>,
    l: na::DMatrix<f64>,
}

impl GaussianSampler {
    pub fn new(mean: na::DVector<f64>, covariance: &na::DMatrix<f64>) -> Result<Self> {
        let l = covariance
            .clone()
            .cholesky()
            .ok_or(Error::NotPositiveDefinite)?
            .unpack();
        Ok(Self { mean, l })
    }

    fn from_diagonal(mean: na::DVector<f64>, variance: &na::DVector<f64>) -> Self {
        let l = na::DMatrix::from_diagonal(&variance.map(f64::sqrt));
        Self { mean, l }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> na::DVector<f64> {
        let z = na::DVector::<f64>::from_fn(self.dim(), |_, _| StandardNormal.sample(rng));
        &self.mean + &self.l * z
    }
}

/// Gaussian with independent coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalGaussian {
    mean: na::DVector<f64>,
    variance: na::DVector<f64>,
}

impl DiagonalGaussian {
    pub fn new(mean: na::DVector<f64>, variance: na::DVector<f64>) -> Result<Self> {
        if mean.len() != variance.len() {
            return Err(Error::shape("diagonal variance", mean.len(), variance.len()));
        }
        if variance.iter().any(|v| !(*v >= 0.0 && v.is_finite())) {
            return Err(Error::InvalidArgument(
                "variances must be finite and non-negative".into(),
            ));
        }
        Ok(Self { mean, variance })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &na::DVector<f64> {
        &self.mean
    }

    pub fn variance(&self) -> &na::DVector<f64> {
        &self.variance
    }
}

/// Weighted mixture of Gaussians of equal dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    weights: na::DVector<f64>,
    components: Vec<Gaussian>,
}

impl GaussianMixture {
    /// Weights need not be normalized but must be non-negative with a
    /// positive sum, one per component.
    pub fn new(weights: na::DVector<f64>, components: Vec<Gaussian>) -> Result<Self> {
        let Some(first) = components.first() else {
            return Err(Error::InvalidMixture);
        };
        let dim = first.dim();
        if weights.len() != components.len()
            || components.iter().any(|c| c.dim() != dim)
            || weights.iter().any(|w| !(*w >= 0.0 && w.is_finite()))
            || !(weights.sum() > 0.0)
        {
            return Err(Error::InvalidMixture);
        }
        Ok(Self {
            weights,
            components,
        })
    }

    pub fn dim(&self) -> usize {
        self.dominant().dim()
    }

    pub fn weights(&self) -> &na::DVector<f64> {
        &self.weights
    }

    pub fn components(&self) -> &[Gaussian] {
        &self.components
    }

    /// Component with the highest weight, the first one on ties.
    pub fn dominant(&self) -> &Gaussian {
        &self.components[self.weights.imax()]
    }
}

/// Distribution over the uncertain parameters of a forward model.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamsDist {
    /// Gaussian with full covariance.
    Full(Gaussian),
    Diagonal(DiagonalGaussian),
    Mixture(GaussianMixture),
}

impl ParamsDist {
    pub fn full(mean: na::DVector<f64>, covariance: na::DMatrix<f64>) -> Result<Self> {
        Ok(Self::Full(Gaussian::new(mean, covariance)?))
    }

    pub fn diagonal(mean: na::DVector<f64>, variance: na::DVector<f64>) -> Result<Self> {
        Ok(Self::Diagonal(DiagonalGaussian::new(mean, variance)?))
    }

    pub fn mixture(weights: na::DVector<f64>, components: Vec<Gaussian>) -> Result<Self> {
        Ok(Self::Mixture(GaussianMixture::new(weights, components)?))
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::Full(g) => g.dim(),
            Self::Diagonal(d) => d.dim(),
            Self::Mixture(m) => m.dim(),
        }
    }

    /// Expected value of the distribution.
    pub fn mean(&self) -> na::DVector<f64> {
        match self {
            Self::Full(g) => g.mean.clone(),
            Self::Diagonal(d) => d.mean.clone(),
            Self::Mixture(m) => {
                let total = m.weights.sum();
                m.components
                    .iter()
                    .zip(m.weights.iter())
                    .fold(na::DVector::zeros(m.dim()), |acc, (c, w)| {
                        acc + &c.mean * (*w / total)
                    })
            }
        }
    }

    /// Mean and covariance used to place sigma points.
    ///
    /// A mixture is represented by its component with the highest weight.
    pub fn moments(&self) -> (na::DVector<f64>, na::DMatrix<f64>) {
        match self {
            Self::Full(g) => (g.mean.clone(), g.covariance.clone()),
            Self::Diagonal(d) => (d.mean.clone(), na::DMatrix::from_diagonal(&d.variance)),
            Self::Mixture(m) => {
                let c = m.dominant();
                (c.mean.clone(), c.covariance.clone())
            }
        }
    }

    /// Draws `n` joint samples, one per row.
    pub fn sample_n<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<na::DMatrix<f64>> {
        let mut out = na::DMatrix::zeros(n, self.dim());
        match self {
            Self::Full(g) => {
                let sampler = g.sampler()?;
                for i in 0..n {
                    out.row_mut(i).tr_copy_from(&sampler.sample(rng));
                }
            }
            Self::Diagonal(d) => {
                let sampler = GaussianSampler::from_diagonal(d.mean.clone(), &d.variance);
                for i in 0..n {
                    out.row_mut(i).tr_copy_from(&sampler.sample(rng));
                }
            }
            Self::Mixture(m) => {
                let index =
                    WeightedIndex::new(m.weights.iter()).map_err(|_| Error::InvalidMixture)?;
                let samplers = m
                    .components
                    .iter()
                    .map(Gaussian::sampler)
                    .collect::<Result<Vec<_>>>()?;
                for i in 0..n {
                    let k = index.sample(rng);
                    out.row_mut(i).tr_copy_from(&samplers[k].sample(rng));
                }
            }
        }
        Ok(out)
    }
}
