use crate::error::{Error, Result};

type Cov = na::DMatrix<f64>;
type Sigma = na::DMatrix<f64>;

/// Deterministic sampling of a Gaussian by a small set of weighted points.
pub trait SigmaPointTransform {
    /// Number of sigma points.
    fn pts(&self) -> usize;

    /// Weights for recombining a mean (or an expectation), summing to 1.
    fn loc_weights(&self) -> &na::DVector<f64>;

    /// Sigma points of `N(mean, cov)`, one per column.
    fn compute_sigma_points(&self, mean: &na::DVector<f64>, cov: &Cov) -> Result<Sigma>;
}

/// Scaled sigma points of Van der Merwe, `2n + 1` points for dimension `n`.
#[derive(Debug, Clone)]
pub struct MerweScaled {
    n: usize,
    alpha: f64,
    beta: f64,
    kappa: f64,
    wm: na::DVector<f64>,
    wc: na::DVector<f64>,
}

impl MerweScaled {
    pub fn new(n: usize, alpha: f64, beta: f64, kappa: f64) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidArgument("sigma point dimension must be positive".into()));
        }
        let c = alpha * alpha * (n as f64 + kappa);
        if !(c > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "alpha^2 (n + kappa) must be positive, got {c}"
            )));
        }
        let (wm, wc) = Self::sigma_weight(n, alpha, beta, c);
        Ok(Self {
            n,
            alpha,
            beta,
            kappa,
            wm,
            wc,
        })
    }

    /// α = 1, β = 2, κ = 3 − n.
    pub fn with_dim(n: usize) -> Result<Self> {
        Self::new(n, 1.0, 2.0, 3.0 - n as f64)
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    pub fn cov_weights(&self) -> &na::DVector<f64> {
        &self.wc
    }

    fn c(&self) -> f64 {
        self.alpha * self.alpha * (self.n as f64 + self.kappa)
    }

    fn sigma_weight(n: usize, alpha: f64, beta: f64, c: f64) -> (na::DVector<f64>, na::DVector<f64>) {
        let lambda = c - n as f64;
        let mut wm = na::DVector::from_element(2 * n + 1, 1.0 / (2.0 * c));
        let mut wc = na::DVector::from_element(2 * n + 1, 1.0 / (2.0 * c));
        wm[0] = lambda / c;
        wc[0] = lambda / c + 1.0 - alpha.powi(2) + beta;
        (wm, wc)
    }
}

impl SigmaPointTransform for MerweScaled {
    fn pts(&self) -> usize {
        2 * self.n + 1
    }

    fn loc_weights(&self) -> &na::DVector<f64> {
        &self.wm
    }

    fn compute_sigma_points(&self, x: &na::DVector<f64>, p: &Cov) -> Result<Sigma> {
        let n = self.n;
        if x.len() != n || p.shape() != (n, n) {
            return Err(Error::shape(
                "sigma point mean/covariance",
                format!("{n} / {n}x{n}"),
                format!("{} / {}x{}", x.len(), p.nrows(), p.ncols()),
            ));
        }
        // symmetric square root, stays defined for singular covariances
        let svd = (self.c() * p).svd_unordered(true, false);
        let s_sqrt = Cov::from_diagonal(&svd.singular_values.map(|s| s.sqrt()));
        let u = svd.u.ok_or(Error::NotPositiveDefinite)?;
        let l = u * s_sqrt;
        let mut sigma_points = Sigma::zeros(n, self.pts());
        sigma_points.set_column(0, x);
        for i in 0..n {
            sigma_points.set_column(1 + i, &(x + l.column(i)));
            sigma_points.set_column(1 + n + i, &(x - l.column(i)));
        }
        Ok(sigma_points)
    }
}

/// Weighted mean and covariance of a set of sigma points, plus additive noise.
pub fn unscented_transform(
    sigmas: &Sigma,
    wm: &na::DVector<f64>,
    wc: &na::DVector<f64>,
    noise: &Cov,
) -> (na::DVector<f64>, Cov) {
    let x = sigmas * wm;
    let mut p = noise.clone();
    for (i, col) in sigmas.column_iter().enumerate() {
        let y = col - &x;
        p += wc[i] * &y * y.transpose();
    }
    (x, p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn loc_weights_sum_to_one() {
        for n in 1..5 {
            let tf = MerweScaled::with_dim(n).unwrap();
            assert_eq!(tf.pts(), 2 * n + 1);
            assert_relative_eq!(tf.loc_weights().sum(), 1.0, epsilon = 1e-12);
        }
        let tf = MerweScaled::new(3, 1e-3, 2.0, 0.0).unwrap();
        assert_relative_eq!(tf.loc_weights().sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn recovers_mean_and_covariance() {
        let tf = MerweScaled::new(2, 0.5, 2.0, 1.0).unwrap();
        let mean = na::dvector![1.0, -2.0];
        let cov = na::dmatrix![0.4, 0.1; 0.1, 0.2];
        let sigmas = tf.compute_sigma_points(&mean, &cov).unwrap();
        assert_eq!(sigmas.shape(), (2, 5));
        assert_eq!(sigmas.column(0).into_owned(), mean);

        let (m, p) = unscented_transform(&sigmas, tf.loc_weights(), tf.loc_weights(), &Cov::zeros(2, 2));
        assert_relative_eq!(m, mean, epsilon = 1e-9);
        assert_relative_eq!(p, cov, epsilon = 1e-9);
    }

    #[test]
    fn singular_covariance_collapses_points() {
        let tf = MerweScaled::with_dim(2).unwrap();
        let mean = na::dvector![1.0, 3.0];
        let cov = na::dmatrix![0.0, 0.0; 0.0, 0.5];
        let sigmas = tf.compute_sigma_points(&mean, &cov).unwrap();
        for col in sigmas.column_iter() {
            assert_relative_eq!(col[0], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(MerweScaled::new(0, 1.0, 2.0, 0.0).is_err());
        assert!(MerweScaled::new(2, 1.0, 2.0, -2.0).is_err());
        let tf = MerweScaled::with_dim(2).unwrap();
        assert!(matches!(
            tf.compute_sigma_points(&na::dvector![0.0], &Cov::identity(2, 2)),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
