use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;

use crate::error::{Error, Result};
use crate::gaussian::ParamsDist;

/// Named columns of sampled parameter values.
///
/// A column holds either one value shared by every trajectory or one value
/// per trajectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    columns: Vec<(String, Array1<f64>)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a column. A column must hold one value or as many
    /// values as the other per-trajectory columns.
    pub fn insert(&mut self, name: impl Into<String>, column: Array1<f64>) -> Result<()> {
        let name = name.into();
        let rows = self
            .columns
            .iter()
            .filter(|(k, _)| *k != name)
            .map(|(_, c)| c.len())
            .max()
            .unwrap_or(1);
        match column.len() {
            0 => return Err(Error::shape("parameter column", rows, 0)),
            n if n != 1 && rows != 1 && n != rows => {
                return Err(Error::shape("parameter column", rows, n));
            }
            _ => {}
        }
        match self.columns.iter_mut().find(|(k, _)| *k == name) {
            Some((_, c)) => *c = column,
            None => self.columns.push((name, column)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns.iter().find(|(k, _)| k == name).map(|(_, c)| c)
    }

    /// Value of `name` for trajectory `row`, broadcasting single-value columns.
    /// `None` for unknown names and rows past the end of the set.
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        let c = self.get(name)?;
        match c.len() {
            1 => Some(c[0]),
            _ => c.get(row).copied(),
        }
    }

    pub fn rows(&self) -> usize {
        self.columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.columns.iter().map(|(k, c)| (k.as_str(), c))
    }
}

/// Distribution over a model's uncertain parameters, keyed by name.
#[derive(Debug, Clone)]
pub struct Uncertainty {
    keys: Vec<String>,
    dist: ParamsDist,
    max_attempts: usize,
}

impl Uncertainty {
    pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>, dist: ParamsDist) -> Result<Self> {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        Self::check(&keys, &dist)?;
        Ok(Self {
            keys,
            dist,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Upper bound on rejection sampling rounds before giving up.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn check(keys: &[String], dist: &ParamsDist) -> Result<()> {
        if keys.len() != dist.dim() {
            return Err(Error::shape(
                "uncertain parameters vs distribution dimension",
                keys.len(),
                dist.dim(),
            ));
        }
        Ok(())
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn dist(&self) -> &ParamsDist {
        &self.dist
    }

    pub fn set_dist(&mut self, dist: ParamsDist) -> Result<()> {
        Self::check(&self.keys, &dist)?;
        self.dist = dist;
        Ok(())
    }

    /// Draws `n` samples lying strictly inside `(x_min, x_max)` in every
    /// coordinate. Returns the samples (one per row) and the number of rounds.
    pub fn rejection_sampling<R: Rng + ?Sized>(
        &self,
        n: usize,
        x_min: f64,
        x_max: f64,
        rng: &mut R,
    ) -> Result<(na::DMatrix<f64>, usize)> {
        let dim = self.keys.len();
        let mut accepted: Vec<na::DVector<f64>> = Vec::with_capacity(n);
        let mut attempts = 0;
        while accepted.len() < n {
            if attempts == self.max_attempts {
                return Err(Error::SamplingExhausted {
                    attempts,
                    accepted: accepted.len(),
                    requested: n,
                });
            }
            let batch = self.dist.sample_n(n - accepted.len(), rng)?;
            accepted.extend(
                batch
                    .row_iter()
                    .filter(|r| r.iter().all(|v| x_min < *v && *v < x_max))
                    .map(|r| r.transpose()),
            );
            attempts += 1;
        }
        log::trace!("rejection sampling: {n} samples in {attempts} attempts");
        let samples = na::DMatrix::from_fn(n, dim, |i, j| accepted[i][j]);
        Ok((samples, attempts))
    }

    pub fn sample_params<R: Rng + ?Sized>(
        &self,
        n: usize,
        x_min: f64,
        x_max: f64,
        rng: &mut R,
    ) -> Result<ParamSet> {
        if n == 0 {
            return Err(Error::InvalidArgument("need at least one parameter sample".into()));
        }
        let (samples, _) = self.rejection_sampling(n, x_min, x_max, rng)?;
        self.to_params_dict(&samples)
    }

    /// Splits a matrix with one parameter vector per row into named columns.
    pub fn to_params_dict(&self, params: &na::DMatrix<f64>) -> Result<ParamSet> {
        if params.ncols() != self.keys.len() {
            return Err(Error::shape("parameter columns", self.keys.len(), params.ncols()));
        }
        let mut set = ParamSet::new();
        for (j, key) in self.keys.iter().enumerate() {
            set.insert(key.clone(), params.column(j).iter().copied().collect())?;
        }
        Ok(set)
    }
}

/// Batched discrete-time dynamics, one trajectory per row.
///
/// Implementations hold no trajectory state between calls and clip actions
/// themselves when the physical system requires it.
pub trait ForwardModel {
    fn dim_state(&self) -> usize;

    fn dim_action(&self) -> usize;

    /// Next states for every row. Without `params` the model uses its
    /// default (or mean) parameter values.
    fn step(
        &self,
        states: ArrayView2<f64>,
        actions: ArrayView2<f64>,
        params: Option<&ParamSet>,
    ) -> Array2<f64>;

    /// Distribution over uncertain parameters, `None` for deterministic models.
    fn uncertainty(&self) -> Option<&Uncertainty> {
        None
    }
}
