use core::fmt;
use core::str::FromStr;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{Error, Result};
use crate::gaussian::GaussianSampler;
use crate::model::{ForwardModel, ParamSet, Uncertainty};
use crate::space::BoxSpace;
use crate::ukf::SigmaPointTransform;

/// Batched cost, one row of the input per returned entry.
pub type CostFn = Box<dyn Fn(ArrayView2<f64>) -> Array1<f64> + Send + Sync>;

/// Instantaneous and terminal cost. A missing function contributes zero.
pub struct Costs {
    pub inst: Option<CostFn>,
    pub term: Option<CostFn>,
}

impl Costs {
    pub fn new<I, T>(inst: I, term: T) -> Self
    where
        I: Fn(ArrayView2<f64>) -> Array1<f64> + Send + Sync + 'static,
        T: Fn(ArrayView2<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            inst: Some(Box::new(inst)),
            term: Some(Box::new(term)),
        }
    }

    pub fn inst<I>(inst: I) -> Self
    where
        I: Fn(ArrayView2<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            inst: Some(Box::new(inst)),
            term: None,
        }
    }

    pub fn term<T>(term: T) -> Self
    where
        T: Fn(ArrayView2<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            inst: None,
            term: Some(Box::new(term)),
        }
    }
}

/// How the uncertain model parameters enter the rollouts.
pub enum ParamsSampling {
    /// Model defaults (or the distribution mean).
    None,
    /// One sample shared by all trajectories.
    Single,
    /// One sample per trajectory.
    Extended,
    /// Sigma points of the parameter distribution instead of random samples.
    Transform(Box<dyn SigmaPointTransform + Send + Sync>),
}

impl ParamsSampling {
    pub fn transform<T: SigmaPointTransform + Send + Sync + 'static>(tf: T) -> Self {
        Self::Transform(Box::new(tf))
    }

    fn sample_shape(&self, n_samples: usize) -> Option<usize> {
        match self {
            Self::Single => Some(1),
            Self::Extended => Some(n_samples),
            Self::None | Self::Transform(_) => None,
        }
    }
}

impl Default for ParamsSampling {
    fn default() -> Self {
        Self::Extended
    }
}

impl fmt::Display for ParamsSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Single => f.write_str("single"),
            Self::Extended => f.write_str("extended"),
            Self::Transform(_) => f.write_str("transform"),
        }
    }
}

impl fmt::Debug for ParamsSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform(tf) => write!(f, "Transform(pts = {})", tf.pts()),
            other => write!(f, "{other}"),
        }
    }
}

impl FromStr for ParamsSampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(Self::None),
            "single" => Ok(Self::Single),
            "extended" => Ok(Self::Extended),
            other => Err(Error::InvalidSampling(other.to_owned())),
        }
    }
}

#[derive(Debug)]
pub struct AmppiConfig {
    /// Number of time steps in the control horizon.
    pub horizon: usize,
    pub n_samples: usize,
    /// Temperature of the exponential weighting.
    pub lambda: f64,
    /// Exploration noise covariance, identity when `None`.
    pub noise_cov: Option<na::DMatrix<f64>>,
    pub params_sampling: ParamsSampling,
    /// Rejection bounds for sampled parameters, same for every dimension.
    pub params_bounds: (f64, f64),
    /// Initial nominal sequence (`horizon x dim_a`), zeros when `None`.
    pub init_actions: Option<Array2<f64>>,
}

impl Default for AmppiConfig {
    fn default() -> Self {
        Self {
            horizon: 15,
            n_samples: 100,
            lambda: 1.0,
            noise_cov: None,
            params_sampling: ParamsSampling::default(),
            params_bounds: (f64::NEG_INFINITY, f64::INFINITY),
            init_actions: None,
        }
    }
}

/// Rollouts and weights of a successful update.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Expected cost under the importance weights.
    pub cost: f64,
    /// `rows x (horizon + 1) x dim_s`, `rows = n_samples * pts` ordered by
    /// sample first, sigma point second.
    pub states: Array3<f64>,
    /// `n_samples x horizon x dim_a`.
    pub actions: Array3<f64>,
    /// One weight per sample, non-finite where the cost was non-finite.
    pub weights: Array1<f64>,
    /// Sigma points per sample, 1 without the unscented transform.
    pub pts: usize,
}

impl Plan {
    /// States as `n_samples x pts x (horizon + 1) x dim_s`.
    pub fn states_by_sample(&self) -> Result<ArrayView4<'_, f64>> {
        let (rows, len, dim) = self.states.dim();
        Ok(self
            .states
            .view()
            .into_shape((rows / self.pts, self.pts, len, dim))?)
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Planned(Plan),
    /// Every rollout had a non-finite cost; the nominal sequence is unchanged.
    Infeasible,
}

impl Outcome {
    pub fn cost(&self) -> f64 {
        match self {
            Self::Planned(plan) => plan.cost,
            Self::Infeasible => f64::INFINITY,
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            Self::Planned(plan) => Some(plan),
            Self::Infeasible => None,
        }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self, Self::Planned(_))
    }
}

/// Free-energy weights of a cost vector.
#[derive(Debug, Clone)]
pub struct Weights {
    /// Minimum finite cost.
    pub beta: f64,
    /// Partition constant over the finite costs.
    pub eta: f64,
    pub omega: Array1<f64>,
}

/// `omega = exp(-(c - beta) / lambda) / eta`, or `None` if no cost is finite.
pub fn importance_weights(costs: ArrayView1<f64>, lambda: f64) -> Option<Weights> {
    let beta = costs
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .reduce(f64::min)?;
    let eta: f64 = costs
        .iter()
        .filter(|c| c.is_finite())
        .map(|c| (-(c - beta) / lambda).exp())
        .sum();
    let omega = costs.mapv(|c| (-(c - beta) / lambda).exp() / eta);
    Some(Weights { beta, eta, omega })
}

/// `lambda * trace(U Σ⁻¹ εᵢᵀ)` for every noise sample `εᵢ`.
pub fn control_costs(
    a_seq: ArrayView2<f64>,
    a_pre: ArrayView2<f64>,
    eps: ArrayView3<f64>,
    lambda: f64,
) -> Result<Array1<f64>> {
    let (n, h, a) = eps.dim();
    // the trace only needs the diagonal, so flatten the horizon
    let m = a_seq.dot(&a_pre).into_shape(h * a)?;
    let eps = eps.into_shape((n, h * a))?;
    Ok(eps.dot(&m) * lambda)
}

// Information theoretic MPPI with optional unscented propagation of
// parameter uncertainty.
//
// Not thread safe: `update` mutates the nominal sequence, callers sharing a
// controller across threads must serialize the calls.
pub struct Amppi<R = Xoshiro256PlusPlus> {
    rng: R,
    horizon: usize,
    n_samples: usize,
    lambda: f64,
    dim_s: usize,
    dim_a: usize,
    noise: GaussianSampler,
    a_pre: Array2<f64>,
    a_seq: Array2<f64>,
    action_space: BoxSpace,
    costs: Costs,
    params_sampling: ParamsSampling,
    params_bounds: (f64, f64),
}

impl Amppi<Xoshiro256PlusPlus> {
    pub fn new(
        config: AmppiConfig,
        observation_space: &BoxSpace,
        action_space: BoxSpace,
        costs: Costs,
    ) -> Result<Self> {
        let rng = Xoshiro256PlusPlus::from_entropy();
        Self::with_rng(config, observation_space, action_space, costs, rng)
    }
}

impl<R: rand::Rng> Amppi<R> {
    pub fn with_rng(
        config: AmppiConfig,
        observation_space: &BoxSpace,
        action_space: BoxSpace,
        costs: Costs,
        rng: R,
    ) -> Result<Self> {
        let AmppiConfig {
            horizon,
            n_samples,
            lambda,
            noise_cov,
            params_sampling,
            params_bounds,
            init_actions,
        } = config;
        if horizon == 0 || n_samples == 0 {
            return Err(Error::InvalidArgument(
                "horizon and n_samples must be positive".into(),
            ));
        }
        if !(lambda > 0.0 && lambda.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "lambda must be positive and finite, got {lambda}"
            )));
        }
        if costs.inst.is_none() && costs.term.is_none() {
            return Err(Error::MissingCostFunction);
        }
        if !(params_bounds.0 < params_bounds.1) {
            return Err(Error::InvalidArgument(format!(
                "empty parameter bounds {params_bounds:?}"
            )));
        }

        let dim_s = observation_space.dim();
        let dim_a = action_space.dim();
        let cov = noise_cov.unwrap_or_else(|| na::DMatrix::identity(dim_a, dim_a));
        if cov.shape() != (dim_a, dim_a) {
            return Err(Error::shape(
                "noise covariance",
                format!("{dim_a}x{dim_a}"),
                format!("{}x{}", cov.nrows(), cov.ncols()),
            ));
        }
        let noise = GaussianSampler::new(na::DVector::zeros(dim_a), &cov)?;
        let pre = cov
            .cholesky()
            .ok_or(Error::NotPositiveDefinite)?
            .inverse();
        let a_pre = Array2::from_shape_fn((dim_a, dim_a), |(i, j)| pre[(i, j)]);

        let a_seq = match init_actions {
            Some(a) if a.dim() != (horizon, dim_a) => {
                return Err(Error::shape(
                    "initial actions",
                    format!("{horizon}x{dim_a}"),
                    format!("{}x{}", a.nrows(), a.ncols()),
                ));
            }
            Some(a) => a,
            None => Array2::zeros((horizon, dim_a)),
        };

        Ok(Self {
            rng,
            horizon,
            n_samples,
            lambda,
            dim_s,
            dim_a,
            noise,
            a_pre,
            a_seq,
            action_space,
            costs,
            params_sampling,
            params_bounds,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn params_sampling(&self) -> &ParamsSampling {
        &self.params_sampling
    }

    pub fn noise_precision(&self) -> ArrayView2<f64> {
        self.a_pre.view()
    }

    /// Current nominal action sequence, `horizon x dim_a`.
    pub fn actions(&self) -> ArrayView2<f64> {
        self.a_seq.view()
    }

    /// Plans from `state` and updates the nominal action sequence.
    pub fn update<M: ForwardModel + ?Sized>(
        &mut self,
        model: &M,
        state: ArrayView1<f64>,
    ) -> Result<Outcome> {
        if model.dim_state() != self.dim_s || model.dim_action() != self.dim_a {
            return Err(Error::shape(
                "model state/action dimensions",
                format!("{}/{}", self.dim_s, self.dim_a),
                format!("{}/{}", model.dim_state(), model.dim_action()),
            ));
        }
        if state.len() != self.dim_s {
            return Err(Error::shape("initial state", self.dim_s, state.len()));
        }

        // eps shape is `n_samples` x `horizon` x `dim_a`
        let eps = self.sample_noise();
        let actions = &eps + &self.a_seq;
        let (states, pts) = match &self.params_sampling {
            ParamsSampling::Transform(tf) => {
                let uncertainty = model.uncertainty().ok_or(Error::MissingUncertainty)?;
                let (acts_sp, params) = expand_sigma_points(uncertainty, tf.as_ref(), actions.view())?;
                let states = rollout(model, state, acts_sp.view(), Some(&params))?;
                (states, tf.pts())
            }
            mode => {
                let params = match mode.sample_shape(self.n_samples) {
                    Some(n) => {
                        let uncertainty = model.uncertainty().ok_or(Error::MissingUncertainty)?;
                        let (lo, hi) = self.params_bounds;
                        Some(uncertainty.sample_params(n, lo, hi, &mut self.rng)?)
                    }
                    None => None,
                };
                (rollout(model, state, actions.view(), params.as_ref())?, 1)
            }
        };
        let costs = self.compute_cost(states.view(), eps.view(), pts)?;
        self.reweight(costs, eps, states, actions, pts)
    }

    /// Runs `update`, then returns the first planned action and shifts the
    /// nominal sequence one step forward.
    pub fn step<M: ForwardModel + ?Sized>(
        &mut self,
        model: &M,
        state: ArrayView1<f64>,
    ) -> Result<(Array1<f64>, Outcome)> {
        let outcome = self.update(model, state)?;
        let action = self.a_seq.row(0).to_owned();
        let tail = self.a_seq.slice(s![1.., ..]).to_owned();
        self.a_seq.slice_mut(s![..-1, ..]).assign(&tail);
        self.a_seq.row_mut(self.horizon - 1).fill(0.0);
        self.action_space.clip_array(&mut self.a_seq);
        Ok((action, outcome))
    }

    fn sample_noise(&mut self) -> Array3<f64> {
        let mut eps = Array3::zeros((self.n_samples, self.horizon, self.dim_a));
        for mut lane in eps.lanes_mut(Axis(2)) {
            let v = self.noise.sample(&mut self.rng);
            lane.iter_mut().zip(v.iter()).for_each(|(e, x)| *e = *x);
        }
        eps
    }

    fn compute_cost(&self, states: ArrayView3<f64>, eps: ArrayView3<f64>, pts: usize) -> Result<Array1<f64>> {
        let (rows, len, dim_s) = states.dim();
        let h = len - 1;

        let mut inst_costs = Array1::zeros(rows);
        if let Some(inst) = &self.costs.inst {
            let flat = Array2::from_shape_fn((rows * h, dim_s), |(r, j)| states[[r / h, 1 + r % h, j]]);
            let c = inst(flat.view());
            if c.len() != rows * h {
                return Err(Error::shape("instantaneous costs", rows * h, c.len()));
            }
            inst_costs = c.into_shape((rows, h))?.sum_axis(Axis(1));
        }
        let mut term_costs = Array1::zeros(rows);
        if let Some(term) = &self.costs.term {
            term_costs = term(states.index_axis(Axis(1), h));
            if term_costs.len() != rows {
                return Err(Error::shape("terminal costs", rows, term_costs.len()));
            }
        }
        if let ParamsSampling::Transform(tf) = &self.params_sampling {
            // expectation over sigma points
            let w = Array1::from_iter(tf.loc_weights().iter().copied());
            inst_costs = inst_costs.into_shape((rows / pts, pts))?.dot(&w);
            term_costs = term_costs.into_shape((rows / pts, pts))?.dot(&w);
        }

        let ctrl_costs = control_costs(self.a_seq.view(), self.a_pre.view(), eps, self.lambda)?;
        Ok(term_costs + inst_costs + ctrl_costs)
    }

    fn reweight(
        &mut self,
        costs: Array1<f64>,
        eps: Array3<f64>,
        states: Array3<f64>,
        actions: Array3<f64>,
        pts: usize,
    ) -> Result<Outcome> {
        let Some(Weights { beta, eta, omega }) = importance_weights(costs.view(), self.lambda) else {
            log::warn!("couldn't find a feasible control, keeping previously planned control actions");
            return Ok(Outcome::Infeasible);
        };
        let bounded = omega.mapv(|w| if w.is_finite() { w } else { 0.0 });
        let (n, h, a) = eps.dim();
        let delta = bounded.dot(&eps.into_shape((n, h * a))?).into_shape((h, a))?;
        self.a_seq += &delta;
        // the weighted noise can exceed the bounds
        self.action_space.clip_array(&mut self.a_seq);

        let cost: f64 = costs
            .iter()
            .zip(omega.iter())
            .filter(|(c, _)| c.is_finite())
            .map(|(c, w)| c * w)
            .sum();
        log::debug!("beta: {beta:.4}, eta: {eta:.4}, expected cost: {cost:.4}");
        Ok(Outcome::Planned(Plan {
            cost,
            states,
            actions,
            weights: omega,
            pts,
        }))
    }
}

/// Pairs every action sequence with every sigma point of the parameter
/// distribution. Row `i * pts + k` holds sequence `i` and sigma point `k`.
fn expand_sigma_points(
    uncertainty: &Uncertainty,
    tf: &(dyn SigmaPointTransform + Send + Sync),
    actions: ArrayView3<f64>,
) -> Result<(Array3<f64>, ParamSet)> {
    let (mean, cov) = uncertainty.dist().moments();
    let sigma = tf.compute_sigma_points(&mean, &cov)?;
    let pts = tf.pts();
    let (n, h, a) = actions.dim();
    let acts_sp = Array3::from_shape_fn((n * pts, h, a), |(r, t, j)| actions[[r / pts, t, j]]);
    let flat = na::DMatrix::from_fn(n * pts, sigma.nrows(), |r, d| sigma[(d, r % pts)]);
    let params = uncertainty.to_params_dict(&flat)?;
    Ok((acts_sp, params))
}

/// Rolls every row of `actions` out from `state`.
fn rollout<M: ForwardModel + ?Sized>(
    model: &M,
    state: ArrayView1<f64>,
    actions: ArrayView3<f64>,
    params: Option<&ParamSet>,
) -> Result<Array3<f64>> {
    let (rows, h, _) = actions.dim();
    let dim_s = state.len();
    let mut states = Array3::zeros((rows, h + 1, dim_s));
    states.slice_mut(s![.., 0, ..]).assign(&state);
    for t in 0..h {
        let next = model.step(states.slice(s![.., t, ..]), actions.slice(s![.., t, ..]), params);
        if next.dim() != (rows, dim_s) {
            return Err(Error::shape(
                "model step output",
                format!("{rows}x{dim_s}"),
                format!("{}x{}", next.nrows(), next.ncols()),
            ));
        }
        states.slice_mut(s![.., t + 1, ..]).assign(&next);
    }
    Ok(states)
}
