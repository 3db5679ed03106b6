use std::f64::consts::PI;

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::{ForwardModel, ParamSet, Uncertainty};
use crate::space::BoxSpace;

const MAX_SPEED: f64 = 8.0;
const MAX_TORQUE: f64 = 2.0;
const KEYS: [&str; 3] = ["g", "mass", "length"];

/// Fixed joint 1-DOF pendulum, state `[θ, θ̇]`, θ = 0 pointing up.
#[derive(Debug, Clone)]
pub struct PendulumModel {
    dt: f64,
    // g, mass, length
    defaults: [f64; 3],
    uncertainty: Option<Uncertainty>,
    observation_space: BoxSpace,
    action_space: BoxSpace,
}

impl PendulumModel {
    pub const DT: f64 = 0.05;

    pub fn new(dt: f64, g: f64, mass: f64, length: f64) -> Result<Self> {
        if !(dt > 0.0) {
            return Err(Error::InvalidArgument("dt must be greater than zero".into()));
        }
        Ok(Self::build(dt, [g, mass, length]))
    }

    fn build(dt: f64, defaults: [f64; 3]) -> Self {
        Self {
            dt,
            defaults,
            uncertainty: None,
            observation_space: BoxSpace::symmetric(na::dvector![f64::INFINITY, MAX_SPEED]),
            action_space: BoxSpace::symmetric(na::dvector![MAX_TORQUE]),
        }
    }

    /// Attaches a distribution over some of `g`, `mass` and `length`. The
    /// distribution mean replaces their default values.
    pub fn with_uncertainty(mut self, uncertainty: Uncertainty) -> Result<Self> {
        let mean = uncertainty.dist().mean();
        for (key, value) in uncertainty.keys().iter().zip(mean.iter()) {
            let idx = KEYS
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown pendulum parameter {key:?}")))?;
            self.defaults[idx] = *value;
        }
        self.uncertainty = Some(uncertainty);
        Ok(self)
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    /// `[cos θ, sin θ, θ̇]` for every row.
    pub fn observe(states: ArrayView2<f64>) -> Array2<f64> {
        let mut obs = Array2::zeros((states.nrows(), 3));
        for (s, mut o) in states.outer_iter().zip(obs.outer_iter_mut()) {
            o[0] = s[0].cos();
            o[1] = s[0].sin();
            o[2] = s[1];
        }
        obs
    }

    fn params_for(&self, params: Option<&ParamSet>, row: usize) -> [f64; 3] {
        let mut p = self.defaults;
        if let Some(params) = params {
            for (i, key) in KEYS.iter().enumerate() {
                if let Some(v) = params.value(key, row) {
                    p[i] = v;
                }
            }
        }
        p
    }
}

impl Default for PendulumModel {
    fn default() -> Self {
        Self::build(Self::DT, [9.8, 1.0, 1.0])
    }
}

impl ForwardModel for PendulumModel {
    fn dim_state(&self) -> usize {
        2
    }

    fn dim_action(&self) -> usize {
        1
    }

    fn step(
        &self,
        states: ArrayView2<f64>,
        actions: ArrayView2<f64>,
        params: Option<&ParamSet>,
    ) -> Array2<f64> {
        let dt = self.dt;
        let mut next = Array2::zeros(states.raw_dim());
        next.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut x)| {
                let [g, m, l] = self.params_for(params, i);
                let (theta, theta_d) = (states[[i, 0]], states[[i, 1]]);
                let u = actions[[i, 0]].clamp(-MAX_TORQUE, MAX_TORQUE);
                let theta_d =
                    theta_d + dt * (-3.0 * g / (2.0 * l) * (theta + PI).sin() + 3.0 / (m * l * l) * u);
                x[0] = theta + theta_d * dt;
                x[1] = theta_d.clamp(-MAX_SPEED, MAX_SPEED);
            });
        next
    }

    fn uncertainty(&self) -> Option<&Uncertainty> {
        self.uncertainty.as_ref()
    }
}
