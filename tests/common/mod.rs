//! Shared models and controllers for the integration tests

#![allow(dead_code)]

use amppi::{Amppi, AmppiConfig, BoxSpace, Costs, ForwardModel, ParamSet, Uncertainty};
use ndarray::{Array1, Array2, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Scalar integrator with an additive drift parameter `k`:
/// `x' = x + u + k`, `k = 0` unless sampled.
#[derive(Debug, Clone, Default)]
pub struct DriftModel {
    pub uncertainty: Option<Uncertainty>,
}

impl DriftModel {
    pub fn with_uncertainty(uncertainty: Uncertainty) -> Self {
        Self {
            uncertainty: Some(uncertainty),
        }
    }
}

impl ForwardModel for DriftModel {
    fn dim_state(&self) -> usize {
        1
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
        Array2::from_shape_fn(states.raw_dim(), |(i, _)| {
            let k = params.and_then(|p| p.value("k", i)).unwrap_or(0.0);
            states[[i, 0]] + actions[[i, 0]] + k
        })
    }

    fn uncertainty(&self) -> Option<&Uncertainty> {
        self.uncertainty.as_ref()
    }
}

/// Diverges immediately.
#[derive(Debug, Clone, Default)]
pub struct DivergingModel;

impl ForwardModel for DivergingModel {
    fn dim_state(&self) -> usize {
        1
    }

    fn dim_action(&self) -> usize {
        1
    }

    fn step(
        &self,
        states: ArrayView2<f64>,
        _actions: ArrayView2<f64>,
        _params: Option<&ParamSet>,
    ) -> Array2<f64> {
        Array2::from_elem(states.raw_dim(), f64::NAN)
    }
}

pub fn first_column(x: ArrayView2<f64>) -> Array1<f64> {
    x.column(0).to_owned()
}

pub fn squared(x: ArrayView2<f64>) -> Array1<f64> {
    x.column(0).mapv(|v| v * v)
}

pub fn zero(x: ArrayView2<f64>) -> Array1<f64> {
    Array1::zeros(x.nrows())
}

/// Scalar controller with action bounds `[-bound, bound]` and a fixed seed.
pub fn make_controller(config: AmppiConfig, costs: Costs, bound: f64) -> Amppi {
    let obs = BoxSpace::uniform(1, f64::NEG_INFINITY, f64::INFINITY).unwrap();
    let act = BoxSpace::uniform(1, -bound, bound).unwrap();
    Amppi::with_rng(config, &obs, act, costs, Xoshiro256PlusPlus::seed_from_u64(42)).unwrap()
}
