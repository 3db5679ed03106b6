//! Integration tests for unscented propagation of parameter uncertainty

extern crate nalgebra as na;

mod common;

use amppi::{
    AmppiConfig, BoxSpace, Costs, Error, ForwardModel, Gaussian, MerweScaled, ParamsDist,
    ParamsSampling, PendulumModel, SigmaPointTransform, Uncertainty,
};
use approx::assert_relative_eq;
use common::{first_column, make_controller, squared, DriftModel};
use ndarray::{array, Array1, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

const N: usize = 4;

fn transform_config(horizon: usize) -> AmppiConfig {
    AmppiConfig {
        horizon,
        n_samples: N,
        params_sampling: ParamsSampling::transform(MerweScaled::with_dim(1).unwrap()),
        ..Default::default()
    }
}

fn expected_sigma_points() -> Vec<f64> {
    let tf = MerweScaled::with_dim(1).unwrap();
    let sigma = tf
        .compute_sigma_points(&na::dvector![0.5], &na::dmatrix![0.04])
        .unwrap();
    sigma.iter().copied().collect()
}

fn check_expansion(dist: ParamsDist) {
    let model = DriftModel::with_uncertainty(Uncertainty::new(["k"], dist).unwrap());
    let mut mppi = make_controller(transform_config(1), Costs::term(first_column), 10.0);
    let outcome = mppi.update(&model, array![0.0].view()).unwrap();
    let plan = outcome.plan().unwrap();

    assert_eq!(plan.pts, 3);
    assert_eq!(plan.actions.dim(), (N, 1, 1));
    assert_eq!(plan.states.dim(), (N * 3, 2, 1));
    assert_eq!(plan.weights.len(), N);

    let sigma = expected_sigma_points();
    let by_sample = plan.states_by_sample().unwrap();
    for i in 0..N {
        for (k, s) in sigma.iter().enumerate() {
            let expected = plan.actions[[i, 0, 0]] + s;
            assert_relative_eq!(plan.states[[i * 3 + k, 1, 0]], expected, epsilon = 1e-12);
            assert_relative_eq!(by_sample[[i, k, 1, 0]], expected, epsilon = 1e-12);
            assert_eq!(by_sample[[i, k, 0, 0]], 0.0);
        }
    }
}

#[test]
fn full_covariance_expansion_order() {
    check_expansion(ParamsDist::full(na::dvector![0.5], na::dmatrix![0.04]).unwrap());
}

#[test]
fn diagonal_variance_expansion_order() {
    check_expansion(ParamsDist::diagonal(na::dvector![0.5], na::dvector![0.04]).unwrap());
}

#[test]
fn mixture_uses_the_dominant_component() {
    let minor = Gaussian::new(na::dvector![-3.0], na::dmatrix![1.0]).unwrap();
    let major = Gaussian::new(na::dvector![0.5], na::dmatrix![0.04]).unwrap();
    check_expansion(ParamsDist::mixture(na::dvector![0.2, 0.8], vec![minor, major]).unwrap());
}

#[test]
fn costs_are_sigma_weighted_expectations() {
    let dist = ParamsDist::full(na::dvector![0.5], na::dmatrix![0.04]).unwrap();
    let model = DriftModel::with_uncertainty(Uncertainty::new(["k"], dist).unwrap());
    let lambda = 0.7;
    let config = AmppiConfig {
        lambda,
        ..transform_config(1)
    };
    let mut mppi = make_controller(config, Costs::new(first_column, first_column), 10.0);
    let state = 0.25;
    let outcome = mppi.update(&model, array![state].view()).unwrap();
    let plan = outcome.plan().unwrap();

    // nominal sequence was zero, so there is no control cost and the sigma
    // points average back to the mean drift
    let costs: Vec<f64> = (0..N)
        .map(|i| 2.0 * (state + plan.actions[[i, 0, 0]] + 0.5))
        .collect();
    let beta = costs.iter().copied().fold(f64::INFINITY, f64::min);
    let eta: f64 = costs.iter().map(|c| (-(c - beta) / lambda).exp()).sum();
    for (w, c) in plan.weights.iter().zip(costs.iter()) {
        assert_relative_eq!(*w, (-(c - beta) / lambda).exp() / eta, epsilon = 1e-9);
    }
    let expected: f64 = costs.iter().zip(plan.weights.iter()).map(|(c, w)| c * w).sum();
    assert_relative_eq!(plan.cost, expected, epsilon = 1e-9);
    assert_relative_eq!(plan.weights.sum(), 1.0, epsilon = 1e-12);
}

#[test]
fn transform_requires_an_uncertain_model() {
    let mut mppi = make_controller(transform_config(2), Costs::term(first_column), 10.0);
    let result = mppi.update(&DriftModel::default(), array![0.0].view());
    assert!(matches!(result, Err(Error::MissingUncertainty)));
}

#[test]
fn transform_dimension_must_match_the_distribution() {
    let dist = ParamsDist::full(na::dvector![0.5], na::dmatrix![0.04]).unwrap();
    let model = DriftModel::with_uncertainty(Uncertainty::new(["k"], dist).unwrap());
    let config = AmppiConfig {
        params_sampling: ParamsSampling::transform(MerweScaled::with_dim(2).unwrap()),
        ..transform_config(2)
    };
    let mut mppi = make_controller(config, Costs::term(squared), 10.0);
    let result = mppi.update(&model, array![0.0].view());
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn pendulum_with_two_uncertain_parameters() {
    let dist = ParamsDist::full(
        na::dvector![1.0, 1.0],
        na::dmatrix![0.01, 0.002; 0.002, 0.02],
    )
    .unwrap();
    let model = PendulumModel::default()
        .with_uncertainty(Uncertainty::new(["mass", "length"], dist).unwrap())
        .unwrap();
    let config = AmppiConfig {
        horizon: 10,
        n_samples: 16,
        params_sampling: ParamsSampling::transform(MerweScaled::with_dim(2).unwrap()),
        ..Default::default()
    };
    let action_space = model.action_space().clone();
    let mut mppi = amppi::Amppi::with_rng(
        config,
        model.observation_space(),
        action_space,
        Costs::inst(|x: ArrayView2<f64>| {
            x.outer_iter()
                .map(|s| s[0].powi(2) + 0.1 * s[1].powi(2))
                .collect::<Array1<f64>>()
        }),
        Xoshiro256PlusPlus::seed_from_u64(1),
    )
    .unwrap();

    let outcome = mppi.update(&model, array![0.3, 0.0].view()).unwrap();
    let plan = outcome.plan().unwrap();
    assert_eq!(plan.states.dim(), (16 * 5, 11, model.dim_state()));
    assert_eq!(plan.states_by_sample().unwrap().dim(), (16, 5, 11, 2));
    assert!(plan.weights.iter().all(|w| w.is_finite()));
    assert!(mppi.actions().iter().all(|a| (-2.0..=2.0).contains(a)));
    assert_eq!(BoxSpace::uniform(1, -2.0, 2.0).unwrap(), *model.action_space());
}
