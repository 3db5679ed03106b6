extern crate nalgebra as na;

pub mod error;
pub mod gaussian;
pub mod model;
pub mod mppi;
pub mod pendulum;
pub mod space;
pub mod ukf;

pub use error::{Error, Result};
pub use gaussian::{DiagonalGaussian, Gaussian, GaussianMixture, ParamsDist};
pub use model::{ForwardModel, ParamSet, Uncertainty};
pub use mppi::{Amppi, AmppiConfig, Costs, Outcome, ParamsSampling, Plan};
pub use pendulum::PendulumModel;
pub use space::BoxSpace;
pub use ukf::{MerweScaled, SigmaPointTransform};
