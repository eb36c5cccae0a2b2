//! Primitive layers and parameter containers for composed Candle models.
//!
//! Every primitive here is either a stateless [`Transform`] or a
//! [`ParamTransform`] that receives its `W`/`b` tensors on each call. Parameter
//! storage lives in [`Parameters`], an ordered container of [`ParamBlock`]s
//! whose [`Var`](candle_core::Var)s are what an optimiser updates after
//! back-propagation.

pub mod activations;
pub mod checks;
pub mod conv;
pub mod dropout;
pub mod error;
pub mod linear;
pub mod norm;
pub mod params;
pub mod reshape;
pub mod transform;

pub use activations::{Activation, ActivationKind};
pub use conv::{Conv2d, Conv2dConfig, MaxPool2d};
pub use dropout::Dropout;
pub use error::{LayerError, Result};
pub use linear::Linear;
pub use norm::BatchNorm;
pub use params::{BlockFactory, ParamBlock, ParamDType, ParamInit, Parameters, SlotFill, SlotSpec};
pub use reshape::Reshape;
pub use transform::{ParamTransform, Transform};
