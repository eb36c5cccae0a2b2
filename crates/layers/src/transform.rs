//! Primitive-layer contract consumed by the composition engine.
//!
//! A primitive is either stateless (`transform(input)`) or parameterized
//! (`transform(input, W, b)`). Parameterized primitives never own their
//! tensors: they declare the slots they need through [`ParamTransform::slots`]
//! and receive the live values on every call, which keeps the composed
//! function free of captured parameters.

use std::fmt;

use candle_core::Tensor;

use crate::{error::Result, params::SlotSpec};

/// Stateless transformation such as an activation, pooling or reshape.
pub trait Transform: fmt::Debug + Send + Sync {
    /// Short human readable name used in logs and block owners.
    fn name(&self) -> &'static str;

    /// Applies the transformation. `train` selects training behaviour for
    /// stochastic layers and is ignored by deterministic ones.
    fn forward(&self, input: &Tensor, train: bool) -> Result<Tensor>;
}

/// Transformation driven by a `W`/`b` parameter block.
pub trait ParamTransform: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Slots (and their shapes) the owning block must provide.
    fn slots(&self) -> Vec<SlotSpec>;

    fn forward(&self, input: &Tensor, weight: &Tensor, bias: &Tensor, train: bool)
        -> Result<Tensor>;
}
