//! Lightweight validation helpers shared across layer components.
//!
//! Construction-time helpers (`expect_positive`, `expect_probability`) return
//! [`LayerError::Config`] tagged with the option name; forward-time helpers
//! return [`LayerError::Shape`] so callers can propagate with `?` instead of
//! letting a mismatch surface deep inside a matmul.

use candle_core::Tensor;

use crate::error::{LayerError, Result};

/// Rejects zero sizes for feature, kernel, stride and pooling options.
pub fn expect_positive(option: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        Err(LayerError::config(option, "must be greater than zero"))
    } else {
        Ok(())
    }
}

/// Dropout style probabilities must lie in `[0, 1)`.
pub fn expect_probability(option: &'static str, p: f32) -> Result<()> {
    if (0.0..1.0).contains(&p) {
        Ok(())
    } else {
        Err(LayerError::config(
            option,
            format!("probability {p} outside [0, 1)"),
        ))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(context: &'static str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    if tensor.dims() == expected {
        Ok(())
    } else {
        Err(LayerError::shape(
            context,
            format!("{expected:?}"),
            tensor.dims(),
        ))
    }
}

/// Checks the tensor rank is one of `allowed`.
pub fn expect_rank_in(context: &'static str, tensor: &Tensor, allowed: &[usize]) -> Result<()> {
    if allowed.contains(&tensor.rank()) {
        Ok(())
    } else {
        Err(LayerError::shape(
            context,
            format!("rank in {allowed:?}"),
            tensor.dims(),
        ))
    }
}

/// Checks a single dimension size.
pub fn expect_dim(context: &'static str, tensor: &Tensor, dim: usize, size: usize) -> Result<()> {
    match tensor.dims().get(dim) {
        Some(&actual) if actual == size => Ok(()),
        _ => Err(LayerError::shape(
            context,
            format!("dim {dim} of size {size}"),
            tensor.dims(),
        )),
    }
}

/// Validates the trailing feature width.
pub fn expect_last_dim(context: &'static str, tensor: &Tensor, size: usize) -> Result<()> {
    match tensor.dims().last() {
        Some(&actual) if actual == size => Ok(()),
        _ => Err(LayerError::shape(
            context,
            format!("trailing dim {size}"),
            tensor.dims(),
        )),
    }
}
