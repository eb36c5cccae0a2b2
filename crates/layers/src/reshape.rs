//! Input-shape fixing steps placed at the head of a network.
//!
//! `Flatten` collapses everything after the batch axis into one feature axis
//! and checks the width; a rank-1 input is treated as a batch of one.
//! `Spatial` accepts `(channels, height, width)` or
//! `(batch, channels, height, width)` and checks the channel count.

use candle_core::Tensor;

use crate::{
    checks,
    error::{LayerError, Result},
    transform::Transform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reshape {
    Flatten { features: usize },
    Spatial { channels: usize },
}

impl Reshape {
    pub fn flatten(features: usize) -> Result<Self> {
        checks::expect_positive("input_features", features)?;
        Ok(Reshape::Flatten { features })
    }

    pub fn spatial(channels: usize) -> Result<Self> {
        checks::expect_positive("input_features", channels)?;
        Ok(Reshape::Spatial { channels })
    }
}

impl Transform for Reshape {
    fn name(&self) -> &'static str {
        match self {
            Reshape::Flatten { .. } => "Flatten",
            Reshape::Spatial { .. } => "SpatialInput",
        }
    }

    fn forward(&self, input: &Tensor, _train: bool) -> Result<Tensor> {
        match *self {
            Reshape::Flatten { features } => {
                let dims = input.dims();
                let (batch, width) = match dims {
                    [] => (1, 1),
                    [width] => (1, *width),
                    [batch, rest @ ..] => (*batch, rest.iter().product()),
                };
                if width != features {
                    return Err(LayerError::shape(
                        "flatten.input",
                        format!("{features} features per example"),
                        dims,
                    ));
                }
                Ok(input.reshape((batch, features))?)
            }
            Reshape::Spatial { channels } => {
                checks::expect_rank_in("spatial.input", input, &[3, 4])?;
                let input = if input.rank() == 3 {
                    input.unsqueeze(0)?
                } else {
                    input.clone()
                };
                checks::expect_dim("spatial.input", &input, 1, channels)?;
                Ok(input)
            }
        }
    }
}
