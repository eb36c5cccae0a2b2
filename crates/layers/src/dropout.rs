//! Inverted dropout.
//!
//! Dropout is the identity outside training mode and whenever the probability
//! is zero. In training mode kept activations are scaled by `1 / (1 - p)`.
//! The channel-wise variant drops whole feature maps of a
//! `(batch, channels, height, width)` input.

use candle_core::Tensor;

use crate::{checks, error::Result, transform::Transform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    probability: f32,
    channelwise: bool,
}

impl Dropout {
    pub fn new(probability: f32) -> Result<Self> {
        checks::expect_probability("dropout_prob", probability)?;
        Ok(Self {
            probability,
            channelwise: false,
        })
    }

    pub fn channelwise(probability: f32) -> Result<Self> {
        Ok(Self {
            channelwise: true,
            ..Self::new(probability)?
        })
    }

    pub fn probability(&self) -> f32 {
        self.probability
    }

    fn channel_mask(&self, input: &Tensor) -> Result<Tensor> {
        checks::expect_rank_in("dropout.input", input, &[4])?;
        let dims = input.dims();
        let keep = 1.0 - f64::from(self.probability);
        let draws = Tensor::rand(0f32, 1f32, (dims[0], dims[1], 1, 1), input.device())?;
        let mask = draws
            .ge(f64::from(self.probability))?
            .to_dtype(input.dtype())?
            .affine(1.0 / keep, 0.0)?;
        Ok(mask)
    }
}

impl Transform for Dropout {
    fn name(&self) -> &'static str {
        if self.channelwise {
            "SpatialDropout"
        } else {
            "Dropout"
        }
    }

    fn forward(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        if !train || self.probability == 0.0 {
            return Ok(input.clone());
        }
        if self.channelwise {
            let mask = self.channel_mask(input)?;
            Ok(input.broadcast_mul(&mask)?)
        } else {
            Ok(candle_nn::ops::dropout(input, self.probability)?)
        }
    }
}
