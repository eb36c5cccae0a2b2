//! Batch normalisation for dense `(batch, features)` and spatial
//! `(batch, channels, height, width)` inputs.
//!
//! Statistics always come from the current batch. The layer keeps no running
//! averages, so a composed stack stays a pure function of `(parameters, input)`
//! and can be called from several threads at once. Statistics are computed in
//! at least `f32` and cast back to the input dtype.

use candle_core::{DType, Tensor};

use crate::{
    checks,
    error::Result,
    params::{SlotFill, SlotSpec},
    transform::ParamTransform,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNorm {
    features: usize,
    epsilon: f64,
    spatial: bool,
}

impl BatchNorm {
    pub fn new(features: usize) -> Result<Self> {
        checks::expect_positive("batch_normalization", features)?;
        Ok(Self {
            features,
            epsilon: 1e-5,
            spatial: false,
        })
    }

    /// Per-channel normalisation over batch, height and width.
    pub fn spatial(channels: usize) -> Result<Self> {
        Ok(Self {
            spatial: true,
            ..Self::new(channels)?
        })
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }
}

impl ParamTransform for BatchNorm {
    fn name(&self) -> &'static str {
        if self.spatial {
            "SpatialBatchNorm"
        } else {
            "BatchNorm"
        }
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::new("W", vec![self.features], SlotFill::Scale),
            SlotSpec::new("b", vec![self.features], SlotFill::Bias),
        ]
    }

    fn forward(&self, input: &Tensor, weight: &Tensor, bias: &Tensor, _train: bool) -> Result<Tensor> {
        let dtype = input.dtype();
        let compute = match dtype {
            DType::F16 | DType::BF16 => input.to_dtype(DType::F32)?,
            _ => input.clone(),
        };

        let (centered, variance, affine_shape) = if self.spatial {
            checks::expect_rank_in("batchnorm.input", input, &[4])?;
            checks::expect_dim("batchnorm.input", input, 1, self.features)?;
            let mean = compute.mean_keepdim((0, 2, 3))?;
            let centered = compute.broadcast_sub(&mean)?;
            let variance = centered.sqr()?.mean_keepdim((0, 2, 3))?;
            (centered, variance, vec![1, self.features, 1, 1])
        } else {
            checks::expect_rank_in("batchnorm.input", input, &[2])?;
            checks::expect_last_dim("batchnorm.input", input, self.features)?;
            let mean = compute.mean_keepdim(0)?;
            let centered = compute.broadcast_sub(&mean)?;
            let variance = centered.sqr()?.mean_keepdim(0)?;
            (centered, variance, vec![1, self.features])
        };

        let denom = (variance + self.epsilon)?.sqrt()?;
        let normalized = centered.broadcast_div(&denom)?.to_dtype(dtype)?;
        let weight = weight.reshape(affine_shape.as_slice())?;
        let bias = bias.reshape(affine_shape.as_slice())?;
        Ok(normalized.broadcast_mul(&weight)?.broadcast_add(&bias)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn max_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        Ok(a.sub(b)?.abs()?.max_all()?.to_vec0::<f32>()?)
    }

    #[test]
    fn dense_columns_are_standardised() -> Result<()> {
        let device = Device::Cpu;
        let norm = BatchNorm::new(2)?;
        let input = Tensor::from_slice(&[1.0f32, 10.0, 3.0, 20.0, 5.0, 30.0], (3, 2), &device)?;
        let weight = Tensor::ones(2, DType::F32, &device)?;
        let bias = Tensor::zeros(2, DType::F32, &device)?;
        let output = norm.forward(&input, &weight, &bias, true)?;

        let mean = output.mean(0)?.to_vec1::<f32>()?;
        let var = output.sqr()?.mean(0)?.to_vec1::<f32>()?;
        for (m, v) in mean.iter().zip(var.iter()) {
            assert!(m.abs() < 1e-5);
            assert!((v - 1.0).abs() < 1e-3);
        }
        Ok(())
    }

    #[test]
    fn zero_scale_reduces_to_bias() -> Result<()> {
        let device = Device::Cpu;
        let norm = BatchNorm::spatial(3)?;
        let input = Tensor::randn(0f32, 1.0, (2, 3, 4, 4), &device)?;
        let weight = Tensor::zeros(3, DType::F32, &device)?;
        let bias = Tensor::from_slice(&[0.5f32, -1.0, 2.0], (3,), &device)?;
        let output = norm.forward(&input, &weight, &bias, false)?;
        let expected = bias.reshape((1, 3, 1, 1))?.broadcast_as((2, 3, 4, 4))?;
        assert!(max_diff(&output, &expected)? < 1e-6);
        Ok(())
    }

    #[test]
    fn spatial_norm_checks_channels() -> Result<()> {
        let device = Device::Cpu;
        let norm = BatchNorm::spatial(3)?;
        let input = Tensor::zeros((2, 4, 4, 4), DType::F32, &device)?;
        let weight = Tensor::ones(3, DType::F32, &device)?;
        let bias = Tensor::zeros(3, DType::F32, &device)?;
        assert!(norm.forward(&input, &weight, &bias, false).is_err());
        Ok(())
    }
}
