//! Spatial convolution and max pooling over `(batch, channels, height, width)`.
//!
//! Both primitives expose the arithmetic for their output size so builders
//! can reject a stride or pooling factor that collapses a spatial dimension
//! while the stack is being assembled.

use candle_core::Tensor;

use crate::{
    checks,
    error::{LayerError, Result},
    params::{SlotFill, SlotSpec},
    transform::{ParamTransform, Transform},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

/// Square-kernel 2D convolution with a per-channel bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2d {
    config: Conv2dConfig,
}

impl Conv2d {
    pub fn new(config: Conv2dConfig) -> Result<Self> {
        checks::expect_positive("input_features", config.in_channels)?;
        checks::expect_positive("output_features", config.out_channels)?;
        checks::expect_positive("kernel_size", config.kernel_size)?;
        checks::expect_positive("stride", config.stride)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    /// Spatial size after this convolution, or a config error when the
    /// padded input is smaller than the kernel.
    pub fn output_size(&self, (height, width): (usize, usize)) -> Result<(usize, usize)> {
        let Conv2dConfig {
            kernel_size,
            stride,
            padding,
            ..
        } = self.config;
        let out = |extent: usize| {
            let padded = extent + 2 * padding;
            if padded < kernel_size {
                Err(LayerError::config(
                    "kernel_size",
                    format!("kernel {kernel_size} exceeds padded extent {padded}"),
                ))
            } else {
                Ok((padded - kernel_size) / stride + 1)
            }
        };
        Ok((out(height)?, out(width)?))
    }
}

impl ParamTransform for Conv2d {
    fn name(&self) -> &'static str {
        "Conv2d"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        let Conv2dConfig {
            in_channels,
            out_channels,
            kernel_size,
            ..
        } = self.config;
        let receptive = kernel_size * kernel_size;
        vec![
            SlotSpec::new(
                "W",
                vec![out_channels, in_channels, kernel_size, kernel_size],
                SlotFill::Weight {
                    fan_in: in_channels * receptive,
                    fan_out: out_channels * receptive,
                },
            ),
            SlotSpec::new("b", vec![out_channels], SlotFill::Bias),
        ]
    }

    fn forward(&self, input: &Tensor, weight: &Tensor, bias: &Tensor, _train: bool) -> Result<Tensor> {
        checks::expect_rank_in("conv2d.input", input, &[4])?;
        checks::expect_dim("conv2d.input", input, 1, self.config.in_channels)?;
        let dims = input.dims();
        self.output_size((dims[2], dims[3]))
            .map_err(|_| LayerError::shape("conv2d.input", "spatial extent >= kernel", dims))?;

        let output = input.conv2d(weight, self.config.padding, self.config.stride, 1, 1)?;
        let bias = bias.reshape((1, self.config.out_channels, 1, 1))?;
        Ok(output.broadcast_add(&bias)?)
    }
}

/// Non-overlapping max pooling (stride equals the window size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPool2d {
    size: usize,
}

impl MaxPool2d {
    pub fn new(size: usize) -> Result<Self> {
        checks::expect_positive("poolings", size)?;
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn output_size(&self, (height, width): (usize, usize)) -> Result<(usize, usize)> {
        if height < self.size || width < self.size {
            return Err(LayerError::config(
                "poolings",
                format!(
                    "pooling {} collapses spatial size {height}x{width}",
                    self.size
                ),
            ));
        }
        Ok((height / self.size, width / self.size))
    }
}

impl Transform for MaxPool2d {
    fn name(&self) -> &'static str {
        "MaxPool2d"
    }

    fn forward(&self, input: &Tensor, _train: bool) -> Result<Tensor> {
        checks::expect_rank_in("maxpool2d.input", input, &[4])?;
        let dims = input.dims();
        if dims[2] < self.size || dims[3] < self.size {
            return Err(LayerError::shape(
                "maxpool2d.input",
                format!("spatial extent >= {}", self.size),
                dims,
            ));
        }
        Ok(input.max_pool2d(self.size)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn conv(in_channels: usize, out_channels: usize, kernel_size: usize, stride: usize, padding: usize) -> Result<Conv2d> {
        Conv2d::new(Conv2dConfig {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        })
    }

    #[test]
    fn output_size_tracks_stride_and_padding() -> Result<()> {
        assert_eq!(conv(3, 8, 5, 1, 2)?.output_size((32, 32))?, (32, 32));
        assert_eq!(conv(3, 8, 3, 2, 0)?.output_size((9, 7))?, (4, 3));
        assert!(conv(3, 8, 5, 1, 0)?.output_size((4, 4)).is_err());
        assert!(conv(3, 8, 0, 1, 0).is_err());
        Ok(())
    }

    #[test]
    fn forward_produces_declared_shape() -> Result<()> {
        let device = Device::Cpu;
        let layer = conv(2, 4, 3, 1, 1)?;
        let weight = Tensor::ones((4, 2, 3, 3), DType::F32, &device)?;
        let bias = Tensor::from_slice(&[0.0f32, 1.0, 2.0, 3.0], (4,), &device)?;
        let input = Tensor::ones((1, 2, 5, 5), DType::F32, &device)?;
        let output = layer.forward(&input, &weight, &bias, false)?;
        assert_eq!(output.dims(), &[1, 4, 5, 5]);
        // centre pixel sees the full 2x3x3 window of ones
        let centre = output.get(0)?.get(3)?.get(2)?.get(2)?.to_vec0::<f32>()?;
        assert_eq!(centre, 18.0 + 3.0);
        Ok(())
    }

    #[test]
    fn pooling_rejects_collapse() -> Result<()> {
        let pool = MaxPool2d::new(4)?;
        assert_eq!(pool.output_size((8, 9))?, (2, 2));
        assert!(matches!(
            pool.output_size((3, 8)),
            Err(LayerError::Config { option: "poolings", .. })
        ));
        let input = Tensor::zeros((1, 1, 3, 3), DType::F32, &Device::Cpu)?;
        assert!(matches!(pool.forward(&input, false), Err(LayerError::Shape { .. })));
        Ok(())
    }
}
