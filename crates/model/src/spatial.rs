//! Convolutional builders.
//!
//! When `input_size` is known the builders walk the spatial extent through
//! every convolution and pooling step, so a configuration that would shrink an
//! axis below one pixel fails while the stack is assembled.

use candle_core::Device;
use layers::{
    Activation, BatchNorm, Conv2d, Conv2dConfig, Dropout, MaxPool2d, Parameters, Reshape, Result,
};

use crate::{
    config::{ConvBlockConfig, ConvNetworkConfig},
    sequential::Sequential,
};

struct ConvBlockLayers {
    dropout: Option<Dropout>,
    conv: Conv2d,
    norm: Option<BatchNorm>,
    pool: Option<MaxPool2d>,
}

impl ConvBlockLayers {
    fn new(config: &ConvBlockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dropout: (config.dropout_prob > 0.0)
                .then(|| Dropout::channelwise(config.dropout_prob))
                .transpose()?,
            conv: Conv2d::new(Conv2dConfig {
                in_channels: config.input_features,
                out_channels: config.output_features,
                kernel_size: config.kernel_size,
                stride: config.stride,
                padding: config.padding(),
            })?,
            norm: config
                .batch_normalization
                .then(|| BatchNorm::spatial(config.output_features))
                .transpose()?,
            pool: (config.pooling > 1)
                .then(|| MaxPool2d::new(config.pooling))
                .transpose()?,
        })
    }

    fn output_size(&self, size: (usize, usize)) -> Result<(usize, usize)> {
        let size = self.conv.output_size(size)?;
        match &self.pool {
            Some(pool) => pool.output_size(size),
            None => Ok(size),
        }
    }
}

/// Spatial extent after one block, or a config error if it collapses.
pub fn conv_block_output_size(config: &ConvBlockConfig, size: (usize, usize)) -> Result<(usize, usize)> {
    ConvBlockLayers::new(config)?.output_size(size)
}

/// Pushes the layers of one block onto a scratch stack.
fn push_conv_block(
    config: &ConvBlockConfig,
    stack: &mut Sequential,
    params: &mut Parameters,
    device: &Device,
) -> Result<()> {
    let layers = ConvBlockLayers::new(config)?;
    let factory = config.factory(device);

    if let Some(dropout) = layers.dropout {
        stack.push_stateless(dropout);
    }
    stack.push_parameterized(layers.conv, params, &factory)?;
    if let Some(norm) = layers.norm {
        stack.push_parameterized(norm, params, &factory)?;
    }
    if let Some(kind) = config.activation {
        stack.push_stateless(Activation::new(kind));
    }
    if let Some(pool) = layers.pool {
        stack.push_stateless(pool);
    }
    Ok(())
}

pub fn conv_block(config: &ConvBlockConfig, device: &Device) -> Result<(Sequential, Parameters)> {
    let mut stack = Sequential::new();
    let mut params = Parameters::new();
    push_conv_block(config, &mut stack, &mut params, device)?;
    Ok((stack, params))
}

/// Appends one convolutional block. On error neither `stack` nor `params` is
/// modified.
pub fn append_conv_block(
    config: &ConvBlockConfig,
    stack: &mut Sequential,
    params: &mut Parameters,
    device: &Device,
) -> Result<()> {
    let (block, block_params) = conv_block(config, device)?;
    stack.splice(block, params, block_params);
    Ok(())
}

pub fn conv_network(config: &ConvNetworkConfig, device: &Device) -> Result<(Sequential, Parameters)> {
    let blocks = config.blocks()?;
    let spatial = Reshape::spatial(config.input_features)?;
    if let Some(mut size) = config.input_size {
        for block in &blocks {
            size = conv_block_output_size(block, size)?;
        }
        log::debug!("conv network output extent {size:?}");
    }

    let mut stack = Sequential::new();
    let mut params = Parameters::new();
    stack.push_stateless(spatial);
    for block in &blocks {
        push_conv_block(block, &mut stack, &mut params, device)?;
    }
    log::info!(
        "conv network {} -> {:?}: {} layers, {} blocks, {} parameters",
        config.input_features,
        config.hidden_features,
        stack.len(),
        params.len(),
        params.num_elements()
    );
    Ok((stack, params))
}

/// Appends a whole convolutional network. On error neither `stack` nor
/// `params` is modified.
pub fn append_conv_network(
    config: &ConvNetworkConfig,
    stack: &mut Sequential,
    params: &mut Parameters,
    device: &Device,
) -> Result<()> {
    let (network, network_params) = conv_network(config, device)?;
    stack.splice(network, params, network_params);
    Ok(())
}
