//! Feed-forward builders.

use candle_core::Device;
use layers::{Activation, BatchNorm, Dropout, Linear, Parameters, Reshape, Result};

use crate::{
    config::{DenseBlockConfig, DenseNetworkConfig},
    sequential::Sequential,
};

/// Pushes the layers of one block onto a scratch stack.
fn push_dense_block(
    config: &DenseBlockConfig,
    stack: &mut Sequential,
    params: &mut Parameters,
    device: &Device,
) -> Result<()> {
    config.validate()?;
    let dropout = (config.dropout_prob > 0.0)
        .then(|| Dropout::new(config.dropout_prob))
        .transpose()?;
    let linear = Linear::new(config.input_features, config.output_features)?;
    let norm = config
        .batch_normalization
        .then(|| BatchNorm::new(config.output_features))
        .transpose()?;
    let factory = config.factory(device);

    if let Some(dropout) = dropout {
        stack.push_stateless(dropout);
    }
    stack.push_parameterized(linear, params, &factory)?;
    if let Some(norm) = norm {
        stack.push_parameterized(norm, params, &factory)?;
    }
    if let Some(kind) = config.activation {
        stack.push_stateless(Activation::new(kind));
    }
    Ok(())
}

/// Builds a standalone dense block.
pub fn dense_block(config: &DenseBlockConfig, device: &Device) -> Result<(Sequential, Parameters)> {
    let mut stack = Sequential::new();
    let mut params = Parameters::new();
    push_dense_block(config, &mut stack, &mut params, device)?;
    Ok((stack, params))
}

/// Appends one dense block to an existing stack and container. On error
/// neither is modified.
pub fn append_dense_block(
    config: &DenseBlockConfig,
    stack: &mut Sequential,
    params: &mut Parameters,
    device: &Device,
) -> Result<()> {
    let (block, block_params) = dense_block(config, device)?;
    stack.splice(block, params, block_params);
    Ok(())
}

/// Builds a flatten step followed by one block per hidden width.
pub fn dense_network(config: &DenseNetworkConfig, device: &Device) -> Result<(Sequential, Parameters)> {
    let blocks = config.blocks()?;
    let mut stack = Sequential::new();
    let mut params = Parameters::new();
    stack.push_stateless(Reshape::flatten(config.input_features)?);
    for block in &blocks {
        push_dense_block(block, &mut stack, &mut params, device)?;
    }
    log::info!(
        "dense network {} -> {:?}: {} layers, {} blocks, {} parameters",
        config.input_features,
        config.hidden_features,
        stack.len(),
        params.len(),
        params.num_elements()
    );
    Ok((stack, params))
}

/// Appends a whole dense network to an existing stack and container. On
/// error neither is modified.
pub fn append_dense_network(
    config: &DenseNetworkConfig,
    stack: &mut Sequential,
    params: &mut Parameters,
    device: &Device,
) -> Result<()> {
    let (network, network_params) = dense_network(config, device)?;
    stack.splice(network, params, network_params);
    Ok(())
}
