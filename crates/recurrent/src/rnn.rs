//! Plain recurrent unit.
//!
//! For an input `(batch, time, in)` the engine unrolls
//!
//! ```text
//! h[1] = tanh(x[1]·Wx + bx + bh)
//! h[t] = tanh(x[t]·Wx + bx + h[t-1]·Wh + bh)
//! ```
//!
//! with `bx`/`bh` stored as `(1, H)` rows expanded over the batch. The unit
//! owns one block in a [`Parameters`] container and reads it on every call.

use candle_core::{Device, Tensor};
use layers::{Parameters, Result};

use crate::{
    config::RecurrentConfig,
    sequence::{self, RecurrentWeights},
};

#[derive(Debug, Clone)]
pub struct RecurrentNetwork {
    config: RecurrentConfig,
    slot: usize,
}

impl RecurrentNetwork {
    /// Registers a zero-initialised block in `params` and returns the engine bound to it.
    pub fn build(config: RecurrentConfig, params: &mut Parameters, device: &Device) -> Result<Self> {
        config.validate()?;
        let block = config.factory(device).create("Recurrent", &config.slots(1))?;
        let slot = params.push(block);
        log::debug!(
            "recurrent unit {} -> {} (block {slot})",
            config.input_features,
            config.hidden_features
        );
        Ok(Self { config, slot })
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }

    /// Index of the owned block.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn forward(&self, params: &Parameters, input: &Tensor) -> Result<Tensor> {
        let hidden = self.config.hidden_features;
        let block = params.require(self.slot)?;
        let w = RecurrentWeights::from_block(
            block,
            self.slot,
            self.config.input_features,
            hidden,
            hidden,
        )?;
        let x = sequence::normalize_input(
            "rnn.input",
            input,
            self.config.input_features,
            w.wx.dtype(),
        )?;
        let (batch, steps, _) = x.dims3()?;
        let bx = w.bx.broadcast_as((batch, hidden))?;
        let bh = w.bh.broadcast_as((batch, hidden))?;

        let mut hs: Vec<Tensor> = Vec::with_capacity(steps);
        for t in 0..steps {
            let input_term = (sequence::step(&x, t)?.matmul(w.wx)? + &bx)?;
            let pre = match hs.last() {
                Some(prev) => ((input_term + prev.matmul(w.wh)?)? + &bh)?,
                None => (input_term + &bh)?,
            };
            hs.push(pre.tanh()?);
        }
        sequence::assemble(hs, self.config.output_type)
    }
}

/// Builds a plain recurrent unit with its own parameter container.
pub fn recurrent_network(config: RecurrentConfig, device: &Device) -> Result<(RecurrentNetwork, Parameters)> {
    let mut params = Parameters::new();
    let network = RecurrentNetwork::build(config, &mut params, device)?;
    Ok((network, params))
}
