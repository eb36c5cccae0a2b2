//! Gated (LSTM-style) recurrent unit.
//!
//! The four gate projections are packed into one `(in, 4H)` / `(H, 4H)` matmul.
//! Each timestep's pre-activation is reshaped to `(batch, 4, H)` and split in
//! the fixed order of [`GATE_ORDER`]:
//!
//! ```text
//! sums[t] = x[t]·Wx + bx + h[t-1]·Wh + bh
//! i, f, o = sigmoid(sums[t][0..3]);  g = tanh(sums[t][3])
//! c[t]    = f ⊙ c[t-1] + i ⊙ g
//! h[t]    = o ⊙ tanh(c[t])
//! ```
//!
//! At `t = 1` the `h[t-1]·Wh + bh` term and the `f ⊙ c[t-1]` term are only
//! present when a previous [`LstmState`] is supplied. The state returned from
//! a call is detached from the autograd graph: it seeds a later, independent
//! call and must not keep this call's graph alive.

use candle_core::{DType, Device, Tensor};
use layers::{LayerError, Parameters, Result};

use crate::{
    config::RecurrentConfig,
    sequence::{self, RecurrentWeights},
};

/// Gate slots of the packed projection. Reordering changes which learned
/// weights act as which gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Input,
    Forget,
    Output,
    Candidate,
}

pub const GATE_ORDER: [Gate; 4] = [Gate::Input, Gate::Forget, Gate::Output, Gate::Candidate];

impl Gate {
    /// Position of this gate in the packed `4H` axis.
    pub fn index(self) -> usize {
        match self {
            Gate::Input => 0,
            Gate::Forget => 1,
            Gate::Output => 2,
            Gate::Candidate => 3,
        }
    }
}

/// Hidden and cell activations carried between calls.
#[derive(Debug, Clone)]
pub struct LstmState {
    pub h: Tensor,
    pub c: Tensor,
}

impl LstmState {
    /// Snapshots `h` and `c` without their gradient history.
    pub fn detached(h: &Tensor, c: &Tensor) -> Self {
        Self {
            h: h.detach(),
            c: c.detach(),
        }
    }

    pub fn zeros(batch: usize, hidden: usize, dtype: DType, device: &Device) -> Result<Self> {
        Ok(Self {
            h: Tensor::zeros((batch, hidden), dtype, device)?,
            c: Tensor::zeros((batch, hidden), dtype, device)?,
        })
    }

    fn validate(&self, batch: usize, hidden: usize) -> Result<()> {
        for (context, tensor) in [("lstm.state.h", &self.h), ("lstm.state.c", &self.c)] {
            if tensor.dims() != [batch, hidden] {
                return Err(LayerError::state(
                    context,
                    format!("[{batch}, {hidden}]"),
                    tensor.dims(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LstmNetwork {
    config: RecurrentConfig,
    slot: usize,
}

impl LstmNetwork {
    /// Registers a zero-initialised `4H`-wide block in `params`.
    pub fn build(config: RecurrentConfig, params: &mut Parameters, device: &Device) -> Result<Self> {
        config.validate()?;
        let block = config
            .factory(device)
            .create("Lstm", &config.slots(GATE_ORDER.len()))?;
        let slot = params.push(block);
        log::debug!(
            "lstm unit {} -> {} (block {slot})",
            config.input_features,
            config.hidden_features
        );
        Ok(Self { config, slot })
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Runs the unrolled recurrence and returns `(output, carried state)`.
    pub fn forward(
        &self,
        params: &Parameters,
        input: &Tensor,
        prev: Option<&LstmState>,
    ) -> Result<(Tensor, LstmState)> {
        let hidden = self.config.hidden_features;
        let width = GATE_ORDER.len() * hidden;
        let block = params.require(self.slot)?;
        let w = RecurrentWeights::from_block(
            block,
            self.slot,
            self.config.input_features,
            width,
            hidden,
        )?;
        let x = sequence::normalize_input(
            "lstm.input",
            input,
            self.config.input_features,
            w.wx.dtype(),
        )?;
        let (batch, steps, _) = x.dims3()?;
        if let Some(state) = prev {
            state.validate(batch, hidden)?;
        }
        let bx = w.bx.broadcast_as((batch, width))?;
        let bh = w.bh.broadcast_as((batch, width))?;

        let mut h_prev = prev.map(|state| state.h.clone());
        let mut c_prev = prev.map(|state| state.c.clone());
        let mut hs: Vec<Tensor> = Vec::with_capacity(steps);
        for t in 0..steps {
            let mut sums = (sequence::step(&x, t)?.matmul(w.wx)? + &bx)?;
            if let Some(h) = &h_prev {
                sums = ((sums + h.matmul(w.wh)?)? + &bh)?;
            }
            let gates = sums.reshape((batch, GATE_ORDER.len(), hidden))?;
            let gate = |gate: Gate| -> candle_core::Result<Tensor> {
                gates.narrow(1, gate.index(), 1)?.squeeze(1)
            };

            let input_gate = candle_nn::ops::sigmoid(&gate(Gate::Input)?)?;
            let forget_gate = candle_nn::ops::sigmoid(&gate(Gate::Forget)?)?;
            let output_gate = candle_nn::ops::sigmoid(&gate(Gate::Output)?)?;
            let candidate = gate(Gate::Candidate)?.tanh()?;

            let admitted = (&input_gate * &candidate)?;
            let c = match &c_prev {
                Some(c) => ((&forget_gate * c)? + admitted)?,
                None => admitted,
            };
            let h = (&output_gate * c.tanh()?)?;

            hs.push(h.clone());
            h_prev = Some(h);
            c_prev = Some(c);
        }

        let state = match (&h_prev, &c_prev) {
            (Some(h), Some(c)) => LstmState::detached(h, c),
            _ => {
                return Err(LayerError::shape(
                    "lstm.input",
                    "at least one timestep",
                    x.dims(),
                ))
            }
        };
        let output = sequence::assemble(hs, self.config.output_type)?;
        Ok((output, state))
    }
}

/// Builds a gated recurrent unit with its own parameter container.
pub fn lstm_network(config: RecurrentConfig, device: &Device) -> Result<(LstmNetwork, Parameters)> {
    let mut params = Parameters::new();
    let network = LstmNetwork::build(config, &mut params, device)?;
    Ok((network, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn gate_order_is_input_forget_output_candidate() {
        let indices: Vec<_> = GATE_ORDER.iter().map(|gate| gate.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn packed_bias_selects_gates_in_order() -> Result<()> {
        let device = Device::Cpu;
        let (lstm, params) = lstm_network(RecurrentConfig::new(1, 1), &device)?;
        // input, forget, output, candidate pre-activations
        let bx = [0.3f32, -2.0, 0.7, 0.4];
        params
            .require(0)?
            .get("bx")
            .unwrap()
            .set(&Tensor::from_slice(&bx, (1, 4), &device)?)?;

        let input = Tensor::zeros((1, 1), DType::F32, &device)?;
        let prev = LstmState {
            h: Tensor::zeros((1, 1), DType::F32, &device)?,
            c: Tensor::from_slice(&[1.5f32], (1, 1), &device)?,
        };
        let (h, state) = lstm.forward(&params, &input, Some(&prev))?;

        let c = sigmoid(-2.0) * 1.5 + sigmoid(0.3) * 0.4f32.tanh();
        let expected_h = sigmoid(0.7) * c.tanh();
        assert!((state.c.flatten_all()?.to_vec1::<f32>()?[0] - c).abs() < 1e-6);
        assert!((h.flatten_all()?.to_vec1::<f32>()?[0] - expected_h).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn mismatched_state_width_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let (lstm, params) = lstm_network(RecurrentConfig::new(2, 3), &device)?;
        let input = Tensor::zeros((4, 5, 2), DType::F32, &device)?;
        let prev = LstmState::zeros(4, 2, DType::F32, &device)?;
        assert!(matches!(
            lstm.forward(&params, &input, Some(&prev)),
            Err(LayerError::State { .. })
        ));
        let prev = LstmState::zeros(3, 3, DType::F32, &device)?;
        assert!(matches!(
            lstm.forward(&params, &input, Some(&prev)),
            Err(LayerError::State { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_block_is_reported() -> Result<()> {
        let device = Device::Cpu;
        let (lstm, _) = lstm_network(RecurrentConfig::new(2, 3), &device)?;
        let input = Tensor::zeros((1, 1, 2), DType::F32, &device)?;
        assert!(matches!(
            lstm.forward(&Parameters::new(), &input, None),
            Err(LayerError::MissingBlock(0))
        ));
        Ok(())
    }
}
