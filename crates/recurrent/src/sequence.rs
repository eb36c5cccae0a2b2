//! Helpers shared by the unrolled engines: input normalisation, per-step
//! slicing, block lookup and output assembly.

use candle_core::Tensor;
use layers::{checks, LayerError, ParamBlock, Result};

use crate::config::OutputType;

/// Recurrent weights borrowed from a parameter block.
pub(crate) struct RecurrentWeights<'a> {
    pub wx: &'a Tensor,
    pub bx: &'a Tensor,
    pub wh: &'a Tensor,
    pub bh: &'a Tensor,
}

impl<'a> RecurrentWeights<'a> {
    pub fn from_block(
        block: &'a ParamBlock,
        index: usize,
        input: usize,
        width: usize,
        hidden: usize,
    ) -> Result<Self> {
        let weights = Self {
            wx: block.require(index, "Wx")?,
            bx: block.require(index, "bx")?,
            wh: block.require(index, "Wh")?,
            bh: block.require(index, "bh")?,
        };
        checks::expect_shape("recurrent.Wx", weights.wx, &[input, width])?;
        checks::expect_shape("recurrent.bx", weights.bx, &[1, width])?;
        checks::expect_shape("recurrent.Wh", weights.wh, &[hidden, width])?;
        checks::expect_shape("recurrent.bh", weights.bh, &[1, width])?;
        Ok(weights)
    }
}

/// Returns `(batch, time, features)`, inserting a batch axis of one for a
/// single `(time, features)` sequence.
pub(crate) fn normalize_input(
    context: &'static str,
    input: &Tensor,
    features: usize,
    dtype: candle_core::DType,
) -> Result<Tensor> {
    checks::expect_rank_in(context, input, &[2, 3])?;
    checks::expect_last_dim(context, input, features)?;
    let input = if input.rank() == 2 {
        log::debug!("{context}: treating {:?} as a batch of one", input.dims());
        input.unsqueeze(0)?
    } else {
        input.clone()
    };
    let (batch, steps, _) = input.dims3()?;
    if batch == 0 || steps == 0 {
        return Err(LayerError::shape(
            context,
            "non-empty batch and time axes",
            input.dims(),
        ));
    }
    Ok(input.to_dtype(dtype)?)
}

/// Input at timestep `t`, shaped `(batch, features)`.
pub(crate) fn step(input: &Tensor, t: usize) -> Result<Tensor> {
    Ok(input.narrow(1, t, 1)?.squeeze(1)?)
}

/// Final hidden state or all states stacked along a new time axis.
pub(crate) fn assemble(mut hs: Vec<Tensor>, output_type: OutputType) -> Result<Tensor> {
    match output_type {
        OutputType::Last => hs
            .pop()
            .ok_or_else(|| LayerError::shape("recurrent.output", "at least one timestep", &[])),
        OutputType::All => {
            let steps = hs
                .iter()
                .map(|h| {
                    let (batch, hidden) = h.dims2()?;
                    h.reshape((batch, 1, hidden))
                })
                .collect::<candle_core::Result<Vec<_>>>()?;
            Ok(Tensor::cat(&steps, 1)?)
        }
    }
}
