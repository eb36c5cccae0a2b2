//! Dense affine projection.
//!
//! Inputs are `(batch, input_features)`; the weight is stored `(out, in)` as in
//! most checkpoint formats and transposed for the matmul, the bias is a
//! `(out,)` vector broadcast over the batch.

use candle_core::Tensor;

use crate::{
    checks,
    error::Result,
    params::{SlotFill, SlotSpec},
    transform::ParamTransform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    input_features: usize,
    output_features: usize,
}

impl Linear {
    pub fn new(input_features: usize, output_features: usize) -> Result<Self> {
        checks::expect_positive("input_features", input_features)?;
        checks::expect_positive("output_features", output_features)?;
        Ok(Self {
            input_features,
            output_features,
        })
    }

    pub fn input_features(&self) -> usize {
        self.input_features
    }

    pub fn output_features(&self) -> usize {
        self.output_features
    }
}

impl ParamTransform for Linear {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::new(
                "W",
                vec![self.output_features, self.input_features],
                SlotFill::Weight {
                    fan_in: self.input_features,
                    fan_out: self.output_features,
                },
            ),
            SlotSpec::new("b", vec![self.output_features], SlotFill::Bias),
        ]
    }

    fn forward(&self, input: &Tensor, weight: &Tensor, bias: &Tensor, _train: bool) -> Result<Tensor> {
        checks::expect_rank_in("linear.input", input, &[2])?;
        checks::expect_last_dim("linear.input", input, self.input_features)?;
        let output = input.matmul(&weight.t()?)?.broadcast_add(bias)?;
        Ok(output)
    }
}
