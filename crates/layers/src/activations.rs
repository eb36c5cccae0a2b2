//! Closed catalogue of activation primitives.
//!
//! Activations are looked up by name exactly once, when a builder is
//! configured: [`ActivationKind::from_str`] accepts the canonical names
//! (`"ReLU"`, `"Tanh"`, `"Sigmoid"`, `"GELU"`, `"SiLU"`, `"ELU"`, `"SoftMax"`,
//! `"LogSoftMax"`, `"Identity"`; case-insensitive) and rejects anything else
//! with [`LayerError::UnknownActivation`]. Deserialisation goes through the same
//! parser, so a typo in a config file fails while parsing rather than at the
//! first forward call.
//!
//! # Built-in formulas
//!
//! * **GELU** uses the erf form `0.5 * x * (1 + erf(x / sqrt(2)))`.
//! * **SiLU** computes `x * sigmoid(x)`.
//! * **ELU** uses `alpha = 1`.
//! * **SoftMax** / **LogSoftMax** normalise along the last axis.

use std::{fmt, str::FromStr};

use candle_core::{Tensor, D};
use serde::{Deserialize, Deserializer};

use crate::{
    error::{LayerError, Result},
    transform::Transform,
};

/// Identifies which non-linearity an [`Activation`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationKind {
    Identity,
    Relu,
    Tanh,
    Sigmoid,
    Gelu,
    Silu,
    Elu,
    SoftMax,
    LogSoftMax,
}

impl ActivationKind {
    pub const ALL: [ActivationKind; 9] = [
        ActivationKind::Identity,
        ActivationKind::Relu,
        ActivationKind::Tanh,
        ActivationKind::Sigmoid,
        ActivationKind::Gelu,
        ActivationKind::Silu,
        ActivationKind::Elu,
        ActivationKind::SoftMax,
        ActivationKind::LogSoftMax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActivationKind::Identity => "Identity",
            ActivationKind::Relu => "ReLU",
            ActivationKind::Tanh => "Tanh",
            ActivationKind::Sigmoid => "Sigmoid",
            ActivationKind::Gelu => "GELU",
            ActivationKind::Silu => "SiLU",
            ActivationKind::Elu => "ELU",
            ActivationKind::SoftMax => "SoftMax",
            ActivationKind::LogSoftMax => "LogSoftMax",
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationKind {
    type Err = LayerError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| LayerError::UnknownActivation(name.to_string()))
    }
}

impl<'de> Deserialize<'de> for ActivationKind {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> std::result::Result<Self, De::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Stateless activation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    kind: ActivationKind,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }
}

impl Transform for Activation {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn forward(&self, input: &Tensor, _train: bool) -> Result<Tensor> {
        let output = match self.kind {
            ActivationKind::Identity => input.clone(),
            ActivationKind::Relu => input.relu()?,
            ActivationKind::Tanh => input.tanh()?,
            ActivationKind::Sigmoid => candle_nn::ops::sigmoid(input)?,
            ActivationKind::Gelu => input.gelu_erf()?,
            ActivationKind::Silu => input.silu()?,
            ActivationKind::Elu => input.elu(1.0)?,
            ActivationKind::SoftMax => candle_nn::ops::softmax_last_dim(input)?,
            ActivationKind::LogSoftMax => candle_nn::ops::log_softmax(input, D::Minus1)?,
        };
        Ok(output)
    }
}
