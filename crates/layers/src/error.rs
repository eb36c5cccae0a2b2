//! Error taxonomy shared by the primitive, composition and recurrent crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LayerError>;

#[derive(Debug, Error)]
pub enum LayerError {
    /// A builder or primitive option was rejected at construction time.
    #[error("invalid configuration for `{option}`: {reason}")]
    Config { option: &'static str, reason: String },

    #[error("unknown activation `{0}`")]
    UnknownActivation(String),

    /// An input tensor does not match the layout a layer expects.
    #[error("{context}: expected {expected}, got shape {actual:?}")]
    Shape {
        context: &'static str,
        expected: String,
        actual: Vec<usize>,
    },

    /// A carried recurrent state does not fit the engine it is fed into.
    #[error("{context}: carried state expected {expected}, got shape {actual:?}")]
    State {
        context: &'static str,
        expected: String,
        actual: Vec<usize>,
    },

    #[error("parameter container has no block at index {0}")]
    MissingBlock(usize),

    #[error("parameter block {block} has no slot `{slot}`")]
    MissingSlot { block: usize, slot: String },

    #[error("failed to parse config: {0}")]
    ConfigFormat(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl LayerError {
    pub fn config(option: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            option,
            reason: reason.into(),
        }
    }

    pub fn shape(context: &'static str, expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::Shape {
            context,
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }

    pub fn state(context: &'static str, expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::State {
            context,
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }

    /// Name of the offending option for configuration errors.
    pub fn option(&self) -> Option<&'static str> {
        match self {
            LayerError::Config { option, .. } => Some(option),
            LayerError::UnknownActivation(_) => Some("activation"),
            _ => None,
        }
    }
}
