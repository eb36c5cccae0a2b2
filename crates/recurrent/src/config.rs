use candle_core::Device;
use layers::{checks, BlockFactory, ParamDType, ParamInit, Result, SlotFill, SlotSpec};
use serde::Deserialize;

/// What a recurrent forward pass returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Only the final hidden state, `(batch, hidden)`.
    #[default]
    Last,
    /// Every hidden state stacked on the time axis, `(batch, time, hidden)`.
    All,
}

/// Options shared by the plain and gated recurrent engines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecurrentConfig {
    /// Features per timestep. Default `10`.
    pub input_features: usize,
    /// Hidden state width. Default `100`.
    pub hidden_features: usize,
    /// Default [`OutputType::Last`].
    pub output_type: OutputType,
    /// Weight initialisation for `Wx`/`Wh`. Default zeros.
    pub init: ParamInit,
    pub dtype: ParamDType,
}

impl Default for RecurrentConfig {
    fn default() -> Self {
        Self {
            input_features: 10,
            hidden_features: 100,
            output_type: OutputType::Last,
            init: ParamInit::Zeros,
            dtype: ParamDType::F32,
        }
    }
}

impl RecurrentConfig {
    pub fn new(input_features: usize, hidden_features: usize) -> Self {
        Self {
            input_features,
            hidden_features,
            ..Default::default()
        }
    }

    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn with_init(mut self, init: ParamInit) -> Self {
        self.init = init;
        self
    }

    pub fn validate(&self) -> Result<()> {
        checks::expect_positive("input_features", self.input_features)?;
        checks::expect_positive("hidden_features", self.hidden_features)
    }

    pub fn factory(&self, device: &Device) -> BlockFactory {
        BlockFactory::new(self.init.clone(), self.dtype.dtype(), device)
    }

    /// `Wx (in, gates*H)`, `bx (1, gates*H)`, `Wh (H, gates*H)`, `bh (1, gates*H)`.
    pub(crate) fn slots(&self, gates: usize) -> Vec<SlotSpec> {
        let input = self.input_features;
        let hidden = self.hidden_features;
        let width = gates * hidden;
        vec![
            SlotSpec::new(
                "Wx",
                vec![input, width],
                SlotFill::Weight {
                    fan_in: input,
                    fan_out: width,
                },
            ),
            SlotSpec::new("bx", vec![1, width], SlotFill::Bias),
            SlotSpec::new(
                "Wh",
                vec![hidden, width],
                SlotFill::Weight {
                    fan_in: hidden,
                    fan_out: width,
                },
            ),
            SlotSpec::new("bh", vec![1, width], SlotFill::Bias),
        ]
    }
}
