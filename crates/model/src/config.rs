//! Builder configuration.
//!
//! Every recognised option is a field with a documented default; nothing is
//! read from ambient state. All structs deserialise from TOML or JSON with
//! missing fields falling back to [`Default`], and `validate` rejects bad
//! values before any layer is appended.

use std::{fs, path::Path};

use candle_core::Device;
use layers::{checks, ActivationKind, BlockFactory, LayerError, ParamDType, ParamInit, Result};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};

/// An option given once for all layers or once per layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PerLayer<T> {
    Uniform(T),
    Each(Vec<T>),
}

impl<T: Copy> PerLayer<T> {
    /// Expands to one value per layer; a per-layer sequence must match `layers`.
    pub fn resolve(&self, option: &'static str, layers: usize) -> Result<Vec<T>> {
        match self {
            PerLayer::Uniform(value) => Ok(vec![*value; layers]),
            PerLayer::Each(values) if values.len() == layers => Ok(values.clone()),
            PerLayer::Each(values) => Err(LayerError::config(
                option,
                format!("{} values given for {layers} layers", values.len()),
            )),
        }
    }
}

impl<T: Default> Default for PerLayer<T> {
    fn default() -> Self {
        PerLayer::Uniform(T::default())
    }
}

fn one_or_many<'de, De: Deserializer<'de>>(deserializer: De) -> std::result::Result<Vec<usize>, De::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(usize),
        Many(Vec<usize>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(width) => vec![width],
        OneOrMany::Many(widths) => widths,
    })
}

fn factory(init: &ParamInit, dtype: ParamDType, device: &Device) -> BlockFactory {
    BlockFactory::new(init.clone(), dtype.dtype(), device)
}

/// Optional dropout, a dense projection, optional batch norm, optional activation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DenseBlockConfig {
    /// Width of the incoming features. Default `10`.
    pub input_features: usize,
    /// Width of the projection. Default `100`.
    pub output_features: usize,
    /// Append batch normalisation after the projection. Default `false`.
    pub batch_normalization: bool,
    /// Dropout before the projection; `0` adds no layer. Default `0.0`.
    pub dropout_prob: f32,
    /// Activation appended last. Default none.
    pub activation: Option<ActivationKind>,
    /// Weight initialisation. Default zeros.
    pub init: ParamInit,
    /// Parameter dtype. Default `f32`.
    pub dtype: ParamDType,
}

impl Default for DenseBlockConfig {
    fn default() -> Self {
        Self {
            input_features: 10,
            output_features: 100,
            batch_normalization: false,
            dropout_prob: 0.0,
            activation: None,
            init: ParamInit::Zeros,
            dtype: ParamDType::F32,
        }
    }
}

impl DenseBlockConfig {
    pub fn validate(&self) -> Result<()> {
        checks::expect_positive("input_features", self.input_features)?;
        checks::expect_positive("output_features", self.output_features)?;
        checks::expect_probability("dropout_prob", self.dropout_prob)
    }

    pub fn factory(&self, device: &Device) -> BlockFactory {
        factory(&self.init, self.dtype, device)
    }
}

/// Flatten step followed by one dense block per hidden width.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DenseNetworkConfig {
    /// Features per example after flattening. Default `10`.
    pub input_features: usize,
    /// Output width of each block; a scalar means a single block. Default `[100, 2]`.
    #[serde(deserialize_with = "one_or_many")]
    pub hidden_features: Vec<usize>,
    /// Batch normalisation after every projection. Default `false`.
    pub batch_normalization: bool,
    /// Dropout before every projection, or one probability per block. Default `0.0`.
    pub dropout_prob: PerLayer<f32>,
    /// Activation after every block. Default `ReLU`.
    pub activation: Option<ActivationKind>,
    /// Leave the last block without activation and batch norm. Default `false`.
    pub classifier: bool,
    pub init: ParamInit,
    pub dtype: ParamDType,
}

impl Default for DenseNetworkConfig {
    fn default() -> Self {
        Self {
            input_features: 10,
            hidden_features: vec![100, 2],
            batch_normalization: false,
            dropout_prob: PerLayer::Uniform(0.0),
            activation: Some(ActivationKind::Relu),
            classifier: false,
            init: ParamInit::Zeros,
            dtype: ParamDType::F32,
        }
    }
}

impl DenseNetworkConfig {
    /// Expands into validated per-block configurations.
    pub fn blocks(&self) -> Result<Vec<DenseBlockConfig>> {
        checks::expect_positive("input_features", self.input_features)?;
        if self.hidden_features.is_empty() {
            return Err(LayerError::config("hidden_features", "at least one layer is required"));
        }
        let depth = self.hidden_features.len();
        let dropout = self.dropout_prob.resolve("dropout_prob", depth)?;

        let mut input_features = self.input_features;
        let mut blocks = Vec::with_capacity(depth);
        for (index, (&output_features, &dropout_prob)) in
            self.hidden_features.iter().zip(&dropout).enumerate()
        {
            let head = self.classifier && index + 1 == depth;
            let block = DenseBlockConfig {
                input_features,
                output_features,
                batch_normalization: self.batch_normalization && !head,
                dropout_prob,
                activation: if head { None } else { self.activation },
                init: self.init.clone(),
                dtype: self.dtype,
            };
            block
                .validate()
                .map_err(|err| rename_option(err, "hidden_features", "output_features"))?;
            blocks.push(block);
            input_features = output_features;
        }
        Ok(blocks)
    }
}

/// Optional channel dropout, convolution, optional batch norm, optional
/// activation, optional max pooling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConvBlockConfig {
    /// Incoming channels. Default `3`.
    pub input_features: usize,
    /// Output channels. Default `16`.
    pub output_features: usize,
    /// Square kernel size. Default `5`.
    pub kernel_size: usize,
    /// Zero padding; `None` means `kernel_size / 2`. Default `None`.
    pub padding: Option<usize>,
    /// Convolution stride. Default `1`.
    pub stride: usize,
    /// Max-pooling window after the block; `1` adds no layer. Default `1`.
    pub pooling: usize,
    pub batch_normalization: bool,
    pub dropout_prob: f32,
    pub activation: Option<ActivationKind>,
    pub init: ParamInit,
    pub dtype: ParamDType,
}

impl Default for ConvBlockConfig {
    fn default() -> Self {
        Self {
            input_features: 3,
            output_features: 16,
            kernel_size: 5,
            padding: None,
            stride: 1,
            pooling: 1,
            batch_normalization: false,
            dropout_prob: 0.0,
            activation: None,
            init: ParamInit::Zeros,
            dtype: ParamDType::F32,
        }
    }
}

impl ConvBlockConfig {
    pub fn padding(&self) -> usize {
        self.padding.unwrap_or(self.kernel_size / 2)
    }

    pub fn validate(&self) -> Result<()> {
        checks::expect_positive("input_features", self.input_features)?;
        checks::expect_positive("output_features", self.output_features)?;
        checks::expect_positive("kernel_size", self.kernel_size)?;
        checks::expect_positive("stride", self.stride)?;
        checks::expect_positive("poolings", self.pooling)?;
        checks::expect_probability("dropout_prob", self.dropout_prob)
    }

    pub fn factory(&self, device: &Device) -> BlockFactory {
        factory(&self.init, self.dtype, device)
    }
}

/// Spatial input step followed by one convolutional block per hidden width.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConvNetworkConfig {
    /// Input channels. Default `3`.
    pub input_features: usize,
    /// Output channels of each block. Default `[16, 32, 64]`.
    #[serde(deserialize_with = "one_or_many")]
    pub hidden_features: Vec<usize>,
    /// Pooling window per block, same length as `hidden_features`. Default `[2, 2, 2]`.
    pub poolings: Vec<usize>,
    /// Default `5`.
    pub kernel_size: usize,
    /// `None` means `kernel_size / 2`.
    pub padding: Option<usize>,
    /// Stride of the first convolution only. Default `1`.
    pub input_stride: usize,
    /// Input `(height, width)`; when set, spatial collapse is rejected at build time.
    pub input_size: Option<(usize, usize)>,
    pub batch_normalization: bool,
    pub dropout_prob: PerLayer<f32>,
    /// Default `ReLU`.
    pub activation: Option<ActivationKind>,
    pub classifier: bool,
    pub init: ParamInit,
    pub dtype: ParamDType,
}

impl Default for ConvNetworkConfig {
    fn default() -> Self {
        Self {
            input_features: 3,
            hidden_features: vec![16, 32, 64],
            poolings: vec![2, 2, 2],
            kernel_size: 5,
            padding: None,
            input_stride: 1,
            input_size: None,
            batch_normalization: false,
            dropout_prob: PerLayer::Uniform(0.0),
            activation: Some(ActivationKind::Relu),
            classifier: false,
            init: ParamInit::Zeros,
            dtype: ParamDType::F32,
        }
    }
}

impl ConvNetworkConfig {
    pub fn blocks(&self) -> Result<Vec<ConvBlockConfig>> {
        checks::expect_positive("input_features", self.input_features)?;
        checks::expect_positive("input_stride", self.input_stride)?;
        if self.hidden_features.is_empty() {
            return Err(LayerError::config("hidden_features", "at least one layer is required"));
        }
        let depth = self.hidden_features.len();
        if self.poolings.len() != depth {
            return Err(LayerError::config(
                "poolings",
                format!("{} values given for {depth} layers", self.poolings.len()),
            ));
        }
        let dropout = self.dropout_prob.resolve("dropout_prob", depth)?;

        let mut input_features = self.input_features;
        let mut blocks = Vec::with_capacity(depth);
        for index in 0..depth {
            let head = self.classifier && index + 1 == depth;
            let block = ConvBlockConfig {
                input_features,
                output_features: self.hidden_features[index],
                kernel_size: self.kernel_size,
                padding: self.padding,
                stride: if index == 0 { self.input_stride } else { 1 },
                pooling: self.poolings[index],
                batch_normalization: self.batch_normalization && !head,
                dropout_prob: dropout[index],
                activation: if head { None } else { self.activation },
                init: self.init.clone(),
                dtype: self.dtype,
            };
            block
                .validate()
                .map_err(|err| rename_option(err, "hidden_features", "output_features"))?;
            blocks.push(block);
            input_features = self.hidden_features[index];
        }
        Ok(blocks)
    }
}

fn rename_option(err: LayerError, to: &'static str, from: &'static str) -> LayerError {
    match err {
        LayerError::Config { option, reason } if option == from => LayerError::Config {
            option: to,
            reason,
        },
        other => other,
    }
}

/// Loads a builder configuration from a `.toml` (or extension-less) or `.json` file.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            serde_json::from_str(&contents).map_err(|err| LayerError::ConfigFormat(err.to_string()))
        }
        Some("toml") | None => {
            toml::from_str(&contents).map_err(|err| LayerError::ConfigFormat(err.to_string()))
        }
        Some(other) => Err(LayerError::ConfigFormat(format!(
            "unsupported configuration extension '{other}'"
        ))),
    }
}
