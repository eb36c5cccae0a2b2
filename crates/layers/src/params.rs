//! Parameter blocks and the ordered container shared with the autograd engine.
//!
//! A [`ParamBlock`] is a small set of named [`Var`]s owned by exactly one layer
//! (`W`/`b` for dense, convolutional and normalisation layers; `Wx`/`bx`/`Wh`/`bh`
//! for recurrent units). [`Parameters`] keeps blocks in insertion order: the
//! index returned by [`Parameters::push`] is the contract an optimiser relies on
//! when it updates tensors after a gradient step, so blocks are never removed or
//! reordered once pushed.
//!
//! Blocks are zero-initialised unless a non-zero [`ParamInit`] is selected for
//! weight slots. Bias slots always start at zero.

use candle_core::{DType, Device, Tensor, Var};
use serde::Deserialize;

use crate::error::{LayerError, Result};

/// Storage dtype for freshly created parameter blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamDType {
    #[default]
    F32,
    F64,
    F16,
    Bf16,
}

impl ParamDType {
    pub fn dtype(self) -> DType {
        match self {
            ParamDType::F32 => DType::F32,
            ParamDType::F64 => DType::F64,
            ParamDType::F16 => DType::F16,
            ParamDType::Bf16 => DType::BF16,
        }
    }
}

/// Weight initialisation policies. `Zeros` is the default for every block.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamInit {
    #[default]
    Zeros,
    /// Xavier/Glorot uniform initialisation.
    XavierUniform,
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
    /// Kaiming/He uniform initialisation.
    KaimingUniform {
        #[serde(default)]
        negative_slope: f64,
    },
    /// Kaiming/He normal initialisation.
    KaimingNormal {
        #[serde(default)]
        negative_slope: f64,
    },
    /// Scales another policy, e.g. for deep stack stabilisation.
    Scaled { base: Box<ParamInit>, scale: f64 },
}

impl ParamInit {
    /// Convenience helper to scale an existing policy.
    pub fn scaled(base: ParamInit, scale: f64) -> Self {
        Self::Scaled {
            base: Box::new(base),
            scale,
        }
    }

    pub fn is_zeros(&self) -> bool {
        match self {
            ParamInit::Zeros => true,
            ParamInit::Scaled { base, scale } => *scale == 0.0 || base.is_zeros(),
            _ => false,
        }
    }

    fn sample(&self, shape: &[usize], fan_in: usize, fan_out: usize, device: &Device) -> Result<Tensor> {
        let (fan_in, fan_out) = (fan_in.max(1) as f64, fan_out.max(1) as f64);
        let sampled = match self {
            ParamInit::Zeros => Tensor::zeros(shape, DType::F32, device)?,
            ParamInit::XavierUniform => {
                let bound = (6.0f64 / (fan_in + fan_out)).sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)?
            }
            ParamInit::XavierNormal => {
                let std = (2.0f64 / (fan_in + fan_out)).sqrt();
                Tensor::randn(0f32, std as f32, shape, device)?
            }
            ParamInit::KaimingUniform { negative_slope } => {
                let gain = (2.0f64 / (1.0 + negative_slope.powi(2))).sqrt();
                let bound = 3.0f64.sqrt() * gain / fan_in.sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)?
            }
            ParamInit::KaimingNormal { negative_slope } => {
                let gain = (2.0f64 / (1.0 + negative_slope.powi(2))).sqrt();
                Tensor::randn(0f32, (gain / fan_in.sqrt()) as f32, shape, device)?
            }
            ParamInit::Scaled { base, scale } => base
                .sample(shape, fan_in as usize, fan_out as usize, device)?
                .affine(*scale, 0.0)?,
        };
        Ok(sampled)
    }
}

/// How a slot is filled when its block is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFill {
    /// Drawn from the factory's [`ParamInit`] with the given fans.
    Weight { fan_in: usize, fan_out: usize },
    /// Multiplicative scale (batch normalisation): ones unless the init is `Zeros`.
    Scale,
    /// Always zero.
    Bias,
}

/// Declared name, shape and fill of one slot of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: &'static str,
    pub shape: Vec<usize>,
    pub fill: SlotFill,
}

impl SlotSpec {
    pub fn new(name: &'static str, shape: Vec<usize>, fill: SlotFill) -> Self {
        Self { name, shape, fill }
    }
}

/// Creates blocks on one device with one dtype and init policy.
#[derive(Debug, Clone)]
pub struct BlockFactory {
    pub init: ParamInit,
    pub dtype: DType,
    pub device: Device,
}

impl BlockFactory {
    pub fn new(init: ParamInit, dtype: DType, device: &Device) -> Self {
        Self {
            init,
            dtype,
            device: device.clone(),
        }
    }

    /// Zero-initialised `f32` blocks.
    pub fn zeros(device: &Device) -> Self {
        Self::new(ParamInit::Zeros, DType::F32, device)
    }

    pub fn create(&self, owner: &str, slots: &[SlotSpec]) -> Result<ParamBlock> {
        let mut block = ParamBlock::new(owner);
        for spec in slots {
            if spec.shape.iter().any(|&d| d == 0) {
                return Err(LayerError::config(
                    "features",
                    format!("{owner}.{} would have shape {:?}", spec.name, spec.shape),
                ));
            }
            let value = match spec.fill {
                SlotFill::Bias => Tensor::zeros(spec.shape.as_slice(), self.dtype, &self.device)?,
                SlotFill::Scale if self.init.is_zeros() => {
                    Tensor::zeros(spec.shape.as_slice(), self.dtype, &self.device)?
                }
                SlotFill::Scale => Tensor::ones(spec.shape.as_slice(), self.dtype, &self.device)?,
                SlotFill::Weight { fan_in, fan_out } => self
                    .init
                    .sample(&spec.shape, fan_in, fan_out, &self.device)?
                    .to_dtype(self.dtype)?,
            };
            block.insert(spec.name, Var::from_tensor(&value)?);
        }
        log::debug!(
            "allocated {owner} block: {:?} ({} elements, {:?})",
            block.shapes(),
            block.num_elements(),
            self.dtype
        );
        Ok(block)
    }
}

/// Named trainable tensors owned by a single layer.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    owner: String,
    slots: Vec<(String, Var)>,
}

impl ParamBlock {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            slots: Vec::new(),
        }
    }

    /// Name of the layer this block was created for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Inserts or replaces a slot, keeping first-insertion order.
    pub fn insert(&mut self, name: impl Into<String>, value: Var) {
        let name = name.into();
        match self.slots.iter_mut().find(|(slot, _)| *slot == name) {
            Some((_, existing)) => *existing = value,
            None => self.slots.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Var> {
        self.slots
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, var)| var)
    }

    /// Like [`ParamBlock::get`] but reports the block index on a miss.
    pub fn require(&self, index: usize, name: &str) -> Result<&Tensor> {
        self.get(name)
            .map(Var::as_tensor)
            .ok_or_else(|| LayerError::MissingSlot {
                block: index,
                slot: name.to_string(),
            })
    }

    pub fn weight(&self) -> Option<&Tensor> {
        self.get("W").map(Var::as_tensor)
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.get("b").map(Var::as_tensor)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Var)> {
        self.slots.iter().map(|(name, var)| (name.as_str(), var))
    }

    /// `(slot name, dims)` pairs in slot order.
    pub fn shapes(&self) -> Vec<(&str, Vec<usize>)> {
        self.iter()
            .map(|(name, var)| (name, var.as_tensor().dims().to_vec()))
            .collect()
    }

    pub fn num_elements(&self) -> usize {
        self.slots.iter().map(|(_, var)| var.as_tensor().elem_count()).sum()
    }
}

/// Ordered container of parameter blocks for a whole model.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    blocks: Vec<ParamBlock>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block and returns its index.
    pub fn push(&mut self, block: ParamBlock) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Moves every block of `other` to the end and returns the index of the
    /// first one.
    pub fn append(&mut self, other: Parameters) -> usize {
        let offset = self.blocks.len();
        self.blocks.extend(other.blocks);
        offset
    }

    pub fn get(&self, index: usize) -> Option<&ParamBlock> {
        self.blocks.get(index)
    }

    pub fn require(&self, index: usize) -> Result<&ParamBlock> {
        self.get(index).ok_or(LayerError::MissingBlock(index))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamBlock> {
        self.blocks.iter()
    }

    /// Every variable in block order, then slot order. Hand this to an optimiser.
    pub fn vars(&self) -> Vec<Var> {
        self.blocks
            .iter()
            .flat_map(|block| block.iter().map(|(_, var)| var.clone()))
            .collect()
    }

    pub fn num_elements(&self) -> usize {
        self.blocks.iter().map(ParamBlock::num_elements).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_slots(input: usize, output: usize) -> Vec<SlotSpec> {
        vec![
            SlotSpec::new(
                "W",
                vec![output, input],
                SlotFill::Weight {
                    fan_in: input,
                    fan_out: output,
                },
            ),
            SlotSpec::new("b", vec![output], SlotFill::Bias),
        ]
    }

    fn tensor_stats(tensor: &Tensor) -> Result<(f64, f64)> {
        let values = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        Ok((mean, var.sqrt()))
    }

    #[test]
    fn push_returns_insertion_index() -> Result<()> {
        let factory = BlockFactory::zeros(&Device::Cpu);
        let mut params = Parameters::new();
        assert_eq!(params.push(factory.create("a", &dense_slots(3, 2))?), 0);
        assert_eq!(params.push(factory.create("b", &dense_slots(2, 5))?), 1);
        assert_eq!(params.len(), 2);
        assert_eq!(params.require(1)?.owner(), "b");
        assert!(matches!(params.require(2), Err(LayerError::MissingBlock(2))));
        assert_eq!(params.vars().len(), 4);
        assert_eq!(params.num_elements(), 3 * 2 + 2 + 2 * 5 + 5);
        Ok(())
    }

    #[test]
    fn append_keeps_order_and_returns_offset() -> Result<()> {
        let factory = BlockFactory::zeros(&Device::Cpu);
        let mut params = Parameters::new();
        params.push(factory.create("a", &dense_slots(3, 2))?);
        let mut tail = Parameters::new();
        tail.push(factory.create("b", &dense_slots(2, 5))?);
        tail.push(factory.create("c", &dense_slots(5, 1))?);

        assert_eq!(params.append(tail), 1);
        assert_eq!(params.len(), 3);
        assert_eq!(params.require(2)?.owner(), "c");
        assert_eq!(params.append(Parameters::new()), 3);
        Ok(())
    }

    #[test]
    fn default_blocks_are_zero() -> Result<()> {
        let factory = BlockFactory::zeros(&Device::Cpu);
        let block = factory.create("dense", &dense_slots(4, 3))?;
        assert_eq!(
            block.shapes(),
            vec![("W", vec![3, 4]), ("b", vec![3])]
        );
        let sum = block.weight().unwrap().abs()?.sum_all()?.to_vec0::<f32>()?;
        assert_eq!(sum, 0.0);
        Ok(())
    }

    #[test]
    fn zero_sized_slots_are_rejected() {
        let factory = BlockFactory::zeros(&Device::Cpu);
        assert!(matches!(
            factory.create("dense", &dense_slots(0, 3)),
            Err(LayerError::Config { .. })
        ));
    }

    #[test]
    fn scale_slots_follow_init() -> Result<()> {
        let slots = [SlotSpec::new("W", vec![4], SlotFill::Scale)];
        let zeros = BlockFactory::zeros(&Device::Cpu).create("bn", &slots)?;
        assert_eq!(zeros.weight().unwrap().sum_all()?.to_vec0::<f32>()?, 0.0);
        let xavier = BlockFactory::new(ParamInit::XavierUniform, DType::F32, &Device::Cpu)
            .create("bn", &slots)?;
        assert_eq!(xavier.weight().unwrap().sum_all()?.to_vec0::<f32>()?, 4.0);
        Ok(())
    }

    #[test]
    fn glorot_normal_stats_are_reasonable() -> Result<()> {
        let factory = BlockFactory::new(ParamInit::XavierNormal, DType::F32, &Device::Cpu);
        let block = factory.create("dense", &dense_slots(128, 64))?;
        let (mean, std) = tensor_stats(block.weight().unwrap())?;
        let expected = (2.0f64 / (128.0 + 64.0)).sqrt();
        assert!(mean.abs() < 5e-3);
        assert!((std - expected).abs() < expected * 0.25);
        Ok(())
    }

    #[test]
    fn kaiming_uniform_respects_scale() -> Result<()> {
        let init = ParamInit::scaled(ParamInit::KaimingUniform { negative_slope: 0.0 }, 0.5);
        let factory = BlockFactory::new(init, DType::F32, &Device::Cpu);
        let block = factory.create("dense", &dense_slots(256, 256))?;
        let (_, std) = tensor_stats(block.weight().unwrap())?;
        let expected = (2.0f64 / 256.0).sqrt() * 0.5;
        assert!((std - expected).abs() < expected * 0.25);
        Ok(())
    }

    #[test]
    fn missing_slot_names_the_block() {
        let block = ParamBlock::new("empty");
        match block.require(7, "Wx") {
            Err(LayerError::MissingSlot { block, slot }) => {
                assert_eq!(block, 7);
                assert_eq!(slot, "Wx");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn init_deserializes_from_tagged_table() {
        let init: ParamInit =
            serde_json::from_str(r#"{"kind": "kaiming_normal", "negative_slope": 0.1}"#).unwrap();
        assert_eq!(init, ParamInit::KaimingNormal { negative_slope: 0.1 });
        let dtype: ParamDType = serde_json::from_str(r#""bf16""#).unwrap();
        assert_eq!(dtype.dtype(), DType::BF16);
    }
}
