//! Layer-composition engine.
//!
//! A [`Sequential`] is an ordered list of primitive layers plus an aligned
//! `slots` array: `slots[i]` is `Some(k)` exactly when layer `i` is
//! parameterized and owns block `k` of the [`Parameters`] it was built with.
//! Parameterized layers can only be added through
//! [`Sequential::push_parameterized`] or [`Sequential::push_with_block`], which
//! append the block and record the slot in one step, so the layer list and the
//! container cannot drift apart.
//!
//! The stack never captures parameter values. [`Sequential::forward`] takes the
//! container on every call, which lets an autograd engine trace
//! `(parameters, input) -> output` and an optimiser update the blocks between
//! calls.

use std::{collections::HashSet, sync::Arc};

use candle_core::Tensor;
use layers::{
    BlockFactory, LayerError, ParamBlock, ParamTransform, Parameters, Result, Transform,
};

/// One registered primitive.
#[derive(Debug, Clone)]
pub enum Layer {
    Stateless(Arc<dyn Transform>),
    Parameterized(Arc<dyn ParamTransform>),
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Stateless(layer) => layer.name(),
            Layer::Parameterized(layer) => layer.name(),
        }
    }
}

/// Ordered stack of primitives composed into one `(parameters, input)` function.
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    layers: Vec<Layer>,
    slots: Vec<Option<usize>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stateless layer and returns its position.
    pub fn push_stateless<T: Transform + 'static>(&mut self, layer: T) -> usize {
        log::debug!("layer {} <- {}", self.layers.len(), layer.name());
        self.layers.push(Layer::Stateless(Arc::new(layer)));
        self.slots.push(None);
        self.layers.len() - 1
    }

    /// Creates a block for `layer`, appends both and links them. Returns the
    /// index of the new block in `params`. Nothing is appended if the block
    /// cannot be created.
    pub fn push_parameterized<T: ParamTransform + 'static>(
        &mut self,
        layer: T,
        params: &mut Parameters,
        factory: &BlockFactory,
    ) -> Result<usize> {
        let block = factory.create(layer.name(), &layer.slots())?;
        self.push_with_block(layer, block, params)
    }

    /// Appends `layer` together with a block created beforehand. The block must
    /// provide every slot the layer declares; nothing is appended otherwise.
    pub fn push_with_block<T: ParamTransform + 'static>(
        &mut self,
        layer: T,
        block: ParamBlock,
        params: &mut Parameters,
    ) -> Result<usize> {
        check_block(&layer, &block, params.len())?;
        let index = params.push(block);
        log::debug!(
            "layer {} <- {} (block {})",
            self.layers.len(),
            layer.name(),
            index
        );
        self.layers.push(Layer::Parameterized(Arc::new(layer)));
        self.slots.push(Some(index));
        Ok(index)
    }

    /// Moves the layers of `other` onto the end of this stack and the blocks of
    /// `other_params` onto the end of `params`, renumbering slots. Builders
    /// assemble into a scratch pair and splice only once everything succeeded.
    pub fn splice(&mut self, other: Sequential, params: &mut Parameters, other_params: Parameters) {
        let offset = params.append(other_params);
        log::debug!(
            "spliced {} layers at position {} (blocks from {offset})",
            other.layers.len(),
            self.layers.len()
        );
        self.layers.extend(other.layers);
        self.slots
            .extend(other.slots.into_iter().map(|slot| slot.map(|index| index + offset)));
    }

    /// Inference-mode forward pass: dropout is the identity.
    pub fn forward(&self, params: &Parameters, input: &Tensor) -> Result<Tensor> {
        self.forward_t(params, input, false)
    }

    /// Threads `input` through every layer in registration order.
    pub fn forward_t(&self, params: &Parameters, input: &Tensor, train: bool) -> Result<Tensor> {
        let mut hidden = input.clone();
        for (layer, slot) in self.layers.iter().zip(&self.slots) {
            hidden = match (layer, *slot) {
                (Layer::Stateless(layer), _) => layer.forward(&hidden, train)?,
                (Layer::Parameterized(layer), Some(index)) => {
                    let block = params.require(index)?;
                    let weight = block.require(index, "W")?;
                    let bias = block.require(index, "b")?;
                    layer.forward(&hidden, weight, bias, train)?
                }
                (Layer::Parameterized(layer), None) => {
                    return Err(LayerError::config(
                        "parameters",
                        format!("{} has no parameter block", layer.name()),
                    ))
                }
            };
        }
        Ok(hidden)
    }

    /// Checks the layer/slot alignment and that every linked block has the
    /// slots and shapes its layer declares.
    pub fn validate(&self, params: &Parameters) -> Result<()> {
        let mut seen = HashSet::new();
        for (position, (layer, slot)) in self.layers.iter().zip(&self.slots).enumerate() {
            match (layer, *slot) {
                (Layer::Stateless(_), None) => {}
                (Layer::Parameterized(layer), Some(index)) => {
                    if !seen.insert(index) {
                        return Err(LayerError::config(
                            "parameters",
                            format!("block {index} is linked to more than one layer"),
                        ));
                    }
                    check_block(layer.as_ref(), params.require(index)?, index)?;
                }
                _ => {
                    return Err(LayerError::config(
                        "parameters",
                        format!("layer {position} ({}) is misaligned with its slot", layer.name()),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Block index owned by the layer at `position`, if any.
    pub fn slot_of(&self, position: usize) -> Option<usize> {
        self.slots.get(position).copied().flatten()
    }

    pub fn parameterized_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(Layer::name).collect()
    }
}

/// Checks that `block` holds every slot `layer` declares, with matching shapes.
fn check_block(layer: &dyn ParamTransform, block: &ParamBlock, index: usize) -> Result<()> {
    for spec in layer.slots() {
        let tensor = block.require(index, spec.name)?;
        if tensor.dims() != spec.shape.as_slice() {
            return Err(LayerError::shape(
                "parameters",
                format!("block {index}.{} of shape {:?}", spec.name, spec.shape),
                tensor.dims(),
            ));
        }
    }
    Ok(())
}
