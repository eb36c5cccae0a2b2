//! Composition engine and model builders.
//!
//! Builders return `(Sequential, Parameters)`: the composed function and the
//! container it must be called with. Nested builders take both by `&mut` and
//! extend them, so a dense head can be appended to a convolutional trunk while
//! the parameter indices stay aligned with the layers that own them.

pub mod config;
pub mod dense;
pub mod sequential;
pub mod spatial;

pub use config::{
    load_config, ConvBlockConfig, ConvNetworkConfig, DenseBlockConfig, DenseNetworkConfig, PerLayer,
};
pub use dense::{append_dense_block, append_dense_network, dense_block, dense_network};
pub use sequential::{Layer, Sequential};
pub use spatial::{
    append_conv_block, append_conv_network, conv_block, conv_block_output_size, conv_network,
};
