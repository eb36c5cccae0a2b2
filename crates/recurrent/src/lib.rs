//! Unrolled recurrent engines over `(batch, time, features)` sequences.
//!
//! Both engines own one parameter block (`Wx`, `bx`, `Wh`, `bh`) and are pure
//! functions of that block and their input. The gated engine additionally
//! threads an [`LstmState`] between calls; the state it hands back is detached
//! so gradients never flow into an earlier call's graph.

pub mod config;
pub mod lstm;
pub mod rnn;
mod sequence;

pub use config::{OutputType, RecurrentConfig};
pub use lstm::{lstm_network, Gate, LstmNetwork, LstmState, GATE_ORDER};
pub use rnn::{recurrent_network, RecurrentNetwork};
