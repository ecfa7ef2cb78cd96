//! In-memory implementations of the external interfaces, for tests and simulations.

mod network;
mod roster;

pub use network::{Error, Network, Transport};
pub use roster::StaticRoster;
