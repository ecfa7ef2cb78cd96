//! Threshold encryption primitives for encrypted prediction-market bets.
//!
//! # Status
//!
//! `apm-cryptography` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

pub mod babyjubjub;
pub use babyjubjub::{commitment, elgamal, threshold, vss};
pub use babyjubjub::{Element, KeyShare, Point, Scalar};
