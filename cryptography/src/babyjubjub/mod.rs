//! Threshold ElGamal encryption over the Baby Jubjub curve.
//!
//! A committee runs a Feldman-style distributed key generation ([vss]) to obtain a joint
//! public key whose secret no single member holds. Bettors encrypt an encoded side under
//! that key ([elgamal]) and bind the opening to a Poseidon commitment ([commitment]). Once
//! at least `t` members contribute, the ciphertexts are opened ([threshold]).
//!
//! # Benchmarks
//!
//! ```bash
//! cargo bench --bench babyjubjub
//! ```

pub mod commitment;
pub mod elgamal;
pub mod primitives;
pub mod threshold;
pub mod vss;

pub use primitives::group::{Element, KeyShare, Point, Scalar};
