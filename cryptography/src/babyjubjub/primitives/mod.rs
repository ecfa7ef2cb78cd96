//! Operations over the Baby Jubjub prime-order subgroup.
//!
//! # Acknowledgements
//!
//! _The following crates were used as a reference when implementing this crate. If code is very similar
//! to the reference, it is accompanied by a comment and link._
//!
//! * <https://github.com/celo-org/celo-threshold-bls-rs>: Polynomial evaluation, commitment, and interpolation.
//! * <https://github.com/iden3/circomlib>: Curve parameters and the `Base8` generator.
//!
//! # Example
//!
//! ```rust
//! use apm_cryptography::babyjubjub::primitives::{group::{Element, Point}, poly::{self, Poly}};
//! use rand::rngs::OsRng;
//!
//! // Sample a polynomial of degree 2 and commit to it
//! let secret = poly::new_from(2, &mut OsRng);
//! let commitment = poly::Public::commit(secret.clone());
//!
//! // Any 3 evaluations recover the constant term
//! let evals: Vec<_> = (1..=3).map(|i| secret.evaluate(i)).collect();
//! let recovered = Poly::recover(3, &evals).unwrap();
//! assert_eq!(Point::mul_base(&recovered), *commitment.constant());
//! ```

pub mod group;
pub mod poly;

use thiserror::Error;

/// Errors that can occur when working with Baby Jubjub primitives.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid threshold")]
    InvalidThreshold,
    #[error("not enough evaluations: {0}/{1}")]
    NotEnoughEvaluations(usize, u32),
    #[error("evaluation at zero")]
    ZeroIndex,
    #[error("duplicate evaluation index: {0}")]
    DuplicateEval(u32),
    #[error("no inverse")]
    NoInverse,
}
