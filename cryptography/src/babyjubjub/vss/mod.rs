//! Feldman verifiable secret sharing over Baby Jubjub.
//!
//! Every dealer samples a random polynomial `f_i` of degree `t - 1` and publishes the
//! commitment `C_i = [Base^{a_i0}, ..., Base^{a_i(t-1)}]`. The share for participant `j`
//! (1-based) is `s_ij = f_i(j)` and can be checked by anyone holding the commitment:
//!
//! ```text
//! Base^{s_ij} == sum_k C_ik^{j^k}
//! ```
//!
//! After every dealer has contributed, participant `j` holds `s_j = sum_i s_ij`, a share of
//! the joint secret `s = sum_i a_i0` whose public key is `sum_i C_i0`. Any `t` shares recover
//! `s` with Lagrange interpolation at zero (see [ops::reconstruct_secret]).
//!
//! # Example
//!
//! ```rust
//! use apm_cryptography::babyjubjub::{primitives::{group::Point, poly}, vss::ops};
//! use rand::rngs::OsRng;
//!
//! let (n, t) = (3, 2);
//!
//! // Every dealer generates a polynomial and deals a share to every participant
//! let dealings: Vec<_> = (1..=n)
//!     .map(|dealer| ops::generate_shares(&mut OsRng, dealer, n, t).unwrap())
//!     .collect();
//!
//! // Participants verify what they received and combine it
//! let mut shares = Vec::new();
//! for recipient in 1..=n {
//!     let received: Vec<_> = dealings
//!         .iter()
//!         .map(|(commitment, dealt)| {
//!             let share = dealt[(recipient - 1) as usize];
//!             ops::verify_share(commitment, recipient, &share).unwrap();
//!             share
//!         })
//!         .collect();
//!     shares.push(ops::combine_shares(recipient, &received).unwrap());
//! }
//!
//! // Any two participants recover the joint secret
//! let public = ops::construct_public(dealings.iter().map(|(c, _)| c), n).unwrap();
//! let secret = ops::reconstruct_secret(t, &shares[1..]).unwrap();
//! assert_eq!(Point::mul_base(&secret), *poly::public(&public));
//! ```

pub mod ops;

use crate::babyjubjub::primitives::group::Private;
use thiserror::Error;

/// A share dealt by `dealer` to the participant at `index`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Share {
    /// The 1-based index of the participant that generated the share.
    pub dealer: u32,
    /// The 1-based index of the participant the share is intended for.
    pub index: u32,
    /// The evaluation of the dealer's polynomial at `index`.
    pub private: Private,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("dealer", &self.dealer)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur during secret sharing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid threshold")]
    InvalidThreshold,
    #[error("invalid index: {0}")]
    InvalidIndex(u32),
    #[error("commitment has wrong degree")]
    CommitmentWrongDegree,
    #[error("misdirected share")]
    MisdirectedShare,
    #[error("share does not match commitment")]
    ShareWrongCommitment,
    #[error("insufficient dealings")]
    InsufficientDealings,
    #[error("insufficient shares: {0}/{1}")]
    InsufficientShares(usize, u32),
    #[error("duplicate index: {0}")]
    DuplicateIndex(u32),
    #[error("no inverse")]
    NoInverse,
}
