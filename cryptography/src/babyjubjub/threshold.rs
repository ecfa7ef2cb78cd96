//! Threshold decryption of ElGamal ciphertexts under a jointly generated key.
//!
//! Each member holding a [KeyShare] `s_j` publishes the partial decryption
//! `D_j = ephemeral^{s_j}`. Any `t` partials are interpolated in the exponent to obtain
//! `ephemeral^s` without ever reconstructing `s`, and the plaintext is
//! `encrypted - ephemeral^s`.
//!
//! When members instead reveal their shares, [decrypt_with_shares] reconstructs `s` and
//! decrypts directly.

use crate::babyjubjub::{
    elgamal::{self, Ciphertext},
    primitives::{
        self,
        group::{Element, KeyShare, Point},
        poly::{Eval, Poly},
    },
    vss::{self, ops},
};
use thiserror::Error;

/// A member's contribution to decrypting a single ciphertext.
pub type PartialDecryption = Eval<Point>;

/// Errors that can occur when combining decryption shares.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid threshold")]
    InvalidThreshold,
    #[error("not enough partial decryptions: {0}/{1}")]
    NotEnoughPartials(usize, u32),
    #[error("invalid index: {0}")]
    InvalidIndex(u32),
    #[error("duplicate index: {0}")]
    DuplicateIndex(u32),
    #[error("no inverse")]
    NoInverse,
    #[error("share recovery failed: {0}")]
    Shares(#[from] vss::Error),
}

impl From<primitives::Error> for Error {
    fn from(err: primitives::Error) -> Self {
        match err {
            primitives::Error::InvalidThreshold => Error::InvalidThreshold,
            primitives::Error::NotEnoughEvaluations(provided, required) => {
                Error::NotEnoughPartials(provided, required)
            }
            primitives::Error::ZeroIndex => Error::InvalidIndex(0),
            primitives::Error::DuplicateEval(index) => Error::DuplicateIndex(index),
            primitives::Error::NoInverse => Error::NoInverse,
        }
    }
}

/// Computes the partial decryption of `ciphertext` with a member's share.
pub fn partial_decrypt(share: &KeyShare, ciphertext: &Ciphertext) -> PartialDecryption {
    let mut value = ciphertext.ephemeral;
    value.mul(&share.private);
    PartialDecryption {
        index: share.index,
        value,
    }
}

/// Combines at least `t` partial decryptions into the plaintext point.
pub fn combine<'a, I>(t: u32, partials: I, ciphertext: &Ciphertext) -> Result<Point, Error>
where
    I: IntoIterator<Item = &'a PartialDecryption>,
{
    let mask = Poly::<Point>::recover(t, partials)?;
    let mut message = ciphertext.encrypted;
    message.sub(&mask);
    Ok(message)
}

/// Reconstructs the joint secret from at least `t` shares and decrypts `ciphertext`.
pub fn decrypt_with_shares(
    t: u32,
    shares: &[KeyShare],
    ciphertext: &Ciphertext,
) -> Result<Point, Error> {
    let secret = ops::reconstruct_secret(t, shares)?;
    Ok(elgamal::decrypt(&secret, ciphertext))
}
