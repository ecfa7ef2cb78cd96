//! Textbook ElGamal encryption over the Baby Jubjub subgroup.
//!
//! A message is a point `M`. Encryption under public key `pk = Base^sk` with nonce `y`
//! yields `(Base^y, M + pk^y)` and decryption computes `encrypted - ephemeral^sk`.
//! Ciphertexts are unauthenticated: decrypting with the wrong key returns an unrelated
//! point rather than an error.
//!
//! Bet sides are encoded as a random point whose circomlib `x` coordinate has the
//! parity of the side (see [encode_side]), which keeps the plaintext space indistinguishable
//! to anyone without the decryption key.
//!
//! # Example
//!
//! ```rust
//! use apm_cryptography::babyjubjub::elgamal::{decode_side, decrypt, encode_side, encrypt_random, Keypair};
//! use rand::rngs::OsRng;
//!
//! let keypair = Keypair::generate(&mut OsRng);
//! let message = encode_side(&mut OsRng, true);
//! let (ciphertext, _nonce) = encrypt_random(&mut OsRng, &keypair.public, &message).unwrap();
//! assert!(decode_side(&decrypt(&keypair.private, &ciphertext)));
//! ```

use crate::babyjubjub::primitives::group::{Element, Point, Private, Public, Scalar};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// Errors that can occur when encrypting.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// An ElGamal ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    /// `Base^nonce`
    pub ephemeral: Point,
    /// `message + pk^nonce`
    pub encrypted: Point,
}

/// A private key and its public key.
#[derive(Clone)]
pub struct Keypair {
    pub private: Private,
    pub public: Public,
}

impl Keypair {
    /// Generates a new keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_private(Scalar::rand(rng))
    }

    /// Derives the public key of an existing private key.
    pub fn from_private(private: Private) -> Self {
        let public = Point::mul_base(&private);
        Self { private, public }
    }
}

/// Returns a uniformly random point in the subgroup.
pub fn random_point<R: RngCore + CryptoRng>(rng: &mut R) -> Point {
    Point::mul_base(&Scalar::rand(rng))
}

/// Encrypts `message` under `public` with the provided nonce.
///
/// Fails if `public` is the identity (which would leave the message in the clear).
pub fn encrypt(public: &Public, message: &Point, nonce: &Scalar) -> Result<Ciphertext, Error> {
    if public.is_zero() {
        return Err(Error::InvalidPublicKey);
    }
    let ephemeral = Point::mul_base(nonce);
    let mut encrypted = *public;
    encrypted.mul(nonce);
    encrypted.add(message);
    Ok(Ciphertext {
        ephemeral,
        encrypted,
    })
}

/// Encrypts `message` under `public` with a fresh random nonce.
///
/// The nonce is returned alongside the ciphertext since proving statements about the
/// ciphertext requires it.
pub fn encrypt_random<R: RngCore + CryptoRng>(
    rng: &mut R,
    public: &Public,
    message: &Point,
) -> Result<(Ciphertext, Scalar), Error> {
    let nonce = Scalar::rand(rng);
    let ciphertext = encrypt(public, message, &nonce)?;
    Ok((ciphertext, nonce))
}

/// Decrypts a ciphertext with the full secret key.
pub fn decrypt(private: &Private, ciphertext: &Ciphertext) -> Point {
    let mut mask = ciphertext.ephemeral;
    mask.mul(private);
    let mut message = ciphertext.encrypted;
    message.sub(&mask);
    message
}

/// Re-randomizes a ciphertext so that it is unlinkable to the original but decrypts to the
/// same message (as if it had been generated with nonce `y + z`).
pub fn rerandomize(public: &Public, ciphertext: &Ciphertext, z: &Scalar) -> Ciphertext {
    let mut ephemeral = ciphertext.ephemeral;
    ephemeral.add(&Point::mul_base(z));
    let mut mask = *public;
    mask.mul(z);
    let mut encrypted = ciphertext.encrypted;
    encrypted.add(&mask);
    Ciphertext {
        ephemeral,
        encrypted,
    }
}

/// Samples a random point whose circomlib `x` coordinate is odd iff `side` is set.
///
/// Each attempt succeeds with probability close to one half.
pub fn encode_side<R: RngCore + CryptoRng>(rng: &mut R, side: bool) -> Point {
    loop {
        let candidate = random_point(rng);
        if candidate.is_odd() == side {
            return candidate;
        }
    }
}

/// Recovers the side from an encoded side point.
pub fn decode_side(point: &Point) -> bool {
    point.is_odd()
}
