//! Bet commitments binding an encrypted side to its opening.
//!
//! A bet commits to `Poseidon(x, y, side, salt, amount, address)` where `(x, y)` are the
//! circomlib coordinates of the encoded side point. The hash is the circom-compatible
//! Poseidon over the BN254 scalar field (which is the Baby Jubjub base field), so the
//! value matches what the bet circuit computes over the same inputs.
//!
//! Building the Poseidon parameters is comparatively expensive, so the [Hasher] is an
//! explicit handle that must be initialized once before use. Hashing with an
//! uninitialized handle fails with [Error::Uninitialized].

use crate::babyjubjub::{
    elgamal::{self, Ciphertext},
    primitives::group::{Point, Public, Scalar},
};
use ark_bn254::Fr;
use ark_ed_on_bn254::Fq;
use ark_ff::{BigInteger, PrimeField, Zero};
use commonware_utils::{from_hex_formatted, hex};
use light_poseidon::{Poseidon, PoseidonHasher};
use rand::{CryptoRng, RngCore};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Number of inputs to the commitment hash.
pub const INPUTS: usize = 6;

/// Length of an account address.
pub const ADDRESS_LENGTH: usize = 20;

/// Errors that can occur when committing to a bet.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("hasher not initialized")]
    Uninitialized,
    #[error("poseidon failure: {0}")]
    Poseidon(String),
    #[error("invalid address")]
    InvalidAddress,
    #[error("encryption failed: {0}")]
    Encryption(#[from] elgamal::Error),
}

/// A 160-bit account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the address as a field element (big-endian integer).
    pub fn to_field(&self) -> Fq {
        Fq::from_be_bytes_mod_order(&self.0)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parses a 20-byte address with an optional `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = from_hex_formatted(s).ok_or(Error::InvalidAddress)?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| Error::InvalidAddress)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The opening of a bet commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bet {
    pub side: bool,
    pub salt: Fq,
    pub amount: u128,
    pub address: Address,
}

/// Everything a bet transaction carries (and the secrets needed to prove it).
#[derive(Clone, Debug)]
pub struct Prepared {
    /// The encoded side point (plaintext of `ciphertext`).
    pub encoded: Point,
    pub ciphertext: Ciphertext,
    /// The encryption nonce.
    pub nonce: Scalar,
    pub commitment: Fq,
}

/// Returns a random salt.
pub fn random_salt<R: RngCore + CryptoRng>(rng: &mut R) -> Fq {
    let mut wide = [0u8; 64];
    rng.fill_bytes(&mut wide);
    Fq::from_le_bytes_mod_order(&wide)
}

fn to_hash_field(value: &Fq) -> Fr {
    Fr::from_le_bytes_mod_order(&value.into_bigint().to_bytes_le())
}

fn from_hash_field(value: &Fr) -> Fq {
    Fq::from_le_bytes_mod_order(&value.into_bigint().to_bytes_le())
}

/// Circom-compatible Poseidon over the bet inputs.
#[derive(Default)]
pub struct Hasher {
    poseidon: Option<Poseidon<Fr>>,
}

impl Hasher {
    /// Creates an uninitialized hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hasher that is ready for use.
    pub fn initialized() -> Result<Self, Error> {
        let mut hasher = Self::new();
        hasher.initialize()?;
        Ok(hasher)
    }

    /// Builds the Poseidon parameters. Calling this more than once is a no-op.
    pub fn initialize(&mut self) -> Result<(), Error> {
        if self.poseidon.is_none() {
            let poseidon = Poseidon::<Fr>::new_circom(INPUTS)
                .map_err(|err| Error::Poseidon(err.to_string()))?;
            self.poseidon = Some(poseidon);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.poseidon.is_some()
    }

    /// Hashes the raw inputs in circuit order.
    pub fn hash_inputs(&mut self, inputs: &[Fq; INPUTS]) -> Result<Fq, Error> {
        let poseidon = self.poseidon.as_mut().ok_or(Error::Uninitialized)?;
        let inputs = inputs.iter().map(to_hash_field).collect::<Vec<_>>();
        let digest = poseidon
            .hash(&inputs)
            .map_err(|err| Error::Poseidon(err.to_string()))?;
        Ok(from_hash_field(&digest))
    }

    /// Computes the commitment to `bet` with the encoded side point `encoded`.
    pub fn commit(&mut self, encoded: &Point, bet: &Bet) -> Result<Fq, Error> {
        let (x, y) = encoded.to_circom();
        let side = if bet.side { Fq::from(1u64) } else { Fq::zero() };
        self.hash_inputs(&[
            x,
            y,
            side,
            bet.salt,
            Fq::from(bet.amount),
            bet.address.to_field(),
        ])
    }
}

/// Encodes the side of `bet`, encrypts it under the joint key and commits to the opening.
pub fn prepare_bet<R: RngCore + CryptoRng>(
    rng: &mut R,
    hasher: &mut Hasher,
    bet: &Bet,
    public: &Public,
) -> Result<Prepared, Error> {
    // Fail before sampling if the hasher cannot be used
    if !hasher.is_initialized() {
        return Err(Error::Uninitialized);
    }
    let encoded = elgamal::encode_side(rng, bet.side);
    let (ciphertext, nonce) = elgamal::encrypt_random(rng, public, &encoded)?;
    let commitment = hasher.commit(&encoded, bet)?;
    Ok(Prepared {
        encoded,
        ciphertext,
        nonce,
        commitment,
    })
}
