//! Group operations over the Baby Jubjub prime-order subgroup.
//!
//! Arithmetic runs on the `a = 1` twisted Edwards model of Baby Jubjub provided by
//! `ark-ed-on-bn254`. The circuit that checks bets is written against the circomlib
//! model of the same curve (`a = 168700`, `d = 168696`), so any coordinate that leaves
//! this crate (parity of an encoded side, inputs to the commitment hash) is first mapped
//! into that model with [Point::to_circom]. The two models are isomorphic through
//! `x = sqrt(168700) * x_circom` (`y` is unchanged), and the generator used here is the
//! image of circomlib's `Base8`.
//!
//! # Warning
//!
//! Points received from untrusted sources must be checked to belong to the prime-order
//! subgroup to prevent small subgroup attacks. [Element::deserialize] and
//! [Point::from_circom] already do this for you.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective, Fq, Fr};
use ark_ff::{BigInteger, Field, MontFp, One, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::Zeroize;

/// An element of a group.
pub trait Element: Clone + Eq + PartialEq + Send + Sync {
    /// Returns the additive identity.
    fn zero() -> Self;

    /// Returns the multiplicative identity.
    fn one() -> Self;

    /// Adds to self in-place.
    fn add(&mut self, rhs: &Self);

    /// Multiplies self in-place.
    fn mul(&mut self, rhs: &Scalar);

    /// Canonically serializes the element.
    fn serialize(&self) -> Vec<u8>;

    /// Serialized size of the element.
    fn size() -> usize;

    /// Deserializes a canonically encoded element.
    fn deserialize(bytes: &[u8]) -> Option<Self>;
}

/// Serialized size of a [Scalar] (little-endian).
pub const SCALAR_LENGTH: usize = 32;

/// Serialized size of a [Point] (compressed).
pub const POINT_LENGTH: usize = 32;

/// `sqrt(168700)` in the base field.
const SQRT_A: Fq =
    MontFp!("7214280148105020021932206872019688659210616427216992810330019057549499971851");

/// `sqrt(168700)^-1` in the base field.
const SQRT_A_INV: Fq =
    MontFp!("2957874849018779266517920829765869116077630550401372566248359756137677864698");

/// Generator (circomlib `Base8`) expressed on the `a = 1` model.
const BASE_X: Fq =
    MontFp!("15863623088992515880085393097393553694825975317405843389771115419751650972659");
const BASE_Y: Fq =
    MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203");

fn base() -> EdwardsAffine {
    EdwardsAffine::new_unchecked(BASE_X, BASE_Y)
}

/// An integer modulo the order `r` of the Baby Jubjub subgroup.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Scalar(Fr);

pub type Private = Scalar;
pub type Public = Point;

impl Scalar {
    /// Generates a uniformly random scalar using the provided RNG.
    ///
    /// 512 random bits are reduced modulo `r`, which leaves a bias far below
    /// anything observable for a 251-bit modulus.
    pub fn rand<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        let scalar = Fr::from_le_bytes_mod_order(&wide);
        wide.zeroize();
        Self(scalar)
    }

    /// Reduces a big-endian integer of any width modulo `r`.
    pub fn reduce(bytes: &[u8]) -> Self {
        Self(Fr::from_be_bytes_mod_order(bytes))
    }

    /// Returns the scalar corresponding to an unsigned integer.
    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// Returns the scalar corresponding to a participant index.
    pub fn from_index(index: u32) -> Self {
        Self::from_u64(index as u64)
    }

    /// Returns the scalar corresponding to a signed integer (negative values wrap around `r`).
    pub fn from_i64(value: i64) -> Self {
        let magnitude = Fr::from(value.unsigned_abs());
        if value < 0 {
            Self(-magnitude)
        } else {
            Self(magnitude)
        }
    }

    /// Returns whether the scalar is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Computes the inverse of the scalar.
    pub fn inverse(&self) -> Option<Self> {
        self.0.inverse().map(Self)
    }

    /// Subtracts the provided scalar from self in-place.
    pub fn sub(&mut self, rhs: &Self) {
        self.0 -= rhs.0;
    }

    /// Negates self in-place.
    pub fn negate(&mut self) {
        self.0 = -self.0;
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.into_bigint())
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Element for Scalar {
    fn zero() -> Self {
        Self(Fr::zero())
    }

    fn one() -> Self {
        Self(Fr::one())
    }

    fn add(&mut self, rhs: &Self) {
        self.0 += rhs.0;
    }

    fn mul(&mut self, rhs: &Self) {
        self.0 *= rhs.0;
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SCALAR_LENGTH);
        self.0
            .serialize_compressed(&mut bytes)
            .expect("writing to a vector cannot fail");
        bytes
    }

    fn size() -> usize {
        SCALAR_LENGTH
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SCALAR_LENGTH {
            return None;
        }

        // Rejects encodings that are not reduced modulo `r`
        Fr::deserialize_compressed(bytes).ok().map(Self)
    }
}

impl Write for Scalar {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.serialize());
    }
}

impl Read for Scalar {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let bytes = <[u8; SCALAR_LENGTH]>::read(buf)?;
        <Self as Element>::deserialize(&bytes).ok_or(CodecError::Invalid("Scalar", "not reduced"))
    }
}

impl FixedSize for Scalar {
    const SIZE: usize = SCALAR_LENGTH;
}

/// A point in the prime-order subgroup of Baby Jubjub.
#[derive(Clone, Copy, Eq, PartialEq)]
#[repr(transparent)]
pub struct Point(EdwardsProjective);

impl Point {
    /// Returns `Base^s`.
    pub fn mul_base(s: &Scalar) -> Self {
        Self(base() * s.0)
    }

    /// Subtracts the provided point from self in-place.
    pub fn sub(&mut self, rhs: &Self) {
        self.0 -= rhs.0;
    }

    /// Negates self in-place.
    pub fn negate(&mut self) {
        self.0 = -self.0;
    }

    /// Returns whether the point is the identity.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns the affine coordinates of the point in the circomlib model.
    pub fn to_circom(&self) -> (Fq, Fq) {
        let affine = self.0.into_affine();
        (affine.x * SQRT_A_INV, affine.y)
    }

    /// Constructs a point from circomlib affine coordinates.
    ///
    /// Returns `None` if the coordinates are not on the curve or the point is
    /// outside of the prime-order subgroup.
    pub fn from_circom(x: Fq, y: Fq) -> Option<Self> {
        let affine = EdwardsAffine::new_unchecked(x * SQRT_A, y);
        if !affine.is_on_curve() || !affine.is_in_correct_subgroup_assuming_on_curve() {
            return None;
        }
        Some(Self(affine.into_group()))
    }

    /// Returns whether the circomlib `x` coordinate is odd.
    pub fn is_odd(&self) -> bool {
        let (x, _) = self.to_circom();
        x.into_bigint().is_odd()
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_circom();
        f.debug_struct("Point")
            .field("x", &x.into_bigint().to_string())
            .field("y", &y.into_bigint().to_string())
            .finish()
    }
}

impl Element for Point {
    fn zero() -> Self {
        Self(EdwardsProjective::zero())
    }

    fn one() -> Self {
        Self(base().into_group())
    }

    fn add(&mut self, rhs: &Self) {
        self.0 += rhs.0;
    }

    fn mul(&mut self, rhs: &Scalar) {
        self.0 *= rhs.0;
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(POINT_LENGTH);
        self.0
            .into_affine()
            .serialize_compressed(&mut bytes)
            .expect("writing to a vector cannot fail");
        bytes
    }

    fn size() -> usize {
        POINT_LENGTH
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != POINT_LENGTH {
            return None;
        }

        // Checks that the point is on the curve and in the prime-order subgroup
        let affine = EdwardsAffine::deserialize_compressed(bytes).ok()?;

        // Verify that the deserialized element isn't the identity
        if affine.is_zero() {
            return None;
        }
        Some(Self(affine.into_group()))
    }
}

impl Write for Point {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.serialize());
    }
}

impl Read for Point {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let bytes = <[u8; POINT_LENGTH]>::read(buf)?;
        <Self as Element>::deserialize(&bytes)
            .ok_or(CodecError::Invalid("Point", "identity or outside subgroup"))
    }
}

impl FixedSize for Point {
    const SIZE: usize = POINT_LENGTH;
}

/// A member's share of the joint secret.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyShare {
    /// The member's 1-based index.
    pub index: u32,
    /// The member's share of the secret.
    pub private: Private,
}

impl KeyShare {
    /// Returns the public key corresponding to the share.
    ///
    /// This can be verified against the joint public polynomial.
    pub fn public(&self) -> Public {
        Point::mul_base(&self.private)
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
