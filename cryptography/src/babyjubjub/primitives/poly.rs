//! Polynomial operations over the Baby Jubjub scalar field.
//!
//! Participants are identified by 1-based indices and a share for index `i` is the
//! evaluation of the polynomial at `x = i`. The evaluation at `x = 0` is the secret
//! itself, so it is never produced for a participant.
//!
//! # Warning
//!
//! The security of the polynomial operations is critical for the overall
//! security of the threshold schemes. Ensure that the scalar field operations
//! are performed over the correct field and that all elements are valid.

use crate::babyjubjub::primitives::{
    group::{self, Element, Scalar},
    Error,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadRangeExt, Write};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use std::collections::BTreeSet;

/// Private polynomials are used to generate secret shares.
pub type Private = Poly<group::Private>;

/// Public polynomials represent commitments to secrets on a private polynomial.
pub type Public = Poly<group::Public>;

/// A polynomial evaluation at a specific index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eval<C: Element> {
    pub index: u32,
    pub value: C,
}

/// A polynomial that is using a scalar for the variable x and a generic
/// element for the coefficients.
///
/// The coefficients must be able to multiply the type of the variable,
/// which is always a scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
// Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L24-L28
pub struct Poly<C>(Vec<C>);

/// Returns a new scalar polynomial of the given degree where each coefficient is
/// sampled at random using kernel randomness.
///
/// In the context of secret sharing, the threshold is the degree + 1.
pub fn new(degree: u32) -> Poly<Scalar> {
    new_from(degree, &mut OsRng)
}

/// Returns a new scalar polynomial of the given degree where each coefficient is
/// sampled at random from the provided RNG.
///
/// In the context of secret sharing, the threshold is the degree + 1.
pub fn new_from<R: RngCore + CryptoRng>(degree: u32, rng: &mut R) -> Poly<Scalar> {
    let coeffs = (0..=degree).map(|_| Scalar::rand(rng)).collect::<Vec<_>>();
    Poly::<Scalar>(coeffs)
}

impl<C> Poly<C> {
    /// Creates a new polynomial from the given coefficients.
    ///
    /// The coefficient vector must not be empty.
    pub fn from(c: Vec<C>) -> Self {
        Self(c)
    }

    /// Returns the constant term of the polynomial.
    pub fn constant(&self) -> &C {
        &self.0[0]
    }

    /// Returns the degree of the polynomial
    pub fn degree(&self) -> u32 {
        (self.0.len() - 1) as u32 // coefficient count is bounded by the threshold
    }

    /// Returns the number of required shares to reconstruct the polynomial.
    ///
    /// This will be the threshold
    pub fn required(&self) -> u32 {
        self.0.len() as u32
    }

    /// Returns the coefficients in ascending order of degree.
    pub fn coefficients(&self) -> &[C] {
        &self.0
    }
}

impl<C: Element> Poly<C> {
    /// Commits the scalar polynomial to the group and returns a polynomial over
    /// the group.
    ///
    /// This is done by multiplying each coefficient of the polynomial with the
    /// group's generator.
    pub fn commit(commits: Poly<Scalar>) -> Self {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L322-L340
        let commits = commits
            .0
            .iter()
            .map(|c| {
                let mut commitment = C::one();
                commitment.mul(c);
                commitment
            })
            .collect::<Vec<C>>();

        Poly::<C>::from(commits)
    }

    /// Returns a zero polynomial.
    pub fn zero() -> Self {
        Self::from(vec![C::zero()])
    }

    /// Performs polynomial addition in place
    pub fn add(&mut self, other: &Self) {
        // if we have a smaller degree we should pad with zeros
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), C::zero())
        }

        self.0.iter_mut().zip(&other.0).for_each(|(a, b)| a.add(b))
    }

    /// Evaluates the polynomial at `x = index`.
    pub fn evaluate(&self, index: u32) -> Eval<C> {
        let xi = Scalar::from_index(index);

        // Use Horner's method to evaluate the polynomial
        let value = self.0.iter().rev().fold(C::zero(), |mut sum, coeff| {
            sum.mul(&xi);
            sum.add(coeff);
            sum
        });
        Eval { index, value }
    }

    /// Recovers the constant term of a polynomial of degree less than `t` using at least `t` evaluations.
    ///
    /// Evaluations are sorted by index and the first `t` are interpolated at `x = 0`, so two
    /// invocations over the same set select the same evaluations. Indices must be non-zero and
    /// distinct across the whole set. A threshold of zero is rejected.
    pub fn recover<'a, I>(t: u32, evals: I) -> Result<C, Error>
    where
        C: 'a,
        I: IntoIterator<Item = &'a Eval<C>>,
    {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L131-L165
        if t == 0 {
            return Err(Error::InvalidThreshold);
        }
        let mut evals = evals.into_iter().collect::<Vec<_>>();
        if evals.len() < t as usize {
            return Err(Error::NotEnoughEvaluations(evals.len(), t));
        }
        evals.sort_by_key(|e| e.index);

        // Reject malformed sets before interpolating
        let mut seen = BTreeSet::new();
        for eval in &evals {
            if eval.index == 0 {
                return Err(Error::ZeroIndex);
            }
            if !seen.insert(eval.index) {
                return Err(Error::DuplicateEval(eval.index));
            }
        }

        let selected = &evals[..t as usize];
        let indices = selected.iter().map(|e| e.index).collect::<Vec<_>>();
        selected.iter().try_fold(C::zero(), |mut acc, eval| {
            let weight = lagrange_coefficient(eval.index, &indices)?;
            let mut scaled = eval.value.clone();
            scaled.mul(&weight);
            acc.add(&scaled);
            Ok(acc)
        })
    }
}

/// Computes the Lagrange basis coefficient of `index` at `x = 0` over the set `indices`.
///
/// `l_i(0) = prod_{j != i} (x_j / (x_j - x_i))`
pub fn lagrange_coefficient(index: u32, indices: &[u32]) -> Result<Scalar, Error> {
    let xi = Scalar::from_index(index);
    let (mut num, den) = indices.iter().filter(|j| **j != index).fold(
        (Scalar::one(), Scalar::one()),
        |(mut num, mut den), j| {
            let xj = Scalar::from_index(*j);

            // Include `xj` in the numerator product
            num.mul(&xj);

            // Compute `xj - xi` and include it in the denominator product
            let mut diff = xj;
            diff.sub(&xi);
            den.mul(&diff);
            (num, den)
        },
    );
    let inv = den.inverse().ok_or(Error::NoInverse)?;
    num.mul(&inv);
    Ok(num)
}

impl<C: Write> Write for Poly<C> {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl<C: Read<Cfg = ()>> Read for Poly<C> {
    /// The maximum number of coefficients accepted.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        let coeffs = Vec::<C>::read_range(buf, 1..=*max)?;
        Ok(Self(coeffs))
    }
}

impl<C: EncodeSize> EncodeSize for Poly<C> {
    fn encode_size(&self) -> usize {
        self.0.encode_size()
    }
}

/// Returns the public key of the polynomial (constant term).
pub fn public(public: &Public) -> &group::Public {
    public.constant()
}
