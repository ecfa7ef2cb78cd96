//! Stateless operations useful in a DKG procedure.

use crate::babyjubjub::{
    primitives::{
        self,
        group::{Element, KeyShare, Point, Scalar},
        poly::{self, Eval},
    },
    vss::{Error, Share},
};
use rand::{CryptoRng, RngCore};

impl From<primitives::Error> for Error {
    fn from(err: primitives::Error) -> Self {
        match err {
            primitives::Error::InvalidThreshold => Error::InvalidThreshold,
            primitives::Error::NotEnoughEvaluations(provided, required) => {
                Error::InsufficientShares(provided, required)
            }
            primitives::Error::ZeroIndex => Error::InvalidIndex(0),
            primitives::Error::DuplicateEval(index) => Error::DuplicateIndex(index),
            primitives::Error::NoInverse => Error::NoInverse,
        }
    }
}

/// Generate a secret polynomial of degree `t - 1` and commit to it.
///
/// The constant term is the dealer's contribution to the joint secret.
pub fn generate_polynomial<R: RngCore + CryptoRng>(
    rng: &mut R,
    t: u32,
) -> Result<(poly::Private, poly::Public), Error> {
    let degree = t.checked_sub(1).ok_or(Error::InvalidThreshold)?;
    let secret = poly::new_from(degree, rng);
    let commitment = poly::Public::commit(secret.clone());
    Ok((secret, commitment))
}

/// Generate a commitment and the shares for participants `1..=n`.
pub fn generate_shares<R: RngCore + CryptoRng>(
    rng: &mut R,
    dealer: u32,
    n: u32,
    t: u32,
) -> Result<(poly::Public, Vec<Share>), Error> {
    let (secret, commitment) = generate_polynomial(rng, t)?;
    let shares = (1..=n)
        .map(|index| {
            let eval = secret.evaluate(index);
            Share {
                dealer,
                index: eval.index,
                private: eval.value,
            }
        })
        .collect();
    Ok((commitment, shares))
}

/// Compute the share `f(index)` that `dealer` sends to the participant at `index`.
///
/// Index `0` is the secret itself and is never dealt.
pub fn compute_share(secret: &poly::Private, dealer: u32, index: u32) -> Result<Share, Error> {
    if index == 0 {
        return Err(Error::InvalidIndex(index));
    }
    let eval = secret.evaluate(index);
    Ok(Share {
        dealer,
        index,
        private: eval.value,
    })
}

/// Verify that a commitment has the degree expected for threshold `t`.
pub fn verify_commitment(commitment: &poly::Public, t: u32) -> Result<(), Error> {
    let degree = t.checked_sub(1).ok_or(Error::InvalidThreshold)?;
    if commitment.degree() != degree {
        return Err(Error::CommitmentWrongDegree);
    }
    Ok(())
}

/// Verify that a given share is valid for a specified recipient.
///
/// Checks `Base^share == sum_k C_k^{index^k}`.
pub fn verify_share(commitment: &poly::Public, recipient: u32, share: &Share) -> Result<(), Error> {
    if share.index == 0 {
        return Err(Error::InvalidIndex(share.index));
    }
    if share.index != recipient {
        return Err(Error::MisdirectedShare);
    }
    let expected = Point::mul_base(&share.private);
    let given = commitment.evaluate(share.index);
    if given.value != expected {
        return Err(Error::ShareWrongCommitment);
    }
    Ok(())
}

/// Construct the group polynomial by summing all commitments.
///
/// The constant term of the result is the joint public key.
pub fn construct_public<'a, I>(commitments: I, required: u32) -> Result<poly::Public, Error>
where
    I: IntoIterator<Item = &'a poly::Public>,
{
    let mut public = poly::Public::zero();
    let mut count = 0u32;
    for commitment in commitments {
        public.add(commitment);
        count += 1;
    }
    if count < required {
        return Err(Error::InsufficientDealings);
    }
    Ok(public)
}

/// Combine the shares dealt to `index` into its share of the joint secret.
pub fn combine_shares(index: u32, shares: &[Share]) -> Result<KeyShare, Error> {
    if index == 0 {
        return Err(Error::InvalidIndex(index));
    }
    if shares.is_empty() {
        return Err(Error::InsufficientDealings);
    }
    let mut private = Scalar::zero();
    for share in shares {
        if share.index != index {
            return Err(Error::MisdirectedShare);
        }
        private.add(&share.private);
    }
    Ok(KeyShare { index, private })
}

/// Compute the Lagrange coefficient of `index` at zero over `indices`.
pub fn lagrange_coefficient(index: u32, indices: &[u32]) -> Result<Scalar, Error> {
    if index == 0 || indices.contains(&0) {
        return Err(Error::InvalidIndex(0));
    }
    if !indices.contains(&index) {
        return Err(Error::InvalidIndex(index));
    }
    Ok(poly::lagrange_coefficient(index, indices)?)
}

/// Reconstruct the joint secret from at least `t` shares.
///
/// Fails if `t` is zero, fewer than `t` shares are provided, or an index is zero or repeated.
pub fn reconstruct_secret(t: u32, shares: &[KeyShare]) -> Result<Scalar, Error> {
    let evals = shares
        .iter()
        .map(|share| Eval {
            index: share.index,
            value: share.private,
        })
        .collect::<Vec<_>>();
    Ok(poly::Private::recover(t, &evals)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, thread_rng, SeedableRng};
    use test_case::test_case;

    fn run_dkg(n: u32, t: u32, seed: u64) -> (poly::Public, Vec<KeyShare>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let dealings = (1..=n)
            .map(|dealer| generate_shares(&mut rng, dealer, n, t).unwrap())
            .collect::<Vec<_>>();
        for (commitment, _) in &dealings {
            verify_commitment(commitment, t).unwrap();
        }
        let shares = (1..=n)
            .map(|recipient| {
                let received = dealings
                    .iter()
                    .map(|(commitment, dealt)| {
                        let share = dealt[(recipient - 1) as usize];
                        verify_share(commitment, recipient, &share).unwrap();
                        share
                    })
                    .collect::<Vec<_>>();
                combine_shares(recipient, &received).unwrap()
            })
            .collect::<Vec<_>>();
        let public = construct_public(dealings.iter().map(|(c, _)| c), n).unwrap();
        (public, shares)
    }

    #[test]
    fn every_index_verifies() {
        let n = 7;
        let (commitment, shares) = generate_shares(&mut thread_rng(), 1, n, 4).unwrap();
        for share in &shares {
            verify_share(&commitment, share.index, share).unwrap();
        }
    }

    #[test]
    fn perturbed_share_fails() {
        let (commitment, shares) = generate_shares(&mut thread_rng(), 1, 5, 3).unwrap();
        for share in shares {
            let mut bad = share;
            bad.private.add(&Scalar::one());
            assert_eq!(
                verify_share(&commitment, bad.index, &bad),
                Err(Error::ShareWrongCommitment)
            );
        }
    }

    #[test]
    fn misdirected_share_fails() {
        let (commitment, shares) = generate_shares(&mut thread_rng(), 1, 3, 2).unwrap();
        assert_eq!(
            verify_share(&commitment, 2, &shares[0]),
            Err(Error::MisdirectedShare)
        );
    }

    #[test]
    fn share_for_secret_index_rejected() {
        let (secret, _) = generate_polynomial(&mut thread_rng(), 2).unwrap();
        assert_eq!(compute_share(&secret, 1, 0), Err(Error::InvalidIndex(0)));
        let share = compute_share(&secret, 1, 3).unwrap();
        assert_eq!(share.index, 3);
        assert_eq!(share.private, secret.evaluate(3).value);
    }

    #[test]
    fn wrong_degree_commitment() {
        let (_, commitment) = generate_polynomial(&mut thread_rng(), 3).unwrap();
        assert_eq!(
            verify_commitment(&commitment, 2),
            Err(Error::CommitmentWrongDegree)
        );
    }

    #[test_case(2, 2; "two of two")]
    #[test_case(3, 2; "two of three")]
    #[test_case(5, 3; "three of five")]
    #[test_case(7, 5; "five of seven")]
    fn joint_secret_reconstructs(n: u32, t: u32) {
        let (public, shares) = run_dkg(n, t, n as u64 * 100 + t as u64);
        let joint = *poly::public(&public);

        // Every final share lies on the group polynomial
        for share in &shares {
            assert_eq!(share.public(), public.evaluate(share.index).value);
        }

        // Every window of t shares recovers the same secret
        for start in 0..=(n - t) as usize {
            let subset = &shares[start..start + t as usize];
            let secret = reconstruct_secret(t, subset).unwrap();
            assert_eq!(Point::mul_base(&secret), joint);
        }
    }

    #[test]
    fn two_of_three_subsets_agree() {
        let (public, shares) = run_dkg(3, 2, 42);
        let subsets = [[0, 1], [0, 2], [1, 2]];
        let secrets = subsets
            .iter()
            .map(|s| reconstruct_secret(2, &[shares[s[0]], shares[s[1]]]).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(secrets[0], secrets[1]);
        assert_eq!(secrets[1], secrets[2]);
        assert_eq!(Point::mul_base(&secrets[0]), *poly::public(&public));
    }

    #[test]
    fn reconstruction_below_threshold_fails() {
        let (_, shares) = run_dkg(4, 3, 7);
        assert_eq!(
            reconstruct_secret(3, &shares[..2]),
            Err(Error::InsufficientShares(2, 3))
        );
    }

    #[test]
    fn reconstruction_rejects_duplicates() {
        let (_, shares) = run_dkg(3, 2, 9);
        assert_eq!(
            reconstruct_secret(2, &[shares[0], shares[0]]),
            Err(Error::DuplicateIndex(1))
        );
        let zero = KeyShare {
            index: 0,
            private: Scalar::one(),
        };
        assert_eq!(
            reconstruct_secret(2, &[zero, shares[1]]),
            Err(Error::InvalidIndex(0))
        );
    }

    #[test]
    fn lagrange_coefficient_validation() {
        assert_eq!(lagrange_coefficient(0, &[1, 2]), Err(Error::InvalidIndex(0)));
        assert_eq!(lagrange_coefficient(3, &[1, 2]), Err(Error::InvalidIndex(3)));

        // For {1, 2}: l_1 = 2, l_2 = -1
        assert_eq!(lagrange_coefficient(1, &[1, 2]).unwrap(), Scalar::from_u64(2));
        assert_eq!(lagrange_coefficient(2, &[1, 2]).unwrap(), Scalar::from_i64(-1));
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut rng = thread_rng();
        assert_eq!(
            generate_polynomial(&mut rng, 0).unwrap_err(),
            Error::InvalidThreshold
        );
        assert_eq!(
            generate_shares(&mut rng, 1, 3, 0).unwrap_err(),
            Error::InvalidThreshold
        );
        let (_, commitment) = generate_polynomial(&mut rng, 1).unwrap();
        assert_eq!(
            verify_commitment(&commitment, 0),
            Err(Error::InvalidThreshold)
        );
        assert_eq!(reconstruct_secret(0, &[]), Err(Error::InvalidThreshold));
        let share = KeyShare {
            index: 1,
            private: Scalar::one(),
        };
        assert_eq!(reconstruct_secret(0, &[share]), Err(Error::InvalidThreshold));
    }

    #[test]
    fn insufficient_dealings() {
        let (_, commitment) = generate_polynomial(&mut thread_rng(), 2).unwrap();
        assert_eq!(
            construct_public([&commitment], 2),
            Err(Error::InsufficientDealings)
        );
    }
}
