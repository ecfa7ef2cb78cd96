use apm_cryptography::babyjubjub::{
    elgamal::{encode_side, encrypt_random},
    primitives::poly,
    threshold::{combine, partial_decrypt},
    vss::ops,
};
use criterion::{criterion_group, BatchSize, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;

const COMMITTEES: &[(u32, u32)] = &[(3, 2), (5, 3), (10, 7)];

fn benchmark_threshold_decrypt(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    for &(n, t) in COMMITTEES {
        c.bench_function(
            &format!("{}/combine n={} t={}", module_path!(), n, t),
            |b| {
                b.iter_batched(
                    || {
                        let dealings = (1..=n)
                            .map(|dealer| ops::generate_shares(&mut rng, dealer, n, t).unwrap())
                            .collect::<Vec<_>>();
                        let public =
                            ops::construct_public(dealings.iter().map(|(c, _)| c), n).unwrap();
                        let message = encode_side(&mut rng, true);
                        let (ciphertext, _) =
                            encrypt_random(&mut rng, poly::public(&public), &message).unwrap();
                        let partials = (1..=n)
                            .map(|recipient| {
                                let received = dealings
                                    .iter()
                                    .map(|(_, dealt)| dealt[(recipient - 1) as usize])
                                    .collect::<Vec<_>>();
                                let share = ops::combine_shares(recipient, &received).unwrap();
                                partial_decrypt(&share, &ciphertext)
                            })
                            .collect::<Vec<_>>();
                        (ciphertext, partials)
                    },
                    |(ciphertext, partials)| {
                        black_box(combine(t, &partials, &ciphertext).unwrap());
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark_threshold_decrypt
}
