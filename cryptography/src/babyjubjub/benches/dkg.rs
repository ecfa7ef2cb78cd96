use apm_cryptography::babyjubjub::vss::ops;
use criterion::{criterion_group, BatchSize, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;

const CONTRIBUTORS: &[(u32, u32)] = &[(3, 2), (5, 3), (10, 7), (20, 14)];

fn benchmark_generate_shares(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    for &(n, t) in CONTRIBUTORS {
        c.bench_function(
            &format!("{}/generate n={} t={}", module_path!(), n, t),
            |b| {
                b.iter(|| black_box(ops::generate_shares(&mut rng, 1, n, t).unwrap()));
            },
        );
    }
}

fn benchmark_verify_share(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    for &(n, t) in CONTRIBUTORS {
        c.bench_function(
            &format!("{}/verify n={} t={}", module_path!(), n, t),
            |b| {
                b.iter_batched(
                    || {
                        let (commitment, shares) = ops::generate_shares(&mut rng, 1, n, t).unwrap();
                        (commitment, shares[(n - 1) as usize])
                    },
                    |(commitment, share)| {
                        ops::verify_share(&commitment, share.index, &share).unwrap();
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

fn benchmark_reconstruct(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    for &(n, t) in CONTRIBUTORS {
        c.bench_function(
            &format!("{}/reconstruct n={} t={}", module_path!(), n, t),
            |b| {
                b.iter_batched(
                    || {
                        let (_, shares) = ops::generate_shares(&mut rng, 1, n, t).unwrap();
                        shares
                            .into_iter()
                            .map(|share| ops::combine_shares(share.index, &[share]).unwrap())
                            .collect::<Vec<_>>()
                    },
                    |shares| {
                        black_box(ops::reconstruct_secret(t, &shares).unwrap());
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
    targets = benchmark_generate_shares, benchmark_verify_share, benchmark_reconstruct
}
