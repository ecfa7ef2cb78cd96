use apm_cryptography::babyjubjub::elgamal::{decrypt, encode_side, encrypt_random, Keypair};
use criterion::{criterion_group, BatchSize, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;

fn benchmark_encrypt(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let keypair = Keypair::generate(&mut rng);
    c.bench_function(&format!("{}/encode_encrypt", module_path!()), |b| {
        b.iter(|| {
            let message = encode_side(&mut rng, true);
            black_box(encrypt_random(&mut rng, &keypair.public, &message).unwrap());
        });
    });
    c.bench_function(&format!("{}/decrypt", module_path!()), |b| {
        b.iter_batched(
            || {
                let message = encode_side(&mut rng, false);
                encrypt_random(&mut rng, &keypair.public, &message)
                    .unwrap()
                    .0
            },
            |ciphertext| black_box(decrypt(&keypair.private, &ciphertext)),
            BatchSize::SmallInput,
        );
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark_encrypt
}
