//! Performance benchmarks for dni-crypto.
//!
//! Run with: `cargo bench -p dni-crypto`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dni_crypto::aead::SessionCipher;
use dni_crypto::hash::{hash, hkdf_expand, hkdf_extract};
use dni_crypto::noise::{NoiseHandshake, StaticKeypair};

fn bench_aead_encrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("aead_encrypt");
    let sizes = [64, 256, 1024, 4096, 16384, 65536];

    for size in sizes {
        let cipher = SessionCipher::new(&[0x42u8; 32]);
        let plaintext = vec![0xAA; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| cipher.encrypt(black_box(0), black_box(&plaintext)))
        });
    }

    group.finish();
}

fn bench_aead_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("aead_decrypt");
    let sizes = [64, 256, 1024, 4096, 16384, 65536];

    for size in sizes {
        let cipher = SessionCipher::new(&[0x42u8; 32]);
        let plaintext = vec![0xAA; size];
        let ciphertext = cipher.encrypt(0, &plaintext).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| cipher.decrypt(black_box(0), black_box(&ciphertext)))
        });
    }

    group.finish();
}

fn bench_blake3_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_hash");
    let sizes = [32, 256, 1024, 4096];

    for size in sizes {
        let data = vec![0xCC; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| hash(black_box(&data)))
        });
    }

    group.finish();
}

fn bench_hkdf(c: &mut Criterion) {
    let ikm = [0x42u8; 32];
    let salt = [0xABu8; 32];
    let info = b"dni-im-key-derivation";

    c.bench_function("hkdf_extract", |b| {
        b.iter(|| hkdf_extract(black_box(&salt), black_box(&ikm)))
    });

    let prk = hkdf_extract(&salt, &ikm);
    let mut output = [0u8; 32];
    c.bench_function("hkdf_expand", |b| {
        b.iter(|| hkdf_expand(black_box(&prk), black_box(info), &mut output))
    });
}

fn bench_noise_keypair_generation(c: &mut Criterion) {
    c.bench_function("noise_keypair_generate", |b| {
        b.iter(StaticKeypair::generate)
    });
}

fn bench_noise_full_handshake(c: &mut Criterion) {
    c.bench_function("noise_ik_handshake", |b| {
        b.iter(|| {
            let alice_static = StaticKeypair::generate().unwrap();
            let bob_static = StaticKeypair::generate().unwrap();

            let mut alice =
                NoiseHandshake::new_initiator(&alice_static, bob_static.public_key()).unwrap();
            let mut bob = NoiseHandshake::new_responder(&bob_static).unwrap();

            let msg1 = alice.write_handshake_message(&[]).unwrap();
            bob.read_handshake_message(&msg1).unwrap();

            let msg2 = bob.write_handshake_message(&[]).unwrap();
            alice.read_handshake_message(&msg2).unwrap();

            black_box(alice.finalize().unwrap());
            black_box(bob.finalize().unwrap());
        })
    });
}

criterion_group!(aead_benches, bench_aead_encrypt, bench_aead_decrypt);
criterion_group!(blake3_benches, bench_blake3_hash, bench_hkdf);
criterion_group!(
    noise_benches,
    bench_noise_keypair_generation,
    bench_noise_full_handshake,
);

criterion_main!(aead_benches, blake3_benches, noise_benches);
