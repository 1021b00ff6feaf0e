// CadenceStream transport benchmarks using criterion.
//
// Measures:
//   - Packet sealing throughput (Shannon encrypt + MAC)
//   - Encrypted round trip over an in-memory pipe

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use cadencestream::codec::CipherDirection;
use cadencestream::{EncryptedTransport, PacketType, Transport};
use cadencetrust::crypto::challenge::derive;
use cadencetrust::SessionKeys;
use tokio::sync::Mutex;

const SIZES: &[usize] = &[64, 1024, 8192, 65535];

fn keys() -> SessionKeys {
    derive(&[0x42u8; 96], b"bench transcript").unwrap().keys.clone()
}

// ---------------------------------------------------------------------------
// Seal throughput
// ---------------------------------------------------------------------------

fn bench_seal(c: &mut Criterion) {
    let keys = keys();
    let mut group = c.benchmark_group("packet_seal");
    for &size in SIZES {
        let payload = vec![0xABu8; size];
        let mut cipher = CipherDirection::new(&keys.send_key);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &payload,
            |b, p| {
                b.iter(|| {
                    black_box(cipher.seal(PacketType::StreamChunkRes.into(), p).unwrap());
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Round trip over a duplex pipe
// ---------------------------------------------------------------------------

fn bench_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let keys = keys();
    let mut group = c.benchmark_group("packet_round_trip");
    for &size in SIZES {
        let (a, b) = tokio::io::duplex(1 << 20);
        let client = EncryptedTransport::new(Transport::new(a), &keys);
        let server = Arc::new(Mutex::new(EncryptedTransport::new(
            Transport::new(b),
            &keys.reversed(),
        )));
        let payload = vec![0xCDu8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(format!("{size}B")), |b| {
            b.to_async(&rt).iter(|| {
                let server = server.clone();
                let client = &client;
                let payload = &payload;
                async move {
                    client.send(PacketType::MercuryReq, payload).await.unwrap();
                    black_box(server.lock().await.receive().await.unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_seal, bench_round_trip);
criterion_main!(benches);
