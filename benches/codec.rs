use criterion::{Criterion, black_box, criterion_group, criterion_main};
use greywing::{DNSPacket, DNSResourceType};

fn bench_build_and_encode(c: &mut Criterion) {
    c.bench_function("build forward query", |b| {
        b.iter(|| {
            let packet = DNSPacket::build_forward(black_box(1), black_box("www.example.com"), DNSResourceType::A);
            black_box(packet.to_bytes());
        });
    });
}

fn bench_parse(c: &mut Criterion) {
    let bytes = DNSPacket::build_forward(1, "www.example.com", DNSResourceType::A).to_bytes();
    c.bench_function("parse dns packet", |b| {
        b.iter(|| {
            black_box(DNSPacket::parse(black_box(&bytes)).unwrap());
        });
    });
}

criterion_group!(benches, bench_build_and_encode, bench_parse);
criterion_main!(benches);
