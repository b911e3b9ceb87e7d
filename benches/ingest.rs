use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dmx_rasterizer::config::{OverrunPolicy, UniverseLayout};
use dmx_rasterizer::protocol::{self, build_artdmx};
use dmx_rasterizer::Engine;

fn bench_parse(c: &mut Criterion) {
    let packet = build_artdmx(1, 0, &[0x80; 512]);
    c.bench_function("parse_artdmx", |b| {
        b.iter(|| protocol::parse(black_box(&packet)))
    });
}

fn bench_process(c: &mut Criterion) {
    let engine = Engine::new(UniverseLayout::standard(), OverrunPolicy::Truncate);
    let packets: Vec<Vec<u8>> = (0..3).map(|u| build_artdmx(u, 0, &[u as u8; 512])).collect();

    c.bench_function("process_datagram", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % packets.len();
            engine.process_datagram(black_box(&packets[i]))
        })
    });

    let mut out = vec![0.0f32; engine.buffer().capacity()];
    c.bench_function("normalize_snapshot", |b| {
        b.iter(|| engine.buffer().normalize_into(black_box(&mut out)))
    });
}

criterion_group!(benches, bench_parse, bench_process);
criterion_main!(benches);
