//! Effect chain throughput.
//!
//! Run with: cargo bench --bench effect_chain

use std::{f32::consts::PI, hint::black_box};

use criterion::{Criterion, Throughput, criterion_group, criterion_main};

use tapedeck::audio::dsp::EffectChain;

const SAMPLE_RATE: u32 = 48_000;

/// One second of a stereo 1 kHz sine.
fn test_signal() -> Vec<f32> {
    (0..SAMPLE_RATE)
        .flat_map(|n| {
            let value = (2.0 * PI * 1_000.0 * n as f32 / SAMPLE_RATE as f32).sin();
            [value, value * 0.5]
        })
        .collect()
}

fn bench_full_chain(c: &mut Criterion) {
    let input = test_signal();
    let mut chain = EffectChain::new(SAMPLE_RATE, 2);
    chain.set_equalizer_enabled(true);
    for (band, level) in [400, 200, -200, 200, 400].into_iter().enumerate() {
        chain.set_band_level(band, level);
    }
    chain.set_bass_boost_enabled(true);
    chain.set_bass_boost_strength(500);
    chain.set_virtualizer_enabled(true);
    chain.set_virtualizer_strength(300);

    let mut group = c.benchmark_group("effect_chain");
    group.throughput(Throughput::Elements(u64::from(SAMPLE_RATE)));
    group.bench_function("rock_preset_1s_stereo", |b| {
        let mut buffer = input.clone();
        b.iter(|| {
            buffer.copy_from_slice(&input);
            chain.process_interleaved(black_box(&mut buffer));
        });
    });
    group.finish();
}

criterion_group!(benches, bench_full_chain);
criterion_main!(benches);
