//! Benchmarks for next-character sampling
//!
//! Run with: cargo bench

use charloom_engine::sampler::{Sampler, SamplingConfig, Temperature, softmax};
use charloom_engine::{FloatTensor, model::last_timestep};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

/// Deterministic pseudo-logits for a vocabulary of `n` characters
fn logits(n: usize) -> Vec<f32> {
    (0..n).map(|i| ((i * 37 % 101) as f32 / 10.0) - 5.0).collect()
}

fn bench_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampler");

    // Typical character vocabulary
    let small = logits(65);
    // Wide byte-level vocabulary
    let wide = logits(4096);

    group.bench_function("softmax_65", |b| {
        b.iter(|| softmax(black_box(&small), Temperature::DEFAULT))
    });

    group.bench_function("sample_65", |b| {
        let mut sampler = Sampler::new(&SamplingConfig {
            temperature: Temperature::DEFAULT,
            seed: Some(1),
        });
        b.iter(|| sampler.sample(black_box(&small)))
    });

    group.bench_function("sample_4096_hot", |b| {
        let mut sampler = Sampler::new(&SamplingConfig {
            temperature: Temperature::new(1.5).unwrap(),
            seed: Some(1),
        });
        b.iter(|| sampler.sample(black_box(&wide)))
    });

    group.finish();
}

fn bench_last_timestep(c: &mut Criterion) {
    // Prompt-length first step: [1, 256, 65]
    let tensor = FloatTensor::new(vec![1, 256, 65], vec![0.5; 256 * 65]);
    c.bench_function("last_timestep_256x65", |b| {
        b.iter(|| last_timestep(black_box(&tensor), 256, "output").unwrap().len())
    });
}

criterion_group!(benches, bench_sampler, bench_last_timestep);
criterion_main!(benches);
