use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meetscribe::audio::level::calculate_rms;
use meetscribe::audio::mixer::mix_samples;

/// Synthetic speech-like buffer: a ramp folded into the i16 range.
fn sample_buffer(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| ((i as i32 * 37) % 20001 - 10000) as i16)
        .collect()
}

fn bench_mix_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix_samples");
    for &len in &[160usize, 1600, 16000] {
        let local = sample_buffer(len);
        let remote = sample_buffer(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| mix_samples(black_box(&local), black_box(&remote), 1.0, 1.3));
        });
    }
    // Unequal lengths exercise the silence-padding path
    let local = sample_buffer(16000);
    let remote = sample_buffer(12000);
    group.bench_function("padded_16000_12000", |b| {
        b.iter(|| mix_samples(black_box(&local), black_box(&remote), 1.0, 1.3));
    });
    group.finish();
}

fn bench_calculate_rms(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_rms");
    for &len in &[160usize, 2048, 16000] {
        let samples = sample_buffer(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| calculate_rms(black_box(&samples)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mix_samples, bench_calculate_rms);
criterion_main!(benches);
