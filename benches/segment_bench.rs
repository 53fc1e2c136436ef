//! Benchmarks for feature extraction and segment detection.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use phobz_segments::audio::harmonic::Chromagram;
use phobz_segments::audio::synth::{generate_build_and_drop, generate_sine, generate_test_beat};
use phobz_segments::audio::{
    FeatureConfig, FeatureProvider, FrameClock, SpectralFeatureProvider, StftAnalyzer,
};
use phobz_segments::segments::{
    detect_drops, detect_hooks, detect_transitions, find_peaks, PeakOptions,
};

const SAMPLE_RATE: u32 = 22050;

fn clock() -> FrameClock {
    FrameClock::from_hop(SAMPLE_RATE, 512)
}

/// Smooth pseudo-random signal with plenty of local maxima.
fn wobble(len: usize, seed: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32;
            1.0 + (t * 0.37 + seed).sin() * 0.5 + (t * 0.051 * seed).sin() * 0.3
        })
        .collect()
}

fn bench_stft(c: &mut Criterion) {
    let mut group = c.benchmark_group("STFT");
    let samples = generate_sine(1000.0, SAMPLE_RATE, 10.0, 1.0);
    group.throughput(Throughput::Elements(samples.len() as u64));

    for n_fft in [1024, 2048, 4096] {
        group.bench_with_input(BenchmarkId::new("stft", n_fft), &n_fft, |b, &size| {
            let analyzer = StftAnalyzer::new(size, 512).unwrap();
            b.iter(|| black_box(analyzer.stft(&samples).unwrap()));
        });
    }

    group.finish();
}

fn bench_feature_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Feature Extraction");
    group.sample_size(10);

    for (name, separate_sources) in [("without_hpss", false), ("with_hpss", true)] {
        let provider = SpectralFeatureProvider::new(FeatureConfig {
            separate_sources,
            ..FeatureConfig::default()
        });
        let samples = generate_build_and_drop(SAMPLE_RATE, 10.0, 20.0);

        group.throughput(Throughput::Elements(samples.len() as u64));
        group.bench_with_input(BenchmarkId::new("extract", name), &samples, |b, samples| {
            b.iter(|| black_box(provider.extract_samples(samples, SAMPLE_RATE).unwrap()));
        });
    }

    group.finish();
}

fn bench_tempo(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tempo and Beats");
    group.sample_size(10);
    let provider = SpectralFeatureProvider::default();

    for duration in [10.0, 30.0] {
        let samples = generate_test_beat(124.0, SAMPLE_RATE, duration);
        group.bench_with_input(
            BenchmarkId::new("tempo_and_beats", format!("{}s", duration)),
            &samples,
            |b, samples| {
                b.iter(|| black_box(provider.tempo_and_beats(samples, SAMPLE_RATE).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_detectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segment Detection");

    // Three minutes of frames.
    let frames = (180.0 * clock().rate) as usize;
    let energy = wobble(frames, 1.3);
    let novelty = wobble(frames, 2.9);
    let chroma = Chromagram::new((0..12).map(|k| wobble(frames, k as f32 + 0.5)).collect());

    group.throughput(Throughput::Elements(frames as u64));
    group.bench_function("find_peaks", |b| {
        let options = PeakOptions {
            height: Some(1.2),
            distance: 22,
        };
        b.iter(|| black_box(find_peaks(&novelty, &options)));
    });
    group.bench_function("hooks", |b| {
        b.iter(|| black_box(detect_hooks(&energy, &novelty, 180.0, clock()).unwrap()));
    });
    group.bench_function("drops", |b| {
        b.iter(|| black_box(detect_drops(&energy, clock()).unwrap()));
    });
    group.bench_function("transitions", |b| {
        b.iter(|| black_box(detect_transitions(&chroma, clock()).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_stft,
    bench_feature_extraction,
    bench_tempo,
    bench_detectors
);
criterion_main!(benches);
