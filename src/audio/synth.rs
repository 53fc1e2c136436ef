//! Synthetic tracks for tests and benchmarks.
//!
//! The generators produce mono signals with known structure (steady tones,
//! metronome clicks, chord changes, a quiet build followed by a loud drop) so
//! detector output can be checked against where the structure actually is.

use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn num_samples(sample_rate: u32, duration: f32) -> usize {
    (duration * sample_rate as f32) as usize
}

/// Generate a sine wave of `duration` seconds.
pub fn generate_sine(frequency: f32, sample_rate: u32, duration: f32, amplitude: f32) -> Vec<f32> {
    (0..num_samples(sample_rate, duration))
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Reproducible white noise from a linear congruential generator.
pub fn generate_white_noise(
    sample_rate: u32,
    duration: f32,
    amplitude: f32,
    seed: u64,
) -> Vec<f32> {
    let mut state = seed;
    (0..num_samples(sample_rate, duration))
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            amplitude * (unit * 2.0 - 1.0)
        })
        .collect()
}

/// Metronome: a 10 ms decaying sine click on every beat.
pub fn generate_click_track(
    bpm: f32,
    sample_rate: u32,
    duration: f32,
    click_freq: f32,
) -> Vec<f32> {
    let len = num_samples(sample_rate, duration);
    let beat = ((60.0 / bpm * sample_rate as f32) as usize).max(1);
    let click = (sample_rate as f32 * 0.01) as usize;

    let mut samples = vec![0.0; len];
    for start in (0..len).step_by(beat) {
        for i in 0..click.min(len - start) {
            let t = i as f32 / sample_rate as f32;
            let envelope = (1.0 - i as f32 / click as f32).powi(2);
            samples[start + i] = envelope * (2.0 * PI * click_freq * t).sin();
        }
    }
    samples
}

/// A 150 ms bass drum hit with a falling pitch.
pub fn generate_kick(sample_rate: u32) -> Vec<f32> {
    (0..num_samples(sample_rate, 0.15))
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let freq = 50.0 + 100.0 * (-t * 30.0).exp();
            (-t * 15.0).exp() * (2.0 * PI * freq * t).sin()
        })
        .collect()
}

/// Four-on-the-floor kicks with off-beat noise hats, peak-normalized to 1.
pub fn generate_test_beat(bpm: f32, sample_rate: u32, duration: f32) -> Vec<f32> {
    let len = num_samples(sample_rate, duration);
    let eighth = ((30.0 / bpm * sample_rate as f32) as usize).max(1);
    let kick = generate_kick(sample_rate);
    let hat = generate_white_noise(sample_rate, 0.05, 0.3, 7);

    let mut samples = vec![0.0f32; len];
    for (step, start) in (0..len).step_by(eighth).enumerate() {
        let hit: &[f32] = if step % 2 == 0 { &kick } else { &hat };
        for (i, &v) in hit.iter().enumerate().take(len - start) {
            let decay = if step % 2 == 0 { 0.8 } else { (-(i as f32) / 200.0).exp() };
            samples[start + i] += v * decay;
        }
    }

    normalize_peak(&mut samples);
    samples
}

/// Consecutive sections of sustained chords, `section_secs` each.
///
/// Each chord is a list of frequencies in Hz.
pub fn generate_chord_sequence(
    chords: &[&[f32]],
    sample_rate: u32,
    section_secs: f32,
    amplitude: f32,
) -> Vec<f32> {
    let mut samples = Vec::new();
    for chord in chords {
        let mut section = vec![0.0f32; num_samples(sample_rate, section_secs)];
        for &freq in chord.iter() {
            let tone = generate_sine(freq, sample_rate, section_secs, amplitude);
            for (s, t) in section.iter_mut().zip(tone) {
                *s += t / chord.len().max(1) as f32;
            }
        }
        samples.extend(section);
    }
    samples
}

/// A quiet pad for `quiet_secs`, then a loud beat for `loud_secs`.
pub fn generate_build_and_drop(sample_rate: u32, quiet_secs: f32, loud_secs: f32) -> Vec<f32> {
    let mut samples = generate_sine(220.0, sample_rate, quiet_secs, 0.05);
    let mut drop = generate_test_beat(128.0, sample_rate, loud_secs);
    let bass = generate_sine(55.0, sample_rate, loud_secs, 0.5);
    for (d, b) in drop.iter_mut().zip(bass) {
        *d = 0.6 * *d + b;
    }
    normalize_peak(&mut drop);
    samples.extend(drop);
    samples
}

fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak > 1.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Write mono samples as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);

    let data_size = samples.len() as u32 * 2;

    file.write_all(b"RIFF")?;
    file.write_all(&(36 + data_size).to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&1u16.to_le_bytes())?; // mono
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&(sample_rate * 2).to_le_bytes())?;
    file.write_all(&2u16.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?;

    file.write_all(b"data")?;
    file.write_all(&data_size.to_le_bytes())?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        file.write_all(&pcm.to_le_bytes())?;
    }

    file.flush()
}
