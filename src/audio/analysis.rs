//! Frame-level envelopes and rhythm analysis: RMS energy, onset strength,
//! onset picking, tempo estimation and beat tracking.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use super::fft::{num_frames, pad_center};

/// Maps frame indices of a fixed-rate signal to seconds and back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameClock {
    /// Frames per second.
    pub rate: f64,
}

impl FrameClock {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Clock for an STFT with the given hop length.
    pub fn from_hop(sample_rate: u32, hop: usize) -> Self {
        Self::new(sample_rate as f64 / hop as f64)
    }

    pub fn frame_to_time(&self, frame: usize) -> f64 {
        frame as f64 / self.rate
    }

    /// Nearest frame for a time in seconds; negative times map to `None`.
    pub fn time_to_frame(&self, seconds: f64) -> Option<usize> {
        let frame = (seconds * self.rate).round();
        (frame >= 0.0).then_some(frame as usize)
    }

    /// Number of frames spanning `seconds`, rounded up, at least 1.
    pub fn frames_in(&self, seconds: f64) -> usize {
        ((seconds * self.rate).ceil() as usize).max(1)
    }
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Calculate RMS (Root Mean Square) energy of audio samples.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Centered, framewise RMS energy.
///
/// Frames line up with the STFT frames of the same `frame_length`/`hop`.
pub fn rms_energy(samples: &[f32], frame_length: usize, hop: usize) -> Vec<f32> {
    let padded = pad_center(samples, frame_length);
    (0..num_frames(samples.len(), hop))
        .map(|t| {
            let start = t * hop;
            calculate_rms(&padded[start..start + frame_length])
        })
        .collect()
}

/// How per-band spectral flux is collapsed into one onset value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Mean,
    Median,
}

/// Spectral-flux onset strength of a dB mel spectrogram (`[frame][band]`).
///
/// Each frame's value is the aggregated positive change against the previous
/// frame. The result is shifted right by `lag + n_fft / (2 * hop)` frames so
/// it lines up with centered STFT frames, and has one value per frame.
pub fn onset_strength(
    mel_db: &[Vec<f32>],
    aggregate: Aggregate,
    n_fft: usize,
    hop: usize,
) -> Vec<f32> {
    let frames = mel_db.len();
    let lag = 1;
    let shift = lag + n_fft / (2 * hop);

    let mut flux = Vec::with_capacity(frames);
    let mut scratch = Vec::new();
    for t in lag..frames {
        scratch.clear();
        scratch.extend(
            mel_db[t]
                .iter()
                .zip(&mel_db[t - lag])
                .map(|(cur, prev)| (cur - prev).max(0.0)),
        );
        flux.push(match aggregate {
            Aggregate::Mean => mean(&scratch),
            Aggregate::Median => median(&mut scratch),
        });
    }

    let mut envelope = vec![0.0f32; shift.min(frames)];
    envelope.extend(flux);
    envelope.truncate(frames);
    envelope
}

/// Peak-picking windows for onset detection, in frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakPickOptions {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub delta: f32,
    pub wait: usize,
}

impl Default for PeakPickOptions {
    fn default() -> Self {
        Self {
            pre_max: 3,
            post_max: 3,
            pre_avg: 3,
            post_avg: 5,
            delta: 0.2,
            wait: 10,
        }
    }
}

/// Pick peaks from an envelope.
///
/// Frame `n` is a peak when it is positive, equals the maximum of
/// `x[n - pre_max .. n + post_max]`, is at least `delta` above the mean of
/// `x[n - pre_avg .. n + post_avg]`, and lies more than `wait` frames after
/// the previous peak. Window ends are exclusive and clipped at the signal
/// edges; a zero `post_max` or `post_avg` is treated as one.
pub fn peak_pick(x: &[f32], opts: &PeakPickOptions) -> Vec<usize> {
    let len = x.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for n in 0..len {
        if x[n] <= 0.0 {
            continue;
        }

        let max_window = &x[n.saturating_sub(opts.pre_max)..(n + opts.post_max.max(1)).min(len)];
        if max_window.iter().any(|&v| v > x[n]) {
            continue;
        }

        let avg_window = &x[n.saturating_sub(opts.pre_avg)..(n + opts.post_avg.max(1)).min(len)];
        if x[n] < mean(avg_window) + opts.delta {
            continue;
        }

        if last.map_or(true, |l| n > l + opts.wait) {
            peaks.push(n);
            last = Some(n);
        }
    }

    peaks
}

/// Onset frames of an envelope, after rescaling it to `[0, 1]`.
pub fn onset_detect(envelope: &[f32], opts: &PeakPickOptions) -> Vec<usize> {
    if envelope.is_empty() {
        return Vec::new();
    }

    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let shifted: Vec<f32> = envelope.iter().map(|&v| v - min).collect();
    let max = shifted.iter().copied().fold(0.0f32, f32::max);
    let normalized: Vec<f32> = shifted
        .iter()
        .map(|&v| v / (max + f32::MIN_POSITIVE))
        .collect();

    peak_pick(&normalized, opts)
}

/// Autocorrelation of a signal for lags `0..=max_lag`, via FFT.
fn autocorrelate(signal: &[f32], max_lag: usize) -> Vec<f32> {
    let size = (2 * signal.len()).next_power_of_two();
    let mut planner = FftPlanner::<f32>::new();

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    planner.plan_fft_forward(size).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(size).process(&mut buffer);

    buffer
        .iter()
        .take((max_lag + 1).min(signal.len()))
        .map(|c| c.re / size as f32)
        .collect()
}

/// Tempo prior and search range for [`estimate_tempo`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoOptions {
    /// Center of the log-normal tempo prior, in BPM.
    pub start_bpm: f64,
    /// Width of the prior, in octaves.
    pub std_bpm: f64,
    /// Longest period considered, in seconds.
    pub max_period: f64,
    /// Tempi above this are ignored.
    pub max_bpm: f64,
}

impl Default for TempoOptions {
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            std_bpm: 1.0,
            max_period: 8.0,
            max_bpm: 320.0,
        }
    }
}

/// Estimate a global tempo from an onset envelope.
///
/// Autocorrelation lags are converted to BPM and weighted by a log-normal
/// prior around `start_bpm`; the best-scoring lag wins. Returns 0.0 when the
/// envelope carries no periodicity (e.g. silence).
pub fn estimate_tempo(envelope: &[f32], clock: FrameClock, opts: &TempoOptions) -> f64 {
    if envelope.len() < 2 || envelope.iter().all(|&v| v == 0.0) {
        return 0.0;
    }

    let max_lag = ((opts.max_period * clock.rate).round() as usize).max(1);
    let ac = autocorrelate(envelope, max_lag);
    let energy = ac[0].max(f32::MIN_POSITIVE) as f64;

    let mut best: Option<(f64, f64)> = None;
    for (lag, &value) in ac.iter().enumerate().skip(1) {
        let bpm = 60.0 * clock.rate / lag as f64;
        if bpm > opts.max_bpm {
            continue;
        }
        let octaves = (bpm.log2() - opts.start_bpm.log2()) / opts.std_bpm;
        let log_prior = -0.5 * octaves * octaves;
        let strength = (value as f64 / energy).max(0.0);
        let score = (1.0 + 1e6 * strength).ln() + log_prior;

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((bpm, score));
        }
    }

    best.map_or(0.0, |(bpm, _)| bpm)
}

fn std_dev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|&v| (v - m).powi(2)).sum::<f32>() / (values.len() - 1) as f32;
    var.sqrt()
}

/// Dynamic-programming beat tracker.
///
/// Beats are placed on strong onsets while penalising inter-beat intervals
/// that stray from the period implied by `bpm` (`tightness` scales the
/// penalty). With `trim`, weak beats at the start and end are dropped.
pub fn track_beats(
    envelope: &[f32],
    bpm: f64,
    clock: FrameClock,
    tightness: f64,
    trim: bool,
) -> Vec<usize> {
    if bpm <= 0.0 || envelope.iter().all(|&v| v == 0.0) {
        return Vec::new();
    }

    let period = ((60.0 * clock.rate / bpm).round() as usize).max(1);
    let sd = std_dev(envelope);
    let scale = if sd > 0.0 { sd } else { 1.0 };

    // Local score: onset envelope smoothed by a Gaussian one period wide.
    let p = period as isize;
    let window: Vec<f32> = (-p..=p)
        .map(|i| (-0.5 * (i as f32 * 32.0 / period as f32).powi(2)).exp())
        .collect();
    let len = envelope.len() as isize;
    let local: Vec<f32> = (0..len)
        .map(|t| {
            window
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let src = t + k as isize - p;
                    (0..len)
                        .contains(&src)
                        .then(|| envelope[src as usize] / scale * w)
                })
                .sum()
        })
        .collect();

    let local_max = local.iter().copied().fold(0.0f32, f32::max);

    // Candidate predecessors lie between 2 and 0.5 periods back.
    let min_back = (period as f64 / 2.0).round() as usize;
    let max_back = 2 * period;
    let mut cumscore = vec![0.0f64; local.len()];
    let mut backlink: Vec<Option<usize>> = vec![None; local.len()];
    let mut first_beat = true;

    let penalties: Vec<(usize, f64)> = (min_back.max(1)..=max_back)
        .rev()
        .map(|back| {
            let ratio = back as f64 / period as f64;
            (back, -tightness * ratio.ln().powi(2))
        })
        .collect();

    for i in 0..local.len() {
        let mut best: Option<(usize, f64)> = None;
        for &(back, penalty) in &penalties {
            let candidate = match i.checked_sub(back) {
                Some(j) => penalty + cumscore[j],
                None => penalty,
            };
            if best.map_or(true, |(_, s)| candidate > s) {
                best = Some((back, candidate));
            }
        }

        let (back, score) = best.unwrap_or((period, 0.0));
        cumscore[i] = local[i] as f64 + score;

        if first_beat && local[i] < 0.01 * local_max {
            backlink[i] = None;
        } else {
            backlink[i] = i.checked_sub(back);
            first_beat = false;
        }
    }

    // Last beat: latest local maximum of the cumulative score that clears
    // half the median of all such maxima.
    let maxima: Vec<usize> = (0..cumscore.len())
        .filter(|&i| {
            let left = i == 0 || cumscore[i] > cumscore[i - 1];
            let right = i + 1 == cumscore.len() || cumscore[i] >= cumscore[i + 1];
            left && right
        })
        .collect();
    let mut maxima_scores: Vec<f32> = maxima.iter().map(|&i| cumscore[i] as f32).collect();
    let median_score = median(&mut maxima_scores) as f64;
    let Some(&last) = maxima
        .iter()
        .rev()
        .find(|&&i| 2.0 * cumscore[i] > median_score)
    else {
        return Vec::new();
    };

    let mut beats = vec![last];
    while let Some(prev) = backlink[beats[beats.len() - 1]] {
        beats.push(prev);
    }
    beats.reverse();

    trim_beats(&local, beats, trim)
}

fn trim_beats(local: &[f32], beats: Vec<usize>, trim: bool) -> Vec<usize> {
    // Hann(5)-smoothed onset strength at each beat.
    let hann = [0.0f32, 0.5, 1.0, 0.5, 0.0];
    let strengths: Vec<f32> = beats.iter().map(|&b| local[b]).collect();
    let smooth: Vec<f32> = (0..strengths.len() as isize)
        .map(|i| {
            hann.iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let src = i + k as isize - 2;
                    (0..strengths.len() as isize)
                        .contains(&src)
                        .then(|| strengths[src as usize] * w)
                })
                .sum()
        })
        .collect();

    let threshold = if trim {
        let mean_sq = smooth.iter().map(|v| v * v).sum::<f32>() / smooth.len().max(1) as f32;
        0.5 * mean_sq.sqrt()
    } else {
        0.0
    };

    // The final beat comes from the last-beat search, which always lands on
    // the tail of the envelope; the upper bound is exclusive to drop it.
    let first = smooth.iter().position(|&v| v >= threshold);
    let last = smooth.iter().rposition(|&v| v >= threshold);
    match (first, last) {
        (Some(first), Some(last)) if first < last => beats[first..last].to_vec(),
        _ => Vec::new(),
    }
}

/// Decimate a mono signal to `points` amplitude values on a 0..=100 scale.
pub fn waveform_overview(samples: &[f32], points: usize) -> Vec<f32> {
    if samples.is_empty() || points == 0 {
        return Vec::new();
    }

    let step = samples.len() / points;
    (0..points)
        .map(|i| i * step)
        .filter(|&idx| idx < samples.len())
        .map(|idx| (samples[idx].abs() * 100.0).min(100.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// Impulse train envelope with one spike every `period` frames.
    fn pulse_envelope(frames: usize, period: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| if i % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_calculate_rms() {
        let samples: Vec<f32> = (0..1000)
            .map(|i| (2.0 * PI * i as f32 / 100.0).sin())
            .collect();
        assert!((calculate_rms(&samples) - 0.707).abs() < 0.01);
    }

    #[test]
    fn test_rms_energy_frames() {
        let samples = vec![0.5f32; 22050];
        let rms = rms_energy(&samples, 2048, 512);
        assert_eq!(rms.len(), 1 + 22050 / 512);
        // Interior frames see only the constant signal.
        assert!((rms[rms.len() / 2] - 0.5).abs() < 1e-4);
        // Edge frames are half padding.
        assert!(rms[0] < 0.4);
    }

    #[test]
    fn test_frame_clock_round_trip() {
        let clock = FrameClock::from_hop(22050, 512);
        for frame in [0usize, 1, 43, 1000, 12345] {
            let t = clock.frame_to_time(frame);
            assert_eq!(clock.time_to_frame(t), Some(frame));
        }
        assert_eq!(clock.time_to_frame(-1.0), None);
        assert_eq!(FrameClock::new(100.0).frames_in(0.5), 50);
    }

    #[test]
    fn test_onset_strength_alignment() {
        // Ten flat frames, then a jump.
        let mut mel_db = vec![vec![-40.0f32; 4]; 10];
        mel_db.extend(vec![vec![0.0f32; 4]; 10]);
        let env = onset_strength(&mel_db, Aggregate::Mean, 2048, 512);

        assert_eq!(env.len(), 20);
        let peak = env
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // Flux at frame 10 shifted by lag (1) + centering (2).
        assert_eq!(peak, 12);
        assert!((env[12] - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_onset_strength_median() {
        let mel_db = vec![vec![0.0, 0.0, 0.0], vec![10.0, 0.0, 20.0]];
        let env = onset_strength(&mel_db, Aggregate::Median, 4, 4);
        // lag 1 + centering 0 = shift of one frame.
        assert_eq!(env, vec![0.0, 10.0]);
    }

    #[test]
    fn test_peak_pick_respects_wait() {
        let mut x = vec![0.0f32; 40];
        x[5] = 1.0;
        x[10] = 1.0;
        x[25] = 1.0;
        let peaks = peak_pick(&x, &PeakPickOptions::default());
        assert_eq!(peaks, vec![5, 25]);
    }

    #[test]
    fn test_peak_pick_window_end_is_exclusive() {
        let mut x = vec![0.0f32; 30];
        x[10] = 0.8;
        x[13] = 1.0;
        let opts = PeakPickOptions {
            wait: 0,
            ..PeakPickOptions::default()
        };
        // x[13] sits just past the max window of frame 10.
        assert_eq!(peak_pick(&x, &opts), vec![10, 13]);
    }

    #[test]
    fn test_onset_detect_finds_pulses() {
        let env = pulse_envelope(200, 20);
        let onsets = onset_detect(&env, &PeakPickOptions::default());
        assert_eq!(onsets.len(), 10);
        assert_eq!(onsets[1], 20);
    }

    #[test]
    fn test_estimate_tempo_from_pulses() {
        // One pulse every half second.
        let clock = FrameClock::new(100.0);
        let env = pulse_envelope(3000, 50);
        let bpm = estimate_tempo(&env, clock, &TempoOptions::default());
        assert!((bpm - 120.0).abs() < 1.0, "Expected ~120 BPM, got {}", bpm);
    }

    #[test]
    fn test_estimate_tempo_silence() {
        let clock = FrameClock::new(100.0);
        assert_eq!(
            estimate_tempo(&vec![0.0; 500], clock, &TempoOptions::default()),
            0.0
        );
    }

    #[test]
    fn test_track_beats_on_pulses() {
        let clock = FrameClock::new(100.0);
        let env = pulse_envelope(1000, 50);
        let beats = track_beats(&env, 120.0, clock, 100.0, false);

        assert!(beats.len() >= 15, "Expected ~20 beats, got {}", beats.len());
        for pair in beats.windows(2) {
            assert_eq!(pair[1] - pair[0], 50);
        }
        assert!(beats.iter().all(|b| b % 50 == 0));
    }

    #[test]
    fn test_track_beats_silence() {
        let clock = FrameClock::new(100.0);
        assert!(track_beats(&vec![0.0; 300], 120.0, clock, 100.0, true).is_empty());
        assert!(track_beats(&pulse_envelope(300, 50), 0.0, clock, 100.0, true).is_empty());
    }

    #[test]
    fn test_waveform_overview() {
        let samples: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { -0.5 } else { 2.0 }).collect();
        let overview = waveform_overview(&samples, 100);
        assert_eq!(overview.len(), 100);
        // step = 10, so every point samples an even index.
        assert!(overview.iter().all(|&v| (v - 50.0).abs() < 1e-4));

        let clipped = waveform_overview(&[2.0, 2.0], 2);
        assert_eq!(clipped, vec![100.0, 100.0]);
        assert!(waveform_overview(&[], 10).is_empty());
    }
}
