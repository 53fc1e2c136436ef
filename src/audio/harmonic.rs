//! Spectral descriptors derived from a magnitude spectrogram: mel bands,
//! chroma, spectral contrast and harmonic/percussive separation.

use super::fft::Spectrogram;

const AMIN: f32 = 1e-10;
const TINY: f32 = f32::MIN_POSITIVE;

/// Number of pitch classes in a chromagram.
pub const N_CHROMA: usize = 12;

/// Pitch-class energy per frame, indexed `[pitch_class][frame]`.
///
/// Row 0 is C.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromagram {
    rows: Vec<Vec<f32>>,
}

impl Chromagram {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn num_bins(&self) -> usize {
        self.rows.len()
    }

    /// Frame count of the first row (0 when there are no rows).
    pub fn num_frames(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// True when every row has the same number of frames.
    pub fn is_rectangular(&self) -> bool {
        let frames = self.num_frames();
        self.rows.iter().all(|row| row.len() == frames)
    }

    /// Values of all pitch classes at `frame`.
    pub fn column(&self, frame: usize) -> impl Iterator<Item = f32> + '_ {
        self.rows.iter().map(move |row| row[frame])
    }
}

/// Convert power values to decibels relative to 1.0, floored at
/// `max - top_db` across the whole matrix.
pub fn power_to_db(values: &[Vec<f32>], top_db: f32) -> Vec<Vec<f32>> {
    let mut db: Vec<Vec<f32>> = values
        .iter()
        .map(|row| row.iter().map(|&v| 10.0 * v.max(AMIN).log10()).collect())
        .collect();

    let max_db = db
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = max_db - top_db;

    for v in db.iter_mut().flatten() {
        *v = v.max(floor);
    }
    db
}

fn hz_to_mel(hz: f32) -> f32 {
    // Slaney scale: linear below 1 kHz, logarithmic above.
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Slaney-normalized triangular mel filterbank, `[mel][bin]`.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f32> = (0..n_bins)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (edges[m], edges[m + 1], edges[m + 2]);
            let enorm = 2.0 / (hi - lo);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - lo) / (center - lo);
                    let upper = (hi - f) / (hi - center);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Mel power spectrogram, frame-major (`[frame][mel]`).
pub fn mel_spectrogram(power: &[Vec<f32>], filterbank: &[Vec<f32>]) -> Vec<Vec<f32>> {
    // Each triangle only covers a handful of bins.
    let supports: Vec<(usize, usize)> = filterbank
        .iter()
        .map(|filter| {
            let start = filter.iter().position(|&w| w > 0.0).unwrap_or(0);
            let end = filter.iter().rposition(|&w| w > 0.0).map_or(0, |i| i + 1);
            (start, end.max(start))
        })
        .collect();

    power
        .iter()
        .map(|frame| {
            filterbank
                .iter()
                .zip(&supports)
                .map(|(filter, &(start, end))| {
                    filter[start..end]
                        .iter()
                        .zip(&frame[start..end])
                        .map(|(w, p)| w * p)
                        .sum()
                })
                .collect()
        })
        .collect()
}

/// Gaussian chroma filterbank, `[pitch_class][bin]`, row 0 = C.
///
/// Each FFT bin spreads its energy over neighbouring pitch classes, and bins
/// are weighted by a Gaussian over octaves centered on octave 5.
pub fn chroma_filterbank(sample_rate: u32, n_fft: usize) -> Vec<Vec<f32>> {
    let n_chroma = N_CHROMA as f32;
    let ctroct = 5.0f32;
    let octwidth = 2.0f32;
    let a0 = 440.0f32 / 16.0;

    // Fractional chroma position of every bin, relative to A.
    let mut frqbins = Vec::with_capacity(n_fft);
    for k in 1..n_fft {
        let f = k as f32 * sample_rate as f32 / n_fft as f32;
        frqbins.push(n_chroma * (f / a0).log2());
    }
    frqbins.insert(0, frqbins[0] - 1.5 * n_chroma);

    let mut binwidth: Vec<f32> = frqbins.windows(2).map(|w| (w[1] - w[0]).max(1.0)).collect();
    binwidth.push(1.0);

    let half = (n_chroma / 2.0).round();
    let mut wts = vec![vec![0.0f32; n_fft]; N_CHROMA];
    for (k, (&fb, &bw)) in frqbins.iter().zip(&binwidth).enumerate() {
        for (c, row) in wts.iter_mut().enumerate() {
            let d = (fb - c as f32 + half + 10.0 * n_chroma).rem_euclid(n_chroma) - half;
            row[k] = (-0.5 * (2.0 * d / bw).powi(2)).exp();
        }

        let norm = wts.iter().map(|row| row[k] * row[k]).sum::<f32>().sqrt();
        let octave = (-0.5 * ((fb / n_chroma - ctroct) / octwidth).powi(2)).exp();
        for row in wts.iter_mut() {
            if norm > TINY {
                row[k] /= norm;
            }
            row[k] *= octave;
        }
    }

    // Rotate so that C is the first row.
    wts.rotate_left(3);
    for row in wts.iter_mut() {
        row.truncate(n_fft / 2 + 1);
    }
    wts
}

/// Chromagram of a magnitude spectrogram, each frame scaled to a peak of 1.
pub fn chroma(spectrogram: &Spectrogram, sample_rate: u32) -> Chromagram {
    let filterbank = chroma_filterbank(sample_rate, spectrogram.n_fft);
    let frames = spectrogram.num_frames();
    let mut rows = vec![vec![0.0f32; frames]; N_CHROMA];

    for (t, frame) in spectrogram.frames.iter().enumerate() {
        for (c, filter) in filterbank.iter().enumerate() {
            rows[c][t] = filter.iter().zip(frame).map(|(w, m)| w * m).sum();
        }

        let peak = rows.iter().map(|row| row[t].abs()).fold(0.0f32, f32::max);
        if peak > TINY {
            for row in rows.iter_mut() {
                row[t] /= peak;
            }
        }
    }

    Chromagram::new(rows)
}

/// Errors from spectral contrast band layout.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ContrastError {
    #[error("Frequency band exceeds Nyquist; reduce fmin ({fmin} Hz) or the band count ({bands})")]
    ExceedsNyquist { fmin: f32, bands: usize },
    #[error("Contrast band {0} contains no FFT bins")]
    EmptyBand(usize),
}

/// Octave-band spectral contrast in dB, `[band][frame]` with `n_bands + 1`
/// rows.
///
/// Per band and frame, contrast is the difference between the mean of the
/// top and bottom `quantile` of magnitudes.
pub fn spectral_contrast(
    spectrogram: &Spectrogram,
    sample_rate: u32,
    fmin: f32,
    n_bands: usize,
    quantile: f32,
) -> Result<Vec<Vec<f32>>, ContrastError> {
    let nyquist = sample_rate as f32 / 2.0;
    let mut octa = vec![0.0f32];
    octa.extend((0..=n_bands).map(|i| fmin * 2f32.powi(i as i32)));
    if octa[..octa.len() - 1].iter().any(|&f| f >= nyquist) {
        return Err(ContrastError::ExceedsNyquist {
            fmin,
            bands: n_bands,
        });
    }

    let n_bins = spectrogram.num_bins();
    let freqs: Vec<f32> = (0..n_bins)
        .map(|k| spectrogram.bin_to_freq(k, sample_rate))
        .collect();
    let frames = spectrogram.num_frames();

    let mut peaks = vec![vec![0.0f32; frames]; n_bands + 1];
    let mut valleys = vec![vec![0.0f32; frames]; n_bands + 1];

    for k in 0..=n_bands {
        let (f_low, f_high) = (octa[k], octa[k + 1]);
        let mut in_band: Vec<bool> = freqs.iter().map(|&f| f >= f_low && f <= f_high).collect();

        let first = in_band.iter().position(|&b| b).ok_or(ContrastError::EmptyBand(k))?;
        let last = in_band.iter().rposition(|&b| b).ok_or(ContrastError::EmptyBand(k))?;
        if k > 0 && first > 0 {
            in_band[first - 1] = true;
        }
        if k == n_bands {
            for b in in_band.iter_mut().skip(last + 1) {
                *b = true;
            }
        }

        let band_size = in_band.iter().filter(|&&b| b).count();
        let mut bins: Vec<usize> = (0..n_bins).filter(|&i| in_band[i]).collect();
        if k < n_bands {
            bins.pop();
        }
        if bins.is_empty() {
            return Err(ContrastError::EmptyBand(k));
        }
        let take = ((quantile * band_size as f32).round() as usize).clamp(1, bins.len());

        let mut sorted = Vec::with_capacity(bins.len());
        for (t, frame) in spectrogram.frames.iter().enumerate() {
            sorted.clear();
            sorted.extend(bins.iter().map(|&i| frame[i]));
            sorted.sort_by(|a, b| a.total_cmp(b));

            valleys[k][t] = sorted[..take].iter().sum::<f32>() / take as f32;
            peaks[k][t] = sorted[sorted.len() - take..].iter().sum::<f32>() / take as f32;
        }
    }

    let peaks_db = power_to_db(&peaks, 80.0);
    let valleys_db = power_to_db(&valleys, 80.0);

    Ok(peaks_db
        .iter()
        .zip(&valleys_db)
        .map(|(p, v)| p.iter().zip(v).map(|(a, b)| a - b).collect())
        .collect())
}

fn reflect(index: isize, len: usize) -> usize {
    let n = len as isize;
    let mut i = index;
    while i < 0 || i >= n {
        i = if i < 0 { -i - 1 } else { 2 * n - i - 1 };
    }
    i as usize
}

/// Running median with reflected edges.
fn median_filter(values: &[f32], kernel: usize, scratch: &mut Vec<f32>) -> Vec<f32> {
    let half = (kernel / 2) as isize;
    let len = values.len();
    (0..len as isize)
        .map(|i| {
            scratch.clear();
            scratch.extend((i - half..=i + half).map(|j| values[reflect(j, len)]));
            let mid = scratch.len() / 2;
            *scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
        })
        .collect()
}

fn soft_mask(x: f32, reference: f32, power: i32) -> f32 {
    let z = x.max(reference);
    if z < TINY {
        return 0.0;
    }
    let m = (x / z).powi(power);
    let r = (reference / z).powi(power);
    m / (m + r)
}

/// Median-filtering harmonic/percussive separation of a magnitude
/// spectrogram with soft masks.
///
/// Harmonic energy is smooth along time, percussive energy is smooth along
/// frequency; each component keeps the share of every cell its filter wins.
pub fn hpss(spectrogram: &Spectrogram, kernel: usize) -> (Spectrogram, Spectrogram) {
    let frames = spectrogram.num_frames();
    let bins = spectrogram.num_bins();
    let kernel = kernel.max(1) | 1;
    let mut scratch = Vec::with_capacity(kernel);

    // Median along time, per bin.
    let mut harmonic_ref = vec![vec![0.0f32; bins]; frames];
    let mut row = Vec::with_capacity(frames);
    for b in 0..bins {
        row.clear();
        row.extend(spectrogram.frames.iter().map(|f| f[b]));
        for (t, v) in median_filter(&row, kernel, &mut scratch).into_iter().enumerate() {
            harmonic_ref[t][b] = v;
        }
    }

    // Median along frequency, per frame.
    let percussive_ref: Vec<Vec<f32>> = spectrogram
        .frames
        .iter()
        .map(|f| median_filter(f, kernel, &mut scratch))
        .collect();

    let mut harmonic = Vec::with_capacity(frames);
    let mut percussive = Vec::with_capacity(frames);
    for t in 0..frames {
        let h = &harmonic_ref[t];
        let p = &percussive_ref[t];
        let source = &spectrogram.frames[t];
        harmonic.push(
            (0..bins)
                .map(|b| source[b] * soft_mask(h[b], p[b], 2))
                .collect(),
        );
        percussive.push(
            (0..bins)
                .map(|b| source[b] * soft_mask(p[b], h[b], 2))
                .collect(),
        );
    }

    let wrap = |frames| Spectrogram {
        frames,
        n_fft: spectrogram.n_fft,
        hop: spectrogram.hop,
    };
    (wrap(harmonic), wrap(percussive))
}
