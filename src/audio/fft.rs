//! Short-time Fourier transform using RustFFT.
//!
//! Frames are centered: the signal is zero-padded by `n_fft / 2` on both
//! sides, so frame `t` is centered on sample `t * hop`.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Error type for spectral analysis setup and input validation.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("FFT size must be a power of 2, got {0}")]
    InvalidFftSize(usize),
    #[error("Hop length must be between 1 and the FFT size ({n_fft}), got {hop}")]
    InvalidHop { hop: usize, n_fft: usize },
    #[error("Not enough samples: need {needed} but got {got}")]
    InsufficientSamples { needed: usize, got: usize },
}

/// Magnitude spectrogram, stored frame-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// One magnitude spectrum (`n_fft / 2 + 1` bins) per frame.
    pub frames: Vec<Vec<f32>>,
    pub n_fft: usize,
    pub hop: usize,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Center frequency of bin `bin` in Hz.
    pub fn bin_to_freq(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.n_fft as f32
    }

    /// Squared magnitudes, for power-domain features.
    pub fn power(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|&m| m * m).collect())
            .collect()
    }
}

/// Number of centered frames produced for a signal of `len` samples.
pub fn num_frames(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Zero-pad `samples` by `n_fft / 2` on both sides.
pub fn pad_center(samples: &[f32], n_fft: usize) -> Vec<f32> {
    let pad = n_fft / 2;
    let mut padded = vec![0.0; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);
    padded
}

/// STFT analyzer with a fixed FFT size and hop.
pub struct StftAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
}

impl StftAnalyzer {
    /// Create an analyzer. `n_fft` must be a power of two and
    /// `1 <= hop <= n_fft`.
    pub fn new(n_fft: usize, hop: usize) -> Result<Self, AnalyzerError> {
        if n_fft < 2 || !n_fft.is_power_of_two() {
            return Err(AnalyzerError::InvalidFftSize(n_fft));
        }
        if hop == 0 || hop > n_fft {
            return Err(AnalyzerError::InvalidHop { hop, n_fft });
        }

        // Periodic Hann window.
        let window: Vec<f32> = (0..n_fft)
            .map(|i| {
                let t = i as f32 / n_fft as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(n_fft);

        Ok(Self {
            fft,
            n_fft,
            hop,
            window,
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Number of frequency bins per frame (`n_fft / 2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Magnitude spectrum of a single windowed frame.
    ///
    /// Only the first `n_fft` samples of `frame` are used.
    pub fn analyze_frame(&self, frame: &[f32]) -> Result<Vec<f32>, AnalyzerError> {
        if frame.len() < self.n_fft {
            return Err(AnalyzerError::InsufficientSamples {
                needed: self.n_fft,
                got: frame.len(),
            });
        }

        let mut buffer: Vec<Complex<f32>> = frame[..self.n_fft]
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        Ok(buffer[..self.num_bins()].iter().map(|c| c.norm()).collect())
    }

    /// Centered magnitude STFT of a whole signal.
    pub fn stft(&self, samples: &[f32]) -> Result<Spectrogram, AnalyzerError> {
        if samples.is_empty() {
            return Err(AnalyzerError::InsufficientSamples { needed: 1, got: 0 });
        }

        let padded = pad_center(samples, self.n_fft);
        let count = num_frames(samples.len(), self.hop);

        let mut frames = Vec::with_capacity(count);
        for t in 0..count {
            let start = t * self.hop;
            frames.push(self.analyze_frame(&padded[start..start + self.n_fft])?);
        }

        Ok(Spectrogram {
            frames,
            n_fft: self.n_fft,
            hop: self.hop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(
            StftAnalyzer::new(1000, 256),
            Err(AnalyzerError::InvalidFftSize(1000))
        ));
        assert!(matches!(
            StftAnalyzer::new(1024, 0),
            Err(AnalyzerError::InvalidHop { .. })
        ));
        assert!(matches!(
            StftAnalyzer::new(1024, 2048),
            Err(AnalyzerError::InvalidHop { .. })
        ));
    }

    #[test]
    fn test_frame_count_is_centered() {
        let analyzer = StftAnalyzer::new(2048, 512).unwrap();
        let spec = analyzer.stft(&vec![0.0; 22050]).unwrap();
        assert_eq!(spec.num_frames(), 1 + 22050 / 512);
        assert_eq!(spec.frames[0].len(), 1025);
        assert_eq!(spec.num_bins(), 1025);
    }

    #[test]
    fn test_sine_peak_bin() {
        let sample_rate = 22050;
        let analyzer = StftAnalyzer::new(2048, 512).unwrap();
        let spec = analyzer.stft(&sine(440.0, sample_rate, 8192)).unwrap();

        let middle = &spec.frames[spec.num_frames() / 2];
        let peak_bin = middle
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        let peak_freq = spec.bin_to_freq(peak_bin, sample_rate);
        assert!(
            (peak_freq - 440.0).abs() < 15.0,
            "Expected peak near 440 Hz, got {} Hz",
            peak_freq
        );
    }

    #[test]
    fn test_empty_signal_is_rejected() {
        let analyzer = StftAnalyzer::new(512, 128).unwrap();
        assert!(matches!(
            analyzer.stft(&[]),
            Err(AnalyzerError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_short_frame_is_rejected() {
        let analyzer = StftAnalyzer::new(512, 128).unwrap();
        assert!(analyzer.analyze_frame(&[0.0; 100]).is_err());
    }

    #[test]
    fn test_pad_center() {
        let padded = pad_center(&[1.0, 2.0], 4);
        assert_eq!(padded, vec![0.0, 0.0, 1.0, 2.0, 0.0, 0.0]);
    }
}
