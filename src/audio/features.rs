//! Feature extraction behind a trait seam.
//!
//! Segment detectors only consume the plain signals gathered in
//! [`TrackFeatures`]. [`FeatureProvider`] describes how those signals are
//! obtained; [`SpectralFeatureProvider`] is the built-in implementation on top
//! of Symphonia and RustFFT.

use std::path::Path;

use super::analysis::{
    self, estimate_tempo, onset_detect, track_beats, Aggregate, FrameClock, PeakPickOptions,
    TempoOptions,
};
use super::fft::{AnalyzerError, Spectrogram, StftAnalyzer};
use super::harmonic::{self, Chromagram, ContrastError};
use super::loader::{load_mono, AudioError};

/// Dynamic range kept when converting mel power to decibels.
const TOP_DB: f32 = 80.0;

/// Errors raised while extracting features from a track.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Failed to load audio: {0}")]
    Load(#[from] AudioError),
    #[error("Spectral analysis failed: {0}")]
    Spectral(#[from] AnalyzerError),
    #[error("Spectral contrast failed: {0}")]
    Contrast(#[from] ContrastError),
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("Audio signal is empty")]
    EmptySignal,
}

/// Settings for the built-in feature provider.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub n_fft: usize,
    pub hop: usize,
    pub n_mels: usize,
    /// Upper mel frequency for the novelty envelope used by hook detection.
    pub novelty_fmax: f32,
    pub contrast_fmin: f32,
    pub contrast_bands: usize,
    pub contrast_quantile: f32,
    /// Median filter length (frames and bins) for harmonic/percussive split.
    pub hpss_kernel: usize,
    /// Run the harmonic/percussive split during extraction.
    pub separate_sources: bool,
    pub beat_tightness: f64,
    pub tempo: TempoOptions,
    pub onset_picking: PeakPickOptions,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop: 512,
            n_mels: 128,
            novelty_fmax: 8000.0,
            contrast_fmin: 200.0,
            contrast_bands: 6,
            contrast_quantile: 0.02,
            hpss_kernel: 31,
            separate_sources: true,
            beat_tightness: 100.0,
            tempo: TempoOptions::default(),
            onset_picking: PeakPickOptions::default(),
        }
    }
}

/// How an onset envelope is computed from the mel spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OnsetOptions {
    pub aggregate: Aggregate,
    /// Highest mel frequency in Hz; `None` means Nyquist.
    pub fmax: Option<f32>,
}

/// Everything the segment detectors and the report need from one track.
#[derive(Debug, Clone)]
pub struct TrackFeatures {
    pub sample_rate: u32,
    /// Track length in seconds.
    pub duration: f64,
    /// Frame clock shared by every frame-level signal below.
    pub clock: FrameClock,
    pub rms: Vec<f32>,
    /// Median-aggregated, band-limited onset envelope.
    pub novelty: Vec<f32>,
    pub chroma: Chromagram,
    pub tempo: f64,
    pub beats: Vec<usize>,
    /// Spectral contrast, `[band][frame]`.
    pub contrast: Vec<Vec<f32>>,
    pub onset_times: Vec<f64>,
}

/// Source of the numeric descriptors that segment detection runs on.
///
/// The required methods work on an already computed magnitude spectrogram so
/// that [`FeatureProvider::extract_samples`] runs the STFT once per track. The
/// sample-based operations are provided on top of them.
///
/// Implementations are used from one thread at a time; construct one
/// provider per track when analysing tracks in parallel.
pub trait FeatureProvider {
    /// Decode a file to mono samples and its sample rate.
    fn load(&self, path: &Path) -> Result<(Vec<f32>, u32), FeatureError>;

    /// Frame clock for frame-level signals at `sample_rate`.
    fn clock(&self, sample_rate: u32) -> FrameClock;

    fn duration(&self, samples: &[f32], sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        samples.len() as f64 / sample_rate as f64
    }

    fn magnitude_spectrum(&self, samples: &[f32]) -> Result<Spectrogram, FeatureError>;

    /// Onset envelope of a magnitude spectrogram.
    fn onset_envelope(
        &self,
        spectrogram: &Spectrogram,
        sample_rate: u32,
        options: &OnsetOptions,
    ) -> Result<Vec<f32>, FeatureError>;

    /// Global tempo in BPM and beat frames from an onset envelope.
    fn beats_from_onsets(
        &self,
        onset_strength: &[f32],
        sample_rate: u32,
    ) -> Result<(f64, Vec<usize>), FeatureError>;

    /// Split a magnitude spectrogram into harmonic and percussive parts.
    fn separate_spectrum(&self, spectrogram: &Spectrogram) -> (Spectrogram, Spectrogram);

    fn chroma(
        &self,
        spectrogram: &Spectrogram,
        sample_rate: u32,
    ) -> Result<Chromagram, FeatureError>;

    /// Onset positions in seconds picked from an onset envelope.
    fn onset_times(
        &self,
        onset_strength: &[f32],
        sample_rate: u32,
        options: &PeakPickOptions,
    ) -> Vec<f64>;

    fn rms_energy(&self, samples: &[f32]) -> Vec<f32>;

    /// Spectral contrast, `[band][frame]`.
    fn spectral_contrast(
        &self,
        spectrogram: &Spectrogram,
        sample_rate: u32,
    ) -> Result<Vec<Vec<f32>>, FeatureError>;

    /// Global tempo in BPM and beat positions as frame indices.
    fn tempo_and_beats(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<(f64, Vec<usize>), FeatureError> {
        let envelope = self.onset_strength(samples, sample_rate, &OnsetOptions::default())?;
        self.beats_from_onsets(&envelope, sample_rate)
    }

    /// Harmonic and percussive magnitude spectrograms.
    fn harmonic_percussive_split(
        &self,
        samples: &[f32],
    ) -> Result<(Spectrogram, Spectrogram), FeatureError> {
        let spectrogram = self.magnitude_spectrum(samples)?;
        Ok(self.separate_spectrum(&spectrogram))
    }

    fn onset_strength(
        &self,
        samples: &[f32],
        sample_rate: u32,
        options: &OnsetOptions,
    ) -> Result<Vec<f32>, FeatureError> {
        let spectrogram = self.magnitude_spectrum(samples)?;
        self.onset_envelope(&spectrogram, sample_rate, options)
    }

    /// Whether [`FeatureProvider::extract`] runs the harmonic/percussive split.
    fn separates_sources(&self) -> bool {
        false
    }

    /// Onset peak-picking windows used by [`FeatureProvider::extract`].
    fn onset_picking(&self) -> PeakPickOptions {
        PeakPickOptions::default()
    }

    /// Onset settings for the novelty envelope hooks are detected on.
    fn novelty_options(&self) -> OnsetOptions {
        OnsetOptions {
            aggregate: Aggregate::Median,
            fmax: Some(8000.0),
        }
    }

    /// Load a track and compute every feature the detectors need.
    fn extract(&self, path: &Path) -> Result<TrackFeatures, FeatureError> {
        let (samples, sample_rate) = self.load(path)?;
        self.extract_samples(&samples, sample_rate)
    }

    /// Compute every feature from already decoded mono samples.
    fn extract_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<TrackFeatures, FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(sample_rate));
        }
        if samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }

        let duration = self.duration(samples, sample_rate);
        let spectrogram = self.magnitude_spectrum(samples)?;

        let onset_env = self.onset_envelope(&spectrogram, sample_rate, &OnsetOptions::default())?;
        let (tempo, beats) = self.beats_from_onsets(&onset_env, sample_rate)?;
        log::debug!("Tempo {:.1} BPM, {} beats", tempo, beats.len());

        if self.separates_sources() {
            let (harmonic, percussive) = self.separate_spectrum(&spectrogram);
            log::debug!(
                "Separated sources: {} harmonic / {} percussive frames",
                harmonic.num_frames(),
                percussive.num_frames()
            );
        }

        let chroma = self.chroma(&spectrogram, sample_rate)?;

        let onset_times = self.onset_times(&onset_env, sample_rate, &self.onset_picking());
        log::debug!("Detected {} onsets", onset_times.len());

        let rms = self.rms_energy(samples);
        let contrast = self.spectral_contrast(&spectrogram, sample_rate)?;

        let novelty = self.onset_envelope(&spectrogram, sample_rate, &self.novelty_options())?;

        log::debug!(
            "Features: {} rms frames, {} novelty frames, {}x{} chroma",
            rms.len(),
            novelty.len(),
            chroma.num_bins(),
            chroma.num_frames()
        );

        Ok(TrackFeatures {
            sample_rate,
            duration,
            clock: self.clock(sample_rate),
            rms,
            novelty,
            chroma,
            tempo,
            beats,
            contrast,
            onset_times,
        })
    }
}

/// Feature provider built on Symphonia decoding and a RustFFT STFT.
#[derive(Debug, Clone, Default)]
pub struct SpectralFeatureProvider {
    config: FeatureConfig,
}

impl SpectralFeatureProvider {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    fn analyzer(&self) -> Result<StftAnalyzer, AnalyzerError> {
        StftAnalyzer::new(self.config.n_fft, self.config.hop)
    }
}

impl FeatureProvider for SpectralFeatureProvider {
    fn load(&self, path: &Path) -> Result<(Vec<f32>, u32), FeatureError> {
        Ok(load_mono(path)?)
    }

    fn clock(&self, sample_rate: u32) -> FrameClock {
        FrameClock::from_hop(sample_rate, self.config.hop)
    }

    fn magnitude_spectrum(&self, samples: &[f32]) -> Result<Spectrogram, FeatureError> {
        if samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        Ok(self.analyzer()?.stft(samples)?)
    }

    fn onset_envelope(
        &self,
        spectrogram: &Spectrogram,
        sample_rate: u32,
        options: &OnsetOptions,
    ) -> Result<Vec<f32>, FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(sample_rate));
        }
        let nyquist = sample_rate as f32 / 2.0;
        let fmax = options.fmax.map_or(nyquist, |f| f.min(nyquist));
        let filterbank =
            harmonic::mel_filterbank(sample_rate, self.config.n_fft, self.config.n_mels, 0.0, fmax);
        let mel = harmonic::mel_spectrogram(&spectrogram.power(), &filterbank);
        let mel_db = harmonic::power_to_db(&mel, TOP_DB);
        Ok(analysis::onset_strength(
            &mel_db,
            options.aggregate,
            self.config.n_fft,
            self.config.hop,
        ))
    }

    fn beats_from_onsets(
        &self,
        onset_strength: &[f32],
        sample_rate: u32,
    ) -> Result<(f64, Vec<usize>), FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(sample_rate));
        }
        let clock = self.clock(sample_rate);
        let tempo = estimate_tempo(onset_strength, clock, &self.config.tempo);
        let beats = track_beats(
            onset_strength,
            tempo,
            clock,
            self.config.beat_tightness,
            false,
        );
        Ok((tempo, beats))
    }

    fn separate_spectrum(&self, spectrogram: &Spectrogram) -> (Spectrogram, Spectrogram) {
        harmonic::hpss(spectrogram, self.config.hpss_kernel)
    }

    fn chroma(
        &self,
        spectrogram: &Spectrogram,
        sample_rate: u32,
    ) -> Result<Chromagram, FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(sample_rate));
        }
        Ok(harmonic::chroma(spectrogram, sample_rate))
    }

    fn onset_times(
        &self,
        onset_strength: &[f32],
        sample_rate: u32,
        options: &PeakPickOptions,
    ) -> Vec<f64> {
        let clock = self.clock(sample_rate);
        onset_detect(onset_strength, options)
            .into_iter()
            .map(|frame| clock.frame_to_time(frame))
            .collect()
    }

    fn rms_energy(&self, samples: &[f32]) -> Vec<f32> {
        analysis::rms_energy(samples, self.config.n_fft, self.config.hop)
    }

    fn spectral_contrast(
        &self,
        spectrogram: &Spectrogram,
        sample_rate: u32,
    ) -> Result<Vec<Vec<f32>>, FeatureError> {
        Ok(harmonic::spectral_contrast(
            spectrogram,
            sample_rate,
            self.config.contrast_fmin,
            self.config.contrast_bands,
            self.config.contrast_quantile,
        )?)
    }

    fn separates_sources(&self) -> bool {
        self.config.separate_sources
    }

    fn onset_picking(&self) -> PeakPickOptions {
        self.config.onset_picking
    }

    fn novelty_options(&self) -> OnsetOptions {
        OnsetOptions {
            aggregate: Aggregate::Median,
            fmax: Some(self.config.novelty_fmax),
        }
    }
}
