//! Audio loading and feature extraction.
//!
//! This module provides:
//! - Audio file decoding via Symphonia (WAV, MP3, FLAC, AAC)
//! - Centered STFT via RustFFT
//! - Mel, chroma, spectral contrast and harmonic/percussive separation
//! - RMS energy, onset strength, tempo and beat tracking
//! - The [`FeatureProvider`] trait that segment detection consumes

pub mod analysis;
pub mod features;
pub mod fft;
pub mod harmonic;
pub mod loader;
pub mod synth;

pub use analysis::{waveform_overview, Aggregate, FrameClock, PeakPickOptions, TempoOptions};
pub use features::{
    FeatureConfig, FeatureError, FeatureProvider, OnsetOptions, SpectralFeatureProvider,
    TrackFeatures,
};
pub use fft::{AnalyzerError, Spectrogram, StftAnalyzer};
pub use harmonic::{Chromagram, ContrastError};
pub use loader::{load_audio, load_mono, AudioData, AudioError};
