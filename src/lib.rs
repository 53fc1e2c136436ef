//! Phobz Segments
//!
//! Finds short, time-coded highlights in a music track for clip selection.
//!
//! # Features
//!
//! - Audio decoding (WAV, MP3, FLAC, AAC) via Symphonia
//! - STFT, mel, chroma, spectral contrast and HPSS via RustFFT
//! - Onset strength, tempo estimation and beat tracking
//! - Hook, drop and harmonic transition detection
//! - A JSON report with a fixed fallback when analysis fails
//! - Viral score and enhancement plan heuristics
//! - Python bindings via PyO3 (when `python` feature is enabled)

pub mod audio;
pub mod pipeline;
pub mod scoring;
pub mod segments;

// Re-export commonly used types
pub use audio::{
    load_audio, AudioData, AudioError, FeatureConfig, FeatureError, FeatureProvider, FrameClock,
    SpectralFeatureProvider, TrackFeatures,
};
pub use pipeline::{
    analyze_track, analyze_track_with, try_analyze, try_analyze_with, AnalysisConfig,
    AnalysisError, AnalysisReport, FallbackReport, TrackAnalysis,
};
pub use scoring::{viral_score, EnhancementPlan};
pub use segments::{
    detect_drops, detect_hooks, detect_transitions, SegmentConfig, SegmentError, SegmentSet,
    TimeInterval,
};

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
#[allow(deprecated)] // PyO3 0.27 deprecations - APIs still functional
mod python_bindings {
    use crate::audio::{load_mono, waveform_overview};
    use crate::pipeline::{self, AnalysisReport};
    use crate::scoring;
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    /// Analyze a track and return the JSON report.
    ///
    /// Never raises for analysis failures; those come back as the fallback
    /// report with an `error` field.
    #[pyfunction]
    #[pyo3(signature = (audio_path))]
    fn analyze_track(py: Python<'_>, audio_path: &str) -> PyResult<String> {
        let report = py.allow_threads(|| pipeline::analyze_track(audio_path));
        report
            .to_json()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Score a JSON report from 0 to 100.
    #[pyfunction]
    #[pyo3(signature = (report_json))]
    fn viral_score(report_json: &str) -> PyResult<u8> {
        let report: AnalysisReport = serde_json::from_str(report_json)
            .map_err(|e| PyValueError::new_err(format!("Invalid report: {}", e)))?;
        Ok(scoring::viral_score(&report))
    }

    /// Enhancement plan for a JSON report, as JSON.
    #[pyfunction]
    #[pyo3(signature = (report_json))]
    fn enhancement_plan(report_json: &str) -> PyResult<String> {
        let report: AnalysisReport = serde_json::from_str(report_json)
            .map_err(|e| PyValueError::new_err(format!("Invalid report: {}", e)))?;
        serde_json::to_string(&scoring::EnhancementPlan::from_report(&report))
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Decimated amplitude overview (0-100) of an audio file.
    #[pyfunction]
    #[pyo3(signature = (audio_path, points=100))]
    fn waveform(audio_path: &str, points: usize) -> PyResult<Vec<f32>> {
        let (samples, _) = load_mono(std::path::Path::new(audio_path))
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(waveform_overview(&samples, points))
    }

    /// Phobz Segments Python module
    #[pymodule]
    pub fn phobz_segments(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add("__version__", env!("CARGO_PKG_VERSION"))?;
        m.add_function(wrap_pyfunction!(analyze_track, m)?)?;
        m.add_function(wrap_pyfunction!(viral_score, m)?)?;
        m.add_function(wrap_pyfunction!(enhancement_plan, m)?)?;
        m.add_function(wrap_pyfunction!(waveform, m)?)?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python_bindings::*;
