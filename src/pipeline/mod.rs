//! Track analysis pipeline: features in, segments and a JSON-ready report out.
//!
//! Every failure is folded into a fixed fallback report so callers always get
//! a document with the same shape.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::analysis::mean;
use crate::audio::{
    FeatureConfig, FeatureError, FeatureProvider, SpectralFeatureProvider, TrackFeatures,
};
use crate::segments::{
    detect_drops_with, detect_hooks_with, detect_transitions_with, SegmentConfig, SegmentError,
    SegmentSet, TimeInterval,
};

/// Error message reported when the input path does not exist.
pub const FILE_NOT_FOUND: &str = "File not found";
pub const FALLBACK_TEMPO: u32 = 120;
pub const FALLBACK_ENERGY: f64 = 0.5;
pub const FALLBACK_HOOKS: [[u32; 2]; 2] = [[15, 25], [45, 55]];
pub const FALLBACK_DROPS: [[u32; 2]; 1] = [[30, 35]];
pub const FALLBACK_TRANSITIONS: [[u32; 2]; 2] = [[25, 30], [55, 60]];

/// Configuration for a full track analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub features: FeatureConfig,
    pub segments: SegmentConfig,
}

/// Errors that end an analysis early.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("File not found")]
    InputNotFound(PathBuf),
    #[error("{0}")]
    AnalysisFailure(String),
}

impl From<FeatureError> for AnalysisError {
    fn from(err: FeatureError) -> Self {
        Self::AnalysisFailure(err.to_string())
    }
}

impl From<SegmentError> for AnalysisError {
    fn from(err: SegmentError) -> Self {
        Self::AnalysisFailure(err.to_string())
    }
}

/// Result of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    /// Estimated tempo in BPM.
    pub tempo: f64,
    /// Mean RMS energy.
    pub energy: f64,
    /// Track length in seconds.
    pub duration: f64,
    /// Mean spectral contrast over all bands and frames.
    pub contrast: f64,
    pub segments: SegmentSet,
    pub beat_count: usize,
}

/// Placeholder segments reported alongside an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSegments {
    pub hooks: Vec<[u32; 2]>,
    pub drops: Vec<[u32; 2]>,
    pub transitions: Vec<[u32; 2]>,
}

impl Default for FallbackSegments {
    fn default() -> Self {
        Self {
            hooks: FALLBACK_HOOKS.to_vec(),
            drops: FALLBACK_DROPS.to_vec(),
            transitions: FALLBACK_TRANSITIONS.to_vec(),
        }
    }
}

impl From<&FallbackSegments> for SegmentSet {
    fn from(fallback: &FallbackSegments) -> Self {
        let convert = |spans: &[[u32; 2]]| -> Vec<TimeInterval> {
            spans
                .iter()
                .map(|&[start, end]| TimeInterval::new(start as f64, end as f64))
                .collect()
        };
        SegmentSet {
            hooks: convert(&fallback.hooks),
            drops: convert(&fallback.drops),
            transitions: convert(&fallback.transitions),
        }
    }
}

/// Report returned in place of an analysis that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackReport {
    pub error: String,
    pub tempo: u32,
    pub energy: f64,
    pub segments: FallbackSegments,
}

impl FallbackReport {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            tempo: FALLBACK_TEMPO,
            energy: FALLBACK_ENERGY,
            segments: FallbackSegments::default(),
        }
    }
}

/// Outcome of [`analyze_track`]: an analysis or the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    Success(TrackAnalysis),
    Fallback(FallbackReport),
}

impl AnalysisReport {
    pub fn tempo(&self) -> f64 {
        match self {
            Self::Success(a) => a.tempo,
            Self::Fallback(f) => f.tempo as f64,
        }
    }

    pub fn energy(&self) -> f64 {
        match self {
            Self::Success(a) => a.energy,
            Self::Fallback(f) => f.energy,
        }
    }

    pub fn segments(&self) -> SegmentSet {
        match self {
            Self::Success(a) => a.segments.clone(),
            Self::Fallback(f) => SegmentSet::from(&f.segments),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Fallback(f) => Some(&f.error),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Compact JSON, as printed by the command line tool.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Result<TrackAnalysis, AnalysisError>> for AnalysisReport {
    fn from(result: Result<TrackAnalysis, AnalysisError>) -> Self {
        match result {
            Ok(analysis) => Self::Success(analysis),
            Err(err) => {
                log::warn!("Analysis failed, returning fallback: {}", err);
                Self::Fallback(FallbackReport::new(err.to_string()))
            }
        }
    }
}

/// Run the three detectors over extracted features.
pub fn detect_segments(
    features: &TrackFeatures,
    config: &SegmentConfig,
) -> Result<SegmentSet, SegmentError> {
    let hooks = detect_hooks_with(
        &features.rms,
        &features.novelty,
        features.duration,
        features.clock,
        &config.hooks,
    )?;
    let drops = detect_drops_with(&features.rms, features.clock, &config.drops)?;
    let transitions =
        detect_transitions_with(&features.chroma, features.clock, &config.transitions)?;

    Ok(SegmentSet {
        hooks,
        drops,
        transitions,
    })
}

/// Build the report for already extracted features.
pub fn summarize(
    features: &TrackFeatures,
    config: &SegmentConfig,
) -> Result<TrackAnalysis, SegmentError> {
    let segments = detect_segments(features, config)?;

    let contrast_values: Vec<f32> = features.contrast.iter().flatten().copied().collect();

    Ok(TrackAnalysis {
        tempo: features.tempo,
        energy: mean(&features.rms) as f64,
        duration: features.duration,
        contrast: mean(&contrast_values) as f64,
        segments,
        beat_count: features.beats.len(),
    })
}

/// Analyze a track with a custom feature provider.
pub fn try_analyze_with<F: FeatureProvider + ?Sized>(
    path: &Path,
    provider: &F,
    config: &SegmentConfig,
) -> Result<TrackAnalysis, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::InputNotFound(path.to_path_buf()));
    }

    log::info!("Analyzing {:?}", path);
    let features = provider.extract(path)?;
    let analysis = summarize(&features, config)?;
    log::info!(
        "Found {} hook(s), {} drop(s), {} transition(s) at {:.1} BPM",
        analysis.segments.hooks.len(),
        analysis.segments.drops.len(),
        analysis.segments.transitions.len(),
        analysis.tempo
    );
    Ok(analysis)
}

/// Analyze a track with the built-in feature provider.
pub fn try_analyze<P: AsRef<Path>>(
    path: P,
    config: &AnalysisConfig,
) -> Result<TrackAnalysis, AnalysisError> {
    let provider = SpectralFeatureProvider::new(config.features.clone());
    try_analyze_with(path.as_ref(), &provider, &config.segments)
}

/// Analyze a track with default settings; failures become a fallback report.
///
/// # Example
///
/// ```no_run
/// use phobz_segments::pipeline::analyze_track;
///
/// let report = analyze_track("song.mp3");
/// println!("{}", report.to_json().unwrap());
/// ```
pub fn analyze_track<P: AsRef<Path>>(path: P) -> AnalysisReport {
    analyze_track_with(path, &AnalysisConfig::default())
}

/// Analyze a track with explicit settings; failures become a fallback report.
pub fn analyze_track_with<P: AsRef<Path>>(path: P, config: &AnalysisConfig) -> AnalysisReport {
    try_analyze(path, config).into()
}
