//! Segment detection: hooks, drops and harmonic transitions.
//!
//! Each detector turns frame-level signals into a short, capped list of
//! [`TimeInterval`]s. Thresholds live in per-detector config structs whose
//! `Default` impls use the constants below.

pub mod drops;
pub mod hooks;
pub mod peaks;
pub mod transitions;

use serde::{Deserialize, Serialize};

pub use drops::{detect_drops, detect_drops_with, DropConfig};
pub use hooks::{detect_hooks, detect_hooks_with, HookConfig};
pub use peaks::{find_peaks, PeakOptions};
pub use transitions::{detect_transitions, detect_transitions_with, TransitionConfig};

/// Novelty peaks must reach this multiple of the mean novelty.
pub const HOOK_NOVELTY_FACTOR: f32 = 1.5;
/// Minimum spacing between novelty peaks, in seconds.
pub const HOOK_MIN_SPACING_SECS: f64 = 0.5;
/// Energy at a hook must exceed this multiple of the mean energy.
pub const HOOK_ENERGY_FACTOR: f32 = 0.8;
pub const HOOK_MIN_SECS: f64 = 3.0;
pub const HOOK_TARGET_SECS: f64 = 6.0;
pub const HOOK_MAX_SECS: f64 = 8.0;
pub const MAX_HOOKS: usize = 3;
/// Tracks longer than this get a placeholder hook when none qualify.
pub const HOOK_FALLBACK_MIN_TRACK_SECS: f64 = 30.0;
pub const HOOK_FALLBACK_SECS: f64 = 5.0;

pub const DROP_NORM_EPSILON: f32 = 1e-10;
/// Minimum jump in normalized energy between consecutive frames.
pub const DROP_PEAK_HEIGHT: f32 = 0.6;
pub const DROP_MIN_SPACING_SECS: f64 = 1.0;
/// Frames of context required on both sides of a drop.
pub const DROP_CONTEXT_FRAMES: usize = 20;
/// Frames right before a drop excluded from the "before" average.
pub const DROP_PRE_GAP_FRAMES: usize = 5;
pub const DROP_RISE_RATIO: f32 = 1.5;
pub const DROP_TARGET_SECS: f64 = 5.0;
pub const DROP_MIN_SECS: f64 = 2.0;
pub const DROP_MAX_SECS: f64 = 6.0;
pub const MAX_DROPS: usize = 2;

/// Minimum normalized chroma change for a transition.
pub const TRANSITION_PEAK_HEIGHT: f32 = 0.15;
pub const TRANSITION_MIN_SPACING_FRAMES: usize = 20;
pub const TRANSITION_TARGET_SECS: f64 = 2.0;
pub const TRANSITION_MIN_SECS: f64 = 1.0;
pub const TRANSITION_MAX_SECS: f64 = 3.0;
pub const MAX_TRANSITIONS: usize = 5;

/// Errors from segment detection inputs.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SegmentError {
    #[error("Signal `{0}` is empty")]
    EmptySignal(&'static str),
    #[error("Chromagram needs at least {needed} frames, got {got}")]
    InsufficientFrames { needed: usize, got: usize },
    #[error("Chromagram row {row} has {got} frames, expected {expected}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// A span of the track in seconds. Serialized as `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct TimeInterval {
    pub start: f64,
    pub end: f64,
}

impl TimeInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Interval of `length` seconds starting at `start`.
    pub fn starting_at(start: f64, length: f64) -> Self {
        Self::new(start, start + length)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl From<(f64, f64)> for TimeInterval {
    fn from((start, end): (f64, f64)) -> Self {
        Self::new(start, end)
    }
}

impl From<TimeInterval> for (f64, f64) {
    fn from(interval: TimeInterval) -> Self {
        (interval.start, interval.end)
    }
}

/// Detected segments of one track, each list in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSet {
    pub hooks: Vec<TimeInterval>,
    pub drops: Vec<TimeInterval>,
    pub transitions: Vec<TimeInterval>,
}

impl SegmentSet {
    /// Number of intervals across all three kinds.
    pub fn total(&self) -> usize {
        self.hooks.len() + self.drops.len() + self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Thresholds for all three detectors.
#[derive(Debug, Clone, Default)]
pub struct SegmentConfig {
    pub hooks: HookConfig,
    pub drops: DropConfig,
    pub transitions: TransitionConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_serializes_as_pair() {
        let json = serde_json::to_string(&TimeInterval::new(1.5, 4.0)).unwrap();
        assert_eq!(json, "[1.5,4.0]");

        let parsed: TimeInterval = serde_json::from_str("[2.0,3.5]").unwrap();
        assert_eq!(parsed, TimeInterval::new(2.0, 3.5));
        assert!((parsed.duration() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_segment_set_shape() {
        let set = SegmentSet {
            hooks: vec![TimeInterval::starting_at(10.0, 6.0)],
            drops: vec![],
            transitions: vec![TimeInterval::starting_at(3.0, 2.0)],
        };
        assert_eq!(set.total(), 2);
        assert!(!set.is_empty());
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"{"hooks":[[10.0,16.0]],"drops":[],"transitions":[[3.0,5.0]]}"#
        );
    }
}
