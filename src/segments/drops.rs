//! Drop detection: sudden energy rises after a quieter stretch.

use super::peaks::{find_peaks, PeakOptions};
use super::{
    SegmentError, TimeInterval, DROP_CONTEXT_FRAMES, DROP_MAX_SECS, DROP_MIN_SECS,
    DROP_MIN_SPACING_SECS, DROP_NORM_EPSILON, DROP_PEAK_HEIGHT, DROP_PRE_GAP_FRAMES,
    DROP_RISE_RATIO, DROP_TARGET_SECS, MAX_DROPS,
};
use crate::audio::analysis::{mean, FrameClock};

/// Drop detector thresholds.
#[derive(Debug, Clone)]
pub struct DropConfig {
    pub peak_height: f32,
    pub min_spacing_secs: f64,
    pub context_frames: usize,
    pub pre_gap_frames: usize,
    pub rise_ratio: f32,
    pub target_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub max_count: usize,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            peak_height: DROP_PEAK_HEIGHT,
            min_spacing_secs: DROP_MIN_SPACING_SECS,
            context_frames: DROP_CONTEXT_FRAMES,
            pre_gap_frames: DROP_PRE_GAP_FRAMES,
            rise_ratio: DROP_RISE_RATIO,
            target_secs: DROP_TARGET_SECS,
            min_secs: DROP_MIN_SECS,
            max_secs: DROP_MAX_SECS,
            max_count: MAX_DROPS,
        }
    }
}

/// Scale to `[0, 1]`; a constant signal maps to all zeros.
fn min_max_normalize(x: &[f32]) -> Vec<f32> {
    let min = x.iter().copied().fold(f32::INFINITY, f32::min);
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min + DROP_NORM_EPSILON;
    x.iter().map(|&v| (v - min) / range).collect()
}

/// Detect drops with the default thresholds.
pub fn detect_drops(energy: &[f32], clock: FrameClock) -> Result<Vec<TimeInterval>, SegmentError> {
    detect_drops_with(energy, clock, &DropConfig::default())
}

/// Detect drops in an energy envelope.
///
/// Candidates are large frame-to-frame jumps in normalized energy. A jump at
/// frame `i` is kept when the mean energy over `i..i + context` exceeds
/// `rise_ratio` times the mean over `i - context..i - pre_gap`; jumps without
/// a full context window on either side are skipped.
pub fn detect_drops_with(
    energy: &[f32],
    clock: FrameClock,
    config: &DropConfig,
) -> Result<Vec<TimeInterval>, SegmentError> {
    if energy.is_empty() {
        return Err(SegmentError::EmptySignal("energy"));
    }

    let norm = min_max_normalize(energy);
    let diff: Vec<f32> = norm.windows(2).map(|w| w[1] - w[0]).collect();

    let options = PeakOptions {
        height: Some(config.peak_height),
        distance: clock.frames_in(config.min_spacing_secs),
    };
    let peaks = find_peaks(&diff, &options);

    let context = config.context_frames;
    let pre_gap = config.pre_gap_frames.min(context);
    let length = config.target_secs.clamp(config.min_secs, config.max_secs);

    let mut drops = Vec::new();
    for idx in peaks {
        if idx < context || idx + context >= norm.len() {
            continue;
        }

        let pre = mean(&norm[idx - context..idx - pre_gap]);
        let post = mean(&norm[idx..idx + context]);
        if post > config.rise_ratio * pre {
            drops.push(TimeInterval::starting_at(clock.frame_to_time(idx), length));
            if drops.len() == config.max_count {
                break;
            }
        }
    }

    log::debug!("Drop detection: {} drop(s)", drops.len());
    Ok(drops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> FrameClock {
        FrameClock::new(10.0)
    }

    fn step(low: f32, high: f32, at: usize, len: usize) -> Vec<f32> {
        (0..len).map(|i| if i < at { low } else { high }).collect()
    }

    #[test]
    fn test_step_is_a_drop() {
        let energy = step(0.2, 0.4, 100, 200);
        let drops = detect_drops(&energy, clock()).unwrap();
        assert_eq!(drops.len(), 1);
        assert!((drops[0].start - 9.9).abs() < 1e-9);
        assert!((drops[0].duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_energy_has_no_drops() {
        assert!(detect_drops(&[0.5; 300], clock()).unwrap().is_empty());
        assert!(detect_drops(&[0.0; 300], clock()).unwrap().is_empty());
    }

    #[test]
    fn test_step_without_context_is_skipped() {
        let early = step(0.2, 0.4, 10, 200);
        assert!(detect_drops(&early, clock()).unwrap().is_empty());

        let late = step(0.2, 0.4, 190, 200);
        assert!(detect_drops(&late, clock()).unwrap().is_empty());
    }

    #[test]
    fn test_at_most_two_drops() {
        let mut energy = Vec::new();
        for level in [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0] {
            energy.extend(std::iter::repeat(level).take(60));
        }
        let drops = detect_drops(&energy, clock()).unwrap();
        assert_eq!(drops.len(), 2);
        assert!((drops[0].start - 5.9).abs() < 1e-9);
        assert!((drops[1].start - 17.9).abs() < 1e-9);
    }

    #[test]
    fn test_empty_energy_is_an_error() {
        assert_eq!(
            detect_drops(&[], clock()),
            Err(SegmentError::EmptySignal("energy"))
        );
    }

    #[test]
    fn test_normalize_is_bounded() {
        let norm = min_max_normalize(&[2.0, 4.0, 3.0]);
        assert!(norm[0].abs() < 1e-6);
        assert!((norm[1] - 1.0).abs() < 1e-6);
        assert!((norm[2] - 0.5).abs() < 1e-6);
    }
}
