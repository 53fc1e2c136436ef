//! Hook detection: short, energetic spans that start on a novelty peak.

use super::peaks::{find_peaks, PeakOptions};
use super::{
    SegmentError, TimeInterval, HOOK_ENERGY_FACTOR, HOOK_FALLBACK_MIN_TRACK_SECS,
    HOOK_FALLBACK_SECS, HOOK_MAX_SECS, HOOK_MIN_SECS, HOOK_MIN_SPACING_SECS, HOOK_NOVELTY_FACTOR,
    HOOK_TARGET_SECS, MAX_HOOKS,
};
use crate::audio::analysis::{mean, FrameClock};

/// Hook detector thresholds.
#[derive(Debug, Clone)]
pub struct HookConfig {
    pub novelty_factor: f32,
    pub min_spacing_secs: f64,
    pub energy_factor: f32,
    pub min_secs: f64,
    pub target_secs: f64,
    pub max_secs: f64,
    pub max_count: usize,
    pub fallback_min_track_secs: f64,
    pub fallback_secs: f64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            novelty_factor: HOOK_NOVELTY_FACTOR,
            min_spacing_secs: HOOK_MIN_SPACING_SECS,
            energy_factor: HOOK_ENERGY_FACTOR,
            min_secs: HOOK_MIN_SECS,
            target_secs: HOOK_TARGET_SECS,
            max_secs: HOOK_MAX_SECS,
            max_count: MAX_HOOKS,
            fallback_min_track_secs: HOOK_FALLBACK_MIN_TRACK_SECS,
            fallback_secs: HOOK_FALLBACK_SECS,
        }
    }
}

/// Detect hooks with the default thresholds.
pub fn detect_hooks(
    energy: &[f32],
    novelty: &[f32],
    track_length: f64,
    clock: FrameClock,
) -> Result<Vec<TimeInterval>, SegmentError> {
    detect_hooks_with(energy, novelty, track_length, clock, &HookConfig::default())
}

/// Detect hooks: novelty peaks where the energy is above average.
///
/// Each hook starts at its peak and runs for up to `target_secs`, shortened
/// near the end of the track but never below `min_secs`. Long tracks with no
/// qualifying peak get one placeholder hook a third of the way in.
pub fn detect_hooks_with(
    energy: &[f32],
    novelty: &[f32],
    track_length: f64,
    clock: FrameClock,
    config: &HookConfig,
) -> Result<Vec<TimeInterval>, SegmentError> {
    if novelty.is_empty() {
        return Err(SegmentError::EmptySignal("novelty"));
    }
    if energy.is_empty() {
        return Err(SegmentError::EmptySignal("energy"));
    }

    let options = PeakOptions {
        height: Some(config.novelty_factor * mean(novelty)),
        distance: clock.frames_in(config.min_spacing_secs),
    };
    let peaks = find_peaks(novelty, &options);
    let energy_floor = config.energy_factor * mean(energy);

    let mut hooks = Vec::new();
    for peak in peaks {
        let start = clock.frame_to_time(peak);
        let Some(idx) = clock.time_to_frame(start).filter(|&i| i < energy.len()) else {
            continue;
        };
        if energy[idx] <= energy_floor {
            continue;
        }

        let length = config
            .target_secs
            .min(track_length - start)
            .clamp(config.min_secs, config.max_secs);
        hooks.push(TimeInterval::starting_at(start, length));
        if hooks.len() == config.max_count {
            break;
        }
    }

    log::debug!("Hook detection: {} candidate(s) kept", hooks.len());

    if hooks.is_empty() && track_length > config.fallback_min_track_secs {
        let start = track_length / 3.0;
        hooks.push(TimeInterval::starting_at(start, config.fallback_secs));
    }

    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 10.0;

    fn clock() -> FrameClock {
        FrameClock::new(RATE)
    }

    fn spikes(len: usize, at: &[usize]) -> Vec<f32> {
        let mut x = vec![0.1; len];
        for &i in at {
            x[i] = 1.0;
        }
        x
    }

    #[test]
    fn test_hooks_start_on_energetic_peaks() {
        let novelty = spikes(200, &[50, 100, 150]);
        let energy = vec![1.0; 200];
        let hooks = detect_hooks(&energy, &novelty, 20.0, clock()).unwrap();

        assert_eq!(
            hooks,
            vec![
                TimeInterval::new(5.0, 11.0),
                TimeInterval::new(10.0, 16.0),
                TimeInterval::new(15.0, 20.0),
            ]
        );
    }

    #[test]
    fn test_quiet_peaks_are_rejected() {
        let novelty = spikes(200, &[50, 150]);
        let mut energy = vec![1.0; 200];
        energy[50] = 0.1;
        let hooks = detect_hooks(&energy, &novelty, 20.0, clock()).unwrap();
        assert_eq!(hooks, vec![TimeInterval::new(15.0, 20.0)]);
    }

    #[test]
    fn test_hook_length_is_at_least_minimum() {
        let novelty = spikes(200, &[195]);
        let energy = vec![1.0; 200];
        let hooks = detect_hooks(&energy, &novelty, 20.0, clock()).unwrap();
        assert_eq!(hooks.len(), 1);
        assert!((hooks[0].start - 19.5).abs() < 1e-9);
        assert!((hooks[0].duration() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_at_most_three_hooks() {
        let novelty = spikes(400, &[20, 60, 100, 140, 180, 220]);
        let energy = vec![1.0; 400];
        let hooks = detect_hooks(&energy, &novelty, 40.0, clock()).unwrap();
        assert_eq!(hooks.len(), 3);
        assert!((hooks[0].start - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_peaks_beyond_energy_are_skipped() {
        let novelty = spikes(200, &[150]);
        let energy = vec![1.0; 100];
        let hooks = detect_hooks(&energy, &novelty, 20.0, clock()).unwrap();
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_fallback_only_for_long_tracks() {
        let novelty = vec![0.5; 400];
        let energy = vec![1.0; 400];

        let short = detect_hooks(&energy, &novelty, 30.0, clock()).unwrap();
        assert!(short.is_empty());

        let long = detect_hooks(&energy, &novelty, 60.0, clock()).unwrap();
        assert_eq!(long, vec![TimeInterval::new(20.0, 25.0)]);
    }

    #[test]
    fn test_close_peaks_are_merged() {
        // Four frames apart is under half a second at 10 frames/s.
        let mut novelty = spikes(200, &[50, 54]);
        novelty[54] = 0.9;
        let energy = vec![1.0; 200];
        let hooks = detect_hooks(&energy, &novelty, 20.0, clock()).unwrap();
        assert_eq!(hooks.len(), 1);
        assert!((hooks[0].start - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs_are_errors() {
        assert_eq!(
            detect_hooks(&[1.0], &[], 10.0, clock()),
            Err(SegmentError::EmptySignal("novelty"))
        );
        assert_eq!(
            detect_hooks(&[], &[1.0], 10.0, clock()),
            Err(SegmentError::EmptySignal("energy"))
        );
    }
}
