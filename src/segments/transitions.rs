//! Transition detection: frames where the harmonic content changes quickly.

use super::peaks::{find_peaks, PeakOptions};
use super::{
    SegmentError, TimeInterval, MAX_TRANSITIONS, TRANSITION_MAX_SECS, TRANSITION_MIN_SECS,
    TRANSITION_MIN_SPACING_FRAMES, TRANSITION_PEAK_HEIGHT, TRANSITION_TARGET_SECS,
};
use crate::audio::analysis::FrameClock;
use crate::audio::harmonic::Chromagram;

/// Transition detector thresholds.
#[derive(Debug, Clone)]
pub struct TransitionConfig {
    pub peak_height: f32,
    pub min_spacing_frames: usize,
    pub target_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub max_count: usize,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            peak_height: TRANSITION_PEAK_HEIGHT,
            min_spacing_frames: TRANSITION_MIN_SPACING_FRAMES,
            target_secs: TRANSITION_TARGET_SECS,
            min_secs: TRANSITION_MIN_SECS,
            max_secs: TRANSITION_MAX_SECS,
            max_count: MAX_TRANSITIONS,
        }
    }
}

/// L1 distance between consecutive chroma frames.
///
/// Entry `k` is the change from frame `k` to frame `k + 1`.
pub fn chroma_flux(chroma: &Chromagram) -> Result<Vec<f32>, SegmentError> {
    let frames = chroma.num_frames();
    if chroma.num_bins() == 0 || frames < 2 {
        return Err(SegmentError::InsufficientFrames {
            needed: 2,
            got: frames,
        });
    }
    if let Some((row, r)) = chroma
        .rows()
        .iter()
        .enumerate()
        .find(|(_, r)| r.len() != frames)
    {
        return Err(SegmentError::ShapeMismatch {
            row,
            expected: frames,
            got: r.len(),
        });
    }

    Ok((0..frames - 1)
        .map(|k| {
            chroma
                .column(k)
                .zip(chroma.column(k + 1))
                .map(|(a, b)| (b - a).abs())
                .sum()
        })
        .collect())
}

/// Detect transitions with the default thresholds.
pub fn detect_transitions(
    chroma: &Chromagram,
    clock: FrameClock,
) -> Result<Vec<TimeInterval>, SegmentError> {
    detect_transitions_with(chroma, clock, &TransitionConfig::default())
}

/// Detect transitions as peaks of max-normalized chroma flux.
pub fn detect_transitions_with(
    chroma: &Chromagram,
    clock: FrameClock,
    config: &TransitionConfig,
) -> Result<Vec<TimeInterval>, SegmentError> {
    let mut flux = chroma_flux(chroma)?;

    let max = flux.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in flux.iter_mut() {
            *v /= max;
        }
    }

    let options = PeakOptions {
        height: Some(config.peak_height),
        distance: config.min_spacing_frames,
    };
    let length = config.target_secs.clamp(config.min_secs, config.max_secs);

    let transitions: Vec<TimeInterval> = find_peaks(&flux, &options)
        .into_iter()
        .take(config.max_count)
        .map(|k| TimeInterval::starting_at(clock.frame_to_time(k), length))
        .collect();

    log::debug!("Transition detection: {} transition(s)", transitions.len());
    Ok(transitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::harmonic::N_CHROMA;

    /// Chromagram holding one pitch class per section.
    fn sections(classes: &[usize], frames_each: usize) -> Chromagram {
        let frames = classes.len() * frames_each;
        let mut rows = vec![vec![0.0; frames]; N_CHROMA];
        for (s, &class) in classes.iter().enumerate() {
            for t in s * frames_each..(s + 1) * frames_each {
                rows[class][t] = 1.0;
            }
        }
        Chromagram::new(rows)
    }

    #[test]
    fn test_flux_reports_change_at_earlier_frame() {
        let chroma = sections(&[0, 7], 3);
        let flux = chroma_flux(&chroma).unwrap();
        assert_eq!(flux, vec![0.0, 0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_section_changes_are_transitions() {
        let chroma = sections(&[0, 4, 7], 50);
        let transitions = detect_transitions(&chroma, FrameClock::new(10.0)).unwrap();
        assert_eq!(
            transitions,
            vec![TimeInterval::new(4.9, 6.9), TimeInterval::new(9.9, 11.9)]
        );
    }

    #[test]
    fn test_at_most_five_transitions() {
        let classes: Vec<usize> = (0..10).map(|i| i % N_CHROMA).collect();
        let chroma = sections(&classes, 30);
        let transitions = detect_transitions(&chroma, FrameClock::new(10.0)).unwrap();
        assert_eq!(transitions.len(), 5);
        assert!(transitions.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_static_harmony_has_no_transitions() {
        let chroma = sections(&[2], 100);
        assert!(detect_transitions(&chroma, FrameClock::new(10.0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_chroma_is_rejected() {
        let single = sections(&[0], 1);
        assert_eq!(
            detect_transitions(&single, FrameClock::new(10.0)),
            Err(SegmentError::InsufficientFrames { needed: 2, got: 1 })
        );

        let mut rows = vec![vec![0.0; 10]; N_CHROMA];
        rows[5].truncate(8);
        assert_eq!(
            detect_transitions(&Chromagram::new(rows), FrameClock::new(10.0)),
            Err(SegmentError::ShapeMismatch {
                row: 5,
                expected: 10,
                got: 8
            })
        );
    }
}
