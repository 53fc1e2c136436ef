//! Heuristics computed from a finished analysis: a 0-100 "viral" score and
//! the enhancement settings a renderer would apply.

use serde::{Deserialize, Serialize};

use crate::pipeline::AnalysisReport;

/// Tempo assumed when the analysis reports none.
pub const DEFAULT_TEMPO: f64 = 100.0;
/// Energy assumed when the analysis reports none.
pub const DEFAULT_ENERGY: f64 = 0.5;
/// Tempo the enhancement plan steers towards.
pub const TARGET_TEMPO: f64 = 120.0;
pub const MIN_TEMPO_RATIO: f64 = 0.9;
pub const MAX_TEMPO_RATIO: f64 = 1.15;

fn or_default(value: f64, default: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        default
    } else {
        value
    }
}

/// Score a report from 0 to 100.
///
/// Starts at 50; tempos near 115-145 BPM add 15 (7 for 100-160), energy adds
/// up to 20 per unit, and every detected segment adds 3, capped at 15.
pub fn viral_score(report: &AnalysisReport) -> u8 {
    let tempo = or_default(report.tempo(), DEFAULT_TEMPO);
    let energy = or_default(report.energy(), DEFAULT_ENERGY);

    let mut score = 50.0;
    if (115.0..=145.0).contains(&tempo) {
        score += 15.0;
    } else if (100.0..=160.0).contains(&tempo) {
        score += 7.0;
    }
    score += energy * 20.0;
    score += (report.segments().total() as f64 * 3.0).min(15.0);

    score.round().clamp(0.0, 100.0) as u8
}

/// How aggressively a track should be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnhancementLevel {
    High,
    Medium,
}

impl EnhancementLevel {
    /// `High` above a score of 75.
    pub fn from_score(score: u8) -> Self {
        if score > 75 {
            Self::High
        } else {
            Self::Medium
        }
    }
}

/// Processing settings derived from an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementPlan {
    /// Playback-rate factor nudging the tempo towards 120 BPM.
    pub tempo_ratio: f64,
    /// Low-shelf boost in dB; quieter tracks get more.
    pub bass_gain_db: f64,
    pub optimized_segments: usize,
    pub viral_score: u8,
    pub level: EnhancementLevel,
}

impl EnhancementPlan {
    pub fn from_report(report: &AnalysisReport) -> Self {
        let tempo = or_default(report.tempo(), DEFAULT_TEMPO);
        let tempo_ratio = (TARGET_TEMPO / tempo).clamp(MIN_TEMPO_RATIO, MAX_TEMPO_RATIO);
        let bass_gain_db = if report.energy() < 0.5 { 6.0 } else { 3.0 };
        let score = viral_score(report);

        Self {
            tempo_ratio,
            bass_gain_db,
            optimized_segments: report.segments().total(),
            viral_score: score,
            level: EnhancementLevel::from_score(score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FallbackReport, TrackAnalysis};
    use crate::segments::{SegmentSet, TimeInterval};

    fn report(tempo: f64, energy: f64, segments: usize) -> AnalysisReport {
        AnalysisReport::Success(TrackAnalysis {
            tempo,
            energy,
            duration: 180.0,
            contrast: 20.0,
            segments: SegmentSet {
                hooks: vec![TimeInterval::new(1.0, 4.0); segments],
                drops: vec![],
                transitions: vec![],
            },
            beat_count: 0,
        })
    }

    #[test]
    fn test_fallback_score() {
        // 50 + 15 (120 BPM) + 10 (energy 0.5) + 15 (5 segments)
        let fallback = AnalysisReport::Fallback(FallbackReport::new("File not found"));
        assert_eq!(viral_score(&fallback), 90);
    }

    #[test]
    fn test_tempo_bands() {
        assert_eq!(viral_score(&report(128.0, 0.1, 0)), 67);
        assert_eq!(viral_score(&report(155.0, 0.1, 0)), 59);
        assert_eq!(viral_score(&report(90.0, 0.1, 0)), 52);
    }

    #[test]
    fn test_missing_values_use_defaults() {
        // Tempo 0 counts as 100 BPM, energy 0 as 0.5.
        assert_eq!(viral_score(&report(0.0, 0.0, 0)), 67);
    }

    #[test]
    fn test_score_is_bounded() {
        assert_eq!(viral_score(&report(130.0, 10.0, 20)), 100);
        assert_eq!(viral_score(&report(300.0, -10.0, 0)), 0);
    }

    #[test]
    fn test_segment_bonus_is_capped() {
        assert_eq!(viral_score(&report(90.0, 0.1, 2)), 58);
        assert_eq!(viral_score(&report(90.0, 0.1, 9)), 67);
    }

    #[test]
    fn test_enhancement_plan() {
        let slow = EnhancementPlan::from_report(&report(80.0, 0.2, 3));
        assert!((slow.tempo_ratio - 1.15).abs() < 1e-12);
        assert_eq!(slow.bass_gain_db, 6.0);
        assert_eq!(slow.optimized_segments, 3);

        let fast = EnhancementPlan::from_report(&report(150.0, 0.8, 0));
        assert!((fast.tempo_ratio - 0.9).abs() < 1e-12);
        assert_eq!(fast.bass_gain_db, 3.0);

        let unknown = EnhancementPlan::from_report(&report(0.0, 0.6, 0));
        assert!((unknown.tempo_ratio - 1.15).abs() < 1e-12);
    }

    #[test]
    fn test_enhancement_level() {
        assert_eq!(EnhancementLevel::from_score(76), EnhancementLevel::High);
        assert_eq!(EnhancementLevel::from_score(75), EnhancementLevel::Medium);
        let plan = EnhancementPlan::from_report(&AnalysisReport::Fallback(FallbackReport::new("x")));
        assert_eq!(plan.level, EnhancementLevel::High);
    }
}
