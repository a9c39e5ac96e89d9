//! Pose similarity scoring.
//!
//! Scoring is pluggable; [`NormalizedDistance`] is a deliberately simple
//! default based on mean 2D landmark distance.

use posematch_core::pose::PoseSample;

use crate::node::TargetPose;

/// Landmarks below this visibility are ignored.
pub const MIN_VISIBILITY: f32 = 0.5;

/// Mean distance (in normalized image units) that scores zero.
pub const MAX_MEAN_DISTANCE: f32 = 0.5;

/// Scores a live sample against a target pose in `0.0..=1.0`.
pub trait PoseMatcher: Send + Sync {
    fn score(&self, sample: &PoseSample, target: &TargetPose) -> f32;
}

/// `1 - mean_distance / MAX_MEAN_DISTANCE`, clamped to `0..=1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedDistance;

impl PoseMatcher for NormalizedDistance {
    fn score(&self, sample: &PoseSample, target: &TargetPose) -> f32 {
        let mut total = 0.0_f32;
        let mut compared = 0_u32;

        for (live, wanted) in sample.landmarks.iter().zip(&target.landmarks) {
            if live.visibility.is_some_and(|v| v < MIN_VISIBILITY) {
                continue;
            }
            let dx = live.x - wanted.x;
            let dy = live.y - wanted.y;
            total += (dx * dx + dy * dy).sqrt();
            compared += 1;
        }

        if compared == 0 {
            return 0.0;
        }

        let mean = total / compared as f32;
        (1.0 - mean / MAX_MEAN_DISTANCE).clamp(0.0, 1.0)
    }
}
