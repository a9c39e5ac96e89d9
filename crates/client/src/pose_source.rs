//! Pose inputs the host polls once per tick.

use std::path::Path;

use posematch_core::pose::PoseSample;

use crate::error::ClientError;

/// Latest output of a pose estimator.
///
/// Estimation itself happens elsewhere; the host only asks for the most
/// recent sample, which may be absent (no person in frame).
pub trait PoseSource: Send {
    fn latest(&mut self, now_ms: i64) -> Option<PoseSample>;
}

/// Replays a recorded pose stream in a loop, one sample per poll.
#[derive(Debug, Clone, Default)]
pub struct RecordedPoseSource {
    samples: Vec<PoseSample>,
    cursor: usize,
}

impl RecordedPoseSource {
    pub fn new(samples: Vec<PoseSample>) -> Self {
        Self { samples, cursor: 0 }
    }

    /// Load a JSON array of [`PoseSample`]s.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path)?;
        let samples: Vec<PoseSample> = serde_json::from_str(&raw)?;
        Ok(Self::new(samples))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl PoseSource for RecordedPoseSource {
    fn latest(&mut self, now_ms: i64) -> Option<PoseSample> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sample = self.samples[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.samples.len();
        sample.captured_at_ms = now_ms;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use posematch_core::pose::Landmark;

    use super::*;

    fn sample(x: f32) -> PoseSample {
        PoseSample {
            landmarks: vec![Landmark {
                x,
                y: 0.0,
                z: 0.0,
                visibility: None,
            }],
            captured_at_ms: 0,
        }
    }

    #[test]
    fn cycles_through_samples() {
        let mut source = RecordedPoseSource::new(vec![sample(0.1), sample(0.2)]);
        let xs: Vec<f32> = (0..3)
            .map(|t| source.latest(t).unwrap().landmarks[0].x)
            .collect();
        assert_eq!(xs, vec![0.1, 0.2, 0.1]);
    }

    #[test]
    fn stamps_capture_time() {
        let mut source = RecordedPoseSource::new(vec![sample(0.1)]);
        assert_eq!(source.latest(42).unwrap().captured_at_ms, 42);
    }

    #[test]
    fn empty_source_yields_nothing() {
        let mut source = RecordedPoseSource::default();
        assert!(source.latest(0).is_none());
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"landmarks":[{{"x":0.5,"y":0.25}}],"capturedAtMs":0}}]"#
        )
        .unwrap();
        let source = RecordedPoseSource::from_path(file.path()).unwrap();
        assert_eq!(source.len(), 1);
    }
}
