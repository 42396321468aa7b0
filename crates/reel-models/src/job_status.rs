//! Job status state machine.
//!
//! A job moves forward through the pipeline stages in a fixed order. `Error`
//! can be reached from any non-terminal status; `Complete` only from
//! `Stitching`. Terminal statuses never move again, except through an
//! explicit retry reset on the job itself.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is stored and waiting for a worker
    #[default]
    Pending,
    /// LLM is splitting the script into segments
    GeneratingJsons,
    /// Narration audio is being synthesized
    GeneratingVoice,
    /// Still images are being generated
    GeneratingImages,
    /// Video clips are being generated
    GeneratingVideos,
    /// ffmpeg is assembling the final video
    Stitching,
    /// Final video uploaded
    Complete,
    /// Pipeline failed
    Error,
}

impl JobStatus {
    /// All statuses in pipeline order.
    pub const PIPELINE: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::GeneratingJsons,
        JobStatus::GeneratingVoice,
        JobStatus::GeneratingImages,
        JobStatus::GeneratingVideos,
        JobStatus::Stitching,
        JobStatus::Complete,
    ];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::GeneratingJsons => "generating_jsons",
            JobStatus::GeneratingVoice => "generating_voice",
            JobStatus::GeneratingImages => "generating_images",
            JobStatus::GeneratingVideos => "generating_videos",
            JobStatus::Stitching => "stitching",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::PIPELINE
            .iter()
            .copied()
            .chain(std::iter::once(JobStatus::Error))
            .find(|status| status.as_str() == s)
    }

    /// Position in the pipeline. `Error` has no position.
    pub fn rank(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| s == self)
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    /// Check if a worker is currently expected to be working on the job.
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != JobStatus::Pending
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Error => true,
            JobStatus::Complete => *self == JobStatus::Stitching,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }

    /// Statuses from which `self` may be entered.
    pub fn allowed_predecessors(&self) -> Vec<JobStatus> {
        Self::PIPELINE
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }

    /// Progress floor of a stage (0-100).
    pub fn stage_progress(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::GeneratingJsons => 5,
            JobStatus::GeneratingVoice => 20,
            JobStatus::GeneratingImages => 40,
            JobStatus::GeneratingVideos => 60,
            JobStatus::Stitching => 85,
            JobStatus::Complete => 100,
            JobStatus::Error => 0,
        }
    }

    /// Progress ceiling of a stage: the floor of the following stage.
    pub fn stage_ceiling(&self) -> u8 {
        match self.rank() {
            Some(rank) if rank + 1 < Self::PIPELINE.len() => Self::PIPELINE[rank + 1].stage_progress(),
            _ => 100,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::GeneratingJsons));
        assert!(JobStatus::GeneratingJsons.can_transition_to(JobStatus::GeneratingVoice));
        // Skipping a stage is still forward
        assert!(JobStatus::GeneratingImages.can_transition_to(JobStatus::Stitching));
        assert!(JobStatus::Stitching.can_transition_to(JobStatus::Complete));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!JobStatus::GeneratingVoice.can_transition_to(JobStatus::GeneratingJsons));
        assert!(!JobStatus::Stitching.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::GeneratingVoice.can_transition_to(JobStatus::GeneratingVoice));
    }

    #[test]
    fn test_complete_only_from_stitching() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Complete));
        assert!(!JobStatus::GeneratingVideos.can_transition_to(JobStatus::Complete));
    }

    #[test]
    fn test_terminal_statuses_are_frozen() {
        for next in JobStatus::PIPELINE {
            assert!(!JobStatus::Complete.can_transition_to(next));
            assert!(!JobStatus::Error.can_transition_to(next));
        }
        assert!(!JobStatus::Complete.can_transition_to(JobStatus::Error));
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        for from in &JobStatus::PIPELINE[..6] {
            assert!(from.can_transition_to(JobStatus::Error), "{from} -> error");
        }
    }

    #[test]
    fn test_allowed_predecessors() {
        assert_eq!(
            JobStatus::GeneratingJsons.allowed_predecessors(),
            vec![JobStatus::Pending]
        );
        assert_eq!(
            JobStatus::Complete.allowed_predecessors(),
            vec![JobStatus::Stitching]
        );
        assert_eq!(JobStatus::Error.allowed_predecessors().len(), 6);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&JobStatus::GeneratingJsons).unwrap();
        assert_eq!(json, "\"generating_jsons\"");
        assert_eq!(JobStatus::parse("stitching"), Some(JobStatus::Stitching));
        assert_eq!(JobStatus::parse("error"), Some(JobStatus::Error));
        assert_eq!(JobStatus::parse("done"), None);
        assert!(serde_json::from_str::<JobStatus>("\"done\"").is_err());
    }

    #[test]
    fn test_stage_progress_is_monotonic() {
        let floors: Vec<u8> = JobStatus::PIPELINE.iter().map(|s| s.stage_progress()).collect();
        assert!(floors.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(JobStatus::GeneratingVoice.stage_ceiling(), 40);
        assert_eq!(JobStatus::Complete.stage_ceiling(), 100);
    }
}
