//! Reconciliation of generated assets into a render plan.
//!
//! The generation stages skip failed segments, so by stitching time the
//! voice, image and clip manifests can each have holes. [`reconcile`] decides
//! what every segment renders from:
//!
//! - no narration audio: the segment is dropped;
//! - no image: borrow the nearest earlier image, else the nearest later one;
//! - a generated clip renders as video, anything else as a Ken Burns still.

use serde::Serialize;

use reel_models::{ImageManifest, VideoManifest, VoiceManifest};

use crate::error::{WorkerError, WorkerResult};

/// What a segment is rendered from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSegment {
    pub index: u32,
    pub audio_key: String,
    /// Still image, used directly or as the fallback for a clip
    pub image_key: String,
    /// Segment whose image was borrowed, when not our own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_from: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_key: Option<String>,
}

impl PlannedSegment {
    pub fn uses_clip(&self) -> bool {
        self.clip_key.is_some()
    }
}

/// Ordered segments to render, plus the ones left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentPlan {
    pub segments: Vec<PlannedSegment>,
    /// Segments dropped for lack of narration
    pub dropped: Vec<u32>,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn borrowed(&self) -> usize {
        self.segments.iter().filter(|s| s.image_from.is_some()).count()
    }

    pub fn clips(&self) -> usize {
        self.segments.iter().filter(|s| s.uses_clip()).count()
    }
}

/// Build the render plan for `segment_count` segments.
pub fn reconcile(
    segment_count: u32,
    voice: &VoiceManifest,
    images: &ImageManifest,
    videos: &VideoManifest,
) -> WorkerResult<SegmentPlan> {
    let image_at = |i: u32| images.key_for(i).map(|k| (i, k));

    if (0..segment_count).all(|i| image_at(i).is_none()) {
        return Err(WorkerError::job_failed("no images were generated"));
    }

    let mut plan = SegmentPlan::default();

    for index in 0..segment_count {
        let Some(audio_key) = voice.key_for(index) else {
            plan.dropped.push(index);
            continue;
        };

        let (from, image_key) = image_at(index)
            .or_else(|| (0..index).rev().find_map(image_at))
            .or_else(|| (index + 1..segment_count).find_map(image_at))
            .ok_or_else(|| WorkerError::job_failed("no images were generated"))?;

        plan.segments.push(PlannedSegment {
            index,
            audio_key: audio_key.to_string(),
            image_key: image_key.to_string(),
            image_from: (from != index).then_some(from),
            clip_key: videos.key_for(index).map(str::to_string),
        });
    }

    if plan.is_empty() {
        return Err(WorkerError::job_failed("no segment has narration audio"));
    }

    Ok(plan)
}
