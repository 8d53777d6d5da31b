//! Explicit frame-range/fps context.
//!
//! The host authoring tool keeps the active frame range, sample stride, and
//! current frame in global scene state; here they are an explicit value passed
//! into every multi-frame operation. Operations that walk the range evaluate
//! the rig frame by frame and restore the pose at `current_frame` on
//! completion.

use serde::{Deserialize, Serialize};

use crate::error::RigError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub frame_start: i32,
    /// Inclusive.
    pub frame_end: i32,
    /// Sample stride for export baking; 1 samples every frame.
    pub frame_step: u32,
    pub fps: f32,
    /// Frame the rig pose is restored to after a multi-frame loop.
    pub current_frame: i32,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            frame_start: 0,
            frame_end: 0,
            frame_step: 1,
            fps: 30.0,
            current_frame: 0,
        }
    }
}

impl Timeline {
    pub fn new(frame_start: i32, frame_end: i32, fps: f32) -> Self {
        Self {
            frame_start,
            frame_end,
            fps,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), RigError> {
        if self.frame_end < self.frame_start {
            return Err(RigError::InvalidTimeline {
                reason: format!(
                    "frame_end {} precedes frame_start {}",
                    self.frame_end, self.frame_start
                ),
            });
        }
        if self.frame_step == 0 {
            return Err(RigError::InvalidTimeline {
                reason: "frame_step must be >= 1".into(),
            });
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(RigError::InvalidTimeline {
                reason: format!("fps must be positive and finite, got {}", self.fps),
            });
        }
        Ok(())
    }

    /// Inclusive frame numbers honoring the sample stride.
    pub fn frames(&self) -> impl Iterator<Item = i32> {
        (self.frame_start..=self.frame_end).step_by(self.frame_step.max(1) as usize)
    }

    /// Inclusive frame numbers at stride 1, regardless of `frame_step`.
    pub fn frames_dense(&self) -> impl Iterator<Item = i32> {
        self.frame_start..=self.frame_end
    }

    /// Timestamp of a frame in seconds, relative to the range start.
    pub fn frame_time(&self, frame: i32) -> f32 {
        (frame - self.frame_start) as f32 / self.fps
    }

    /// Total frame count of the range (stride-independent, matches duration).
    pub fn frame_count(&self) -> i64 {
        self.frame_end as i64 + 1 - self.frame_start as i64
    }

    /// Clip duration in seconds: `(frame_count - 1) / fps`.
    pub fn duration(&self) -> f32 {
        (self.frame_count() - 1) as f32 / self.fps
    }
}
