//! Pose serialization back to the source platform's keyframe format.
//!
//! Every transformable bone's current pose is compared against its original
//! import-time rest data, expressed as a delta in source space, and emitted
//! only when it differs from identity. An omitted bone means "no change from
//! rest" and consumers treat that as an explicit default.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::cframe::{basis_to_source, CFrame};
use crate::error::RigError;
use crate::rig::{invert, Rig};
use crate::timeline::Timeline;

/// Components within this distance of an integer are snapped before the
/// identity check; keeps float inverse noise out of the export.
const SNAP_EPS: f32 = 1e-5;

/// Output shaping knobs. Rounding is lossy and off by default; it exists only
/// to shrink the exported payload.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SerializeOptions {
    pub round: bool,
    pub round_decimals: u32,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            round: false,
            round_decimals: 4,
        }
    }
}

/// One sampled frame: timestamp plus the sparse bone-delta mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    #[serde(rename = "t")]
    pub time: f32,
    #[serde(rename = "kf")]
    pub deltas: BTreeMap<String, CFrame>,
}

/// Full export payload: `{"t": duration, "kfs": [...]}`, frames ordered by
/// time with the first at t=0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationPayload {
    #[serde(rename = "t")]
    pub duration: f32,
    pub kfs: Vec<PoseFrame>,
}

/// Serialize the rig's current evaluated pose. Only transformable bones are
/// considered; their delta is the local transform relative to their own rest
/// pose, in source space.
pub fn serialize_frame(rig: &Rig, opts: &SerializeOptions) -> BTreeMap<String, CFrame> {
    let back_trans = basis_to_source();
    let mut state = BTreeMap::new();

    for bone in rig.bones() {
        if !bone.transformable {
            continue;
        }
        // Transformable bones always have a parent (the root is not one).
        let parent = match bone.parent {
            Some(p) => rig.bone_at(p),
            None => continue,
        };

        // Original matrices straight from the import data; the permanent
        // baseline regardless of later edits.
        let orig_base = back_trans * (bone.transform * bone.transform1);
        let parent_orig_base = back_trans * (parent.transform * parent.transform1);

        // Undo the "nice" orientation correction to recover the true pose.
        let cur_obj = back_trans * (bone.matrix_pose * invert(&bone.nice_transform));
        let parent_obj = back_trans * (parent.matrix_pose * invert(&parent.nice_transform));

        let orig_local = invert(&parent_orig_base) * orig_base;
        let cur_local = invert(&parent_obj) * cur_obj;
        let delta = invert(&orig_local) * cur_local;

        let mut cf = CFrame::from_matrix(&delta);
        if opts.round {
            cf = cf.rounded(opts.round_decimals);
        }
        cf = cf.snapped(SNAP_EPS);

        if cf != CFrame::IDENTITY {
            state.insert(bone.name.clone(), cf);
        }
    }
    state
}

/// Walk the timeline (honoring the sample stride), evaluate each frame, and
/// collect the per-frame deltas. The rig is restored to the timeline's current
/// frame before returning.
pub fn serialize_animation(
    rig: &mut Rig,
    timeline: &Timeline,
    opts: &SerializeOptions,
) -> Result<AnimationPayload, RigError> {
    timeline.validate()?;

    let mut kfs = Vec::new();
    for frame in timeline.frames() {
        rig.evaluate_frame(frame);
        kfs.push(PoseFrame {
            time: timeline.frame_time(frame),
            deltas: serialize_frame(rig, opts),
        });
    }
    rig.evaluate_frame(timeline.current_frame);

    let payload = AnimationPayload {
        duration: timeline.duration(),
        kfs,
    };
    info!(
        "serialized animation: {} keyframes, {:.2} seconds",
        payload.kfs.len(),
        payload.duration
    );
    Ok(payload)
}
