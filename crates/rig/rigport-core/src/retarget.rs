//! Cross-armature keyframe retargeting by bone name, and folding an
//! armature's object-level transform into its root bones' pose keys.

use log::info;
use nalgebra::Matrix4;

use crate::error::RigError;
use crate::rig::{invert, Rig};
use crate::timeline::Timeline;

/// Names present in the target rig but absent from the source. Non-empty means
/// retargeting cannot proceed.
pub fn mapping_error_bones(target: &Rig, source: &Rig) -> Vec<String> {
    target
        .bones()
        .iter()
        .filter(|b| !source.contains(&b.name))
        .map(|b| b.name.clone())
        .collect()
}

/// Frame boundaries of a rig's pose keys (bone tracks plus the object track),
/// earliest and latest. Callers derive the retarget frame range from the
/// source's boundaries.
pub fn key_range(rig: &Rig) -> Result<(i32, i32), RigError> {
    let keys = rig
        .bones()
        .iter()
        .flat_map(|b| b.track.keys().copied())
        .chain(rig.object_track.keys().copied());
    let (mut lo, mut hi) = (i32::MAX, i32::MIN);
    for key in keys {
        lo = lo.min(key);
        hi = hi.max(key);
    }
    if lo > hi {
        return Err(RigError::NoKeyframes);
    }
    Ok((lo, hi))
}

/// Copy the source armature's per-frame pose onto the target rig, matching
/// bones by name, recursively from each hierarchy root.
///
/// The root bone's own transform is intentionally left unkeyed so that
/// object-level placement (see [`apply_object_transform`]) is not applied
/// twice. Fails closed: a mapping mismatch reports every missing name and
/// leaves the target's pose untouched, as does a source without animation.
pub fn copy_pose(target: &mut Rig, source: &mut Rig, timeline: &Timeline) -> Result<(), RigError> {
    timeline.validate()?;
    let missing = mapping_error_bones(target, source);
    if !missing.is_empty() {
        return Err(RigError::BoneMappingMismatch { missing });
    }
    if !source.has_animation() {
        return Err(RigError::NoAnimationData);
    }

    target.clear_pose_tracks();
    let roots = target.root_indices();

    for frame in timeline.frames_dense() {
        source.evaluate_frame(frame);
        target.evaluate_frame(frame);
        for &root in &roots {
            copy_pose_bone(target, source, root, frame)?;
        }
    }

    source.evaluate_frame(timeline.current_frame);
    target.evaluate_frame(timeline.current_frame);
    info!(
        "retargeted {} frames from '{}' onto '{}'",
        timeline.frame_count(),
        source.name,
        target.name
    );
    Ok(())
}

fn copy_pose_bone(
    target: &mut Rig,
    source: &Rig,
    index: usize,
    frame: i32,
) -> Result<(), RigError> {
    let name = target.bone_at(index).name.clone();
    let t_mat = source.bone(&name)?.matrix_pose;

    // The root transform is skipped; it is carried to children through the
    // parent-relative math below (keeps the root static).
    if let Some(parent) = target.bone_at(index).parent {
        let r_mat = target.bone_at(index).matrix_local;
        let p_mat = target.bone_at(parent).matrix_pose;
        let p_r_mat = target.bone_at(parent).matrix_local;
        let basis = invert(&(invert(&p_r_mat) * r_mat)) * (invert(&p_mat) * t_mat);
        target.set_basis_key(index, frame, basis);
        // Children read this bone's pose, so refresh before descending.
        target.refresh_pose_of(index);
    }

    let children = target.bone_at(index).children.clone();
    for child in children {
        copy_pose_bone(target, source, child, frame)?;
    }
    Ok(())
}

/// Bake the armature object's world transform into each root bone's pose keys
/// across the full frame range, then reset the object transform to identity
/// and strip the object-level animation track.
///
/// Pose matrices are collected for the whole range first; keys are written in
/// a second pass so later frames never interpolate against keys set earlier in
/// the same loop.
pub fn apply_object_transform(rig: &mut Rig, timeline: &Timeline) -> Result<(), RigError> {
    timeline.validate()?;
    if !rig.has_animation() {
        return Err(RigError::NoAnimationData);
    }

    for root in rig.root_indices() {
        let mut collected: Vec<(i32, Matrix4<f32>)> = Vec::new();
        for frame in timeline.frames_dense() {
            rig.evaluate_frame(frame);
            collected.push((frame, rig.bone_at(root).matrix_pose));
        }
        for (frame, pose) in collected {
            rig.evaluate_frame(frame);
            let desired = rig.object_world_at(frame) * pose;
            // Roots have no parent: pose = matrix_local * basis.
            let basis = invert(&rig.bone_at(root).matrix_local) * desired;
            rig.set_basis_key(root, frame, basis);
            rig.refresh_pose_of(root);
        }
    }

    rig.object_track.clear();
    rig.object_matrix = Matrix4::identity();
    rig.evaluate_frame(timeline.current_frame);
    Ok(())
}
