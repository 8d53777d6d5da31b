//! IK rig augmentation: synthesizes target/pole helper bones and the
//! constraint record over a bone run, and removes them as a unit.
//!
//! The constraint itself is configuration for the host authoring tool's
//! solver; nothing here evaluates IK.

use std::f32::consts::PI;

use log::debug;
use nalgebra::Vector3;

use crate::cframe::{rotation_of, transform_point, translation_of};
use crate::error::RigError;
use crate::rig::{IkConstraint, Rig};

/// Helper-bone extension along the tail bone's local -Z.
const TARGET_EXTENT: f32 = 0.5;
/// Pole offset factor relative to the chain span, and the pole bone length.
const POLE_OFFSET_FACTOR: f32 = 0.25;
const POLE_LENGTH: f32 = 0.3;

/// Default chain length: the starting bone plus every ancestor reached while
/// the chain stays unbranched (each parent has exactly one child).
pub fn auto_chain_count(rig: &Rig, tail_bone: &str) -> Result<u32, RigError> {
    let mut count = 1u32;
    let mut itr = rig.index_of(tail_bone)?;
    while let Some(parent) = rig.bone_at(itr).parent {
        if rig.bone_at(parent).children.len() != 1 {
            break;
        }
        count += 1;
        itr = parent;
    }
    Ok(count)
}

/// Create the IK configuration for the chain ending at `tail_bone`.
///
/// Helpers are placed against the rig's current evaluated pose: the target
/// bone sits at the tail bone's posed tail, extended along its posed -Z.
/// With `with_pole`, a second helper is placed off the basal bone (the
/// `chain_count`-th ancestor run's last bone) along its rest-local -Z, at a
/// distance derived from the posed span between the chain's ends. The
/// constraint is attached to `tail_bone` with a fixed pole angle of -90
/// degrees.
///
/// `lock_tail` is accepted but not implemented; it is ignored.
pub fn create_ik(
    rig: &mut Rig,
    tail_bone: &str,
    chain_count: Option<u32>,
    with_pole: bool,
    lock_tail: bool,
) -> Result<(), RigError> {
    let _ = lock_tail; // not implemented
    let index = rig.index_of(tail_bone)?;
    let chain_count = match chain_count {
        Some(n) if n >= 1 => n,
        Some(_) => {
            return Err(RigError::InvalidChain {
                bone: tail_bone.into(),
                reason: "chain count must be >= 1".into(),
            })
        }
        None => auto_chain_count(rig, tail_bone)?,
    };

    let target_name = format!("{tail_bone}-IKTarget");
    let pole_name = format!("{tail_bone}-IKPole");
    if rig.contains(&target_name) || (with_pole && rig.contains(&pole_name)) {
        return Err(RigError::InvalidChain {
            bone: tail_bone.into(),
            reason: "IK helpers already exist for this bone".into(),
        });
    }

    // Target helper: head at the posed chain tip, pointing down the bone's
    // posed -Z.
    let (head, tail) = {
        let bone = rig.bone_at(index);
        let head = posed_tail(rig, index);
        let dir = transform_point(
            &rotation_of(&bone.matrix_pose),
            &Vector3::new(0.0, 0.0, -TARGET_EXTENT),
        );
        (head, head + dir)
    };
    let pole = if with_pole {
        Some(pole_placement(rig, index, chain_count)?)
    } else {
        None
    };

    rig.add_helper_bone(&target_name, head, tail);
    if let Some((pole_head, pole_tail)) = pole {
        rig.add_helper_bone(&pole_name, pole_head, pole_tail);
    }

    let constraint = IkConstraint {
        target: target_name,
        pole_target: with_pole.then(|| pole_name.clone()),
        pole_angle: -PI * 0.5,
        chain_count,
    };
    debug!("IK on '{tail_bone}': chain {chain_count}, pole {with_pole}");
    rig.bone_mut(tail_bone)?.constraints.push(constraint);
    Ok(())
}

/// Posed position of a bone's tail: the rest bone length pushed through the
/// current pose matrix.
fn posed_tail(rig: &Rig, index: usize) -> Vector3<f32> {
    let bone = rig.bone_at(index);
    let length = (bone.tail - bone.head).norm();
    transform_point(&bone.matrix_pose, &Vector3::new(0.0, length, 0.0))
}

/// Head/tail for the pole helper, off the basal bone's rest-local -Z; the
/// offset distance comes from the posed chain span.
fn pole_placement(
    rig: &Rig,
    tail_index: usize,
    chain_count: u32,
) -> Result<(Vector3<f32>, Vector3<f32>), RigError> {
    let ancestors = rig.ancestors(tail_index);
    if ancestors.is_empty() || chain_count < 2 {
        return Err(RigError::InvalidChain {
            bone: rig.bone_at(tail_index).name.clone(),
            reason: "pole requires a chain of at least two bones".into(),
        });
    }
    // Basal bone: chain_count-1 parents up from the tail bone, clamped to the
    // root if the chain is shorter. The span runs from the chain tip to its
    // head.
    let basal = ancestors
        .get(chain_count as usize - 2)
        .or_else(|| ancestors.last())
        .copied()
        .unwrap_or(ancestors[0]);
    let pos_low = posed_tail(rig, tail_index);
    let pos_high = translation_of(&rig.bone_at(basal).matrix_pose);
    let dist = (pos_low - pos_high).norm();
    let basal_mat = rig.bone_at(basal).matrix_local;
    let head = transform_point(
        &basal_mat,
        &Vector3::new(0.0, 0.0, -dist * POLE_OFFSET_FACTOR),
    );
    let tail = transform_point(
        &basal_mat,
        &Vector3::new(0.0, 0.0, -dist * POLE_OFFSET_FACTOR - POLE_LENGTH),
    );
    Ok((head, tail))
}

/// Remove every IK constraint from `tail_bone` and delete exactly the helper
/// bones those constraints referenced. Unrelated constraints and bones are
/// untouched.
pub fn remove_ik(rig: &mut Rig, tail_bone: &str) -> Result<(), RigError> {
    let bone = rig.bone_mut(tail_bone)?;
    let mut to_clear: Vec<String> = Vec::new();
    for constraint in bone.constraints.drain(..) {
        to_clear.push(constraint.target);
        if let Some(pole) = constraint.pole_target {
            to_clear.push(pole);
        }
    }
    rig.remove_bones(&to_clear);
    Ok(())
}
