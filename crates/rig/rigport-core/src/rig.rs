//! Rig construction and runtime pose state.
//!
//! `Rig::build` consumes the immutable descriptor tree and produces an arena
//! of bones (parent-before-child order, name-interned). Bones are first laid
//! out exactly where the import data puts them; tails are then moved to a more
//! intuitive position depending on the rigging mode, and the correction between
//! the two orientations is kept as `nice_transform` so export can undo it.
//!
//! Pose state lives here too: per-bone local pose deltas (`matrix_basis`),
//! baked keyframe tracks, and an explicit `evaluate_frame` that recomputes the
//! armature-space pose matrices top-down. There is no implicit global
//! recalculation; callers evaluate frames deliberately.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use log::{debug, info};
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::cframe::{basis_to_authoring, transform_point, translation_of};
use crate::descriptor::{BoneDescriptor, RigMetadata};
use crate::error::RigError;

/// Fixed tail offset for bones whose tail is not repositioned by a heuristic.
pub const DEFAULT_TAIL_LENGTH: f32 = 0.25;
/// Tail offset for the hierarchy root.
pub const ROOT_TAIL_LENGTH: f32 = 0.01;
/// Heuristic results shorter than this revert to the fixed-offset tail.
pub const MIN_TAIL_LENGTH: f32 = 0.01;

/// Bone-extension heuristic selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiggingMode {
    /// Keep the fixed-offset tail everywhere.
    Raw,
    /// Extend along the best-aligned local axis toward a single child.
    LocalAxisExtend,
    /// Extend along the local Y axis toward a single child.
    LocalYAxisExtend,
    /// Tail snaps onto a single child's joint position.
    Connect,
}

/// Inverse-kinematics constraint data attached to a chain's tail bone.
/// The solve itself belongs to the host authoring tool; this is configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IkConstraint {
    pub target: String,
    pub pole_target: Option<String>,
    /// Radians. Fixed at -90 degrees on creation.
    pub pole_angle: f32,
    pub chain_count: u32,
}

/// Rigid child-of link between an external object and a bone. The offset is
/// frozen at link time; the object follows the bone with no animation of its
/// own.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub object: String,
    /// Object's link-time world matrix expressed relative to the bone's pose.
    pub offset: Matrix4<f32>,
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,

    /// Rest head/tail in armature (authoring) space, post-heuristic.
    pub head: Vector3<f32>,
    pub tail: Vector3<f32>,
    /// Rest matrix in armature space, post-heuristic.
    pub matrix_local: Matrix4<f32>,

    /// Original base transform straight from the import data (source space).
    /// Permanent serialization baseline, independent of later edits.
    pub transform: Matrix4<f32>,
    pub transform0: Matrix4<f32>,
    pub transform1: Matrix4<f32>,
    /// Correction from the mathematically neutral rest matrix to the
    /// visually adjusted one; undone on every export.
    pub nice_transform: Matrix4<f32>,

    pub transformable: bool,
    pub hide_select: bool,
    /// Synthesized by the IK augmenter; never serialized, dropped on rebuild.
    pub helper: bool,

    /// Attachment names from the descriptor (nulls already skipped).
    pub aux: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub constraints: Vec<IkConstraint>,

    /// Local pose delta relative to the rest matrix.
    pub matrix_basis: Matrix4<f32>,
    /// Evaluated pose matrix in armature space (valid after `evaluate_frame`
    /// or `recompute_pose`).
    pub matrix_pose: Matrix4<f32>,
    /// Baked pose keys; sampling holds the most recent key at or before the
    /// requested frame.
    pub track: BTreeMap<i32, Matrix4<f32>>,
}

/// The bone hierarchy plus its evaluation state. Rebuilding constructs a fresh
/// value; the previous rig (helper bones, constraints, tracks included) is
/// dropped whole.
#[derive(Clone, Debug)]
pub struct Rig {
    pub name: String,
    pub mode: RiggingMode,
    bones: Vec<Bone>,
    by_name: HashMap<String, usize>,

    /// Armature object's own transform (world space).
    pub object_matrix: Matrix4<f32>,
    /// Object-level animation keys, same hold semantics as bone tracks.
    pub object_track: BTreeMap<i32, Matrix4<f32>>,
}

/// Invert a rig matrix. Rest and pose matrices are affine and invertible for
/// any well-formed rig; a singular matrix would have been rejected at build.
pub(crate) fn invert(m: &Matrix4<f32>) -> Matrix4<f32> {
    m.try_inverse().unwrap_or_else(Matrix4::identity)
}

/// Roll hint an edit bone gets when none is supplied: carry +Z through the
/// minimal rotation that maps +Y onto the bone axis.
fn default_roll_hint(y: &Vector3<f32>) -> Vector3<f32> {
    UnitQuaternion::rotation_between(&Vector3::y(), y)
        .map(|q| q * Vector3::z())
        .unwrap_or_else(Vector3::z)
}

/// Edit-bone matrix from head, tail, and a roll hint: local +Y runs head to
/// tail, local +Z is the hint projected onto the plane perpendicular to the
/// bone axis, +X completes the right-handed frame.
pub fn bone_matrix(
    head: &Vector3<f32>,
    tail: &Vector3<f32>,
    roll_hint: Option<&Vector3<f32>>,
) -> Matrix4<f32> {
    let axis = tail - head;
    let y = if axis.norm() > 1e-9 {
        axis.normalize()
    } else {
        Vector3::y()
    };
    let hint = roll_hint.copied().unwrap_or_else(|| default_roll_hint(&y));
    let mut z = hint - y * hint.dot(&y);
    if z.norm() < 1e-6 {
        z = default_roll_hint(&y);
        z -= y * z.dot(&y);
    }
    let z = z.normalize();
    let x = y.cross(&z);
    Matrix4::new(
        x.x, y.x, z.x, head.x, //
        x.y, y.y, z.y, head.y, //
        x.z, y.z, z.z, head.z, //
        0.0, 0.0, 0.0, 1.0,
    )
}

impl Rig {
    /// Build a rig from import metadata. Validation failures surface before
    /// any bone exists.
    pub fn build(meta: &RigMetadata, mode: RiggingMode) -> Result<Rig, RigError> {
        meta.rig.validate()?;
        let mut rig = Rig {
            name: meta.rig_name.clone(),
            mode,
            bones: Vec::with_capacity(meta.rig.node_count()),
            by_name: HashMap::new(),
            object_matrix: Matrix4::identity(),
            object_track: BTreeMap::new(),
        };
        rig.load_bone(&meta.rig, mode, None)?;
        rig.recompute_pose();
        info!(
            "rig '{}' built: {} bones ({:?})",
            rig.name,
            rig.bones.len(),
            mode
        );
        Ok(rig)
    }

    fn load_bone(
        &mut self,
        def: &BoneDescriptor,
        mode: RiggingMode,
        parent: Option<usize>,
    ) -> Result<(), RigError> {
        let singular = || RigError::MalformedDescriptor {
            bone: def.jname.clone(),
        };

        let mat = def.transform.to_matrix();
        // Roll hint: the base transform's +Z, expressed in authoring space.
        let bone_dir = (basis_to_authoring() * mat)
            .fixed_view::<3, 3>(0, 0)
            .into_owned()
            * Vector3::z();

        let (head, tail, o_trans, transform0, transform1, transformable, hide_select);
        match (&def.jointtransform0, &def.jointtransform1) {
            (None, None) => {
                // Hierarchy root: pinned at the base transform, nominal tail.
                o_trans = basis_to_authoring() * mat;
                head = translation_of(&o_trans);
                tail = transform_point(&o_trans, &Vector3::new(0.0, ROOT_TAIL_LENGTH, 0.0));
                transform0 = Matrix4::identity();
                transform1 = Matrix4::identity();
                transformable = false;
                hide_select = true;
            }
            (Some(jt0), Some(jt1)) => {
                let mat1 = jt1.to_matrix();
                o_trans = basis_to_authoring() * (mat * mat1);
                head = translation_of(&o_trans);
                let real_tail =
                    transform_point(&o_trans, &Vector3::new(0.0, DEFAULT_TAIL_LENGTH, 0.0));
                let neutral_pos = translation_of(&(basis_to_authoring() * mat));
                tail = self.pick_tail(def, mode, &head, &real_tail, &neutral_pos, &bone_dir);
                transform0 = jt0.to_matrix();
                transform1 = mat1;
                transformable = true;
                hide_select = false;
            }
            // validate() rejects half-specified joints before we get here
            _ => return Err(singular()),
        }

        let matrix_local = bone_matrix(&head, &tail, Some(&bone_dir));
        let nice_transform = o_trans.try_inverse().ok_or_else(singular)? * matrix_local;
        debug!(
            "bone '{}' head=({:.3},{:.3},{:.3}) len={:.3}",
            def.jname,
            head.x,
            head.y,
            head.z,
            (tail - head).norm()
        );

        let index = self.bones.len();
        self.bones.push(Bone {
            name: def.jname.clone(),
            parent,
            children: Vec::new(),
            head,
            tail,
            matrix_local,
            transform: mat,
            transform0,
            transform1,
            nice_transform,
            transformable,
            hide_select,
            helper: false,
            aux: def.aux.iter().flatten().cloned().collect(),
            attachments: Vec::new(),
            constraints: Vec::new(),
            matrix_basis: Matrix4::identity(),
            matrix_pose: matrix_local,
            track: BTreeMap::new(),
        });
        self.by_name.insert(def.jname.clone(), index);
        if let Some(p) = parent {
            self.bones[p].children.push(index);
        }

        for child in &def.children {
            self.load_bone(child, mode, Some(index))?;
        }
        Ok(())
    }

    /// Tail heuristic for a non-root bone (mode-dependent, with the degenerate
    /// guard). `real_tail` is the fixed-offset tail, the safe default.
    fn pick_tail(
        &self,
        def: &BoneDescriptor,
        mode: RiggingMode,
        head: &Vector3<f32>,
        real_tail: &Vector3<f32>,
        neutral_pos: &Vector3<f32>,
        bone_dir: &Vector3<f32>,
    ) -> Vector3<f32> {
        if mode == RiggingMode::Raw {
            return *real_tail;
        }

        let mut tail = if def.children.len() == 1 {
            let child = &def.children[0];
            let next_mat = child.transform.to_matrix();
            let next_mat1 = child
                .jointtransform1
                .map(|cf| cf.to_matrix())
                .unwrap_or_else(Matrix4::identity);
            let next_joint_pos = translation_of(&(basis_to_authoring() * (next_mat * next_mat1)));

            match mode {
                RiggingMode::Connect => next_joint_pos,
                _ => {
                    let pre_mat = bone_matrix(head, real_tail, Some(bone_dir));
                    let dir = match mode {
                        RiggingMode::LocalAxisExtend => {
                            best_aligned_axis(&pre_mat, &next_joint_pos)
                        }
                        _ => pre_mat.fixed_view::<3, 1>(0, 1).into_owned(),
                    };
                    let proj = dir.dot(&(next_joint_pos - head));
                    head + dir * proj
                }
            }
        } else {
            // Multiple children (or none): reflect away from the neutral
            // position. A crude visual fallback, kept as-is.
            head - (head - neutral_pos) * 2.0
        };

        if (tail - head).norm() < MIN_TAIL_LENGTH {
            // No usable heuristic for degenerate geometry; keep the safe tail.
            tail = *real_tail;
        }
        tail
    }

    // ---- lookup ----

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn index_of(&self, name: &str) -> Result<usize, RigError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RigError::UnknownBone { name: name.into() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn bone(&self, name: &str) -> Result<&Bone, RigError> {
        self.index_of(name).map(|i| &self.bones[i])
    }

    pub fn bone_mut(&mut self, name: &str) -> Result<&mut Bone, RigError> {
        let i = self.index_of(name)?;
        Ok(&mut self.bones[i])
    }

    pub fn bone_at(&self, index: usize) -> &Bone {
        &self.bones[index]
    }

    /// Indices of hierarchy roots (descriptor roots, not IK helpers).
    pub fn root_indices(&self) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none() && !b.helper)
            .map(|(i, _)| i)
            .collect()
    }

    /// Ancestor indices of a bone, nearest first.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = self.bones[index].parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.bones[p].parent;
        }
        out
    }

    // ---- attachments ----

    /// Rigidly link an external object to a bone, freezing the object's
    /// current world placement relative to the bone's evaluated pose. Replaces
    /// any previous link for the same object.
    pub fn link_attachment(
        &mut self,
        bone: &str,
        object: &str,
        object_world: &Matrix4<f32>,
    ) -> Result<(), RigError> {
        let object_matrix = self.object_matrix;
        let b = self.bone_mut(bone)?;
        let offset = invert(&(object_matrix * b.matrix_pose)) * object_world;
        b.attachments.retain(|a| a.object != object);
        b.attachments.push(Attachment {
            object: object.into(),
            offset,
        });
        Ok(())
    }

    /// Current world matrix an attached object should follow. Returns the
    /// link-time placement while the bone holds the pose it was linked in.
    pub fn attachment_world(&self, bone: &str, object: &str) -> Result<Matrix4<f32>, RigError> {
        let b = self.bone(bone)?;
        let att = b
            .attachments
            .iter()
            .find(|a| a.object == object)
            .ok_or_else(|| RigError::UnknownBone {
                name: object.into(),
            })?;
        Ok(self.object_matrix * b.matrix_pose * att.offset)
    }

    // ---- helper bones (IK augmenter) ----

    pub(crate) fn add_helper_bone(&mut self, name: &str, head: Vector3<f32>, tail: Vector3<f32>) {
        let matrix_local = bone_matrix(&head, &tail, None);
        let index = self.bones.len();
        self.bones.push(Bone {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            head,
            tail,
            matrix_local,
            transform: Matrix4::identity(),
            transform0: Matrix4::identity(),
            transform1: Matrix4::identity(),
            nice_transform: Matrix4::identity(),
            transformable: false,
            hide_select: false,
            helper: true,
            aux: Vec::new(),
            attachments: Vec::new(),
            constraints: Vec::new(),
            matrix_basis: Matrix4::identity(),
            matrix_pose: matrix_local,
            track: BTreeMap::new(),
        });
        self.by_name.insert(name.into(), index);
    }

    /// Drop the named bones and remap all indices. Bones not listed keep their
    /// relative order, so the parent-before-child invariant survives.
    pub(crate) fn remove_bones(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let drop: Vec<usize> = names
            .iter()
            .filter_map(|n| self.by_name.get(n.as_str()).copied())
            .collect();
        let mut remap: Vec<Option<usize>> = vec![None; self.bones.len()];
        let mut kept: Vec<Bone> = Vec::with_capacity(self.bones.len() - drop.len());
        for (i, bone) in self.bones.drain(..).enumerate() {
            if drop.contains(&i) {
                continue;
            }
            remap[i] = Some(kept.len());
            kept.push(bone);
        }
        for bone in &mut kept {
            bone.parent = bone.parent.and_then(|p| remap[p]);
            bone.children = bone
                .children
                .iter()
                .filter_map(|&c| remap[c])
                .collect();
        }
        self.bones = kept;
        self.by_name.clear();
        for (i, bone) in self.bones.iter().enumerate() {
            self.by_name.insert(bone.name.clone(), i);
        }
    }

    // ---- pose state ----

    /// True if any bone track or the object track carries keys.
    pub fn has_animation(&self) -> bool {
        !self.object_track.is_empty() || self.bones.iter().any(|b| !b.track.is_empty())
    }

    /// Remove all pose keys and reset every basis to identity.
    pub fn clear_pose_tracks(&mut self) {
        for bone in &mut self.bones {
            bone.track.clear();
            bone.matrix_basis = Matrix4::identity();
        }
        self.recompute_pose();
    }

    /// Insert a pose key and make it the bone's current basis.
    pub fn set_basis_key(&mut self, index: usize, frame: i32, basis: Matrix4<f32>) {
        let bone = &mut self.bones[index];
        bone.track.insert(frame, basis);
        bone.matrix_basis = basis;
    }

    pub(crate) fn set_basis(&mut self, index: usize, basis: Matrix4<f32>) {
        self.bones[index].matrix_basis = basis;
    }

    /// Object world matrix at a frame: last object key at or before it, else
    /// the static object matrix.
    pub fn object_world_at(&self, frame: i32) -> Matrix4<f32> {
        self.object_track
            .range(..=frame)
            .next_back()
            .map(|(_, m)| *m)
            .unwrap_or(self.object_matrix)
    }

    /// Evaluate the whole rig at a frame: sample every track (hold-previous)
    /// into the basis, then recompute pose matrices. This is the explicit
    /// "recompute pose" step between frame-loop iterations.
    pub fn evaluate_frame(&mut self, frame: i32) {
        for bone in &mut self.bones {
            bone.matrix_basis = bone
                .track
                .range(..=frame)
                .next_back()
                .map(|(_, m)| *m)
                .unwrap_or_else(Matrix4::identity);
        }
        self.recompute_pose();
    }

    /// Recompute armature-space pose matrices top-down from the current basis
    /// values. Relies on parents preceding children in the arena.
    pub fn recompute_pose(&mut self) {
        for i in 0..self.bones.len() {
            self.refresh_pose_of(i);
        }
    }

    /// Recompute a single bone's pose matrix from its parent's current pose.
    pub(crate) fn refresh_pose_of(&mut self, index: usize) {
        let pose = match self.bones[index].parent {
            Some(p) => {
                let parent = &self.bones[p];
                parent.matrix_pose
                    * invert(&parent.matrix_local)
                    * self.bones[index].matrix_local
                    * self.bones[index].matrix_basis
            }
            None => self.bones[index].matrix_local * self.bones[index].matrix_basis,
        };
        self.bones[index].matrix_pose = pose;
    }
}

fn best_aligned_axis(pre_mat: &Matrix4<f32>, target: &Vector3<f32>) -> Vector3<f32> {
    // Target position in bone-local coordinates; Y wins ties.
    let local = transform_point(&invert(pre_mat), target);
    let mut best = 1usize;
    let mut best_dist = local.y.abs();
    for axis in [0usize, 2usize] {
        let dist = local[axis].abs();
        if dist > best_dist {
            best_dist = dist;
            best = axis;
        }
    }
    pre_mat.fixed_view::<3, 1>(0, best).into_owned()
}
