//! Import metadata schema: the hierarchical bone description tree delivered by
//! the model-import collaborator, plus its validation rules.
//!
//! Field names mirror the wire format exactly (`jname`, `jointtransform0`,
//! `jointtransform1`, `aux`); see codec.rs for how the JSON reaches us.

use serde::{Deserialize, Serialize};

use crate::cframe::CFrame;
use crate::error::RigError;

/// Top-level import metadata: `{rigName, parts, rig}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RigMetadata {
    #[serde(rename = "rigName")]
    pub rig_name: String,
    /// Imported part names in mesh-import order; used only for autonaming.
    #[serde(default)]
    pub parts: Vec<String>,
    pub rig: BoneDescriptor,
}

/// One node of the bone description tree.
///
/// The hierarchy root is the only node without joint transforms; every other
/// node carries both. `transform` is the bone's base pose in source space.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoneDescriptor {
    pub jname: String,
    pub transform: CFrame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jointtransform0: Option<CFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jointtransform1: Option<CFrame>,
    #[serde(default)]
    pub children: Vec<BoneDescriptor>,
    /// Names of external objects to attach rigidly to this bone. The wire
    /// format may carry nulls here; they are skipped.
    #[serde(default)]
    pub aux: Vec<Option<String>>,
}

impl BoneDescriptor {
    /// True for the hierarchy root (no joint transforms).
    pub fn is_root(&self) -> bool {
        self.jointtransform0.is_none() && self.jointtransform1.is_none()
    }

    /// Validate the tree invariant: the root has no joint transforms, every
    /// descendant has both. Fatal input-validation failure, checked before any
    /// rig state is created.
    pub fn validate(&self) -> Result<(), RigError> {
        if self.jointtransform0.is_some() != self.jointtransform1.is_some() {
            return Err(RigError::MalformedDescriptor {
                bone: self.jname.clone(),
            });
        }
        for child in &self.children {
            child.validate_non_root()?;
        }
        Ok(())
    }

    fn validate_non_root(&self) -> Result<(), RigError> {
        if self.jointtransform0.is_none() || self.jointtransform1.is_none() {
            return Err(RigError::MalformedDescriptor {
                bone: self.jname.clone(),
            });
        }
        for child in &self.children {
            child.validate_non_root()?;
        }
        Ok(())
    }

    /// Number of nodes in this subtree, root included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}
