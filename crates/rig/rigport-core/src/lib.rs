//! rigport-core (engine-agnostic)
//!
//! Content pipeline converting a skeletal rig and its pose-space animation
//! between an external Y-up platform format (compact 12-float affine
//! transforms) and a Z-up armature representation: coordinate/basis
//! conversion, rig construction from serialized bone metadata, per-frame pose
//! serialization back to the wire format, IK helper-bone synthesis, and
//! cross-armature keyframe retargeting by bone name.
//!
//! The host authoring tool's scene graph, UI, and file import stay outside;
//! this crate owns the transform math and the wire codecs.

pub mod cframe;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod ik;
pub mod pose;
pub mod retarget;
pub mod rig;
pub mod timeline;

// Re-exports for consumers (adapters)
pub use cframe::{basis_to_authoring, basis_to_source, to_authoring, to_source, CFrame};
pub use codec::{autoname_parts, decode_export, decode_import_meta, encode_export};
pub use descriptor::{BoneDescriptor, RigMetadata};
pub use error::RigError;
pub use ik::{auto_chain_count, create_ik, remove_ik};
pub use pose::{serialize_animation, serialize_frame, AnimationPayload, PoseFrame, SerializeOptions};
pub use retarget::{apply_object_transform, copy_pose, key_range, mapping_error_bones};
pub use rig::{bone_matrix, Attachment, Bone, IkConstraint, Rig, RiggingMode};
pub use timeline::Timeline;

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, RigError>;
