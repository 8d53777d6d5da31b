//! Error types for the rig conversion pipeline.

use serde::{Deserialize, Serialize};

/// Error type covering the whole pipeline: descriptor validation, metadata
/// decoding, retarget mapping, and export envelope failures.
///
/// Input-validation failures abort an operation before it mutates any rig or
/// frame state. Geometric degeneracy (near-zero bone length) is not an error;
/// the rig builder self-heals by reverting to the fixed-offset tail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RigError {
    /// Non-root descriptor node missing one or both joint transforms
    #[error("Malformed bone descriptor '{bone}': non-root bones require both joint transforms")]
    MalformedDescriptor { bone: String },

    /// Bone lookup by name failed
    #[error("Unknown bone: {name}")]
    UnknownBone { name: String },

    /// Retarget mapping failed; no pose data was modified
    #[error("Cannot map rig, the following bones are missing from the source rig: {}", missing.join(", "))]
    BoneMappingMismatch { missing: Vec<String> },

    /// IK chain cannot be formed over the requested bone run
    #[error("Invalid IK chain at '{bone}': {reason}")]
    InvalidChain { bone: String, reason: String },

    /// Rig carries no keyframed animation at all
    #[error("Armature contains no animation data")]
    NoAnimationData,

    /// Frame range yields no keyframes
    #[error("Armature contains no keyframes")]
    NoKeyframes,

    /// Carrier metadata chunk sequence has a hole
    #[error("Import metadata is incomplete: carrier chunk {index} is missing")]
    MissingMetaChunk { index: usize },

    /// No carrier objects matched the metadata naming pattern
    #[error("No import metadata carriers found")]
    MetaPattern,

    /// Carrier metadata failed to decode (base32/UTF-8)
    #[error("Import metadata decode failed: {reason}")]
    MetaDecode { reason: String },

    /// Frame range / fps configuration is unusable
    #[error("Invalid timeline: {reason}")]
    InvalidTimeline { reason: String },

    /// JSON (de)serialization error
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Deflate compression/decompression error
    #[error("Compression error: {reason}")]
    Compression { reason: String },

    /// IO error
    #[error("IO error: {reason}")]
    Io { reason: String },
}

impl From<serde_json::Error> for RigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for RigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_mismatch_lists_names() {
        let err = RigError::BoneMappingMismatch {
            missing: vec!["Left Arm".into(), "Head".into()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot map rig, the following bones are missing from the source rig: Left Arm, Head"
        );
    }

    #[test]
    fn serializable() {
        let err = RigError::MissingMetaChunk { index: 3 };
        let json = serde_json::to_string(&err).unwrap();
        let back: RigError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
