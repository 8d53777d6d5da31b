//! Coordinate conversion between the source platform's 12-component affine
//! encoding (Y-up) and homogeneous 4x4 matrices in authoring space (Z-up).
//!
//! The basis change is a fixed rotation taking forward-Z/up-Y to
//! forward-(-Y)/up-Z. It is left-multiplied onto source-space matrices on the
//! way in, and its inverse is left-multiplied on the way back. Every space
//! transition applies the conversion exactly once.

use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Compact affine transform as used on the wire:
/// `[tx, ty, tz, r00, r01, r02, r10, r11, r12, r20, r21, r22]`
/// (translation followed by a row-major 3x3 rotation/scale block).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CFrame(pub [f32; 12]);

impl CFrame {
    pub const IDENTITY: CFrame = CFrame([0., 0., 0., 1., 0., 0., 0., 1., 0., 0., 0., 1.]);

    /// Expand to a homogeneous matrix (still in source space).
    pub fn to_matrix(&self) -> Matrix4<f32> {
        let c = &self.0;
        Matrix4::new(
            c[3], c[4], c[5], c[0], //
            c[6], c[7], c[8], c[1], //
            c[9], c[10], c[11], c[2], //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Collapse a homogeneous matrix back to the 12-component encoding.
    /// The bottom row is dropped.
    pub fn from_matrix(m: &Matrix4<f32>) -> CFrame {
        CFrame([
            m[(0, 3)],
            m[(1, 3)],
            m[(2, 3)],
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
            m[(2, 2)],
        ])
    }

    /// Round every component to `decimals` places. Shrinks the exported JSON;
    /// lossy by design and off by default.
    pub fn rounded(&self, decimals: u32) -> CFrame {
        let f = 10f32.powi(decimals as i32);
        let mut out = self.0;
        for c in &mut out {
            *c = (*c * f).round() / f;
        }
        CFrame(out)
    }

    /// Snap components sitting within `eps` of an integer to that integer.
    /// A never-posed bone's delta becomes exactly `IDENTITY`, which lets the
    /// serializer omit it.
    pub fn snapped(&self, eps: f32) -> CFrame {
        let mut out = self.0;
        for c in &mut out {
            let nearest = c.round();
            if (*c - nearest).abs() < eps {
                *c = nearest;
            }
        }
        CFrame(out)
    }
}

impl Default for CFrame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Fixed basis change: source frame (forward Z, up Y) to authoring frame
/// (forward -Y, up Z). X is shared, source up maps to authoring up, source
/// forward maps to -Y.
pub fn basis_to_authoring() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Inverse of [`basis_to_authoring`] (a pure rotation, so the transpose).
pub fn basis_to_source() -> Matrix4<f32> {
    basis_to_authoring().transpose()
}

/// Source-space affine to authoring-space matrix.
pub fn to_authoring(cf: &CFrame) -> Matrix4<f32> {
    basis_to_authoring() * cf.to_matrix()
}

/// Authoring-space matrix back to the source-space affine encoding.
pub fn to_source(m: &Matrix4<f32>) -> CFrame {
    CFrame::from_matrix(&(basis_to_source() * m))
}

/// Rotation-only copy of a matrix (translation zeroed, bottom row kept).
pub fn rotation_of(m: &Matrix4<f32>) -> Matrix4<f32> {
    let mut r = *m;
    r[(0, 3)] = 0.0;
    r[(1, 3)] = 0.0;
    r[(2, 3)] = 0.0;
    r
}

/// Translation column of a matrix.
pub fn translation_of(m: &Matrix4<f32>) -> Vector3<f32> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Apply an affine matrix to a point.
pub fn transform_point(m: &Matrix4<f32>, p: &Vector3<f32>) -> Vector3<f32> {
    let v = m * p.push(1.0);
    Vector3::new(v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_round_trips() {
        let m = CFrame::IDENTITY.to_matrix();
        assert_eq!(m, Matrix4::identity());
        assert_eq!(CFrame::from_matrix(&m), CFrame::IDENTITY);
    }

    #[test]
    fn basis_is_a_rotation() {
        let b = basis_to_authoring();
        assert_relative_eq!(b * basis_to_source(), Matrix4::identity(), epsilon = 1e-6);
        // up Y -> up Z, forward Z -> -Y
        let up = transform_point(&b, &Vector3::y());
        let fwd = transform_point(&b, &Vector3::z());
        assert_relative_eq!(up, Vector3::z(), epsilon = 1e-6);
        assert_relative_eq!(fwd, -Vector3::y(), epsilon = 1e-6);
    }

    #[test]
    fn to_source_inverts_to_authoring() {
        let cf = CFrame([
            1.5, -2.0, 0.25, //
            0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, //
            -1.0, 0.0, 0.0,
        ]);
        let back = to_source(&to_authoring(&cf));
        for (a, b) in cf.0.iter().zip(back.0.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn snap_produces_exact_identity() {
        let near = CFrame([
            1e-6, -1e-6, 0.0, //
            1.0 + 1e-6, 0.0, 1e-7, //
            0.0, 1.0 - 1e-6, 0.0, //
            0.0, 0.0, 1.0,
        ]);
        assert_eq!(near.snapped(1e-5), CFrame::IDENTITY);
    }

    #[test]
    fn rounding_truncates_noise() {
        let cf = CFrame([
            0.123456, 0.0, 0.0, //
            1.0, 0.00004, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ]);
        let r = cf.rounded(4);
        assert_relative_eq!(r.0[0], 0.1235, epsilon = 1e-6);
        assert_relative_eq!(r.0[4], 0.0, epsilon = 1e-9);
    }
}
