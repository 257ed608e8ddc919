use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};

/// Mean sea-plane `a*x + b*y + c*z = d`.
///
/// `(a, b, c)` is the plane normal and is expected to be close to vertical
/// (`c` near 1). It is used as given, without normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeaPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl SeaPlane {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> SeaPlane {
        SeaPlane { a, b, c, d }
    }

    pub fn from_slice(coeffs: &[f64]) -> Result<SeaPlane> {
        match coeffs {
            [a, b, c, d] => Ok(SeaPlane::new(*a, *b, *c, *d)),
            _ => Err(OverlayError::config(format!(
                "plane needs 4 coefficients, got {}",
                coeffs.len()
            ))),
        }
    }

    pub fn normal(&self) -> na::Vector3<f64> {
        na::Vector3::new(self.a, self.b, self.c)
    }
}

/// Rotation and translation taking plane-local coordinates to camera-relative ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicTransform {
    pub rotation: na::Matrix3<f64>,
    pub translation: na::Vector3<f64>,
}

impl ExtrinsicTransform {
    /// Homogeneous inverse `[R^T | -R^T T]`, valid because `R` is orthonormal.
    pub fn inverse_homogeneous(&self) -> na::Matrix4<f64> {
        let rt = self.rotation.transpose();
        let t = -(rt * self.translation);
        let mut m = na::Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&rt);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
        m
    }

    pub fn to_homogeneous(&self) -> na::Matrix4<f64> {
        let mut m = na::Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

/// Builds the rotation mapping the world Z axis onto the plane normal, with
/// the plane offset `d` as translation along Z.
///
/// Closed form, no trigonometry. Fails with [`OverlayError::Configuration`]
/// when `a^2 + b^2 == 0` (the formula divides by it) or when a coefficient
/// is not finite.
pub fn derive_extrinsic(plane: &SeaPlane) -> Result<ExtrinsicTransform> {
    let SeaPlane { a, b, c, d } = *plane;
    if ![a, b, c, d].iter().all(|v| v.is_finite()) {
        return Err(OverlayError::config(format!(
            "plane coefficients must be finite, got {:?}",
            plane
        )));
    }
    let ab2 = a * a + b * b;
    if ab2 == 0.0 {
        // c == 1 is the identity alignment, anything else is a mirrored or
        // scaled plane the closed form cannot express
        if c == 1.0 {
            return Ok(ExtrinsicTransform {
                rotation: na::Matrix3::identity(),
                translation: na::Vector3::new(0.0, 0.0, d),
            });
        }
        return Err(OverlayError::config(format!(
            "degenerate sea plane {:?}: a^2 + b^2 is zero",
            plane
        )));
    }
    let norm = plane.normal().norm();
    if (norm - 1.0).abs() > 1e-3 {
        log::warn!("plane normal has length {:.6}, rotation will not be orthonormal", norm);
    }

    let q = (1.0 - c) / ab2;
    #[rustfmt::skip]
    let rotation = na::Matrix3::new(
        1.0 - a * a * q, -a * b * q,      -a,
        -a * b * q,      1.0 - b * b * q, -b,
        a,               b,               c,
    );
    Ok(ExtrinsicTransform {
        rotation,
        translation: na::Vector3::new(0.0, 0.0, d),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilted_plane_inverse_roundtrip() {
        let n = na::Vector3::new(0.05, -0.02, 1.0).normalize();
        let rt = derive_extrinsic(&SeaPlane::new(n.x, n.y, n.z, 3.5)).unwrap();
        let prod = rt.to_homogeneous() * rt.inverse_homogeneous();
        assert!((prod - na::Matrix4::identity()).norm() < 1e-12);
    }

    #[test]
    fn wrong_coefficient_count() {
        assert!(SeaPlane::from_slice(&[0.0, 0.0, 1.0]).is_err());
        assert!(SeaPlane::from_slice(&[0.0, 0.0, 1.0, 2.0]).is_ok());
    }
}
