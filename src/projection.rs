use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};
use crate::plane::ExtrinsicTransform;

/// Pixel to normalized-device-coordinate matrix.
///
/// Maps pixel `(0, 0)` to `(-1, -1)` and `(width, height)` to `(1, 1)`; the
/// depth and homogeneous rows are left as identity.
pub fn to_norm(width: u32, height: u32) -> na::Matrix4<f64> {
    let w = width as f64;
    let h = height as f64;
    #[rustfmt::skip]
    let m = na::Matrix4::new(
        2.0 / w, 0.0,     -1.0, 0.0,
        0.0,     2.0 / h, -1.0, 0.0,
        0.0,     0.0,     1.0,  0.0,
        0.0,     0.0,     0.0,  1.0,
    );
    m
}

/// World-to-NDC homogeneous transform for a whole run.
///
/// Input points are plane-relative metres `(x, y, elevation, 1)`. The result
/// `(u', v', w, 1)` gives NDC as `(u'/w, v'/w)`; `w > 0` means the point is
/// in front of the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMatrix {
    matrix: na::Matrix4<f64>,
    width: u32,
    height: u32,
}

impl ProjectionMatrix {
    /// Wraps a matrix computed elsewhere (e.g. stored alongside the dataset)
    /// for frames of `width` x `height`.
    pub fn from_matrix(matrix: na::Matrix4<f64>, width: u32, height: u32) -> Result<ProjectionMatrix> {
        if width == 0 || height == 0 {
            return Err(OverlayError::config(format!(
                "reference frame size must be nonzero, got {}x{}",
                width, height
            )));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(OverlayError::config("projection matrix has non-finite entries"));
        }
        Ok(ProjectionMatrix {
            matrix,
            width,
            height,
        })
    }

    pub fn matrix(&self) -> &na::Matrix4<f64> {
        &self.matrix
    }

    pub fn reference_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Entries in column-major order, i.e. the row-major layout of the
    /// transposed matrix, which is what GL-style backends upload.
    pub fn to_column_major(&self) -> [f32; 16] {
        let mut out = [0f32; 16];
        for (o, v) in out.iter_mut().zip(self.matrix.iter()) {
            *o = *v as f32;
        }
        out
    }

    /// Fails unless a frame of `width` x `height` matches the reference size.
    pub fn check_dimensions(&self, index: usize, width: u32, height: u32) -> Result<()> {
        if (width, height) != (self.width, self.height) {
            return Err(OverlayError::DimensionMismatch {
                index,
                expected_width: self.width,
                expected_height: self.height,
                actual_width: width,
                actual_height: height,
            });
        }
        Ok(())
    }

    /// NDC of a world point, `None` if it is behind the camera.
    pub fn project_ndc(&self, p: &na::Vector3<f64>) -> Option<na::Vector2<f64>> {
        let v = self.matrix * p.push(1.0);
        if v[2] <= f64::EPSILON {
            return None;
        }
        Some(na::Vector2::new(v[0] / v[2], v[1] / v[2]))
    }
}

/// Composes `to_norm * camera_pose * plane^-1 * diag(1/b, 1/b, -1/b, 1)`.
///
/// `camera_pose` is the camera projection padded to 4x4, `baseline` the
/// stereo baseline in metres. The Z scale is negated so that elevation "up"
/// matches the camera looking down on the sea.
pub fn compose(
    camera_pose: &na::Matrix4<f64>,
    extrinsic: &ExtrinsicTransform,
    baseline: f64,
    frame_width: u32,
    frame_height: u32,
) -> Result<ProjectionMatrix> {
    if baseline == 0.0 || !baseline.is_finite() {
        return Err(OverlayError::config(format!(
            "stereo baseline must be finite and nonzero, got {}",
            baseline
        )));
    }
    let s = 1.0 / baseline;
    let scale = na::Matrix4::from_diagonal(&na::Vector4::new(s, s, -s, 1.0));
    let matrix = to_norm(frame_width, frame_height)
        * camera_pose
        * extrinsic.inverse_homogeneous()
        * scale;
    ProjectionMatrix::from_matrix(matrix, frame_width, frame_height)
}
