use std::path::Path;

use camera_intrinsic_model::{GenericModel, OpenCVModel5, remap};
use image::{DynamicImage, GrayImage};
use nalgebra as na;

use crate::error::{OverlayError, Result};
use crate::io::load_ocv_matrix;

pub const INTRINSICS_FILE: &str = "intrinsics_00.xml";
pub const DISTORTION_FILE: &str = "distortion_00.xml";

/// Intrinsics and plumb-bob distortion `(k1, k2, p1, p2, k3)` of the reference camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    pub k: na::Matrix3<f64>,
    pub distortion: [f64; 5],
}

impl CameraCalibration {
    /// Takes up to the first five distortion coefficients; missing ones are zero.
    pub fn new(k: na::Matrix3<f64>, coeffs: &[f64]) -> CameraCalibration {
        if coeffs.len() > 5 {
            log::warn!(
                "{} distortion coefficients given, only k1 k2 p1 p2 k3 are used",
                coeffs.len()
            );
        }
        CameraCalibration {
            k,
            distortion: std::array::from_fn(|i| coeffs.get(i).copied().unwrap_or(0.0)),
        }
    }

    /// Loads `intrinsics_00.xml` and `distortion_00.xml` from a calibration directory.
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<CameraCalibration> {
        let dir = config_dir.as_ref();
        let k = load_ocv_matrix(dir.join(INTRINSICS_FILE))?;
        if k.shape() != (3, 3) {
            return Err(OverlayError::input(format!(
                "intrinsics must be 3x3, got {:?}",
                k.shape()
            )));
        }
        let kk = load_ocv_matrix(dir.join(DISTORTION_FILE))?;
        Ok(CameraCalibration::new(
            na::Matrix3::from_fn(|r, c| k[(r, c)]),
            kk.as_slice(),
        ))
    }

    /// OpenCV 5-parameter camera model for frames of `width` x `height`.
    pub fn model(&self, width: u32, height: u32) -> GenericModel<f64> {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let params = na::dvector![
            self.k[(0, 0)],
            self.k[(1, 1)],
            self.k[(0, 2)],
            self.k[(1, 2)],
            k1,
            k2,
            p1,
            p2,
            k3
        ];
        GenericModel::OpenCVModel5(OpenCVModel5::new(&params, width, height))
    }
}

/// Per-pixel source coordinates for undistorting frames of one size.
pub struct UndistortMap {
    pub width: u32,
    pub height: u32,
    xmap: na::DMatrix<f32>,
    ymap: na::DMatrix<f32>,
}

/// Builds the map sending every undistorted pixel to its distorted source,
/// keeping the camera matrix unchanged for the output.
pub fn init_undistort_map(calib: &CameraCalibration, width: u32, height: u32) -> UndistortMap {
    let model = calib.model(width, height);
    let (xmap, ymap) = model.init_undistort_map(&calib.k, (width, height), None);
    UndistortMap {
        width,
        height,
        xmap,
        ymap,
    }
}

/// Resamples `src` through the map.
pub fn undistort(src: GrayImage, map: &UndistortMap) -> GrayImage {
    remap(&DynamicImage::ImageLuma8(src), &map.xmap, &map.ymap).to_luma8()
}

/// Shrinks by `1/scale` (`scale = 2` halves both sides).
pub fn downscale(img: GrayImage, scale: f64) -> GrayImage {
    if scale == 1.0 {
        return img;
    }
    let w = ((img.width() as f64 / scale).round() as u32).max(1);
    let h = ((img.height() as f64 / scale).round() as u32).max(1);
    image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distortion_keeps_frame() {
        let calib = CameraCalibration::new(
            na::Matrix3::new(100.0, 0.0, 8.0, 0.0, 100.0, 6.0, 0.0, 0.0, 1.0),
            &[],
        );
        let img = GrayImage::from_fn(16, 12, |x, y| image::Luma([(x * 10 + y) as u8]));
        let map = init_undistort_map(&calib, 16, 12);
        let out = undistort(img.clone(), &map);
        assert_eq!(out.dimensions(), (16, 12));
        assert_eq!(out.get_pixel(8, 6), img.get_pixel(8, 6));
        assert_eq!(out.get_pixel(3, 9), img.get_pixel(3, 9));
    }

    #[test]
    fn extra_coefficients_are_ignored() {
        let calib = CameraCalibration::new(na::Matrix3::identity(), &[0.1, 0.2, 0.0, 0.0, 0.3, 9.0]);
        assert_eq!(calib.distortion, [0.1, 0.2, 0.0, 0.0, 0.3]);
    }

    #[test]
    fn half_scale() {
        let img = GrayImage::new(9, 6);
        assert_eq!(downscale(img, 2.0).dimensions(), (5, 3));
    }
}
