#![allow(dead_code)]

use image::{GrayImage, ImageFormat, Luma, RgbImage};
use nalgebra as na;
use std::io::Cursor;
use wave_field_overlay::Result;
use wave_field_overlay::dataset::{DatasetMeta, JsonDataset};
use wave_field_overlay::render::{RenderBackend, RenderOptions};
use wave_field_overlay::types::{ElevationGrid, PixelMap, RenderedFrame, WorldGrid};

pub fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

/// Frame `i` is filled with gray level `10 * i`.
pub fn gray_frame(i: usize, w: u32, h: u32) -> GrayImage {
    GrayImage::from_pixel(w, h, Luma([(10 * i) as u8]))
}

/// 2x3 grid, slice `k` flat at `k` metres, with `n_images` embedded 8x6 frames.
pub fn synthetic_dataset(n_slices: usize, n_images: usize) -> JsonDataset {
    let x_grid = vec![vec![-1000.0, 0.0, 1000.0], vec![-1000.0, 0.0, 1000.0]];
    let y_grid = vec![vec![-500.0, -500.0, -500.0], vec![500.0, 500.0, 500.0]];
    let z = (0..n_slices)
        .map(|k| vec![vec![Some(k as f64 * 1000.0); 3]; 2])
        .collect();
    let p0plane = std::array::from_fn(|r| std::array::from_fn(|c| if r == c { 1.0 } else { 0.0 }));
    JsonDataset {
        scale: vec![2.0],
        x_grid,
        y_grid,
        z,
        meta: Some(DatasetMeta {
            p0plane,
            image_width: 8,
            image_height: 6,
        }),
        cam0_images: (0..n_images).map(|i| png_bytes(&gray_frame(i, 8, 6))).collect(),
    }
}

/// Records what the pipeline hands to the backend and returns a synthetic composite.
#[derive(Default)]
pub struct MockBackend {
    pub size: Option<(u32, u32)>,
    pub options: Option<RenderOptions>,
    pub grid: Option<WorldGrid>,
    pub projection: Option<[f32; 16]>,
    pub z_range: Option<(f64, f64, f64)>,
    /// (frame gray level, first elevation sample) per render call
    pub calls: Vec<(u8, f64)>,
}

impl RenderBackend for MockBackend {
    fn configure(&mut self, width: u32, height: u32, options: &RenderOptions) -> Result<()> {
        self.size = Some((width, height));
        self.options = Some(*options);
        Ok(())
    }

    fn setup_field(&mut self, grid: &WorldGrid, projection: &[f32; 16]) -> Result<()> {
        self.grid = Some(grid.clone());
        self.projection = Some(*projection);
        Ok(())
    }

    fn set_z_range(&mut self, zmin: f64, zmax: f64, alpha: f64) {
        self.z_range = Some((zmin, zmax, alpha));
    }

    fn render(&mut self, frame: &GrayImage, elevation: &ElevationGrid) -> Result<RenderedFrame> {
        let level = frame.get_pixel(0, 0)[0];
        self.calls.push((level, elevation.z[0]));
        let mut map = PixelMap::empty(frame.width(), frame.height());
        map.set(0, 0, [1.0, 2.0, elevation.z[0] as f32]);
        Ok(RenderedFrame {
            image: RgbImage::from_pixel(frame.width(), frame.height(), image::Rgb([level, 0, 255])),
            pixel_map: Some(map),
        })
    }
}

pub fn identity4() -> na::Matrix4<f64> {
    na::Matrix4::identity()
}
