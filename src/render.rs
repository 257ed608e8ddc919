//! Rendering of an elevation grid over a camera frame.
//!
//! [`RenderBackend`] is the seam to a drawing engine; [`Renderer`] wraps one
//! with an explicit `Uninitialized -> Ready` lifecycle so a backend is set up
//! exactly once, from the reference frame size, before the first frame is
//! drawn. [`SoftwareRenderer`] is the built-in CPU backend.

use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::BresenhamLineIter;
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};
use crate::projection::ProjectionMatrix;
use crate::types::{ElevationGrid, PixelMap, RenderedFrame, WorldGrid};
use crate::visualization::elevation_color;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Draw grid edges instead of a filled surface.
    pub wireframe: bool,
    /// Internal raster resolution relative to the frame size.
    pub pixel_scale: f64,
    /// Produce the dense pixel -> 3D map along with the composite.
    pub pixel_map: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wireframe: true,
            pixel_scale: 1.0,
            pixel_map: false,
        }
    }
}

/// Run-scoped data every backend receives once, before the first frame.
pub struct FieldSetup<'a> {
    pub grid: &'a WorldGrid,
    pub projection: &'a ProjectionMatrix,
    pub zmin: f64,
    pub zmax: f64,
    pub alpha: f64,
}

pub trait RenderBackend {
    /// Allocates output buffers for frames of `width` x `height`.
    fn configure(&mut self, width: u32, height: u32, options: &RenderOptions) -> Result<()>;

    /// World grid in metres and the projection in column-major order.
    fn setup_field(&mut self, grid: &WorldGrid, projection: &[f32; 16]) -> Result<()>;

    /// Colour-map limits and overlay opacity.
    fn set_z_range(&mut self, zmin: f64, zmax: f64, alpha: f64);

    fn render(&mut self, frame: &GrayImage, elevation: &ElevationGrid) -> Result<RenderedFrame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Uninitialized,
    Ready { width: u32, height: u32 },
}

/// A backend plus the lifecycle that guards it.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    state: RenderState,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B) -> Renderer<B> {
        Renderer {
            backend,
            state: RenderState::Uninitialized,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// One-time setup. A second call is a configuration error.
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        options: &RenderOptions,
        field: &FieldSetup,
    ) -> Result<()> {
        if let RenderState::Ready { .. } = self.state {
            return Err(OverlayError::config("renderer is already configured"));
        }
        if field.zmax <= field.zmin {
            return Err(OverlayError::config(format!(
                "zmax ({}) must be greater than zmin ({})",
                field.zmax, field.zmin
            )));
        }
        if !(0.0..=1.0).contains(&field.alpha) {
            return Err(OverlayError::config(format!(
                "alpha must be within [0, 1], got {}",
                field.alpha
            )));
        }
        self.backend.configure(width, height, options)?;
        self.backend
            .setup_field(field.grid, &field.projection.to_column_major())?;
        self.backend.set_z_range(field.zmin, field.zmax, field.alpha);
        self.state = RenderState::Ready { width, height };
        log::debug!("renderer ready for {}x{} frames", width, height);
        Ok(())
    }

    pub fn render(
        &mut self,
        index: usize,
        frame: &GrayImage,
        elevation: &ElevationGrid,
    ) -> Result<RenderedFrame> {
        let RenderState::Ready { width, height } = self.state else {
            return Err(OverlayError::config("render called before configure"));
        };
        if frame.dimensions() != (width, height) {
            return Err(OverlayError::DimensionMismatch {
                index,
                expected_width: width,
                expected_height: height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }
        self.backend.render(frame, elevation)
    }
}

/// A grid node after projection: canvas position and camera depth.
#[derive(Debug, Clone, Copy)]
struct ScreenPoint {
    x: f64,
    y: f64,
    w: f64,
}

/// CPU rasteriser: z-buffered grid quads, wireframe or flat-coloured.
pub struct SoftwareRenderer {
    width: u32,
    height: u32,
    canvas: (u32, u32),
    options: RenderOptions,
    grid: Option<WorldGrid>,
    projection: na::Matrix4<f64>,
    zmin: f64,
    zmax: f64,
    alpha: f64,
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareRenderer {
    pub fn new() -> SoftwareRenderer {
        SoftwareRenderer {
            width: 0,
            height: 0,
            canvas: (0, 0),
            options: RenderOptions::default(),
            grid: None,
            projection: na::Matrix4::identity(),
            zmin: -1.0,
            zmax: 1.0,
            alpha: 0.5,
        }
    }

    fn project(&self, p: na::Vector4<f64>) -> Option<ScreenPoint> {
        let v = self.projection * p;
        if v[2] <= f64::EPSILON || !v.iter().all(|c| c.is_finite()) {
            return None;
        }
        let (cw, ch) = (self.canvas.0 as f64, self.canvas.1 as f64);
        Some(ScreenPoint {
            x: (v[0] / v[2] + 1.0) * 0.5 * cw,
            y: (v[1] / v[2] + 1.0) * 0.5 * ch,
            w: v[2],
        })
    }
}

/// Depth, elevation and world position of the nearest surface per canvas pixel.
struct SurfaceBuffer {
    width: u32,
    depth: Vec<f64>,
    elevation: Vec<f64>,
    xyz: Vec<[f32; 3]>,
}

impl SurfaceBuffer {
    fn new(width: u32, height: u32) -> SurfaceBuffer {
        let n = width as usize * height as usize;
        SurfaceBuffer {
            width,
            depth: vec![f64::INFINITY; n],
            elevation: vec![f64::NAN; n],
            xyz: vec![[f32::NAN; 3]; n],
        }
    }

    /// Perspective-correct fill of one triangle.
    fn fill(&mut self, height: u32, s: [ScreenPoint; 3], world: [na::Vector3<f64>; 3]) {
        let area = (s[1].x - s[0].x) * (s[2].y - s[0].y) - (s[2].x - s[0].x) * (s[1].y - s[0].y);
        if area.abs() < 1e-12 {
            return;
        }
        let min_x = s.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).floor().max(0.0);
        let max_x = s.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max).ceil();
        let min_y = s.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).floor().max(0.0);
        let max_y = s.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max).ceil();
        let max_x = max_x.min(self.width as f64 - 1.0);
        let max_y = max_y.min(height as f64 - 1.0);
        if min_x > max_x || min_y > max_y {
            return;
        }

        for py in min_y as u32..=max_y as u32 {
            for px in min_x as u32..=max_x as u32 {
                let (cx, cy) = (px as f64 + 0.5, py as f64 + 0.5);
                let l0 = ((s[1].x - cx) * (s[2].y - cy) - (s[2].x - cx) * (s[1].y - cy)) / area;
                let l1 = ((s[2].x - cx) * (s[0].y - cy) - (s[0].x - cx) * (s[2].y - cy)) / area;
                let l2 = 1.0 - l0 - l1;
                if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                    continue;
                }
                let k = [l0 / s[0].w, l1 / s[1].w, l2 / s[2].w];
                let inv_w = k[0] + k[1] + k[2];
                let depth = 1.0 / inv_w;
                let i = py as usize * self.width as usize + px as usize;
                if depth >= self.depth[i] {
                    continue;
                }
                let p = (world[0] * k[0] + world[1] * k[1] + world[2] * k[2]) * depth;
                self.depth[i] = depth;
                self.elevation[i] = p.z;
                self.xyz[i] = [p.x as f32, p.y as f32, p.z as f32];
            }
        }
    }
}

impl RenderBackend for SoftwareRenderer {
    fn configure(&mut self, width: u32, height: u32, options: &RenderOptions) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(OverlayError::config("render size must be nonzero"));
        }
        if !(options.pixel_scale > 0.0) || !options.pixel_scale.is_finite() {
            return Err(OverlayError::config(format!(
                "pixel scale must be positive, got {}",
                options.pixel_scale
            )));
        }
        self.width = width;
        self.height = height;
        self.options = *options;
        self.canvas = (
            ((width as f64 * options.pixel_scale).round() as u32).max(1),
            ((height as f64 * options.pixel_scale).round() as u32).max(1),
        );
        Ok(())
    }

    fn setup_field(&mut self, grid: &WorldGrid, projection: &[f32; 16]) -> Result<()> {
        if grid.rows < 2 || grid.cols < 2 {
            return Err(OverlayError::input(format!(
                "world grid must be at least 2x2, got {}x{}",
                grid.rows, grid.cols
            )));
        }
        self.grid = Some(grid.clone());
        self.projection = na::Matrix4::from_column_slice(&projection.map(|v| v as f64));
        Ok(())
    }

    fn set_z_range(&mut self, zmin: f64, zmax: f64, alpha: f64) {
        self.zmin = zmin;
        self.zmax = zmax;
        self.alpha = alpha;
    }

    fn render(&mut self, frame: &GrayImage, elevation: &ElevationGrid) -> Result<RenderedFrame> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| OverlayError::config("setup_field was not called"))?;
        if !elevation.matches(grid) {
            return Err(OverlayError::input(format!(
                "elevation grid is {}x{}, world grid is {}x{}",
                elevation.rows, elevation.cols, grid.rows, grid.cols
            )));
        }
        let (cw, ch) = self.canvas;

        let nodes: Vec<Option<(ScreenPoint, na::Vector3<f64>)>> = (0..grid.rows * grid.cols)
            .map(|i| {
                let z = elevation.z[i];
                if !z.is_finite() {
                    return None;
                }
                let world = na::Vector3::new(grid.x[i], grid.y[i], z);
                self.project(world.push(1.0)).map(|s| (s, world))
            })
            .collect();
        let node = |r: usize, c: usize| nodes[r * grid.cols + c];

        let mut surface = SurfaceBuffer::new(cw, ch);
        for r in 0..grid.rows - 1 {
            for c in 0..grid.cols - 1 {
                let quad = [node(r, c), node(r, c + 1), node(r + 1, c + 1), node(r + 1, c)];
                for tri in [[0, 1, 2], [0, 2, 3]] {
                    if let (Some(a), Some(b), Some(d)) = (quad[tri[0]], quad[tri[1]], quad[tri[2]]) {
                        surface.fill(ch, [a.0, b.0, d.0], [a.1, b.1, d.1]);
                    }
                }
            }
        }

        // overlay at canvas resolution, transparent where nothing is drawn
        let mut overlay = RgbaImage::new(cw, ch);
        if self.options.wireframe {
            for r in 0..grid.rows {
                for c in 0..grid.cols {
                    let Some((a, wa)) = node(r, c) else { continue };
                    let neighbours = [
                        (c + 1 < grid.cols).then(|| node(r, c + 1)).flatten(),
                        (r + 1 < grid.rows).then(|| node(r + 1, c)).flatten(),
                    ];
                    for (b, wb) in neighbours.into_iter().flatten() {
                        self.draw_edge(&mut overlay, &surface, (a, wa.z), (b, wb.z));
                    }
                }
            }
        } else {
            for (i, px) in overlay.pixels_mut().enumerate() {
                let z = surface.elevation[i];
                if z.is_finite() {
                    let [r, g, b] = elevation_color(z, self.zmin, self.zmax);
                    *px = Rgba([r, g, b, 255]);
                }
            }
        }
        let overlay = if (cw, ch) == (self.width, self.height) {
            overlay
        } else {
            image::imageops::resize(&overlay, self.width, self.height, image::imageops::FilterType::Triangle)
        };

        // the overlay is premultiplied (transparent pixels are black), the frame keeps its resolution
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let v = frame.get_pixel(x, y)[0] as f64;
            let o = overlay.get_pixel(x, y).0;
            let cover = self.alpha * o[3] as f64 / 255.0;
            Rgb(std::array::from_fn(|k| {
                ((1.0 - cover) * v + self.alpha * o[k] as f64).round().clamp(0.0, 255.0) as u8
            }))
        });
        let pixel_map = self.options.pixel_map.then(|| {
            let mut map = PixelMap::empty(self.width, self.height);
            for y in 0..self.height {
                for x in 0..self.width {
                    let sx = ((x as f64 + 0.5) * cw as f64 / self.width as f64) as usize;
                    let sy = ((y as f64 + 0.5) * ch as f64 / self.height as f64) as usize;
                    let i = sy.min(ch as usize - 1) * cw as usize + sx.min(cw as usize - 1);
                    map.set(x, y, surface.xyz[i]);
                }
            }
            map
        });
        Ok(RenderedFrame { image, pixel_map })
    }
}

/// Liang-Barsky clip of segment `a -> b` to `[x0, x1] x [y0, y1]`.
///
/// Returns the parameter range `(t0, t1)` along the segment that lies inside.
fn clip_segment(a: (f64, f64), b: (f64, f64), x0: f64, x1: f64, y0: f64, y1: f64) -> Option<(f64, f64)> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (p, q) in [
        (-dx, a.0 - x0),
        (dx, x1 - a.0),
        (-dy, a.1 - y0),
        (dy, y1 - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    (t0 <= t1).then_some((t0, t1))
}

impl SoftwareRenderer {
    /// Draws one grid edge, hidden where the surface is nearer to the camera.
    fn draw_edge(
        &self,
        overlay: &mut RgbaImage,
        surface: &SurfaceBuffer,
        (a, za): (ScreenPoint, f64),
        (b, zb): (ScreenPoint, f64),
    ) {
        let (cw, ch) = (overlay.width() as f64, overlay.height() as f64);
        // nodes close to the camera plane project arbitrarily far away
        let Some((t0, t1)) = clip_segment((a.x, a.y), (b.x, b.y), 0.0, cw - 1.0, 0.0, ch - 1.0) else {
            return;
        };
        let at = |t: f64| ((a.x + (b.x - a.x) * t) as f32, (a.y + (b.y - a.y) * t) as f32);
        let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt().max(1e-9);
        for (x, y) in BresenhamLineIter::new(at(t0), at(t1)) {
            if x < 0 || y < 0 || x as f64 >= cw || y as f64 >= ch {
                continue;
            }
            let t = (((x as f64 - a.x).powi(2) + (y as f64 - a.y).powi(2)).sqrt() / len).min(1.0);
            let depth = 1.0 / ((1.0 - t) / a.w + t / b.w);
            let i = y as usize * overlay.width() as usize + x as usize;
            if depth > surface.depth[i] * (1.0 + 1e-3) {
                continue;
            }
            let [r, g, b] = elevation_color(za + (zb - za) * t, self.zmin, self.zmax);
            overlay.put_pixel(x as u32, y as u32, Rgba([r, g, b, 255]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_only_the_visible_part() {
        let (t0, t1) = clip_segment((5.0, 5.0), (5.0e9, 5.0), 0.0, 9.0, 0.0, 9.0).unwrap();
        assert_eq!(t0, 0.0);
        assert!((5.0 + t1 * (5.0e9 - 5.0) - 9.0).abs() < 1e-6);
        assert!(clip_segment((-5.0, -5.0), (-1.0, 20.0), 0.0, 9.0, 0.0, 9.0).is_none());
    }

    #[test]
    fn surface_buffer_keeps_nearest() {
        let mut buf = SurfaceBuffer::new(8, 8);
        let tri = |w: f64| {
            [
                ScreenPoint { x: 0.0, y: 0.0, w },
                ScreenPoint { x: 8.0, y: 0.0, w },
                ScreenPoint { x: 0.0, y: 8.0, w },
            ]
        };
        let world = |z: f64| {
            [
                na::Vector3::new(0.0, 0.0, z),
                na::Vector3::new(1.0, 0.0, z),
                na::Vector3::new(0.0, 1.0, z),
            ]
        };
        buf.fill(8, tri(5.0), world(1.0));
        buf.fill(8, tri(9.0), world(2.0));
        assert!((buf.depth[0] - 5.0).abs() < 1e-9);
        assert!((buf.elevation[0] - 1.0).abs() < 1e-9);
        buf.fill(8, tri(2.0), world(3.0));
        assert!((buf.elevation[0] - 3.0).abs() < 1e-9);
        // lower-right half is outside the triangle
        assert!(buf.depth[7 * 8 + 7].is_infinite());
    }
}
