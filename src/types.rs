use crate::error::{OverlayError, Result};

/// Millimetres per metre; dataset grids and elevations are stored in millimetres.
pub const MM_PER_M: f64 = 1000.0;

/// Static plane-relative (X, Y) node positions, in metres, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldGrid {
    pub rows: usize,
    pub cols: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl WorldGrid {
    pub fn new(rows: usize, cols: usize, x: Vec<f64>, y: Vec<f64>) -> Result<WorldGrid> {
        if x.len() != rows * cols || y.len() != rows * cols {
            return Err(OverlayError::input(format!(
                "world grid is {}x{} but X has {} and Y has {} samples",
                rows,
                cols,
                x.len(),
                y.len()
            )));
        }
        Ok(WorldGrid { rows, cols, x, y })
    }

    pub fn from_millimetres(rows: usize, cols: usize, x_mm: &[f64], y_mm: &[f64]) -> Result<WorldGrid> {
        Self::new(
            rows,
            cols,
            x_mm.iter().map(|v| v / MM_PER_M).collect(),
            y_mm.iter().map(|v| v / MM_PER_M).collect(),
        )
    }

    pub fn node(&self, row: usize, col: usize) -> (f64, f64) {
        let i = row * self.cols + col;
        (self.x[i], self.y[i])
    }
}

/// One time step of surface heights in metres, on the [`WorldGrid`] topology.
///
/// Non-finite samples mark holes in the reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    pub rows: usize,
    pub cols: usize,
    pub z: Vec<f64>,
}

impl ElevationGrid {
    pub fn new(rows: usize, cols: usize, z: Vec<f64>) -> Result<ElevationGrid> {
        if z.len() != rows * cols {
            return Err(OverlayError::input(format!(
                "elevation grid is {}x{} but has {} samples",
                rows,
                cols,
                z.len()
            )));
        }
        Ok(ElevationGrid { rows, cols, z })
    }

    pub fn from_millimetres(rows: usize, cols: usize, z_mm: &[f64]) -> Result<ElevationGrid> {
        Self::new(rows, cols, z_mm.iter().map(|v| v / MM_PER_M).collect())
    }

    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.z[row * self.cols + col]
    }

    pub fn matches(&self, grid: &WorldGrid) -> bool {
        self.rows == grid.rows && self.cols == grid.cols
    }
}

/// Dense pixel -> 3D point map; NaN triples mark pixels without a surface point.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[f32; 3]>,
}

impl PixelMap {
    pub fn empty(width: u32, height: u32) -> PixelMap {
        PixelMap {
            width,
            height,
            data: vec![[f32::NAN; 3]; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 3]> {
        let p = self.data[y as usize * self.width as usize + x as usize];
        if p[0].is_nan() { None } else { Some(p) }
    }

    pub fn set(&mut self, x: u32, y: u32, p: [f32; 3]) {
        let i = y as usize * self.width as usize + x as usize;
        self.data[i] = p;
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|p| !p[0].is_nan()).count()
    }
}

/// Output of one render call; both parts share the frame's pixel size.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub image: image::RgbImage,
    pub pixel_map: Option<PixelMap>,
}
