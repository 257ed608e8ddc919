use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};
use crate::io::object_from_json;
use crate::types::{ElevationGrid, WorldGrid};

/// Read-only access to a reconstructed sea-surface sequence.
///
/// Coordinates and elevations are stored in millimetres; the grid and slice
/// accessors return metres.
pub trait ElevationDataset {
    /// Stereo baseline stored with the reconstruction, if any.
    fn baseline(&self) -> Option<f64>;

    fn world_grid(&self) -> Result<WorldGrid>;

    /// Number of elevation slices.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elevation slice `index`. An index past the end is an input error.
    fn elevation(&self, index: usize) -> Result<ElevationGrid>;

    /// Projection matrix and reference frame size saved with the data.
    fn embedded_projection(&self) -> Option<(na::Matrix4<f64>, u32, u32)> {
        None
    }

    /// Encoded (PNG/JPEG) camera frame `index`, when frames ship with the data.
    fn encoded_image(&self, index: usize) -> Result<&[u8]> {
        Err(OverlayError::input(format!(
            "dataset has no embedded image {}",
            index
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMeta {
    #[serde(rename = "P0plane")]
    pub p0plane: [[f64; 4]; 4],
    pub image_width: u32,
    pub image_height: u32,
}

/// Reconstruction archive stored as a single JSON document.
///
/// Holes in `Z` are `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDataset {
    #[serde(default)]
    pub scale: Vec<f64>,
    #[serde(rename = "X_grid")]
    pub x_grid: Vec<Vec<f64>>,
    #[serde(rename = "Y_grid")]
    pub y_grid: Vec<Vec<f64>>,
    #[serde(rename = "Z")]
    pub z: Vec<Vec<Vec<Option<f64>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DatasetMeta>,
    #[serde(default, rename = "cam0images", skip_serializing_if = "Vec::is_empty")]
    pub cam0_images: Vec<Vec<u8>>,
}

impl JsonDataset {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<JsonDataset> {
        let path = path.as_ref();
        log::info!("Opening dataset {}", path.display());
        let dataset: JsonDataset = object_from_json(path)?;
        dataset.validate()?;
        Ok(dataset)
    }

    fn grid_shape(&self) -> (usize, usize) {
        let rows = self.x_grid.len();
        let cols = self.x_grid.first().map(|r| r.len()).unwrap_or(0);
        (rows, cols)
    }

    fn validate(&self) -> Result<()> {
        let (rows, cols) = self.grid_shape();
        let ragged = |g: &Vec<Vec<f64>>| g.len() != rows || g.iter().any(|r| r.len() != cols);
        if ragged(&self.x_grid) || ragged(&self.y_grid) {
            return Err(OverlayError::input("X_grid and Y_grid must share one rectangular shape"));
        }
        if let Some((i, _)) = self
            .z
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != rows || s.iter().any(|r| r.len() != cols))
        {
            return Err(OverlayError::input(format!(
                "Z slice {} does not match the {}x{} grid",
                i, rows, cols
            )));
        }
        Ok(())
    }
}

impl ElevationDataset for JsonDataset {
    fn baseline(&self) -> Option<f64> {
        self.scale.first().copied()
    }

    fn world_grid(&self) -> Result<WorldGrid> {
        let (rows, cols) = self.grid_shape();
        let xs: Vec<f64> = self.x_grid.iter().flatten().copied().collect();
        let ys: Vec<f64> = self.y_grid.iter().flatten().copied().collect();
        WorldGrid::from_millimetres(rows, cols, &xs, &ys)
    }

    fn len(&self) -> usize {
        self.z.len()
    }

    fn elevation(&self, index: usize) -> Result<ElevationGrid> {
        let slice = self.z.get(index).ok_or_else(|| {
            OverlayError::input(format!(
                "data index {} out of range (dataset has {} slices)",
                index,
                self.z.len()
            ))
        })?;
        let (rows, cols) = self.grid_shape();
        let z_mm: Vec<f64> = slice
            .iter()
            .flatten()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        ElevationGrid::from_millimetres(rows, cols, &z_mm)
    }

    fn embedded_projection(&self) -> Option<(na::Matrix4<f64>, u32, u32)> {
        self.meta.as_ref().map(|m| {
            let p = na::Matrix4::from_fn(|r, c| m.p0plane[r][c]);
            (p, m.image_width, m.image_height)
        })
    }

    fn encoded_image(&self, index: usize) -> Result<&[u8]> {
        self.cam0_images
            .get(index)
            .map(|v| v.as_slice())
            .ok_or_else(|| {
                OverlayError::input(format!(
                    "embedded image {} out of range ({} images)",
                    index,
                    self.cam0_images.len()
                ))
            })
    }
}
