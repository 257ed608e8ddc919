use std::path::{Path, PathBuf};

use glob::glob;
use image::{GrayImage, ImageReader};

use crate::dataset::ElevationDataset;
use crate::error::{OverlayError, Result};

/// Where the camera frames of a run come from.
pub enum FrameSource<'a> {
    /// One file per frame in a directory, named `<index:06>_<anything>.<ext>`.
    Filesystem {
        dir: PathBuf,
        reference_index: usize,
    },
    /// Encoded frames stored inside the reconstruction dataset.
    Embedded {
        dataset: &'a dyn ElevationDataset,
        reference_index: usize,
    },
}

/// First file matching `<dir>/<index:06>_*.*`, in lexical order.
pub fn find_frame_file(dir: &Path, index: usize) -> Result<PathBuf> {
    let pattern = format!("{}/{:06}_*.*", glob::Pattern::escape(&dir.to_string_lossy()), index);
    let paths = glob(&pattern).map_err(|e| OverlayError::input(format!("{}: {}", pattern, e)))?;
    let mut sorted_path: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
    sorted_path.sort();
    sorted_path.into_iter().next().ok_or_else(|| {
        OverlayError::input(format!("no image for index {} in {}", index, dir.display()))
    })
}

impl FrameSource<'_> {
    pub fn filesystem<P: Into<PathBuf>>(dir: P, reference_index: usize) -> FrameSource<'static> {
        FrameSource::Filesystem {
            dir: dir.into(),
            reference_index,
        }
    }

    pub fn embedded(dataset: &dyn ElevationDataset, reference_index: usize) -> FrameSource<'_> {
        FrameSource::Embedded {
            dataset,
            reference_index,
        }
    }

    /// Decodes frame `index` as 8-bit grayscale, untouched otherwise.
    pub fn load(&self, index: usize) -> Result<GrayImage> {
        match self {
            FrameSource::Filesystem { dir, .. } => {
                let path = find_frame_file(dir, index)?;
                log::trace!("loading {}", path.display());
                let img = ImageReader::open(&path)
                    .map_err(|e| OverlayError::input(format!("{}: {}", path.display(), e)))?
                    .with_guessed_format()?
                    .decode()?;
                Ok(img.to_luma8())
            }
            FrameSource::Embedded { dataset, .. } => {
                let bytes = dataset.encoded_image(index)?;
                Ok(image::load_from_memory(bytes)?.to_luma8())
            }
        }
    }

    /// Size of the frames this source yields, before any resizing.
    ///
    /// Always taken from the decoded reference frame. A frame size stored
    /// with an embedded dataset that disagrees is only reported.
    pub fn reference_dimensions(&self) -> Result<(u32, u32)> {
        let (dataset, reference_index) = match self {
            FrameSource::Embedded {
                dataset,
                reference_index,
            } => (Some(*dataset), *reference_index),
            FrameSource::Filesystem {
                reference_index, ..
            } => (None, *reference_index),
        };
        let dims = self.load(reference_index)?.dimensions();
        if let Some((_, w, h)) = dataset.and_then(|d| d.embedded_projection()) {
            if (w, h) != dims {
                log::warn!(
                    "dataset metadata says {}x{} but frame {} is {}x{}, using the frame size",
                    w,
                    h,
                    reference_index,
                    dims.0,
                    dims.1
                );
            }
        }
        Ok(dims)
    }
}
