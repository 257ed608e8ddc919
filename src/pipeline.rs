//! The frame loop: decode, look up elevation, render, persist, one frame at a time.

use image::GrayImage;
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::dataset::ElevationDataset;
use crate::error::{OverlayError, Result};
use crate::frame_source::FrameSource;
use crate::output::{OutputSink, RunReport, VideoProfile, timestamp_now};
use crate::plane::{SeaPlane, derive_extrinsic};
use crate::projection::{ProjectionMatrix, compose};
use crate::render::{FieldSetup, RenderBackend, RenderOptions, Renderer};
use crate::sequencer::FrameSequencer;
use crate::undistort::{CameraCalibration, UndistortMap, downscale, init_undistort_map, undistort};
use crate::visualization::RerunLog;

/// Everything that tunes a run, independent of where the inputs live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub first_index: usize,
    /// Exclusive; `None` runs up to the number of elevation slices.
    pub last_index: Option<usize>,
    pub step_index: usize,
    /// Defaults to `first_index`.
    pub first_data_index: Option<usize>,
    pub step_data_index: usize,
    /// Overrides the baseline stored with the dataset.
    pub baseline: Option<f64>,
    /// Frames are shrunk by `1/scale` before rendering.
    pub scale: f64,
    pub zmin: f64,
    pub zmax: f64,
    pub alpha: f64,
    pub render: RenderOptions,
    pub save_undistorted: bool,
    pub video: Option<VideoProfile>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            first_index: 0,
            last_index: None,
            step_index: 1,
            first_data_index: None,
            step_data_index: 1,
            baseline: None,
            scale: 1.0,
            zmin: -3.0,
            zmax: 3.0,
            alpha: 0.5,
            render: RenderOptions::default(),
            save_undistorted: false,
            video: None,
        }
    }
}

impl OverlayConfig {
    pub fn sequencer(&self, data_len: usize) -> Result<FrameSequencer> {
        FrameSequencer::new(
            self.first_index,
            self.last_index.unwrap_or(data_len),
            self.step_index,
            self.first_data_index.unwrap_or(self.first_index),
            self.step_data_index,
        )
    }
}

/// How the run obtains its projection matrix.
pub enum ProjectionSource {
    /// Built from the sea plane and camera matrix, using the reference frame size.
    Compose {
        plane: SeaPlane,
        camera_pose: na::Matrix4<f64>,
    },
    /// Stored with the dataset together with its frame size.
    Embedded,
}

pub struct RunInputs<'a> {
    pub dataset: &'a dyn ElevationDataset,
    pub frames: FrameSource<'a>,
    pub projection: ProjectionSource,
    /// When set, frames are undistorted before rendering.
    pub calibration: Option<CameraCalibration>,
}

/// Override first, then the dataset value; must be finite and nonzero.
pub fn resolve_baseline(overridden: Option<f64>, stored: Option<f64>) -> Result<f64> {
    let baseline = match (overridden, stored) {
        (Some(b), _) => b,
        (None, Some(b)) => {
            log::info!("Loading baseline from dataset");
            b
        }
        (None, None) => {
            return Err(OverlayError::config(
                "no stereo baseline in the dataset, pass one with -b",
            ));
        }
    };
    if baseline == 0.0 || !baseline.is_finite() {
        return Err(OverlayError::config(format!(
            "stereo baseline must be finite and nonzero, got {}",
            baseline
        )));
    }
    Ok(baseline)
}

/// Turns a decoded frame into what the renderer draws on.
struct FramePrep<'a> {
    projection: &'a ProjectionMatrix,
    undistort_map: Option<UndistortMap>,
    scale: f64,
}

impl FramePrep<'_> {
    fn prepare(&self, index: usize, raw: GrayImage) -> Result<GrayImage> {
        self.projection.check_dimensions(index, raw.width(), raw.height())?;
        let img = match &self.undistort_map {
            Some(map) => undistort(raw, map),
            None => raw,
        };
        Ok(downscale(img, self.scale))
    }
}

/// Runs the whole sequence and writes the report.
///
/// Frames are processed strictly in increasing image index. The first error
/// aborts the run; frames written until then are kept.
pub fn run<B: RenderBackend>(
    config: &OverlayConfig,
    inputs: &RunInputs,
    renderer: &mut Renderer<B>,
    sink: &OutputSink,
    rerun: Option<&RerunLog>,
) -> Result<RunReport> {
    if !(config.scale > 0.0) || !config.scale.is_finite() {
        return Err(OverlayError::config(format!(
            "output scale must be positive, got {}",
            config.scale
        )));
    }
    let dataset = inputs.dataset;
    let grid = dataset.world_grid()?;
    let (ref_w, ref_h) = inputs.frames.reference_dimensions()?;

    let (baseline, projection) = match &inputs.projection {
        ProjectionSource::Compose { plane, camera_pose } => {
            let baseline = resolve_baseline(config.baseline, dataset.baseline())?;
            log::info!("Stereo baseline: {} (use -b option to change)", baseline);
            let extrinsic = derive_extrinsic(plane)?;
            let p = compose(camera_pose, &extrinsic, baseline, ref_w, ref_h)?;
            (Some(baseline), p)
        }
        ProjectionSource::Embedded => {
            let (m, _, _) = dataset
                .embedded_projection()
                .ok_or_else(|| OverlayError::config("dataset carries no projection matrix"))?;
            let baseline = resolve_baseline(config.baseline, dataset.baseline()).ok();
            (baseline, ProjectionMatrix::from_matrix(m, ref_w, ref_h)?)
        }
    };
    log::debug!("projection matrix: {}", projection.matrix());

    let prep = FramePrep {
        projection: &projection,
        undistort_map: inputs
            .calibration
            .as_ref()
            .map(|c| init_undistort_map(c, ref_w, ref_h)),
        scale: config.scale,
    };

    let sequencer = config.sequencer(dataset.len())?;
    let mut report = RunReport {
        timestamp: timestamp_now(),
        baseline,
        projection: std::array::from_fn(|r| std::array::from_fn(|c| projection.matrix()[(r, c)])),
        reference_width: ref_w,
        reference_height: ref_h,
        frames_written: 0,
        first_image_index: None,
        last_image_index: None,
        video: None,
        config: config.clone(),
    };

    let mut pairs = sequencer.iter();
    let Some(first) = pairs.next() else {
        log::warn!("image index range is empty, nothing to render");
        sink.write_report(&report)?;
        return Ok(report);
    };

    // the first frame fixes the render size before the loop starts
    let first_frame = prep.prepare(first.image_index, inputs.frames.load(first.image_index)?)?;
    renderer.configure(
        first_frame.width(),
        first_frame.height(),
        &config.render,
        &FieldSetup {
            grid: &grid,
            projection: &projection,
            zmin: config.zmin,
            zmax: config.zmax,
            alpha: config.alpha,
        },
    )?;

    log::info!("Rendering grid data...");
    let pb = ProgressBar::new(sequencer.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} frames [{elapsed_precise}<{eta_precise}]") {
        pb.set_style(style);
    }
    let mut prefetched = Some(first_frame);
    for pair in std::iter::once(first).chain(pairs) {
        let frame = match prefetched.take() {
            Some(f) => f,
            None => prep.prepare(pair.image_index, inputs.frames.load(pair.image_index)?)?,
        };
        let elevation = dataset.elevation(pair.data_index)?;
        log::trace!("image {} <- data {}", pair.image_index, pair.data_index);

        let rendered = renderer.render(pair.image_index, &frame, &elevation)?;
        sink.write_frame(pair.image_index, &frame, &rendered)?;
        if let Some(rr) = rerun {
            rr.log_frame(
                pair.image_index,
                &rendered.image,
                &grid,
                &elevation,
                (config.zmin, config.zmax),
            )?;
        }

        report.frames_written += 1;
        report.first_image_index.get_or_insert(pair.image_index);
        report.last_image_index = Some(pair.image_index);
        pb.inc(1);
    }
    pb.finish();

    if let Some(profile) = &config.video {
        match profile.encode(sink.dir()) {
            Ok(path) => report.video = Some(path),
            Err(e) => log::error!("video encoding failed: {}", e),
        }
    }
    let path = sink.write_report(&report)?;
    log::info!("{} frames written, report in {}", report.frames_written, path.display());
    Ok(report)
}
