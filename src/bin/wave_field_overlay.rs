use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use wave_field_overlay::dataset::JsonDataset;
use wave_field_overlay::frame_source::FrameSource;
use wave_field_overlay::io::{read_camera_pose, read_plane_file};
use wave_field_overlay::output::{OutputSink, VideoProfile};
use wave_field_overlay::pipeline::{OverlayConfig, ProjectionSource, RunInputs, run};
use wave_field_overlay::render::{RenderOptions, Renderer, SoftwareRenderer};
use wave_field_overlay::undistort::CameraCalibration;
use wave_field_overlay::visualization::RerunLog;

#[derive(Parser)]
#[command(version, about, author)]
struct WfoCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Frames read from an image directory, projection built from plane and camera files
    Files {
        /// Input reconstruction dataset (JSON)
        dataset: PathBuf,
        /// Image directory, files named <index:06>_*.*
        camdir: PathBuf,
        /// Calibration dir with intrinsics_00.xml and distortion_00.xml
        configdir: PathBuf,
        /// Mean sea-plane definition file
        planefile: PathBuf,
        /// Camera projection matrix (3x4 or 4x4 text file)
        camera_pose: PathBuf,
        /// Output dir
        out: PathBuf,
        /// Last image index to process (exclusive)
        #[arg(short, long, default_value_t = 1)]
        last_index: i64,
        /// Output image reduction scale
        #[arg(long, default_value_t = 2.0)]
        scale: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Frames and projection matrix embedded in the dataset
    Embedded {
        /// Input reconstruction dataset (JSON)
        dataset: PathBuf,
        /// Output dir
        out: PathBuf,
        /// Last image index to process, exclusive (-1 to process all the frames)
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        last_index: i64,
        /// Output image reduction scale
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// First image index to process
    #[arg(short, long, default_value_t = 0)]
    first_index: usize,
    /// Sequence step
    #[arg(short, long, default_value_t = 1)]
    step_index: usize,
    /// First data index (defaults to the first image index)
    #[arg(long)]
    first_data_index: Option<usize>,
    /// Sequence data step
    #[arg(long, default_value_t = 1)]
    step_data_index: usize,
    /// Baseline of the stereo system, overrides the dataset value
    #[arg(short, long)]
    baseline: Option<f64>,
    /// Minimum 3D point elevation (colorbar limit)
    #[arg(long, default_value_t = -3.0, allow_negative_numbers = true)]
    zmin: f64,
    /// Maximum 3D point elevation (colorbar limit)
    #[arg(long, default_value_t = 3.0, allow_negative_numbers = true)]
    zmax: f64,
    /// Surface transparency [0..1]
    #[arg(long, default_value_t = 0.5)]
    alpha: f64,
    /// Render pixel scale
    #[arg(long, default_value_t = 1.0)]
    pxscale: f64,
    /// Render shaded surface instead of wireframe
    #[arg(long)]
    no_wireframe: bool,
    /// Save mapping between image pixels and 3D coordinates
    #[arg(long)]
    savexyz: bool,
    /// Save the undistorted image (without the superimposed grid)
    #[arg(long)]
    saveimg: bool,
    /// Call ffmpeg to create a sequence video file
    #[arg(long)]
    ffmpeg: bool,
    /// Sequence framerate
    #[arg(long, default_value_t = 10.0)]
    ffmpeg_fps: f64,
    /// Also record composites to a rerun .rrd file
    #[arg(long)]
    rerun: Option<PathBuf>,
}

impl CommonArgs {
    fn to_config(&self, last_index: i64, scale: f64) -> OverlayConfig {
        OverlayConfig {
            first_index: self.first_index,
            last_index: (last_index >= 0).then_some(last_index as usize),
            step_index: self.step_index,
            first_data_index: self.first_data_index,
            step_data_index: self.step_data_index,
            baseline: self.baseline,
            scale,
            zmin: self.zmin,
            zmax: self.zmax,
            alpha: self.alpha,
            render: RenderOptions {
                wireframe: !self.no_wireframe,
                pixel_scale: self.pxscale,
                pixel_map: self.savexyz,
            },
            save_undistorted: self.saveimg,
            video: self.ffmpeg.then(|| VideoProfile::with_fps(self.ffmpeg_fps)),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = WfoCli::parse();

    let (out, config, common) = match &cli.command {
        Commands::Files {
            out,
            last_index,
            scale,
            common,
            ..
        }
        | Commands::Embedded {
            out,
            last_index,
            scale,
            common,
            ..
        } => (out, common.to_config(*last_index, *scale), common),
    };

    let sink = match OutputSink::new(out, config.save_undistorted, config.render.pixel_map) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    log::info!("Output renderings and data will be saved in: {}", out.display());

    let rerun = common.rerun.as_ref().map(RerunLog::save).transpose()?;
    let mut renderer = Renderer::new(SoftwareRenderer::new());

    let report = match &cli.command {
        Commands::Files {
            dataset,
            camdir,
            configdir,
            planefile,
            camera_pose,
            ..
        } => {
            let dataset = JsonDataset::open(dataset)?;
            let inputs = RunInputs {
                dataset: &dataset,
                frames: FrameSource::filesystem(camdir, config.first_index),
                projection: ProjectionSource::Compose {
                    plane: read_plane_file(planefile)?,
                    camera_pose: read_camera_pose(camera_pose)?,
                },
                calibration: Some(CameraCalibration::load(configdir)?),
            };
            run(&config, &inputs, &mut renderer, &sink, rerun.as_ref())?
        }
        Commands::Embedded { dataset, .. } => {
            let dataset = JsonDataset::open(dataset)?;
            let inputs = RunInputs {
                dataset: &dataset,
                frames: FrameSource::embedded(&dataset, config.first_index),
                projection: ProjectionSource::Embedded,
                calibration: None,
            };
            run(&config, &inputs, &mut renderer, &sink, rerun.as_ref())?
        }
    };
    println!("rendered {} frames into {}", report.frames_written, out.display());
    Ok(())
}
