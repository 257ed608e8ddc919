use std::path::{Path, PathBuf};
use std::process::Command;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{OverlayError, Result};
use crate::io::object_to_json;
use crate::pipeline::OverlayConfig;
use crate::types::{PixelMap, RenderedFrame};

pub const COMPOSITE_SUFFIX: &str = "_grid.png";
pub const REPORT_FILE: &str = "report.json";

#[derive(Serialize)]
struct PixelMapFile<'a> {
    width: u32,
    height: u32,
    /// Row-major, `null` where no surface point projects.
    px_2_3d: Vec<Option<&'a [f32; 3]>>,
}

/// Writes per-frame results into an existing output directory.
pub struct OutputSink {
    dir: PathBuf,
    save_undistorted: bool,
    save_pixel_map: bool,
}

impl OutputSink {
    /// Fails with a configuration error if `dir` is not an existing directory.
    pub fn new<P: Into<PathBuf>>(dir: P, save_undistorted: bool, save_pixel_map: bool) -> Result<OutputSink> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(OverlayError::config(format!(
                "output dir {} does not exist",
                dir.display()
            )));
        }
        Ok(OutputSink {
            dir,
            save_undistorted,
            save_pixel_map,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn composite_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{:08}{}", index, COMPOSITE_SUFFIX))
    }

    pub fn undistorted_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{:08}.png", index))
    }

    pub fn pixel_map_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{:08}_xyz.json", index))
    }

    pub fn write_frame(&self, index: usize, frame: &GrayImage, rendered: &RenderedFrame) -> Result<()> {
        if self.save_pixel_map {
            match &rendered.pixel_map {
                Some(map) => write_pixel_map(self.pixel_map_path(index), map)?,
                None => log::warn!("frame {}: backend returned no pixel map", index),
            }
        }
        rendered.image.save(self.composite_path(index))?;
        if self.save_undistorted {
            frame.save(self.undistorted_path(index))?;
        }
        Ok(())
    }

    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        let path = self.dir.join(REPORT_FILE);
        object_to_json(&path, report)?;
        Ok(path)
    }
}

pub fn write_pixel_map<P: AsRef<Path>>(path: P, map: &PixelMap) -> Result<()> {
    let file = PixelMapFile {
        width: map.width,
        height: map.height,
        px_2_3d: map
            .data
            .iter()
            .map(|p| if p[0].is_nan() { None } else { Some(p) })
            .collect(),
    };
    object_to_json(path, &file)
}

/// Summary written next to the frames once the loop finishes.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub baseline: Option<f64>,
    pub projection: [[f64; 4]; 4],
    pub reference_width: u32,
    pub reference_height: u32,
    pub frames_written: usize,
    pub first_image_index: Option<usize>,
    pub last_image_index: Option<usize>,
    pub video: Option<PathBuf>,
    pub config: OverlayConfig,
}

pub fn timestamp_now() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Fixed ffmpeg profile used to assemble the composites into a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub program: String,
    /// Input framerate of the image sequence.
    pub fps: f64,
    pub output_fps: u32,
    pub codec: String,
    pub pixel_format: String,
    pub width: u32,
    pub height: u32,
    pub preset: String,
    pub crf: u32,
    pub file_name: String,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            fps: 10.0,
            output_fps: 25,
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            width: 614,
            height: 514,
            preset: "slow".to_string(),
            crf: 22,
            file_name: "video.mp4".to_string(),
        }
    }
}

impl VideoProfile {
    pub fn with_fps(fps: f64) -> VideoProfile {
        VideoProfile {
            fps,
            ..Default::default()
        }
    }

    /// Arguments for encoding every `*_grid.png` in `dir`, in name order.
    pub fn args(&self, dir: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-r".to_string(),
            format!("{}", self.fps),
            "-pattern_type".to_string(),
            "glob".to_string(),
            "-i".to_string(),
            format!("{}/*{}", dir.display(), COMPOSITE_SUFFIX),
            "-c:v".to_string(),
            self.codec.clone(),
            "-vf".to_string(),
            format!(
                "fps={},format={},scale={}x{}",
                self.output_fps, self.pixel_format, self.width, self.height
            ),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            dir.join(&self.file_name).display().to_string(),
        ]
    }

    /// Runs the encoder and waits for it; returns the video path.
    pub fn encode(&self, dir: &Path) -> Result<PathBuf> {
        let args = self.args(dir);
        log::info!("Calling {} {}", self.program, args.join(" "));
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|e| OverlayError::input(format!("cannot run {}: {}", self.program, e)))?;
        if !status.success() {
            return Err(OverlayError::input(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(dir.join(&self.file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_reads_composites_by_glob() {
        let args = VideoProfile::with_fps(12.5).args(Path::new("/tmp/out"));
        assert_eq!(args[..3], ["-y", "-r", "12.5"]);
        assert!(args.contains(&"/tmp/out/*_grid.png".to_string()));
        assert!(args.contains(&"fps=25,format=yuv420p,scale=614x514".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out/video.mp4"));
    }

    #[test]
    fn index_keyed_names() {
        let dir = std::env::temp_dir();
        let sink = OutputSink::new(&dir, false, false).unwrap();
        assert!(sink.composite_path(42).ends_with("00000042_grid.png"));
        assert!(sink.undistorted_path(7).ends_with("00000007.png"));
        assert!(sink.pixel_map_path(7).ends_with("00000007_xyz.json"));
    }
}
