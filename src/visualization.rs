use std::io::Cursor;
use std::path::Path;

use image::RgbImage;
use rerun::{RecordingStream, TimeCell};

use crate::error::{OverlayError, Result};
use crate::types::{ElevationGrid, WorldGrid};

/// Colour of elevation `z` on the turbo ramp, clamped to `[zmin, zmax]`.
pub fn elevation_color(z: f64, zmin: f64, zmax: f64) -> [u8; 3] {
    let span = zmax - zmin;
    let t = if span > 0.0 { (z - zmin) / span } else { 0.5 };
    let c = colorous::TURBO.eval_continuous(t.clamp(0.0, 1.0));
    [c.r, c.g, c.b]
}

/// Streams composite frames (and the surface they were drawn from) to a rerun recording.
pub struct RerunLog {
    recording: RecordingStream,
}

impl RerunLog {
    pub fn save<P: AsRef<Path>>(path: P) -> Result<RerunLog> {
        let recording = rerun::RecordingStreamBuilder::new("wave_field_overlay")
            .save(path.as_ref())
            .map_err(|e| OverlayError::config(format!("cannot open rerun recording: {}", e)))?;
        Ok(RerunLog { recording })
    }

    pub fn log_frame(
        &self,
        image_index: usize,
        composite: &RgbImage,
        grid: &WorldGrid,
        elevation: &ElevationGrid,
        z_range: (f64, f64),
    ) -> Result<()> {
        self.recording
            .set_time("frame", TimeCell::from_sequence(image_index as i64));

        let mut bytes: Vec<u8> = Vec::new();
        composite.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        let img = rerun::Image::from_file_contents(bytes, None);
        self.recording
            .log("overlay/image", &img)
            .map_err(|e| OverlayError::config(format!("rerun log: {}", e)))?;

        let (pts, colors): (Vec<_>, Vec<_>) = elevation
            .z
            .iter()
            .enumerate()
            .filter(|(_, z)| z.is_finite())
            .map(|(i, z)| {
                let [r, g, b] = elevation_color(*z, z_range.0, z_range.1);
                (
                    (grid.x[i] as f32, grid.y[i] as f32, *z as f32),
                    rerun::Color::from_rgb(r, g, b),
                )
            })
            .unzip();
        self.recording
            .log("surface/points", &rerun::Points3D::new(pts).with_colors(colors))
            .map_err(|e| OverlayError::config(format!("rerun log: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_clamp_to_range_ends() {
        assert_eq!(elevation_color(-10.0, -3.0, 3.0), elevation_color(-3.0, -3.0, 3.0));
        assert_eq!(elevation_color(10.0, -3.0, 3.0), elevation_color(3.0, -3.0, 3.0));
        assert_ne!(elevation_color(-3.0, -3.0, 3.0), elevation_color(3.0, -3.0, 3.0));
    }
}
