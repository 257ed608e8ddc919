use image::{GrayImage, ImageFormat, Luma};
use nalgebra as na;
use std::io::Cursor;
use wave_field_overlay::dataset::{DatasetMeta, JsonDataset};
use wave_field_overlay::frame_source::FrameSource;
use wave_field_overlay::io::object_to_json;
use wave_field_overlay::output::OutputSink;
use wave_field_overlay::pipeline::{OverlayConfig, ProjectionSource, RunInputs, run};
use wave_field_overlay::plane::{SeaPlane, derive_extrinsic};
use wave_field_overlay::projection::compose;
use wave_field_overlay::render::{RenderOptions, Renderer, SoftwareRenderer};

const W: u32 = 640;
const H: u32 = 480;
const FRAMES: usize = 24;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // reference camera at the origin, sea plane 10 baselines ahead
    let k = na::Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
    let mut pose = na::Matrix4::identity();
    pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&k);
    let n = na::Vector3::new(0.01, -0.02, 1.0).normalize();
    let plane = SeaPlane::new(n.x, n.y, n.z, -10.0);
    let baseline = 2.5;
    let p = compose(&pose, &derive_extrinsic(&plane).unwrap(), baseline, W, H).unwrap();

    let (rows, cols) = (40, 60);
    let x_grid: Vec<Vec<f64>> = (0..rows)
        .map(|_| (0..cols).map(|c| (c as f64 - 30.0) * 250.0).collect())
        .collect();
    let y_grid: Vec<Vec<f64>> = (0..rows)
        .map(|r| vec![(r as f64 - 20.0) * 250.0; cols])
        .collect();
    let z: Vec<Vec<Vec<Option<f64>>>> = (0..FRAMES)
        .map(|f| {
            let phase = f as f64 * 0.35;
            (0..rows)
                .map(|r| {
                    (0..cols)
                        .map(|c| {
                            let (x, y) = (x_grid[r][c] / 1000.0, y_grid[r][c] / 1000.0);
                            let h = 0.8 * (0.6 * x + 0.2 * y - phase).sin()
                                + 0.3 * (1.3 * y - 0.4 * x - 1.7 * phase).cos();
                            Some(h * 1000.0)
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    let cam0_images: Vec<Vec<u8>> = (0..FRAMES)
        .map(|f| {
            let img = GrayImage::from_fn(W, H, |x, y| {
                let v = 60.0 + 40.0 * ((x as f64 + 7.0 * f as f64) * 0.05).sin() + y as f64 * 0.2;
                Luma([v.clamp(0.0, 255.0) as u8])
            });
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
            bytes
        })
        .collect();

    let dataset = JsonDataset {
        scale: vec![baseline],
        x_grid,
        y_grid,
        z,
        meta: Some(DatasetMeta {
            p0plane: std::array::from_fn(|r| std::array::from_fn(|c| p.matrix()[(r, c)])),
            image_width: W,
            image_height: H,
        }),
        cam0_images,
    };

    let out = std::path::Path::new("synthetic_swell_out");
    std::fs::create_dir_all(out).unwrap();
    object_to_json(out.join("dataset.json"), &dataset).unwrap();

    let inputs = RunInputs {
        dataset: &dataset,
        frames: FrameSource::embedded(&dataset, 0),
        projection: ProjectionSource::Embedded,
        calibration: None,
    };
    let config = OverlayConfig {
        zmin: -1.2,
        zmax: 1.2,
        render: RenderOptions {
            wireframe: true,
            pixel_scale: 2.0,
            pixel_map: false,
        },
        ..Default::default()
    };
    let sink = OutputSink::new(out, false, false).unwrap();
    let mut renderer = Renderer::new(SoftwareRenderer::new());
    let report = run(&config, &inputs, &mut renderer, &sink, None).unwrap();
    println!("{} frames in {}", report.frames_written, out.display());
}
