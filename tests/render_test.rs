use image::{GrayImage, Luma};
use nalgebra as na;
use wave_field_overlay::projection::ProjectionMatrix;
use wave_field_overlay::render::{FieldSetup, RenderOptions, Renderer, SoftwareRenderer};
use wave_field_overlay::types::{ElevationGrid, WorldGrid};
use wave_field_overlay::visualization::elevation_color;

const SIZE: u32 = 40;
const GRAY: u8 = 100;

/// Orthographic view from above: NDC = (x, y), depth 1 everywhere.
fn top_down() -> ProjectionMatrix {
    #[rustfmt::skip]
    let m = na::Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
        0.0, 0.0, 0.0, 1.0,
    );
    ProjectionMatrix::from_matrix(m, SIZE, SIZE).unwrap()
}

fn grid() -> WorldGrid {
    let ticks = [-0.5, 0.0, 0.5];
    let x = (0..9).map(|i| ticks[i % 3]).collect();
    let y = (0..9).map(|i| ticks[i / 3]).collect();
    WorldGrid::new(3, 3, x, y).unwrap()
}

fn renderer(options: RenderOptions) -> Renderer<SoftwareRenderer> {
    let grid = grid();
    let projection = top_down();
    let mut r = Renderer::new(SoftwareRenderer::new());
    r.configure(
        SIZE,
        SIZE,
        &options,
        &FieldSetup {
            grid: &grid,
            projection: &projection,
            zmin: -1.0,
            zmax: 1.0,
            alpha: 1.0,
        },
    )
    .unwrap();
    r
}

fn frame() -> GrayImage {
    GrayImage::from_pixel(SIZE, SIZE, Luma([GRAY]))
}

fn flat(z: f64) -> ElevationGrid {
    ElevationGrid::new(3, 3, vec![z; 9]).unwrap()
}

#[test]
fn test_shaded_surface_and_pixel_map() {
    let mut r = renderer(RenderOptions {
        wireframe: false,
        pixel_scale: 1.0,
        pixel_map: true,
    });
    let out = r.render(0, &frame(), &flat(0.4)).unwrap();
    assert_eq!(out.image.dimensions(), (SIZE, SIZE));

    // inside the grid footprint
    assert_eq!(out.image.get_pixel(22, 25).0, elevation_color(0.4, -1.0, 1.0));
    let map = out.pixel_map.unwrap();
    let p = map.get(22, 25).unwrap();
    assert!((p[0] - 0.125).abs() < 1e-5, "{:?}", p);
    assert!((p[1] - 0.275).abs() < 1e-5, "{:?}", p);
    assert!((p[2] - 0.4).abs() < 1e-6);

    // outside it
    assert_eq!(out.image.get_pixel(2, 2).0, [GRAY; 3]);
    assert_eq!(map.get(2, 2), None);
    assert!(map.valid_count() > 0);
    assert!(map.valid_count() < (SIZE * SIZE) as usize);
}

#[test]
fn test_wireframe_draws_edges_only() {
    let mut r = renderer(RenderOptions {
        wireframe: true,
        pixel_scale: 1.0,
        pixel_map: false,
    });
    let out = r.render(0, &frame(), &flat(-0.2)).unwrap();
    assert!(out.pixel_map.is_none());
    // on the y = 0 edge
    assert_eq!(out.image.get_pixel(15, 20).0, elevation_color(-0.2, -1.0, 1.0));
    // between edges the frame shows through
    assert_eq!(out.image.get_pixel(15, 15).0, [GRAY; 3]);
}

#[test]
fn test_holes_leave_frame_untouched() {
    let mut r = renderer(RenderOptions {
        wireframe: false,
        pixel_scale: 1.0,
        pixel_map: true,
    });
    let out = r.render(0, &frame(), &flat(f64::NAN)).unwrap();
    assert!(out.image.pixels().all(|p| p.0 == [GRAY; 3]));
    assert_eq!(out.pixel_map.unwrap().valid_count(), 0);
}

#[test]
fn test_supersampled_canvas_keeps_frame_size() {
    let mut r = renderer(RenderOptions {
        wireframe: false,
        pixel_scale: 2.0,
        pixel_map: true,
    });
    let out = r.render(0, &frame(), &flat(0.0)).unwrap();
    assert_eq!(out.image.dimensions(), (SIZE, SIZE));
    let map = out.pixel_map.unwrap();
    assert_eq!((map.width, map.height), (SIZE, SIZE));
    let p = map.get(19, 21).unwrap();
    assert!(p[0].abs() < 0.1 && p[1].abs() < 0.1, "{:?}", p);
}

#[test]
fn test_surface_behind_camera_is_culled() {
    // depth row flips sign: every node ends up behind the camera
    #[rustfmt::skip]
    let m = na::Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, -1.0,
        0.0, 0.0, 0.0, 1.0,
    );
    let projection = ProjectionMatrix::from_matrix(m, SIZE, SIZE).unwrap();
    let grid = grid();
    let mut r = Renderer::new(SoftwareRenderer::new());
    r.configure(
        SIZE,
        SIZE,
        &RenderOptions::default(),
        &FieldSetup {
            grid: &grid,
            projection: &projection,
            zmin: -1.0,
            zmax: 1.0,
            alpha: 1.0,
        },
    )
    .unwrap();
    let out = r.render(0, &frame(), &flat(0.0)).unwrap();
    assert!(out.image.pixels().all(|p| p.0 == [GRAY; 3]));
}

#[test]
fn test_mismatched_elevation_grid() {
    let mut r = renderer(RenderOptions::default());
    let bad = ElevationGrid::new(2, 2, vec![0.0; 4]).unwrap();
    assert!(r.render(0, &frame(), &bad).is_err());
}

#[test]
fn test_invalid_field_setup() {
    let grid = grid();
    let projection = top_down();
    for (zmin, zmax, alpha) in [(1.0, 1.0, 0.5), (0.0, 1.0, 1.5)] {
        let mut r = Renderer::new(SoftwareRenderer::new());
        let setup = FieldSetup {
            grid: &grid,
            projection: &projection,
            zmin,
            zmax,
            alpha,
        };
        assert!(r.configure(SIZE, SIZE, &RenderOptions::default(), &setup).is_err());
    }
}

#[test]
fn test_node_at_camera_plane_is_clipped() {
    // identity projection: depth is z, so the 1e-9 node lands ~1e9 pixels away
    let projection = ProjectionMatrix::from_matrix(na::Matrix4::identity(), 8, 8).unwrap();
    let grid = WorldGrid::new(2, 2, vec![-0.5, 0.5, -0.5, 0.5], vec![-0.5, -0.5, 0.5, 0.5]).unwrap();
    let mut r = Renderer::new(SoftwareRenderer::new());
    r.configure(
        8,
        8,
        &RenderOptions {
            wireframe: true,
            pixel_scale: 1.0,
            pixel_map: false,
        },
        &FieldSetup {
            grid: &grid,
            projection: &projection,
            zmin: -1.0,
            zmax: 1.0,
            alpha: 1.0,
        },
    )
    .unwrap();
    let elevation = ElevationGrid::new(2, 2, vec![1.0, 1e-9, 1.0, 1.0]).unwrap();
    let out = r
        .render(0, &GrayImage::from_pixel(8, 8, Luma([GRAY])), &elevation)
        .unwrap();
    assert_eq!(out.image.dimensions(), (8, 8));
    // the edge between the two on-canvas nodes of the first column
    assert_eq!(out.image.get_pixel(2, 4).0, elevation_color(1.0, -1.0, 1.0));
}

#[test]
fn test_supersampling_keeps_frame_detail() {
    let mut r = renderer(RenderOptions {
        wireframe: false,
        pixel_scale: 2.0,
        pixel_map: false,
    });
    let checker = GrayImage::from_fn(SIZE, SIZE, |x, y| Luma([if (x + y) % 2 == 0 { 20 } else { 220 }]));
    let out = r.render(0, &checker, &flat(0.0)).unwrap();
    // away from the grid footprint the frame comes through unresampled
    for (x, y) in [(2, 2), (3, 2), (2, 3), (37, 38), (38, 38)] {
        let v = checker.get_pixel(x, y)[0];
        assert_eq!(out.image.get_pixel(x, y).0, [v; 3], "({}, {})", x, y);
    }
    assert_eq!(out.image.get_pixel(20, 20).0, elevation_color(0.0, -1.0, 1.0));
}
