pub mod dataset;
pub mod error;
pub mod frame_source;
pub mod io;
pub mod output;
pub mod pipeline;
pub mod plane;
pub mod projection;
pub mod render;
pub mod sequencer;
pub mod types;
pub mod undistort;
pub mod visualization;

pub use error::{OverlayError, Result};
