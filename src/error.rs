use thiserror::Error;

/// Errors raised while preparing or running an overlay sequence.
///
/// None of these are recovered from: the run stops at the first one and
/// frames already written stay on disk.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Invalid or missing run configuration (output dir, baseline, plane).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required input (calibration file, frame, data slice) is missing or unreadable.
    #[error("input access error: {0}")]
    InputAccess(String),

    /// A frame does not have the size fixed by the first frame of the run.
    #[error(
        "frame {index} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        index: usize,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OverlayError>;

impl OverlayError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        OverlayError::Configuration(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        OverlayError::InputAccess(msg.into())
    }
}
