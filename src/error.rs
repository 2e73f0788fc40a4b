use crate::plan::Orientation;
use thiserror::Error;

/// Failure of the hardware capture call. Interrupts the current batch.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("{orientation} shot {shot} failed: {message}")]
    Camera {
        orientation: Orientation,
        shot: u32,
        message: String,
    },
}

/// A required preset field was left empty. Raised before any store write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please fill in all fields ({0} is missing)")]
    MissingField(&'static str),
}
