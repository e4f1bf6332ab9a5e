//! Error types for screenwatch.

use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while building caches, matching or driving the engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Width that was rejected.
        width: usize,
        /// Height that was rejected.
        height: usize,
    },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride {
        /// Width in elements.
        width: usize,
        /// Stride in elements.
        stride: usize,
    },
    /// Backing buffer is too short for the requested view.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall {
        /// Minimum length required.
        needed: usize,
        /// Length that was provided.
        got: usize,
    },
    /// Region lies outside the image bounds.
    #[error("roi {width}x{height} at ({x}, {y}) outside {img_width}x{img_height}")]
    RoiOutOfBounds {
        /// ROI x origin.
        x: usize,
        /// ROI y origin.
        y: usize,
        /// ROI width.
        width: usize,
        /// ROI height.
        height: usize,
        /// Image width.
        img_width: usize,
        /// Image height.
        img_height: usize,
    },
    /// Template cannot be correlated (for example a flat color patch).
    #[error("degenerate template: {reason}")]
    DegenerateTemplate {
        /// Why the template was rejected.
        reason: &'static str,
    },
    /// Template and image plane layouts disagree.
    #[error("plane mismatch: template has {template} planes, image has {image}")]
    PlaneMismatch {
        /// Planes in the template plan.
        template: usize,
        /// Planes supplied by the image.
        image: usize,
    },
    /// Scale parameters are not usable.
    #[error("invalid scale: {reason}")]
    InvalidScale {
        /// Why the scale was rejected.
        reason: &'static str,
    },
    /// Loading or decoding an image failed.
    #[error("image io error for {path}: {reason}")]
    ImageIo {
        /// Path that failed to load.
        path: String,
        /// Decoder or filesystem message.
        reason: String,
    },
    /// Configuration is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A cache rebuild is already running; the request was dropped.
    #[error("cache rebuild already in progress")]
    RebuildInProgress,
    /// Quick timer slot outside `1..=9`.
    #[error("quick timer slot {slot} out of range 1..=9")]
    QuickTimerSlot {
        /// Rejected slot.
        slot: u8,
    },
    /// The worker pool could not be created or a worker disappeared.
    #[error("worker pool error: {0}")]
    Worker(String),
    /// Monitoring is already running or already stopped.
    #[error("monitoring state error: {0}")]
    Monitoring(&'static str),
}
