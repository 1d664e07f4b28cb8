//! Camera capture for the kiosk: MJPEG frame extraction, byte sources and
//! the camera session that drives the live preview and snapshot capture.

pub mod camera;
pub mod check;
pub mod mjpeg;
pub mod source;

pub use camera::{Camera, Snapshot};
pub use mjpeg::MjpegExtractor;

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("failed to spawn capture process: {0}")]
    Spawn(std::io::Error),
    #[error("failed to read capture output: {0}")]
    Read(std::io::Error),
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("camera stream ended")]
    StreamEnded,
    #[error("no frame received within {0:?}")]
    NoFrame(Duration),
    #[error("failed to write snapshot {0}: {1}")]
    Snapshot(PathBuf, std::io::Error),
}
