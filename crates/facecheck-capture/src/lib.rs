//! facecheck-capture: frame sources for the verification pipeline.
//!
//! Still images and directory sequences are always available; V4L2 webcam
//! capture is behind the `v4l` feature.

#[cfg(feature = "v4l")]
pub mod camera;
pub mod convert;
pub mod source;

#[cfg(feature = "v4l")]
pub use camera::{CameraError, CameraParams, CameraSource, DeviceInfo};
pub use source::{DirectorySource, ImageSource, SourceError, StillImageSource};
