//! V4L2 webcam capture via the `v4l` crate.

use crate::convert::{self, grey_to_rgb, yuyv_to_rgb};
use crate::source::{ImageSource, SourceError};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Share of near-black pixels above which a frame is treated as unexposed.
const DARK_FRAME_RATIO: f32 = 0.95;
/// Frames tried after warm-up before giving up on a dark stream.
const DARK_FRAME_RETRIES: usize = 10;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no such device: {0}")]
    NoDevice(String),
    #[error("{device} is in use by another process")]
    Busy { device: String },
    #[error("cannot open {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("{device} offers none of YUYV, MJPG, GREY (got {offered})")]
    UnsupportedFormat { device: String, offered: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("only dark frames after {0} attempts")]
    AllFramesDark(usize),
}

/// A capture device found by [`CameraSource::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the source can convert, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpg,
    Grey,
}

impl PixelFormat {
    const PREFERENCE: [PixelFormat; 3] = [PixelFormat::Yuyv, PixelFormat::Mjpg, PixelFormat::Grey];

    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Mjpg => FourCC::new(b"MJPG"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
        }
    }

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|f| f.fourcc() == fourcc)
    }

    /// Decode one driver buffer into RGB.
    fn decode(self, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, CameraError> {
        let decoded = match self {
            PixelFormat::Yuyv => yuyv_to_rgb(buf, width, height).map_err(|e| e.to_string()),
            PixelFormat::Grey => grey_to_rgb(buf, width, height).map_err(|e| e.to_string()),
            PixelFormat::Mjpg => image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| CameraError::Decode(format!("{self:?}: {reason}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    pub width: u32,
    pub height: u32,
    /// Frames discarded after stream start while exposure settles.
    pub warmup_frames: usize,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self { width: 640, height: 480, warmup_frames: 5 }
    }
}

/// Webcam frame source. Each [`ImageSource::next_frame`] call starts a short
/// stream, skips warm-up and dark frames, and returns the first usable one.
pub struct CameraSource {
    device: Device,
    path: String,
    format: PixelFormat,
    width: u32,
    height: u32,
    warmup_frames: usize,
}

impl CameraSource {
    /// Open `path` (e.g. "/dev/video0") and settle on the first supported
    /// pixel format the driver accepts at the requested size.
    pub fn open(path: &str, params: &CameraParams) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::NoDevice(path.to_string()));
        }

        let device = Device::with_path(path).map_err(|e| match e.raw_os_error() {
            Some(16) => CameraError::Busy { device: path.to_string() },
            _ => CameraError::Open { device: path.to_string(), reason: e.to_string() },
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::Open { device: path.to_string(), reason: e.to_string() })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(path.to_string()));
        }

        let (format, width, height) = negotiate(&device, path, params)?;
        tracing::info!(
            device = path,
            card = %caps.card,
            format = ?format,
            width,
            height,
            "camera ready"
        );

        Ok(Self {
            device,
            path: path.to_string(),
            format,
            width,
            height,
            warmup_frames: params.warmup_frames,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Negotiated frame size.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Capture one RGB frame, discarding warm-up and dark frames.
    pub fn capture(&self) -> Result<RgbImage, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::Stream(format!("mmap setup: {e}")))?;

        for _ in 0..self.warmup_frames {
            stream.next().map_err(|e| CameraError::Stream(e.to_string()))?;
        }

        for _ in 0..DARK_FRAME_RETRIES {
            let (buf, meta) = stream.next().map_err(|e| CameraError::Stream(e.to_string()))?;
            let frame = self.format.decode(buf, self.width, self.height)?;
            if !convert::is_dark_frame(&frame, DARK_FRAME_RATIO) {
                return Ok(frame);
            }
            tracing::debug!(sequence = meta.sequence, "dark frame skipped");
        }

        Err(CameraError::AllFramesDark(DARK_FRAME_RETRIES))
    }

    /// Capture devices among `/dev/video0` to `/dev/video15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).and_then(|d| d.query_caps()).ok()?;
                caps.capabilities.contains(Flags::VIDEO_CAPTURE).then(|| DeviceInfo {
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                    path,
                })
            })
            .collect()
    }
}

fn negotiate(device: &Device, path: &str, params: &CameraParams) -> Result<(PixelFormat, u32, u32), CameraError> {
    let current = device
        .format()
        .map_err(|e| CameraError::Open { device: path.to_string(), reason: e.to_string() })?;

    let mut offered = Vec::new();
    for wanted in PixelFormat::PREFERENCE {
        let mut request = current.clone();
        request.fourcc = wanted.fourcc();
        request.width = params.width;
        request.height = params.height;

        match device.set_format(&request) {
            Ok(got) => match PixelFormat::from_fourcc(got.fourcc) {
                Some(format) => return Ok((format, got.width, got.height)),
                None => offered.push(format!("{}", got.fourcc)),
            },
            Err(e) => tracing::debug!(device = path, format = ?wanted, error = %e, "format refused"),
        }
    }

    offered.dedup();
    Err(CameraError::UnsupportedFormat {
        device: path.to_string(),
        offered: if offered.is_empty() { "nothing".into() } else { offered.join(", ") },
    })
}

impl ImageSource for CameraSource {
    fn next_frame(&mut self) -> Result<RgbImage, SourceError> {
        Ok(self.capture()?)
    }

    fn describe(&self) -> String {
        format!("{} ({:?} {}x{})", self.path, self.format, self.width, self.height)
    }
}
