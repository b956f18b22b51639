//! Frame sources: still image files and directory sequences.

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no more frames in {}", .0.display())]
    Exhausted(PathBuf),
    #[cfg(feature = "v4l")]
    #[error(transparent)]
    Camera(#[from] crate::camera::CameraError),
}

/// Supplies one RGB frame per call.
pub trait ImageSource {
    fn next_frame(&mut self) -> Result<RgbImage, SourceError>;

    /// Human-readable origin of the frames, for log lines.
    fn describe(&self) -> String;
}

fn decode(path: &Path) -> Result<RgbImage, SourceError> {
    let img = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(e) => SourceError::Io { path: path.to_path_buf(), source: e },
        other => SourceError::Decode { path: path.to_path_buf(), source: other },
    })?;
    let rgb = img.to_rgb8();
    tracing::debug!(path = %path.display(), width = rgb.width(), height = rgb.height(), "decoded frame");
    Ok(rgb)
}

/// One image file, decoded afresh on every call.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for StillImageSource {
    fn next_frame(&mut self) -> Result<RgbImage, SourceError> {
        decode(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// The image files of a directory in file-name order, one per call.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let dir = dir.into();
        let io_err = |source| SourceError::Io { path: dir.clone(), source };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();

        tracing::debug!(dir = %dir.display(), frames = files.len(), "directory source opened");
        Ok(Self { dir, files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of the frame the next call returns.
    pub fn peek_path(&self) -> Option<&Path> {
        self.files.get(self.next).map(PathBuf::as_path)
    }
}

impl ImageSource for DirectorySource {
    fn next_frame(&mut self) -> Result<RgbImage, SourceError> {
        let path = self
            .files
            .get(self.next)
            .ok_or_else(|| SourceError::Exhausted(self.dir.clone()))?;
        self.next += 1;
        decode(path)
    }

    fn describe(&self) -> String {
        format!("{} ({} frames)", self.dir.display(), self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, value: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 6, Rgb([value, value, value])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_still_image_rereads() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "a.png", 10);
        let mut src = StillImageSource::new(&path);
        assert_eq!(src.next_frame().unwrap().get_pixel(0, 0), &Rgb([10, 10, 10]));

        write_png(tmp.path(), "a.png", 99);
        assert_eq!(src.next_frame().unwrap().get_pixel(0, 0), &Rgb([99, 99, 99]));
    }

    #[test]
    fn test_still_image_missing() {
        let mut src = StillImageSource::new("/nonexistent/frame.png");
        assert!(matches!(src.next_frame(), Err(SourceError::Io { .. })));
    }

    #[test]
    fn test_still_image_undecodable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.png");
        std::fs::write(&path, b"not an image").unwrap();
        let mut src = StillImageSource::new(&path);
        assert!(matches!(src.next_frame(), Err(SourceError::Decode { .. })));
    }

    #[test]
    fn test_directory_in_name_order() {
        let tmp = TempDir::new().unwrap();
        write_png(tmp.path(), "frame_002.png", 2);
        write_png(tmp.path(), "frame_001.png", 1);
        std::fs::write(tmp.path().join("notes.txt"), "skip me").unwrap();

        let mut src = DirectorySource::open(tmp.path()).unwrap();
        assert_eq!(src.len(), 2);
        assert!(src.peek_path().unwrap().ends_with("frame_001.png"));
        assert_eq!(src.next_frame().unwrap().get_pixel(0, 0)[0], 1);
        assert_eq!(src.next_frame().unwrap().get_pixel(0, 0)[0], 2);
        assert!(matches!(src.next_frame(), Err(SourceError::Exhausted(_))));
    }
}
