//! Local directory frame source.
//!
//! Replays `*.jpg` / `*.jpeg` files from a directory in file-name order,
//! wrapping around at the end. Useful for bench testing the upload path
//! against recorded captures.
//!
//! The directory source MUST NOT:
//! - Fetch remote URLs
//! - Modify or delete the files it reads

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::jpeg::trim_to_jpeg;
use crate::frame::{CaptureError, Frame, FrameSource};

pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    frame_count: u64,
}

impl DirectorySource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if dir.to_string_lossy().contains("://") {
            return Err(anyhow!(
                "directory source only supports local paths (no URL schemes)"
            ));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_jpeg_name(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no .jpg/.jpeg files in {}", dir.display()));
        }
        files.sort();
        log::info!(
            "DirectorySource: {} frames available in {}",
            files.len(),
            dir.display()
        );
        Ok(Self {
            dir,
            files,
            next: 0,
            frame_count: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        let path = self
            .files
            .get(self.next)
            .ok_or(CaptureError::Exhausted)?;
        let raw = std::fs::read(path)?;
        let bytes = trim_to_jpeg(&raw)?;
        self.next = (self.next + 1) % self.files.len();
        self.frame_count += 1;
        Ok(Frame::new(bytes, self.frame_count))
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn is_jpeg_name(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_jpeg(dir: &Path, name: &str, marker: u8) {
        std::fs::write(dir.join(name), [0xFF, 0xD8, marker, 0xFF, 0xD9]).unwrap();
    }

    #[test]
    fn replays_files_in_name_order_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), "b.jpg", 2);
        write_jpeg(dir.path(), "a.JPEG", 1);
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        let markers: Vec<u8> = (0..3)
            .map(|_| source.acquire().unwrap().bytes()[2])
            .collect();
        assert_eq!(markers, vec![1, 2, 1]);
    }

    #[test]
    fn empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectorySource::open(dir.path()).is_err());
    }

    #[test]
    fn url_paths_rejected() {
        assert!(DirectorySource::open("http://camera/frames").is_err());
    }

    #[test]
    fn corrupt_file_is_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.jpg"), b"not a jpeg").unwrap();
        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert!(matches!(source.acquire(), Err(CaptureError::NotJpeg(_))));
    }
}
