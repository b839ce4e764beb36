//! Frame sources.
//!
//! This module provides the concrete cameras behind `FrameSource`:
//! - Synthetic frames (`stub://name`), for demos and tests
//! - A local directory of JPEG files (plain path)
//! - ESP32-CAM HTTP snapshots (`http(s)://...`, feature: source-esp32)
//! - V4L2 MJPEG devices (`v4l2:///dev/video0`, feature: source-v4l2)
//!
//! `open_source` picks one from the configured source URL.

pub mod directory;
#[cfg(feature = "source-esp32")]
pub mod esp32;
mod jpeg;
pub mod synthetic;
#[cfg(feature = "source-v4l2")]
pub mod v4l2;

pub use directory::DirectorySource;
#[cfg(feature = "source-esp32")]
pub use esp32::{Esp32Config, Esp32Source};
pub use synthetic::SyntheticSource;
#[cfg(feature = "source-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use anyhow::Result;

use crate::config::SourceSettings;
use crate::frame::FrameSource;

/// Which backend a source URL maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Directory,
    Esp32,
    V4l2,
}

impl SourceKind {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("stub://") {
            Self::Synthetic
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Self::Esp32
        } else if url.starts_with("v4l2://") {
            Self::V4l2
        } else {
            Self::Directory
        }
    }
}

/// Open the frame source described by `settings`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    match SourceKind::from_url(url) {
        SourceKind::Synthetic => {
            let name = url.trim_start_matches("stub://");
            Ok(Box::new(
                SyntheticSource::new(name).with_flush(settings.flush_frames),
            ))
        }
        SourceKind::Directory => Ok(Box::new(DirectorySource::open(url)?)),
        SourceKind::Esp32 => open_esp32(url, settings),
        SourceKind::V4l2 => open_v4l2(url.trim_start_matches("v4l2://"), settings),
    }
}

#[cfg(feature = "source-esp32")]
fn open_esp32(url: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(Esp32Source::new(Esp32Config {
        url: url.to_string(),
        timeout: settings.timeout,
    })))
}

#[cfg(not(feature = "source-esp32"))]
fn open_esp32(_url: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!("HTTP snapshot sources require the source-esp32 feature"))
}

#[cfg(feature = "source-v4l2")]
fn open_v4l2(device: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::open(V4l2Config {
        device: device.to_string(),
        width: settings.width,
        height: settings.height,
        flush_frames: settings.flush_frames,
    })?))
}

#[cfg(not(feature = "source-v4l2"))]
fn open_v4l2(device: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "V4L2 device {} requires the source-v4l2 feature",
        device
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_from_url() {
        assert_eq!(SourceKind::from_url("stub://cam"), SourceKind::Synthetic);
        assert_eq!(
            SourceKind::from_url("http://10.0.0.5/capture"),
            SourceKind::Esp32
        );
        assert_eq!(
            SourceKind::from_url("v4l2:///dev/video0"),
            SourceKind::V4l2
        );
        assert_eq!(
            SourceKind::from_url("/var/lib/frames"),
            SourceKind::Directory
        );
    }

    #[test]
    fn opens_synthetic_source() {
        let settings = SourceSettings {
            url: "stub://porch".to_string(),
            ..SourceSettings::default()
        };
        let mut source = open_source(&settings).unwrap();
        assert_eq!(source.describe(), "stub://porch");
        assert!(source.acquire().is_ok());
    }

    #[test]
    #[cfg(not(feature = "source-v4l2"))]
    fn v4l2_requires_feature() {
        let settings = SourceSettings {
            url: "v4l2:///dev/video0".to_string(),
            ..SourceSettings::default()
        };
        let err = open_source(&settings).err().unwrap();
        assert!(err.to_string().contains("source-v4l2"));
    }
}
