//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for capturing MJPEG frames from a local
//! V4L2 device node (e.g., /dev/video0).
//!
//! Each capture opens a short-lived buffer stream, discards `flush_frames`
//! stale buffers queued by the driver, and copies out the next one. The stream
//! is dropped before `acquire` returns, so no driver buffer outlives the call.

use anyhow::{Context, Result};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;

use super::jpeg::trim_to_jpeg;
use crate::frame::{CaptureError, Frame, FrameSource};

const STREAM_BUFFERS: u32 = 4;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Stale frames to drop before each capture.
    pub flush_frames: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            flush_frames: 2,
        }
    }
}

pub struct V4l2Source {
    config: V4l2Config,
    device: v4l::Device,
    frame_count: u64,
}

impl V4l2Source {
    pub fn open(config: V4l2Config) -> Result<Self> {
        let device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");

        match device.set_format(&format) {
            Ok(active) => log::info!(
                "V4l2Source: opened {} ({}x{} {})",
                config.device,
                active.width,
                active.height,
                active.fourcc
            ),
            Err(err) => log::warn!(
                "V4l2Source: failed to set MJPG format on {}: {}",
                config.device,
                err
            ),
        }

        Ok(Self {
            config,
            device,
            frame_count: 0,
        })
    }
}

impl FrameSource for V4l2Source {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        let flush = self.config.flush_frames;
        let bytes = {
            let mut stream =
                MmapStream::with_buffers(&mut self.device, Type::VideoCapture, STREAM_BUFFERS)?;
            for _ in 0..flush {
                stream.next()?;
            }
            let (buf, meta) = stream.next()?;
            let used = (meta.bytesused as usize).min(buf.len());
            let used = if used == 0 { buf.len() } else { used };
            trim_to_jpeg(&buf[..used])?
        };
        self.frame_count += 1;
        Ok(Frame::new(bytes, self.frame_count))
    }

    fn describe(&self) -> String {
        self.config.device.clone()
    }
}
