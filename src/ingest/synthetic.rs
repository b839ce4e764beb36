//! Synthetic frame source (`stub://` URLs).
//!
//! Produces small JPEG-shaped buffers whose content changes every frame, for
//! demos and tests without camera hardware.

use crate::frame::{CaptureError, Frame, FrameSource};

const SYNTHETIC_PAYLOAD_LEN: usize = 4096;

pub struct SyntheticSource {
    name: String,
    flush_frames: u32,
    frame_count: u64,
    flushed: u64,
    generated: u64,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flush_frames: 0,
            frame_count: 0,
            flushed: 0,
            generated: 0,
        }
    }

    /// Generate and discard this many frames before each capture, like a camera
    /// clearing stale buffers.
    pub fn with_flush(mut self, flush_frames: u32) -> Self {
        self.flush_frames = flush_frames;
        self
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn frames_flushed(&self) -> u64 {
        self.flushed
    }

    fn generate(&mut self) -> Vec<u8> {
        self.generated += 1;
        let seq = self.generated;
        let mut data = Vec::with_capacity(SYNTHETIC_PAYLOAD_LEN + 4);
        data.extend_from_slice(&[0xFF, 0xD8]);
        data.extend((0..SYNTHETIC_PAYLOAD_LEN).map(|i| ((i as u64 + seq) % 0xF0) as u8));
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }
}

impl FrameSource for SyntheticSource {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        for _ in 0..self.flush_frames {
            drop(Frame::new(self.generate(), 0));
            self.flushed += 1;
        }
        self.frame_count += 1;
        Ok(Frame::new(self.generate(), self.frame_count))
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_frames_are_jpeg_shaped_and_distinct() {
        let mut source = SyntheticSource::new("test");
        let a = source.acquire().unwrap();
        let b = source.acquire().unwrap();
        assert!(a.bytes().starts_with(&[0xFF, 0xD8]));
        assert!(a.bytes().ends_with(&[0xFF, 0xD9]));
        assert_eq!(a.len(), SYNTHETIC_PAYLOAD_LEN + 4);
        assert_ne!(a.bytes(), b.bytes());
        assert_eq!((a.sequence(), b.sequence()), (1, 2));
    }

    #[test]
    fn flush_counts_discarded_frames() {
        let mut source = SyntheticSource::new("test").with_flush(2);
        source.acquire().unwrap();
        source.acquire().unwrap();
        assert_eq!(source.frames_captured(), 2);
        assert_eq!(source.frames_flushed(), 4);
        assert_eq!(source.describe(), "stub://test");
    }

    #[test]
    fn flushed_frames_are_generated_then_dropped() {
        let mut plain = SyntheticSource::new("plain");
        let third = (0..3).map(|_| plain.acquire().unwrap()).last().unwrap();

        let mut flushing = SyntheticSource::new("flushing").with_flush(2);
        let first = flushing.acquire().unwrap();
        assert_eq!(first.sequence(), 1);
        assert_eq!(first.bytes(), third.bytes());
    }
}
