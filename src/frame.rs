//! Captured frames and the release discipline around them.
//!
//! - `Frame`: owning handle to one captured image buffer. Not `Clone`.
//! - `FrameSource`: the camera capability. Hands out frames and takes them back.
//! - `HeldFrames`: scope guard that returns every frame it holds to its source
//!   exactly once, on every exit path.
//!
//! `FrameSource::release` takes the frame by value, so a frame cannot be returned
//! twice. `HeldFrames` makes sure it is returned at least once.

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// Failure to obtain a frame from a source.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device had no buffer to hand out.
    #[error("no frame buffer available: {0}")]
    Unavailable(String),

    /// Reading from the device, file, or network failed.
    #[error("frame source I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Captured bytes are not a complete JPEG image.
    #[error("captured data is not a JPEG image: {0}")]
    NotJpeg(&'static str),

    /// A finite source has nothing left to give.
    #[error("frame source exhausted")]
    Exhausted,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image buffer.
///
/// There is no `Clone`: a frame has exactly one owner until it is released.
/// The bytes are zeroized when the frame is dropped.
///
/// ```compile_fail
/// let frame = dualshot::Frame::new(vec![0xFF, 0xD8], 1);
/// let copy = frame.clone();
/// ```
///
/// Releasing moves the frame, so it cannot be released twice:
///
/// ```compile_fail
/// use dualshot::{FrameSource, SyntheticSource};
///
/// let mut source = SyntheticSource::new("cam");
/// let frame = source.acquire().unwrap();
/// source.release(frame);
/// source.release(frame);
/// ```
pub struct Frame {
    data: Vec<u8>,
    sequence: u64,
}

impl Frame {
    /// Wrap captured bytes. `sequence` is the source's running capture counter.
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        Self {
            data,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encoded image bytes, borrowed for transmission.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Short SHA-256 fingerprint for log lines. Frame content itself is never logged.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.data);
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// FrameSource
// ----------------------------------------------------------------------------

/// The camera capability.
///
/// A source owns hardware state and is a process-wide singleton in practice;
/// callers hold it by `&mut` so only one capture can be in flight.
pub trait FrameSource {
    /// Capture one frame. May fail when no buffer is available.
    fn acquire(&mut self) -> Result<Frame, CaptureError>;

    /// Return a frame to the source. Called exactly once per acquired frame.
    fn release(&mut self, frame: Frame) {
        drop(frame);
    }

    /// Human-readable name for log lines.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        (**self).acquire()
    }

    fn release(&mut self, frame: Frame) {
        (**self).release(frame)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ----------------------------------------------------------------------------
// HeldFrames: scoped acquisition
// ----------------------------------------------------------------------------

/// Frames acquired from one source for the duration of a scope.
///
/// Dropping the guard releases every held frame back to the source in
/// acquisition order.
pub struct HeldFrames<'s, S: FrameSource + ?Sized> {
    source: &'s mut S,
    frames: Vec<Frame>,
}

impl<'s, S: FrameSource + ?Sized> HeldFrames<'s, S> {
    pub fn new(source: &'s mut S) -> Self {
        Self {
            source,
            frames: Vec::with_capacity(2),
        }
    }

    /// Capture one more frame into the guard.
    pub fn acquire(&mut self) -> Result<&Frame, CaptureError> {
        let frame = self.source.acquire()?;
        log::debug!(
            "acquired frame #{} ({} bytes, sha256:{})",
            frame.sequence(),
            frame.len(),
            frame.fingerprint()
        );
        self.frames.push(frame);
        Ok(&self.frames[self.frames.len() - 1])
    }

    /// Frames held so far, in acquisition order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Release everything now instead of at end of scope.
    pub fn release_all(mut self) {
        self.release_held();
    }

    fn release_held(&mut self) {
        for frame in self.frames.drain(..) {
            log::debug!("releasing frame #{}", frame.sequence());
            self.source.release(frame);
        }
    }
}

impl<S: FrameSource + ?Sized> Drop for HeldFrames<'_, S> {
    fn drop(&mut self) {
        self.release_held();
    }
}
