//! Dual-frame capture and upload.
//!
//! `Uploader::upload` runs one attempt through these stages, strictly in order:
//!
//! ```text
//! Idle -> Capturing1 -> Waiting -> Capturing2 -> Parsing -> Connecting
//!      -> Sending -> AwaitingResponse -> Draining -> Done
//! ```
//!
//! Any failure ends the attempt. Frames are held in a `HeldFrames` guard and the
//! socket in an `OpenConnection` guard, so on every exit path the socket is closed
//! exactly once and then every acquired frame is released exactly once.
//!
//! Nothing is retried. The response is observed (logged and returned as raw bytes)
//! but not interpreted.

use std::fmt;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::frame::{CaptureError, FrameSource, HeldFrames};
use crate::multipart::{Boundary, MultipartRequest};
use crate::target::{ParseError, ServerTarget};
use crate::transport::{ConnectError, Connector, UploadStream};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DRAIN_IDLE: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024;

const READ_CHUNK: usize = 1024;

/// Where an upload attempt is, or where it stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStage {
    Idle,
    Capturing1,
    Waiting,
    Capturing2,
    Parsing,
    Connecting,
    Sending,
    AwaitingResponse,
    Draining,
    Done,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Capturing1 => "capture_1",
            Self::Waiting => "waiting",
            Self::Capturing2 => "capture_2",
            Self::Parsing => "parsing",
            Self::Connecting => "connecting",
            Self::Sending => "sending",
            Self::AwaitingResponse => "awaiting_response",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why an upload attempt ended early. All variants are terminal for the attempt.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to capture image {index}: {source}")]
    Capture {
        index: u8,
        #[source]
        source: CaptureError,
    },

    #[error("failed to parse server URL: {0}")]
    Parse(#[from] ParseError),

    #[error("connection failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("failed to send request: {0}")]
    Transmit(#[source] io::Error),

    #[error("client timeout: no response within {0:?}")]
    ResponseTimeout(Duration),
}

impl UploadError {
    /// Stage in which the attempt failed.
    pub fn stage(&self) -> UploadStage {
        match self {
            Self::Capture { index: 1, .. } => UploadStage::Capturing1,
            Self::Capture { .. } => UploadStage::Capturing2,
            Self::Parse(_) => UploadStage::Parsing,
            Self::Connect(_) => UploadStage::Connecting,
            Self::Transmit(_) => UploadStage::Sending,
            Self::ResponseTimeout(_) => UploadStage::AwaitingResponse,
        }
    }
}

/// Per-upload settings, fixed for the lifetime of an `Uploader`.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    /// Base URL the two frames are POSTed to.
    pub server_url: String,
    /// Sent as `X-API-Key` when present.
    pub api_key: Option<String>,
    /// Bound on the wait for the first response byte, and separately on the
    /// whole drain that follows it.
    pub response_timeout: Duration,
    /// Draining stops after this long without new bytes.
    pub drain_idle: Duration,
    /// Response bytes kept for the report; the rest are read and counted only.
    pub max_response_bytes: usize,
}

impl UploadSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            drain_idle: DEFAULT_DRAIN_IDLE,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Outcome of a completed upload.
#[derive(Clone, Debug)]
pub struct UploadReport {
    pub target: ServerTarget,
    pub boundary: Boundary,
    pub frame_lens: [usize; 2],
    pub content_length: u64,
    /// Header block plus body.
    pub bytes_sent: u64,
    /// Retained response bytes, at most `max_response_bytes`.
    pub response: Vec<u8>,
    /// Every response byte observed, retained or not.
    pub response_len: u64,
    pub elapsed: Duration,
}

impl UploadReport {
    /// First response line as text. Not parsed.
    pub fn status_line(&self) -> Option<String> {
        let line = self.response.split(|b| *b == b'\n').next()?;
        let line = String::from_utf8_lossy(line).trim_end().to_string();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }

    pub fn response_truncated(&self) -> bool {
        self.response_len > self.response.len() as u64
    }
}

/// Sequences capture, delay, capture, connect, send, and response drain.
///
/// The source and connector are injected capabilities. Holding the uploader by
/// `&mut` serializes attempts, which the single camera requires.
pub struct Uploader<S, C> {
    source: S,
    connector: C,
    settings: UploadSettings,
}

impl<S: FrameSource, C: Connector> Uploader<S, C> {
    pub fn new(source: S, connector: C, settings: UploadSettings) -> Self {
        Self {
            source,
            connector,
            settings,
        }
    }

    /// Run one upload attempt, blocking the calling thread throughout.
    pub fn upload(&mut self, delay: Duration) -> Result<UploadReport, UploadError> {
        let started = Instant::now();
        let settings = &self.settings;
        let mut held = HeldFrames::new(&mut self.source);

        enter(UploadStage::Capturing1);
        held.acquire()
            .map_err(|source| UploadError::Capture { index: 1, source })?;

        enter(UploadStage::Waiting);
        if !delay.is_zero() {
            log::info!("waiting {:?} before second capture", delay);
            std::thread::sleep(delay);
        }

        enter(UploadStage::Capturing2);
        held.acquire()
            .map_err(|source| UploadError::Capture { index: 2, source })?;

        enter(UploadStage::Parsing);
        let target = ServerTarget::parse(&settings.server_url)?;

        enter(UploadStage::Connecting);
        let mut conn = OpenConnection::new(self.connector.connect(&target)?);

        enter(UploadStage::Sending);
        let frames = held.frames();
        let boundary = Boundary::generate_avoiding(&[frames[0].bytes(), frames[1].bytes()]);
        let request = MultipartRequest::for_frames(&target, &boundary, frames)
            .with_api_key(settings.api_key.as_deref());
        let content_length = request.content_length();
        let bytes_sent = request
            .write_to(conn.stream_mut())
            .map_err(UploadError::Transmit)?;
        log::info!(
            "request sent ({} bytes, body {}). waiting for response...",
            bytes_sent,
            content_length
        );

        enter(UploadStage::AwaitingResponse);
        let response = read_response(conn.stream_mut(), settings)?;
        log_response(&response);

        let report = UploadReport {
            frame_lens: [frames[0].len(), frames[1].len()],
            target,
            boundary,
            content_length,
            bytes_sent,
            response: response.retained,
            response_len: response.total,
            elapsed: started.elapsed(),
        };
        conn.close();
        held.release_all();
        enter(UploadStage::Done);
        Ok(report)
    }

    /// Fire-and-forget form: every outcome is absorbed and only logged.
    pub fn upload_and_log(&mut self, delay_seconds: u64) {
        match self.upload(Duration::from_secs(delay_seconds)) {
            Ok(report) => log::info!(
                "upload to {} finished in {:?}: {} bytes sent, {} response bytes",
                report.target,
                report.elapsed,
                report.bytes_sent,
                report.response_len
            ),
            Err(err) => log::error!("upload failed during {}: {}", err.stage(), err),
        }
    }
}

fn enter(stage: UploadStage) {
    log::debug!("upload stage: {}", stage);
}

// ----------------------------------------------------------------------------
// Connection guard
// ----------------------------------------------------------------------------

/// Closes the stream exactly once: explicitly, or when dropped.
struct OpenConnection<T: UploadStream> {
    stream: T,
    closed: bool,
}

impl<T: UploadStream> OpenConnection<T> {
    fn new(stream: T) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    fn stream_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.stream.close() {
            log::debug!("closing upload connection failed: {}", err);
        }
    }
}

impl<T: UploadStream> Drop for OpenConnection<T> {
    fn drop(&mut self) {
        self.close();
    }
}

// ----------------------------------------------------------------------------
// Response wait and drain
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ResponseCapture {
    retained: Vec<u8>,
    total: u64,
    limit: usize,
}

impl ResponseCapture {
    fn new(limit: usize) -> Self {
        Self {
            retained: Vec::new(),
            total: 0,
            limit,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.total += bytes.len() as u64;
        let room = self.limit.saturating_sub(self.retained.len());
        self.retained
            .extend_from_slice(&bytes[..bytes.len().min(room)]);
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Wait for the first response byte, then drain until EOF or idle.
fn read_response<T: UploadStream + ?Sized>(
    stream: &mut T,
    settings: &UploadSettings,
) -> Result<ResponseCapture, UploadError> {
    let mut capture = ResponseCapture::new(settings.max_response_bytes);
    let mut chunk = [0u8; READ_CHUNK];

    stream
        .set_read_timeout(Some(settings.response_timeout))
        .map_err(UploadError::Transmit)?;
    let first = loop {
        match stream.read(&mut chunk) {
            Ok(n) => break n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break 0,
            Err(err) if is_timeout(&err) => {
                log::warn!(
                    ">>> client timeout: no response within {:?}",
                    settings.response_timeout
                );
                return Err(UploadError::ResponseTimeout(settings.response_timeout));
            }
            Err(err) => return Err(UploadError::Transmit(err)),
        }
    };
    if first == 0 {
        log::warn!("server closed the connection without a response");
        return Ok(capture);
    }
    capture.push(&chunk[..first]);

    enter(UploadStage::Draining);
    let deadline = Instant::now() + settings.response_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::debug!(
                "response drain stopped after {:?} ({} bytes)",
                settings.response_timeout,
                capture.total
            );
            break;
        }
        if let Err(err) = stream.set_read_timeout(Some(settings.drain_idle.min(remaining))) {
            log::debug!("set drain timeout failed: {}", err);
            break;
        }
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => capture.push(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => break,
            Err(err) => {
                log::debug!("response drain ended: {}", err);
                break;
            }
        }
    }
    Ok(capture)
}

fn log_response(response: &ResponseCapture) {
    if response.total == 0 {
        return;
    }
    log::info!("server response ({} bytes):", response.total);
    for line in String::from_utf8_lossy(&response.retained).lines() {
        log::info!("  {}", line);
    }
    if response.total > response.retained.len() as u64 {
        log::info!(
            "  ... {} more bytes not shown",
            response.total - response.retained.len() as u64
        );
    }
}
