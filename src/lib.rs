//! Dual-frame capture and upload.
//!
//! This crate takes two still frames from a camera, a configurable delay apart,
//! and POSTs them to a server as a single `multipart/form-data` request over
//! plaintext TCP or TLS. The server's response is logged and returned, not
//! interpreted.
//!
//! # Guarantees
//!
//! 1. **Frames are released exactly once**: every frame acquired during an upload
//!    is returned to its source on every exit path, in acquisition order.
//! 2. **The socket is closed exactly once**, before the frames are released.
//! 3. **Frames never leave their buffers**: request bodies borrow the frame bytes
//!    and frames are zeroized when dropped.
//! 4. **Exact framing**: the declared `Content-Length` equals the bytes of the body.
//!
//! # Module Structure
//!
//! - `frame`: `Frame`, the `FrameSource` capability, `HeldFrames` release guard
//! - `ingest`: concrete sources (synthetic, JPEG directory, ESP32 HTTP, V4L2)
//! - `target`: server URL to host / port / path
//! - `multipart`: boundary generation and request framing
//! - `transport`: TCP and rustls connections
//! - `upload`: the capture-and-upload orchestrator
//! - `config`: file and environment configuration

pub mod config;
pub mod frame;
pub mod ingest;
pub mod multipart;
pub mod target;
pub mod transport;
pub mod upload;

pub use config::{AppConfig, SourceSettings};
pub use frame::{CaptureError, Frame, FrameSource, HeldFrames};
pub use ingest::{open_source, DirectorySource, SyntheticSource};
#[cfg(feature = "source-esp32")]
pub use ingest::{Esp32Config, Esp32Source};
#[cfg(feature = "source-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use multipart::{Boundary, FormPart, MultipartRequest};
pub use target::{parse_server_url, ParseError, ServerTarget};
pub use transport::{
    ConnectError, Connector, NetConnector, NetStream, TlsVerification, TransportKind,
    TransportSettings, UploadStream,
};
pub use upload::{UploadError, UploadReport, UploadSettings, UploadStage, Uploader};
