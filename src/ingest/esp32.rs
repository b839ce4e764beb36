//! ESP32-CAM snapshot source.
//!
//! Fetches one JPEG per capture from a camera's HTTP snapshot endpoint
//! (for example `http://192.168.1.50/capture`).
//!
//! The snapshot source is responsible for:
//! - Issuing one GET per frame, with a bounded timeout
//! - Rejecting oversized or non-JPEG responses
//! - Producing `Frame` instances
//!
//! The snapshot source MUST NOT:
//! - Store snapshots to disk
//! - Log snapshot content

use std::io::Read;
use std::time::Duration;

use super::jpeg::trim_to_jpeg;
use crate::frame::{CaptureError, Frame, FrameSource};

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;

/// Configuration for an ESP32-CAM snapshot source.
#[derive(Clone, Debug)]
pub struct Esp32Config {
    /// Snapshot URL. http(s):// only.
    pub url: String,
    /// Upper bound on one snapshot request.
    pub timeout: Duration,
}

impl Default for Esp32Config {
    fn default() -> Self {
        Self {
            url: "http://192.168.4.1/capture".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct Esp32Source {
    config: Esp32Config,
    agent: ureq::Agent,
    frame_count: u64,
}

impl Esp32Source {
    pub fn new(config: Esp32Config) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            config,
            agent,
            frame_count: 0,
        }
    }

    fn fetch_snapshot(&self) -> Result<Vec<u8>, CaptureError> {
        let response = self.agent.get(&self.config.url).call().map_err(|e| {
            CaptureError::Unavailable(format!("fetch snapshot from {}: {}", self.config.url, e))
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES + 1)
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > MAX_JPEG_BYTES {
            return Err(CaptureError::Unavailable(format!(
                "snapshot from {} exceeds {} bytes",
                self.config.url, MAX_JPEG_BYTES
            )));
        }
        trim_to_jpeg(&bytes)
    }
}

impl FrameSource for Esp32Source {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        let bytes = self.fetch_snapshot()?;
        self.frame_count += 1;
        Ok(Frame::new(bytes, self.frame_count))
    }

    fn describe(&self) -> String {
        self.config.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).unwrap();
            sock.write_all(&body).unwrap();
        });
        format!("http://{}/capture", addr)
    }

    #[test]
    fn fetches_snapshot_as_frame() {
        let url = serve_once(vec![0xFF, 0xD8, 0x42, 0xFF, 0xD9]);
        let mut source = Esp32Source::new(Esp32Config {
            url,
            timeout: Duration::from_secs(5),
        });
        let frame = source.acquire().unwrap();
        assert_eq!(frame.bytes(), &[0xFF, 0xD8, 0x42, 0xFF, 0xD9]);
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn non_jpeg_snapshot_rejected() {
        let url = serve_once(b"<html>busy</html>".to_vec());
        let mut source = Esp32Source::new(Esp32Config {
            url,
            timeout: Duration::from_secs(5),
        });
        assert!(matches!(source.acquire(), Err(CaptureError::NotJpeg(_))));
    }

    #[test]
    fn unreachable_camera_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut source = Esp32Source::new(Esp32Config {
            url: format!("http://{}/capture", addr),
            timeout: Duration::from_secs(2),
        });
        assert!(matches!(source.acquire(), Err(CaptureError::Unavailable(_))));
    }
}
