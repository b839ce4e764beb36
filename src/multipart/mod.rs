//! multipart/form-data request construction.
//!
//! `MultipartRequest` assembles an HTTP/1.1 POST around borrowed payloads:
//!
//! ```text
//! POST {path} HTTP/1.1
//! Host: {host}
//! Connection: close
//! Content-Length: {total}
//! Content-Type: multipart/form-data; boundary={boundary}
//!
//! --{boundary}
//! Content-Disposition: form-data; name="image1"; filename="image1.jpg"
//! Content-Type: image/jpeg
//!
//! <bytes>
//! --{boundary}
//! ...
//! --{boundary}--
//! ```
//!
//! Payloads are never copied: the body is emitted as a sequence of segments
//! (part head, payload, part head, payload, terminator) written one at a time.

mod boundary;

pub use boundary::{Boundary, BOUNDARY_LEN, BOUNDARY_PREFIX, BOUNDARY_RANDOM_LEN};

use std::io::{self, Write};

use crate::frame::Frame;
use crate::target::ServerTarget;

pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Header carrying the device API key, when one is configured.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// One named part of the form.
#[derive(Clone, Debug)]
pub struct FormPart<'a> {
    pub name: String,
    pub filename: String,
    pub content_type: &'static str,
    pub body: &'a [u8],
}

impl<'a> FormPart<'a> {
    pub fn jpeg(name: impl Into<String>, body: &'a [u8]) -> Self {
        let name = name.into();
        Self {
            filename: format!("{}.jpg", name),
            name,
            content_type: IMAGE_CONTENT_TYPE,
            body,
        }
    }
}

/// A fully framed request, ready to be streamed.
#[derive(Debug)]
pub struct MultipartRequest<'a> {
    target: &'a ServerTarget,
    boundary: &'a Boundary,
    api_key: Option<&'a str>,
    heads: Vec<String>,
    bodies: Vec<&'a [u8]>,
    tail: String,
}

impl<'a> MultipartRequest<'a> {
    pub fn new(target: &'a ServerTarget, boundary: &'a Boundary, parts: Vec<FormPart<'a>>) -> Self {
        let mut heads = Vec::with_capacity(parts.len());
        let mut bodies = Vec::with_capacity(parts.len());
        for (idx, part) in parts.into_iter().enumerate() {
            let lead = if idx == 0 { "" } else { "\r\n" };
            heads.push(format!(
                "{lead}--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n",
                lead = lead,
                boundary = boundary,
                name = part.name,
                filename = part.filename,
                content_type = part.content_type,
            ));
            bodies.push(part.body);
        }
        let tail = if heads.is_empty() {
            format!("--{}--\r\n", boundary)
        } else {
            format!("\r\n--{}--\r\n", boundary)
        };
        Self {
            target,
            boundary,
            api_key: None,
            heads,
            bodies,
            tail,
        }
    }

    /// Frames become JPEG parts `image1`, `image2`, ... in order.
    pub fn for_frames(target: &'a ServerTarget, boundary: &'a Boundary, frames: &'a [Frame]) -> Self {
        let parts = frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| FormPart::jpeg(format!("image{}", idx + 1), frame.bytes()))
            .collect();
        Self::new(target, boundary, parts)
    }

    pub fn with_api_key(mut self, api_key: Option<&'a str>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    /// Exact byte length of the body that `body_segments` yields.
    pub fn content_length(&self) -> u64 {
        let heads: usize = self.heads.iter().map(String::len).sum();
        let bodies: usize = self.bodies.iter().map(|b| b.len()).sum();
        (heads + bodies + self.tail.len()) as u64
    }

    /// Request line and headers, terminated by the blank line.
    pub fn header_block(&self) -> String {
        let mut head = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
            self.target.path, self.target.host
        );
        if let Some(key) = self.api_key {
            head.push_str(&format!("{}: {}\r\n", API_KEY_HEADER, key));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nContent-Type: multipart/form-data; boundary={}\r\n\r\n",
            self.content_length(),
            self.boundary
        ));
        head
    }

    /// Body segments in wire order. Payload segments borrow the caller's buffers.
    pub fn body_segments(&self) -> Vec<&[u8]> {
        let mut segments = Vec::with_capacity(self.heads.len() * 2 + 1);
        for (head, body) in self.heads.iter().zip(&self.bodies) {
            segments.push(head.as_bytes());
            segments.push(*body);
        }
        segments.push(self.tail.as_bytes());
        segments
    }

    /// Stream the header block and every body segment into `out`.
    ///
    /// Returns the total number of bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<u64> {
        let head = self.header_block();
        out.write_all(head.as_bytes())?;
        let mut written = head.len() as u64;
        for segment in self.body_segments() {
            out.write_all(segment)?;
            written += segment.len() as u64;
        }
        out.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn target() -> ServerTarget {
        ServerTarget {
            host: "example.com".to_string(),
            port: 80,
            path: "/upload".to_string(),
        }
    }

    fn boundary() -> Boundary {
        Boundary::generate_with(&mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn content_length_matches_concatenated_segments() {
        let target = target();
        let boundary = boundary();
        for (l1, l2) in [(0usize, 0usize), (1, 0), (100, 100), (4096, 17), (65_536, 3)] {
            let a = vec![0xA5u8; l1];
            let b = vec![0x5Au8; l2];
            let req = MultipartRequest::new(
                &target,
                &boundary,
                vec![FormPart::jpeg("image1", &a), FormPart::jpeg("image2", &b)],
            );
            let body: Vec<u8> = req.body_segments().concat();
            assert_eq!(req.content_length(), body.len() as u64, "l1={} l2={}", l1, l2);
        }
    }

    #[test]
    fn header_block_is_exact() {
        let target = target();
        let boundary = boundary();
        let payload = [1u8, 2, 3];
        let req = MultipartRequest::new(&target, &boundary, vec![FormPart::jpeg("image1", &payload)]);
        let expected = format!(
            "POST /upload HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\
             Content-Length: {}\r\nContent-Type: multipart/form-data; boundary={}\r\n\r\n",
            req.content_length(),
            boundary
        );
        assert_eq!(req.header_block(), expected);
    }

    #[test]
    fn body_follows_multipart_framing() {
        let target = target();
        let boundary = boundary();
        let a = b"first".to_vec();
        let b = b"second".to_vec();
        let req = MultipartRequest::new(
            &target,
            &boundary,
            vec![FormPart::jpeg("image1", &a), FormPart::jpeg("image2", &b)],
        );
        let body = String::from_utf8(req.body_segments().concat()).unwrap();
        let expected = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"image1\"; filename=\"image1.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\nfirst\
             \r\n--{b}\r\nContent-Disposition: form-data; name=\"image2\"; filename=\"image2.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\nsecond\
             \r\n--{b}--\r\n",
            b = boundary
        );
        assert_eq!(body, expected);
    }

    #[test]
    fn payload_segments_borrow_frames() {
        let target = target();
        let boundary = boundary();
        let frames = vec![Frame::new(vec![9u8; 10], 1), Frame::new(vec![8u8; 20], 2)];
        let req = MultipartRequest::for_frames(&target, &boundary, &frames);
        let segments = req.body_segments();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[1].as_ptr(), frames[0].bytes().as_ptr());
        assert_eq!(segments[3].as_ptr(), frames[1].bytes().as_ptr());
    }

    #[test]
    fn api_key_header_only_when_configured() {
        let target = target();
        let boundary = boundary();
        let req = MultipartRequest::new(&target, &boundary, Vec::new());
        assert!(!req.header_block().contains(API_KEY_HEADER));

        let req = MultipartRequest::new(&target, &boundary, Vec::new()).with_api_key(Some("k-123"));
        assert!(req.header_block().contains("X-API-Key: k-123\r\n"));

        let req = MultipartRequest::new(&target, &boundary, Vec::new()).with_api_key(Some(""));
        assert!(!req.header_block().contains(API_KEY_HEADER));
    }

    #[test]
    fn write_to_emits_header_then_body() {
        let target = target();
        let boundary = boundary();
        let a = vec![0u8; 100];
        let b = vec![1u8; 100];
        let req = MultipartRequest::new(
            &target,
            &boundary,
            vec![FormPart::jpeg("image1", &a), FormPart::jpeg("image2", &b)],
        );
        let mut out = Vec::new();
        let written = req.write_to(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        let head = req.header_block();
        assert!(out.starts_with(head.as_bytes()));
        assert_eq!((out.len() - head.len()) as u64, req.content_length());
    }
}
