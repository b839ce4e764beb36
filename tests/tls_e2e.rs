use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use rustls::crypto::aws_lc_rs;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};

use dualshot::{
    ConnectError, Connector, NetConnector, NetStream, ServerTarget, SyntheticSource,
    TlsVerification, TransportKind, TransportSettings, UploadSettings, UploadStream, Uploader,
};

fn server_config() -> Arc<ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("generate cert");
    let cert_der = CertificateDer::from(cert.serialize_der().expect("cert der"));
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));
    let config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .expect("server cert");
    Arc::new(config)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// TLS server that reads one request and answers with `reply`.
fn serve_tls_once(reply: &'static [u8]) -> (u16, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let config = server_config();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (tcp, _) = listener.accept().expect("accept");
        tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let conn = ServerConnection::new(config).expect("server connection");
        let mut tls = StreamOwned::new(conn, tcp);

        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut expected_len = None;
        loop {
            let n = match tls.read(&mut chunk) {
                Ok(n) => n,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            if expected_len.is_none() {
                if let Some(pos) = find(&request, b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..pos]).to_string();
                    let body_len: usize = head
                        .lines()
                        .find_map(|line| line.strip_prefix("Content-Length: "))
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0);
                    expected_len = Some(pos + 4 + body_len);
                }
            }
            if matches!(expected_len, Some(len) if request.len() >= len) {
                break;
            }
        }
        let _ = tls.write_all(reply);
        tls.conn.send_close_notify();
        let _ = tls.flush();
        let _ = tx.send(request);
    });
    (port, rx)
}

/// Uses TLS regardless of port, since tests cannot bind 443.
struct AlwaysTls(NetConnector);

impl Connector for AlwaysTls {
    type Stream = NetStream;

    fn connect(&self, target: &ServerTarget) -> Result<NetStream, ConnectError> {
        self.0.open(TransportKind::Tls, target)
    }
}

fn target(port: u16) -> ServerTarget {
    ServerTarget {
        host: "127.0.0.1".to_string(),
        port,
        path: "/".to_string(),
    }
}

#[test]
fn unverified_tls_accepts_self_signed_server() {
    let (port, received) = serve_tls_once(b"HTTP/1.1 200 OK\r\n\r\n");
    let connector = NetConnector::new(&TransportSettings::default()).expect("connector");

    let mut stream = connector
        .open(TransportKind::Tls, &target(port))
        .expect("tls connect");
    assert_eq!(stream.kind(), TransportKind::Tls);
    stream
        .write_all(b"GET / HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .unwrap();
    stream.flush().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut response = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
        }
    }
    assert_eq!(response, b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
    stream.close().unwrap();

    let request = received.recv_timeout(Duration::from_secs(5)).expect("request");
    assert!(request.starts_with(b"GET / HTTP/1.1\r\n"));
}

#[test]
fn full_upload_over_tls() {
    let (port, received) =
        serve_tls_once(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    let connector = AlwaysTls(NetConnector::new(&TransportSettings::default()).expect("connector"));
    let settings = UploadSettings::new(format!("https://127.0.0.1:{}/api/vision/logs/", port));
    let mut uploader = Uploader::new(SyntheticSource::new("tls-cam"), connector, settings);

    let report = uploader.upload(Duration::ZERO).expect("upload");
    let request = received.recv_timeout(Duration::from_secs(5)).expect("request");

    assert_eq!(report.bytes_sent, request.len() as u64);
    assert_eq!(report.status_line().as_deref(), Some("HTTP/1.1 201 Created"));
    assert!(request.starts_with(b"POST /api/vision/logs/ HTTP/1.1\r\nHost: 127.0.0.1\r\n"));
}

#[test]
fn webpki_verification_rejects_self_signed_server() {
    let (port, _received) = serve_tls_once(b"");
    let connector = NetConnector::new(&TransportSettings {
        tls: TlsVerification::WebPki,
        ..TransportSettings::default()
    })
    .expect("connector");

    let err = connector
        .open(TransportKind::Tls, &target(port))
        .err()
        .expect("handshake must fail");
    assert!(matches!(err, ConnectError::Tls { .. }));
}
