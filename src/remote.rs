//! Remote viewer endpoint.
//!
//! A minimal local HTTP endpoint for operators: health, vehicle status and
//! the latest camera frame as JPEG. The frame path goes through the
//! snapshot cache, so a viewer polling at 2 Hz costs two encodes per
//! second at most - usually none, when the drive loop is the faster
//! consumer.
//!
//! This is an operator convenience, not a control channel; nothing here
//! mutates vehicle state.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::vision::Camera;

const MAX_REQUEST_BYTES: usize = 4096;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Vehicle state mirrored for remote consumption. The drive loop updates
/// this; the endpoint only reads it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RemoteStatus {
    pub active_pilot: String,
    pub drivetrain: String,
}

#[derive(Serialize)]
struct StatusResponse {
    active_pilot: String,
    drivetrain: String,
    frame_timestamp_s: f64,
}

/// Handle to the running endpoint; dropping it leaves the thread running,
/// `stop` shuts it down and joins.
#[derive(Debug)]
pub struct RemoteHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RemoteHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("remote endpoint thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RemoteServer {
    addr: String,
}

impl RemoteServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Bind the listener and spawn the serving thread. Bind failures abort
    /// composition - a configured endpoint that cannot listen is an error,
    /// not optional equipment.
    pub fn spawn(
        self,
        camera: Arc<Camera>,
        status: Arc<Mutex<RemoteStatus>>,
    ) -> Result<RemoteHandle> {
        let configured_addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = serve(listener, camera, status, shutdown_thread) {
                log::error!("remote endpoint stopped: {err}");
            }
        });

        log::info!("remote endpoint listening on {addr}");
        Ok(RemoteHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn serve(
    listener: TcpListener,
    camera: Arc<Camera>,
    status: Arc<Mutex<RemoteStatus>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &camera, &status) {
                    log::warn!("remote request failed: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    camera: &Camera,
    status: &Mutex<RemoteStatus>,
) -> Result<()> {
    let (method, path) = read_request_line(&mut stream)?;
    if method != "GET" {
        return write_response(&mut stream, 405, "application/json", br#"{"error":"method_not_allowed"}"#);
    }
    match path.as_str() {
        "/health" => write_response(&mut stream, 200, "application/json", br#"{"status":"ok"}"#),
        "/status" => {
            let snapshot = status
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let body = serde_json::to_vec(&StatusResponse {
                active_pilot: snapshot.active_pilot,
                drivetrain: snapshot.drivetrain,
                frame_timestamp_s: camera.read().timestamp_s,
            })?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        "/camera" => {
            let snapshot = camera.capture_jpeg()?;
            write_response(&mut stream, 200, "image/jpeg", &snapshot.jpeg)
        }
        _ => write_response(&mut stream, 404, "application/json", br#"{"error":"not_found"}"#),
    }
}

fn read_request_line(stream: &mut TcpStream) -> Result<(String, String)> {
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    let text = String::from_utf8_lossy(&buf);
    let mut parts = text.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    if method.is_empty() || path.is_empty() {
        return Err(anyhow!("malformed request line"));
    }
    Ok((method, path))
}

fn write_response(
    stream: &mut TcpStream,
    code: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let reason = match code {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Error",
    };
    let header = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
