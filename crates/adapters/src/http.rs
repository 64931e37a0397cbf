// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 client for builder session APIs.
//!
//! Sends requests over TCP and reads responses using Content-Length
//! framing (does not depend on connection close for EOF). A whole-call
//! timeout covers connect + write + read.

use crate::builder::BuilderError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub(crate) async fn get(
    addr: &str,
    path: &str,
    auth_token: Option<&str>,
    timeout: Duration,
) -> Result<String, BuilderError> {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\n{}Connection: close\r\n\r\n",
        path,
        addr,
        auth_header(auth_token)
    );
    timed_request(addr, &request, timeout).await
}

pub(crate) async fn post(
    addr: &str,
    path: &str,
    body: &str,
    auth_token: Option<&str>,
    timeout: Duration,
) -> Result<String, BuilderError> {
    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        path,
        addr,
        auth_header(auth_token),
        body.len(),
        body
    );
    timed_request(addr, &request, timeout).await
}

fn auth_header(auth_token: Option<&str>) -> String {
    match auth_token {
        Some(token) => format!("Authorization: Bearer {}\r\n", token),
        None => String::new(),
    }
}

async fn timed_request(
    addr: &str,
    request: &str,
    timeout: Duration,
) -> Result<String, BuilderError> {
    tokio::time::timeout(timeout, send_request(addr, request))
        .await
        .map_err(|_| BuilderError::Timeout)?
}

async fn send_request(addr: &str, request: &str) -> Result<String, BuilderError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| BuilderError::Connect(format!("connect {} failed: {}", addr, e)))?;
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| BuilderError::Connect(format!("write failed: {}", e)))?;

    let mut reader = BufReader::new(&mut stream);
    read_http_response(&mut reader).await
}

/// Open a TCP connection, send a GET, and return the reader positioned at
/// the start of the body with the response headers consumed. Used for SSE
/// streams, where the body never ends.
pub(crate) async fn open_stream(
    addr: &str,
    path: &str,
    auth_token: Option<&str>,
    connect_timeout: Duration,
) -> Result<BufReader<TcpStream>, BuilderError> {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\n{}Accept: text/event-stream\r\n\r\n",
        path,
        addr,
        auth_header(auth_token)
    );

    tokio::time::timeout(connect_timeout, async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BuilderError::Connect(format!("connect {} failed: {}", addr, e)))?;
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| BuilderError::Connect(format!("write failed: {}", e)))?;

        let mut reader = BufReader::new(stream);
        let status = read_status_and_headers(&mut reader).await?;
        if status >= 400 {
            return Err(BuilderError::Http { status, body: String::new() });
        }
        Ok(reader)
    })
    .await
    .map_err(|_| BuilderError::Timeout)?
}

/// Read and parse an HTTP/1.1 response (status + headers + sized body).
async fn read_http_response<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<String, BuilderError> {
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| BuilderError::Connect(format!("read status failed: {}", e)))?;
    let status_code =
        status_line.split_whitespace().nth(1).and_then(|s| s.parse::<u16>().ok()).unwrap_or(0);

    // Headers: only Content-Length matters (case-insensitive).
    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| BuilderError::Connect(format!("read header failed: {}", e)))?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        let line_lower = line.to_ascii_lowercase();
        if let Some(val) = line_lower.strip_prefix("content-length:") {
            content_length = val.trim().parse().unwrap_or(0);
        }
    }

    let body = if content_length > 0 {
        let mut buf = vec![0u8; content_length];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| BuilderError::Connect(format!("read body failed: {}", e)))?;
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        String::new()
    };

    if status_code == 404 {
        return Err(BuilderError::Gone);
    }
    if status_code >= 400 {
        return Err(BuilderError::Http { status: status_code, body: body.trim().to_string() });
    }

    Ok(body)
}

/// Consume the status line and headers of a streaming response.
async fn read_status_and_headers<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<u16, BuilderError> {
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| BuilderError::Connect(format!("read status failed: {}", e)))?;
    let status =
        status_line.split_whitespace().nth(1).and_then(|s| s.parse::<u16>().ok()).unwrap_or(0);
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| BuilderError::Connect(format!("read header failed: {}", e)))?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
    }
    Ok(status)
}
