//! Server side of the WebSocket HTTP upgrade.
//!
//! Reads one HTTP/1.1 request head from a freshly accepted socket, checks the
//! path and upgrade headers, and answers `101 Switching Protocols`. Any bytes
//! the client pipelined after the request head are returned so they can seed
//! the WebSocket decoder.

use std::{io, time::Duration};

use bytes::BytesMut;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_tungstenite::tungstenite::{
    handshake::server::create_response,
    http::{HeaderValue, Request, Response, StatusCode, Version, header},
};

const MAX_REQUEST_HEAD: usize = 8 * 1024;
const MAX_HEADERS: usize = 32;
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Reasons an upgrade attempt was refused.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// Reading or writing the socket failed.
    #[error("upgrade i/o error: {0}")]
    Io(#[from] io::Error),
    /// The client did not finish its request in time.
    #[error("upgrade timed out")]
    Timeout,
    /// The request head exceeded the size limit.
    #[error("upgrade request head too large")]
    TooLarge,
    /// The request was not a valid WebSocket upgrade.
    #[error("bad upgrade request: {0}")]
    BadRequest(&'static str),
    /// The request targeted another path.
    #[error("no websocket endpoint at {0:?}")]
    WrongPath(String),
}

/// Perform the upgrade handshake on `stream`.
///
/// Returns the bytes received after the request head.
///
/// # Errors
///
/// Returns [`UpgradeError`] if the request is refused; an HTTP error
/// response is written to the client first when one applies.
pub(crate) async fn accept(
    stream: &mut TcpStream,
    path: &str,
    deadline: Duration,
) -> Result<BytesMut, UpgradeError> {
    let mut buf = timeout(deadline, read_head(stream))
        .await
        .map_err(|_| UpgradeError::Timeout)??;
    let head_len = buf
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
        .ok_or(UpgradeError::BadRequest("unterminated request head"))?;
    let head = buf.split_to(head_len);

    match parse_request(&head, path) {
        Ok(response) => {
            stream.write_all(&encode_head(&response)).await?;
            Ok(buf)
        }
        Err(err) => {
            let status = match err {
                UpgradeError::WrongPath(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            stream.write_all(&encode_head(&refusal(status))).await?;
            Err(err)
        }
    }
}

async fn read_head(stream: &mut TcpStream) -> Result<BytesMut, UpgradeError> {
    let mut buf = BytesMut::with_capacity(1024);
    let mut scanned: usize = 0;
    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(UpgradeError::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        let from = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if buf
            .get(from..)
            .is_some_and(|tail| tail.windows(HEAD_TERMINATOR.len()).any(|w| w == HEAD_TERMINATOR))
        {
            return Ok(buf);
        }
        scanned = buf.len();
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(UpgradeError::TooLarge);
        }
    }
}

/// Validate the request head and build the `101` response for it.
fn parse_request(head: &[u8], expected_path: &str) -> Result<Response<()>, UpgradeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    match parsed.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(UpgradeError::BadRequest("unterminated request head")),
        Err(_) => return Err(UpgradeError::BadRequest("malformed request head")),
    }
    let target = parsed.path.unwrap_or_default();
    let path = target.split('?').next().unwrap_or_default();
    if path != expected_path {
        return Err(UpgradeError::WrongPath(path.to_owned()));
    }

    let version = match parsed.version {
        Some(1) => Version::HTTP_11,
        _ => Version::HTTP_10,
    };
    let mut builder = Request::builder()
        .method(parsed.method.unwrap_or_default())
        .uri(target)
        .version(version);
    for field in parsed.headers.iter() {
        builder = builder.header(field.name, field.value);
    }
    let request = builder
        .body(())
        .map_err(|_| UpgradeError::BadRequest("malformed request head"))?;
    create_response(&request).map_err(|_| UpgradeError::BadRequest("not a websocket upgrade request"))
}

fn refusal(status: StatusCode) -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Serialize the status line and headers of `response`.
fn encode_head(response: &Response<()>) -> Vec<u8> {
    let mut out = format!("{:?} {}\r\n", response.version(), response.status()).into_bytes();
    for (name, value) in response.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}
