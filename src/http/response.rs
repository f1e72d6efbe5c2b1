//! HTTP/1.1 response builder and serializer.
//!
//! A [`Response`] is created for one [`Request`], mutated by the handlers the
//! router selects, and then serialized exactly once. Both
//! [`into_bytes`](Response::into_bytes) and [`send`](Response::send) take the
//! response by value, so it cannot be touched after it has gone out.

use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};

use super::{Headers, Request, StatusCode};
use crate::server::connection::{Connection, ConnectionError};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// The status line echoes the request's protocol and version tokens verbatim,
/// so a request that never got that far produces a status line starting with
/// `/`.
///
/// Every serialized response carries `Connection: Keep-Alive`, yet the server
/// closes the connection after writing it; clients must not reuse it.
///
/// # Examples
///
/// ```
/// use solo::http::{Request, Response};
///
/// let request = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// let mut response = Response::for_request(&request);
/// response.header("X-Served-By", "solo").body("<p>hi</p>");
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 9\r\n"));
/// assert!(text.ends_with("\r\n\r\n<p>hi</p>"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    protocol: String,
    http_version: String,
    status: StatusCode,
    status_message: Option<String>,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a `200` response with no headers and an empty body, answering `request`.
    pub fn for_request(request: &Request) -> Self {
        Self {
            protocol: request.protocol().to_owned(),
            http_version: request.http_version().to_owned(),
            status: StatusCode::OK,
            status_message: None,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Sets the status code.
    pub fn status(&mut self, status: impl Into<StatusCode>) -> &mut Self {
        self.status = status.into();
        self
    }

    /// Overrides the reason phrase taken from the fallback table.
    pub fn status_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.status_message = Some(message.into());
        self
    }

    /// Sets a header, replacing an earlier value with the same name.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Replaces the body.
    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Returns the status code of this response.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase the status line will carry.
    ///
    /// An explicit message wins; otherwise the fallback table is consulted,
    /// and codes it does not know get an empty phrase.
    pub fn reason(&self) -> &str {
        match &self.status_message {
            Some(message) => message,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    /// Returns the headers set so far (not including the generated ones).
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body set so far.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into its wire format.
    ///
    /// Automatically adds, after any handler-set headers:
    /// - `Content-Length: <n>` and `Content-Type: text/html` when the body is
    ///   non-empty (a handler-set `Content-Type` is kept instead);
    /// - `Connection: Keep-Alive`, always.
    pub fn into_bytes(mut self) -> BytesMut {
        // Framing headers are generated, never taken from handlers.
        self.headers.remove("content-length");
        self.headers.remove("connection");

        let mut head = String::with_capacity(128 + self.headers.len() * 64);
        // Writing into a String cannot fail.
        let _ = write!(
            head,
            "{}/{} {} {}\r\n{}",
            self.protocol,
            self.http_version,
            self.status,
            self.reason(),
            self.headers
        );
        if !self.body.is_empty() {
            let _ = write!(head, "Content-Length: {}\r\n", self.body.len());
            if !self.headers.contains("content-type") {
                head.push_str("Content-Type: text/html\r\n");
            }
        }
        head.push_str("Connection: Keep-Alive\r\n\r\n");

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.put(head.as_bytes());
        buf.put(self.body.as_slice());
        buf
    }

    /// Serializes the response and writes it to the connection's peer.
    ///
    /// # Errors
    ///
    /// Propagates the [`ConnectionError`] from [`Connection::send`].
    pub async fn send(self, connection: &mut Connection) -> Result<(), ConnectionError> {
        let bytes = self.into_bytes();
        connection.send(&bytes).await
    }
}
