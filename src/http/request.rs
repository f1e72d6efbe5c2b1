//! The structured result of parsing an HTTP/1.1 request.

use std::collections::HashMap;

use bytes::BytesMut;

use super::Headers;
use super::parser::{ParseError, Parser, State, Status};

/// A parsed (or partially parsed) HTTP/1.1 request.
///
/// Built exclusively by [`Parser`]; everything else sees it read-only.
/// Text fields are the request's bytes decoded as UTF-8; a request whose
/// line or headers are not valid UTF-8 is rejected while parsing. The body is
/// kept verbatim.
///
/// # Examples
///
/// ```
/// use solo::http::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost:3000\r\n\r\n";
/// let request = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.header("Host"), Some("localhost:3000"));
/// assert_eq!(request.hostname(), "localhost");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub(super) method: String,
    pub(super) original_url: String,
    pub(super) path: String,
    pub(super) query: Option<String>,
    pub(super) params: HashMap<String, String>,
    pub(super) protocol: String,
    pub(super) http_version: String,
    pub(super) headers: Headers,
    pub(super) body: BytesMut,
    pub(super) hostname: String,
    pub(super) state: State,
}

impl Request {
    /// Parses a complete request held in a single buffer.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Incomplete`]: the buffer ends before the request does.
    /// - Any error [`Parser::feed`] reports for malformed input.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        match parser.feed(buf)? {
            Status::Complete => Ok(parser.into_request()),
            Status::Partial => Err(ParseError::Incomplete),
        }
    }

    /// Returns the method token, uppercased.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the URL exactly as it appeared on the request line.
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the protocol token from the request line, e.g. `HTTP`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Returns the version token from the request line, e.g. `1.1`.
    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// Returns the request headers. Names are lowercase.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the host named by the `Host` header, without a port suffix.
    ///
    /// Empty when the request carried no `Host` header.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the parse state this request reached.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns `true` once the whole request has been parsed.
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Returns the declared body length, or `None` without a `Content-Length`
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidContentLength`] unless the value is plain
    /// ASCII digits that fit in a `usize`. Signs are rejected.
    pub fn content_length(&self) -> Result<Option<usize>, ParseError> {
        let Some(raw) = self.headers.get("content-length") else {
            return Ok(None);
        };
        let digits = raw.trim_matches(|c| c == ' ' || c == '\t');
        let invalid = || ParseError::InvalidContentLength {
            value: raw.to_owned(),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse().map(Some).map_err(|_| invalid())
    }

    pub(super) fn finish_url(&mut self) {
        self.original_url = match &self.query {
            Some(query) => {
                self.params = parse_query_string(query);
                format!("{}?{}", self.path, query)
            }
            None => self.path.clone(),
        };
    }

    pub(super) fn finish_hostname(&mut self) {
        if let Some(host) = self.headers.get("host") {
            self.hostname = strip_port(host.trim()).to_owned();
        }
    }
}

// `example.com:8080` → `example.com`, `[::1]:8080` → `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Keys and values have `+` decoded as a space; percent-escapes are left as
/// they are. The first occurrence of a key wins.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("").replace('+', " ");
        let value = parts.next().unwrap_or("").replace('+', " ");
        params.entry(key).or_insert(value);
    }
    params
}
