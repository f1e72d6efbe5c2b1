//! Incremental HTTP/1.1 request parser.
//!
//! The parser is a byte-at-a-time state machine. [`transition`] is a pure
//! function from `(State, byte)` to the next state plus an [`Effect`]
//! describing how the request under construction changes; [`Parser`] applies
//! those effects to a [`Request`] and keeps the scratch buffers that must
//! survive between chunks. Splitting the input at any byte boundary yields
//! the same request as feeding it in one piece.
//!
//! Text fields are collected as raw bytes and decoded as UTF-8 once the field
//! ends, so a multi-byte character split across chunks is reassembled before
//! decoding. A field that is not valid UTF-8 fails with
//! [`ParseError::InvalidUtf8`].
//!
//! ```text
//!  method ─SP─▶ path ─SP─────────────▶ protocol ─'/'─▶ http_version ─CR─▶ cr
//!                 └─'?'─▶ query ─SP─────┘                                 │LF
//!                                                                         ▼
//!   header_value ◀─':'─ header_key ◀─any─ crlf ─CR─▶ crlfcr ─LF─▶ done ◀─┐
//!        └──────────────────CR──────────▶ cr            (Content-Length) │
//!                                                       └──▶ body ───────┘
//! ```

use thiserror::Error;

use super::request::Request;

/// Default upper bound on the bytes a single request may occupy (8 MiB).
pub const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Position of the parser inside the request grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Method,
    Path,
    Query,
    Protocol,
    HttpVersion,
    HeaderKey,
    HeaderValue,
    Body,
    /// Saw CR at the end of a line.
    Cr,
    /// Saw CRLF; the next byte starts a header line or the final CR.
    Crlf,
    /// Saw CRLF CR; expecting the LF that closes the header block.
    CrlfCr,
    Done,
    Invalid,
}

impl State {
    /// Returns `true` for `Done` and `Invalid`, which absorb every further byte.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Invalid)
    }
}

/// The change a single byte makes to the request under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The byte is consumed without changing the request.
    Skip,
    Method(u8),
    Path(u8),
    /// `?` seen: the request has a (possibly empty) query string.
    QueryStart,
    Query(u8),
    /// The URL is complete; snapshot it as the original URL.
    Url,
    Protocol(u8),
    Version(u8),
    HeaderKey(u8),
    /// A header value byte. Spaces are dropped while the value is still empty.
    HeaderValue(u8),
    /// End of a header line; commit the buffered name and value.
    Commit,
    /// End of the header block.
    HeadersEnd,
    Body(u8),
}

/// Computes the next state and the effect of consuming `byte` in `state`.
///
/// This is the whole grammar; it has no I/O and no hidden state.
///
/// # Examples
///
/// ```
/// use solo::http::parser::{transition, Effect, State};
///
/// assert_eq!(transition(State::Method, b'G'), (State::Method, Effect::Method(b'G')));
/// assert_eq!(transition(State::Method, b' '), (State::Path, Effect::Skip));
/// assert_eq!(transition(State::Cr, b'x'), (State::Invalid, Effect::Skip));
/// ```
pub fn transition(state: State, byte: u8) -> (State, Effect) {
    match (state, byte) {
        (State::Method, b' ') => (State::Path, Effect::Skip),
        (State::Method, b) => (State::Method, Effect::Method(b)),

        (State::Path, b' ') => (State::Protocol, Effect::Url),
        (State::Path, b'?') => (State::Query, Effect::QueryStart),
        (State::Path, b) => (State::Path, Effect::Path(b)),

        (State::Query, b' ') => (State::Protocol, Effect::Url),
        (State::Query, b) => (State::Query, Effect::Query(b)),

        (State::Protocol, b'/') => (State::HttpVersion, Effect::Skip),
        (State::Protocol, b) => (State::Protocol, Effect::Protocol(b)),

        (State::HttpVersion, b'\r') => (State::Cr, Effect::Skip),
        (State::HttpVersion, b) => (State::HttpVersion, Effect::Version(b)),

        (State::Cr, b'\n') => (State::Crlf, Effect::Skip),
        (State::Cr, _) => (State::Invalid, Effect::Skip),

        (State::Crlf, b'\r') => (State::CrlfCr, Effect::Skip),
        (State::Crlf, b) => (State::HeaderKey, Effect::HeaderKey(b)),

        (State::HeaderKey, b':') => (State::HeaderValue, Effect::Skip),
        // A header line without a colon.
        (State::HeaderKey, b'\r' | b'\n') => (State::Invalid, Effect::Skip),
        (State::HeaderKey, b) => (State::HeaderKey, Effect::HeaderKey(b)),

        (State::HeaderValue, b'\r') => (State::Cr, Effect::Commit),
        (State::HeaderValue, b) => (State::HeaderValue, Effect::HeaderValue(b)),

        (State::CrlfCr, b'\n') => (State::Done, Effect::HeadersEnd),
        (State::CrlfCr, _) => (State::Invalid, Effect::Skip),

        (State::Body, b) => (State::Body, Effect::Body(b)),

        (State::Done, _) => (State::Done, Effect::Skip),
        (State::Invalid, _) => (State::Invalid, Effect::Skip),
    }
}

/// Errors that end parsing of a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request: unexpected byte 0x{byte:02x} in state {state:?}")]
    Malformed { state: State, byte: u8 },

    #[error("request field is not valid UTF-8 in state {state:?}")]
    InvalidUtf8 { state: State },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("request exceeds maximum allowed size of {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("request is incomplete, more data needed")]
    Incomplete,
}

/// Outcome of feeding a chunk to the [`Parser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The request is complete; bytes after its end were ignored.
    Complete,
    /// More bytes are needed.
    Partial,
}

/// Drives [`transition`] over successive chunks and builds the [`Request`].
///
/// # Examples
///
/// ```
/// use solo::http::{Parser, Status};
///
/// let mut parser = Parser::new();
/// assert_eq!(parser.feed(b"GET /index.ht").unwrap(), Status::Partial);
/// assert_eq!(parser.feed(b"ml HTTP/1.1\r\nHost: a\r\n\r\n").unwrap(), Status::Complete);
///
/// let request = parser.into_request();
/// assert_eq!(request.path(), "/index.html");
/// assert_eq!(request.hostname(), "a");
/// ```
#[derive(Debug)]
pub struct Parser {
    request: Request,
    // Bytes of the request-line token being read.
    token: Vec<u8>,
    key: Vec<u8>,
    value: Vec<u8>,
    body_remaining: usize,
    consumed: usize,
    max_bytes: usize,
    error: Option<ParseError>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser for one request, limited to [`MAX_REQUEST_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_limit(MAX_REQUEST_SIZE)
    }

    /// Creates a parser that rejects requests longer than `max_bytes`.
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            request: Request::default(),
            token: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
            body_remaining: 0,
            consumed: 0,
            max_bytes,
            error: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> State {
        self.request.state()
    }

    /// Returns the request built so far.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consumes the parser, returning the request in whatever state it reached.
    pub fn into_request(self) -> Request {
        self.request
    }

    /// Feeds the next chunk of bytes.
    ///
    /// Bytes after the end of a complete request are ignored. Once an error
    /// has been returned, every later call returns the same error.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Malformed`]: the bytes cannot belong to a request.
    /// - [`ParseError::InvalidUtf8`]: a request-line token or header is not
    ///   valid UTF-8.
    /// - [`ParseError::InvalidContentLength`]: the `Content-Length` header is
    ///   not a decimal number.
    /// - [`ParseError::TooLarge`]: the request did not complete within the
    ///   configured byte limit.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Status, ParseError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        for &byte in chunk {
            let state = self.request.state();
            if state == State::Done {
                break;
            }
            if self.consumed == self.max_bytes {
                return Err(self.poison(ParseError::TooLarge {
                    max_bytes: self.max_bytes,
                }));
            }
            self.consumed += 1;

            let (next, effect) = transition(state, byte);
            if next == State::Invalid {
                return Err(self.poison(ParseError::Malformed { state, byte }));
            }
            self.request.state = next;
            if next != state {
                self.end_field(state)?;
            }
            self.apply(effect)?;
        }

        Ok(match self.request.state() {
            State::Done => Status::Complete,
            _ => Status::Partial,
        })
    }

    // Moves the request to `Invalid` and remembers the error for later calls.
    fn poison(&mut self, err: ParseError) -> ParseError {
        self.request.state = State::Invalid;
        self.error = Some(err.clone());
        err
    }

    // Leaving a request-line state ends its token.
    fn end_field(&mut self, state: State) -> Result<(), ParseError> {
        if !matches!(
            state,
            State::Method | State::Path | State::Query | State::Protocol | State::HttpVersion
        ) {
            return Ok(());
        }
        let text = match String::from_utf8(std::mem::take(&mut self.token)) {
            Ok(text) => text,
            Err(_) => return Err(self.poison(ParseError::InvalidUtf8 { state })),
        };

        let req = &mut self.request;
        match state {
            State::Method => req.method = text,
            State::Path => req.path = text,
            State::Query => req.query = Some(text),
            State::Protocol => req.protocol = text,
            _ => req.http_version = text,
        }
        Ok(())
    }

    fn apply(&mut self, effect: Effect) -> Result<(), ParseError> {
        let req = &mut self.request;
        match effect {
            Effect::Skip => {}
            Effect::Method(b) => self.token.push(b.to_ascii_uppercase()),
            Effect::Path(b) | Effect::Query(b) | Effect::Protocol(b) | Effect::Version(b) => {
                self.token.push(b)
            }
            Effect::QueryStart => req.query = Some(String::new()),
            Effect::Url => req.finish_url(),
            Effect::HeaderKey(b) => self.key.push(b.to_ascii_lowercase()),
            Effect::HeaderValue(b' ') if self.value.is_empty() => {}
            Effect::HeaderValue(b) => self.value.push(b),
            Effect::Commit => return self.commit_header(),
            Effect::HeadersEnd => return self.headers_end(),
            Effect::Body(b) => {
                req.body.extend_from_slice(&[b]);
                self.body_remaining -= 1;
                if self.body_remaining == 0 {
                    req.state = State::Done;
                }
            }
        }
        Ok(())
    }

    fn commit_header(&mut self) -> Result<(), ParseError> {
        let key = String::from_utf8(std::mem::take(&mut self.key));
        let value = String::from_utf8(std::mem::take(&mut self.value));
        match (key, value) {
            (Ok(key), Ok(value)) => {
                self.request.headers.insert_first(key, value);
                Ok(())
            }
            _ => Err(self.poison(ParseError::InvalidUtf8 {
                state: State::HeaderValue,
            })),
        }
    }

    // The header block is complete. A positive Content-Length keeps the
    // parser reading into the body; otherwise the request is done.
    fn headers_end(&mut self) -> Result<(), ParseError> {
        self.request.finish_hostname();

        match self.request.content_length() {
            Ok(Some(length)) if length > 0 => {
                self.body_remaining = length;
                self.request.state = State::Body;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(self.poison(e)),
        }
    }
}
