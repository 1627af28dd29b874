use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    DELETE,
}

impl Method {
    pub fn is_allowed(&self, allowed_methods: &[String]) -> bool {
        allowed_methods.iter().any(|m| m == self.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::DELETE => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "DELETE" => Ok(Method::DELETE),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParsingState {
    RequestLine,
    Headers,
    HeadersDone,
    Body,
    ChunkedBody,
    Complete,
    Error,
}

const CRLF_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// More input is required before parsing can continue.
    Incomplete,
    /// The body ring buffer is full; the consumer must drain it.
    BodyBufferFull,
    MalformedRequestLine,
    InvalidMethod,
    InvalidVersion,
    InvalidUri,
    UriTooLong,
    InvalidHeader,
    HeaderTooLong,
    DuplicateHost,
    MissingHost,
    InvalidChunkSize,
    PayloadTooLarge,
}

impl ParseError {
    /// Response status suggested for this failure.
    pub fn status(&self) -> u16 {
        match self {
            ParseError::InvalidMethod => HTTP_NOT_IMPLEMENTED,
            ParseError::UriTooLong => HTTP_URI_TOO_LONG,
            ParseError::HeaderTooLong => HTTP_HEADERS_TOO_LARGE,
            ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
            _ => HTTP_BAD_REQUEST,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, ParseError::Incomplete | ParseError::BodyBufferFull)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => write!(f, "incomplete request"),
            ParseError::BodyBufferFull => write!(f, "body buffer full"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidMethod => write!(f, "unsupported HTTP method"),
            ParseError::InvalidVersion => write!(f, "unsupported HTTP version"),
            ParseError::InvalidUri => write!(f, "invalid request URI"),
            ParseError::UriTooLong => write!(f, "request line too long"),
            ParseError::InvalidHeader => write!(f, "invalid header line"),
            ParseError::HeaderTooLong => write!(f, "header line too long"),
            ParseError::DuplicateHost => write!(f, "duplicate Host header"),
            ParseError::MissingHost => write!(f, "missing Host header"),
            ParseError::InvalidChunkSize => write!(f, "invalid chunk size"),
            ParseError::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkState {
    ReadSize,
    ReadData(usize),
    ReadTrailingCrlf,
    ReadTrailers,
}

/// Incremental HTTP request parser. Fed raw bytes with `add_chunk`, it
/// advances through request line, headers and body without ever blocking
/// for missing input. Body bytes land in a bounded ring buffer that the
/// consumer drains while parsing is still in flight.
///
/// With `cgi_mode` the same machine parses a CGI reply: no request line,
/// headers straight away (a `Status` header ends up in the map like any
/// other), then a body that runs until `mark_eof`.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: RingBuffer,
    pub state: ParsingState,
    pub chunk_state: ChunkState,
    pub content_length: usize,
    pub is_chunked: bool,
    buffer: Vec<u8>,
    cursor: usize,
    cgi_mode: bool,
    body_remaining: usize,
    total_body_read: usize,
    max_body: usize,
    error_status: u16,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::GET,
            path: String::new(),
            query: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: RingBuffer::new(BODY_BUFFER_CAP),
            state: ParsingState::RequestLine,
            chunk_state: ChunkState::ReadSize,
            content_length: 0,
            is_chunked: false,
            buffer: Vec::with_capacity(READ_BUF_SIZE),
            cursor: 0,
            cgi_mode: false,
            body_remaining: 0,
            total_body_read: 0,
            max_body: usize::MAX,
            error_status: 0,
        }
    }

    /// Parser for a CGI reply: starts at the header phase.
    pub fn new_cgi() -> Self {
        let mut parser = Self::new();
        parser.cgi_mode = true;
        parser.state = ParsingState::Headers;
        parser
    }

    pub fn add_chunk(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParsingState::Complete
    }

    pub fn is_error(&self) -> bool {
        self.state == ParsingState::Error
    }

    pub fn headers_complete(&self) -> bool {
        !matches!(self.state, ParsingState::RequestLine | ParsingState::Headers)
    }

    pub fn error_status(&self) -> u16 {
        self.error_status
    }

    pub fn set_max_body(&mut self, max: usize) {
        self.max_body = max;
    }

    pub fn keep_alive(&self) -> bool {
        let conn = self
            .headers
            .get("connection")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();

        if self.version == "HTTP/1.1" {
            conn != "close"
        } else {
            conn == "keep-alive"
        }
    }

    /// Back to the start state for the next keep-alive request. Pipelined
    /// bytes stay in the staging buffer; the ring allocation is reused.
    pub fn reset(&mut self) {
        self.method = Method::GET;
        self.path.clear();
        self.query.clear();
        self.version.clear();
        self.headers.clear();
        self.state = if self.cgi_mode { ParsingState::Headers } else { ParsingState::RequestLine };
        self.chunk_state = ChunkState::ReadSize;
        self.content_length = 0;
        self.is_chunked = false;
        self.buffer.drain(..self.cursor);
        self.cursor = 0;
        self.body_remaining = 0;
        self.total_body_read = 0;
        self.max_body = usize::MAX;
        self.error_status = 0;

        let pending = self.body.len();
        self.body.advance(pending);
        self.body.clear();
    }

    /// Drives the state machine as far as the buffered input allows.
    ///
    /// Stops at `HeadersDone` so the owner can route the request and
    /// install the body limit before any body byte is consumed; call
    /// `begin_body` to continue. `Err(Incomplete)` means feed more bytes,
    /// `Err(BodyBufferFull)` means drain the ring; both leave the state
    /// untouched. Any other error is terminal and records its status.
    pub fn parse_request(&mut self) -> std::result::Result<(), ParseError> {
        loop {
            let res = match self.state {
                ParsingState::RequestLine => self.parse_request_line(),
                ParsingState::Headers => self.parse_headers(),
                ParsingState::Body => self.parse_body(),
                ParsingState::ChunkedBody => self.parse_chunked_body(),
                ParsingState::HeadersDone | ParsingState::Complete => return Ok(()),
                ParsingState::Error => return Err(ParseError::MalformedRequestLine),
            };

            match res {
                Ok(()) => {
                    if matches!(self.state, ParsingState::HeadersDone | ParsingState::Complete) {
                        return Ok(());
                    }
                }
                Err(e) if e.is_fatal() => {
                    self.state = ParsingState::Error;
                    self.error_status = e.status();
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Transition out of `HeadersDone` once the owner has applied the
    /// routed body limit. Decides between chunked, sized and empty body.
    pub fn begin_body(&mut self) -> std::result::Result<(), ParseError> {
        debug_assert_eq!(self.state, ParsingState::HeadersDone);

        if self.cgi_mode {
            self.body_remaining = usize::MAX;
            self.state = ParsingState::Body;
            return Ok(());
        }

        self.is_chunked = self
            .headers
            .get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        if self.is_chunked {
            self.chunk_state = ChunkState::ReadSize;
            self.state = ParsingState::ChunkedBody;
            return Ok(());
        }

        if let Some(cl) = self.headers.get("content-length") {
            let length: usize = match cl.trim().parse() {
                Ok(n) => n,
                Err(_) => return Err(self.fail(ParseError::InvalidHeader)),
            };
            if length > self.max_body {
                return Err(self.fail(ParseError::PayloadTooLarge));
            }
            self.content_length = length;
            self.body_remaining = length;
            self.state = if length == 0 { ParsingState::Complete } else { ParsingState::Body };
        } else {
            self.state = ParsingState::Complete;
        }
        Ok(())
    }

    /// CGI mode only: the pipe reached EOF, whatever arrived is the whole
    /// reply.
    pub fn mark_eof(&mut self) {
        if self.cgi_mode && self.state == ParsingState::Body {
            self.state = ParsingState::Complete;
        }
    }

    fn fail(&mut self, e: ParseError) -> ParseError {
        self.state = ParsingState::Error;
        self.error_status = e.status();
        e
    }

    fn parse_request_line(&mut self) -> std::result::Result<(), ParseError> {
        let Some(line_end) = self.find_line_end(self.cursor) else {
            if self.buffered() > HEADER_LINE_MAX {
                return Err(ParseError::UriTooLong);
            }
            return Err(ParseError::Incomplete);
        };

        let line_bytes = &self.buffer[self.cursor..line_end.at];
        let request_line =
            std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::MalformedRequestLine);
        }

        if parts[0].is_empty() || !parts[0].bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ParseError::MalformedRequestLine);
        }
        self.method = parts[0].parse()?;

        if !parts[1].starts_with('/') {
            return Err(ParseError::InvalidUri);
        }
        match parts[1].split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query = query.to_string();
            }
            None => {
                self.path = parts[1].to_string();
                self.query = String::new();
            }
        }

        if parts[2] != "HTTP/1.1" && parts[2] != "HTTP/1.0" {
            return Err(ParseError::InvalidVersion);
        }
        self.version = parts[2].to_string();

        self.cursor = line_end.next;
        self.state = ParsingState::Headers;
        Ok(())
    }

    fn parse_headers(&mut self) -> std::result::Result<(), ParseError> {
        loop {
            let Some(line_end) = self.find_line_end(self.cursor) else {
                if self.buffered() > HEADER_LINE_MAX {
                    return Err(ParseError::HeaderTooLong);
                }
                return Err(ParseError::Incomplete);
            };

            if line_end.at == self.cursor {
                // empty line: headers finished, drop the consumed prefix
                self.buffer.drain(..line_end.next);
                self.cursor = 0;
                self.state = ParsingState::HeadersDone;

                if !self.cgi_mode
                    && self.version == "HTTP/1.1"
                    && !self.headers.contains_key("host")
                {
                    return Err(ParseError::MissingHost);
                }
                return Ok(());
            }

            if line_end.at - self.cursor > HEADER_LINE_MAX {
                return Err(ParseError::HeaderTooLong);
            }

            let line = std::str::from_utf8(&self.buffer[self.cursor..line_end.at])
                .map_err(|_| ParseError::InvalidHeader)?;
            let Some(sep) = line.find(':') else {
                return Err(ParseError::InvalidHeader);
            };

            let key = line[..sep].trim().to_ascii_lowercase();
            let val = line[sep + 1..].trim().to_string();
            if key.is_empty() {
                return Err(ParseError::InvalidHeader);
            }
            if key == "host" && self.headers.contains_key("host") {
                return Err(ParseError::DuplicateHost);
            }

            self.headers.insert(key, val);
            self.cursor = line_end.next;
        }
    }

    /// Content-Length body (or the until-EOF CGI body): move bytes from
    /// the staging buffer into the ring as capacity allows.
    fn parse_body(&mut self) -> std::result::Result<(), ParseError> {
        if self.body_remaining == 0 {
            self.state = ParsingState::Complete;
            return Ok(());
        }

        let available = self.buffered();
        if available == 0 {
            return Err(ParseError::Incomplete);
        }

        if self.body.is_full() {
            return Err(ParseError::BodyBufferFull);
        }
        let want = available.min(self.body_remaining);
        let moved = self.body.write(&self.buffer[self.cursor..self.cursor + want]);
        self.buffer.drain(self.cursor..self.cursor + moved);
        if self.body_remaining != usize::MAX {
            self.body_remaining -= moved;
        }
        self.total_body_read += moved;

        if self.body_remaining == 0 {
            self.state = ParsingState::Complete;
            Ok(())
        } else if self.buffered() > 0 {
            Err(ParseError::BodyBufferFull)
        } else {
            Err(ParseError::Incomplete)
        }
    }

    fn parse_chunked_body(&mut self) -> std::result::Result<(), ParseError> {
        loop {
            match self.chunk_state {
                ChunkState::ReadSize => {
                    let Some(line_end) = self.find_line_end(self.cursor) else {
                        // a chunk-size line is a few hex digits at most
                        if self.buffered() >= 18 {
                            return Err(ParseError::InvalidChunkSize);
                        }
                        return Err(ParseError::Incomplete);
                    };

                    let line = std::str::from_utf8(&self.buffer[self.cursor..line_end.at])
                        .map_err(|_| ParseError::InvalidChunkSize)?;
                    // chunk extensions after ';' are ignored
                    let size_str = line.split(';').next().unwrap_or("").trim();
                    let chunk_size = usize::from_str_radix(size_str, 16)
                        .map_err(|_| ParseError::InvalidChunkSize)?;

                    if self.total_body_read + chunk_size > self.max_body {
                        return Err(ParseError::PayloadTooLarge);
                    }

                    self.buffer.drain(..line_end.next);
                    self.cursor = 0;
                    self.chunk_state = if chunk_size == 0 {
                        ChunkState::ReadTrailers
                    } else {
                        ChunkState::ReadData(chunk_size)
                    };
                }

                ChunkState::ReadData(remaining) => {
                    let available = self.buffered();
                    if available == 0 {
                        return Err(ParseError::Incomplete);
                    }
                    if self.body.is_full() {
                        return Err(ParseError::BodyBufferFull);
                    }

                    let want = available.min(remaining);
                    let moved = self.body.write(&self.buffer[self.cursor..self.cursor + want]);
                    self.buffer.drain(self.cursor..self.cursor + moved);
                    self.total_body_read += moved;

                    self.chunk_state = if remaining == moved {
                        ChunkState::ReadTrailingCrlf
                    } else {
                        ChunkState::ReadData(remaining - moved)
                    };
                }

                ChunkState::ReadTrailingCrlf => {
                    if self.buffered() < CRLF_LEN {
                        return Err(ParseError::Incomplete);
                    }
                    if &self.buffer[self.cursor..self.cursor + CRLF_LEN] != b"\r\n" {
                        return Err(ParseError::InvalidChunkSize);
                    }
                    self.buffer.drain(..self.cursor + CRLF_LEN);
                    self.cursor = 0;
                    self.chunk_state = ChunkState::ReadSize;
                }

                ChunkState::ReadTrailers => {
                    // permitted but ignored
                    let Some(line_end) = self.find_line_end(self.cursor) else {
                        if self.buffered() > HEADER_LINE_MAX {
                            return Err(ParseError::HeaderTooLong);
                        }
                        return Err(ParseError::Incomplete);
                    };
                    let was_empty = line_end.at == self.cursor;
                    self.buffer.drain(..line_end.next);
                    self.cursor = 0;
                    if was_empty {
                        self.state = ParsingState::Complete;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Next line terminator at or after `from`. CGI replies may use bare
    /// LF line endings; client requests must use CRLF.
    fn find_line_end(&self, from: usize) -> Option<LineEnd> {
        let mut pos = from;
        while let Some(rel) = self.buffer[pos..].iter().position(|&b| b == b'\n') {
            let nl = pos + rel;
            if nl > from && self.buffer[nl - 1] == b'\r' {
                return Some(LineEnd { at: nl - 1, next: nl + 1 });
            }
            if self.cgi_mode {
                return Some(LineEnd { at: nl, next: nl + 1 });
            }
            pos = nl + 1;
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct LineEnd {
    /// Index of the terminator (line content is `[start..at]`).
    at: usize,
    /// Index of the first byte after the terminator.
    next: usize,
}
