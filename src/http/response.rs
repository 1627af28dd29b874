use crate::prelude::*;

#[derive(Debug, PartialEq, Clone, Copy)]
enum BuildState {
    Building,
    HeadersSent,
    Body,
    Done,
}

/// Where response body bytes come from.
#[derive(Debug)]
enum BodySource {
    None,
    Memory(Vec<u8>),
    File { file: File, remaining: u64 },
    /// Unbounded stream fed by `feed_raw` (CGI). When `chunked`, each
    /// feed is wrapped in Transfer-Encoding framing and `finish_stream`
    /// appends the terminating zero chunk.
    Stream { buf: Vec<u8>, chunked: bool, finished: bool },
}

/// Staged response builder: headers are assembled first, `end_headers`
/// freezes them into wire bytes, then `read_next_chunk` drains the head
/// followed by the body source. No header can be added once body bytes
/// exist.
#[derive(Debug)]
pub struct HttpResponse {
    pub version: String,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    state: BuildState,
    head_bytes: Vec<u8>,
    cursor: usize,
    body: BodySource,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status_code: HTTP_OK,
            headers: Vec::new(),
            state: BuildState::Building,
            head_bytes: Vec::new(),
            cursor: 0,
            body: BodySource::None,
        }
    }

    pub fn start_line(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> &mut Self {
        debug_assert_eq!(self.state, BuildState::Building, "header added after end_headers");
        self.headers.push((key.to_lowercase(), value.to_string()));
        self
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.iter().any(|(k, _)| k == key)
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        let key = key.to_lowercase();
        if let Some(entry) = self.headers.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value.to_string();
        } else {
            self.headers.push((key, value.to_string()));
        }
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.set_header("content-type", content_type);
        self.body = BodySource::Memory(body);
        self
    }

    /// Serves the file as the body. Stats the file for `Content-Length`
    /// and picks `Content-Type` from the extension when absent.
    pub fn attach_file(&mut self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(io::Error::new(ErrorKind::InvalidInput, "not a regular file"));
        }

        let size = meta.len();
        self.set_header("content-length", &size.to_string());
        if !self.has_header("content-type") {
            let mime = get_mime_type(path.extension().and_then(|s| s.to_str()));
            self.set_header("content-type", mime);
        }
        self.body = BodySource::File { file, remaining: size };
        Ok(())
    }

    /// Switches the body to streaming mode. `chunked` applies wire
    /// framing for sources of unknown length.
    pub fn start_stream(&mut self, chunked: bool) {
        self.body = BodySource::Stream { buf: Vec::new(), chunked, finished: false };
    }

    /// Appends raw producer bytes to a streaming body.
    pub fn feed_raw(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let BodySource::Stream { buf, chunked, .. } = &mut self.body {
            if *chunked {
                buf.extend_from_slice(format!("{:X}\r\n", data.len()).as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            } else {
                buf.extend_from_slice(data);
            }
        }
    }

    /// The producer is done; a chunked stream gets its end marker.
    pub fn finish_stream(&mut self) {
        if let BodySource::Stream { buf, chunked, finished } = &mut self.body {
            if *chunked && !*finished {
                buf.extend_from_slice(b"0\r\n\r\n");
            }
            *finished = true;
        }
    }

    /// Freezes the status line and headers into wire bytes. Implicitly
    /// sets `Content-Length` for sized bodies and stamps the Server
    /// header.
    pub fn end_headers(&mut self) -> &mut Self {
        if self.state != BuildState::Building {
            return self;
        }

        match &self.body {
            BodySource::Memory(body) => {
                let len = body.len().to_string();
                self.set_header("content-length", &len);
                if !self.has_header("content-type") {
                    self.set_header("content-type", "text/html");
                }
            }
            BodySource::None => {
                if !self.has_header("content-length") {
                    self.set_header("content-length", "0");
                }
            }
            _ => {}
        }
        if !self.has_header("server") {
            self.set_header("server", SERVER_SOFTWARE);
        }

        let mut head = format!(
            "{} {} {}\r\n",
            self.version,
            self.status_code,
            Self::status_text(self.status_code)
        )
        .into_bytes();
        for (key, val) in &self.headers {
            head.extend_from_slice(format!("{}: {}\r\n", canonical_key(key), val).as_bytes());
        }
        head.extend_from_slice(b"\r\n");

        self.head_bytes = head;
        self.cursor = 0;
        self.state = BuildState::HeadersSent;
        self
    }

    /// Fills `out` with the next response bytes: head first, then the
    /// body source. Returns 0 when nothing is available right now; check
    /// `is_complete` to tell exhaustion from a stalled stream.
    pub fn read_next_chunk(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.state == BuildState::Building {
            self.end_headers();
        }
        if self.state == BuildState::Done || out.is_empty() {
            return Ok(0);
        }

        let mut written = 0;

        if self.cursor < self.head_bytes.len() {
            let n = (self.head_bytes.len() - self.cursor).min(out.len());
            out[..n].copy_from_slice(&self.head_bytes[self.cursor..self.cursor + n]);
            self.cursor += n;
            written = n;
            if self.cursor == self.head_bytes.len() {
                self.state = BuildState::Body;
            }
            if written == out.len() {
                self.update_done();
                return Ok(written);
            }
        } else {
            self.state = BuildState::Body;
        }

        let out = &mut out[written..];
        let n = match &mut self.body {
            BodySource::None => 0,
            BodySource::Memory(body) => {
                let n = body.len().min(out.len());
                out[..n].copy_from_slice(&body[..n]);
                body.drain(..n);
                n
            }
            BodySource::File { file, remaining } => {
                let want = (*remaining).min(out.len() as u64) as usize;
                let n = file.read(&mut out[..want])?;
                if n == 0 && *remaining > 0 {
                    // file shrank under us; nothing more will come
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "short file read"));
                }
                *remaining -= n as u64;
                n
            }
            BodySource::Stream { buf, .. } => {
                let n = buf.len().min(out.len());
                out[..n].copy_from_slice(&buf[..n]);
                buf.drain(..n);
                n
            }
        };

        self.update_done();
        Ok(written + n)
    }

    pub fn is_complete(&self) -> bool {
        self.state == BuildState::Done
    }

    fn update_done(&mut self) {
        if self.cursor < self.head_bytes.len() {
            return;
        }
        let body_done = match &self.body {
            BodySource::None => true,
            BodySource::Memory(body) => body.is_empty(),
            BodySource::File { remaining, .. } => *remaining == 0,
            BodySource::Stream { buf, finished, .. } => *finished && buf.is_empty(),
        };
        if body_done {
            self.state = BuildState::Done;
        }
    }

    pub fn reset(&mut self) {
        self.status_code = HTTP_OK;
        self.headers.clear();
        self.state = BuildState::Building;
        self.head_bytes.clear();
        self.cursor = 0;
        self.body = BodySource::None;
    }

    /// Full wire bytes in one allocation. Memory bodies only; used by
    /// tests and the error path.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        self.end_headers();
        let mut res = self.head_bytes.clone();
        if let BodySource::Memory(body) = &self.body {
            res.extend_from_slice(body);
        }
        res
    }

    pub fn status_text(code: u16) -> &'static str {
        match code {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            504 => "Gateway Timeout",
            _ => "Unknown",
        }
    }

}

/// Header keys are stored lowercased; render them on the wire in the
/// conventional `Content-Length` capitalization.
fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut at_word_start = true;
    for byte in key.bytes() {
        if byte == b'-' {
            out.push('-');
            at_word_start = true;
        } else if at_word_start {
            out.push(byte.to_ascii_uppercase() as char);
            at_word_start = false;
        } else {
            out.push(byte as char);
        }
    }
    out
}

pub fn get_mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn get_ext_from_content_type(content_type: &str) -> &'static str {
    match content_type {
        "application/json" => ".json",
        "application/pdf" => ".pdf",
        "application/xml" => ".xml",
        "application/zip" => ".zip",
        "audio/mpeg" => ".mp3",
        "image/gif" => ".gif",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        "text/css" => ".css",
        "text/html" => ".html",
        "text/javascript" => ".js",
        "text/plain" => ".txt",
        "video/mp4" => ".mp4",
        _ => ".bin",
    }
}
