use crate::handlers::handle_error;
use crate::prelude::*;
use crate::reactor::{Owner, Reactor};
use mio::unix::pipe::{Receiver, Sender};

/// A coordinator that exists has already forked; the pre-start states of
/// the lifecycle are unrepresentable by construction.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum CgiState {
    Streaming,
    Reaping,
    Done,
}

/// Drives one CGI child: owns the process, both pipe ends and a
/// header-mode parser for its reply. Input writes and output reads are
/// independent so a script may start answering before its stdin is
/// drained. The coordinator reaches `Done` only after the child has been
/// reaped, whatever the exit path.
#[derive(Debug)]
pub struct CgiCoordinator {
    child: Child,
    stdin_pipe: Option<Sender>,
    stdout_pipe: Option<Receiver>,
    pub in_token: Option<Token>,
    pub out_token: Option<Token>,
    parser: HttpRequest,
    server: Arc<ServerConfig>,
    pub keep_alive: bool,
    http10: bool,
    response_started: bool,
    state: CgiState,
    pub started_at: Instant,
    status: u16,
}

impl CgiCoordinator {
    /// Fork the interpreter with the CGI environment and wire both pipes
    /// into the reactor. The stdin end is closed immediately when the
    /// request carries no body so the child sees EOF.
    pub fn start(
        request: &HttpRequest,
        route: &RouteMatch,
        listen_port: u16,
        keep_alive: bool,
        reactor: &mut Reactor,
        client_token: Token,
    ) -> io::Result<CgiCoordinator> {
        let interpreter = route
            .location
            .as_ref()
            .and_then(|l| l.cgi_pass.clone())
            .ok_or_else(|| io::Error::other("cgi route without interpreter"))?;

        let env = build_cgi_env(request, &route.server, &route.fs_path, listen_port);

        let mut child = Command::new(&interpreter)
            .arg(&route.fs_path)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("cgi child without stdin pipe"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("cgi child without stdout pipe"))?;

        let mut sender = Sender::from(stdin);
        let mut receiver = Receiver::from(stdout);
        sender.set_nonblocking(true)?;
        receiver.set_nonblocking(true)?;

        let out_token =
            reactor.add(&mut receiver, Owner::CgiPipe(client_token), Interest::READABLE)?;

        let need_body =
            request.content_length > 0 || request.is_chunked || !request.body.is_empty();
        let (stdin_pipe, in_token) = if need_body {
            let token =
                reactor.add(&mut sender, Owner::CgiPipe(client_token), Interest::WRITABLE)?;
            (Some(sender), Some(token))
        } else {
            (None, None)
        };

        debug!("cgi started: {} {}", interpreter, route.fs_path.display());

        Ok(CgiCoordinator {
            child,
            stdin_pipe,
            stdout_pipe: Some(receiver),
            in_token,
            out_token: Some(out_token),
            parser: HttpRequest::new_cgi(),
            server: Arc::clone(&route.server),
            keep_alive,
            http10: request.version == "HTTP/1.0",
            response_started: false,
            state: CgiState::Streaming,
            started_at: Instant::now(),
            status: 0,
        })
    }

    pub fn state(&self) -> CgiState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CgiState::Streaming
    }

    pub fn response_started(&self) -> bool {
        self.response_started
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn owns(&self, token: Token) -> bool {
        self.in_token == Some(token) || self.out_token == Some(token)
    }

    /// Script stdout is readable: pull bytes, feed the reply parser, and
    /// forward parsed output into the response. EOF finishes the reply
    /// and reaps the child.
    pub fn on_readable(
        &mut self,
        response: &mut HttpResponse,
        reactor: &mut Reactor,
    ) -> io::Result<()> {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            let Some(pipe) = self.stdout_pipe.as_mut() else {
                return Ok(());
            };
            match pipe.read(&mut buf) {
                Ok(0) => {
                    self.finish_output(response, reactor)?;
                    return Ok(());
                }
                Ok(n) => {
                    self.parser.add_chunk(&buf[..n]);
                    self.pump_parser(response);
                    if self.state != CgiState::Streaming {
                        return Ok(());
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(_) => {
                    self.finish_output(response, reactor)?;
                    return Ok(());
                }
            }
        }
    }

    /// Script stdin is writable: drain the request body ring into the
    /// pipe in bounded chunks. Once the request body is complete and the
    /// ring is empty the write end closes so the child sees EOF.
    pub fn on_writable(
        &mut self,
        body: &mut RingBuffer,
        request_complete: bool,
        reactor: &mut Reactor,
    ) -> io::Result<()> {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            let Some(pipe) = self.stdin_pipe.as_mut() else {
                break;
            };
            let n = body.peek(&mut buf);
            if n == 0 {
                break;
            }
            match pipe.write(&buf[..n]) {
                Ok(written) => {
                    body.advance(written);
                    if written < n {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => {
                    // child closed its stdin; the rest of the body is
                    // discarded by the connection
                    self.close_stdin(reactor);
                    let pending = body.len();
                    body.advance(pending);
                    return Ok(());
                }
            }
        }

        if request_complete && body.is_empty() {
            self.close_stdin(reactor);
        }
        Ok(())
    }

    /// Treats a pipe error event as end of stream.
    pub fn on_error(
        &mut self,
        token: Token,
        response: &mut HttpResponse,
        reactor: &mut Reactor,
    ) -> io::Result<()> {
        if self.in_token == Some(token) {
            self.close_stdin(reactor);
            Ok(())
        } else {
            self.finish_output(response, reactor)
        }
    }

    /// The child stays alive but will never be read again: SIGKILL, reap,
    /// close everything. Used on client disconnect, reactor errors and
    /// the wall-clock timeout.
    pub fn abort(&mut self, response: &mut HttpResponse, reactor: &mut Reactor) {
        if self.state == CgiState::Done {
            return;
        }
        self.close_stdin(reactor);
        self.close_stdout(reactor);

        self.state = CgiState::Reaping;
        let _ = self.child.kill();
        let _ = self.child.wait();

        if self.response_started {
            response.finish_stream();
        } else {
            self.status = HTTP_GATEWAY_TIMEOUT;
            handle_error(response, HTTP_GATEWAY_TIMEOUT, Some(&self.server));
            response.set_header("connection", "close");
            response.end_headers();
        }
        self.keep_alive = false;
        self.state = CgiState::Done;
    }

    pub fn stdin_open(&self) -> bool {
        self.stdin_pipe.is_some()
    }

    /// Advances the reply parser and streams any parsed body bytes into
    /// the response. Malformed CGI headers surface as 502.
    fn pump_parser(&mut self, response: &mut HttpResponse) {
        loop {
            match self.parser.parse_request() {
                Ok(()) => {
                    if self.parser.state == ParsingState::HeadersDone {
                        if !self.response_started {
                            self.emit_headers(response);
                        }
                        if self.parser.begin_body().is_err() {
                            break;
                        }
                        continue;
                    }
                    break;
                }
                Err(ParseError::Incomplete) => break,
                Err(ParseError::BodyBufferFull) => {
                    self.drain_body(response);
                }
                Err(_) => {
                    self.status = HTTP_BAD_GATEWAY;
                    break;
                }
            }
        }
        self.drain_body(response);
    }

    /// First bytes past the CGI headers: translate them into the response
    /// status line and header set. A `Status: NNN reason` header
    /// overrides 200 and is consumed, not forwarded.
    fn emit_headers(&mut self, response: &mut HttpResponse) {
        self.response_started = true;

        let status = self
            .parser
            .headers
            .get("status")
            .and_then(|v| v.split_whitespace().next())
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(HTTP_OK);
        self.status = status;

        response.reset();
        response.start_line(status);

        let mut has_length = false;
        for (key, val) in &self.parser.headers {
            match key.as_str() {
                "status" | "connection" | "transfer-encoding" => continue,
                "content-length" => has_length = true,
                _ => {}
            }
            response.add_header(key, val);
        }

        // Without a Content-Length the body length is unknown: chunked
        // framing on HTTP/1.1, close-delimited on HTTP/1.0.
        if has_length {
            response.start_stream(false);
        } else if self.http10 {
            self.keep_alive = false;
            response.start_stream(false);
        } else {
            response.add_header("transfer-encoding", "chunked");
            response.start_stream(true);
        }

        response.add_header("connection", if self.keep_alive { "keep-alive" } else { "close" });
        response.end_headers();
    }

    fn drain_body(&mut self, response: &mut HttpResponse) {
        if !self.response_started {
            return;
        }
        let mut chunk = [0u8; BUFFER_SIZE];
        loop {
            let n = self.parser.body.read(&mut chunk);
            if n == 0 {
                break;
            }
            response.feed_raw(&chunk[..n]);
        }
    }

    /// EOF on stdout: the child is done producing. Synthesize 502 when it
    /// never got past its headers, otherwise close out the stream, then
    /// reap.
    fn finish_output(
        &mut self,
        response: &mut HttpResponse,
        reactor: &mut Reactor,
    ) -> io::Result<()> {
        self.close_stdout(reactor);
        self.close_stdin(reactor);

        self.parser.mark_eof();
        self.state = CgiState::Reaping;

        // a child that closed stdout but lingers must not stall the loop
        let exit = match self.child.try_wait() {
            Ok(Some(status)) => Ok(status),
            _ => {
                let _ = self.child.kill();
                self.child.wait()
            }
        };
        let clean_exit = exit.map(|s| s.success()).unwrap_or(false);

        if self.response_started && self.status != HTTP_BAD_GATEWAY {
            self.drain_body(response);
            response.finish_stream();
        } else {
            if !clean_exit {
                warn!("cgi child failed before producing a response");
            }
            self.status = HTTP_BAD_GATEWAY;
            self.keep_alive = false;
            handle_error(response, HTTP_BAD_GATEWAY, Some(&self.server));
            response.set_header("connection", "close");
            response.end_headers();
        }

        self.state = CgiState::Done;
        Ok(())
    }

    fn close_stdin(&mut self, reactor: &mut Reactor) {
        if let Some(mut pipe) = self.stdin_pipe.take() {
            if let Some(token) = self.in_token.take() {
                let _ = reactor.remove(&mut pipe, token);
            }
        }
    }

    fn close_stdout(&mut self, reactor: &mut Reactor) {
        if let Some(mut pipe) = self.stdout_pipe.take() {
            if let Some(token) = self.out_token.take() {
                let _ = reactor.remove(&mut pipe, token);
            }
        }
    }
}

impl Drop for CgiCoordinator {
    fn drop(&mut self) {
        // the child is reaped on every exit path before Done; this is the
        // backstop for teardown mid-stream
        if self.state != CgiState::Done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// CGI/1.1 environment for one request. Every request header rides along
/// as `HTTP_<NAME>`; Content-Length and Content-Type keep their own
/// variables.
pub fn build_cgi_env(
    req: &HttpRequest,
    server: &ServerConfig,
    script: &Path,
    listen_port: u16,
) -> HashMap<String, String> {
    let mut envs = HashMap::new();

    envs.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    let protocol = if req.version.is_empty() { "HTTP/1.1" } else { &req.version };
    envs.insert("SERVER_PROTOCOL".to_string(), protocol.to_string());
    envs.insert("REQUEST_METHOD".to_string(), req.method.to_string());
    envs.insert("SCRIPT_NAME".to_string(), req.path.clone());
    envs.insert("SCRIPT_FILENAME".to_string(), script.display().to_string());
    envs.insert("QUERY_STRING".to_string(), req.query.clone());

    let server_name = server
        .server_names
        .first()
        .cloned()
        .unwrap_or_else(|| server.host.clone());
    envs.insert("SERVER_NAME".to_string(), server_name);
    envs.insert("SERVER_PORT".to_string(), listen_port.to_string());
    envs.insert("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string());

    let content_length = req.headers.get("content-length").cloned().unwrap_or_else(|| "0".to_string());
    envs.insert("CONTENT_LENGTH".to_string(), content_length);
    if let Some(ct) = req.headers.get("content-type") {
        envs.insert("CONTENT_TYPE".to_string(), ct.clone());
    }

    for (key, val) in &req.headers {
        if key == "content-length" || key == "content-type" {
            continue;
        }
        let env_key = format!("HTTP_{}", key.to_uppercase().replace('-', "_"));
        envs.insert(env_key, val.clone());
    }

    envs
}
