use crate::cgi::CgiState;
use crate::handlers::{handle_delete, handle_error, handle_get, handle_redirect, Upload};
use crate::prelude::*;
use crate::reactor::Reactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Reading,
    Processing,
    Sending,
    SendComplete,
    ParseError,
    Error,
    Closed,
}

/// What happens to request body bytes as they drain from the ring.
#[derive(Debug, Default)]
pub enum BodySink {
    #[default]
    None,
    /// Body declared but unwanted (error/redirect responses): read and drop.
    Discard,
    Upload(Upload),
    /// Forwarded to the CGI child's stdin by the coordinator.
    Cgi,
}

/// Decision taken once the request headers are routed; executed when the
/// request is complete.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Static,
    Upload,
    Cgi,
    Redirect(u16, String),
    Fail(u16),
}

enum ReadStatus {
    WouldBlock,
    /// Stopped because the staging buffer hit its cap; the socket may
    /// still hold data.
    Capped,
    Eof,
}

/// Per-client lifecycle: read → parse → route → produce → write →
/// reset-or-close, surviving partial I/O at every step. Owns the socket,
/// one request parser, one response builder and, for dynamic routes, the
/// CGI coordinator.
pub struct HttpConnection {
    pub stream: TcpStream,
    pub token: Token,
    config_list: Vec<Arc<ServerConfig>>,
    listen_port: u16,
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub cgi: Option<CgiCoordinator>,
    sink: BodySink,
    route: Option<RouteMatch>,
    action: Option<Action>,
    keep_alive: bool,
    pub state: ConnState,
    write_buffer: Vec<u8>,
    pub last_activity: Instant,
}

impl HttpConnection {
    pub fn new(
        stream: TcpStream,
        token: Token,
        config_list: Vec<Arc<ServerConfig>>,
        listen_port: u16,
    ) -> Self {
        Self {
            stream,
            token,
            config_list,
            listen_port,
            request: HttpRequest::new(),
            response: HttpResponse::new(),
            cgi: None,
            sink: BodySink::None,
            route: None,
            action: None,
            keep_alive: true,
            state: ConnState::Reading,
            write_buffer: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn should_close(&self) -> bool {
        matches!(self.state, ConnState::Closed | ConnState::Error)
    }

    /// Read readiness on the client socket.
    ///
    /// # Logic Steps
    /// 1. Drain the socket into the parser's staging buffer, bounded by
    ///    the staging cap.
    /// 2. Run the parse/route/drain pipeline on whatever arrived.
    /// 3. Keep alternating read and process until the socket would block,
    ///    so an edge-triggered poller never strands buffered bytes.
    pub fn on_readable(&mut self, reactor: &mut Reactor) -> Result<()> {
        self.touch();
        if self.should_close() {
            return Ok(());
        }
        self.pump_read(reactor)
    }

    fn pump_read(&mut self, reactor: &mut Reactor) -> Result<()> {
        loop {
            let status = match self.read_data() {
                Ok(status) => status,
                Err(_) => {
                    self.state = ConnState::Error;
                    return Ok(());
                }
            };

            if matches!(status, ReadStatus::Eof) {
                self.handle_peer_close(reactor);
                return Ok(());
            }

            let staged = self.request.buffered();
            if self.state == ConnState::Reading && staged > 0 {
                self.process(reactor)?;
            }

            match status {
                ReadStatus::WouldBlock => return Ok(()),
                ReadStatus::Capped => {
                    // keep reading only if processing freed staging space;
                    // otherwise downstream backpressure holds and the
                    // CGI-writable path resumes us
                    if self.state != ConnState::Reading || self.request.buffered() >= staged {
                        return Ok(());
                    }
                }
                ReadStatus::Eof => unreachable!(),
            }
        }
    }

    fn read_data(&mut self) -> io::Result<ReadStatus> {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(ReadStatus::Eof),
                Ok(n) => {
                    self.request.add_chunk(&buf[..n]);
                    if self.request.buffered() >= MAX_READ_DATA {
                        return Ok(ReadStatus::Capped);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::WouldBlock);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Peer closed its end. A running CGI child is aborted; the
    /// connection is torn down by the server after this returns.
    fn handle_peer_close(&mut self, reactor: &mut Reactor) {
        if let Some(cgi) = self.cgi.as_mut() {
            if cgi.is_running() {
                warn!("client disconnected mid-cgi, aborting child");
                cgi.abort(&mut self.response, reactor);
            }
        }
        self.state = ConnState::Closed;
    }

    /// Drives the request parser over the staged bytes.
    ///
    /// # Logic Steps
    /// 1. Parse until the machine needs more input, pauses on a full body
    ///    ring, or finishes.
    /// 2. At HeadersDone, route the request once: pick the action,
    ///    install the body limit, set up the body sink (upload file, CGI
    ///    pipes, discard).
    /// 3. On a full ring, drain into the sink and resume; CGI drains
    ///    asynchronously, so parsing yields until its pipe is writable.
    /// 4. On completion, flush the sink and execute the action.
    fn process(&mut self, reactor: &mut Reactor) -> Result<()> {
        loop {
            match self.request.parse_request() {
                Ok(()) => match self.request.state {
                    ParsingState::HeadersDone => {
                        if self.route.is_none() {
                            if let Err(e) = self.setup_request(reactor) {
                                self.parse_failure(e.status(), reactor)?;
                                return Ok(());
                            }
                        }
                    }
                    ParsingState::Complete => {
                        self.drain_sink(reactor)?;
                        self.finalize(reactor)?;
                        return Ok(());
                    }
                    _ => return Ok(()),
                },
                Err(ParseError::Incomplete) => {
                    self.drain_sink(reactor)?;
                    return Ok(());
                }
                Err(ParseError::BodyBufferFull) => {
                    let before = self.request.body.len();
                    self.drain_sink(reactor)?;
                    if self.request.body.len() >= before {
                        // sink made no room (CGI pipe blocked); yield
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.parse_failure(e.status(), reactor)?;
                    return Ok(());
                }
            }
        }
    }

    /// Headers are in: resolve the route, decide the action and prepare
    /// the body sink. Runs exactly once per request.
    fn setup_request(&mut self, reactor: &mut Reactor) -> std::result::Result<(), ParseError> {
        let host = self.request.headers.get("host").map(String::as_str);
        let route = router::route(&self.config_list, host, &self.request.path, self.request.method);
        self.keep_alive = self.request.keep_alive();

        info!(
            "{} {} {} -> {}",
            self.request.method,
            self.request.path,
            self.request.version,
            route.fs_path.display()
        );

        self.request.set_max_body(route.max_body());

        let action = if route.location.is_none() {
            Action::Fail(HTTP_NOT_FOUND)
        } else if route.escapes_root {
            Action::Fail(HTTP_FORBIDDEN)
        } else if !route.method_allowed {
            Action::Fail(HTTP_METHOD_NOT_ALLOWED)
        } else if let Some(redirect) = route.location.as_ref().and_then(|l| l.redirect.as_ref()) {
            Action::Redirect(redirect.code, redirect.target.clone())
        } else if route.is_cgi {
            Action::Cgi
        } else {
            match self.request.method {
                Method::GET | Method::DELETE => Action::Static,
                Method::POST => {
                    let has_store =
                        route.location.as_ref().is_some_and(|l| l.upload_store.is_some());
                    if has_store { Action::Upload } else { Action::Fail(HTTP_METHOD_NOT_ALLOWED) }
                }
            }
        };

        // 413 on a declared oversize body surfaces here
        self.request.begin_body()?;
        let has_body = !matches!(self.request.state, ParsingState::Complete);

        let action = match action {
            Action::Cgi => {
                match CgiCoordinator::start(
                    &self.request,
                    &route,
                    self.listen_port,
                    self.keep_alive,
                    reactor,
                    self.token,
                ) {
                    Ok(cgi) => {
                        self.cgi = Some(cgi);
                        self.sink = BodySink::Cgi;
                        Action::Cgi
                    }
                    Err(e) => {
                        error!("cgi spawn failed: {}", e);
                        self.sink = if has_body { BodySink::Discard } else { BodySink::None };
                        Action::Fail(HTTP_INTERNAL_SERVER_ERROR)
                    }
                }
            }
            Action::Upload => {
                let location = route.location.as_ref();
                let store = location.and_then(|l| l.upload_store.as_deref()).unwrap_or_default();
                let root = location.map(|l| l.root.as_str()).unwrap_or_default();
                let prefix = location.map(|l| l.route.as_str()).unwrap_or("/");
                let content_type = self.request.headers.get("content-type").map(String::as_str);

                match Upload::create(root, store, prefix, content_type) {
                    Ok(upload) => {
                        self.sink = BodySink::Upload(upload);
                        Action::Upload
                    }
                    Err(e) => {
                        error!("upload sink failed: {}", e);
                        self.sink = if has_body { BodySink::Discard } else { BodySink::None };
                        Action::Fail(HTTP_INTERNAL_SERVER_ERROR)
                    }
                }
            }
            other => {
                self.sink = if has_body { BodySink::Discard } else { BodySink::None };
                other
            }
        };

        self.route = Some(route);
        self.action = Some(action);
        Ok(())
    }

    /// Moves pending body bytes out of the ring into wherever they
    /// belong.
    fn drain_sink(&mut self, reactor: &mut Reactor) -> Result<()> {
        match &mut self.sink {
            BodySink::None => {}
            BodySink::Discard => {
                let pending = self.request.body.len();
                self.request.body.advance(pending);
            }
            BodySink::Upload(upload) => {
                if let Err(e) = upload.write_from(&mut self.request.body) {
                    error!("upload write failed: {}", e);
                    let failed = std::mem::replace(&mut self.sink, BodySink::Discard);
                    if let BodySink::Upload(failed) = failed {
                        failed.abort();
                    }
                    self.action = Some(Action::Fail(HTTP_INTERNAL_SERVER_ERROR));
                    let pending = self.request.body.len();
                    self.request.body.advance(pending);
                }
            }
            BodySink::Cgi => {
                let complete = self.request.is_complete();
                if let Some(cgi) = self.cgi.as_mut() {
                    if cgi.stdin_open() {
                        cgi.on_writable(&mut self.request.body, complete, reactor)?;
                    } else {
                        let pending = self.request.body.len();
                        self.request.body.advance(pending);
                    }
                }
            }
        }
        Ok(())
    }

    /// The request is fully parsed: produce the response (or hand the
    /// connection to the CGI coordinator) and switch to sending.
    fn finalize(&mut self, reactor: &mut Reactor) -> Result<()> {
        let action = self.action.take().unwrap_or(Action::Fail(HTTP_INTERNAL_SERVER_ERROR));

        if action == Action::Cgi {
            // response is produced by the coordinator; stay passive but
            // keep read interest so a disconnect is noticed
            self.state = ConnState::Processing;
            reactor.modify(&mut self.stream, self.token, Interest::READABLE)?;
            self.maybe_start_sending(reactor)?;
            return Ok(());
        }

        self.state = ConnState::Processing;
        match action {
            Action::Fail(code) => {
                let server = self.route.as_ref().map(|r| Arc::clone(&r.server));
                handle_error(&mut self.response, code, server.as_deref());
            }
            Action::Redirect(code, target) => {
                handle_redirect(&mut self.response, code, &target);
            }
            Action::Upload => {
                let BodySink::Upload(upload) = std::mem::take(&mut self.sink) else {
                    handle_error(&mut self.response, HTTP_INTERNAL_SERVER_ERROR, None);
                    self.start_sending(reactor)?;
                    return Ok(());
                };
                if let Err(e) = upload.finish(&mut self.response) {
                    error!("upload publish failed: {}", e);
                    let server = self.route.as_ref().map(|r| Arc::clone(&r.server));
                    handle_error(&mut self.response, HTTP_INTERNAL_SERVER_ERROR, server.as_deref());
                }
            }
            Action::Static => {
                let route = self.route.as_ref().ok_or("request finalized without a route")?;
                match self.request.method {
                    Method::GET => handle_get(&mut self.response, route, &self.request.path),
                    Method::DELETE => handle_delete(&mut self.response, route),
                    Method::POST => {
                        handle_error(
                            &mut self.response,
                            HTTP_METHOD_NOT_ALLOWED,
                            Some(&route.server),
                        );
                    }
                }
            }
            Action::Cgi => unreachable!(),
        }

        self.start_sending(reactor)
    }

    fn start_sending(&mut self, reactor: &mut Reactor) -> Result<()> {
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.response.set_header("connection", connection);
        self.response.end_headers();

        self.state = ConnState::Sending;
        reactor.modify(&mut self.stream, self.token, Interest::READABLE | Interest::WRITABLE)?;
        self.flush_response(reactor)
    }

    /// Protocol failure: answer with the parser's status suggestion and
    /// force the connection closed, since the rest of the request was
    /// never consumed.
    fn parse_failure(&mut self, status: u16, reactor: &mut Reactor) -> Result<()> {
        self.state = ConnState::ParseError;
        self.keep_alive = false;

        if let BodySink::Upload(upload) = std::mem::take(&mut self.sink) {
            upload.abort();
        }
        if let Some(cgi) = self.cgi.as_mut() {
            if cgi.is_running() {
                cgi.abort(&mut self.response, reactor);
            }
        }
        self.cgi = None;

        let server = match self.route.as_ref() {
            Some(route) => Some(Arc::clone(&route.server)),
            None => {
                let host = self.request.headers.get("host").map(String::as_str);
                if self.config_list.is_empty() {
                    None
                } else {
                    Some(router::resolve_server(&self.config_list, host))
                }
            }
        };
        handle_error(&mut self.response, status, server.as_deref());
        self.start_sending(reactor)
    }

    /// Write readiness: refill the wire buffer from the response builder
    /// and push until the socket blocks or the response ends.
    pub fn on_writable(&mut self, reactor: &mut Reactor) -> Result<()> {
        self.touch();
        if self.state != ConnState::Sending {
            return Ok(());
        }
        self.flush_response(reactor)
    }

    fn flush_response(&mut self, reactor: &mut Reactor) -> Result<()> {
        loop {
            if self.write_buffer.is_empty() {
                let mut chunk = [0u8; BUFFER_SIZE];
                match self.response.read_next_chunk(&mut chunk) {
                    Ok(0) => {
                        if self.response.is_complete() {
                            return self.send_complete(reactor);
                        }
                        // stream stalled: the CGI will feed more bytes
                        return Ok(());
                    }
                    Ok(n) => self.write_buffer.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        // headers may be on the wire already; the status
                        // cannot change, terminate the connection
                        error!("response source failed: {}", e);
                        self.state = ConnState::Error;
                        return Ok(());
                    }
                }
            }

            match self.stream.write(&self.write_buffer) {
                Ok(0) => {
                    self.state = ConnState::Error;
                    return Ok(());
                }
                Ok(n) => {
                    self.write_buffer.drain(..n);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.state = ConnState::Error;
                    return Ok(());
                }
            }
        }
    }

    /// Response fully written: either reset for the next keep-alive
    /// cycle or close.
    fn send_complete(&mut self, reactor: &mut Reactor) -> Result<()> {
        self.state = ConnState::SendComplete;

        if let Some(cgi) = self.cgi.as_ref() {
            self.keep_alive = self.keep_alive && cgi.keep_alive;
        }

        if !self.keep_alive {
            self.state = ConnState::Closed;
            return Ok(());
        }

        trace!("keep-alive: resetting for next request");
        self.request.reset();
        self.response.reset();
        self.cgi = None;
        self.sink = BodySink::None;
        self.route = None;
        self.action = None;
        self.keep_alive = true;
        self.state = ConnState::Reading;
        reactor.modify(&mut self.stream, self.token, Interest::READABLE)?;

        // a pipelined request may already be staged
        if self.request.buffered() > 0 {
            self.process(reactor)?;
        }
        Ok(())
    }

    /// Event on one of the CGI pipes, routed here by the registry.
    /// Dispatch order is read, write, then error.
    pub fn on_cgi_event(
        &mut self,
        token: Token,
        readable: bool,
        writable: bool,
        error: bool,
        reactor: &mut Reactor,
    ) -> Result<()> {
        self.touch();

        let mut resume_body = false;
        {
            let Some(cgi) = self.cgi.as_mut() else {
                return Ok(());
            };
            if !cgi.owns(token) {
                return Ok(());
            }

            if readable && cgi.out_token == Some(token) {
                cgi.on_readable(&mut self.response, reactor)?;
            }
            if writable && cgi.in_token == Some(token) {
                let complete = self.request.is_complete();
                cgi.on_writable(&mut self.request.body, complete, reactor)?;
                resume_body = !complete;
            }
            if error && cgi.owns(token) {
                cgi.on_error(token, &mut self.response, reactor)?;
            }
        }

        // the stdin drain freed ring space: resume parsing and reading
        if resume_body && self.state == ConnState::Reading {
            self.process(reactor)?;
            self.pump_read(reactor)?;
        }

        self.maybe_start_sending(reactor)?;
        Ok(())
    }

    /// Once the request is done and the coordinator has produced bytes
    /// (or died trying), the connection starts draining the response.
    fn maybe_start_sending(&mut self, reactor: &mut Reactor) -> Result<()> {
        match self.state {
            ConnState::Processing => {
                let ready = self
                    .cgi
                    .as_ref()
                    .map(|cgi| cgi.response_started() || cgi.state() == CgiState::Done)
                    .unwrap_or(false);
                if ready {
                    self.state = ConnState::Sending;
                    reactor.modify(
                        &mut self.stream,
                        self.token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;
                    self.flush_response(reactor)?;
                }
            }
            // new CGI output while already draining: push it along
            ConnState::Sending => self.flush_response(reactor)?,
            _ => {}
        }
        Ok(())
    }

    /// After a CGI abort the prepared error response (or the truncated
    /// stream tail) still has to drain to the client before the close.
    pub fn begin_abort_send(&mut self, reactor: &mut Reactor) -> Result<()> {
        if self.should_close() {
            return Ok(());
        }
        self.keep_alive = false;
        if matches!(self.sink, BodySink::Cgi) {
            self.sink = BodySink::Discard;
        }
        self.state = ConnState::Sending;
        reactor.modify(&mut self.stream, self.token, Interest::READABLE | Interest::WRITABLE)?;
        self.flush_response(reactor)
    }

    /// Deregisters every fd this connection installed. The sockets and
    /// pipes close when the owning values drop, after this call.
    pub fn teardown(&mut self, reactor: &mut Reactor) {
        if let Some(cgi) = self.cgi.as_mut() {
            cgi.abort(&mut self.response, reactor);
        }
        if let BodySink::Upload(upload) = std::mem::take(&mut self.sink) {
            upload.abort();
        }
        let _ = reactor.remove(&mut self.stream, self.token);
        self.state = ConnState::Closed;
    }
}
