use webserv::http::*;
use webserv::prelude::{HTTP_BAD_REQUEST, HTTP_HEADERS_TOO_LARGE, HTTP_NOT_IMPLEMENTED};

/// Runs the parser to its next resting point, stepping through the
/// routing pause the way the connection does.
fn drive(req: &mut HttpRequest) -> Result<(), ParseError> {
    loop {
        req.parse_request()?;
        match req.state {
            ParsingState::HeadersDone => req.begin_body()?,
            _ => return Ok(()),
        }
    }
}

fn read_body(req: &mut HttpRequest) -> Vec<u8> {
    let mut out = vec![0u8; req.body.len()];
    req.body.read(&mut out);
    out
}

#[test]
fn test_simple_get_request() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

    drive(&mut req).unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/index.html");
    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.state, ParsingState::Complete);
    assert_eq!(req.headers.get("host").unwrap(), "localhost");
}

#[test]
fn test_query_string_split() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET /search?q=rust&n=10 HTTP/1.1\r\nHost: x\r\n\r\n");
    drive(&mut req).unwrap();

    assert_eq!(req.path, "/search");
    assert_eq!(req.query, "q=rust&n=10");
}

#[test]
fn test_fragmented_headers() {
    let mut req = HttpRequest::new();

    req.add_chunk(b"GET /path ");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::Incomplete);

    req.add_chunk(b"HTTP/1.1\r\n");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::Incomplete);
    assert_eq!(req.state, ParsingState::Headers);

    req.add_chunk(b"Host: x\r\nUser-Agent: test\r\n\r\n");
    drive(&mut req).unwrap();
    assert_eq!(req.state, ParsingState::Complete);
    assert_eq!(req.headers.get("user-agent").unwrap(), "test");
}

#[test]
fn test_request_split_at_every_boundary() {
    let raw = b"POST /api?k=v HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello";
    for cut in 1..raw.len() {
        let mut req = HttpRequest::new();
        req.add_chunk(&raw[..cut]);
        let _ = drive(&mut req);
        req.add_chunk(&raw[cut..]);
        drive(&mut req).unwrap();

        assert_eq!(req.state, ParsingState::Complete, "failed at cut {}", cut);
        assert_eq!(read_body(&mut req), b"hello", "failed at cut {}", cut);
    }
}

#[test]
fn test_post_request_with_body() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"POST /api HTTP/1.1\r\nHost: x\r\nContent-Length: 13\r\n\r\nHello, World!");
    drive(&mut req).unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(req.state, ParsingState::Complete);
    assert_eq!(read_body(&mut req), b"Hello, World!");
}

#[test]
fn test_content_length_zero() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"POST /api HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n");
    drive(&mut req).unwrap();
    assert_eq!(req.state, ParsingState::Complete);
    assert!(req.body.is_empty());
}

#[test]
fn test_body_excess_stays_buffered() {
    // only Content-Length bytes belong to this request
    let mut req = HttpRequest::new();
    req.add_chunk(b"POST /u HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nHelloWorld");
    drive(&mut req).unwrap();

    assert_eq!(read_body(&mut req), b"Hello");
    assert_eq!(req.buffered(), 5); // "World" waits for the next request
}

#[test]
fn test_unknown_method_is_not_implemented() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"PATCH /x HTTP/1.1\r\nHost: x\r\n\r\n");
    let err = drive(&mut req).unwrap_err();
    assert_eq!(err, ParseError::InvalidMethod);
    assert_eq!(err.status(), HTTP_NOT_IMPLEMENTED);
    assert!(req.is_error());
}

#[test]
fn test_malformed_request_line() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET /x\r\n");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::MalformedRequestLine);

    let mut req = HttpRequest::new();
    req.add_chunk(b"G3T /x HTTP/1.1\r\n");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::MalformedRequestLine);
}

#[test]
fn test_uri_must_be_absolute_path() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET example.com HTTP/1.1\r\n");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::InvalidUri);
}

#[test]
fn test_unsupported_version() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/2.0\r\n");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::InvalidVersion);
}

#[test]
fn test_missing_host_on_http11() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.1\r\n\r\n");
    let err = drive(&mut req).unwrap_err();
    assert_eq!(err, ParseError::MissingHost);
    assert_eq!(err.status(), HTTP_BAD_REQUEST);
}

#[test]
fn test_http10_without_host_is_fine() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.0\r\n\r\n");
    drive(&mut req).unwrap();
    assert_eq!(req.state, ParsingState::Complete);
}

#[test]
fn test_duplicate_host_rejected() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n");
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::DuplicateHost);
}

#[test]
fn test_oversized_header_line() {
    let mut req = HttpRequest::new();
    let huge = format!("GET / HTTP/1.1\r\nHost: x\r\nX-Big: {}\r\n\r\n", "a".repeat(9000));
    req.add_chunk(huge.as_bytes());
    let err = drive(&mut req).unwrap_err();
    assert_eq!(err, ParseError::HeaderTooLong);
    assert_eq!(err.status(), HTTP_HEADERS_TOO_LARGE);
}

#[test]
fn test_declared_body_over_limit() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 999999999\r\n\r\n");
    req.parse_request().unwrap();
    assert_eq!(req.state, ParsingState::HeadersDone);

    req.set_max_body(1024);
    assert_eq!(req.begin_body().unwrap_err(), ParseError::PayloadTooLarge);
    assert_eq!(req.error_status(), 413);
}

#[test]
fn test_body_larger_than_ring_pauses() {
    let body = vec![b'x'; 100_000];
    let mut req = HttpRequest::new();
    req.add_chunk(format!("POST / HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n", body.len()).as_bytes());
    req.add_chunk(&body);

    req.parse_request().unwrap();
    req.begin_body().unwrap();

    // the ring caps out; the parser pauses instead of discarding
    assert_eq!(req.parse_request().unwrap_err(), ParseError::BodyBufferFull);
    assert!(req.body.is_full());
    assert_eq!(req.state, ParsingState::Body);

    // drain the consumer side and resume until the full body went through
    let mut total = req.body.len();
    let pending = req.body.len();
    req.body.advance(pending);
    loop {
        match req.parse_request() {
            Ok(()) => {
                total += req.body.len();
                break;
            }
            Err(ParseError::BodyBufferFull) => {
                total += req.body.len();
                let pending = req.body.len();
                req.body.advance(pending);
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(req.state, ParsingState::Complete);
    assert_eq!(total, body.len());
}

#[test]
fn test_keep_alive_rules() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    drive(&mut req).unwrap();
    assert!(req.keep_alive());

    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    drive(&mut req).unwrap();
    assert!(!req.keep_alive());

    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.0\r\n\r\n");
    drive(&mut req).unwrap();
    assert!(!req.keep_alive());

    let mut req = HttpRequest::new();
    req.add_chunk(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
    drive(&mut req).unwrap();
    assert!(req.keep_alive());
}

#[test]
fn test_reset_is_idempotent() {
    // feeding the same bytes after reset yields the same request record
    let raw: &[u8] = b"POST /a?b=c HTTP/1.1\r\nHost: h\r\nX-K: v\r\nContent-Length: 3\r\n\r\nabc";

    let mut req = HttpRequest::new();
    req.add_chunk(raw);
    drive(&mut req).unwrap();
    let first = (
        req.method,
        req.path.clone(),
        req.query.clone(),
        req.version.clone(),
        req.headers.clone(),
        read_body(&mut req),
    );

    req.reset();
    assert_eq!(req.state, ParsingState::RequestLine);

    req.add_chunk(raw);
    drive(&mut req).unwrap();
    let second = (
        req.method,
        req.path.clone(),
        req.query.clone(),
        req.version.clone(),
        req.headers.clone(),
        read_body(&mut req),
    );

    assert_eq!(first, second);
}

#[test]
fn test_pipelined_leftover_survives_reset() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"GET /one HTTP/1.1\r\nHost: x\r\n\r\nGET /two HTTP/1.1\r\nHost: x\r\n\r\n");
    drive(&mut req).unwrap();
    assert_eq!(req.path, "/one");

    req.reset();
    drive(&mut req).unwrap();
    assert_eq!(req.path, "/two");
    assert_eq!(req.state, ParsingState::Complete);
}
