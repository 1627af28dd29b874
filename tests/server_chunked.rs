use webserv::http::*;

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

fn chunked_request(chunks: &str) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n");
    raw.extend_from_slice(chunks.as_bytes());
    raw
}

#[test]
fn test_chunked_body_basic() {
    let mut req = HttpRequest::new();
    req.add_chunk(&chunked_request("5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"));
    drive(&mut req).unwrap();

    assert_eq!(req.state, ParsingState::Complete);
    assert!(req.is_chunked);
    assert_eq!(read_body(&mut req), b"hello world");
}

#[test]
fn test_chunked_only_terminating_chunk() {
    let mut req = HttpRequest::new();
    req.add_chunk(&chunked_request("0\r\n\r\n"));
    drive(&mut req).unwrap();

    assert_eq!(req.state, ParsingState::Complete);
    assert!(req.body.is_empty());
}

#[test]
fn test_chunked_hex_sizes() {
    let mut req = HttpRequest::new();
    let payload = "A".repeat(0x1a);
    req.add_chunk(&chunked_request(&format!("1A\r\n{}\r\n0\r\n\r\n", payload)));
    drive(&mut req).unwrap();
    assert_eq!(read_body(&mut req).len(), 0x1a);
}

#[test]
fn test_chunked_split_across_reads() {
    let raw = chunked_request("5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
    for cut in 1..raw.len() {
        let mut req = HttpRequest::new();
        req.add_chunk(&raw[..cut]);
        let _ = drive(&mut req);
        req.add_chunk(&raw[cut..]);
        drive(&mut req).unwrap();

        assert_eq!(req.state, ParsingState::Complete, "failed at cut {}", cut);
        assert_eq!(read_body(&mut req), b"hello world", "failed at cut {}", cut);
    }
}

#[test]
fn test_chunked_trailers_ignored() {
    let mut req = HttpRequest::new();
    req.add_chunk(&chunked_request("2\r\nok\r\n0\r\nX-Checksum: abc\r\nX-Other: 1\r\n\r\n"));
    drive(&mut req).unwrap();

    assert_eq!(req.state, ParsingState::Complete);
    assert_eq!(read_body(&mut req), b"ok");
    // trailers never land in the header map
    assert!(!req.headers.contains_key("x-checksum"));
}

#[test]
fn test_chunked_invalid_size() {
    let mut req = HttpRequest::new();
    req.add_chunk(&chunked_request("zz\r\ndata\r\n0\r\n\r\n"));
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::InvalidChunkSize);
}

#[test]
fn test_chunked_missing_data_crlf() {
    let mut req = HttpRequest::new();
    req.add_chunk(&chunked_request("5\r\nhelloXX0\r\n\r\n"));
    assert_eq!(drive(&mut req).unwrap_err(), ParseError::InvalidChunkSize);
}

#[test]
fn test_chunked_over_body_limit() {
    let mut req = HttpRequest::new();
    req.add_chunk(b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n");
    req.parse_request().unwrap();
    req.set_max_body(8);
    req.begin_body().unwrap();

    req.add_chunk(b"5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n");
    let mut result = Ok(());
    loop {
        match req.parse_request() {
            Ok(()) => break,
            Err(ParseError::BodyBufferFull) => {
                let pending = req.body.len();
                req.body.advance(pending);
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    assert_eq!(result.unwrap_err(), ParseError::PayloadTooLarge);
    assert_eq!(req.error_status(), 413);
}

#[test]
fn test_chunk_extension_ignored() {
    let mut req = HttpRequest::new();
    req.add_chunk(&chunked_request("5;ext=1\r\nhello\r\n0\r\n\r\n"));
    drive(&mut req).unwrap();
    assert_eq!(read_body(&mut req), b"hello");
}
