use std::fs;
use webserv::http::HttpResponse;

fn drain(res: &mut HttpResponse, chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = res.read_next_chunk(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn test_basic_response_bytes() {
    let mut res = HttpResponse::new();
    res.start_line(200);
    res.set_body(b"Hello Rust".to_vec(), "text/plain");

    let bytes = res.to_bytes();
    let s = String::from_utf8_lossy(&bytes);

    assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(s.contains("Content-Type: text/plain\r\n"));
    assert!(s.contains("Content-Length: 10\r\n"));
    assert!(s.contains("Server: WebServ/1.0\r\n"));
    assert!(s.ends_with("\r\n\r\nHello Rust"));
}

#[test]
fn test_empty_body_has_content_length_zero() {
    let mut res = HttpResponse::new();
    res.start_line(204);
    let s = String::from_utf8_lossy(&res.to_bytes()).to_string();
    assert!(s.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(s.contains("Content-Length: 0\r\n"));
}

#[test]
fn test_read_next_chunk_with_tiny_buffer() {
    let mut res = HttpResponse::new();
    res.start_line(200);
    res.set_body(b"0123456789".to_vec(), "text/plain");
    res.end_headers();

    // drain three bytes at a time; reassembled output must be identical
    let drained = drain(&mut res, 3);
    let mut reference = HttpResponse::new();
    reference.start_line(200);
    reference.set_body(b"0123456789".to_vec(), "text/plain");
    assert_eq!(drained, reference.to_bytes());
    assert!(res.is_complete());
}

#[test]
fn test_headers_before_body_in_stream() {
    let mut res = HttpResponse::new();
    res.start_line(200);
    res.set_body(b"body".to_vec(), "text/plain");
    res.end_headers();

    let out = drain(&mut res, 7);
    let marker = b"\r\n\r\n";
    let pos = out.windows(4).position(|w| w == marker).unwrap();
    // every body byte comes after the header terminator
    assert_eq!(&out[pos + 4..], b"body");
}

#[test]
fn test_attach_file_sets_length_and_mime() {
    let path = std::env::temp_dir().join(format!("webserv_resp_{}.html", std::process::id()));
    fs::write(&path, "<h1>hi</h1>").unwrap();

    let mut res = HttpResponse::new();
    res.start_line(200);
    res.attach_file(&path).unwrap();
    res.end_headers();

    let out = drain(&mut res, 8);
    let s = String::from_utf8_lossy(&out);
    assert!(s.contains("Content-Length: 11\r\n"));
    assert!(s.contains("Content-Type: text/html\r\n"));
    assert!(s.ends_with("<h1>hi</h1>"));
    assert!(res.is_complete());

    let _ = fs::remove_file(&path);
}

#[test]
fn test_attach_missing_file_fails() {
    let mut res = HttpResponse::new();
    res.start_line(200);
    assert!(res.attach_file(std::path::Path::new("/no/such/file")).is_err());
}

#[test]
fn test_chunked_stream_framing() {
    let mut res = HttpResponse::new();
    res.start_line(200);
    res.add_header("transfer-encoding", "chunked");
    res.start_stream(true);
    res.end_headers();

    res.feed_raw(b"hello");
    res.feed_raw(b" world");
    res.finish_stream();

    let out = drain(&mut res, 1024);
    let s = String::from_utf8_lossy(&out);
    assert!(s.contains("Transfer-Encoding: chunked\r\n"));
    assert!(s.contains("5\r\nhello\r\n"));
    assert!(s.contains("6\r\n world\r\n"));
    assert!(s.ends_with("0\r\n\r\n"));
    assert!(res.is_complete());
}

#[test]
fn test_stream_stalls_until_finished() {
    let mut res = HttpResponse::new();
    res.start_line(200);
    res.start_stream(false);
    res.end_headers();

    res.feed_raw(b"part1");
    let mut buf = [0u8; 1024];

    // head + first part drain, then the stream stalls
    let mut got = Vec::new();
    loop {
        let n = res.read_next_chunk(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        got.extend_from_slice(&buf[..n]);
    }
    assert!(!res.is_complete());
    assert!(String::from_utf8_lossy(&got).ends_with("part1"));

    res.feed_raw(b"part2");
    res.finish_stream();
    let n = res.read_next_chunk(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"part2");
    assert!(res.is_complete());
}

#[test]
fn test_reset_clears_everything() {
    let mut res = HttpResponse::new();
    res.start_line(404);
    res.set_body(b"gone".to_vec(), "text/plain");
    let _ = res.to_bytes();

    res.reset();
    res.start_line(200);
    let s = String::from_utf8_lossy(&res.to_bytes()).to_string();
    assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!s.contains("gone"));
    assert!(s.contains("Content-Length: 0\r\n"));
}

#[test]
fn test_set_header_replaces() {
    let mut res = HttpResponse::new();
    res.add_header("connection", "keep-alive");
    res.set_header("connection", "close");
    let s = String::from_utf8_lossy(&res.to_bytes()).to_string();
    assert!(s.contains("Connection: close\r\n"));
    assert!(!s.contains("keep-alive"));
}
