pub use crate::error::Result;
pub use crate::http::*;
pub use crate::utils::RingBuffer;

pub use conf::{Config, LocationConfig, ServerConfig};
pub use mio::{
    Events, Interest, Poll, Token,
    event::Event,
    net::{TcpListener, TcpStream},
};
pub use serv_log::{debug, error, info, trace, warn};
pub use std::collections::HashMap;
pub use std::fs::{self, File};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

pub use std::{
    fmt::{self, Display},
    io,
    process::{Child, Command, Stdio},
    str::FromStr,
    time::SystemTime,
};

pub use crate::{
    cgi::CgiCoordinator,
    router::{self, RouteMatch},
};

pub const BUFFER_SIZE: usize = 4096;
pub const READ_BUF_SIZE: usize = 4096;
pub const BODY_BUFFER_CAP: usize = 64 * 1024;
pub const HEADER_LINE_MAX: usize = 8 * 1024;
pub const MAX_READ_DATA: usize = u16::MAX as usize; // 64KB staging cap

pub const SERVER_SOFTWARE: &str = "WebServ/1.0";

pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
pub const CGI_TIMEOUT: Duration = Duration::from_secs(30);

// 2xx / 3xx
pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_NO_CONTENT: u16 = 204;
pub const HTTP_MOVED_PERMANENTLY: u16 = 301;
pub const HTTP_FOUND: u16 = 302;

// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;
pub const HTTP_HEADERS_TOO_LARGE: u16 = 431;

// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const HTTP_BAD_GATEWAY: u16 = 502;
pub const HTTP_GATEWAY_TIMEOUT: u16 = 504;
