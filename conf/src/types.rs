use crate::directive::Directive;
use crate::parser::{ParseError, Parser};
use std::collections::HashMap;

// --- Defaults ---
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_INDEX: &str = "index.html";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB

#[derive(Debug, Clone)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub server_names: Vec<String>,
    pub root: String,
    pub index_files: Vec<String>,
    pub client_max_body_size: usize,
    pub error_pages: HashMap<u16, String>,
    pub locations: Vec<LocationConfig>,
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub route: String,
    pub root: String,
    pub methods: Vec<String>,
    pub autoindex: bool,
    pub client_max_body_size: usize,
    pub redirect: Option<Redirect>,
    pub upload_store: Option<String>,
    pub cgi_pass: Option<String>,
    pub index_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub code: u16,
    pub target: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_names: Vec::new(),
            root: DEFAULT_ROOT.to_string(),
            index_files: vec![DEFAULT_INDEX.to_string()],
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_pages: HashMap::new(),
            locations: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Location whose route is the longest prefix of `path`, ties broken
    /// by declaration order.
    pub fn find_location(&self, path: &str) -> Option<&LocationConfig> {
        let mut best: Option<&LocationConfig> = None;
        let mut best_len = 0;

        for loc in &self.locations {
            if path.starts_with(&loc.route) && loc.route.len() > best_len {
                best = Some(loc);
                best_len = loc.route.len();
            }
        }
        best
    }
}

impl Config {
    pub fn from_str(input: &str) -> Result<Config, ParseError> {
        let directives = Parser::new(input).parse()?;
        Self::materialize(&directives)
    }

    /// Projects the validated directive tree into server records. The
    /// grammar guarantees shape; this pass only converts and inherits.
    fn materialize(directives: &[Directive]) -> Result<Config, ParseError> {
        let mut servers = Vec::new();

        for dir in directives {
            // validator restricts main context to `server` blocks
            servers.push(build_server(dir)?);
        }

        if servers.is_empty() {
            return Err(ParseError {
                line: 1,
                col: 1,
                message: "configuration defines no server".to_string(),
            });
        }

        Ok(Config { servers })
    }
}

fn loc_err(dir: &Directive, message: String) -> ParseError {
    ParseError { line: dir.line, col: dir.col, message }
}

fn build_server(dir: &Directive) -> Result<ServerConfig, ParseError> {
    let mut server = ServerConfig::default();

    // Server-level fields first so locations inherit finalized values,
    // regardless of directive order.
    for child in &dir.children {
        match child.name.as_str() {
            "listen" => {
                let (host, port) = split_host_port(&child.args[0])
                    .ok_or_else(|| loc_err(child, format!("invalid listen address '{}'", child.args[0])))?;
                server.host = host;
                server.port = port;
            }
            "server_name" => server.server_names = child.args.clone(),
            "root" => server.root = child.args[0].clone(),
            "index" => server.index_files = child.args.clone(),
            "client_max_body_size" => {
                server.client_max_body_size = parse_size(child)?;
            }
            "error_page" => {
                let code = parse_status_code(child)?;
                server.error_pages.insert(code, child.args[1].clone());
            }
            "location" => {}
            other => {
                return Err(loc_err(child, format!("directive '{}' has no server field", other)));
            }
        }
    }

    for child in &dir.children {
        if child.name == "location" {
            let location = build_location(child, &server)?;
            server.locations.push(location);
        }
    }

    Ok(server)
}

fn build_location(dir: &Directive, server: &ServerConfig) -> Result<LocationConfig, ParseError> {
    // `location /route` or `location ~ /route`
    let route = dir.args.last().cloned().unwrap_or_default();
    if !route.starts_with('/') {
        return Err(loc_err(dir, format!("location route '{}' must begin with '/'", route)));
    }

    let mut location = LocationConfig {
        route,
        root: server.root.clone(),
        methods: vec!["GET".to_string()],
        autoindex: false,
        client_max_body_size: server.client_max_body_size,
        redirect: None,
        upload_store: None,
        cgi_pass: None,
        index_files: server.index_files.clone(),
    };

    for child in &dir.children {
        match child.name.as_str() {
            "root" => location.root = child.args[0].clone(),
            "index" => location.index_files = child.args.clone(),
            "methods" => location.methods = child.args.clone(),
            "autoindex" => location.autoindex = matches!(child.args[0].as_str(), "on" | "true"),
            "client_max_body_size" => location.client_max_body_size = parse_size(child)?,
            "upload_store" => location.upload_store = Some(child.args[0].clone()),
            "cgi_pass" => location.cgi_pass = Some(child.args[0].clone()),
            "return" => {
                let code = parse_status_code(child)?;
                location.redirect = Some(Redirect { code, target: child.args[1].clone() });
            }
            other => {
                return Err(loc_err(child, format!("directive '{}' has no location field", other)));
            }
        }
    }

    Ok(location)
}

fn split_host_port(s: &str) -> Option<(String, u16)> {
    let (host, port) = s.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if port == 0 || host.is_empty() {
        return None;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Some((host.to_string(), port))
}

fn parse_size(dir: &Directive) -> Result<usize, ParseError> {
    dir.args[0]
        .parse()
        .map_err(|_| loc_err(dir, format!("invalid size '{}'", dir.args[0])))
}

fn parse_status_code(dir: &Directive) -> Result<u16, ParseError> {
    let code: u16 = dir.args[0]
        .parse()
        .map_err(|_| loc_err(dir, format!("invalid status code '{}'", dir.args[0])))?;
    if !(100..=599).contains(&code) {
        return Err(loc_err(dir, format!("status code {} out of range (100-599)", code)));
    }
    Ok(code)
}
