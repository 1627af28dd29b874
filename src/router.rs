use crate::prelude::*;

/// Outcome of routing one request: the chosen server and location, the
/// resolved filesystem path, and everything the handler needs to decide
/// between static serving, CGI, redirect and the error statuses.
#[derive(Debug)]
pub struct RouteMatch {
    pub server: Arc<ServerConfig>,
    pub location: Option<LocationConfig>,
    pub fs_path: PathBuf,
    pub exists: bool,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_redirect: bool,
    pub is_cgi: bool,
    pub method_allowed: bool,
    pub autoindex: bool,
    pub escapes_root: bool,
    pub index_files: Vec<String>,
}

impl RouteMatch {
    pub fn max_body(&self) -> usize {
        self.location
            .as_ref()
            .map(|l| l.client_max_body_size)
            .unwrap_or(self.server.client_max_body_size)
    }
}

/// Picks the server for this listen address by `Host` header. The port
/// part of the header is ignored; names compare case-insensitively. No
/// name match falls back to the first server bound to the address.
pub fn resolve_server(servers: &[Arc<ServerConfig>], host: Option<&str>) -> Arc<ServerConfig> {
    if let Some(host) = host {
        let hostname = host.split(':').next().unwrap_or("").to_ascii_lowercase();
        for server in servers {
            if server
                .server_names
                .iter()
                .any(|name| name.to_ascii_lowercase() == hostname)
            {
                return Arc::clone(server);
            }
        }
    }
    Arc::clone(&servers[0])
}

/// Full routing resolution: virtual host, longest-prefix location,
/// filesystem path with traversal containment, and the kind decision
/// (redirect > CGI > directory > file > absent).
pub fn route(
    servers: &[Arc<ServerConfig>],
    host: Option<&str>,
    path: &str,
    method: Method,
) -> RouteMatch {
    let server = resolve_server(servers, host);

    let Some(location) = server.find_location(path).cloned() else {
        return RouteMatch {
            server,
            location: None,
            fs_path: PathBuf::new(),
            exists: false,
            is_file: false,
            is_directory: false,
            is_redirect: false,
            is_cgi: false,
            method_allowed: false,
            autoindex: false,
            escapes_root: false,
            index_files: Vec::new(),
        };
    };

    let method_allowed = method.is_allowed(&location.methods);
    let is_redirect = location.redirect.is_some();
    let autoindex = location.autoindex;
    let index_files = location.index_files.clone();

    let remainder = path.strip_prefix(&location.route).unwrap_or(path);
    let (fs_path, escapes_root) = resolve_fs_path(&location.root, remainder);

    let meta = fs::metadata(&fs_path).ok();
    let is_file = meta.as_ref().map(|m| m.is_file()).unwrap_or(false);
    let is_directory = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
    let exists = meta.is_some();

    let is_cgi = location.cgi_pass.is_some() && is_file;

    RouteMatch {
        server,
        location: Some(location),
        fs_path,
        exists,
        is_file,
        is_directory,
        is_redirect,
        is_cgi,
        method_allowed,
        autoindex,
        escapes_root,
        index_files,
    }
}

/// Joins root and path remainder, resolving `.` and `..` lexically.
/// Returns the normalized path and whether the remainder tried to climb
/// out of the root. Lexical on purpose: the target may not exist yet and
/// must still route to a clean 404.
fn resolve_fs_path(root: &str, remainder: &str) -> (PathBuf, bool) {
    let mut depth: i32 = 0;
    let mut escaped = false;
    let mut path = PathBuf::from(root);

    for segment in remainder.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    escaped = true;
                } else {
                    path.pop();
                }
            }
            seg => {
                depth += 1;
                path.push(seg);
            }
        }
    }

    (path, escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fs_path_plain() {
        let (path, escaped) = resolve_fs_path("./www", "/a/b.txt");
        assert_eq!(path, PathBuf::from("./www/a/b.txt"));
        assert!(!escaped);
    }

    #[test]
    fn test_resolve_fs_path_dotdot_inside() {
        let (path, escaped) = resolve_fs_path("./www", "/a/../b.txt");
        assert_eq!(path, PathBuf::from("./www/b.txt"));
        assert!(!escaped);
    }

    #[test]
    fn test_resolve_fs_path_escape() {
        let (_, escaped) = resolve_fs_path("./www", "/../etc/passwd");
        assert!(escaped);
        let (_, escaped) = resolve_fs_path("./www", "/a/../../etc");
        assert!(escaped);
    }
}
