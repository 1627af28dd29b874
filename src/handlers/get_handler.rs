use crate::prelude::*;
use crate::handlers::handle_error;

pub fn handle_get(response: &mut HttpResponse, route: &RouteMatch, request_path: &str) {
    let server = &route.server;

    if route.is_directory {
        for index in &route.index_files {
            let candidate = route.fs_path.join(index);
            if candidate.is_file() {
                response.start_line(HTTP_OK);
                if response.attach_file(&candidate).is_ok() {
                    return;
                }
                response.reset();
            }
        }
        if route.autoindex {
            generate_autoindex(response, &route.fs_path, request_path, server);
        } else {
            handle_error(response, HTTP_FORBIDDEN, Some(server));
        }
        return;
    }

    if route.is_file {
        response.start_line(HTTP_OK);
        if let Err(e) = response.attach_file(&route.fs_path) {
            let code = match e.kind() {
                ErrorKind::NotFound => HTTP_NOT_FOUND,
                ErrorKind::PermissionDenied => HTTP_FORBIDDEN,
                _ => HTTP_INTERNAL_SERVER_ERROR,
            };
            handle_error(response, code, Some(server));
        }
        return;
    }

    if route.exists {
        // special file (fifo, socket, device)
        handle_error(response, HTTP_FORBIDDEN, Some(server));
    } else {
        handle_error(response, HTTP_NOT_FOUND, Some(server));
    }
}

/// HTML directory listing: entries sorted lexicographically, directories
/// with a trailing '/'.
pub fn generate_autoindex(
    response: &mut HttpResponse,
    path: &Path,
    original_url: &str,
    server: &ServerConfig,
) {
    let entries = match list_directory(path) {
        Ok(entries) => entries,
        Err(_) => {
            handle_error(response, HTTP_FORBIDDEN, Some(server));
            return;
        }
    };

    let base = original_url.trim_end_matches('/');
    let mut html = format!("<html><body><h1>Index of {}</h1><ul>", original_url);
    for name in &entries {
        html.push_str(&format!("<li><a href=\"{}/{}\">{}</a></li>", base, name, name));
    }
    html.push_str("</ul></body></html>");

    response.start_line(HTTP_OK);
    response.set_body(html.into_bytes(), "text/html");
}

pub fn list_directory(path: &Path) -> io::Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in path.read_dir()? {
        let entry = entry?;
        let Ok(mut name) = entry.file_name().into_string() else {
            continue;
        };
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();
    Ok(entries)
}
