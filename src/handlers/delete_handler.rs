use crate::prelude::*;
use crate::handlers::handle_error;

pub fn handle_delete(response: &mut HttpResponse, route: &RouteMatch) {
    let server = &route.server;

    if !route.exists {
        handle_error(response, HTTP_NOT_FOUND, Some(server));
        return;
    }
    if route.is_directory {
        handle_error(response, HTTP_FORBIDDEN, Some(server));
        return;
    }
    if !route.is_file {
        handle_error(response, HTTP_FORBIDDEN, Some(server));
        return;
    }

    match fs::remove_file(&route.fs_path) {
        Ok(()) => {
            response.reset();
            response.start_line(HTTP_NO_CONTENT);
        }
        Err(e) => match e.kind() {
            ErrorKind::NotFound => handle_error(response, HTTP_NOT_FOUND, Some(server)),
            ErrorKind::PermissionDenied => handle_error(response, HTTP_FORBIDDEN, Some(server)),
            _ => handle_error(response, HTTP_INTERNAL_SERVER_ERROR, Some(server)),
        },
    }
}
