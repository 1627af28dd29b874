pub mod delete_handler;
pub mod get_handler;
pub mod upload_handler;

pub use delete_handler::*;
pub use get_handler::*;
pub use upload_handler::*;

use crate::error_pages::default_error_page;
use crate::prelude::*;

/// Rebuilds `res` as an error response: the configured error page for the
/// code when one exists and is readable, the built-in HTML body
/// otherwise.
pub fn handle_error(res: &mut HttpResponse, code: u16, server: Option<&ServerConfig>) {
    res.reset();
    res.start_line(code);

    if let Some(cfg) = server {
        if let Some(page) = cfg.error_pages.get(&code) {
            let path = resolve_config_path(&cfg.root, page);
            if res.attach_file(&path).is_ok() {
                return;
            }
        }
    }

    res.set_body(default_error_page(code).into_bytes(), "text/html");
}

pub fn handle_redirect(res: &mut HttpResponse, code: u16, target: &str) {
    res.reset();
    res.start_line(code);
    res.add_header("location", target);
}

/// Config paths starting with '/' are taken relative to the server root
/// unless they resolve on their own; everything else joins the root.
pub fn resolve_config_path(root: &str, path: &str) -> PathBuf {
    let joined = Path::new(root).join(path.trim_start_matches('/'));
    if joined.exists() {
        return joined;
    }
    PathBuf::from(path)
}
