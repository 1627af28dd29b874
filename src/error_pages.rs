use crate::http::HttpResponse;

/// Built-in HTML body used when the configuration names no page for a
/// status code.
pub fn default_error_page(code: u16) -> String {
    format!(
        "<html><body><h1>{} {}</h1></body></html>",
        code,
        HttpResponse::status_text(code)
    )
}
