use std::error::Error;
use std::fmt;
use std::io;

/// Catch-all failure for startup and event-loop paths. Anything
/// implementing `Error` converts into it through `?`; plain strings are
/// accepted for one-off diagnostics.
pub struct ServerError(Box<dyn Error>);

impl ServerError {
    pub fn inner(&self) -> &dyn Error {
        self.0.as_ref()
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<conf::ParseError> for ServerError {
    fn from(e: conf::ParseError) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<String> for ServerError {
    fn from(msg: String) -> Self {
        ServerError(Box::new(io::Error::other(msg)))
    }
}

impl From<&str> for ServerError {
    fn from(msg: &str) -> Self {
        ServerError::from(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
