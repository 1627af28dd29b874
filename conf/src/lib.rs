pub mod directive;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod validator;

pub use directive::{Context, Directive};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use types::{Config, LocationConfig, Redirect, ServerConfig};
pub use validator::Validator;
