use crate::directive::Directive;
use crate::parser::ParseError;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

pub const MAX_TYPES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    None,
    Str,
    Int,
    Bool,
    Any,
    Host,
    Path,
    Methods,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    allowed_context: u8,
    min_args: i8,
    max_args: i8, // -1 = unbounded
    types: [ArgType; MAX_TYPES],
}

const CTX_MAIN: u8 = 1 << 0;
const CTX_SERVER: u8 = 1 << 1;
const CTX_LOCATION: u8 = 1 << 2;

fn rule(allowed_context: u8, min_args: i8, max_args: i8, t0: ArgType, t1: ArgType) -> Rule {
    Rule { allowed_context, min_args, max_args, types: [t0, t1] }
}

/// Grammar table for every known directive: allowed contexts, argument
/// count bounds and per-position argument types.
pub struct Validator {
    rules: HashMap<&'static str, Rule>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        let mut rules = HashMap::new();

        // Main context directives
        rules.insert("server", rule(CTX_MAIN, 0, 0, ArgType::None, ArgType::None));

        // Server context directives
        rules.insert("listen", rule(CTX_SERVER, 1, 1, ArgType::Host, ArgType::None));
        rules.insert("server_name", rule(CTX_SERVER, 1, -1, ArgType::Str, ArgType::Str));
        rules.insert("error_page", rule(CTX_SERVER, 2, 2, ArgType::Int, ArgType::Path));
        rules.insert("location", rule(CTX_SERVER, 1, 2, ArgType::Any, ArgType::Any));

        // Server and location context directives
        rules.insert("root", rule(CTX_SERVER | CTX_LOCATION, 1, 1, ArgType::Path, ArgType::None));
        rules.insert("index", rule(CTX_SERVER | CTX_LOCATION, 1, -1, ArgType::Str, ArgType::Str));
        rules.insert(
            "client_max_body_size",
            rule(CTX_SERVER | CTX_LOCATION, 1, 1, ArgType::Int, ArgType::None),
        );

        // Location context directives
        rules.insert("methods", rule(CTX_LOCATION, 1, 3, ArgType::Methods, ArgType::Methods));
        rules.insert("autoindex", rule(CTX_LOCATION, 1, 1, ArgType::Bool, ArgType::None));
        rules.insert("upload_store", rule(CTX_LOCATION, 1, 1, ArgType::Path, ArgType::None));
        rules.insert("return", rule(CTX_LOCATION, 2, 2, ArgType::Int, ArgType::Str));
        rules.insert("cgi_pass", rule(CTX_LOCATION, 1, 1, ArgType::Path, ArgType::None));

        Self { rules }
    }

    pub fn evaluate(&self, dir: &Directive) -> Result<(), ParseError> {
        let Some(rule) = self.rules.get(dir.name.as_str()) else {
            return Err(self.err(dir, format!("unknown or unsupported directive '{}'", dir.name)));
        };

        self.check_context(dir, rule.allowed_context)?;
        self.check_arg_count(dir, rule)?;
        self.check_arg_types(dir, rule)?;

        // Every `methods` argument must name an allowed method, however
        // many of them there are.
        if dir.name == "methods" {
            for arg in &dir.args {
                if !Self::is_method(arg) {
                    return Err(self.err(
                        dir,
                        format!("'{}' is not a supported method (GET, POST, DELETE)", arg),
                    ));
                }
            }
        }

        Ok(())
    }

    fn err(&self, dir: &Directive, message: String) -> ParseError {
        ParseError { line: dir.line, col: dir.col, message }
    }

    fn check_context(&self, dir: &Directive, allowed: u8) -> Result<(), ParseError> {
        if dir.ctx.bit() & allowed == 0 {
            return Err(self.err(
                dir,
                format!("directive '{}' is not allowed in {} context", dir.name, dir.ctx.as_str()),
            ));
        }
        Ok(())
    }

    fn check_arg_count(&self, dir: &Directive, rule: &Rule) -> Result<(), ParseError> {
        let n = dir.args.len() as i8;

        if n < rule.min_args {
            return Err(self.err(
                dir,
                format!("directive '{}' requires at least {} argument(s)", dir.name, rule.min_args),
            ));
        }
        if rule.max_args != -1 && n > rule.max_args {
            return Err(self.err(
                dir,
                format!("directive '{}' can have at most {} argument(s)", dir.name, rule.max_args),
            ));
        }
        Ok(())
    }

    fn check_arg_types(&self, dir: &Directive, rule: &Rule) -> Result<(), ParseError> {
        let checked = dir.args.len().min(MAX_TYPES);

        for (arg, ty) in dir.args.iter().take(checked).zip(rule.types.iter()) {
            let ok = match ty {
                ArgType::None | ArgType::Any | ArgType::Str => true,
                ArgType::Int => Self::is_int(arg),
                ArgType::Bool => Self::is_bool(arg),
                ArgType::Host => Self::is_host(arg),
                ArgType::Path => Self::is_path(arg),
                ArgType::Methods => Self::is_method(arg),
            };
            if !ok {
                return Err(self.err(
                    dir,
                    format!("invalid argument '{}' for directive '{}'", arg, dir.name),
                ));
            }
        }
        Ok(())
    }

    fn is_int(s: &str) -> bool {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }

    fn is_bool(s: &str) -> bool {
        matches!(s, "on" | "off" | "true" | "false")
    }

    /// `host:port` with port in 1..=65535 and host a valid IPv4/IPv6
    /// literal or a non-empty name.
    fn is_host(s: &str) -> bool {
        let Some((host, port)) = s.rsplit_once(':') else {
            return false;
        };
        let Ok(port) = port.parse::<u32>() else {
            return false;
        };
        if port == 0 || port > 65535 || host.is_empty() {
            return false;
        }

        if host.parse::<Ipv4Addr>().is_ok() {
            return true;
        }
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<Ipv6Addr>().is_ok() {
            return true;
        }
        host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    }

    /// Path arguments may not climb out of their root or hide empty
    /// components.
    fn is_path(s: &str) -> bool {
        if s.is_empty() || s.contains("//") {
            return false;
        }
        !s.split('/').any(|component| component == "..")
    }

    fn is_method(s: &str) -> bool {
        matches!(s, "GET" | "POST" | "DELETE")
    }
}
