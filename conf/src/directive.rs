/// Context a directive appears in. Bit values feed the validator's
/// allowed-context masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Main,
    Server,
    Location,
}

impl Context {
    pub fn bit(self) -> u8 {
        match self {
            Context::Main => 1 << 0,
            Context::Server => 1 << 1,
            Context::Location => 1 << 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Context::Main => "main",
            Context::Server => "server",
            Context::Location => "location",
        }
    }
}

/// One parsed directive. Block directives carry their children; leaves
/// have `is_block == false` and no children.
#[derive(Debug, Clone)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    pub line: u32,
    pub col: u32,
    pub ctx: Context,
    pub is_block: bool,
    pub children: Vec<Directive>,
}

impl Directive {
    pub fn new(name: String, line: u32, col: u32, ctx: Context) -> Self {
        Self {
            name,
            args: Vec::new(),
            line,
            col,
            ctx,
            is_block: false,
            children: Vec::new(),
        }
    }
}
