use crate::directive::{Context, Directive};
use crate::lexer::tokens::{Loc, TokenKind};
use crate::lexer::{LexError, Lexer};
use crate::validator::Validator;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { line: e.line, col: e.col, message: e.msg }
    }
}

fn err(loc: Loc, message: impl Into<String>) -> ParseError {
    ParseError { line: loc.line, col: loc.col, message: message.into() }
}

/// Builds the directive tree out of the lexer's token stream. Each
/// directive is run through the grammar table before it is accepted.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    grammar: Validator,
    nest_depth: u32,
    current_context: Context,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            grammar: Validator::new(),
            nest_depth: 0,
            current_context: Context::Main,
        }
    }

    pub fn parse(&mut self) -> Result<Vec<Directive>, ParseError> {
        let mut directives = Vec::new();

        loop {
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Word(name) => {
                    directives.push(self.parse_directive(name, token.loc)?);
                }
                TokenKind::RBrace => {
                    return Err(err(token.loc, "unexpected '}' outside any block"));
                }
                other => {
                    return Err(err(token.loc, format!("expected directive name, found '{}'", other)));
                }
            }
        }

        Ok(directives)
    }

    /// One directive: name, arguments, then either ';' (leaf) or '{'
    /// (block with children in the nested context).
    fn parse_directive(&mut self, name: String, loc: Loc) -> Result<Directive, ParseError> {
        let mut dir = Directive::new(name, loc.line, loc.col, self.current_context);

        loop {
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::Word(w) => dir.args.push(w),
                TokenKind::Quoted(q) => dir.args.push(q),
                TokenKind::Tilde => dir.args.push("~".to_string()),
                TokenKind::Semicolon => {
                    self.grammar.evaluate(&dir)?;
                    if Self::opens_block(&dir.name) {
                        return Err(err(loc, format!("directive '{}' must open a block", dir.name)));
                    }
                    return Ok(dir);
                }
                TokenKind::LBrace => {
                    dir.is_block = true;
                    self.grammar.evaluate(&dir)?;
                    if !Self::opens_block(&dir.name) {
                        return Err(err(loc, format!("directive '{}' does not open a block", dir.name)));
                    }
                    self.parse_block(&mut dir)?;
                    return Ok(dir);
                }
                TokenKind::RBrace => {
                    return Err(err(token.loc, "unexpected '}' in directive arguments"));
                }
                TokenKind::Eof => {
                    return Err(err(loc, format!("unterminated directive '{}', expected ';' or '{{'", dir.name)));
                }
            }
        }
    }

    fn parse_block(&mut self, dir: &mut Directive) -> Result<(), ParseError> {
        self.nest_depth += 1;
        let saved = self.current_context;
        self.current_context = match dir.name.as_str() {
            "server" => Context::Server,
            "location" => Context::Location,
            _ => saved,
        };

        loop {
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => {
                    return Err(err(
                        Loc { line: dir.line, col: dir.col },
                        format!("unclosed block for directive '{}'", dir.name),
                    ));
                }
                TokenKind::Word(name) => {
                    let child = self.parse_directive(name, token.loc)?;
                    dir.children.push(child);
                }
                other => {
                    return Err(err(token.loc, format!("expected directive name, found '{}'", other)));
                }
            }
        }

        self.current_context = saved;
        self.nest_depth -= 1;
        Ok(())
    }

    fn opens_block(name: &str) -> bool {
        matches!(name, "server" | "location")
    }
}
