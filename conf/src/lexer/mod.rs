pub mod tokens;

use crate::lexer::tokens::{Loc, Token, TokenKind};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: u32,
    pub col: u32,
    pub msg: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.msg)
    }
}

impl std::error::Error for LexError {}

/// Lazy tokenizer over the configuration text. Tokens are produced one at
/// a time by `next_token`; whitespace and `#` comments separate tokens but
/// are never emitted.
pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input: input.chars().peekable(), line: 1, col: 1 }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.input.next();
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn current_loc(&self) -> Loc {
        Loc { line: self.line, col: self.col }
    }

    fn err(&self, loc: Loc, msg: impl Into<String>) -> LexError {
        LexError { line: loc.line, col: loc.col, msg: msg.into() }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            let Some(c) = self.peek() else {
                return Ok(Token { kind: TokenKind::Eof, loc: self.current_loc() });
            };

            if c == '#' {
                self.skip_comment();
                continue;
            }
            if c.is_whitespace() {
                self.advance();
                continue;
            }

            let loc = self.current_loc();
            return match c {
                ';' => {
                    self.advance();
                    Ok(Token { kind: TokenKind::Semicolon, loc })
                }
                '{' => {
                    self.advance();
                    Ok(Token { kind: TokenKind::LBrace, loc })
                }
                '}' => {
                    self.advance();
                    Ok(Token { kind: TokenKind::RBrace, loc })
                }
                '~' => {
                    self.advance();
                    Ok(Token { kind: TokenKind::Tilde, loc })
                }
                q if q == '"' || q == '\'' => self.quoted(loc, q),
                c if c.is_control() => {
                    Err(self.err(loc, format!("control character {:?} outside quotes", c)))
                }
                _ => self.word(loc),
            };
        }
    }

    /// Drains every remaining token, Eof excluded. Used by the parser's
    /// `from_str` entry point and by tests.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn quoted(&mut self, loc: Loc, quote_char: char) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut val = String::new();

        loop {
            match self.advance() {
                Some(c) if c == quote_char => break,
                Some('\\') => match self.advance() {
                    Some(escaped) => val.push(escaped),
                    None => return Err(self.err(loc, "unterminated quoted string")),
                },
                Some(c) => val.push(c),
                None => return Err(self.err(loc, "unterminated quoted string")),
            }
        }

        Ok(Token { kind: TokenKind::Quoted(val), loc })
    }

    fn word(&mut self, loc: Loc) -> Result<Token, LexError> {
        let mut val = String::new();

        while let Some(c) = self.peek() {
            if c.is_whitespace() || "#;{}~\"'".contains(c) {
                break;
            }
            if c.is_control() {
                return Err(self.err(self.current_loc(), format!("control character {:?} outside quotes", c)));
            }
            val.push(c);
            self.advance();
        }

        Ok(Token { kind: TokenKind::Word(val), loc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_directive() {
        assert_eq!(
            kinds("listen 127.0.0.1:8080;"),
            vec![
                TokenKind::Word("listen".into()),
                TokenKind::Word("127.0.0.1:8080".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_block_and_comment() {
        assert_eq!(
            kinds("server { # open\n root ./www; }"),
            vec![
                TokenKind::Word("server".into()),
                TokenKind::LBrace,
                TokenKind::Word("root".into()),
                TokenKind::Word("./www".into()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(
            kinds(r#"root "a dir"; index 'x.html';"#),
            vec![
                TokenKind::Word("root".into()),
                TokenKind::Quoted("a dir".into()),
                TokenKind::Semicolon,
                TokenKind::Word("index".into()),
                TokenKind::Quoted("x.html".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_backslash_escape_in_quotes() {
        assert_eq!(
            kinds(r#"root "a\"b";"#),
            vec![
                TokenKind::Word("root".into()),
                TokenKind::Quoted("a\"b".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_token_location() {
        let mut lexer = Lexer::new("server {\n  listen 1.2.3.4:80;\n}");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!(tokens[0].loc, Loc { line: 1, col: 1 });
        assert_eq!(tokens[2].loc, Loc { line: 2, col: 3 });
        assert_eq!(tokens[3].loc, Loc { line: 2, col: 10 });
    }

    #[test]
    fn test_unterminated_quote() {
        let err = Lexer::new("root \"no end").tokenize().unwrap_err();
        assert!(err.msg.contains("unterminated"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_control_character_rejected() {
        assert!(Lexer::new("root a\x07b;").tokenize().is_err());
    }

    #[test]
    fn test_tilde_token() {
        assert_eq!(
            kinds("location ~ /cgi {"),
            vec![
                TokenKind::Word("location".into()),
                TokenKind::Tilde,
                TokenKind::Word("/cgi".into()),
                TokenKind::LBrace,
            ]
        );
    }
}
