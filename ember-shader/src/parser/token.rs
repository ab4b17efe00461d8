//! Tokenizer for the shader source language. The parser's contract (§4.3)
//! assumes an upstream token stream; this module supplies it since nothing
//! in the retrieved corpus provides one for this particular grammar.

use crate::error::{ParseError, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLiteral(i64, bool), // bool: has a `u` suffix
    FloatLiteral(f64),
    BoolLiteral(bool),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    Question,
    Colon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    Caret,
    Amp,
    Pipe,
    AmpAmp,
    PipePipe,
    Bang,
    ShiftLeft,
    ShiftRight,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    PlusPlus,
    MinusMinus,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    rest: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { chars: src.chars(), rest: src, line: 1, column: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.chars.clone();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if let Some(c) = c {
            self.rest = self.chars.as_str();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn location(&self) -> SourceLocation {
        SourceLocation { line: self.line, column: self.column }
    }
}

/// Tokenize `source`, returning the token stream terminated by [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        // Skip whitespace and line comments.
        loop {
            match lexer.peek() {
                Some(c) if c.is_whitespace() => {
                    lexer.bump();
                }
                Some('/') if lexer.peek2() == Some('/') => {
                    while !matches!(lexer.peek(), None | Some('\n')) {
                        lexer.bump();
                    }
                }
                _ => break,
            }
        }

        let location = lexer.location();
        let Some(c) = lexer.peek() else {
            tokens.push(Token { kind: TokenKind::Eof, location });
            break;
        };

        let kind = match c {
            '(' => {
                lexer.bump();
                TokenKind::LParen
            }
            ')' => {
                lexer.bump();
                TokenKind::RParen
            }
            '{' => {
                lexer.bump();
                TokenKind::LBrace
            }
            '}' => {
                lexer.bump();
                TokenKind::RBrace
            }
            '[' => {
                lexer.bump();
                TokenKind::LBracket
            }
            ']' => {
                lexer.bump();
                TokenKind::RBracket
            }
            ',' => {
                lexer.bump();
                TokenKind::Comma
            }
            ';' => {
                lexer.bump();
                TokenKind::Semicolon
            }
            '.' => {
                lexer.bump();
                TokenKind::Dot
            }
            '?' => {
                lexer.bump();
                TokenKind::Question
            }
            ':' => {
                lexer.bump();
                TokenKind::Colon
            }
            '%' => {
                lexer.bump();
                TokenKind::Percent
            }
            '^' => {
                lexer.bump();
                TokenKind::Caret
            }
            '+' => {
                lexer.bump();
                if lexer.peek() == Some('+') {
                    lexer.bump();
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                lexer.bump();
                if lexer.peek() == Some('-') {
                    lexer.bump();
                    TokenKind::MinusMinus
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                lexer.bump();
                if lexer.peek() == Some('*') {
                    lexer.bump();
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                lexer.bump();
                TokenKind::Slash
            }
            '&' => {
                lexer.bump();
                if lexer.peek() == Some('&') {
                    lexer.bump();
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                lexer.bump();
                if lexer.peek() == Some('|') {
                    lexer.bump();
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }
            '!' => {
                lexer.bump();
                if lexer.peek() == Some('=') {
                    lexer.bump();
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                lexer.bump();
                if lexer.peek() == Some('=') {
                    lexer.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '<' => {
                lexer.bump();
                match lexer.peek() {
                    Some('=') => {
                        lexer.bump();
                        TokenKind::Le
                    }
                    Some('<') => {
                        lexer.bump();
                        TokenKind::ShiftLeft
                    }
                    _ => TokenKind::Lt,
                }
            }
            '>' => {
                lexer.bump();
                match lexer.peek() {
                    Some('=') => {
                        lexer.bump();
                        TokenKind::Ge
                    }
                    Some('>') => {
                        lexer.bump();
                        TokenKind::ShiftRight
                    }
                    _ => TokenKind::Gt,
                }
            }
            c if c.is_ascii_digit() => lex_number(&mut lexer),
            c if c.is_alphabetic() || c == '_' => lex_ident(&mut lexer),
            other => {
                return Err(ParseError::UnexpectedToken {
                    location,
                    found: other.to_string(),
                    expected: "a token".to_string(),
                })
            }
        };
        tokens.push(Token { kind, location });
    }

    Ok(tokens)
}

fn lex_ident(lexer: &mut Lexer<'_>) -> TokenKind {
    let start = lexer.rest;
    let mut len = 0;
    while let Some(c) = lexer.peek() {
        if c.is_alphanumeric() || c == '_' {
            lexer.bump();
            len += c.len_utf8();
        } else {
            break;
        }
    }
    let word = &start[..len];
    match word {
        "true" => TokenKind::BoolLiteral(true),
        "false" => TokenKind::BoolLiteral(false),
        _ => TokenKind::Ident(word.to_string()),
    }
}

fn lex_number(lexer: &mut Lexer<'_>) -> TokenKind {
    let start = lexer.rest;
    let mut len = 0;
    let mut is_float = false;
    while let Some(c) = lexer.peek() {
        if c.is_ascii_digit() {
            lexer.bump();
            len += 1;
        } else if c == '.' && !is_float && lexer.peek2().is_some_and(|n| n.is_ascii_digit()) {
            is_float = true;
            lexer.bump();
            len += 1;
        } else {
            break;
        }
    }
    let text = &start[..len];
    if is_float {
        if lexer.peek() == Some('f') {
            lexer.bump();
        }
        TokenKind::FloatLiteral(text.parse().unwrap_or(0.0))
    } else {
        let has_u_suffix = lexer.peek() == Some('u');
        if has_u_suffix {
            lexer.bump();
        } else if lexer.peek() == Some('f') {
            lexer.bump();
            return TokenKind::FloatLiteral(text.parse().unwrap_or(0.0));
        }
        TokenKind::IntLiteral(text.parse().unwrap_or(0), has_u_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_basic_expression() {
        let tokens = tokenize("1 + 2 * vec2f(1.0, 2.0)").unwrap();
        assert_eq!(tokens.first().unwrap().kind, TokenKind::IntLiteral(1, false));
        assert!(tokens.iter().any(|t| matches!(&t.kind, TokenKind::Ident(n) if n == "vec2f")));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn skips_line_comments() {
        let tokens = tokenize("1 // comment\n2").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral(1, false));
        assert_eq!(tokens[1].kind, TokenKind::IntLiteral(2, false));
    }

    #[test]
    fn u_suffix_marks_unsigned_literal() {
        let tokens = tokenize("42u").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral(42, true));
    }
}
