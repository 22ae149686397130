//! Tokenizer for the embedded expression and statement language.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Body of an `f"..."` literal with escapes processed and braces left intact.
    FStr(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Pipe,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Statement separator; only produced outside brackets.
    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Int(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Str(_) | Token::FStr(_) => f.write_str("string literal"),
            Token::Newline => f.write_str("end of line"),
            Token::Eof => f.write_str("end of expression"),
            other => write!(f, "'{}'", punct(other)),
        }
    }
}

fn punct(token: &Token) -> &'static str {
    match token {
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Comma => ",",
        Token::Colon => ":",
        Token::Semicolon => ";",
        Token::Dot => ".",
        Token::Pipe => "|",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::DoubleStar => "**",
        Token::Slash => "/",
        Token::DoubleSlash => "//",
        Token::Percent => "%",
        Token::Assign => "=",
        Token::PlusAssign => "+=",
        Token::MinusAssign => "-=",
        Token::StarAssign => "*=",
        Token::SlashAssign => "/=",
        Token::EqEq => "==",
        Token::NotEq => "!=",
        Token::Lt => "<",
        Token::Le => "<=",
        Token::Gt => ">",
        Token::Ge => ">=",
        _ => "?",
    }
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Lexing failure: message plus byte offset into the source.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub offset: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    /// Tokenizes the whole input, always ending with [`Token::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens: Vec<Spanned> = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let is_eof = spanned.token == Token::Eof;
            // Collapse blank lines and drop leading separators.
            if spanned.token == Token::Newline
                && matches!(tokens.last().map(|t| &t.token), None | Some(Token::Newline))
            {
                continue;
            }
            tokens.push(spanned);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> LexError {
        LexError { message: message.into(), offset }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '\n' if self.depth == 0 => return,
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.bump() else {
            return Ok(Spanned { token: Token::Eof, offset: start });
        };

        let token = match c {
            '\n' => Token::Newline,
            '(' => {
                self.depth += 1;
                Token::LParen
            }
            '[' => {
                self.depth += 1;
                Token::LBracket
            }
            '{' => {
                self.depth += 1;
                Token::LBrace
            }
            ')' | ']' | '}' => {
                self.depth = self.depth.saturating_sub(1);
                match c {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                }
            }
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '|' => Token::Pipe,
            '.' if self.peek().is_some_and(|d| d.is_ascii_digit()) => {
                self.pos = start;
                self.number()?
            }
            '.' => Token::Dot,
            '+' => self.with_eq(Token::Plus, Token::PlusAssign),
            '-' => self.with_eq(Token::Minus, Token::MinusAssign),
            '*' if self.peek() == Some('*') => {
                self.bump();
                Token::DoubleStar
            }
            '*' => self.with_eq(Token::Star, Token::StarAssign),
            '/' if self.peek() == Some('/') => {
                self.bump();
                Token::DoubleSlash
            }
            '/' => self.with_eq(Token::Slash, Token::SlashAssign),
            '%' => Token::Percent,
            '=' => self.with_eq(Token::Assign, Token::EqEq),
            '!' if self.peek() == Some('=') => {
                self.bump();
                Token::NotEq
            }
            '<' => self.with_eq(Token::Lt, Token::Le),
            '>' => self.with_eq(Token::Gt, Token::Ge),
            '"' | '\'' => Token::Str(self.string(c, start)?),
            'f' if matches!(self.peek(), Some('"') | Some('\'')) => {
                let quote = self.bump().unwrap_or('"');
                Token::FStr(self.string(quote, start)?)
            }
            c if c.is_ascii_digit() => {
                self.pos = start;
                self.number()?
            }
            c if c.is_alphabetic() || c == '_' => {
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.bump();
                }
                Token::Ident(self.src[start..self.pos].to_string())
            }
            other => return Err(self.error(format!("unexpected character '{other}'"), start)),
        };

        Ok(Spanned { token, offset: start })
    }

    fn with_eq(&mut self, plain: Token, with_eq: Token) -> Token {
        if self.peek() == Some('=') {
            self.bump();
            with_eq
        } else {
            plain
        }
    }

    fn number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = matches!(self.peek_at(1), Some('+') | Some('-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += digit_at;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid number '{text}'"), start))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(format!("integer '{text}' out of range"), start))
        }
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal", start));
            };
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(self.error("unterminated string literal", start));
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => {}
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }
}
