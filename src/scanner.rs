//! Template scanner.
//!
//! Splits raw template text into a flat sequence of [`Segment`]s: literal
//! text, `${}` expressions, `<% %>` code blocks, `%` control lines, `<%tag/>`
//! directives, `<%text>` verbatim blocks and comments. Every segment records
//! where it started for diagnostics.

use crate::error::{Error, Location, Result, SyntaxErrorKind};
use crate::expr::parser::find_closing_brace;
use log::trace;
use regex::Regex;
use std::sync::LazyLock;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentKind {
    Text(String),
    /// Body of `${ ... }`.
    Expr(String),
    /// Body of `<% ... %>`.
    Code(String),
    /// A `%` control line, without the `%` and surrounding whitespace.
    Control(String),
    /// `<%name attr="..." />`.
    Tag { name: String, attrs: Vec<(String, String)> },
    /// Contents of `<%text> ... </%text>`.
    Verbatim(String),
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Where the construct starts.
    pub location: Location,
    /// Where its body starts, for constructs with a body.
    pub body: Location,
}

impl Segment {
    pub fn attr(&self, key: &str) -> Option<&str> {
        match &self.kind {
            SegmentKind::Tag { attrs, .. } => attr(attrs, key),
            _ => None,
        }
    }
}

/// Looks up a directive attribute by name.
pub fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Scans a whole template.
pub fn scan(source: &str) -> Result<Vec<Segment>> {
    Scanner::new(source).run()
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    text: String,
    text_start: Location,
    segments: Vec<Segment>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            text: String::new(),
            text_start: Location::new(1, 1),
            segments: Vec::new(),
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Moves forward by `len` bytes, keeping line/column current.
    fn advance(&mut self, len: usize) {
        let consumed = &self.src[self.pos..self.pos + len];
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += len;
    }

    fn unterminated(&self, what: &str, at: Location) -> Error {
        Error::syntax(SyntaxErrorKind::UnterminatedTag(what.to_string()), at)
    }

    fn push_text(&mut self, s: &str) {
        if self.text.is_empty() {
            self.text_start = self.location();
        }
        self.text.push_str(s);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.segments.push(Segment {
                kind: SegmentKind::Text(text),
                location: self.text_start,
                body: self.text_start,
            });
        }
    }

    fn emit(&mut self, kind: SegmentKind, location: Location, body: Location) {
        self.flush_text();
        self.segments.push(Segment { kind, location, body });
    }

    fn run(mut self) -> Result<Vec<Segment>> {
        let mut at_line_start = true;
        while self.pos < self.src.len() {
            if at_line_start {
                at_line_start = false;
                if self.line_directive()? {
                    at_line_start = true;
                    continue;
                }
            }

            let rest = self.rest();
            if rest.starts_with("${") {
                self.expression()?;
            } else if rest.starts_with("</%") {
                let at = self.location();
                let name: String = rest[3..].chars().take_while(|c| *c != '>').collect();
                return Err(Error::syntax(
                    SyntaxErrorKind::UnbalancedBlock(format!("unexpected </%{name}>")),
                    at,
                ));
            } else if rest.starts_with("<%") {
                self.tag()?;
            } else if rest.starts_with("\\\n") {
                self.advance(2);
                at_line_start = true;
            } else if rest.starts_with("\\\r\n") {
                self.advance(3);
                at_line_start = true;
            } else {
                let c = rest.chars().next().unwrap_or('\0');
                self.push_text(&rest[..c.len_utf8()]);
                self.advance(c.len_utf8());
                at_line_start = c == '\n';
            }
        }
        self.flush_text();
        trace!("scanned {} segment(s)", self.segments.len());
        Ok(self.segments)
    }

    /// Handles `%` control lines, `%%` escapes and `##` comments at the
    /// start of a line. Returns true when the whole line was consumed.
    fn line_directive(&mut self) -> Result<bool> {
        let rest = self.rest();
        let indent = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let after = &rest[indent..];
        let line_len = after.find('\n').map(|i| i + 1).unwrap_or(after.len());

        if after.starts_with("%%") {
            let text = format!("{}%", &rest[..indent]);
            self.push_text(&text);
            self.advance(indent + 2);
            return Ok(false);
        }
        if after.starts_with('%') {
            let location = self.location();
            let body_location = Location::new(location.line, location.column + indent + 1);
            let content = after[1..line_len].trim().to_string();
            self.advance(indent + line_len);
            self.emit(SegmentKind::Control(content), location, body_location);
            return Ok(true);
        }
        if after.starts_with("##") {
            let location = self.location();
            self.advance(indent + line_len);
            self.emit(SegmentKind::Comment, location, location);
            return Ok(true);
        }
        Ok(false)
    }

    fn expression(&mut self) -> Result<()> {
        let location = self.location();
        self.advance(2);
        let body_location = self.location();
        let end = find_closing_brace(self.rest())
            .ok_or_else(|| self.unterminated("${ expression", location))?;
        let body = self.rest()[..end].to_string();
        self.advance(end + 1);
        self.emit(SegmentKind::Expr(body), location, body_location);
        Ok(())
    }

    fn tag(&mut self) -> Result<()> {
        let location = self.location();
        let after = &self.rest()[2..];

        if after.starts_with("text>") {
            let (body, body_location) = self.block("text", location)?;
            self.emit(SegmentKind::Verbatim(body), location, body_location);
            return Ok(());
        }
        if after.starts_with("doc>") {
            self.block("doc", location)?;
            self.emit(SegmentKind::Comment, location, location);
            return Ok(());
        }
        if after.starts_with('!') {
            return Err(Error::syntax(
                SyntaxErrorKind::UnknownDirective("<%!".to_string()),
                location,
            ));
        }
        if after.starts_with(|c: char| c.is_alphabetic()) {
            return self.directive(location);
        }

        // Plain code block.
        self.advance(2);
        let body_location = self.location();
        let end = find_code_end(self.rest())
            .ok_or_else(|| self.unterminated("<% code block", location))?;
        let body = self.rest()[..end].to_string();
        self.advance(end + 2);
        self.emit(SegmentKind::Code(body), location, body_location);
        Ok(())
    }

    /// Consumes `<%name> ... </%name>` and returns the raw body.
    fn block(&mut self, name: &str, location: Location) -> Result<(String, Location)> {
        let open = format!("<%{name}>");
        let close = format!("</%{name}>");
        self.advance(open.len());
        let body_location = self.location();
        let end = self
            .rest()
            .find(&close)
            .ok_or_else(|| self.unterminated(&open, location))?;
        let body = self.rest()[..end].to_string();
        self.advance(end + close.len());
        Ok((body, body_location))
    }

    /// Consumes `<%name attrs />`.
    fn directive(&mut self, location: Location) -> Result<()> {
        let after = &self.rest()[2..];
        let name: String = after
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '.'))
            .collect();
        if !matches!(name.as_str(), "page" | "include") {
            return Err(Error::syntax(SyntaxErrorKind::UnknownDirective(name), location));
        }

        let open = format!("<%{name}");
        let end = find_tag_end(&self.rest()[open.len()..])
            .ok_or_else(|| self.unterminated(&format!("{open}>"), location))?;
        let inner = &self.rest()[open.len()..open.len() + end];
        let Some(inner) = inner.strip_suffix('/') else {
            return Err(Error::syntax(
                SyntaxErrorKind::UnbalancedBlock(format!("{open}> must be self-closing")),
                location,
            ));
        };
        let attrs = ATTRIBUTE
            .captures_iter(inner)
            .map(|caps| {
                let key = caps[1].to_string();
                let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                (key, value.to_string())
            })
            .collect();
        self.advance(open.len() + end + 1);
        self.emit(SegmentKind::Tag { name, attrs }, location, location);
        Ok(())
    }
}

/// Offset of the `%>` closing a code block, skipping quoted strings.
fn find_code_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'#' => {
                // Comments run to end of line.
                while i < bytes.len() && bytes[i] != b'\n' {
                    if bytes[i..].starts_with(b"%>") {
                        return Some(i);
                    }
                    i += 1;
                }
                continue;
            }
            None if bytes[i..].starts_with(b"%>") => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

/// Offset of the `>` closing a directive tag, skipping quoted attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}
