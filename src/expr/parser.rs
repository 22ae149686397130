//! Recursive-descent parser for expressions and code-block statements.
//!
//! Precedence, lowest to highest: conditional (`a if c else b`), `or`,
//! `and`, `not`, comparisons (including `in`/`not in`), additive,
//! multiplicative, unary sign, power, postfix (attribute, subscript,
//! call) and primaries.

use super::ast::{BinaryOp, CmpOp, Expr, FormatPart, ParamDecl, Stmt, UnaryOp};
use super::lexer::{LexError, Lexer, Spanned, Token};
use crate::constants::MAX_EXPRESSION_DEPTH;
use crate::error::{Error, Location, Result, SyntaxErrorKind};
use crate::value::Value;
use log::trace;

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "is", "if", "else", "True", "False", "None"];

/// Parses a single expression spanning the whole input.
pub fn parse_expression(src: &str, origin: Location) -> Result<Expr> {
    let mut parser = Parser::new(src, origin)?;
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses the body of `${ ... }`: an expression optionally followed by
/// `| filter, filter`.
pub fn parse_filtered(src: &str, origin: Location) -> Result<(Expr, Vec<(String, Location)>)> {
    let mut parser = Parser::new(src, origin)?;
    let expr = parser.expression()?;
    let mut filters = Vec::new();
    if parser.eat(&Token::Pipe) {
        loop {
            let location = offset_location(src, origin, parser.offset());
            let name = parser.ident()?;
            filters.push((name, location));
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    parser.expect_end()?;
    Ok((expr, filters))
}

/// Parses the statements of a `<% %>` block.
pub fn parse_statements(src: &str, origin: Location) -> Result<Vec<Stmt>> {
    let mut parser = Parser::new(src, origin)?;
    let mut stmts = Vec::new();
    while !parser.at(&Token::Eof) {
        stmts.push(parser.statement()?);
        if !(parser.eat(&Token::Newline) || parser.eat(&Token::Semicolon)) {
            parser.expect_end()?;
        }
        while parser.eat(&Token::Newline) || parser.eat(&Token::Semicolon) {}
    }
    trace!("parsed {} statement(s)", stmts.len());
    Ok(stmts)
}

/// Parses a parameter list: `name, other='default'`.
pub fn parse_params(src: &str, origin: Location) -> Result<Vec<ParamDecl>> {
    let mut parser = Parser::new(src, origin)?;
    let mut params: Vec<ParamDecl> = Vec::new();
    while !parser.at(&Token::Eof) {
        let offset = parser.offset();
        let name = parser.ident()?;
        if params.iter().any(|p| p.name == name) {
            return Err(parser.error_kind(SyntaxErrorKind::DuplicateParameter(name), offset));
        }
        let default = if parser.eat(&Token::Assign) { Some(parser.expression()?) } else { None };
        params.push(ParamDecl { name, default });
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(params)
}

/// Parses a loop header without the leading `for`: `a, b in expr`.
pub fn parse_loop(src: &str, origin: Location) -> Result<(Vec<String>, Expr)> {
    let mut parser = Parser::new(src, origin)?;
    let parenthesized = parser.eat(&Token::LParen);
    let mut names = vec![parser.ident()?];
    while parser.eat(&Token::Comma) {
        if parenthesized && parser.at(&Token::RParen) {
            break;
        }
        names.push(parser.ident()?);
    }
    if parenthesized {
        parser.expect(&Token::RParen)?;
    }
    parser.keyword("in")?;
    let iterable = parser.expression()?;
    parser.expect_end()?;
    Ok((names, iterable))
}

/// Parses include arguments: a mapping literal or a keyword list, both
/// producing a mapping expression.
pub fn parse_bindings(src: &str, origin: Location) -> Result<Expr> {
    let mut parser = Parser::new(src, origin)?;
    if parser.at(&Token::Eof) {
        return Ok(Expr::Map(Vec::new()));
    }
    let expr = if parser.at(&Token::LBrace) {
        parser.expression()?
    } else {
        let mut entries = Vec::new();
        loop {
            let name = parser.ident()?;
            parser.expect(&Token::Assign)?;
            entries.push((Expr::string(name), parser.expression()?));
            if !parser.eat(&Token::Comma) || parser.at(&Token::Eof) {
                break;
            }
        }
        Expr::Map(entries)
    };
    parser.expect_end()?;
    match expr {
        Expr::Map(_) => Ok(expr),
        _ => Err(parser.error("include arguments must be a mapping", 0)),
    }
}

/// Parses text with embedded `${ ... }` markers into a format expression.
pub fn parse_interpolated(text: &str, origin: Location) -> Result<Expr> {
    let mut parts = Vec::new();
    let mut rest = text;
    let mut consumed = 0;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            parts.push(FormatPart::Literal(rest[..start].to_string()));
        }
        let body_start = start + 2;
        let end = find_closing_brace(&rest[body_start..]).ok_or_else(|| {
            Error::syntax(
                SyntaxErrorKind::UnterminatedTag("${ expression".to_string()),
                offset_location(text, origin, consumed + start),
            )
        })?;
        let body = &rest[body_start..body_start + end];
        let body_origin = offset_location(text, origin, consumed + body_start);
        parts.push(FormatPart::Expr(parse_expression(body, body_origin)?));
        consumed += body_start + end + 1;
        rest = &rest[body_start + end + 1..];
    }
    if !rest.is_empty() {
        parts.push(FormatPart::Literal(rest.to_string()));
    }
    Ok(match parts.as_slice() {
        [] => Expr::string(""),
        [FormatPart::Literal(s)] => Expr::string(s.clone()),
        _ => Expr::Format(parts),
    })
}

/// Finds the `}` closing an already-opened brace, skipping nested braces
/// and quoted strings. Returns its byte offset in `s`.
pub(crate) fn find_closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Maps a byte offset inside `src` to a template location.
pub(crate) fn offset_location(src: &str, origin: Location, offset: usize) -> Location {
    let offset = offset.min(src.len());
    let before = &src[..offset];
    match before.rfind('\n') {
        None => Location::new(origin.line, origin.column + before.chars().count()),
        Some(nl) => Location::new(
            origin.line + before.matches('\n').count(),
            before[nl + 1..].chars().count() + 1,
        ),
    }
}

struct Parser<'a> {
    src: &'a str,
    origin: Location,
    tokens: Vec<Spanned>,
    pos: usize,
    /// Current nesting, bounded by `MAX_EXPRESSION_DEPTH`.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, origin: Location) -> Result<Self> {
        let tokens = Lexer::new(src).tokenize().map_err(|LexError { message, offset }| {
            Error::syntax(
                SyntaxErrorKind::MalformedExpression(message),
                offset_location(src, origin, offset),
            )
        })?;
        Ok(Self { src, origin, tokens, pos: 0, depth: 0 })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == word)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_kind(&self, kind: SyntaxErrorKind, offset: usize) -> Error {
        Error::syntax(kind, offset_location(self.src, self.origin, offset))
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> Error {
        self.error_kind(SyntaxErrorKind::MalformedExpression(message.into()), offset)
    }

    /// Enters one nesting level. Callers restore `depth` once the nested
    /// construct is parsed; after an error the parser is discarded anyway.
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(self.error(
                format!("expression nested more than {MAX_EXPRESSION_DEPTH} levels deep"),
                self.offset(),
            ));
        }
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> Error {
        self.error(format!("expected {expected}, found {}", self.peek()), self.offset())
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn keyword(&mut self, word: &str) -> Result<()> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{word}'")))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        while self.eat(&Token::Newline) {}
        if self.at(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        let is_target = matches!(self.peek(), Token::Ident(name) if !KEYWORDS.contains(&name.as_str()));
        if is_target {
            let aug = match self.peek_next() {
                Token::PlusAssign => Some(BinaryOp::Add),
                Token::MinusAssign => Some(BinaryOp::Sub),
                Token::StarAssign => Some(BinaryOp::Mul),
                Token::SlashAssign => Some(BinaryOp::Div),
                _ => None,
            };
            if let Some(op) = aug {
                let target = self.ident()?;
                self.advance();
                let value = self.expression()?;
                return Ok(Stmt::AugAssign { target, op, value });
            }
            if matches!(self.peek_next(), Token::Assign | Token::Comma) {
                let start = self.pos;
                let mut targets = vec![self.ident()?];
                while self.eat(&Token::Comma) {
                    match self.ident() {
                        Ok(name) => targets.push(name),
                        Err(_) => break,
                    }
                }
                if self.eat(&Token::Assign) {
                    let first = self.expression()?;
                    if !self.at(&Token::Comma) {
                        return Ok(Stmt::Assign { targets, value: first });
                    }
                    // Bare tuple on the right-hand side.
                    let mut items = vec![first];
                    while self.eat(&Token::Comma) {
                        if self.at(&Token::Newline) || self.at(&Token::Semicolon) || self.at(&Token::Eof) {
                            break;
                        }
                        items.push(self.expression()?);
                    }
                    return Ok(Stmt::Assign { targets, value: Expr::List(items) });
                }
                self.pos = start;
            }
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr> {
        self.descend()?;
        let expr = self.conditional()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn conditional(&mut self) -> Result<Expr> {
        let then = self.or_expr()?;
        if self.eat_keyword("if") {
            let condition = self.or_expr()?;
            self.keyword("else")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            self.descend()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            self.descend()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            self.descend()?;
            let operand = self.not_expr()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek().clone() {
                Token::EqEq => CmpOp::Eq,
                Token::NotEq => CmpOp::Ne,
                Token::Lt => CmpOp::Lt,
                Token::Le => CmpOp::Le,
                Token::Gt => CmpOp::Gt,
                Token::Ge => CmpOp::Ge,
                Token::Ident(w) if w == "in" => CmpOp::In,
                Token::Ident(w) if w == "not" && matches!(self.peek_next(), Token::Ident(n) if n == "in") => {
                    self.advance();
                    CmpOp::NotIn
                }
                Token::Ident(w) if w == "is" => {
                    if matches!(self.peek_next(), Token::Ident(n) if n == "not") {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare { left: Box::new(left), rest })
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.descend()?;
            let right = self.multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.descend()?;
            let right = self.unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        self.descend()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat(&Token::DoubleStar) {
            self.descend()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            if !matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.depth = base;
                return Ok(expr);
            }
            self.descend()?;
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        _ => return Err(self.error("expected attribute name after '.'", self.offset())),
                    };
                    expr = Expr::Attr { target: Box::new(expr), name };
                }
                Token::LBracket => {
                    self.advance();
                    expr = self.subscript(expr)?;
                }
                Token::LParen => {
                    self.advance();
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call { callee: Box::new(expr), args, kwargs };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr> {
        let start = if self.at(&Token::Colon) { None } else { Some(Box::new(self.expression()?)) };
        if self.eat(&Token::RBracket) {
            let index = start.ok_or_else(|| self.unexpected("an index"))?;
            return Ok(Expr::Index { target: Box::new(target), index });
        }
        self.expect(&Token::Colon)?;
        let bound = |p: &mut Self| -> Result<Option<Box<Expr>>> {
            if p.at(&Token::Colon) || p.at(&Token::RBracket) {
                Ok(None)
            } else {
                Ok(Some(Box::new(p.expression()?)))
            }
        };
        let stop = bound(self)?;
        let step = if self.eat(&Token::Colon) { bound(self)? } else { None };
        self.expect(&Token::RBracket)?;
        Ok(Expr::Slice { target: Box::new(target), start, stop, step })
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.at(&Token::RParen) {
            let keyword = match (self.peek(), self.peek_next()) {
                (Token::Ident(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                let offset = self.offset();
                self.advance();
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(format!("keyword argument '{name}' repeated"), offset));
                }
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument", self.offset()));
                }
                args.push(self.expression()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok((args, kwargs))
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(n) => Ok(Expr::Literal(Value::Float(n))),
            Token::Str(s) => {
                // Adjacent literals concatenate.
                let mut s = s;
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::FStr(body) => self.fstring(&body, offset),
            Token::Ident(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::Null)),
                word if KEYWORDS.contains(&word) => {
                    Err(self.error(format!("unexpected keyword '{word}'"), offset))
                }
                _ => Ok(Expr::Name(name)),
            },
            Token::LParen => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    if self.at(&Token::RParen) {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::List(items))
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.at(&Token::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                while !self.at(&Token::RBrace) {
                    let key = self.expression()?;
                    self.expect(&Token::Colon)?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace)?;
                Ok(Expr::Map(entries))
            }
            other => Err(self.error(format!("unexpected {other}"), offset)),
        }
    }

    fn fstring(&self, body: &str, offset: usize) -> Result<Expr> {
        let origin = offset_location(self.src, self.origin, offset);
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = body;
        while let Some(c) = rest.chars().next() {
            match c {
                '{' if rest.starts_with("{{") => {
                    literal.push('{');
                    rest = &rest[2..];
                }
                '}' if rest.starts_with("}}") => {
                    literal.push('}');
                    rest = &rest[2..];
                }
                '{' => {
                    let end = find_closing_brace(&rest[1..])
                        .ok_or_else(|| self.error("unterminated '{' in f-string", offset))?;
                    if !literal.is_empty() {
                        parts.push(FormatPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(FormatPart::Expr(parse_expression(&rest[1..1 + end], origin)?));
                    rest = &rest[end + 2..];
                }
                '}' => return Err(self.error("single '}' in f-string", offset)),
                c => {
                    literal.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        if !literal.is_empty() {
            parts.push(FormatPart::Literal(literal));
        }
        Ok(Expr::Format(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        parse_expression(src, Location::new(1, 1)).unwrap()
    }

    fn lit(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(n)))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOp::Add,
                left: lit(1),
                right: Box::new(Expr::Binary { op: BinaryOp::Mul, left: lit(2), right: lit(3) }),
            }
        );
    }

    #[test]
    fn test_unary_binds_looser_than_power() {
        assert_eq!(
            parse("-2 ** 2"),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::Binary { op: BinaryOp::Pow, left: lit(2), right: lit(2) }),
            }
        );
    }

    #[test]
    fn test_not_in_and_ternary() {
        let expr = parse("'a' if x not in xs else 'b'");
        let Expr::Conditional { condition, .. } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*condition, Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::NotIn));
    }

    #[test]
    fn test_call_with_keywords() {
        let expr = parse("f(1, sep=', ')");
        let Expr::Call { args, kwargs, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert_eq!(kwargs[0].0, "sep");
    }

    #[test]
    fn test_fstring_parts() {
        let expr = parse("f'lib{name}.{{a}}'");
        assert_eq!(
            expr,
            Expr::Format(vec![
                FormatPart::Literal("lib".into()),
                FormatPart::Expr(Expr::Name("name".into())),
                FormatPart::Literal(".{a}".into()),
            ])
        );
    }

    #[test]
    fn test_statements() {
        let stmts = parse_statements("x = 1\n  y += x; a, b = [1, 2]\nf(x)", Location::new(1, 1)).unwrap();
        assert_eq!(stmts.len(), 4);
        assert!(matches!(&stmts[2], Stmt::Assign { targets, .. } if targets.len() == 2));
        assert!(matches!(&stmts[3], Stmt::Expr(Expr::Call { .. })));
    }

    #[test]
    fn test_params_reject_duplicates() {
        let params = parse_params("name, greeting='Hi'", Location::new(1, 1)).unwrap();
        assert_eq!(params.len(), 2);
        assert!(params[1].default.is_some());

        let err = parse_params("a, a", Location::new(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::SyntaxError { kind: SyntaxErrorKind::DuplicateParameter(ref n), .. } if n == "a"
        ));
    }

    #[test]
    fn test_loop_header() {
        let (names, _) = parse_loop("key, value in opts.items()", Location::new(1, 1)).unwrap();
        assert_eq!(names, vec!["key", "value"]);
    }

    #[test]
    fn test_bindings_forms() {
        let map = parse_bindings("{'name': name}", Location::new(1, 1)).unwrap();
        assert!(matches!(map, Expr::Map(ref e) if e.len() == 1));
        let kw = parse_bindings("name=name, version='1.0'", Location::new(1, 1)).unwrap();
        assert!(matches!(kw, Expr::Map(ref e) if e.len() == 2));
        assert!(parse_bindings("[1]", Location::new(1, 1)).is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse_expression(&nested(50), Location::new(1, 1)).is_ok());
        for src in [
            nested(20_000),
            "-".repeat(20_000) + "1",
            "not ".repeat(20_000) + "x",
            vec!["1"; 20_000].join(" + "),
            vec!["2"; 20_000].join(" ** "),
            "x".to_string() + &".a".repeat(20_000),
        ] {
            assert!(
                matches!(
                    parse_expression(&src, Location::new(1, 1)),
                    Err(Error::SyntaxError { kind: SyntaxErrorKind::MalformedExpression(_), .. })
                ),
                "{}",
                &src[..20]
            );
        }
    }

    #[test]
    fn test_error_location() {
        let err = parse_expression("1 +\n  )", Location::new(3, 5));
        // Newlines outside brackets end the expression.
        assert!(matches!(err, Err(Error::SyntaxError { location, .. }) if location.line == 3));

        let err = parse_expression("(1 +\n  ]", Location::new(3, 5)).unwrap_err();
        let Error::SyntaxError { location, .. } = err else { panic!() };
        assert_eq!(location, Location::new(4, 3));
    }
}
