//! Builds the template tree from the scanner's segments.
//!
//! Control lines open and close blocks on an explicit stack; the page
//! directive is validated here and turned into the parameter contract.

use crate::constants::MAX_BLOCK_DEPTH;
use crate::error::{Error, Location, Result, SyntaxErrorKind};
use crate::expr::ast::ParamDecl;
use crate::expr::parser::{parse_bindings, parse_filtered, parse_interpolated, parse_loop, parse_params};
use crate::expr::{parse_expression, parse_statements, Expr};
use crate::scanner::{attr, Segment, SegmentKind};
use crate::template::{Filter, Node};
use log::trace;

/// Parsed tree plus the declared parameters, `None` without a `<%page>`.
pub type Parsed = (Vec<Node>, Option<Vec<ParamDecl>>);

pub fn parse(segments: Vec<Segment>) -> Result<Parsed> {
    let mut builder = Builder::default();
    for segment in segments {
        builder.segment(segment)?;
    }
    builder.finish()
}

enum Frame {
    If {
        location: Location,
        branches: Vec<(Expr, Vec<Node>)>,
        /// `None` once the `else` branch has started.
        condition: Option<Expr>,
        body: Vec<Node>,
    },
    For {
        location: Location,
        names: Vec<String>,
        iterable: Expr,
        body: Vec<Node>,
    },
}

impl Frame {
    fn keyword(&self) -> &'static str {
        match self {
            Frame::If { .. } => "if",
            Frame::For { .. } => "for",
        }
    }

    fn location(&self) -> Location {
        match self {
            Frame::If { location, .. } | Frame::For { location, .. } => *location,
        }
    }

    fn body_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Frame::If { body, .. } | Frame::For { body, .. } => body,
        }
    }
}

#[derive(Default)]
struct Builder {
    root: Vec<Node>,
    frames: Vec<Frame>,
    page: Option<Vec<ParamDecl>>,
    content_seen: bool,
}

impl Builder {
    fn push(&mut self, node: Node) {
        match self.frames.last_mut() {
            Some(frame) => frame.body_mut().push(node),
            None => self.root.push(node),
        }
    }

    fn segment(&mut self, segment: Segment) -> Result<()> {
        let Segment { kind, location, body } = segment;
        match kind {
            SegmentKind::Text(text) => {
                if !text.trim().is_empty() {
                    self.content_seen = true;
                }
                self.push(Node::Text(text));
            }
            SegmentKind::Comment => self.push(Node::Comment),
            SegmentKind::Verbatim(text) => {
                self.content_seen = true;
                self.push(Node::RawText(text));
            }
            SegmentKind::Expr(source) => {
                self.content_seen = true;
                let (expr, names) = parse_filtered(&source, body)?;
                let filters = names
                    .iter()
                    .map(|(name, at)| Filter::from_name(name, *at))
                    .collect::<Result<Vec<_>>>()?;
                self.push(Node::Expr { expr, filters });
            }
            SegmentKind::Code(source) => {
                self.content_seen = true;
                self.push(Node::Code(parse_statements(&source, body)?));
            }
            SegmentKind::Control(line) => {
                self.content_seen = true;
                self.control(&line, location, body)?;
            }
            SegmentKind::Tag { name, attrs } => match name.as_str() {
                "page" => self.page(&attrs, location)?,
                "include" => {
                    self.content_seen = true;
                    self.include(&attrs, location)?;
                }
                _ => return Err(Error::syntax(SyntaxErrorKind::UnknownDirective(name), location)),
            },
        }
        Ok(())
    }

    fn page(&mut self, attrs: &[(String, String)], location: Location) -> Result<()> {
        if self.page.is_some() {
            return Err(Error::syntax(SyntaxErrorKind::DuplicatePageArgs, location));
        }
        if self.content_seen || !self.frames.is_empty() {
            return Err(Error::syntax(SyntaxErrorKind::MisplacedPageArgs, location));
        }
        let params = parse_params(attr(attrs, "args").unwrap_or(""), location)?;
        trace!("page declares {} parameter(s)", params.len());
        self.page = Some(params);
        Ok(())
    }

    fn include(&mut self, attrs: &[(String, String)], location: Location) -> Result<()> {
        let file = attr(attrs, "file").ok_or_else(|| {
            Error::syntax(
                SyntaxErrorKind::MalformedExpression("<%include> requires a 'file' attribute".to_string()),
                location,
            )
        })?;
        let file = parse_interpolated(file, location)?;
        let args = parse_bindings(attr(attrs, "args").unwrap_or(""), location)?;
        self.push(Node::Include { file, args });
        Ok(())
    }

    fn open(&mut self, frame: Frame) -> Result<()> {
        if self.frames.len() >= MAX_BLOCK_DEPTH {
            return Err(unbalanced(
                format!("blocks nested more than {MAX_BLOCK_DEPTH} levels deep"),
                frame.location(),
            ));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn control(&mut self, line: &str, location: Location, body: Location) -> Result<()> {
        let line = line.strip_suffix(':').unwrap_or(line).trim_end();
        let split = line
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(line.len());
        let (keyword, rest) = line.split_at(split);
        let rest_origin = Location::new(body.line, body.column + split);
        trace!("control line '{keyword}' at {location}");

        match keyword {
            "if" => {
                let condition = parse_expression(rest, rest_origin)?;
                self.open(Frame::If {
                    location,
                    branches: Vec::new(),
                    condition: Some(condition),
                    body: Vec::new(),
                })?;
            }
            "elif" | "else" => {
                let next = if keyword == "elif" {
                    Some(parse_expression(rest, rest_origin)?)
                } else {
                    if !rest.trim().is_empty() {
                        return Err(Error::syntax(
                            SyntaxErrorKind::MalformedExpression(format!("unexpected '{}' after else", rest.trim())),
                            rest_origin,
                        ));
                    }
                    None
                };
                let Some(Frame::If { branches, condition, body, .. }) = self.frames.last_mut() else {
                    return Err(unbalanced(format!("'{keyword}' outside of an if block"), location));
                };
                let Some(current) = condition.take() else {
                    return Err(unbalanced(format!("'{keyword}' after else"), location));
                };
                branches.push((current, std::mem::take(body)));
                *condition = next;
            }
            "endif" => match self.frames.pop() {
                Some(Frame::If { branches: mut done, condition, body, .. }) => {
                    let else_body = match condition {
                        Some(condition) => {
                            done.push((condition, body));
                            None
                        }
                        None => Some(body),
                    };
                    self.push(Node::If { branches: done, else_body });
                }
                other => return Err(mismatched("endif", other, location)),
            },
            "for" => {
                let (names, iterable) = parse_loop(rest, rest_origin)?;
                self.open(Frame::For { location, names, iterable, body: Vec::new() })?;
            }
            "endfor" => match self.frames.pop() {
                Some(Frame::For { names, iterable, body, .. }) => {
                    self.push(Node::For { names, iterable, body });
                }
                other => return Err(mismatched("endfor", other, location)),
            },
            "" => {
                return Err(Error::syntax(
                    SyntaxErrorKind::UnknownDirective(format!("%{line}")),
                    location,
                ))
            }
            other => {
                return Err(Error::syntax(SyntaxErrorKind::UnknownDirective(other.to_string()), location))
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Parsed> {
        if let Some(frame) = self.frames.pop() {
            return Err(unbalanced(
                format!("'{}' opened at {} is never closed", frame.keyword(), frame.location()),
                frame.location(),
            ));
        }
        Ok((self.root, self.page))
    }
}

fn unbalanced(message: String, location: Location) -> Error {
    Error::syntax(SyntaxErrorKind::UnbalancedBlock(message), location)
}

fn mismatched(closer: &str, open: Option<Frame>, location: Location) -> Error {
    match open {
        Some(frame) => unbalanced(
            format!("'{closer}' closes '{}' opened at {}", frame.keyword(), frame.location()),
            location,
        ),
        None => unbalanced(format!("'{closer}' without an open block"), location),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn parse_source(source: &str) -> Result<Parsed> {
        parse(scan(source)?)
    }

    fn syntax_kind(source: &str) -> SyntaxErrorKind {
        match parse_source(source) {
            Err(Error::SyntaxError { kind, .. }) => kind,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_if_chain_builds_branches() {
        let (nodes, page) = parse_source("% if a:\n1\n% elif b:\n2\n% else:\n3\n% endif\n").unwrap();
        assert!(page.is_none());
        match &nodes[..] {
            [Node::If { branches, else_body: Some(else_body) }] => {
                assert_eq!(branches.len(), 2);
                assert_eq!(else_body, &vec![Node::Text("3\n".into())]);
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn test_nested_blocks() {
        let (nodes, _) = parse_source("% for x in xs:\n% if x:\n${x}\n% endif\n% endfor\n").unwrap();
        let [Node::For { names, body, .. }] = &nodes[..] else {
            panic!("expected a single for node");
        };
        assert_eq!(names, &["x".to_string()]);
        assert!(matches!(body[..], [Node::If { .. }]));
    }

    #[test]
    fn test_unbalanced_blocks() {
        for source in [
            "% if x:\n",
            "% for x in y:\n% endif\n",
            "% endfor\n",
            "% else:\n",
            "% if a:\n% else:\n% elif b:\n% endif\n",
        ] {
            assert!(
                matches!(syntax_kind(source), SyntaxErrorKind::UnbalancedBlock(_)),
                "{source:?}"
            );
        }
    }

    #[test]
    fn test_block_nesting_is_bounded() {
        let nested = |depth: usize| "% if True:\n".repeat(depth) + "x\n" + &"% endif\n".repeat(depth);
        assert!(parse_source(&nested(MAX_BLOCK_DEPTH)).is_ok());
        assert!(matches!(syntax_kind(&nested(MAX_BLOCK_DEPTH + 1)), SyntaxErrorKind::UnbalancedBlock(_)));
        assert!(matches!(syntax_kind(&nested(20_000)), SyntaxErrorKind::UnbalancedBlock(_)));
    }

    #[test]
    fn test_page_must_come_first_and_once() {
        assert_eq!(syntax_kind("hello\n<%page args='x'/>"), SyntaxErrorKind::MisplacedPageArgs);
        assert_eq!(
            syntax_kind("<%page args='x'/>\n<%page args='y'/>"),
            SyntaxErrorKind::DuplicatePageArgs
        );
        assert_eq!(
            syntax_kind("<%page args='x, x'/>"),
            SyntaxErrorKind::DuplicateParameter("x".into())
        );
        let (_, page) = parse_source("## header\n\n<%page args='x=1'/>").unwrap();
        assert_eq!(page.map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_include_arguments() {
        let (nodes, _) =
            parse_source(r#"<%include file="${kind}/header.mako" args="title=name, level=2"/>"#).unwrap();
        let [Node::Include { file, args: Expr::Map(entries) }] = &nodes[..] else {
            panic!("expected an include node");
        };
        assert!(matches!(file, Expr::Format(_)));
        assert_eq!(entries.len(), 2);
        assert!(parse_source("<%include args='x=1'/>").is_err());
    }

    #[test]
    fn test_unknown_control_keyword() {
        assert_eq!(syntax_kind("% while x:\n"), SyntaxErrorKind::UnknownDirective("while".into()));
    }

    #[test]
    fn test_filters_are_resolved() {
        let (nodes, _) = parse_source("${name | h, trim}").unwrap();
        assert!(matches!(&nodes[..], [Node::Expr { filters, .. }] if filters == &[Filter::Html, Filter::Trim]));
        assert!(parse_source("${name | nope}").is_err());
    }
}
