//! Compiled templates: the node tree, output filters and the page contract.

use crate::error::{Error, Location, Result, SyntaxErrorKind};
use crate::expr::{Expr, ParamDecl, Stmt};
use crate::{parser, scanner};
use log::debug;
use url::form_urlencoded;

/// Output filter applied to the text of an `${}` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// `h`: HTML/XML escaping.
    Html,
    /// `u`: URL (form) encoding.
    Url,
    /// `trim`: strips surrounding whitespace.
    Trim,
    /// `n`: disables escaping; a no-op since nothing is escaped by default.
    None,
}

impl Filter {
    pub fn from_name(name: &str, location: Location) -> Result<Self> {
        match name {
            "h" | "x" => Ok(Filter::Html),
            "u" => Ok(Filter::Url),
            "trim" => Ok(Filter::Trim),
            "n" => Ok(Filter::None),
            other => Err(Error::syntax(
                SyntaxErrorKind::MalformedExpression(format!("unknown filter '{other}'")),
                location,
            )),
        }
    }

    pub fn apply(&self, text: String) -> String {
        match self {
            Filter::Html => escape_html(&text),
            Filter::Url => form_urlencoded::byte_serialize(text.as_bytes()).collect(),
            Filter::Trim => text.trim().to_string(),
            Filter::None => text,
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// A node of the template tree. Children are owned by their parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Expr { expr: Expr, filters: Vec<Filter> },
    Code(Vec<Stmt>),
    If { branches: Vec<(Expr, Vec<Node>)>, else_body: Option<Vec<Node>> },
    For { names: Vec<String>, iterable: Expr, body: Vec<Node> },
    /// `file` evaluates to the target identity, `args` to a mapping.
    Include { file: Expr, args: Expr },
    RawText(String),
    Comment,
}

/// A compiled template. Immutable once parsed, so it can be shared
/// between threads and rendered concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    identity: String,
    nodes: Vec<Node>,
    params: Option<Vec<ParamDecl>>,
}

impl Template {
    /// Scans and parses `source`. No partial template is ever returned.
    pub fn parse(identity: impl Into<String>, source: &str) -> Result<Self> {
        let identity = identity.into();
        let segments = scanner::scan(source)?;
        let (nodes, params) = parser::parse(segments)?;
        debug!("compiled template '{identity}' ({} node(s))", nodes.len());
        Ok(Self { identity, nodes, params })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Declared page parameters; empty when there is no `<%page>`.
    pub fn params(&self) -> &[ParamDecl] {
        self.params.as_deref().unwrap_or_default()
    }

    /// Whether the template carries a `<%page>` directive.
    pub fn declares_params(&self) -> bool {
        self.params.is_some()
    }
}
