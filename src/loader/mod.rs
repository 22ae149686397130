//! Template sources and include resolution.
//!
//! The engine never touches the filesystem itself: every include goes
//! through a [`TemplateResolver`], which hands back either raw text or an
//! already compiled template.

use crate::template::Template;
use std::sync::Arc;

pub mod interface;
pub mod local;
pub mod memory;

pub use interface::TemplateResolver;
pub use local::DirectoryResolver;
pub use memory::MemoryResolver;

/// Something that can be rendered.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Raw template text, parsed on use.
    Text(String),
    /// A compiled template handle.
    Template(Arc<Template>),
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateSource::Text(text) => write!(f, "template text ({} bytes)", text.len()),
            TemplateSource::Template(template) => {
                write!(f, "compiled template: '{}'", template.identity())
            }
        }
    }
}

impl From<&str> for TemplateSource {
    fn from(text: &str) -> Self {
        TemplateSource::Text(text.to_string())
    }
}

impl From<String> for TemplateSource {
    fn from(text: String) -> Self {
        TemplateSource::Text(text)
    }
}

impl From<Template> for TemplateSource {
    fn from(template: Template) -> Self {
        TemplateSource::Template(Arc::new(template))
    }
}

impl From<Arc<Template>> for TemplateSource {
    fn from(template: Arc<Template>) -> Self {
        TemplateSource::Template(template)
    }
}

/// Normalises an identity: strips a leading `/` and resolves `.` and `..`
/// segments. Returns `None` when `..` would climb above the root.
pub fn normalize_identity(identity: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in identity.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    Some(parts.join("/"))
}

/// Resolves an include target against the identity of the including
/// template. Absolute targets (leading `/`) start from the root, relative
/// ones from the includer's directory.
pub fn join_identity(current: &str, target: &str) -> String {
    if target.starts_with('/') {
        return target.trim_start_matches('/').to_string();
    }
    match current.rfind('/') {
        Some(slash) => format!("{}/{}", &current[..slash], target),
        None => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_source_display() {
        assert_eq!(TemplateSource::from("abc").to_string(), "template text (3 bytes)");
        let compiled = Template::parse("common/header.mako", "x").unwrap();
        assert_eq!(
            TemplateSource::from(compiled).to_string(),
            "compiled template: 'common/header.mako'"
        );
    }

    #[test]
    fn test_identity_helpers() {
        assert_eq!(join_identity("cmake/lists.mako", "common.mako"), "cmake/common.mako");
        assert_eq!(join_identity("cmake/lists.mako", "/make/rules.mako"), "make/rules.mako");
        assert_eq!(join_identity("page", "header"), "header");
        assert_eq!(normalize_identity("/a/./b/../c").as_deref(), Some("a/c"));
        assert_eq!(normalize_identity("../etc/passwd"), None);
    }
}
