//! kiln is a Mako-compatible template engine for generating build files,
//! source stubs and manifests.
//!
//! Templates mix literal text with `${}` expressions, `<% %>` code blocks,
//! `%` control lines, `<%page>` parameter contracts and `<%include>`
//! directives. Parsing produces an immutable [`Template`] that can be
//! cached and rendered concurrently.
//!
//! ```
//! let out = kiln::render("% for i in range(3):\n${i}\n% endfor\n", &serde_json::json!({})).unwrap();
//! assert_eq!(out, "0\n1\n2\n");
//! ```

/// Built-in functions and methods of the expression language
pub mod builtins;

/// Memoised compiled templates
pub mod cache;

/// Command-line interface module for the kiln binary
pub mod cli;

/// Engine configuration
/// Supports JSON and YAML formats (kiln.json, kiln.yml, kiln.yaml)
pub mod config;

/// Common constants
pub mod constants;

/// Scope chain used while rendering
pub mod context;

/// Error types and handling
pub mod error;

/// The embedded expression and statement language
pub mod expr;

/// Template sources and include resolvers
pub mod loader;

/// Segment stream to template tree
pub mod parser;

/// Template evaluation
pub mod renderer;

/// Raw text to segment stream
pub mod scanner;

/// Compiled templates, nodes and output filters
pub mod template;

/// Dynamic values flowing through templates
pub mod value;

pub use cache::TemplateCache;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use loader::{TemplateResolver, TemplateSource};
pub use renderer::Engine;
pub use template::Template;
pub use value::{Map, Value};

/// Renders template text with a JSON context using a default [`Engine`].
pub fn render(source: &str, context: &serde_json::Value) -> Result<String> {
    Engine::default().render_json(source, context)
}
