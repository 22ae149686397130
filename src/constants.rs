//! Common constants used throughout kiln.

/// Supported configuration file names, tried in order.
pub const CONFIG_FILES: [&str; 3] = ["kiln.json", "kiln.yml", "kiln.yaml"];

/// Default bound on nested `<%include>` depth.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

/// Default bound on `range()` sizes and iterations of a single `% for`.
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Identity given to templates rendered straight from text.
pub const INLINE_IDENTITY: &str = "<string>";

/// Deepest nesting of brackets, unary operators and operator chains in one
/// expression.
pub const MAX_EXPRESSION_DEPTH: usize = 100;

/// Deepest nesting of `% if` / `% for` blocks in one template.
pub const MAX_BLOCK_DEPTH: usize = 64;
