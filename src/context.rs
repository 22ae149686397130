//! Scope chain used while rendering.
//!
//! Lookups walk from the innermost scope outward and finally consult the
//! engine's globals. Bindings always go to the innermost scope, so child
//! scopes never leak into their ancestors.

use crate::constants::DEFAULT_MAX_ITERATIONS;
use crate::error::{Error, Result};
use crate::value::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RenderContext {
    globals: Arc<Map>,
    scopes: Vec<Map>,
    max_iterations: usize,
}

impl RenderContext {
    /// Creates a context whose root scope holds the caller-supplied variables.
    pub fn new(globals: Arc<Map>, root: Map) -> Self {
        Self { globals, scopes: vec![root], max_iterations: DEFAULT_MAX_ITERATIONS }
    }

    /// Caps the size of sequences built by repetition and concatenation.
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.max_iterations = limit;
        self
    }

    pub fn iteration_limit(&self) -> usize {
        self.max_iterations
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// Looks `name` up in the scope chain only, ignoring globals.
    pub fn lookup_local(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Like [`RenderContext::lookup`], failing with `NameError` on a miss.
    pub fn resolve(&self, name: &str) -> Result<Value> {
        self.lookup(name).cloned().ok_or_else(|| Error::name_error(name))
    }

    /// Binds `name` in the innermost scope.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    pub fn push_scope(&mut self, scope: Map) {
        self.scopes.push(scope);
    }

    /// Discards the innermost scope. The root scope is never popped.
    pub fn pop_scope(&mut self) -> Option<Map> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Runs `f` inside a fresh child scope, discarding it afterwards even
    /// when `f` fails.
    pub fn scoped<T>(&mut self, scope: Map, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.push_scope(scope);
        let result = f(self);
        self.pop_scope();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RenderContext {
        let mut globals = Map::new();
        globals.insert("len".into(), Value::from("builtin"));
        let mut root = Map::new();
        root.insert("name".into(), Value::from("demo"));
        RenderContext::new(Arc::new(globals), root)
    }

    #[test]
    fn test_innermost_scope_wins() {
        let mut ctx = context();
        let mut inner = Map::new();
        inner.insert("name".into(), Value::from("inner"));
        ctx.push_scope(inner);
        assert_eq!(ctx.resolve("name").unwrap(), Value::from("inner"));
        ctx.pop_scope();
        assert_eq!(ctx.resolve("name").unwrap(), Value::from("demo"));
    }

    #[test]
    fn test_child_bindings_do_not_leak() {
        let mut ctx = context();
        ctx.scoped(Map::new(), |ctx| {
            ctx.bind("tmp", Value::Int(1));
            assert!(ctx.lookup("tmp").is_some());
            Ok(())
        })
        .unwrap();
        assert!(matches!(ctx.resolve("tmp"), Err(Error::NameError { name }) if name == "tmp"));
    }

    #[test]
    fn test_scope_is_popped_on_error() {
        let mut ctx = context();
        let result: Result<()> = ctx.scoped(Map::new(), |_| Err(Error::name_error("x")));
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_globals_are_the_last_resort() {
        let mut ctx = context();
        assert_eq!(ctx.resolve("len").unwrap(), Value::from("builtin"));
        ctx.bind("len", Value::Int(3));
        assert_eq!(ctx.resolve("len").unwrap(), Value::Int(3));
        assert!(ctx.pop_scope().is_none());
        assert!(ctx.lookup_local("missing").is_none());
    }
}
