use super::interface::TemplateResolver;
use super::{normalize_identity, TemplateSource};
use crate::error::ResolutionError;
use std::collections::HashMap;

/// Resolver backed by an in-memory map of identity to template text.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    templates: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template, returning the resolver for chaining.
    pub fn with(mut self, identity: &str, source: impl Into<String>) -> Self {
        self.insert(identity, source);
        self
    }

    pub fn insert(&mut self, identity: &str, source: impl Into<String>) {
        let key = normalize_identity(identity).unwrap_or_else(|| identity.to_string());
        self.templates.insert(key, source.into());
    }
}

impl TemplateResolver for MemoryResolver {
    fn resolve(&self, identity: &str) -> Result<TemplateSource, ResolutionError> {
        normalize_identity(identity)
            .and_then(|key| self.templates.get(&key))
            .map(|source| TemplateSource::Text(source.clone()))
            .ok_or_else(|| ResolutionError::NotFound { identity: identity.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new().with("/common/header.mako", "# header");
        assert!(matches!(
            resolver.resolve("common/header.mako"),
            Ok(TemplateSource::Text(text)) if text == "# header"
        ));
        assert!(matches!(
            resolver.resolve("missing.mako"),
            Err(ResolutionError::NotFound { identity }) if identity == "missing.mako"
        ));
    }
}
