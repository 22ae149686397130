use super::TemplateSource;
use crate::error::ResolutionError;

/// Trait for supplying template bodies by identity.
///
/// Called synchronously during rendering whenever an include target is not
/// yet cached; implementations may block.
pub trait TemplateResolver: Send + Sync {
    /// Resolves a template identity.
    ///
    /// # Arguments
    /// * `identity` - Normalised template name or relative path
    ///
    /// # Returns
    /// * `Result<TemplateSource, ResolutionError>` - Template text or a compiled handle
    fn resolve(&self, identity: &str) -> Result<TemplateSource, ResolutionError>;
}

impl<F> TemplateResolver for F
where
    F: Fn(&str) -> Result<TemplateSource, ResolutionError> + Send + Sync,
{
    fn resolve(&self, identity: &str) -> Result<TemplateSource, ResolutionError> {
        self(identity)
    }
}
