use super::interface::TemplateResolver;
use super::{normalize_identity, TemplateSource};
use crate::error::ResolutionError;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};

/// Resolver for templates stored under a single root directory.
///
/// Identities are paths relative to the root; anything that would escape
/// it is reported as not found.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, identity: &str) -> Option<PathBuf> {
        let relative = normalize_identity(identity)?;
        if relative.is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl TemplateResolver for DirectoryResolver {
    fn resolve(&self, identity: &str) -> Result<TemplateSource, ResolutionError> {
        let not_found = || ResolutionError::NotFound { identity: identity.to_string() };
        let Some(path) = self.path_for(identity) else {
            debug!("Template '{identity}' is outside of {}", self.root.display());
            return Err(not_found());
        };

        debug!("Reading template '{identity}' from {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(TemplateSource::Text(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(source) => Err(ResolutionError::Io { identity: identity.to_string(), source }),
        }
    }
}
