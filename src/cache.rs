//! Memoised compiled templates, keyed by resolved identity.
//!
//! Each identity owns its own slot lock, so concurrent first access to the
//! same identity compiles once while other identities proceed in parallel.
//! Failed compilations are not cached. Invalidation is explicit through
//! [`TemplateCache::evict`] and [`TemplateCache::clear`].

use crate::error::Result;
use crate::template::Template;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Slot = Arc<Mutex<Option<Arc<Template>>>>;

#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<String, Slot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached template for `identity`, running `compile` on a
    /// miss. Callers racing on the same identity wait for the first
    /// compilation instead of repeating it.
    pub fn get_or_compile<F>(&self, identity: &str, compile: F) -> Result<Arc<Template>>
    where
        F: FnOnce() -> Result<Arc<Template>>,
    {
        let slot = lock(&self.entries).entry(identity.to_string()).or_default().clone();
        let mut guard = lock(&slot);
        if let Some(template) = guard.as_ref() {
            debug!("Template cache hit for '{identity}'");
            return Ok(Arc::clone(template));
        }

        debug!("Template cache miss for '{identity}'");
        let template = match compile() {
            Ok(template) => template,
            Err(err) => {
                // Nothing else waits on a slot while holding `entries`.
                let mut entries = lock(&self.entries);
                if entries.get(identity).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    entries.remove(identity);
                }
                return Err(err);
            }
        };
        *guard = Some(Arc::clone(&template));
        Ok(template)
    }

    pub fn get(&self, identity: &str) -> Option<Arc<Template>> {
        let slot = lock(&self.entries).get(identity).cloned()?;
        let guard = lock(&slot);
        guard.clone()
    }

    /// Stores an already compiled template, replacing any previous entry.
    pub fn insert(&self, identity: &str, template: Arc<Template>) {
        let slot = lock(&self.entries).entry(identity.to_string()).or_default().clone();
        *lock(&slot) = Some(template);
    }

    pub fn evict(&self, identity: &str) -> Option<Arc<Template>> {
        let slot = lock(&self.entries).remove(identity)?;
        debug!("Evicted '{identity}' from the template cache");
        let mut guard = lock(&slot);
        guard.take()
    }

    pub fn clear(&self) {
        debug!("Clearing the template cache");
        lock(&self.entries).clear();
    }

    /// Number of compiled templates held.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.entries).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
