//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::extraction::LineCache;
use crate::registry::RunRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    documents: DocumentStore,
    lines: LineCache,
    registry: RunRegistry,
}

impl AppState {
    pub fn new(
        config: Config,
        documents: DocumentStore,
        lines: LineCache,
        registry: RunRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                documents,
                lines,
                registry,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the document store
    pub fn documents(&self) -> &DocumentStore {
        &self.inner.documents
    }

    /// Get the extracted-line cache
    pub fn lines(&self) -> &LineCache {
        &self.inner.lines
    }

    /// Get the run registry
    pub fn registry(&self) -> &RunRegistry {
        &self.inner.registry
    }
}
