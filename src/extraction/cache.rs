//! Per-document line cache
//!
//! Line extraction is CPU bound and comparatively slow, so lines are
//! extracted once per document and shared by every run on it. Extraction
//! is offloaded to the blocking pool under a timeout; the blocking thread
//! may keep running after a timeout but the caller gets an answer.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::{timeout, Duration};

use super::types::{ExtractionError, LineSource, TextLine};

/// Default number of documents whose lines are kept
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Default extraction timeout
pub const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 60;

/// Cache key: a document and the file its lines came from
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct LineCacheKey {
    document_id: String,
    pdf_path: String,
}

/// LRU cache of extracted lines in front of a [`LineSource`]
#[derive(Clone)]
pub struct LineCache {
    source: Arc<dyn LineSource>,
    entries: Arc<Mutex<LruCache<LineCacheKey, Arc<Vec<TextLine>>>>>,
    timeout_secs: u64,
}

impl LineCache {
    pub fn new(source: Arc<dyn LineSource>) -> Self {
        Self::with_capacity(source, DEFAULT_CACHE_CAPACITY, DEFAULT_EXTRACT_TIMEOUT_SECS)
    }

    pub fn with_capacity(source: Arc<dyn LineSource>, capacity: usize, timeout_secs: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            source,
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            timeout_secs: timeout_secs.max(1),
        }
    }

    /// Lines for a document, extracting on first use
    pub async fn lines(
        &self,
        document_id: &str,
        pdf_path: &str,
    ) -> Result<Arc<Vec<TextLine>>, ExtractionError> {
        let key = LineCacheKey {
            document_id: document_id.to_string(),
            pdf_path: pdf_path.to_string(),
        };

        if let Some(lines) = self.entries.lock().get(&key) {
            return Ok(Arc::clone(lines));
        }

        let source = Arc::clone(&self.source);
        let path = pdf_path.to_string();
        let lines = self
            .run_blocking(move || source.extract_lines(&path))
            .await?;
        let lines = Arc::new(lines);

        tracing::debug!(
            document_id = %document_id,
            lines = lines.len(),
            "Cached extracted lines"
        );

        self.entries.lock().put(key, Arc::clone(&lines));

        Ok(lines)
    }

    /// Page count straight from the source (not cached)
    pub async fn page_count(&self, pdf_path: &str) -> Result<u32, ExtractionError> {
        let source = Arc::clone(&self.source);
        let path = pdf_path.to_string();
        self.run_blocking(move || source.page_count(&path)).await
    }

    /// Drop every cached entry for a document
    pub fn invalidate(&self, document_id: &str) {
        let mut entries = self.entries.lock();
        let stale: Vec<LineCacheKey> = entries
            .iter()
            .filter(|(key, _)| key.document_id == document_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ExtractionError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ExtractionError> + Send + 'static,
    {
        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            tokio::task::spawn_blocking(f),
        )
        .await;

        match result {
            Ok(join_result) => join_result.map_err(|e| ExtractionError::Join(e.to_string()))?,
            Err(_) => Err(ExtractionError::Timeout(self.timeout_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::annotations::Rect;

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl LineSource for CountingSource {
        fn page_count(&self, _pdf_path: &str) -> Result<u32, ExtractionError> {
            Ok(2)
        }

        fn extract_lines(&self, pdf_path: &str) -> Result<Vec<TextLine>, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if pdf_path == "missing.pdf" {
                return Err(ExtractionError::NotFound(pdf_path.to_string()));
            }
            Ok(vec![TextLine::new(
                0,
                "Hello world\n",
                Rect::new(0.0, 0.0, 100.0, 10.0),
            )])
        }
    }

    #[tokio::test]
    async fn test_lines_are_extracted_once_per_document() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cache = LineCache::new(source.clone());

        let first = cache.lines("doc-1", "a.pdf").await.unwrap();
        let second = cache.lines("doc-1", "a.pdf").await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate("doc-1");
        assert!(cache.is_empty());
        cache.lines("doc-1", "a.pdf").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cache = LineCache::new(source.clone());

        assert!(cache.lines("doc-1", "missing.pdf").await.is_err());
        assert!(cache.lines("doc-1", "missing.pdf").await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.page_count("missing.pdf").await.unwrap(), 2);
    }
}
