//! In-memory document store
//!
//! Each document sits behind its own async mutex. That lock is the single
//! serialization point for everything that mutates a document: manual
//! edits, bulk clears, and highlights appended by a run. Durable saves are
//! requested after every mutation; a second per-document lock keeps saves
//! in snapshot order without holding the document lock during the write.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::types::{
    valid_density, DocumentError, DocumentSummary, NewHighlight, ProfileUpdate,
};
use crate::annotations::{Document, DocumentPersistence, Highlight, StoreError};

/// Mutable state of one document
#[derive(Debug)]
pub struct SlotState {
    pub document: Document,
    /// Id of the run currently pending, running or cancelling
    pub active_run: Option<String>,
    removed: bool,
}

struct DocumentSlot {
    state: Arc<Mutex<SlotState>>,
    save_lock: Arc<Mutex<()>>,
}

/// Exclusive access to one document
pub struct DocumentGuard {
    state: OwnedMutexGuard<SlotState>,
    save_lock: Arc<Mutex<()>>,
}

impl Deref for DocumentGuard {
    type Target = SlotState;

    fn deref(&self) -> &SlotState {
        &self.state
    }
}

impl DerefMut for DocumentGuard {
    fn deref_mut(&mut self) -> &mut SlotState {
        &mut self.state
    }
}

/// Shared document store
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<DocumentStoreInner>,
}

struct DocumentStoreInner {
    slots: RwLock<HashMap<String, Arc<DocumentSlot>>>,
    persistence: Arc<dyn DocumentPersistence>,
}

impl DocumentStore {
    pub fn new(persistence: Arc<dyn DocumentPersistence>) -> Self {
        Self {
            inner: Arc::new(DocumentStoreInner {
                slots: RwLock::new(HashMap::new()),
                persistence,
            }),
        }
    }

    /// Create a store holding every persisted document
    pub async fn load(persistence: Arc<dyn DocumentPersistence>) -> Result<Self, StoreError> {
        let documents = persistence.load_all().await?;
        let store = Self::new(persistence);

        {
            let mut slots = store.inner.slots.write().await;
            for document in documents {
                slots.insert(document.id.clone(), Arc::new(Self::slot(document)));
            }
            tracing::info!(documents = slots.len(), "Loaded documents");
        }

        Ok(store)
    }

    fn slot(document: Document) -> DocumentSlot {
        DocumentSlot {
            state: Arc::new(Mutex::new(SlotState {
                document,
                active_run: None,
                removed: false,
            })),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Acquire the exclusive lock of a document
    pub async fn lock(&self, document_id: &str) -> Result<DocumentGuard, DocumentError> {
        let slot = {
            let slots = self.inner.slots.read().await;
            slots
                .get(document_id)
                .cloned()
                .ok_or_else(|| DocumentError::NotFound(document_id.to_string()))?
        };

        let state = Arc::clone(&slot.state).lock_owned().await;
        if state.removed {
            return Err(DocumentError::NotFound(document_id.to_string()));
        }

        Ok(DocumentGuard {
            state,
            save_lock: Arc::clone(&slot.save_lock),
        })
    }

    /// Release a document lock and save the document as it was
    ///
    /// Save failures are logged, never returned.
    pub async fn commit(&self, guard: DocumentGuard) {
        let DocumentGuard { state, save_lock } = guard;
        let snapshot = state.document.clone();
        let _save = save_lock.lock_owned().await;
        drop(state);

        if let Err(e) = self.inner.persistence.save(&snapshot).await {
            tracing::warn!(document_id = %snapshot.id, "Failed to save document: {}", e);
        }
    }

    /// Add a new document and save it
    pub async fn insert(&self, document: Document) -> Document {
        let id = document.id.clone();
        {
            let mut slots = self.inner.slots.write().await;
            slots.insert(id.clone(), Arc::new(Self::slot(document.clone())));
        }

        if let Err(e) = self.inner.persistence.save(&document).await {
            tracing::warn!(document_id = %id, "Failed to save document: {}", e);
        }

        tracing::info!(document_id = %id, filename = %document.filename, "Registered document");
        document
    }

    pub async fn get(&self, document_id: &str) -> Result<Document, DocumentError> {
        let guard = self.lock(document_id).await?;
        Ok(guard.document.clone())
    }

    pub async fn contains(&self, document_id: &str) -> bool {
        self.inner.slots.read().await.contains_key(document_id)
    }

    /// Summaries of every document, oldest first
    pub async fn list(&self) -> Vec<DocumentSummary> {
        let slots: Vec<Arc<DocumentSlot>> = self.inner.slots.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            let state = slot.state.lock().await;
            summaries.push((
                state.document.created_at,
                DocumentSummary::new(&state.document, state.active_run.clone()),
            ));
        }
        summaries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        summaries.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Apply a profile, goal or density change
    pub async fn update_profile(
        &self,
        document_id: &str,
        update: ProfileUpdate,
    ) -> Result<Document, DocumentError> {
        if let Some(density) = update.density_target {
            if !valid_density(density) {
                return Err(DocumentError::InvalidDensity(density));
            }
        }

        let mut guard = self.lock(document_id).await?;
        let document = &mut guard.document;
        if let Some(profile) = update.global_profile {
            document.global_profile = Some(profile);
        }
        if let Some(goal) = update.document_goal {
            document.document_goal = Some(goal);
        }
        if let Some(density) = update.density_target {
            document.density_target = density;
        }
        document.version += 1;
        document.touch();

        let updated = document.clone();
        self.commit(guard).await;
        Ok(updated)
    }

    /// Add a manual highlight
    pub async fn add_highlight(
        &self,
        document_id: &str,
        new: NewHighlight,
    ) -> Result<Highlight, DocumentError> {
        if new.rects.is_empty() {
            return Err(DocumentError::InvalidHighlight(
                "at least one rectangle is required".to_string(),
            ));
        }
        if new.rects.iter().any(|r| !r.is_finite()) {
            return Err(DocumentError::InvalidHighlight(
                "rectangle coordinates must be finite".to_string(),
            ));
        }

        let mut guard = self.lock(document_id).await?;
        if let Some(page_count) = guard.document.page_count {
            if new.page_index >= page_count {
                return Err(DocumentError::InvalidHighlight(format!(
                    "page {} is out of range (document has {} pages)",
                    new.page_index, page_count
                )));
            }
        }

        let highlight = Highlight::manual(new.page_index, new.rects, new.note);
        guard.document.add_highlight(highlight.clone());
        self.commit(guard).await;

        Ok(highlight)
    }

    /// Replace the note of a manual highlight
    pub async fn update_note(
        &self,
        document_id: &str,
        highlight_id: &str,
        note: Option<String>,
    ) -> Result<Highlight, DocumentError> {
        let mut guard = self.lock(document_id).await?;

        let highlight = guard
            .document
            .highlights
            .iter_mut()
            .find(|h| h.id == highlight_id)
            .ok_or_else(|| DocumentError::HighlightNotFound(highlight_id.to_string()))?;
        if highlight.is_auto_generated() {
            return Err(DocumentError::NotEditable(highlight_id.to_string()));
        }

        highlight.note = note;
        highlight.updated_at = chrono::Utc::now();
        let updated = highlight.clone();
        guard.document.touch();
        self.commit(guard).await;

        Ok(updated)
    }

    /// Remove every highlight, including ones an active run emitted
    pub async fn clear_highlights(&self, document_id: &str) -> Result<usize, DocumentError> {
        let mut guard = self.lock(document_id).await?;
        let removed = guard.document.clear_highlights();
        if guard.active_run.is_some() {
            tracing::debug!(
                document_id = %document_id,
                "Clearing highlights during an active run"
            );
        }
        self.commit(guard).await;

        tracing::info!(document_id = %document_id, removed, "Cleared highlights");
        Ok(removed)
    }

    /// Remove a document that has no active run
    ///
    /// Waits for any save still in flight so the delete is the last write.
    pub async fn remove(&self, document_id: &str) -> Result<(), DocumentError> {
        let slot = {
            let mut slots = self.inner.slots.write().await;
            let slot = slots
                .get(document_id)
                .cloned()
                .ok_or_else(|| DocumentError::NotFound(document_id.to_string()))?;
            let mut state = slot.state.lock().await;
            if state.active_run.is_some() {
                return Err(DocumentError::RunActive(document_id.to_string()));
            }
            state.removed = true;
            drop(state);
            slots.remove(document_id);
            slot
        };

        let _save = Arc::clone(&slot.save_lock).lock_owned().await;
        if let Err(e) = self.inner.persistence.delete(document_id).await {
            tracing::warn!(document_id = %document_id, "Failed to delete document: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::annotations::{Rect, SqliteDocumentStore};

    /// Saves take a while to land
    struct SlowSaves {
        db: SqliteDocumentStore,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentPersistence for SlowSaves {
        async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
            self.db.load_all().await
        }

        async fn save(&self, document: &Document) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.db.save(document).await
        }

        async fn delete(&self, document_id: &str) -> Result<(), StoreError> {
            self.db.delete(document_id).await
        }
    }

    async fn store_with_document() -> (DocumentStore, SqliteDocumentStore, String) {
        let db = SqliteDocumentStore::in_memory().await.unwrap();
        let store = DocumentStore::new(Arc::new(db.clone()));
        let mut document = Document::new("paper.pdf", "/data/paper.pdf");
        document.page_count = Some(2);
        let id = store.insert(document).await.id;
        (store, db, id)
    }

    fn new_highlight(page_index: u32) -> NewHighlight {
        NewHighlight {
            page_index,
            rects: vec![Rect::new(10.0, 10.0, 100.0, 20.0)],
            note: Some("note".to_string()),
        }
    }

    #[tokio::test]
    async fn test_add_highlight_validates_and_persists() {
        let (store, db, id) = store_with_document().await;

        let err = store
            .add_highlight(&id, NewHighlight { rects: vec![], ..new_highlight(0) })
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidHighlight(_)));

        let err = store.add_highlight(&id, new_highlight(2)).await.unwrap_err();
        assert!(matches!(err, DocumentError::InvalidHighlight(_)));

        store.add_highlight(&id, new_highlight(1)).await.unwrap();
        assert_eq!(db.count_highlights(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_only_manual_notes_are_editable() {
        let (store, _db, id) = store_with_document().await;
        let manual = store.add_highlight(&id, new_highlight(0)).await.unwrap();

        let auto_id = {
            let mut guard = store.lock(&id).await.unwrap();
            let auto = Highlight::auto_generated(
                "run-1",
                0,
                vec![Rect::new(0.0, 0.0, 1.0, 1.0)],
                0.9,
                None,
                "text",
            );
            let auto_id = auto.id.clone();
            guard.document.add_highlight(auto);
            store.commit(guard).await;
            auto_id
        };

        let edited = store
            .update_note(&id, &manual.id, Some("edited".to_string()))
            .await
            .unwrap();
        assert_eq!(edited.note.as_deref(), Some("edited"));

        let err = store.update_note(&id, &auto_id, None).await.unwrap_err();
        assert!(matches!(err, DocumentError::NotEditable(_)));

        let err = store.update_note(&id, "missing", None).await.unwrap_err();
        assert!(matches!(err, DocumentError::HighlightNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_profile_and_reload() {
        let (store, db, id) = store_with_document().await;

        let err = store
            .update_profile(&id, ProfileUpdate { density_target: Some(1.5), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDensity(_)));

        let updated = store
            .update_profile(
                &id,
                ProfileUpdate {
                    global_profile: Some("Investor".to_string()),
                    document_goal: Some("GPU growth".to_string()),
                    density_target: Some(0.2),
                },
            )
            .await
            .unwrap();
        assert!(updated.has_profile());
        assert_eq!(updated.version, 2);

        let reloaded = DocumentStore::load(Arc::new(db)).await.unwrap();
        let document = reloaded.get(&id).await.unwrap();
        assert_eq!(document.density_target, 0.2);
        assert_eq!(document.document_goal.as_deref(), Some("GPU growth"));
    }

    #[tokio::test]
    async fn test_clear_and_remove() {
        let (store, db, id) = store_with_document().await;
        store.add_highlight(&id, new_highlight(0)).await.unwrap();
        store.add_highlight(&id, new_highlight(1)).await.unwrap();

        assert_eq!(store.clear_highlights(&id).await.unwrap(), 2);
        assert_eq!(store.list().await[0].highlight_count, 0);

        {
            let mut guard = store.lock(&id).await.unwrap();
            guard.active_run = Some("run-1".to_string());
        }
        assert!(matches!(store.remove(&id).await, Err(DocumentError::RunActive(_))));

        store.lock(&id).await.unwrap().active_run = None;
        store.remove(&id).await.unwrap();
        assert!(!store.contains(&id).await);
        assert!(db.load_all().await.unwrap().is_empty());
        assert!(matches!(store.get(&id).await, Err(DocumentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_waits_for_pending_save() {
        let db = SqliteDocumentStore::in_memory().await.unwrap();
        let store = DocumentStore::new(Arc::new(SlowSaves {
            db: db.clone(),
            delay: Duration::from_millis(100),
        }));
        let mut document = Document::new("paper.pdf", "/data/paper.pdf");
        document.page_count = Some(2);
        let id = store.insert(document).await.id;

        let pending = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.add_highlight(&id, new_highlight(0)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.remove(&id).await.unwrap();
        pending.await.unwrap().unwrap();

        assert!(db.load_all().await.unwrap().is_empty());
        assert_eq!(db.count_highlights(&id).await.unwrap(), 0);
        assert!(DocumentStore::load(Arc::new(db)).await.unwrap().list().await.is_empty());
    }
}
