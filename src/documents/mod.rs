//! Documents
//!
//! The authoritative in-memory copy of every registered document, with
//! the per-document exclusive lock shared by manual edits and runs.

mod store;
mod types;

pub use store::{DocumentGuard, DocumentStore, SlotState};
pub use types::{
    valid_density, DocumentError, DocumentSummary, NewHighlight, NoteUpdate, ProfileUpdate,
    RegisterDocumentRequest,
};
