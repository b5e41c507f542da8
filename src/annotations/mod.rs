//! Annotation module
//!
//! Highlights, the documents that own them, and their SQLite persistence.
//!
//! - Highlights carry an origin tag (manual or auto-generated) and, for
//!   auto-generated ones, the relevance score and producing run.
//! - A document owns its highlight set, the reader profile and goal, and the
//!   density target used by auto-highlight runs.

mod schema;
mod store;
mod types;

pub use schema::initialize_schema;
pub use store::{DocumentPersistence, SqliteDocumentStore, StoreError};
pub use types::{
    Document, Highlight, HighlightOrigin, Rect, AUTO_COLOR, DEFAULT_DENSITY_TARGET, MANUAL_COLOR,
};
