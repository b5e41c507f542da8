//! Run registry
//!
//! Tracks auto-highlight runs by id, enforces one active run per document
//! and drops finished runs once they have been fetched or have aged out.

mod manager;
mod types;

pub use manager::RunRegistry;
pub use types::{
    parse_pages, EventSlice, RegistryError, RunHighlights, StartRunRequest, MAX_PAGE_NUMBER,
};
