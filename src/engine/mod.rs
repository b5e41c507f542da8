//! Auto-highlight run engine
//!
//! Orchestrates chunking, batched scoring and selection for one document,
//! owns the run state machine and streams events over a bounded channel.
//!
//! ```text
//! pending -> running -> completed | cancelled | failed
//!            running -> cancelling -> cancelled
//! pending -> cancelled
//! ```

mod handle;
mod report;
mod run;
mod types;

pub use handle::{event_channel, EventSink, RunHandle};
pub use report::{ReportWriter, RunReport};
pub use run::RunEngine;
pub use types::{
    BatchDiagnostic, RunEvent, RunOptions, RunRecord, RunSnapshot, RunState, SequencedEvent,
};
