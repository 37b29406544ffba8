//! The refresh engine: schedule advancement, change detection, and the
//! orchestrator that drives one load → fetch → merge → write pass.

mod dedup;
mod orchestrator;
mod schedule;

pub use dedup::list_digest;
pub use orchestrator::{RefreshEngine, RefreshError, RunOutcome, RunSummary, MAX_ITEMS};
pub use schedule::advance;
