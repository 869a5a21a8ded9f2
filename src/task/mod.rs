//! Archive task execution: one archive, all of its wanted records.
//!
//! Split into focused submodules:
//! - [`context`] - Collaborators shared by every task
//! - [`attempt`] - One streaming pass with early stop and validation
//! - [`orchestration`] - Attempt loop, retry and terminal states

mod attempt;
mod context;
mod orchestration;


pub use attempt::{AttemptOutput, Batches, run_attempt};
pub use context::TaskContext;
pub use orchestration::{ArchiveOutcome, after_failure, run_archive};
