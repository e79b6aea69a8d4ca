//! The external generation worker.
//!
//! The worker is a separate process that authors chapter text. The controller
//! drives it over a line protocol:
//!
//! - controller to worker (stdin): `generate <id>` to start a chapter, then a
//!   single decision token after each `[REVIEW]`
//! - worker to controller (stdout): content lines, with `[REVIEW]` ending a
//!   checkpointed draft and `[DONE]` ending any other chapter
//!
//! Closing stdin tells the worker the run is over.

mod channel;
mod protocol;

pub use channel::{
    InteractionMode, ProcessSpawner, WorkerChannel, WorkerInvocation, WorkerLink, WorkerSpawner,
};
pub use protocol::{
    DONE_MARKER, LineFramer, REVIEW_MARKER, WorkerCommand, WorkerEvent, classify_line,
};
