//! Call negotiation: state machine, status publishing and the orchestrator task

pub mod machine;
pub mod orchestrator;
pub mod state;
pub mod status;

pub use machine::{CallMachine, Effect, Input};
pub use orchestrator::{CallHandle, CallOrchestrator, Command};
pub use state::{CallRole, CallState, CallStatus};
pub use status::StatusPublisher;
