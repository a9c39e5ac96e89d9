//! Session stage machine for pose-match levels.
//!
//! Pure and synchronous: controllers return [`Effect`]s instead of touching
//! telemetry or storage, and the host drains them after every call.
//!
//! - [`node`] -- stage node definitions and shape checks.
//! - [`controllers`] -- per-stage-type controllers and their lookup.
//! - [`machine`] -- the [`StageMachine`] driving them.
//! - [`matcher`] -- pose similarity scoring used by the pose-match stage.

pub mod controllers;
pub mod error;
pub mod machine;
pub mod matcher;
pub mod node;
pub mod session;

pub use error::StageError;
pub use machine::{AdvanceOutcome, StageMachine};
pub use node::{StageNode, StateType};
pub use session::{Command, Effect, NodeState, StageSession, TickInfo};
