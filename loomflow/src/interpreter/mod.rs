//! The control loop (§4.G, [`engine`]) plus the per-state dispatch it delegates
//! to ([`dispatch`]): agent calls, machine launches (including `foreach` and
//! `settled`/`any` fan-out, §4.H), fire-and-forget launches, and action hooks.

pub mod engine;
mod dispatch;

pub use engine::Engine;

use thiserror::Error;

/// Failures specific to the machine-launch/fire-and-forget dispatch path
/// (§4.H) that don't already have a home in another component's error enum.
/// Backend I/O failures (a blocking read timing out, a persistence write
/// failing) surface as `MachineError::ResultBackend`/`MachineError::Persistence`
/// directly via their own `#[from]` conversions — this enum only covers
/// launch-runtime-specific misconfiguration and outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("state {state:?}: foreach expression did not evaluate to an array")]
    ForeachNotIterable { state: String },
    #[error("state {state:?}: foreach cannot be combined with a machine list; use a single machine name")]
    ForeachRequiresSingleMachine { state: String },
    #[error("state {state:?}: every launched child failed")]
    AllChildrenFailed { state: String },
}
