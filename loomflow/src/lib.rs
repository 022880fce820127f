//! loomflow: an interpreter for declarative YAML-authored state machines that
//! orchestrate LLM-backed agents.
//!
//! A machine ([`config`]) is structurally validated and its transition
//! conditions compiled once at load time, then driven to completion by
//! [`interpreter::Engine`] through `Loading -> Initial -> Executing ->
//! Transitioning -> Final | Failed`. Each state visit dispatches to an agent
//! call (through the [`strategy`]-wrapped [`executor::AgentExecutor`]
//! boundary), a child machine launch or fire-and-forget launch (through the
//! outbox protocol in [`interpreter::engine`]/`interpreter::dispatch`), or a
//! host-resolved [`hooks::MachineHooks::on_action`] call. [`expr`] is the
//! small expression language transition conditions, `input`/`output_to_context`
//! templates, and `foreach` sources are all written in.
//!
//! State survives a crash through [`persistence`] (keyed snapshots) and
//! [`result_backend`] (URI-addressed, blocking-readable results); only one
//! worker drives a given execution at a time via [`lock`]. [`workpool`] is an
//! optional tier above the single-process interpreter for distributing
//! executions across a pool of workers.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod expr;
pub mod hooks;
pub mod ids;
pub mod interpreter;
pub mod lock;
pub mod persistence;
pub mod registry;
pub mod result_backend;
pub mod snapshot;
pub mod strategy;
pub mod timestamp;
pub mod workpool;

pub use config::compile::{compile, CompiledMachine, CompileError};
pub use config::types::MachineConfig;
pub use context::Context;
pub use error::MachineError;
pub use executor::{AgentExecutor, AgentResult};
pub use hooks::MachineHooks;
pub use ids::ExecutionId;
pub use interpreter::Engine;
pub use registry::Registry;
