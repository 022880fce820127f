//! The host-supplied registry of resolved agent executors and launchable
//! child machines.
//!
//! §1 scope and §3's "[ADDED] Concrete representation decisions" are explicit
//! that the core does not itself resolve `./relative/path.yml` references —
//! it is handed an already-assembled [`MachineConfig`] plus a registry of
//! resolved handles. The Design Notes' "arbitrary file-referenced factories"
//! note says the same thing generically: specify as an injected registry
//! passed by the host, not reflective loading.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::compile::CompiledMachine;
use crate::executor::AgentExecutor;

#[derive(Default)]
pub struct Registry {
    agents: HashMap<String, Arc<dyn AgentExecutor>>,
    machines: HashMap<String, Arc<CompiledMachine>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, name: impl Into<String>, executor: Arc<dyn AgentExecutor>) -> Self {
        self.agents.insert(name.into(), executor);
        self
    }

    pub fn with_machine(mut self, name: impl Into<String>, machine: Arc<CompiledMachine>) -> Self {
        self.machines.insert(name.into(), machine);
        self
    }

    pub fn agent(&self, name: &str) -> Option<Arc<dyn AgentExecutor>> {
        self.agents.get(name).cloned()
    }

    pub fn machine(&self, name: &str) -> Option<Arc<CompiledMachine>> {
        self.machines.get(name).cloned()
    }
}
