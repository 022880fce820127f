//! The on-disk/on-wire shape of a machine configuration (§3, §6).
//!
//! The core deliberately does not resolve `./relative/path.yml` agent/machine
//! references from disk (that's a host/profile-resolution concern, §1 scope) —
//! it deserializes an already-assembled [`MachineConfig`] and expects the host
//! to hand it a registry of resolved agent/machine handles at run time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::ExpressionEngine;
use crate::strategy::ExecutionConfig;

/// Top-level on-disk document: `{spec: flatmachine, spec_version, data, metadata?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDocument {
    pub spec: String,
    pub spec_version: String,
    pub data: MachineConfig,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    pub states: HashMap<String, StateDef>,
    #[serde(default)]
    pub context_init: HashMap<String, String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub expression_engine: ExpressionEngine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_steps: u64,
    /// Lifecycle events that trigger a snapshot write: `machine_start`,
    /// `machine_end`, `state_enter`, `state_exit`, or any custom name a hook
    /// chooses to pass through — the interpreter only compares by string.
    pub checkpoint_on: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            checkpoint_on: vec!["machine_start".to_string(), "machine_end".to_string()],
        }
    }
}

/// `machine`/`launch` targets accept either one name or a list (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn as_slice_owned(&self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s.clone()],
            StringOrList::Many(items) => items.clone(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, StringOrList::Many(_))
    }
}

/// `on_error` is either a single redirect target, or a map from error code to
/// target with an optional `default` fallback (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnError {
    Target(String),
    ByCode(HashMap<String, String>),
}

impl OnError {
    /// Resolves the redirect target for an error whose taxonomy code is
    /// `code` (e.g. `"rate_limit"`), falling back to `default` in the map form.
    pub fn target_for(&self, code: Option<&str>) -> Option<&str> {
        match self {
            OnError::Target(t) => Some(t.as_str()),
            OnError::ByCode(map) => code
                .and_then(|c| map.get(c))
                .or_else(|| map.get("default"))
                .map(|s| s.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    Settled,
    Any,
}

impl Default for LaunchMode {
    fn default() -> Self {
        LaunchMode::Settled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default)]
    pub condition: Option<String>,
    pub to: String,
}

/// One of the mutually exclusive state shapes in §3. Untagged so machine YAML
/// doesn't need an explicit `type` discriminant for every non-initial,
/// non-final state — the field set alone disambiguates them, matching how the
/// distilled spec presents the shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateDef {
    Initial(InitialState),
    Final(FinalState),
    Agent(AgentState),
    MachineLaunch(MachineLaunchState),
    FireAndForget(FireAndForgetState),
    Action(ActionState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialState {
    #[serde(rename = "type")]
    pub type_: InitialTag,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialTag {
    Initial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalState {
    #[serde(rename = "type")]
    pub type_: FinalTag,
    #[serde(default)]
    pub output: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalTag {
    Final,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent: String,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output_to_context: HashMap<String, String>,
    #[serde(default)]
    pub on_error: Option<OnError>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineLaunchState {
    pub machine: StringOrList,
    #[serde(default)]
    pub foreach: Option<String>,
    #[serde(rename = "as", default)]
    pub as_: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub mode: LaunchMode,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output_to_context: HashMap<String, String>,
    #[serde(default)]
    pub on_error: Option<OnError>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireAndForgetState {
    pub launch: StringOrList,
    #[serde(default)]
    pub launch_input: Option<Value>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionState {
    pub action: String,
    #[serde(default)]
    pub on_error: Option<OnError>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl StateDef {
    pub fn transitions(&self) -> &[Transition] {
        match self {
            StateDef::Initial(s) => &s.transitions,
            StateDef::Final(_) => &[],
            StateDef::Agent(s) => &s.transitions,
            StateDef::MachineLaunch(s) => &s.transitions,
            StateDef::FireAndForget(s) => &s.transitions,
            StateDef::Action(s) => &s.transitions,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StateDef::Final(_))
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, StateDef::Initial(_))
    }

    /// Whether this state has an executable payload — an agent call, a
    /// machine launch, a fire-and-forget launch, or an action (invariant 6:
    /// a non-final, non-initial state needs a payload or a transition).
    pub fn has_payload(&self) -> bool {
        matches!(
            self,
            StateDef::Agent(_) | StateDef::MachineLaunch(_) | StateDef::FireAndForget(_) | StateDef::Action(_)
        )
    }
}
