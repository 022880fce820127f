//! Structural validation (invariants 1 and 6, §3) plus eager compilation of
//! every transition `condition` — the "compile expressions" step of the
//! *Loading* state (§4.G). Mirrors the teacher's `StateGraph::compile`
//! (`loom/src/graph/state_graph.rs`), generalized from building an executable
//! closure graph to validating a config that's already fully data.

use std::collections::HashMap;

use thiserror::Error;

use super::types::{MachineConfig, StateDef};
use crate::expr::{CompiledExpr, ExpressionError};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("machine has no initial state")]
    NoInitialState,
    #[error("machine has more than one initial state: {0:?}")]
    MultipleInitialStates(Vec<String>),
    #[error("machine has no final state")]
    NoFinalState,
    #[error("transition in state {from:?} targets unknown state {to:?}")]
    UnknownTransitionTarget { from: String, to: String },
    #[error("final state {0:?} declares transitions, but a final state must have none")]
    FinalStateHasTransitions(String),
    #[error("state {0:?} has neither a payload nor any transitions")]
    UnreachableDeadEnd(String),
    #[error("failed to compile condition on a transition in state {state:?}: {source}")]
    BadCondition { state: String, source: ExpressionError },
}

pub struct CompiledTransition {
    pub condition: Option<CompiledExpr>,
    pub to: String,
}

/// A [`MachineConfig`] that has passed structural validation, with every
/// transition condition already parsed. Everything else that's templated
/// (`input`, `output_to_context`, `foreach`, `context_init`, final `output`)
/// is still compiled lazily at the point it's evaluated — those expressions
/// run at most once per state visit, so precompiling them wouldn't save
/// meaningfully more than the transition conditions already do, which are
/// evaluated once per visit *per transition in the list*.
pub struct CompiledMachine {
    pub config: MachineConfig,
    pub transitions: HashMap<String, Vec<CompiledTransition>>,
    pub initial_state: String,
}

pub fn compile(config: MachineConfig) -> Result<CompiledMachine, CompileError> {
    let initial_states: Vec<&String> = config
        .states
        .iter()
        .filter(|(_, def)| def.is_initial())
        .map(|(name, _)| name)
        .collect();

    let initial_state = match initial_states.as_slice() {
        [] => return Err(CompileError::NoInitialState),
        [single] => (*single).clone(),
        many => return Err(CompileError::MultipleInitialStates(many.iter().map(|s| s.to_string()).collect())),
    };

    if !config.states.values().any(StateDef::is_final) {
        return Err(CompileError::NoFinalState);
    }

    let mut transitions = HashMap::new();
    for (name, def) in &config.states {
        // `FinalState`/payload-bearing variants already enforce these shapes at
        // the type level; kept here so the invariant still holds if the state
        // shapes above ever grow a variant that doesn't.
        if def.is_final() && !def.transitions().is_empty() {
            return Err(CompileError::FinalStateHasTransitions(name.clone()));
        }
        if !def.is_final() && !def.is_initial() && !def.has_payload() && def.transitions().is_empty() {
            return Err(CompileError::UnreachableDeadEnd(name.clone()));
        }

        let mut compiled = Vec::with_capacity(def.transitions().len());
        for transition in def.transitions() {
            if !config.states.contains_key(&transition.to) {
                return Err(CompileError::UnknownTransitionTarget {
                    from: name.clone(),
                    to: transition.to.clone(),
                });
            }
            let condition = match &transition.condition {
                Some(src) => Some(CompiledExpr::compile(src, config.expression_engine).map_err(|source| {
                    CompileError::BadCondition {
                        state: name.clone(),
                        source,
                    }
                })?),
                None => None,
            };
            compiled.push(CompiledTransition {
                condition,
                to: transition.to.clone(),
            });
        }
        transitions.insert(name.clone(), compiled);
    }

    Ok(CompiledMachine {
        config,
        transitions,
        initial_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ActionState, FinalState, FinalTag, InitialState, InitialTag, Settings, Transition};
    use crate::expr::ExpressionEngine;
    use std::collections::HashMap;

    fn minimal_valid_config() -> MachineConfig {
        let mut states = HashMap::new();
        states.insert(
            "init".to_string(),
            StateDef::Initial(InitialState {
                type_: InitialTag::Initial,
                transitions: vec![Transition {
                    condition: None,
                    to: "bump".to_string(),
                }],
            }),
        );
        states.insert(
            "bump".to_string(),
            StateDef::Action(ActionState {
                action: "increment".to_string(),
                on_error: None,
                transitions: vec![Transition {
                    condition: None,
                    to: "done".to_string(),
                }],
            }),
        );
        states.insert(
            "done".to_string(),
            StateDef::Final(FinalState {
                type_: FinalTag::Final,
                output: HashMap::new(),
            }),
        );
        MachineConfig {
            name: "counter".to_string(),
            states,
            context_init: HashMap::new(),
            settings: Settings::default(),
            expression_engine: ExpressionEngine::Simple,
        }
    }

    /// **Scenario**: a well-formed linear machine compiles successfully.
    #[test]
    fn compiles_minimal_valid_machine() {
        let compiled = compile(minimal_valid_config()).unwrap();
        assert_eq!(compiled.initial_state, "init");
        assert_eq!(compiled.transitions.len(), 3);
    }

    /// **Scenario**: no initial state is rejected at load time.
    #[test]
    fn rejects_missing_initial_state() {
        let mut config = minimal_valid_config();
        config.states.remove("init");
        let err = compile(config).unwrap_err();
        assert!(matches!(err, CompileError::NoInitialState));
    }

    /// **Scenario**: a transition to an unknown state is rejected.
    #[test]
    fn rejects_unknown_transition_target() {
        let mut config = minimal_valid_config();
        if let Some(StateDef::Action(action)) = config.states.get_mut("bump") {
            action.transitions[0].to = "nowhere".to_string();
        }
        let err = compile(config).unwrap_err();
        assert!(matches!(err, CompileError::UnknownTransitionTarget { .. }));
    }

}
