use crate::domain::errors::TransitionError;
use crate::domain::types::SystemState;
use crate::infrastructure::audit::{BlockData, SharedChain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info};

/// Triggers that drive the analysis state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    DetectEvent,
    StartAnalysis,
    DetectConflict,
    NoConflict,
    ResolveConflict,
    Approve,
    Reject,
    Execute,
    Complete,
    Abort,
    Reset,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::DetectEvent => "detect_event",
            Trigger::StartAnalysis => "start_analysis",
            Trigger::DetectConflict => "detect_conflict",
            Trigger::NoConflict => "no_conflict",
            Trigger::ResolveConflict => "resolve_conflict",
            Trigger::Approve => "approve",
            Trigger::Reject => "reject",
            Trigger::Execute => "execute",
            Trigger::Complete => "complete",
            Trigger::Abort => "abort",
            Trigger::Reset => "reset",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed transition table: (source, trigger, destination)
const TRANSITIONS: &[(SystemState, Trigger, SystemState)] = &[
    // Normal flow
    (SystemState::Monitor, Trigger::DetectEvent, SystemState::Detect),
    (SystemState::Detect, Trigger::StartAnalysis, SystemState::Analyze),
    (SystemState::Analyze, Trigger::DetectConflict, SystemState::ConflictResolution),
    (SystemState::Analyze, Trigger::NoConflict, SystemState::Recommend),
    (SystemState::ConflictResolution, Trigger::ResolveConflict, SystemState::Recommend),
    (SystemState::Recommend, Trigger::Approve, SystemState::Approved),
    (SystemState::Approved, Trigger::Execute, SystemState::Execute),
    (SystemState::Execute, Trigger::Complete, SystemState::Monitor),
    // Reset / abort paths
    (SystemState::Detect, Trigger::Reset, SystemState::Monitor),
    (SystemState::Analyze, Trigger::Reset, SystemState::Monitor),
    (SystemState::ConflictResolution, Trigger::Reset, SystemState::Monitor),
    (SystemState::Recommend, Trigger::Reject, SystemState::Monitor),
    (SystemState::Approved, Trigger::Abort, SystemState::Monitor),
    (SystemState::Execute, Trigger::Abort, SystemState::Monitor),
];

/// Record of a completed transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: Option<SystemState>,
    pub to_state: SystemState,
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub metadata: Map<String, Value>,
    pub merkle_hash: Option<String>,
}

/// Per-session analysis state machine with audit-logged transitions.
///
/// Invalid triggers fail without mutating state or writing a block; valid
/// transitions log a `state_transition` block before the state changes.
pub struct AnalysisStateMachine {
    session_id: String,
    state: SystemState,
    chain: Option<SharedChain>,
    history: Vec<StateTransition>,
}

impl AnalysisStateMachine {
    pub fn new(session_id: impl Into<String>, chain: Option<SharedChain>) -> Self {
        Self::with_initial_state(session_id, chain, SystemState::Monitor)
    }

    pub fn with_initial_state(
        session_id: impl Into<String>,
        chain: Option<SharedChain>,
        initial_state: SystemState,
    ) -> Self {
        let machine = Self {
            session_id: session_id.into(),
            state: initial_state,
            chain,
            history: Vec::new(),
        };
        machine.log_transition(None, initial_state, "initialize", &Map::new());
        machine
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Fire a trigger. Returns the new state, or an error leaving the
    /// machine untouched.
    pub fn fire(
        &mut self,
        trigger: Trigger,
        metadata: Map<String, Value>,
    ) -> Result<SystemState, TransitionError> {
        let Some(destination) = destination_for(self.state, trigger) else {
            return Err(TransitionError::InvalidTrigger {
                from: self.state.to_string(),
                trigger: trigger.to_string(),
            });
        };

        let from = self.state;
        let hash = self.log_transition(Some(from), destination, trigger.as_str(), &metadata);
        self.history.push(StateTransition {
            from_state: Some(from),
            to_state: destination,
            trigger: trigger.to_string(),
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            metadata,
            merkle_hash: hash,
        });
        self.state = destination;

        info!(
            "StateMachine [{}]: {} → {} (trigger: {})",
            self.session_id, from, destination, trigger
        );
        Ok(destination)
    }

    /// Transition to a target state by resolving the trigger for it.
    pub fn transition_to(
        &mut self,
        to_state: SystemState,
        metadata: Map<String, Value>,
    ) -> Result<SystemState, TransitionError> {
        let Some(trigger) = trigger_for(self.state, to_state) else {
            return Err(TransitionError::NoPath {
                from: self.state.to_string(),
                to: to_state.to_string(),
            });
        };
        self.fire(trigger, metadata)
    }

    pub fn can_transition(&self, to_state: SystemState) -> bool {
        trigger_for(self.state, to_state).is_some()
    }

    pub fn available_triggers(&self) -> Vec<Trigger> {
        TRANSITIONS
            .iter()
            .filter(|(from, _, _)| *from == self.state)
            .map(|(_, trigger, _)| *trigger)
            .collect()
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.last()
    }

    pub fn is_idle(&self) -> bool {
        self.state == SystemState::Monitor
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(
            self.state,
            SystemState::Detect | SystemState::Analyze | SystemState::ConflictResolution
        )
    }

    pub fn is_pending_approval(&self) -> bool {
        self.state == SystemState::Recommend
    }

    pub fn is_executing(&self) -> bool {
        matches!(self.state, SystemState::Approved | SystemState::Execute)
    }

    /// Seconds spent since the last recorded transition
    pub fn time_in_state(&self, now: DateTime<Utc>) -> f64 {
        match self.history.last() {
            Some(last) => (now - last.timestamp).num_milliseconds() as f64 / 1_000.0,
            None => 0.0,
        }
    }

    /// Return to MONITOR using whichever of reset/reject/abort applies.
    /// A no-op when already monitoring.
    pub fn reset_to_monitor(&mut self, reason: &str) -> Result<SystemState, TransitionError> {
        if self.state == SystemState::Monitor {
            return Ok(self.state);
        }
        let trigger = match self.state {
            SystemState::Detect | SystemState::Analyze | SystemState::ConflictResolution => {
                Trigger::Reset
            }
            SystemState::Recommend => Trigger::Reject,
            SystemState::Approved | SystemState::Execute => Trigger::Abort,
            SystemState::Monitor => unreachable!(),
        };
        let mut metadata = Map::new();
        metadata.insert("reason".to_string(), Value::String(reason.to_string()));
        self.fire(trigger, metadata)
    }

    fn log_transition(
        &self,
        from: Option<SystemState>,
        to: SystemState,
        trigger: &str,
        metadata: &Map<String, Value>,
    ) -> Option<String> {
        let chain = self.chain.as_ref()?;
        let data = BlockData::new("state_transition")
            .session(&self.session_id)
            .actor("state_machine")
            .action(trigger)
            .field(
                "from_state",
                from.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null),
            )
            .field("to_state", to.to_string())
            .field("trigger", trigger)
            .field("metadata", Value::Object(metadata.clone()));

        match chain.append(data) {
            Ok(hash) => Some(hash),
            Err(e) => {
                debug!("StateMachine [{}]: audit append failed: {}", self.session_id, e);
                None
            }
        }
    }
}

fn destination_for(from: SystemState, trigger: Trigger) -> Option<SystemState> {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == trigger)
        .map(|(_, _, dest)| *dest)
}

fn trigger_for(from: SystemState, to: SystemState) -> Option<Trigger> {
    TRANSITIONS
        .iter()
        .find(|(f, _, d)| *f == from && *d == to)
        .map(|(_, trigger, _)| *trigger)
}
