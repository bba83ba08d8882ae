use crate::domain::errors::ValidationError;
use crate::domain::types::{AgentKind, CronJobType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const DEFAULT_PRIORITY: u8 = 5;
pub const MAX_PRIORITY: u8 = 10;

const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_INSTRUCTIONS_LEN: usize = 1000;

/// Discriminant for the event payload variants, used as the handler
/// registration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MarketEvent,
    Heartbeat,
    Cron,
    Webhook,
    AgentMessage,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MarketEvent => "market_event",
            EventType::Heartbeat => "heartbeat",
            EventType::Cron => "cron",
            EventType::Webhook => "webhook",
            EventType::AgentMessage => "agent_message",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event payloads accepted by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    MarketEvent {
        affected_sectors: Vec<String>,
        magnitude: f64,
        #[serde(default)]
        affected_tickers: Vec<String>,
        description: String,
    },
    Heartbeat {
        portfolio_ids: Vec<String>,
    },
    Cron {
        job_type: CronJobType,
        instructions: String,
    },
    Webhook {
        source: String,
        payload: Map<String, Value>,
    },
    AgentMessage {
        from_agent: AgentKind,
        to_agent: AgentKind,
        context: Map<String, Value>,
    },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::MarketEvent { .. } => EventType::MarketEvent,
            EventKind::Heartbeat { .. } => EventType::Heartbeat,
            EventKind::Cron { .. } => EventType::Cron,
            EventKind::Webhook { .. } => EventType::Webhook,
            EventKind::AgentMessage { .. } => EventType::AgentMessage,
        }
    }

    /// Wire tag for this event kind, matching the serde representation
    pub fn type_tag(&self) -> &'static str {
        self.event_type().as_str()
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            EventKind::MarketEvent { .. } => "mkt",
            EventKind::Heartbeat { .. } => "hb",
            EventKind::Cron { .. } => "cron",
            EventKind::Webhook { .. } => "wh",
            EventKind::AgentMessage { .. } => "agt",
        }
    }
}

/// Single input flowing through the gateway: shared metadata plus a typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub priority: u8,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl InputEvent {
    pub fn new(session_id: impl Into<String>, priority: u8, kind: EventKind) -> Self {
        let id = format!("{}_{}", kind.id_prefix(), short_hex(12));
        Self {
            event_id: id,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            priority,
            kind,
        }
    }

    pub fn market_event(
        session_id: impl Into<String>,
        affected_sectors: Vec<String>,
        magnitude: f64,
        description: impl Into<String>,
        affected_tickers: Vec<String>,
    ) -> Self {
        Self::new(
            session_id,
            8,
            EventKind::MarketEvent {
                affected_sectors,
                magnitude,
                affected_tickers,
                description: description.into(),
            },
        )
    }

    pub fn heartbeat(session_id: impl Into<String>, portfolio_ids: Vec<String>) -> Self {
        Self::new(session_id, 3, EventKind::Heartbeat { portfolio_ids })
    }

    pub fn cron_job(
        session_id: impl Into<String>,
        job_type: CronJobType,
        instructions: impl Into<String>,
    ) -> Self {
        Self::new(
            session_id,
            4,
            EventKind::Cron {
                job_type,
                instructions: instructions.into(),
            },
        )
    }

    pub fn webhook(
        session_id: impl Into<String>,
        source: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self::new(
            session_id,
            6,
            EventKind::Webhook {
                source: source.into(),
                payload,
            },
        )
    }

    pub fn agent_message(
        session_id: impl Into<String>,
        from_agent: AgentKind,
        to_agent: AgentKind,
        context: Map<String, Value>,
    ) -> Self {
        Self::new(
            session_id,
            DEFAULT_PRIORITY,
            EventKind::AgentMessage {
                from_agent,
                to_agent,
                context,
            },
        )
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    /// Validate schema constraints at the gateway boundary.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.session_id.is_empty() {
            return Err(ValidationError::MissingSessionId);
        }
        if self.priority > MAX_PRIORITY {
            return Err(ValidationError::OutOfRange {
                field: "priority".to_string(),
                reason: format!("must be in 0..=10, got {}", self.priority),
            });
        }

        match &self.kind {
            EventKind::MarketEvent {
                affected_sectors,
                magnitude,
                description,
                ..
            } => {
                if affected_sectors.is_empty() {
                    return Err(ValidationError::EmptySectors);
                }
                if !(-1.0..=1.0).contains(magnitude) {
                    return Err(ValidationError::OutOfRange {
                        field: "magnitude".to_string(),
                        reason: format!("must be in [-1,1], got {magnitude}"),
                    });
                }
                if description.len() > MAX_DESCRIPTION_LEN {
                    return Err(ValidationError::TooLong {
                        field: "description".to_string(),
                        max: MAX_DESCRIPTION_LEN,
                    });
                }
            }
            EventKind::Cron { instructions, .. } => {
                if instructions.len() > MAX_INSTRUCTIONS_LEN {
                    return Err(ValidationError::TooLong {
                        field: "instructions".to_string(),
                        max: MAX_INSTRUCTIONS_LEN,
                    });
                }
            }
            EventKind::Heartbeat { .. }
            | EventKind::Webhook { .. }
            | EventKind::AgentMessage { .. } => {}
        }

        Ok(())
    }
}

/// Short random hex string for server-assigned identifiers
pub fn short_hex(len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..len.min(hex.len())].to_string()
}
