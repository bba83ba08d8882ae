use thiserror::Error;

/// Errors raised when input data violates schema constraints
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Field '{field}' out of range: {reason}")]
    OutOfRange { field: String, reason: String },

    #[error("{kind} weights must sum to 1.0 (±0.01), got {total:.4}")]
    WeightSum { kind: String, total: f64 },

    #[error("Event must have a non-empty session_id")]
    MissingSessionId,

    #[error("At least one affected sector required")]
    EmptySectors,

    #[error("Field '{field}' exceeds maximum length of {max} characters")]
    TooLong { field: String, max: usize },
}

/// Errors raised by the access layer
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Session {session_id} has expired")]
    SessionExpired { session_id: String },

    #[error("Session {session_id} cannot access portfolio {portfolio_id}")]
    PortfolioScope {
        session_id: String,
        portfolio_id: String,
    },

    #[error("Permission {permission} required for {action}: session {session_id} has role {role}")]
    MissingPermission {
        session_id: String,
        role: String,
        permission: String,
        action: String,
    },

    #[error("Parent session {session_id} not found or expired")]
    ParentSessionUnavailable { session_id: String },
}

/// Errors raised by the analysis state machine
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Trigger '{trigger}' is not valid from state {from}")]
    InvalidTrigger { from: String, trigger: String },

    #[error("No valid transition from {from} to {to}")]
    NoPath { from: String, to: String },
}

/// Errors raised by the audit chain
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("event_type is required in block data")]
    MissingEventType,

    #[error("Chain integrity check failed at block {index}: {reason}")]
    IntegrityFailure { index: usize, reason: String },

    #[error("Chain persistence failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chain serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by repository lookups
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Portfolio not found: {portfolio_id}")]
    PortfolioNotFound { portfolio_id: String },
}

/// Errors raised at scheduler job registration
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Heartbeat interval must be at least 1 minute, got {minutes}")]
    InvalidInterval { minutes: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_error_formatting() {
        let err = AccessError::MissingPermission {
            session_id: "sess_1".to_string(),
            role: "analyst".to_string(),
            permission: "APPROVE_TRADES".to_string(),
            action: "approve_scenario".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("APPROVE_TRADES"));
        assert!(msg.contains("analyst"));
        assert!(msg.contains("sess_1"));
    }

    #[test]
    fn test_weight_sum_formatting() {
        let err = ValidationError::WeightSum {
            kind: "Target allocation".to_string(),
            total: 1.2345,
        };
        assert!(err.to_string().contains("1.2345"));
    }
}
