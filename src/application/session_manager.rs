use crate::domain::access::{Permission, Role, Session, SessionType};
use crate::domain::errors::AccessError;
use crate::domain::events::short_hex;
use crate::domain::types::AgentKind;
use crate::infrastructure::audit::{BlockData, SharedChain};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 3_600;
const DEFAULT_MAX_TOOL_CALLS: u32 = 100;

/// Counters collected over a session's life, logged at termination
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub tool_calls: u64,
    pub permission_checks: u64,
    pub permission_denials: u64,
    pub portfolio_accesses: u64,
}

/// Session lifecycle management and the permission gate.
///
/// Creation, termination, expiry and every access decision are recorded on
/// the audit chain.
pub struct SessionManager {
    chain: Option<SharedChain>,
    default_timeout_secs: u64,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    metrics: Arc<Mutex<HashMap<String, (SessionMetrics, DateTime<Utc>)>>>,
}

impl SessionManager {
    pub fn new(chain: Option<SharedChain>) -> Self {
        Self::with_timeout(chain, DEFAULT_SESSION_TIMEOUT_SECS)
    }

    pub fn with_timeout(chain: Option<SharedChain>, default_timeout_secs: u64) -> Self {
        Self {
            chain,
            default_timeout_secs,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new session with explicit boundaries
    #[allow(clippy::too_many_arguments)]
    pub async fn create_session(
        &self,
        session_id: impl Into<String>,
        session_type: SessionType,
        role: Role,
        user_id: Option<String>,
        allowed_portfolios: Option<Vec<String>>,
        timeout_secs: Option<u64>,
    ) -> Session {
        let now = Utc::now();
        let timeout = timeout_secs.unwrap_or(self.default_timeout_secs);
        let session = Session {
            session_id: session_id.into(),
            session_type,
            role,
            user_id,
            allowed_portfolios,
            sandbox_mode: session_type.requires_sandbox(),
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            timeout_seconds: timeout,
            created_at: now,
            expires_at: Some(now + Duration::seconds(timeout as i64)),
        };

        self.sessions
            .lock()
            .await
            .insert(session.session_id.clone(), session.clone());
        self.metrics
            .lock()
            .await
            .insert(session.session_id.clone(), (SessionMetrics::default(), now));

        self.log(
            BlockData::new("session_created")
                .session(&session.session_id)
                .actor(session.role.as_str())
                .action("create_session")
                .field("session_type", session.session_type.as_str())
                .field("role", session.role.as_str())
                .field("user_id", session.user_id.clone().unwrap_or_default())
                .field("sandbox_mode", session.sandbox_mode),
        );

        info!(
            "SessionManager: registered {} (role: {}, sandbox: {})",
            session.session_id, session.role, session.sandbox_mode
        );
        session
    }

    /// Trusted advisor session with unrestricted portfolio scope
    pub async fn create_advisor_session(
        &self,
        session_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Session {
        self.create_session(
            session_id,
            SessionType::AdvisorMain,
            Role::HumanAdvisor,
            user_id,
            None,
            None,
        )
        .await
    }

    /// Sandboxed analyst session scoped to the given portfolios
    pub async fn create_analyst_session(
        &self,
        session_id: impl Into<String>,
        allowed_portfolios: Vec<String>,
        user_id: Option<String>,
    ) -> Session {
        self.create_session(
            session_id,
            SessionType::Analyst,
            Role::Analyst,
            user_id,
            Some(allowed_portfolios),
            None,
        )
        .await
    }

    /// Agent session nested under a parent; inherits portfolio scope and expiry.
    pub async fn create_agent_session(
        &self,
        agent: AgentKind,
        parent_session_id: &str,
    ) -> Result<Session, AccessError> {
        let parent = self.session(parent_session_id).await.ok_or_else(|| {
            AccessError::ParentSessionUnavailable {
                session_id: parent_session_id.to_string(),
            }
        })?;

        let role = match agent {
            AgentKind::Drift => Role::DriftAgent,
            AgentKind::Tax => Role::TaxAgent,
            AgentKind::Coordinator => Role::Coordinator,
        };
        let now = Utc::now();
        let session = Session {
            session_id: format!("{}_{}", agent, short_hex(8)),
            session_type: SessionType::System,
            role,
            user_id: None,
            allowed_portfolios: parent.allowed_portfolios.clone(),
            sandbox_mode: false,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            timeout_seconds: parent.timeout_seconds,
            created_at: now,
            // Agent sessions do not outlive their parent
            expires_at: parent.expires_at,
        };

        self.sessions
            .lock()
            .await
            .insert(session.session_id.clone(), session.clone());
        self.metrics
            .lock()
            .await
            .insert(session.session_id.clone(), (SessionMetrics::default(), now));

        self.log(
            BlockData::new("session_created")
                .session(&session.session_id)
                .actor(session.role.as_str())
                .action("create_agent_session")
                .field("parent_session_id", parent_session_id)
                .field("role", session.role.as_str()),
        );

        Ok(session)
    }

    /// Look up a live session. Expired sessions are terminated and None is
    /// returned.
    pub async fn session(&self, session_id: &str) -> Option<Session> {
        let session = self.sessions.lock().await.get(session_id).cloned()?;
        if session.is_expired(Utc::now()) {
            self.terminate_session(session_id, "expired").await;
            return None;
        }
        Some(session)
    }

    pub async fn terminate_session(&self, session_id: &str, reason: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id);
        if removed.is_none() {
            return false;
        }

        let metrics = self.metrics.lock().await.remove(session_id);
        let event_type = if reason == "expired" {
            "session_expired"
        } else {
            "session_terminated"
        };

        let mut data = BlockData::new(event_type)
            .session(session_id)
            .actor("session_manager")
            .action("terminate_session")
            .field("reason", reason);
        if let Some((metrics, started_at)) = metrics {
            let duration = (Utc::now() - started_at).num_milliseconds() as f64 / 1_000.0;
            data = data
                .field("tool_calls", metrics.tool_calls)
                .field("permission_checks", metrics.permission_checks)
                .field("permission_denials", metrics.permission_denials)
                .field("portfolio_accesses", metrics.portfolio_accesses)
                .field("duration_seconds", duration);
        }
        self.log(data);

        info!("SessionManager: terminated {session_id} (reason: {reason})");
        true
    }

    /// Remove every expired session, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.session_id.clone())
            .collect();

        for session_id in &expired {
            self.terminate_session(session_id, "expired").await;
        }
        expired.len()
    }

    /// Background loop that periodically removes expired sessions.
    /// Abort the handle to stop it.
    pub fn spawn_cleanup_task(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = manager.cleanup_expired().await;
                if removed > 0 {
                    info!("SessionManager: cleaned up {removed} expired session(s)");
                }
            }
        })
    }

    /// Permission gate for sensitive operations.
    ///
    /// Denials (expired session or missing permission) are recorded as
    /// `permission_denied` blocks before the error is returned; grants may
    /// record `access_granted` with the touched resource.
    pub async fn authorize(
        &self,
        session: &Session,
        required: Permission,
        action: &str,
        resource: Option<&str>,
    ) -> Result<(), AccessError> {
        self.bump_metrics(&session.session_id, |m| m.permission_checks += 1)
            .await;

        if session.is_expired(Utc::now()) {
            self.bump_metrics(&session.session_id, |m| m.permission_denials += 1)
                .await;
            self.log_denial(session, required, action, "session expired");
            return Err(AccessError::SessionExpired {
                session_id: session.session_id.clone(),
            });
        }

        if !session.has_permission(required) {
            self.bump_metrics(&session.session_id, |m| m.permission_denials += 1)
                .await;
            self.log_denial(session, required, action, "permission not held");
            return Err(AccessError::MissingPermission {
                session_id: session.session_id.clone(),
                role: session.role.to_string(),
                permission: required.name().to_string(),
                action: action.to_string(),
            });
        }

        if let Some(resource) = resource {
            self.bump_metrics(&session.session_id, |m| m.portfolio_accesses += 1)
                .await;
            self.log(
                BlockData::new("access_granted")
                    .session(&session.session_id)
                    .actor(session.role.as_str())
                    .action(action)
                    .resource(resource)
                    .field("permission", required.name()),
            );
        }

        Ok(())
    }

    pub async fn record_tool_call(&self, session_id: &str) {
        self.bump_metrics(session_id, |m| m.tool_calls += 1).await;
    }

    pub async fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        self.metrics
            .lock()
            .await
            .get(session_id)
            .map(|(m, _)| m.clone())
    }

    pub async fn active_sessions(&self) -> Vec<Session> {
        let now = Utc::now();
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| !s.is_expired(now))
            .cloned()
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.active_sessions().await.len()
    }

    fn log_denial(&self, session: &Session, required: Permission, action: &str, reason: &str) {
        warn!(
            "SessionManager: denied {} for {} ({}): {}",
            required.name(),
            session.session_id,
            action,
            reason
        );
        self.log(
            BlockData::new("permission_denied")
                .session(&session.session_id)
                .actor(session.role.as_str())
                .action(action)
                .field("role", session.role.as_str())
                .field("required_permission", required.name())
                .field("attempted_action", action)
                .field("reason", reason),
        );
    }

    async fn bump_metrics(&self, session_id: &str, f: impl FnOnce(&mut SessionMetrics)) {
        if let Some((metrics, _)) = self.metrics.lock().await.get_mut(session_id) {
            f(metrics);
        }
    }

    fn log(&self, data: BlockData) {
        if let Some(chain) = &self.chain {
            if let Err(e) = chain.append(data) {
                warn!("SessionManager: audit append failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup_session() {
        let chain = SharedChain::in_memory();
        let manager = SessionManager::new(Some(chain.clone()));

        let session = manager
            .create_advisor_session("advisor:main", Some("user_1".to_string()))
            .await;
        assert_eq!(session.role, Role::HumanAdvisor);
        assert!(!session.sandbox_mode);
        assert!(session.allowed_portfolios.is_none());

        let found = manager.session("advisor:main").await.unwrap();
        assert_eq!(found.session_id, "advisor:main");

        let created = chain.with_chain(|c| c.blocks_by_event_type("session_created").len());
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_analyst_session_is_sandboxed_and_scoped() {
        let manager = SessionManager::new(None);
        let session = manager
            .create_analyst_session("analyst_1", vec!["portfolio_a".to_string()], None)
            .await;
        assert!(session.sandbox_mode);
        assert!(session.can_access_portfolio("portfolio_a"));
        assert!(!session.can_access_portfolio("portfolio_b"));
    }

    #[tokio::test]
    async fn test_agent_session_inherits_parent_scope() {
        let manager = SessionManager::new(None);
        manager
            .create_analyst_session("analyst_1", vec!["portfolio_a".to_string()], None)
            .await;

        let agent = manager
            .create_agent_session(AgentKind::Drift, "analyst_1")
            .await
            .unwrap();
        assert_eq!(agent.role, Role::DriftAgent);
        assert_eq!(
            agent.allowed_portfolios,
            Some(vec!["portfolio_a".to_string()])
        );

        let err = manager
            .create_agent_session(AgentKind::Tax, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::ParentSessionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_expired_session_lookup_terminates() {
        let chain = SharedChain::in_memory();
        let manager = SessionManager::new(Some(chain.clone()));
        manager
            .create_session(
                "short_lived",
                SessionType::System,
                Role::System,
                None,
                None,
                Some(0),
            )
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(manager.session("short_lived").await.is_none());

        let expired = chain.with_chain(|c| c.blocks_by_event_type("session_expired").len());
        assert_eq!(expired, 1);
    }

    #[tokio::test]
    async fn test_authorize_denial_is_audited() {
        let chain = SharedChain::in_memory();
        let manager = SessionManager::new(Some(chain.clone()));
        let session = manager
            .create_analyst_session("analyst_1", vec!["portfolio_a".to_string()], None)
            .await;

        let err = manager
            .authorize(
                &session,
                Permission::APPROVE_TRADES,
                "approve_scenario",
                Some("scenario_1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::MissingPermission { .. }));

        chain.with_chain(|c| {
            let denials = c.blocks_by_event_type("permission_denied");
            assert_eq!(denials.len(), 1);
            let block = denials[0];
            assert_eq!(block.data["role"], "analyst");
            assert_eq!(block.data["required_permission"], "APPROVE_TRADES");
            assert_eq!(block.data["attempted_action"], "approve_scenario");
        });

        let metrics = manager.session_metrics("analyst_1").await.unwrap();
        assert_eq!(metrics.permission_checks, 1);
        assert_eq!(metrics.permission_denials, 1);
    }

    #[tokio::test]
    async fn test_authorize_grant_logs_resource_access() {
        let chain = SharedChain::in_memory();
        let manager = SessionManager::new(Some(chain.clone()));
        let session = manager.create_advisor_session("advisor:main", None).await;

        manager
            .authorize(
                &session,
                Permission::APPROVE_TRADES,
                "approve_scenario",
                Some("scenario_1"),
            )
            .await
            .unwrap();

        chain.with_chain(|c| {
            let grants = c.blocks_by_event_type("access_granted");
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].resource.as_deref(), Some("scenario_1"));
        });
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let manager = SessionManager::new(None);
        manager
            .create_session("a", SessionType::System, Role::System, None, None, Some(0))
            .await;
        manager
            .create_session("b", SessionType::System, Role::System, None, None, Some(3_600))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(manager.cleanup_expired().await, 1);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_termination_logs_metrics() {
        let chain = SharedChain::in_memory();
        let manager = SessionManager::new(Some(chain.clone()));
        let session = manager.create_advisor_session("advisor:main", None).await;

        manager.record_tool_call("advisor:main").await;
        manager.record_tool_call("advisor:main").await;
        manager
            .authorize(&session, Permission::READ_HOLDINGS, "read_holdings", None)
            .await
            .unwrap();

        assert!(manager.terminate_session("advisor:main", "manual").await);
        chain.with_chain(|c| {
            let blocks = c.blocks_by_event_type("session_terminated");
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].data["tool_calls"], 2);
            assert_eq!(blocks[0].data["permission_checks"], 1);
        });

        // Second terminate is a no-op
        assert!(!manager.terminate_session("advisor:main", "manual").await);
    }
}
