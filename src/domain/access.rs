use crate::domain::errors::AccessError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Fine-grained permission flags, composable via bitwise OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission(u32);

impl Permission {
    pub const NONE: Permission = Permission(0);

    pub const READ_HOLDINGS: Permission = Permission(1 << 0);
    pub const READ_TAX_LOTS: Permission = Permission(1 << 1);
    pub const READ_CLIENT_PII: Permission = Permission(1 << 2);
    pub const READ_TRANSACTIONS: Permission = Permission(1 << 3);
    pub const READ_RECOMMENDATIONS: Permission = Permission(1 << 4);

    pub const WRITE_RECOMMENDATIONS: Permission = Permission(1 << 5);
    pub const APPROVE_TRADES: Permission = Permission(1 << 6);
    pub const EXECUTE_TRADES: Permission = Permission(1 << 7);

    pub const CONFIGURE_SYSTEM: Permission = Permission(1 << 8);
    pub const MANAGE_USERS: Permission = Permission(1 << 9);
    pub const VIEW_AUDIT_LOG: Permission = Permission(1 << 10);
    pub const ADMIN: Permission = Permission(1 << 11);

    /// True when every flag in `other` is present in `self`
    pub fn contains(&self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Name of a single base flag, for audit records and error messages
    pub fn name(&self) -> &'static str {
        match *self {
            Permission::READ_HOLDINGS => "READ_HOLDINGS",
            Permission::READ_TAX_LOTS => "READ_TAX_LOTS",
            Permission::READ_CLIENT_PII => "READ_CLIENT_PII",
            Permission::READ_TRANSACTIONS => "READ_TRANSACTIONS",
            Permission::READ_RECOMMENDATIONS => "READ_RECOMMENDATIONS",
            Permission::WRITE_RECOMMENDATIONS => "WRITE_RECOMMENDATIONS",
            Permission::APPROVE_TRADES => "APPROVE_TRADES",
            Permission::EXECUTE_TRADES => "EXECUTE_TRADES",
            Permission::CONFIGURE_SYSTEM => "CONFIGURE_SYSTEM",
            Permission::MANAGE_USERS => "MANAGE_USERS",
            Permission::VIEW_AUDIT_LOG => "VIEW_AUDIT_LOG",
            Permission::ADMIN => "ADMIN",
            Permission::NONE => "NONE",
            _ => "COMPOSITE",
        }
    }
}

impl BitOr for Permission {
    type Output = Permission;
    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitAnd for Permission {
    type Output = Permission;
    fn bitand(self, rhs: Permission) -> Permission {
        Permission(self.0 & rhs.0)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// System roles mapped to fixed permission sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    DriftAgent,
    TaxAgent,
    Coordinator,
    HumanAdvisor,
    Analyst,
    Client,
    System,
    Admin,
}

impl Role {
    /// Role → permission table, fixed at startup
    pub fn permissions(&self) -> Permission {
        match self {
            // Drift agent sees holdings only: no PII, no tax lots
            Role::DriftAgent => Permission::READ_HOLDINGS,
            Role::TaxAgent => {
                Permission::READ_HOLDINGS
                    | Permission::READ_TAX_LOTS
                    | Permission::READ_TRANSACTIONS
            }
            Role::Coordinator => {
                Permission::READ_HOLDINGS
                    | Permission::READ_TAX_LOTS
                    | Permission::READ_TRANSACTIONS
                    | Permission::WRITE_RECOMMENDATIONS
            }
            Role::HumanAdvisor => {
                Permission::READ_HOLDINGS
                    | Permission::READ_TAX_LOTS
                    | Permission::READ_CLIENT_PII
                    | Permission::READ_TRANSACTIONS
                    | Permission::READ_RECOMMENDATIONS
                    | Permission::WRITE_RECOMMENDATIONS
                    | Permission::APPROVE_TRADES
            }
            Role::Analyst => Permission::READ_HOLDINGS | Permission::READ_RECOMMENDATIONS,
            Role::Client => Permission::READ_HOLDINGS | Permission::READ_RECOMMENDATIONS,
            Role::System => Permission::NONE,
            Role::Admin => {
                Permission::ADMIN
                    | Permission::CONFIGURE_SYSTEM
                    | Permission::MANAGE_USERS
                    | Permission::VIEW_AUDIT_LOG
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::DriftAgent => "drift_agent",
            Role::TaxAgent => "tax_agent",
            Role::Coordinator => "coordinator",
            Role::HumanAdvisor => "human_advisor",
            Role::Analyst => "analyst",
            Role::Client => "client",
            Role::System => "system",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session types with their execution boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    AdvisorMain,
    Analyst,
    ClientPortal,
    System,
}

impl SessionType {
    /// Untrusted session types must run behind the sandbox collaborator
    pub fn requires_sandbox(&self) -> bool {
        matches!(self, SessionType::Analyst | SessionType::ClientPortal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::AdvisorMain => "advisor_main",
            SessionType::Analyst => "analyst",
            SessionType::ClientPortal => "client_portal",
            SessionType::System => "system",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Security boundary for a session: role, portfolio scope, expiry, sandbox flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub session_type: SessionType,
    pub role: Role,
    #[serde(default)]
    pub user_id: Option<String>,
    /// None = unrestricted (advisor/system sessions)
    #[serde(default)]
    pub allowed_portfolios: Option<Vec<String>>,
    pub sandbox_mode: bool,
    pub max_tool_calls: u32,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn permissions(&self) -> Permission {
        self.role.permissions()
    }

    pub fn has_permission(&self, required: Permission) -> bool {
        // Admin role is a wildcard
        if self.role == Role::Admin {
            return true;
        }
        self.permissions().contains(required)
    }

    pub fn can_access_portfolio(&self, portfolio_id: &str) -> bool {
        match &self.allowed_portfolios {
            None => true,
            Some(allowed) => allowed.iter().any(|p| p == portfolio_id),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => false,
            Some(expiry) => now > expiry,
        }
    }

    pub fn requires_sandbox(&self) -> bool {
        self.session_type.requires_sandbox()
    }

    /// Validate that this session may perform `permission` against a portfolio.
    ///
    /// Checks expiry, then portfolio scope, then permission.
    pub fn validate_access(
        &self,
        portfolio_id: &str,
        permission: Permission,
        now: DateTime<Utc>,
    ) -> Result<(), AccessError> {
        if self.is_expired(now) {
            return Err(AccessError::SessionExpired {
                session_id: self.session_id.clone(),
            });
        }
        if !self.can_access_portfolio(portfolio_id) {
            return Err(AccessError::PortfolioScope {
                session_id: self.session_id.clone(),
                portfolio_id: portfolio_id.to_string(),
            });
        }
        if !self.has_permission(permission) {
            return Err(AccessError::MissingPermission {
                session_id: self.session_id.clone(),
                role: self.role.to_string(),
                permission: permission.name().to_string(),
                action: "validate_access".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(role: Role, session_type: SessionType) -> Session {
        Session {
            session_id: "sess_test".to_string(),
            session_type,
            role,
            user_id: None,
            allowed_portfolios: None,
            sandbox_mode: session_type.requires_sandbox(),
            max_tool_calls: 10,
            timeout_seconds: 300,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn test_role_permission_table() {
        assert!(Role::DriftAgent
            .permissions()
            .contains(Permission::READ_HOLDINGS));
        assert!(!Role::DriftAgent
            .permissions()
            .contains(Permission::READ_TAX_LOTS));
        assert!(Role::TaxAgent
            .permissions()
            .contains(Permission::READ_TAX_LOTS | Permission::READ_TRANSACTIONS));
        assert!(Role::HumanAdvisor
            .permissions()
            .contains(Permission::APPROVE_TRADES));
        assert!(!Role::Analyst
            .permissions()
            .contains(Permission::APPROVE_TRADES));
    }

    #[test]
    fn test_admin_is_wildcard() {
        let admin = session(Role::Admin, SessionType::System);
        assert!(admin.has_permission(Permission::EXECUTE_TRADES));
        assert!(admin.has_permission(Permission::READ_CLIENT_PII));
    }

    #[test]
    fn test_portfolio_scoping() {
        let mut s = session(Role::Analyst, SessionType::Analyst);
        assert!(s.can_access_portfolio("portfolio_a"));

        s.allowed_portfolios = Some(vec!["portfolio_a".to_string()]);
        assert!(s.can_access_portfolio("portfolio_a"));
        assert!(!s.can_access_portfolio("portfolio_b"));
    }

    #[test]
    fn test_expired_session_denies_everything() {
        let now = Utc::now();
        let mut s = session(Role::HumanAdvisor, SessionType::AdvisorMain);
        s.expires_at = Some(now - Duration::seconds(1));

        let err = s
            .validate_access("portfolio_a", Permission::READ_HOLDINGS, now)
            .unwrap_err();
        assert!(matches!(err, AccessError::SessionExpired { .. }));
    }

    #[test]
    fn test_validate_access_order() {
        let now = Utc::now();
        let mut s = session(Role::Analyst, SessionType::Analyst);
        s.allowed_portfolios = Some(vec!["portfolio_a".to_string()]);

        // Out-of-scope portfolio reported before missing permission
        let err = s
            .validate_access("portfolio_b", Permission::APPROVE_TRADES, now)
            .unwrap_err();
        assert!(matches!(err, AccessError::PortfolioScope { .. }));

        let err = s
            .validate_access("portfolio_a", Permission::APPROVE_TRADES, now)
            .unwrap_err();
        assert!(matches!(err, AccessError::MissingPermission { .. }));
    }

    #[test]
    fn test_sandbox_flag_by_session_type() {
        assert!(SessionType::Analyst.requires_sandbox());
        assert!(SessionType::ClientPortal.requires_sandbox());
        assert!(!SessionType::AdvisorMain.requires_sandbox());
        assert!(!SessionType::System.requires_sandbox());
    }
}
