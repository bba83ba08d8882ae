//! Access layer integration: role gating, portfolio scoping, expiry, and the
//! audit evidence each denial leaves behind.

use chrono::{Duration, Utc};
use vigil::application::session_manager::SessionManager;
use vigil::domain::access::{Permission, Role, SessionType};
use vigil::domain::errors::AccessError;
use vigil::infrastructure::audit::SharedChain;

#[tokio::test]
async fn test_analyst_cannot_approve_trades() {
    let chain = SharedChain::in_memory();
    let manager = SessionManager::new(Some(chain.clone()));

    let session = manager
        .create_analyst_session(
            "analyst_morgan",
            vec!["portfolio_a".to_string()],
            Some("morgan".to_string()),
        )
        .await;

    let err = manager
        .authorize(
            &session,
            Permission::APPROVE_TRADES,
            "approve_scenario",
            Some("scenario_optimal_1"),
        )
        .await
        .unwrap_err();

    match err {
        AccessError::MissingPermission {
            role, permission, ..
        } => {
            assert_eq!(role, "analyst");
            assert_eq!(permission, "APPROVE_TRADES");
        }
        other => panic!("expected MissingPermission, got {other:?}"),
    }

    // The denial is on the chain, naming the role and the attempted action
    chain.with_chain(|c| {
        let denials = c.blocks_by_event_type("permission_denied");
        assert_eq!(denials.len(), 1);
        let block = denials[0];
        assert_eq!(block.session_id, "analyst_morgan");
        assert_eq!(block.data["role"], "analyst");
        assert_eq!(block.data["required_permission"], "APPROVE_TRADES");
        assert_eq!(block.data["attempted_action"], "approve_scenario");
    });
    assert!(chain.verify_integrity());
}

#[tokio::test]
async fn test_portfolio_scope_is_enforced() {
    let manager = SessionManager::new(None);
    let session = manager
        .create_analyst_session("analyst_1", vec!["portfolio_a".to_string()], None)
        .await;

    let now = Utc::now();
    assert!(session
        .validate_access("portfolio_a", Permission::READ_HOLDINGS, now)
        .is_ok());

    let err = session
        .validate_access("portfolio_b", Permission::READ_HOLDINGS, now)
        .unwrap_err();
    assert!(matches!(err, AccessError::PortfolioScope { .. }));

    // Unrestricted advisor session reaches everything
    let advisor = manager.create_advisor_session("advisor:main", None).await;
    assert!(advisor
        .validate_access("portfolio_b", Permission::READ_HOLDINGS, now)
        .is_ok());
}

#[tokio::test]
async fn test_expired_session_denies_every_access() {
    let chain = SharedChain::in_memory();
    let manager = SessionManager::new(Some(chain.clone()));

    let mut session = manager.create_advisor_session("advisor:old", None).await;
    session.expires_at = Some(Utc::now() - Duration::seconds(30));

    // Even a permission the role holds is denied once expired
    let err = manager
        .authorize(&session, Permission::READ_HOLDINGS, "read_holdings", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::SessionExpired { .. }));

    let err = session
        .validate_access("portfolio_a", Permission::READ_HOLDINGS, Utc::now())
        .unwrap_err();
    assert!(matches!(err, AccessError::SessionExpired { .. }));
}

#[tokio::test]
async fn test_session_lifecycle_audit_trail() {
    let chain = SharedChain::in_memory();
    let manager = SessionManager::new(Some(chain.clone()));

    manager
        .create_session(
            "client_portal_1",
            SessionType::ClientPortal,
            Role::Client,
            Some("client_77".to_string()),
            Some(vec!["portfolio_own".to_string()]),
            None,
        )
        .await;
    manager.terminate_session("client_portal_1", "logout").await;

    chain.with_chain(|c| {
        assert_eq!(c.blocks_by_event_type("session_created").len(), 1);
        let terminated = c.blocks_by_event_type("session_terminated");
        assert_eq!(terminated.len(), 1);
        assert_eq!(terminated[0].data["reason"], "logout");
    });

    // Untrusted session types carry the sandbox flag
    let session = manager
        .create_session(
            "client_portal_2",
            SessionType::ClientPortal,
            Role::Client,
            None,
            None,
            None,
        )
        .await;
    assert!(session.sandbox_mode);
    assert!(session.requires_sandbox());
}

#[tokio::test]
async fn test_admin_wildcard_passes_gate() {
    let manager = SessionManager::new(None);
    let session = manager
        .create_session(
            "admin_root",
            SessionType::System,
            Role::Admin,
            None,
            None,
            None,
        )
        .await;

    for permission in [
        Permission::EXECUTE_TRADES,
        Permission::READ_CLIENT_PII,
        Permission::MANAGE_USERS,
    ] {
        manager
            .authorize(&session, permission, "admin_op", None)
            .await
            .unwrap();
    }
}
