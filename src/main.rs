use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use vigil::application::agents::coordinator::Coordinator;
use vigil::application::agents::AnalysisContext;
use vigil::application::gateway::{EventHandler, Gateway};
use vigil::application::routing::PersonaRouter;
use vigil::application::session_manager::SessionManager;
use vigil::application::state_machine::{AnalysisStateMachine, Trigger};
use vigil::config::Config;
use vigil::domain::access::Permission;
use vigil::domain::events::{EventType, InputEvent};
use vigil::domain::portfolio::{
    ClientProfile, Holding, Portfolio, TargetAllocation, TaxLot, Transaction,
};
use vigil::domain::ports::{PortfolioRepository, TransactionRepository};
use vigil::domain::types::{CronJobType, RiskProfile, TradeAction};
use vigil::infrastructure::audit::{AuditChain, SharedChain};
use vigil::infrastructure::repositories::{
    InMemoryPortfolioRepository, InMemoryTransactionRepository,
};

const DEMO_PORTFOLIO_ID: &str = "portfolio_whitfield";
const ADVISOR_SESSION: &str = "advisor:main";

#[derive(Debug, Parser)]
#[command(name = "vigil", about = "Portfolio monitoring engine demo runner")]
struct Args {
    /// Persist the audit chain to this file
    #[arg(long)]
    chain_path: Option<PathBuf>,

    /// Which demo flow to run: golden, heartbeat or cron
    #[arg(long, default_value = "golden")]
    scenario: String,
}

/// Drives the full pipeline for each dispatched event: route, step the state
/// machine, run the coordinator, report the ranked scenarios.
struct AnalysisHandler {
    router: PersonaRouter,
    coordinator: Coordinator,
    portfolios: Arc<InMemoryPortfolioRepository>,
    transactions: Arc<InMemoryTransactionRepository>,
    state_machine: Mutex<AnalysisStateMachine>,
    sessions: Arc<SessionManager>,
}

#[async_trait]
impl EventHandler for AnalysisHandler {
    async fn handle(&self, event: &InputEvent) -> Result<()> {
        let decision = self.router.route(event, DEMO_PORTFOLIO_ID).await;
        if !decision.should_process {
            info!("Routing skipped event {}: {}", event.event_id, decision.reasoning);
            return Ok(());
        }
        info!(
            "Routing: {:?} priority, agents {:?} ({})",
            decision.priority, decision.agents_required, decision.reasoning
        );

        let session = self
            .sessions
            .session(ADVISOR_SESSION)
            .await
            .ok_or_else(|| anyhow::anyhow!("advisor session not available"))?;
        self.sessions
            .authorize(
                &session,
                Permission::WRITE_RECOMMENDATIONS,
                "run_analysis",
                Some(DEMO_PORTFOLIO_ID),
            )
            .await?;

        let portfolio = self.portfolios.portfolio(DEMO_PORTFOLIO_ID).await?;
        let transactions = self
            .transactions
            .recent_transactions(DEMO_PORTFOLIO_ID, 60)
            .await;
        let ctx = AnalysisContext::new(Utc::now()).with_additions(decision.context_additions);

        let mut machine = self.state_machine.lock().await;
        machine.fire(Trigger::DetectEvent, Default::default())?;
        machine.fire(Trigger::StartAnalysis, Default::default())?;

        let report = self.coordinator.execute(
            &portfolio,
            &transactions,
            &event.event_id,
            &event.session_id,
            &ctx,
        )?;

        if report.conflicts_detected.is_empty() {
            machine.fire(Trigger::NoConflict, Default::default())?;
        } else {
            machine.fire(Trigger::DetectConflict, Default::default())?;
            machine.fire(Trigger::ResolveConflict, Default::default())?;
        }

        info!(
            "Analysis complete: {} conflict(s), {} scenario(s)",
            report.conflicts_detected.len(),
            report.scenarios.len()
        );
        for conflict in &report.conflicts_detected {
            info!("  conflict [{}]: {}", conflict.kind, conflict.description);
        }
        for scenario in &report.scenarios {
            let score = scenario
                .utility_score
                .as_ref()
                .map(|s| format!("{:.1}/100 (rank {})", s.total_score, s.rank))
                .unwrap_or_else(|| "unscored".to_string());
            info!(
                "  scenario '{}': {} steps, utility {}",
                scenario.title,
                scenario.action_steps.len(),
                score
            );
        }
        info!("Recommended scenario: {}", report.recommended_scenario_id);

        // Walk the recommendation through approval and execution, then
        // return to monitoring.
        machine.fire(Trigger::Approve, Default::default())?;
        machine.fire(Trigger::Execute, Default::default())?;
        machine.fire(Trigger::Complete, Default::default())?;

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if args.chain_path.is_some() {
        config.chain_path = args.chain_path.clone();
        config.auto_persist = true;
    }

    let chain = match &config.chain_path {
        Some(path) => SharedChain::new(AuditChain::with_persistence(path, config.auto_persist)?),
        None => SharedChain::in_memory(),
    };

    let portfolios = Arc::new(InMemoryPortfolioRepository::new());
    let transactions = Arc::new(InMemoryTransactionRepository::new());
    seed_fixtures(&portfolios, &transactions).await;

    let sessions = Arc::new(SessionManager::with_timeout(
        Some(chain.clone()),
        config.default_session_timeout_secs,
    ));
    sessions
        .create_advisor_session(ADVISOR_SESSION, Some("demo_advisor".to_string()))
        .await;

    let handler = Arc::new(AnalysisHandler {
        router: PersonaRouter::with_config(portfolios.clone(), config.routing.clone()),
        coordinator: Coordinator::with_scoring(Some(chain.clone()), config.scoring.clone()),
        portfolios: portfolios.clone(),
        transactions: transactions.clone(),
        state_machine: Mutex::new(AnalysisStateMachine::new(
            ADVISOR_SESSION,
            Some(chain.clone()),
        )),
        sessions: sessions.clone(),
    });

    let gateway = Arc::new(Gateway::new(Some(chain.clone())));
    gateway.start();
    for event_type in [EventType::MarketEvent, EventType::Heartbeat, EventType::Cron] {
        gateway.register_handler(event_type, handler.clone()).await;
    }

    let event = match args.scenario.as_str() {
        "heartbeat" => InputEvent::heartbeat(ADVISOR_SESSION, vec![DEMO_PORTFOLIO_ID.to_string()]),
        "cron" => InputEvent::cron_job(
            ADVISOR_SESSION,
            CronJobType::DailyReview,
            "Scheduled daily portfolio review",
        ),
        _ => InputEvent::market_event(
            ADVISOR_SESSION,
            vec!["Technology".to_string()],
            -0.04,
            "Semiconductor sector selling off on export control headlines",
            vec!["NVDA".to_string()],
        ),
    };

    info!("Submitting {} event to gateway", event.type_tag());
    gateway.submit(event).await?;
    gateway.process_session(ADVISOR_SESSION).await;

    let stats = gateway.stats().await;
    info!(
        "Gateway stats: received={} processed={} rejected={}",
        stats.events_received, stats.events_processed, stats.events_rejected
    );

    if chain.verify_integrity() {
        info!(
            "Audit chain verified: {} blocks, root {}",
            chain.len(),
            chain.root_hash()
        );
    } else {
        warn!("Audit chain failed verification");
    }

    gateway.stop().await;
    sessions.terminate_session(ADVISOR_SESSION, "demo complete").await;
    Ok(())
}

/// The demo book: one oversized NVDA position with a recent sale, a loss
/// position worth harvesting, and a bond sleeve under target.
async fn seed_fixtures(
    portfolios: &InMemoryPortfolioRepository,
    transactions: &InMemoryTransactionRepository,
) {
    let now = Utc::now();
    let aum = 50_000_000.0;

    let portfolio = Portfolio {
        portfolio_id: DEMO_PORTFOLIO_ID.to_string(),
        client_id: "client_whitfield".to_string(),
        name: "Whitfield Family Office".to_string(),
        aum_usd: aum,
        holdings: vec![
            Holding {
                ticker: "NVDA".to_string(),
                quantity: 10_000.0,
                current_price: 850.0,
                market_value: 8_500_000.0,
                portfolio_weight: 0.17,
                cost_basis: 5_000_000.0,
                unrealized_gain_loss: 3_500_000.0,
                tax_lots: vec![TaxLot {
                    lot_id: "nvda_lot_1".to_string(),
                    purchase_date: now - Duration::days(700),
                    purchase_price: 500.0,
                    quantity: 10_000.0,
                    cost_basis: 5_000_000.0,
                }],
                sector: "Technology".to_string(),
                asset_class: "US Equities".to_string(),
            },
            Holding {
                ticker: "MSFT".to_string(),
                quantity: 15_000.0,
                current_price: 400.0,
                market_value: 6_000_000.0,
                portfolio_weight: 0.12,
                cost_basis: 6_600_000.0,
                unrealized_gain_loss: -600_000.0,
                tax_lots: vec![TaxLot {
                    lot_id: "msft_lot_1".to_string(),
                    purchase_date: now - Duration::days(200),
                    purchase_price: 440.0,
                    quantity: 15_000.0,
                    cost_basis: 6_600_000.0,
                }],
                sector: "Technology".to_string(),
                asset_class: "US Equities".to_string(),
            },
            Holding {
                ticker: "AGG".to_string(),
                quantity: 100_000.0,
                current_price: 100.0,
                market_value: 10_000_000.0,
                portfolio_weight: 0.20,
                cost_basis: 10_200_000.0,
                unrealized_gain_loss: -200_000.0,
                tax_lots: vec![],
                sector: "Fixed Income".to_string(),
                asset_class: "Fixed Income".to_string(),
            },
        ],
        target_allocation: TargetAllocation {
            us_equities: 0.35,
            international_equities: 0.15,
            fixed_income: 0.25,
            alternatives: 0.10,
            structured_products: 0.05,
            cash: 0.10,
        },
        client_profile: ClientProfile {
            client_id: "client_whitfield".to_string(),
            risk_tolerance: RiskProfile::ModerateGrowth,
            tax_sensitivity: 0.85,
            concentration_limit: 0.15,
            rebalancing_frequency: "quarterly".to_string(),
        },
        last_rebalance: now - Duration::days(95),
        cash_available: 2_500_000.0,
    };
    portfolios.insert(portfolio).await;

    transactions
        .insert(Transaction {
            transaction_id: "tx_nvda_trim".to_string(),
            portfolio_id: DEMO_PORTFOLIO_ID.to_string(),
            ticker: "NVDA".to_string(),
            action: TradeAction::Sell,
            quantity: 1_500.0,
            price: 880.0,
            timestamp: now - Duration::days(15),
            wash_sale_disallowed: 0.0,
        })
        .await;
}
