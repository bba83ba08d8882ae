use crate::domain::events::{EventKind, InputEvent};
use crate::domain::portfolio::{self, Portfolio};
use crate::domain::ports::PortfolioRepository;
use crate::domain::types::{AgentKind, CronJobType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Priority assigned by a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingPriority {
    Critical,
    High,
    Normal,
    Low,
    Skip,
}

/// Decision about whether and how an event produces an analysis
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub should_process: bool,
    pub priority: RoutingPriority,
    pub agents_required: Vec<AgentKind>,
    pub context_additions: Map<String, Value>,
    pub reasoning: String,
}

impl RoutingDecision {
    pub fn requires_coordinator(&self) -> bool {
        self.agents_required.len() > 1
            || self.agents_required.contains(&AgentKind::Coordinator)
    }

    fn skip(reasoning: impl Into<String>) -> Self {
        Self {
            should_process: false,
            priority: RoutingPriority::Skip,
            agents_required: vec![],
            context_additions: Map::new(),
            reasoning: reasoning.into(),
        }
    }
}

/// Thresholds driving routing decisions
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Absolute market move treated as urgent regardless of exposure
    pub market_move_urgent: f64,
    /// Market move that matters when exposure is high
    pub market_move_significant: f64,
    pub exposure_high: f64,
    pub exposure_normal: f64,
    /// Concentration excess bands for heartbeat checks
    pub concentration_high: f64,
    pub concentration_normal: f64,
    pub drift_threshold: f64,
    pub drift_high: f64,
    /// Unrealized losses that trigger a tax harvest look
    pub tax_loss_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            market_move_urgent: 0.10,
            market_move_significant: 0.05,
            exposure_high: 0.20,
            exposure_normal: 0.10,
            concentration_high: 0.10,
            concentration_normal: 0.05,
            drift_threshold: 0.05,
            drift_high: 0.10,
            tax_loss_threshold: 50_000.0,
        }
    }
}

/// Decides, per event, which analyzers run and at what priority.
pub struct PersonaRouter {
    portfolios: Arc<dyn PortfolioRepository>,
    config: RoutingConfig,
}

impl PersonaRouter {
    pub fn new(portfolios: Arc<dyn PortfolioRepository>) -> Self {
        Self::with_config(portfolios, RoutingConfig::default())
    }

    pub fn with_config(portfolios: Arc<dyn PortfolioRepository>, config: RoutingConfig) -> Self {
        Self { portfolios, config }
    }

    pub async fn route(&self, event: &InputEvent, portfolio_id: &str) -> RoutingDecision {
        let portfolio = match self.portfolios.portfolio(portfolio_id).await {
            Ok(p) => p,
            Err(e) => {
                error!("PersonaRouter: failed to load portfolio {portfolio_id}: {e}");
                return RoutingDecision::skip(format!("Portfolio load failed: {e}"));
            }
        };

        let decision = match &event.kind {
            EventKind::MarketEvent {
                affected_sectors,
                magnitude,
                ..
            } => self.route_market_event(*magnitude, affected_sectors, &portfolio),
            EventKind::Heartbeat { .. } => self.route_heartbeat(&portfolio),
            EventKind::Webhook { payload, .. } => self.route_webhook(payload, &portfolio),
            EventKind::Cron { job_type, .. } => self.route_cron(*job_type),
            EventKind::AgentMessage { .. } => RoutingDecision {
                should_process: true,
                priority: RoutingPriority::Normal,
                agents_required: vec![AgentKind::Drift, AgentKind::Coordinator],
                context_additions: Map::new(),
                reasoning: format!("Default routing for event type: {}", event.type_tag()),
            },
        };

        debug!(
            "PersonaRouter [{}]: {} -> process={} priority={:?} agents={:?}",
            portfolio_id,
            event.event_id,
            decision.should_process,
            decision.priority,
            decision.agents_required
        );
        decision
    }

    fn route_market_event(
        &self,
        magnitude: f64,
        affected_sectors: &[String],
        portfolio: &Portfolio,
    ) -> RoutingDecision {
        let magnitude = magnitude.abs();
        let sector_weights = portfolio::sector_weights(portfolio);
        let exposure: f64 = affected_sectors
            .iter()
            .map(|s| sector_weights.get(s).copied().unwrap_or(0.0))
            .sum();

        let mut context = Map::new();
        context.insert(
            "market_event".to_string(),
            json!({"magnitude": magnitude, "affected_sectors": affected_sectors}),
        );

        let (priority, agents) = if magnitude >= self.config.market_move_urgent {
            context.insert(
                "urgency_reason".to_string(),
                json!(format!("Market drop of {:.1}%", magnitude * 100.0)),
            );
            (
                RoutingPriority::Critical,
                vec![AgentKind::Drift, AgentKind::Tax, AgentKind::Coordinator],
            )
        } else if magnitude >= self.config.market_move_significant
            && exposure > self.config.exposure_high
        {
            context.insert(
                "urgency_reason".to_string(),
                json!(format!(
                    "Significant exposure ({:.1}%) to affected sectors",
                    exposure * 100.0
                )),
            );
            (
                RoutingPriority::High,
                vec![AgentKind::Drift, AgentKind::Tax, AgentKind::Coordinator],
            )
        } else if exposure > self.config.exposure_normal {
            (
                RoutingPriority::Normal,
                vec![AgentKind::Drift, AgentKind::Coordinator],
            )
        } else {
            (RoutingPriority::Low, vec![AgentKind::Drift])
        };

        RoutingDecision {
            should_process: true,
            priority,
            agents_required: agents,
            context_additions: context,
            reasoning: format!(
                "Market event: {:.1}% move, portfolio exposure: {:.1}%",
                magnitude * 100.0,
                exposure * 100.0
            ),
        }
    }

    fn route_heartbeat(&self, portfolio: &Portfolio) -> RoutingDecision {
        let breaches = portfolio::concentration_breaches(portfolio, None);
        let limit = portfolio.client_profile.concentration_limit;
        let max_drift = portfolio::allocation_drift(portfolio)
            .iter()
            .map(|(_, d)| d.abs())
            .fold(0.0, f64::max);
        let total_losses: f64 = portfolio
            .holdings
            .iter()
            .filter(|h| h.unrealized_gain_loss < 0.0)
            .map(|h| h.unrealized_gain_loss.abs())
            .sum();

        let mut agents: Vec<AgentKind> = Vec::new();
        let mut priority = RoutingPriority::Low;
        let mut context = Map::new();

        if !breaches.is_empty() {
            let highest_excess = breaches
                .iter()
                .map(|h| h.portfolio_weight - limit)
                .fold(0.0, f64::max);
            if highest_excess > self.config.concentration_high {
                priority = RoutingPriority::High;
                agents.push(AgentKind::Drift);
                context.insert("concentration_alert".to_string(), json!(true));
            } else if highest_excess > self.config.concentration_normal {
                priority = RoutingPriority::Normal;
                agents.push(AgentKind::Drift);
            }
        }

        if max_drift > self.config.drift_threshold {
            agents.push(AgentKind::Drift);
            context.insert("drift_detected".to_string(), json!(true));
            if max_drift > self.config.drift_high {
                priority = RoutingPriority::High;
            }
        }

        if total_losses > self.config.tax_loss_threshold {
            agents.push(AgentKind::Tax);
            context.insert("tax_harvest_opportunity".to_string(), json!(total_losses));
        }

        // Dedupe, then pull in the coordinator for multi-agent work
        let mut seen = HashSet::new();
        agents.retain(|a| seen.insert(*a));
        if agents.len() > 1 {
            agents.push(AgentKind::Coordinator);
        }

        if agents.is_empty() {
            return RoutingDecision::skip("No issues detected in heartbeat check");
        }

        RoutingDecision {
            should_process: true,
            priority,
            agents_required: agents,
            context_additions: context,
            reasoning: format!(
                "Heartbeat: {} concentration risks, max drift {:.1}%, losses ${:.0}",
                breaches.len(),
                max_drift * 100.0,
                total_losses
            ),
        }
    }

    fn route_webhook(
        &self,
        payload: &Map<String, Value>,
        portfolio: &Portfolio,
    ) -> RoutingDecision {
        let webhook_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        match webhook_type {
            "trade_execution" => {
                let mut context = Map::new();
                context.insert(
                    "trade_executed".to_string(),
                    payload.get("trade").cloned().unwrap_or(Value::Null),
                );
                RoutingDecision {
                    should_process: true,
                    priority: RoutingPriority::High,
                    agents_required: vec![AgentKind::Tax],
                    context_additions: context,
                    reasoning: "Trade execution webhook - checking tax implications".to_string(),
                }
            }
            "price_alert" => {
                let mut context = Map::new();
                context.insert("price_alert".to_string(), Value::Object(payload.clone()));
                RoutingDecision {
                    should_process: true,
                    priority: RoutingPriority::Normal,
                    agents_required: vec![AgentKind::Drift, AgentKind::Coordinator],
                    context_additions: context,
                    reasoning: "Price alert webhook - checking drift".to_string(),
                }
            }
            "news_alert" => {
                let affected: Vec<String> = payload
                    .get("tickers")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let held: HashSet<&str> =
                    portfolio.holdings.iter().map(|h| h.ticker.as_str()).collect();
                let mut overlap: Vec<String> = affected
                    .iter()
                    .filter(|t| held.contains(t.as_str()))
                    .cloned()
                    .collect();
                overlap.sort();

                if overlap.is_empty() {
                    return RoutingDecision::skip(format!(
                        "Unhandled webhook type: {webhook_type}"
                    ));
                }

                let mut context = Map::new();
                context.insert("news_alert".to_string(), Value::Object(payload.clone()));
                context.insert("affected_holdings".to_string(), json!(overlap));
                RoutingDecision {
                    should_process: true,
                    priority: RoutingPriority::Normal,
                    agents_required: vec![AgentKind::Drift, AgentKind::Coordinator],
                    context_additions: context,
                    reasoning: format!("News affecting portfolio holdings: {}", overlap.join(", ")),
                }
            }
            other => RoutingDecision::skip(format!("Unhandled webhook type: {other}")),
        }
    }

    fn route_cron(&self, job_type: CronJobType) -> RoutingDecision {
        match job_type {
            CronJobType::DailyReview => RoutingDecision {
                should_process: true,
                priority: RoutingPriority::Normal,
                agents_required: vec![AgentKind::Drift, AgentKind::Tax, AgentKind::Coordinator],
                context_additions: single_flag("scheduled_review"),
                reasoning: "Daily review cron job".to_string(),
            },
            CronJobType::EodTax => RoutingDecision {
                should_process: true,
                priority: RoutingPriority::Normal,
                agents_required: vec![AgentKind::Tax],
                context_additions: single_flag("eod_tax_check"),
                reasoning: "End-of-day tax check".to_string(),
            },
            CronJobType::QuarterlyRebalance => RoutingDecision {
                should_process: true,
                priority: RoutingPriority::High,
                agents_required: vec![AgentKind::Drift, AgentKind::Tax, AgentKind::Coordinator],
                context_additions: single_flag("quarterly_rebalance"),
                reasoning: "Quarterly rebalance review".to_string(),
            },
        }
    }
}

fn single_flag(key: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), json!(true));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::{ClientProfile, Holding, TargetAllocation};
    use crate::domain::types::RiskProfile;
    use crate::infrastructure::repositories::InMemoryPortfolioRepository;
    use chrono::Utc;

    fn holding(ticker: &str, sector: &str, weight: f64, gain_loss: f64) -> Holding {
        Holding {
            ticker: ticker.to_string(),
            quantity: 1_000.0,
            current_price: 100.0,
            market_value: weight * 10_000_000.0,
            portfolio_weight: weight,
            cost_basis: weight * 10_000_000.0 - gain_loss,
            unrealized_gain_loss: gain_loss,
            tax_lots: vec![],
            sector: sector.to_string(),
            asset_class: "US Equities".to_string(),
        }
    }

    async fn repo_with(holdings: Vec<Holding>) -> Arc<InMemoryPortfolioRepository> {
        let us_equities: f64 = holdings.iter().map(|h| h.portfolio_weight).sum();
        let portfolio = Portfolio {
            portfolio_id: "portfolio_a".to_string(),
            client_id: "client_a".to_string(),
            name: "Test".to_string(),
            aum_usd: 10_000_000.0,
            holdings,
            target_allocation: TargetAllocation {
                us_equities,
                international_equities: 0.0,
                fixed_income: 0.0,
                alternatives: 0.0,
                structured_products: 0.0,
                cash: 1.0 - us_equities,
            },
            client_profile: ClientProfile {
                client_id: "client_a".to_string(),
                risk_tolerance: RiskProfile::ModerateGrowth,
                tax_sensitivity: 0.5,
                concentration_limit: 0.15,
                rebalancing_frequency: "quarterly".to_string(),
            },
            last_rebalance: Utc::now(),
            cash_available: 100_000.0,
        };
        let repo = Arc::new(InMemoryPortfolioRepository::new());
        repo.insert(portfolio).await;
        repo
    }

    fn market_event(magnitude: f64, sectors: &[&str]) -> InputEvent {
        InputEvent::market_event(
            "advisor:main",
            sectors.iter().map(|s| s.to_string()).collect(),
            magnitude,
            "test event",
            vec![],
        )
    }

    #[tokio::test]
    async fn test_unknown_portfolio_skips() {
        let repo = Arc::new(InMemoryPortfolioRepository::new());
        let router = PersonaRouter::new(repo);
        let decision = router
            .route(&market_event(-0.04, &["Technology"]), "missing")
            .await;

        assert!(!decision.should_process);
        assert_eq!(decision.priority, RoutingPriority::Skip);
        assert!(decision.reasoning.contains("Portfolio load failed"));
        assert!(decision.reasoning.contains("missing"));
    }

    #[tokio::test]
    async fn test_large_market_move_is_critical() {
        let repo = repo_with(vec![holding("NVDA", "Technology", 0.10, 0.0)]).await;
        let router = PersonaRouter::new(repo);
        let decision = router
            .route(&market_event(-0.12, &["Technology"]), "portfolio_a")
            .await;

        assert!(decision.should_process);
        assert_eq!(decision.priority, RoutingPriority::Critical);
        assert_eq!(
            decision.agents_required,
            vec![AgentKind::Drift, AgentKind::Tax, AgentKind::Coordinator]
        );
        assert!(decision.context_additions.contains_key("urgency_reason"));
    }

    #[tokio::test]
    async fn test_significant_move_with_high_exposure() {
        let repo = repo_with(vec![
            holding("NVDA", "Technology", 0.15, 0.0),
            holding("MSFT", "Technology", 0.10, 0.0),
        ])
        .await;
        let router = PersonaRouter::new(repo);
        let decision = router
            .route(&market_event(-0.06, &["Technology"]), "portfolio_a")
            .await;

        assert_eq!(decision.priority, RoutingPriority::High);
        assert!(decision.requires_coordinator());
    }

    #[tokio::test]
    async fn test_small_move_low_exposure_is_low() {
        let repo = repo_with(vec![holding("XOM", "Energy", 0.05, 0.0)]).await;
        let router = PersonaRouter::new(repo);
        let decision = router
            .route(&market_event(-0.03, &["Technology"]), "portfolio_a")
            .await;

        assert_eq!(decision.priority, RoutingPriority::Low);
        assert_eq!(decision.agents_required, vec![AgentKind::Drift]);
        assert!(!decision.requires_coordinator());
    }

    #[tokio::test]
    async fn test_clean_heartbeat_skips() {
        // Ten positions at 10% matching the target exactly, no losses over
        // the threshold
        let tickers = ["AAPL", "MSFT", "NVDA", "JNJ", "PG", "XOM", "JPM", "V", "KO", "PEP"];
        let holdings: Vec<Holding> = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let sector = if i % 2 == 0 { "Technology" } else { "Healthcare" };
                holding(t, sector, 0.10, if i == 1 { -10_000.0 } else { 0.0 })
            })
            .collect();
        let repo = repo_with(holdings).await;
        let router = PersonaRouter::new(repo);
        let event = InputEvent::heartbeat("advisor:main", vec!["portfolio_a".to_string()]);
        let decision = router.route(&event, "portfolio_a").await;

        assert!(!decision.should_process);
        assert_eq!(decision.priority, RoutingPriority::Skip);
        assert!(decision.reasoning.contains("No issues"));
    }

    #[tokio::test]
    async fn test_heartbeat_concentration_and_losses() {
        let repo = repo_with(vec![
            holding("NVDA", "Technology", 0.27, 0.0),
            holding("MSFT", "Technology", 0.10, -80_000.0),
        ])
        .await;
        let router = PersonaRouter::new(repo);
        let event = InputEvent::heartbeat("advisor:main", vec!["portfolio_a".to_string()]);
        let decision = router.route(&event, "portfolio_a").await;

        assert!(decision.should_process);
        assert_eq!(decision.priority, RoutingPriority::High);
        assert!(decision.agents_required.contains(&AgentKind::Drift));
        assert!(decision.agents_required.contains(&AgentKind::Tax));
        assert!(decision.agents_required.contains(&AgentKind::Coordinator));
        assert_eq!(decision.context_additions["concentration_alert"], true);
        assert_eq!(
            decision.context_additions["tax_harvest_opportunity"],
            80_000.0
        );
    }

    #[tokio::test]
    async fn test_webhook_routing() {
        let repo = repo_with(vec![holding("NVDA", "Technology", 0.10, 0.0)]).await;
        let router = PersonaRouter::new(repo);

        let mut payload = Map::new();
        payload.insert("type".to_string(), json!("trade_execution"));
        payload.insert("trade".to_string(), json!({"ticker": "NVDA"}));
        let event = InputEvent::webhook("advisor:main", "broker", payload);
        let decision = router.route(&event, "portfolio_a").await;
        assert_eq!(decision.priority, RoutingPriority::High);
        assert_eq!(decision.agents_required, vec![AgentKind::Tax]);

        let mut payload = Map::new();
        payload.insert("type".to_string(), json!("news_alert"));
        payload.insert("tickers".to_string(), json!(["NVDA", "TSLA"]));
        let event = InputEvent::webhook("advisor:main", "news", payload);
        let decision = router.route(&event, "portfolio_a").await;
        assert!(decision.should_process);
        assert_eq!(decision.context_additions["affected_holdings"], json!(["NVDA"]));

        let mut payload = Map::new();
        payload.insert("type".to_string(), json!("earnings_call"));
        let event = InputEvent::webhook("advisor:main", "ir", payload);
        let decision = router.route(&event, "portfolio_a").await;
        assert!(!decision.should_process);
        assert!(decision.reasoning.contains("Unhandled webhook type"));
    }

    #[tokio::test]
    async fn test_cron_routing() {
        let repo = repo_with(vec![holding("NVDA", "Technology", 0.10, 0.0)]).await;
        let router = PersonaRouter::new(repo);

        let event = InputEvent::cron_job("system", CronJobType::DailyReview, "daily");
        let decision = router.route(&event, "portfolio_a").await;
        assert!(decision.should_process);
        assert_eq!(decision.priority, RoutingPriority::Normal);
        assert_eq!(
            decision.agents_required,
            vec![AgentKind::Drift, AgentKind::Tax, AgentKind::Coordinator]
        );

        let event = InputEvent::cron_job("system", CronJobType::EodTax, "eod");
        let decision = router.route(&event, "portfolio_a").await;
        assert_eq!(decision.agents_required, vec![AgentKind::Tax]);

        let event = InputEvent::cron_job("system", CronJobType::QuarterlyRebalance, "q");
        let decision = router.route(&event, "portfolio_a").await;
        assert_eq!(decision.priority, RoutingPriority::High);
    }
}
