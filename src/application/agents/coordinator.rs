use crate::application::agents::conflict_detector::ConflictDetector;
use crate::application::agents::drift::DriftAnalyzer;
use crate::application::agents::scenario_generator::ScenarioGenerator;
use crate::application::agents::tax::TaxAnalyzer;
use crate::application::agents::AnalysisContext;
use crate::application::scoring::{ScoringConfig, UtilityEngine};
use crate::domain::portfolio::{Portfolio, Transaction};
use crate::domain::scenario::AnalysisReport;
use crate::domain::scoring::UtilityWeights;
use crate::infrastructure::audit::{BlockData, SharedChain};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Orchestrates the analysis pipeline for one portfolio snapshot:
/// drift → tax → conflict detection → scenario synthesis → utility ranking.
///
/// The tax pass consumes the drift pass's proposed trades, so the two run
/// sequentially. One `agent_completed` block is written per invocation.
pub struct Coordinator {
    chain: Option<SharedChain>,
    utility: UtilityEngine,
}

impl Coordinator {
    pub fn new(chain: Option<SharedChain>) -> Self {
        Self::with_scoring(chain, ScoringConfig::default())
    }

    pub fn with_scoring(chain: Option<SharedChain>, scoring: ScoringConfig) -> Self {
        Self {
            chain,
            utility: UtilityEngine::new(scoring),
        }
    }

    pub fn execute(
        &self,
        portfolio: &Portfolio,
        transactions: &[Transaction],
        trigger_event: &str,
        session_id: &str,
        ctx: &AnalysisContext,
    ) -> Result<AnalysisReport> {
        info!(
            "Coordinator [{}]: starting analysis (trigger: {})",
            portfolio.portfolio_id, trigger_event
        );

        let drift = DriftAnalyzer::analyze(portfolio, ctx);
        let tax = TaxAnalyzer::analyze(portfolio, transactions, &drift.recommended_trades, ctx);

        let conflicts = ConflictDetector::detect(&drift, &tax, portfolio);
        info!(
            "Coordinator [{}]: detected {} conflict(s)",
            portfolio.portfolio_id,
            conflicts.len()
        );

        let mut scenarios = ScenarioGenerator::generate(&drift, &tax, &conflicts, portfolio);

        let weights = UtilityWeights::for_profile(portfolio.client_profile.risk_tolerance);
        let ranked = self.utility.rank_scenarios(&scenarios, portfolio, &weights);

        // Attach each score to its scenario, then order by score
        for scenario in &mut scenarios {
            scenario.utility_score = ranked
                .iter()
                .find(|s| s.scenario_id == scenario.scenario_id)
                .cloned();
        }
        scenarios.sort_by(|a, b| {
            let score_a = a.utility_score.as_ref().map(|s| s.total_score).unwrap_or(0.0);
            let score_b = b.utility_score.as_ref().map(|s| s.total_score).unwrap_or(0.0);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let recommended_scenario_id = scenarios
            .first()
            .map(|s| s.scenario_id.clone())
            .context("scenario generation produced no scenarios")?;

        let merkle_hash = self.log_completion(
            portfolio,
            session_id,
            conflicts.len(),
            scenarios.len(),
            &recommended_scenario_id,
        );

        Ok(AnalysisReport {
            portfolio_id: portfolio.portfolio_id.clone(),
            trigger_event: trigger_event.to_string(),
            analysis_timestamp: ctx.now,
            drift_findings: drift,
            tax_findings: tax,
            conflicts_detected: conflicts,
            scenarios,
            recommended_scenario_id,
            merkle_hash,
        })
    }

    fn log_completion(
        &self,
        portfolio: &Portfolio,
        session_id: &str,
        conflict_count: usize,
        scenario_count: usize,
        recommended_id: &str,
    ) -> String {
        let Some(chain) = &self.chain else {
            return String::new();
        };
        let data = BlockData::new("agent_completed")
            .session(session_id)
            .actor("coordinator")
            .action("analysis_complete")
            .resource(&portfolio.portfolio_id)
            .field("conflicts_detected", conflict_count)
            .field("scenarios_generated", scenario_count)
            .field("recommended_scenario", recommended_id);

        match chain.append(data) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(
                    "Coordinator [{}]: audit append failed: {}",
                    portfolio.portfolio_id, e
                );
                String::new()
            }
        }
    }
}
