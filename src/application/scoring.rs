use crate::domain::portfolio::Portfolio;
use crate::domain::scenario::Scenario;
use crate::domain::scoring::{RawScores, UtilityScore, UtilityWeights};
use crate::domain::types::{RiskProfile, TradeAction};
use tracing::{debug, info};

/// Tunable thresholds for the dimension scorers.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    // Risk thresholds
    pub concentration_limit: f64,
    pub max_sector_weight: f64,

    // Tax parameters
    pub wash_sale_penalty: f64,
    pub harvest_bonus: f64,

    // Cost parameters
    pub commission_rate: f64,
    pub spread_rate: f64,
    pub min_cost_threshold: f64,

    // Urgency parameters
    pub critical_urgency_threshold: f64,
    pub high_urgency_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            concentration_limit: 0.15,
            max_sector_weight: 0.30,
            wash_sale_penalty: 2.0,
            harvest_bonus: 1.5,
            commission_rate: 0.001,
            spread_rate: 0.0005,
            min_cost_threshold: 100.0,
            critical_urgency_threshold: 8.0,
            high_urgency_threshold: 6.0,
        }
    }
}

const BASELINE: f64 = 5.0;

fn clamp(score: f64) -> f64 {
    score.clamp(0.0, 10.0)
}

/// Risk reduction (0–10): rewards bringing concentration back under the limit
pub fn score_risk_reduction(
    scenario: &Scenario,
    _portfolio: &Portfolio,
    config: &ScoringConfig,
) -> f64 {
    let mut score = BASELINE;

    let concentration_before = scenario.outcome_f64("concentration_before", 0.0);
    let concentration_after = scenario.outcome_f64("concentration_after", 0.0);

    if concentration_before > config.concentration_limit {
        let reduction = concentration_before - concentration_after;
        if concentration_after <= config.concentration_limit {
            score += 3.0;
        } else {
            score += (reduction * 20.0).min(2.0);
        }
    }

    score += (scenario.outcome_f64("diversification_delta", 0.0) * 10.0).min(1.0);

    let risk_count = scenario.risks.len() as f64;
    if risk_count > 0.0 {
        score -= (risk_count * 0.5).min(2.0);
    }

    score += (scenario.outcome_f64("sector_improvement", 0.0) * 5.0).min(1.0);

    clamp(score)
}

/// Tax savings (0–10): negative expected tax impact scores above baseline
pub fn score_tax_savings(
    scenario: &Scenario,
    _portfolio: &Portfolio,
    config: &ScoringConfig,
) -> f64 {
    let mut score = BASELINE;

    let tax_impact = scenario.outcome_f64("tax_impact", 0.0);
    if tax_impact < 0.0 {
        score += (tax_impact.abs() / 5_000.0).min(3.0);
    } else {
        score -= (tax_impact / 5_000.0).min(3.0);
    }

    score -= scenario.outcome_f64("wash_sale_violations", 0.0) * config.wash_sale_penalty;
    score += scenario.outcome_f64("harvest_opportunities_captured", 0.0) * config.harvest_bonus;

    let lt_gains = scenario.outcome_f64("long_term_gains", 0.0);
    let st_gains = scenario.outcome_f64("short_term_gains", 0.0);
    if lt_gains > 0.0 && st_gains > 0.0 {
        let lt_ratio = lt_gains / (lt_gains + st_gains);
        score += (lt_ratio - 0.5) * 2.0;
    }

    clamp(score)
}

/// Goal alignment (0–10): drift correction plus profile-specific preferences
pub fn score_goal_alignment(
    scenario: &Scenario,
    portfolio: &Portfolio,
    _config: &ScoringConfig,
) -> f64 {
    let mut score = BASELINE;
    let profile = portfolio.client_profile.risk_tolerance;

    let drift_before = scenario.outcome_f64("drift_before", 0.0);
    let drift_after = scenario.outcome_f64("drift_after", 0.0);
    if drift_before > 0.0 {
        let reduction_ratio = (drift_before - drift_after) / drift_before;
        score += (reduction_ratio * 2.5).min(2.5);
    }

    score += (scenario.outcome_f64("target_alignment", 0.5) - 0.5) * 4.0;

    let risk_alignment = scenario.outcome_f64("risk_profile_alignment", 0.5);
    if profile == RiskProfile::Conservative {
        score += (risk_alignment - 0.5) * 3.0;
    } else {
        score += (risk_alignment - 0.5) * 2.0;
    }

    match profile {
        RiskProfile::Conservative => {
            score += scenario.outcome_f64("income_alignment", 0.0) * 0.5;
        }
        RiskProfile::Aggressive => {
            score += scenario.outcome_f64("growth_alignment", 0.0) * 0.5;
        }
        RiskProfile::ModerateGrowth => {}
    }

    clamp(score)
}

/// Transaction cost (0–10): 10 below the cost floor, log-scaled above it
pub fn score_transaction_cost(
    scenario: &Scenario,
    portfolio: &Portfolio,
    config: &ScoringConfig,
) -> f64 {
    let mut notional = 0.0;
    for step in &scenario.action_steps {
        if matches!(step.action, TradeAction::Buy | TradeAction::Sell) {
            let price = portfolio
                .holding(&step.ticker)
                .map(|h| h.current_price)
                .unwrap_or(0.0);
            notional += step.quantity * price;
        }
    }

    let mut total_cost = notional * config.commission_rate + notional * config.spread_rate;
    total_cost += scenario.outcome_f64("transaction_costs", 0.0);

    if total_cost <= config.min_cost_threshold {
        return 10.0;
    }
    let score = 10.0 - (total_cost / config.min_cost_threshold).max(1.0).log10() * 2.5;
    clamp(score)
}

/// Urgency (0–10): plans that meet urgent issues head-on score highest
pub fn score_urgency(
    scenario: &Scenario,
    _portfolio: &Portfolio,
    config: &ScoringConfig,
) -> f64 {
    let scenario_urgency = scenario.outcome_f64("urgency_level", 5.0);
    let addresses_urgent = scenario.outcome_bool("addresses_urgent_issues");
    let issue_urgency = scenario.outcome_f64("issue_urgency", 5.0);

    if addresses_urgent && issue_urgency >= config.critical_urgency_threshold {
        return clamp((6.0 + issue_urgency * 0.4).min(10.0));
    }
    if addresses_urgent && issue_urgency >= config.high_urgency_threshold {
        return clamp((5.0 + issue_urgency * 0.3).min(10.0));
    }
    if scenario_urgency >= config.high_urgency_threshold {
        return clamp(7.0 + (scenario_urgency - config.high_urgency_threshold) * 0.5);
    }
    clamp(5.0 + (scenario_urgency - 5.0) * 0.2)
}

/// Five-dimensional weighted utility scoring and ranking.
#[derive(Debug, Default)]
pub struct UtilityEngine {
    config: ScoringConfig,
}

impl UtilityEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score_scenario(
        &self,
        scenario: &Scenario,
        portfolio: &Portfolio,
        weights: &UtilityWeights,
    ) -> UtilityScore {
        let raw = RawScores {
            risk_reduction: score_risk_reduction(scenario, portfolio, &self.config),
            tax_savings: score_tax_savings(scenario, portfolio, &self.config),
            goal_alignment: score_goal_alignment(scenario, portfolio, &self.config),
            transaction_cost: score_transaction_cost(scenario, portfolio, &self.config),
            urgency: score_urgency(scenario, portfolio, &self.config),
        };

        debug!(
            "UtilityEngine [{}]: risk={:.1} tax={:.1} goal={:.1} cost={:.1} urgency={:.1}",
            scenario.scenario_id,
            raw.risk_reduction,
            raw.tax_savings,
            raw.goal_alignment,
            raw.transaction_cost,
            raw.urgency
        );

        UtilityScore::from_raw(scenario.scenario_id.clone(), raw, weights)
    }

    /// Score all scenarios and rank them by total score descending.
    ///
    /// The sort is stable: equal totals keep their input order, so ranks are
    /// deterministic for identical scenarios.
    pub fn rank_scenarios(
        &self,
        scenarios: &[Scenario],
        portfolio: &Portfolio,
        weights: &UtilityWeights,
    ) -> Vec<UtilityScore> {
        if scenarios.is_empty() {
            return Vec::new();
        }

        let mut scores: Vec<UtilityScore> = scenarios
            .iter()
            .map(|s| self.score_scenario(s, portfolio, weights))
            .collect();

        scores.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (i, score) in scores.iter_mut().enumerate() {
            score.rank = (i + 1) as u32;
        }

        info!(
            "UtilityEngine: ranked {} scenarios, top {} ({:.1}/100)",
            scores.len(),
            scores[0].scenario_id,
            scores[0].total_score
        );

        scores
    }
}
