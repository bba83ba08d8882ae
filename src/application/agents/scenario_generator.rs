use crate::application::agents::tax::format_usd;
use crate::domain::analysis::{DriftReport, TaxReport};
use crate::domain::events::short_hex;
use crate::domain::portfolio::Portfolio;
use crate::domain::scenario::{ActionStep, Conflict, Scenario};
use crate::domain::types::{TaxOpportunityType, TradeAction};
use serde_json::{json, Map};
use std::collections::HashSet;

// Estimated residual drift after executing each plan, as a fraction of the
// drift going in. Design constants, not derived quantities.
const OPTIMAL_DRIFT_RETENTION: f64 = 0.5;
const TAX_EFFICIENT_DRIFT_RETENTION: f64 = 0.8;
const GRADUAL_DRIFT_RETENTION: f64 = 0.3;
const RISK_FIRST_RESIDUAL_DRIFT: f64 = 0.02;

const TAX_EFFICIENT_CONCENTRATION_RETENTION: f64 = 0.9;
const GRADUAL_CONCENTRATION_RETENTION: f64 = 0.7;
const GRADUAL_TAX_RETENTION: f64 = 0.7;

const URGENT_THRESHOLD: u8 = 7;
const RISK_FIRST_URGENCY: u8 = 6;

const GRADUAL_TIMINGS: [&str; 4] = [
    "immediate",
    "within 1 week",
    "within 2 weeks",
    "within 1 month",
];

/// Synthesizes 2–4 candidate remediation scenarios from agent findings.
///
/// Optimal Balance and Tax Efficient are always produced; Risk First needs a
/// concentration risk and Gradual Rebalance needs more than two trades.
pub struct ScenarioGenerator;

impl ScenarioGenerator {
    pub fn generate(
        drift: &DriftReport,
        tax: &TaxReport,
        _conflicts: &[Conflict],
        portfolio: &Portfolio,
    ) -> Vec<Scenario> {
        let mut scenarios = vec![
            optimal_scenario(drift, tax),
            tax_efficient_scenario(drift, tax, portfolio),
        ];
        if !drift.concentration_risks.is_empty() {
            scenarios.push(risk_first_scenario(drift, tax));
        }
        if drift.recommended_trades.len() > 2 {
            scenarios.push(gradual_scenario(drift, tax));
        }
        scenarios
    }
}

fn optimal_scenario(drift: &DriftReport, tax: &TaxReport) -> Scenario {
    let wash_sale_tickers: HashSet<&str> = tax
        .wash_sale_violations
        .iter()
        .map(|v| v.ticker.as_str())
        .collect();

    let mut action_steps = Vec::new();
    let mut step_number = 1;
    for trade in &drift.recommended_trades {
        // Never buy back into an open wash sale window
        if trade.action == TradeAction::Buy && wash_sale_tickers.contains(trade.ticker.as_str()) {
            continue;
        }
        action_steps.push(ActionStep {
            step_number,
            action: trade.action,
            ticker: trade.ticker.clone(),
            quantity: trade.quantity,
            timing: if trade.urgency >= URGENT_THRESHOLD {
                "immediate".to_string()
            } else {
                "within 1 week".to_string()
            },
            rationale: trade.rationale.clone(),
        });
        step_number += 1;
    }

    let total_tax: f64 = tax.proposed_trades_analysis.iter().map(|a| a.tax_impact).sum();
    let concentration_before = max_risk_weight(drift);
    let concentration_after = drift
        .concentration_risks
        .iter()
        .map(|r| r.limit)
        .fold(None, |acc: Option<f64>, l| {
            Some(acc.map_or(l, |a| a.min(l)))
        })
        .unwrap_or(concentration_before);
    let drift_before = drift.total_abs_drift();

    let mut outcomes = Map::new();
    outcomes.insert("concentration_before".into(), json!(concentration_before));
    outcomes.insert("concentration_after".into(), json!(concentration_after));
    outcomes.insert("tax_impact".into(), json!(total_tax));
    outcomes.insert("wash_sale_violations".into(), json!(0));
    outcomes.insert("drift_before".into(), json!(drift_before));
    outcomes.insert(
        "drift_after".into(),
        json!(drift_before * OPTIMAL_DRIFT_RETENTION),
    );
    outcomes.insert("urgency_level".into(), json!(drift.urgency_score));
    outcomes.insert(
        "addresses_urgent_issues".into(),
        json!(drift.urgency_score >= URGENT_THRESHOLD),
    );
    outcomes.insert("issue_urgency".into(), json!(drift.urgency_score));

    let mut risks = Vec::new();
    if total_tax > 0.0 {
        risks.push(format!("Tax impact of ${}", format_usd(total_tax)));
    }
    risks.push("Market timing risk on delayed trades".to_string());

    Scenario {
        scenario_id: format!("scenario_optimal_{}", short_hex(8)),
        title: "Optimal Balance".to_string(),
        description: "Addresses concentration risks while avoiding wash sales. \
                      Balances risk reduction with tax efficiency."
            .to_string(),
        action_steps,
        expected_outcomes: outcomes,
        risks,
        utility_score: None,
    }
}

fn tax_efficient_scenario(
    drift: &DriftReport,
    tax: &TaxReport,
    portfolio: &Portfolio,
) -> Scenario {
    let mut action_steps = Vec::new();
    let mut step_number = 1;

    // Harvest every loss first, selling the whole position
    for opportunity in &tax.tax_opportunities {
        if opportunity.opportunity_type != TaxOpportunityType::HarvestLoss {
            continue;
        }
        let Some(holding) = portfolio.holding(&opportunity.ticker) else {
            continue;
        };
        action_steps.push(ActionStep {
            step_number,
            action: TradeAction::Sell,
            ticker: opportunity.ticker.clone(),
            quantity: holding.quantity,
            timing: "immediate".to_string(),
            rationale: format!(
                "Harvest ${} tax benefit",
                format_usd(opportunity.estimated_benefit)
            ),
        });
        step_number += 1;
    }

    // Then only the drift trades urgent enough to justify the tax cost
    let mut urgent: Vec<_> = drift
        .recommended_trades
        .iter()
        .filter(|t| t.urgency >= URGENT_THRESHOLD)
        .collect();
    urgent.sort_by(|a, b| b.urgency.cmp(&a.urgency));
    for trade in urgent {
        action_steps.push(ActionStep {
            step_number,
            action: trade.action,
            ticker: trade.ticker.clone(),
            quantity: trade.quantity,
            timing: "immediate".to_string(),
            rationale: format!("[URGENT] {}", trade.rationale),
        });
        step_number += 1;
    }

    let harvest_savings: f64 = tax.tax_opportunities.iter().map(|o| o.estimated_benefit).sum();
    let concentration_before = max_risk_weight(drift);
    let drift_before = drift.total_abs_drift();

    let mut outcomes = Map::new();
    outcomes.insert("concentration_before".into(), json!(concentration_before));
    outcomes.insert(
        "concentration_after".into(),
        json!(concentration_before * TAX_EFFICIENT_CONCENTRATION_RETENTION),
    );
    // Negative tax impact means savings
    outcomes.insert("tax_impact".into(), json!(-harvest_savings));
    outcomes.insert(
        "harvest_opportunities_captured".into(),
        json!(tax.tax_opportunities.len()),
    );
    outcomes.insert("wash_sale_violations".into(), json!(0));
    outcomes.insert("drift_before".into(), json!(drift_before));
    outcomes.insert(
        "drift_after".into(),
        json!(drift_before * TAX_EFFICIENT_DRIFT_RETENTION),
    );
    outcomes.insert("urgency_level".into(), json!(6));

    Scenario {
        scenario_id: format!("scenario_tax_{}", short_hex(8)),
        title: "Tax Efficient".to_string(),
        description: "Prioritizes tax-loss harvesting and minimizes tax impact. \
                      Only executes urgent risk actions."
            .to_string(),
        action_steps,
        expected_outcomes: outcomes,
        risks: vec![
            "May not fully address concentration risk".to_string(),
            "Drift may worsen if market moves against positions".to_string(),
        ],
        utility_score: None,
    }
}

fn risk_first_scenario(drift: &DriftReport, tax: &TaxReport) -> Scenario {
    let risk_tickers: HashSet<&str> = drift
        .concentration_risks
        .iter()
        .map(|r| r.ticker.as_str())
        .collect();

    let mut action_steps = Vec::new();
    let mut step_number = 1;
    for trade in &drift.recommended_trades {
        let addresses_concentration = risk_tickers.contains(trade.ticker.as_str());
        if !addresses_concentration && trade.urgency < RISK_FIRST_URGENCY {
            continue;
        }
        action_steps.push(ActionStep {
            step_number,
            action: trade.action,
            ticker: trade.ticker.clone(),
            quantity: trade.quantity,
            timing: "immediate".to_string(),
            rationale: format!("[RISK PRIORITY] {}", trade.rationale),
        });
        step_number += 1;
    }

    let total_tax = tax.total_tax_impact;
    let concentration_before = max_risk_weight(drift);
    let concentration_after = drift
        .concentration_risks
        .iter()
        .map(|r| r.limit)
        .fold(None, |acc: Option<f64>, l| {
            Some(acc.map_or(l, |a| a.min(l)))
        })
        .unwrap_or(0.15);
    let drift_before = drift.total_abs_drift();

    let mut outcomes = Map::new();
    outcomes.insert("concentration_before".into(), json!(concentration_before));
    outcomes.insert("concentration_after".into(), json!(concentration_after));
    outcomes.insert("tax_impact".into(), json!(total_tax));
    outcomes.insert(
        "wash_sale_violations".into(),
        json!(tax.wash_sale_violations.len()),
    );
    outcomes.insert("drift_before".into(), json!(drift_before));
    outcomes.insert("drift_after".into(), json!(RISK_FIRST_RESIDUAL_DRIFT));
    outcomes.insert("urgency_level".into(), json!(9));
    outcomes.insert("addresses_urgent_issues".into(), json!(true));
    outcomes.insert("issue_urgency".into(), json!(drift.urgency_score));

    Scenario {
        scenario_id: format!("scenario_risk_{}", short_hex(8)),
        title: "Risk First".to_string(),
        description: "Immediately addresses all concentration risks. \
                      Accepts higher tax cost for faster risk reduction."
            .to_string(),
        action_steps,
        expected_outcomes: outcomes,
        risks: vec![
            format!("Significant tax impact of ${}", format_usd(total_tax)),
            "May trigger wash sale if not careful with timing".to_string(),
        ],
        utility_score: None,
    }
}

fn gradual_scenario(drift: &DriftReport, tax: &TaxReport) -> Scenario {
    let mut sorted_trades: Vec<_> = drift.recommended_trades.iter().collect();
    sorted_trades.sort_by(|a, b| b.urgency.cmp(&a.urgency));

    let mut action_steps = Vec::new();
    for (i, trade) in sorted_trades.iter().enumerate() {
        let timing = GRADUAL_TIMINGS[i.min(GRADUAL_TIMINGS.len() - 1)];
        // Only the first (most urgent) trade runs at full size
        let quantity = if i > 0 { trade.quantity * 0.5 } else { trade.quantity };

        action_steps.push(ActionStep {
            step_number: (i + 1) as u32,
            action: trade.action,
            ticker: trade.ticker.clone(),
            quantity,
            timing: timing.to_string(),
            rationale: format!("[PHASE {}] {}", i + 1, trade.rationale),
        });
    }

    let concentration_before = max_risk_weight(drift);
    let drift_before = drift.total_abs_drift();

    let mut outcomes = Map::new();
    outcomes.insert("concentration_before".into(), json!(concentration_before));
    outcomes.insert(
        "concentration_after".into(),
        json!(concentration_before * GRADUAL_CONCENTRATION_RETENTION),
    );
    outcomes.insert(
        "tax_impact".into(),
        json!(tax.total_tax_impact * GRADUAL_TAX_RETENTION),
    );
    outcomes.insert("wash_sale_violations".into(), json!(0));
    outcomes.insert("drift_before".into(), json!(drift_before));
    outcomes.insert(
        "drift_after".into(),
        json!(drift_before * GRADUAL_DRIFT_RETENTION),
    );
    outcomes.insert("urgency_level".into(), json!(5));

    Scenario {
        scenario_id: format!("scenario_gradual_{}", short_hex(8)),
        title: "Gradual Rebalance".to_string(),
        description: "Phased approach over 4 weeks. Reduces market impact \
                      and allows for tax planning between phases."
            .to_string(),
        action_steps,
        expected_outcomes: outcomes,
        risks: vec![
            "Market may move unfavorably during phased execution".to_string(),
            "Requires monitoring between phases".to_string(),
            "May not address urgent issues fast enough".to_string(),
        ],
        utility_score: None,
    }
}

fn max_risk_weight(drift: &DriftReport) -> f64 {
    drift
        .concentration_risks
        .iter()
        .map(|r| r.current_weight)
        .fold(0.0, f64::max)
}
