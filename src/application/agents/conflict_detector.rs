use crate::domain::analysis::{DriftReport, TaxReport};
use crate::domain::events::short_hex;
use crate::domain::portfolio::Portfolio;
use crate::domain::scenario::{Conflict, ConflictKind};
use crate::domain::types::{AgentKind, TradeAction};
use std::collections::{HashMap, HashSet};

/// Tax impact above which a non-urgent sell is flagged as tax-inefficient
const TAX_IMPACT_CONFLICT_THRESHOLD: f64 = 50_000.0;
const URGENCY_OVERRIDE: u8 = 7;

/// Detects conflicts between drift and tax findings.
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn detect(
        drift: &DriftReport,
        tax: &TaxReport,
        _portfolio: &Portfolio,
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let drift_trades: HashMap<&str, _> = drift
            .recommended_trades
            .iter()
            .map(|t| (t.ticker.as_str(), t))
            .collect();

        // Wash sale: drift wants to buy what tax says is inside the window
        for violation in &tax.wash_sale_violations {
            if let Some(trade) = drift_trades.get(violation.ticker.as_str()) {
                if trade.action == TradeAction::Buy {
                    conflicts.push(Conflict {
                        conflict_id: conflict_id(),
                        kind: ConflictKind::WashSaleConflict,
                        agents_involved: vec![AgentKind::Drift, AgentKind::Tax],
                        description: format!(
                            "Drift analysis recommends buying {}, but a wash sale risk \
                             was detected ({} days until clear)",
                            violation.ticker,
                            violation.days_until_clear()
                        ),
                        resolution_options: vec![
                            format!(
                                "Wait {} days before purchasing {}",
                                violation.days_until_clear(),
                                violation.ticker
                            ),
                            format!(
                                "Purchase substitute security instead of {}",
                                violation.ticker
                            ),
                            "Proceed anyway (loss will be disallowed)".to_string(),
                        ],
                    });
                }
            }
        }

        // Tax-inefficient: costly sell with urgency below the override bar
        for analysis in &tax.proposed_trades_analysis {
            if analysis.tax_impact <= TAX_IMPACT_CONFLICT_THRESHOLD {
                continue;
            }
            if let Some(trade) = drift_trades.get(analysis.ticker.as_str()) {
                if trade.action == TradeAction::Sell && trade.urgency < URGENCY_OVERRIDE {
                    conflicts.push(Conflict {
                        conflict_id: conflict_id(),
                        kind: ConflictKind::TaxInefficient,
                        agents_involved: vec![AgentKind::Drift, AgentKind::Tax],
                        description: format!(
                            "Selling {} would generate ${:.0} in taxes. Drift urgency is {}/10.",
                            analysis.ticker, analysis.tax_impact, trade.urgency
                        ),
                        resolution_options: vec![
                            "Proceed with sale (urgency may justify tax cost)".to_string(),
                            "Delay sale to harvest losses elsewhere first".to_string(),
                            "Sell only partial position to reduce tax impact".to_string(),
                        ],
                    });
                }
            }
        }

        // Contradictory actions within the drift recommendations themselves
        let buys: HashSet<&str> = drift
            .recommended_trades
            .iter()
            .filter(|t| t.action == TradeAction::Buy)
            .map(|t| t.ticker.as_str())
            .collect();
        let sells: HashSet<&str> = drift
            .recommended_trades
            .iter()
            .filter(|t| t.action == TradeAction::Sell)
            .map(|t| t.ticker.as_str())
            .collect();

        let mut contradictions: Vec<&&str> = buys.intersection(&sells).collect();
        contradictions.sort();
        for ticker in contradictions {
            conflicts.push(Conflict {
                conflict_id: conflict_id(),
                kind: ConflictKind::ContradictoryActions,
                agents_involved: vec![AgentKind::Drift],
                description: format!("Both BUY and SELL recommended for {ticker}"),
                resolution_options: vec![
                    format!("Review position size targets for {ticker}"),
                    "Execute net action only".to_string(),
                    "Skip this security".to_string(),
                ],
            });
        }

        conflicts
    }
}

fn conflict_id() -> String {
    format!("conflict_{}", short_hex(8))
}
