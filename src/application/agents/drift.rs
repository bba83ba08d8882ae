use crate::application::agents::AnalysisContext;
use crate::domain::analysis::{ConcentrationRisk, DriftMetric, DriftReport, RecommendedTrade};
use crate::domain::portfolio::{self, Portfolio};
use crate::domain::types::{DriftDirection, Severity, TradeAction};
use tracing::debug;

// Severity bands for excess over the concentration limit
const MEDIUM_EXCESS: f64 = 0.02;
const HIGH_EXCESS: f64 = 0.05;
const CRITICAL_EXCESS: f64 = 0.10;

// Drift beyond this fraction flags the portfolio as drifted
const DRIFT_DETECTION_THRESHOLD: f64 = 0.02;
const SIGNIFICANT_DRIFT: f64 = 0.05;

const BASELINE_URGENCY: u8 = 3;

/// Rule-based drift and concentration analyzer.
///
/// Pure: identical portfolio snapshot and context produce identical output.
pub struct DriftAnalyzer;

impl DriftAnalyzer {
    pub fn analyze(portfolio: &Portfolio, ctx: &AnalysisContext) -> DriftReport {
        let limit = portfolio.client_profile.concentration_limit;

        // Positions over the client's concentration limit
        let mut concentration_risks = Vec::new();
        for holding in &portfolio.holdings {
            if holding.portfolio_weight > limit {
                let excess = holding.portfolio_weight - limit;
                concentration_risks.push(ConcentrationRisk {
                    ticker: holding.ticker.clone(),
                    current_weight: holding.portfolio_weight,
                    limit,
                    excess,
                    severity: severity_for_excess(excess),
                });
            }
        }

        // Per-asset-class drift from target allocation
        let current_weights = portfolio::asset_class_weights(portfolio);
        let mut drift_metrics = Vec::new();
        for (asset_class, drift_value) in portfolio::allocation_drift(portfolio) {
            let target_weight = portfolio.target_allocation.weight_for(&asset_class);
            let current_weight = current_weights.get(&asset_class).copied().unwrap_or(0.0);
            drift_metrics.push(DriftMetric {
                asset_class,
                target_weight,
                current_weight,
                drift_pct: drift_value.abs(),
                drift_direction: if drift_value > 0.0 {
                    DriftDirection::Over
                } else {
                    DriftDirection::Under
                },
            });
        }

        // Reduce-to-limit trades for each concentration risk
        let mut recommended_trades = Vec::new();
        for risk in &concentration_risks {
            let Some(holding) = portfolio.holding(&risk.ticker) else {
                continue;
            };
            let excess_value = (risk.current_weight - risk.limit) * portfolio.aum_usd;
            let shares_to_sell = (excess_value / holding.current_price).floor();

            if shares_to_sell > 0.0 {
                recommended_trades.push(RecommendedTrade {
                    ticker: risk.ticker.clone(),
                    action: TradeAction::Sell,
                    quantity: shares_to_sell,
                    rationale: format!(
                        "Reduce {} from {:.1}% to {:.1}% limit",
                        risk.ticker,
                        risk.current_weight * 100.0,
                        risk.limit * 100.0
                    ),
                    urgency: urgency_for_severity(risk.severity),
                    estimated_tax_impact: 0.0,
                });
            }
        }

        let urgency_score = concentration_risks
            .iter()
            .map(|r| urgency_for_severity(r.severity))
            .max()
            .unwrap_or(BASELINE_URGENCY);

        let drift_detected = !concentration_risks.is_empty()
            || drift_metrics
                .iter()
                .any(|m| m.drift_pct.abs() > DRIFT_DETECTION_THRESHOLD);

        let reasoning = build_reasoning(&concentration_risks, &drift_metrics, limit);

        debug!(
            "DriftAnalyzer [{}]: {} concentration risks, urgency {}",
            portfolio.portfolio_id,
            concentration_risks.len(),
            urgency_score
        );

        DriftReport {
            portfolio_id: portfolio.portfolio_id.clone(),
            analysis_timestamp: ctx.now,
            drift_detected,
            concentration_risks,
            drift_metrics,
            recommended_trades,
            urgency_score,
            reasoning,
        }
    }
}

fn severity_for_excess(excess: f64) -> Severity {
    if excess > CRITICAL_EXCESS {
        Severity::Critical
    } else if excess > HIGH_EXCESS {
        Severity::High
    } else if excess > MEDIUM_EXCESS {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn urgency_for_severity(severity: Severity) -> u8 {
    match severity {
        Severity::Low => 3,
        Severity::Medium => 5,
        Severity::High => 7,
        Severity::Critical => 9,
    }
}

fn build_reasoning(
    risks: &[ConcentrationRisk],
    metrics: &[DriftMetric],
    limit: f64,
) -> String {
    let mut parts = Vec::new();

    if !risks.is_empty() {
        let tickers: Vec<&str> = risks.iter().map(|r| r.ticker.as_str()).collect();
        parts.push(format!(
            "Concentration risks detected in: {}. These positions exceed the {:.0}% limit.",
            tickers.join(", "),
            limit * 100.0
        ));
    }
    if metrics.iter().any(|m| m.drift_pct.abs() > SIGNIFICANT_DRIFT) {
        parts.push("Significant allocation drift detected from targets.".to_string());
    }
    if parts.is_empty() {
        parts.push("Portfolio is within acceptable drift and concentration limits.".to_string());
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::{ClientProfile, Holding, TargetAllocation};
    use crate::domain::types::RiskProfile;
    use chrono::Utc;

    fn holding(ticker: &str, weight: f64, price: f64, gain_loss: f64) -> Holding {
        Holding {
            ticker: ticker.to_string(),
            quantity: 1_000.0,
            current_price: price,
            market_value: weight * 50_000_000.0,
            portfolio_weight: weight,
            cost_basis: weight * 50_000_000.0 - gain_loss,
            unrealized_gain_loss: gain_loss,
            tax_lots: vec![],
            sector: "Technology".to_string(),
            asset_class: "US Equities".to_string(),
        }
    }

    fn portfolio_with(holdings: Vec<Holding>) -> Portfolio {
        Portfolio {
            portfolio_id: "portfolio_a".to_string(),
            client_id: "client_a".to_string(),
            name: "Growth Portfolio".to_string(),
            aum_usd: 50_000_000.0,
            holdings,
            target_allocation: TargetAllocation {
                us_equities: 0.40,
                international_equities: 0.20,
                fixed_income: 0.20,
                alternatives: 0.10,
                structured_products: 0.05,
                cash: 0.05,
            },
            client_profile: ClientProfile {
                client_id: "client_a".to_string(),
                risk_tolerance: RiskProfile::ModerateGrowth,
                tax_sensitivity: 0.8,
                concentration_limit: 0.15,
                rebalancing_frequency: "quarterly".to_string(),
            },
            last_rebalance: Utc::now(),
            cash_available: 1_000_000.0,
        }
    }

    #[test]
    fn test_concentration_risk_emitted_above_limit_only() {
        let portfolio = portfolio_with(vec![
            holding("NVDA", 0.17, 850.0, 3_500_000.0),
            holding("MSFT", 0.15, 400.0, 100_000.0),
            holding("AAPL", 0.10, 200.0, 50_000.0),
        ]);
        let report = DriftAnalyzer::analyze(&portfolio, &AnalysisContext::default());

        assert_eq!(report.concentration_risks.len(), 1);
        let risk = &report.concentration_risks[0];
        assert_eq!(risk.ticker, "NVDA");
        assert!((risk.excess - 0.02).abs() < 1e-9);
        assert!(risk.severity >= Severity::Low);
        assert!(report.drift_detected);
    }

    #[test]
    fn test_severity_is_monotone_in_excess() {
        assert_eq!(severity_for_excess(0.01), Severity::Low);
        assert_eq!(severity_for_excess(0.02), Severity::Low);
        assert_eq!(severity_for_excess(0.03), Severity::Medium);
        assert_eq!(severity_for_excess(0.05), Severity::Medium);
        assert_eq!(severity_for_excess(0.07), Severity::High);
        assert_eq!(severity_for_excess(0.10), Severity::High);
        assert_eq!(severity_for_excess(0.11), Severity::Critical);

        // Monotone: more excess never lowers severity
        let mut last = Severity::Low;
        for i in 0..40 {
            let severity = severity_for_excess(i as f64 * 0.005);
            assert!(severity >= last);
            last = severity;
        }
    }

    #[test]
    fn test_reduce_to_limit_trade() {
        let portfolio = portfolio_with(vec![holding("NVDA", 0.18, 850.0, 3_500_000.0)]);
        let report = DriftAnalyzer::analyze(&portfolio, &AnalysisContext::default());

        assert_eq!(report.recommended_trades.len(), 1);
        let trade = &report.recommended_trades[0];
        assert_eq!(trade.action, TradeAction::Sell);
        // 3% of $50M excess at $850/share
        let expected = (((0.18_f64 - 0.15) * 50_000_000.0) / 850.0).floor();
        assert_eq!(trade.quantity, expected);
        assert_eq!(trade.rationale, "Reduce NVDA from 18.0% to 15.0% limit");
        // 3% excess sits in the medium band
        assert_eq!(trade.urgency, 5);
        assert_eq!(report.urgency_score, 5);
    }

    #[test]
    fn test_clean_portfolio_reasoning() {
        // Five equal positions exactly matching a 100% US Equities target
        let holdings: Vec<Holding> = ["SPY", "VTI", "IVV", "SCHB", "ITOT"]
            .iter()
            .map(|t| holding(t, 0.20, 500.0, 0.0))
            .collect();
        let mut portfolio = portfolio_with(holdings);
        portfolio.client_profile.concentration_limit = 0.25;
        portfolio.target_allocation = TargetAllocation {
            us_equities: 1.0,
            international_equities: 0.0,
            fixed_income: 0.0,
            alternatives: 0.0,
            structured_products: 0.0,
            cash: 0.0,
        };

        let report = DriftAnalyzer::analyze(&portfolio, &AnalysisContext::default());
        assert!(report.concentration_risks.is_empty());
        assert!(!report.drift_detected);
        assert!(report
            .reasoning
            .contains("within acceptable drift and concentration limits"));
    }

    #[test]
    fn test_urgency_follows_worst_severity() {
        let portfolio = portfolio_with(vec![
            holding("NVDA", 0.30, 850.0, 0.0),  // excess 0.15 → critical
            holding("MSFT", 0.18, 400.0, 0.0),  // excess 0.03 → medium
        ]);
        let report = DriftAnalyzer::analyze(&portfolio, &AnalysisContext::default());
        assert_eq!(report.urgency_score, 9);
        assert!(report.has_critical_risks());
    }

    #[test]
    fn test_determinism_for_fixed_context() {
        let portfolio = portfolio_with(vec![holding("NVDA", 0.17, 850.0, -2_000_000.0)]);
        let ctx = AnalysisContext::new(Utc::now());
        let a = DriftAnalyzer::analyze(&portfolio, &ctx);
        let b = DriftAnalyzer::analyze(&portfolio, &ctx);
        assert_eq!(a, b);
    }
}
