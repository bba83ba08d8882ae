use crate::application::agents::AnalysisContext;
use crate::domain::analysis::{
    RecommendedTrade, TaxOpportunity, TaxReport, TradeTaxAnalysis, WashSaleViolation,
};
use crate::domain::portfolio::{Holding, Portfolio, Transaction};
use crate::domain::types::{TaxOpportunityType, TradeAction};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Combined top federal rate plus 3.8% NIIT, as applied to UHNW clients
pub const SHORT_TERM_RATE: f64 = 0.408;
pub const LONG_TERM_RATE: f64 = 0.238;

/// IRS wash sale window in days
pub const WASH_SALE_WINDOW_DAYS: i64 = 31;

/// Annual ordinary-income offset cap for realized losses
const ORDINARY_INCOME_OFFSET_CAP: f64 = 3_000.0;

/// Rule-based wash-sale, loss-harvesting and trade tax-impact analyzer.
///
/// Pure: identical inputs produce identical output. Rates are fixed
/// approximations; real tax rulings are out of scope.
pub struct TaxAnalyzer;

impl TaxAnalyzer {
    pub fn analyze(
        portfolio: &Portfolio,
        transactions: &[Transaction],
        proposed_trades: &[RecommendedTrade],
        ctx: &AnalysisContext,
    ) -> TaxReport {
        let wash_sale_violations =
            detect_wash_sales(portfolio, transactions, proposed_trades, ctx.now);
        let tax_opportunities =
            find_opportunities(portfolio, ctx.year_to_date_gains.unwrap_or(0.0));
        let (proposed_trades_analysis, total_tax_impact) =
            analyze_proposed_trades(portfolio, proposed_trades, ctx.now);
        let recommendations =
            build_recommendations(&wash_sale_violations, &tax_opportunities, proposed_trades);
        let reasoning =
            build_reasoning(&wash_sale_violations, &tax_opportunities, total_tax_impact);

        debug!(
            "TaxAnalyzer [{}]: {} violations, {} opportunities, impact ${:.0}",
            portfolio.portfolio_id,
            wash_sale_violations.len(),
            tax_opportunities.len(),
            total_tax_impact
        );

        TaxReport {
            portfolio_id: portfolio.portfolio_id.clone(),
            analysis_timestamp: ctx.now,
            wash_sale_violations,
            tax_opportunities,
            proposed_trades_analysis,
            total_tax_impact,
            recommendations,
            reasoning,
        }
    }
}

fn detect_wash_sales(
    portfolio: &Portfolio,
    transactions: &[Transaction],
    proposed_trades: &[RecommendedTrade],
    now: DateTime<Utc>,
) -> Vec<WashSaleViolation> {
    let mut violations = Vec::new();

    // Recent sells inside the wash sale window, grouped by ticker
    let mut recent_sales: HashMap<&str, Vec<(DateTime<Utc>, i64)>> = HashMap::new();
    for t in transactions {
        if t.action == TradeAction::Sell {
            let days_ago = (now - t.timestamp).num_days();
            if days_ago <= WASH_SALE_WINDOW_DAYS {
                recent_sales
                    .entry(t.ticker.as_str())
                    .or_default()
                    .push((t.timestamp, days_ago));
            }
        }
    }

    // A proposed BUY against any recent sell re-opens the position
    for trade in proposed_trades {
        if trade.action != TradeAction::Buy {
            continue;
        }
        let Some(sales) = recent_sales.get(trade.ticker.as_str()) else {
            continue;
        };
        for (sale_date, days_ago) in sales {
            let disallowed_loss = portfolio
                .holding(&trade.ticker)
                .filter(|h| h.unrealized_gain_loss < 0.0)
                .map(|h| h.unrealized_gain_loss.abs())
                .unwrap_or(0.0);

            violations.push(WashSaleViolation {
                ticker: trade.ticker.clone(),
                prior_sale_date: *sale_date,
                days_since_sale: *days_ago,
                disallowed_loss,
                recommendation: format!(
                    "Wait {} more days before buying {}, or purchase a substitute \
                     security to maintain exposure.",
                    WASH_SALE_WINDOW_DAYS - days_ago,
                    trade.ticker
                ),
            });
        }
    }

    // Selling and re-buying the same loss position within one proposal set
    let sells: Vec<&str> = proposed_trades
        .iter()
        .filter(|t| t.action == TradeAction::Sell)
        .map(|t| t.ticker.as_str())
        .collect();
    for trade in proposed_trades {
        if trade.action != TradeAction::Buy || !sells.contains(&trade.ticker.as_str()) {
            continue;
        }
        if let Some(holding) = portfolio.holding(&trade.ticker) {
            if holding.unrealized_gain_loss < 0.0 {
                violations.push(WashSaleViolation {
                    ticker: trade.ticker.clone(),
                    prior_sale_date: now,
                    days_since_sale: 0,
                    disallowed_loss: holding.unrealized_gain_loss.abs(),
                    recommendation: format!(
                        "Cannot sell and immediately repurchase {} at a loss. \
                         Consider using a substitute security instead.",
                        trade.ticker
                    ),
                });
            }
        }
    }

    violations
}

fn find_opportunities(portfolio: &Portfolio, ytd_gains: f64) -> Vec<TaxOpportunity> {
    let mut opportunities = Vec::new();

    for holding in &portfolio.holdings {
        if holding.unrealized_gain_loss >= 0.0 {
            continue;
        }
        let loss = holding.unrealized_gain_loss.abs();

        // Benefit is estimated at the short-term rate regardless of lot age.
        let (estimated_benefit, action_required) = if ytd_gains > 0.0 {
            (
                loss.min(ytd_gains) * SHORT_TERM_RATE,
                format!(
                    "Harvest ${} loss to offset ${} in gains",
                    format_usd(loss),
                    format_usd(loss.min(ytd_gains))
                ),
            )
        } else {
            (
                loss.min(ORDINARY_INCOME_OFFSET_CAP) * SHORT_TERM_RATE,
                format!("Harvest ${} loss to offset ordinary income", format_usd(loss)),
            )
        };

        opportunities.push(TaxOpportunity {
            ticker: holding.ticker.clone(),
            opportunity_type: TaxOpportunityType::HarvestLoss,
            estimated_benefit,
            action_required,
        });
    }

    opportunities.sort_by(|a, b| {
        b.estimated_benefit
            .partial_cmp(&a.estimated_benefit)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    opportunities
}

fn analyze_proposed_trades(
    portfolio: &Portfolio,
    proposed_trades: &[RecommendedTrade],
    now: DateTime<Utc>,
) -> (Vec<TradeTaxAnalysis>, f64) {
    let mut analysis = Vec::new();
    let mut total_impact = 0.0;

    for trade in proposed_trades {
        let Some(holding) = portfolio.holding(&trade.ticker) else {
            analysis.push(TradeTaxAnalysis {
                ticker: trade.ticker.clone(),
                action: trade.action,
                quantity: trade.quantity,
                realized_gain_loss: None,
                holding_period: None,
                tax_rate: None,
                tax_impact: 0.0,
                notes: "New position - no tax impact on purchase".to_string(),
            });
            continue;
        };

        if trade.action == TradeAction::Sell {
            let sell_ratio = (trade.quantity / holding.quantity).min(1.0);
            let gain_loss = holding.unrealized_gain_loss * sell_ratio;

            let long_term = is_long_term_majority(holding, now);
            let rate = if long_term { LONG_TERM_RATE } else { SHORT_TERM_RATE };
            let tax_impact = if gain_loss > 0.0 { gain_loss * rate } else { 0.0 };
            total_impact += tax_impact;

            analysis.push(TradeTaxAnalysis {
                ticker: trade.ticker.clone(),
                action: trade.action,
                quantity: trade.quantity,
                realized_gain_loss: Some(gain_loss),
                holding_period: Some(
                    if long_term { "long-term" } else { "short-term" }.to_string(),
                ),
                tax_rate: Some(rate),
                tax_impact,
                notes: format!(
                    "{} of ${} taxed at {:.1}%",
                    if gain_loss > 0.0 { "Gain" } else { "Loss" },
                    format_usd(gain_loss.abs()),
                    rate * 100.0
                ),
            });
        } else {
            analysis.push(TradeTaxAnalysis {
                ticker: trade.ticker.clone(),
                action: trade.action,
                quantity: trade.quantity,
                realized_gain_loss: None,
                holding_period: None,
                tax_rate: None,
                tax_impact: 0.0,
                notes: "Purchase - no immediate tax impact".to_string(),
            });
        }
    }

    (analysis, total_impact)
}

/// True when more than half the lot quantity qualifies as long-term.
/// Holdings without lot data are treated as long-term.
fn is_long_term_majority(holding: &Holding, now: DateTime<Utc>) -> bool {
    if holding.tax_lots.is_empty() {
        return true;
    }
    let total_qty: f64 = holding.tax_lots.iter().map(|l| l.quantity).sum();
    let long_term_qty: f64 = holding
        .tax_lots
        .iter()
        .filter(|l| l.is_long_term(now))
        .map(|l| l.quantity)
        .sum();
    long_term_qty > total_qty / 2.0
}

fn build_recommendations(
    violations: &[WashSaleViolation],
    opportunities: &[TaxOpportunity],
    proposed_trades: &[RecommendedTrade],
) -> Vec<String> {
    let mut recs = Vec::new();

    if !violations.is_empty() {
        recs.push(format!(
            "WARNING: {} potential wash sale violation(s) detected. \
             Review proposed trades before execution.",
            violations.len()
        ));
    }
    if let Some(top) = opportunities.first() {
        recs.push(format!(
            "Consider harvesting {} loss for estimated ${} tax benefit.",
            top.ticker,
            format_usd(top.estimated_benefit)
        ));
    }
    if proposed_trades.iter().any(|t| t.action == TradeAction::Sell) {
        recs.push("Use HIFO (Highest In, First Out) lot selection to minimize gains.".to_string());
    }
    if recs.is_empty() {
        recs.push("Portfolio is tax-efficient. No immediate action required.".to_string());
    }

    recs
}

fn build_reasoning(
    violations: &[WashSaleViolation],
    opportunities: &[TaxOpportunity],
    total_impact: f64,
) -> String {
    let mut parts = Vec::new();

    if !violations.is_empty() {
        let tickers: Vec<&str> = violations.iter().map(|v| v.ticker.as_str()).collect();
        parts.push(format!(
            "Detected {} wash sale risk(s) involving {}. These trades should be \
             modified or delayed to avoid IRS penalties.",
            violations.len(),
            tickers.join(", ")
        ));
    }
    if !opportunities.is_empty() {
        let total_benefit: f64 = opportunities.iter().map(|o| o.estimated_benefit).sum();
        parts.push(format!(
            "Identified {} tax-loss harvesting opportunity(ies) with total \
             estimated benefit of ${}.",
            opportunities.len(),
            format_usd(total_benefit)
        ));
    }
    if total_impact > 0.0 {
        parts.push(format!(
            "Proposed trades would result in estimated tax liability of ${}.",
            format_usd(total_impact)
        ));
    } else if total_impact < 0.0 {
        parts.push(format!(
            "Proposed trades would generate ${} in realizable losses.",
            format_usd(total_impact.abs())
        ));
    }
    if parts.is_empty() {
        parts.push("No significant tax implications identified.".to_string());
    }

    parts.join(" ")
}

/// Round to whole dollars and group thousands with commas
pub fn format_usd(value: f64) -> String {
    let rounded = value.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value < 0.0 && rounded > 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
