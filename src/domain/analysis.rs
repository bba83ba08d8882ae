use crate::domain::types::{DriftDirection, Severity, TaxOpportunityType, TradeAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position exceeding its concentration limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationRisk {
    pub ticker: String,
    pub current_weight: f64,
    pub limit: f64,
    /// current_weight − limit, always ≥ 0
    pub excess: f64,
    pub severity: Severity,
}

impl ConcentrationRisk {
    /// Excess expressed in percentage points
    pub fn excess_pct(&self) -> f64 {
        self.excess * 100.0
    }
}

/// Allocation drift measurement for one asset class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetric {
    pub asset_class: String,
    pub target_weight: f64,
    pub current_weight: f64,
    pub drift_pct: f64,
    pub drift_direction: DriftDirection,
}

/// Single trade recommendation from the drift analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedTrade {
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: f64,
    pub rationale: String,
    pub urgency: u8,
    #[serde(default)]
    pub estimated_tax_impact: f64,
}

impl RecommendedTrade {
    pub fn is_urgent(&self) -> bool {
        self.urgency >= 7
    }
}

/// Structured output of the drift analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub portfolio_id: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub drift_detected: bool,
    pub concentration_risks: Vec<ConcentrationRisk>,
    pub drift_metrics: Vec<DriftMetric>,
    pub recommended_trades: Vec<RecommendedTrade>,
    pub urgency_score: u8,
    pub reasoning: String,
}

impl DriftReport {
    pub fn has_critical_risks(&self) -> bool {
        self.concentration_risks
            .iter()
            .any(|r| r.severity == Severity::Critical)
    }

    /// Sum of absolute drift across all measured asset classes
    pub fn total_abs_drift(&self) -> f64 {
        self.drift_metrics.iter().map(|m| m.drift_pct.abs()).sum()
    }
}

/// Detected wash sale issue (IRS 31-day window)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WashSaleViolation {
    pub ticker: String,
    pub prior_sale_date: DateTime<Utc>,
    pub days_since_sale: i64,
    pub disallowed_loss: f64,
    pub recommendation: String,
}

impl WashSaleViolation {
    /// Days until the wash sale window clears; 0 once 31 days have elapsed
    pub fn days_until_clear(&self) -> i64 {
        (31 - self.days_since_sale).max(0)
    }
}

/// Tax optimization opportunity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxOpportunity {
    pub ticker: String,
    pub opportunity_type: TaxOpportunityType,
    pub estimated_benefit: f64,
    pub action_required: String,
}

/// Per-trade tax impact assessment for a proposed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTaxAnalysis {
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_gain_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    pub tax_impact: f64,
    pub notes: String,
}

/// Structured output of the tax analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxReport {
    pub portfolio_id: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub wash_sale_violations: Vec<WashSaleViolation>,
    pub tax_opportunities: Vec<TaxOpportunity>,
    pub proposed_trades_analysis: Vec<TradeTaxAnalysis>,
    pub total_tax_impact: f64,
    pub recommendations: Vec<String>,
    pub reasoning: String,
}

impl TaxReport {
    pub fn has_violations(&self) -> bool {
        !self.wash_sale_violations.is_empty()
    }
}
