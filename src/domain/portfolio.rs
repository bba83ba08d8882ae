use crate::domain::errors::ValidationError;
use crate::domain::types::{RiskProfile, TradeAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Individually identified parcel of a holding with its own purchase price and date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLot {
    pub lot_id: String,
    pub purchase_date: DateTime<Utc>,
    pub purchase_price: f64,
    pub quantity: f64,
    pub cost_basis: f64,
}

impl TaxLot {
    /// Days since purchase, relative to `now`
    pub fn holding_period_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.purchase_date).num_days()
    }

    /// Long-term capital gains treatment applies after one year
    pub fn is_long_term(&self, now: DateTime<Utc>) -> bool {
        self.holding_period_days(now) > 365
    }
}

/// Single position in a portfolio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub quantity: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub portfolio_weight: f64,
    pub cost_basis: f64,
    pub unrealized_gain_loss: f64,
    #[serde(default)]
    pub tax_lots: Vec<TaxLot>,
    pub sector: String,
    pub asset_class: String,
}

impl Holding {
    /// Unrealized gain/loss as a fraction of cost basis (0 when basis is 0)
    pub fn gain_loss_pct(&self) -> f64 {
        if self.cost_basis == 0.0 {
            return 0.0;
        }
        self.unrealized_gain_loss / self.cost_basis
    }
}

/// Target allocation percentages across asset classes (must sum to 1.0 ±0.01)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub us_equities: f64,
    pub international_equities: f64,
    pub fixed_income: f64,
    pub alternatives: f64,
    pub structured_products: f64,
    pub cash: f64,
}

impl TargetAllocation {
    pub fn total(&self) -> f64 {
        self.us_equities
            + self.international_equities
            + self.fixed_income
            + self.alternatives
            + self.structured_products
            + self.cash
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let total = self.total();
        if !(0.99..=1.01).contains(&total) {
            return Err(ValidationError::WeightSum {
                kind: "Target allocation".to_string(),
                total,
            });
        }
        Ok(())
    }

    /// Look up a target weight by human-readable asset class name.
    ///
    /// "US Equities" maps to the `us_equities` field, and so on. Unknown
    /// classes have a zero target.
    pub fn weight_for(&self, asset_class: &str) -> f64 {
        match asset_class.to_lowercase().replace(' ', "_").as_str() {
            "us_equities" => self.us_equities,
            "international_equities" => self.international_equities,
            "fixed_income" => self.fixed_income,
            "alternatives" => self.alternatives,
            "structured_products" => self.structured_products,
            "cash" => self.cash,
            _ => 0.0,
        }
    }

    /// Asset classes in a fixed order, as (display name, target weight) pairs
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("US Equities", self.us_equities),
            ("International Equities", self.international_equities),
            ("Fixed Income", self.fixed_income),
            ("Alternatives", self.alternatives),
            ("Structured Products", self.structured_products),
            ("Cash", self.cash),
        ]
    }
}

/// Client risk profile and preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    pub client_id: String,
    pub risk_tolerance: RiskProfile,
    pub tax_sensitivity: f64,
    #[serde(default = "default_concentration_limit")]
    pub concentration_limit: f64,
    #[serde(default = "default_rebalancing_frequency")]
    pub rebalancing_frequency: String,
}

fn default_concentration_limit() -> f64 {
    0.15
}

fn default_rebalancing_frequency() -> String {
    "quarterly".to_string()
}

/// Complete portfolio snapshot. Treated as immutable for the duration of an
/// analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub portfolio_id: String,
    pub client_id: String,
    pub name: String,
    pub aum_usd: f64,
    pub holdings: Vec<Holding>,
    pub target_allocation: TargetAllocation,
    pub client_profile: ClientProfile,
    pub last_rebalance: DateTime<Utc>,
    pub cash_available: f64,
}

impl Portfolio {
    /// Sum of all holdings' market values
    pub fn total_market_value(&self) -> f64 {
        self.holdings.iter().map(|h| h.market_value).sum()
    }

    /// Get holding by ticker
    pub fn holding(&self, ticker: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.ticker == ticker)
    }

    /// Total weight held in a sector
    pub fn sector_weight(&self, sector: &str) -> f64 {
        self.holdings
            .iter()
            .filter(|h| h.sector == sector)
            .map(|h| h.portfolio_weight)
            .sum()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.aum_usd <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "aum_usd".to_string(),
                reason: format!("must be > 0, got {}", self.aum_usd),
            });
        }
        if self.cash_available < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "cash_available".to_string(),
                reason: format!("must be >= 0, got {}", self.cash_available),
            });
        }
        for h in &self.holdings {
            if !(0.0..=1.0).contains(&h.portfolio_weight) {
                return Err(ValidationError::OutOfRange {
                    field: format!("holdings[{}].portfolio_weight", h.ticker),
                    reason: format!("must be in [0,1], got {}", h.portfolio_weight),
                });
            }
            if h.quantity <= 0.0 || h.current_price <= 0.0 {
                return Err(ValidationError::OutOfRange {
                    field: format!("holdings[{}]", h.ticker),
                    reason: "quantity and current_price must be > 0".to_string(),
                });
            }
        }
        self.target_allocation.validate()
    }
}

/// Historical transaction record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub portfolio_id: String,
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub wash_sale_disallowed: f64,
}

impl Transaction {
    pub fn total_value(&self) -> f64 {
        self.quantity * self.price
    }
}

// ===== Portfolio Analytics =====

/// Total weight per sector
pub fn sector_weights(portfolio: &Portfolio) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = HashMap::new();
    for h in &portfolio.holdings {
        *weights.entry(h.sector.clone()).or_insert(0.0) += h.portfolio_weight;
    }
    weights
}

/// Total weight per asset class
pub fn asset_class_weights(portfolio: &Portfolio) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = HashMap::new();
    for h in &portfolio.holdings {
        *weights.entry(h.asset_class.clone()).or_insert(0.0) += h.portfolio_weight;
    }
    weights
}

/// Signed drift (current − target) for each target asset class, in target order
pub fn allocation_drift(portfolio: &Portfolio) -> Vec<(String, f64)> {
    let current = asset_class_weights(portfolio);
    portfolio
        .target_allocation
        .entries()
        .into_iter()
        .map(|(class, target)| {
            let weight = current.get(class).copied().unwrap_or(0.0);
            (class.to_string(), weight - target)
        })
        .collect()
}

/// Holdings whose weight exceeds the concentration limit. An explicit limit
/// overrides the client profile's.
pub fn concentration_breaches<'a>(
    portfolio: &'a Portfolio,
    limit: Option<f64>,
) -> Vec<&'a Holding> {
    let threshold = limit.unwrap_or(portfolio.client_profile.concentration_limit);
    portfolio
        .holdings
        .iter()
        .filter(|h| h.portfolio_weight > threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lot(days_ago: i64, qty: f64) -> TaxLot {
        TaxLot {
            lot_id: format!("lot_{days_ago}"),
            purchase_date: Utc::now() - Duration::days(days_ago),
            purchase_price: 100.0,
            quantity: qty,
            cost_basis: 100.0 * qty,
        }
    }

    fn sample_portfolio() -> Portfolio {
        Portfolio {
            portfolio_id: "portfolio_test".to_string(),
            client_id: "client_test".to_string(),
            name: "Test Portfolio".to_string(),
            aum_usd: 1_000_000.0,
            holdings: vec![
                Holding {
                    ticker: "AAPL".to_string(),
                    quantity: 500.0,
                    current_price: 200.0,
                    market_value: 100_000.0,
                    portfolio_weight: 0.10,
                    cost_basis: 80_000.0,
                    unrealized_gain_loss: 20_000.0,
                    tax_lots: vec![lot(400, 500.0)],
                    sector: "Technology".to_string(),
                    asset_class: "US Equities".to_string(),
                },
                Holding {
                    ticker: "MSFT".to_string(),
                    quantity: 250.0,
                    current_price: 400.0,
                    market_value: 100_000.0,
                    portfolio_weight: 0.10,
                    cost_basis: 110_000.0,
                    unrealized_gain_loss: -10_000.0,
                    tax_lots: vec![lot(100, 250.0)],
                    sector: "Technology".to_string(),
                    asset_class: "US Equities".to_string(),
                },
            ],
            target_allocation: TargetAllocation {
                us_equities: 0.40,
                international_equities: 0.20,
                fixed_income: 0.20,
                alternatives: 0.10,
                structured_products: 0.05,
                cash: 0.05,
            },
            client_profile: ClientProfile {
                client_id: "client_test".to_string(),
                risk_tolerance: RiskProfile::ModerateGrowth,
                tax_sensitivity: 0.8,
                concentration_limit: 0.15,
                rebalancing_frequency: "quarterly".to_string(),
            },
            last_rebalance: Utc::now() - Duration::days(90),
            cash_available: 50_000.0,
        }
    }

    #[test]
    fn test_tax_lot_long_term_boundary() {
        let now = Utc::now();
        assert!(!lot(365, 10.0).is_long_term(now));
        assert!(lot(366, 10.0).is_long_term(now));
    }

    #[test]
    fn test_gain_loss_pct_zero_basis() {
        let mut h = sample_portfolio().holdings[0].clone();
        h.cost_basis = 0.0;
        assert_eq!(h.gain_loss_pct(), 0.0);
    }

    #[test]
    fn test_target_allocation_lookup() {
        let target = sample_portfolio().target_allocation;
        assert_eq!(target.weight_for("US Equities"), 0.40);
        assert_eq!(target.weight_for("Structured Products"), 0.05);
        assert_eq!(target.weight_for("Commodities"), 0.0);
    }

    #[test]
    fn test_target_allocation_sum_validation() {
        let mut target = sample_portfolio().target_allocation;
        assert!(target.validate().is_ok());

        target.cash = 0.50;
        assert!(matches!(
            target.validate(),
            Err(ValidationError::WeightSum { .. })
        ));
    }

    #[test]
    fn test_sector_and_class_weights() {
        let portfolio = sample_portfolio();
        assert!((portfolio.sector_weight("Technology") - 0.20).abs() < 1e-9);

        let by_class = asset_class_weights(&portfolio);
        assert!((by_class["US Equities"] - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_allocation_drift_signs() {
        let portfolio = sample_portfolio();
        let drift = allocation_drift(&portfolio);

        // 20% held in US Equities against a 40% target
        let us = drift.iter().find(|(c, _)| c == "US Equities").unwrap();
        assert!((us.1 + 0.20).abs() < 1e-9);

        // Nothing held in Fixed Income against a 20% target
        let fi = drift.iter().find(|(c, _)| c == "Fixed Income").unwrap();
        assert!((fi.1 + 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_concentration_breaches_threshold() {
        let mut portfolio = sample_portfolio();
        assert!(concentration_breaches(&portfolio, None).is_empty());

        portfolio.holdings[0].portfolio_weight = 0.17;
        let breaches = concentration_breaches(&portfolio, None);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].ticker, "AAPL");

        // Explicit limit override
        assert_eq!(concentration_breaches(&portfolio, Some(0.05)).len(), 2);
    }
}
