use serde::{Deserialize, Serialize};
use std::fmt;

/// Possible trade actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Client risk tolerance profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    ModerateGrowth,
    Aggressive,
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::Conservative => write!(f, "conservative"),
            RiskProfile::ModerateGrowth => write!(f, "moderate_growth"),
            RiskProfile::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Risk severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Direction of allocation drift relative to target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftDirection {
    Over,
    Under,
}

/// Types of tax optimization opportunities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxOpportunityType {
    HarvestLoss,
    HarvestGain,
    LotSelection,
}

/// Scheduled job categories handled by the gateway scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronJobType {
    DailyReview,
    EodTax,
    QuarterlyRebalance,
}

impl fmt::Display for CronJobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronJobType::DailyReview => write!(f, "daily_review"),
            CronJobType::EodTax => write!(f, "eod_tax"),
            CronJobType::QuarterlyRebalance => write!(f, "quarterly_rebalance"),
        }
    }
}

/// Specialist agents in the analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Drift,
    Tax,
    Coordinator,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Drift => write!(f, "drift"),
            AgentKind::Tax => write!(f, "tax"),
            AgentKind::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// Analysis pipeline states.
///
/// MONITOR → DETECT → ANALYZE → CONFLICT_RESOLUTION → RECOMMEND → APPROVED → EXECUTE → MONITOR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Monitor,
    Detect,
    Analyze,
    ConflictResolution,
    Recommend,
    Approved,
    Execute,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Monitor => "monitor",
            SystemState::Detect => "detect",
            SystemState::Analyze => "analyze",
            SystemState::ConflictResolution => "conflict_resolution",
            SystemState::Recommend => "recommend",
            SystemState::Approved => "approved",
            SystemState::Execute => "execute",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_enum_serde_tags() {
        assert_eq!(serde_json::to_string(&TradeAction::Buy).unwrap(), "\"buy\"");
        assert_eq!(
            serde_json::to_string(&RiskProfile::ModerateGrowth).unwrap(),
            "\"moderate_growth\""
        );
        assert_eq!(
            serde_json::to_string(&SystemState::ConflictResolution).unwrap(),
            "\"conflict_resolution\""
        );
        assert_eq!(
            serde_json::to_string(&CronJobType::EodTax).unwrap(),
            "\"eod_tax\""
        );
    }
}
