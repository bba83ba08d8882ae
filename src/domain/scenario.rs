use crate::domain::analysis::{DriftReport, TaxReport};
use crate::domain::scoring::UtilityScore;
use crate::domain::types::{AgentKind, TradeAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Single step in a remediation scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub step_number: u32,
    pub action: TradeAction,
    pub ticker: String,
    pub quantity: f64,
    pub timing: String,
    pub rationale: String,
}

/// Ordered action plan with expected outcomes and scenario-specific risks.
///
/// `utility_score` is filled in by the coordinator after ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub title: String,
    pub description: String,
    pub action_steps: Vec<ActionStep>,
    pub expected_outcomes: Map<String, Value>,
    pub risks: Vec<String>,
    #[serde(default)]
    pub utility_score: Option<UtilityScore>,
}

impl Scenario {
    pub fn total_trades(&self) -> usize {
        self.action_steps.len()
    }

    /// Numeric expected outcome by key, defaulting when missing or non-numeric
    pub fn outcome_f64(&self, key: &str, default: f64) -> f64 {
        self.expected_outcomes
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn outcome_bool(&self, key: &str) -> bool {
        self.expected_outcomes
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Conflict categories between agent findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    WashSaleConflict,
    TaxInefficient,
    ContradictoryActions,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::WashSaleConflict => write!(f, "wash_sale_conflict"),
            ConflictKind::TaxInefficient => write!(f, "tax_inefficient"),
            ConflictKind::ContradictoryActions => write!(f, "contradictory_actions"),
        }
    }
}

/// A detected conflict between agent recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: String,
    pub kind: ConflictKind,
    pub agents_involved: Vec<AgentKind>,
    pub description: String,
    pub resolution_options: Vec<String>,
}

/// Final coordinator synthesis for one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub portfolio_id: String,
    pub trigger_event: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub drift_findings: DriftReport,
    pub tax_findings: TaxReport,
    pub conflicts_detected: Vec<Conflict>,
    /// Sorted by utility score descending; head is the recommendation
    pub scenarios: Vec<Scenario>,
    pub recommended_scenario_id: String,
    pub merkle_hash: String,
}

impl AnalysisReport {
    pub fn recommended_scenario(&self) -> Option<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.scenario_id == self.recommended_scenario_id)
    }
}
