// Specialist analyzers and the coordinator pipeline
pub mod conflict_detector;
pub mod coordinator;
pub mod drift;
pub mod scenario_generator;
pub mod tax;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Context handed through the analysis pipeline.
///
/// Carries the analysis clock (so pure analyzers are deterministic for a
/// given snapshot), optional tax context, and the router's context
/// additions as an opaque bag.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub now: DateTime<Utc>,
    pub year_to_date_gains: Option<f64>,
    pub additions: Map<String, Value>,
}

impl AnalysisContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            year_to_date_gains: None,
            additions: Map::new(),
        }
    }

    pub fn with_ytd_gains(mut self, gains: f64) -> Self {
        self.year_to_date_gains = Some(gains);
        self
    }

    pub fn with_additions(mut self, additions: Map<String, Value>) -> Self {
        self.additions = additions;
        self
    }
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
