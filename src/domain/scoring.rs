use crate::domain::errors::ValidationError;
use crate::domain::types::RiskProfile;
use serde::{Deserialize, Serialize};

/// Weights for the five utility dimensions (must sum to 1.0 ±0.01)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilityWeights {
    pub risk_reduction: f64,
    pub tax_savings: f64,
    pub goal_alignment: f64,
    pub transaction_cost: f64,
    pub urgency: f64,
}

impl UtilityWeights {
    pub fn total(&self) -> f64 {
        self.risk_reduction
            + self.tax_savings
            + self.goal_alignment
            + self.transaction_cost
            + self.urgency
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let total = self.total();
        if !(0.99..=1.01).contains(&total) {
            return Err(ValidationError::WeightSum {
                kind: "Utility".to_string(),
                total,
            });
        }
        Ok(())
    }

    /// Fixed weight table by client risk profile
    pub fn for_profile(profile: RiskProfile) -> Self {
        match profile {
            RiskProfile::Conservative => Self {
                risk_reduction: 0.40,
                tax_savings: 0.20,
                goal_alignment: 0.20,
                transaction_cost: 0.15,
                urgency: 0.05,
            },
            RiskProfile::ModerateGrowth => Self {
                risk_reduction: 0.25,
                tax_savings: 0.30,
                goal_alignment: 0.25,
                transaction_cost: 0.10,
                urgency: 0.10,
            },
            RiskProfile::Aggressive => Self {
                risk_reduction: 0.15,
                tax_savings: 0.20,
                goal_alignment: 0.30,
                transaction_cost: 0.10,
                urgency: 0.25,
            },
        }
    }
}

/// Score for a single utility dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    pub raw_score: f64,
    pub weight: f64,
    pub weighted_score: f64,
}

impl DimensionScore {
    /// Build a dimension score; `weighted_score = raw × weight × 10`
    pub fn new(dimension: impl Into<String>, raw_score: f64, weight: f64) -> Self {
        Self {
            dimension: dimension.into(),
            raw_score,
            weight,
            weighted_score: raw_score * weight * 10.0,
        }
    }
}

/// Complete utility score breakdown for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityScore {
    pub scenario_id: String,
    pub dimension_scores: Vec<DimensionScore>,
    /// Σ weighted_score, in [0, 100]
    pub total_score: f64,
    pub rank: u32,
}

/// Raw per-dimension scores before weighting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawScores {
    pub risk_reduction: f64,
    pub tax_savings: f64,
    pub goal_alignment: f64,
    pub transaction_cost: f64,
    pub urgency: f64,
}

impl UtilityScore {
    pub fn from_raw(scenario_id: impl Into<String>, raw: RawScores, weights: &UtilityWeights) -> Self {
        let dimension_scores = vec![
            DimensionScore::new("risk_reduction", raw.risk_reduction, weights.risk_reduction),
            DimensionScore::new("tax_savings", raw.tax_savings, weights.tax_savings),
            DimensionScore::new("goal_alignment", raw.goal_alignment, weights.goal_alignment),
            DimensionScore::new(
                "transaction_cost",
                raw.transaction_cost,
                weights.transaction_cost,
            ),
            DimensionScore::new("urgency", raw.urgency, weights.urgency),
        ];
        let total_score = dimension_scores.iter().map(|d| d.weighted_score).sum();
        Self {
            scenario_id: scenario_id.into(),
            dimension_scores,
            total_score,
            rank: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_weights_sum_to_one() {
        for profile in [
            RiskProfile::Conservative,
            RiskProfile::ModerateGrowth,
            RiskProfile::Aggressive,
        ] {
            let weights = UtilityWeights::for_profile(profile);
            assert!(weights.validate().is_ok(), "profile {profile} weights invalid");
            assert!((weights.total() - 1.0).abs() <= 0.01);
        }
    }

    #[test]
    fn test_weighted_score_formula() {
        let score = DimensionScore::new("risk_reduction", 8.0, 0.25);
        assert!((score.weighted_score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_utility_score_totals() {
        let weights = UtilityWeights::for_profile(RiskProfile::ModerateGrowth);
        let raw = RawScores {
            risk_reduction: 10.0,
            tax_savings: 10.0,
            goal_alignment: 10.0,
            transaction_cost: 10.0,
            urgency: 10.0,
        };
        let score = UtilityScore::from_raw("scenario_max", raw, &weights);
        // All dimensions maxed: total lands on 100 regardless of weight split
        assert!((score.total_score - 100.0).abs() < 1e-6);
        assert_eq!(score.dimension_scores.len(), 5);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = UtilityWeights {
            risk_reduction: 0.5,
            tax_savings: 0.5,
            goal_alignment: 0.5,
            transaction_cost: 0.0,
            urgency: 0.0,
        };
        assert!(matches!(
            weights.validate(),
            Err(ValidationError::WeightSum { .. })
        ));
    }
}
