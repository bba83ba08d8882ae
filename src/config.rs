use crate::application::routing::RoutingConfig;
use crate::application::scoring::ScoringConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, loaded from `VIGIL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the audit chain file lives; None keeps the chain in memory
    pub chain_path: Option<PathBuf>,
    /// Persist the chain file on every block addition
    pub auto_persist: bool,
    pub default_session_timeout_secs: u64,
    pub heartbeat_interval_minutes: u64,
    pub routing: RoutingConfig,
    pub scoring: ScoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_path: None,
            auto_persist: false,
            default_session_timeout_secs: 3_600,
            heartbeat_interval_minutes: 30,
            routing: RoutingConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = env::var("VIGIL_CHAIN_PATH") {
            if !path.is_empty() {
                config.chain_path = Some(PathBuf::from(path));
            }
        }
        config.auto_persist = parse_env("VIGIL_AUTO_PERSIST", config.auto_persist)?;
        config.default_session_timeout_secs = parse_env(
            "VIGIL_SESSION_TIMEOUT_SECS",
            config.default_session_timeout_secs,
        )?;
        config.heartbeat_interval_minutes = parse_env(
            "VIGIL_HEARTBEAT_INTERVAL_MINUTES",
            config.heartbeat_interval_minutes,
        )?;

        // Routing thresholds
        config.routing.market_move_urgent = parse_env(
            "VIGIL_MARKET_MOVE_URGENT",
            config.routing.market_move_urgent,
        )?;
        config.routing.market_move_significant = parse_env(
            "VIGIL_MARKET_MOVE_SIGNIFICANT",
            config.routing.market_move_significant,
        )?;
        config.routing.exposure_high =
            parse_env("VIGIL_EXPOSURE_HIGH", config.routing.exposure_high)?;
        config.routing.exposure_normal =
            parse_env("VIGIL_EXPOSURE_NORMAL", config.routing.exposure_normal)?;
        config.routing.drift_threshold =
            parse_env("VIGIL_DRIFT_THRESHOLD", config.routing.drift_threshold)?;
        config.routing.tax_loss_threshold =
            parse_env("VIGIL_TAX_LOSS_THRESHOLD", config.routing.tax_loss_threshold)?;

        // Scoring knobs
        config.scoring.wash_sale_penalty =
            parse_env("VIGIL_WASH_SALE_PENALTY", config.scoring.wash_sale_penalty)?;
        config.scoring.harvest_bonus =
            parse_env("VIGIL_HARVEST_BONUS", config.scoring.harvest_bonus)?;
        config.scoring.commission_rate =
            parse_env("VIGIL_COMMISSION_RATE", config.scoring.commission_rate)?;

        Ok(config)
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.chain_path.is_none());
        assert_eq!(config.heartbeat_interval_minutes, 30);
        assert_eq!(config.routing.market_move_urgent, 0.10);
        assert_eq!(config.scoring.wash_sale_penalty, 2.0);
    }

    // Overrides and failure cases share one test because the process
    // environment is global and tests run in parallel.
    #[test]
    fn test_env_overrides_and_invalid_values() {
        env::set_var("VIGIL_MARKET_MOVE_URGENT", "0.2");
        env::set_var("VIGIL_AUTO_PERSIST", "true");
        let config = Config::from_env().unwrap();
        assert_eq!(config.routing.market_move_urgent, 0.2);
        assert!(config.auto_persist);

        env::set_var("VIGIL_SESSION_TIMEOUT_SECS", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("VIGIL_SESSION_TIMEOUT_SECS"));

        env::remove_var("VIGIL_MARKET_MOVE_URGENT");
        env::remove_var("VIGIL_AUTO_PERSIST");
        env::remove_var("VIGIL_SESSION_TIMEOUT_SECS");
    }
}
