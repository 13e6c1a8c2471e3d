//! Environment-driven configuration. Every value has a documented default;
//! nothing here panics on a missing or malformed variable beyond refusing to
//! start (handled by the caller in `main`).

use tooling::config::env::get_env_parse_or;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_budget_ms: u64,
    pub max_budget_ms: u64,
    pub max_parallel_nodes: usize,
    pub pubs_rps: f64,
    pub trials_rps: f64,
    pub rag_rps: f64,
    pub cache_ttl_seconds: u64,
    pub checkpoint_ttl_hours: u64,
    pub log_level: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_budget_ms: 5000,
            max_budget_ms: 30000,
            max_parallel_nodes: 5,
            pubs_rps: 2.0,
            trials_rps: 2.0,
            rag_rps: 3.0,
            cache_ttl_seconds: 3600,
            checkpoint_ttl_hours: 24 * 7,
            log_level: "info".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from environment, falling back to defaults for anything unset.
    /// A present-but-malformed value is an error rather than a silent
    /// fallback, since that usually means a deployment typo.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            default_budget_ms: parse_or("DEFAULT_BUDGET_MS", defaults.default_budget_ms)?,
            max_budget_ms: parse_or("MAX_BUDGET_MS", defaults.max_budget_ms)?,
            max_parallel_nodes: parse_or("MAX_PARALLEL_NODES", defaults.max_parallel_nodes)?,
            pubs_rps: parse_or("PUBS_RPS", defaults.pubs_rps)?,
            trials_rps: parse_or("TRIALS_RPS", defaults.trials_rps)?,
            rag_rps: parse_or("RAG_RPS", defaults.rag_rps)?,
            cache_ttl_seconds: parse_or("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)?,
            checkpoint_ttl_hours: parse_or("CHECKPOINT_TTL_HOURS", defaults.checkpoint_ttl_hours)?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        if cfg.default_budget_ms > cfg.max_budget_ms {
            return Err(OrchestratorError::Configuration(
                "DEFAULT_BUDGET_MS exceeds MAX_BUDGET_MS".to_string(),
            ));
        }
        Ok(cfg)
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_parse_or(key, default)
        .map_err(|e| OrchestratorError::Configuration(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = OrchestratorConfig::default();
        assert!(cfg.default_budget_ms <= cfg.max_budget_ms);
    }

    #[test]
    fn from_env_rejects_default_exceeding_max() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DEFAULT_BUDGET_MS", "40000");
        std::env::set_var("MAX_BUDGET_MS", "30000");
        let result = OrchestratorConfig::from_env();
        std::env::remove_var("DEFAULT_BUDGET_MS");
        std::env::remove_var("MAX_BUDGET_MS");
        assert!(result.is_err());
    }
}
