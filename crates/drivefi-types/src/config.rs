//! Configuration types for the escrow factory and the keeper.

use serde::{Deserialize, Serialize};

use crate::{EscrowError, PrincipalId, Result, constants};

/// Configuration for the agreement factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Largest installment count accepted at creation.
    pub max_installments: u32,
    /// Keep created agreements in a lookup registry.
    pub registry_enabled: bool,
    /// Principal allowed to remediate faulted settlements. `None` disables remediation.
    pub operator: Option<PrincipalId>,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            max_installments: constants::MAX_TOTAL_INSTALLMENTS,
            registry_enabled: true,
            operator: None,
        }
    }
}

impl EscrowConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_installments == 0 {
            return Err(EscrowError::Configuration(
                "max_installments must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Polling behaviour of the reference keeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub poll_interval_ms: u64,
    /// Cap on `execute()` calls per round; the rest wait for the next round.
    pub max_executions_per_round: usize,
    /// Settled agreement ids remembered to skip redundant polling.
    pub settled_cache_size: usize,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::DEFAULT_KEEPER_POLL_MS,
            max_executions_per_round: constants::DEFAULT_MAX_EXECUTIONS_PER_ROUND,
            settled_cache_size: constants::DEFAULT_SETTLED_CACHE_SIZE,
        }
    }
}

impl KeeperConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(EscrowError::Configuration(
                "poll_interval_ms must be > 0".into(),
            ));
        }
        if self.max_executions_per_round == 0 {
            return Err(EscrowError::Configuration(
                "max_executions_per_round must be > 0".into(),
            ));
        }
        if self.settled_cache_size == 0 {
            return Err(EscrowError::Configuration(
                "settled_cache_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
