//! Runtime configuration for a [`Ledger`](crate::Ledger).

use crate::error::{LedgerError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How withdrawals that exceed the member's savings balance are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WithdrawalPolicy {
    /// Accept any positive withdrawal. Savings may go negative.
    #[default]
    Lenient,
    /// Reject withdrawals larger than `deposits - withdrawals`.
    RejectOverdraft,
}

impl FromStr for WithdrawalPolicy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(WithdrawalPolicy::Lenient),
            "reject-overdraft" | "strict" => Ok(WithdrawalPolicy::RejectOverdraft),
            other => Err(LedgerError::invalid(format!(
                "unknown withdrawal policy '{}'",
                other
            ))),
        }
    }
}

/// Argon2 cost parameters used when hashing new credentials.
///
/// Verification reads the parameters back from the stored hash, so changing
/// these never invalidates existing credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        HashCost {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long SQLite waits on a locked database before giving up.
    pub busy_timeout: Duration,

    /// Attempts per write transaction when the database stays locked.
    pub max_attempts: u32,

    pub withdrawal_policy: WithdrawalPolicy,

    pub hash_cost: HashCost,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            busy_timeout: Duration::from_secs(5),
            max_attempts: 3,
            withdrawal_policy: WithdrawalPolicy::default(),
            hash_cost: HashCost::default(),
        }
    }
}

impl LedgerConfig {
    /// Builds a config from defaults overridden by `COOP_*` environment variables.
    ///
    /// - `COOP_BUSY_TIMEOUT_MS`
    /// - `COOP_MAX_ATTEMPTS`
    /// - `COOP_WITHDRAWAL_POLICY` (`lenient` or `reject-overdraft`)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(ms) = lookup("COOP_BUSY_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                LedgerError::invalid(format!("COOP_BUSY_TIMEOUT_MS must be an integer, got '{}'", ms))
            })?;
            config.busy_timeout = Duration::from_millis(ms);
        }

        if let Some(n) = lookup("COOP_MAX_ATTEMPTS") {
            let n: u32 = n.trim().parse().map_err(|_| {
                LedgerError::invalid(format!("COOP_MAX_ATTEMPTS must be an integer, got '{}'", n))
            })?;
            if n == 0 {
                return Err(LedgerError::invalid("COOP_MAX_ATTEMPTS must be at least 1"));
            }
            config.max_attempts = n;
        }

        if let Some(policy) = lookup("COOP_WITHDRAWAL_POLICY") {
            config.withdrawal_policy = policy.parse()?;
        }

        Ok(config)
    }

    pub fn with_withdrawal_policy(mut self, policy: WithdrawalPolicy) -> Self {
        self.withdrawal_policy = policy;
        self
    }

    pub fn with_hash_cost(mut self, memory_kib: u32, iterations: u32) -> Self {
        self.hash_cost = HashCost {
            memory_kib,
            iterations,
        };
        self
    }
}
