//! Named tower configuration scalars (spec.md §6), in the shape of
//! `reth-config`'s `StageConfig`: a plain `Deserialize`-able struct with
//! sensible defaults, validated once at construction time.

use pisa_errors::{PisaError, PisaResult};
use serde::{Deserialize, Serialize};

/// Configuration for the tower core (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TowerConfig {
    /// Block-depth of confirmations required past the observing block
    /// before the Watcher fires `StartResponse`.
    pub confirmations_before_response: u64,
    /// Block-depth of confirmations required before the Watcher forgets an
    /// appointment, either after observation or after expiry. Must be
    /// `>= confirmations_before_response`.
    pub confirmations_before_removal: u64,
    /// Block-depth of confirmations required past `blockMined` before the
    /// Responder stops tracking a mined request.
    pub confirmations_before_forget: u64,
    /// Admission floor: the minimum `endBlock - currentBlock` an incoming
    /// appointment must declare.
    pub minimum_challenge_period: u64,
    /// Maximum `GasQueue` depth (`maxDepth`); relay-mode admission is
    /// rejected once reached.
    pub max_concurrent_responses: usize,
    /// Fractional minimum gas-price increase required to replace a pending
    /// transaction at the same nonce (must be `>= 0`).
    pub replacement_rate: f64,
    /// Number of most-recent blocks the `BlockCache` retains below the
    /// head.
    pub block_cache_depth: u64,
    /// Hard ceiling on the gas price the estimator will ever return.
    pub max_gas_price: u128,
    /// `MAX_BLOCKS` in the gas-price curve: `blocksLeft <= this` returns
    /// `max_gas_price` unconditionally.
    pub gas_curve_max_blocks: u64,
    /// `H_floor`-adjacent lead used when fitting the curve through the
    /// node-reported spot price.
    pub gas_curve_median_blocks: u64,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            confirmations_before_response: 4,
            confirmations_before_removal: 20,
            confirmations_before_forget: 10,
            minimum_challenge_period: 50,
            max_concurrent_responses: 100,
            replacement_rate: 0.13,
            block_cache_depth: 200,
            max_gas_price: 1_000_000_000_000,
            gas_curve_max_blocks: 280,
            gas_curve_median_blocks: 30,
        }
    }
}

impl TowerConfig {
    /// Checks the construction-time invariants spec.md names. Raises
    /// `ConfigurationError`; never re-checked at steady state (spec.md §7).
    pub fn validate(&self) -> PisaResult<()> {
        if self.confirmations_before_response > self.confirmations_before_removal {
            return Err(PisaError::configuration(format!(
                "confirmations_before_response ({}) must be <= confirmations_before_removal ({})",
                self.confirmations_before_response, self.confirmations_before_removal
            )));
        }
        if self.replacement_rate < 0.0 {
            return Err(PisaError::configuration(format!(
                "replacement_rate must be >= 0, got {}",
                self.replacement_rate
            )));
        }
        if self.max_concurrent_responses == 0 {
            return Err(PisaError::configuration("max_concurrent_responses must be > 0"));
        }
        if self.block_cache_depth == 0 {
            return Err(PisaError::configuration("block_cache_depth must be > 0"));
        }
        if self.max_gas_price == 0 {
            return Err(PisaError::configuration("max_gas_price must be > 0"));
        }
        if self.gas_curve_max_blocks == 0 {
            return Err(PisaError::configuration("gas_curve_max_blocks must be > 0"));
        }
        Ok(())
    }
}
