use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Logical transaction key: `(chainId, to, data, value, gasLimit)`. Equality
/// defines "the same transaction" independent of gas price or nonce
/// (spec.md §3) — two `GasQueueItem`s referring to the same payload share an
/// identifier even if the queue has re-priced or re-nonced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PisaTransactionIdentifier {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
}

impl PisaTransactionIdentifier {
    pub fn new(chain_id: u64, to: Address, data: Bytes, value: U256, gas_limit: u64) -> Self {
        Self { chain_id, to, data, value, gas_limit }
    }
}
