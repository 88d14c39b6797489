use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Block number, measured in blocks since genesis.
pub type BlockNumber = u64;

/// Block hash.
pub type BlockHash = B256;

/// A log entry as exposed by a block (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Indexed topics, in emission order.
    pub topics: Vec<B256>,
    /// Non-indexed log data.
    pub data: Bytes,
}

/// A transaction as exposed by a block (spec.md §3). Only the fields the
/// watcher/responder reducers need to match against are modelled; this is
/// not a full transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub chain_id: u64,
}

/// A block cache entry (spec.md §3, §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub number: BlockNumber,
    pub logs: Vec<Log>,
    pub transactions: Vec<TxRecord>,
}

impl Block {
    /// Returns `true` if any log in this block matches the given
    /// `(address, topics)` filter: `log.address == address` and every topic
    /// in `topics` appears in `log.topics` at the same index (spec.md §4.4).
    pub fn matches_filter(&self, address: Address, topics: &[B256]) -> bool {
        self.logs.iter().any(|log| log_matches(log, address, topics))
    }
}

/// Log-match predicate shared by the watcher reducer.
pub fn log_matches(log: &Log, address: Address, topics: &[B256]) -> bool {
    if log.address != address {
        return false;
    }
    topics
        .iter()
        .enumerate()
        .all(|(i, topic)| log.topics.get(i) == Some(topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(address: Address, topics: Vec<B256>) -> Log {
        Log { address, topics, data: Bytes::new() }
    }

    #[test]
    fn matches_same_address_and_topic_prefix() {
        let addr = Address::repeat_byte(1);
        let t0 = B256::repeat_byte(2);
        let t1 = B256::repeat_byte(3);
        let l = log(addr, vec![t0, t1]);
        assert!(log_matches(&l, addr, &[t0]));
        assert!(log_matches(&l, addr, &[t0, t1]));
    }

    #[test]
    fn rejects_wrong_address_or_topic_index() {
        let addr = Address::repeat_byte(1);
        let other = Address::repeat_byte(9);
        let t0 = B256::repeat_byte(2);
        let t1 = B256::repeat_byte(3);
        let l = log(addr, vec![t0, t1]);
        assert!(!log_matches(&l, other, &[t0]));
        assert!(!log_matches(&l, addr, &[t1, t0]));
    }
}
