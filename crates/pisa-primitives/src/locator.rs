use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};

/// Semantic dedup key for an appointment: a hash over the contract address
/// and the event topics it watches. At most one active appointment exists
/// per locator (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator(pub B256);

impl Locator {
    /// Derives the locator from a contract address and the topics of the
    /// event filter the appointment watches.
    pub fn derive(contract_address: Address, topics: &[B256]) -> Self {
        let mut buf = Vec::with_capacity(20 + 32 * topics.len());
        buf.extend_from_slice(contract_address.as_slice());
        for topic in topics {
            buf.extend_from_slice(topic.as_slice());
        }
        Self(keccak256(buf))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let addr = Address::repeat_byte(0x11);
        let topics = vec![B256::repeat_byte(0x22)];
        assert_eq!(Locator::derive(addr, &topics), Locator::derive(addr, &topics));
    }

    #[test]
    fn derive_distinguishes_topics() {
        let addr = Address::repeat_byte(0x11);
        let a = Locator::derive(addr, &[B256::repeat_byte(0x22)]);
        let b = Locator::derive(addr, &[B256::repeat_byte(0x33)]);
        assert_ne!(a, b);
    }
}
