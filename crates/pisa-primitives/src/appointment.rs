use crate::{locator::Locator, BlockNumber};
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Globally unique appointment identifier, assigned by the customer at
/// admission time (spec.md §3: "id uniquely determines the Appointment;
/// ids are never reused").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppointmentId(pub u64);

impl std::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an appointment fires on a watched event, or immediately upon
/// admission (spec.md §3, glossary "Relay mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Fire `StartResponse` once the event filter matches a block.
    Watch = 0,
    /// Fire `StartResponse` immediately upon admission.
    Relay = 1,
}

/// `(address, topics[])` — the trigger a Watch-mode appointment looks for
/// in block logs (spec.md §3, §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub address: Address,
    pub topics: Vec<B256>,
}

/// An accepted job (spec.md §3). Immutable after admission; replacement for
/// the same `locator` produces a new `Appointment`, it never mutates one in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub customer_id: u64,
    pub job_id: u64,
    pub nonce: u64,
    pub locator: Locator,
    pub contract_address: Address,
    pub data: Bytes,
    pub gas_limit: u64,
    pub value: U256,
    pub event_filter: EventFilter,
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    pub mode: Mode,
    pub payment_hash: B256,
    pub refund: U256,
    pub post_condition: Bytes,
    pub challenge_period: u64,
}

impl Appointment {
    /// `(customerId, jobId)` — the ordering key replacement decisions and
    /// store updates compare (spec.md §3, §4.2).
    pub fn update_key(&self) -> (u64, u64) {
        (self.customer_id, self.job_id)
    }

    /// `startBlock <= endBlock`, both non-negative — the only invariant the
    /// type itself can check; chain-state invariants are validated by the
    /// admission pipeline.
    pub fn has_valid_window(&self) -> bool {
        self.start_block <= self.end_block
    }
}
