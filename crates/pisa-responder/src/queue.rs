//! `GasQueue` (spec.md §4.5.2): a pure, nonce-ordered, replacement-aware
//! priority structure. Every operation returns a new queue rather than
//! mutating in place, the way `pisa-block-cache::Ancestry` and
//! `pisa-watcher`'s reducer thread state functionally rather than through
//! shared mutable structures.
//!
//! Nonces are always the contiguous range
//! `[empty_nonce - items.len(), empty_nonce)` (spec.md §3 invariant
//! `items[0].nonce <= emptyNonce - items.length` combined with strictly
//! increasing nonces forces exact contiguity), so every operation here
//! reduces to a structural edit on `items` followed by reassigning nonces
//! from that formula — there is no separate nonce-shifting bookkeeping.

use pisa_primitives::{Appointment, PisaTransactionIdentifier};
use thiserror::Error;

/// Local detail behind `PisaError::QueueConsistencyError`/`PublicValidationError`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GasQueueError {
    #[error("a request for this identifier is already queued")]
    AlreadyAdded,
    #[error("identifier not found in queue")]
    NotFound,
    #[error("queue depth {depth} already at max {max_depth}")]
    DepthExceeded { depth: usize, max_depth: usize },
}

/// The payload a `StartResponse` action produces for the queue: enough to
/// derive a `SignedTransaction` plus the appointment it answers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRequest {
    pub identifier: PisaTransactionIdentifier,
    pub ideal_gas_price: u128,
    pub appointment: Appointment,
}

/// One slot in the queue: a nonce, a gas price, and the request it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasQueueItem {
    pub nonce: u64,
    pub gas_price: u128,
    pub request: ResponseRequest,
}

/// Nonce-ordered, replacement-aware transaction queue for a single
/// Responder's signing address (spec.md §4.5.2).
#[derive(Debug, Clone)]
pub struct GasQueue {
    items: Vec<GasQueueItem>,
    empty_nonce: u64,
    replacement_rate: f64,
    max_depth: usize,
}

impl GasQueue {
    /// `emptyNonce` should be seeded from `provider.getTransactionCount(addr,
    /// "pending")` at Responder startup (spec.md §4.5.3 exclusivity
    /// invariant).
    pub fn new(empty_nonce: u64, replacement_rate: f64, max_depth: usize) -> Self {
        Self { items: Vec::new(), empty_nonce, replacement_rate, max_depth }
    }

    pub fn items(&self) -> &[GasQueueItem] {
        &self.items
    }

    pub fn empty_nonce(&self) -> u64 {
        self.empty_nonce
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `maxConcurrentResponses` reached; relay-mode admission must reject
    /// new jobs once this holds (spec.md §4.3, §6).
    pub fn depth_reached(&self) -> bool {
        self.items.len() >= self.max_depth
    }

    pub fn head(&self) -> Option<&GasQueueItem> {
        self.items.first()
    }

    pub fn find(&self, identifier: &PisaTransactionIdentifier) -> Option<&GasQueueItem> {
        self.items.iter().find(|item| &item.request.identifier == identifier)
    }

    /// spec.md §4.5.2 `add`.
    pub fn add(&self, request: ResponseRequest) -> Result<Self, GasQueueError> {
        if self.find(&request.identifier).is_some() {
            return Err(GasQueueError::AlreadyAdded);
        }
        if self.depth_reached() {
            return Err(GasQueueError::DepthExceeded { depth: self.items.len(), max_depth: self.max_depth });
        }

        let insert_at = self.items.iter().position(|item| request.ideal_gas_price > item.gas_price).unwrap_or(self.items.len());

        let mut items = self.items.clone();
        items.insert(insert_at, GasQueueItem { nonce: 0, gas_price: request.ideal_gas_price, request });

        let mut next = Self { items, empty_nonce: self.empty_nonce + 1, replacement_rate: self.replacement_rate, max_depth: self.max_depth };
        next.reassign_nonces();
        let len = next.items.len();
        next.bump_range(insert_at + 1, len);
        Ok(next)
    }

    /// spec.md §4.5.2 `dequeue`: removes the head item; `emptyNonce`
    /// unchanged.
    pub fn dequeue(&self) -> Self {
        let mut items = self.items.clone();
        if !items.is_empty() {
            items.remove(0);
        }
        Self { items, empty_nonce: self.empty_nonce, replacement_rate: self.replacement_rate, max_depth: self.max_depth }
    }

    /// spec.md §4.5.2 `consume`. The open design note in §9 flags that this
    /// re-bumps every item that absorbed a nonce shift, even ones that would
    /// otherwise have mined unchanged — implemented as specified, not
    /// "fixed".
    pub fn consume(&self, identifier: &PisaTransactionIdentifier) -> Result<Self, GasQueueError> {
        let pos = self.items.iter().position(|item| &item.request.identifier == identifier).ok_or(GasQueueError::NotFound)?;

        let mut items = self.items.clone();
        items.remove(pos);

        let mut next = Self { items, empty_nonce: self.empty_nonce, replacement_rate: self.replacement_rate, max_depth: self.max_depth };
        next.reassign_nonces();
        next.bump_range(0, pos);
        Ok(next)
    }

    /// spec.md §4.5.2 `prepend`: reinstates previously removed requests
    /// (from `reEnqueueMissingItems`) at the front, pushing every existing
    /// item's nonce up by the number restored.
    pub fn prepend(&self, restored: Vec<ResponseRequest>) -> Self {
        if restored.is_empty() {
            return self.clone();
        }
        let shift = restored.len() as u64;

        let mut items: Vec<GasQueueItem> =
            restored.into_iter().map(|request| GasQueueItem { nonce: 0, gas_price: request.ideal_gas_price, request }).collect();
        let prior_len = items.len();
        items.extend(self.items.clone());

        let mut next = Self { items, empty_nonce: self.empty_nonce + shift, replacement_rate: self.replacement_rate, max_depth: self.max_depth };
        next.reassign_nonces();
        next.bump_range(prior_len, next.items.len());
        next
    }

    /// spec.md §4.5.2 `difference`: items in `self` with no structurally
    /// identical counterpart in `prev` — these are the ones requiring
    /// broadcast (new, re-nonced, or re-priced).
    pub fn difference<'a>(&'a self, prev: &GasQueue) -> Vec<&'a GasQueueItem> {
        self.items.iter().filter(|item| !prev.items.contains(item)).collect()
    }

    fn reassign_nonces(&mut self) {
        let len = self.items.len() as u64;
        for (i, item) in self.items.iter_mut().enumerate() {
            item.nonce = self.empty_nonce - len + i as u64;
        }
    }

    fn bump_range(&mut self, start: usize, end: usize) {
        for item in self.items[start..end].iter_mut() {
            item.gas_price = inflate(item.gas_price, self.replacement_rate);
        }
    }
}

fn inflate(price: u128, rate: f64) -> u128 {
    if rate <= 0.0 {
        return price;
    }
    ((price as f64) * (1.0 + rate)).ceil() as u128
}
