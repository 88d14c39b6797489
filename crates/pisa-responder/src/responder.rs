//! `Responder` (spec.md §4.5.3): owns one signing key, accepts
//! `StartResponse` requests, maintains a `GasQueue`, and reacts to mined
//! transactions and reorgs. Like `pisa-watcher::Watcher`, it is a reducer —
//! every public method returns the actions a dispatcher in `pisa-core`
//! should carry out (broadcast, sign-and-send) rather than performing I/O
//! itself.

use crate::gas_price::GasPriceEstimator;
use crate::queue::{GasQueue, GasQueueError, ResponseRequest};
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Appointment, AppointmentId, PisaTransactionIdentifier};
use rustc_hash::FxHashMap;

impl From<GasQueueError> for PisaError {
    fn from(err: GasQueueError) -> Self {
        match err {
            GasQueueError::AlreadyAdded => PisaError::validation(err),
            GasQueueError::NotFound | GasQueueError::DepthExceeded { .. } => PisaError::queue_consistency(err),
        }
    }
}

/// Whether a tracked request has been seen mined on-chain yet (spec.md
/// §4.5.3 "Reducer").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Mined { block_mined: u64 },
}

#[derive(Debug, Clone)]
struct Tracked {
    identifier: PisaTransactionIdentifier,
    appointment: Appointment,
    state: RequestState,
}

/// An action for `pisa-core`'s dispatcher to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderAction {
    /// Sign and submit every item in this list.
    Broadcast(Vec<PisaTransactionIdentifier>),
    /// `PublicValidationError`: the appointment is already being responded
    /// to (spec.md §4.5.3 `startResponse`).
    AlreadyResponding { id: AppointmentId },
}

/// Owns one `GasQueue` for a single signing address.
#[derive(Debug)]
pub struct Responder {
    estimator: GasPriceEstimator,
    replacement_rate: f64,
    max_depth: usize,
    confirmations_before_forget: u64,
    queue: GasQueue,
    tracked: FxHashMap<AppointmentId, Tracked>,
}

impl Responder {
    /// `emptyNonce` must be seeded from `getTransactionCount(addr,
    /// "pending")` at startup (spec.md §4.5.3 wallet exclusivity
    /// invariant) — the caller in `pisa-core` is responsible for that RPC.
    pub fn new(empty_nonce: u64, replacement_rate: f64, max_depth: usize, confirmations_before_forget: u64, estimator: GasPriceEstimator) -> Self {
        Self {
            estimator,
            replacement_rate,
            max_depth,
            confirmations_before_forget,
            queue: GasQueue::new(empty_nonce, replacement_rate, max_depth),
            tracked: FxHashMap::default(),
        }
    }

    pub fn queue(&self) -> &GasQueue {
        &self.queue
    }

    pub fn is_tracking(&self, id: AppointmentId) -> bool {
        self.tracked.contains_key(&id)
    }

    /// Reverse lookup from a queued identifier back to the appointment it
    /// answers for, used by `pisa-core` to correlate a mined on-chain
    /// transaction with the id it must call `txMined`/record against.
    pub fn tracked_id_for(&self, identifier: &PisaTransactionIdentifier) -> Option<AppointmentId> {
        self.tracked.iter().find(|(_, tracked)| &tracked.identifier == identifier).map(|(id, _)| *id)
    }

    fn identifier_for(appointment: &Appointment, chain_id: u64) -> PisaTransactionIdentifier {
        PisaTransactionIdentifier::new(chain_id, appointment.contract_address, appointment.data.clone(), appointment.value, appointment.gas_limit)
    }

    /// spec.md §4.5.3 `startResponse`. `head` and `spot_price` come from the
    /// caller's most recent chain read.
    pub fn start_response(&mut self, appointment: Appointment, chain_id: u64, head: u64, spot_price: u128) -> PisaResult<ResponderAction> {
        let identifier = Self::identifier_for(&appointment, chain_id);
        let id = appointment.id;

        if self.tracked.contains_key(&id) {
            return Ok(ResponderAction::AlreadyResponding { id });
        }

        let ideal_gas_price = self.estimator.ideal_gas_price(appointment.end_block, head, spot_price);
        let request = ResponseRequest { identifier: identifier.clone(), ideal_gas_price, appointment: appointment.clone() };

        let before = self.queue.clone();
        let after = match self.queue.add(request) {
            Ok(queue) => queue,
            Err(GasQueueError::AlreadyAdded) => return Ok(ResponderAction::AlreadyResponding { id }),
            Err(other) => return Err(other.into()),
        };
        self.queue = after;
        self.tracked.insert(id, Tracked { identifier, appointment, state: RequestState::Pending });

        Ok(self.broadcast_diff(&before))
    }

    /// spec.md §4.5.3 `txMined`, invoked from the reducer once a tracked
    /// identifier is observed mined at `nonce` in `from`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn tx_mined(&mut self, identifier: &PisaTransactionIdentifier, nonce: u64, block_mined: u64, from_us: bool) -> PisaResult<ResponderAction> {
        let head = self.queue.head().ok_or_else(|| PisaError::queue_consistency("txMined on an empty queue"))?;
        if head.nonce != nonce {
            return Err(PisaError::queue_consistency(format!("txMined nonce {nonce} does not match queue head nonce {}", head.nonce)));
        }
        if self.queue.find(identifier).is_none() {
            return Err(PisaError::queue_consistency("txMined identifier is not tracked by the queue"));
        }

        let before = self.queue.clone();
        self.queue = if &head.identifier == identifier { self.queue.dequeue() } else { self.queue.consume(identifier)? };

        for tracked in self.tracked.values_mut() {
            if &tracked.identifier == identifier {
                tracked.state = RequestState::Mined { block_mined };
            }
        }

        if !from_us {
            tracing::warn!(?identifier, "transaction mined from a foreign address; queued item cancelled without on-chain confirmation of our intent");
        }

        Ok(self.broadcast_diff(&before))
    }

    /// spec.md §4.5.3 `reEnqueueMissingItems`: used after a reorg unwinds
    /// the block that mined a tracked request, dropping it from the queue
    /// without `endResponse` ever having fired. Every such id is
    /// re-estimated against the current head and spot price and prepended.
    pub fn re_enqueue_missing_items(&mut self, ids: &[AppointmentId], head: u64, spot_price: u128) -> ResponderAction {
        let before = self.queue.clone();

        let to_restore: Vec<ResponseRequest> = ids
            .iter()
            .filter_map(|id| self.tracked.get(id))
            .filter(|tracked| self.queue.find(&tracked.identifier).is_none())
            .map(|tracked| {
                let ideal_gas_price = self.estimator.ideal_gas_price(tracked.appointment.end_block, head, spot_price);
                ResponseRequest { identifier: tracked.identifier.clone(), ideal_gas_price, appointment: tracked.appointment.clone() }
            })
            .collect();

        if to_restore.is_empty() {
            return ResponderAction::Broadcast(Vec::new());
        }

        self.queue = self.queue.prepend(to_restore);
        self.broadcast_diff(&before)
    }

    /// spec.md §4.5.3 `endResponse`.
    pub fn end_response(&mut self, id: AppointmentId) {
        self.tracked.remove(&id);
    }

    /// Rebuilds the queue from scratch with a fresh `emptyNonce`, keeping
    /// already-tracked appointments (spec.md §5: "on restart, state is
    /// reconstructed from the Store and the on-chain transaction count").
    /// Callers should follow with `re_enqueue_missing_items` for every
    /// still-pending tracked id to restore the queue's contents.
    pub fn resync(&mut self, empty_nonce: u64) {
        self.queue = GasQueue::new(empty_nonce, self.replacement_rate, self.max_depth);
    }

    /// Sweeps tracked requests whose `confirmationsBeforeForget` has
    /// elapsed past `blockMined`, returning the ids to drop.
    pub fn sweep_forgettable(&self, head: u64) -> Vec<AppointmentId> {
        self.tracked
            .iter()
            .filter_map(|(id, tracked)| match tracked.state {
                RequestState::Mined { block_mined } if head.saturating_sub(block_mined) + 1 >= self.confirmations_before_forget => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn broadcast_diff(&self, before: &GasQueue) -> ResponderAction {
        let diff: Vec<_> = self.queue.difference(before).into_iter().map(|item| item.request.identifier.clone()).collect();
        ResponderAction::Broadcast(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pisa_primitives::{Address, Bytes, EventFilter, Locator, Mode, B256, U256};

    fn appointment(id: u64, end_block: u64) -> Appointment {
        Appointment {
            id: AppointmentId(id),
            customer_id: 1,
            job_id: 1,
            nonce: 0,
            locator: Locator(B256::repeat_byte(id as u8)),
            contract_address: Address::repeat_byte(id as u8),
            data: Bytes::new(),
            gas_limit: 100_000,
            value: U256::ZERO,
            event_filter: EventFilter { address: Address::repeat_byte(id as u8), topics: vec![] },
            start_block: 1,
            end_block,
            mode: Mode::Watch,
            payment_hash: B256::ZERO,
            refund: U256::ZERO,
            post_condition: Bytes::new(),
            challenge_period: 20,
        }
    }

    fn responder() -> Responder {
        let estimator = GasPriceEstimator::new(280, 1_000_000_000_000, 30);
        Responder::new(10, 0.1, 10, 10, estimator)
    }

    /// spec.md §8 scenario 1: happy watch, `StartResponse` triggers exactly
    /// one broadcast at nonce `N0`.
    #[test]
    fn start_response_broadcasts_and_tracks_the_appointment() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);

        let action = responder.start_response(appt.clone(), 1, 900, 10_000_000_000).unwrap();
        assert!(matches!(action, ResponderAction::Broadcast(ids) if ids.len() == 1));
        assert!(responder.is_tracking(appt.id));
        assert_eq!(responder.queue().len(), 1);
        assert_eq!(responder.queue().head().unwrap().nonce, 10);
    }

    #[test]
    fn start_response_is_idempotent_per_appointment() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);

        responder.start_response(appt.clone(), 1, 900, 10_000_000_000).unwrap();
        let second = responder.start_response(appt.clone(), 1, 900, 10_000_000_000).unwrap();
        assert_eq!(second, ResponderAction::AlreadyResponding { id: appt.id });
        assert_eq!(responder.queue().len(), 1);
    }

    /// spec.md §8 scenario 5: txMined out of order consumes the non-head
    /// item and rebroadcasts what shifted.
    #[test]
    fn tx_mined_on_head_dequeues_and_stops_tracking_eligible_for_forget() {
        let mut responder = responder();
        let a = appointment(1, 1_000);
        let b = appointment(2, 1_000);
        responder.start_response(a.clone(), 1, 900, 10_000_000_000).unwrap();
        responder.start_response(b.clone(), 1, 900, 10_000_000_000).unwrap();

        let head_nonce = responder.queue().head().unwrap().nonce;
        let head_identifier = responder.queue().head().unwrap().request.identifier.clone();
        let action = responder.tx_mined(&head_identifier, head_nonce, 905, true).unwrap();
        assert!(matches!(action, ResponderAction::Broadcast(ids) if ids.is_empty()));
        assert_eq!(responder.queue().len(), 1);

        assert!(responder.sweep_forgettable(905).is_empty(), "confirmationsBeforeForget has not elapsed yet");
        assert_eq!(responder.sweep_forgettable(920), vec![a.id], "only the mined appointment is forgettable; b is still Pending");
    }

    #[test]
    fn tx_mined_rejects_wrong_nonce() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);
        responder.start_response(appt, 1, 900, 10_000_000_000).unwrap();

        let identifier = responder.queue().head().unwrap().request.identifier.clone();
        let err = responder.tx_mined(&identifier, 999, 905, true).unwrap_err();
        assert_matches!(err, PisaError::QueueConsistencyError(_));
    }

    #[test]
    fn tx_mined_on_empty_queue_is_a_consistency_error() {
        let mut responder = responder();
        let identifier = PisaTransactionIdentifier::new(1, Address::repeat_byte(9), Bytes::new(), U256::ZERO, 21_000);
        let err = responder.tx_mined(&identifier, 0, 1, true).unwrap_err();
        assert!(matches!(err, PisaError::QueueConsistencyError(_)));
    }

    #[test]
    fn end_response_stops_tracking() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);
        responder.start_response(appt.clone(), 1, 900, 10_000_000_000).unwrap();
        responder.end_response(appt.id);
        assert!(!responder.is_tracking(appt.id));
    }

    #[test]
    fn tracked_id_for_resolves_the_queued_identifier() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);
        responder.start_response(appt.clone(), 1, 900, 10_000_000_000).unwrap();

        let identifier = responder.queue().head().unwrap().request.identifier.clone();
        assert_eq!(responder.tracked_id_for(&identifier), Some(appt.id));

        let unknown = PisaTransactionIdentifier::new(99, Address::repeat_byte(9), Bytes::new(), U256::ZERO, 21_000);
        assert_eq!(responder.tracked_id_for(&unknown), None);
    }

    #[test]
    fn resync_rebuilds_an_empty_queue_at_the_given_nonce() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);
        responder.start_response(appt, 1, 900, 10_000_000_000).unwrap();

        responder.resync(42);
        assert!(responder.queue().is_empty());
        assert_eq!(responder.queue().empty_nonce(), 42);
    }

    #[test]
    fn re_enqueue_missing_items_restores_dropped_tracked_requests() {
        let mut responder = responder();
        let appt = appointment(1, 1_000);
        responder.start_response(appt.clone(), 1, 900, 10_000_000_000).unwrap();

        // Simulate a reorg unwinding the block that consumed this request:
        // the queue is rebuilt empty but the appointment is still tracked.
        responder.resync(10);
        assert!(responder.queue().is_empty());

        let action = responder.re_enqueue_missing_items(&[appt.id], 900, 10_000_000_000);
        assert!(matches!(action, ResponderAction::Broadcast(ids) if ids.len() == 1));
        assert_eq!(responder.queue().len(), 1);
    }
}
