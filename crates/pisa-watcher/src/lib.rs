//! The Watcher reducer (spec.md §4.4): a pure state machine over the block
//! cache plus a small amount of non-stored bookkeeping (one-shot emission
//! flags) that lets the dispatcher emit each action exactly once per
//! appointment lifetime. Dispatch itself — routing `StartResponse` to the
//! Responder and `RemoveAppointment` to the Store — lives in `pisa-core`:
//! the reducer only ever returns a list of actions, following the
//! unidirectional message-passing shape `reth-engine-tree`'s
//! `ChainOrchestrator`/`ChainHandler` split uses in place of the
//! responder<->store<->watcher cyclic references the design notes (§9)
//! call out.

use pisa_block_cache::BlockCache;
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Appointment, AppointmentId, Block, BlockNumber};
use rustc_hash::FxHashMap;

/// Per-appointment state (spec.md §3 "Anchor state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentState {
    Watching,
    Observed { block_observed: BlockNumber },
}

impl AppointmentState {
    pub const fn is_observed(&self) -> bool {
        matches!(self, Self::Observed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: AppointmentState,
    start_response_emitted: bool,
    remove_emitted: bool,
}

impl Tracked {
    const fn fresh(state: AppointmentState) -> Self {
        Self { state, start_response_emitted: false, remove_emitted: false }
    }
}

/// An action the Watcher emits for the dispatcher to route (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherAction {
    /// Forwarded to the Responder.
    StartResponse { appointment: Appointment, block_observed: BlockNumber },
    /// Forwarded to the Store.
    RemoveAppointment { id: AppointmentId },
}

/// Reducer over the `BlockCache` that tracks every live appointment's
/// progress from `Watching` to `Observed` and decides when to fire
/// `StartResponse`/`RemoveAppointment`.
#[derive(Debug)]
pub struct Watcher {
    confirmations_before_response: u64,
    confirmations_before_removal: u64,
    retention: u64,
    anchors: FxHashMap<AppointmentId, Tracked>,
}

impl Watcher {
    /// Constructs a Watcher. Fails with `ConfigurationError` if
    /// `confirmations_before_response > confirmations_before_removal`
    /// (spec.md §4.4).
    pub fn new(
        confirmations_before_response: u64,
        confirmations_before_removal: u64,
        retention: u64,
    ) -> PisaResult<Self> {
        if confirmations_before_response > confirmations_before_removal {
            return Err(PisaError::configuration(format!(
                "confirmations_before_response ({confirmations_before_response}) must be <= confirmations_before_removal ({confirmations_before_removal})"
            )));
        }
        Ok(Self {
            confirmations_before_response,
            confirmations_before_removal,
            retention,
            anchors: FxHashMap::default(),
        })
    }

    /// Establishes the state of a newly tracked appointment by walking the
    /// cache from `at` toward the root, stopping at the earlier of
    /// `max(startBlock, at.number - retention)` (spec.md §4.4 "Initial
    /// state").
    fn initial_state(&self, cache: &BlockCache, appointment: &Appointment, at: &Block) -> AppointmentState {
        let min_height = appointment.start_block.max(at.number.saturating_sub(self.retention));
        let found = cache.find_ancestor(at.hash, Some(min_height), |block| {
            block.matches_filter(appointment.event_filter.address, &appointment.event_filter.topics)
        });
        match found {
            Some(block) => AppointmentState::Observed { block_observed: block.number },
            None => AppointmentState::Watching,
        }
    }

    /// Advances a tracked appointment's state by exactly one block
    /// (spec.md §4.4 "Step"). `Observed` is terminal within the reducer.
    fn step(prev: AppointmentState, head: &Block, appointment: &Appointment) -> AppointmentState {
        match prev {
            AppointmentState::Watching => {
                if head.matches_filter(appointment.event_filter.address, &appointment.event_filter.topics) {
                    AppointmentState::Observed { block_observed: head.number }
                } else {
                    AppointmentState::Watching
                }
            }
            observed @ AppointmentState::Observed { .. } => observed,
        }
    }

    /// Runs one head-block cycle over every currently live appointment,
    /// returning the actions to dispatch. Appointments absent from
    /// `appointments` (because the store already removed them) have their
    /// anchor bookkeeping dropped.
    #[tracing::instrument(level = "debug", skip(self, cache, appointments))]
    pub fn process_head<'a>(
        &mut self,
        cache: &BlockCache,
        head: &Block,
        appointments: impl Iterator<Item = &'a Appointment>,
    ) -> Vec<WatcherAction> {
        let mut actions = Vec::new();
        let mut seen = FxHashMap::default();

        for appointment in appointments {
            let tracked = match self.anchors.get(&appointment.id) {
                Some(prior) => {
                    let state = Self::step(prior.state, head, appointment);
                    Tracked { state, ..*prior }
                }
                None => Tracked::fresh(self.initial_state(cache, appointment, head)),
            };

            let tracked = self.evaluate(tracked, appointment, head.number, &mut actions);
            seen.insert(appointment.id, tracked);
        }

        self.anchors = seen;
        actions
    }

    fn evaluate(
        &self,
        mut tracked: Tracked,
        appointment: &Appointment,
        head_number: BlockNumber,
        actions: &mut Vec<WatcherAction>,
    ) -> Tracked {
        if let AppointmentState::Observed { block_observed } = tracked.state {
            let confirmations = head_number.saturating_sub(block_observed) + 1;

            if !tracked.start_response_emitted && confirmations >= self.confirmations_before_response {
                actions.push(WatcherAction::StartResponse {
                    appointment: appointment.clone(),
                    block_observed,
                });
                tracked.start_response_emitted = true;
            }

            if !tracked.remove_emitted && confirmations >= self.confirmations_before_removal {
                actions.push(WatcherAction::RemoveAppointment { id: appointment.id });
                tracked.remove_emitted = true;
            }
        } else if !tracked.remove_emitted && head_number.saturating_sub(appointment.end_block) > self.confirmations_before_removal {
            actions.push(WatcherAction::RemoveAppointment { id: appointment.id });
            tracked.remove_emitted = true;
        }

        tracked
    }

    /// Exposes the current reducer state for a tracked appointment, mainly
    /// for tests and diagnostics.
    pub fn state_of(&self, id: AppointmentId) -> Option<AppointmentState> {
        self.anchors.get(&id).map(|t| t.state)
    }

    /// Forgets everything the Watcher knows about recent reorgs/hash
    /// resolution. Used by `pisa-core` when a block hash the reducer last
    /// ran against is no longer the head's ancestor (a deep reorg) and
    /// anchor state must be rebuilt from scratch.
    pub fn reset(&mut self) {
        self.anchors.clear();
    }
}
