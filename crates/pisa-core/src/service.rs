//! `PisaService` (spec.md §2, §9): owns the `BlockCache`, `Watcher`,
//! `AppointmentStore`, `Responder` and `AdmissionPipeline` for one tower
//! instance, and drives the per-head `BlockProcessor` cycle that wires the
//! Watcher's and Responder's reducer output into dispatch.
//!
//! `process_head` takes `&mut self`: it is driven by the single-threaded
//! head-processing scheduler spec.md §5 describes. `admit` takes `&self`:
//! admission requests arrive concurrently with block processing and touch
//! only the fields safe to share (`store`'s own per-locator locking,
//! `responder`'s mutex, the admission pipeline).

use crate::shared::{RelayCapacityHandle, SharedResponder};
use alloy_signer::Signer;
use pisa_admission::{AdmissionOutcome, AdmissionPipeline, AdmissionRequest, ProtocolInspector, Receipt};
use pisa_block_cache::BlockCache;
use pisa_chain_api::{ChainApi, SignedTransaction, TransactionSigner, TxCountTag};
use pisa_config::TowerConfig;
use pisa_errors::PisaResult;
use pisa_primitives::{Appointment, AppointmentId, Block, BlockHash, BlockNumber, PisaTransactionIdentifier};
use pisa_responder::{GasPriceEstimator, Responder, ResponderAction};
use pisa_store::AppointmentStore;
use pisa_watcher::{Watcher, WatcherAction};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A mined-but-not-yet-forgotten response transaction, tracked outside the
/// `Responder` itself so a reorg can be checked against the exact block
/// hash that mined it (the `Responder` only remembers the block number;
/// spec.md §4.5.3 "Reducer").
type MinedAt = FxHashMap<AppointmentId, (PisaTransactionIdentifier, BlockHash, BlockNumber)>;

/// One running tower instance: the glue named in spec.md §2/§9.
pub struct PisaService<C, K, I, S> {
    chain: C,
    chain_id: u64,
    store: AppointmentStore<K>,
    cache: BlockCache,
    watcher: Watcher,
    responder: Arc<SharedResponder>,
    responder_signer: S,
    admission: AdmissionPipeline<C, I, RelayCapacityHandle>,
    mined_at: MinedAt,
}

impl<C, K, I, S> std::fmt::Debug for PisaService<C, K, I, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PisaService")
            .field("chain_id", &self.chain_id)
            .field("cache", &self.cache)
            .field("watcher", &self.watcher)
            .field("responder", &self.responder)
            .field("admission", &self.admission)
            .finish()
    }
}

impl<C, K, I, S> PisaService<C, K, I, S>
where
    C: ChainApi + Clone,
    K: pisa_chain_api::KvStore,
    I: ProtocolInspector,
    S: TransactionSigner,
{
    /// Boots a tower instance. `empty_nonce` is seeded from
    /// `getTransactionCount(responder_signer.address(), "pending")` here,
    /// matching the Responder's wallet exclusivity invariant (spec.md
    /// §4.5.3). `receipt_signer` is the tower's accountability key used to
    /// sign customer receipts (spec.md §6) — modelled as a distinct port
    /// from `responder_signer` since EIP-191 message signing and raw
    /// transaction signing are different operations, even when an
    /// integration ultimately wires them to the same key.
    pub async fn new(
        config: TowerConfig,
        chain: C,
        store: AppointmentStore<K>,
        inspector: I,
        responder_signer: S,
        receipt_signer: Box<dyn Signer + Send + Sync>,
    ) -> PisaResult<Self> {
        config.validate()?;

        let chain_id = chain.get_chain_id().await?;
        let empty_nonce = chain.get_transaction_count(responder_signer.address(), TxCountTag::Pending).await?;

        let estimator = GasPriceEstimator::new(config.gas_curve_max_blocks, config.max_gas_price, config.gas_curve_median_blocks);
        let responder = Responder::new(
            empty_nonce,
            config.replacement_rate,
            config.max_concurrent_responses,
            config.confirmations_before_forget,
            estimator,
        );
        let responder = Arc::new(SharedResponder::new(responder));

        let watcher = Watcher::new(config.confirmations_before_response, config.confirmations_before_removal, config.block_cache_depth)?;
        let cache = BlockCache::new(config.block_cache_depth);

        let capacity = RelayCapacityHandle::new(responder.clone());
        let admission = AdmissionPipeline::new(config, chain.clone(), inspector, capacity, receipt_signer)?;

        Ok(Self {
            chain,
            chain_id,
            store,
            cache,
            watcher,
            responder,
            responder_signer,
            admission,
            mined_at: FxHashMap::default(),
        })
    }

    /// spec.md §4.3: validate, inspect, sign, and route to the Store
    /// (Watch mode) or straight to the Responder (Relay mode).
    pub async fn admit(&self, request: AdmissionRequest) -> PisaResult<Receipt> {
        let outcome = self.admission.admit(request).await?;
        match outcome {
            AdmissionOutcome::Store { receipt } => {
                self.store.add_or_update_by_locator(receipt.appointment.clone()).await?;
                Ok(receipt)
            }
            AdmissionOutcome::Relay { receipt } => {
                self.dispatch_relay(receipt.appointment.clone()).await;
                Ok(receipt)
            }
        }
    }

    /// Number of appointments currently held by the store, surfaced for
    /// metrics and diagnostics.
    pub fn appointment_count(&self) -> usize {
        self.store.len()
    }

    /// Current `GasQueue` depth, surfaced for metrics and diagnostics.
    pub fn queue_depth(&self) -> usize {
        self.responder.with(|responder| responder.queue().len())
    }

    async fn dispatch_relay(&self, appointment: Appointment) {
        let head = match self.chain.get_block_number().await {
            Ok(head) => head,
            Err(err) => {
                tracing::error!(%err, "failed to read head block for relay-mode startResponse");
                return;
            }
        };
        let spot_price = match self.chain.get_gas_price().await {
            Ok(price) => price,
            Err(err) => {
                tracing::error!(%err, "failed to read gas price for relay-mode startResponse");
                return;
            }
        };

        let action = self.responder.with(|responder| responder.start_response(appointment, self.chain_id, head, spot_price));
        match action {
            Ok(action) => self.dispatch_responder_action(action).await,
            Err(err) => tracing::error!(%err, "relay-mode startResponse rejected"),
        }
    }

    /// One `BlockProcessor` cycle (spec.md §2): extend the cache, recompute
    /// the Watcher's anchor state and dispatch its actions, recompute the
    /// Responder's anchor state (the mined-transaction scan below) and
    /// dispatch its actions.
    #[tracing::instrument(level = "debug", skip(self, head), fields(number = head.number))]
    pub async fn process_head(&mut self, head: Block) -> PisaResult<()> {
        let old_head = self.cache.head().cloned();
        self.cache.add(head)?;
        let new_head = self.cache.head().cloned().expect("just inserted a block");

        if let Some(old) = &old_head {
            if old.hash != new_head.hash && !self.is_ancestor(old.hash, new_head.hash) {
                self.handle_reorg(old, &new_head).await;
            }
        }

        self.dispatch_watcher_actions(&new_head).await;
        self.scan_for_mined_transactions(&new_head).await;

        for id in self.responder.with(|responder| responder.sweep_forgettable(new_head.number)) {
            self.responder.with(|responder| responder.end_response(id));
            self.mined_at.remove(&id);
        }

        metrics::gauge!("pisa_gas_queue_depth").set(self.responder.with(|responder| responder.queue().len() as f64));
        metrics::gauge!("pisa_watcher_appointments").set(self.store.len() as f64);

        Ok(())
    }

    fn is_ancestor(&self, candidate: BlockHash, of: BlockHash) -> bool {
        self.cache.ancestry(of).any(|block| block.hash == candidate)
    }

    /// A previously canonical head is no longer an ancestor of the new tip:
    /// rebuild Watcher anchor state from scratch and re-enqueue any
    /// Responder request whose mined block was reorged out (spec.md §9
    /// "Cyclic references... collapse to unidirectional message passing";
    /// §4.5.3 `reEnqueueMissingItems` "used to recover after reorgs").
    async fn handle_reorg(&mut self, old_head: &Block, new_head: &Block) {
        tracing::warn!(old = %old_head.hash, new = %new_head.hash, "reorg detected, rebuilding anchor state");
        self.watcher.reset();

        let stale: Vec<AppointmentId> = self
            .mined_at
            .iter()
            .filter(|(_, (_, mined_hash, _))| !self.is_ancestor(*mined_hash, new_head.hash))
            .map(|(id, _)| *id)
            .collect();
        if stale.is_empty() {
            return;
        }
        for id in &stale {
            self.mined_at.remove(id);
        }

        let spot_price = self.chain.get_gas_price().await.unwrap_or_else(|err| {
            tracing::error!(%err, "failed to read gas price during reorg recovery, falling back to 1");
            1
        });
        let action = self.responder.with(|responder| responder.re_enqueue_missing_items(&stale, new_head.number, spot_price));
        self.dispatch_responder_action(action).await;
    }

    async fn dispatch_watcher_actions(&mut self, head: &Block) {
        let appointments: Vec<Appointment> = self.store.get_all().collect();
        let actions = self.watcher.process_head(&self.cache, head, appointments.iter());

        for action in actions {
            match action {
                WatcherAction::StartResponse { appointment, .. } => {
                    let id = appointment.id;
                    let spot_price = match self.chain.get_gas_price().await {
                        Ok(price) => price,
                        Err(err) => {
                            tracing::error!(appointment_id = %id, %err, "failed to read gas price, dropping this startResponse");
                            continue;
                        }
                    };
                    let action = self.responder.with(|responder| responder.start_response(appointment, self.chain_id, head.number, spot_price));
                    match action {
                        Ok(action) => self.dispatch_responder_action(action).await,
                        Err(err) => tracing::error!(appointment_id = %id, %err, "startResponse dispatch failed"),
                    }
                }
                WatcherAction::RemoveAppointment { id } => {
                    if let Err(err) = self.store.remove_by_id(id).await {
                        tracing::error!(appointment_id = %id, %err, "removeAppointment dispatch failed");
                    }
                }
            }
        }
    }

    /// spec.md §4.5.3 "Reducer that feeds txMined": a tracked identifier is
    /// `Mined` once a block log/tx matches it at the nonce the queue
    /// expects.
    async fn scan_for_mined_transactions(&mut self, head: &Block) {
        let candidates: Vec<_> = head
            .transactions
            .iter()
            .filter_map(|tx| {
                let to = tx.to?;
                let identifier = PisaTransactionIdentifier::new(tx.chain_id, to, tx.data.clone(), tx.value, tx.gas_limit);
                let is_candidate = self.responder.with(|responder| {
                    let queue = responder.queue();
                    queue.find(&identifier).is_some() && queue.head().map(|item| item.nonce) == Some(tx.nonce)
                });
                is_candidate.then(|| (identifier, tx.nonce, tx.from == self.responder_signer.address()))
            })
            .collect();

        for (identifier, nonce, from_us) in candidates {
            let action = self.responder.with(|responder| responder.tx_mined(&identifier, nonce, head.number, from_us));
            match action {
                Ok(action) => {
                    if let Some(id) = self.responder.with(|responder| responder.tracked_id_for(&identifier)) {
                        self.mined_at.insert(id, (identifier, head.hash, head.number));
                    }
                    self.dispatch_responder_action(action).await;
                }
                Err(err) => tracing::error!(?identifier, %err, "txMined dispatch failed"),
            }
        }
    }

    async fn dispatch_responder_action(&self, action: ResponderAction) {
        match action {
            ResponderAction::Broadcast(identifiers) => {
                for identifier in identifiers {
                    self.broadcast(identifier).await;
                }
            }
            ResponderAction::AlreadyResponding { id } => {
                tracing::debug!(appointment_id = %id, "startResponse was a no-op: already responding");
            }
        }
    }

    async fn broadcast(&self, identifier: PisaTransactionIdentifier) {
        let found = self.responder.with(|responder| responder.queue().find(&identifier).map(|item| (item.gas_price, item.nonce)));
        let Some((gas_price, nonce)) = found else {
            tracing::warn!(?identifier, "broadcast requested for an identifier no longer in the queue");
            return;
        };

        let raw = match self
            .responder_signer
            .sign_transaction(identifier.to, identifier.data.clone(), identifier.value, identifier.gas_limit, gas_price, nonce, identifier.chain_id)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(?identifier, %err, "failed to sign response transaction");
                return;
            }
        };

        let tx = SignedTransaction {
            to: identifier.to,
            data: identifier.data.clone(),
            value: identifier.value,
            gas_limit: identifier.gas_limit,
            gas_price,
            nonce,
            chain_id: identifier.chain_id,
            raw,
        };

        if let Err(err) = self.chain.send_transaction(&tx).await {
            tracing::error!(?identifier, %err, "broadcast failed, will be re-issued on a future head tick");
        } else {
            metrics::counter!("pisa_responder_broadcasts_total").increment(1);
        }
    }
}
