//! Durable, authoritative store of admitted appointments (spec.md §4.2).
//!
//! The in-memory indexes (`DashMap`) are authoritative for reads; every
//! mutation is first written through the `KvStore` port and only applied
//! in-memory once the batch is acknowledged, so a crash between the two
//! never leaves the log ahead of memory. Per-locator writes are serialized
//! by an owned `tokio::sync::Mutex` obtained per locator, the async
//! equivalent of the per-shard locking `DashMap::entry` gives synchronously
//! — needed here because the critical section spans an `.await` on the
//! persistence call.

use dashmap::DashMap;
use pisa_chain_api::{KvStore, Mutation};
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Appointment, AppointmentId, BlockNumber, Locator};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

const ID_PREFIX: &[u8] = b"id:";
const LOCATOR_PREFIX: &[u8] = b"loc:";

/// Local detail behind `PisaError::PublicValidationError` for store
/// operations (spec.md §4.2, §8 scenario 3).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job id too low: a newer job already exists for this locator")]
    JobIdTooLow,
}

impl From<StoreError> for PisaError {
    fn from(err: StoreError) -> Self {
        PisaError::validation(err)
    }
}

fn id_key(id: AppointmentId) -> Vec<u8> {
    let mut key = ID_PREFIX.to_vec();
    key.extend_from_slice(&id.0.to_be_bytes());
    key
}

fn locator_key(locator: Locator) -> Vec<u8> {
    let mut key = LOCATOR_PREFIX.to_vec();
    key.extend_from_slice(locator.0.as_slice());
    key
}

/// The persistent, authoritative set of admitted appointments.
pub struct AppointmentStore<K> {
    kv: K,
    id_index: DashMap<AppointmentId, Appointment>,
    locator_index: DashMap<Locator, AppointmentId>,
    locator_locks: DashMap<Locator, Arc<AsyncMutex<()>>>,
}

impl<K: std::fmt::Debug> std::fmt::Debug for AppointmentStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentStore")
            .field("kv", &self.kv)
            .field("appointments", &self.id_index.len())
            .finish()
    }
}

impl<K: KvStore> AppointmentStore<K> {
    /// Replays the log into fresh in-memory indexes (spec.md §4.2
    /// "Persistence": "on startup, the store replays the log").
    pub async fn load(kv: K) -> PisaResult<Self> {
        let id_index = DashMap::new();
        for (_, value) in kv.scan_prefix(ID_PREFIX).await? {
            let appointment: Appointment = serde_json::from_slice(&value)
                .map_err(|e| PisaError::transient_io(format!("corrupt appointment record: {e}")))?;
            id_index.insert(appointment.id, appointment);
        }

        let locator_index = DashMap::new();
        for (key, value) in kv.scan_prefix(LOCATOR_PREFIX).await? {
            let locator_bytes = &key[LOCATOR_PREFIX.len()..];
            let locator = Locator(pisa_primitives::B256::from_slice(locator_bytes));
            let id_bytes: [u8; 8] = value
                .as_slice()
                .try_into()
                .map_err(|_| PisaError::transient_io("corrupt locator index record"))?;
            locator_index.insert(locator, AppointmentId(u64::from_be_bytes(id_bytes)));
        }

        Ok(Self { kv, id_index, locator_index, locator_locks: DashMap::new() })
    }

    async fn lock_for(&self, locator: Locator) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locator_locks
            .entry(locator)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// `addOrUpdateByLocator` (spec.md §4.2). Serialized per locator across
    /// the read-check-write-persist sequence.
    pub async fn add_or_update_by_locator(&self, appointment: Appointment) -> PisaResult<()> {
        let _guard = self.lock_for(appointment.locator).await;

        if let Some(existing_id) = self.locator_index.get(&appointment.locator).map(|v| *v) {
            let existing = self
                .id_index
                .get(&existing_id)
                .map(|a| a.update_key())
                .unwrap_or((0, 0));
            if appointment.update_key() <= existing {
                return Err(StoreError::JobIdTooLow.into());
            }

            let batch = vec![
                Mutation::Delete { key: id_key(existing_id) },
                Mutation::Put { key: id_key(appointment.id), value: encode(&appointment)? },
                Mutation::Put {
                    key: locator_key(appointment.locator),
                    value: appointment.id.0.to_be_bytes().to_vec(),
                },
            ];
            self.kv.apply_batch(batch).await?;

            self.id_index.remove(&existing_id);
            let (id, locator) = (appointment.id, appointment.locator);
            self.id_index.insert(id, appointment);
            self.locator_index.insert(locator, id);
        } else {
            let batch = vec![
                Mutation::Put { key: id_key(appointment.id), value: encode(&appointment)? },
                Mutation::Put {
                    key: locator_key(appointment.locator),
                    value: appointment.id.0.to_be_bytes().to_vec(),
                },
            ];
            self.kv.apply_batch(batch).await?;

            let (id, locator) = (appointment.id, appointment.locator);
            self.id_index.insert(id, appointment);
            self.locator_index.insert(locator, id);
        }

        Ok(())
    }

    /// `removeById` (spec.md §4.2). Idempotent; returns whether anything
    /// was removed.
    pub async fn remove_by_id(&self, id: AppointmentId) -> PisaResult<bool> {
        let Some(appointment) = self.id_index.get(&id).map(|entry| entry.value().clone()) else {
            return Ok(false);
        };

        let _guard = self.lock_for(appointment.locator).await;
        let mut batch = vec![Mutation::Delete { key: id_key(id) }];
        let still_current = self.locator_index.get(&appointment.locator).map(|v| *v) == Some(id);
        if still_current {
            batch.push(Mutation::Delete { key: locator_key(appointment.locator) });
        }
        self.kv.apply_batch(batch).await?;

        self.id_index.remove(&id);
        if still_current {
            self.locator_index.remove(&appointment.locator);
        }
        Ok(true)
    }

    /// Snapshot iterator over current entries (spec.md §4.2 `getAll`).
    pub fn get_all(&self) -> impl Iterator<Item = Appointment> + '_ {
        self.id_index.iter().map(|entry| entry.value().clone())
    }

    /// Entries with `endBlock < block` (spec.md §4.2 `getExpiredSince`).
    pub fn get_expired_since(&self, block: BlockNumber) -> impl Iterator<Item = Appointment> + '_ {
        self.id_index.iter().filter(move |entry| entry.value().end_block < block).map(|entry| entry.value().clone())
    }

    /// Looks up a single appointment by id.
    pub fn get_by_id(&self, id: AppointmentId) -> Option<Appointment> {
        self.id_index.get(&id).map(|a| a.clone())
    }

    pub fn len(&self) -> usize {
        self.id_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_index.is_empty()
    }
}

fn encode(appointment: &Appointment) -> PisaResult<Vec<u8>> {
    serde_json::to_vec(appointment)
        .map_err(|e| PisaError::argument(format!("failed to encode appointment: {e}")))
}
