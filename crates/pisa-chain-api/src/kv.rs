use async_trait::async_trait;
use auto_impl::auto_impl;
use pisa_errors::PisaResult;

/// One mutation in an atomic batch (spec.md §6: "atomic batched put/delete").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// The persistence port consumed by `AppointmentStore` (spec.md §4.2, §6):
/// an atomic batched key-value store with durability on commit and a range
/// scan for replay. Neither a concrete embedded database nor a network
/// protocol is implemented here; a file- or database-backed adapter is an
/// external collaborator.
#[async_trait]
#[auto_impl(&, Arc)]
pub trait KvStore: Send + Sync {
    /// Applies every mutation in `batch` atomically. A successful return
    /// means the batch has been fsync'd: "a write is not acknowledged until
    /// fsync'd" (spec.md §4.2).
    async fn apply_batch(&self, batch: Vec<Mutation>) -> PisaResult<()>;

    /// Scans every key/value pair whose key starts with `prefix`, in
    /// unspecified order. Used at startup to replay the log into the
    /// in-memory indexes.
    async fn scan_prefix(&self, prefix: &[u8]) -> PisaResult<Vec<(Vec<u8>, Vec<u8>)>>;
}
