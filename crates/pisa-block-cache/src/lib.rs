//! Bounded in-memory DAG of recent blocks (spec.md §4.1).
//!
//! The cache holds every block handed to it until it falls outside the
//! retention window; multiple competing branches can coexist until one is
//! pruned by depth, so reorg handling here is implicit rather than an
//! explicit state transition — the same shape as `reth-blockchain-tree`'s
//! in-memory side chains, minus the on-disk canonicalization step, which
//! this core has no need for.

use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Block, BlockHash, BlockNumber};
use rustc_hash::FxHashMap;

/// Default number of blocks retained below the head (spec.md §4.1,
/// `blockCacheDepth`).
pub const DEFAULT_DEPTH: u64 = 200;

#[derive(Debug, Clone, Copy)]
struct HeadRef {
    hash: BlockHash,
    number: BlockNumber,
}

/// A bounded, multi-branch cache of recent blocks.
#[derive(Debug)]
pub struct BlockCache {
    depth: u64,
    blocks: FxHashMap<BlockHash, Block>,
    /// Blocks whose parent hasn't arrived yet, keyed by the missing parent
    /// hash, awaiting attachment.
    orphans: FxHashMap<BlockHash, Vec<Block>>,
    head: Option<HeadRef>,
}

impl BlockCache {
    /// Creates an empty cache retaining `depth` blocks below the head.
    pub fn new(depth: u64) -> Self {
        Self { depth, blocks: FxHashMap::default(), orphans: FxHashMap::default(), head: None }
    }

    /// The canonical tip: max `number`, ties broken by first observed
    /// (spec.md §4.1).
    pub fn head(&self) -> Option<&Block> {
        self.head.and_then(|h| self.blocks.get(&h.hash))
    }

    /// Looks up a block by hash. Unknown hashes return `None`, never an
    /// error (spec.md §4.1 "Failure model").
    pub fn get(&self, hash: BlockHash) -> Option<&Block> {
        self.blocks.get(&hash)
    }

    /// Idempotent insertion. Already-cached blocks are a no-op. Blocks whose
    /// parent cannot be found are buffered as orphans unless the parent is
    /// old enough to have already been pruned, in which case this fails
    /// with `PublicInspectionError`-adjacent `TransientIoError` classified
    /// detail (the caller, typically the `BlockProcessor`, decides whether
    /// to retry against the RPC for the missing ancestor).
    pub fn add(&mut self, block: Block) -> PisaResult<()> {
        if self.blocks.contains_key(&block.hash) {
            return Ok(());
        }

        let parent_known = self.blocks.contains_key(&block.parent_hash) || self.head.is_none();
        if !parent_known {
            let cutoff = self.retention_cutoff();
            if block.number.saturating_sub(1) < cutoff {
                return Err(PisaError::transient_io(format!(
                    "block {} (number {}) has a parent older than the retained depth",
                    block.hash, block.number
                )));
            }
            tracing::debug!(hash = %block.hash, number = block.number, "buffering orphan block");
            self.orphans.entry(block.parent_hash).or_default().push(block);
            return Ok(());
        }

        self.insert_and_attach(block);
        self.prune();
        Ok(())
    }

    fn insert_and_attach(&mut self, block: Block) {
        let hash = block.hash;
        let number = block.number;
        self.blocks.insert(hash, block);

        let better_head = match self.head {
            None => true,
            Some(h) => number > h.number,
        };
        if better_head {
            self.head = Some(HeadRef { hash, number });
        }

        if let Some(children) = self.orphans.remove(&hash) {
            for child in children {
                self.insert_and_attach(child);
            }
        }
    }

    fn retention_cutoff(&self) -> BlockNumber {
        match self.head {
            Some(h) => h.number.saturating_sub(self.depth),
            None => 0,
        }
    }

    /// Evicts blocks that have fallen below the retention window
    /// (spec.md §4.1 "Capacity").
    fn prune(&mut self) {
        let cutoff = self.retention_cutoff();
        self.blocks.retain(|_, b| b.number >= cutoff);
        self.orphans.retain(|_, children| {
            children.retain(|c| c.number >= cutoff);
            !children.is_empty()
        });
    }

    /// Lazy walk from `hash` toward the root, following `parent_hash`
    /// links, stopping when a parent is no longer cached.
    pub fn ancestry(&self, hash: BlockHash) -> Ancestry<'_> {
        Ancestry { cache: self, next: Some(hash) }
    }

    /// Returns the first ancestor of `hash` (inclusive) satisfying
    /// `predicate`, walking parents. Stops and returns `None` once a block
    /// older than `min_height` is reached, if given, or when the cache runs
    /// out of known ancestors (spec.md §4.1).
    pub fn find_ancestor<'a>(
        &'a self,
        hash: BlockHash,
        min_height: Option<BlockNumber>,
        mut predicate: impl FnMut(&Block) -> bool,
    ) -> Option<&'a Block> {
        for block in self.ancestry(hash) {
            if let Some(min) = min_height {
                if block.number < min {
                    return None;
                }
            }
            if predicate(block) {
                return Some(block);
            }
        }
        None
    }
}

/// Iterator returned by [`BlockCache::ancestry`].
pub struct Ancestry<'a> {
    cache: &'a BlockCache,
    next: Option<BlockHash>,
}

impl<'a> Iterator for Ancestry<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        let block = self.cache.blocks.get(&hash)?;
        // A block whose parent hash is itself is the synthetic root sentinel
        // (genesis); stop there instead of looping forever.
        self.next = (block.parent_hash != hash).then_some(block.parent_hash);
        Some(block)
    }
}
