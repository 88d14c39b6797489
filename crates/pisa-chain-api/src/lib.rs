//! The two ports the core consumes and never implements (spec.md §1, §6):
//! an Ethereum-flavoured chain RPC and a durable key-value store. Neither
//! the concrete RPC client nor the embedded database belongs in this
//! workspace — they are external collaborators — but the trait shape
//! follows `reth-network-api`/`reth-provider`'s `#[async_trait] +
//! #[auto_impl(&, Arc)]` convention so a concrete adapter is a drop-in.

mod kv;
mod signer;

use async_trait::async_trait;
use auto_impl::auto_impl;
use futures::stream::BoxStream;
use pisa_errors::PisaResult;
use pisa_primitives::{Address, Block, BlockNumber, Bytes, B256, U256};

pub use kv::{KvStore, Mutation};
pub use signer::TransactionSigner;

/// Which mempool view `getTransactionCount` should answer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCountTag {
    /// Counts transactions still pending in the mempool; authoritative for
    /// `emptyNonce` reconciliation on Responder startup (spec.md §4.5.3).
    Pending,
    /// Counts only mined transactions.
    Latest,
}

/// A transaction ready for broadcast: the Responder's signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
    pub raw: Bytes,
}

/// The chain RPC port consumed by admission, the Watcher and the Responder
/// (spec.md §6). Every method may fail transiently; callers classify
/// failures as `TransientIoError` and retry on the next head tick.
#[async_trait]
#[auto_impl(&, Arc)]
pub trait ChainApi: Send + Sync {
    /// `getCode(address)` — empty bytes if no contract is deployed there.
    async fn get_code(&self, address: Address) -> PisaResult<Bytes>;

    /// `getBlockNumber()`.
    async fn get_block_number(&self) -> PisaResult<BlockNumber>;

    /// `getTransactionCount(address, tag)`.
    async fn get_transaction_count(&self, address: Address, tag: TxCountTag) -> PisaResult<u64>;

    /// `getGasPrice()` — the node-reported spot price, `P0` in spec.md
    /// §4.5.1.
    async fn get_gas_price(&self) -> PisaResult<u128>;

    /// `getNetwork() -> chainId`.
    async fn get_chain_id(&self) -> PisaResult<u64>;

    /// `call(contract, method, args)` — used by protocol inspectors during
    /// admission; the ABI encoding of `data` is the caller's concern.
    async fn call(&self, contract: Address, data: Bytes) -> PisaResult<Bytes>;

    /// `sendTransaction(tx)`. Broadcast failures are logged and swallowed
    /// by the caller, never propagated into reducer state (spec.md §4.5.3).
    async fn send_transaction(&self, tx: &SignedTransaction) -> PisaResult<B256>;

    /// Block subscription: delivers `{hash, number, parentHash, logs,
    /// transactions}` for every new head. Each item drives one
    /// `BlockProcessor` cycle (spec.md §6).
    fn subscribe_new_heads(&self) -> BoxStream<'static, Block>;
}
