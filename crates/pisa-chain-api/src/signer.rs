//! The signing port a Responder broadcasts through (spec.md §4.5.3 "owns
//! one signing key"). Concrete transaction-type encoding (legacy vs
//! EIP-1559, RLP framing) is the same external collaborator's concern as
//! the RPC client itself (spec.md §1: "the particular Ethereum RPC client"
//! is out of scope) — this port only asks for a raw signed payload given
//! the fields the core actually decided on.

use async_trait::async_trait;
use auto_impl::auto_impl;
use pisa_errors::PisaResult;
use pisa_primitives::{Address, Bytes, U256};

/// Signs and encodes outbound response transactions for one address. Owned
/// exclusively by a single `Responder` (spec.md §4.5.3 wallet exclusivity
/// invariant).
#[async_trait]
#[auto_impl(&, Arc)]
pub trait TransactionSigner: Send + Sync {
    /// The address this signer controls; seeds `emptyNonce` via
    /// `getTransactionCount(address, "pending")` at Responder startup.
    fn address(&self) -> Address;

    /// Signs and encodes a transaction with the given fields, returning the
    /// raw bytes ready for `ChainApi::send_transaction`.
    #[allow(clippy::too_many_arguments)]
    async fn sign_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        gas_limit: u64,
        gas_price: u128,
        nonce: u64,
        chain_id: u64,
    ) -> PisaResult<Bytes>;
}
