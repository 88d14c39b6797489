//! The protocol inspection capability (spec.md §4.3, §9 "inheritance
//! hierarchies... map to a capability abstraction"). Channel-specific ABIs
//! are an external collaborator per spec.md §1; this trait is the seam a
//! per-protocol integration implements to validate an incoming request
//! against live chain state (correct nonce, channel still open, valid
//! signatures) before the tower accepts liability for it.

use async_trait::async_trait;
use auto_impl::auto_impl;
use crate::request::AdmissionRequest;
use pisa_chain_api::ChainApi;
use pisa_errors::PisaResult;

/// Validates protocol-specific chain state for an incoming request. Failure
/// must be raised as `PisaError::PublicInspectionError` (spec.md §7) — it is
/// safe to expose to the customer.
#[async_trait]
#[auto_impl(&, Arc, Box)]
pub trait ProtocolInspector: Send + Sync {
    async fn inspect(&self, chain: &dyn ChainApi, request: &AdmissionRequest) -> PisaResult<()>;
}

/// An inspector that accepts every request unconditionally. Used where no
/// protocol-specific validation applies (e.g. relay-mode jobs with no
/// on-chain precondition) and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInspector;

#[async_trait]
impl ProtocolInspector for NoopInspector {
    async fn inspect(&self, _chain: &dyn ChainApi, _request: &AdmissionRequest) -> PisaResult<()> {
        Ok(())
    }
}
