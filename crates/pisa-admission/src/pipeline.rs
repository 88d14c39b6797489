//! `AdmissionPipeline` (spec.md §4.3): validates an incoming request,
//! signs a receipt, and routes the resulting `Appointment` to the store
//! (Watch mode) or directly to a Responder (Relay mode, capacity
//! permitting).

use crate::inspector::ProtocolInspector;
use crate::receipt::{sign_receipt, Receipt};
use crate::request::AdmissionRequest;
use alloy_signer::Signer;
use pisa_chain_api::ChainApi;
use pisa_config::TowerConfig;
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Appointment, Mode};

/// Where `AdmissionPipeline::admit` routes a freshly signed appointment.
/// `pisa-core` carries out the dispatch this enum names; the pipeline
/// itself performs no store or responder I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Watch mode: persist to the `AppointmentStore` and let the Watcher
    /// pick it up on the next head.
    Store { receipt: Receipt },
    /// Relay mode: hand straight to the Responder.
    Relay { receipt: Receipt },
}

impl AdmissionOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            Self::Store { receipt } | Self::Relay { receipt } => &receipt.appointment,
        }
    }
}

/// The gate a relay-mode admission checks before accepting a job: "is there
/// room in the owning Responder's `GasQueue`?" (spec.md §4.3, §6
/// `maxConcurrentResponses`). Implemented in `pisa-core` against the live
/// `GasQueue::depth_reached`.
pub trait RelayCapacity: Send + Sync {
    fn has_capacity(&self) -> bool;
}

/// Validates, inspects, signs and routes incoming admission requests for a
/// single tower instance.
pub struct AdmissionPipeline<C, I, R> {
    config: TowerConfig,
    chain: C,
    inspector: I,
    capacity: R,
    signer: Box<dyn Signer + Send + Sync>,
}

impl<C, I, R> std::fmt::Debug for AdmissionPipeline<C, I, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPipeline").field("config", &self.config).finish()
    }
}

impl<C, I, R> AdmissionPipeline<C, I, R>
where
    C: ChainApi,
    I: ProtocolInspector,
    R: RelayCapacity,
{
    pub fn new(config: TowerConfig, chain: C, inspector: I, capacity: R, signer: Box<dyn Signer + Send + Sync>) -> PisaResult<Self> {
        config.validate()?;
        Ok(Self { config, chain, inspector, capacity, signer })
    }

    /// spec.md §4.3: structural validation, time-window validation,
    /// protocol inspection, relay-mode capacity check, receipt signing,
    /// routing — in that order, so the cheapest checks reject first.
    #[tracing::instrument(level = "debug", skip(self, request))]
    pub async fn admit(&self, request: AdmissionRequest) -> PisaResult<AdmissionOutcome> {
        let head = self.chain.get_block_number().await?;
        request.validate(&self.config, head)?;

        self.inspector.inspect(&self.chain, &request).await?;

        if matches!(request.mode, Mode::Relay) && !self.capacity.has_capacity() {
            return Err(PisaError::validation("responder queue is at capacity; relay-mode admission rejected"));
        }

        let appointment = request.into_appointment();
        let mode = appointment.mode;
        let receipt = sign_receipt(self.signer.as_ref(), appointment).await?;

        Ok(match mode {
            Mode::Watch => AdmissionOutcome::Store { receipt },
            Mode::Relay => AdmissionOutcome::Relay { receipt },
        })
    }
}
