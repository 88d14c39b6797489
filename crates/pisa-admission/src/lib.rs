//! Admission pipeline (spec.md §4.3): validates an incoming job, signs a
//! receipt, and routes it to the `AppointmentStore` (Watch mode) or
//! straight to a Responder (Relay mode).

mod inspector;
mod pipeline;
mod receipt;
mod request;

pub use inspector::{NoopInspector, ProtocolInspector};
pub use pipeline::{AdmissionOutcome, AdmissionPipeline, RelayCapacity};
pub use receipt::{sign_receipt, signer_address, Receipt};
pub use request::AdmissionRequest;
