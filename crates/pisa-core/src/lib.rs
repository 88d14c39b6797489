//! Glue crate (spec.md §2, §9): `PisaService` wires the `BlockCache`,
//! `Watcher`, `AppointmentStore`, `Responder` and `AdmissionPipeline`
//! together and drives the per-head `BlockProcessor` cycle. No binary is
//! built here — an external bootstrap (HTTP server, CLI) embeds this crate.

mod service;
mod shared;

pub use service::PisaService;
pub use shared::{RelayCapacityHandle, SharedResponder};
