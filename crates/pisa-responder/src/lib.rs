//! The Responder side of the tower (spec.md §4.5): a gas-price estimator,
//! the pure `GasQueue` it drives, and the `Responder` reducer that turns
//! `StartResponse`/`txMined` events into broadcast actions for `pisa-core`
//! to carry out.

mod gas_price;
mod queue;
mod responder;

pub use gas_price::GasPriceEstimator;
pub use queue::{GasQueue, GasQueueError, GasQueueItem, ResponseRequest};
pub use responder::{RequestState, Responder, ResponderAction};
