//! Core data types shared across the tower: appointments, the block cache's
//! view of chain data, and the logical transaction identifier the gas queue
//! orders by.

mod appointment;
mod block;
mod identifier;
mod locator;

pub use appointment::{Appointment, AppointmentId, EventFilter, Mode};
pub use block::{Block, BlockHash, BlockNumber, Log, TxRecord};
pub use identifier::PisaTransactionIdentifier;
pub use locator::Locator;

pub use alloy_primitives::{Address, Bytes, B256, U256};
