//! The admission request (spec.md §6 "Admission request") and its
//! structural/time-window validation. This is the unvalidated wire shape;
//! a successful `AdmissionPipeline::admit` turns it into an
//! `pisa_primitives::Appointment`.

use pisa_config::TowerConfig;
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Address, Appointment, AppointmentId, Bytes, EventFilter, Locator, Mode, B256, U256};

/// Raw admission request fields, named exactly as spec.md §6 lists them.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub challenge_period: u64,
    pub contract_address: Address,
    pub customer_address: Address,
    pub data: Bytes,
    pub end_block: u64,
    pub start_block: u64,
    pub topics: Vec<B256>,
    pub gas_limit: u64,
    pub id: u64,
    pub nonce: u64,
    pub mode: Mode,
    pub payment_hash: B256,
    pub post_condition: Bytes,
    pub refund: U256,
}

impl AdmissionRequest {
    /// Structural validation: the request is well-formed independent of
    /// current chain state (spec.md §6, §4.3).
    fn validate_structure(&self) -> PisaResult<()> {
        if self.start_block > self.end_block {
            return Err(PisaError::validation("startBlock must be <= endBlock"));
        }
        if self.gas_limit == 0 {
            return Err(PisaError::validation("gasLimit must be > 0"));
        }
        if self.contract_address.is_zero() {
            return Err(PisaError::validation("contractAddress must not be the zero address"));
        }
        if self.topics.is_empty() && matches!(self.mode, Mode::Watch) {
            return Err(PisaError::validation("watch-mode appointments require at least one event topic"));
        }
        Ok(())
    }

    /// Time-window validation against the current chain head (spec.md
    /// §4.3, §6 `minimumChallengePeriod`).
    fn validate_window(&self, config: &TowerConfig, head: u64) -> PisaResult<()> {
        if self.challenge_period < config.minimum_challenge_period {
            return Err(PisaError::validation(format!(
                "challengePeriod {} is below the minimum of {}",
                self.challenge_period, config.minimum_challenge_period
            )));
        }
        if self.start_block > head {
            return Err(PisaError::validation(format!("startBlock {} is ahead of the current head {head}", self.start_block)));
        }
        if self.end_block <= head {
            return Err(PisaError::validation(format!("endBlock {} has already elapsed at head {head}", self.end_block)));
        }
        if self.end_block - head < self.challenge_period {
            return Err(PisaError::validation("remaining window is shorter than the declared challenge period"));
        }
        Ok(())
    }

    /// Runs both structural and time-window validation (spec.md §4.3
    /// "validation"); the protocol inspection capability and relay-mode
    /// capacity check are layered on top by `AdmissionPipeline::admit`.
    pub fn validate(&self, config: &TowerConfig, head: u64) -> PisaResult<()> {
        self.validate_structure()?;
        self.validate_window(config, head)
    }

    /// Builds the immutable `Appointment` once validation has passed.
    /// `customerId` has no dedicated field in the wire request (spec.md §6
    /// lists only `customerAddress`); it is derived deterministically from
    /// the address so the store's `(customerId, jobId)` ordering key stays
    /// stable across repeated admissions from the same customer (see
    /// DESIGN.md).
    pub fn into_appointment(self) -> Appointment {
        let event_filter = EventFilter { address: self.contract_address, topics: self.topics.clone() };
        let locator = Locator::derive(self.contract_address, &self.topics);
        Appointment {
            id: AppointmentId(self.id),
            customer_id: customer_id_from_address(self.customer_address),
            job_id: self.nonce,
            nonce: self.nonce,
            locator,
            contract_address: self.contract_address,
            data: self.data,
            gas_limit: self.gas_limit,
            value: U256::ZERO,
            event_filter,
            start_block: self.start_block,
            end_block: self.end_block,
            mode: self.mode,
            payment_hash: self.payment_hash,
            refund: self.refund,
            post_condition: self.post_condition,
            challenge_period: self.challenge_period,
        }
    }
}

fn customer_id_from_address(address: Address) -> u64 {
    let bytes = address.into_array();
    u64::from_be_bytes(bytes[12..20].try_into().expect("last 8 bytes of a 20-byte address"))
}
