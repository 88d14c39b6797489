//! Receipt signing (spec.md §6 "Receipt signature"): the tower signs
//! `keccak256(pack(appointment-canonical-fields))` with its accountability
//! key, EIP-191-prefixed, so the customer holds proof the tower accepted
//! liability for the job.

use alloy_primitives::keccak256;
use alloy_signer::Signer;
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Address, Appointment, Bytes};

/// `{appointment, signature}` — returned to the customer on successful
/// admission (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub appointment: Appointment,
    pub signature: Bytes,
}

/// Canonical field-order encoding the signature is computed over (spec.md
/// §6 "pack is the fixed field order above, each field encoded in its
/// canonical binary form"). `customerAddress` is not part of the stored
/// `Appointment`, so it is not included here — the receipt binds the
/// fields the tower actually commits to act on.
fn pack(appointment: &Appointment) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&appointment.challenge_period.to_be_bytes());
    buf.extend_from_slice(appointment.contract_address.as_slice());
    buf.extend_from_slice(&(appointment.data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&appointment.data);
    buf.extend_from_slice(&appointment.end_block.to_be_bytes());
    buf.extend_from_slice(&appointment.start_block.to_be_bytes());
    buf.extend_from_slice(&(appointment.event_filter.topics.len() as u32).to_be_bytes());
    for topic in &appointment.event_filter.topics {
        buf.extend_from_slice(topic.as_slice());
    }
    buf.extend_from_slice(&appointment.gas_limit.to_be_bytes());
    buf.extend_from_slice(&appointment.id.0.to_be_bytes());
    buf.extend_from_slice(&appointment.nonce.to_be_bytes());
    buf.push(appointment.mode as u8);
    buf.extend_from_slice(appointment.payment_hash.as_slice());
    buf.extend_from_slice(&(appointment.post_condition.len() as u32).to_be_bytes());
    buf.extend_from_slice(&appointment.post_condition);
    buf.extend_from_slice(&appointment.refund.to_be_bytes::<32>());
    buf
}

/// Signs `appointment` with the tower's accountability key. `signer` is
/// expected to apply the EIP-191 `"\x19Ethereum Signed Message\n" ∥ len ∥
/// digest` prefix itself (the way `alloy_signer::Signer::sign_message`
/// does), not raw-sign the digest.
pub async fn sign_receipt(signer: &(dyn Signer + Send + Sync), appointment: Appointment) -> PisaResult<Receipt> {
    let digest = keccak256(pack(&appointment));
    let signature = signer
        .sign_message(digest.as_slice())
        .await
        .map_err(|e| PisaError::transient_io(format!("receipt signing failed: {e}")))?;
    Ok(Receipt { appointment, signature: Bytes::from(signature.as_bytes().to_vec()) })
}

/// The tower's accountability address, surfaced so a receipt's caller can
/// tell the customer who signed it without re-deriving from the signature.
pub fn signer_address(signer: &dyn Signer) -> Address {
    signer.address()
}
