//! Integration tests driving `PisaService` end to end against fake ports,
//! covering the concrete scenarios spec.md §8 names at the level a real
//! bootstrap would exercise it: admit a job, feed it blocks, check dispatch.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use pisa_admission::{AdmissionRequest, NoopInspector};
use pisa_chain_api::{ChainApi, KvStore, Mutation, SignedTransaction, TransactionSigner, TxCountTag};
use pisa_config::TowerConfig;
use pisa_core::PisaService;
use pisa_errors::{PisaError, PisaResult};
use pisa_primitives::{Address, Block, Bytes, Log, Mode, TxRecord, B256, U256};
use pisa_store::AppointmentStore;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

#[derive(Debug)]
struct FakeChainState {
    block_number: u64,
    gas_price: u128,
    chain_id: u64,
    tx_count: u64,
    sent: Vec<SignedTransaction>,
}

#[derive(Debug, Clone)]
struct FakeChain(Arc<StdMutex<FakeChainState>>);

impl FakeChain {
    fn new(chain_id: u64, tx_count: u64) -> Self {
        Self(Arc::new(StdMutex::new(FakeChainState { block_number: 0, gas_price: 10_000_000_000, chain_id, tx_count, sent: Vec::new() })))
    }

    fn set_block_number(&self, number: u64) {
        self.0.lock().unwrap().block_number = number;
    }

    fn sent(&self) -> Vec<SignedTransaction> {
        self.0.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl ChainApi for FakeChain {
    async fn get_code(&self, _address: Address) -> PisaResult<Bytes> {
        Ok(Bytes::new())
    }
    async fn get_block_number(&self) -> PisaResult<u64> {
        Ok(self.0.lock().unwrap().block_number)
    }
    async fn get_transaction_count(&self, _address: Address, _tag: TxCountTag) -> PisaResult<u64> {
        Ok(self.0.lock().unwrap().tx_count)
    }
    async fn get_gas_price(&self) -> PisaResult<u128> {
        Ok(self.0.lock().unwrap().gas_price)
    }
    async fn get_chain_id(&self) -> PisaResult<u64> {
        Ok(self.0.lock().unwrap().chain_id)
    }
    async fn call(&self, _contract: Address, _data: Bytes) -> PisaResult<Bytes> {
        Ok(Bytes::new())
    }
    async fn send_transaction(&self, tx: &SignedTransaction) -> PisaResult<B256> {
        self.0.lock().unwrap().sent.push(tx.clone());
        Ok(B256::ZERO)
    }
    fn subscribe_new_heads(&self) -> BoxStream<'static, Block> {
        Box::pin(stream::empty())
    }
}

#[derive(Debug, Clone, Copy)]
struct FakeSigner(Address);

#[async_trait]
impl TransactionSigner for FakeSigner {
    fn address(&self) -> Address {
        self.0
    }

    async fn sign_transaction(
        &self,
        _to: Address,
        _data: Bytes,
        _value: U256,
        _gas_limit: u64,
        _gas_price: u128,
        nonce: u64,
        _chain_id: u64,
    ) -> PisaResult<Bytes> {
        Ok(Bytes::from(nonce.to_be_bytes().to_vec()))
    }
}

#[derive(Debug, Default)]
struct MemoryKv {
    data: StdMutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn apply_batch(&self, batch: Vec<Mutation>) -> PisaResult<()> {
        let mut data = self.data.lock().unwrap();
        for mutation in batch {
            match mutation {
                Mutation::Put { key, value } => {
                    data.insert(key, value);
                }
                Mutation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> PisaResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.lock().unwrap();
        Ok(data.range(prefix.to_vec()..).take_while(|(k, _)| k.starts_with(prefix)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn block(number: u64, hash: u8, parent: u8, logs: Vec<Log>, transactions: Vec<TxRecord>) -> Block {
    Block { hash: B256::repeat_byte(hash), parent_hash: B256::repeat_byte(parent), number, logs, transactions }
}

fn watch_request(id: u64, nonce: u64, contract_address: Address, topic: B256, customer_address: Address) -> AdmissionRequest {
    AdmissionRequest {
        challenge_period: 50,
        contract_address,
        customer_address,
        data: Bytes::new(),
        end_block: 1_000,
        start_block: 0,
        topics: vec![topic],
        gas_limit: 100_000,
        id,
        nonce,
        mode: Mode::Watch,
        payment_hash: B256::ZERO,
        post_condition: Bytes::new(),
        refund: U256::ZERO,
    }
}

fn relay_request(id: u64, contract_address: Address, data: Bytes) -> AdmissionRequest {
    AdmissionRequest {
        challenge_period: 50,
        contract_address,
        customer_address: Address::repeat_byte(0xEE),
        data,
        end_block: 1_000,
        start_block: 0,
        topics: vec![],
        gas_limit: 100_000,
        id,
        nonce: 1,
        mode: Mode::Relay,
        payment_hash: B256::ZERO,
        post_condition: Bytes::new(),
        refund: U256::ZERO,
    }
}

async fn service(
    chain: FakeChain,
    signer_address: Address,
) -> PisaService<FakeChain, MemoryKv, NoopInspector, FakeSigner> {
    let store = AppointmentStore::load(MemoryKv::default()).await.unwrap();
    PisaService::new(TowerConfig::default(), chain, store, NoopInspector, FakeSigner(signer_address), Box::new(alloy_signer_local::PrivateKeySigner::random()))
        .await
        .unwrap()
}

/// spec.md §8 scenario 1: happy watch — admit, observe a matching log at
/// block 50, no broadcast until the confirmation depth elapses at block 53.
#[tokio::test]
async fn happy_watch_fires_start_response_after_confirmations() {
    let chain = FakeChain::new(1, 0);
    let signer_address = Address::repeat_byte(0xAB);
    let mut service = service(chain.clone(), signer_address).await;

    let contract = Address::repeat_byte(5);
    let topic = B256::repeat_byte(0xAA);
    service.admit(watch_request(1, 1, contract, topic, Address::repeat_byte(9))).await.unwrap();
    assert_eq!(service.appointment_count(), 1);

    service.process_head(block(0, 0, 0, vec![], vec![])).await.unwrap();
    for i in 1..50u64 {
        service.process_head(block(i, i as u8, (i - 1) as u8, vec![], vec![])).await.unwrap();
    }
    let observing_log = Log { address: contract, topics: vec![topic], data: Bytes::new() };
    service.process_head(block(50, 50, 49, vec![observing_log], vec![])).await.unwrap();

    for i in 51..53u64 {
        service.process_head(block(i, i as u8, (i - 1) as u8, vec![], vec![])).await.unwrap();
        assert!(chain.sent().is_empty(), "no broadcast before confirmations elapse at block {i}");
    }

    service.process_head(block(53, 53, 52, vec![], vec![])).await.unwrap();
    assert_eq!(chain.sent().len(), 1, "StartResponse must fire exactly once confirmations_before_response elapses");
}

/// spec.md §8 scenario 3: job replacement — a lower job id for the same
/// locator is rejected, a higher one replaces it.
#[tokio::test]
async fn job_replacement_requires_a_higher_job_id() {
    let chain = FakeChain::new(1, 0);
    let service = service(chain, Address::repeat_byte(0xAB)).await;

    let contract = Address::repeat_byte(5);
    let topic = B256::repeat_byte(0xAA);
    let customer = Address::repeat_byte(9);

    service.admit(watch_request(1, 5, contract, topic, customer)).await.unwrap();
    assert_eq!(service.appointment_count(), 1);

    let err = service.admit(watch_request(2, 3, contract, topic, customer)).await.unwrap_err();
    assert!(matches!(err, PisaError::PublicValidationError(_)));
    assert_eq!(service.appointment_count(), 1);

    service.admit(watch_request(3, 10, contract, topic, customer)).await.unwrap();
    assert_eq!(service.appointment_count(), 1, "replacement updates in place rather than appending");
}

/// spec.md §4.3 relay mode: `StartResponse` fires synchronously out of
/// admission, with no block ever needing to be processed.
#[tokio::test]
async fn relay_mode_broadcasts_immediately_on_admission() {
    let chain = FakeChain::new(7, 3);
    let signer_address = Address::repeat_byte(0xCD);
    let service = service(chain.clone(), signer_address).await;

    let contract = Address::repeat_byte(6);
    service.admit(relay_request(1, contract, Bytes::from_static(b"\x01\x02"))).await.unwrap();

    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, contract);
    assert_eq!(sent[0].nonce, 3, "first response must use the seeded empty_nonce");
    assert_eq!(sent[0].chain_id, 7);
}

/// spec.md §8 scenario 5-adjacent: once a relay-mode response is observed
/// mined on chain, the Responder dequeues it without re-broadcasting.
#[tokio::test]
async fn mined_relay_response_is_dequeued_without_a_second_broadcast() {
    let chain = FakeChain::new(1, 0);
    let signer_address = Address::repeat_byte(0xEF);
    let mut service = service(chain.clone(), signer_address).await;

    service.process_head(block(0, 0, 0, vec![], vec![])).await.unwrap();

    let contract = Address::repeat_byte(8);
    let data = Bytes::from_static(b"\x09");
    service.admit(relay_request(1, contract, data.clone())).await.unwrap();
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(service.queue_depth(), 1);

    let mined_tx = TxRecord { from: signer_address, to: Some(contract), nonce: 0, data, value: U256::ZERO, gas_limit: 100_000, chain_id: 1 };
    service.process_head(block(1, 1, 0, vec![], vec![mined_tx])).await.unwrap();

    assert_eq!(service.queue_depth(), 0);
    assert_eq!(chain.sent().len(), 1, "a mined transaction does not get rebroadcast");
}

/// spec.md §8 scenario 5: a non-head identifier is mined at the head's
/// nonce (a replacement/out-of-order mining). The core must still flag it
/// as mined via `Responder::tx_mined`'s `consume` branch, not just the
/// head item's own `dequeue` branch.
#[tokio::test]
async fn out_of_order_mining_consumes_the_non_head_identifier() {
    let chain = FakeChain::new(1, 0);
    let signer_address = Address::repeat_byte(0x12);
    let mut service = service(chain.clone(), signer_address).await;

    service.process_head(block(0, 0, 0, vec![], vec![])).await.unwrap();

    let first_contract = Address::repeat_byte(0x21);
    let second_contract = Address::repeat_byte(0x22);
    let second_data = Bytes::from_static(b"\x02");

    service.admit(relay_request(1, first_contract, Bytes::from_static(b"\x01"))).await.unwrap();
    service.admit(relay_request(2, second_contract, second_data.clone())).await.unwrap();
    assert_eq!(service.queue_depth(), 2);

    // The chain mined a transaction matching the second (non-head) item's
    // identifier, but at the nonce the head item was assigned.
    let mined_tx =
        TxRecord { from: signer_address, to: Some(second_contract), nonce: 0, data: second_data, value: U256::ZERO, gas_limit: 100_000, chain_id: 1 };
    service.process_head(block(1, 1, 0, vec![], vec![mined_tx])).await.unwrap();

    assert_eq!(service.queue_depth(), 1, "the non-head item is consumed, leaving only the head item queued");
}

/// spec.md §8 scenario 6: expiry sweep — `RemoveAppointment` fires exactly
/// once, at `endBlock + confirmationsBeforeRemoval + 1`, never earlier.
#[tokio::test]
async fn expiry_sweep_removes_the_appointment_exactly_once() {
    let chain = FakeChain::new(1, 0);
    let mut service = service(chain, Address::repeat_byte(0xAB)).await;

    let contract = Address::repeat_byte(4);
    let topic = B256::repeat_byte(0xBB);
    service.admit(watch_request(1, 1, contract, topic, Address::repeat_byte(3))).await.unwrap();

    // A second appointment on a distinct locator, due to expire at block 200
    // without ever observing a matching log.
    let expiring = AdmissionRequest {
        end_block: 200,
        ..watch_request(2, 2, Address::repeat_byte(44), B256::repeat_byte(0xCC), Address::repeat_byte(3))
    };
    service.admit(expiring).await.unwrap();
    assert_eq!(service.appointment_count(), 2);

    service.process_head(block(0, 0, 0, vec![], vec![])).await.unwrap();
    for i in 1..=220u64 {
        service.process_head(block(i, i as u8, (i - 1) as u8, vec![], vec![])).await.unwrap();
    }
    assert_eq!(service.appointment_count(), 2, "no removal before confirmations_before_removal elapses past endBlock");

    service.process_head(block(221, 221, 220, vec![], vec![])).await.unwrap();
    assert_eq!(service.appointment_count(), 1, "exactly one appointment expires at block 221");
}
