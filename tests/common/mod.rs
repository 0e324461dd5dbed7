#![allow(dead_code)]

use async_trait::async_trait;
use novalnet_bridge::application::engine::{EngineSettings, ReconciliationEngine};
use novalnet_bridge::domain::ledger::{Ledger, LedgerDraft, LedgerId, Operation};
use novalnet_bridge::domain::money::MinorUnits;
use novalnet_bridge::domain::notification::PaymentResult;
use novalnet_bridge::domain::ports::{Endpoint, Gateway, LedgerStore, LedgerStoreBox};
use novalnet_bridge::error::{PaymentError, Result};
use novalnet_bridge::infrastructure::in_memory::{InMemoryCallbackStore, InMemoryLedgerStore};
use novalnet_bridge::infrastructure::notifier::MemoryNotifier;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const PARENT_TID: &str = "15000000000001";
pub const REFERENCE: &str = "SO-1001";

/// Gateway answering from per-endpoint queues and recording every request.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    replies: Arc<Mutex<HashMap<Endpoint, VecDeque<Result<Value>>>>>,
    requests: Arc<Mutex<Vec<(Endpoint, Value)>>>,
}

impl ScriptedGateway {
    pub fn reply(&self, endpoint: Endpoint, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(Ok(body));
    }

    pub fn fail(&self, endpoint: Endpoint, error: PaymentError) {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<(Endpoint, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, body)| body)
            .collect()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn request(&self, endpoint: Endpoint, payload: Value) -> Result<Value> {
        self.requests.lock().unwrap().push((endpoint, payload));
        self.replies
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(PaymentError::gateway(
                    503,
                    0,
                    format!("no scripted reply for {endpoint}"),
                ))
            })
    }
}

/// In-memory ledger store whose next plain `store` call can be made to fail.
#[derive(Clone, Default)]
pub struct FailingLedgerStore {
    inner: InMemoryLedgerStore,
    fail_next_store: Arc<AtomicBool>,
}

impl FailingLedgerStore {
    pub fn fail_next_store(&self) {
        self.fail_next_store.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for FailingLedgerStore {
    async fn insert(&self, draft: LedgerDraft) -> Result<Ledger> {
        self.inner.insert(draft).await
    }

    async fn store(&self, ledger: Ledger) -> Result<()> {
        if self.fail_next_store.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::IoError(std::io::Error::other("disk full")));
        }
        self.inner.store(ledger).await
    }

    async fn insert_child(&self, parent: Ledger, child: Ledger) -> Result<(Ledger, Ledger)> {
        self.inner.insert_child(parent, child).await
    }

    async fn get(&self, id: LedgerId) -> Result<Option<Ledger>> {
        self.inner.get(id).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Ledger>> {
        self.inner.find_by_reference(reference).await
    }

    async fn find_by_txn_secret(&self, txn_secret: &str) -> Result<Option<Ledger>> {
        self.inner.find_by_txn_secret(txn_secret).await
    }

    async fn get_all(&self) -> Result<Vec<Ledger>> {
        self.inner.get_all().await
    }
}

pub struct Harness {
    pub engine: ReconciliationEngine,
    pub gateway: ScriptedGateway,
    pub notifier: MemoryNotifier,
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    harness_on(Box::new(InMemoryLedgerStore::new()), settings)
}

pub fn harness_on(ledgers: LedgerStoreBox, settings: EngineSettings) -> Harness {
    let gateway = ScriptedGateway::default();
    let notifier = MemoryNotifier::new();
    let engine = ReconciliationEngine::new(
        ledgers,
        Box::new(InMemoryCallbackStore::new()),
        Box::new(gateway.clone()),
        Box::new(notifier.clone()),
        settings,
    );
    Harness {
        engine,
        gateway,
        notifier,
    }
}

/// A `transaction/details` response.
pub fn details(tid: &str, status: &str, status_code: u64, payment_type: &str, amount: i64) -> Value {
    json!({
        "result": {"status": "SUCCESS", "status_code": 100, "status_text": "Successful"},
        "transaction": {
            "tid": tid,
            "order_no": REFERENCE,
            "status": status,
            "status_code": status_code,
            "payment_type": payment_type,
            "amount": amount,
            "currency": "EUR",
            "test_mode": 1
        },
        "custom": {"order_lang": "en_US"}
    })
}

/// A webhook about the payment `PARENT_TID` of `REFERENCE`.
pub fn webhook(event_type: &str, tid: &str, transaction: Value) -> Value {
    let mut body = json!({
        "event": {"type": event_type, "tid": tid, "parent_tid": PARENT_TID, "checksum": "unchecked"},
        "result": {"status": "SUCCESS", "status_code": 100, "status_text": "Successful"},
        "transaction": {"tid": tid, "order_no": REFERENCE, "amount": 1000, "currency": "EUR"},
        "custom": {"order_lang": "en_US"}
    });
    if let Value::Object(fields) = transaction {
        for (key, value) in fields {
            body["transaction"][key] = value;
        }
    }
    body
}

pub fn status_update(tid: &str, status: &str) -> Value {
    webhook(
        "TRANSACTION_UPDATE",
        tid,
        json!({"update_type": "STATUS", "status": status}),
    )
}

impl Harness {
    pub async fn draft(&self) -> Ledger {
        self.engine
            .create_ledger(
                LedgerDraft::new(REFERENCE, MinorUnits(1000), "EUR")
                    .with_operation(Operation::OnlineDirect)
                    .with_lang("en_US"),
            )
            .await
            .unwrap()
    }

    /// Creates the ledger and applies a synchronous result whose details report `status`.
    pub async fn settled(&self, status: &str, payment_type: &str) -> Ledger {
        self.draft().await;
        self.settled_existing(status, payment_type).await
    }

    pub async fn settled_existing(&self, status: &str, payment_type: &str) -> Ledger {
        self.gateway.reply(
            Endpoint::TransactionDetails,
            details(PARENT_TID, status, 100, payment_type, 1000),
        );
        self.engine
            .apply_payment_result(
                REFERENCE,
                PaymentResult {
                    tid: PARENT_TID.to_string(),
                    status: None,
                    status_text: None,
                },
            )
            .await
            .unwrap()
    }
}
