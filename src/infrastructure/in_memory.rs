use crate::domain::callback::{CallbackEntry, CallbackId, NewCallback};
use crate::domain::ledger::{Ledger, LedgerDraft, LedgerId};
use crate::domain::ports::{CallbackStore, LedgerStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerTable {
    next_id: u64,
    ledgers: BTreeMap<LedgerId, Ledger>,
    references: HashMap<String, LedgerId>,
}

/// A thread-safe in-memory ledger store.
///
/// Ledgers are kept in id order with a reference index next to them.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    table: Arc<RwLock<LedgerTable>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, draft: LedgerDraft) -> Result<Ledger> {
        let mut table = self.table.write().await;
        if table.references.contains_key(&draft.reference) {
            return Err(PaymentError::DuplicateReference(draft.reference));
        }
        table.next_id += 1;
        let ledger = Ledger::new(LedgerId(table.next_id), draft, Utc::now());
        table
            .references
            .insert(ledger.reference.clone(), ledger.id);
        table.ledgers.insert(ledger.id, ledger.clone());
        Ok(ledger)
    }

    async fn store(&self, ledger: Ledger) -> Result<()> {
        let mut table = self.table.write().await;
        table
            .references
            .insert(ledger.reference.clone(), ledger.id);
        table.ledgers.insert(ledger.id, ledger);
        Ok(())
    }

    async fn insert_child(&self, mut parent: Ledger, mut child: Ledger) -> Result<(Ledger, Ledger)> {
        let mut table = self.table.write().await;
        if table.references.contains_key(&child.reference) {
            return Err(PaymentError::DuplicateReference(child.reference));
        }
        table.next_id += 1;
        child.id = LedgerId(table.next_id);
        child.source_transaction_id = Some(parent.id);
        parent.children.push(child.id);

        table.references.insert(child.reference.clone(), child.id);
        table.ledgers.insert(child.id, child.clone());
        table.ledgers.insert(parent.id, parent.clone());
        Ok((parent, child))
    }

    async fn get(&self, id: LedgerId) -> Result<Option<Ledger>> {
        let table = self.table.read().await;
        Ok(table.ledgers.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Ledger>> {
        let table = self.table.read().await;
        Ok(table
            .references
            .get(reference)
            .and_then(|id| table.ledgers.get(id))
            .cloned())
    }

    async fn find_by_txn_secret(&self, txn_secret: &str) -> Result<Option<Ledger>> {
        let table = self.table.read().await;
        Ok(table
            .ledgers
            .values()
            .find(|ledger| ledger.details.txn_secret.as_deref() == Some(txn_secret))
            .cloned())
    }

    async fn get_all(&self) -> Result<Vec<Ledger>> {
        let table = self.table.read().await;
        Ok(table.ledgers.values().cloned().collect())
    }
}

#[derive(Default)]
struct CallbackTable {
    next_id: u64,
    entries: BTreeMap<CallbackId, CallbackEntry>,
}

/// A thread-safe in-memory callback queue. Entries are never removed.
#[derive(Default, Clone)]
pub struct InMemoryCallbackStore {
    table: Arc<RwLock<CallbackTable>>,
}

impl InMemoryCallbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallbackStore for InMemoryCallbackStore {
    async fn append(&self, callback: NewCallback) -> Result<CallbackEntry> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let entry = CallbackEntry::new(CallbackId(table.next_id), callback, Utc::now());
        table.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn store(&self, entry: CallbackEntry) -> Result<()> {
        let mut table = self.table.write().await;
        table.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn for_ledger(&self, ledger: LedgerId) -> Result<Vec<CallbackEntry>> {
        let table = self.table.read().await;
        Ok(table
            .entries
            .values()
            .filter(|entry| entry.ledger == ledger)
            .cloned()
            .collect())
    }
}
