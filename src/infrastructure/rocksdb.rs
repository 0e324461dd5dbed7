use crate::domain::callback::{CallbackEntry, CallbackId, NewCallback};
use crate::domain::ledger::{Ledger, LedgerDraft, LedgerId};
use crate::domain::ports::{CallbackStore, LedgerStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for ledgers, keyed by ledger id.
pub const CF_LEDGERS: &str = "ledgers";
/// Column Family for callback queue entries, keyed by ledger id then callback id.
pub const CF_CALLBACKS: &str = "callbacks";
/// Reference to ledger id index.
pub const CF_REFERENCES: &str = "references";
/// Transaction secret to ledger id index.
pub const CF_SECRETS: &str = "secrets";
/// Id sequences.
pub const CF_META: &str = "meta";

const LEDGER_SEQ: &[u8] = b"ledger_seq";
const CALLBACK_SEQ: &[u8] = b"callback_seq";

fn internal(message: impl Into<String>) -> PaymentError {
    PaymentError::InternalError(Box::new(std::io::Error::other(message.into())))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

fn callback_key(ledger: LedgerId, id: CallbackId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&ledger.0.to_be_bytes());
    key[8..].copy_from_slice(&id.0.to_be_bytes());
    key
}

/// A persistent ledger and callback store using RocksDB.
///
/// Ledgers, queue entries and the two lookup indexes live in separate Column Families. Inserts
/// that allocate ids are serialized through `writer`; everything else goes straight to the DB.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_LEDGERS, CF_CALLBACKS, CF_REFERENCES, CF_SECRETS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| internal(format!("{name} column family not found")))
    }

    fn next_id(&self, sequence: &[u8]) -> Result<u64> {
        let meta = self.cf(CF_META)?;
        let current = match self.db.get_cf(meta, sequence)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| internal("Corrupt id sequence"))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        Ok(current + 1)
    }

    fn get_ledger(&self, id: LedgerId) -> Result<Option<Ledger>> {
        let cf = self.cf(CF_LEDGERS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_by_index(&self, family: &str, key: &str) -> Result<Option<Ledger>> {
        let cf = self.cf(family)?;
        let Some(bytes) = self.db.get_cf(cf, key.as_bytes())? else {
            return Ok(None);
        };
        let raw: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| internal(format!("Corrupt {family} index entry")))?;
        self.get_ledger(LedgerId(u64::from_be_bytes(raw)))
    }

    fn ledger_batch(&self, batch: &mut WriteBatch, ledger: &Ledger) -> Result<()> {
        let id = ledger.id.0.to_be_bytes();
        batch.put_cf(self.cf(CF_LEDGERS)?, id, encode(ledger)?);
        batch.put_cf(self.cf(CF_REFERENCES)?, ledger.reference.as_bytes(), id);
        if let Some(secret) = &ledger.details.txn_secret {
            batch.put_cf(self.cf(CF_SECRETS)?, secret.as_bytes(), id);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn insert(&self, draft: LedgerDraft) -> Result<Ledger> {
        let _writer = self.writer.lock().await;
        let references = self.cf(CF_REFERENCES)?;
        if self
            .db
            .get_pinned_cf(references, draft.reference.as_bytes())?
            .is_some()
        {
            return Err(PaymentError::DuplicateReference(draft.reference));
        }

        let id = self.next_id(LEDGER_SEQ)?;
        let ledger = Ledger::new(LedgerId(id), draft, Utc::now());
        let mut batch = WriteBatch::default();
        self.ledger_batch(&mut batch, &ledger)?;
        batch.put_cf(self.cf(CF_META)?, LEDGER_SEQ, id.to_be_bytes());
        self.db.write(batch)?;
        Ok(ledger)
    }

    async fn store(&self, ledger: Ledger) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.ledger_batch(&mut batch, &ledger)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn insert_child(&self, mut parent: Ledger, mut child: Ledger) -> Result<(Ledger, Ledger)> {
        let _writer = self.writer.lock().await;
        let references = self.cf(CF_REFERENCES)?;
        if self
            .db
            .get_pinned_cf(references, child.reference.as_bytes())?
            .is_some()
        {
            return Err(PaymentError::DuplicateReference(child.reference));
        }

        let id = self.next_id(LEDGER_SEQ)?;
        child.id = LedgerId(id);
        child.source_transaction_id = Some(parent.id);
        parent.children.push(child.id);

        let mut batch = WriteBatch::default();
        self.ledger_batch(&mut batch, &child)?;
        self.ledger_batch(&mut batch, &parent)?;
        batch.put_cf(self.cf(CF_META)?, LEDGER_SEQ, id.to_be_bytes());
        self.db.write(batch)?;
        Ok((parent, child))
    }

    async fn get(&self, id: LedgerId) -> Result<Option<Ledger>> {
        self.get_ledger(id)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Ledger>> {
        self.find_by_index(CF_REFERENCES, reference)
    }

    async fn find_by_txn_secret(&self, txn_secret: &str) -> Result<Option<Ledger>> {
        self.find_by_index(CF_SECRETS, txn_secret)
    }

    async fn get_all(&self) -> Result<Vec<Ledger>> {
        let handle = self.cf(CF_LEDGERS)?;
        let mut ledgers = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| {
                internal(format!("RocksDB iteration error: {}", e))
            })?;
            ledgers.push(decode(&value)?);
        }
        Ok(ledgers)
    }
}

#[async_trait]
impl CallbackStore for RocksDBStore {
    async fn append(&self, callback: NewCallback) -> Result<CallbackEntry> {
        let _writer = self.writer.lock().await;
        let id = self.next_id(CALLBACK_SEQ)?;
        let entry = CallbackEntry::new(CallbackId(id), callback, Utc::now());

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_CALLBACKS)?,
            callback_key(entry.ledger, entry.id),
            encode(&entry)?,
        );
        batch.put_cf(self.cf(CF_META)?, CALLBACK_SEQ, id.to_be_bytes());
        self.db.write(batch)?;
        Ok(entry)
    }

    async fn store(&self, entry: CallbackEntry) -> Result<()> {
        let cf = self.cf(CF_CALLBACKS)?;
        self.db
            .put_cf(cf, callback_key(entry.ledger, entry.id), encode(&entry)?)?;
        Ok(())
    }

    async fn for_ledger(&self, ledger: LedgerId) -> Result<Vec<CallbackEntry>> {
        let handle = self.cf(CF_CALLBACKS)?;
        let prefix = ledger.0.to_be_bytes();
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(handle, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| {
                internal(format!("RocksDB iteration error: {}", e))
            })?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(decode(&value)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::TransactionState;
    use crate::domain::money::MinorUnits;
    use crate::domain::notification::EventType;
    use serde_json::json;
    use tempfile::tempdir;

    fn callback(ledger: u64, tid: &str) -> NewCallback {
        NewCallback {
            ledger: LedgerId(ledger),
            event_type: EventType::TransactionRefund,
            tid: tid.into(),
            parent_tid: Some("T1".into()),
            checksum: "c".into(),
            payload: json!({"event": {"tid": tid}}),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_LEDGERS, CF_CALLBACKS, CF_REFERENCES, CF_SECRETS, CF_META] {
            assert!(store.db.cf_handle(name).is_some(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut ledger = store
            .insert(LedgerDraft::new("REF1", MinorUnits(1000), "EUR"))
            .await
            .unwrap();
        assert_eq!(ledger.id, LedgerId(1));
        ledger.state = TransactionState::Pending;
        ledger.details.txn_secret = Some("secret".into());
        LedgerStore::store(&store, ledger.clone()).await.unwrap();

        let retrieved = store.find_by_reference("REF1").await.unwrap().unwrap();
        assert_eq!(retrieved, ledger);
        let by_secret = store.find_by_txn_secret("secret").await.unwrap().unwrap();
        assert_eq!(by_secret.id, ledger.id);

        let second = store
            .insert(LedgerDraft::new("REF2", MinorUnits(500), "EUR"))
            .await
            .unwrap();
        assert_eq!(second.id, LedgerId(2));
        assert!(matches!(
            store
                .insert(LedgerDraft::new("REF1", MinorUnits(1), "EUR"))
                .await,
            Err(PaymentError::DuplicateReference(_))
        ));

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].reference, "REF1");
    }

    #[tokio::test]
    async fn test_rocksdb_insert_child_writes_family() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let parent = store
            .insert(LedgerDraft::new("REF1", MinorUnits(1000), "EUR"))
            .await
            .unwrap();
        let mut child = parent.refund_child(MinorUnits(400), Utc::now());
        child.provider_reference = Some("T2".into());

        let (parent, child) = store.insert_child(parent, child).await.unwrap();
        assert_eq!(child.id, LedgerId(2));

        let stored_parent = store.get(parent.id).await.unwrap().unwrap();
        assert_eq!(stored_parent.children, vec![child.id]);
        let stored_child = store.find_by_reference("R-REF1").await.unwrap().unwrap();
        assert_eq!(stored_child.provider_reference.as_deref(), Some("T2"));
        assert_eq!(stored_child.amount, MinorUnits(-400));

        let next = store
            .insert(LedgerDraft::new("REF2", MinorUnits(1), "EUR"))
            .await
            .unwrap();
        assert_eq!(next.id, LedgerId(3));
    }

    #[tokio::test]
    async fn test_rocksdb_callback_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        store.append(callback(1, "T2")).await.unwrap();
        store.append(callback(2, "T9")).await.unwrap();
        let mut third = store.append(callback(1, "T3")).await.unwrap();

        third.mark_done();
        CallbackStore::store(&store, third).await.unwrap();

        let entries = store.for_ledger(LedgerId(1)).await.unwrap();
        let tids: Vec<_> = entries.iter().map(|e| e.tid.as_str()).collect();
        assert_eq!(tids, ["T2", "T3"]);
        assert!(entries[1].is_done);

        let pending = store.pending(LedgerId(1)).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store
                .insert(LedgerDraft::new("REF1", MinorUnits(1000), "EUR"))
                .await
                .unwrap();
            store.append(callback(1, "T2")).await.unwrap();
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert!(store.find_by_reference("REF1").await.unwrap().is_some());
        let next = store
            .insert(LedgerDraft::new("REF2", MinorUnits(1), "EUR"))
            .await
            .unwrap();
        assert_eq!(next.id, LedgerId(2));
        assert_eq!(store.for_ledger(LedgerId(1)).await.unwrap().len(), 1);
    }
}
