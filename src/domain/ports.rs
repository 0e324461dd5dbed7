use super::callback::{CallbackEntry, NewCallback};
use super::ledger::{Ledger, LedgerDraft, LedgerId};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates a ledger from `draft`, assigning its id. References are unique.
    async fn insert(&self, draft: LedgerDraft) -> Result<Ledger>;
    async fn store(&self, ledger: Ledger) -> Result<()>;
    /// Attaches `child` to `parent` in a single write: the store assigns the child's id, appends
    /// it to `parent.children` and persists both. Returns the stored parent and child.
    async fn insert_child(&self, parent: Ledger, child: Ledger) -> Result<(Ledger, Ledger)>;
    async fn get(&self, id: LedgerId) -> Result<Option<Ledger>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Ledger>>;
    async fn find_by_txn_secret(&self, txn_secret: &str) -> Result<Option<Ledger>>;
    /// All ledgers ordered by id.
    async fn get_all(&self) -> Result<Vec<Ledger>>;
}

#[async_trait]
pub trait CallbackStore: Send + Sync {
    async fn append(&self, callback: NewCallback) -> Result<CallbackEntry>;
    async fn store(&self, entry: CallbackEntry) -> Result<()>;
    /// Every entry of a ledger in queue order, done or not.
    async fn for_ledger(&self, ledger: LedgerId) -> Result<Vec<CallbackEntry>>;

    /// Not-done entries of a ledger in queue order.
    async fn pending(&self, ledger: LedgerId) -> Result<Vec<CallbackEntry>> {
        Ok(self
            .for_ledger(ledger)
            .await?
            .into_iter()
            .filter(|entry| !entry.is_done)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    SeamlessPayment,
    Payment,
    Authorize,
    Capture,
    Cancel,
    Refund,
    TransactionDetails,
    MerchantDetails,
    WebhookConfigure,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::SeamlessPayment => "seamless/payment",
            Self::Payment => "payment",
            Self::Authorize => "authorize",
            Self::Capture => "transaction/capture",
            Self::Cancel => "transaction/cancel",
            Self::Refund => "transaction/refund",
            Self::TransactionDetails => "transaction/details",
            Self::MerchantDetails => "merchant/details",
            Self::WebhookConfigure => "webhook/configure",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Authenticated JSON-over-HTTPS access to the payment provider.
///
/// One call, no retry. A non-success answer is a `PaymentError::Gateway`.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn request(&self, endpoint: Endpoint, payload: Value) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Sink for audit comments and notification mails. Failures never roll back a ledger change.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_comment(&self, ledger: &Ledger, comment: &str) -> Result<()>;
    async fn send_mail(&self, mail: &MailMessage) -> Result<()>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type CallbackStoreBox = Box<dyn CallbackStore>;
pub type GatewayBox = Box<dyn Gateway>;
pub type NotifierBox = Box<dyn Notifier>;
