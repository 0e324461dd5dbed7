use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Required keys are missing from an inbound payload.
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),
    /// A reference, txn secret or id does not resolve to a ledger.
    #[error("Ledger not found: {0}")]
    LedgerNotFound(String),
    /// Non-success answer from the payment provider.
    #[error("Gateway error [{status}] {code}: {text}")]
    Gateway { status: u16, code: u64, text: String },
    #[error("Checksum mismatch for tid {0}")]
    ChecksumMismatch(String),
    #[error("Duplicate ledger reference: {0}")]
    DuplicateReference(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Webhook delivered from an address outside the provider's host.
    #[error("{0}")]
    UnauthorizedSource(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl PaymentError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedNotification(reason.into())
    }

    pub fn gateway(status: u16, code: u64, text: impl Into<String>) -> Self {
        Self::Gateway {
            status,
            code,
            text: text.into(),
        }
    }

    /// True for failures caused by the caller's input rather than by this service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedNotification(_)
                | Self::LedgerNotFound(_)
                | Self::ChecksumMismatch(_)
                | Self::DuplicateReference(_)
                | Self::ValidationError(_)
                | Self::UnauthorizedSource(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
