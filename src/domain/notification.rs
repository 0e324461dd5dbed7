use crate::domain::wire::{CollectionData, InstalmentData, ResultData, TransactionData};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Webhook event types. Provider-added types land in `Unknown` and are ignored downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Payment,
    TransactionCapture,
    TransactionCancel,
    TransactionRefund,
    TransactionUpdate,
    Credit,
    Chargeback,
    Instalment,
    InstalmentCancel,
    PaymentReminder1,
    PaymentReminder2,
    SubmissionToCollectionAgency,
    Unknown(String),
}

impl EventType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "PAYMENT" => Self::Payment,
            "TRANSACTION_CAPTURE" => Self::TransactionCapture,
            "TRANSACTION_CANCEL" => Self::TransactionCancel,
            "TRANSACTION_REFUND" => Self::TransactionRefund,
            "TRANSACTION_UPDATE" => Self::TransactionUpdate,
            "CREDIT" => Self::Credit,
            "CHARGEBACK" => Self::Chargeback,
            "INSTALMENT" => Self::Instalment,
            "INSTALMENT_CANCEL" => Self::InstalmentCancel,
            "PAYMENT_REMINDER_1" => Self::PaymentReminder1,
            "PAYMENT_REMINDER_2" => Self::PaymentReminder2,
            "SUBMISSION_TO_COLLECTION_AGENCY" => Self::SubmissionToCollectionAgency,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Payment => "PAYMENT",
            Self::TransactionCapture => "TRANSACTION_CAPTURE",
            Self::TransactionCancel => "TRANSACTION_CANCEL",
            Self::TransactionRefund => "TRANSACTION_REFUND",
            Self::TransactionUpdate => "TRANSACTION_UPDATE",
            Self::Credit => "CREDIT",
            Self::Chargeback => "CHARGEBACK",
            Self::Instalment => "INSTALMENT",
            Self::InstalmentCancel => "INSTALMENT_CANCEL",
            Self::PaymentReminder1 => "PAYMENT_REMINDER_1",
            Self::PaymentReminder2 => "PAYMENT_REMINDER_2",
            Self::SubmissionToCollectionAgency => "SUBMISSION_TO_COLLECTION_AGENCY",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Sub-type of a `TRANSACTION_UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateType {
    AmountDueDate,
    DueDate,
    Amount,
    Status,
    Unknown(String),
}

impl UpdateType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "AMOUNT_DUE_DATE" => Self::AmountDueDate,
            "DUE_DATE" => Self::DueDate,
            "AMOUNT" => Self::Amount,
            "STATUS" => Self::Status,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelType {
    AllCycles,
    RemainingCycles,
}

impl CancelType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "ALL_CYCLES" => Some(Self::AllCycles),
            "REMAINING_CYCLES" => Some(Self::RemainingCycles),
            _ => None,
        }
    }
}

/// Canonical form of a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event_type: EventType,
    /// The event's own tid, or the parent tid when the event carries none.
    pub tid: String,
    pub parent_tid: Option<String>,
    pub checksum: String,
    pub order_no: String,
    /// The merchant system triggered this action itself.
    pub shop_invoked: bool,
    pub order_lang: Option<String>,
    /// `result.status` exactly as received.
    pub result_status: String,
    pub result: ResultData,
    pub transaction: TransactionData,
    pub instalment: Option<InstalmentData>,
    pub collection: Option<CollectionData>,
}

impl Notification {
    /// The tid of the transaction this event is about.
    pub fn parent_or_tid(&self) -> &str {
        self.parent_tid.as_deref().unwrap_or(&self.tid)
    }

    pub fn update_type(&self) -> Option<UpdateType> {
        self.transaction.update_type.as_deref().map(UpdateType::parse)
    }
}

/// Outcome of a payment attempt as seen by the synchronous path: API response, redirect return,
/// or a `PAYMENT` webhook recovering a lost response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    pub tid: String,
    /// `FAILURE` and `DEACTIVATED` settle the ledger without a details lookup.
    pub status: Option<String>,
    pub status_text: Option<String>,
}

/// Browser return from the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectReturn {
    Completed {
        txn_secret: String,
        checksum: String,
        status_code: String,
        result: PaymentResult,
    },
    /// Identification is missing; nothing can be resolved, the status text is shown as is.
    Failed { message: String },
}
