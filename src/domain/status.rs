use crate::domain::ledger::TransactionState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Confirmed,
    OnHold,
    Pending,
    Deactivated,
    Failure,
}

impl FromStr for ProviderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CONFIRMED" => Ok(Self::Confirmed),
            "ON_HOLD" => Ok(Self::OnHold),
            "PENDING" => Ok(Self::Pending),
            "DEACTIVATED" => Ok(Self::Deactivated),
            "FAILURE" => Ok(Self::Failure),
            other => Err(format!("Unknown transaction status: {other}")),
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Confirmed => "CONFIRMED",
            Self::OnHold => "ON_HOLD",
            Self::Pending => "PENDING",
            Self::Deactivated => "DEACTIVATED",
            Self::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// Ledger state a provider status asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Done,
    Authorize,
    Pending,
    Cancel,
    Error,
}

impl TargetState {
    pub fn ledger_state(&self) -> TransactionState {
        match self {
            Self::Done => TransactionState::Done,
            Self::Authorize => TransactionState::Authorized,
            Self::Pending => TransactionState::Pending,
            Self::Cancel => TransactionState::Cancel,
            Self::Error => TransactionState::Error,
        }
    }
}

impl From<ProviderStatus> for TargetState {
    fn from(status: ProviderStatus) -> Self {
        match status {
            ProviderStatus::Confirmed => Self::Done,
            ProviderStatus::OnHold => Self::Authorize,
            ProviderStatus::Pending => Self::Pending,
            ProviderStatus::Deactivated => Self::Cancel,
            ProviderStatus::Failure => Self::Error,
        }
    }
}

pub const PREPAYMENT: &str = "PREPAYMENT";
pub const INVOICE_CREDIT: &str = "INVOICE_CREDIT";
pub const INSTALMENT_PAYMENT_TYPES: [&str; 2] = ["INSTALMENT_INVOICE", "INSTALMENT_DIRECT_DEBIT_SEPA"];

pub fn is_instalment_payment(payment_type: Option<&str>) -> bool {
    payment_type.is_some_and(|pt| INSTALMENT_PAYMENT_TYPES.contains(&pt))
}

/// Target state of a transaction details lookup.
///
/// A pending status with code 100 is final for everything except prepayment, where the
/// customer still has to transfer the money.
pub fn resolve_state(
    status: ProviderStatus,
    status_code: Option<u64>,
    payment_type: Option<&str>,
) -> TargetState {
    let target = TargetState::from(status);
    if target == TargetState::Pending && payment_type != Some(PREPAYMENT) && status_code == Some(100)
    {
        return TargetState::Done;
    }
    target
}
