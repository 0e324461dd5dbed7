use crate::domain::details::ProviderDetails;
use crate::domain::money::MinorUnits;
use crate::domain::terms::PaymentTerm;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LedgerId(pub u64);

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    #[default]
    Draft,
    Pending,
    Authorized,
    Done,
    Cancel,
    Error,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancel | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Done => "done",
            Self::Cancel => "cancel",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    OnlineDirect,
    #[default]
    OnlineRedirect,
    OnlineToken,
    Offline,
    Refund,
}

impl Operation {
    /// Flows where the payment response already carries the tid.
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::OnlineDirect | Self::OnlineToken | Self::Offline)
    }
}

/// Result of asking a ledger to change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Already in the requested state.
    Unchanged,
    /// The current state does not allow the move; the ledger is untouched.
    Rejected,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Expected paid total recorded when the synchronous result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AmountStatus {
    pub paid_amount: MinorUnits,
    pub refund_amount: MinorUnits,
}

/// Input for creating a ledger. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDraft {
    pub reference: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub source_transaction_id: Option<LedgerId>,
    #[serde(default)]
    pub partner_lang: Option<String>,
}

impl LedgerDraft {
    pub fn new(reference: impl Into<String>, amount: MinorUnits, currency: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            amount,
            currency: currency.into(),
            operation: Operation::default(),
            source_transaction_id: None,
            partner_lang: None,
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.partner_lang = Some(lang.into());
        self
    }
}

/// The mutable record of one logical payment.
///
/// Refunds are separate ledgers pointing at their parent through `source_transaction_id`.
/// The parent keeps the ordered child ids, and children never have children of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: LedgerId,
    pub reference: String,
    pub provider_reference: Option<String>,
    pub state: TransactionState,
    pub state_message: Option<String>,
    pub operation: Operation,
    pub amount: MinorUnits,
    pub currency: String,
    pub paid_amount: MinorUnits,
    pub refund_amount: MinorUnits,
    pub amount_status: Option<AmountStatus>,
    pub source_transaction_id: Option<LedgerId>,
    pub children: Vec<LedgerId>,
    pub partner_lang: Option<String>,
    pub payment_term: Option<PaymentTerm>,
    pub details: ProviderDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const LIVE: [TransactionState; 3] = [
    TransactionState::Draft,
    TransactionState::Pending,
    TransactionState::Authorized,
];

impl Ledger {
    pub fn new(id: LedgerId, draft: LedgerDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            reference: draft.reference,
            provider_reference: None,
            state: TransactionState::Draft,
            state_message: None,
            operation: draft.operation,
            amount: draft.amount,
            currency: draft.currency,
            paid_amount: MinorUnits::ZERO,
            refund_amount: MinorUnits::ZERO,
            amount_status: None,
            source_transaction_id: draft.source_transaction_id,
            children: Vec::new(),
            partner_lang: draft.partner_lang,
            payment_term: None,
            details: ProviderDetails::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The ledger whose lock and queue this one belongs to.
    pub fn root_id(&self) -> LedgerId {
        self.source_transaction_id.unwrap_or(self.id)
    }

    pub fn is_child(&self) -> bool {
        self.source_transaction_id.is_some()
    }

    /// Order language if the provider echoed one, else the customer's language.
    pub fn lang_code(&self) -> Option<&str> {
        self.details
            .lang
            .as_deref()
            .or(self.partner_lang.as_deref())
    }

    fn transition(
        &mut self,
        target: TransactionState,
        allowed: &[TransactionState],
    ) -> Transition {
        if self.state == target {
            Transition::Unchanged
        } else if allowed.contains(&self.state) {
            self.state = target;
            Transition::Applied
        } else {
            Transition::Rejected
        }
    }

    pub fn set_pending(&mut self) -> Transition {
        self.transition(TransactionState::Pending, &[TransactionState::Draft])
    }

    pub fn set_authorized(&mut self) -> Transition {
        self.transition(
            TransactionState::Authorized,
            &[TransactionState::Draft, TransactionState::Pending],
        )
    }

    pub fn set_done(&mut self) -> Transition {
        self.transition(TransactionState::Done, &LIVE)
    }

    pub fn set_canceled(&mut self) -> Transition {
        self.set_canceled_with(&[])
    }

    /// Cancels, additionally accepting `extra` as source states.
    pub fn set_canceled_with(&mut self, extra: &[TransactionState]) -> Transition {
        let allowed: Vec<TransactionState> = LIVE.iter().chain(extra).copied().collect();
        self.transition(TransactionState::Cancel, &allowed)
    }

    pub fn set_error(&mut self, message: impl Into<String>) -> Transition {
        let outcome = self.transition(TransactionState::Error, &LIVE);
        if outcome.applied() {
            self.state_message = Some(message.into());
        }
        outcome
    }

    /// Moves `paid_amount` up to `amount`; never lowers it.
    pub fn raise_paid_to(&mut self, amount: MinorUnits) {
        if amount > self.paid_amount {
            self.paid_amount = amount;
        }
    }

    /// Adds a confirmed credit to the running paid total. Non-positive amounts are ignored, and
    /// a credit the total cannot hold leaves the ledger untouched.
    pub fn add_paid(&mut self, amount: MinorUnits) -> Result<()> {
        if amount <= MinorUnits::ZERO {
            return Ok(());
        }
        self.paid_amount = self.paid_amount.checked_add(amount).ok_or_else(|| {
            PaymentError::malformed(format!(
                "credit of {amount} overflows the paid total {} of {}",
                self.paid_amount, self.reference
            ))
        })?;
        Ok(())
    }

    pub fn raise_refund_to(&mut self, amount: MinorUnits) {
        if amount > self.refund_amount {
            self.refund_amount = amount;
        }
    }

    /// Amount still open for refunds: the paid total minus what the refund children and the
    /// provider's own refund total already account for.
    pub fn refundable(&self, children: &[Ledger]) -> MinorUnits {
        let refunded = refunded_total(children).max(self.refund_amount);
        self.paid_amount
            .checked_sub(refunded)
            .unwrap_or(MinorUnits::ZERO)
            .max(MinorUnits::ZERO)
    }

    /// Reference of the next refund child: `R-REF`, then `R-REF-1`, `R-REF-2`, ...
    pub fn next_refund_reference(&self) -> String {
        match self.children.len() {
            0 => format!("R-{}", self.reference),
            n => format!("R-{}-{}", self.reference, n),
        }
    }

    /// Unsaved refund child of this ledger. The store assigns its id when attaching it.
    pub fn refund_child(&self, amount: MinorUnits, now: DateTime<Utc>) -> Ledger {
        Ledger::new(LedgerId::default(), self.refund_draft(amount), now)
    }

    /// Draft of a refund child, attached to this ledger.
    pub fn refund_draft(&self, amount: MinorUnits) -> LedgerDraft {
        LedgerDraft {
            reference: self.next_refund_reference(),
            amount: -amount.abs(),
            currency: self.currency.clone(),
            operation: Operation::Refund,
            source_transaction_id: Some(self.id),
            partner_lang: self.partner_lang.clone(),
        }
    }
}

/// Sum of the refund children that were not cancelled or failed.
pub fn refunded_total(children: &[Ledger]) -> MinorUnits {
    children
        .iter()
        .filter(|child| {
            !matches!(
                child.state,
                TransactionState::Cancel | TransactionState::Error
            )
        })
        .fold(MinorUnits::ZERO, |total, child| total + child.amount.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionState::*;

    fn ledger(state: TransactionState) -> Ledger {
        let mut l = Ledger::new(
            LedgerId(1),
            LedgerDraft::new("REF1", MinorUnits(1000), "EUR"),
            Utc::now(),
        );
        l.state = state;
        l
    }

    #[test]
    fn test_allowed_transitions() {
        assert_eq!(ledger(Draft).set_pending(), Transition::Applied);
        assert_eq!(ledger(Authorized).set_pending(), Transition::Rejected);
        assert_eq!(ledger(Pending).set_authorized(), Transition::Applied);
        assert_eq!(ledger(Done).set_authorized(), Transition::Rejected);
        assert_eq!(ledger(Authorized).set_done(), Transition::Applied);
        assert_eq!(ledger(Done).set_done(), Transition::Unchanged);
        assert_eq!(ledger(Error).set_done(), Transition::Rejected);
        assert_eq!(ledger(Pending).set_canceled(), Transition::Applied);
        assert_eq!(ledger(Done).set_canceled(), Transition::Rejected);
        assert_eq!(ledger(Done).set_canceled_with(&[Done]), Transition::Applied);
    }

    #[test]
    fn test_rejected_transition_leaves_ledger_untouched() {
        let mut l = ledger(Cancel);
        assert_eq!(l.set_error("boom"), Transition::Rejected);
        assert_eq!(l.state, Cancel);
        assert!(l.state_message.is_none());

        let mut l = ledger(Pending);
        assert!(l.set_error("declined").applied());
        assert_eq!(l.state_message.as_deref(), Some("declined"));
    }

    #[test]
    fn test_paid_amount_never_decreases() {
        let mut l = ledger(Pending);
        l.raise_paid_to(MinorUnits(1000));
        l.raise_paid_to(MinorUnits(0));
        assert_eq!(l.paid_amount, MinorUnits(1000));
        l.add_paid(MinorUnits(-500)).unwrap();
        assert_eq!(l.paid_amount, MinorUnits(1000));
        l.add_paid(MinorUnits(250)).unwrap();
        assert_eq!(l.paid_amount, MinorUnits(1250));
    }

    #[test]
    fn test_overflowing_credit_leaves_paid_amount() {
        let mut l = ledger(Pending);
        l.add_paid(MinorUnits(i64::MAX)).unwrap();
        let err = l.add_paid(MinorUnits(i64::MAX)).unwrap_err();
        assert!(matches!(err, PaymentError::MalformedNotification(_)));
        assert_eq!(l.paid_amount, MinorUnits(i64::MAX));
    }

    #[test]
    fn test_refundable_counts_live_children() {
        let mut parent = ledger(Done);
        parent.paid_amount = MinorUnits(1000);
        let mut first = parent.refund_child(MinorUnits(300), Utc::now());
        first.state = Done;
        let mut cancelled = parent.refund_child(MinorUnits(400), Utc::now());
        cancelled.state = Cancel;
        let pending = parent.refund_child(MinorUnits(200), Utc::now());

        assert_eq!(parent.refundable(&[]), MinorUnits(1000));
        assert_eq!(
            parent.refundable(&[first.clone(), cancelled, pending]),
            MinorUnits(500)
        );

        parent.refund_amount = MinorUnits(900);
        assert_eq!(parent.refundable(&[first]), MinorUnits(100));
        parent.refund_amount = MinorUnits(1200);
        assert_eq!(parent.refundable(&[]), MinorUnits::ZERO);
    }

    #[test]
    fn test_refund_references() {
        let mut l = ledger(Done);
        assert_eq!(l.next_refund_reference(), "R-REF1");
        l.children.push(LedgerId(2));
        assert_eq!(l.next_refund_reference(), "R-REF1-1");
        let draft = l.refund_draft(MinorUnits(500));
        assert_eq!(draft.reference, "R-REF1-1");
        assert_eq!(draft.amount, MinorUnits(-500));
        assert_eq!(draft.source_transaction_id, Some(LedgerId(1)));
        assert_eq!(draft.operation, Operation::Refund);
    }
}
