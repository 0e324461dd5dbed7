//! Per-event webhook handlers.
//!
//! `reconcile` is pure: it mutates the ledger it is given and describes every side effect it
//! needs (comment, refund child) in the returned [`Outcome`]. The engine persists the ledger,
//! creates children and publishes comments.

use crate::domain::i18n::{Lang, Message};
use crate::domain::ledger::{Ledger, TransactionState, Transition};
use crate::domain::money::{MinorUnits, format_amount};
use crate::domain::notification::{CancelType, EventType, Notification, UpdateType};
use crate::domain::status::{INVOICE_CREDIT, ProviderStatus, TargetState, is_instalment_payment};
use crate::domain::terms::{PaymentTerm, display_due_date};
use chrono::{DateTime, NaiveDate, Utc};

pub struct ReconcileContext<'a> {
    pub lang: Lang,
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
    /// Children of the ledger, used to recognise refunds already recorded.
    pub children: &'a [Ledger],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The handler ran.
    Applied,
    /// Echo of an action the shop performed itself.
    Echo,
    /// Already reflected in the ledger.
    Duplicate,
    /// Nothing to do: unknown event, missing data or a transition the ledger refuses.
    Ignored,
}

/// Refund child the engine must create under the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundChild {
    pub amount: MinorUnits,
    pub tid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub disposition: Disposition,
    pub comment: Option<String>,
    pub refund: Option<RefundChild>,
    pub transition: Option<Transition>,
}

impl Outcome {
    fn new(disposition: Disposition) -> Self {
        Self {
            disposition,
            comment: None,
            refund: None,
            transition: None,
        }
    }

    fn ignored() -> Self {
        Self::new(Disposition::Ignored)
    }

    fn commented(message: Message, lang: Lang) -> Self {
        Self {
            comment: Some(message.render(lang)),
            ..Self::new(Disposition::Applied)
        }
    }

    fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }
}

pub fn reconcile(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    match &n.event_type {
        EventType::Payment => Outcome::ignored(),
        EventType::TransactionCapture => capture(ledger, n, ctx),
        EventType::TransactionCancel => cancel(ledger, n, ctx),
        EventType::TransactionRefund => refund(ledger, n, ctx),
        EventType::TransactionUpdate => update(ledger, n, ctx),
        EventType::Credit => credit(ledger, n, ctx),
        EventType::Chargeback => chargeback(ledger, n, ctx),
        EventType::Instalment => instalment(ledger, n, ctx),
        EventType::InstalmentCancel => instalment_cancel(ledger, n, ctx),
        EventType::PaymentReminder1 => {
            Outcome::commented(Message::PaymentReminder { number: 1 }, ctx.lang)
        }
        EventType::PaymentReminder2 => {
            Outcome::commented(Message::PaymentReminder { number: 2 }, ctx.lang)
        }
        EventType::SubmissionToCollectionAgency => collection(n, ctx),
        EventType::Unknown(_) => Outcome::ignored(),
    }
}

fn amount_text(ledger: &Ledger, amount: Option<i64>, lang: Lang) -> String {
    format_amount(MinorUnits(amount.unwrap_or_default()), &ledger.currency, lang)
}

/// Stores the due date in display form and derives the payment term.
fn apply_due_date(ledger: &mut Ledger, due_date: &str, ctx: &ReconcileContext<'_>) {
    match (
        display_due_date(due_date),
        PaymentTerm::from_due_date(due_date, ctx.today, ctx.lang),
    ) {
        (Ok(display), Ok(term)) => {
            ledger.details.due_date = Some(display);
            ledger.payment_term = Some(term);
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(reference = %ledger.reference, error = %e, "Ignoring unreadable due date");
        }
    }
}

fn set_payment_term(ledger: &mut Ledger, due_date: &str, ctx: &ReconcileContext<'_>) {
    match PaymentTerm::from_due_date(due_date, ctx.today, ctx.lang) {
        Ok(term) => ledger.payment_term = Some(term),
        Err(e) => {
            tracing::warn!(reference = %ledger.reference, error = %e, "Ignoring unreadable due date")
        }
    }
}

/// Instalment schedule and due date that accompany a confirmation.
fn confirm(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Transition {
    let payment_type = n
        .transaction
        .payment_type
        .as_deref()
        .or(ledger.details.payment_type.as_deref());
    if is_instalment_payment(payment_type) {
        let plan = n.instalment.clone().unwrap_or_default();
        ledger.details.record_instalment(&plan);
    }
    if let Some(due_date) = n.transaction.due_date.as_deref() {
        apply_due_date(ledger, due_date, ctx);
    }
    ledger.set_done()
}

fn capture(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    if n.shop_invoked {
        return Outcome::new(Disposition::Echo);
    }
    let outcome = Outcome::commented(Message::Confirmed { at: ctx.now }, ctx.lang);
    if ledger.state == TransactionState::Authorized {
        let transition = confirm(ledger, n, ctx);
        return outcome.with_transition(transition);
    }
    outcome
}

fn cancel(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    if n.shop_invoked {
        return Outcome::new(Disposition::Echo);
    }
    let outcome = Outcome::commented(Message::Canceled { at: ctx.now }, ctx.lang);
    if ledger.state == TransactionState::Authorized {
        let transition = ledger.set_canceled();
        return outcome.with_transition(transition);
    }
    outcome
}

fn refund(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    if n.shop_invoked {
        return Outcome::new(Disposition::Echo);
    }
    if ctx
        .children
        .iter()
        .any(|child| child.provider_reference.as_deref() == Some(n.tid.as_str()))
    {
        return Outcome::new(Disposition::Duplicate);
    }
    let Some(amount) = n.transaction.refund.as_ref().and_then(|r| r.amount) else {
        tracing::warn!(tid = %n.tid, "Refund event without refund amount");
        return Outcome::ignored();
    };

    let mut outcome = Outcome::commented(
        Message::RefundReceived {
            parent_tid: n.parent_or_tid().to_string(),
            amount: amount_text(ledger, Some(amount), ctx.lang),
            child_tid: n.tid.clone(),
        },
        ctx.lang,
    );
    outcome.refund = Some(RefundChild {
        amount: MinorUnits(amount).abs(),
        tid: n.tid.clone(),
    });
    outcome
}

/// Credits always count towards the paid total. The ledger only closes when the snapshot of the
/// expected total covers the credit and equals the new paid total.
fn credit(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    let credited = MinorUnits(n.transaction.amount.unwrap_or_default());
    let expected = ledger
        .amount_status
        .map(|status| status.paid_amount)
        .unwrap_or_default();
    if let Err(e) = ledger.add_paid(credited) {
        tracing::warn!(reference = %ledger.reference, tid = %n.tid, error = %e, "Credit not applied");
        return Outcome::ignored();
    }

    let outcome = Outcome::commented(
        Message::CreditReceived {
            parent_tid: n.parent_or_tid().to_string(),
            amount: amount_text(ledger, n.transaction.amount, ctx.lang),
            child_tid: n.tid.clone(),
        },
        ctx.lang,
    );

    let open = matches!(
        ledger.state,
        TransactionState::Pending | TransactionState::Authorized
    );
    if n.transaction.payment_type.as_deref() == Some(INVOICE_CREDIT)
        && expected >= credited
        && open
        && expected == ledger.paid_amount
    {
        let transition = ledger.set_done();
        return outcome.with_transition(transition);
    }
    outcome
}

fn chargeback(ledger: &Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    Outcome::commented(
        Message::Chargeback {
            parent_tid: n.parent_or_tid().to_string(),
            amount: amount_text(ledger, n.transaction.amount, ctx.lang),
            child_tid: n.tid.clone(),
            at: ctx.now,
        },
        ctx.lang,
    )
}

fn update(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    let Some(update_type) = n.update_type() else {
        return Outcome::ignored();
    };
    let amount = amount_text(ledger, n.transaction.amount, ctx.lang);
    match update_type {
        UpdateType::AmountDueDate => {
            Outcome::commented(Message::AmountAndDueDateUpdated, ctx.lang)
        }
        UpdateType::DueDate => Outcome::commented(Message::DueDateUpdated, ctx.lang),
        UpdateType::Amount => {
            Outcome::commented(Message::AmountUpdated { amount, at: ctx.now }, ctx.lang)
        }
        UpdateType::Status => status_update(ledger, n, amount, ctx),
        UpdateType::Unknown(_) => Outcome::ignored(),
    }
}

fn status_update(
    ledger: &mut Ledger,
    n: &Notification,
    amount: String,
    ctx: &ReconcileContext<'_>,
) -> Outcome {
    let Some(raw) = n.transaction.status.as_deref() else {
        tracing::warn!(tid = %n.tid, "Status update without status");
        return Outcome::ignored();
    };
    let target = match raw.parse::<ProviderStatus>() {
        Ok(status) => TargetState::from(status),
        Err(e) => {
            tracing::warn!(tid = %n.tid, error = %e, "Status update ignored");
            return Outcome::ignored();
        }
    };
    if ledger.state == target.ledger_state() || ledger.state == TransactionState::Cancel {
        return Outcome::ignored();
    }

    let updated = Message::StatusUpdated {
        parent_tid: n.parent_or_tid().to_string(),
        amount,
        at: ctx.now,
    };
    let (message, transition) = match target {
        TargetState::Pending => (updated, Some(ledger.set_pending())),
        TargetState::Authorize => {
            let on_hold = Message::PendingToOnHold {
                parent_tid: n.parent_or_tid().to_string(),
                at: ctx.now,
            };
            let transition = ledger.set_authorized();
            if transition.applied()
                && let Some(due_date) = n.transaction.due_date.as_deref()
            {
                set_payment_term(ledger, due_date, ctx);
            }
            (on_hold, Some(transition))
        }
        TargetState::Done => {
            if matches!(
                ledger.state,
                TransactionState::Draft | TransactionState::Pending | TransactionState::Authorized
            ) {
                (updated, Some(confirm(ledger, n, ctx)))
            } else {
                (updated, Some(Transition::Rejected))
            }
        }
        TargetState::Cancel => (updated, Some(ledger.set_canceled())),
        TargetState::Error => (updated, None),
    };

    if transition == Some(Transition::Rejected) {
        tracing::info!(
            reference = %ledger.reference,
            state = %ledger.state,
            target = ?target,
            "Status update refused by ledger state"
        );
        return Outcome::ignored().with_transition(Transition::Rejected);
    }
    let outcome = Outcome::commented(message, ctx.lang);
    match transition {
        Some(transition) => outcome.with_transition(transition),
        None => outcome,
    }
}

fn instalment(ledger: &Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    let plan = n.instalment.clone().unwrap_or_default();
    Outcome::commented(
        Message::InstalmentReceived {
            parent_tid: n.parent_or_tid().to_string(),
            child_tid: n.tid.clone(),
            cycle_amount: amount_text(ledger, plan.cycle_amount, ctx.lang),
            cycles_executed: plan.cycles_executed,
            pending_cycles: plan.pending_cycles,
            next_cycle_date: plan.next_cycle_date,
            at: ctx.now,
        },
        ctx.lang,
    )
}

fn instalment_cancel(ledger: &mut Ledger, n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    let cancel_type = n
        .instalment
        .as_ref()
        .and_then(|i| i.cancel_type.as_deref())
        .and_then(CancelType::parse);
    match cancel_type {
        Some(CancelType::AllCycles) => {
            let refund_amount = n.transaction.refund.as_ref().and_then(|r| r.amount);
            let outcome = Outcome::commented(
                Message::InstalmentCancelled {
                    parent_tid: n.parent_or_tid().to_string(),
                    refund_amount: amount_text(ledger, refund_amount, ctx.lang),
                    at: ctx.now,
                },
                ctx.lang,
            );
            let transition = ledger.set_canceled_with(&[TransactionState::Done]);
            outcome.with_transition(transition)
        }
        Some(CancelType::RemainingCycles) => Outcome::commented(
            Message::InstalmentStopped {
                parent_tid: n.parent_or_tid().to_string(),
                at: ctx.now,
            },
            ctx.lang,
        ),
        None => Outcome::ignored(),
    }
}

fn collection(n: &Notification, ctx: &ReconcileContext<'_>) -> Outcome {
    let reference = n
        .collection
        .as_ref()
        .and_then(|c| c.reference.clone())
        .unwrap_or_default();
    Outcome::commented(Message::CollectionSubmission { reference }, ctx.lang)
}
