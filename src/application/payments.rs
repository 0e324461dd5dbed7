//! Shop-initiated flows: paying a ledger, capture, cancel and refund.

use crate::application::engine::ReconciliationEngine;
use crate::application::normalizer::normalize_response;
use crate::application::requests::{PaymentAction, PaymentRequest, TransactionActionPayload};
use crate::domain::i18n::{Lang, Message};
use crate::domain::ledger::{Ledger, TransactionState};
use crate::domain::money::{MinorUnits, format_amount};
use crate::domain::notification::PaymentResult;
use crate::domain::ports::Endpoint;
use crate::domain::terms::{PaymentTerm, display_due_date, due_date_in};
use crate::domain::wire::GatewayResponse;
use crate::error::{PaymentError, Result};
use chrono::Utc;

pub const REDIRECT_FAILED: &str = "Could not redirect to acquirer, please try again later";

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentInitiation {
    /// The provider answered directly; the ledger holds the applied result.
    Direct(Ledger),
    /// The customer continues on the provider's page.
    Redirect { redirect_url: String },
}

fn invalid(message: impl Into<String>) -> PaymentError {
    PaymentError::ValidationError(message.into())
}

impl ReconciliationEngine {
    /// Sends the payment request for a draft ledger.
    pub async fn initiate_payment(
        &self,
        reference: &str,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation> {
        let ledger = self.ledger(reference).await?;
        if ledger.is_child() {
            return Err(invalid(format!("{reference} is a refund and cannot be paid")));
        }
        let _guard = self.locks.acquire(&ledger.reference).await;
        let mut ledger = self.reload(ledger.id).await?;
        if ledger.state != TransactionState::Draft {
            return Err(invalid(format!(
                "Transaction {reference} was already processed ({})",
                ledger.state
            )));
        }

        let today = Utc::now().date_naive();
        let due_date = request.due_in_days.map(|days| due_date_in(days, today));
        let payload = request.payload(&ledger, due_date, self.settings.return_url.as_deref());
        let endpoint = match request.action {
            PaymentAction::Authorize => Endpoint::Authorize,
            PaymentAction::Capture | PaymentAction::ZeroAmount => Endpoint::Payment,
        };
        tracing::info!(
            reference = %ledger.reference,
            %endpoint,
            payment_type = %request.payment_type,
            "Sending payment request"
        );
        let body = self
            .gateway
            .request(endpoint, serde_json::to_value(&payload)?)
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        let tx = response.transaction.clone().unwrap_or_default();

        ledger.details.payment_type = Some(request.payment_type.clone());
        ledger.details.payment_name = Some(request.payment_name.clone());
        ledger.details.zero_amount_booking = request.action == PaymentAction::ZeroAmount;

        if !ledger.operation.is_direct() {
            let (Some(secret), Some(redirect_url)) =
                (tx.txn_secret.clone(), response.result.redirect_url.clone())
            else {
                return Err(invalid(REDIRECT_FAILED));
            };
            ledger.details.txn_secret = Some(secret);
            ledger.updated_at = Utc::now();
            self.ledgers.store(ledger).await?;
            return Ok(PaymentInitiation::Redirect { redirect_url });
        }

        let result = normalize_response(&body)?;
        let lang = Lang::resolve([ledger.lang_code()]);
        ledger.details.status = tx.status.clone();
        ledger.details.status_code = tx.status_code;
        ledger.details.test_mode = tx.test_mode == Some(1);
        ledger.details.invoice_ref = tx.invoice_ref.clone();
        if let Some(due_date) = tx.due_date.as_deref() {
            ledger.details.due_date = Some(display_due_date(due_date)?);
            ledger.payment_term = Some(PaymentTerm::from_due_date(due_date, today, lang)?);
        }
        self.ledgers.store(ledger.clone()).await?;
        self.comment(
            &ledger,
            &Message::TransactionInitiated {
                payment_name: request.payment_name.clone(),
                reference: result.tid.clone(),
            }
            .render(lang),
        )
        .await;

        let ledger = self.apply_payment_result_locked(ledger, &result).await?;
        Ok(PaymentInitiation::Direct(ledger))
    }

    async fn parent_with_tid(&self, reference: &str) -> Result<(Ledger, String)> {
        let ledger = self.ledger(reference).await?;
        if ledger.is_child() {
            return Err(invalid(format!(
                "{reference} is a refund; act on the original transaction"
            )));
        }
        let tid = ledger.provider_reference.clone().ok_or_else(|| {
            invalid(format!("Transaction {reference} has no provider reference"))
        })?;
        Ok((ledger, tid))
    }

    /// Captures an authorized payment in full.
    pub async fn capture(&self, reference: &str) -> Result<Ledger> {
        let (ledger, tid) = self.parent_with_tid(reference).await?;
        let _guard = self.locks.acquire(&ledger.reference).await;
        let ledger = self.reload(ledger.id).await?;

        let body = self
            .gateway
            .request(
                Endpoint::Capture,
                serde_json::to_value(TransactionActionPayload::for_tid(&tid))?,
            )
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        let status = response.transaction.as_ref().and_then(|tx| tx.status.clone());
        if !matches!(status.as_deref(), Some("CONFIRMED" | "PENDING")) {
            return Err(invalid(response.result.text()));
        }

        let lang = Lang::resolve([ledger.lang_code()]);
        self.comment(&ledger, &Message::Confirmed { at: Utc::now() }.render(lang))
            .await;
        let result = PaymentResult {
            tid,
            status: None,
            status_text: response.result.status_text.clone(),
        };
        self.apply_payment_result_locked(ledger, &result).await
    }

    /// Voids an authorized payment.
    pub async fn cancel(&self, reference: &str) -> Result<Ledger> {
        let (ledger, tid) = self.parent_with_tid(reference).await?;
        let _guard = self.locks.acquire(&ledger.reference).await;
        let ledger = self.reload(ledger.id).await?;

        let body = self
            .gateway
            .request(
                Endpoint::Cancel,
                serde_json::to_value(TransactionActionPayload::for_tid(&tid))?,
            )
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        let status = response.transaction.as_ref().and_then(|tx| tx.status.clone());
        if status.as_deref() != Some("DEACTIVATED") {
            return Err(invalid(response.result.text()));
        }

        let lang = Lang::resolve([ledger.lang_code()]);
        self.comment(&ledger, &Message::Canceled { at: Utc::now() }.render(lang))
            .await;
        let result = PaymentResult {
            tid,
            status,
            status_text: response.result.status_text.clone(),
        };
        self.apply_payment_result_locked(ledger, &result).await
    }

    /// Refunds `amount` of a paid ledger and returns the refund child.
    pub async fn refund(&self, reference: &str, amount: MinorUnits) -> Result<Ledger> {
        let amount = MinorUnits::positive(amount.value())?;
        let (ledger, tid) = self.parent_with_tid(reference).await?;
        let _guard = self.locks.acquire(&ledger.reference).await;
        let mut parent = self.reload(ledger.id).await?;

        let children = self.children(&parent).await?;
        let refundable = parent.refundable(&children);
        if amount > refundable {
            return Err(invalid(format!(
                "Refund of {amount} exceeds the refundable amount {refundable}"
            )));
        }

        let body = self
            .gateway
            .request(
                Endpoint::Refund,
                serde_json::to_value(TransactionActionPayload::refund(
                    &tid,
                    amount,
                    &parent.reference,
                ))?,
            )
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        let tx = response.transaction.clone().unwrap_or_default();
        let Some(transaction_tid) = tx.tid.clone() else {
            return Err(invalid(response.result.text()));
        };
        let child_tid = tx.refund.as_ref().and_then(|refund| refund.tid.clone());

        parent.updated_at = Utc::now();
        let child = parent.refund_child(amount, parent.updated_at);
        let child = self.attach_refund_child(&mut parent, child).await?;

        let lang = Lang::resolve([parent.lang_code()]);
        self.comment(
            &child,
            &Message::RefundRequested {
                parent_tid: tid,
                amount: format_amount(amount, &parent.currency, lang),
                child_tid: child_tid.clone(),
            }
            .render(lang),
        )
        .await;
        tracing::info!(
            reference = %parent.reference,
            child = %child.reference,
            %amount,
            "Refund requested"
        );

        let status = tx.status.filter(|status| status == "DEACTIVATED");
        let result = PaymentResult {
            tid: child_tid.unwrap_or(transaction_tid),
            status,
            status_text: response.result.status_text.clone(),
        };
        self.apply_payment_result_locked(child, &result).await
    }
}
