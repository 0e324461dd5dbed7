use crate::application::checksum::{verify_redirect, verify_webhook};
use crate::application::locks::ReferenceLocks;
use crate::application::normalizer::{normalize_redirect, normalize_webhook};
use crate::application::reconcile::{Disposition, ReconcileContext, reconcile};
use crate::domain::callback::{CallbackEntry, DedupeKey, NewCallback};
use crate::domain::i18n::Lang;
use crate::domain::ledger::{AmountStatus, Ledger, LedgerDraft, LedgerId, TransactionState, Transition};
use crate::domain::money::MinorUnits;
use crate::domain::notification::{EventType, PaymentResult, RedirectReturn};
use crate::domain::ports::{
    CallbackStoreBox, Endpoint, GatewayBox, LedgerStoreBox, MailMessage, NotifierBox,
};
use crate::domain::status::{ProviderStatus, TargetState, resolve_state};
use crate::domain::terms::{PaymentTerm, display_due_date};
use crate::domain::wire::GatewayResponse;
use crate::error::{PaymentError, Result};
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

pub const MAIL_SUBJECT: &str = "Novalnet callback notification";
/// Host whose addresses may deliver webhooks.
pub const NOVALNET_HOST: &str = "pay-nn.de";

/// Runtime switches of the engine, usually derived from [`crate::config::Settings`].
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub access_key: Option<String>,
    pub product_activation_key: Option<String>,
    pub verify_checksum: bool,
    pub mail_to: Option<String>,
    pub mail_from: String,
    pub return_url: Option<String>,
    /// Accept webhooks from any address, for testing the notification URL by hand.
    pub allow_manual_testing: bool,
    /// Host resolved to the addresses allowed to deliver webhooks.
    pub webhook_host: String,
}

impl EngineSettings {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            access_key: settings.gateway.payment_access_key.clone(),
            product_activation_key: settings.gateway.product_activation_key.clone(),
            verify_checksum: settings.webhook.verify_checksum,
            mail_to: settings.webhook.send_mail_to.clone(),
            mail_from: settings.webhook.mail_from.clone(),
            return_url: settings.gateway.return_url.clone(),
            allow_manual_testing: settings.webhook.allow_manual_testing,
            webhook_host: settings.webhook.source_host.clone(),
        }
    }

    fn checksum_key(&self) -> Option<&str> {
        if !self.verify_checksum {
            return None;
        }
        self.access_key.as_deref().filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookReceipt {
    /// Enqueued and the ledger's queue drained.
    Processed,
    /// Enqueued; the ledger is still waiting for its synchronous result.
    Queued,
    /// A `PAYMENT` event stood in for a lost synchronous response.
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    Completed { reference: String },
    Failed { message: String },
}

/// Merges synchronous results, redirect returns and webhooks into one ledger state.
///
/// Every mutation runs under the lock of the ledger family's root reference. Webhooks are
/// appended to the callback queue first and applied in queue order once the ledger has left
/// `draft`.
pub struct ReconciliationEngine {
    pub(super) ledgers: LedgerStoreBox,
    pub(super) callbacks: CallbackStoreBox,
    pub(super) gateway: GatewayBox,
    pub(super) notifier: NotifierBox,
    pub(super) locks: ReferenceLocks,
    pub(super) settings: EngineSettings,
}

impl ReconciliationEngine {
    pub fn new(
        ledgers: LedgerStoreBox,
        callbacks: CallbackStoreBox,
        gateway: GatewayBox,
        notifier: NotifierBox,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ledgers,
            callbacks,
            gateway,
            notifier,
            locks: ReferenceLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn create_ledger(&self, draft: LedgerDraft) -> Result<Ledger> {
        if draft.reference.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Ledger reference must not be empty".to_string(),
            ));
        }
        let ledger = self.ledgers.insert(draft).await?;
        tracing::info!(reference = %ledger.reference, id = %ledger.id, "Ledger created");
        Ok(ledger)
    }

    pub async fn ledger(&self, reference: &str) -> Result<Ledger> {
        self.ledgers
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::LedgerNotFound(reference.to_string()))
    }

    pub async fn ledgers(&self) -> Result<Vec<Ledger>> {
        self.ledgers.get_all().await
    }

    pub async fn children(&self, ledger: &Ledger) -> Result<Vec<Ledger>> {
        let mut children = Vec::with_capacity(ledger.children.len());
        for id in &ledger.children {
            if let Some(child) = self.ledgers.get(*id).await? {
                children.push(child);
            }
        }
        Ok(children)
    }

    pub async fn callbacks(&self, reference: &str) -> Result<Vec<CallbackEntry>> {
        let ledger = self.root_of(self.ledger(reference).await?).await?;
        self.callbacks.for_ledger(ledger.id).await
    }

    pub(super) async fn reload(&self, id: LedgerId) -> Result<Ledger> {
        self.ledgers
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::LedgerNotFound(id.to_string()))
    }

    pub(super) async fn root_of(&self, ledger: Ledger) -> Result<Ledger> {
        match ledger.source_transaction_id {
            Some(parent) => self.reload(parent).await,
            None => Ok(ledger),
        }
    }

    /// Rejects webhook deliveries that do not come from the provider's host, unless manual
    /// testing is allowed.
    pub async fn verify_webhook_source(&self, source: IpAddr) -> Result<()> {
        if self.settings.allow_manual_testing {
            return Ok(());
        }
        let host = self.settings.webhook_host.trim();
        if host.is_empty() {
            return Err(PaymentError::UnauthorizedSource(
                "Unauthorized access: Missing Host or Received IP".to_string(),
            ));
        }
        let source = source.to_canonical();
        let allowed = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
            tracing::error!(%host, error = %e, "Webhook host could not be resolved");
            PaymentError::UnauthorizedSource(format!("Unauthorized access: cannot resolve {host}"))
        })?;
        if allowed.into_iter().any(|addr| addr.ip().to_canonical() == source) {
            return Ok(());
        }
        tracing::warn!(%source, %host, "Webhook from unexpected address");
        Err(PaymentError::UnauthorizedSource(format!(
            "Unauthorized request from IP {source}"
        )))
    }

    /// Accepts one webhook delivery.
    ///
    /// Nothing is persisted unless the body is well formed, resolves to a ledger and carries a
    /// valid checksum.
    pub async fn receive_webhook(&self, body: &Value) -> Result<WebhookReceipt> {
        let notification = normalize_webhook(body)?;
        let root = self.root_of(self.ledger(&notification.order_no).await?).await?;
        if let Some(key) = self.settings.checksum_key() {
            verify_webhook(&notification, key)?;
        }

        let _guard = self.locks.acquire(&root.reference).await;
        let root = self.reload(root.id).await?;
        if notification.event_type == EventType::Credit
            && let Some(amount) = notification.transaction.amount
            && root.paid_amount.checked_add(MinorUnits(amount)).is_none()
        {
            return Err(PaymentError::malformed(format!(
                "credit of {amount} overflows the paid total of {}",
                root.reference
            )));
        }
        let entry = self
            .callbacks
            .append(NewCallback {
                ledger: root.id,
                event_type: notification.event_type.clone(),
                tid: notification.tid.clone(),
                parent_tid: notification.parent_tid.clone(),
                checksum: notification.checksum.clone(),
                payload: body.clone(),
            })
            .await?;
        tracing::debug!(
            reference = %root.reference,
            callback = entry.id.0,
            event = %notification.event_type,
            tid = %notification.tid,
            "Webhook enqueued"
        );

        if notification.event_type == EventType::Payment && root.state == TransactionState::Draft {
            tracing::info!(
                reference = %root.reference,
                tid = %notification.tid,
                "Recovering lost payment response from webhook"
            );
            let status = if notification.result_status == "FAILURE" {
                Some(notification.result_status.clone())
            } else {
                notification.transaction.status.clone()
            };
            let result = PaymentResult {
                tid: notification.parent_or_tid().to_string(),
                status,
                status_text: notification.result.status_text.clone(),
            };
            self.apply_payment_result_locked(root, &result).await?;
            return Ok(WebhookReceipt::Recovered);
        }

        if root.state == TransactionState::Draft {
            tracing::info!(reference = %root.reference, "Ledger still in draft, webhook left queued");
            return Ok(WebhookReceipt::Queued);
        }
        self.drain_locked(&root).await?;
        Ok(WebhookReceipt::Processed)
    }

    /// Applies every not-done queue entry of the ledger family. Returns the number of entries
    /// marked done.
    pub async fn drain_callbacks(&self, reference: &str) -> Result<usize> {
        let root = self.root_of(self.ledger(reference).await?).await?;
        let _guard = self.locks.acquire(&root.reference).await;
        let root = self.reload(root.id).await?;
        self.drain_locked(&root).await
    }

    pub(super) async fn drain_locked(&self, root: &Ledger) -> Result<usize> {
        let entries = self.callbacks.for_ledger(root.id).await?;
        let mut done: HashSet<DedupeKey> = entries
            .iter()
            .filter(|entry| entry.is_done)
            .map(CallbackEntry::dedupe_key)
            .collect();

        let mut processed = 0;
        for mut entry in entries.into_iter().filter(|entry| !entry.is_done) {
            let key = entry.dedupe_key();
            if done.contains(&key) {
                tracing::info!(
                    reference = %root.reference,
                    callback = entry.id.0,
                    tid = %entry.tid,
                    "Replayed webhook skipped"
                );
            } else {
                self.apply_entry(root.id, &mut entry).await?;
            }
            entry.mark_done();
            self.callbacks.store(entry).await?;
            done.insert(key);
            processed += 1;
        }
        if processed > 0 {
            tracing::debug!(reference = %root.reference, processed, "Callback queue drained");
        }
        Ok(processed)
    }

    async fn apply_entry(&self, ledger_id: LedgerId, entry: &mut CallbackEntry) -> Result<()> {
        let notification = match normalize_webhook(&entry.payload) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(callback = entry.id.0, error = %e, "Unreadable queue entry dropped");
                return Ok(());
            }
        };
        let mut ledger = self.reload(ledger_id).await?;
        let children = self.children(&ledger).await?;
        let now = Utc::now();
        let ctx = ReconcileContext {
            lang: Lang::resolve([notification.order_lang.as_deref(), ledger.lang_code()]),
            now,
            today: now.date_naive(),
            children: &children,
        };
        let outcome = reconcile(&mut ledger, &notification, &ctx);

        match outcome.disposition {
            Disposition::Applied => {}
            Disposition::Echo => {
                tracing::info!(
                    reference = %ledger.reference,
                    event = %notification.event_type,
                    tid = %notification.tid,
                    "Shop-invoked echo suppressed"
                );
                return Ok(());
            }
            Disposition::Duplicate => {
                tracing::info!(
                    reference = %ledger.reference,
                    tid = %notification.tid,
                    "Event already reflected in ledger"
                );
                return Ok(());
            }
            Disposition::Ignored => {
                tracing::debug!(
                    reference = %ledger.reference,
                    event = %notification.event_type,
                    "Event has no effect"
                );
                return Ok(());
            }
        }

        if let Some(refund) = &outcome.refund {
            let mut child = ledger.refund_child(refund.amount, now);
            child.provider_reference = Some(refund.tid.clone());
            child.details.tid = Some(refund.tid.clone());
            child.set_done();
            ledger.updated_at = now;
            let child = self.attach_refund_child(&mut ledger, child).await?;
            tracing::info!(
                reference = %ledger.reference,
                child = %child.reference,
                tid = %refund.tid,
                amount = %refund.amount,
                "Refund recorded"
            );
        }

        ledger.updated_at = now;
        self.ledgers.store(ledger.clone()).await?;
        if let Some(transition) = outcome.transition {
            tracing::info!(
                reference = %ledger.reference,
                event = %notification.event_type,
                state = %ledger.state,
                ?transition,
                "Webhook applied"
            );
        }
        if let Some(comment) = outcome.comment {
            entry.record_comment(comment.clone(), now);
            self.publish(&ledger, &comment).await;
        }
        Ok(())
    }

    /// Persists `child` and `parent` together and refreshes `parent` with the stored version.
    pub(super) async fn attach_refund_child(&self, parent: &mut Ledger, child: Ledger) -> Result<Ledger> {
        let (stored, child) = self.ledgers.insert_child(parent.clone(), child).await?;
        *parent = stored;
        Ok(child)
    }

    /// Audit comment plus, when configured, a notification mail. Delivery failures are logged.
    pub(super) async fn publish(&self, ledger: &Ledger, comment: &str) {
        self.comment(ledger, comment).await;
        if let Some(to) = &self.settings.mail_to {
            let mail = MailMessage {
                to: to.clone(),
                from: self.settings.mail_from.clone(),
                subject: MAIL_SUBJECT.to_string(),
                body: comment.to_string(),
            };
            if let Err(e) = self.notifier.send_mail(&mail).await {
                tracing::warn!(reference = %ledger.reference, error = %e, "Notification mail not sent");
            }
        }
    }

    pub(super) async fn comment(&self, ledger: &Ledger, comment: &str) {
        if let Err(e) = self.notifier.post_comment(ledger, comment).await {
            tracing::warn!(reference = %ledger.reference, error = %e, "Audit comment not posted");
        }
    }

    /// Applies the outcome of a payment attempt to the ledger `reference`.
    pub async fn apply_payment_result(
        &self,
        reference: &str,
        result: PaymentResult,
    ) -> Result<Ledger> {
        let ledger = self.ledger(reference).await?;
        let root = self.root_of(ledger.clone()).await?;
        let _guard = self.locks.acquire(&root.reference).await;
        let ledger = self.reload(ledger.id).await?;
        self.apply_payment_result_locked(ledger, &result).await
    }

    pub(super) async fn apply_payment_result_locked(
        &self,
        mut ledger: Ledger,
        result: &PaymentResult,
    ) -> Result<Ledger> {
        if result.tid.trim().is_empty() {
            return Err(PaymentError::ValidationError("Invalid transaction".to_string()));
        }
        ledger.provider_reference = Some(result.tid.clone());
        ledger.details.tid = Some(result.tid.clone());

        let transition = match result.status.as_deref() {
            Some("FAILURE") => {
                ledger.set_error(result.status_text.clone().unwrap_or_default())
            }
            Some("DEACTIVATED") => ledger.set_canceled(),
            _ => {
                let lang = Lang::resolve([ledger.lang_code()]);
                let body = self
                    .gateway
                    .request(
                        Endpoint::TransactionDetails,
                        json!({
                            "transaction": {"tid": result.tid},
                            "custom": {"lang": lang.api_code()},
                        }),
                    )
                    .await?;
                apply_details(&mut ledger, &body, Utc::now().date_naive())?
            }
        };
        tracing::info!(
            reference = %ledger.reference,
            tid = %result.tid,
            state = %ledger.state,
            ?transition,
            "Payment result applied"
        );

        ledger.updated_at = Utc::now();
        self.ledgers.store(ledger.clone()).await?;
        if ledger.is_child() || ledger.state == TransactionState::Draft {
            return Ok(ledger);
        }
        self.drain_locked(&ledger).await?;
        self.reload(ledger.id).await
    }

    /// Applies a recorded `transaction/details` response without calling the provider.
    pub async fn record_transaction_details(&self, reference: &str, body: &Value) -> Result<Ledger> {
        let ledger = self.ledger(reference).await?;
        let root = self.root_of(ledger.clone()).await?;
        let _guard = self.locks.acquire(&root.reference).await;
        let mut ledger = self.reload(ledger.id).await?;

        apply_details(&mut ledger, body, Utc::now().date_naive())?;
        if ledger.provider_reference.is_none() {
            ledger.provider_reference = ledger.details.tid.clone();
        }
        ledger.updated_at = Utc::now();
        self.ledgers.store(ledger.clone()).await?;
        if ledger.is_child() || ledger.state == TransactionState::Draft {
            return Ok(ledger);
        }
        self.drain_locked(&ledger).await?;
        self.reload(ledger.id).await
    }

    /// Browser return from the hosted payment page.
    pub async fn handle_redirect(&self, params: &HashMap<String, String>) -> Result<RedirectOutcome> {
        let (txn_secret, checksum, result) = match normalize_redirect(params)? {
            RedirectReturn::Failed { message } => return Ok(RedirectOutcome::Failed { message }),
            RedirectReturn::Completed {
                txn_secret,
                checksum,
                result,
                ..
            } => (txn_secret, checksum, result),
        };

        let ledger = self
            .ledgers
            .find_by_txn_secret(&txn_secret)
            .await?
            .ok_or_else(|| PaymentError::LedgerNotFound(format!("txn_secret {txn_secret}")))?;
        if let Some(key) = self.settings.checksum_key() {
            let status = result.status.as_deref().unwrap_or_default();
            verify_redirect(&result.tid, &txn_secret, status, &checksum, key)?;
        }

        let root = self.root_of(ledger.clone()).await?;
        let _guard = self.locks.acquire(&root.reference).await;
        let ledger = self.reload(ledger.id).await?;
        let ledger = self.apply_payment_result_locked(ledger, &result).await?;
        Ok(RedirectOutcome::Completed {
            reference: ledger.reference,
        })
    }

    /// Lifecycle hook before a ledger's status is shown: drains its queue and returns it.
    pub async fn finalize(&self, reference: &str) -> Result<Ledger> {
        let ledger = self.ledger(reference).await?;
        let root = self.root_of(ledger.clone()).await?;
        let _guard = self.locks.acquire(&root.reference).await;
        let root = self.reload(root.id).await?;
        if root.state != TransactionState::Draft {
            self.drain_locked(&root).await?;
        }
        self.reload(ledger.id).await
    }
}

/// Applies a `transaction/details` response to `ledger`: enrichment, amounts and the state the
/// provider status maps to.
pub fn apply_details(ledger: &mut Ledger, body: &Value, today: NaiveDate) -> Result<Transition> {
    let response = GatewayResponse::from_value(body)?;
    let tx = response
        .transaction
        .as_ref()
        .filter(|tx| tx.tid.is_some())
        .ok_or_else(|| PaymentError::ValidationError("Invalid transaction".to_string()))?;
    let raw_status = tx.status.as_deref().ok_or_else(|| {
        PaymentError::ValidationError("Transaction status is missing".to_string())
    })?;
    let status: ProviderStatus = raw_status.parse().map_err(PaymentError::ValidationError)?;
    let target = resolve_state(status, tx.status_code, tx.payment_type.as_deref());

    ledger.details.record_enrichment(tx);
    if let Some(instalment) = &response.instalment
        && instalment.cycles_executed.is_some()
    {
        ledger.details.record_instalment(instalment);
    }
    ledger.details.tid = tx.tid.clone();
    ledger.details.status = Some(raw_status.to_string());
    ledger.details.status_code = tx.status_code;
    if tx.payment_type.is_some() {
        ledger.details.payment_type = tx.payment_type.clone();
    }
    if let Some(test_mode) = tx.test_mode {
        ledger.details.test_mode = test_mode == 1;
    }
    if tx.invoice_ref.is_some() {
        ledger.details.invoice_ref = tx.invoice_ref.clone();
    }
    if let Some(lang) = response.custom.as_ref().and_then(|c| c.order_lang.clone()) {
        ledger.details.lang = Some(lang);
    }
    if let Some(due_date) = tx.due_date.as_deref() {
        let lang = Lang::resolve([ledger.lang_code()]);
        ledger.details.due_date = Some(display_due_date(due_date)?);
        ledger.payment_term = Some(PaymentTerm::from_due_date(due_date, today, lang)?);
    }

    let transition = match target {
        TargetState::Pending => ledger.set_pending(),
        TargetState::Authorize => ledger.set_authorized(),
        TargetState::Done => ledger.set_done(),
        TargetState::Cancel => ledger.set_canceled(),
        TargetState::Error => {
            let message = response
                .result
                .status_text
                .clone()
                .unwrap_or_else(|| format!("Payment failed with status {raw_status}"));
            ledger.set_error(message)
        }
    };
    if transition == Transition::Rejected {
        tracing::info!(
            reference = %ledger.reference,
            state = %ledger.state,
            target = ?target,
            "Details lookup asks for a transition the ledger refuses"
        );
        return Ok(transition);
    }

    if !ledger.is_child() {
        let amount = tx.amount.map(MinorUnits).unwrap_or(ledger.amount);
        if target == TargetState::Done {
            ledger.raise_paid_to(amount);
        }
        ledger.raise_refund_to(MinorUnits(tx.refunded_amount.unwrap_or_default()));
        ledger.amount_status = Some(AmountStatus {
            paid_amount: amount,
            refund_amount: ledger.refund_amount,
        });
    }
    Ok(transition)
}
