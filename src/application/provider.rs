use crate::application::engine::ReconciliationEngine;
use crate::application::requests::{HostedPage, PaymentRequest};
use crate::domain::ledger::TransactionState;
use crate::domain::ports::Endpoint;
use crate::domain::wire::GatewayResponse;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tariff {
    pub id: String,
    pub name: String,
    pub tariff_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantInfo {
    pub project: String,
    pub tariffs: Vec<Tariff>,
}

fn rejected(response: &GatewayResponse) -> PaymentError {
    PaymentError::ValidationError(response.result.text())
}

impl ReconciliationEngine {
    /// Project id and tariffs of the configured merchant account.
    pub async fn merchant_details(&self) -> Result<MerchantInfo> {
        let (Some(signature), Some(_)) = (
            self.settings.product_activation_key.as_deref(),
            self.settings.access_key.as_deref(),
        ) else {
            return Err(PaymentError::ValidationError(
                "Mandatory fields are missing".to_string(),
            ));
        };
        let body = self
            .gateway
            .request(
                Endpoint::MerchantDetails,
                json!({"merchant": {"signature": signature}}),
            )
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        if !response.result.is_success() {
            return Err(rejected(&response));
        }
        let merchant = response.merchant.unwrap_or_default();
        let project = merchant
            .project
            .ok_or_else(|| PaymentError::ValidationError("Project id is missing".to_string()))?;
        let tariffs = merchant
            .tariff
            .into_iter()
            .map(|(id, tariff)| Tariff {
                name: tariff.name.unwrap_or_else(|| id.clone()),
                tariff_type: tariff.tariff_type,
                id,
            })
            .collect();
        Ok(MerchantInfo { project, tariffs })
    }

    /// Registers `url` as the merchant's webhook endpoint.
    pub async fn configure_webhook(&self, url: &str) -> Result<()> {
        let body = self
            .gateway
            .request(Endpoint::WebhookConfigure, json!({"webhook": {"url": url}}))
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        if !response.result.is_success() {
            return Err(rejected(&response));
        }
        tracing::info!(%url, "Webhook endpoint configured");
        Ok(())
    }

    /// Hosted payment form for a draft ledger. Returns the URL the customer is sent to.
    pub async fn hosted_payment_page(
        &self,
        reference: &str,
        request: &PaymentRequest,
    ) -> Result<String> {
        let ledger = self.ledger(reference).await?;
        let _guard = self.locks.acquire(&ledger.reference).await;
        let mut ledger = self.reload(ledger.id).await?;
        if ledger.state != TransactionState::Draft {
            return Err(PaymentError::ValidationError(format!(
                "Transaction {reference} was already processed ({})",
                ledger.state
            )));
        }

        let mut payload = request.payload(&ledger, None, self.settings.return_url.as_deref());
        payload.hosted_page = Some(HostedPage {
            page_type: "PAYMENTFORM",
        });
        let body = self
            .gateway
            .request(Endpoint::SeamlessPayment, serde_json::to_value(&payload)?)
            .await?;
        let response = GatewayResponse::from_value(&body)?;
        let redirect_url = response
            .result
            .redirect_url
            .clone()
            .ok_or_else(|| rejected(&response))?;

        if let Some(secret) = response.transaction.and_then(|tx| tx.txn_secret) {
            ledger.details.txn_secret = Some(secret);
            ledger.updated_at = Utc::now();
            self.ledgers.store(ledger).await?;
        }
        Ok(redirect_url)
    }
}
