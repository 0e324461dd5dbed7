use crate::domain::ports::{Endpoint, Gateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Gateway for replays without network access. Every call fails, so flows that would need the
/// provider stop with a gateway error while recorded details and webhooks still apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGateway;

#[async_trait]
impl Gateway for OfflineGateway {
    async fn request(&self, endpoint: Endpoint, _payload: Value) -> Result<Value> {
        tracing::warn!(%endpoint, "Provider call attempted while offline");
        Err(PaymentError::gateway(
            503,
            0,
            format!("{endpoint} is not available offline"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_offline_gateway_always_fails() {
        let err = OfflineGateway
            .request(Endpoint::TransactionDetails, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Gateway { status: 503, .. }));
    }
}
