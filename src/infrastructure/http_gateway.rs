use crate::config::GatewaySettings;
use crate::domain::ports::{Endpoint, Gateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};
use std::time::Duration;

pub const CONNECTION_FAILED: &str = "Could not establish the connection to the API.";
const ACCESS_KEY_HEADER: &str = "x-nn-access-key";

/// Signed JSON POSTs against the provider's v2 API.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    signature: Option<String>,
    tariff: Option<String>,
}

impl HttpGateway {
    pub fn new(settings: &GatewaySettings) -> Result<Self> {
        let access_key = settings
            .payment_access_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                PaymentError::ValidationError(
                    "gateway.payment_access_key is not configured".to_string(),
                )
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            headers: signed_headers(access_key)?,
            signature: settings.product_activation_key.clone(),
            tariff: settings.tariff.clone(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }
}

fn signed_headers(access_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("charset"),
        HeaderValue::from_static("utf-8"),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let encoded = HeaderValue::from_str(&STANDARD.encode(access_key))
        .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
    headers.insert(HeaderName::from_static(ACCESS_KEY_HEADER), encoded);
    Ok(headers)
}

/// Adds the merchant block and a default language unless the caller set them.
pub fn prepare_payload(payload: Value, signature: Option<&str>, tariff: Option<&str>) -> Value {
    let mut body = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return other,
    };
    if !body.contains_key("merchant")
        && let Some(signature) = signature
    {
        let mut merchant = Map::new();
        merchant.insert("signature".into(), json!(signature));
        if let Some(tariff) = tariff {
            merchant.insert("tariff".into(), json!(tariff));
        }
        body.insert("merchant".into(), Value::Object(merchant));
    }
    match body.get_mut("custom") {
        Some(Value::Object(custom)) => {
            custom.entry("lang").or_insert_with(|| json!("EN"));
        }
        _ => {
            body.insert("custom".into(), json!({"lang": "EN"}));
        }
    }
    Value::Object(body)
}

/// Maps an HTTP answer to the parsed body or a gateway error.
pub fn interpret_response(status: u16, body: &str) -> Result<Value> {
    if status == 204 {
        return Ok(Value::Null);
    }
    if status != 200 {
        return Err(PaymentError::gateway(status, 0, format!("Error[{status}]")));
    }
    let value: Value = serde_json::from_str(body)?;
    let result = value.get("result");
    if result.and_then(|r| r.get("status")).and_then(Value::as_str) == Some("FAILURE") {
        let code = result
            .and_then(|r| r.get("status_code"))
            .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or_default();
        let text = result
            .and_then(|r| r.get("status_text"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(PaymentError::gateway(status, code, text));
    }
    Ok(value)
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn request(&self, endpoint: Endpoint, payload: Value) -> Result<Value> {
        let body = prepare_payload(payload, self.signature.as_deref(), self.tariff.as_deref());
        tracing::debug!(%endpoint, "Gateway request");
        let response = self
            .client
            .post(self.url(endpoint))
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%endpoint, error = %e, "Gateway unreachable");
                PaymentError::gateway(0, 0, CONNECTION_FAILED)
            })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|_| PaymentError::gateway(status, 0, CONNECTION_FAILED))?;
        tracing::debug!(%endpoint, status, "Gateway response");
        interpret_response(status, &text)
    }
}
