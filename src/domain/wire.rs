//! Inbound JSON shapes returned by the payment provider, both as API responses and as webhook
//! bodies. Every field is optional: which ones are present depends on the endpoint and the
//! payment type, and validation happens where a field is actually required.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiStatus {
    Success,
    Failure,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultData {
    pub status: Option<ApiStatus>,
    #[serde(default, deserialize_with = "opt_u64")]
    pub status_code: Option<u64>,
    pub status_text: Option<String>,
    pub redirect_url: Option<String>,
}

impl ResultData {
    pub fn is_success(&self) -> bool {
        self.status == Some(ApiStatus::Success) && self.status_code == Some(100)
    }

    pub fn text(&self) -> String {
        self.status_text.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefundData {
    #[serde(default, deserialize_with = "opt_id")]
    pub tid: Option<String>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BankDetails {
    pub account_holder: Option<String>,
    pub bank_name: Option<String>,
    pub bank_place: Option<String>,
    pub bic: Option<String>,
    pub iban: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    pub store_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardData {
    pub card_brand: Option<String>,
    pub card_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionData {
    #[serde(default, deserialize_with = "opt_id")]
    pub tid: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "opt_u64")]
    pub status_code: Option<u64>,
    pub payment_type: Option<String>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub due_date: Option<String>,
    pub update_type: Option<String>,
    pub refund: Option<RefundData>,
    #[serde(default, deserialize_with = "opt_id")]
    pub order_no: Option<String>,
    pub invoice_ref: Option<String>,
    #[serde(default, deserialize_with = "opt_u64")]
    pub test_mode: Option<u64>,
    pub txn_secret: Option<String>,
    pub bank_details: Option<BankDetails>,
    pub nearest_stores: Option<BTreeMap<String, StoreData>>,
    pub checkout_token: Option<String>,
    pub checkout_js: Option<String>,
    pub partner_payment_reference: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub service_supplier_id: Option<String>,
    pub payment_data: Option<CardData>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub refunded_amount: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstalmentData {
    #[serde(default, deserialize_with = "opt_i64")]
    pub cycles_executed: Option<i64>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub pending_cycles: Option<i64>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub cycle_amount: Option<i64>,
    pub next_cycle_date: Option<String>,
    pub cancel_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectionData {
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomData {
    pub order_lang: Option<String>,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TariffData {
    pub name: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "opt_id")]
    pub tariff_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MerchantData {
    #[serde(default, deserialize_with = "opt_id")]
    pub project: Option<String>,
    #[serde(default)]
    pub tariff: BTreeMap<String, TariffData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventData {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub tid: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub parent_tid: Option<String>,
    pub checksum: Option<String>,
}

/// Any JSON body the provider sends: API responses and webhook notifications share this envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayResponse {
    #[serde(default)]
    pub result: ResultData,
    pub event: Option<EventData>,
    pub transaction: Option<TransactionData>,
    pub instalment: Option<InstalmentData>,
    pub collection: Option<CollectionData>,
    pub custom: Option<CustomData>,
    pub merchant: Option<MerchantData>,
}

impl GatewayResponse {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Provider ids arrive as JSON numbers or strings depending on the endpoint.
fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(scalar_to_string))
}

fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| de::Error::custom("number out of range")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!("expected integer, got {other}"))),
    }
}

fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = opt_i64(deserializer)?;
    value
        .map(|v| u64::try_from(v).map_err(de::Error::custom))
        .transpose()
}
