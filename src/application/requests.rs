//! Outbound request bodies.

use crate::domain::i18n::Lang;
use crate::domain::ledger::Ledger;
use crate::domain::money::MinorUnits;
use serde::Serialize;
use serde_json::Value;

pub const SYSTEM_NAME: &str = "novalnet-bridge";
pub const SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");
const INSTALMENT_INTERVAL: &str = "1m";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub zip: String,
    pub country_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Shipping {
    SameAsBilling { same_as_billing: u8 },
    Address(Address),
}

impl Shipping {
    pub fn for_addresses(billing: &Address, shipping: Option<&Address>) -> Self {
        match shipping {
            Some(address) if address != billing => Self::Address(address.clone()),
            _ => Self::SameAsBilling { same_as_billing: 1 },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_ip: Option<String>,
    pub billing: Address,
    #[serde(skip)]
    pub shipping_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CustomerPayload<'a> {
    #[serde(flatten)]
    customer: &'a Customer,
    shipping: Shipping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPayload {
    pub payment_type: String,
    pub amount: i64,
    pub currency: String,
    pub order_no: String,
    pub test_mode: u8,
    pub system_name: &'static str,
    pub system_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_token: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_3d: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_return_url: Option<String>,
}

/// `custom` block of a payment request. The order language is echoed back in webhooks as
/// `custom.order_lang`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomPayload {
    pub lang: &'static str,
    pub input1: &'static str,
    pub inputval1: String,
}

impl CustomPayload {
    pub fn new(lang: Lang, order_lang: &str) -> Self {
        Self {
            lang: lang.api_code(),
            input1: "order_lang",
            inputval1: order_lang.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalmentPayload {
    pub cycles: u32,
    pub interval: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostedPage {
    #[serde(rename = "type")]
    pub page_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentPayload<'a> {
    customer: CustomerPayload<'a>,
    pub transaction: TransactionPayload,
    pub custom: CustomPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instalment: Option<InstalmentPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_page: Option<HostedPage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentAction {
    #[default]
    Capture,
    Authorize,
    /// Books the payment method without charging; the amount sent is 0.
    ZeroAmount,
}

/// What the shop asks for when a customer pays a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub payment_type: String,
    pub payment_name: String,
    pub customer: Customer,
    pub action: PaymentAction,
    pub due_in_days: Option<u32>,
    pub instalment_cycles: Option<u32>,
    pub payment_data: Option<Value>,
    pub test_mode: bool,
    pub create_token: bool,
    pub enforce_3d: bool,
}

impl PaymentRequest {
    pub fn new(payment_type: impl Into<String>, customer: Customer) -> Self {
        let payment_type = payment_type.into();
        Self {
            payment_name: payment_type.clone(),
            payment_type,
            customer,
            action: PaymentAction::default(),
            due_in_days: None,
            instalment_cycles: None,
            payment_data: None,
            test_mode: false,
            create_token: false,
            enforce_3d: false,
        }
    }

    pub fn payload<'a>(
        &'a self,
        ledger: &Ledger,
        due_date: Option<String>,
        return_url: Option<&str>,
    ) -> PaymentPayload<'a> {
        let lang = Lang::resolve([ledger.partner_lang.as_deref()]);
        let amount = match self.action {
            PaymentAction::ZeroAmount => MinorUnits::ZERO,
            _ => ledger.amount,
        };
        let flag = |enabled: bool| enabled.then_some(1);
        PaymentPayload {
            customer: CustomerPayload {
                customer: &self.customer,
                shipping: Shipping::for_addresses(
                    &self.customer.billing,
                    self.customer.shipping_address.as_ref(),
                ),
            },
            transaction: TransactionPayload {
                payment_type: self.payment_type.clone(),
                amount: amount.value(),
                currency: ledger.currency.clone(),
                order_no: ledger.reference.clone(),
                test_mode: u8::from(self.test_mode),
                system_name: SYSTEM_NAME,
                system_version: SYSTEM_VERSION,
                payment_data: self.payment_data.clone(),
                create_token: flag(self.create_token),
                enforce_3d: flag(self.enforce_3d),
                due_date,
                return_url: return_url.map(str::to_string),
                error_return_url: return_url.map(str::to_string),
            },
            custom: CustomPayload::new(
                lang,
                ledger.partner_lang.as_deref().unwrap_or(lang.locale()),
            ),
            instalment: self.instalment_cycles.map(|cycles| InstalmentPayload {
                cycles,
                interval: INSTALMENT_INTERVAL,
            }),
            hosted_page: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRef {
    pub tid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopInvoked {
    pub shop_invoked: u8,
}

/// Capture, cancel and refund bodies. The `shop_invoked` marker comes back in the webhook echo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionActionPayload {
    pub transaction: TransactionRef,
    pub custom: ShopInvoked,
}

impl TransactionActionPayload {
    pub fn for_tid(tid: &str) -> Self {
        Self {
            transaction: TransactionRef {
                tid: tid.to_string(),
                amount: None,
                reason: None,
            },
            custom: ShopInvoked { shop_invoked: 1 },
        }
    }

    pub fn refund(tid: &str, amount: MinorUnits, reference: &str) -> Self {
        let mut payload = Self::for_tid(tid);
        payload.transaction.amount = Some(amount.abs().value());
        payload.transaction.reason = Some(format!(
            "Refund for payment transaction with reference/{reference}"
        ));
        payload
    }
}
