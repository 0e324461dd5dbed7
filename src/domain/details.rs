use crate::domain::money::MinorUnits;
use crate::domain::wire::{BankDetails, InstalmentData, StoreData, TransactionData};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_holder: String,
    pub bank_name: String,
    pub bank_place: String,
    pub bic: String,
    pub iban: String,
}

impl BankAccount {
    /// Only complete bank details are kept.
    pub fn from_wire(details: &BankDetails) -> Option<Self> {
        Some(Self {
            account_holder: details.account_holder.clone()?,
            bank_name: details.bank_name.clone()?,
            bank_place: details.bank_place.clone()?,
            bic: details.bic.clone()?,
            iban: details.iban.clone()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalmentPlan {
    pub cycles_executed: Option<i64>,
    pub pending_cycles: Option<i64>,
    pub cycle_amount: MinorUnits,
    pub next_cycle_date: Option<String>,
    pub raw: Value,
}

impl InstalmentPlan {
    pub fn from_wire(data: &InstalmentData) -> Self {
        Self {
            cycles_executed: data.cycles_executed,
            pending_cycles: data.pending_cycles,
            cycle_amount: MinorUnits(data.cycle_amount.unwrap_or_default()),
            next_cycle_date: data.next_cycle_date.clone(),
            raw: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub store_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country_code: Option<String>,
}

impl From<&StoreData> for StoreInfo {
    fn from(store: &StoreData) -> Self {
        Self {
            store_name: store.store_name.clone(),
            street: store.street.clone(),
            city: store.city.clone(),
            zip: store.zip.clone(),
            country_code: store.country_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultibancoReference {
    pub partner_payment_reference: String,
    pub service_supplier_id: String,
}

/// Provider-side enrichment of a ledger, filled lazily from payment responses and detail lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderDetails {
    pub tid: Option<String>,
    pub payment_type: Option<String>,
    pub payment_name: Option<String>,
    pub status: Option<String>,
    pub status_code: Option<u64>,
    pub txn_secret: Option<String>,
    pub test_mode: bool,
    pub lang: Option<String>,
    pub invoice_ref: Option<String>,
    /// Display form, `dd/mm/YYYY`.
    pub due_date: Option<String>,
    pub bank_account: Option<BankAccount>,
    pub instalment: Option<InstalmentPlan>,
    pub stores: Vec<StoreInfo>,
    pub cashpayment_token: Option<String>,
    pub cashpayment_js: Option<String>,
    pub multibanco: Option<MultibancoReference>,
    pub wallet_card: Option<String>,
    pub zero_amount_booking: bool,
}

impl ProviderDetails {
    pub fn record_bank_details(&mut self, details: &BankDetails) {
        if let Some(account) = BankAccount::from_wire(details) {
            self.bank_account = Some(account);
        }
    }

    /// At most one plan per ledger: a new plan replaces the previous one.
    pub fn record_instalment(&mut self, data: &InstalmentData) {
        self.instalment = Some(InstalmentPlan::from_wire(data));
    }

    pub fn record_stores(&mut self, stores: &BTreeMap<String, StoreData>) {
        if stores.is_empty() {
            return;
        }
        self.stores = stores.values().map(StoreInfo::from).collect();
    }

    /// Cash payment, Multibanco and wallet enrichment of a details lookup.
    pub fn record_enrichment(&mut self, tx: &TransactionData) {
        if let Some(bank) = &tx.bank_details {
            self.record_bank_details(bank);
        }
        if let Some(stores) = &tx.nearest_stores {
            self.record_stores(stores);
            if let Some(token) = &tx.checkout_token {
                self.cashpayment_token = Some(token.clone());
                if let Some(js) = &tx.checkout_js {
                    self.cashpayment_js = Some(format!("{js}?token={token}"));
                }
            }
        }
        if let (Some(reference), Some(supplier)) =
            (&tx.partner_payment_reference, &tx.service_supplier_id)
            && !reference.is_empty()
            && !supplier.is_empty()
        {
            self.multibanco = Some(MultibancoReference {
                partner_payment_reference: reference.clone(),
                service_supplier_id: supplier.clone(),
            });
        }
        if let Some(card) = &tx.payment_data
            && let Some(number) = &card.card_number
        {
            let brand = card.card_brand.clone().unwrap_or_default();
            self.wallet_card = Some(format!("{brand} {number}").trim().to_string());
        }
    }
}
