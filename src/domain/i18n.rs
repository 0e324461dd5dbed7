use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Language an audit comment is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    De,
}

impl Lang {
    /// Resolves a shop locale such as `de_DE` or `en_US`. Anything that is not German is English.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        if code == "de" || code.starts_with("de_") || code.starts_with("de-") {
            Lang::De
        } else {
            Lang::En
        }
    }

    /// First language code that resolves, falling back to English.
    pub fn resolve<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        candidates
            .into_iter()
            .flatten()
            .find(|code| !code.trim().is_empty())
            .map(Lang::from_code)
            .unwrap_or_default()
    }

    /// Two-letter code the provider API expects in `custom.lang`.
    pub fn api_code(&self) -> &'static str {
        match self {
            Lang::En => "EN",
            Lang::De => "DE",
        }
    }

    pub fn locale(&self) -> &'static str {
        match self {
            Lang::En => "en_US",
            Lang::De => "de_DE",
        }
    }
}

/// Every user-visible text the bridge produces.
///
/// Amounts are passed pre-formatted (see `money::format_amount`) so that the catalogue stays free
/// of currency logic.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    TransactionInitiated {
        payment_name: String,
        reference: String,
    },
    Confirmed {
        at: DateTime<Utc>,
    },
    Canceled {
        at: DateTime<Utc>,
    },
    RefundRequested {
        parent_tid: String,
        amount: String,
        child_tid: Option<String>,
    },
    RefundReceived {
        parent_tid: String,
        amount: String,
        child_tid: String,
    },
    CreditReceived {
        parent_tid: String,
        amount: String,
        child_tid: String,
    },
    Chargeback {
        parent_tid: String,
        amount: String,
        child_tid: String,
        at: DateTime<Utc>,
    },
    AmountAndDueDateUpdated,
    DueDateUpdated,
    AmountUpdated {
        amount: String,
        at: DateTime<Utc>,
    },
    StatusUpdated {
        parent_tid: String,
        amount: String,
        at: DateTime<Utc>,
    },
    PendingToOnHold {
        parent_tid: String,
        at: DateTime<Utc>,
    },
    InstalmentReceived {
        parent_tid: String,
        child_tid: String,
        cycle_amount: String,
        cycles_executed: Option<i64>,
        pending_cycles: Option<i64>,
        next_cycle_date: Option<String>,
        at: DateTime<Utc>,
    },
    InstalmentStopped {
        parent_tid: String,
        at: DateTime<Utc>,
    },
    InstalmentCancelled {
        parent_tid: String,
        refund_amount: String,
        at: DateTime<Utc>,
    },
    PaymentReminder {
        number: u8,
    },
    CollectionSubmission {
        reference: String,
    },
    RedirectUnknownError,
    TransactionNotFound,
    PaymentTermName {
        days: i64,
    },
}

const DATETIME: &str = "%d-%m-%Y %H:%M:%S";
const DATE: &str = "%d-%m-%Y";
const TIME: &str = "%H:%M:%S";

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl Message {
    pub fn render(&self, lang: Lang) -> String {
        match lang {
            Lang::En => self.render_en(),
            Lang::De => self.render_de(),
        }
    }

    fn render_en(&self) -> String {
        match self {
            Message::TransactionInitiated {
                payment_name,
                reference,
            } => format!(
                "Transaction initiated with Novalnet payment type {payment_name} for {reference}."
            ),
            Message::Confirmed { at } => format!(
                "The transaction has been confirmed on {},{}",
                at.format(DATE),
                at.format(TIME)
            ),
            Message::Canceled { at } => {
                format!("The transaction has been canceled on {}", at.format(DATETIME))
            }
            Message::RefundRequested {
                parent_tid,
                amount,
                child_tid: Some(child_tid),
            } => format!(
                "Refund has been initiated for the TID: {parent_tid} with the amount {amount}. New TID: {child_tid} for the refunded amount"
            ),
            Message::RefundRequested {
                parent_tid,
                amount,
                child_tid: None,
            } => format!("Refund has been initiated for the TID: {parent_tid} with the amount {amount}"),
            Message::RefundReceived {
                parent_tid,
                amount,
                child_tid,
            } => format!(
                "Refund has been initiated for the TID: {parent_tid} with the amount {amount}. The subsequent TID: {child_tid} for the refunded amount"
            ),
            Message::CreditReceived {
                parent_tid,
                amount,
                child_tid,
            } => format!(
                "Credit has been successfully received for the TID: {parent_tid} with amount on {amount}. Please refer PAID order details in our Novalnet Admin Portal for the TID: {child_tid}"
            ),
            Message::Chargeback {
                parent_tid,
                amount,
                child_tid,
                at,
            } => format!(
                "Chargeback executed successfully for the TID: {parent_tid} amount: {amount} on {}. The subsequent TID: {child_tid}",
                at.format(DATETIME)
            ),
            Message::AmountAndDueDateUpdated => {
                "The transaction has been updated with amount and due date".to_string()
            }
            Message::DueDateUpdated => "The transaction has been updated with a new due date".to_string(),
            Message::AmountUpdated { amount, at } => format!(
                "Transaction amount {amount} has been updated successfully on {}",
                at.format(DATETIME)
            ),
            Message::StatusUpdated {
                parent_tid,
                amount,
                at,
            } => format!(
                "Transaction updated successfully for the TID: {parent_tid} with the amount {amount} on {}",
                at.format(DATETIME)
            ),
            Message::PendingToOnHold { parent_tid, at } => format!(
                "The transaction status has been changed from pending to on-hold for the TID: {parent_tid} on {} & {}",
                at.format(DATE),
                at.format(TIME)
            ),
            Message::InstalmentReceived {
                parent_tid,
                child_tid,
                cycle_amount,
                cycles_executed,
                pending_cycles,
                next_cycle_date,
                at,
            } => {
                let mut text = format!(
                    "A new instalment has been received for the Transaction ID: {parent_tid} with amount {cycle_amount} on {}. The new instalment transaction ID is: {child_tid}\n",
                    at.format(DATETIME)
                );
                text.push_str("Instalment information:\n");
                text.push_str(&format!("Current Instalment Cycle: {}.\n", opt(cycles_executed)));
                text.push_str(&format!("Due instalments: {}.\n", opt(pending_cycles)));
                text.push_str(&format!("Cycle amount: {cycle_amount}.\n"));
                if let Some(date) = next_cycle_date {
                    text.push_str(&format!("Next instalment date: {date}.\n"));
                }
                text
            }
            Message::InstalmentStopped { parent_tid, at } => format!(
                "Instalment has been stopped for the TID: {parent_tid} on {}",
                at.format(DATETIME)
            ),
            Message::InstalmentCancelled {
                parent_tid,
                refund_amount,
                at,
            } => format!(
                "Instalment has been cancelled for the TID: {parent_tid} on {} & Refund has been initiated with the amount {refund_amount}",
                at.format(DATETIME)
            ),
            Message::PaymentReminder { number } => {
                format!("Payment Reminder {number} has been sent to the customer.")
            }
            Message::CollectionSubmission { reference } => format!(
                "The transaction has been submitted to the collection agency. Collection Reference: {reference}"
            ),
            Message::RedirectUnknownError => {
                "Unknown error occured please try after some time".to_string()
            }
            Message::TransactionNotFound => "Could not find the transaction".to_string(),
            Message::PaymentTermName { days } => format!("Novalnet payment due - {days} Days"),
        }
    }

    fn render_de(&self) -> String {
        match self {
            Message::TransactionInitiated {
                payment_name,
                reference,
            } => format!(
                "Transaktion mit der Novalnet-Zahlungsart {payment_name} für {reference} gestartet."
            ),
            Message::Confirmed { at } => format!(
                "Die Transaktion wurde am {}, {} bestätigt",
                at.format(DATE),
                at.format(TIME)
            ),
            Message::Canceled { at } => {
                format!("Die Transaktion wurde am {} storniert", at.format(DATETIME))
            }
            Message::RefundRequested {
                parent_tid,
                amount,
                child_tid: Some(child_tid),
            } => format!(
                "Die Rückerstattung für die TID: {parent_tid} mit dem Betrag {amount} wurde veranlasst. Die neue TID: {child_tid} für den erstatteten Betrag"
            ),
            Message::RefundRequested {
                parent_tid,
                amount,
                child_tid: None,
            } => format!(
                "Die Rückerstattung für die TID: {parent_tid} mit dem Betrag {amount} wurde veranlasst"
            ),
            Message::RefundReceived {
                parent_tid,
                amount,
                child_tid,
            } => format!(
                "Die Rückerstattung für die TID: {parent_tid} mit dem Betrag {amount} wurde veranlasst. Die nachfolgende TID: {child_tid} für den erstatteten Betrag"
            ),
            Message::CreditReceived {
                parent_tid,
                amount,
                child_tid,
            } => format!(
                "Die Gutschrift für die TID: {parent_tid} mit dem Betrag {amount} ist erfolgreich eingegangen. Bitte entnehmen Sie die TID: {child_tid} den Details der bezahlten Bestellung im Novalnet Admin-Portal"
            ),
            Message::Chargeback {
                parent_tid,
                amount,
                child_tid,
                at,
            } => format!(
                "Chargeback erfolgreich importiert für die TID: {parent_tid} Betrag: {amount} am {}. Die nachfolgende TID: {child_tid}",
                at.format(DATETIME)
            ),
            Message::AmountAndDueDateUpdated => {
                "Die Transaktion wurde mit Betrag und Fälligkeitsdatum aktualisiert".to_string()
            }
            Message::DueDateUpdated => {
                "Die Transaktion wurde mit einem neuen Fälligkeitsdatum aktualisiert".to_string()
            }
            Message::AmountUpdated { amount, at } => format!(
                "Der Transaktionsbetrag {amount} wurde am {} erfolgreich aktualisiert",
                at.format(DATETIME)
            ),
            Message::StatusUpdated {
                parent_tid,
                amount,
                at,
            } => format!(
                "Die Transaktion für die TID: {parent_tid} mit dem Betrag {amount} wurde am {} erfolgreich aktualisiert",
                at.format(DATETIME)
            ),
            Message::PendingToOnHold { parent_tid, at } => format!(
                "Der Status der Transaktion mit der TID: {parent_tid} wurde am {} um {} von ausstehend auf ausgesetzt geändert",
                at.format(DATE),
                at.format(TIME)
            ),
            Message::InstalmentReceived {
                parent_tid,
                child_tid,
                cycle_amount,
                cycles_executed,
                pending_cycles,
                next_cycle_date,
                at,
            } => {
                let mut text = format!(
                    "Für die Transaktions-ID: {parent_tid} ist eine neue Rate mit dem Betrag {cycle_amount} am {} eingegangen. Die Transaktions-ID der neuen Rate lautet: {child_tid}\n",
                    at.format(DATETIME)
                );
                text.push_str("Informationen zur Ratenzahlung:\n");
                text.push_str(&format!("Aktueller Ratenzyklus: {}.\n", opt(cycles_executed)));
                text.push_str(&format!("Fällige Raten: {}.\n", opt(pending_cycles)));
                text.push_str(&format!("Ratenbetrag: {cycle_amount}.\n"));
                if let Some(date) = next_cycle_date {
                    text.push_str(&format!("Nächstes Ratendatum: {date}.\n"));
                }
                text
            }
            Message::InstalmentStopped { parent_tid, at } => format!(
                "Die Ratenzahlung für die TID: {parent_tid} wurde am {} gestoppt",
                at.format(DATETIME)
            ),
            Message::InstalmentCancelled {
                parent_tid,
                refund_amount,
                at,
            } => format!(
                "Die Ratenzahlung für die TID: {parent_tid} wurde am {} storniert und die Rückerstattung mit dem Betrag {refund_amount} veranlasst",
                at.format(DATETIME)
            ),
            Message::PaymentReminder { number } => {
                format!("Zahlungserinnerung {number} wurde an den Kunden gesendet.")
            }
            Message::CollectionSubmission { reference } => format!(
                "Die Transaktion wurde an das Inkassobüro übergeben. Inkasso-Referenz: {reference}"
            ),
            Message::RedirectUnknownError => {
                "Ein unbekannter Fehler ist aufgetreten, bitte versuchen Sie es später erneut".to_string()
            }
            Message::TransactionNotFound => "Die Transaktion wurde nicht gefunden".to_string(),
            Message::PaymentTermName { days } => format!("Novalnet Zahlungsziel - {days} Tage"),
        }
    }
}
