use crate::domain::ledger::{LedgerDraft, Operation};
use crate::domain::money::MinorUnits;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

/// One line of a replay journal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    /// A new ledger, as the shop would create it at checkout.
    Ledger {
        reference: String,
        amount: i64,
        currency: String,
        #[serde(default)]
        operation: Operation,
        #[serde(default)]
        lang: Option<String>,
    },
    /// A recorded `transaction/details` response for a ledger.
    Details { reference: String, body: Value },
    /// A webhook body exactly as delivered.
    Webhook { body: Value },
    /// Query parameters of a browser return.
    Redirect { params: HashMap<String, String> },
    /// Status page visit: drains the ledger's queue.
    Drain { reference: String },
}

impl JournalRecord {
    /// Ledger draft of a `ledger` record.
    pub fn draft(&self) -> Option<LedgerDraft> {
        match self {
            Self::Ledger {
                reference,
                amount,
                currency,
                operation,
                lang,
            } => {
                let mut draft = LedgerDraft::new(reference.clone(), MinorUnits(*amount), currency.clone())
                    .with_operation(*operation);
                draft.partner_lang = lang.clone();
                Some(draft)
            }
            _ => None,
        }
    }
}

/// Reads journal records from a JSON Lines source.
///
/// Blank lines are skipped. A line that does not parse yields an error without ending the
/// iteration.
pub struct JournalReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> JournalReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn records(self) -> impl Iterator<Item = Result<JournalRecord>> {
        self.reader
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(text) if text.trim().is_empty()))
            .map(|(index, line)| {
                let line = line?;
                serde_json::from_str::<JournalRecord>(&line).map_err(|e| {
                    PaymentError::ValidationError(format!("journal line {}: {e}", index + 1))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = r#"{"kind":"ledger","reference":"REF1","amount":1000,"currency":"EUR","operation":"online_direct","lang":"de_DE"}

{"kind":"webhook","body":{"event":{"type":"CREDIT"}}}
{"kind":"drain","reference":"REF1"}"#;
        let records: Vec<_> = JournalReader::new(data.as_bytes()).records().collect();
        assert_eq!(records.len(), 3);

        let draft = records[0].as_ref().unwrap().draft().unwrap();
        assert_eq!(draft.reference, "REF1");
        assert_eq!(draft.amount, MinorUnits(1000));
        assert_eq!(draft.operation, Operation::OnlineDirect);
        assert_eq!(draft.partner_lang.as_deref(), Some("de_DE"));
        assert!(matches!(records[2], Ok(JournalRecord::Drain { ref reference }) if reference == "REF1"));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{\"kind\":\"unknown\"}\n{\"kind\":\"drain\",\"reference\":\"REF1\"}";
        let records: Vec<_> = JournalReader::new(data.as_bytes()).records().collect();
        assert!(matches!(&records[0], Err(PaymentError::ValidationError(m)) if m.starts_with("journal line 1")));
        assert!(records[1].is_ok());
    }
}
