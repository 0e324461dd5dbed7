use crate::domain::ledger::{Ledger, LedgerId};
use crate::error::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow<'a> {
    reference: &'a str,
    state: &'static str,
    provider_reference: &'a str,
    amount: i64,
    paid_amount: i64,
    refund_amount: i64,
    parent: &'a str,
}

/// Writes final ledger states as CSV, one row per ledger in the given order.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_ledgers(&mut self, ledgers: &[Ledger]) -> Result<()> {
        let references: HashMap<LedgerId, &str> = ledgers
            .iter()
            .map(|ledger| (ledger.id, ledger.reference.as_str()))
            .collect();
        for ledger in ledgers {
            let parent = ledger
                .source_transaction_id
                .and_then(|id| references.get(&id).copied())
                .unwrap_or_default();
            self.writer.serialize(LedgerRow {
                reference: &ledger.reference,
                state: ledger.state.as_str(),
                provider_reference: ledger.provider_reference.as_deref().unwrap_or_default(),
                amount: ledger.amount.value(),
                paid_amount: ledger.paid_amount.value(),
                refund_amount: ledger.refund_amount.value(),
                parent,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
