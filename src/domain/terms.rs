use crate::domain::i18n::{Lang, Message};
use crate::error::{PaymentError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const WIRE_DATE: &str = "%Y-%m-%d";
const DISPLAY_DATE: &str = "%d/%m/%Y";

/// Payment term derived from a provider due date: the number of days between today and the due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTerm {
    pub days: i64,
    pub name: String,
    pub due_date: NaiveDate,
}

impl PaymentTerm {
    pub fn from_due_date(due_date: &str, today: NaiveDate, lang: Lang) -> Result<Self> {
        let due_date = parse_due_date(due_date)?;
        let days = (due_date - today).num_days();
        Ok(Self {
            days,
            name: Message::PaymentTermName { days }.render(lang),
            due_date,
        })
    }
}

pub fn parse_due_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), WIRE_DATE)
        .map_err(|e| PaymentError::ValidationError(format!("Invalid due date '{raw}': {e}")))
}

/// `2026-05-31` becomes `31/05/2026`.
pub fn display_due_date(raw: &str) -> Result<String> {
    Ok(parse_due_date(raw)?.format(DISPLAY_DATE).to_string())
}

/// Due date sent with a payment request, `days` from today.
pub fn due_date_in(days: u32, today: NaiveDate) -> String {
    (today + chrono::Days::new(u64::from(days)))
        .format(WIRE_DATE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    #[test]
    fn test_term_from_due_date() {
        let term = PaymentTerm::from_due_date("2026-05-15", today(), Lang::En).unwrap();
        assert_eq!(term.days, 14);
        assert_eq!(term.name, "Novalnet payment due - 14 Days");

        let past = PaymentTerm::from_due_date("2026-04-30", today(), Lang::De).unwrap();
        assert_eq!(past.days, -1);
    }

    #[test]
    fn test_display_and_invalid_dates() {
        assert_eq!(display_due_date("2026-05-31").unwrap(), "31/05/2026");
        assert!(matches!(
            display_due_date("31.05.2026"),
            Err(PaymentError::ValidationError(_))
        ));
        assert_eq!(due_date_in(30, today()), "2026-05-31");
    }
}
