//! Turns the three inbound shapes (webhook JSON, redirect query parameters and synchronous API
//! responses) into canonical records. Nothing here touches storage.

use crate::domain::money::MinorUnits;
use crate::domain::notification::{EventType, Notification, PaymentResult, RedirectReturn};
use crate::domain::wire::GatewayResponse;
use crate::error::{PaymentError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn object<'a>(body: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    body.get(key).and_then(Value::as_object)
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn normalize_webhook(body: &Value) -> Result<Notification> {
    let (Some(event), Some(result), Some(_)) = (
        object(body, "event"),
        object(body, "result"),
        object(body, "transaction"),
    ) else {
        return Err(PaymentError::malformed(
            "webhook requires event, result and transaction",
        ));
    };

    let event_type = non_empty(event.get("type"))
        .ok_or_else(|| PaymentError::malformed("event.type is missing"))?;
    let checksum = non_empty(event.get("checksum"))
        .ok_or_else(|| PaymentError::malformed("event.checksum is missing"))?;
    let parent_tid = non_empty(event.get("parent_tid"));
    let tid = non_empty(event.get("tid"))
        .or_else(|| parent_tid.clone())
        .ok_or_else(|| PaymentError::malformed("event.tid or event.parent_tid is required"))?;
    let result_status = non_empty(result.get("status"))
        .ok_or_else(|| PaymentError::malformed("result.status is missing"))?;
    if result.get("status_text").is_none() {
        return Err(PaymentError::malformed("result.status_text is missing"));
    }

    let parsed = GatewayResponse::from_value(body)
        .map_err(|e| PaymentError::malformed(format!("unreadable webhook: {e}")))?;
    let transaction = parsed.transaction.unwrap_or_default();
    let order_no = transaction
        .order_no
        .clone()
        .filter(|o| !o.trim().is_empty())
        .ok_or_else(|| PaymentError::malformed("transaction.order_no is missing"))?;
    if let Some(amount) = transaction.amount {
        MinorUnits::from_provider(amount, "transaction.amount")?;
    }
    if let Some(amount) = transaction.refund.as_ref().and_then(|r| r.amount) {
        MinorUnits::from_provider(amount, "transaction.refund.amount")?;
    }

    let custom = object(body, "custom");
    let shop_invoked = custom.is_some_and(|c| c.contains_key("shop_invoked"));
    let order_lang = custom.and_then(|c| non_empty(c.get("order_lang")));

    Ok(Notification {
        event_type: EventType::parse(&event_type),
        tid,
        parent_tid,
        checksum,
        order_no,
        shop_invoked,
        order_lang,
        result_status,
        result: parsed.result,
        transaction,
        instalment: parsed.instalment,
        collection: parsed.collection,
    })
}

/// Query parameters of the browser return.
///
/// Missing status parameters are malformed. Without `txn_secret`, `tid` and `checksum` the
/// return cannot be tied to a ledger and becomes a terminal failure showing the status text.
pub fn normalize_redirect(params: &HashMap<String, String>) -> Result<RedirectReturn> {
    let get = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    let (Some(status), Some(status_text), Some(status_code)) =
        (get("status"), get("status_text"), get("status_code"))
    else {
        return Err(PaymentError::malformed(
            "redirect requires status, status_text and status_code",
        ));
    };

    let (Some(txn_secret), Some(tid), Some(checksum)) =
        (get("txn_secret"), get("tid"), get("checksum"))
    else {
        return Ok(RedirectReturn::Failed {
            message: status_text.to_string(),
        });
    };

    Ok(RedirectReturn::Completed {
        txn_secret: txn_secret.to_string(),
        checksum: checksum.to_string(),
        status_code: status_code.to_string(),
        result: PaymentResult {
            tid: tid.to_string(),
            status: Some(status.to_string()),
            status_text: Some(status_text.to_string()),
        },
    })
}

/// Synchronous payment response. The tid is mandatory; the state always comes from a details lookup.
pub fn normalize_response(body: &Value) -> Result<PaymentResult> {
    let result = object(body, "result")
        .ok_or_else(|| PaymentError::malformed("response.result is missing"))?;
    let status = non_empty(result.get("status"))
        .ok_or_else(|| PaymentError::malformed("result.status is missing"))?;
    let status_text = non_empty(result.get("status_text"));
    let transaction = object(body, "transaction");
    let tid = transaction
        .and_then(|t| non_empty(t.get("tid")))
        .ok_or_else(|| PaymentError::malformed("Invalid transaction"))?;
    if status == "FAILURE" {
        return Err(PaymentError::gateway(
            200,
            0,
            status_text.unwrap_or_default(),
        ));
    }

    Ok(PaymentResult {
        tid,
        status: None,
        status_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn webhook() -> Value {
        json!({
            "event": {"type": "TRANSACTION_REFUND", "tid": 15000000000002u64, "parent_tid": "15000000000001", "checksum": "abc"},
            "result": {"status": "SUCCESS", "status_code": 100, "status_text": "Successful"},
            "transaction": {"order_no": "REF1", "amount": 1000, "currency": "EUR", "refund": {"amount": 500}},
            "custom": {"shop_invoked": 1, "order_lang": "de_DE"}
        })
    }

    #[test]
    fn test_normalize_webhook() {
        let n = normalize_webhook(&webhook()).unwrap();
        assert_eq!(n.event_type, EventType::TransactionRefund);
        assert_eq!(n.tid, "15000000000002");
        assert_eq!(n.parent_or_tid(), "15000000000001");
        assert_eq!(n.order_no, "REF1");
        assert!(n.shop_invoked);
        assert_eq!(n.order_lang.as_deref(), Some("de_DE"));
        assert_eq!(n.result_status, "SUCCESS");
        assert_eq!(n.transaction.refund.unwrap().amount, Some(500));
    }

    #[test]
    fn test_tid_falls_back_to_parent() {
        let mut body = webhook();
        body["event"].as_object_mut().unwrap().remove("tid");
        let n = normalize_webhook(&body).unwrap();
        assert_eq!(n.tid, "15000000000001");
    }

    #[test]
    fn test_missing_keys_are_malformed() {
        for pointer in ["event", "result", "transaction"] {
            let mut body = webhook();
            body.as_object_mut().unwrap().remove(pointer);
            assert!(matches!(
                normalize_webhook(&body),
                Err(PaymentError::MalformedNotification(_))
            ));
        }

        let mut body = webhook();
        body["transaction"].as_object_mut().unwrap().remove("order_no");
        assert!(matches!(
            normalize_webhook(&body),
            Err(PaymentError::MalformedNotification(_))
        ));

        let mut body = webhook();
        let event = body["event"].as_object_mut().unwrap();
        event.remove("tid");
        event.remove("parent_tid");
        assert!(normalize_webhook(&body).is_err());

        let mut body = webhook();
        body["event"].as_object_mut().unwrap().remove("checksum");
        assert!(normalize_webhook(&body).is_err());
    }

    #[test]
    fn test_out_of_range_amounts_are_malformed() {
        let mut body = webhook();
        body["transaction"]["refund"]["amount"] = json!(i64::MIN);
        assert!(matches!(
            normalize_webhook(&body),
            Err(PaymentError::MalformedNotification(reason)) if reason.contains("refund.amount")
        ));

        let mut body = webhook();
        body["transaction"]["amount"] = json!(i64::MIN);
        assert!(matches!(
            normalize_webhook(&body),
            Err(PaymentError::MalformedNotification(_))
        ));
    }

    #[test]
    fn test_shop_invoked_only_when_present() {
        let mut body = webhook();
        body["custom"] = json!({"order_lang": "en_US"});
        assert!(!normalize_webhook(&body).unwrap().shop_invoked);
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_redirect() {
        let completed = normalize_redirect(&params(&[
            ("status", "SUCCESS"),
            ("status_text", "ok"),
            ("status_code", "100"),
            ("txn_secret", "sec"),
            ("tid", "T1"),
            ("checksum", "c"),
        ]))
        .unwrap();
        assert!(matches!(
            completed,
            RedirectReturn::Completed { ref result, .. } if result.tid == "T1"
        ));

        let failed = normalize_redirect(&params(&[
            ("status", "FAILURE"),
            ("status_text", "Card declined"),
            ("status_code", "0"),
        ]))
        .unwrap();
        assert_eq!(
            failed,
            RedirectReturn::Failed {
                message: "Card declined".into()
            }
        );

        assert!(normalize_redirect(&params(&[("status", "SUCCESS")])).is_err());
    }

    #[test]
    fn test_normalize_response() {
        let result = normalize_response(&json!({
            "result": {"status": "SUCCESS", "status_text": "ok"},
            "transaction": {"tid": 123, "status": "ON_HOLD"}
        }))
        .unwrap();
        assert_eq!(result.tid, "123");
        assert_eq!(result.status, None);

        assert!(normalize_response(&json!({"result": {"status": "SUCCESS"}})).is_err());
    }
}
