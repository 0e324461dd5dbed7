use crate::domain::notification::Notification;
use crate::error::{PaymentError, Result};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

fn sha256_hex(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Expected checksum of a webhook: tid, event type, result status, amount, currency and the
/// reversed access key, hashed with SHA-256.
pub fn webhook_checksum(notification: &Notification, access_key: &str) -> String {
    let amount = notification
        .transaction
        .amount
        .map(|a| a.to_string())
        .unwrap_or_default();
    let currency = notification.transaction.currency.clone().unwrap_or_default();
    sha256_hex(&format!(
        "{}{}{}{}{}{}",
        notification.tid,
        notification.event_type,
        notification.result_status,
        amount,
        currency,
        reverse(access_key)
    ))
}

/// Expected checksum of a redirect return.
pub fn redirect_checksum(tid: &str, txn_secret: &str, status: &str, access_key: &str) -> String {
    sha256_hex(&format!("{tid}{txn_secret}{status}{}", reverse(access_key)))
}

fn matches(expected: &str, received: &str) -> bool {
    let received = received.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

pub fn verify_webhook(notification: &Notification, access_key: &str) -> Result<()> {
    let expected = webhook_checksum(notification, access_key);
    if matches(&expected, &notification.checksum) {
        Ok(())
    } else {
        Err(PaymentError::ChecksumMismatch(notification.tid.clone()))
    }
}

pub fn verify_redirect(
    tid: &str,
    txn_secret: &str,
    status: &str,
    checksum: &str,
    access_key: &str,
) -> Result<()> {
    let expected = redirect_checksum(tid, txn_secret, status, access_key);
    if matches(&expected, checksum) {
        Ok(())
    } else {
        Err(PaymentError::ChecksumMismatch(tid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::normalizer::normalize_webhook;
    use serde_json::json;

    fn body(checksum: &str) -> serde_json::Value {
        json!({
            "event": {"type": "CREDIT", "tid": "T2", "parent_tid": "T1", "checksum": checksum},
            "result": {"status": "SUCCESS", "status_text": "ok"},
            "transaction": {"order_no": "REF1", "amount": 1000, "currency": "EUR"}
        })
    }

    #[test]
    fn test_webhook_checksum_message_layout() {
        let n = normalize_webhook(&body("x")).unwrap();
        let expected = sha256_hex("T2CREDITSUCCESS1000EURyek");
        assert_eq!(webhook_checksum(&n, "key"), expected);
    }

    #[test]
    fn test_verify_webhook() {
        let n = normalize_webhook(&body("x")).unwrap();
        let good = webhook_checksum(&n, "secret");
        let n = normalize_webhook(&body(&good.to_uppercase())).unwrap();
        assert!(verify_webhook(&n, "secret").is_ok());
        assert!(matches!(
            verify_webhook(&n, "other"),
            Err(PaymentError::ChecksumMismatch(tid)) if tid == "T2"
        ));
    }

    #[test]
    fn test_verify_redirect() {
        let sum = redirect_checksum("T1", "sec", "SUCCESS", "key");
        assert!(verify_redirect("T1", "sec", "SUCCESS", &sum, "key").is_ok());
        assert!(verify_redirect("T1", "sec", "FAILURE", &sum, "key").is_err());
    }
}
