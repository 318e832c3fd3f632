//! HMAC review signatures (§6): `HMAC(session_key, request_id ∥ decision ∥
//! timestamp)`, verified in constant time.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use slb_common::RequestId;
use slb_store::model::Decision;

type HmacSha256 = Hmac<Sha256>;

/// Sign `(request_id, decision, timestamp)` with `session_key`.
#[must_use]
pub fn sign(session_key: &str, request_id: RequestId, decision: Decision, timestamp: DateTime<Utc>) -> String {
    let mut mac = HmacSha256::new_from_slice(session_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(request_id.to_string().as_bytes());
    mac.update(decision.as_str().as_bytes());
    mac.update(timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify `signature` against the expected HMAC, in constant time.
#[must_use]
pub fn verify(
    session_key: &str,
    request_id: RequestId,
    decision: Decision,
    timestamp: DateTime<Utc>,
    signature: &str,
) -> bool {
    let expected = sign(session_key, request_id, decision, timestamp);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let id = RequestId::new();
        let now = Utc::now();
        let sig = sign("s3cr3t", id, Decision::Approve, now);
        assert!(verify("s3cr3t", id, Decision::Approve, now, &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let id = RequestId::new();
        let now = Utc::now();
        let sig = sign("s3cr3t", id, Decision::Approve, now);
        assert!(!verify("other-key", id, Decision::Approve, now, &sig));
    }

    #[test]
    fn tampered_decision_fails_verification() {
        let id = RequestId::new();
        let now = Utc::now();
        let sig = sign("s3cr3t", id, Decision::Approve, now);
        assert!(!verify("s3cr3t", id, Decision::Reject, now, &sig));
    }
}
