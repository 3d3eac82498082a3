//! Slack request signing (`v0`): HMAC-SHA256 over `v0:{timestamp}:{body}`
//! keyed with the app signing secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SIGNATURE_VERSION: &str = "v0";
pub const MAX_TIMESTAMP_SKEW_SECS: u64 = 60 * 5;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing header `{0}`")]
    MissingHeader(&'static str),
    #[error("request timestamp is not a unix time")]
    InvalidTimestamp,
    #[error("request timestamp is {skew_secs}s away from now")]
    StaleTimestamp { skew_secs: u64 },
    #[error("signature is not in `v0=<hex>` form")]
    Malformed,
    #[error("signature does not match request body")]
    Mismatch,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at: i64 =
            timestamp.trim().parse().map_err(|_| SignatureError::InvalidTimestamp)?;
        let skew_secs = now.abs_diff(sent_at);
        if skew_secs > MAX_TIMESTAMP_SKEW_SECS {
            return Err(SignatureError::StaleTimestamp { skew_secs });
        }

        let expected = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(decode_hex)
            .ok_or(SignatureError::Malformed)?;

        self.mac(timestamp.trim(), body)
            .and_then(|mac| mac.verify_slice(&expected).ok())
            .ok_or(SignatureError::Mismatch)
    }

    /// `v0=<hex>` signature for a request, as Slack would send it.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let digest = self
            .mac(timestamp, body)
            .map(|mac| encode_hex(mac.finalize().into_bytes().as_slice()))
            .unwrap_or_default();
        format!("{SIGNATURE_VERSION}={digest}")
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()).ok()?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Some(mac)
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&text[index..index + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{SignatureError, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};

    const NOW: i64 = 1_531_420_618;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new("8f742231b10e8888abcd99yyyzzz85a5".to_string().into())
    }

    #[test]
    fn matches_slack_reference_signature() {
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let signature = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";

        assert_eq!(verifier().sign("1531420618", body), signature);
        assert_eq!(verifier().verify_at(Some("1531420618"), Some(signature), body, NOW), Ok(()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let verifier = verifier();
        let signature = verifier.sign("1531420618", b"{\"type\":\"event_callback\"}");

        assert_eq!(
            verifier.verify_at(Some("1531420618"), Some(&signature), b"{\"type\":\"other\"}", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_or_malformed_requests_are_rejected() {
        let verifier = verifier();
        let body = b"{}";
        let signature = verifier.sign("1531420618", body);

        assert_eq!(
            verifier.verify_at(Some("1531420618"), Some(&signature), body, NOW + 301),
            Err(SignatureError::StaleTimestamp { skew_secs: 301 })
        );
        assert_eq!(
            verifier.verify_at(Some("1531420618"), Some("v1=abcd"), body, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verifier.verify_at(Some("yesterday"), Some(&signature), body, NOW),
            Err(SignatureError::InvalidTimestamp)
        );
        assert_eq!(
            verifier.verify_at(None, Some(&signature), body, NOW),
            Err(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );
        assert_eq!(
            verifier.verify_at(Some("1531420618"), None, body, NOW),
            Err(SignatureError::MissingHeader(SIGNATURE_HEADER))
        );
    }

    #[test]
    fn extreme_timestamps_are_stale_not_a_panic() {
        let verifier = verifier();

        assert_eq!(
            verifier.verify_at(Some("-9223372036854775808"), Some("v0=00"), b"{}", 1_700_000_000),
            Err(SignatureError::StaleTimestamp { skew_secs: 9_223_372_038_554_775_808 })
        );
        assert!(matches!(
            verifier.verify_at(Some("9223372036854775807"), Some("v0=00"), b"{}", i64::MIN),
            Err(SignatureError::StaleTimestamp { skew_secs: u64::MAX })
        ));
    }
}
