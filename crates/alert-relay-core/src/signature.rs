//! EventSub webhook signature verification.
//!
//! The platform signs every callback with
//! `sha256=hex(HMAC-SHA256(secret, message_id + timestamp + body))` and sends it
//! in the `Twitch-Eventsub-Message-Signature` header.
//!
//! Comparison runs in constant time over the full signature string, so the
//! time taken does not reveal how many leading bytes of a forged signature
//! were correct.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

/// Literal tag preceding the hex digest in the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature the platform would send for a message.
pub fn compute_signature(secret: &[u8], message_id: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(message_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);

    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Verify a declared signature against the message identity fields and body.
///
/// Returns `false` on any mismatch, including a missing prefix or a digest of
/// the wrong length; it never errors. Missing headers are the caller's concern
/// (see [`crate::webhook::WebhookHeaders`]).
pub fn verify(
    message_id: &str,
    timestamp: &str,
    raw_body: &[u8],
    declared_signature: &str,
    shared_secret: &[u8],
) -> bool {
    let expected = compute_signature(shared_secret, message_id, timestamp, raw_body);
    let declared = declared_signature.as_bytes();

    // Length is not secret; ct_eq requires equal lengths to be meaningful.
    if expected.len() != declared.len() {
        return false;
    }

    expected.as_bytes().ct_eq(declared).into()
}

/// Holds the shared secret and verifies callbacks against it.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// See [`verify`].
    pub fn verify(
        &self,
        message_id: &str,
        timestamp: &str,
        raw_body: &[u8],
        declared_signature: &str,
    ) -> bool {
        verify(
            message_id,
            timestamp,
            raw_body,
            declared_signature,
            &self.secret,
        )
    }

    /// Sign a message with this verifier's secret.
    pub fn sign(&self, message_id: &str, timestamp: &str, raw_body: &[u8]) -> String {
        compute_signature(&self.secret, message_id, timestamp, raw_body)
    }
}

// Security: Don't expose secrets in debug output
impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}
