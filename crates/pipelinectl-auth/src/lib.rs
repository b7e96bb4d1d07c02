//! # pipelinectl-auth
//!
//! Constant-time HMAC-SHA256 verification of inbound webhook payloads (C1,
//! §4.1). Zero side effects: this crate never touches the store, the audit
//! log, or the event bus — callers (the Webhook Intake, §4.11) are
//! responsible for recording the outcome.
//!
//! # Example
//!
//! ```
//! use pipelinectl_auth::verify_signature;
//!
//! let secret = b"shhh";
//! let body = b"{\"ref\":\"refs/heads/main\"}";
//! let mac = pipelinectl_auth::sign(secret, body);
//! let header = format!("sha256={mac}");
//! assert!(verify_signature(secret, body, Some(&header)).is_ok());
//! ```

use hmac::{Hmac, Mac};
use pipelinectl_types::Error;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded `HMAC-SHA256(secret, body)`, e.g. for tests or
/// for signing an outbound notification.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify an inbound webhook signature header against `HMAC-SHA256(secret, body)`.
///
/// Accepts either the GitHub-style `sha256=<hex>` form or bare hex.
/// Comparison is constant-time (delegated to `hmac::Mac::verify_slice`,
/// which never short-circuits on a byte mismatch).
///
/// Returns `Error::SignatureMissing` when `header` is `None`,
/// `Error::SignatureInvalid` when present but not a match.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<(), Error> {
    let header = header.ok_or(Error::SignatureMissing)?;
    let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);
    let claimed = hex::decode(hex_digest).map_err(|_| Error::SignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any size");
    mac.update(body);
    mac.verify_slice(&claimed).map_err(|_| Error::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_with_github_prefix_verifies() {
        let secret = b"topsecret";
        let body = b"hello world";
        let mac = sign(secret, body);
        let header = format!("sha256={mac}");
        assert!(verify_signature(secret, body, Some(&header)).is_ok());
    }

    #[test]
    fn valid_bare_hex_signature_verifies() {
        let secret = b"topsecret";
        let body = b"hello world";
        let mac = sign(secret, body);
        assert!(verify_signature(secret, body, Some(&mac)).is_ok());
    }

    #[test]
    fn missing_header_is_signature_missing() {
        let err = verify_signature(b"s", b"b", None).unwrap_err();
        assert_eq!(err.kind(), "signature_missing");
    }

    #[test]
    fn flipped_byte_is_signature_invalid() {
        let secret = b"topsecret";
        let body = b"hello world";
        let mut mac = sign(secret, body);
        let last = mac.pop().unwrap();
        mac.push(if last == '0' { '1' } else { '0' });
        let header = format!("sha256={mac}");
        let err = verify_signature(secret, body, Some(&header)).unwrap_err();
        assert_eq!(err.kind(), "signature_invalid");
    }

    #[test]
    fn non_hex_header_is_signature_invalid_not_a_panic() {
        let err = verify_signature(b"s", b"b", Some("sha256=not-hex!!")).unwrap_err();
        assert_eq!(err.kind(), "signature_invalid");
    }

    #[test]
    fn different_body_fails_verification() {
        let secret = b"topsecret";
        let mac = sign(secret, b"original");
        let header = format!("sha256={mac}");
        let err = verify_signature(secret, b"tampered", Some(&header)).unwrap_err();
        assert_eq!(err.kind(), "signature_invalid");
    }
}
