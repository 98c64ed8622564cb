// integrity.rs — Request payload signatures.
//
// A `RequestVerifier` checks the `signature` carried in the auth context
// against the request content. With no verifier configured the engine
// trusts the caller-supplied `sessionIntegrity.signatureOk` attestation, and
// the upstream layer that sets it owns that check.
//
// The HMAC verifier signs `identityId \n nonce \n text` with HMAC-SHA256 and
// expects the tag base64url-encoded without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::hmac;

use crate::error::PolicyError;

/// Checks that a request's signature matches its content.
pub trait RequestVerifier: Send + Sync {
    /// `true` only for a present, well-formed, matching signature.
    fn verify(&self, identity_id: &str, nonce: Option<&str>, text: &str, signature: Option<&str>)
        -> bool;
}

/// HMAC-SHA256 over `identity \n nonce \n text`.
pub struct HmacRequestVerifier {
    key: hmac::Key,
}

impl std::fmt::Debug for HmacRequestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacRequestVerifier").finish_non_exhaustive()
    }
}

impl HmacRequestVerifier {
    pub fn new(secret: &[u8]) -> Result<Self, PolicyError> {
        if secret.is_empty() {
            return Err(PolicyError::EmptySigningSecret);
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    /// Produce the signature a client should send.
    pub fn sign(&self, identity_id: &str, nonce: Option<&str>, text: &str) -> String {
        let tag = hmac::sign(&self.key, &signing_payload(identity_id, nonce, text));
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    }
}

impl RequestVerifier for HmacRequestVerifier {
    fn verify(
        &self,
        identity_id: &str,
        nonce: Option<&str>,
        text: &str,
        signature: Option<&str>,
    ) -> bool {
        let Some(signature) = signature else {
            return false;
        };
        let Ok(tag) = URL_SAFE_NO_PAD.decode(signature.trim_end_matches('=')) else {
            return false;
        };
        hmac::verify(&self.key, &signing_payload(identity_id, nonce, text), &tag).is_ok()
    }
}

fn signing_payload(identity_id: &str, nonce: Option<&str>, text: &str) -> Vec<u8> {
    format!("{}\n{}\n{}", identity_id, nonce.unwrap_or(""), text).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> HmacRequestVerifier {
        HmacRequestVerifier::new(b"request-secret").unwrap()
    }

    #[test]
    fn signed_request_verifies() {
        let v = verifier();
        let sig = v.sign("u1", Some("n1"), "hello");
        assert!(v.verify("u1", Some("n1"), "hello", Some(&sig)));
    }

    #[test]
    fn any_field_change_fails() {
        let v = verifier();
        let sig = v.sign("u1", Some("n1"), "hello");
        assert!(!v.verify("u2", Some("n1"), "hello", Some(&sig)));
        assert!(!v.verify("u1", Some("n2"), "hello", Some(&sig)));
        assert!(!v.verify("u1", Some("n1"), "hello!", Some(&sig)));
        assert!(!v.verify("u1", None, "hello", Some(&sig)));
    }

    #[test]
    fn missing_or_garbage_signature_fails() {
        let v = verifier();
        assert!(!v.verify("u1", Some("n1"), "hello", None));
        assert!(!v.verify("u1", Some("n1"), "hello", Some("!!not base64!!")));
        assert!(!v.verify("u1", Some("n1"), "hello", Some("")));
    }

    #[test]
    fn other_key_fails() {
        let sig = verifier().sign("u1", None, "x");
        let other = HmacRequestVerifier::new(b"different").unwrap();
        assert!(!other.verify("u1", None, "x", Some(&sig)));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            HmacRequestVerifier::new(b""),
            Err(PolicyError::EmptySigningSecret)
        ));
    }
}
