//! PKCE (RFC 7636), S256 only.

use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use subtle::ConstantTimeEq;

use crate::{Error, Result};

const MIN_VERIFIER_LENGTH: usize = 43;
const MAX_VERIFIER_LENGTH: usize = 128;

/// A validated PKCE code verifier
#[derive(Clone)]
pub struct CodeVerifier(String);

impl std::fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CodeVerifier").field(&"[REDACTED]").finish()
    }
}

impl CodeVerifier {
    /// Wrap a client supplied verifier.
    ///
    /// Must be 43 to 128 characters from the unreserved set
    /// `[A-Za-z0-9-._~]`.
    pub fn new(verifier: impl Into<String>) -> Result<Self> {
        let verifier = verifier.into();
        let len = verifier.len();
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&len) {
            return Err(Error::InvalidInput(format!(
                "code verifier must be {MIN_VERIFIER_LENGTH}-{MAX_VERIFIER_LENGTH} characters, got {len}"
            )));
        }
        if !verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
        {
            return Err(Error::InvalidInput(
                "code verifier contains invalid characters".to_string(),
            ));
        }
        Ok(Self(verifier))
    }

    /// Fresh verifier with 32 bytes of entropy, base64url encoded.
    #[must_use]
    pub fn generate_s256() -> Self {
        let (_, verifier) = PkceCodeChallenge::new_random_sha256();
        Self(verifier.secret().clone())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `base64url_nopad(SHA256(verifier))`
    #[must_use]
    pub fn challenge(&self) -> String {
        let verifier = PkceCodeVerifier::new(self.0.clone());
        PkceCodeChallenge::from_code_verifier_sha256(&verifier)
            .as_str()
            .to_string()
    }

    /// Constant-time comparison against a stored challenge
    #[must_use]
    pub fn verify(&self, challenge: &str) -> bool {
        self.challenge().as_bytes().ct_eq(challenge.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b() {
        let verifier = CodeVerifier::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk").unwrap();
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_verifier_is_valid() {
        for _ in 0..16 {
            let verifier = CodeVerifier::generate_s256();
            assert!(CodeVerifier::new(verifier.as_str()).is_ok());
            assert!(verifier.verify(&verifier.challenge()));
        }
    }

    #[test]
    fn test_verify_rejects_other_verifier() {
        let a = CodeVerifier::generate_s256();
        let b = CodeVerifier::generate_s256();
        assert!(!a.verify(&b.challenge()));
        assert!(!a.verify(""));
    }

    #[test]
    fn test_length_bounds() {
        assert!(CodeVerifier::new("a".repeat(42)).is_err());
        assert!(CodeVerifier::new("a".repeat(43)).is_ok());
        assert!(CodeVerifier::new("a".repeat(128)).is_ok());
        assert!(CodeVerifier::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_rejects_reserved_characters() {
        let verifier = format!("{}+/", "a".repeat(43));
        assert!(CodeVerifier::new(verifier).is_err());
    }
}
