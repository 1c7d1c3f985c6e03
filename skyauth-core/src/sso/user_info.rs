//! Projection of raw provider profiles onto [`ProviderUserInfo`].

use serde_json::Value;
use std::sync::Arc;

use super::login_id::{LoginIdNormalizerFactory, LoginIdType};
use super::ProviderUserInfo;
use crate::models::ProviderKind;
use crate::{Error, Result};

#[derive(Clone)]
pub struct UserInfoDecoder {
    normalizer_factory: Arc<dyn LoginIdNormalizerFactory>,
}

impl std::fmt::Debug for UserInfoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInfoDecoder").finish_non_exhaustive()
    }
}

impl UserInfoDecoder {
    #[must_use]
    pub fn new(normalizer_factory: Arc<dyn LoginIdNormalizerFactory>) -> Self {
        Self { normalizer_factory }
    }

    /// Decode a raw profile (or ID token claims for OIDC providers).
    pub fn decode(&self, kind: ProviderKind, raw: &Value) -> Result<ProviderUserInfo> {
        let (id, email) = match kind {
            ProviderKind::Google | ProviderKind::Facebook => (string_field(raw, "id"), string_field(raw, "email")),
            ProviderKind::Azureadv2 => (string_field(raw, "oid"), string_field(raw, "email")),
            ProviderKind::Apple => (string_field(raw, "sub"), string_field(raw, "email")),
            ProviderKind::Instagram => {
                let data = raw.get("data").unwrap_or(&Value::Null);
                (string_field(data, "id"), string_field(data, "email"))
            }
            ProviderKind::Linkedin => decode_linkedin(raw),
        };

        let id = id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::sso_invalid_params(format!("{kind} profile is missing user id")))?;

        let email = match email.filter(|email| !email.is_empty()) {
            Some(email) => Some(
                self.normalizer_factory
                    .normalizer_with_login_id_type(LoginIdType::Email)
                    .normalize(&email)?,
            ),
            None => None,
        };

        Ok(ProviderUserInfo { id, email })
    }
}

/// String or numeric field as a string
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `{"profile": {...}, "primary_contact": {"elements": [...]}}`
fn decode_linkedin(raw: &Value) -> (Option<String>, Option<String>) {
    let id = raw.get("profile").and_then(|profile| string_field(profile, "id"));

    let email = raw
        .pointer("/primary_contact/elements")
        .and_then(Value::as_array)
        .and_then(|elements| {
            elements.iter().find_map(|element| {
                let primary = element.get("primary").and_then(Value::as_bool) == Some(true);
                let is_email = element.get("type").and_then(Value::as_str) == Some("EMAIL");
                if primary && is_email {
                    element
                        .get("handle~")
                        .and_then(|handle| string_field(handle, "emailAddress"))
                } else {
                    None
                }
            })
        });

    (id, email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::login_id::DefaultLoginIdNormalizerFactory;
    use crate::SsoFailedCause;
    use serde_json::json;

    fn decoder() -> UserInfoDecoder {
        UserInfoDecoder::new(Arc::new(DefaultLoginIdNormalizerFactory::default()))
    }

    #[test]
    fn test_default_fields() {
        let info = decoder()
            .decode(ProviderKind::Google, &json!({"id": "g-1", "email": "User@Gmail.com"}))
            .unwrap();
        assert_eq!(info.id, "g-1");
        assert_eq!(info.email.as_deref(), Some("user@gmail.com"));
    }

    #[test]
    fn test_facebook_without_email() {
        let info = decoder()
            .decode(ProviderKind::Facebook, &json!({"id": "10001", "email": ""}))
            .unwrap();
        assert_eq!(info.id, "10001");
        assert_eq!(info.email, None);
    }

    #[test]
    fn test_azure_uses_oid() {
        let info = decoder()
            .decode(
                ProviderKind::Azureadv2,
                &json!({"sub": "pairwise", "oid": "object-id", "email": "a@contoso.com"}),
            )
            .unwrap();
        assert_eq!(info.id, "object-id");
    }

    #[test]
    fn test_apple_uses_sub() {
        let info = decoder()
            .decode(ProviderKind::Apple, &json!({"sub": "001.apple", "email": "x@privaterelay.appleid.com"}))
            .unwrap();
        assert_eq!(info.id, "001.apple");
    }

    #[test]
    fn test_instagram_nested_data() {
        let info = decoder()
            .decode(ProviderKind::Instagram, &json!({"data": {"id": 42, "username": "bob"}}))
            .unwrap();
        assert_eq!(info.id, "42");
        assert_eq!(info.email, None);
    }

    #[test]
    fn test_linkedin_primary_email() {
        let raw = json!({
            "profile": {"id": "li-1"},
            "primary_contact": {"elements": [
                {"primary": false, "type": "EMAIL", "handle~": {"emailAddress": "old@example.com"}},
                {"primary": true, "type": "PHONE", "handle~": {"phoneNumber": {"number": "123"}}},
                {"primary": true, "type": "EMAIL", "handle~": {"emailAddress": "Main@Example.com"}}
            ]}
        });
        let info = decoder().decode(ProviderKind::Linkedin, &raw).unwrap();
        assert_eq!(info.id, "li-1");
        assert_eq!(info.email.as_deref(), Some("main@example.com"));
    }

    #[test]
    fn test_missing_id_is_invalid_params() {
        let err = decoder()
            .decode(ProviderKind::Google, &json!({"email": "a@b.com"}))
            .unwrap_err();
        assert_eq!(err.sso_cause(), Some(SsoFailedCause::InvalidParams));
    }
}
