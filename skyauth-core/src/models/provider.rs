use serde::{Deserialize, Serialize};

/// Closed set of supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Facebook,
    Linkedin,
    Azureadv2,
    Apple,
    Instagram,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Linkedin => "linkedin",
            Self::Azureadv2 => "azureadv2",
            Self::Apple => "apple",
            Self::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            "linkedin" => Ok(Self::Linkedin),
            "azureadv2" => Ok(Self::Azureadv2),
            "apple" => Ok(Self::Apple),
            "instagram" => Ok(Self::Instagram),
            other => Err(format!("unknown provider type: {other}")),
        }
    }
}

/// Static per-tenant provider definition
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    pub client_id: String,
    /// For Apple this holds the PEM encoded ES256 private key.
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scope: String,
    /// Azure AD v2 only
    #[serde(default)]
    pub tenant: Option<String>,
    /// Apple only
    #[serde(default)]
    pub key_id: Option<String>,
    /// Apple only
    #[serde(default)]
    pub team_id: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("tenant", &self.tenant)
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            ProviderKind::Google,
            ProviderKind::Facebook,
            ProviderKind::Linkedin,
            ProviderKind::Azureadv2,
            ProviderKind::Apple,
            ProviderKind::Instagram,
        ] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("github".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_unknown_kind_rejected_by_serde() {
        let raw = r#"{"id":"gh","type":"github","client_id":"x"}"#;
        assert!(serde_json::from_str::<ProviderConfig>(raw).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let raw = r#"{"id":"google","type":"google","client_id":"x","client_secret":"hunter2"}"#;
        let config: ProviderConfig = serde_json::from_str(raw).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
    }
}
