//! Callback URL allow-listing and the response shape of an SSO callback.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use super::state::{State, UxMode};
use crate::{Error, Result};

/// Cookie carrying the result for web UX modes
pub const SSO_DATA_COOKIE: &str = "sso_data";

/// Check `callback_url` against the allow-list.
///
/// Query and fragment of the candidate are ignored, trailing slashes on both
/// sides are ignored, and the comparison is a case-sensitive prefix match that
/// must end on a path segment boundary. An entry that is empty after trimming
/// (`""` or `"/"`) only admits same-origin paths such as `/done`.
pub fn validate_callback_url(allowed: &[String], callback_url: &str) -> Result<()> {
    if callback_url.is_empty() {
        return Err(Error::sso_invalid_params("missing callback URL"));
    }

    let end = callback_url.find(['?', '#']).unwrap_or(callback_url.len());
    let path = &callback_url[..end];
    let candidate = path.trim_end_matches('/');

    if allowed
        .iter()
        .any(|entry| matches_entry(entry.trim_end_matches('/'), path, candidate))
    {
        Ok(())
    } else {
        Err(Error::sso_invalid_params("callback URL is not allowed"))
    }
}

fn matches_entry(prefix: &str, path: &str, candidate: &str) -> bool {
    if prefix.is_empty() {
        // "//host" and "/\host" are scheme-relative in browsers
        return path.starts_with('/') && !path[1..].starts_with(['/', '\\']);
    }
    match candidate.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// What the handler layer should send back to the browser or app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResponse {
    /// 302 to `location`, optionally setting the [`SSO_DATA_COOKIE`]
    Redirect {
        location: String,
        cookie: Option<String>,
    },
    /// Render the popup page that posts the [`SSO_DATA_COOKIE`] to its opener
    Popup { cookie: String },
    /// Bare 400; used when the callback URL cannot be trusted
    BadRequest,
}

/// `{"result": ...}` on success, `{"error": {...}}` on failure
#[must_use]
pub fn callback_payload(result: &Result<Value>) -> Value {
    match result {
        Ok(value) => json!({ "result": value }),
        Err(err) => json!({
            "error": {
                "name": err.reason(),
                "reason": err.sso_cause().map_or(err.reason(), |cause| cause.as_str()),
                "message": err.public_message(),
                "code": err.status_code().as_u16(),
            }
        }),
    }
}

impl CallbackResponse {
    /// Build the response for a decoded state.
    ///
    /// The callback URL is validated again here since it is echoed back to the
    /// client.
    #[must_use]
    pub fn for_state(allowed: &[String], state: &State, result: &Result<Value>) -> Self {
        if validate_callback_url(allowed, &state.callback_url).is_err() {
            return Self::BadRequest;
        }

        let payload = callback_payload(result);

        match state.ux_mode {
            UxMode::WebRedirect => Self::Redirect {
                location: state.callback_url.clone(),
                cookie: Some(sso_data_cookie(&payload, &state.callback_url)),
            },
            UxMode::WebPopup => Self::Popup {
                cookie: sso_data_cookie(&payload, &state.callback_url),
            },
            UxMode::Ios | UxMode::Android | UxMode::Manual => Self::Redirect {
                location: append_result_query(&state.callback_url, &payload),
                cookie: None,
            },
        }
    }
}

fn sso_data_cookie(payload: &Value, callback_url: &str) -> String {
    let data = json!({
        "result": payload,
        "callback_url": callback_url,
    });
    STANDARD.encode(data.to_string())
}

fn append_result_query(callback_url: &str, payload: &Value) -> String {
    let encoded: String =
        url::form_urlencoded::byte_serialize(STANDARD.encode(payload.to_string()).as_bytes())
            .collect();

    let (base, fragment) = match callback_url.find('#') {
        Some(idx) => callback_url.split_at(idx),
        None => (callback_url, ""),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}result={encoded}{fragment}")
}
