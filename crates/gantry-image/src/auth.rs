//! Pull token acquisition.
//!
//! Anonymous pulls still require a bearer token scoped to the repository.
//! The token service answers with `{"token": ...}`; some registries use
//! `access_token` instead, so both fields are accepted.

use std::fmt;

use gantry_common::config::RegistryConfig;
use serde::Deserialize;

use crate::error::AuthError;
use crate::transport::HttpTransport;

/// A bearer token scoped to one repository for the current pull session.
///
/// Obtained once per session and attached to every subsequent registry
/// request; there is no refresh handling.
#[derive(Clone)]
pub struct AuthToken {
    value: String,
    scope: String,
}

impl AuthToken {
    /// Returns the repository this token is scoped to.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

// The token is a credential; keep it out of debug logs.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    fn into_value(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or_else(|| self.access_token.filter(|t| !t.is_empty()))
    }
}

/// Obtains a pull token for the repository from the token service.
///
/// # Errors
///
/// Returns [`AuthError::Request`] when the endpoint is unreachable,
/// [`AuthError::Denied`] for a non-2xx answer, and [`AuthError::Malformed`]
/// when the body carries no usable token.
pub fn obtain_token(
    transport: &dyn HttpTransport,
    config: &RegistryConfig,
    repository: &str,
) -> Result<AuthToken, AuthError> {
    let url = config.token_url(repository);
    let response = transport
        .get(&url, &[])
        .map_err(|source| AuthError::Request { source })?;

    if !response.is_success() {
        return Err(AuthError::Denied {
            status: response.status(),
        });
    }

    let body = response.read_text().map_err(|e| AuthError::Malformed {
        message: format!("cannot read token response: {e}"),
    })?;
    let parsed: TokenResponse =
        serde_json::from_str(&body).map_err(|e| AuthError::Malformed {
            message: e.to_string(),
        })?;
    let value = parsed.into_value().ok_or_else(|| AuthError::Malformed {
        message: "response carries neither `token` nor `access_token`".to_string(),
    })?;

    tracing::debug!(repository, "obtained pull token");
    Ok(AuthToken {
        value,
        scope: repository.to_string(),
    })
}
