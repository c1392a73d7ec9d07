use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("thoughtSpotHost must not be empty")]
    EmptyHost,
    #[error("thoughtSpotHost must use http:// or https:// and include a host")]
    InvalidHost,
}

/// How the embedded app establishes its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthType {
    #[default]
    None,
    Basic,
    #[serde(rename = "AuthServer")]
    TrustedAuthToken,
    #[serde(rename = "AuthServerCookieless")]
    TrustedAuthTokenCookieless,
    #[serde(rename = "EmbeddedSSO")]
    EmbeddedSso,
    #[serde(rename = "SSO_SAML")]
    SamlRedirect,
    #[serde(rename = "SSO_OIDC")]
    OidcRedirect,
}

impl AuthType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic => "Basic",
            Self::TrustedAuthToken => "AuthServer",
            Self::TrustedAuthTokenCookieless => "AuthServerCookieless",
            Self::EmbeddedSso => "EmbeddedSSO",
            Self::SamlRedirect => "SSO_SAML",
            Self::OidcRedirect => "SSO_OIDC",
        }
    }
}

/// Global configuration shared by every embed on the host page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedConfig {
    pub thought_spot_host: String,
    pub auth_type: AuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_login: Option<bool>,
    pub no_redirect: bool,
    pub in_popup: bool,
    pub disable_token_verification: bool,
    pub suppress_error_alerts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_api_intercept: Option<bool>,
    pub intercept_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intercept_timeout: Option<u64>,
}

impl EmbedConfig {
    #[must_use]
    pub fn new(thought_spot_host: impl Into<String>) -> Self {
        Self {
            thought_spot_host: thought_spot_host.into(),
            ..Self::default()
        }
    }

    /// Returns a copy with the host validated and trimmed.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        self.thought_spot_host = normalize_host(&self.thought_spot_host)?;
        Ok(self)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.thought_spot_host
    }

    /// Auto-login defaults to on for cookieless trusted auth only.
    #[must_use]
    pub fn effective_auto_login(&self) -> bool {
        match self.auto_login {
            Some(value) => value,
            None => self.auth_type == AuthType::TrustedAuthTokenCookieless,
        }
    }
}

/// Per-embed configuration. Only the fields the messaging core reads are
/// modelled here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_api_intercept: Option<bool>,
    pub intercept_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intercept_timeout: Option<u64>,
    /// Superseded by `intercept_urls: ["AnswerData"]`.
    pub is_on_before_get_viz_data_intercept_enabled: bool,
}

impl ViewConfig {
    #[must_use]
    pub fn legacy_viz_data_intercept(&self) -> bool {
        self.is_on_before_get_viz_data_intercept_enabled
    }
}

pub fn normalize_host(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyHost);
    }
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Err(ConfigError::InvalidHost);
    };
    if !(scheme == "http" || scheme == "https") {
        return Err(ConfigError::InvalidHost);
    }
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(ConfigError::InvalidHost);
    }
    Ok(trimmed.to_string())
}
