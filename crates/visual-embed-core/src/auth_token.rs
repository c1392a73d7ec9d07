//! Cached bearer token with revalidation and duplicate-token detection.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use serde_json::Value;

use crate::config::EmbedConfig;

pub const DUPLICATE_TOKEN_ERR: &str = "Duplicate token, please issue a new token every time getAuthToken callback is called. See https://developers.thoughtspot.com/docs/?pageid=embed-auth#trusted-auth-embed for more details.";
pub const INVALID_TOKEN_ERROR: &str =
    "Received invalid token from getAuthToken callback or authToken endpoint.";
pub const INVALID_TOKEN_TYPE_ERROR: &str =
    "Expected getAuthToken to return a string, but received a";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Duplicate token, please issue a new token every time getAuthToken callback is called. See https://developers.thoughtspot.com/docs/?pageid=embed-auth#trusted-auth-embed for more details.")]
    DuplicateToken,
    #[error("Received invalid token from getAuthToken callback or authToken endpoint.")]
    InvalidToken,
    #[error("Expected getAuthToken to return a string, but received a {actual}")]
    InvalidTokenType { actual: &'static str },
    #[error("neither a getAuthToken callback nor an authEndpoint is configured")]
    MissingTokenSource,
    #[error("getAuthToken callback failed: {0}")]
    TokenSource(String),
    #[error("{0} auth requires a username")]
    MissingUsername(&'static str),
    #[error("auth type {0} is not supported by this authenticator")]
    UnsupportedAuthType(&'static str),
    #[error("auth_request_failed:{message}")]
    Request { message: String },
    #[error("auth_http_{status}:{body}")]
    Http { status: u16, body: String },
    #[error("auth_decode_failed:{message}")]
    Decode { message: String },
}

/// Remote token endpoints the cache depends on.
#[async_trait(?Send)]
pub trait TokenService {
    /// `Ok(false)` is a definitive "this token is not valid".
    async fn verify_token(&self, token: &str) -> Result<bool, AuthError>;

    async fn fetch_auth_token(&self, auth_endpoint: &str) -> Result<String, AuthError>;
}

/// Caller-supplied token issuer. Tokens cross a dynamic boundary, so the
/// value is untyped until validated.
#[async_trait(?Send)]
pub trait AuthTokenProvider {
    async fn get_auth_token(&self) -> Result<Value, AuthError>;
}

pub trait UserAlert {
    fn alert(&self, message: &str);
}

/// Alerts through the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

impl UserAlert for LogAlert {
    fn alert(&self, message: &str) {
        tracing::error!(message, "user alert");
    }
}

/// Single current token. Assignment is synchronous so readers never see a
/// partial value.
#[derive(Debug, Default)]
pub struct AuthTokenCache {
    value: RefCell<Option<String>>,
}

impl AuthTokenCache {
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.value.borrow().clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.value.borrow_mut() = Some(token.into());
    }

    pub fn reset(&self) {
        self.value.borrow_mut().take();
    }
}

type PendingToken = Shared<LocalBoxFuture<'static, Result<String, AuthError>>>;

struct TokenManagerInner {
    config: EmbedConfig,
    service: Rc<dyn TokenService>,
    provider: Option<Rc<dyn AuthTokenProvider>>,
    alert: Rc<dyn UserAlert>,
    cache: AuthTokenCache,
    in_flight: RefCell<Option<PendingToken>>,
    /// Bumped on reset; a fetch started under an older generation is not cached.
    generation: Cell<u64>,
}

#[derive(Clone)]
pub struct AuthTokenManager {
    inner: Rc<TokenManagerInner>,
}

impl AuthTokenManager {
    #[must_use]
    pub fn new(
        config: EmbedConfig,
        service: Rc<dyn TokenService>,
        provider: Option<Rc<dyn AuthTokenProvider>>,
        alert: Rc<dyn UserAlert>,
    ) -> Self {
        Self {
            inner: Rc::new(TokenManagerInner {
                config,
                service,
                provider,
                alert,
                cache: AuthTokenCache::default(),
                in_flight: RefCell::new(None),
                generation: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &AuthTokenCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn has_token_source(&self) -> bool {
        self.inner.provider.is_some() || self.inner.config.auth_endpoint.is_some()
    }

    /// Clears the cached token and detaches any fetch still in flight.
    pub fn reset_cached_auth_token(&self) {
        let inner = &self.inner;
        inner.generation.set(inner.generation.get().wrapping_add(1));
        inner.in_flight.borrow_mut().take();
        inner.cache.reset();
    }

    pub async fn validate_auth_token(
        &self,
        token: &Value,
        suppress_alert: bool,
    ) -> Result<bool, AuthError> {
        self.inner.validate(token, suppress_alert).await
    }

    /// Returns a usable bearer token, reusing the cached one when it still
    /// verifies. Concurrent callers that need a fresh token share one fetch.
    pub async fn get_authentication_token(
        &self,
        skip_cache_validation: bool,
    ) -> Result<String, AuthError> {
        if let Some(cached) = self.inner.cache.get() {
            if !skip_cache_validation {
                match self.inner.validate(&Value::String(cached.clone()), true).await {
                    Ok(true) => return Ok(cached),
                    Ok(false) => tracing::debug!("cached auth token no longer valid"),
                    Err(error) => tracing::debug!(%error, "cached auth token rejected"),
                }
            }
        }

        self.fresh_token().await
    }

    async fn fresh_token(&self) -> Result<String, AuthError> {
        let existing = self.inner.in_flight.borrow().clone();
        let pending = match existing {
            Some(pending) => pending,
            None => {
                let inner = Rc::clone(&self.inner);
                let generation = inner.generation.get();
                let pending = async move {
                    let result = inner.fetch_and_validate(generation).await;
                    if inner.generation.get() == generation {
                        inner.in_flight.borrow_mut().take();
                    }
                    result
                }
                .boxed_local()
                .shared();
                *self.inner.in_flight.borrow_mut() = Some(pending.clone());
                pending
            }
        };
        pending.await
    }
}

impl TokenManagerInner {
    async fn validate(&self, token: &Value, suppress_alert: bool) -> Result<bool, AuthError> {
        let Value::String(token) = token else {
            return Err(AuthError::InvalidTokenType {
                actual: js_typeof(token),
            });
        };
        let cached = self.cache.get();

        if self.config.disable_token_verification {
            tracing::info!("token verification is disabled, assuming token is valid");
            return Ok(true);
        }

        match self.service.verify_token(token).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%error, "token verification request failed");
                return Ok(false);
            }
        }

        if cached.as_deref() == Some(token.as_str()) {
            if !self.config.suppress_error_alerts && !suppress_alert {
                self.alert.alert(DUPLICATE_TOKEN_ERR);
            }
            return Err(AuthError::DuplicateToken);
        }
        Err(AuthError::InvalidToken)
    }

    async fn fetch_and_validate(&self, generation: u64) -> Result<String, AuthError> {
        let raw = match (&self.provider, &self.config.auth_endpoint) {
            (Some(provider), _) => provider.get_auth_token().await?,
            (None, Some(endpoint)) => Value::String(self.service.fetch_auth_token(endpoint).await?),
            (None, None) => return Err(AuthError::MissingTokenSource),
        };

        match self.validate(&raw, false).await {
            Ok(true) => {}
            // An unreachable verification service does not block the token.
            Ok(false) => tracing::warn!("fresh auth token could not be verified"),
            Err(error) => {
                tracing::error!(%error, "fresh auth token failed validation");
                return Err(error);
            }
        }

        let token = match raw {
            Value::String(token) => token,
            other => {
                return Err(AuthError::InvalidTokenType {
                    actual: js_typeof(&other),
                });
            }
        };
        if self.generation.get() == generation {
            self.cache.set(token.clone());
        } else {
            tracing::debug!("auth token reset during fetch, not caching");
        }
        Ok(token)
    }
}

/// The `typeof` name JavaScript would report for a JSON value.
#[must_use]
pub fn js_typeof(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}
