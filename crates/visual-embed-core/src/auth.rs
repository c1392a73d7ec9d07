//! Login orchestration and auth status notifications.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::auth_service::{AuthTransport, TokenLoginMethod};
use crate::auth_token::{AuthError, AuthTokenManager};
use crate::config::{AuthType, EmbedConfig};
use crate::events::{EmbedEvent, Responder};

pub const AUTH_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthFailureType {
    Sdk,
    NoCookieAccess,
    Expiry,
    Other,
    IdleSessionTimeout,
    UnauthenticatedFailure,
}

impl AuthFailureType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sdk => "SDK",
            Self::NoCookieAccess => "NO_COOKIE_ACCESS",
            Self::Expiry => "EXPIRY",
            Self::Other => "OTHER",
            Self::IdleSessionTimeout => "IDLE_SESSION_TIMEOUT",
            Self::UnauthenticatedFailure => "UNAUTHENTICATED_FAILURE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Failure(AuthFailureType),
    SdkSuccess,
    Logout,
}

/// Fan-out of auth status changes. Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct AuthEventEmitter {
    sender: broadcast::Sender<AuthStatus>,
}

impl Default for AuthEventEmitter {
    fn default() -> Self {
        Self::new(AUTH_EVENT_CAPACITY)
    }
}

impl AuthEventEmitter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthStatus> {
        self.sender.subscribe()
    }

    pub fn emit(&self, status: AuthStatus) {
        tracing::debug!(?status, "auth status");
        if self.sender.send(status).is_err() {
            tracing::trace!(?status, "no auth status subscribers");
        }
    }
}

/// Performs the actual login flow for a configured auth type.
#[async_trait(?Send)]
pub trait Authenticator {
    /// `Ok(false)` means the flow ran but did not establish a session.
    async fn authenticate(&self, config: &EmbedConfig) -> Result<bool, AuthError>;
}

/// Runs after every successful login.
#[async_trait(?Send)]
pub trait PostLoginHook {
    async fn on_login(&self);
}

/// Login flows backed by the session HTTP endpoints.
pub struct SessionAuthenticator {
    transport: Rc<dyn AuthTransport>,
    tokens: AuthTokenManager,
}

impl SessionAuthenticator {
    #[must_use]
    pub fn new(transport: Rc<dyn AuthTransport>, tokens: AuthTokenManager) -> Self {
        Self { transport, tokens }
    }

    async fn is_logged_in(&self) -> bool {
        match self.transport.fetch_session_info().await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "no active session");
                false
            }
        }
    }
}

#[async_trait(?Send)]
impl Authenticator for SessionAuthenticator {
    async fn authenticate(&self, config: &EmbedConfig) -> Result<bool, AuthError> {
        match config.auth_type {
            AuthType::None => Ok(true),
            AuthType::Basic => {
                if self.is_logged_in().await {
                    return Ok(true);
                }
                let username = config
                    .username
                    .as_deref()
                    .ok_or(AuthError::MissingUsername(AuthType::Basic.as_str()))?;
                let password = config.password.as_deref().unwrap_or_default();
                self.transport.basic_login(username, password).await
            }
            AuthType::TrustedAuthToken => {
                if self.is_logged_in().await {
                    return Ok(true);
                }
                let username = config
                    .username
                    .as_deref()
                    .ok_or(AuthError::MissingUsername(AuthType::TrustedAuthToken.as_str()))?;
                let token = self.tokens.get_authentication_token(false).await?;
                let method = if config.no_redirect || config.in_popup {
                    TokenLoginMethod::Post
                } else {
                    TokenLoginMethod::Get
                };
                self.transport.token_login(username, &token, method).await
            }
            AuthType::TrustedAuthTokenCookieless => {
                self.tokens.get_authentication_token(false).await?;
                Ok(true)
            }
            other @ (AuthType::EmbeddedSso | AuthType::SamlRedirect | AuthType::OidcRedirect) => {
                Err(AuthError::UnsupportedAuthType(other.as_str()))
            }
        }
    }
}

/// Caches session info after login so later calls can read it synchronously.
pub struct SessionInfoPrefetch {
    transport: Rc<dyn AuthTransport>,
    session_info: RefCell<Option<Value>>,
}

impl SessionInfoPrefetch {
    #[must_use]
    pub fn new(transport: Rc<dyn AuthTransport>) -> Self {
        Self {
            transport,
            session_info: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn session_info(&self) -> Option<Value> {
        self.session_info.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PostLoginHook for SessionInfoPrefetch {
    async fn on_login(&self) {
        match self.transport.fetch_session_info().await {
            Ok(info) => *self.session_info.borrow_mut() = Some(info),
            Err(error) => tracing::warn!(%error, "session info prefetch failed"),
        }
    }
}

pub struct AuthLifecycle {
    config: EmbedConfig,
    auto_login: Cell<bool>,
    state: Cell<AuthState>,
    authenticator: Rc<dyn Authenticator>,
    transport: Rc<dyn AuthTransport>,
    tokens: AuthTokenManager,
    post_login: Option<Rc<dyn PostLoginHook>>,
    events: AuthEventEmitter,
}

impl AuthLifecycle {
    #[must_use]
    pub fn new(
        config: EmbedConfig,
        authenticator: Rc<dyn Authenticator>,
        transport: Rc<dyn AuthTransport>,
        tokens: AuthTokenManager,
        post_login: Option<Rc<dyn PostLoginHook>>,
        events: AuthEventEmitter,
    ) -> Self {
        let auto_login = config.effective_auto_login();
        Self {
            config,
            auto_login: Cell::new(auto_login),
            state: Cell::new(AuthState::Unauthenticated),
            authenticator,
            transport,
            tokens,
            post_login,
            events,
        }
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.get()
    }

    #[must_use]
    pub fn auto_login(&self) -> bool {
        self.auto_login.get()
    }

    #[must_use]
    pub fn events(&self) -> &AuthEventEmitter {
        &self.events
    }

    /// Runs the login flow once. Both `Ok(false)` and `Err` count as an SDK
    /// auth failure.
    pub async fn handle_auth(&self) -> Result<bool, AuthError> {
        self.state.set(AuthState::Authenticating);
        let result = self.authenticator.authenticate(&self.config).await;
        match &result {
            Ok(true) => {
                self.state.set(AuthState::Authenticated);
                self.events.emit(AuthStatus::SdkSuccess);
                if let Some(hook) = &self.post_login {
                    hook.on_login().await;
                }
            }
            Ok(false) => {
                tracing::warn!(auth_type = self.config.auth_type.as_str(), "login was not accepted");
                self.fail(AuthFailureType::Sdk);
            }
            Err(error) => {
                tracing::error!(%error, auth_type = self.config.auth_type.as_str(), "login failed");
                self.fail(AuthFailureType::Sdk);
            }
        }
        result
    }

    /// Answers the embedded app's token-expiry signal.
    pub async fn handle_auth_expire(&self, responder: &dyn Responder) {
        let cookieless = self.config.auth_type == AuthType::TrustedAuthTokenCookieless;
        if cookieless && self.auto_login() {
            match self.tokens.get_authentication_token(false).await {
                Ok(auth_token) => responder.respond(json!({
                    "type": EmbedEvent::AuthExpire.as_str(),
                    "data": { "authToken": auth_token },
                })),
                Err(error) => tracing::error!(%error, "could not refresh expired auth token"),
            }
        } else if self.auto_login() {
            if let Err(error) = self.handle_auth().await {
                tracing::debug!(%error, "re-login after expiry failed");
            }
        }
        self.events.emit(AuthStatus::Failure(AuthFailureType::Expiry));
    }

    /// Reports a failure observed by the embedded app.
    pub fn notify_failure(&self, failure: AuthFailureType) {
        self.fail(failure);
    }

    /// Ends the session. Auto-login is turned off unless asked to keep it.
    pub async fn logout(&self, do_not_disable_auto_login: bool) -> Result<(), AuthError> {
        if !do_not_disable_auto_login {
            self.auto_login.set(false);
        }
        let result = self.transport.logout().await;
        self.tokens.reset_cached_auth_token();
        self.state.set(AuthState::Unauthenticated);
        self.events.emit(AuthStatus::Logout);
        result
    }

    fn fail(&self, failure: AuthFailureType) {
        self.state.set(AuthState::Failed);
        self.events.emit(AuthStatus::Failure(failure));
    }
}
