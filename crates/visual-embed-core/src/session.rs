//! One embed instance: configuration, token cache, RPC client and auth
//! lifecycle wired together.

use std::rc::Rc;

use serde_json::Value;

use crate::api_intercept::{
    InterceptEventParams, InterceptInitData, get_intercept_init_data, handle_intercept_event,
    process_api_intercept_response,
};
use crate::auth::{
    AuthEventEmitter, AuthFailureType, AuthLifecycle, Authenticator, PostLoginHook,
    SessionAuthenticator, SessionInfoPrefetch,
};
use crate::auth_service::{AuthService, AuthTransport};
use crate::auth_token::{
    AuthError, AuthTokenManager, AuthTokenProvider, LogAlert, TokenService, UserAlert,
};
use crate::config::{ConfigError, EmbedConfig, ViewConfig};
use crate::events::{EmbedEvent, EmbedEventSink, HostEvent, Responder};
use crate::host_event::{HostEventClient, HostEventError};
use crate::trigger::{FrameTransport, TriggerOutcome};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct EmbedSessionBuilder {
    config: EmbedConfig,
    view: ViewConfig,
    frame: Rc<dyn FrameTransport>,
    events: Rc<dyn EmbedEventSink>,
    token_provider: Option<Rc<dyn AuthTokenProvider>>,
    token_service: Option<Rc<dyn TokenService>>,
    auth_transport: Option<Rc<dyn AuthTransport>>,
    authenticator: Option<Rc<dyn Authenticator>>,
    post_login: Option<Rc<dyn PostLoginHook>>,
    alert: Rc<dyn UserAlert>,
}

impl EmbedSessionBuilder {
    #[must_use]
    pub fn token_provider(mut self, provider: Rc<dyn AuthTokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn token_service(mut self, service: Rc<dyn TokenService>) -> Self {
        self.token_service = Some(service);
        self
    }

    #[must_use]
    pub fn auth_transport(mut self, transport: Rc<dyn AuthTransport>) -> Self {
        self.auth_transport = Some(transport);
        self
    }

    #[must_use]
    pub fn authenticator(mut self, authenticator: Rc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    #[must_use]
    pub fn post_login(mut self, hook: Rc<dyn PostLoginHook>) -> Self {
        self.post_login = Some(hook);
        self
    }

    #[must_use]
    pub fn alert(mut self, alert: Rc<dyn UserAlert>) -> Self {
        self.alert = alert;
        self
    }

    /// Unset HTTP seams default to one `AuthService` for the configured host.
    pub fn build(self) -> Result<EmbedSession, SessionError> {
        let config = self.config.normalized()?;

        let (token_service, auth_transport) = match (self.token_service, self.auth_transport) {
            (Some(service), Some(transport)) => (service, transport),
            (service, transport) => {
                let http = Rc::new(AuthService::new(config.host())?);
                (
                    service.unwrap_or_else(|| Rc::clone(&http) as Rc<dyn TokenService>),
                    transport.unwrap_or_else(|| http as Rc<dyn AuthTransport>),
                )
            }
        };

        let tokens = AuthTokenManager::new(
            config.clone(),
            token_service,
            self.token_provider,
            self.alert,
        );
        let authenticator = self.authenticator.unwrap_or_else(|| {
            Rc::new(SessionAuthenticator::new(
                Rc::clone(&auth_transport),
                tokens.clone(),
            ))
        });
        let post_login = self.post_login.unwrap_or_else(|| {
            Rc::new(SessionInfoPrefetch::new(Rc::clone(&auth_transport)))
        });
        let auth = AuthLifecycle::new(
            config.clone(),
            authenticator,
            auth_transport,
            tokens.clone(),
            Some(post_login),
            AuthEventEmitter::default(),
        );
        let host_events = HostEventClient::new(self.frame, config.host());

        Ok(EmbedSession {
            config,
            view: self.view,
            tokens,
            host_events,
            auth,
            events: self.events,
        })
    }
}

pub struct EmbedSession {
    config: EmbedConfig,
    view: ViewConfig,
    tokens: AuthTokenManager,
    host_events: HostEventClient,
    auth: AuthLifecycle,
    events: Rc<dyn EmbedEventSink>,
}

impl EmbedSession {
    #[must_use]
    pub fn builder(
        config: EmbedConfig,
        view: ViewConfig,
        frame: Rc<dyn FrameTransport>,
        events: Rc<dyn EmbedEventSink>,
    ) -> EmbedSessionBuilder {
        EmbedSessionBuilder {
            config,
            view,
            frame,
            events,
            token_provider: None,
            token_service: None,
            auth_transport: None,
            authenticator: None,
            post_login: None,
            alert: Rc::new(LogAlert),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    #[must_use]
    pub fn view_config(&self) -> &ViewConfig {
        &self.view
    }

    #[must_use]
    pub fn tokens(&self) -> &AuthTokenManager {
        &self.tokens
    }

    #[must_use]
    pub fn host_events(&self) -> &HostEventClient {
        &self.host_events
    }

    #[must_use]
    pub fn auth(&self) -> &AuthLifecycle {
        &self.auth
    }

    pub async fn authenticate(&self) -> Result<bool, AuthError> {
        self.auth.handle_auth().await
    }

    pub async fn logout(&self, do_not_disable_auto_login: bool) -> Result<(), AuthError> {
        self.auth.logout(do_not_disable_auto_login).await
    }

    pub fn reset_cached_auth_token(&self) {
        self.tokens.reset_cached_auth_token();
    }

    pub async fn trigger(
        &self,
        event: HostEvent,
        payload: Value,
    ) -> Result<TriggerOutcome, HostEventError> {
        self.host_events.trigger_host_event(event, payload).await
    }

    /// Intercept settings handed to the frame at init.
    #[must_use]
    pub fn intercept_init_data(&self) -> InterceptInitData {
        get_intercept_init_data(&self.config, &self.view)
    }

    #[must_use]
    pub fn process_api_intercept_response(&self, payload: Value) -> Value {
        process_api_intercept_response(payload)
    }

    /// Dispatches one message from the embedded app. Events without a
    /// dedicated handler go straight to the host listeners.
    pub async fn handle_embed_event(
        &self,
        event: EmbedEvent,
        data: Value,
        responder: &dyn Responder,
    ) {
        match event {
            EmbedEvent::ApiIntercept => {
                handle_intercept_event(InterceptEventParams {
                    event_data: &data,
                    execute_event: self.events.as_ref(),
                    view_config: &self.view,
                    answer_tml: &self.host_events,
                })
                .await;
            }
            EmbedEvent::AuthExpire => {
                self.events.execute_event(event, data);
                self.auth.handle_auth_expire(responder).await;
            }
            EmbedEvent::IdleSessionTimeout => {
                self.events.execute_event(event, data);
                self.auth.notify_failure(AuthFailureType::IdleSessionTimeout);
            }
            EmbedEvent::NoCookieAccess => {
                self.events.execute_event(event, data);
                self.auth.notify_failure(AuthFailureType::NoCookieAccess);
            }
            EmbedEvent::Init
            | EmbedEvent::AuthInit
            | EmbedEvent::Load
            | EmbedEvent::Data
            | EmbedEvent::RouteChange
            | EmbedEvent::EmbedListenerReady
            | EmbedEvent::CustomAction
            | EmbedEvent::Save
            | EmbedEvent::Pin
            | EmbedEvent::Error
            | EmbedEvent::OnBeforeGetVizDataIntercept => self.events.execute_event(event, data),
        }
    }
}
