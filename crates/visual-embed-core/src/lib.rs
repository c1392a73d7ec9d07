//! Host-side messaging core for embedded ThoughtSpot frames.

pub mod api_intercept;
pub mod auth;
pub mod auth_service;
pub mod auth_token;
pub mod config;
pub mod events;
pub mod host_event;
pub mod session;
pub mod trigger;

pub use api_intercept::{InterceptInitData, InterceptedApiType};
pub use auth::{AuthEventEmitter, AuthFailureType, AuthLifecycle, AuthState, AuthStatus};
pub use auth_token::{AuthError, AuthTokenManager};
pub use config::{AuthType, EmbedConfig, ViewConfig};
pub use events::{EmbedEvent, HostEvent};
pub use host_event::{HostEventClient, HostEventError};
pub use session::{EmbedSession, EmbedSessionBuilder, SessionError};
pub use trigger::{FrameTransport, MessageEnvelope, TriggerError, TriggerOutcome};
