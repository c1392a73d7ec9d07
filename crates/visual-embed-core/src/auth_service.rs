//! HTTP calls against the ThoughtSpot session endpoints.

use async_trait::async_trait;
use serde_json::Value;

use crate::auth_token::{AuthError, TokenService};
use crate::config::{ConfigError, normalize_host};

pub mod endpoints {
    pub const SESSION_INFO: &str = "/callosum/v1/session/info";
    pub const TOKEN_LOGIN: &str = "/callosum/v1/session/login/token";
    pub const BASIC_LOGIN: &str = "/callosum/v1/session/login";
    pub const LOGOUT: &str = "/callosum/v1/session/logout";
    pub const IS_ACTIVE: &str = "/callosum/v1/session/isactive";
    pub const PREAUTH_INFO: &str = "/prism/preauth/info";
}

pub const REQUESTED_BY_HEADER: &str = "x-requested-by";
pub const REQUESTED_BY_VALUE: &str = "ThoughtSpot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLoginMethod {
    /// Query-string login that relies on the redirect setting the cookie.
    Get,
    /// Form POST used when redirects are unavailable (popups, no-redirect).
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credentials {
    Include,
    Omit,
}

/// Session operations used by the login flows.
#[async_trait(?Send)]
pub trait AuthTransport {
    async fn fetch_session_info(&self) -> Result<Value, AuthError>;
    async fn fetch_preauth_info(&self) -> Result<Value, AuthError>;
    async fn token_login(
        &self,
        username: &str,
        auth_token: &str,
        method: TokenLoginMethod,
    ) -> Result<bool, AuthError>;
    async fn basic_login(&self, username: &str, password: &str) -> Result<bool, AuthError>;
    async fn logout(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Clone)]
pub struct AuthService {
    host: String,
    http: reqwest::Client,
}

impl AuthService {
    pub fn new(thought_spot_host: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            host: normalize_host(thought_spot_host)?,
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        credentials: Credentials,
    ) -> Result<reqwest::Response, AuthError> {
        with_credentials(request, credentials)
            .send()
            .await
            .map_err(|error| AuthError::Request {
                message: error.to_string(),
            })
    }

    async fn get_json(&self, path: &str) -> Result<Value, AuthError> {
        let request = self
            .http
            .get(self.endpoint(path))
            .header(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE);
        let response = self.send(request, Credentials::Include).await?;
        decode_json_response(response).await
    }
}

#[async_trait(?Send)]
impl TokenService for AuthService {
    async fn verify_token(&self, token: &str) -> Result<bool, AuthError> {
        let request = self
            .http
            .get(self.endpoint(endpoints::IS_ACTIVE))
            .header(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE)
            .bearer_auth(token);
        let response = self.send(request, Credentials::Omit).await?;
        Ok(response.status().is_success())
    }

    async fn fetch_auth_token(&self, auth_endpoint: &str) -> Result<String, AuthError> {
        let response = self
            .send(self.http.get(auth_endpoint), Credentials::Include)
            .await?;
        let status = response.status();
        let body = response.text().await.map_err(|error| AuthError::Decode {
            message: error.to_string(),
        })?;
        if !status.is_success() {
            return Err(format_http_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait(?Send)]
impl AuthTransport for AuthService {
    async fn fetch_session_info(&self) -> Result<Value, AuthError> {
        self.get_json(endpoints::SESSION_INFO).await
    }

    async fn fetch_preauth_info(&self) -> Result<Value, AuthError> {
        self.get_json(endpoints::PREAUTH_INFO).await
    }

    async fn token_login(
        &self,
        username: &str,
        auth_token: &str,
        method: TokenLoginMethod,
    ) -> Result<bool, AuthError> {
        let url = self.endpoint(endpoints::TOKEN_LOGIN);
        let params = [("username", username), ("auth_token", auth_token)];
        let request = match method {
            TokenLoginMethod::Get => self.http.get(url).query(&params),
            TokenLoginMethod::Post => self
                .http
                .post(url)
                .header(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE)
                .form(&params),
        };
        let response = self.send(request, Credentials::Include).await?;
        Ok(response.status().is_success())
    }

    async fn basic_login(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let request = self
            .http
            .post(self.endpoint(endpoints::BASIC_LOGIN))
            .header(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE)
            .form(&[("username", username), ("password", password)]);
        let response = self.send(request, Credentials::Include).await?;
        Ok(response.status().is_success())
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let request = self
            .http
            .post(self.endpoint(endpoints::LOGOUT))
            .header(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE);
        let response = self.send(request, Credentials::Include).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(format_http_error(status.as_u16(), &body))
    }
}

#[cfg(target_arch = "wasm32")]
fn with_credentials(
    request: reqwest::RequestBuilder,
    credentials: Credentials,
) -> reqwest::RequestBuilder {
    match credentials {
        Credentials::Include => request.fetch_credentials_include(),
        Credentials::Omit => request.fetch_credentials_omit(),
    }
}

// Native clients carry no ambient browser cookies.
#[cfg(not(target_arch = "wasm32"))]
fn with_credentials(
    request: reqwest::RequestBuilder,
    _credentials: Credentials,
) -> reqwest::RequestBuilder {
    request
}

pub fn format_http_error(status: u16, body: &str) -> AuthError {
    let trimmed = body.trim();
    let body = if trimmed.is_empty() {
        "<empty>".to_string()
    } else {
        trimmed.to_string()
    };
    AuthError::Http { status, body }
}

async fn decode_json_response(response: reqwest::Response) -> Result<Value, AuthError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| AuthError::Decode {
        message: error.to_string(),
    })?;
    if !status.is_success() {
        return Err(format_http_error(
            status.as_u16(),
            &String::from_utf8_lossy(&bytes),
        ));
    }
    serde_json::from_slice(&bytes).map_err(|error| AuthError::Decode {
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_joined_to_normalized_host() {
        let service = AuthService::new("https://ts.example.com/").expect("service");
        assert_eq!(
            service.endpoint(endpoints::IS_ACTIVE),
            "https://ts.example.com/callosum/v1/session/isactive"
        );
        assert_eq!(
            service.endpoint(endpoints::PREAUTH_INFO),
            "https://ts.example.com/prism/preauth/info"
        );
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(
            AuthService::new("  "),
            Err(ConfigError::EmptyHost)
        ));
    }

    #[test]
    fn http_error_mapping_preserves_shape() {
        assert_eq!(
            format_http_error(401, " unauthorized ").to_string(),
            "auth_http_401:unauthorized"
        );
        assert_eq!(format_http_error(503, " ").to_string(), "auth_http_503:<empty>");
    }
}
