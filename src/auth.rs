//! Device registration, login and token refresh

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiStatus, Method, Transport};
use crate::error::{AuthError, ProviderRejection};
use crate::models::{Credentials, TokenPair};

/// Parameters of `/v2/auth/init`
#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub os_version: String,
    pub app_version: String,
    pub language: String,
}

/// Result of a call the provider may decline without it being a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome<T> {
    Granted(T),
    Rejected(ProviderRejection),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    status: ApiStatus,
    #[serde(default)]
    token: Option<TokenBody>,
}

impl TokenResponse {
    fn token(&self) -> Option<&TokenBody> {
        self.token.as_ref()
    }
}

/// Register the device and obtain the short-lived init token.
pub fn init_device<T: Transport>(
    client: &ApiClient<T>,
    registration: &DeviceRegistration,
) -> Result<String, AuthError> {
    let request = client
        .request(Method::Post, "/v2/auth/init")
        .query("dsid", &registration.device_id)
        .query("deviceName", &registration.device_name)
        .query("deviceType", &registration.device_type)
        .query("osVersion", &registration.os_version)
        .query("appVersion", &registration.app_version)
        .query("language", &registration.language);
    let response: TokenResponse = client.fetch_json(&request)?;

    response
        .token()
        .and_then(|t| t.access_token.clone())
        .ok_or(AuthError::Malformed {
            endpoint: "init",
            field: "token.accessToken",
        })
}

/// Exchange credentials for a token pair, authorized by the init token.
pub fn login<T: Transport>(
    client: &ApiClient<T>,
    init_token: &str,
    credentials: &Credentials,
) -> Result<AuthOutcome<TokenPair>, AuthError> {
    let request = client
        .request(Method::Post, "/v2/auth/login")
        .bearer(init_token)
        .json(&json!({
            "loginOrNickname": credentials.username,
            "password": credentials.password,
        }));
    let response: TokenResponse = client.fetch_json(&request)?;

    if !response.status.success {
        return Ok(AuthOutcome::Rejected(response.status.rejection()));
    }

    let token = response.token().ok_or(AuthError::Malformed {
        endpoint: "login",
        field: "token",
    })?;
    let refresh_token = token.refresh_token.clone().ok_or(AuthError::Malformed {
        endpoint: "login",
        field: "token.refreshToken",
    })?;
    let access_token = token.access_token.clone().ok_or(AuthError::Malformed {
        endpoint: "login",
        field: "token.accessToken",
    })?;

    Ok(AuthOutcome::Granted(TokenPair {
        access_token,
        refresh_token,
    }))
}

/// Exchange a refresh token for a fresh access token. The provider may rotate
/// the refresh token; the returned pair always holds the one to use next.
pub fn refresh<T: Transport>(
    client: &ApiClient<T>,
    refresh_token: &str,
) -> Result<AuthOutcome<TokenPair>, AuthError> {
    let request = client
        .request(Method::Post, "/v2/auth/tokens")
        .json(&json!({ "refreshToken": refresh_token }));
    let response: TokenResponse = client.fetch_json(&request)?;

    if !response.status.success {
        return Ok(AuthOutcome::Rejected(response.status.rejection()));
    }

    let token = response.token();
    let access_token = token
        .and_then(|t| t.access_token.clone())
        .ok_or(AuthError::Malformed {
            endpoint: "tokens",
            field: "token.accessToken",
        })?;
    let refresh_token = token
        .and_then(|t| t.refresh_token.clone())
        .unwrap_or_else(|| refresh_token.to_string());

    Ok(AuthOutcome::Granted(TokenPair {
        access_token,
        refresh_token,
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Unauthenticated,
    Initialized { init_token: String },
    LoggedIn { tokens: TokenPair },
    Active { tokens: TokenPair },
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Initialized { .. } => "initialized",
            SessionState::LoggedIn { .. } => "logged in",
            SessionState::Active { .. } => "active",
        }
    }
}

/// Token lifecycle: `Unauthenticated -> Initialized -> LoggedIn -> Active`.
///
/// `refresh` may be repeated from `LoggedIn` or `Active`. A rejected refresh
/// drops the session back to `Unauthenticated`.
#[derive(Debug)]
pub struct AuthSession {
    state: SessionState,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Current access token; only available once the session is active.
    #[cfg(test)]
    pub fn access_token(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active { tokens } => Some(&tokens.access_token),
            _ => None,
        }
    }

    pub fn init_device<T: Transport>(
        &mut self,
        client: &ApiClient<T>,
        registration: &DeviceRegistration,
    ) -> Result<(), AuthError> {
        let init_token = init_device(client, registration)?;
        debug!("device initialized");
        self.state = SessionState::Initialized { init_token };
        Ok(())
    }

    pub fn login<T: Transport>(
        &mut self,
        client: &ApiClient<T>,
        credentials: &Credentials,
    ) -> Result<AuthOutcome<()>, AuthError> {
        let SessionState::Initialized { init_token } = &self.state else {
            return Err(AuthError::InvalidState {
                operation: "log in",
                state: self.state.name(),
            });
        };

        match login(client, init_token, credentials)? {
            AuthOutcome::Granted(tokens) => {
                info!(user = %credentials.username, "logged in");
                self.state = SessionState::LoggedIn { tokens };
                Ok(AuthOutcome::Granted(()))
            }
            AuthOutcome::Rejected(rejection) => {
                warn!(reason = %rejection, "login rejected");
                Ok(AuthOutcome::Rejected(rejection))
            }
        }
    }

    pub fn refresh<T: Transport>(
        &mut self,
        client: &ApiClient<T>,
    ) -> Result<AuthOutcome<String>, AuthError> {
        let refresh_token = match &self.state {
            SessionState::LoggedIn { tokens } | SessionState::Active { tokens } => {
                tokens.refresh_token.clone()
            }
            other => {
                return Err(AuthError::InvalidState {
                    operation: "refresh tokens",
                    state: other.name(),
                })
            }
        };

        match refresh(client, &refresh_token)? {
            AuthOutcome::Granted(tokens) => {
                let access_token = tokens.access_token.clone();
                self.state = SessionState::Active { tokens };
                Ok(AuthOutcome::Granted(access_token))
            }
            AuthOutcome::Rejected(rejection) => {
                warn!(reason = %rejection, "token refresh rejected");
                self.state = SessionState::Unauthenticated;
                Ok(AuthOutcome::Rejected(rejection))
            }
        }
    }

    /// Full exchange: init, login, refresh. Yields the access token.
    pub fn sign_in<T: Transport>(
        &mut self,
        client: &ApiClient<T>,
        registration: &DeviceRegistration,
        credentials: &Credentials,
    ) -> Result<AuthOutcome<String>, AuthError> {
        self.init_device(client, registration)?;
        if let AuthOutcome::Rejected(rejection) = self.login(client, credentials)? {
            return Ok(AuthOutcome::Rejected(rejection));
        }
        self.refresh(client)
    }
}
