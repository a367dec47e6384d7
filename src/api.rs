//! TV GO API client
//!
//! Requests are described as plain [`HttpRequest`] values and executed by a
//! [`Transport`]. Production uses [`UreqTransport`]; tests swap in a scripted
//! transport so every endpoint can be exercised offline.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, ProviderRejection, TransportError};
use crate::models::Market;

/// User agent of the official Android client
pub const DEFAULT_USER_AGENT: &str = "okhttp/3.12.12";

/// Responses larger than the ureq default (10 MB) are normal for a week of EPG.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// When false the first response is returned as-is and its body is not read.
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            follow_redirects: true,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", &format!("Bearer {}", token))
    }

    pub fn json(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self.header("Content-Type", "application/json")
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    #[cfg(test)]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// `Location` header, if present
    pub location: Option<String>,
    pub body: String,
}

/// Blocking HTTP transport
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// ureq-backed transport. HTTP error statuses are returned, not raised: the
/// provider reports most failures inside a JSON body.
pub struct UreqTransport {
    agent: ureq::Agent,
    no_redirect_agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: Self::create_agent(timeout, 10),
            no_redirect_agent: Self::create_agent(timeout, 0),
        }
    }

    fn create_agent(timeout: Duration, max_redirects: u32) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .max_redirects(max_redirects)
            // Hand back the 3xx itself once the redirect budget is spent.
            .max_redirects_will_error(false)
            .build()
            .new_agent()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = if request.follow_redirects {
            &self.agent
        } else {
            &self.no_redirect_agent
        };

        let result = match request.method {
            Method::Get => {
                let mut builder = agent.get(&request.url);
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                for (key, value) in &request.headers {
                    builder = builder.header(key.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = agent.post(&request.url);
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                for (key, value) in &request.headers {
                    builder = builder.header(key.as_str(), value.as_str());
                }
                match &request.body {
                    Some(body) => builder.send(body.as_str()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(TransportError::Request)?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Capturing a redirect must not pull the stream itself.
        let body = if request.follow_redirects {
            response
                .body_mut()
                .with_config()
                .limit(MAX_BODY_BYTES)
                .read_to_string()
                .map_err(TransportError::Body)?
        } else {
            String::new()
        };

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}

/// Common `success` / `errorCode` / `errorMessage` envelope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ApiStatus {
    pub fn rejection(&self) -> ProviderRejection {
        ProviderRejection {
            code: self.error_code.clone(),
            message: self
                .error_message
                .clone()
                .or_else(|| self.error_code.clone())
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

pub struct ApiClient<T: Transport> {
    transport: T,
    market: Market,
    base_url: String,
    user_agent: String,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, market: Market) -> Self {
        Self {
            transport,
            base_url: market.base_url(),
            market,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request against the API host carrying the client user agent
    pub fn request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, &format!("{}{}", self.base_url, path))
            .header("User-Agent", &self.user_agent)
    }

    /// Execute without interpreting the body
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = ?request.method, url = %request.url, "api request");
        self.transport
            .execute(request)
            .map_err(|source| ApiError::Transport {
                url: request.url.clone(),
                source,
            })
    }

    pub fn fetch_json<R: DeserializeOwned>(&self, request: &HttpRequest) -> Result<R, ApiError> {
        let response = self.execute(request)?;
        serde_json::from_str(&response.body).map_err(|source| ApiError::Decode {
            url: request.url.clone(),
            status: response.status,
            source,
        })
    }
}

/// Accepts `"42"`, `42` or null. The API is inconsistent about id and year types.
pub fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(D::Error::custom("Expected string, number, or null")),
    }
}

pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    optional_string_or_number(deserializer)?
        .ok_or_else(|| D::Error::custom("Expected string or number"))
}

/// Treats an explicit `null` like a missing key.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
