//! Stream URL negotiation

use serde::Deserialize;
use tracing::debug;

use crate::api::{ApiClient, ApiStatus, HttpRequest, Method, Transport};
use crate::error::StreamError;
use crate::models::{Channel, DeviceProfile};

/// Client identity the CDN redirector expects
pub const PLAYER_USER_AGENT: &str =
    "ReactNativeVideo/3.13.2 (Linux;Android 10) ExoPlayerLib/2.10.3";

const STREAM_PROFILE: &str = "p5";
const DRM_SCHEME: &str = "verimatrix";

const NO_PACKAGE: &str = "NO_PACKAGE";
const DEVICE_LIMIT: &str = "DEVICE_MAX_LIMIT";

#[derive(Debug, Deserialize)]
struct StreamUrlResponse {
    #[serde(flatten)]
    status: ApiStatus,
    #[serde(default)]
    url: Option<String>,
}

/// Negotiate a playable URL for one channel.
///
/// `Ok(None)` means the account has no package for the channel.
pub fn resolve_url<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
    channel: &Channel,
    device: &DeviceProfile,
) -> Result<Option<String>, StreamError> {
    let request = client
        .request(Method::Get, "/v2/television/stream-url")
        .bearer(access_token)
        .query("service", "LIVE")
        .query("name", &device.device_name)
        .query("devtype", &device.device_type)
        .query("id", channel.id)
        .query("prof", STREAM_PROFILE)
        .query("ecid", "")
        .query("drm", DRM_SCHEME);
    let response: StreamUrlResponse = client.fetch_json(&request)?;

    if !response.status.success {
        let rejection = response.status.rejection();
        return match rejection.code.as_deref() {
            Some(NO_PACKAGE) => {
                debug!(channel = %channel.name, "no package, skipping");
                Ok(None)
            }
            Some(code) if code.contains(DEVICE_LIMIT) => {
                Err(StreamError::DeviceLimitExceeded(readable_message(&rejection.message)))
            }
            _ => Err(StreamError::Resolution {
                channel: channel.name.clone(),
                message: readable_message(&rejection.message),
            }),
        };
    }

    let url = response.url.filter(|u| !u.is_empty()).ok_or_else(|| StreamError::Resolution {
        channel: channel.name.clone(),
        message: "response carries no url".to_string(),
    })?;

    if client.market().resolves_redirects() {
        return follow_redirect(client, channel, &url).map(Some);
    }
    Ok(Some(url))
}

/// Ask the redirector where the stream really lives, without fetching it.
fn follow_redirect<T: Transport>(
    client: &ApiClient<T>,
    channel: &Channel,
    url: &str,
) -> Result<String, StreamError> {
    let request = HttpRequest::new(Method::Get, url)
        .header("User-Agent", PLAYER_USER_AGENT)
        .without_redirects();
    // The redirector is per channel; losing it must not end the run.
    let response = client.execute(&request).map_err(|e| StreamError::Resolution {
        channel: channel.name.clone(),
        message: format!("redirector unreachable: {}", e),
    })?;

    let location = response.location.ok_or_else(|| StreamError::Resolution {
        channel: channel.name.clone(),
        message: format!("redirector answered HTTP {} without a location", response.status),
    })?;

    // Relative locations are resolved against the redirector URL.
    let resolved = url::Url::parse(url)
        .and_then(|base| base.join(&location))
        .map(|u| u.to_string())
        .unwrap_or(location);
    debug!(channel = %channel.name, url = %resolved, "stream redirect resolved");
    Ok(resolved)
}

fn readable_message(message: &str) -> String {
    message.replace("exceeded-max-device-count", "maximum number of devices exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockTransport;

    fn channel() -> Channel {
        Channel {
            id: 42,
            name: "Sport 1".to_string(),
            logo_url: String::new(),
            category: None,
        }
    }

    fn device() -> DeviceProfile {
        DeviceProfile {
            device_type: "OTT_STB".to_string(),
            device_name: "KSTB6077".to_string(),
        }
    }

    #[test]
    fn test_success_returns_url() {
        let transport = MockTransport::new().on(
            "/v2/television/stream-url",
            r#"{"success": true, "url": "https://cdn.example/42.m3u8"}"#,
        );
        let client = ApiClient::new(&transport, "hu".parse().unwrap());
        let url = resolve_url(&client, "acc", &channel(), &device()).unwrap();
        assert_eq!(url.as_deref(), Some("https://cdn.example/42.m3u8"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.query_value("id"), Some("42"));
        assert_eq!(sent.query_value("prof"), Some("p5"));
        assert_eq!(sent.query_value("drm"), Some("verimatrix"));
        assert_eq!(sent.query_value("devtype"), Some("OTT_STB"));
        assert_eq!(sent.header_value("authorization"), Some("Bearer acc"));
    }

    #[test]
    fn test_no_package_is_absent() {
        let transport = MockTransport::new().on(
            "/v2/television/stream-url",
            r#"{"success": false, "errorCode": "NO_PACKAGE", "errorMessage": "not subscribed"}"#,
        );
        let client = ApiClient::new(&transport, "hu".parse().unwrap());
        assert_eq!(resolve_url(&client, "acc", &channel(), &device()).unwrap(), None);
    }

    #[test]
    fn test_device_limit_is_signalled() {
        let transport = MockTransport::new().on(
            "/v2/television/stream-url",
            r#"{"success": false, "errorCode": "DEVICE_MAX_LIMIT", "errorMessage": "exceeded-max-device-count"}"#,
        );
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        match resolve_url(&client, "acc", &channel(), &device()) {
            Err(StreamError::DeviceLimitExceeded(msg)) => {
                assert_eq!(msg, "maximum number of devices exceeded")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_other_rejection_is_resolution_error() {
        let transport = MockTransport::new().on(
            "/v2/television/stream-url",
            r#"{"success": false, "errorCode": "GEO_BLOCK", "errorMessage": "not here"}"#,
        );
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        let err = resolve_url(&client, "acc", &channel(), &device()).unwrap_err();
        assert!(matches!(err, StreamError::Resolution { ref message, .. } if message == "not here"));
    }

    #[test]
    fn test_redirect_markets_follow_location() {
        let transport = MockTransport::new()
            .on(
                "/v2/television/stream-url",
                r#"{"success": true, "url": "https://redir.example/live/42"}"#,
            )
            .on_redirect("/live/42", "https://edge.example/42/index.m3u8?token=x");
        let client = ApiClient::new(&transport, "cz".parse().unwrap());
        let url = resolve_url(&client, "acc", &channel(), &device()).unwrap();
        assert_eq!(url.as_deref(), Some("https://edge.example/42/index.m3u8?token=x"));

        let hop = &transport.requests_to("/live/42")[0];
        assert!(!hop.follow_redirects);
        assert_eq!(hop.header_value("user-agent"), Some(PLAYER_USER_AGENT));
        assert_eq!(hop.header_value("authorization"), None);
    }

    #[test]
    fn test_relative_location_is_joined() {
        let transport = MockTransport::new()
            .on(
                "/v2/television/stream-url",
                r#"{"success": true, "url": "https://redir.example/live/42"}"#,
            )
            .on_redirect("/live/42", "/edge/42.m3u8");
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        let url = resolve_url(&client, "acc", &channel(), &device()).unwrap();
        assert_eq!(url.as_deref(), Some("https://redir.example/edge/42.m3u8"));
    }

    #[test]
    fn test_missing_location_is_resolution_error() {
        let transport = MockTransport::new()
            .on(
                "/v2/television/stream-url",
                r#"{"success": true, "url": "https://redir.example/live/42"}"#,
            )
            .on_status("/live/42", 200, "");
        let client = ApiClient::new(&transport, "cz".parse().unwrap());
        let err = resolve_url(&client, "acc", &channel(), &device()).unwrap_err();
        assert!(matches!(err, StreamError::Resolution { .. }));
    }

    #[test]
    fn test_unreachable_redirector_is_resolution_error() {
        let transport = MockTransport::new()
            .on(
                "/v2/television/stream-url",
                r#"{"success": true, "url": "https://redir.example/live/42"}"#,
            )
            .on_error("/live/42", "connection reset");
        let client = ApiClient::new(&transport, "cz".parse().unwrap());
        let err = resolve_url(&client, "acc", &channel(), &device()).unwrap_err();
        match err {
            StreamError::Resolution { channel, message } => {
                assert_eq!(channel, "Sport 1");
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
