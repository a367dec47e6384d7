//! Device-limit recovery: list registered devices, let the operator pick one,
//! remove it.

use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{null_as_default, string_or_number, ApiClient, ApiStatus, Method, Transport};
use crate::error::RecoveryError;
use crate::models::Device;

/// Chooses which registered device to remove. `None` declines.
pub trait DevicePicker {
    fn pick(&mut self, devices: &[Device]) -> Option<String>;
}

impl<F> DevicePicker for F
where
    F: FnMut(&[Device]) -> Option<String>,
{
    fn pick(&mut self, devices: &[Device]) -> Option<String> {
        self(devices)
    }
}

#[derive(Debug, Deserialize)]
struct DeviceInfo {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyDevicesResponse {
    #[serde(default)]
    this_device: Option<DeviceInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    small_screen_devices: Vec<DeviceInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    stb_and_big_screen_devices: Vec<DeviceInfo>,
}

/// This device first, then phones/tablets, then set-top boxes and TVs.
pub fn list_devices<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
) -> Result<Vec<Device>, RecoveryError> {
    let request = client
        .request(Method::Get, "/v2/home/my-devices")
        .bearer(access_token);
    let response: MyDevicesResponse = client.fetch_json(&request)?;

    let this = response.this_device.into_iter().map(|d| Device {
        id: d.id,
        name: d.name,
        is_current: true,
    });
    let others = response
        .small_screen_devices
        .into_iter()
        .chain(response.stb_and_big_screen_devices)
        .map(|d| Device {
            id: d.id,
            name: d.name,
            is_current: false,
        });
    Ok(this.chain(others).collect())
}

pub fn delete_device<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
    device_id: &str,
) -> Result<(), RecoveryError> {
    let request = client
        .request(Method::Get, "/home/deleteDevice")
        .bearer(access_token)
        .query("id", device_id);
    let status: ApiStatus = client.fetch_json(&request)?;
    if status.success {
        Ok(())
    } else {
        Err(RecoveryError::Rejected(status.rejection()))
    }
}

/// One operator-mediated attempt. `Ok(())` means a device was removed and the
/// caller may retry stream resolution.
pub fn recover<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
    picker: &mut dyn DevicePicker,
) -> Result<(), RecoveryError> {
    let devices = list_devices(client, access_token)?;
    let Some(device_id) = picker.pick(&devices) else {
        warn!("device removal declined");
        return Err(RecoveryError::Declined);
    };

    delete_device(client, access_token, &device_id)?;
    info!(device = %device_id, "device removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockTransport;

    const DEVICES: &str = r#"{
        "thisDevice": {"id": 10, "name": "KSTB6077"},
        "smallScreenDevices": [{"id": "20", "name": "Phone"}],
        "stbAndBigScreenDevices": [{"id": 30, "name": "Living room"}]
    }"#;

    #[test]
    fn test_list_devices_in_group_order() {
        let transport = MockTransport::new().on("/v2/home/my-devices", DEVICES);
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        let devices = list_devices(&client, "acc").unwrap();

        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "20", "30"]);
        assert!(devices[0].is_current);
        assert!(!devices[2].is_current);
    }

    #[test]
    fn test_missing_groups_are_tolerated() {
        let transport = MockTransport::new().on("/v2/home/my-devices", r#"{"smallScreenDevices": []}"#);
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        assert!(list_devices(&client, "acc").unwrap().is_empty());
    }

    #[test]
    fn test_recover_deletes_picked_device() {
        let transport = MockTransport::new()
            .on("/v2/home/my-devices", DEVICES)
            .on("/home/deleteDevice", r#"{"success": true}"#);
        let client = ApiClient::new(&transport, "sk".parse().unwrap());

        let mut picker = |devices: &[Device]| devices.last().map(|d| d.id.clone());
        recover(&client, "acc", &mut picker).unwrap();

        let delete = &transport.requests_to("/home/deleteDevice")[0];
        assert_eq!(delete.query_value("id"), Some("30"));
        assert_eq!(delete.header_value("authorization"), Some("Bearer acc"));
    }

    #[test]
    fn test_recover_declined() {
        let transport = MockTransport::new().on("/v2/home/my-devices", DEVICES);
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        let mut picker = |_: &[Device]| -> Option<String> { None };
        assert!(matches!(
            recover(&client, "acc", &mut picker),
            Err(RecoveryError::Declined)
        ));
        assert!(transport.requests_to("/home/deleteDevice").is_empty());
    }

    #[test]
    fn test_null_groups_and_names() {
        let transport = MockTransport::new().on(
            "/v2/home/my-devices",
            r#"{"thisDevice": null, "smallScreenDevices": [{"id": 20, "name": null}], "stbAndBigScreenDevices": null}"#,
        );
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        let devices = list_devices(&client, "acc").unwrap();
        assert_eq!(
            devices,
            vec![Device {
                id: "20".to_string(),
                name: String::new(),
                is_current: false,
            }]
        );
    }

    #[test]
    fn test_delete_rejected() {
        let transport = MockTransport::new().on(
            "/home/deleteDevice",
            r#"{"success": false, "errorMessage": "cannot remove current device"}"#,
        );
        let client = ApiClient::new(&transport, "sk".parse().unwrap());
        match delete_device(&client, "acc", "10") {
            Err(RecoveryError::Rejected(r)) => assert_eq!(r.message, "cannot remove current device"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
