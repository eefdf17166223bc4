use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::jsonrpc::RpcRequest;

/// JSON-RPC method registering a device with the gateway.
pub const ADD_DEVICE: &str = "add_device";

/// Device type: smart lighting.
pub const DEVICE_TYPE_LIGHTING: &str = "lighting";
/// Device type: smart water heater.
pub const DEVICE_TYPE_HEATER: &str = "heater";

/// Heater operation: switch on.
pub const OP_POWER_ON: &str = "power_on";
/// Heater operation: switch off.
pub const OP_POWER_OFF: &str = "power_off";

/// Description of a simulated device as the gateway expects it in
/// `add_device` params.
///
/// Field names on the wire follow the gateway's vocabulary (`vender`,
/// `uniqid`, `hwversion`, `swversion`, `type`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDescriptor {
    #[serde(rename = "vender")]
    pub vendor: String,
    #[serde(rename = "uniqid")]
    pub unique_id: String,
    #[serde(rename = "hwversion")]
    pub hardware_version: String,
    #[serde(rename = "swversion")]
    pub software_version: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Map<String, Value>>,
}

impl Default for DeviceDescriptor {
    /// The placeholder lighting device announced on every new connection.
    fn default() -> Self {
        Self::lighting("asdfsdaf", "er-fd-ef-gf-cv-df", "asdfasdf", "ffffff")
    }
}

impl DeviceDescriptor {
    /// A lighting device with no operations.
    pub fn lighting(
        vendor: impl Into<String>,
        unique_id: impl Into<String>,
        hardware_version: impl Into<String>,
        software_version: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            unique_id: unique_id.into(),
            hardware_version: hardware_version.into(),
            software_version: software_version.into(),
            device_type: DEVICE_TYPE_LIGHTING.to_string(),
            operations: Vec::new(),
            state: None,
        }
    }

    /// A water heater with power operations and an initial state report.
    pub fn heater(
        vendor: impl Into<String>,
        unique_id: impl Into<String>,
        hardware_version: impl Into<String>,
        software_version: impl Into<String>,
    ) -> Self {
        let mut state = Map::new();
        state.insert("water_temperature".to_string(), Value::from(30));
        state.insert("max_temperature".to_string(), Value::from(75));
        state.insert("power".to_string(), Value::from("on"));
        state.insert("max_power".to_string(), Value::from(1000));

        Self {
            vendor: vendor.into(),
            unique_id: unique_id.into(),
            hardware_version: hardware_version.into(),
            software_version: software_version.into(),
            device_type: DEVICE_TYPE_HEATER.to_string(),
            operations: vec![OP_POWER_ON.to_string(), OP_POWER_OFF.to_string()],
            state: Some(state),
        }
    }

    /// Build the `add_device` request announcing this device.
    pub fn add_device_request(&self, id: u64) -> serde_json::Result<RpcRequest> {
        Ok(RpcRequest::new(ADD_DEVICE, serde_json::to_value(self)?, id))
    }
}
