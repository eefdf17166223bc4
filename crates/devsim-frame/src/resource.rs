//! Well-known resource identifiers.
//!
//! The gateway addresses requests to the simulator on [`CONTROL`]; the
//! simulator manages its device list on [`DEVICE`].

/// Device registration and state reporting (simulator → gateway).
pub const DEVICE: &str = "device";

/// Gateway-initiated control requests (gateway → simulator).
pub const CONTROL: &str = "control";

/// Returns true if the resource is one of the built-in resources.
pub fn is_builtin(resource: &str) -> bool {
    matches!(resource, DEVICE | CONTROL)
}
