//! The discovery collaborator contract (spec §1, §6): mDNS/Zeroconf scanning itself
//! is out of scope, but the record shape a discovery module is expected to hand the
//! connection controller is part of the public surface, so it's defined here.

use std::collections::HashMap;

/// One device found by an external discovery mechanism. The connection controller
/// only consumes `host`/`port` (and optionally `attributes` for a friendly name);
/// `device_id` is opaque to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub attributes: HashMap<String, String>,
}

impl DiscoveredDevice {
    pub fn new(device_id: impl Into<String>, host: impl Into<String>, port: u16) -> DiscoveredDevice {
        DiscoveredDevice {
            device_id: device_id.into(),
            host: host.into(),
            port,
            attributes: HashMap::new(),
        }
    }

    /// The `fn` TXT-record attribute most Cast devices advertise as their friendly
    /// name, if present.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("fn").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_name_reads_the_fn_attribute() {
        let mut device = DiscoveredDevice::new("abc123", "192.168.1.2", 8009);
        device.attributes.insert("fn".to_owned(), "Living Room TV".to_owned());
        assert_eq!(device.friendly_name(), Some("Living Room TV"));
    }

    #[test]
    fn friendly_name_is_none_without_the_attribute() {
        let device = DiscoveredDevice::new("abc123", "192.168.1.2", 8009);
        assert_eq!(device.friendly_name(), None);
    }
}
