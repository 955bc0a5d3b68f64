//! Discovered LED controllers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A controller seen during a scan. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub display_name: String,
    /// Transport address (MAC, serial port path, ...).
    pub address: String,
    /// Feature tags advertised by the controller, e.g. `"rgb"`, `"effects"`, `"music"`.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default = "default_connectable")]
    pub is_connectable: bool,
}

fn default_connectable() -> bool {
    true
}

impl Device {
    pub fn new(id: &str, display_name: &str, address: &str) -> Self {
        Device {
            id: id.to_string(),
            display_name: display_name.to_string(),
            address: address.to_string(),
            capabilities: BTreeSet::new(),
            is_connectable: true,
        }
    }

    /// Placeholder for a connect by id that no scan has reported.
    pub fn unscanned(id: &str) -> Self {
        Device::new(id, id, id)
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.capabilities.contains(cap)
    }
}

/// Devices found during the current scan session, in discovery order.
#[derive(Debug, Default, Clone)]
pub struct DeviceList {
    devices: Vec<Device>,
}

impl DeviceList {
    /// Record a discovery. Returns `false` if the id was already known (the
    /// stored entry is refreshed with the new data).
    pub fn upsert(&mut self, device: Device) -> bool {
        match self.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => {
                *existing = device;
                false
            }
            None => {
                self.devices.push(device);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn to_vec(&self) -> Vec<Device> {
        self.devices.clone()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_serializes_capabilities_sorted() {
        let d = Device::new("mock-device-1", "SmartLED Pro", "AA:BB")
            .with_capabilities(["rgb", "effects", "brightness"]);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains(r#""capabilities":["brightness","effects","rgb"]"#));
        assert!(d.has_capability("rgb"));
        assert!(!d.has_capability("music"));
    }

    #[test]
    fn device_deserializes_with_defaults() {
        let d: Device =
            serde_json::from_str(r#"{"id":"x","display_name":"X","address":"1"}"#).unwrap();
        assert!(d.is_connectable);
        assert!(d.capabilities.is_empty());
    }

    #[test]
    fn upsert_deduplicates_by_id() {
        let mut list = DeviceList::default();
        assert!(list.upsert(Device::new("a", "A", "1")));
        assert!(list.upsert(Device::new("b", "B", "2")));
        assert!(!list.upsert(Device::new("a", "A renamed", "1")));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get("a").unwrap().display_name, "A renamed");
        assert_eq!(list.to_vec()[0].id, "a", "discovery order preserved");
    }

    #[test]
    fn clear_empties_list() {
        let mut list = DeviceList::default();
        list.upsert(Device::new("a", "A", "1"));
        list.clear();
        assert!(list.is_empty());
        assert!(list.get("a").is_none());
    }
}
