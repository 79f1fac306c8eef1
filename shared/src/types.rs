use std::fmt;
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};
use crate::protocol::{
    DEFAULT_TTL_WINDOW_SECS, HUE_SERVICE_TYPE, HYPERHDR_SERVICE_TYPE, WLED_SERVICE_TYPE,
};

/// The service or protocol family a discovered entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "hyperhdr")]
    HyperHdrSession,
    #[serde(rename = "wled")]
    Wled,
    #[serde(rename = "hue")]
    PhilipsHue,
    #[serde(rename = "pico")]
    Pico,
    #[serde(rename = "esp32_s2")]
    Esp32S2,
    #[serde(rename = "esp")]
    Esp,
    #[serde(rename = "serial")]
    SerialPort,
    /// Sentinel, never carried by a real sighting.
    #[serde(rename = "unknown")]
    Unknown,
}

impl ServiceCategory {
    /// Every concrete category, in the order used for grouped listings.
    pub const ALL: [ServiceCategory; 7] = [
        ServiceCategory::HyperHdrSession,
        ServiceCategory::Wled,
        ServiceCategory::PhilipsHue,
        ServiceCategory::Pico,
        ServiceCategory::Esp32S2,
        ServiceCategory::Esp,
        ServiceCategory::SerialPort,
    ];

    /// The category whose scan trigger refreshes entries of this category.
    /// Boards found by serial enumeration all share the SerialPort trigger.
    pub fn scan_category(self) -> Option<ServiceCategory> {
        match self {
            ServiceCategory::HyperHdrSession
            | ServiceCategory::Wled
            | ServiceCategory::PhilipsHue => Some(self),
            ServiceCategory::Pico
            | ServiceCategory::Esp32S2
            | ServiceCategory::Esp
            | ServiceCategory::SerialPort => Some(ServiceCategory::SerialPort),
            ServiceCategory::Unknown => None,
        }
    }

    /// mDNS service type for announce-based categories.
    pub fn mdns_service_type(self) -> Option<&'static str> {
        match self {
            ServiceCategory::HyperHdrSession => Some(HYPERHDR_SERVICE_TYPE),
            ServiceCategory::Wled => Some(WLED_SERVICE_TYPE),
            ServiceCategory::PhilipsHue => Some(HUE_SERVICE_TYPE),
            _ => None,
        }
    }

    /// Reverse of [`ServiceCategory::mdns_service_type`].
    pub fn from_mdns_service_type(service_type: &str) -> ServiceCategory {
        ServiceCategory::ALL
            .into_iter()
            .find(|c| c.mdns_service_type() == Some(service_type))
            .unwrap_or(ServiceCategory::Unknown)
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceCategory::HyperHdrSession => "HyperHDR",
            ServiceCategory::Wled => "WLED",
            ServiceCategory::PhilipsHue => "Philips Hue",
            ServiceCategory::Pico => "Raspberry Pi Pico",
            ServiceCategory::Esp32S2 => "ESP32-S2",
            ServiceCategory::Esp => "ESP",
            ServiceCategory::SerialPort => "Serial port",
            ServiceCategory::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// One observation of a device or service.
///
/// Two records describe the same entry when category, address and port
/// match. Host name, liveness flag and expiry are not part of identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub category: ServiceCategory,

    /// IP address for network services, device path for serial boards
    pub address: String,

    /// Service port, 0 for serial boards
    pub port: u16,

    /// Host name as announced, e.g. "wled-kitchen"
    pub host_name: String,

    /// false marks a deregistration
    pub exists: bool,

    /// Deadline after which an unrefreshed entry is dropped
    pub expiry: DateTime<Utc>,
}

impl DiscoveryRecord {
    /// A sighting, live for the default TTL window.
    pub fn new(
        category: ServiceCategory,
        address: impl Into<String>,
        port: u16,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            category,
            address: address.into(),
            port,
            host_name: host_name.into(),
            exists: true,
            expiry: Utc::now() + default_ttl_window(),
        }
    }

    /// A deregistration of a previously announced entry.
    pub fn deregistration(
        category: ServiceCategory,
        address: impl Into<String>,
        port: u16,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            exists: false,
            ..Self::new(category, address, port, host_name)
        }
    }

    /// Display name, e.g. "WLED (wled-kitchen)".
    pub fn name(&self) -> String {
        if self.host_name.is_empty() {
            self.category.to_string()
        } else {
            format!("{} ({})", self.category, self.host_name)
        }
    }

    pub fn reset_ttl(&mut self, window: Duration) {
        self.reset_ttl_at(Utc::now(), window);
    }

    pub fn reset_ttl_at(&mut self, now: DateTime<Utc>, window: Duration) {
        self.expiry = now + window;
    }

    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }
}

impl PartialEq for DiscoveryRecord {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category
            && self.address == other.address
            && self.port == other.port
    }
}

impl Eq for DiscoveryRecord {}

pub fn default_ttl_window() -> Duration {
    Duration::seconds(DEFAULT_TTL_WINDOW_SECS as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_host_and_liveness() {
        let a = DiscoveryRecord::new(ServiceCategory::Wled, "10.0.0.5", 80, "kitchen");
        let mut b = DiscoveryRecord::deregistration(ServiceCategory::Wled, "10.0.0.5", 80, "desk");
        b.expiry = a.expiry + Duration::seconds(600);

        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_uses_category_address_port() {
        let a = DiscoveryRecord::new(ServiceCategory::Wled, "10.0.0.5", 80, "kitchen");

        assert_ne!(a, DiscoveryRecord::new(ServiceCategory::PhilipsHue, "10.0.0.5", 80, "kitchen"));
        assert_ne!(a, DiscoveryRecord::new(ServiceCategory::Wled, "10.0.0.6", 80, "kitchen"));
        assert_ne!(a, DiscoveryRecord::new(ServiceCategory::Wled, "10.0.0.5", 81, "kitchen"));
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = Utc::now();
        let mut record = DiscoveryRecord::new(ServiceCategory::Wled, "10.0.0.5", 80, "kitchen");
        record.reset_ttl_at(now, Duration::seconds(30));

        assert!(!record.expired_at(now + Duration::seconds(30)));
        assert!(record.expired_at(now + Duration::seconds(31)));
    }

    #[test]
    fn test_name_falls_back_to_category() {
        let named = DiscoveryRecord::new(ServiceCategory::Wled, "10.0.0.5", 80, "kitchen");
        let anonymous = DiscoveryRecord::new(ServiceCategory::SerialPort, "/dev/ttyUSB0", 0, "");

        assert_eq!(named.name(), "WLED (kitchen)");
        assert_eq!(anonymous.name(), "Serial port");
    }

    #[test]
    fn test_scan_category_groups_serial_boards() {
        assert_eq!(ServiceCategory::Pico.scan_category(), Some(ServiceCategory::SerialPort));
        assert_eq!(ServiceCategory::Esp.scan_category(), Some(ServiceCategory::SerialPort));
        assert_eq!(ServiceCategory::Wled.scan_category(), Some(ServiceCategory::Wled));
        assert_eq!(ServiceCategory::Unknown.scan_category(), None);
    }

    #[test]
    fn test_mdns_service_type_lookup() {
        assert_eq!(
            ServiceCategory::from_mdns_service_type(WLED_SERVICE_TYPE),
            ServiceCategory::Wled
        );
        assert_eq!(
            ServiceCategory::from_mdns_service_type("_printer._tcp.local."),
            ServiceCategory::Unknown
        );
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&ServiceCategory::Esp32S2).unwrap();
        assert_eq!(json, "\"esp32_s2\"");
    }
}
