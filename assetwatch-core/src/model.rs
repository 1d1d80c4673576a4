//! Inventory data model shared by every component of the core.

use crate::error::InputError;
use ipnet::Ipv4Net;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Store-assigned identity of a registered device.
///
/// Ids grow monotonically, so "device-identity order" is numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placeholder values some sweep tools emit instead of leaving a field empty.
const SENTINELS: &[&str] = &["", "unknown", "n/a", "none", "-", "не определен"];

/// Returns true when a free-text evidence value is one of the "nothing here" sentinels.
pub fn is_sentinel(value: &str) -> bool {
    let v = value.trim();
    SENTINELS.iter().any(|s| v.eq_ignore_ascii_case(s))
}

/// Normalizes optional free-text evidence: trims it and maps sentinels to `None`.
pub fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !is_sentinel(v))
        .map(str::to_string)
}

/// A 48-bit hardware (MAC) address, rendered as `xx:xx:xx:xx:xx:xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareAddress([u8; 6]);

impl HardwareAddress {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Organizationally Unique Identifier: the first three octets.
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// Parses evidence coming from a sweep, treating sentinels and the
    /// all-zero address as "no hardware address".
    pub fn from_evidence(raw: &str) -> Result<Option<Self>, InputError> {
        if is_sentinel(raw) {
            return Ok(None);
        }
        let mac: HardwareAddress = raw.parse()?;
        if mac.0 == [0u8; 6] {
            return Ok(None);
        }
        Ok(Some(mac))
    }
}

impl FromStr for HardwareAddress {
    type Err = InputError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`, `aabb.ccdd.eeff`,
    /// bare `aabbccddeeff`, and single-digit groups such as `0:1:e6:aa:bb:cc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InputError::InvalidHardwareAddress(s.to_string());
        let trimmed = s.trim();
        let mut out = [0u8; 6];

        let groups: Vec<&str> = trimmed.split(|c| c == ':' || c == '-').collect();
        if groups.len() == 6 {
            for (slot, group) in out.iter_mut().zip(&groups) {
                if group.is_empty() || group.len() > 2 {
                    return Err(invalid());
                }
                *slot = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
            }
            return Ok(Self(out));
        }

        let hex: String = trimmed.chars().filter(|c| *c != '.').collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for HardwareAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HardwareAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a dotted-quad IPv4 address, rejecting anything else.
pub fn parse_address(raw: &str) -> Result<Ipv4Addr, InputError> {
    raw.trim()
        .parse()
        .map_err(|_| InputError::InvalidAddress(raw.to_string()))
}

/// Parses a CIDR block such as `192.168.1.0/24`. Host bits are cleared.
pub fn parse_cidr(raw: &str) -> Result<Ipv4Net, InputError> {
    let trimmed = raw.trim();
    if !trimmed.contains('/') {
        return Err(InputError::InvalidCidr {
            input: raw.to_string(),
            reason: "missing prefix length".into(),
        });
    }
    trimmed
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|e| InputError::InvalidCidr {
            input: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Device category inferred by the classifier or set by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Workstation,
    NetworkDevice,
    Printer,
    VoipPhone,
    Camera,
    Mobile,
    Iot,
    WebExposedDevice,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Workstation => "workstation",
            DeviceType::NetworkDevice => "network-device",
            DeviceType::Printer => "printer",
            DeviceType::VoipPhone => "voip-phone",
            DeviceType::Camera => "camera",
            DeviceType::Mobile => "mobile",
            DeviceType::Iot => "iot",
            DeviceType::WebExposedDevice => "web-exposed-device",
            DeviceType::Unknown => "unknown",
        }
    }

    /// Human-facing role used in generated display names.
    pub fn role(&self) -> &'static str {
        match self {
            DeviceType::Workstation => "Workstation",
            DeviceType::NetworkDevice => "Network device",
            DeviceType::Printer => "Printer",
            DeviceType::VoipPhone => "IP phone",
            DeviceType::Camera => "Camera",
            DeviceType::Mobile => "Mobile device",
            DeviceType::Iot => "IoT device",
            DeviceType::WebExposedDevice => "Web-exposed device",
            DeviceType::Unknown => "Unknown device",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live host found by one sweep. Lives only for the scan's working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredHost {
    pub address: Ipv4Addr,
    pub hardware_address: Option<HardwareAddress>,
    pub vendor: Option<String>,
    pub resolved_name: Option<String>,
    pub device_type: DeviceType,
    pub display_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub discovered_at: OffsetDateTime,
}

/// Lifecycle status of an inventory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Active,
    Backup,
    UnderRepair,
    Decommissioned,
}

/// Where an inventory entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Scanner,
    #[default]
    Manual,
}

/// A device owned by the persisted inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: DeviceId,
    pub name: String,
    pub address: Option<Ipv4Addr>,
    pub hardware_address: Option<HardwareAddress>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub notes: String,
    pub source: DiscoverySource,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Fields for registering a device; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewDevice {
    pub name: String,
    #[serde(default)]
    pub address: Option<Ipv4Addr>,
    #[serde(default)]
    pub hardware_address: Option<HardwareAddress>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub device_type: DeviceType,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub source: DiscoverySource,
}

impl NewDevice {
    /// Registration record for a host found by the scanner.
    pub fn from_discovered(host: &DiscoveredHost) -> Self {
        Self {
            name: host.display_name.clone(),
            address: Some(host.address),
            hardware_address: host.hardware_address,
            vendor: host.vendor.clone(),
            model: None,
            device_type: host.device_type,
            status: DeviceStatus::Active,
            notes: String::new(),
            source: DiscoverySource::Scanner,
        }
    }
}

/// Partial edit of a registered device. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<Ipv4Addr>,
    #[serde(default)]
    pub hardware_address: Option<HardwareAddress>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One immutable row of the reachability time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachabilityCheck {
    pub id: Uuid,
    pub device_id: DeviceId,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub reachable: bool,
    /// Absent when the device was unreachable.
    pub response_time_ms: Option<f64>,
    /// Port that answered, if any.
    pub port: Option<u16>,
    pub failure_reason: Option<String>,
}

/// Latest-known state of one monitored device, folded from its checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCurrentStatus {
    pub device_id: DeviceId,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// Timestamp of the check currently reflected by `online`.
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked_at: OffsetDateTime,
    pub online: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub response_time_ms: Option<f64>,
    pub uptime_24h: f64,
    pub has_error: bool,
    pub has_warning: bool,
    pub last_error: Option<String>,
}

/// An address block tracked for occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: u64,
    pub cidr: Ipv4Net,
    pub purpose: String,
    pub vlan_id: Option<u16>,
    pub location: Option<String>,
}

/// Fields for registering a subnet; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSubnet {
    pub cidr: Ipv4Net,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub location: Option<String>,
}
