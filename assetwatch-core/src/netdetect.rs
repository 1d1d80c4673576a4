//! Local network block detection
//!
//! Picks the IPv4 block of the most likely LAN interface:
//! - Ethernet is preferred over WiFi, WiFi over anything else
//! - loopback and link-local addresses are ignored
//! - blocks wider than /24 are narrowed to the /24 around the interface address

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Widest block the scanner will sweep by itself.
const MAX_AUTO_PREFIX: u8 = 24;

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Other,
    Loopback,
}

/// An IPv4-bearing interface considered for detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceCandidate {
    pub name: String,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub interface_type: InterfaceType,
}

impl InterfaceCandidate {
    pub fn new(name: &str, address: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            name: name.to_string(),
            address,
            prefix_len,
            interface_type: classify_interface(name),
        }
    }

    fn usable(&self) -> bool {
        self.interface_type != InterfaceType::Loopback
            && !self.address.is_loopback()
            && !self.address.is_link_local()
            && !self.address.is_unspecified()
    }

    /// The block to sweep for this interface.
    pub fn block(&self) -> Option<Ipv4Net> {
        let prefix = self.prefix_len.max(MAX_AUTO_PREFIX);
        Ipv4Net::new(self.address, prefix).ok().map(|n| n.trunc())
    }
}

/// Classify interface type based on name patterns
pub fn classify_interface(name: &str) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if name_lower == "lo" || name_lower.starts_with("lo0") || name_lower.starts_with("loopback") {
        return InterfaceType::Loopback;
    }

    if name_lower.contains("wlan")
        || name_lower.contains("wifi")
        || name_lower.contains("wi-fi")
        || name_lower.starts_with("wlp")
        || name_lower.starts_with("wlo")
    {
        return InterfaceType::Wireless;
    }

    if name_lower.starts_with("eth")
        || name_lower.starts_with("en")
        || name_lower.contains("ethernet")
    {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// Chooses the best candidate block, or `None` if no interface qualifies.
pub fn select_block(candidates: &[InterfaceCandidate]) -> Option<Ipv4Net> {
    let best = candidates
        .iter()
        .filter(|c| c.usable())
        .min_by_key(|c| c.interface_type)?;
    debug!(
        "Selected {:?} interface {} ({}/{})",
        best.interface_type, best.name, best.address, best.prefix_len
    );
    best.block()
}

/// Enumerates the host's interfaces and returns the detected LAN block.
///
/// Failures are logged and reported as `None`; deciding on a fallback is the
/// caller's job.
pub fn detect_local_block() -> Option<Ipv4Net> {
    let interfaces = match get_if_addrs() {
        Ok(list) => list,
        Err(e) => {
            warn!("Failed to enumerate network interfaces: {}", e);
            return None;
        }
    };

    let candidates: Vec<InterfaceCandidate> = interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match &iface.addr {
            IfAddr::V4(v4) => {
                let prefix = u32::from(v4.netmask).leading_ones() as u8;
                Some(InterfaceCandidate::new(&iface.name, v4.ip, prefix))
            }
            IfAddr::V6(_) => None,
        })
        .collect();

    let block = select_block(&candidates);
    match block {
        Some(net) => info!("Detected local network {} from {} interfaces", net, candidates.len()),
        None => warn!("No usable IPv4 interface among {} candidates", candidates.len()),
    }
    block
}
