//! Bulk sweep capabilities.
//!
//! A sweep takes a CIDR block and reports every responsive host with whatever
//! evidence the mechanism can obtain. `Ok(vec![])` means the sweep ran and
//! found nothing; `Err` means the mechanism itself is broken.

mod nmap;
mod tcp;

pub use nmap::{parse_nmap_xml, NmapSweep, NmapSweepConfig};
pub use tcp::{TcpConnectSweep, TcpSweepConfig};

use crate::error::SweepError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// One responsive host as reported by the sweep mechanism, before any
/// normalization or classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweptHost {
    pub address: Option<Ipv4Addr>,
    /// Raw hardware address text, validated later by the scanner.
    pub hardware_address: Option<String>,
    pub vendor: Option<String>,
    pub hostname: Option<String>,
    /// `None` when the mechanism did not look at ports.
    pub open_ports: Option<BTreeSet<u16>>,
}

impl SweptHost {
    pub fn at(address: Ipv4Addr) -> Self {
        Self {
            address: Some(address),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait BulkSweep: Send + Sync {
    /// Short mechanism name for logs and reports.
    fn name(&self) -> &'static str;

    async fn sweep(&self, block: &Ipv4Net) -> Result<Vec<SweptHost>, SweepError>;
}
