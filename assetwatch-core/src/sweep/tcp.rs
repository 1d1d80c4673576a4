//! Sweep using plain TCP connects. No external binary required.

use super::{BulkSweep, SweptHost};
use crate::error::SweepError;
use crate::probe::Prober;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ipnet::Ipv4Net;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpSweepConfig {
    pub ports: Vec<u16>,
    pub timeout_ms: u64,
    pub max_concurrent: usize,
}

impl Default for TcpSweepConfig {
    fn default() -> Self {
        Self {
            ports: vec![22, 80, 443, 161, 9100, 8080],
            timeout_ms: 500,
            max_concurrent: 64,
        }
    }
}

pub struct TcpConnectSweep {
    prober: Arc<dyn Prober>,
    config: TcpSweepConfig,
}

impl TcpConnectSweep {
    pub fn new(prober: Arc<dyn Prober>, config: TcpSweepConfig) -> Self {
        Self { prober, config }
    }
}

#[async_trait]
impl BulkSweep for TcpConnectSweep {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn sweep(&self, block: &Ipv4Net) -> Result<Vec<SweptHost>, SweepError> {
        tracing::info!("Scanning {} over TCP", block);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let ports = self.config.ports.as_slice();

        // Hosts are pulled lazily: at most `max_concurrent` are in flight.
        let mut found: Vec<SweptHost> = stream::iter(block.hosts())
            .map(|address| async move {
                let mut alive = false;
                let mut open = BTreeSet::new();
                for &port in ports {
                    let outcome = self.prober.probe(address, port, timeout).await;
                    alive |= outcome.host_alive();
                    if outcome.reachable {
                        open.insert(port);
                    }
                }
                alive.then(|| SweptHost {
                    open_ports: Some(open),
                    ..SweptHost::at(address)
                })
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .filter_map(|host| async move { host })
            .collect()
            .await;

        found.sort_by_key(|h| h.address);
        tracing::info!("TCP sweep of {} complete: {} hosts alive", block, found.len());
        Ok(found)
    }
}
