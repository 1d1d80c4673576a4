//! Outbound events. Topics follow the `domain/subject@vN` contract naming.

use crate::error::EventError;
use crate::model::DeviceId;
use crate::monitor::CheckReport;
use crate::reconcile::ReconcileReport;
use crate::scanner::ScanReport;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use time::OffsetDateTime;

pub const TOPIC_DEVICE_STATUS: &str = "assetwatch/devices/status@v1";
pub const TOPIC_DISCOVERY_COMPLETED: &str = "assetwatch/discovery/completed@v1";

/// Published when a device flips between online and offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusEvent {
    pub device_id: DeviceId,
    pub address: Ipv4Addr,
    pub online: bool,
    pub port: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

impl DeviceStatusEvent {
    pub fn from_report(report: &CheckReport) -> Self {
        let r = &report.result;
        Self {
            device_id: r.device_id,
            address: r.address,
            online: r.reachable,
            port: r.port,
            response_time_ms: r.elapsed_ms,
            error: r.error.clone(),
            checked_at: r.checked_at,
        }
    }
}

/// Published after every sweep and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCompletedEvent {
    pub cidr: Ipv4Net,
    pub hosts_found: usize,
    pub added: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub failed: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl DiscoveryCompletedEvent {
    pub fn new(scan: &ScanReport, reconciled: Option<&ReconcileReport>) -> Self {
        Self {
            cidr: scan.cidr,
            hosts_found: scan.hosts.len(),
            added: reconciled.map_or(0, |r| r.added.len()),
            skipped: reconciled.map_or(0, |r| r.skipped.len()),
            conflicts: reconciled.map_or(0, |r| r.conflicts.len()),
            failed: reconciled.map_or(0, |r| r.failed.len()),
            finished_at: scan.finished_at,
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), EventError>;
}

/// Serializes `event` as JSON and publishes it on `topic`.
pub async fn publish_json<T: Serialize + Sync>(
    sink: &dyn EventSink,
    topic: &str,
    event: &T,
) -> Result<(), EventError> {
    let payload = serde_json::to_string(event)?;
    sink.publish(topic, payload).await
}

/// Sink used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, topic: &str, _payload: String) -> Result<(), EventError> {
        tracing::trace!("event on {} dropped (no broker)", topic);
        Ok(())
    }
}
