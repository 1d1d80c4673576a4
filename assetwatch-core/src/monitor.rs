//! Reachability monitor.
//!
//! Each device is probed on its primary port, then on every fallback port in
//! order, stopping at the first success. Batches fan out up to a fixed
//! concurrency and every finished check is persisted inside its own task, so
//! dropping a batch midway keeps whatever already completed.

use crate::error::MonitorError;
use crate::model::{DeviceCurrentStatus, DeviceId, DeviceStatus, DeviceType, ReachabilityCheck, RegisteredDevice};
use crate::probe::Prober;
use crate::status::StatusWriter;
use crate::store::{self, InventoryStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Ordered ports tried against every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortPolicy {
    /// Port of the device's main service (raw printing by default).
    pub primary_port: u16,
    pub fallback_ports: Vec<u16>,
    pub primary_timeout_ms: u64,
    pub fallback_timeout_ms: u64,
}

impl Default for PortPolicy {
    fn default() -> Self {
        Self {
            primary_port: 9100,
            fallback_ports: vec![515, 631, 80, 443, 8080],
            primary_timeout_ms: 2000,
            fallback_timeout_ms: 1000,
        }
    }
}

impl PortPolicy {
    /// Primary first, then fallbacks in order, without repeats.
    pub fn attempts(&self) -> Vec<(u16, Duration)> {
        let mut out = vec![(self.primary_port, Duration::from_millis(self.primary_timeout_ms))];
        for &port in &self.fallback_ports {
            if out.iter().all(|(p, _)| *p != port) {
                out.push((port, Duration::from_millis(self.fallback_timeout_ms)));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Maximum devices probed at the same time.
    pub concurrency: usize,
    pub ports: PortPolicy,
    pub uptime_window_hours: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            ports: PortPolicy::default(),
            uptime_window_hours: 24,
        }
    }
}

/// Outcome of probing one device, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReachabilityCheckResult {
    pub device_id: DeviceId,
    pub address: Ipv4Addr,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub reachable: bool,
    /// Port that answered.
    pub port: Option<u16>,
    /// Time from the primary attempt to the first success.
    pub elapsed_ms: Option<f64>,
    pub error: Option<String>,
    /// The device answered, but not on the primary port.
    pub fallback_used: bool,
    pub attempts: usize,
}

impl ReachabilityCheckResult {
    pub fn to_check(&self) -> ReachabilityCheck {
        ReachabilityCheck {
            id: Uuid::new_v4(),
            device_id: self.device_id,
            checked_at: self.checked_at,
            reachable: self.reachable,
            response_time_ms: self.elapsed_ms,
            port: self.port,
            failure_reason: self.error.clone(),
        }
    }
}

/// A check result plus what happened when it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub result: ReachabilityCheckResult,
    pub status: Option<DeviceCurrentStatus>,
    /// The device flipped between online and offline with this check.
    pub transitioned: bool,
    /// Set when the check could not be persisted.
    pub persist_error: Option<String>,
}

pub struct ReachabilityMonitor {
    store: Arc<dyn InventoryStore>,
    prober: Arc<dyn Prober>,
    writer: StatusWriter,
    config: MonitorConfig,
}

impl ReachabilityMonitor {
    pub fn new(store: Arc<dyn InventoryStore>, prober: Arc<dyn Prober>, config: MonitorConfig) -> Self {
        let window = time::Duration::hours(i64::from(config.uptime_window_hours));
        Self {
            store,
            prober,
            writer: StatusWriter::new(window),
            config,
        }
    }

    /// Probes one device through the port policy. Does not persist anything.
    pub async fn check_device(&self, device: &RegisteredDevice) -> Result<ReachabilityCheckResult, MonitorError> {
        let address = device.address.ok_or(MonitorError::NoAddress(device.id))?;
        let checked_at = OffsetDateTime::now_utc();
        let started = Instant::now();
        let mut failures = Vec::new();

        for (index, (port, timeout)) in self.config.ports.attempts().into_iter().enumerate() {
            let outcome = self.prober.probe(address, port, timeout).await;
            if outcome.reachable {
                debug!("device {} ({}) answered on port {}", device.id, address, port);
                return Ok(ReachabilityCheckResult {
                    device_id: device.id,
                    address,
                    checked_at,
                    reachable: true,
                    port: Some(port),
                    elapsed_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
                    error: None,
                    fallback_used: index > 0,
                    attempts: index + 1,
                });
            }
            let reason = outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no answer".to_string());
            failures.push(format!("{port}: {reason}"));
        }

        Ok(ReachabilityCheckResult {
            device_id: device.id,
            address,
            checked_at,
            reachable: false,
            port: None,
            elapsed_ms: None,
            error: Some(format!("all ports failed ({})", failures.join(", "))),
            fallback_used: false,
            attempts: failures.len(),
        })
    }

    /// Persists a result and folds it into the device's current status.
    pub fn record(&self, result: ReachabilityCheckResult) -> CheckReport {
        let check = result.to_check();
        match self.writer.apply(self.store.as_ref(), &check, result.fallback_used) {
            Ok(change) => {
                let transitioned = change.transitioned();
                if transitioned {
                    info!(
                        "device {} ({}) is now {}",
                        result.device_id,
                        result.address,
                        if change.status.online { "online" } else { "offline" }
                    );
                }
                CheckReport {
                    result,
                    status: Some(change.status),
                    transitioned,
                    persist_error: None,
                }
            }
            Err(e) => {
                error!("failed to record check for device {}: {}", result.device_id, e);
                CheckReport {
                    result,
                    status: None,
                    transitioned: false,
                    persist_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Probes and records one device.
    pub async fn check_and_record(&self, device: &RegisteredDevice) -> Result<CheckReport, MonitorError> {
        let result = self.check_device(device).await?;
        Ok(self.record(result))
    }

    /// Manual single-device check, through the same path as batch checks.
    pub async fn check_device_by_id(&self, id: DeviceId) -> Result<CheckReport, MonitorError> {
        let device = self.store.device(id)?.ok_or(MonitorError::UnknownDevice(id))?;
        let report = self.check_and_record(&device).await?;
        self.flush().await;
        Ok(report)
    }

    /// Checks every device that has an address, at most `concurrency` at a
    /// time. Reports come back in device id order.
    pub async fn check_all(&self, devices: &[RegisteredDevice]) -> Vec<CheckReport> {
        let targets: Vec<&RegisteredDevice> = devices.iter().filter(|d| d.address.is_some()).collect();
        let limit = self.config.concurrency.max(1);
        debug!("checking {} devices, {} at a time", targets.len(), limit);

        let mut reports: Vec<CheckReport> = stream::iter(targets.into_iter().map(|device| self.check_and_record(device)).collect::<Vec<_>>())
            .buffer_unordered(limit)
            .filter_map(|r| async move { r.ok() })
            .collect()
            .await;

        reports.sort_by_key(|r| r.result.device_id);
        self.flush().await;
        reports
    }

    /// Checks the registered inventory, skipping decommissioned devices.
    /// An empty `device_types` checks every type.
    pub async fn check_inventory(&self, device_types: &[DeviceType]) -> Result<Vec<CheckReport>, MonitorError> {
        let devices: Vec<RegisteredDevice> = self
            .store
            .devices()?
            .into_iter()
            .filter(|d| d.status != DeviceStatus::Decommissioned)
            .filter(|d| device_types.is_empty() || device_types.contains(&d.device_type))
            .collect();

        let reports = self.check_all(&devices).await;
        let online = reports.iter().filter(|r| r.result.reachable).count();
        info!(
            "reachability run complete: {}/{} online, {} failed to persist",
            online,
            reports.len(),
            reports.iter().filter(|r| r.persist_error.is_some()).count()
        );
        Ok(reports)
    }

    /// Writes the deferred history and statuses off the async workers.
    async fn flush(&self) {
        if let Err(e) = store::blocking(&self.store, |s| s.flush()).await {
            error!("failed to flush inventory: {}", e);
        }
    }
}
