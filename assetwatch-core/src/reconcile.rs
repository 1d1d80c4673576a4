//! Reconciliation of discovered hosts against the registered inventory.
//!
//! A host is already known when its address is claimed; failing that, when
//! its hardware address is. Hosts matching two different devices by the two
//! keys are flagged as conflicts and left alone. Everything else is inserted
//! in one bulk call, so running the same batch twice adds nothing the second
//! time.

use crate::error::{ClaimKey, StoreError};
use crate::model::{DeviceId, DiscoveredHost, HardwareAddress, NewDevice, RegisteredDevice};
use crate::store::InventoryStore;
use serde::Serialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{error, info, warn};

/// Why a discovered host was not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An existing device claims this key.
    Known(ClaimKey),
    /// An earlier host of the same batch already claims this key.
    DuplicateInBatch(ClaimKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedHost {
    pub address: Ipv4Addr,
    pub reason: SkipReason,
    pub existing: Option<DeviceId>,
}

/// Host whose address and hardware address point at two different devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileConflict {
    pub address: Ipv4Addr,
    pub hardware_address: HardwareAddress,
    pub address_owner: DeviceId,
    pub hardware_owner: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedHost {
    pub address: Ipv4Addr,
    pub error: String,
}

/// Partition of a batch before anything is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub new: Vec<DiscoveredHost>,
    pub skipped: Vec<SkippedHost>,
    pub conflicts: Vec<ReconcileConflict>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<RegisteredDevice>,
    pub skipped: Vec<SkippedHost>,
    pub conflicts: Vec<ReconcileConflict>,
    pub failed: Vec<FailedHost>,
}

/// Classifies every host of the batch as new, known or conflicting.
pub fn plan(hosts: &[DiscoveredHost], store: &dyn InventoryStore) -> Result<ReconcilePlan, StoreError> {
    let mut plan = ReconcilePlan::default();
    let mut batch_addresses = HashSet::new();
    let mut batch_macs = HashSet::new();

    for host in hosts {
        let by_address = store.device_by_address(host.address)?;
        let by_mac = match &host.hardware_address {
            Some(mac) => store.device_by_hardware_address(mac)?,
            None => None,
        };

        match (by_address, by_mac) {
            (Some(a), Some(m)) if a.id != m.id => {
                if let Some(mac) = host.hardware_address {
                    warn!(
                        "{} is claimed by device {} but its hardware address {} by device {}",
                        host.address, a.id, mac, m.id
                    );
                    plan.conflicts.push(ReconcileConflict {
                        address: host.address,
                        hardware_address: mac,
                        address_owner: a.id,
                        hardware_owner: m.id,
                    });
                }
            }
            (Some(a), _) => plan.skipped.push(SkippedHost {
                address: host.address,
                reason: SkipReason::Known(ClaimKey::Address),
                existing: Some(a.id),
            }),
            (None, Some(m)) => plan.skipped.push(SkippedHost {
                address: host.address,
                reason: SkipReason::Known(ClaimKey::HardwareAddress),
                existing: Some(m.id),
            }),
            (None, None) => {
                if !batch_addresses.insert(host.address) {
                    plan.skipped.push(SkippedHost {
                        address: host.address,
                        reason: SkipReason::DuplicateInBatch(ClaimKey::Address),
                        existing: None,
                    });
                    continue;
                }
                if let Some(mac) = host.hardware_address {
                    if !batch_macs.insert(mac) {
                        plan.skipped.push(SkippedHost {
                            address: host.address,
                            reason: SkipReason::DuplicateInBatch(ClaimKey::HardwareAddress),
                            existing: None,
                        });
                        continue;
                    }
                }
                plan.new.push(host.clone());
            }
        }
    }
    Ok(plan)
}

/// Registers the new hosts of a batch in a single bulk insert.
///
/// Partial failures are reported per host; hosts already inserted stay.
pub fn reconcile(hosts: &[DiscoveredHost], store: &dyn InventoryStore) -> Result<ReconcileReport, StoreError> {
    let ReconcilePlan { new, skipped, conflicts } = plan(hosts, store)?;

    let batch: Vec<NewDevice> = new.iter().map(NewDevice::from_discovered).collect();
    let results = if batch.is_empty() {
        Vec::new()
    } else {
        store.insert_devices(batch)
    };

    let mut report = ReconcileReport {
        skipped,
        conflicts,
        ..Default::default()
    };
    for (host, result) in new.iter().zip(results) {
        match result {
            Ok(device) => report.added.push(device),
            Err(e) => {
                error!("failed to register {}: {}", host.address, e);
                report.failed.push(FailedHost {
                    address: host.address,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "reconciled {} hosts: {} added, {} skipped, {} conflicts, {} failed",
        hosts.len(),
        report.added.len(),
        report.skipped.len(),
        report.conflicts.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceStatus, DeviceType, DiscoverySource};
    use crate::store::MemoryInventory;
    use time::OffsetDateTime;

    fn host(address: &str, mac: Option<&str>) -> DiscoveredHost {
        DiscoveredHost {
            address: address.parse().unwrap(),
            hardware_address: mac.map(|m| m.parse().unwrap()),
            vendor: None,
            resolved_name: None,
            device_type: DeviceType::Unknown,
            display_name: format!("Unknown device ({address})"),
            discovered_at: OffsetDateTime::now_utc(),
        }
    }

    fn register(store: &MemoryInventory, address: Option<&str>, mac: Option<&str>) -> RegisteredDevice {
        store
            .insert_device(NewDevice {
                name: "existing".into(),
                address: address.map(|a| a.parse().unwrap()),
                hardware_address: mac.map(|m| m.parse().unwrap()),
                vendor: None,
                model: None,
                device_type: DeviceType::Printer,
                status: DeviceStatus::Active,
                notes: String::new(),
                source: DiscoverySource::Manual,
            })
            .unwrap()
    }

    #[test]
    fn test_known_address_is_skipped() {
        let store = MemoryInventory::new();
        let existing = register(&store, Some("10.0.0.5"), None);
        let report = reconcile(&[host("10.0.0.5", None)], &store).unwrap();
        assert_eq!(report.added.len(), 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].existing, Some(existing.id));
        assert_eq!(report.skipped[0].reason, SkipReason::Known(ClaimKey::Address));
    }

    #[test]
    fn test_known_mac_matches_when_address_moved() {
        let store = MemoryInventory::new();
        register(&store, Some("10.0.0.5"), Some("00:01:e6:aa:bb:cc"));
        let report = reconcile(&[host("10.0.0.77", Some("00:01:E6:AA:BB:CC"))], &store).unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.skipped[0].reason, SkipReason::Known(ClaimKey::HardwareAddress));
    }

    #[test]
    fn test_split_claim_is_a_conflict() {
        let store = MemoryInventory::new();
        let a = register(&store, Some("10.0.0.5"), None);
        let b = register(&store, Some("10.0.0.6"), Some("00:01:e6:aa:bb:cc"));
        let report = reconcile(&[host("10.0.0.5", Some("00:01:e6:aa:bb:cc"))], &store).unwrap();
        assert!(report.added.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].address_owner, a.id);
        assert_eq!(report.conflicts[0].hardware_owner, b.id);
    }

    #[test]
    fn test_batch_duplicates_are_skipped() {
        let store = MemoryInventory::new();
        let report = reconcile(
            &[
                host("10.0.0.1", Some("00:01:e6:00:00:01")),
                host("10.0.0.1", None),
                host("10.0.0.2", Some("00:01:e6:00:00:01")),
            ],
            &store,
        )
        .unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let store = MemoryInventory::new();
        let batch = vec![host("10.0.0.1", None), host("10.0.0.2", Some("00:0b:82:00:00:02"))];
        let first = reconcile(&batch, &store).unwrap();
        assert_eq!(first.added.len(), 2);
        assert!(first.added.iter().all(|d| d.source == DiscoverySource::Scanner));
        let second = reconcile(&batch, &store).unwrap();
        assert!(second.added.is_empty());
        assert_eq!(second.skipped.len(), 2);
    }
}
