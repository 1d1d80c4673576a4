/**
 * MEMORY INVENTORY - Stockage en mémoire avec snapshot JSON
 *
 * FONCTIONNEMENT :
 * - Toutes les données vivent dans un RwLock (lectures concurrentes)
 * - Index secondaires adresse -> id et MAC -> id pour l'unicité
 * - Les mutations d'appareils et de sous-réseaux sont sauvegardées tout de suite
 * - L'historique et les statuts sont marqués "dirty" et sauvegardés par flush()
 * - Une sauvegarde à la fois (save_lock), fichier temporaire unique puis rename
 * - Échec d'écriture = état gardé "dirty", retenté au prochain flush()
 */

use super::InventoryStore;
use crate::error::{ClaimKey, StoreError};
use crate::model::{
    DeviceCurrentStatus, DeviceId, DeviceUpdate, HardwareAddress, NewDevice, NewSubnet,
    ReachabilityCheck, RegisteredDevice, Subnet,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

/// Format du fichier JSON de persistance
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_device_id: u64,
    next_subnet_id: u64,
    devices: Vec<RegisteredDevice>,
    checks: Vec<ReachabilityCheck>,
    statuses: Vec<DeviceCurrentStatus>,
    subnets: Vec<Subnet>,
}

#[derive(Default)]
struct State {
    next_device_id: u64,
    next_subnet_id: u64,
    devices: BTreeMap<DeviceId, RegisteredDevice>,
    by_address: HashMap<Ipv4Addr, DeviceId>,
    by_mac: HashMap<HardwareAddress, DeviceId>,
    /// Historique par appareil, trié par `checked_at`
    checks: HashMap<DeviceId, Vec<ReachabilityCheck>>,
    check_ids: HashSet<Uuid>,
    statuses: BTreeMap<DeviceId, DeviceCurrentStatus>,
    subnets: BTreeMap<u64, Subnet>,
    dirty: bool,
}

impl State {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = State {
            next_device_id: snapshot.next_device_id,
            next_subnet_id: snapshot.next_subnet_id,
            ..Default::default()
        };
        for device in snapshot.devices {
            state.index(&device);
            state.next_device_id = state.next_device_id.max(device.id.0);
            state.devices.insert(device.id, device);
        }
        for check in snapshot.checks {
            state.push_check(check);
        }
        for status in snapshot.statuses {
            state.statuses.insert(status.device_id, status);
        }
        for subnet in snapshot.subnets {
            state.next_subnet_id = state.next_subnet_id.max(subnet.id);
            state.subnets.insert(subnet.id, subnet);
        }
        state
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            next_device_id: self.next_device_id,
            next_subnet_id: self.next_subnet_id,
            devices: self.devices.values().cloned().collect(),
            checks: self
                .devices
                .keys()
                .filter_map(|id| self.checks.get(id))
                .flatten()
                .cloned()
                .collect(),
            statuses: self.statuses.values().cloned().collect(),
            subnets: self.subnets.values().cloned().collect(),
        }
    }

    fn index(&mut self, device: &RegisteredDevice) {
        if let Some(address) = device.address {
            self.by_address.insert(address, device.id);
        }
        if let Some(mac) = device.hardware_address {
            self.by_mac.insert(mac, device.id);
        }
    }

    fn unindex(&mut self, device: &RegisteredDevice) {
        if let Some(address) = device.address {
            self.by_address.remove(&address);
        }
        if let Some(mac) = device.hardware_address {
            self.by_mac.remove(&mac);
        }
    }

    /// Vérifie qu'aucun autre appareil que `owner` ne revendique ces clés
    fn check_claims(
        &self,
        owner: Option<DeviceId>,
        address: Option<Ipv4Addr>,
        mac: Option<HardwareAddress>,
    ) -> Result<(), StoreError> {
        if let Some(address) = address {
            if let Some(existing) = self.by_address.get(&address).copied() {
                if Some(existing) != owner {
                    return Err(StoreError::Conflict {
                        key: ClaimKey::Address,
                        value: address.to_string(),
                        existing,
                    });
                }
            }
        }
        if let Some(mac) = mac {
            if let Some(existing) = self.by_mac.get(&mac).copied() {
                if Some(existing) != owner {
                    return Err(StoreError::Conflict {
                        key: ClaimKey::HardwareAddress,
                        value: mac.to_string(),
                        existing,
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, new: NewDevice) -> Result<RegisteredDevice, StoreError> {
        self.check_claims(None, new.address, new.hardware_address)?;
        self.next_device_id += 1;
        let now = OffsetDateTime::now_utc();
        let device = RegisteredDevice {
            id: DeviceId(self.next_device_id),
            name: new.name,
            address: new.address,
            hardware_address: new.hardware_address,
            vendor: new.vendor,
            model: new.model,
            device_type: new.device_type,
            status: new.status,
            notes: new.notes,
            source: new.source,
            created_at: now,
            updated_at: now,
        };
        self.index(&device);
        self.devices.insert(device.id, device.clone());
        Ok(device)
    }

    /// Retourne `false` si l'identifiant de la vérification est déjà connu
    fn push_check(&mut self, check: ReachabilityCheck) -> bool {
        if !self.check_ids.insert(check.id) {
            return false;
        }
        let series = self.checks.entry(check.device_id).or_default();
        let at = series.partition_point(|c| c.checked_at <= check.checked_at);
        series.insert(at, check);
        true
    }
}

pub struct MemoryInventory {
    state: RwLock<State>,
    /// Chemin du fichier JSON, absent pour un stockage purement volatile
    snapshot_path: Option<PathBuf>,
    /// Sérialise les sauvegardes : sérialisation, écriture et rename
    save_lock: Mutex<()>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInventory {
    /// Stockage volatile, sans fichier
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            snapshot_path: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Ouvre (ou crée) un inventaire persisté dans le fichier JSON donné
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            State::from_snapshot(snapshot)
        } else {
            State::default()
        };
        tracing::info!(
            "Inventory loaded from {:?}: {} devices, {} subnets",
            path,
            state.devices.len(),
            state.subnets.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
            save_lock: Mutex::new(()),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Sauvegarde l'état complet (fichier temporaire unique puis rename)
    ///
    /// Une mutation concurrente lance sa propre sauvegarde ou remet `dirty` ;
    /// en cas d'échec, `dirty` est rétabli pour que flush() retente.
    fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let _saving = self.save_lock.lock();
        let content = {
            let mut state = self.state.write();
            let content = serde_json::to_string_pretty(&state.to_snapshot())?;
            state.dirty = false;
            content
        };
        if let Err(e) = write_snapshot(path, &content) {
            self.state.write().dirty = true;
            return Err(e.into());
        }
        Ok(())
    }

    /// Sauvegarde après une mutation déjà appliquée en mémoire : l'échec est
    /// journalisé, la mutation reste acquise et sera persistée par flush()
    fn save_after(&self, operation: &str) {
        if let Err(e) = self.save() {
            tracing::error!("Failed to persist inventory after {}: {}", operation, e);
        }
    }
}

fn write_snapshot(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl InventoryStore for MemoryInventory {
    fn insert_device(&self, new: NewDevice) -> Result<RegisteredDevice, StoreError> {
        let device = self.state.write().insert(new)?;
        self.save_after("device insert");
        Ok(device)
    }

    fn insert_devices(&self, batch: Vec<NewDevice>) -> Vec<Result<RegisteredDevice, StoreError>> {
        let results: Vec<_> = {
            let mut state = self.state.write();
            batch.into_iter().map(|new| state.insert(new)).collect()
        };
        if results.iter().any(Result::is_ok) {
            self.save_after("bulk insert");
        }
        results
    }

    fn device(&self, id: DeviceId) -> Result<Option<RegisteredDevice>, StoreError> {
        Ok(self.state.read().devices.get(&id).cloned())
    }

    fn device_by_address(&self, address: Ipv4Addr) -> Result<Option<RegisteredDevice>, StoreError> {
        let state = self.state.read();
        Ok(state
            .by_address
            .get(&address)
            .and_then(|id| state.devices.get(id))
            .cloned())
    }

    fn device_by_hardware_address(
        &self,
        mac: &HardwareAddress,
    ) -> Result<Option<RegisteredDevice>, StoreError> {
        let state = self.state.read();
        Ok(state
            .by_mac
            .get(mac)
            .and_then(|id| state.devices.get(id))
            .cloned())
    }

    fn devices(&self) -> Result<Vec<RegisteredDevice>, StoreError> {
        Ok(self.state.read().devices.values().cloned().collect())
    }

    fn update_device(&self, id: DeviceId, update: DeviceUpdate) -> Result<RegisteredDevice, StoreError> {
        let device = {
            let mut state = self.state.write();
            let current = state
                .devices
                .get(&id)
                .cloned()
                .ok_or(StoreError::DeviceNotFound(id))?;

            let mut next = current.clone();
            if let Some(name) = update.name {
                next.name = name;
            }
            if let Some(address) = update.address {
                next.address = Some(address);
            }
            if let Some(mac) = update.hardware_address {
                next.hardware_address = Some(mac);
            }
            if let Some(vendor) = update.vendor {
                next.vendor = Some(vendor);
            }
            if let Some(model) = update.model {
                next.model = Some(model);
            }
            if let Some(device_type) = update.device_type {
                next.device_type = device_type;
            }
            if let Some(status) = update.status {
                next.status = status;
            }
            if let Some(notes) = update.notes {
                next.notes = notes;
            }
            state.check_claims(Some(id), next.address, next.hardware_address)?;

            next.updated_at = OffsetDateTime::now_utc();
            state.unindex(&current);
            state.index(&next);
            state.devices.insert(id, next.clone());
            next
        };
        self.save_after("device update");
        Ok(device)
    }

    fn append_check(&self, check: ReachabilityCheck) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        if !state.devices.contains_key(&check.device_id) {
            return Err(StoreError::DeviceNotFound(check.device_id));
        }
        let added = state.push_check(check);
        state.dirty |= added;
        Ok(added)
    }

    fn checks_since(
        &self,
        device: DeviceId,
        since: OffsetDateTime,
    ) -> Result<Vec<ReachabilityCheck>, StoreError> {
        let state = self.state.read();
        let Some(series) = state.checks.get(&device) else {
            return Ok(Vec::new());
        };
        let start = series.partition_point(|c| c.checked_at < since);
        Ok(series[start..].to_vec())
    }

    fn latest_checks(&self, device: DeviceId, limit: usize) -> Result<Vec<ReachabilityCheck>, StoreError> {
        let state = self.state.read();
        Ok(state
            .checks
            .get(&device)
            .map(|series| series.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn prune_checks(&self, before: OffsetDateTime) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let mut removed_ids = Vec::new();
        for series in state.checks.values_mut() {
            let cut = series.partition_point(|c| c.checked_at < before);
            removed_ids.extend(series.drain(..cut).map(|c| c.id));
        }
        for id in &removed_ids {
            state.check_ids.remove(id);
        }
        state.dirty |= !removed_ids.is_empty();
        Ok(removed_ids.len())
    }

    fn current_status(&self, device: DeviceId) -> Result<Option<DeviceCurrentStatus>, StoreError> {
        Ok(self.state.read().statuses.get(&device).cloned())
    }

    fn put_status(&self, status: DeviceCurrentStatus) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.devices.contains_key(&status.device_id) {
            return Err(StoreError::DeviceNotFound(status.device_id));
        }
        state.statuses.insert(status.device_id, status);
        state.dirty = true;
        Ok(())
    }

    fn statuses(&self) -> Result<Vec<DeviceCurrentStatus>, StoreError> {
        Ok(self.state.read().statuses.values().cloned().collect())
    }

    fn insert_subnet(&self, new: NewSubnet) -> Result<Subnet, StoreError> {
        let subnet = {
            let mut state = self.state.write();
            let cidr = new.cidr.trunc();
            if let Some(existing) = state.subnets.values().find(|s| s.cidr == cidr) {
                return Ok(existing.clone());
            }
            state.next_subnet_id += 1;
            let subnet = Subnet {
                id: state.next_subnet_id,
                cidr,
                purpose: new.purpose,
                vlan_id: new.vlan_id,
                location: new.location,
            };
            state.subnets.insert(subnet.id, subnet.clone());
            subnet
        };
        self.save_after("subnet insert");
        Ok(subnet)
    }

    fn subnet(&self, id: u64) -> Result<Option<Subnet>, StoreError> {
        Ok(self.state.read().subnets.get(&id).cloned())
    }

    fn subnets(&self) -> Result<Vec<Subnet>, StoreError> {
        Ok(self.state.read().subnets.values().cloned().collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let dirty = self.state.read().dirty;
        if dirty {
            self.save()?;
        }
        Ok(())
    }
}
