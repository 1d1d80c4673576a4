/**
 * INVENTORY STORE v1 - Interface de persistence de l'inventaire
 *
 * RÔLE :
 * Ce module définit les opérations primitives dont le cœur a besoin sur les
 * appareils, les vérifications de joignabilité, les statuts courants et les
 * sous-réseaux. Le cœur n'émet que ces opérations et ne suppose aucun moteur
 * de stockage particulier.
 *
 * FONCTIONNEMENT :
 * - InventoryStore trait = interface commune (create / query / bulk-insert / update)
 * - MemoryInventory = implémentation en mémoire avec snapshot JSON optionnel
 * - Unicité : une adresse IP et une adresse MAC non nulles ne peuvent être
 *   revendiquées que par un seul appareil à la fois
 * - Les vérifications sont en ajout seul (append-only), jamais modifiées
 * - Depuis du code async, les opérations qui écrivent le snapshot passent par
 *   blocking() pour ne pas bloquer les workers tokio
 */

mod memory;

pub use memory::MemoryInventory;

use crate::error::StoreError;
use crate::model::{
    DeviceCurrentStatus, DeviceId, DeviceUpdate, HardwareAddress, NewDevice, NewSubnet,
    ReachabilityCheck, RegisteredDevice, Subnet,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use time::OffsetDateTime;

/// Interface que toute implémentation de stockage doit fournir.
///
/// Les méthodes sont synchrones : elles ne font aucune I/O réseau et doivent
/// rester courtes, le cœur les appelle depuis des tâches tokio.
pub trait InventoryStore: Send + Sync {
    /// Enregistre un appareil, en refusant toute adresse ou MAC déjà revendiquée
    fn insert_device(&self, new: NewDevice) -> Result<RegisteredDevice, StoreError>;

    /// Insertion groupée : un résultat par élément, dans l'ordre du lot.
    /// Les éléments déjà insérés restent en place si un autre échoue.
    fn insert_devices(&self, batch: Vec<NewDevice>) -> Vec<Result<RegisteredDevice, StoreError>>;

    fn device(&self, id: DeviceId) -> Result<Option<RegisteredDevice>, StoreError>;

    fn device_by_address(&self, address: Ipv4Addr) -> Result<Option<RegisteredDevice>, StoreError>;

    fn device_by_hardware_address(
        &self,
        mac: &HardwareAddress,
    ) -> Result<Option<RegisteredDevice>, StoreError>;

    /// Tous les appareils, triés par identifiant
    fn devices(&self) -> Result<Vec<RegisteredDevice>, StoreError>;

    /// Modification manuelle ou transition de statut
    fn update_device(&self, id: DeviceId, update: DeviceUpdate) -> Result<RegisteredDevice, StoreError>;

    /// Ajoute une vérification. Retourne `false` si cet identifiant existe déjà.
    fn append_check(&self, check: ReachabilityCheck) -> Result<bool, StoreError>;

    /// Vérifications d'un appareil depuis `since` (inclus), ordre chronologique
    fn checks_since(
        &self,
        device: DeviceId,
        since: OffsetDateTime,
    ) -> Result<Vec<ReachabilityCheck>, StoreError>;

    /// Les `limit` vérifications les plus récentes, la plus récente en premier
    fn latest_checks(&self, device: DeviceId, limit: usize) -> Result<Vec<ReachabilityCheck>, StoreError>;

    /// Supprime l'historique antérieur à `before`. Retourne le nombre de lignes supprimées.
    fn prune_checks(&self, before: OffsetDateTime) -> Result<usize, StoreError>;

    fn current_status(&self, device: DeviceId) -> Result<Option<DeviceCurrentStatus>, StoreError>;

    fn put_status(&self, status: DeviceCurrentStatus) -> Result<(), StoreError>;

    fn statuses(&self) -> Result<Vec<DeviceCurrentStatus>, StoreError>;

    /// Enregistre un sous-réseau. Un bloc déjà connu est renvoyé tel quel.
    fn insert_subnet(&self, new: NewSubnet) -> Result<Subnet, StoreError>;

    fn subnet(&self, id: u64) -> Result<Option<Subnet>, StoreError>;

    fn subnets(&self) -> Result<Vec<Subnet>, StoreError>;

    /// Persiste les écritures différées (historique, statuts)
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Exécute une opération du store sur le pool bloquant de tokio
pub async fn blocking<T, F>(store: &Arc<dyn InventoryStore>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn InventoryStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}
