/**
 * JOBS KERNEL - Découverte et vérifications de joignabilité
 *
 * RÔLE :
 * Point d'exécution unique pour les deux jobs du kernel, qu'ils soient lancés
 * par le planificateur ou par l'API HTTP.
 *
 * FONCTIONNEMENT :
 * - Découverte : balayage -> classification -> réconciliation (si auto_register)
 *   -> dernier rapport conservé -> événement discovery/completed
 * - Vérifications : inventaire filtré par type -> statut courant mis à jour
 *   -> événement devices/status pour chaque transition -> purge de l'historique
 * - Garde anti-chevauchement : un même job ne tourne jamais deux fois en
 *   parallèle, le second appelant reçoit AlreadyRunning
 * - Chaque publication est bornée par publish_timeout : un broker muet ne
 *   bloque jamais un job (et donc sa garde)
 */

use crate::health::HealthTracker;
use assetwatch_core::error::{EventError, MonitorError, ScanError, StoreError};
use assetwatch_core::events::{
    publish_json, DeviceStatusEvent, DiscoveryCompletedEvent, EventSink, TOPIC_DEVICE_STATUS,
    TOPIC_DISCOVERY_COMPLETED,
};
use assetwatch_core::model::{DeviceId, DeviceType};
use assetwatch_core::monitor::{CheckReport, ReachabilityMonitor};
use assetwatch_core::reconcile::{reconcile, ReconcileReport};
use assetwatch_core::scanner::{DiscoveryScanner, ScanReport};
use assetwatch_core::store::InventoryStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

type Snapshot = parking_lot::Mutex<Option<DiscoveryOutcome>>;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0} already running")]
    AlreadyRunning(&'static str),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub scan: ScanReport,
    /// Absent quand l'enregistrement automatique est désactivé
    pub reconciled: Option<ReconcileReport>,
}

pub struct JobSettings {
    pub auto_register: bool,
    pub device_types: Vec<DeviceType>,
    /// Historique plus ancien purgé après chaque tour de vérifications
    pub retention: Option<time::Duration>,
    /// Délai maximal d'une publication d'événement
    pub publish_timeout: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            auto_register: true,
            device_types: Vec::new(),
            retention: Some(time::Duration::days(30)),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

pub struct Jobs {
    scanner: DiscoveryScanner,
    monitor: ReachabilityMonitor,
    store: Arc<dyn InventoryStore>,
    events: Arc<dyn EventSink>,
    health: HealthTracker,
    settings: JobSettings,
    /// Dernière découverte réussie
    last_scan: Snapshot,
    discovery_guard: Mutex<()>,
    checks_guard: Mutex<()>,
}

impl Jobs {
    pub fn new(
        scanner: DiscoveryScanner,
        monitor: ReachabilityMonitor,
        store: Arc<dyn InventoryStore>,
        events: Arc<dyn EventSink>,
        health: HealthTracker,
        settings: JobSettings,
    ) -> Self {
        Self {
            scanner,
            monitor,
            store,
            events,
            health,
            settings,
            last_scan: Snapshot::new(None),
            discovery_guard: Mutex::new(()),
            checks_guard: Mutex::new(()),
        }
    }

    pub fn last_discovery(&self) -> Option<DiscoveryOutcome> {
        self.last_scan.lock().clone()
    }

    pub async fn run_discovery(&self, cidr: Option<&str>) -> Result<DiscoveryOutcome, JobError> {
        let Ok(_guard) = self.discovery_guard.try_lock() else {
            return Err(JobError::AlreadyRunning("discovery"));
        };

        let scan = self.scanner.sweep(cidr).await?;
        let reconciled = if self.settings.auto_register {
            let report = reconcile(&scan.hosts, self.store.as_ref())?;
            tracing::info!(
                cidr = %scan.cidr,
                "découverte: {} hôtes, {} ajoutés, {} connus, {} conflits, {} échecs",
                scan.hosts.len(),
                report.added.len(),
                report.skipped.len(),
                report.conflicts.len(),
                report.failed.len()
            );
            Some(report)
        } else {
            tracing::info!(cidr = %scan.cidr, "découverte: {} hôtes (sans enregistrement)", scan.hosts.len());
            None
        };

        self.health.mark_discovery(scan.finished_at);
        let event = DiscoveryCompletedEvent::new(&scan, reconciled.as_ref());
        if let Err(e) = self.publish(TOPIC_DISCOVERY_COMPLETED, &event).await {
            tracing::warn!("publication {} impossible: {}", TOPIC_DISCOVERY_COMPLETED, e);
        }

        let outcome = DiscoveryOutcome { scan, reconciled };
        *self.last_scan.lock() = Some(outcome.clone());
        Ok(outcome)
    }

    pub async fn run_checks(&self) -> Result<Vec<CheckReport>, JobError> {
        let Ok(_guard) = self.checks_guard.try_lock() else {
            return Err(JobError::AlreadyRunning("reachability checks"));
        };

        let reports = self.monitor.check_inventory(&self.settings.device_types).await?;
        self.health.mark_check_run(OffsetDateTime::now_utc());
        self.publish_transitions(&reports).await;

        if let Some(retention) = self.settings.retention {
            let pruned = self.store.prune_checks(OffsetDateTime::now_utc() - retention)?;
            if pruned > 0 {
                tracing::debug!("{} vérifications purgées", pruned);
            }
        }
        Ok(reports)
    }

    /// Vérification manuelle d'un appareil, hors garde : elle ne touche qu'un
    /// seul appareil et passe par le même écrivain de statut.
    pub async fn check_device(&self, id: DeviceId) -> Result<CheckReport, JobError> {
        let report = self.monitor.check_device_by_id(id).await?;
        self.publish_transitions(std::slice::from_ref(&report)).await;
        Ok(report)
    }

    async fn publish_transitions(&self, reports: &[CheckReport]) {
        for report in reports.iter().filter(|r| r.transitioned) {
            let event = DeviceStatusEvent::from_report(report);
            if let Err(e) = self.publish(TOPIC_DEVICE_STATUS, &event).await {
                tracing::warn!(
                    device_id = %report.result.device_id,
                    "publication {} impossible: {}",
                    TOPIC_DEVICE_STATUS,
                    e
                );
            }
        }
    }

    async fn publish<T: Serialize + Sync>(&self, topic: &str, event: &T) -> Result<(), EventError> {
        let timeout = self.settings.publish_timeout;
        tokio::time::timeout(timeout, publish_json(self.events.as_ref(), topic, event))
            .await
            .map_err(|_| EventError::Transport(format!("pas de réponse du bus après {:?}", timeout)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetwatch_core::classify::Classifier;
    use assetwatch_core::monitor::MonitorConfig;
    use assetwatch_core::scanner::ScannerConfig;
    use assetwatch_core::sweep::BulkSweep;
    use assetwatch_devkit::test_utils::swept;
    use assetwatch_devkit::{StubSweep, TestHarness};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Bus dont les publications ne se terminent jamais (file pleine, broker muet)
    struct StalledSink;

    #[async_trait]
    impl EventSink for StalledSink {
        async fn publish(&self, _topic: &str, _payload: String) -> Result<(), EventError> {
            std::future::pending().await
        }
    }

    fn jobs(harness: &TestHarness, sweep: Arc<dyn BulkSweep>, settings: JobSettings) -> Arc<Jobs> {
        jobs_with_sink(harness, sweep, Arc::new(harness.mqtt_client.clone()), settings)
    }

    fn jobs_with_sink(
        harness: &TestHarness,
        sweep: Arc<dyn BulkSweep>,
        events: Arc<dyn EventSink>,
        settings: JobSettings,
    ) -> Arc<Jobs> {
        let scanner = DiscoveryScanner::new(sweep, Classifier::default(), ScannerConfig::default())
            .with_detector(|| None);
        Arc::new(Jobs::new(
            scanner,
            harness.monitor(MonitorConfig::default()),
            harness.store(),
            events,
            HealthTracker::new(),
            settings,
        ))
    }

    #[tokio::test]
    async fn test_discovery_registers_and_publishes() {
        let harness = TestHarness::new();
        let sweep = Arc::new(StubSweep::hosts(vec![
            swept("10.2.0.1", Some("00:1C:C0:11:22:33"), Some("Cisco Systems")),
            swept("10.2.0.9", None, None),
        ]));
        let jobs = jobs(&harness, sweep, JobSettings::default());

        let outcome = jobs.run_discovery(Some("10.2.0.0/24")).await.unwrap();
        assert_eq!(outcome.scan.hosts.len(), 2);
        assert_eq!(outcome.reconciled.as_ref().unwrap().added.len(), 2);
        assert_eq!(harness.store.devices().unwrap().len(), 2);
        assert!(jobs.last_discovery().is_some());

        harness
            .assert_field_equals(TOPIC_DISCOVERY_COMPLETED, "added", &Value::from(2))
            .unwrap();
        harness
            .assert_field_equals(TOPIC_DISCOVERY_COMPLETED, "cidr", &Value::from("10.2.0.0/24"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_discovery_without_auto_register_leaves_inventory() {
        let harness = TestHarness::new();
        let sweep = Arc::new(StubSweep::hosts(vec![swept("10.2.0.1", None, None)]));
        let settings = JobSettings {
            auto_register: false,
            ..Default::default()
        };
        let outcome = jobs(&harness, sweep, settings).run_discovery(None).await.unwrap();
        assert!(outcome.reconciled.is_none());
        assert!(harness.store.devices().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_sweep_keeps_previous_snapshot() {
        let harness = TestHarness::new();
        let jobs = jobs(&harness, Arc::new(StubSweep::failing("boom")), JobSettings::default());
        assert!(matches!(
            jobs.run_discovery(Some("10.2.0.0/24")).await,
            Err(JobError::Scan(ScanError::Sweep { .. }))
        ));
        assert!(jobs.last_discovery().is_none());
        assert!(harness.mqtt_client.find_messages_by_topic(TOPIC_DISCOVERY_COMPLETED).is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_discovery_is_refused() {
        let harness = TestHarness::new();
        let sweep = Arc::new(StubSweep::hosts(vec![]).with_delay(Duration::from_millis(200)));
        let jobs = jobs(&harness, sweep, JobSettings::default());

        let running = {
            let jobs = jobs.clone();
            tokio::spawn(async move { jobs.run_discovery(Some("10.2.0.0/24")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            jobs.run_discovery(Some("10.2.0.0/24")).await,
            Err(JobError::AlreadyRunning("discovery"))
        ));
        assert!(running.await.unwrap().is_ok());
        assert!(jobs.run_discovery(Some("10.2.0.0/24")).await.is_ok());
    }

    #[tokio::test]
    async fn test_checks_publish_only_transitions() {
        let harness = TestHarness::new();
        let device = harness.register("p", "10.3.0.1", DeviceType::Printer).unwrap();
        let address = assetwatch_devkit::test_utils::ip("10.3.0.1");
        harness.prober.open(address, 9100, 1.0);
        let jobs = jobs(&harness, Arc::new(StubSweep::hosts(vec![])), JobSettings::default());

        let first = jobs.run_checks().await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(harness.mqtt_client.find_messages_by_topic(TOPIC_DEVICE_STATUS).is_empty());

        harness.prober.close_all(address);
        jobs.run_checks().await.unwrap();
        harness
            .assert_field_equals(TOPIC_DEVICE_STATUS, "online", &Value::Bool(false))
            .unwrap();
        harness
            .assert_field_equals(TOPIC_DEVICE_STATUS, "device_id", &Value::from(device.id.0))
            .unwrap();

        jobs.run_checks().await.unwrap();
        assert_eq!(harness.mqtt_client.find_messages_by_topic(TOPIC_DEVICE_STATUS).len(), 1);

        harness.prober.open(address, 9100, 1.0);
        let report = jobs.check_device(device.id).await.unwrap();
        assert!(report.transitioned);
        assert_eq!(harness.mqtt_client.find_messages_by_topic(TOPIC_DEVICE_STATUS).len(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_the_job() {
        let harness = TestHarness::new();
        harness.mqtt_client.set_failing(true);
        let sweep = Arc::new(StubSweep::hosts(vec![swept("10.2.0.1", None, None)]));
        let outcome = jobs(&harness, sweep, JobSettings::default())
            .run_discovery(Some("10.2.0.0/24"))
            .await
            .unwrap();
        assert_eq!(outcome.scan.hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_bus_does_not_wedge_the_jobs() {
        let harness = TestHarness::new();
        harness.register("p", "10.3.0.1", DeviceType::Printer).unwrap();
        let address = assetwatch_devkit::test_utils::ip("10.3.0.1");
        harness.prober.open(address, 9100, 1.0);
        let settings = JobSettings {
            publish_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let sweep = Arc::new(StubSweep::hosts(vec![swept("10.2.0.1", None, None)]));
        let jobs = jobs_with_sink(&harness, sweep, Arc::new(StalledSink), settings);

        jobs.run_checks().await.unwrap();
        harness.prober.close_all(address);
        let reports = tokio::time::timeout(Duration::from_secs(2), jobs.run_checks())
            .await
            .expect("checks stuck on a stalled publish")
            .unwrap();
        assert!(reports[0].transitioned);

        // La garde est libérée : le tour suivant n'est pas AlreadyRunning
        assert!(jobs.run_checks().await.is_ok());

        let outcome = tokio::time::timeout(Duration::from_secs(2), jobs.run_discovery(Some("10.2.0.0/24")))
            .await
            .expect("discovery stuck on a stalled publish")
            .unwrap();
        assert_eq!(outcome.scan.hosts.len(), 1);
        assert!(jobs.run_discovery(Some("10.2.0.0/24")).await.is_ok());
    }
}
