/**
 * ASSETWATCH KERNEL - Point d'entrée du service
 *
 * RÔLE : Orchestration de tous les modules : config, inventaire, découverte,
 * vérifications de joignabilité, planification, MQTT, HTTP, health.
 *
 * ARCHITECTURE : jobs planifiés + API REST de déclenchement + événements MQTT.
 */

mod config;
mod health;
mod http;
mod jobs;
mod mqtt;
mod scheduler;

use crate::config::{load_config, KernelConfig, SweepBackend};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::jobs::{JobSettings, Jobs, DEFAULT_PUBLISH_TIMEOUT};
use crate::mqtt::MqttSink;
use anyhow::{Context, Result};
use assetwatch_core::classify::Classifier;
use assetwatch_core::events::{EventSink, NullSink};
use assetwatch_core::monitor::ReachabilityMonitor;
use assetwatch_core::probe::{Prober, TcpProber};
use assetwatch_core::scanner::DiscoveryScanner;
use assetwatch_core::store::{InventoryStore, MemoryInventory};
use assetwatch_core::subnet::OccupancyTracker;
use assetwatch_core::sweep::{BulkSweep, NmapSweep, TcpConnectSweep};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("assetwatch=info")))
        .init();

    let cfg: KernelConfig = load_config().await?;

    // inventaire persistant
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("création de {}", cfg.data_dir.display()))?;
    let inventory = MemoryInventory::open(cfg.data_dir.join("inventory.json"))?;
    let store: Arc<dyn InventoryStore> = Arc::new(inventory);
    tracing::info!("{} appareils dans l'inventaire", store.devices()?.len());

    for subnet in &cfg.subnets {
        let registered = store.insert_subnet(subnet.clone())?;
        tracing::debug!("sous-réseau {} ({})", registered.cidr, registered.purpose);
    }

    let health_tracker = HealthTracker::new();

    // événements : MQTT si configuré, sinon ignorés
    let events: Arc<dyn EventSink> = match &cfg.mqtt {
        Some(mqtt_cfg) => Arc::new(MqttSink::connect(mqtt_cfg, health_tracker.clone())),
        None => {
            tracing::info!("pas de section mqtt, événements désactivés");
            Arc::new(NullSink)
        }
    };

    let prober: Arc<dyn Prober> = Arc::new(TcpProber);
    let sweep: Arc<dyn BulkSweep> = match cfg.discovery.backend {
        SweepBackend::Nmap => Arc::new(NmapSweep::new(cfg.discovery.nmap_config())),
        SweepBackend::Tcp => Arc::new(TcpConnectSweep::new(prober.clone(), cfg.discovery.tcp_config())),
    };
    let scanner = DiscoveryScanner::new(sweep, Classifier::default(), cfg.discovery.scanner_config());
    let monitor = ReachabilityMonitor::new(store.clone(), prober, cfg.reachability.monitor_config());

    let settings = JobSettings {
        auto_register: cfg.discovery.auto_register,
        device_types: cfg.reachability.device_types.clone(),
        retention: (cfg.reachability.retention_days > 0)
            .then(|| time::Duration::days(i64::from(cfg.reachability.retention_days))),
        publish_timeout: cfg
            .mqtt
            .as_ref()
            .map_or(DEFAULT_PUBLISH_TIMEOUT, |m| m.publish_timeout()),
    };
    let jobs = Arc::new(Jobs::new(
        scanner,
        monitor,
        store.clone(),
        events,
        health_tracker.clone(),
        settings,
    ));

    scheduler::spawn_scheduler(
        jobs.clone(),
        scheduler::period(cfg.discovery.interval_hours, Duration::from_secs(3600)),
        scheduler::period(cfg.reachability.interval_minutes, Duration::from_secs(60)),
    );

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        jobs,
        store: store.clone(),
        occupancy: Arc::new(OccupancyTracker::new(store.clone())),
        health_tracker,
    };
    let app = http::build_router(app_state);

    let addr = cfg.http.listen;
    tracing::info!("listening on http://{addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("arrêt demandé");
        })
        .await?;

    // historique et statuts différés
    assetwatch_core::store::blocking(&store, |s| s.flush()).await?;
    Ok(())
}
