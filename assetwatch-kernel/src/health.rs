/**
 * SANTÉ KERNEL - Suivi de l'état du service
 *
 * RÔLE :
 * Agrège uptime, inventaire suivi, appareils en ligne, dernières exécutions
 * des jobs et état de la connexion MQTT pour /system/health.
 */

use assetwatch_core::store::InventoryStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub devices_online: u32,
    pub memory_usage_mb: f32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_discovery: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_check_run: Option<OffsetDateTime>,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
    last_discovery: Arc<Mutex<Option<OffsetDateTime>>>,
    last_check_run: Arc<Mutex<Option<OffsetDateTime>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("disabled".to_string())),
            last_discovery: Arc::new(Mutex::new(None)),
            last_check_run: Arc::new(Mutex::new(None)),
        }
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting".to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn mark_discovery(&self, at: OffsetDateTime) {
        *self.last_discovery.lock() = Some(at);
    }

    pub fn mark_check_run(&self, at: OffsetDateTime) {
        *self.last_check_run.lock() = Some(at);
    }

    pub fn get_health(&self, store: &dyn InventoryStore) -> KernelHealth {
        let devices_tracked = store.devices().map(|d| d.len() as u32).unwrap_or_else(|e| {
            tracing::warn!("[health] lecture inventaire impossible: {}", e);
            0
        });
        let devices_online = store
            .statuses()
            .map(|s| s.iter().filter(|st| st.online).count() as u32)
            .unwrap_or(0);

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked,
            devices_online,
            memory_usage_mb: get_memory_usage_mb(),
            last_discovery: *self.last_discovery.lock(),
            last_check_run: *self.last_check_run.lock(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok()) {
                        return (kb as f32) / 1024.0; // KB -> MB
                    }
                }
            }
        }
    }

    0.0
}
