/*!
Test Harness pour le cœur assetwatch

Facilite l'écriture de tests avec:
- Inventaire en mémoire, prober scripté et stub MQTT déjà câblés
- Fabriques de fixtures (appareils, hôtes découverts, hôtes balayés)
- Assertions sur les événements publiés
*/

use crate::mqtt_stub::MockMqttClient;
use crate::probe_stub::ScriptedProber;
use anyhow::Result;
use assetwatch_core::classify::Classifier;
use assetwatch_core::model::{
    DeviceStatus, DeviceType, DiscoveredHost, DiscoverySource, NewDevice, RegisteredDevice,
};
use assetwatch_core::monitor::{MonitorConfig, ReachabilityMonitor};
use assetwatch_core::scanner::{DiscoveryScanner, ScannerConfig};
use assetwatch_core::store::{InventoryStore, MemoryInventory};
use assetwatch_core::sweep::{BulkSweep, SweptHost};
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use time::OffsetDateTime;

/// Init logging pour tests (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("assetwatch=debug"))
        .with_test_writer()
        .try_init();
}

/// Parse une adresse IPv4 de fixture
pub fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap_or(Ipv4Addr::UNSPECIFIED)
}

/// Fixture d'enregistrement manuel
pub fn new_device(name: &str, address: Option<&str>, device_type: DeviceType) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        address: address.map(ip),
        hardware_address: None,
        vendor: None,
        model: None,
        device_type,
        status: DeviceStatus::Active,
        notes: String::new(),
        source: DiscoverySource::Manual,
    }
}

/// Fixture d'hôte découvert, sans autre preuve que son adresse
pub fn discovered(address: &str) -> DiscoveredHost {
    DiscoveredHost {
        address: ip(address),
        hardware_address: None,
        vendor: None,
        resolved_name: None,
        device_type: DeviceType::Unknown,
        display_name: format!("Unknown device ({address})"),
        discovered_at: OffsetDateTime::now_utc(),
    }
}

/// Fixture d'hôte tel que renvoyé par un sweep
pub fn swept(address: &str, mac: Option<&str>, vendor: Option<&str>) -> SweptHost {
    SweptHost {
        hardware_address: mac.map(str::to_string),
        vendor: vendor.map(str::to_string),
        ..SweptHost::at(ip(address))
    }
}

/// Harness de test: inventaire + prober + bus d'événements
pub struct TestHarness {
    pub store: Arc<MemoryInventory>,
    pub prober: Arc<ScriptedProber>,
    pub mqtt_client: MockMqttClient,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            store: Arc::new(MemoryInventory::new()),
            prober: Arc::new(ScriptedProber::new()),
            mqtt_client: MockMqttClient::new(),
        }
    }

    /// Harness dont le prober simule une latence fixe par sonde
    pub fn with_latency(latency: std::time::Duration) -> Self {
        Self {
            prober: Arc::new(ScriptedProber::new().with_latency(latency)),
            ..Self::new()
        }
    }

    /// Enregistre un appareil actif
    pub fn register(&self, name: &str, address: &str, device_type: DeviceType) -> Result<RegisteredDevice> {
        Ok(self
            .store
            .insert_device(new_device(name, Some(address), device_type))?)
    }

    pub fn store(&self) -> Arc<dyn InventoryStore> {
        self.store.clone()
    }

    pub fn monitor(&self, config: MonitorConfig) -> ReachabilityMonitor {
        ReachabilityMonitor::new(self.store(), self.prober.clone(), config)
    }

    /// Scanner sans détection d'interface (bloc par défaut si aucun n'est demandé)
    pub fn scanner(&self, sweep: Arc<dyn BulkSweep>) -> DiscoveryScanner {
        DiscoveryScanner::new(sweep, Classifier::default(), ScannerConfig::default()).with_detector(|| None)
    }

    /// Assert qu'un champ a une valeur donnée dans le dernier message d'un topic
    pub fn assert_field_equals(&self, topic: &str, field: &str, expected: &Value) -> Result<()> {
        let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? else {
            anyhow::bail!("no message published on {}", topic);
        };
        match msg.get(field) {
            Some(actual) if actual == expected => {
                tracing::info!("✅ Field '{}' = {} in {}", field, expected, topic);
                Ok(())
            }
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {}, got {}",
                field,
                expected,
                actual
            ),
            None => anyhow::bail!("Field '{}' not found in latest message on {}", field, topic),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetwatch_core::events::EventSink;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::new();
        let device = harness.register("printer", "10.0.0.5", DeviceType::Printer).unwrap();
        assert_eq!(harness.store.devices().unwrap(), vec![device]);

        let sink: &dyn EventSink = &harness.mqtt_client;
        sink.publish("t/x", r#"{"online":false}"#.into()).await.unwrap();
        harness.assert_field_equals("t/x", "online", &Value::Bool(false)).unwrap();
        assert!(harness.assert_field_equals("t/x", "missing", &Value::Null).is_err());
    }
}
