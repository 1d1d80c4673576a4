/**
 * CONFIGURATION KERNEL - Chargement de assetwatch.yaml
 *
 * RÔLE :
 * Décrit toutes les sections de configuration du kernel et les convertit en
 * configurations du cœur (scanner, sweep, moniteur).
 *
 * FONCTIONNEMENT :
 * - Chemin depuis ASSETWATCH_CONFIG (défaut : assetwatch.yaml)
 * - Fichier absent ou vide = configuration par défaut (notice dans les logs)
 * - Fichier invalide = erreur de démarrage, jamais de défaut silencieux
 * - Clés inconnues refusées (deny_unknown_fields) pour attraper les fautes de frappe
 */

use anyhow::{Context, Result};
use assetwatch_core::model::{DeviceType, NewSubnet};
use assetwatch_core::monitor::{MonitorConfig, PortPolicy};
use assetwatch_core::scanner::{ScannerConfig, DEFAULT_CIDR, DEFAULT_MIN_PREFIX};
use assetwatch_core::sweep::{NmapSweepConfig, TcpSweepConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const CONFIG_ENV: &str = "ASSETWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "assetwatch.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub data_dir: PathBuf,
    /// Absent = événements désactivés
    pub mqtt: Option<MqttConf>,
    pub discovery: DiscoveryConf,
    pub reachability: ReachabilityConf,
    /// Sous-réseaux enregistrés au démarrage (idempotent)
    pub subnets: Vec<NewSubnet>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: HttpConf::default(),
            data_dir: PathBuf::from("./data"),
            mqtt: None,
            discovery: DiscoveryConf::default(),
            reachability: ReachabilityConf::default(),
            subnets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConf {
    pub listen: SocketAddr,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConf {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Au-delà, l'événement est abandonné et le job continue
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "assetwatch-kernel".to_string()
}

fn default_publish_timeout_secs() -> u64 {
    5
}

impl MqttConf {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepBackend {
    Nmap,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConf {
    /// 0 = pas de découverte planifiée
    pub interval_hours: u64,
    pub cidr: Option<String>,
    pub default_cidr: String,
    /// Préfixe minimal accepté (/8 refusé avec la valeur par défaut /16)
    pub min_prefix: u8,
    pub backend: SweepBackend,
    pub nmap_path: String,
    pub nmap_timeout_secs: u64,
    /// Ports sondés pour collecter des indices de classification
    pub tcp_ports: Vec<u16>,
    /// Enregistre automatiquement les nouveaux hôtes après chaque balayage
    pub auto_register: bool,
}

impl Default for DiscoveryConf {
    fn default() -> Self {
        let nmap = NmapSweepConfig::default();
        Self {
            interval_hours: 6,
            cidr: None,
            default_cidr: DEFAULT_CIDR.to_string(),
            min_prefix: DEFAULT_MIN_PREFIX,
            backend: SweepBackend::Nmap,
            nmap_path: nmap.program,
            nmap_timeout_secs: nmap.timeout_secs,
            tcp_ports: TcpSweepConfig::default().ports,
            auto_register: true,
        }
    }
}

impl DiscoveryConf {
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            cidr: self.cidr.clone(),
            default_cidr: self.default_cidr.clone(),
            min_prefix: self.min_prefix,
        }
    }

    pub fn nmap_config(&self) -> NmapSweepConfig {
        NmapSweepConfig {
            program: self.nmap_path.clone(),
            timeout_secs: self.nmap_timeout_secs,
            ports: self.tcp_ports.clone(),
        }
    }

    pub fn tcp_config(&self) -> TcpSweepConfig {
        TcpSweepConfig {
            ports: self.tcp_ports.clone(),
            ..TcpSweepConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReachabilityConf {
    /// 0 = pas de vérification planifiée
    pub interval_minutes: u64,
    pub concurrency: usize,
    pub primary_port: u16,
    pub fallback_ports: Vec<u16>,
    pub primary_timeout_ms: u64,
    pub fallback_timeout_ms: u64,
    pub uptime_window_hours: u32,
    /// Vide = tous les types
    pub device_types: Vec<DeviceType>,
    /// Historique conservé, en jours
    pub retention_days: u32,
}

impl Default for ReachabilityConf {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            interval_minutes: 5,
            concurrency: monitor.concurrency,
            primary_port: monitor.ports.primary_port,
            fallback_ports: monitor.ports.fallback_ports,
            primary_timeout_ms: monitor.ports.primary_timeout_ms,
            fallback_timeout_ms: monitor.ports.fallback_timeout_ms,
            uptime_window_hours: monitor.uptime_window_hours,
            device_types: Vec::new(),
            retention_days: 30,
        }
    }
}

impl ReachabilityConf {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            concurrency: self.concurrency,
            ports: PortPolicy {
                primary_port: self.primary_port,
                fallback_ports: self.fallback_ports.clone(),
                primary_timeout_ms: self.primary_timeout_ms,
                fallback_timeout_ms: self.fallback_timeout_ms,
            },
            uptime_window_hours: self.uptime_window_hours,
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn load_config() -> Result<KernelConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> Result<KernelConfig> {
    if !path.exists() {
        tracing::info!("pas de {}, usage config par défaut", path.display());
        return Ok(KernelConfig::default());
    }
    let txt = fs::read_to_string(path)
        .await
        .with_context(|| format!("lecture de {}", path.display()))?;
    parse_config(&txt).with_context(|| format!("config invalide: {}", path.display()))
}
