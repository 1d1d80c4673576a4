//! Discovery scanner: resolves the target block, runs the bulk sweep and
//! classifies every live host.

use crate::classify::{Classifier, Evidence};
use crate::error::{InputError, ScanError};
use crate::model::{clean_text, parse_cidr, DiscoveredHost, HardwareAddress};
use crate::netdetect;
use crate::sweep::{BulkSweep, SweptHost};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

pub const DEFAULT_CIDR: &str = "192.168.10.0/24";
/// Widest block a single sweep accepts (65 534 hosts).
pub const DEFAULT_MIN_PREFIX: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// Fixed block to sweep. When unset the local block is detected.
    pub cidr: Option<String>,
    /// Used when detection fails.
    pub default_cidr: String,
    /// Blocks with a shorter prefix are refused before sweeping.
    pub min_prefix: u8,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cidr: None,
            default_cidr: DEFAULT_CIDR.to_string(),
            min_prefix: DEFAULT_MIN_PREFIX,
        }
    }
}

/// How the swept block was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Requested,
    Configured,
    Detected,
    Fallback,
}

/// Snapshot of one sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub cidr: Ipv4Net,
    pub target_source: TargetSource,
    pub backend: String,
    pub ruleset_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub hosts: Vec<DiscoveredHost>,
    /// Evidence that was dropped or ignored while building `hosts`.
    pub warnings: Vec<String>,
}

type Detector = Arc<dyn Fn() -> Option<Ipv4Net> + Send + Sync>;

pub struct DiscoveryScanner {
    sweep: Arc<dyn BulkSweep>,
    classifier: Classifier,
    config: ScannerConfig,
    detector: Detector,
}

impl DiscoveryScanner {
    pub fn new(sweep: Arc<dyn BulkSweep>, classifier: Classifier, config: ScannerConfig) -> Self {
        Self {
            sweep,
            classifier,
            config,
            detector: Arc::new(netdetect::detect_local_block),
        }
    }

    /// Replaces interface-based detection, mainly for tests.
    pub fn with_detector<F>(mut self, detector: F) -> Self
    where
        F: Fn() -> Option<Ipv4Net> + Send + Sync + 'static,
    {
        self.detector = Arc::new(detector);
        self
    }

    /// Picks the block to sweep: explicit request, then configuration, then
    /// interface detection, then the configured default.
    ///
    /// Whatever the source, a block wider than `min_prefix` is refused.
    pub fn resolve_target(&self, requested: Option<&str>) -> Result<(Ipv4Net, TargetSource), InputError> {
        let (block, source) = self.pick_target(requested)?;
        if block.prefix_len() < self.config.min_prefix {
            return Err(InputError::BlockTooWide {
                cidr: block.to_string(),
                min_prefix: self.config.min_prefix,
            });
        }
        Ok((block, source))
    }

    fn pick_target(&self, requested: Option<&str>) -> Result<(Ipv4Net, TargetSource), InputError> {
        if let Some(raw) = requested {
            return Ok((parse_cidr(raw)?, TargetSource::Requested));
        }
        if let Some(raw) = self.config.cidr.as_deref() {
            return Ok((parse_cidr(raw)?, TargetSource::Configured));
        }
        if let Some(block) = (self.detector)() {
            return Ok((block, TargetSource::Detected));
        }
        let fallback = parse_cidr(&self.config.default_cidr)?;
        warn!(
            "Local network detection failed, falling back to default block {}. \
             This may not be the network you intend to scan",
            fallback
        );
        Ok((fallback, TargetSource::Fallback))
    }

    /// Sweeps a block and classifies every live host.
    ///
    /// A failed sweep is an error, never an empty report.
    pub async fn sweep(&self, requested: Option<&str>) -> Result<ScanReport, ScanError> {
        let (block, target_source) = self.resolve_target(requested)?;
        let started_at = OffsetDateTime::now_utc();
        info!("Starting {} sweep of {} ({:?})", self.sweep.name(), block, target_source);

        let swept = match self.sweep.sweep(&block).await {
            Ok(hosts) => hosts,
            Err(source) => {
                error!("Sweep of {} failed: {}", block, source);
                return Err(ScanError::Sweep {
                    cidr: block.to_string(),
                    source,
                });
            }
        };

        let discovered_at = OffsetDateTime::now_utc();
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        let mut hosts = Vec::with_capacity(swept.len());

        for raw in swept {
            let Some(address) = raw.address else {
                warnings.push("sweep reported a host without an IPv4 address".to_string());
                continue;
            };
            if !block.contains(&address) {
                warnings.push(format!("{address} is outside {block}, ignored"));
                continue;
            }
            if !seen.insert(address) {
                warnings.push(format!("{address} reported twice, keeping the first entry"));
                continue;
            }
            let evidence = self.evidence_for(address, &raw, &mut warnings);
            let classification = self.classifier.classify(&evidence);
            hosts.push(DiscoveredHost {
                address,
                hardware_address: evidence.hardware_address,
                vendor: evidence.vendor,
                resolved_name: evidence.resolved_name,
                device_type: classification.device_type,
                display_name: classification.display_name,
                discovered_at,
            });
        }

        hosts.sort_by_key(|h| h.address);
        for w in &warnings {
            warn!("Sweep of {}: {}", block, w);
        }
        info!("Sweep of {} complete: {} hosts", block, hosts.len());

        Ok(ScanReport {
            cidr: block,
            target_source,
            backend: self.sweep.name().to_string(),
            ruleset_version: self.classifier.ruleset_version().to_string(),
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            hosts,
            warnings,
        })
    }

    fn evidence_for(
        &self,
        address: std::net::Ipv4Addr,
        raw: &SweptHost,
        warnings: &mut Vec<String>,
    ) -> Evidence {
        let hardware_address = match raw.hardware_address.as_deref() {
            None => None,
            Some(text) => match HardwareAddress::from_evidence(text) {
                Ok(mac) => mac,
                Err(e) => {
                    warnings.push(format!("{address}: {e}, hardware address dropped"));
                    None
                }
            },
        };
        Evidence {
            address,
            vendor: clean_text(raw.vendor.as_deref()),
            hardware_address,
            open_ports: raw.open_ports.clone(),
            resolved_name: clean_text(raw.hostname.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;
    use crate::model::DeviceType;
    use async_trait::async_trait;

    struct FixedSweep(Vec<SweptHost>);

    #[async_trait]
    impl BulkSweep for FixedSweep {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn sweep(&self, _block: &Ipv4Net) -> Result<Vec<SweptHost>, SweepError> {
            Ok(self.0.clone())
        }
    }

    fn scanner(hosts: Vec<SweptHost>) -> DiscoveryScanner {
        DiscoveryScanner::new(
            Arc::new(FixedSweep(hosts)),
            Classifier::default(),
            ScannerConfig::default(),
        )
        .with_detector(|| None)
    }

    #[test]
    fn test_resolve_target_order() {
        let s = scanner(vec![]);
        assert_eq!(
            s.resolve_target(Some("10.0.0.0/24")).unwrap(),
            ("10.0.0.0/24".parse().unwrap(), TargetSource::Requested)
        );
        assert_eq!(
            s.resolve_target(None).unwrap(),
            (DEFAULT_CIDR.parse().unwrap(), TargetSource::Fallback)
        );
        let detected = scanner(vec![]).with_detector(|| "172.16.5.0/24".parse().ok());
        assert_eq!(detected.resolve_target(None).unwrap().1, TargetSource::Detected);
        assert!(s.resolve_target(Some("10.0.0.300/24")).is_err());
        assert!(matches!(
            s.resolve_target(Some("10.0.0.0/8")),
            Err(InputError::BlockTooWide { min_prefix: 16, .. })
        ));
        assert!(s.resolve_target(Some("10.0.0.0/16")).is_ok());
    }

    #[tokio::test]
    async fn test_bad_evidence_is_dropped_not_fatal() {
        let s = scanner(vec![
            SweptHost {
                hardware_address: Some("not-a-mac".into()),
                vendor: Some("unknown".into()),
                hostname: Some("не определен".into()),
                ..SweptHost::at("10.0.0.9".parse().unwrap())
            },
            SweptHost::at("192.168.99.1".parse().unwrap()),
        ]);
        let report = s.sweep(Some("10.0.0.0/24")).await.unwrap();
        assert_eq!(report.hosts.len(), 1);
        let host = &report.hosts[0];
        assert_eq!(host.hardware_address, None);
        assert_eq!(host.vendor, None);
        assert_eq!(host.resolved_name, None);
        assert_eq!(host.device_type, DeviceType::Unknown);
        assert_eq!(report.warnings.len(), 2);
    }
}
