//! Device classification from sweep evidence.
//!
//! Two independent cascades run over the same [`Evidence`]: the type cascade
//! (vendor, OUI, open ports, fallback) and the display-name cascade. Both are
//! pure, so identical evidence always yields an identical [`Classification`].

use crate::model::{clean_text, DeviceType, HardwareAddress};
use crate::rules::Ruleset;
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Raw facts gathered about one live host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub address: Ipv4Addr,
    pub vendor: Option<String>,
    pub hardware_address: Option<HardwareAddress>,
    /// `None` when no port scan was performed, as opposed to "no port open".
    pub open_ports: Option<BTreeSet<u16>>,
    pub resolved_name: Option<String>,
}

impl Evidence {
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            vendor: None,
            hardware_address: None,
            open_ports: None,
            resolved_name: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_hardware_address(mut self, mac: HardwareAddress) -> Self {
        self.hardware_address = Some(mac);
        self
    }

    pub fn with_open_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.open_ports = Some(ports.into_iter().collect());
        self
    }

    pub fn with_resolved_name(mut self, name: impl Into<String>) -> Self {
        self.resolved_name = Some(name.into());
        self
    }
}

/// Which rule of the type cascade produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Vendor,
    Oui,
    Ports,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub device_type: DeviceType,
    pub display_name: String,
    pub matched_by: MatchedBy,
}

/// Applies a [`Ruleset`] to evidence. Cheap to copy; holds only static tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    rules: Ruleset,
}

impl Classifier {
    pub fn new(rules: Ruleset) -> Self {
        Self { rules }
    }

    pub fn ruleset_version(&self) -> &'static str {
        self.rules.version
    }

    pub fn classify(&self, evidence: &Evidence) -> Classification {
        let (device_type, matched_by) = self.infer_type(evidence);
        let display_name = self.display_name(evidence, device_type);
        Classification {
            device_type,
            display_name,
            matched_by,
        }
    }

    /// Type cascade: vendor, then OUI (printer, voip, network), then ports.
    pub fn infer_type(&self, evidence: &Evidence) -> (DeviceType, MatchedBy) {
        if let Some(vendor) = clean_text(evidence.vendor.as_deref()) {
            let vendor = vendor.to_lowercase();
            for rule in self.rules.vendors {
                if rule.keywords.iter().any(|kw| contains_word(&vendor, kw)) {
                    return (rule.device_type, MatchedBy::Vendor);
                }
            }
        }

        if let Some(mac) = evidence.hardware_address {
            let oui = mac.oui();
            for rule in self.rules.ouis {
                if rule.prefixes.contains(&oui) {
                    return (rule.device_type, MatchedBy::Oui);
                }
            }
        }

        if let Some(ports) = &evidence.open_ports {
            for rule in self.rules.ports {
                if rule.ports.iter().any(|p| ports.contains(p)) {
                    return (rule.device_type, MatchedBy::Ports);
                }
            }
        }

        (DeviceType::Unknown, MatchedBy::Fallback)
    }

    /// Name cascade: resolved name, sanitized vendor, then the address.
    pub fn display_name(&self, evidence: &Evidence, device_type: DeviceType) -> String {
        let role = device_type.role();
        let address = evidence.address.to_string();

        if let Some(name) = clean_text(evidence.resolved_name.as_deref()) {
            if name != address {
                return format!("{role}: {name}");
            }
        }

        if let Some(vendor) = clean_text(evidence.vendor.as_deref()) {
            return format!("{role}: {}", self.sanitize_vendor(&vendor));
        }

        format!("{role} ({address})")
    }

    /// Strips legal-entity suffixes ("Inc.", "Corp.", "GmbH", ...) from a vendor.
    ///
    /// Returns the trimmed input unchanged if nothing else would remain.
    pub fn sanitize_vendor(&self, vendor: &str) -> String {
        let kept: Vec<&str> = vendor
            .split_whitespace()
            .filter(|token| {
                let bare = token.trim_matches(|c| c == ',' || c == '.').to_lowercase();
                !bare.is_empty() && !self.rules.legal_suffixes.contains(&bare.as_str())
            })
            .collect();

        if kept.is_empty() {
            return vendor.trim().to_string();
        }
        kept.join(" ")
            .trim_end_matches(|c| c == ',' || c == '.')
            .to_string()
    }
}

/// Keyword found as a whole word: "lg" matches "LG Electronics", not "Allgon".
fn contains_word(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + keyword.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_vendor_rule_beats_port_rule() {
        let classifier = Classifier::default();
        let evidence = Evidence::new(ip("10.0.0.1"))
            .with_vendor("Cisco Systems")
            .with_open_ports([22]);
        let c = classifier.classify(&evidence);
        assert_eq!(c.device_type, DeviceType::NetworkDevice);
        assert_eq!(c.matched_by, MatchedBy::Vendor);
    }

    #[test]
    fn test_printer_oui_without_vendor() {
        let classifier = Classifier::default();
        let mac: HardwareAddress = "00:01:E6:AA:BB:CC".parse().unwrap();
        let evidence = Evidence::new(ip("10.0.0.2")).with_hardware_address(mac);
        let c = classifier.classify(&evidence);
        assert_eq!(c.device_type, DeviceType::Printer);
        assert_eq!(c.matched_by, MatchedBy::Oui);
        assert_eq!(c.display_name, "Printer (10.0.0.2)");
    }

    #[test]
    fn test_oui_priority_order() {
        let classifier = Classifier::default();
        let voip: HardwareAddress = "00:0b:82:01:02:03".parse().unwrap();
        let net: HardwareAddress = "00:50:56:01:02:03".parse().unwrap();
        let e1 = Evidence::new(ip("10.0.0.3")).with_hardware_address(voip);
        let e2 = Evidence::new(ip("10.0.0.4")).with_hardware_address(net);
        assert_eq!(classifier.infer_type(&e1).0, DeviceType::VoipPhone);
        assert_eq!(classifier.infer_type(&e2).0, DeviceType::NetworkDevice);
    }

    #[test]
    fn test_port_rules() {
        let classifier = Classifier::default();
        let mgmt = Evidence::new(ip("10.0.0.5")).with_open_ports([161, 8080]);
        let web = Evidence::new(ip("10.0.0.6")).with_open_ports([443]);
        let none = Evidence::new(ip("10.0.0.7")).with_open_ports([]);
        assert_eq!(classifier.infer_type(&mgmt).0, DeviceType::NetworkDevice);
        assert_eq!(classifier.infer_type(&web).0, DeviceType::WebExposedDevice);
        assert_eq!(classifier.classify(&web).display_name, "Web-exposed device (10.0.0.6)");
        assert_eq!(classifier.infer_type(&none), (DeviceType::Unknown, MatchedBy::Fallback));
    }

    #[test]
    fn test_sentinel_vendor_is_ignored() {
        let classifier = Classifier::default();
        let evidence = Evidence::new(ip("10.0.0.8")).with_vendor("unknown");
        let c = classifier.classify(&evidence);
        assert_eq!(c.device_type, DeviceType::Unknown);
        assert_eq!(c.display_name, "Unknown device (10.0.0.8)");
    }

    #[test]
    fn test_vendor_keywords_match_whole_words() {
        let classifier = Classifier::default();
        let vendor_type =
            |vendor: &str| classifier.infer_type(&Evidence::new(ip("10.0.0.11")).with_vendor(vendor));

        assert_eq!(vendor_type("LG Electronics"), (DeviceType::Mobile, MatchedBy::Vendor));
        assert_eq!(vendor_type("Brother Industries, Ltd."), (DeviceType::Printer, MatchedBy::Vendor));
        assert_eq!(vendor_type("Raspberry Pi Trading Ltd"), (DeviceType::Iot, MatchedBy::Vendor));
        assert_eq!(vendor_type("Allgon Systems AB"), (DeviceType::Unknown, MatchedBy::Fallback));
        assert_eq!(vendor_type("Elliott Brothers"), (DeviceType::Unknown, MatchedBy::Fallback));
        assert_eq!(vendor_type("Shenzhen Iotech"), (DeviceType::Unknown, MatchedBy::Fallback));

        assert!(contains_word("tp-link technologies", "tp-link"));
        assert!(contains_word("lg", "lg"));
        assert!(!contains_word("intellinet", "intel"));
    }

    #[test]
    fn test_hp_vendor_is_a_workstation() {
        let classifier = Classifier::default();
        let evidence = Evidence::new(ip("10.0.0.9")).with_vendor("HP Inc.");
        assert_eq!(classifier.infer_type(&evidence).0, DeviceType::Workstation);
    }

    #[test]
    fn test_display_name_cascade() {
        let classifier = Classifier::default();
        let named = Evidence::new(ip("10.0.0.10"))
            .with_vendor("Canon Inc.")
            .with_resolved_name("reception-mfp");
        assert_eq!(classifier.classify(&named).display_name, "Printer: reception-mfp");

        let name_is_ip = Evidence::new(ip("10.0.0.10"))
            .with_vendor("Canon Inc.")
            .with_resolved_name("10.0.0.10");
        assert_eq!(classifier.classify(&name_is_ip).display_name, "Printer: Canon");

        let bare = Evidence::new(ip("10.0.0.11"));
        assert_eq!(classifier.classify(&bare).display_name, "Unknown device (10.0.0.11)");
    }

    #[test]
    fn test_sanitize_vendor() {
        let classifier = Classifier::default();
        assert_eq!(classifier.sanitize_vendor("Micro-Star Intl Co., Ltd."), "Micro-Star");
        assert_eq!(classifier.sanitize_vendor("Hikvision Digital Technology"), "Hikvision Digital");
        assert_eq!(classifier.sanitize_vendor("Bosch GmbH"), "Bosch");
        assert_eq!(classifier.sanitize_vendor("Inc."), "Inc.");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::default();
        let evidence = Evidence::new(ip("10.0.0.12"))
            .with_vendor("Yealink Network Technology Co., Ltd.")
            .with_open_ports([80, 5060]);
        assert_eq!(classifier.classify(&evidence), classifier.classify(&evidence));
        assert_eq!(classifier.classify(&evidence).display_name, "IP phone: Yealink Network");
    }
}
