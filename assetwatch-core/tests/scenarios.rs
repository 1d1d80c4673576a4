//! End-to-end behaviour of each component on small, concrete inputs.

use assetwatch_core::classify::{Classifier, Evidence};
use assetwatch_core::model::{DeviceType, NewSubnet};
use assetwatch_core::monitor::MonitorConfig;
use assetwatch_core::reconcile::reconcile;
use assetwatch_core::store::InventoryStore;
use assetwatch_core::subnet::OccupancyTracker;
use assetwatch_devkit::test_utils::{discovered, ip, new_device};
use assetwatch_devkit::TestHarness;

#[test]
fn vendor_rule_fires_before_port_rule() {
    let evidence = Evidence::new(ip("10.0.0.1"))
        .with_vendor("Cisco Systems")
        .with_open_ports([22]);
    let c = Classifier::default().classify(&evidence);
    assert_eq!(c.device_type, DeviceType::NetworkDevice);
    assert_eq!(c.device_type.as_str(), "network-device");
}

#[test]
fn printer_oui_classifies_without_vendor() {
    let evidence = Evidence::new(ip("10.0.0.2"))
        .with_hardware_address("00:01:E6:AA:BB:CC".parse().unwrap());
    let c = Classifier::default().classify(&evidence);
    assert_eq!(c.device_type, DeviceType::Printer);
}

#[tokio::test]
async fn fallback_port_answers_when_primary_is_closed() {
    let harness = TestHarness::new();
    let device = harness.register("front desk", "10.0.0.5", DeviceType::Printer).unwrap();
    harness.prober.open(ip("10.0.0.5"), 80, 7.0);

    let monitor = harness.monitor(MonitorConfig::default());
    let result = monitor.check_device(&device).await.unwrap();

    assert!(result.reachable);
    assert_eq!(result.port, Some(80));
    assert!(result.fallback_used);
    // 9100, 515, 631 fail before 80 answers
    assert_eq!(harness.prober.ports_probed(ip("10.0.0.5")), vec![9100, 515, 631, 80]);
}

#[test]
fn known_address_is_skipped_by_reconciliation() {
    let harness = TestHarness::new();
    harness.register("existing", "10.0.0.5", DeviceType::Printer).unwrap();

    let report = reconcile(&[discovered("10.0.0.5")], harness.store.as_ref()).unwrap();
    assert_eq!(report.added.len(), 0);
    assert_eq!(report.skipped.len(), 1);
}

#[test]
fn subnet_occupancy_of_a_slash_24() {
    let harness = TestHarness::new();
    let subnet = harness
        .store
        .insert_subnet(NewSubnet {
            cidr: "192.168.1.0/24".parse().unwrap(),
            purpose: "office".into(),
            vlan_id: Some(10),
            location: Some("floor 2".into()),
        })
        .unwrap();
    for i in 1..=5 {
        harness
            .store
            .insert_device(new_device(&format!("pc{i}"), Some(&format!("192.168.1.{i}")), DeviceType::Workstation))
            .unwrap();
    }
    // Outside the block, must not count
    harness
        .store
        .insert_device(new_device("elsewhere", Some("10.9.9.9"), DeviceType::Workstation))
        .unwrap();

    let tracker = OccupancyTracker::new(harness.store());
    let stats = tracker.stats(&subnet).unwrap();
    assert_eq!(stats.total, 254);
    assert_eq!(stats.occupied, 5);
    assert_eq!(stats.free, 249);
    assert!((stats.percent - 1.97).abs() < 0.01);

    assert_eq!(tracker.lookup(ip("192.168.1.3")).unwrap().map(|d| d.name), Some("pc3".to_string()));
    assert!(tracker.lookup(ip("192.168.1.200")).unwrap().is_none());
    assert_eq!(
        tracker.free_addresses(&subnet, 3).unwrap(),
        vec![ip("192.168.1.6"), ip("192.168.1.7"), ip("192.168.1.8")]
    );
    assert_eq!(tracker.subnet_for(ip("192.168.1.77")).unwrap().map(|s| s.id), Some(subnet.id));
    assert_eq!(tracker.stats_by_id(subnet.id).unwrap(), stats);
    assert!(tracker.stats_by_id(999).is_err());
}
