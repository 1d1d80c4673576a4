use assetwatch_core::error::MonitorError;
use assetwatch_core::model::{DeviceId, DeviceStatus, DeviceType, DeviceUpdate};
use assetwatch_core::monitor::{MonitorConfig, PortPolicy, ReachabilityMonitor};
use assetwatch_core::probe::ProbeFailure;
use assetwatch_core::store::{InventoryStore, MemoryInventory};
use assetwatch_devkit::test_utils::{ip, new_device};
use assetwatch_devkit::{ScriptedProber, TestHarness};
use std::sync::Arc;
use std::time::Duration;

fn fast_policy() -> MonitorConfig {
    MonitorConfig {
        concurrency: 4,
        ports: PortPolicy {
            primary_timeout_ms: 500,
            fallback_timeout_ms: 500,
            ..Default::default()
        },
        uptime_window_hours: 24,
    }
}

#[tokio::test]
async fn results_come_back_in_id_order_with_bounded_concurrency() {
    let harness = TestHarness::with_latency(Duration::from_millis(10));
    let mut devices = Vec::new();
    for i in 1..=12u8 {
        let address = format!("10.0.1.{i}");
        devices.push(harness.register(&format!("p{i}"), &address, DeviceType::Printer).unwrap());
        harness.prober.open(ip(&address), 9100, 1.0);
        // Earlier devices finish last
        harness
            .prober
            .set_latency(ip(&address), Duration::from_millis(5 * u64::from(13 - i)));
    }

    let monitor = harness.monitor(fast_policy());
    let reports = monitor.check_all(&devices).await;

    let ids: Vec<DeviceId> = reports.iter().map(|r| r.result.device_id).collect();
    let expected: Vec<DeviceId> = devices.iter().map(|d| d.id).collect();
    assert_eq!(ids, expected);
    assert!(reports.iter().all(|r| r.result.reachable && r.persist_error.is_none()));
    assert!(harness.prober.max_in_flight() <= 4);
    assert!(harness.prober.max_in_flight() > 1);
}

#[tokio::test]
async fn devices_without_address_are_not_probed() {
    let harness = TestHarness::new();
    let a = harness.register("a", "10.0.2.1", DeviceType::Printer).unwrap();
    let b = harness
        .store
        .insert_device(new_device("no address", None, DeviceType::Printer))
        .unwrap();

    let monitor = harness.monitor(fast_policy());
    let reports = monitor.check_all(&[a.clone(), b.clone()]).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result.device_id, a.id);

    assert!(matches!(
        monitor.check_device(&b).await,
        Err(MonitorError::NoAddress(id)) if id == b.id
    ));
    assert!(matches!(
        monitor.check_device_by_id(DeviceId(4242)).await,
        Err(MonitorError::UnknownDevice(_))
    ));
}

#[tokio::test]
async fn status_follows_latest_check_and_last_seen_never_regresses() {
    let harness = TestHarness::new();
    let device = harness.register("p", "10.0.3.1", DeviceType::Printer).unwrap();
    let address = ip("10.0.3.1");
    let monitor = harness.monitor(fast_policy());

    harness.prober.open(address, 9100, 2.5);
    let up = monitor.check_device_by_id(device.id).await.unwrap();
    let up_status = up.status.clone().unwrap();
    assert!(up_status.online);
    assert!(!up.transitioned);
    let seen = up_status.last_seen.unwrap();

    harness.prober.close_all(address);
    let down = monitor.check_device_by_id(device.id).await.unwrap();
    let down_status = down.status.clone().unwrap();
    assert!(!down_status.online);
    assert!(down.transitioned);
    assert_eq!(down_status.last_seen, Some(seen));
    assert_eq!(down_status.response_time_ms, up_status.response_time_ms);
    assert!(down_status.has_error);
    assert!(down_status.last_error.as_deref().unwrap_or("").contains("all ports failed"));
    assert_eq!(down_status.uptime_24h, 50.0);

    harness.prober.open(address, 9100, 2.5);
    let again = monitor.check_device_by_id(device.id).await.unwrap();
    let again_status = again.status.unwrap();
    assert!(again_status.online);
    assert!(again_status.last_seen.unwrap() >= seen);
    assert!(!again_status.has_error);

    let history = harness.store.latest_checks(device.id, 10).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[0].reachable);
    assert!(!history[1].reachable);
    assert_eq!(history[1].response_time_ms, None);
    assert!(history[1].failure_reason.is_some());
}

#[tokio::test]
async fn answering_only_on_a_fallback_port_raises_a_warning() {
    let harness = TestHarness::new();
    let device = harness.register("p", "10.0.4.1", DeviceType::Printer).unwrap();
    harness.prober.open(ip("10.0.4.1"), 631, 4.0);
    harness.prober.fail(ip("10.0.4.1"), 9100, ProbeFailure::Timeout);

    let report = harness
        .monitor(fast_policy())
        .check_device_by_id(device.id)
        .await
        .unwrap();
    let status = report.status.unwrap();
    assert!(status.online);
    assert!(status.has_warning);
    assert_eq!(report.result.port, Some(631));
    assert_eq!(report.result.attempts, 3);
}

#[tokio::test]
async fn inventory_run_filters_type_and_skips_decommissioned() {
    let harness = TestHarness::new();
    let printer = harness.register("printer", "10.0.5.1", DeviceType::Printer).unwrap();
    let retired = harness.register("retired", "10.0.5.2", DeviceType::Printer).unwrap();
    harness.register("pc", "10.0.5.3", DeviceType::Workstation).unwrap();
    harness
        .store
        .update_device(
            retired.id,
            DeviceUpdate {
                status: Some(DeviceStatus::Decommissioned),
                ..Default::default()
            },
        )
        .unwrap();

    let monitor = harness.monitor(fast_policy());
    let printers = monitor.check_inventory(&[DeviceType::Printer]).await.unwrap();
    assert_eq!(printers.len(), 1);
    assert_eq!(printers[0].result.device_id, printer.id);

    let all = monitor.check_inventory(&[]).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(harness.store.current_status(retired.id).unwrap().is_none());
}

#[tokio::test]
async fn abandoned_batch_keeps_completed_checks() {
    let harness = TestHarness::with_latency(Duration::from_millis(40));
    let mut devices = Vec::new();
    for i in 1..=10u8 {
        let address = format!("10.0.6.{i}");
        devices.push(harness.register(&format!("p{i}"), &address, DeviceType::Printer).unwrap());
        harness.prober.open(ip(&address), 9100, 1.0);
    }
    let monitor = harness.monitor(MonitorConfig {
        concurrency: 2,
        ..fast_policy()
    });

    let outcome = tokio::time::timeout(Duration::from_millis(110), monitor.check_all(&devices)).await;
    assert!(outcome.is_err(), "batch should still be running");

    let recorded = devices
        .iter()
        .filter(|d| !harness.store.latest_checks(d.id, 1).unwrap().is_empty())
        .count();
    assert!(recorded >= 1, "completed probes must be persisted");
    assert!(recorded < devices.len());
    for d in &devices {
        let has_check = !harness.store.latest_checks(d.id, 1).unwrap().is_empty();
        let has_status = harness.store.current_status(d.id).unwrap().is_some();
        assert_eq!(has_check, has_status);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_and_manual_checks_reach_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.json");
    let store = Arc::new(MemoryInventory::open(&path).unwrap());
    let prober = Arc::new(ScriptedProber::new());

    let mut devices = Vec::new();
    for i in 1..=6u8 {
        let address = format!("10.0.7.{i}");
        devices.push(
            store
                .insert_device(new_device(&format!("p{i}"), Some(&address), DeviceType::Printer))
                .unwrap(),
        );
        if i % 2 == 0 {
            prober.open(ip(&address), 9100, 1.0);
        }
    }
    let monitor = ReachabilityMonitor::new(store.clone(), prober.clone(), fast_policy());

    let reports = monitor.check_all(&devices).await;
    assert_eq!(reports.len(), 6);
    let reopened = MemoryInventory::open(&path).unwrap();
    assert_eq!(reopened.statuses().unwrap().len(), 6);
    for d in &devices {
        assert_eq!(reopened.latest_checks(d.id, 10).unwrap().len(), 1);
    }

    prober.open(ip("10.0.7.1"), 9100, 1.0);
    let report = monitor.check_device_by_id(devices[0].id).await.unwrap();
    assert!(report.transitioned);
    let reopened = MemoryInventory::open(&path).unwrap();
    assert!(reopened.current_status(devices[0].id).unwrap().unwrap().online);
}
