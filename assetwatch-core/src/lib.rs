//! Network asset discovery and reachability monitoring.
//!
//! Data flow: [`scanner::DiscoveryScanner`] sweeps a block and classifies the
//! live hosts, [`reconcile::reconcile`] registers the new ones, and
//! [`monitor::ReachabilityMonitor`] probes registered devices and maintains
//! their current status. [`subnet::OccupancyTracker`] answers occupancy
//! questions from the same inventory.

pub mod classify;
pub mod error;
pub mod events;
pub mod model;
pub mod monitor;
pub mod netdetect;
pub mod probe;
pub mod reconcile;
pub mod rules;
pub mod scanner;
pub mod status;
pub mod store;
pub mod subnet;
pub mod sweep;

pub use classify::{Classification, Classifier, Evidence};
pub use error::{EventError, InputError, MonitorError, ScanError, StoreError, SweepError};
pub use model::{
    DeviceCurrentStatus, DeviceId, DeviceStatus, DeviceType, DeviceUpdate, DiscoveredHost,
    DiscoverySource, HardwareAddress, NewDevice, NewSubnet, ReachabilityCheck, RegisteredDevice,
    Subnet,
};
pub use monitor::{CheckReport, MonitorConfig, PortPolicy, ReachabilityCheckResult, ReachabilityMonitor};
pub use probe::{ProbeFailure, ProbeOutcome, Prober, TcpProber};
pub use reconcile::{reconcile, ReconcileReport};
pub use scanner::{DiscoveryScanner, ScanReport, ScannerConfig};
pub use store::{InventoryStore, MemoryInventory};
pub use subnet::{OccupancyTracker, SubnetStats};
pub use sweep::{BulkSweep, NmapSweep, NmapSweepConfig, SweptHost, TcpConnectSweep, TcpSweepConfig};
