//! Subnet occupancy and address lookups.

use crate::error::StoreError;
use crate::model::{RegisteredDevice, Subnet};
use crate::store::InventoryStore;
use ipnet::Ipv4Net;
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetStats {
    pub cidr: Ipv4Net,
    pub total: u64,
    pub occupied: u64,
    pub free: u64,
    /// `0.0` when the block has no usable address.
    pub percent: f64,
}

/// First and last usable host address. `None` for /31 and /32.
pub fn usable_range(block: &Ipv4Net) -> Option<(Ipv4Addr, Ipv4Addr)> {
    if block.prefix_len() > 30 {
        return None;
    }
    let first = u32::from(block.network()) + 1;
    let last = u32::from(block.broadcast()) - 1;
    Some((Ipv4Addr::from(first), Ipv4Addr::from(last)))
}

/// `2^(32 - prefix) - 2`, and `0` for /31 and /32.
pub fn usable_count(block: &Ipv4Net) -> u64 {
    match block.prefix_len() {
        p if p > 30 => 0,
        p => (1u64 << (32 - u32::from(p))) - 2,
    }
}

fn is_usable(block: &Ipv4Net, address: Ipv4Addr) -> bool {
    usable_range(block).is_some_and(|(first, last)| first <= address && address <= last)
}

/// Occupancy of `block` given the addresses claimed by devices.
///
/// Only usable addresses count, so `occupied + free == total` always holds.
pub fn occupancy<I>(block: &Ipv4Net, assigned: I) -> SubnetStats
where
    I: IntoIterator<Item = Ipv4Addr>,
{
    let total = usable_count(block);
    let occupied = assigned
        .into_iter()
        .filter(|a| is_usable(block, *a))
        .collect::<BTreeSet<_>>()
        .len() as u64;
    let percent = if total == 0 {
        0.0
    } else {
        occupied as f64 / total as f64 * 100.0
    };
    SubnetStats {
        cidr: *block,
        total,
        occupied,
        free: total - occupied,
        percent,
    }
}

/// Answers occupancy questions from the registered inventory.
pub struct OccupancyTracker {
    store: Arc<dyn InventoryStore>,
}

impl OccupancyTracker {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    fn claimed_addresses(&self) -> Result<Vec<Ipv4Addr>, StoreError> {
        Ok(self.store.devices()?.into_iter().filter_map(|d| d.address).collect())
    }

    pub fn stats(&self, subnet: &Subnet) -> Result<SubnetStats, StoreError> {
        Ok(occupancy(&subnet.cidr, self.claimed_addresses()?))
    }

    pub fn stats_by_id(&self, id: u64) -> Result<SubnetStats, StoreError> {
        let subnet = self.store.subnet(id)?.ok_or(StoreError::SubnetNotFound(id))?;
        self.stats(&subnet)
    }

    /// The device claiming `address`, if any.
    pub fn lookup(&self, address: Ipv4Addr) -> Result<Option<RegisteredDevice>, StoreError> {
        self.store.device_by_address(address)
    }

    /// Most specific registered subnet containing `address`.
    pub fn subnet_for(&self, address: Ipv4Addr) -> Result<Option<Subnet>, StoreError> {
        Ok(self
            .store
            .subnets()?
            .into_iter()
            .filter(|s| s.cidr.contains(&address))
            .max_by_key(|s| s.cidr.prefix_len()))
    }

    /// Up to `limit` unclaimed usable addresses, lowest first.
    pub fn free_addresses(&self, subnet: &Subnet, limit: usize) -> Result<Vec<Ipv4Addr>, StoreError> {
        let Some((first, last)) = usable_range(&subnet.cidr) else {
            return Ok(Vec::new());
        };
        let claimed: BTreeSet<Ipv4Addr> = self.claimed_addresses()?.into_iter().collect();
        Ok((u32::from(first)..=u32::from(last))
            .map(Ipv4Addr::from)
            .filter(|a| !claimed.contains(a))
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_usable_count() {
        assert_eq!(usable_count(&net("10.0.0.0/8")), 16_777_214);
        assert_eq!(usable_count(&net("192.168.1.0/24")), 254);
        assert_eq!(usable_count(&net("192.168.1.0/30")), 2);
        assert_eq!(usable_count(&net("192.168.1.0/31")), 0);
        assert_eq!(usable_count(&net("192.168.1.1/32")), 0);
        assert_eq!(usable_count(&net("0.0.0.0/0")), 4_294_967_294);
    }

    #[test]
    fn test_total_matches_formula_for_every_prefix() {
        for p in 0u8..=32 {
            let block = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), p).unwrap().trunc();
            let stats = occupancy(&block, []);
            let expected = if p > 30 { 0 } else { 2u64.pow(32 - u32::from(p)) - 2 };
            assert_eq!(stats.total, expected, "prefix {p}");
            assert_eq!(stats.occupied + stats.free, stats.total);
            assert_eq!(stats.percent, 0.0);
        }
    }

    #[test]
    fn test_occupancy_counts_usable_distinct_addresses() {
        let block = net("192.168.1.0/24");
        let assigned: Vec<Ipv4Addr> = ["192.168.1.0", "192.168.1.10", "192.168.1.10", "192.168.1.255", "10.0.0.1"]
            .iter()
            .map(|a| a.parse().unwrap())
            .collect();
        let stats = occupancy(&block, assigned);
        assert_eq!(stats.occupied, 1);
        assert_eq!(stats.free, 253);
    }

    #[test]
    fn test_tiny_blocks_report_zero_percent() {
        let stats = occupancy(&net("10.1.1.1/32"), ["10.1.1.1".parse().unwrap()]);
        assert_eq!((stats.total, stats.occupied, stats.free), (0, 0, 0));
        assert_eq!(stats.percent, 0.0);
    }
}
