/*!
Prober scripté pour tester le moniteur sans réseau

Chaque couple (adresse, port) reçoit un résultat programmé; tout le reste est
refusé. Le prober enregistre les appels et le pic de sondes simultanées.
*/

use assetwatch_core::probe::{ProbeFailure, ProbeOutcome, Prober};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct ScriptedProber {
    outcomes: Mutex<HashMap<(Ipv4Addr, u16), ProbeOutcome>>,
    latency: Mutex<HashMap<Ipv4Addr, Duration>>,
    default_latency: Duration,
    calls: Mutex<Vec<(Ipv4Addr, u16)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedProber {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            latency: Mutex::new(HashMap::new()),
            default_latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Latence simulée de chaque sonde (utile pour mesurer la concurrence)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Latence spécifique à une adresse
    pub fn set_latency(&self, address: Ipv4Addr, latency: Duration) {
        self.latency.lock().insert(address, latency);
    }

    /// Programme un port ouvert qui répond en `response_ms`
    pub fn open(&self, address: Ipv4Addr, port: u16, response_ms: f64) {
        let outcome = ProbeOutcome {
            reachable: true,
            elapsed_ms: Some(response_ms),
            error: None,
        };
        self.outcomes.lock().insert((address, port), outcome);
    }

    /// Programme un échec précis (timeout, unreachable...)
    pub fn fail(&self, address: Ipv4Addr, port: u16, failure: ProbeFailure) {
        self.outcomes
            .lock()
            .insert((address, port), ProbeOutcome::failed(failure));
    }

    /// Remet tous les ports d'une adresse à l'état "refusé"
    pub fn close_all(&self, address: Ipv4Addr) {
        self.outcomes.lock().retain(|(a, _), _| *a != address);
    }

    pub fn calls(&self) -> Vec<(Ipv4Addr, u16)> {
        self.calls.lock().clone()
    }

    /// Ports sondés pour une adresse, dans l'ordre des appels
    pub fn ports_probed(&self, address: Ipv4Addr) -> Vec<u16> {
        self.calls
            .lock()
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, p)| *p)
            .collect()
    }

    /// Pic de sondes en cours au même moment
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: Ipv4Addr, port: u16, timeout: Duration) -> ProbeOutcome {
        self.calls.lock().push((address, port));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self
            .latency
            .lock()
            .get(&address)
            .copied()
            .unwrap_or(self.default_latency);
        let outcome = if latency >= timeout && !timeout.is_zero() {
            tokio::time::sleep(timeout).await;
            ProbeOutcome::failed(ProbeFailure::Timeout)
        } else {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.outcomes
                .lock()
                .get(&(address, port))
                .cloned()
                .unwrap_or_else(|| ProbeOutcome::failed(ProbeFailure::Refused))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let prober = ScriptedProber::new();
        let ip: Ipv4Addr = "10.0.0.5".parse().unwrap();
        prober.open(ip, 80, 3.0);

        let open = prober.probe(ip, 80, Duration::from_secs(1)).await;
        let closed = prober.probe(ip, 9100, Duration::from_secs(1)).await;
        assert!(open.reachable);
        assert_eq!(closed.error, Some(ProbeFailure::Refused));
        assert_eq!(prober.ports_probed(ip), vec![80, 9100]);
        assert_eq!(prober.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_latency_beyond_timeout_is_a_timeout() {
        let ip: Ipv4Addr = "10.0.0.6".parse().unwrap();
        let prober = ScriptedProber::new();
        prober.open(ip, 80, 1.0);
        prober.set_latency(ip, Duration::from_millis(50));
        let outcome = prober.probe(ip, 80, Duration::from_millis(10)).await;
        assert_eq!(outcome.error, Some(ProbeFailure::Timeout));
    }
}
