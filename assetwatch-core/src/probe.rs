//! Bounded-timeout TCP reachability probe.
//!
//! A probe never fails: timeouts, refusals and routing errors are reported
//! as data in [`ProbeOutcome`].

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Why a probe did not reach its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Refused,
    Unreachable,
    Other(String),
}

impl ProbeFailure {
    fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused => ProbeFailure::Refused,
            ErrorKind::TimedOut => ProbeFailure::Timeout,
            ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::AddrNotAvailable => ProbeFailure::Unreachable,
            _ => ProbeFailure::Other(err.to_string()),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => f.write_str("timeout"),
            ProbeFailure::Refused => f.write_str("refused"),
            ProbeFailure::Unreachable => f.write_str("unreachable"),
            ProbeFailure::Other(msg) => f.write_str(msg),
        }
    }
}

impl Serialize for ProbeFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of one probe attempt against one address and port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub reachable: bool,
    /// Only present when `reachable` is true.
    pub elapsed_ms: Option<f64>,
    pub error: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn reached(elapsed: Duration) -> Self {
        Self {
            reachable: true,
            elapsed_ms: Some(elapsed.as_secs_f64() * 1000.0),
            error: None,
        }
    }

    pub fn failed(failure: ProbeFailure) -> Self {
        Self {
            reachable: false,
            elapsed_ms: None,
            error: Some(failure),
        }
    }

    /// True when the host answered, even if only to refuse the connection.
    pub fn host_alive(&self) -> bool {
        self.reachable || matches!(self.error, Some(ProbeFailure::Refused))
    }
}

/// Single-port reachability test. Implementations must never panic or block
/// past `timeout`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: Ipv4Addr, port: u16, timeout: Duration) -> ProbeOutcome;
}

/// Plain TCP connect probe. The connection is dropped as soon as it completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: Ipv4Addr, port: u16, timeout: Duration) -> ProbeOutcome {
        let target = SocketAddr::from((address, port));
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                let elapsed = started.elapsed();
                drop(stream);
                ProbeOutcome::reached(elapsed)
            }
            Ok(Err(e)) => {
                tracing::trace!(%target, error = %e, "probe failed");
                ProbeOutcome::failed(ProbeFailure::from_io(&e))
            }
            // The pending connect future is dropped here, closing the socket.
            Err(_) => ProbeOutcome::failed(ProbeFailure::Timeout),
        }
    }
}
