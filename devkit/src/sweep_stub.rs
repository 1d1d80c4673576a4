/*!
Sweep bouchon: renvoie une liste d'hôtes fixe ou simule une panne de l'outil
*/

use assetwatch_core::error::SweepError;
use assetwatch_core::sweep::{BulkSweep, SweptHost};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::time::Duration;

enum Script {
    Hosts(Vec<SweptHost>),
    Fail(String),
}

pub struct StubSweep {
    script: Script,
    delay: Duration,
    /// Blocs demandés, dans l'ordre
    requested: Mutex<Vec<Ipv4Net>>,
}

impl StubSweep {
    /// Sweep réussi renvoyant `hosts` (vide = réseau sans hôte actif)
    pub fn hosts(hosts: Vec<SweptHost>) -> Self {
        Self {
            script: Script::Hosts(hosts),
            delay: Duration::ZERO,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Sweep en panne: l'outil sort avec un code d'erreur
    pub fn failing(stderr: &str) -> Self {
        Self {
            script: Script::Fail(stderr.to_string()),
            delay: Duration::ZERO,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Durée simulée du sweep
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requested(&self) -> Vec<Ipv4Net> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl BulkSweep for StubSweep {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn sweep(&self, block: &Ipv4Net) -> Result<Vec<SweptHost>, SweepError> {
        self.requested.lock().push(*block);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.script {
            Script::Hosts(hosts) => Ok(hosts.clone()),
            Script::Fail(stderr) => Err(SweepError::NonZeroExit {
                code: Some(1),
                stderr: stderr.clone(),
            }),
        }
    }
}
