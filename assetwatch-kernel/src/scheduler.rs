/**
 * PLANIFICATEUR - Déclenchement périodique des jobs
 *
 * Découverte toutes les N heures, vérifications toutes les N minutes.
 * Un intervalle à 0 désactive le job planifié (l'API HTTP reste disponible).
 * Un tour qui tombe pendant une exécution à la demande est simplement sauté.
 */

use crate::jobs::{JobError, Jobs};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

pub fn spawn_scheduler(
    jobs: Arc<Jobs>,
    discovery_every: Option<Duration>,
    checks_every: Option<Duration>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(period) = discovery_every {
        let jobs = jobs.clone();
        tracing::info!("découverte planifiée toutes les {}s", period.as_secs());
        handles.push(task::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match jobs.run_discovery(None).await {
                    Ok(_) => {}
                    Err(JobError::AlreadyRunning(job)) => tracing::debug!("{} déjà en cours, tour sauté", job),
                    Err(e) => tracing::error!("découverte planifiée en échec: {}", e),
                }
            }
        }));
    }

    if let Some(period) = checks_every {
        tracing::info!("vérifications planifiées toutes les {}s", period.as_secs());
        handles.push(task::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match jobs.run_checks().await {
                    Ok(_) => {}
                    Err(JobError::AlreadyRunning(job)) => tracing::debug!("{} déjà en cours, tour sauté", job),
                    Err(e) => tracing::error!("vérifications planifiées en échec: {}", e),
                }
            }
        }));
    }

    handles
}

/// Convertit un intervalle de config (0 = désactivé)
pub fn period(value: u64, unit: Duration) -> Option<Duration> {
    (value > 0).then(|| unit.saturating_mul(u32::try_from(value).unwrap_or(u32::MAX)))
}
