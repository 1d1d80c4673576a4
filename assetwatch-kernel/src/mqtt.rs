/**
 * PUBLICATION MQTT - Sink d'événements du kernel
 *
 * RÔLE :
 * Publie les événements du cœur (changement de statut, fin de découverte) sur
 * le broker configuré. L'eventloop rumqttc tourne dans sa propre tâche et
 * tient le HealthTracker à jour.
 */

use crate::config::MqttConf;
use crate::health::HealthTracker;
use assetwatch_core::error::EventError;
use assetwatch_core::events::EventSink;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task;

const REQUEST_QUEUE: usize = 64;

#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
}

impl MqttSink {
    /// Crée le client et démarre l'eventloop. La connexion se fait en tâche de
    /// fond : tant que le broker est absent, au plus REQUEST_QUEUE publications
    /// attendent en file, les suivantes sont refusées.
    pub fn connect(conf: &MqttConf, health: HealthTracker) -> Self {
        let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_QUEUE);

        health.mark_mqtt_connecting();
        tracing::info!("MQTT vers {}:{} (client {})", conf.host, conf.port, conf.client_id);

        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        tracing::info!("MQTT connecté");
                        health.mark_mqtt_connected();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT erreur: {:?}", e);
                        health.increment_reconnects();
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Self { client }
    }
}

#[async_trait]
impl EventSink for MqttSink {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), EventError> {
        // try_publish : file pleine = erreur immédiate, jamais d'attente
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| EventError::Transport(e.to_string()))
    }
}
