/*!
Mock MQTT Client pour tester les événements sans broker

Enregistre tous les messages publiés et implémente `EventSink`, ce qui permet
de le brancher à la place du vrai client MQTT du kernel.
*/

use anyhow::Result;
use assetwatch_core::error::EventError;
use assetwatch_core::events::EventSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::QoS;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    /// Quand vrai, chaque publication échoue (broker injoignable)
    failing: Arc<Mutex<bool>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simule un broker injoignable pour les publications suivantes
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        if *self.failing.lock() {
            anyhow::bail!("mock broker unavailable");
        }
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };
        tracing::info!("📤 [MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().push(message);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last_msg) => Ok(Some(serde_json::from_slice(&last_msg.payload)?)),
            None => Ok(None),
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }
}

#[async_trait]
impl EventSink for MockMqttClient {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), EventError> {
        MockMqttClient::publish(self, topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| EventError::Transport(e.to_string()))
    }
}
