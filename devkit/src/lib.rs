/*!
# AssetWatch DevKit - Stubs et Utilitaires pour les tests

Bibliothèque facilitant les tests du cœur assetwatch avec:
- Stub MQTT pour tester les événements sans broker
- Prober scripté (ports ouverts/fermés, latence, comptage de concurrence)
- Sweep bouchon (résultats fixes ou panne simulée)
- Harness regroupant inventaire, prober et bus d'événements
*/

pub mod mqtt_stub;
pub mod probe_stub;
pub mod sweep_stub;
pub mod test_utils;

pub use mqtt_stub::MockMqttClient;
pub use probe_stub::ScriptedProber;
pub use sweep_stub::StubSweep;
pub use test_utils::TestHarness;
