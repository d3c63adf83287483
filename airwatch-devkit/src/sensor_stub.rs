/*!
Capteur scripté pour développement sans API PurpleAir

Rejoue une file de réponses (lectures ou erreurs) dans l'ordre, puis
éventuellement une lecture de repli à l'infini. Enregistre chaque appel
pour les assertions.
*/

use airwatch_core::{NestedRecord, SensorSource, SourceError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
enum Step {
    Reading(NestedRecord),
    Error(SourceError),
}

/// Stub de `SensorSource`; les clones partagent le même script.
#[derive(Clone, Default)]
pub struct ScriptedSensor {
    script: Arc<Mutex<VecDeque<Step>>>,
    fallback: Arc<Mutex<Option<NestedRecord>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capteur qui renvoie toujours la même lecture
    pub fn repeating(reading: Value) -> Self {
        let sensor = Self::new();
        *sensor.fallback.lock() = Some(into_nested(reading));
        sensor
    }

    /// Ajoute une lecture à la file
    pub fn push_reading(&self, reading: Value) -> &Self {
        self.script.lock().push_back(Step::Reading(into_nested(reading)));
        self
    }

    /// Ajoute une erreur à la file
    pub fn push_error(&self, error: SourceError) -> &Self {
        self.script.lock().push_back(Step::Error(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Identifiants de capteur demandés, dans l'ordre
    pub fn requested_ids(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl SensorSource for ScriptedSensor {
    async fn fetch_reading(&self, sensor_id: &str) -> Result<NestedRecord, SourceError> {
        self.calls.lock().push(sensor_id.to_string());
        tracing::debug!("[stub] fetch #{} for sensor {}", self.call_count(), sensor_id);

        let next = self.script.lock().pop_front();
        match next {
            Some(Step::Reading(reading)) => Ok(reading),
            Some(Step::Error(error)) => Err(error),
            None => self
                .fallback
                .lock()
                .clone()
                .ok_or_else(|| SourceError::Transport("scripted sensor exhausted".into())),
        }
    }
}

/// Les fixtures sont toujours des objets; le reste est une erreur de test.
fn into_nested(value: Value) -> NestedRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("scripted readings must be JSON objects, got {other}"),
    }
}
