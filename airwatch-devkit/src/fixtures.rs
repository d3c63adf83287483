/*!
Fixtures de réponses PurpleAir

Construit des réponses `GET /v1/sensors/{index}` au format de l'API:
- même forme quelle que soit la valeur, pour tester la stabilité du schéma
- `stats_a` présent, comme dans les vraies réponses
*/

use serde_json::{json, Value};

pub const SENSOR_ID: &str = "143856";

/// Réponse complète, toutes les moyennes dérivées de `pm25`.
pub fn purpleair_reading(pm25: f64) -> Value {
    json!({
        "api_version": "V1.0.11-0.0.42",
        "time_stamp": 1670000000,
        "data_time_stamp": 1669999980,
        "sensor": {
            "sensor_index": 143856,
            "name": "Backyard",
            "model": "PA-II",
            "location_type": 0,
            "private": 0,
            "latitude": 37.7749,
            "longitude": -122.4194,
            "altitude": 52,
            "rssi": -58,
            "confidence": 100,
            "humidity": 41,
            "temperature": 68,
            "pressure": 1012.3,
            "pm2.5": pm25,
            "stats": {
                "pm2.5": pm25,
                "pm2.5_10minute": pm25 + 0.5,
                "pm2.5_30minute": pm25 + 1.0,
                "pm2.5_60minute": pm25 + 1.5,
                "pm2.5_24hour": pm25 + 2.0,
                "time_stamp": 1669999980
            },
            "stats_a": {
                "pm2.5": pm25 - 0.1,
                "pm2.5_10minute": pm25 + 0.4,
                "time_stamp": 1669999980
            },
            "stats_b": {
                "pm2.5": pm25 + 0.1,
                "pm2.5_10minute": pm25 + 0.6,
                "time_stamp": 1669999980
            }
        }
    })
}

/// Même réponse avec un champ de plus dans `stats`.
pub fn drifted_reading() -> Value {
    let mut reading = purpleair_reading(1.0);
    reading["sensor"]["stats"]["pm2.5_1week"] = json!(3.3);
    reading
}

/// Exemple minimal: `sensor_id`, `sensor_stats_pm25`, `name` une fois aplati.
pub fn simple_reading() -> Value {
    json!({"sensor": {"id": 143856, "stats": {"pm25": 12.3}}, "name": "X"})
}
