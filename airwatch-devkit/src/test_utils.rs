/*!
Harness de test pour le pipeline d'enregistrement

Facilite l'écriture de tests avec:
- Répertoire d'exécution temporaire (supprimé à la fin du test)
- Construction du Recorder / Pipeline sur ce répertoire
- Lecture des historiques SQLite et CSV pour les assertions
*/

use crate::fixtures::SENSOR_ID;
use crate::sensor_stub::ScriptedSensor;
use airwatch_core::{Flattener, Pipeline, Recorder, RecorderContext};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use tempfile::TempDir;

/// Harness de test complet: un run directory jetable par test
pub struct TestHarness {
    _dir: TempDir,
    ctx: RecorderContext,
}

impl TestHarness {
    /// SQLite + CSV activés
    pub fn new() -> Self {
        Self::with_sinks(true, true)
    }

    pub fn with_sinks(sqlite: bool, csv: bool) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok(); // logs visibles avec --nocapture

        let dir = TempDir::new().expect("create temp run dir");
        let ctx = RecorderContext {
            run_dir: dir.path().to_path_buf(),
            sensor_id: SENSOR_ID.to_string(),
            sqlite,
            csv,
        };
        Self { _dir: dir, ctx }
    }

    pub fn context(&self) -> &RecorderContext {
        &self.ctx
    }

    pub fn sensor_id(&self) -> &str {
        &self.ctx.sensor_id
    }

    pub fn recorder(&self) -> Recorder {
        Recorder::open(&self.ctx).expect("open recorder")
    }

    /// Pipeline prêt à l'emploi avec aplatissement par défaut
    pub fn pipeline(&self, sensor: ScriptedSensor) -> Pipeline<ScriptedSensor> {
        self.pipeline_with(sensor, Flattener::default())
    }

    pub fn pipeline_with(&self, sensor: ScriptedSensor, flattener: Flattener) -> Pipeline<ScriptedSensor> {
        Pipeline::new(sensor, flattener, self.recorder(), self.sensor_id())
    }

    /// En-tête du CSV (vide si le fichier n'existe pas)
    pub fn csv_header(&self) -> Vec<String> {
        let path = self.ctx.csv_path();
        if !path.exists() {
            return Vec::new();
        }
        let mut reader = csv::Reader::from_path(&path).expect("open csv history");
        reader
            .headers()
            .expect("read csv header")
            .iter()
            .map(str::to_string)
            .collect()
    }

    /// Lignes de données du CSV, sans l'en-tête
    pub fn csv_rows(&self) -> Vec<Vec<String>> {
        let path = self.ctx.csv_path();
        if !path.exists() {
            return Vec::new();
        }
        let mut reader = csv::Reader::from_path(&path).expect("open csv history");
        reader
            .records()
            .map(|r| r.expect("read csv row").iter().map(str::to_string).collect())
            .collect()
    }

    /// Valeurs d'une colonne du CSV, dans l'ordre d'écriture
    pub fn csv_column(&self, name: &str) -> Vec<String> {
        let index = self
            .csv_header()
            .iter()
            .position(|h| h == name)
            .unwrap_or_else(|| panic!("no csv column {name}"));
        self.csv_rows().into_iter().map(|mut row| row.swap_remove(index)).collect()
    }

    fn sqlite(&self) -> Connection {
        Connection::open(self.ctx.sqlite_path()).expect("open sqlite history")
    }

    pub fn sqlite_columns(&self) -> Vec<String> {
        let conn = self.sqlite();
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", self.ctx.table_name()))
            .expect("prepare table_info");
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info")
            .collect::<Result<Vec<_>, _>>()
            .expect("read table_info");
        columns
    }

    pub fn sqlite_count(&self) -> u64 {
        let conn = self.sqlite();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", self.ctx.table_name()), [], |row| {
                row.get(0)
            })
            .expect("count rows");
        count as u64
    }

    /// Valeurs d'une colonne de la table, par ordre d'insertion
    pub fn sqlite_column(&self, name: &str) -> Vec<SqlValue> {
        let conn = self.sqlite();
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" ORDER BY rowid",
            name.replace('"', "\"\""),
            self.ctx.table_name()
        );
        let mut stmt = conn.prepare(&sql).expect("prepare select");
        let values = stmt
            .query_map([], |row| row.get::<_, SqlValue>(0))
            .expect("query column")
            .collect::<Result<Vec<_>, _>>()
            .expect("read column");
        values
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_harness_reads_back_both_sinks() {
        let harness = TestHarness::new();
        let mut pipeline = harness.pipeline(ScriptedSensor::repeating(fixtures::simple_reading()));

        pipeline.run_tick().await.unwrap();
        pipeline.run_tick().await.unwrap();

        assert_eq!(harness.csv_header(), vec!["sensor_id", "sensor_stats_pm25", "name"]);
        assert_eq!(harness.csv_rows().len(), 2);
        assert_eq!(harness.csv_column("name"), vec!["X", "X"]);
        assert_eq!(harness.sqlite_columns(), harness.csv_header());
        assert_eq!(harness.sqlite_count(), 2);
        assert_eq!(harness.sqlite_column("sensor_stats_pm25"), vec![SqlValue::Real(12.3); 2]);
    }

    #[test]
    fn test_missing_history_reads_empty() {
        let harness = TestHarness::with_sinks(false, true);
        assert!(harness.csv_header().is_empty());
        assert!(harness.csv_rows().is_empty());
    }
}
