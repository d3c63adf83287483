//! Per-run output directory
//!
//! Every start gets its own `database_<Mon-DD-YYYY-HH_MM_SS>` directory, so a
//! restart begins a fresh history instead of appending to the last one.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RUN_DIR_PREFIX: &str = "database_";
const RUN_DIR_FORMAT: &str = "%b-%d-%Y-%H_%M_%S";

pub fn run_dir_name<Tz>(started: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}{}", RUN_DIR_PREFIX, started.format(RUN_DIR_FORMAT))
}

pub async fn create_run_dir<Tz>(base: &Path, started: &DateTime<Tz>) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let dir = base.join(run_dir_name(started));
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Cannot create database directory {}", dir.display()))?;

    info!("Database directory is created: {}", dir.display());
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 12, 2, 11, 52, 10).unwrap()
    }

    #[test]
    fn test_name_format() {
        assert_eq!(run_dir_name(&started()), "database_Dec-02-2022-11_52_10");
    }

    #[tokio::test]
    async fn test_creates_directory() {
        let base = TempDir::new().unwrap();
        let dir = create_run_dir(base.path(), &started()).await.unwrap();

        assert!(dir.is_dir());
        assert_eq!(dir, base.path().join("database_Dec-02-2022-11_52_10"));
    }

    #[tokio::test]
    async fn test_unwritable_base_fails() {
        let base = TempDir::new().unwrap();
        let blocker = base.path().join("file");
        tokio::fs::write(&blocker, "not a directory").await.unwrap();

        assert!(create_run_dir(&blocker, &started()).await.is_err());
    }
}
