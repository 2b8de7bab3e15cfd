//! Append-only IRD row log with size-based rotation.
//!
//! One CSV row per scored role turn. Rotation keeps a bounded number of
//! generations: `ird_log.csv.1` is the most recent rotated file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::taes::TaesRecord;

const MAX_BYTES: u64 = 10 * 1024 * 1024;
const GENERATIONS: usize = 5;
const HEADER: &str =
    "ts,session_id,role,domain,logical,practical,probable,iv,domain_weighted,ird,reconciliation\n";

pub struct IrdLog {
    path: PathBuf,
    max_bytes: u64,
}

impl IrdLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join("ird_log.csv"),
            max_bytes: MAX_BYTES,
        }
    }

    #[cfg(test)]
    fn with_max_bytes(logs_dir: &Path, max_bytes: u64) -> Self {
        Self {
            path: logs_dir.join("ird_log.csv"),
            max_bytes,
        }
    }

    pub fn append(&self, session_id: &str, record: &TaesRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed()?;

        let fresh = !self.path.exists();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if fresh {
            file.write_all(HEADER.as_bytes())?;
        }
        let row = format!(
            "{},{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            session_id,
            record.role,
            record.domain,
            record.logical,
            record.practical,
            record.probable,
            record.iv,
            record.domain_weighted,
            record.ird,
            record.requires_reconciliation,
        );
        file.write_all(row.as_bytes())
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.max_bytes {
            return Ok(());
        }
        // Shift generations up, dropping the oldest.
        let gen_path = |n: usize| PathBuf::from(format!("{}.{n}", self.path.display()));
        let _ = std::fs::remove_file(gen_path(GENERATIONS));
        for n in (1..GENERATIONS).rev() {
            let from = gen_path(n);
            if from.exists() {
                std::fs::rename(&from, gen_path(n + 1))?;
            }
        }
        std::fs::rename(&self.path, gen_path(1))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_config::Domain;

    fn record() -> TaesRecord {
        TaesRecord {
            role: "analyst".to_string(),
            domain: Domain::Finance,
            logical: 0.8,
            practical: 0.7,
            probable: 0.6,
            iv: 0.735,
            domain_weighted: 0.735,
            ird: 0.0,
            contradiction_count: 0,
            hedge_count: 0,
            requires_reconciliation: false,
        }
    }

    #[test]
    fn rows_append_under_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = IrdLog::new(dir.path());
        log.append("s1", &record()).unwrap();
        log.append("s1", &record()).unwrap();

        let content = std::fs::read_to_string(dir.path().join("ird_log.csv")).unwrap();
        assert_eq!(content.matches("ts,session_id").count(), 1);
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains(",analyst,finance,"));
    }

    #[test]
    fn rotation_keeps_bounded_generations() {
        let dir = tempfile::tempdir().unwrap();
        let log = IrdLog::with_max_bytes(dir.path(), 1);
        for _ in 0..4 {
            log.append("s1", &record()).unwrap();
        }
        assert!(dir.path().join("ird_log.csv.1").exists());
        assert!(dir.path().join("ird_log.csv.2").exists());
        // Each rotated generation holds one header + one row.
        let gen1 = std::fs::read_to_string(dir.path().join("ird_log.csv.1")).unwrap();
        assert_eq!(gen1.lines().count(), 2);
    }
}
