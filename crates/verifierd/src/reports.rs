//! Timestamped verification reports.
//!
//! One JSON file per `/verify` call, named so lexicographic order is
//! chronological order. Listing returns the newest 30.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use axon_ledger::VerifyOutcome;

const MAX_LISTED: usize = 30;

#[derive(Debug, Serialize, Deserialize)]
struct ReportFile {
    ts: String,
    verified: bool,
    entries: usize,
    details: Vec<axon_ledger::EntryIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub name: String,
    pub ts: String,
    pub verified: bool,
}

pub fn write_report(reports_dir: &Path, outcome: &VerifyOutcome) -> anyhow::Result<String> {
    std::fs::create_dir_all(reports_dir)?;
    let ts = Utc::now();
    let name = format!("verify_{}.json", ts.format("%Y%m%dT%H%M%SZ"));
    let file = ReportFile {
        ts: ts.to_rfc3339(),
        verified: outcome.verified,
        entries: outcome.entries,
        details: outcome.details.clone(),
    };
    std::fs::write(reports_dir.join(&name), serde_json::to_string_pretty(&file)?)?;
    Ok(name)
}

pub fn list_reports(reports_dir: &Path) -> anyhow::Result<Vec<ReportSummary>> {
    let mut names: Vec<String> = match std::fs::read_dir(reports_dir) {
        Ok(dir) => dir
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with("verify_") && n.ends_with(".json"))
            .collect(),
        Err(_) => return Ok(Vec::new()),
    };
    names.sort();
    names.reverse();
    names.truncate(MAX_LISTED);

    let mut summaries = Vec::new();
    for name in names {
        let content = match std::fs::read_to_string(reports_dir.join(&name)) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let file: ReportFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(_) => continue,
        };
        summaries.push(ReportSummary {
            name,
            ts: file.ts,
            verified: file.verified,
        });
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(verified: bool) -> VerifyOutcome {
        VerifyOutcome {
            verified,
            entries: 3,
            details: Vec::new(),
        }
    }

    #[test]
    fn written_reports_round_trip_through_listing() {
        let dir = tempfile::tempdir().unwrap();
        let name = write_report(dir.path(), &outcome(true)).unwrap();
        assert!(name.starts_with("verify_"));
        assert!(name.ends_with("Z.json"));

        let listed = list_reports(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, name);
        assert!(listed[0].verified);
    }

    #[test]
    fn listing_is_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..35 {
            let file = ReportFile {
                ts: format!("2026-01-01T00:00:{i:02}Z"),
                verified: i % 2 == 0,
                entries: 1,
                details: Vec::new(),
            };
            std::fs::write(
                dir.path().join(format!("verify_20260101T0000{i:02}Z.json")),
                serde_json::to_string(&file).unwrap(),
            )
            .unwrap();
        }
        let listed = list_reports(dir.path()).unwrap();
        assert_eq!(listed.len(), 30);
        assert!(listed[0].name > listed[29].name);
    }

    #[test]
    fn missing_dir_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let listed = list_reports(&dir.path().join("nope")).unwrap();
        assert!(listed.is_empty());
    }
}
