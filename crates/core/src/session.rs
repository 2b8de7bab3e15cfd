//! Session artifact persistence.
//!
//! One opaque JSON file per session under `<logs>/sessions/`. These
//! files hold the full payloads whose hashes the ledger commits to;
//! they are working data, not part of the trust boundary.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::ChainResults;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub objective: String,
    pub created_at: DateTime<Utc>,
    pub role_count: usize,
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    meta: SessionMeta,
    results: ChainResults,
}

fn sessions_dir(logs_dir: &Path) -> Result<PathBuf> {
    let dir = logs_dir.join("sessions");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn save_session(logs_dir: &Path, objective: &str, results: &ChainResults) -> Result<SessionMeta> {
    let meta = SessionMeta {
        id: results.session_id.clone(),
        objective: objective.to_string(),
        created_at: Utc::now(),
        role_count: results.roles.len(),
    };
    let file = SessionFile {
        meta: meta.clone(),
        results: results.clone(),
    };
    let path = sessions_dir(logs_dir)?.join(format!("{}.json", meta.id));
    std::fs::write(path, serde_json::to_string(&file)?)?;
    Ok(meta)
}

pub fn load_session(logs_dir: &Path, id: &str) -> Result<(SessionMeta, ChainResults)> {
    let path = sessions_dir(logs_dir)?.join(format!("{id}.json"));
    let file: SessionFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok((file.meta, file.results))
}
