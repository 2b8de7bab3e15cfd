//! Append-only signed audit ledger.
//!
//! One JSON object per line; each entry signs a canonical serialization
//! of its fixed fields and chains to its predecessor through
//! `this_hash`/`prev_hash`. Appends are serialized across processes by
//! an advisory lock file, so concurrent sessions interleave safely at
//! the line boundary.

pub mod entry;
pub mod mirror;
pub mod signer;
pub mod verify;

pub use entry::{hash_payload, sha256_hex, LedgerEntry, GENESIS_PREV};
pub use signer::EntrySigner;
pub use verify::{verify_ledger, EntryIssue, VerifyIssue, VerifyOptions, VerifyOutcome};

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use fs2::FileExt;

use crate::mirror::Mirror;

pub const LEDGER_FILE: &str = "audit.jsonl";
const LOCK_FILE: &str = "audit.lock";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Signing key error: {0}")]
    Key(String),

    #[error("Corrupt ledger: {0}")]
    Corrupt(String),

    #[error("Mirror error: {0}")]
    Mirror(String),
}

#[derive(Debug, Clone, Default)]
pub struct LedgerOptions {
    pub mirror: bool,
    pub rotate_bytes: Option<u64>,
}

/// A request to append one entry. `payload` is hashed into the entry;
/// only rollover entries carry it inline.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub session_id: String,
    pub role: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub soft_signals: Option<Vec<String>>,
    pub hard_actions: Option<Vec<String>>,
}

pub struct Ledger {
    dir: PathBuf,
    signer: EntrySigner,
    config_hash: String,
    mirror: Option<Mirror>,
    rotate_bytes: Option<u64>,
}

impl Ledger {
    pub fn open(
        dir: &Path,
        signer: EntrySigner,
        config_hash: String,
        options: LedgerOptions,
    ) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(dir)?;
        let mirror = if options.mirror {
            Some(Mirror::open(dir)?)
        } else {
            None
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            signer,
            config_hash,
            mirror,
            rotate_bytes: options.rotate_bytes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn signer_key_id(&self) -> &str {
        self.signer.key_id()
    }

    /// Append one entry under the cross-process advisory lock. The whole
    /// sequence (find tail, compute seq and prev_hash, sign, write) runs
    /// inside the lock.
    pub fn append(&self, request: AppendRequest) -> Result<LedgerEntry, LedgerError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;
        lock_file.lock_exclusive()?;
        let result = self.append_locked(request);
        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    fn append_locked(&self, request: AppendRequest) -> Result<LedgerEntry, LedgerError> {
        let mut tail_path = active_file(&self.dir)?;
        let mut tail = read_tail(&tail_path)?;

        if let Some(limit) = self.rotate_bytes {
            let size = std::fs::metadata(&tail_path).map(|m| m.len()).unwrap_or(0);
            if size >= limit {
                let next_name = format!("audit-{:04}.jsonl", rollover_index(&tail_path) + 1);
                let rollover = self.build_entry(
                    &tail,
                    AppendRequest {
                        session_id: request.session_id.clone(),
                        role: "system".to_string(),
                        action: "rollover".to_string(),
                        payload: serde_json::json!({ "next": next_name }),
                        soft_signals: None,
                        hard_actions: None,
                    },
                    true,
                );
                write_line(&tail_path, &rollover)?;
                self.mirror_insert(&rollover);
                tail = Some((rollover.seq, rollover.this_hash.clone()));
                tail_path = self.dir.join(next_name);
            }
        }

        let entry = self.build_entry(&tail, request, false);
        write_line(&tail_path, &entry)?;
        self.mirror_insert(&entry);
        Ok(entry)
    }

    fn build_entry(
        &self,
        tail: &Option<(u64, String)>,
        request: AppendRequest,
        carry_payload: bool,
    ) -> LedgerEntry {
        let (seq, prev_hash) = match tail {
            Some((last_seq, last_hash)) => (last_seq + 1, last_hash.clone()),
            None => (0, GENESIS_PREV.to_string()),
        };
        let mut entry = LedgerEntry {
            seq,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            session_id: request.session_id,
            role: request.role,
            action: request.action,
            payload_hash: hash_payload(&request.payload),
            prev_hash,
            this_hash: String::new(),
            signature: String::new(),
            signer_key_id: self.signer.key_id().to_string(),
            config_hash: self.config_hash.clone(),
            soft_signals: request.soft_signals,
            hard_actions: request.hard_actions,
            payload: carry_payload.then_some(request.payload),
        };
        let canonical = entry.canonical_fields();
        entry.signature = self.signer.sign(&canonical);
        entry.this_hash = LedgerEntry::chain_hash(&canonical, &entry.signature);
        entry
    }

    fn mirror_insert(&self, entry: &LedgerEntry) {
        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.insert(entry) {
                tracing::warn!(error = %err, seq = entry.seq, "ledger mirror insert failed");
            }
        }
    }
}

fn write_line(path: &Path, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(())
}

fn rollover_index(path: &Path) -> u32 {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| {
            n.strip_prefix("audit-")
                .and_then(|rest| rest.strip_suffix(".jsonl"))
        })
        .and_then(|idx| idx.parse().ok())
        .unwrap_or(0)
}

/// Follow rollover links from `audit.jsonl` to the active tail file.
pub fn active_file(dir: &Path) -> Result<PathBuf, LedgerError> {
    let mut path = dir.join(LEDGER_FILE);
    loop {
        let Some(last) = last_line(&path)? else {
            return Ok(path);
        };
        let Ok(entry) = serde_json::from_str::<LedgerEntry>(&last) else {
            return Ok(path);
        };
        if entry.action != "rollover" {
            return Ok(path);
        }
        let next = entry
            .payload
            .as_ref()
            .and_then(|p| p["next"].as_str())
            .ok_or_else(|| {
                LedgerError::Corrupt(format!("rollover entry seq {} names no file", entry.seq))
            })?;
        path = dir.join(next);
    }
}

/// The ordered list of chain files, oldest first.
pub fn chain_files(dir: &Path) -> Result<Vec<PathBuf>, LedgerError> {
    let mut files = Vec::new();
    let mut path = dir.join(LEDGER_FILE);
    loop {
        files.push(path.clone());
        let Some(last) = last_line(&path)? else {
            return Ok(files);
        };
        let Ok(entry) = serde_json::from_str::<LedgerEntry>(&last) else {
            return Ok(files);
        };
        if entry.action != "rollover" {
            return Ok(files);
        }
        match entry.payload.as_ref().and_then(|p| p["next"].as_str()) {
            Some(next) => path = dir.join(next),
            None => return Ok(files),
        }
    }
}

fn read_tail(path: &Path) -> Result<Option<(u64, String)>, LedgerError> {
    let Some(last) = last_line(path)? else {
        return Ok(None);
    };
    let entry: LedgerEntry = serde_json::from_str(&last)
        .map_err(|e| LedgerError::Corrupt(format!("unparseable tail entry: {e}")))?;
    Ok(Some((entry.seq, entry.this_hash)))
}

fn last_line(path: &Path) -> Result<Option<String>, LedgerError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .last()
        .map(|l| l.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_config::{SigningMode, SigningSettings};

    fn open_test_ledger(dir: &Path, rotate_bytes: Option<u64>) -> Ledger {
        let signer = EntrySigner::open(
            dir,
            &SigningSettings {
                mode: SigningMode::Ed25519,
                allow_hmac_fallback: false,
            },
        )
        .unwrap();
        Ledger::open(
            dir,
            signer,
            "sha256:test".to_string(),
            LedgerOptions {
                mirror: false,
                rotate_bytes,
            },
        )
        .unwrap()
    }

    fn request(session: &str, role: &str) -> AppendRequest {
        AppendRequest {
            session_id: session.to_string(),
            role: role.to_string(),
            action: "role_output".to_string(),
            payload: serde_json::json!({"role": role}),
            soft_signals: None,
            hard_actions: None,
        }
    }

    #[test]
    fn chain_links_and_seq_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_test_ledger(dir.path(), None);
        let a = ledger.append(request("s1", "strategist")).unwrap();
        let b = ledger.append(request("s1", "analyst")).unwrap();
        assert_eq!(a.seq, 0);
        assert_eq!(a.prev_hash, GENESIS_PREV);
        assert_eq!(b.seq, 1);
        assert_eq!(b.prev_hash, a.this_hash);
    }

    #[test]
    fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = open_test_ledger(dir.path(), None);
            ledger.append(request("s1", "strategist")).unwrap();
        }
        let ledger = open_test_ledger(dir.path(), None);
        let entry = ledger.append(request("s2", "strategist")).unwrap();
        assert_eq!(entry.seq, 1);
    }

    #[test]
    fn rotation_writes_rollover_link_and_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_test_ledger(dir.path(), Some(1));
        let a = ledger.append(request("s1", "strategist")).unwrap();
        // Second append exceeds the 1-byte limit: rollover, then entry.
        let b = ledger.append(request("s1", "analyst")).unwrap();
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 2, "rollover entry takes seq 1");

        let files = chain_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with("audit-0001.jsonl"));

        let tail = active_file(dir.path()).unwrap();
        assert!(tail.ends_with("audit-0001.jsonl"));
    }
}
