//! SQLite mirror of the JSONL ledger.
//!
//! The mirror exists for UI queries only. The JSONL file is the signing
//! substrate and the only thing the verifier reads; a mirror write
//! failure therefore degrades to a warning, never a failed append.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::entry::LedgerEntry;
use crate::LedgerError;

pub struct Mirror {
    conn: Mutex<Connection>,
}

impl Mirror {
    pub fn open(ledger_dir: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(ledger_dir.join("audit.db"))
            .map_err(|e| LedgerError::Mirror(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;
             CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY,
                ts TEXT NOT NULL,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                action TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                this_hash TEXT NOT NULL,
                signature TEXT NOT NULL,
                signer_key_id TEXT NOT NULL,
                config_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_entries_session ON entries(session_id);",
        )
        .map_err(|e| LedgerError::Mirror(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO entries
             (seq, ts, session_id, role, action, payload_hash, prev_hash, this_hash, signature, signer_key_id, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.seq,
                entry.ts,
                entry.session_id,
                entry.role,
                entry.action,
                entry.payload_hash,
                entry.prev_hash,
                entry.this_hash,
                entry.signature,
                entry.signer_key_id,
                entry.config_hash,
            ],
        )
        .map_err(|e| LedgerError::Mirror(e.to_string()))?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|e| LedgerError::Mirror(e.to_string()))
    }
}
