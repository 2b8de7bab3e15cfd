//! The three canonical ledger attacks: modify, forge, malformed insert.

use axon_config::{SigningMode, SigningSettings};
use axon_ledger::{
    verify_ledger, AppendRequest, EntrySigner, Ledger, LedgerEntry, LedgerOptions, VerifyIssue,
    VerifyOptions,
};
use ed25519_dalek::Signer as _;

fn settings() -> SigningSettings {
    SigningSettings {
        mode: SigningMode::Ed25519,
        allow_hmac_fallback: false,
    }
}

fn seed_ledger(dir: &std::path::Path, n: usize) {
    let signer = EntrySigner::open(dir, &settings()).unwrap();
    let ledger = Ledger::open(
        dir,
        signer,
        "sha256:test".to_string(),
        LedgerOptions::default(),
    )
    .unwrap();
    for i in 0..n {
        ledger
            .append(AppendRequest {
                session_id: "s1".to_string(),
                role: format!("role{i}"),
                action: "role_output".to_string(),
                payload: serde_json::json!({ "i": i }),
                soft_signals: None,
                hard_actions: None,
            })
            .unwrap();
    }
}

fn ledger_path(dir: &std::path::Path) -> std::path::PathBuf {
    dir.join("audit.jsonl")
}

#[test]
fn untouched_ledger_verifies_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    seed_ledger(dir.path(), 4);

    let first = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(first.verified);
    assert_eq!(first.entries, 4);
    assert!(first.details.is_empty());

    let second = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(second.verified);
    assert_eq!(second.entries, first.entries);
}

#[test]
fn modified_entry_is_flagged_at_its_seq() {
    let dir = tempfile::tempdir().unwrap();
    seed_ledger(dir.path(), 4);

    let path = ledger_path(dir.path());
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();

    // Flip one character in entry 2's payload_hash.
    let mut entry: LedgerEntry = serde_json::from_str(&lines[2]).unwrap();
    let mut chars: Vec<char> = entry.payload_hash.chars().collect();
    chars[0] = if chars[0] == 'a' { 'b' } else { 'a' };
    entry.payload_hash = chars.into_iter().collect();
    lines[2] = serde_json::to_string(&entry).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    let outcome = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.details.len(), 1);
    assert_eq!(outcome.details[0].seq, 2);
    assert!(matches!(
        outcome.details[0].error,
        VerifyIssue::SigInvalid | VerifyIssue::HashMismatch
    ));
}

#[test]
fn forged_append_with_unknown_key_is_sig_invalid() {
    let dir = tempfile::tempdir().unwrap();
    seed_ledger(dir.path(), 3);

    let path = ledger_path(dir.path());
    let content = std::fs::read_to_string(&path).unwrap();
    let last: LedgerEntry = serde_json::from_str(content.lines().last().unwrap()).unwrap();

    // Forge a structurally valid entry signed with a key that was never
    // published.
    let rogue = ed25519_dalek::SigningKey::generate(&mut rand_core::OsRng);
    let mut forged = LedgerEntry {
        seq: last.seq + 1,
        ts: last.ts.clone(),
        session_id: "s1".to_string(),
        role: "critic".to_string(),
        action: "role_output".to_string(),
        payload_hash: axon_ledger::hash_payload(&serde_json::json!({"forged": true})),
        prev_hash: last.this_hash.clone(),
        this_hash: String::new(),
        signature: String::new(),
        signer_key_id: last.signer_key_id.clone(),
        config_hash: last.config_hash.clone(),
        soft_signals: None,
        hard_actions: None,
        payload: None,
    };
    let canonical = forged.canonical_fields();
    forged.signature = hex::encode(rogue.sign(canonical.as_bytes()).to_bytes());
    forged.this_hash = LedgerEntry::chain_hash(&canonical, &forged.signature);

    let mut appended = content;
    appended.push_str(&serde_json::to_string(&forged).unwrap());
    appended.push('\n');
    std::fs::write(&path, appended).unwrap();

    let outcome = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.details.len(), 1);
    assert_eq!(outcome.details[0].seq, forged.seq);
    assert_eq!(outcome.details[0].error, VerifyIssue::SigInvalid);
}

#[test]
fn malformed_line_is_invalid_json_and_breaks_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    seed_ledger(dir.path(), 4);

    let path = ledger_path(dir.path());
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
    lines.insert(2, "{not json at all".to_string());
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    let outcome = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.entries, 5);
    assert!(outcome
        .details
        .iter()
        .any(|d| d.error == VerifyIssue::InvalidJson));
    // Entries after the insertion no longer line up with the walk.
    assert!(outcome
        .details
        .iter()
        .any(|d| d.error == VerifyIssue::ChainBreak));
}

#[test]
fn missing_public_key_is_reported_per_entry() {
    let dir = tempfile::tempdir().unwrap();
    seed_ledger(dir.path(), 2);
    std::fs::remove_file(dir.path().join("public.key")).unwrap();

    let outcome = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.details.len(), 2);
    assert!(outcome
        .details
        .iter()
        .all(|d| d.error == VerifyIssue::MissingPublicKey));
}

#[test]
fn verification_follows_rollover_links() {
    let dir = tempfile::tempdir().unwrap();
    let signer = EntrySigner::open(dir.path(), &settings()).unwrap();
    let ledger = Ledger::open(
        dir.path(),
        signer,
        "sha256:test".to_string(),
        LedgerOptions {
            mirror: false,
            rotate_bytes: Some(1),
        },
    )
    .unwrap();
    for i in 0..3 {
        ledger
            .append(AppendRequest {
                session_id: "s1".to_string(),
                role: format!("role{i}"),
                action: "role_output".to_string(),
                payload: serde_json::json!({ "i": i }),
                soft_signals: None,
                hard_actions: None,
            })
            .unwrap();
    }

    let outcome = verify_ledger(dir.path(), &VerifyOptions::default()).unwrap();
    assert!(outcome.verified, "details: {:?}", outcome.details);
    // 3 role entries plus the rollover links between files.
    assert!(outcome.entries > 3);
}
