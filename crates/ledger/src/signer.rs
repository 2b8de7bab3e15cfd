use std::path::Path;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use axon_config::{SigningMode, SigningSettings};

use crate::entry::sha256_hex;
use crate::LedgerError;

type HmacSha256 = Hmac<Sha256>;

const SEED_FILE: &str = "signing.key";
const PUBLIC_FILE: &str = "public.key";
const HMAC_FILE: &str = "hmac.secret";

/// Entry signer. The key id always records which scheme produced a
/// signature, so an HMAC fallback is visible in every entry it signed.
pub struct EntrySigner {
    inner: SignerInner,
    key_id: String,
}

enum SignerInner {
    Ed25519(SigningKey),
    Hmac(Vec<u8>),
}

impl EntrySigner {
    pub fn open(ledger_dir: &Path, settings: &SigningSettings) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(ledger_dir)?;
        match settings.mode {
            SigningMode::Hmac => Self::open_hmac(ledger_dir),
            SigningMode::Ed25519 => match Self::open_ed25519(ledger_dir) {
                Ok(signer) => Ok(signer),
                Err(err) if settings.allow_hmac_fallback => {
                    tracing::warn!(error = %err, "Ed25519 key unusable, falling back to HMAC signing");
                    Self::open_hmac(ledger_dir)
                }
                Err(err) => Err(err),
            },
        }
    }

    fn open_ed25519(ledger_dir: &Path) -> Result<Self, LedgerError> {
        let seed_path = ledger_dir.join(SEED_FILE);
        let signing_key = if seed_path.exists() {
            let hex_seed = std::fs::read_to_string(&seed_path)?;
            let bytes = hex::decode(hex_seed.trim())
                .map_err(|e| LedgerError::Key(format!("bad seed hex: {e}")))?;
            let seed: [u8; 32] = bytes
                .try_into()
                .map_err(|_| LedgerError::Key("seed must be 32 bytes".to_string()))?;
            SigningKey::from_bytes(&seed)
        } else {
            let key = SigningKey::generate(&mut OsRng);
            std::fs::write(&seed_path, hex::encode(key.to_bytes()))?;
            key
        };

        // Publish the verifying key next to the ledger.
        let public_path = ledger_dir.join(PUBLIC_FILE);
        let public_hex = hex::encode(signing_key.verifying_key().to_bytes());
        let needs_write = match std::fs::read_to_string(&public_path) {
            Ok(existing) => existing.trim() != public_hex,
            Err(_) => true,
        };
        if needs_write {
            std::fs::write(&public_path, &public_hex)?;
        }

        let key_id = format!("ed25519:{}", &sha256_hex(public_hex.as_bytes())[..16]);
        Ok(Self {
            inner: SignerInner::Ed25519(signing_key),
            key_id,
        })
    }

    fn open_hmac(ledger_dir: &Path) -> Result<Self, LedgerError> {
        let secret_path = ledger_dir.join(HMAC_FILE);
        let secret = if secret_path.exists() {
            let hex_secret = std::fs::read_to_string(&secret_path)?;
            hex::decode(hex_secret.trim())
                .map_err(|e| LedgerError::Key(format!("bad hmac secret hex: {e}")))?
        } else {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            std::fs::write(&secret_path, hex::encode(bytes))?;
            bytes.to_vec()
        };
        let key_id = format!("hmac:{}", &sha256_hex(&secret)[..16]);
        Ok(Self {
            inner: SignerInner::Hmac(secret),
            key_id,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign the canonical field string; returns hex.
    pub fn sign(&self, canonical: &str) -> String {
        match &self.inner {
            SignerInner::Ed25519(key) => hex::encode(key.sign(canonical.as_bytes()).to_bytes()),
            SignerInner::Hmac(secret) => {
                let mut mac =
                    HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
                mac.update(canonical.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }
}

/// Read the published verifying key, if any.
pub fn load_public_key(ledger_dir: &Path) -> Option<VerifyingKey> {
    let hex_key = std::fs::read_to_string(ledger_dir.join(PUBLIC_FILE)).ok()?;
    let bytes = hex::decode(hex_key.trim()).ok()?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&arr).ok()
}

/// Read an HMAC secret file (hex) for verification.
pub fn load_hmac_secret(path: &Path) -> Option<Vec<u8>> {
    let hex_secret = std::fs::read_to_string(path).ok()?;
    hex::decode(hex_secret.trim()).ok()
}

pub fn verify_ed25519(key: &VerifyingKey, canonical: &str, signature_hex: &str) -> bool {
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.verify(canonical.as_bytes(), &signature).is_ok()
}

pub fn verify_hmac(secret: &[u8], canonical: &str, signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ed25519_settings() -> SigningSettings {
        SigningSettings {
            mode: SigningMode::Ed25519,
            allow_hmac_fallback: false,
        }
    }

    #[test]
    fn ed25519_sign_verify_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let signer = EntrySigner::open(dir.path(), &ed25519_settings()).unwrap();
        assert!(signer.key_id().starts_with("ed25519:"));

        let sig = signer.sign("canonical-bytes");
        let key = load_public_key(dir.path()).expect("public key published");
        assert!(verify_ed25519(&key, "canonical-bytes", &sig));
        assert!(!verify_ed25519(&key, "other-bytes", &sig));
    }

    #[test]
    fn key_is_stable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let a = EntrySigner::open(dir.path(), &ed25519_settings()).unwrap();
        let b = EntrySigner::open(dir.path(), &ed25519_settings()).unwrap();
        assert_eq!(a.key_id(), b.key_id());
        assert_eq!(a.sign("x"), b.sign("x"));
    }

    #[test]
    fn corrupt_seed_without_fallback_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SEED_FILE), "not-hex").unwrap();
        assert!(EntrySigner::open(dir.path(), &ed25519_settings()).is_err());
    }

    #[test]
    fn corrupt_seed_with_fallback_downgrades_visibly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SEED_FILE), "not-hex").unwrap();
        let settings = SigningSettings {
            mode: SigningMode::Ed25519,
            allow_hmac_fallback: true,
        };
        let signer = EntrySigner::open(dir.path(), &settings).unwrap();
        assert!(signer.key_id().starts_with("hmac:"));

        let sig = signer.sign("canonical");
        let secret = load_hmac_secret(&dir.path().join(HMAC_FILE)).unwrap();
        assert!(verify_hmac(&secret, "canonical", &sig));
    }
}
