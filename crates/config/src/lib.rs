use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod fingerprint;
pub mod starter;

pub use fingerprint::{canonical_json, config_fingerprint, FINGERPRINT_FILES};

/// Closed set of supported objective domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Marketing,
    Technical,
    Ops,
    Creative,
    Education,
    Product,
    Strategy,
    Research,
    Finance,
}

impl Domain {
    pub fn all() -> &'static [Domain] {
        &[
            Domain::Marketing,
            Domain::Technical,
            Domain::Ops,
            Domain::Creative,
            Domain::Education,
            Domain::Product,
            Domain::Strategy,
            Domain::Research,
            Domain::Finance,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Marketing => "marketing",
            Domain::Technical => "technical",
            Domain::Ops => "ops",
            Domain::Creative => "creative",
            Domain::Education => "education",
            Domain::Product => "product",
            Domain::Strategy => "strategy",
            Domain::Research => "research",
            Domain::Finance => "finance",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Domain::all()
            .iter()
            .find(|d| d.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown domain '{s}'"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub signing: SigningSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_protocol_dir")]
    pub protocol_dir: PathBuf,
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            protocol_dir: default_protocol_dir(),
            ledger_dir: default_ledger_dir(),
            logs_dir: default_logs_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("axon")
}

fn default_protocol_dir() -> PathBuf {
    data_root().join("protocol")
}

fn default_ledger_dir() -> PathBuf {
    data_root().join("ledger")
}

fn default_logs_dir() -> PathBuf {
    data_root().join("logs")
}

fn default_reports_dir() -> PathBuf {
    data_root().join("reports")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_domain")]
    pub default_domain: Domain,
    /// Soft per-role timeout in seconds.
    #[serde(default = "default_role_timeout")]
    pub role_timeout_secs: u64,
    /// Per-role overrides keyed by role name (strategist, analyst, ...).
    #[serde(default)]
    pub role_timeout_overrides: HashMap<String, u64>,
    /// Outer wall-clock budget for a whole session.
    #[serde(default = "default_session_budget")]
    pub session_budget_secs: u64,
    /// Character bound for each micro Q&A turn.
    #[serde(default = "default_qa_char_limit")]
    pub qa_char_limit: usize,
    /// Run a Reality Reconciliation Pass when IRD exceeds 0.5.
    #[serde(default = "default_true")]
    pub reconciliation: bool,
    /// Trigram Jaccard ceiling before a REDUNDANCY signal is attached.
    #[serde(default = "default_redundancy_threshold")]
    pub redundancy_threshold: f64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            default_domain: default_domain(),
            role_timeout_secs: default_role_timeout(),
            role_timeout_overrides: HashMap::new(),
            session_budget_secs: default_session_budget(),
            qa_char_limit: default_qa_char_limit(),
            reconciliation: true,
            redundancy_threshold: default_redundancy_threshold(),
        }
    }
}

fn default_domain() -> Domain {
    Domain::Marketing
}

fn default_role_timeout() -> u64 {
    180
}

fn default_session_budget() -> u64 {
    900
}

fn default_qa_char_limit() -> usize {
    800
}

fn default_redundancy_threshold() -> f64 {
    0.55
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    Ed25519,
    Hmac,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSettings {
    #[serde(default = "default_signing_mode")]
    pub mode: SigningMode,
    /// Whether a broken Ed25519 key may fall back to HMAC. Never silent:
    /// the signer key id records which scheme was used.
    #[serde(default)]
    pub allow_hmac_fallback: bool,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            mode: default_signing_mode(),
            allow_hmac_fallback: false,
        }
    }
}

fn default_signing_mode() -> SigningMode {
    SigningMode::Ed25519
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Keep a SQLite mirror of the JSONL for UI queries.
    #[serde(default = "default_true")]
    pub mirror: bool,
    /// Rotate the active JSONL once it exceeds this size.
    #[serde(default)]
    pub rotate_bytes: Option<u64>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            mirror: true,
            rotate_bytes: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse settings file")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("axon")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("axon.toml")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.protocol_dir)?;
        std::fs::create_dir_all(&self.paths.ledger_dir)?;
        std::fs::create_dir_all(&self.paths.logs_dir)?;
        std::fs::create_dir_all(&self.paths.reports_dir)?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        std::fs::create_dir_all(Self::config_dir())?;
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, content).context("Failed to write settings file")?;
        Ok(())
    }

    pub fn role_timeout(&self, role: &str) -> u64 {
        self.chain
            .role_timeout_overrides
            .get(role)
            .copied()
            .unwrap_or(self.chain.role_timeout_secs)
    }
}

/// TAES axis weights for one domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisWeights {
    pub logical: f64,
    pub practical: f64,
    pub probable: f64,
}

impl AxisWeights {
    pub const fn new(logical: f64, practical: f64, probable: f64) -> Self {
        Self {
            logical,
            practical,
            probable,
        }
    }
}

/// Built-in per-domain axis weights. `domain_weights.json` in the
/// protocol dir overrides individual domains.
pub fn builtin_domain_weights() -> HashMap<Domain, AxisWeights> {
    let mut w = HashMap::new();
    w.insert(Domain::Technical, AxisWeights::new(0.60, 0.35, 0.05));
    w.insert(Domain::Ops, AxisWeights::new(0.40, 0.45, 0.15));
    w.insert(Domain::Marketing, AxisWeights::new(0.30, 0.20, 0.50));
    w.insert(Domain::Creative, AxisWeights::new(0.35, 0.25, 0.40));
    w.insert(Domain::Education, AxisWeights::new(0.45, 0.35, 0.20));
    w.insert(Domain::Product, AxisWeights::new(0.40, 0.40, 0.20));
    w.insert(Domain::Strategy, AxisWeights::new(0.45, 0.35, 0.20));
    w.insert(Domain::Research, AxisWeights::new(0.55, 0.30, 0.15));
    w.insert(Domain::Finance, AxisWeights::new(0.50, 0.35, 0.15));
    w
}

pub fn load_domain_weights(protocol_dir: &Path) -> HashMap<Domain, AxisWeights> {
    let mut weights = builtin_domain_weights();
    let path = protocol_dir.join("domain_weights.json");
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return weights,
    };
    match serde_json::from_str::<HashMap<String, AxisWeights>>(&content) {
        Ok(overrides) => {
            for (name, w) in overrides {
                if let Ok(domain) = name.parse::<Domain>() {
                    weights.insert(domain, w);
                } else {
                    tracing::warn!(domain = %name, "ignoring weight override for unknown domain");
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "unreadable domain weights, using built-ins");
        }
    }
    weights
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Hard,
    Soft,
}

/// One directive's enforcement policy from `coupling.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectivePolicy {
    /// Signal key this directive watches (sycophancy, contradiction, ...).
    pub signal: String,
    pub mode: PolicyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ird_min: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouplingConfig {
    pub directives: HashMap<String, DirectivePolicy>,
}

impl CouplingConfig {
    /// Load from `<protocol>/coupling.json`. An unreadable file is an
    /// error; callers fail closed to all-soft behavior.
    pub fn load(protocol_dir: &Path) -> Result<Self> {
        let path = protocol_dir.join("coupling.json");
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read coupling config {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse coupling config")
    }

    pub fn builtin() -> Self {
        let mut directives = HashMap::new();
        let hard = |signal: &str, iv_max: f64, ird_min: f64| DirectivePolicy {
            signal: signal.to_string(),
            mode: PolicyMode::Hard,
            iv_max: Some(iv_max),
            ird_min: Some(ird_min),
        };
        let soft = |signal: &str| DirectivePolicy {
            signal: signal.to_string(),
            mode: PolicyMode::Soft,
            iv_max: None,
            ird_min: None,
        };
        directives.insert("D3".to_string(), hard("contradiction", 0.55, 0.70));
        directives.insert("D5".to_string(), hard("fabrication", 0.50, 0.75));
        directives.insert("D9".to_string(), hard("secrets", 0.40, 0.80));
        directives.insert("D13".to_string(), hard("sycophancy", 0.62, 0.65));
        directives.insert("D2".to_string(), soft("misroute"));
        directives.insert("D7".to_string(), soft("ambiguity"));
        directives.insert("D8".to_string(), soft("redundancy"));
        directives.insert("D11".to_string(), soft("overconfidence"));
        directives.insert("D15".to_string(), soft("observability_gap"));
        Self { directives }
    }
}

/// Banned phrase patterns per role from `role_shapes.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleShapes {
    pub banned: HashMap<String, Vec<String>>,
}

impl RoleShapes {
    pub fn load(protocol_dir: &Path) -> Self {
        let path = protocol_dir.join("role_shapes.json");
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(shapes) => shapes,
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable role shapes, using built-ins");
                    Self::builtin()
                }
            },
            Err(_) => Self::builtin(),
        }
    }

    pub fn builtin() -> Self {
        let mut banned = HashMap::new();
        // Producer emits assets, never a schedule.
        banned.insert(
            "producer".to_string(),
            vec![
                r"(?i)\bday\s*[1-7]\b".to_string(),
                r"(?i)\bposting schedule\b".to_string(),
                r"(?i)\bcalendar slot\b".to_string(),
            ],
        );
        // Courier schedules assets, never produces them.
        banned.insert(
            "courier".to_string(),
            vec![
                r"(?i)\bspec_type\b".to_string(),
                r"(?i)\bCREATE TABLE\b".to_string(),
                r"(?i)\bnew asset\b".to_string(),
            ],
        );
        Self { banned }
    }

    pub fn patterns_for(&self, role: &str) -> &[String] {
        self.banned.get(role).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_round_trip() {
        for d in Domain::all() {
            assert_eq!(d.as_str().parse::<Domain>().unwrap(), *d);
        }
        assert!("gardening".parse::<Domain>().is_err());
    }

    #[test]
    fn builtin_weights_cover_all_domains_and_sum_to_one() {
        let weights = builtin_domain_weights();
        for d in Domain::all() {
            let w = weights.get(d).expect("missing domain weights");
            let sum = w.logical + w.practical + w.probable;
            assert!((sum - 1.0).abs() < 1e-9, "{d}: weights sum to {sum}");
        }
    }

    #[test]
    fn coupling_load_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CouplingConfig::load(dir.path()).is_err());
    }

    #[test]
    fn coupling_builtin_has_sycophancy_hard_gate() {
        let coupling = CouplingConfig::builtin();
        let d13 = &coupling.directives["D13"];
        assert_eq!(d13.mode, PolicyMode::Hard);
        assert_eq!(d13.signal, "sycophancy");
        assert_eq!(d13.iv_max, Some(0.62));
        assert_eq!(d13.ird_min, Some(0.65));
    }

    #[test]
    fn role_timeout_override() {
        let mut settings = Settings::default();
        settings
            .chain
            .role_timeout_overrides
            .insert("critic".to_string(), 60);
        assert_eq!(settings.role_timeout("critic"), 60);
        assert_eq!(settings.role_timeout("analyst"), 180);
    }
}
