#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Rate limited. Retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Empty completion from provider")]
    Empty,

    #[error("No API key: set {env_var}")]
    MissingCredential { env_var: String },

    #[error("Unknown provider '{name}'")]
    UnknownProvider { name: String },
}

impl ProviderError {
    pub fn from_http(status: u16, body: String, retry_after: Option<&str>) -> Self {
        if status == 429 {
            let retry_after_ms = retry_after
                .and_then(|s| s.trim().parse::<f64>().ok())
                .map(|secs| (secs * 1000.0) as u64)
                .unwrap_or(5_000);
            return ProviderError::RateLimited { retry_after_ms };
        }
        ProviderError::Http { status, body }
    }

    /// Whether the role executor should spend its single retry on this.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Http { status: 500..=599, .. }
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Deserialization(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}
