pub mod anthropic;
pub mod openai;

mod error;
mod types;

pub use error::ProviderError;
pub use types::CompletionRequest;

use async_trait::async_trait;

/// A single synchronous text-in/text-out completion. Retry and
/// re-prompt policy live in the role executor, not here.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

fn resolve_api_key(settings: &axon_config::ProviderSettings) -> Result<String, ProviderError> {
    std::env::var(&settings.api_key_env).map_err(|_| ProviderError::MissingCredential {
        env_var: settings.api_key_env.clone(),
    })
}

pub fn create_provider(
    settings: &axon_config::ProviderSettings,
) -> Result<Box<dyn Provider>, ProviderError> {
    match settings.name.as_str() {
        "openai" => {
            let key = resolve_api_key(settings)?;
            Ok(Box::new(openai::OpenAiProvider::new(
                key,
                settings.base_url.clone(),
                settings.model.clone(),
            )))
        }
        "anthropic" => {
            let key = resolve_api_key(settings)?;
            Ok(Box::new(anthropic::AnthropicProvider::new(
                key,
                settings.base_url.clone(),
                settings.model.clone(),
            )))
        }
        other => Err(ProviderError::UnknownProvider {
            name: other.to_string(),
        }),
    }
}
