use async_trait::async_trait;

use super::types::GenerationRequest;
use crate::errors::ApiError;

#[async_trait]
pub trait Generator: Send + Sync {
    /// return the provider name (e.g. "groq", "openai")
    fn name(&self) -> &str;

    /// whether an API key/model is configured at all
    fn is_configured(&self) -> bool;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// chat completion (non-streaming); returns the top completion's text
    async fn generate(&self, request: GenerationRequest) -> Result<String, ApiError>;
}
