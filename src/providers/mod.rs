/*!
 * Provider implementations for different LLM services.
 *
 * This module contains client implementations for various LLM providers:
 * - Ollama: Local LLM server
 * - OpenAI: OpenAI API and OpenAI-compatible servers such as LM Studio
 * - Anthropic: Anthropic API integration
 * - Mock: scripted provider for tests
 *
 * The orchestrator never talks to a provider directly. It sees an
 * `LlmBackend`, whose single capability is `invoke(prompt, model)`, and
 * `ProviderBackend` adapts any `Provider` to it.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably behind `ProviderBackend`.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Build a single-turn request for a prompt
    fn build_request(&self, prompt: &str, model: &str) -> Self::Request;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;

    /// Input and output token counts, when the provider reports them
    fn extract_usage(response: &Self::Response) -> (Option<u64>, Option<u64>);
}

/// Successful backend invocation
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub text: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// The one capability the orchestrator needs from a model
///
/// `None` means the invocation failed: transport error, error status,
/// undecodable body or an empty completion. Failures are never propagated.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn invoke(&self, prompt: &str, model: &str) -> Option<BackendResponse>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Adapts a `Provider` client to `LlmBackend`
#[derive(Debug)]
pub struct ProviderBackend<P: Provider> {
    provider: P,
    name: String,
}

impl<P: Provider> ProviderBackend<P> {
    pub fn new(provider: P, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: Provider> LlmBackend for ProviderBackend<P> {
    async fn invoke(&self, prompt: &str, model: &str) -> Option<BackendResponse> {
        let request = self.provider.build_request(prompt, model);
        match self.provider.complete(request).await {
            Ok(response) => {
                let text = P::extract_text(&response);
                if text.trim().is_empty() {
                    warn!("{} returned an empty completion for model {}", self.name, model);
                    return None;
                }
                let (input_tokens, output_tokens) = P::extract_usage(&response);
                debug!(
                    "{} completion: {} chars, tokens in={:?} out={:?}",
                    self.name,
                    text.len(),
                    input_tokens,
                    output_tokens
                );
                Some(BackendResponse {
                    text,
                    input_tokens,
                    output_tokens,
                })
            }
            Err(e) => {
                warn!("{} invocation failed: {}", self.name, e);
                None
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build the backend selected in configuration
pub fn create_backend(config: &TranslationConfig) -> Result<Arc<dyn LlmBackend>> {
    let endpoint = config.get_endpoint();
    let timeout = Duration::from_secs(config.get_timeout_secs());
    let common = &config.common;
    let name = config.provider.display_name().to_string();

    let backend: Arc<dyn LlmBackend> = match config.provider {
        TranslationProvider::Ollama => {
            let client = ollama::Ollama::from_endpoint(&endpoint, timeout)?
                .with_generation(common.temperature, common.max_tokens);
            Arc::new(ProviderBackend::new(client, name))
        }
        TranslationProvider::OpenAI | TranslationProvider::LMStudio => {
            let client = openai::OpenAI::new(config.get_api_key(), &endpoint, timeout)
                .with_generation(common.temperature, common.max_tokens);
            Arc::new(ProviderBackend::new(client, name))
        }
        TranslationProvider::Anthropic => {
            let client = anthropic::Anthropic::new(config.get_api_key(), &endpoint, timeout)
                .with_generation(common.temperature, common.max_tokens);
            Arc::new(ProviderBackend::new(client, name))
        }
    };

    debug!("Using {} backend at {}", config.provider.display_name(), endpoint);
    Ok(backend)
}

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;
