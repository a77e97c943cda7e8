//! Thin adapters over the external inference backends.
//!
//! The retrieval core talks to models exclusively through the
//! [`InferenceRuntime`] trait. The production implementation,
//! [`HttpRuntime`], dispatches on the configured provider ("ollama" or
//! "openai") plus an optional cross-encoder sidecar for reranking. Loading
//! a model verifies it exists on the backend (absent models surface as
//! `ModelNotFound`) and pins it resident; disposal asks the backend to
//! unload where the API supports it.

pub mod chat;
pub mod embeddings;
pub mod rerank;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::{LlmConfig, RerankerConfig};
use crate::error::{Error, Result};
use crate::models::{ChatMessage, ModelKind};

/// Opaque reference to a loaded backend model.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    pub model: String,
    pub kind: ModelKind,
}

/// Relevance score for a single ranked document. `index` refers to the
/// position of the document in the rank request.
#[derive(Debug, Clone)]
pub struct RankScore {
    pub index: usize,
    pub score: f32,
}

/// Sampling parameters for chat completion.
#[derive(Debug, Clone)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Interface to the external inference runtime.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Load the named model for `kind`. A nonexistent model fails with
    /// [`Error::ModelNotFound`]; a backend that cannot serve `kind` fails
    /// with [`Error::UnsupportedCapability`].
    async fn load(&self, name: &str, kind: ModelKind) -> Result<ModelHandle>;

    /// Release the backend resource for `handle`. Best-effort: failures are
    /// logged, and the handle is never disposed twice concurrently.
    async fn dispose(&self, handle: &ModelHandle);

    async fn embed(&self, handle: &ModelHandle, text: &str) -> Result<Vec<f32>>;

    async fn chat(
        &self,
        handle: &ModelHandle,
        messages: &[ChatMessage],
        sampling: &SamplingOptions,
    ) -> Result<String>;

    /// Score `documents` against `query` with a cross-encoder. Returns one
    /// score per input document, tagged with its input position.
    async fn rank(
        &self,
        handle: &ModelHandle,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RankScore>>;
}

/// Provider-dispatched HTTP runtime (Ollama or OpenAI-compatible APIs,
/// plus an optional reranker sidecar).
pub struct HttpRuntime {
    client: reqwest::Client,
    llm: LlmConfig,
    reranker: RerankerConfig,
}

impl HttpRuntime {
    pub fn new(client: reqwest::Client, llm: LlmConfig, reranker: RerankerConfig) -> Self {
        Self {
            client,
            llm,
            reranker,
        }
    }

    /// Check that `name` exists on the chat/embedding backend.
    async fn verify_model(&self, name: &str) -> Result<()> {
        match self.llm.provider.as_str() {
            "ollama" => {
                let url = format!("{}/api/show", self.llm.base_url);
                let resp = self
                    .client
                    .post(&url)
                    .json(&serde_json::json!({ "model": name }))
                    .send()
                    .await
                    .context("Failed to reach Ollama show API")?;

                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(Error::ModelNotFound(name.to_string()));
                }
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(anyhow::anyhow!("Ollama show API returned {status}: {body}").into());
                }
                Ok(())
            }
            "openai" => {
                let url = format!("{}/v1/models/{name}", self.llm.base_url);
                let api_key = self.llm.api_key.as_deref().unwrap_or_default();
                let resp = self
                    .client
                    .get(&url)
                    .header("Authorization", format!("Bearer {api_key}"))
                    .send()
                    .await
                    .context("Failed to reach models API")?;

                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(Error::ModelNotFound(name.to_string()));
                }
                if !resp.status().is_success() {
                    let status = resp.status();
                    return Err(anyhow::anyhow!("Models API returned {status} for {name}").into());
                }
                Ok(())
            }
            other => Err(Error::InvalidConfig(format!("Unknown LLM provider: {other}"))),
        }
    }

    /// Pin an Ollama model resident until we explicitly unload it. The
    /// resource cache owns residency, so the server-side idle timer is
    /// disabled with `keep_alive: -1`.
    async fn warm_ollama(&self, name: &str, kind: ModelKind) -> Result<()> {
        match kind {
            ModelKind::Chat => {
                let url = format!("{}/api/generate", self.llm.base_url);
                let req = OllamaResidencyRequest {
                    model: name.to_string(),
                    keep_alive: -1,
                };
                let resp = self
                    .client
                    .post(&url)
                    .json(&req)
                    .send()
                    .await
                    .context("Failed to warm chat model")?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    return Err(anyhow::anyhow!("Warming {name} returned {status}").into());
                }
                Ok(())
            }
            ModelKind::Embedding => {
                let url = format!("{}/api/embed", self.llm.base_url);
                let req = OllamaEmbedResidencyRequest {
                    model: name.to_string(),
                    input: Vec::new(),
                    keep_alive: -1,
                };
                let resp = self
                    .client
                    .post(&url)
                    .json(&req)
                    .send()
                    .await
                    .context("Failed to warm embedding model")?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    return Err(anyhow::anyhow!("Warming {name} returned {status}").into());
                }
                Ok(())
            }
            ModelKind::Reranker => Ok(()),
        }
    }

    /// Ask Ollama to unload `name` by zeroing its keep-alive.
    async fn unload_ollama(&self, name: &str, kind: ModelKind) -> anyhow::Result<()> {
        let (url, body) = match kind {
            ModelKind::Embedding => (
                format!("{}/api/embed", self.llm.base_url),
                serde_json::json!({ "model": name, "input": [], "keep_alive": 0 }),
            ),
            _ => (
                format!("{}/api/generate", self.llm.base_url),
                serde_json::json!({ "model": name, "keep_alive": 0 }),
            ),
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Ollama for unload")?;
        if !resp.status().is_success() {
            anyhow::bail!("Unload of {name} returned {}", resp.status());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct OllamaResidencyRequest {
    model: String,
    keep_alive: i64,
}

#[derive(Serialize)]
struct OllamaEmbedResidencyRequest {
    model: String,
    input: Vec<String>,
    keep_alive: i64,
}

#[async_trait]
impl InferenceRuntime for HttpRuntime {
    async fn load(&self, name: &str, kind: ModelKind) -> Result<ModelHandle> {
        match kind {
            ModelKind::Chat | ModelKind::Embedding => {
                self.verify_model(name).await?;
                if self.llm.provider == "ollama" {
                    self.warm_ollama(name, kind).await?;
                }
            }
            ModelKind::Reranker => {
                // Reranking runs on a dedicated cross-encoder sidecar; with
                // none configured, no model can rank.
                if self.reranker.base_url.is_none() {
                    return Err(Error::UnsupportedCapability {
                        model: name.to_string(),
                        kind,
                        operation: "rank",
                    });
                }
                rerank::verify_sidecar(&self.client, &self.reranker).await?;
            }
        }
        tracing::info!("Loaded model {name} ({kind})");
        Ok(ModelHandle {
            model: name.to_string(),
            kind,
        })
    }

    async fn dispose(&self, handle: &ModelHandle) {
        if self.llm.provider == "ollama" && handle.kind != ModelKind::Reranker {
            if let Err(e) = self.unload_ollama(&handle.model, handle.kind).await {
                tracing::warn!("Failed to unload {} ({}): {e}", handle.model, handle.kind);
                return;
            }
        }
        tracing::info!("Disposed model {} ({})", handle.model, handle.kind);
    }

    async fn embed(&self, handle: &ModelHandle, text: &str) -> Result<Vec<f32>> {
        embeddings::embed(&self.client, &self.llm, &handle.model, text).await
    }

    async fn chat(
        &self,
        handle: &ModelHandle,
        messages: &[ChatMessage],
        sampling: &SamplingOptions,
    ) -> Result<String> {
        chat::complete(&self.client, &self.llm, &handle.model, messages, sampling).await
    }

    async fn rank(
        &self,
        handle: &ModelHandle,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RankScore>> {
        let Some(base_url) = self.reranker.base_url.as_deref() else {
            return Err(Error::UnsupportedCapability {
                model: handle.model.clone(),
                kind: handle.kind,
                operation: "rank",
            });
        };
        rerank::rank(
            &self.client,
            base_url,
            self.reranker.timeout_secs,
            &handle.model,
            query,
            documents,
        )
        .await
    }
}
