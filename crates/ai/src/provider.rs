use async_openai::{Client, config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use comversa_shared::EmbeddingEnv;

use crate::EmbedError;
use crate::vector::{EMBEDDING_DIM, prepare_embedding};

/// Port for turning text into a dense vector.
///
/// The production stack wraps `OpenAiEmbedder` in `ResilientEmbedder`;
/// tests substitute deterministic stubs.
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Embedder backed by an OpenAI-compatible endpoint. Holds its connection
/// settings; nothing is read from ambient state per call.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
  env: EmbeddingEnv,
}

impl OpenAiEmbedder {
  #[must_use]
  pub fn new(env: EmbeddingEnv) -> Self {
    Self { env }
  }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let config = OpenAIConfig::new()
      .with_api_key(&self.env.api_key)
      .with_api_base(&self.env.base_url);

    let client = Client::with_config(config);

    let request = CreateEmbeddingRequestArgs::default()
      .model(&self.env.model)
      .input(text)
      .dimensions(EMBEDDING_DIM as u32)
      .build()
      .map_err(|err| EmbedError::Upstream(err.to_string()))?;

    let embedding = client
      .embeddings()
      .create(request)
      .await
      .map_err(|err| EmbedError::Upstream(err.to_string()))?
      .data
      .into_iter()
      .map(|e| e.embedding)
      .next_back()
      .ok_or_else(|| EmbedError::Invalid("empty embedding".into()))?;

    prepare_embedding(embedding)
  }
}
