use std::env;

use anyhow::anyhow;

use crate::AppError;

/// Connection settings for the embedding endpoint, handed to the provider at
/// construction time.
#[derive(Debug, Clone)]
pub struct EmbeddingEnv {
  pub base_url: String,
  pub api_key: String,
  pub model: String,
}

/// Process configuration, read once at startup and passed into the
/// components that need it.
#[derive(Debug, Clone)]
pub struct AppEnv {
  pub database_url: String,
  pub embeddings: EmbeddingEnv,
}

impl AppEnv {
  /// Load from the environment (honoring a `.env` file). Every missing
  /// variable is reported in one error rather than failing on the first.
  pub fn load() -> Result<Self, AppError> {
    dotenvy::dotenv().ok();

    let mut missing: Vec<&str> = Vec::new();
    let mut lookup = |key: &'static str| {
      env::var(key).unwrap_or_else(|_| {
        missing.push(key);
        String::new()
      })
    };

    let loaded = Self {
      database_url: lookup("DATABASE_URL"),
      embeddings: EmbeddingEnv {
        base_url: lookup("OPENAI_BASE_URL"),
        api_key: lookup("OPENAI_API_KEY"),
        model: lookup("OPENAI_EMBEDDING_MODEL"),
      },
    };

    if missing.is_empty() {
      Ok(loaded)
    } else {
      Err(AppError::new(anyhow!(
        "missing environment variables: {}",
        missing.join(", ")
      )))
    }
  }
}
