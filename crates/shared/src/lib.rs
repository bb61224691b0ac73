mod error;
pub use error::{AppError, ConsolidationError, StoreError};

mod env;
pub use env::{AppEnv, EmbeddingEnv};
