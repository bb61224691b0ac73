use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Hash of the exact UTF-8 bytes of a text. Accented characters are
/// significant: "planificación" and "planificacion" never collide.
#[must_use]
pub fn text_hash(text: &str) -> [u8; 32] {
  let mut hasher = Sha256::new();
  hasher.update(text.as_bytes());
  hasher.finalize().into()
}

/// Hex form of `text_hash`, the representation persisted next to cached
/// entity vectors for invalidation checks.
#[must_use]
pub fn text_hash_hex(text: &str) -> String {
  let digest = text_hash(text);
  let mut out = String::with_capacity(64);
  for byte in digest {
    use std::fmt::Write;
    let _ = write!(out, "{byte:02x}");
  }
  out
}

/// Process-wide LRU cache of embeddings keyed by text hash.
pub struct EmbeddingCache {
  inner: Mutex<LruCache<[u8; 32], Arc<Vec<f32>>>>,
}

impl EmbeddingCache {
  /// # Panics
  ///
  /// Panics if `capacity` is zero.
  #[must_use]
  pub fn new(capacity: usize) -> Self {
    let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
    Self {
      inner: Mutex::new(LruCache::new(capacity)),
    }
  }

  #[must_use]
  pub fn get(&self, key: &[u8; 32]) -> Option<Arc<Vec<f32>>> {
    self.inner.lock().get(key).cloned()
  }

  pub fn put(&self, key: [u8; 32], vector: Vec<f32>) -> Arc<Vec<f32>> {
    let vector = Arc::new(vector);
    self.inner.lock().put(key, Arc::clone(&vector));
    vector
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.inner.lock().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accents_produce_distinct_keys() {
    assert_ne!(text_hash("planificación"), text_hash("planificacion"));
    assert_ne!(text_hash_hex("café"), text_hash_hex("cafe"));
  }

  #[test]
  fn hex_hash_is_stable_and_64_chars() {
    let a = text_hash_hex("reportes lentos");
    let b = text_hash_hex("reportes lentos");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn lru_evicts_oldest_entry() {
    let cache = EmbeddingCache::new(2);
    cache.put(text_hash("a"), vec![1.0]);
    cache.put(text_hash("b"), vec![2.0]);
    cache.put(text_hash("c"), vec![3.0]);
    assert!(cache.get(&text_hash("a")).is_none());
    assert!(cache.get(&text_hash("c")).is_some());
    assert_eq!(cache.len(), 2);
  }
}
