use crate::{Result, Time};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};

/// Branch an entry was written from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheScope(String);

impl CacheScope {
  pub fn branch(name: impl Into<String>) -> Self {
    CacheScope(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "branch:{}", self.0)
  }
}

/// Opaque reference to the cached artifact, interpreted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadHandle(String);

impl PayloadHandle {
  pub fn new(handle: impl Into<String>) -> Self {
    PayloadHandle(handle.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

/// Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: String,
  pub scope: CacheScope,
  pub payload: PayloadHandle,
  pub created_at: Time,
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
  async fn get(&self, key: &str, scope: &CacheScope) -> Result<Option<CacheEntry>>;
  async fn put(&self, entry: CacheEntry) -> Result<()>;
}

/// In-process backend. Last write wins.
#[derive(Default, Clone)]
pub struct MemoryCache {
  entries: Arc<Mutex<HashMap<(CacheScope, String), CacheEntry>>>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }

  pub fn entry(&self, key: &str, scope: &CacheScope) -> Option<CacheEntry> {
    self
      .entries
      .lock()
      .get(&(scope.clone(), key.to_string()))
      .cloned()
  }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCache {
  async fn get(&self, key: &str, scope: &CacheScope) -> Result<Option<CacheEntry>> {
    Ok(self.entry(key, scope))
  }

  async fn put(&self, entry: CacheEntry) -> Result<()> {
    self
      .entries
      .lock()
      .insert((entry.scope.clone(), entry.key.clone()), entry);

    Ok(())
  }
}

/// Looks cache keys up on the run's branch first, then on the default
/// branch.
#[derive(Clone)]
pub struct CacheResolver {
  backend: Arc<dyn CacheBackend>,
  scopes: Vec<CacheScope>,
}

impl CacheResolver {
  pub fn new(backend: Arc<dyn CacheBackend>, branch: &str, default_branch: &str) -> Self {
    let mut scopes = vec![CacheScope::branch(branch)];
    if branch != default_branch {
      scopes.push(CacheScope::branch(default_branch));
    }

    CacheResolver { backend, scopes }
  }

  pub fn scopes(&self) -> &[CacheScope] {
    &self.scopes
  }

  /// Scope new entries are written to.
  pub fn write_scope(&self) -> &CacheScope {
    &self.scopes[0]
  }

  /// First entry found, trying every scope for a key before moving on to the
  /// next key. A failing read counts as a miss.
  pub async fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> Result<Option<CacheEntry>> {
    for key in keys {
      let key = key.as_ref();
      for scope in &self.scopes {
        match self.backend.get(key, scope).await {
          Ok(Some(entry)) => {
            log::info!("Cache hit for key `{}` in {}", key, scope);
            return Ok(Some(entry));
          }
          Ok(None) => {
            log::trace!("Cache key `{}` not found in {}", key, scope);
          }
          Err(err) => {
            log::error!("Failed to read cache key `{}` in {}: {}", key, scope, err);
          }
        }
      }
    }

    log::info!(
      "Cache miss for keys [{}]",
      keys
        .iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
    );

    Ok(None)
  }

  /// Write failures are logged and otherwise ignored.
  pub async fn store(&self, key: &str, payload: PayloadHandle, scope: &CacheScope) {
    let entry = CacheEntry {
      key: key.to_string(),
      scope: scope.clone(),
      payload,
      created_at: chrono::Utc::now(),
    };

    match self.backend.put(entry).await {
      Ok(()) => log::info!("Stored cache key `{}` in {}", key, scope),
      Err(err) => log::warn!("Failed to store cache key `{}` in {}: {}", key, scope, err),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Error;

  struct BrokenBackend;

  #[async_trait::async_trait]
  impl CacheBackend for BrokenBackend {
    async fn get(&self, _key: &str, _scope: &CacheScope) -> Result<Option<CacheEntry>> {
      Err(Error::external_backend_error("connection reset"))
    }

    async fn put(&self, _entry: CacheEntry) -> Result<()> {
      Err(Error::external_backend_error("read-only"))
    }
  }

  async fn seeded(entries: &[(&str, &str)]) -> MemoryCache {
    let cache = MemoryCache::new();
    for (scope, key) in entries {
      cache
        .put(CacheEntry {
          key: key.to_string(),
          scope: CacheScope::branch(*scope),
          payload: PayloadHandle::new(format!("{}/{}", scope, key)),
          created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    }
    cache
  }

  #[trellis_test::test]
  async fn falls_back_to_later_key() {
    let cache = seeded(&[("main", "main-cache")]).await;
    let resolver = CacheResolver::new(Arc::new(cache), "main", "main");

    let entry = resolver
      .resolve(&["branch-cache", "main-cache"])
      .await
      .unwrap()
      .unwrap();

    assert_eq!(entry.key, "main-cache");
  }

  #[trellis_test::test]
  async fn miss() {
    let resolver = CacheResolver::new(Arc::new(MemoryCache::new()), "feature", "main");

    assert_eq!(resolver.resolve(&["a", "b"]).await.unwrap(), None);
    assert_eq!(resolver.resolve::<&str>(&[]).await.unwrap(), None);
  }

  #[trellis_test::test]
  async fn key_order_beats_scope_order() {
    let cache = seeded(&[("main", "deps-v1"), ("feature", "deps-v0")]).await;
    let resolver = CacheResolver::new(Arc::new(cache), "feature", "main");

    let entry = resolver
      .resolve(&["deps-v1", "deps-v0"])
      .await
      .unwrap()
      .unwrap();

    assert_eq!(entry.key, "deps-v1");
    assert_eq!(entry.scope, CacheScope::branch("main"));
    assert_eq!(resolver.scopes().len(), 2);
    assert_eq!(resolver.write_scope(), &CacheScope::branch("feature"));
  }

  #[trellis_test::test]
  async fn read_errors_are_misses() {
    let resolver = CacheResolver::new(Arc::new(BrokenBackend), "main", "main");

    assert_eq!(resolver.resolve(&["deps"]).await.unwrap(), None);

    // Write errors never surface
    resolver
      .store("deps", PayloadHandle::new("x"), &CacheScope::branch("main"))
      .await;
  }

  #[trellis_test::test]
  async fn last_write_wins() {
    let cache = MemoryCache::new();
    let resolver = CacheResolver::new(Arc::new(cache.clone()), "main", "main");
    let scope = CacheScope::branch("main");

    resolver.store("deps", PayloadHandle::new("first"), &scope).await;
    resolver.store("deps", PayloadHandle::new("second"), &scope).await;

    assert_eq!(cache.len(), 1);
    assert_eq!(
      cache.entry("deps", &scope).unwrap().payload,
      PayloadHandle::new("second")
    );
  }
}
