//! Key-value storage abstractions backing the pricing pipeline

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Mutation applied by [`KeyValueCollection::update`]. Receives the current
/// value (if any, and not expired) and returns the value to write, or `None`
/// to leave the key untouched.
pub type UpdateFn<'a> = dyn FnMut(Option<&[u8]>) -> Option<Vec<u8>> + Send + 'a;

/// A named collection of byte keys and values.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()>;

    async fn remove(&self, key: &[u8]) -> Result<()>;

    /// All live entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Atomic read-modify-write of a single key. Concurrent updates on the
    /// same collection are serialised.
    async fn update(&self, key: &[u8], f: &mut UpdateFn<'_>) -> Result<()>;
}

/// Hands out collections by name.
pub trait Store: Send + Sync {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>>;

    fn remove_collection(&self, name: &str) -> bool;
}
