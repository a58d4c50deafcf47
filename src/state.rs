//! Durable key-value state kept across reconcile passes.
//!
//! The operator persists only a handful of strings (the cluster initiator and
//! the last applied spec). They live behind this interface so the decision
//! logic does not depend on which object stores them.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
