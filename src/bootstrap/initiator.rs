//! Election of the member that seeds the replicated OVN databases.

use anyhow::Result;
use tracing::info;

use crate::names::CLUSTER_INITIATOR_ANNOTATION;
use crate::state::StateStore;

/// Pick the initiator among `members` (sorted ascending).
///
/// A persisted initiator is kept while it is still a member; otherwise the
/// smallest member address wins. Returns `None` only for an empty set.
pub fn choose_initiator<'a>(persisted: Option<&str>, members: &'a [String]) -> Option<&'a str> {
    if let Some(current) = persisted
        && let Some(kept) = members.iter().find(|m| m.as_str() == current)
    {
        return Some(kept.as_str());
    }
    members.iter().min().map(String::as_str)
}

/// Resolve the initiator and persist it when it changed.
pub async fn elect(store: &dyn StateStore, members: &[String]) -> Result<Option<String>> {
    let persisted = store.get(CLUSTER_INITIATOR_ANNOTATION).await?;
    let Some(chosen) = choose_initiator(persisted.as_deref(), members) else {
        return Ok(None);
    };

    if persisted.as_deref() != Some(chosen) {
        info!(
            "Electing new OVN cluster initiator {} (previous: {})",
            chosen,
            persisted.as_deref().unwrap_or("<none>")
        );
        store.set(CLUSTER_INITIATOR_ANNOTATION, chosen).await?;
    }
    Ok(Some(chosen.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::memory::MemoryStore;

    fn members(addrs: &[&str]) -> Vec<String> {
        addrs.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_choose_keeps_persisted_member() {
        let m = members(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(choose_initiator(Some("10.0.0.2"), &m), Some("10.0.0.2"));
    }

    #[test]
    fn test_choose_replaces_departed_member() {
        let m = members(&["10.0.0.1", "10.0.0.3"]);
        assert_eq!(choose_initiator(Some("10.0.0.2"), &m), Some("10.0.0.1"));
        assert_eq!(choose_initiator(None, &m), Some("10.0.0.1"));
        assert_eq!(choose_initiator(None, &[]), None);
    }

    #[tokio::test]
    async fn test_elect_first_time_persists_smallest() {
        let store = MemoryStore::default();
        let m = members(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let chosen = elect(&store, &m).await.unwrap();
        assert_eq!(chosen.as_deref(), Some("10.0.0.1"));
        assert_eq!(
            store.writes(),
            vec![(CLUSTER_INITIATOR_ANNOTATION.to_string(), "10.0.0.1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_elect_is_idempotent() {
        let store = MemoryStore::with(CLUSTER_INITIATOR_ANNOTATION, "10.0.0.2");
        let m = members(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        for _ in 0..3 {
            let chosen = elect(&store, &m).await.unwrap();
            assert_eq!(chosen.as_deref(), Some("10.0.0.2"));
        }
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_elect_reelects_when_initiator_leaves() {
        let store = MemoryStore::with(CLUSTER_INITIATOR_ANNOTATION, "10.0.0.1");
        let m = members(&["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let chosen = elect(&store, &m).await.unwrap();
        assert_eq!(chosen.as_deref(), Some("10.0.0.2"));
        assert_eq!(store.writes().len(), 1);
        assert_eq!(
            store.get(CLUSTER_INITIATOR_ANNOTATION).await.unwrap().as_deref(),
            Some("10.0.0.2")
        );
    }
}
