//! History Store: the list of previously created workflows.
//!
//! Refreshed on demand from the backend and never fed by the controller, so
//! it shares no mutable state with the active workflow.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use conductor_common::WorkflowSummary;

use crate::backend::Backend;
use crate::errors::BackendError;

pub struct HistoryStore {
    backend: Arc<dyn Backend>,
    entries: Vec<WorkflowSummary>,
    last_refreshed: Option<DateTime<Utc>>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            entries: Vec::new(),
            last_refreshed: None,
        }
    }

    /// Replace the cached list with the backend's. On failure the previous
    /// entries are kept.
    pub async fn refresh(&mut self) -> Result<&[WorkflowSummary], BackendError> {
        let mut entries = self.backend.list().await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::debug!(count = entries.len(), "history refreshed");
        self.entries = entries;
        self.last_refreshed = Some(Utc::now());
        Ok(&self.entries)
    }

    /// Cached entries, newest first.
    pub fn entries(&self) -> &[WorkflowSummary] {
        &self.entries
    }

    /// Look up by exact id, or by unique id prefix.
    pub fn find(&self, id: &str) -> Option<&WorkflowSummary> {
        if let Some(exact) = self.entries.iter().find(|e| e.id == id) {
            return Some(exact);
        }
        let mut matches = self.entries.iter().filter(|e| e.id.starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(only), None) if !id.is_empty() => Some(only),
            _ => None,
        }
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use chrono::TimeZone;
    use conductor_common::WorkflowStatus;

    fn summary(id: &str, day: u32) -> WorkflowSummary {
        WorkflowSummary {
            id: id.to_string(),
            source_url: format!("https://github.com/acme/{}", id),
            prompt: None,
            mode: None,
            status: WorkflowStatus::Completed,
            progress: Some(100),
            error: None,
            log_lines: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_orders_newest_first() {
        let backend = Arc::new(MockBackend::new());
        backend
            .workflows
            .lock()
            .unwrap()
            .extend([summary("wf-a", 1), summary("wf-c", 3), summary("wf-b", 2)]);
        let mut store = HistoryStore::new(backend);
        assert!(store.last_refreshed().is_none());

        let ids: Vec<&str> = store
            .refresh()
            .await
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["wf-c", "wf-b", "wf-a"]);
        assert!(store.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entries() {
        let backend = Arc::new(MockBackend::new());
        backend.workflows.lock().unwrap().push(summary("wf-a", 1));
        let mut store = HistoryStore::new(backend.clone());
        store.refresh().await.unwrap();
        let first = store.last_refreshed();

        *backend.list_fails.lock().unwrap() = true;
        assert!(store.refresh().await.is_err());
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.last_refreshed(), first);
    }

    #[tokio::test]
    async fn test_find_by_id_or_unique_prefix() {
        let backend = Arc::new(MockBackend::new());
        backend
            .workflows
            .lock()
            .unwrap()
            .extend([summary("abc-1", 1), summary("abc-2", 2), summary("xyz-9", 3)]);
        let mut store = HistoryStore::new(backend);
        store.refresh().await.unwrap();

        assert_eq!(store.find("abc-2").map(|e| e.id.as_str()), Some("abc-2"));
        assert_eq!(store.find("xyz").map(|e| e.id.as_str()), Some("xyz-9"));
        assert!(store.find("abc").is_none());
        assert!(store.find("").is_none());
        assert!(store.find("nope").is_none());
    }
}
