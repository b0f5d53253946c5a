//! In-memory backend for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use conductor_common::{ProgressUpdate, WorkflowStatus, WorkflowSummary};

use super::{Backend, CreateWorkflowRequest, HealthReport};
use crate::context::{ContextConfig, ContextQuery, SearchResult};
use crate::errors::BackendError;

/// Scripted responses for `get_status`.
pub enum Scripted {
    Update(ProgressUpdate),
    Fail(BackendError),
}

/// Backend whose answers are queued up front by the test.
///
/// `get_status` pops the next scripted answer; once the queue is empty it
/// keeps repeating `fallback_status`, or fails when none is set.
pub struct MockBackend {
    pub next_id: Mutex<Option<String>>,
    pub create_error: Mutex<Option<BackendError>>,
    pub created: Mutex<Vec<CreateWorkflowRequest>>,
    pub statuses: Mutex<VecDeque<Scripted>>,
    pub fallback_status: Mutex<Option<ProgressUpdate>>,
    pub workflows: Mutex<Vec<WorkflowSummary>>,
    pub list_fails: Mutex<bool>,
    pub results: Mutex<Vec<SearchResult>>,
    pub config: Mutex<ContextConfig>,
    pub stream: Option<String>,
    pub status_calls: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            next_id: Mutex::new(Some("wf-1".to_string())),
            create_error: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new(None),
            workflows: Mutex::new(Vec::new()),
            list_fails: Mutex::new(false),
            results: Mutex::new(Vec::new()),
            config: Mutex::new(ContextConfig::default()),
            stream: None,
            status_calls: AtomicUsize::new(0),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, update: ProgressUpdate) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Scripted::Update(update));
    }

    pub fn push_failure(&self, error: BackendError) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(error));
    }

    pub fn set_fallback(&self, update: ProgressUpdate) {
        *self.fallback_status.lock().unwrap() = Some(update);
    }

    pub fn fail_create(&self, error: BackendError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

pub fn unavailable() -> BackendError {
    BackendError::Rejected {
        status: 503,
        message: "Service Unavailable".into(),
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create(&self, request: &CreateWorkflowRequest) -> Result<String, BackendError> {
        if let Some(err) = self.create_error.lock().unwrap().take() {
            return Err(err);
        }
        self.created.lock().unwrap().push(request.clone());
        self.next_id
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Malformed("no id".into()))
    }

    async fn get_status(&self, workflow_id: &str) -> Result<ProgressUpdate, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Update(mut update)) => {
                if update.workflow_id.is_empty() {
                    update.workflow_id = workflow_id.to_string();
                }
                Ok(update)
            }
            Some(Scripted::Fail(err)) => Err(err),
            None => self
                .fallback_status
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(unavailable),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, BackendError> {
        if *self.list_fails.lock().unwrap() {
            return Err(unavailable());
        }
        let mut entries = self.workflows.lock().unwrap().clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn health(&self) -> Result<HealthReport, BackendError> {
        Ok(HealthReport {
            status: "healthy".into(),
            service: Some("mock".into()),
            version: None,
            timestamp: None,
            checks: Default::default(),
        })
    }

    async fn search_context(
        &self,
        _query: &ContextQuery,
    ) -> Result<Vec<SearchResult>, BackendError> {
        Ok(self.results.lock().unwrap().clone())
    }

    async fn context_config(&self) -> Result<ContextConfig, BackendError> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn update_context_config(&self, config: &ContextConfig) -> Result<(), BackendError> {
        *self.config.lock().unwrap() = config.clone();
        Ok(())
    }

    fn stream_url(&self, workflow_id: &str) -> Option<String> {
        self.stream
            .as_ref()
            .map(|base| format!("{}/ws/workflows/{}", base, workflow_id))
    }
}

pub fn running(id: &str, progress: u8) -> ProgressUpdate {
    ProgressUpdate::status(id, WorkflowStatus::Running, progress)
}

pub fn completed(id: &str, progress: u8) -> ProgressUpdate {
    ProgressUpdate::status(id, WorkflowStatus::Completed, progress)
}
