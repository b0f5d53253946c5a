//! Workflow Controller: turns a submission into the single active workflow
//! and keeps its view up to date.
//!
//! The active workflow belongs to a generation. Every submit, selection or
//! teardown starts a new generation and cancels the previous pump task, and
//! the pump re-checks its generation under the lock before applying anything,
//! so a message that races with cancellation is dropped. A new pump waits for
//! the previous one to release its socket or timer before opening its own.

use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use conductor_common::{Workflow, WorkflowMode, reconcile};

use crate::backend::{Backend, CreateWorkflowRequest};
use crate::errors::{SubmitError, ValidationError};
use crate::source::{SourceEvent, StatusSourceAdapter, SyncSettings};

/// Upper bound on waiting for a superseded pump to close its transport.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+?(\.git)?/?$").unwrap()
});

/// What the user asked to run.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub source_url: String,
    pub mode: WorkflowMode,
    pub prompt: Option<String>,
}

/// Check a submission locally and shape the creation request.
pub fn validate_submission(
    request: &SubmitRequest,
) -> Result<CreateWorkflowRequest, ValidationError> {
    let url = request.source_url.trim();
    if url.is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    if !REPO_URL.is_match(url) {
        return Err(ValidationError::UnrecognizedHost {
            url: url.to_string(),
        });
    }

    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    let task_prompt = match request.mode {
        WorkflowMode::PromptDriven => Some(prompt.ok_or(ValidationError::MissingPrompt)?),
        WorkflowMode::SelfContained => prompt,
    };

    Ok(CreateWorkflowRequest {
        repository_url: url.to_string(),
        task_prompt,
        mode: request.mode,
    })
}

/// Snapshot handed to renderers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowView {
    pub workflow: Option<Workflow>,
    /// A status source is attached and feeding updates
    pub live: bool,
    /// Both transports are failing; state shown is last known
    pub transport_degraded: bool,
    pub degraded_reason: Option<String>,
    /// Frozen history entry
    pub read_only: bool,
}

struct ControllerState {
    generation: u64,
    view: WorkflowView,
    cancel: Option<CancellationToken>,
    pump: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<ControllerState>,
    view_tx: watch::Sender<WorkflowView>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, view: &WorkflowView) {
        self.view_tx.send_replace(view.clone());
    }

    /// Fold one event into the view. Returns false once `generation` is stale.
    fn accept(&self, generation: u64, event: SourceEvent) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(
                generation,
                current = state.generation,
                "discarding event from superseded source"
            );
            return false;
        }
        match event {
            SourceEvent::Update(update) => {
                let Some(current) = state.view.workflow.as_ref() else {
                    return false;
                };
                match reconcile::apply(current, &update, Utc::now()) {
                    Ok(next) => {
                        let terminal = next.is_terminal();
                        state.view.workflow = Some(next);
                        state.view.transport_degraded = false;
                        state.view.degraded_reason = None;
                        if terminal {
                            state.view.live = false;
                            state.view.read_only = true;
                        }
                        self.publish(&state.view);
                    }
                    Err(rejected) => {
                        tracing::debug!(%rejected, "update not applied");
                    }
                }
            }
            SourceEvent::Degraded(reason) => {
                tracing::warn!(%reason, "transport degraded");
                state.view.transport_degraded = true;
                state.view.degraded_reason = Some(reason);
                self.publish(&state.view);
            }
        }
        true
    }

    fn finish(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation && state.view.live {
            state.view.live = false;
            self.publish(&state.view);
        }
    }
}

pub struct WorkflowController {
    backend: Arc<dyn Backend>,
    settings: SyncSettings,
    shared: Arc<Shared>,
}

impl WorkflowController {
    pub fn new(backend: Arc<dyn Backend>, settings: SyncSettings) -> Self {
        let (view_tx, _) = watch::channel(WorkflowView::default());
        Self {
            backend,
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState {
                    generation: 0,
                    view: WorkflowView::default(),
                    cancel: None,
                    pump: None,
                }),
                view_tx,
            }),
        }
    }

    /// Validate, create on the backend, then make the new workflow active.
    ///
    /// Nothing changes locally unless the backend returned an id.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Workflow, SubmitError> {
        let create = validate_submission(&request)?;
        let id = self.backend.create(&create).await?;
        let workflow = Workflow::pending(
            id,
            create.repository_url,
            create.task_prompt,
            create.mode,
            Utc::now(),
        );
        tracing::info!(workflow_id = %workflow.id, "workflow submitted");
        self.activate(workflow.clone(), true);
        Ok(workflow)
    }

    /// Make a history entry active. Terminal entries are shown read-only;
    /// anything still in flight is tracked live again.
    pub fn select_active(&self, workflow: Workflow) {
        let live = !workflow.is_terminal();
        tracing::debug!(workflow_id = %workflow.id, live, "selecting workflow");
        self.activate(workflow, live);
    }

    /// Detach the live source, if any. Safe to call repeatedly.
    ///
    /// Cancellation is synchronous: no event is applied after this returns.
    /// The pump closes its transport on its own task shortly after.
    pub fn teardown(&self) {
        let mut state = self.shared.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
            state.generation += 1;
        }
        if state.view.live {
            state.view.live = false;
            self.shared.publish(&state.view);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowView> {
        self.shared.view_tx.subscribe()
    }

    pub fn snapshot(&self) -> WorkflowView {
        self.shared.lock().view.clone()
    }

    /// Cancel the current pump and install `workflow`. When `live`, a new pump
    /// is spawned; it first waits for the cancelled pump to release its
    /// transport, so two sockets are never open at once.
    fn activate(&self, workflow: Workflow, live: bool) {
        let workflow_id = workflow.id.clone();
        let (generation, cancel, previous) = {
            let mut state = self.shared.lock();
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }
            let previous = state.pump.take();
            state.generation += 1;
            state.view = WorkflowView {
                workflow: Some(workflow),
                live,
                transport_degraded: false,
                degraded_reason: None,
                read_only: !live,
            };
            self.shared.publish(&state.view);
            if !live {
                // Still closing; the next live pump waits on it.
                state.pump = previous;
                return;
            }
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            (state.generation, cancel, previous)
        };

        let handle = tokio::spawn(pump(
            self.shared.clone(),
            self.backend.clone(),
            self.settings.clone(),
            workflow_id,
            generation,
            cancel,
            previous,
        ));
        let mut state = self.shared.lock();
        if state.generation == generation {
            state.pump = Some(handle);
        }
    }
}

impl Drop for WorkflowController {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

async fn pump(
    shared: Arc<Shared>,
    backend: Arc<dyn Backend>,
    settings: SyncSettings,
    workflow_id: String,
    generation: u64,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous
        && tokio::time::timeout(RELEASE_TIMEOUT, previous).await.is_err()
    {
        tracing::warn!(generation, "previous status pump still closing");
    }

    let mut adapter = tokio::select! {
        _ = cancel.cancelled() => return,
        adapter = StatusSourceAdapter::open(backend, workflow_id, settings) => adapter,
    };

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = adapter.next_event() => event,
        };
        let Some(event) = event else { break };
        if !shared.accept(generation, event) {
            break;
        }
    }

    adapter.close().await;
    shared.finish(generation);
    tracing::debug!(workflow_id = %adapter.workflow_id(), generation, "status pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, completed, running, unavailable};
    use crate::errors::BackendError;
    use conductor_common::{ProgressUpdate, WorkflowStatus};
    use std::time::Duration;

    fn fast() -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            reconnect_budget: 3,
        }
    }

    fn request(url: &str, mode: WorkflowMode, prompt: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            source_url: url.to_string(),
            mode,
            prompt: prompt.map(str::to_string),
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<WorkflowView>,
        f: impl FnMut(&WorkflowView) -> bool,
    ) -> WorkflowView {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
            .await
            .expect("view never reached expected state")
            .unwrap()
            .clone()
    }

    fn history_entry(id: &str, status: WorkflowStatus, progress: u8) -> Workflow {
        let mut wf = Workflow::pending(
            id,
            "https://github.com/acme/old".to_string(),
            None,
            WorkflowMode::SelfContained,
            Utc::now(),
        );
        wf.status = status;
        wf.progress = progress;
        wf
    }

    #[test]
    fn test_validate_accepts_github_urls() {
        for url in [
            "https://github.com/acme/widget",
            "https://github.com/acme/widget.git",
            "https://github.com/acme/widget/",
            "  https://github.com/my-org/my_repo.rs  ",
        ] {
            let req =
                validate_submission(&request(url, WorkflowMode::SelfContained, None)).unwrap();
            assert_eq!(req.repository_url, url.trim());
        }
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        assert_eq!(
            validate_submission(&request("  ", WorkflowMode::SelfContained, None)).unwrap_err(),
            ValidationError::MissingUrl
        );
        for url in [
            "https://gitlab.com/acme/widget",
            "http://github.com/acme/widget",
            "https://github.com/acme",
            "https://github.com/acme/widget/tree/main",
            "github.com/acme/widget",
        ] {
            assert!(matches!(
                validate_submission(&request(url, WorkflowMode::SelfContained, None)),
                Err(ValidationError::UnrecognizedHost { .. })
            ));
        }
    }

    #[test]
    fn test_validate_prompt_rules() {
        let url = "https://github.com/acme/widget";
        let blank = request(url, WorkflowMode::PromptDriven, Some("   "));
        assert_eq!(
            validate_submission(&blank).unwrap_err(),
            ValidationError::MissingPrompt
        );
        assert_eq!(
            validate_submission(&request(url, WorkflowMode::PromptDriven, None)).unwrap_err(),
            ValidationError::MissingPrompt
        );
        let given = request(url, WorkflowMode::PromptDriven, Some(" add tests "));
        let ok = validate_submission(&given).unwrap();
        assert_eq!(ok.task_prompt.as_deref(), Some("add tests"));

        let blank = request(url, WorkflowMode::SelfContained, Some("  "));
        let ignored = validate_submission(&blank).unwrap();
        assert!(ignored.task_prompt.is_none());
    }

    #[tokio::test]
    async fn test_invalid_submit_never_reaches_backend() {
        let backend = Arc::new(MockBackend::new());
        let controller = WorkflowController::new(backend.clone(), fast());
        let err = controller
            .submit(request("", WorkflowMode::SelfContained, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::MissingUrl)));
        assert_eq!(backend.created_count(), 0);
        assert!(controller.snapshot().workflow.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_no_workflow() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_create(BackendError::Rejected {
            status: 500,
            message: "boom".into(),
        });
        let controller = WorkflowController::new(backend.clone(), fast());
        let err = controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Submission(_)));
        assert_eq!(controller.snapshot(), WorkflowView::default());
    }

    #[tokio::test]
    async fn test_submit_starts_pending_and_tracks_to_completion() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(running("wf-1", 10));
        backend.push_status(running("wf-1", 5));
        backend.push_status(completed("wf-1", 90));
        let controller = WorkflowController::new(backend.clone(), fast());
        let mut rx = controller.subscribe();

        let wf = controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();
        assert_eq!(wf.id, "wf-1");
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert_eq!(wf.progress, 0);
        assert!(wf.log.is_empty());

        let done = wait_for(&mut rx, |v| !v.live).await;
        let wf = done.workflow.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.progress, 100);
        assert!(done.read_only);
    }

    #[tokio::test]
    async fn test_failed_update_records_error() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(
            ProgressUpdate::status("wf-1", WorkflowStatus::Failed, 40).with_error("clone failed"),
        );
        let controller = WorkflowController::new(backend, fast());
        let mut rx = controller.subscribe();
        controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();

        let view = wait_for(&mut rx, |v| !v.live).await;
        let wf = view.workflow.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.progress, 40);
        assert_eq!(wf.error.as_deref(), Some("clone failed"));
        assert!(wf.log.iter().any(|e| e.line == "Error: clone failed"));
    }

    #[tokio::test]
    async fn test_degraded_flag_raised_and_cleared() {
        let backend = Arc::new(MockBackend::new());
        for _ in 0..3 {
            backend.push_failure(unavailable());
        }
        backend.push_status(running("wf-1", 20));
        backend.set_fallback(completed("wf-1", 100));
        let settings = SyncSettings {
            poll_interval: Duration::from_millis(50),
            ..fast()
        };
        let controller = WorkflowController::new(backend, settings);
        let mut rx = controller.subscribe();
        controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();

        let degraded = wait_for(&mut rx, |v| v.transport_degraded).await;
        let held = degraded.workflow.unwrap();
        assert_eq!(held.status, WorkflowStatus::Pending);

        let recovered = wait_for(&mut rx, |v| {
            !v.transport_degraded && v.workflow.as_ref().is_some_and(|w| w.progress >= 20)
        })
        .await;
        assert!(recovered.degraded_reason.is_none());
    }

    #[tokio::test]
    async fn test_selecting_history_discards_live_source() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fallback(running("wf-1", 10));
        let controller = WorkflowController::new(backend, fast());
        let mut rx = controller.subscribe();
        controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();
        wait_for(&mut rx, |v| v.workflow.as_ref().is_some_and(|w| w.progress == 10)).await;

        controller.select_active(history_entry("wf-old", WorkflowStatus::Completed, 100));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let view = controller.snapshot();
        assert!(view.read_only);
        assert!(!view.live);
        let wf = view.workflow.unwrap();
        assert_eq!(wf.id, "wf-old");
        assert!(wf.log.is_empty());
    }

    #[tokio::test]
    async fn test_selecting_running_history_entry_resumes_tracking() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(running("wf-7", 60));
        backend.push_status(completed("wf-7", 100));
        let controller = WorkflowController::new(backend, fast());
        let mut rx = controller.subscribe();

        controller.select_active(history_entry("wf-7", WorkflowStatus::Running, 55));
        assert!(controller.snapshot().live);
        let done = wait_for(&mut rx, |v| !v.live).await;
        assert_eq!(done.workflow.unwrap().status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_event_from_cancelled_generation_is_not_applied() {
        let backend = Arc::new(MockBackend::new());
        let settings = SyncSettings {
            poll_interval: Duration::from_secs(3600),
            ..fast()
        };
        let controller = WorkflowController::new(backend, settings);
        controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();

        let generation = controller.shared.lock().generation;
        assert!(
            controller
                .shared
                .accept(generation, SourceEvent::Update(running("wf-1", 30)))
        );
        assert_eq!(controller.snapshot().workflow.unwrap().progress, 30);

        controller.teardown();
        let applied = controller
            .shared
            .accept(generation, SourceEvent::Update(running("wf-1", 77)));
        assert!(!applied);
        let view = controller.snapshot();
        assert_eq!(view.workflow.unwrap().progress, 30);
        assert!(!view.live);

        let degraded = controller
            .shared
            .accept(generation, SourceEvent::Degraded("gone".into()));
        assert!(!degraded);
        assert!(!controller.snapshot().transport_degraded);
    }

    #[tokio::test]
    async fn test_switching_live_workflows_chains_pumps() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fallback(running("wf-1", 10));
        let controller = WorkflowController::new(backend.clone(), fast());
        let mut rx = controller.subscribe();
        controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();
        wait_for(&mut rx, |v| v.workflow.as_ref().is_some_and(|w| w.progress == 10)).await;

        controller.select_active(history_entry("wf-8", WorkflowStatus::Running, 5));
        controller.select_active(history_entry("wf-9", WorkflowStatus::Running, 5));
        backend.set_fallback(completed("wf-9", 100));

        let done = wait_for(&mut rx, |v| !v.live).await;
        let wf = done.workflow.unwrap();
        assert_eq!(wf.id, "wf-9");
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(controller.shared.lock().generation >= 3);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fallback(running("wf-1", 10));
        let controller = WorkflowController::new(backend, fast());
        controller
            .submit(request("https://github.com/acme/widget", WorkflowMode::SelfContained, None))
            .await
            .unwrap();
        controller.teardown();
        controller.teardown();
        let frozen = controller.snapshot();
        assert!(!frozen.live);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(controller.snapshot(), frozen);
    }
}
