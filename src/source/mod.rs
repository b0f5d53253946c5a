//! Status Source Adapter: one ordered event stream per workflow, fed by the
//! push channel when it is available and by polling otherwise.
//!
//! The adapter never yields updates for another workflow id, yields at most
//! one terminal update, and yields nothing after that or after `close()`.

pub mod poll;
pub mod push;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use conductor_common::ProgressUpdate;

use crate::backend::Backend;
use crate::errors::BackendError;
pub use poll::PollTimer;
pub use push::{PushChannel, PushError};

pub const CONNECTED_NOTICE: &str = "Connected to workflow progress stream";

/// Timings for the adapter's transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub reconnect_budget: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(5),
            reconnect_budget: 3,
        }
    }
}

/// What the adapter hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Update(ProgressUpdate),
    /// Both transports are failing. Never implies a status change.
    Degraded(String),
}

pub enum Transport {
    Push(PushChannel),
    Poll(PollTimer),
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::Poll(_) => "poll",
        }
    }
}

enum Step {
    Frame(String),
    Lost(Option<PushError>),
    Polled(Result<ProgressUpdate, BackendError>),
}

pub struct StatusSourceAdapter {
    workflow_id: String,
    backend: Arc<dyn Backend>,
    settings: SyncSettings,
    transport: Option<Transport>,
    pending: VecDeque<SourceEvent>,
    reconnect_remaining: u32,
    reconnecting: bool,
    finished: bool,
    closed: bool,
}

impl StatusSourceAdapter {
    /// Attach to `workflow_id`, trying the push channel once before polling.
    pub async fn open(
        backend: Arc<dyn Backend>,
        workflow_id: impl Into<String>,
        settings: SyncSettings,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let mut adapter = Self {
            workflow_id,
            backend,
            reconnect_remaining: settings.reconnect_budget,
            settings,
            transport: None,
            pending: VecDeque::new(),
            reconnecting: false,
            finished: false,
            closed: false,
        };

        match adapter.backend.stream_url(&adapter.workflow_id) {
            Some(url) => match PushChannel::connect(&url).await {
                Ok(channel) => {
                    adapter.transport = Some(Transport::Push(channel));
                    adapter.queue_notice(CONNECTED_NOTICE);
                }
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %adapter.workflow_id,
                        error = %e,
                        "push channel unavailable, polling instead"
                    );
                    adapter.start_polling();
                }
            },
            None => adapter.start_polling(),
        }
        tracing::debug!(
            workflow_id = %adapter.workflow_id,
            transport = adapter.transport_kind().unwrap_or("none"),
            "status source opened"
        );
        adapter
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// `"push"` or `"poll"`; `None` while reconnecting or once closed.
    pub fn transport_kind(&self) -> Option<&'static str> {
        self.transport.as_ref().map(Transport::kind)
    }

    /// Wait for the next event. `None` means the adapter is done for good.
    pub async fn next_event(&mut self) -> Option<SourceEvent> {
        loop {
            if self.finished || self.closed {
                return None;
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(self.deliver(event).await);
            }
            if self.reconnecting {
                self.reconnect().await;
                continue;
            }

            let step = match self.transport.as_mut() {
                None => return None,
                Some(Transport::Push(channel)) => match channel.next_frame().await {
                    Some(Ok(text)) => Step::Frame(text),
                    Some(Err(e)) => Step::Lost(Some(e)),
                    None => Step::Lost(None),
                },
                Some(Transport::Poll(timer)) => {
                    timer.tick().await;
                    Step::Polled(self.backend.get_status(&self.workflow_id).await)
                }
            };

            match step {
                Step::Frame(text) => {
                    if let Some(update) = self.parse_frame(&text) {
                        return Some(self.deliver(SourceEvent::Update(update)).await);
                    }
                }
                Step::Lost(cause) => self.on_push_lost(cause),
                Step::Polled(Ok(update)) => {
                    if let Some(Transport::Poll(timer)) = self.transport.as_mut() {
                        timer.record_success();
                    }
                    if update.workflow_id != self.workflow_id {
                        tracing::debug!(
                            expected = %self.workflow_id,
                            got = %update.workflow_id,
                            "dropping poll response for another workflow"
                        );
                        continue;
                    }
                    return Some(self.deliver(SourceEvent::Update(update)).await);
                }
                Step::Polled(Err(e)) => {
                    let Some(Transport::Poll(timer)) = self.transport.as_mut() else {
                        continue;
                    };
                    let transient = e.is_transient();
                    let degraded = if transient {
                        timer.record_failure()
                    } else {
                        timer.record_rejection()
                    };
                    let failures = timer.consecutive_failures();
                    tracing::warn!(
                        workflow_id = %self.workflow_id,
                        failures,
                        transient,
                        error = %e,
                        "status poll failed"
                    );
                    if degraded {
                        let reason = if transient {
                            format!("Backend unreachable after {} attempts: {}", failures, e)
                        } else {
                            format!("Status request refused: {}", e)
                        };
                        return Some(SourceEvent::Degraded(reason));
                    }
                }
            }
        }
    }

    /// Release the socket or timer. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        self.release().await;
        tracing::debug!(workflow_id = %self.workflow_id, "status source closed");
    }

    async fn release(&mut self) {
        if let Some(Transport::Push(mut channel)) = self.transport.take() {
            channel.close().await;
        }
    }

    async fn deliver(&mut self, event: SourceEvent) -> SourceEvent {
        if let SourceEvent::Update(update) = &event
            && update.is_terminal()
        {
            tracing::debug!(
                workflow_id = %self.workflow_id,
                status = ?update.status,
                "terminal update delivered"
            );
            self.finished = true;
            self.pending.clear();
            self.release().await;
        }
        event
    }

    fn parse_frame(&self, text: &str) -> Option<ProgressUpdate> {
        match serde_json::from_str::<ProgressUpdate>(text) {
            Ok(update) if update.workflow_id == self.workflow_id => Some(update),
            Ok(update) => {
                tracing::debug!(
                    expected = %self.workflow_id,
                    got = %update.workflow_id,
                    "dropping frame for another workflow"
                );
                None
            }
            Err(e) if is_keepalive(text) => {
                tracing::trace!(error = %e, "keepalive frame");
                None
            }
            Err(e) => {
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    error = %e,
                    "dropping unparseable progress frame"
                );
                None
            }
        }
    }

    fn queue_notice(&mut self, message: impl Into<String>) {
        self.pending.push_back(SourceEvent::Update(ProgressUpdate::notice(
            self.workflow_id.clone(),
            message,
        )));
    }

    fn start_polling(&mut self) {
        self.transport = Some(Transport::Poll(PollTimer::new(
            self.settings.poll_interval,
            self.settings.reconnect_budget,
        )));
    }

    fn on_push_lost(&mut self, cause: Option<PushError>) {
        match &cause {
            Some(e) => {
                tracing::warn!(workflow_id = %self.workflow_id, error = %e, "push channel lost")
            }
            None => {
                tracing::info!(workflow_id = %self.workflow_id, "push channel closed by server")
            }
        }
        // Dropping the channel closes the socket.
        self.transport = None;
        if self.reconnect_remaining == 0 {
            self.fall_back_to_poll();
            return;
        }
        self.queue_notice(format!(
            "Connection to progress stream lost; reconnecting in {}s",
            self.settings.reconnect_delay.as_secs_f64()
        ));
        self.reconnecting = true;
    }

    async fn reconnect(&mut self) {
        self.reconnecting = false;
        let Some(url) = self.backend.stream_url(&self.workflow_id) else {
            self.fall_back_to_poll();
            return;
        };
        while self.reconnect_remaining > 0 {
            tokio::time::sleep(self.settings.reconnect_delay).await;
            match PushChannel::connect(&url).await {
                Ok(channel) => {
                    self.reconnect_remaining = self.settings.reconnect_budget;
                    self.transport = Some(Transport::Push(channel));
                    self.queue_notice(CONNECTED_NOTICE);
                    return;
                }
                Err(e) => {
                    self.reconnect_remaining -= 1;
                    tracing::warn!(
                        workflow_id = %self.workflow_id,
                        attempts_left = self.reconnect_remaining,
                        error = %e,
                        "reconnect failed"
                    );
                }
            }
        }
        self.fall_back_to_poll();
    }

    fn fall_back_to_poll(&mut self) {
        self.queue_notice(format!(
            "Live updates unavailable; polling every {}s",
            self.settings.poll_interval.as_secs_f64()
        ));
        self.start_polling();
    }
}

fn is_keepalive(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .is_some_and(|t| matches!(t.as_str(), "ping" | "pong" | "heartbeat"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, completed, running};
    use conductor_common::WorkflowStatus;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn fast() -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            reconnect_budget: 3,
        }
    }

    async fn next(adapter: &mut StatusSourceAdapter) -> Option<SourceEvent> {
        tokio::time::timeout(Duration::from_secs(5), adapter.next_event())
            .await
            .expect("adapter stalled")
    }

    fn update(event: Option<SourceEvent>) -> ProgressUpdate {
        match event {
            Some(SourceEvent::Update(u)) => u,
            other => panic!("expected update, got {:?}", other),
        }
    }

    fn notice_text(event: Option<SourceEvent>) -> String {
        let u = update(event);
        assert!(u.status.is_none(), "expected a notice, got {:?}", u);
        u.message.unwrap_or_default()
    }

    async fn serve(listener: &TcpListener, frames: &[String]) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame.clone().into())).await.unwrap();
        }
        ws.close(None).await.unwrap();
    }

    fn frame(update: &ProgressUpdate) -> String {
        serde_json::to_string(update).unwrap()
    }

    #[tokio::test]
    async fn test_poll_stops_after_terminal_update() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(running("wf-1", 10));
        backend.push_status(completed("wf-1", 90));
        backend.set_fallback(running("wf-1", 50));

        let mut adapter = StatusSourceAdapter::open(backend.clone(), "wf-1", fast()).await;
        assert_eq!(adapter.transport_kind(), Some("poll"));
        assert_eq!(update(next(&mut adapter).await).progress, Some(10));
        let last = update(next(&mut adapter).await);
        assert_eq!(last.status, Some(WorkflowStatus::Completed));
        assert!(next(&mut adapter).await.is_none());
        assert!(next(&mut adapter).await.is_none());
        assert_eq!(adapter.transport_kind(), None);
    }

    #[tokio::test]
    async fn test_poll_failures_raise_degraded_once() {
        let backend = Arc::new(MockBackend::new());
        for _ in 0..4 {
            backend.push_failure(crate::backend::mock::unavailable());
        }
        backend.push_status(running("wf-1", 20));

        let mut adapter = StatusSourceAdapter::open(backend.clone(), "wf-1", fast()).await;
        match next(&mut adapter).await {
            Some(SourceEvent::Degraded(msg)) => assert!(msg.contains("3 attempts")),
            other => panic!("expected degraded, got {:?}", other),
        }
        // The fourth failure stays quiet; the next success comes through.
        assert_eq!(update(next(&mut adapter).await).progress, Some(20));
        assert_eq!(backend.status_calls.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_refused_status_request_degrades_immediately() {
        let backend = Arc::new(MockBackend::new());
        backend.push_failure(crate::errors::BackendError::Rejected {
            status: 404,
            message: "Workflow not found".into(),
        });
        backend.push_status(running("wf-1", 30));

        let mut adapter = StatusSourceAdapter::open(backend.clone(), "wf-1", fast()).await;
        match next(&mut adapter).await {
            Some(SourceEvent::Degraded(msg)) => {
                assert!(msg.contains("refused"));
                assert!(msg.contains("Workflow not found"));
            }
            other => panic!("expected degraded, got {:?}", other),
        }
        assert_eq!(update(next(&mut adapter).await).progress, Some(30));
        assert_eq!(backend.status_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_poll_drops_foreign_responses() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(running("wf-other", 70));
        backend.push_status(running("wf-1", 15));

        let mut adapter = StatusSourceAdapter::open(backend, "wf-1", fast()).await;
        let u = update(next(&mut adapter).await);
        assert_eq!(u.workflow_id, "wf-1");
        assert_eq!(u.progress, Some(15));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fallback(running("wf-1", 5));
        let mut adapter = StatusSourceAdapter::open(backend, "wf-1", fast()).await;
        adapter.close().await;
        adapter.close().await;
        assert!(next(&mut adapter).await.is_none());
    }

    #[tokio::test]
    async fn test_push_unavailable_at_open_falls_back_to_poll() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = Arc::new(MockBackend {
            stream: Some(format!("ws://{}", addr)),
            ..MockBackend::default()
        });
        backend.set_fallback(completed("wf-1", 100));

        let mut adapter = StatusSourceAdapter::open(backend, "wf-1", fast()).await;
        assert_eq!(adapter.transport_kind(), Some("poll"));
        assert_eq!(
            update(next(&mut adapter).await).status,
            Some(WorkflowStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_push_reconnects_after_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let first = vec![
            "not json".to_string(),
            r#"{"type":"ping"}"#.to_string(),
            frame(&running("wf-other", 80)),
            frame(&running("wf-1", 20)),
        ];
        let second = vec![frame(&completed("wf-1", 100))];
        let server = tokio::spawn(async move {
            serve(&listener, &first).await;
            serve(&listener, &second).await;
        });

        let backend = Arc::new(MockBackend {
            stream: Some(format!("ws://{}", addr)),
            ..MockBackend::default()
        });
        let mut adapter = StatusSourceAdapter::open(backend.clone(), "wf-1", fast()).await;
        assert_eq!(adapter.transport_kind(), Some("push"));

        assert_eq!(notice_text(next(&mut adapter).await), CONNECTED_NOTICE);
        assert_eq!(update(next(&mut adapter).await).progress, Some(20));
        assert!(notice_text(next(&mut adapter).await).contains("lost"));
        assert_eq!(notice_text(next(&mut adapter).await), CONNECTED_NOTICE);
        assert_eq!(
            update(next(&mut adapter).await).status,
            Some(WorkflowStatus::Completed)
        );
        assert!(next(&mut adapter).await.is_none());
        assert_eq!(backend.status_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_push_budget_exhausted_fails_over_to_poll() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames = vec![frame(&running("wf-1", 30))];
        let server = tokio::spawn(async move {
            serve(&listener, &frames).await;
            // Listener dropped here: every reconnect is refused.
        });

        let backend = Arc::new(MockBackend {
            stream: Some(format!("ws://{}", addr)),
            ..MockBackend::default()
        });
        backend.set_fallback(completed("wf-1", 90));
        let settings = SyncSettings {
            reconnect_budget: 2,
            ..fast()
        };
        let mut adapter = StatusSourceAdapter::open(backend, "wf-1", settings).await;

        assert_eq!(notice_text(next(&mut adapter).await), CONNECTED_NOTICE);
        assert_eq!(update(next(&mut adapter).await).progress, Some(30));
        server.await.unwrap();
        assert!(notice_text(next(&mut adapter).await).contains("lost"));
        assert!(notice_text(next(&mut adapter).await).contains("polling"));
        assert_eq!(adapter.transport_kind(), Some("poll"));
        let last = update(next(&mut adapter).await);
        assert_eq!(last.status, Some(WorkflowStatus::Completed));
        assert_eq!(last.progress, Some(90));
    }
}
