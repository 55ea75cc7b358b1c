//! Waiting on remote asynchronous tasks.
//!
//! Mutating vSphere calls made with `vmw-tasks=true` return a task id
//! instead of blocking. [`TaskWatcher::wait`] polls a [`TaskHandle`] until it
//! reaches a terminal state or the deadline passes. The watcher only reads
//! the handle: a timeout leaves the remote task running.

use crate::error::{VmwareError, VmwareResult};
use crate::observe::{LifecycleEvent, SharedSink};
use crate::types::{TaskInfo, TaskStatus};
use crate::vsphere::VsphereClient;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay between two status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default deadline used by the service-level operations.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Why a remote task failed, as reported by the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    /// Remote reason, verbatim.
    pub reason: String,
    /// Raw error payload, when the endpoint sent a structured one.
    pub detail: Option<serde_json::Value>,
}

impl TaskFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), detail: None }
    }

    /// Prefers the vSphere `error_type`, then the first default message,
    /// then the compact JSON of the whole payload.
    pub fn from_payload(payload: Option<serde_json::Value>) -> Self {
        let Some(value) = payload else {
            return Self::new("task failed without an error payload");
        };
        let reason = match &value {
            serde_json::Value::String(s) => s.clone(),
            other => other
                .get("error_type")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| {
                    other
                        .pointer("/messages/0/default_message")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| other.to_string()),
        };
        Self { reason, detail: Some(value) }
    }
}

/// Observed state of a remote task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed(TaskFailure),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

/// Opaque reference to a remote asynchronous operation.
#[async_trait]
pub trait TaskHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Current state; querying must not change the task.
    async fn state(&self) -> VmwareResult<TaskState>;
}

/// Result of watching a task to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded,
    Failed(TaskFailure),
    TimedOut,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// `Failed` becomes `TaskFailed` (message is the remote reason) and
    /// `TimedOut` becomes `TaskTimeout`.
    pub fn into_result(self) -> VmwareResult<()> {
        match self {
            Self::Succeeded => Ok(()),
            Self::Failed(f) => Err(VmwareError::task_failed(f.reason)),
            Self::TimedOut => Err(VmwareError::task_timeout(
                "Task did not finish before the deadline; it may still complete remotely",
            )),
        }
    }
}

/// Polls task handles at a fixed interval until they finish or time out.
#[derive(Clone)]
pub struct TaskWatcher {
    poll_interval: Duration,
    sink: SharedSink,
}

impl TaskWatcher {
    pub fn new(sink: SharedSink) -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL, sink }
    }

    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `handle` is terminal or `timeout` has elapsed.
    ///
    /// The first check happens immediately. Sleeps never overshoot the
    /// deadline, so a task that stays running yields `TimedOut` within one
    /// poll interval of `timeout`. A failing status query is returned as
    /// `Err`; there are no retries.
    pub async fn wait<H>(&self, handle: &H, timeout: Duration) -> VmwareResult<PollOutcome>
    where
        H: TaskHandle + ?Sized,
    {
        let task = handle.id().to_string();
        let started = Instant::now();

        loop {
            let state = handle.state().await?;
            let elapsed = started.elapsed();
            self.sink.record(&LifecycleEvent::TaskPolled {
                task: task.clone(),
                state: state.label().to_string(),
                elapsed,
            });

            match state {
                TaskState::Succeeded => {
                    self.sink.record(&LifecycleEvent::TaskFinished { task, succeeded: true, elapsed });
                    return Ok(PollOutcome::Succeeded);
                }
                TaskState::Failed(failure) => {
                    self.sink.record(&LifecycleEvent::TaskFinished { task, succeeded: false, elapsed });
                    return Ok(PollOutcome::Failed(failure));
                }
                TaskState::Pending | TaskState::Running => {}
            }

            if elapsed >= timeout {
                self.sink.record(&LifecycleEvent::TaskTimedOut { task, timeout });
                return Ok(PollOutcome::TimedOut);
            }

            let remaining = timeout - elapsed;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

/// A task issued by the vSphere REST API, read via `/api/cis/tasks/{task}`.
pub struct RemoteTask<'a> {
    client: &'a VsphereClient,
    id: String,
}

impl<'a> RemoteTask<'a> {
    pub fn new(client: &'a VsphereClient, id: impl Into<String>) -> Self {
        Self { client, id: id.into() }
    }

    pub async fn info(&self) -> VmwareResult<TaskInfo> {
        self.client.get(&format!("/api/cis/tasks/{}", self.id)).await
    }
}

impl std::fmt::Debug for RemoteTask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTask").field("id", &self.id).finish()
    }
}

#[async_trait]
impl<'a> TaskHandle for RemoteTask<'a> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn state(&self) -> VmwareResult<TaskState> {
        Ok(task_state(self.info().await?))
    }
}

/// `BLOCKED` and unrecognised statuses are treated as still in progress.
pub fn task_state(info: TaskInfo) -> TaskState {
    match info.status {
        TaskStatus::Pending | TaskStatus::Blocked | TaskStatus::Unknown => TaskState::Pending,
        TaskStatus::Running => TaskState::Running,
        TaskStatus::Succeeded => TaskState::Succeeded,
        TaskStatus::Failed => TaskState::Failed(TaskFailure::from_payload(info.error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmwareErrorKind;
    use crate::observe::{MemorySink, NullSink};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays a fixed sequence of states; the last one repeats forever.
    struct ScriptedTask {
        states: Mutex<VecDeque<TaskState>>,
        polls: AtomicUsize,
    }

    impl ScriptedTask {
        fn new(states: Vec<TaskState>) -> Self {
            Self { states: Mutex::new(states.into()), polls: AtomicUsize::new(0) }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }

        fn peek(&self) -> TaskState {
            self.states.lock().unwrap().front().cloned().unwrap()
        }
    }

    #[async_trait]
    impl TaskHandle for ScriptedTask {
        fn id(&self) -> &str {
            "task-1"
        }

        async fn state(&self) -> VmwareResult<TaskState> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                Ok(states.front().cloned().unwrap())
            }
        }
    }

    struct BrokenTask;

    #[async_trait]
    impl TaskHandle for BrokenTask {
        fn id(&self) -> &str {
            "task-broken"
        }

        async fn state(&self) -> VmwareResult<TaskState> {
            Err(VmwareError::auth("Session expired or invalid"))
        }
    }

    fn watcher() -> TaskWatcher {
        TaskWatcher::new(Arc::new(NullSink))
    }

    /// The paused clock rounds timer deadlines up to the next millisecond.
    fn assert_about(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn already_terminal_returns_without_sleeping() {
        let task = ScriptedTask::new(vec![TaskState::Succeeded]);
        let start = Instant::now();
        let outcome = watcher().wait(&task, Duration::from_secs(10)).await.unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(task.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_running_running_succeeded_takes_three_intervals() {
        let task = ScriptedTask::new(vec![
            TaskState::Pending,
            TaskState::Running,
            TaskState::Running,
            TaskState::Succeeded,
        ]);
        let start = Instant::now();
        let outcome = watcher().wait(&task, Duration::from_secs(10)).await.unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_about(start.elapsed(), Duration::from_secs(3));
        assert_eq!(task.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_running_times_out_without_touching_task() {
        let task = ScriptedTask::new(vec![TaskState::Running]);
        let start = Instant::now();
        let outcome = watcher().wait(&task, Duration::from_secs(2)).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_about(start.elapsed(), Duration::from_secs(2));
        assert_eq!(task.peek(), TaskState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_lands_within_one_interval_of_deadline() {
        let interval = Duration::from_millis(700);
        for timeout_ms in [1u64, 500, 1000, 2300, 5000] {
            let timeout = Duration::from_millis(timeout_ms);
            let task = ScriptedTask::new(vec![TaskState::Running]);
            let start = Instant::now();
            let outcome = watcher()
                .with_poll_interval(interval)
                .wait(&task, timeout)
                .await
                .unwrap();
            let elapsed = start.elapsed();
            assert_eq!(outcome, PollOutcome::TimedOut);
            assert!(elapsed >= timeout, "{elapsed:?} < {timeout:?}");
            assert!(elapsed < timeout + interval, "{elapsed:?} overshot {timeout:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reason_is_preserved() {
        let task = ScriptedTask::new(vec![
            TaskState::Running,
            TaskState::Failed(TaskFailure::new("InsufficientResources")),
        ]);
        let outcome = watcher().wait(&task, Duration::from_secs(10)).await.unwrap();
        assert_eq!(outcome, PollOutcome::Failed(TaskFailure::new("InsufficientResources")));

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.kind, VmwareErrorKind::TaskFailed);
        assert_eq!(err.message, "InsufficientResources");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_checks_once() {
        let task = ScriptedTask::new(vec![TaskState::Pending]);
        let outcome = watcher().wait(&task, Duration::ZERO).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(task.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_query_errors_propagate() {
        let err = watcher().wait(&BrokenTask, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, VmwareErrorKind::AuthenticationError);
    }

    #[tokio::test(start_paused = true)]
    async fn events_reach_injected_sink() {
        let sink = MemorySink::new();
        let task = ScriptedTask::new(vec![TaskState::Running, TaskState::Succeeded]);
        TaskWatcher::new(sink.clone())
            .wait(&task, Duration::from_secs(5))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events.last(),
            Some(LifecycleEvent::TaskFinished { succeeded: true, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_minimum() {
        let watcher = watcher().with_poll_interval(Duration::ZERO);
        assert_eq!(watcher.poll_interval(), MIN_POLL_INTERVAL);

        let task = ScriptedTask::new(vec![TaskState::Running]);
        let outcome = watcher.wait(&task, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(task.polls(), 11);
    }

    #[test]
    fn timed_out_maps_to_timeout_error() {
        let err = PollOutcome::TimedOut.into_result().unwrap_err();
        assert_eq!(err.kind, VmwareErrorKind::TaskTimeout);
    }

    #[test]
    fn wire_status_mapping() {
        let info: TaskInfo = serde_json::from_str(r#"{"status":"BLOCKED"}"#).unwrap();
        assert_eq!(task_state(info), TaskState::Pending);

        let info: TaskInfo = serde_json::from_str(
            r#"{"status":"FAILED","error":{"error_type":"RESOURCE_INUSE","messages":[{"id":"x","default_message":"busy"}]}}"#,
        )
        .unwrap();
        match task_state(info) {
            TaskState::Failed(f) => {
                assert_eq!(f.reason, "RESOURCE_INUSE");
                assert!(f.detail.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failure_reason_falls_back_to_message_then_json() {
        let f = TaskFailure::from_payload(Some(serde_json::json!({
            "messages": [{"default_message": "Insufficient resources"}]
        })));
        assert_eq!(f.reason, "Insufficient resources");

        let f = TaskFailure::from_payload(Some(serde_json::json!({"code": 7})));
        assert_eq!(f.reason, r#"{"code":7}"#);
    }
}
