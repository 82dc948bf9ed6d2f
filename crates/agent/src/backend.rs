//! Seam between the conversation driver and the model backend. The driver
//! only sees threads, runs, and tool calls; the HTTP shape lives in
//! `openai`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("model backend {operation} failed: {reason}")]
    Transport { operation: &'static str, reason: String },
    #[error("thread already has an active run")]
    RunAlreadyActive,
    #[error("unexpected backend payload: {0}")]
    UnexpectedPayload(String),
}

/// User content appended to a thread. Images reference files already
/// uploaded to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadMessage {
    Text(String),
    Image { file_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunHandle {
    pub thread_id: String,
    pub run_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Queued,
    InProgress,
    RequiresAction { tool_calls: Vec<ToolCall> },
    Completed,
    Failed { reason: String },
    Cancelled,
    Expired,
}

impl RunState {
    /// Terminal states that abort the current attempt.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Failed { reason } => Some(reason.clone()),
            Self::Cancelled => Some("run cancelled".to_string()),
            Self::Expired => Some("run expired".to_string()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ThreadBackend: Send + Sync {
    /// Creates a thread seeded with the buffered messages, returning its id.
    async fn create_thread(&self, messages: &[ThreadMessage]) -> Result<String, BackendError>;

    async fn append_message(
        &self,
        thread_id: &str,
        message: &ThreadMessage,
    ) -> Result<(), BackendError>;

    /// Starts a run, optionally with extra run-scoped instructions.
    async fn start_run(
        &self,
        assistant_external_id: &str,
        thread_id: &str,
        instructions: Option<&str>,
    ) -> Result<RunHandle, BackendError>;

    async fn poll_run(&self, handle: &RunHandle) -> Result<RunState, BackendError>;

    async fn submit_tool_outputs(
        &self,
        handle: &RunHandle,
        outputs: &[ToolOutput],
    ) -> Result<(), BackendError>;

    /// The newest assistant message on the thread.
    async fn latest_message(&self, thread_id: &str) -> Result<String, BackendError>;
}
