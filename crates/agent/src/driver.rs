//! Runs one assistant turn to completion: append content, run, execute tool
//! calls, fetch and parse the final message. Transport and terminal-run
//! failures retry the whole run with backoff; exhaustion is fatal for the
//! event being processed.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use frontdesk_core::config::ModelConfig;
use frontdesk_core::domain::assistant::Assistant;
use frontdesk_core::ApplicationError;

use crate::backend::{BackendError, RunState, ThreadBackend, ThreadMessage};
use crate::tools::ToolRegistry;

#[derive(Clone, Copy, Debug)]
pub struct DriverSettings {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub active_run_wait: Duration,
    pub poll_interval: Duration,
}

impl DriverSettings {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
            active_run_wait: Duration::from_secs(config.active_run_wait_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_secs(10),
            active_run_wait: Duration::from_secs(15),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// One assistant turn: content to append plus an optional run-scoped
/// instruction string.
#[derive(Clone, Debug, Default)]
pub struct DriveRequest {
    pub thread_id: Option<String>,
    pub messages: Vec<String>,
    pub image_file_ids: Vec<String>,
    pub instructions: Option<String>,
}

impl DriveRequest {
    pub fn on_thread(thread_id: Option<&str>) -> Self {
        Self { thread_id: thread_id.map(str::to_string), ..Self::default() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_image(mut self, file_id: impl Into<String>) -> Self {
        self.image_file_ids.push(file_id.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// The parsed reply plus where the conversation now lives.
#[derive(Clone, Debug)]
pub struct DriveOutcome<T> {
    pub reply: T,
    pub thread_id: String,
    pub created_thread: bool,
}

pub struct ConversationDriver {
    backend: Arc<dyn ThreadBackend>,
    settings: DriverSettings,
}

impl ConversationDriver {
    pub fn new(backend: Arc<dyn ThreadBackend>, settings: DriverSettings) -> Self {
        Self { backend, settings }
    }

    /// Drives one turn and parses the final message as `T`.
    pub async fn drive<T: DeserializeOwned>(
        &self,
        assistant: &Assistant,
        request: DriveRequest,
        tools: &ToolRegistry,
    ) -> Result<DriveOutcome<T>, ApplicationError> {
        let content = collect_content(&request);
        let (thread_id, created_thread) = match &request.thread_id {
            Some(id) => {
                for message in &content {
                    self.backend
                        .append_message(id, message)
                        .await
                        .map_err(backend_failure)?;
                }
                (id.clone(), false)
            }
            None => {
                let id =
                    self.backend.create_thread(&content).await.map_err(backend_failure)?;
                (id, true)
            }
        };

        let mut last_reason = String::from("no attempt made");
        for attempt in 1..=self.settings.max_attempts.max(1) {
            match self
                .run_once(assistant, &thread_id, request.instructions.as_deref(), tools)
                .await
            {
                Ok(raw) => match serde_json::from_str::<T>(&raw) {
                    Ok(reply) => {
                        debug!(
                            event_name = "driver_turn_completed",
                            assistant = %assistant.name,
                            thread_id = %thread_id,
                            attempt,
                            "assistant replied"
                        );
                        return Ok(DriveOutcome { reply, thread_id, created_thread });
                    }
                    Err(error) => {
                        last_reason = format!("unparseable reply: {error}");
                    }
                },
                Err(reason) => last_reason = reason,
            }

            warn!(
                event_name = "driver_attempt_failed",
                assistant = %assistant.name,
                thread_id = %thread_id,
                attempt,
                reason = %last_reason,
                "retrying run"
            );
            if attempt < self.settings.max_attempts {
                tokio::time::sleep(self.settings.retry_backoff).await;
            }
        }

        Err(ApplicationError::AiResponse {
            attempts: self.settings.max_attempts.max(1),
            reason: last_reason,
        })
    }

    /// One run attempt: start (waiting out an already-active run), poll,
    /// execute tools, fetch the final message. Errors come back as the
    /// retryable reason string.
    async fn run_once(
        &self,
        assistant: &Assistant,
        thread_id: &str,
        instructions: Option<&str>,
        tools: &ToolRegistry,
    ) -> Result<String, String> {
        let handle = loop {
            match self.backend.start_run(&assistant.external_id, thread_id, instructions).await {
                Ok(handle) => break handle,
                Err(BackendError::RunAlreadyActive) => {
                    debug!(
                        event_name = "driver_run_active_wait",
                        thread_id,
                        "waiting for the active run to finish"
                    );
                    tokio::time::sleep(self.settings.active_run_wait).await;
                }
                Err(error) => return Err(error.to_string()),
            }
        };

        loop {
            let state = self.backend.poll_run(&handle).await.map_err(|e| e.to_string())?;
            match state {
                RunState::Queued | RunState::InProgress => {
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                RunState::RequiresAction { tool_calls } => {
                    let mut outputs = Vec::with_capacity(tool_calls.len());
                    for call in &tool_calls {
                        outputs.push(tools.dispatch(call).await);
                    }
                    self.backend
                        .submit_tool_outputs(&handle, &outputs)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                RunState::Completed => {
                    return self
                        .backend
                        .latest_message(thread_id)
                        .await
                        .map_err(|e| e.to_string());
                }
                other => {
                    return Err(other
                        .failure_reason()
                        .unwrap_or_else(|| "run ended abnormally".to_string()));
                }
            }
        }
    }
}

fn collect_content(request: &DriveRequest) -> Vec<ThreadMessage> {
    let mut content: Vec<ThreadMessage> =
        request.messages.iter().cloned().map(ThreadMessage::Text).collect();
    content.extend(
        request.image_file_ids.iter().cloned().map(|file_id| ThreadMessage::Image { file_id }),
    );
    content
}

fn backend_failure(error: BackendError) -> ApplicationError {
    ApplicationError::Adapter {
        provider: "model".to_string(),
        operation: "thread".to_string(),
        reason: error.to_string(),
    }
}
