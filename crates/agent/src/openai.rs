//! OpenAI-style assistants API client behind the `ThreadBackend` seam.
//! Base URL and key come from `[model]` config, so a compatible proxy can
//! stand in during development.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use frontdesk_core::config::ModelConfig;

use crate::backend::{
    BackendError, RunHandle, RunState, ThreadBackend, ThreadMessage, ToolCall, ToolOutput,
};

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

pub struct OpenAiBackend {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(BETA_HEADER.0, BETA_HEADER.1);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn execute(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<Value, BackendError> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| BackendError::Transport { operation, reason: e.to_string() })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Transport { operation, reason: e.to_string() })?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message")
                .to_string();
            if message.contains("already has an active run") {
                return Err(BackendError::RunAlreadyActive);
            }
            return Err(BackendError::Transport {
                operation,
                reason: format!("HTTP {status}: {message}"),
            });
        }
        Ok(body)
    }
}

fn message_body(message: &ThreadMessage) -> Value {
    match message {
        ThreadMessage::Text(text) => json!({
            "role": "user",
            "content": [{ "type": "text", "text": text }],
        }),
        ThreadMessage::Image { file_id } => json!({
            "role": "user",
            "content": [{
                "type": "image_file",
                "image_file": { "file_id": file_id, "detail": "high" },
            }],
        }),
    }
}

fn run_state_from_body(body: &Value) -> Result<RunState, BackendError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::UnexpectedPayload("run without status".to_string()))?;

    Ok(match status {
        "queued" => RunState::Queued,
        "in_progress" | "cancelling" => RunState::InProgress,
        "requires_action" => {
            let calls = body
                .pointer("/required_action/submit_tool_outputs/tool_calls")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            Some(ToolCall {
                                id: item.get("id")?.as_str()?.to_string(),
                                name: item.pointer("/function/name")?.as_str()?.to_string(),
                                arguments: item
                                    .pointer("/function/arguments")?
                                    .as_str()?
                                    .to_string(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            RunState::RequiresAction { tool_calls: calls }
        }
        "completed" => RunState::Completed,
        "failed" => RunState::Failed {
            reason: body
                .pointer("/last_error/message")
                .and_then(Value::as_str)
                .unwrap_or("run failed")
                .to_string(),
        },
        "cancelled" => RunState::Cancelled,
        "expired" => RunState::Expired,
        other => {
            return Err(BackendError::UnexpectedPayload(format!("unknown run status `{other}`")))
        }
    })
}

#[async_trait]
impl ThreadBackend for OpenAiBackend {
    async fn create_thread(&self, messages: &[ThreadMessage]) -> Result<String, BackendError> {
        let body = json!({
            "messages": messages.iter().map(message_body).collect::<Vec<_>>(),
        });
        let created = self
            .execute(
                "create_thread",
                self.http.post(format!("{}/threads", self.base_url)).json(&body),
            )
            .await?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::UnexpectedPayload("thread without id".to_string()))
    }

    async fn append_message(
        &self,
        thread_id: &str,
        message: &ThreadMessage,
    ) -> Result<(), BackendError> {
        self.execute(
            "append_message",
            self.http
                .post(format!("{}/threads/{thread_id}/messages", self.base_url))
                .json(&message_body(message)),
        )
        .await?;
        Ok(())
    }

    async fn start_run(
        &self,
        assistant_external_id: &str,
        thread_id: &str,
        instructions: Option<&str>,
    ) -> Result<RunHandle, BackendError> {
        let mut body = json!({ "assistant_id": assistant_external_id });
        if let Some(instructions) = instructions {
            body["instructions"] = json!(instructions);
        }
        let run = self
            .execute(
                "start_run",
                self.http
                    .post(format!("{}/threads/{thread_id}/runs", self.base_url))
                    .json(&body),
            )
            .await?;
        let run_id = run
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::UnexpectedPayload("run without id".to_string()))?;
        Ok(RunHandle { thread_id: thread_id.to_string(), run_id: run_id.to_string() })
    }

    async fn poll_run(&self, handle: &RunHandle) -> Result<RunState, BackendError> {
        let body = self
            .execute(
                "poll_run",
                self.http.get(format!(
                    "{}/threads/{}/runs/{}",
                    self.base_url, handle.thread_id, handle.run_id
                )),
            )
            .await?;
        run_state_from_body(&body)
    }

    async fn submit_tool_outputs(
        &self,
        handle: &RunHandle,
        outputs: &[ToolOutput],
    ) -> Result<(), BackendError> {
        let body = json!({
            "tool_outputs": outputs
                .iter()
                .map(|o| json!({ "tool_call_id": o.tool_call_id, "output": o.output }))
                .collect::<Vec<_>>(),
        });
        self.execute(
            "submit_tool_outputs",
            self.http
                .post(format!(
                    "{}/threads/{}/runs/{}/submit_tool_outputs",
                    self.base_url, handle.thread_id, handle.run_id
                ))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<String, BackendError> {
        let body = self
            .execute(
                "latest_message",
                self.http
                    .get(format!("{}/threads/{thread_id}/messages", self.base_url))
                    .query(&[("limit", "1"), ("order", "desc")]),
            )
            .await?;
        body.pointer("/data/0/content/0/text/value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::UnexpectedPayload("thread has no text message".to_string())
            })
    }
}
