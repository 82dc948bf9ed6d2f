//! Tools the assistant can call mid-run. A tool failure submits an empty
//! object for that call and the run continues.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use serde_json::{json, Value};
use tracing::warn;

use frontdesk_core::domain::tenant::TenantId;
use frontdesk_core::ApplicationError;
use frontdesk_db::DirectoryRepository;

use crate::backend::{ToolCall, ToolOutput};

pub const CURRENT_DATETIME_TOOL: &str = "current_datetime";
pub const LIST_EMPLOYEES_TOOL: &str = "list_employees";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, arguments: &str) -> Result<Value, ApplicationError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Runs one tool call, folding unknown tools and execution errors into
    /// an empty output.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutput {
        let output = match self.tools.get(call.name.as_str()) {
            Some(tool) => match tool.execute(&call.arguments).await {
                Ok(value) => value.to_string(),
                Err(error) => {
                    warn!(
                        event_name = "tool_execution_failed",
                        tool = %call.name,
                        error = %error,
                        "submitting empty output"
                    );
                    "{}".to_string()
                }
            },
            None => {
                warn!(event_name = "unknown_tool_requested", tool = %call.name, "submitting empty output");
                "{}".to_string()
            }
        };
        ToolOutput { tool_call_id: call.id.clone(), output }
    }
}

/// Wall-clock time in the tenant timezone.
pub struct CurrentDatetimeTool {
    timezone: Tz,
}

impl CurrentDatetimeTool {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

#[async_trait]
impl Tool for CurrentDatetimeTool {
    fn name(&self) -> &'static str {
        CURRENT_DATETIME_TOOL
    }

    async fn execute(&self, _arguments: &str) -> Result<Value, ApplicationError> {
        let now = Utc::now().with_timezone(&self.timezone);
        Ok(json!({ "current_datetime": now.format(DATETIME_FORMAT).to_string() }))
    }
}

/// Tenant staff roster, so the assistant can name who works where.
pub struct ListEmployeesTool {
    directory: Arc<dyn DirectoryRepository>,
    tenant_id: TenantId,
}

impl ListEmployeesTool {
    pub fn new(directory: Arc<dyn DirectoryRepository>, tenant_id: TenantId) -> Self {
        Self { directory, tenant_id }
    }
}

#[async_trait]
impl Tool for ListEmployeesTool {
    fn name(&self) -> &'static str {
        LIST_EMPLOYEES_TOOL
    }

    async fn execute(&self, _arguments: &str) -> Result<Value, ApplicationError> {
        let employees = self
            .directory
            .list_employees(&self.tenant_id)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
        let roster: Vec<Value> = employees
            .iter()
            .map(|e| json!({ "name": e.name, "role": e.role }))
            .collect();
        Ok(json!({ "employees": roster }))
    }
}

/// The registry every tenant-scoped drive starts from.
pub fn tenant_registry(
    timezone: Tz,
    directory: Arc<dyn DirectoryRepository>,
    tenant_id: TenantId,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CurrentDatetimeTool::new(timezone)));
    registry.register(Arc::new(ListEmployeesTool::new(directory, tenant_id)));
    registry
}

#[cfg(test)]
mod tests {
    use super::{CurrentDatetimeTool, Tool, ToolRegistry};
    use crate::backend::ToolCall;

    #[tokio::test]
    async fn current_datetime_reports_tenant_local_time() {
        let tool = CurrentDatetimeTool::new(chrono_tz::UTC);
        let value = tool.execute("{}").await.expect("execute");
        let stamp = value["current_datetime"].as_str().expect("string");
        assert!(
            chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S").is_ok(),
            "unexpected format: {stamp}"
        );
    }

    #[tokio::test]
    async fn unknown_tools_submit_an_empty_object() {
        let registry = ToolRegistry::new();
        let output = registry
            .dispatch(&ToolCall {
                id: "call_1".to_string(),
                name: "summon_unicorn".to_string(),
                arguments: "{}".to_string(),
            })
            .await;
        assert_eq!(output.tool_call_id, "call_1");
        assert_eq!(output.output, "{}");
    }
}
