use crate::application::task_service::TaskService;
use crate::domain::models::{TaskTool, ToolCall};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::FunctionDeclaration;
use crate::infrastructure::transport::ApiTransport;
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const UNKNOWN_TOOL_ERROR: &str = "Unknown tool";

fn declaration(tool: TaskTool) -> FunctionDeclaration {
    let (description, parameters) = match tool {
        TaskTool::CreateTask => (
            "Create a user task",
            json!({
                "type": "OBJECT",
                "properties": {
                    "title": {"type": "STRING"},
                    "description": {"type": "STRING"}
                },
                "required": ["title"]
            }),
        ),
        TaskTool::ListTasks => (
            "List all tasks for a user",
            json!({"type": "OBJECT", "properties": {}}),
        ),
        TaskTool::UpdateTask => (
            "Update an existing task",
            json!({
                "type": "OBJECT",
                "properties": {
                    "id": {"type": "STRING"},
                    "title": {"type": "STRING"},
                    "description": {"type": "STRING"},
                    "status": {"type": "STRING"}
                },
                "required": ["id"]
            }),
        ),
        TaskTool::DeleteTask => (
            "Delete a task",
            json!({
                "type": "OBJECT",
                "properties": {"id": {"type": "STRING"}},
                "required": ["id"]
            }),
        ),
    };
    FunctionDeclaration {
        name: tool.name().to_string(),
        description: description.to_string(),
        parameters,
    }
}

pub fn task_tool_declarations() -> Vec<FunctionDeclaration> {
    TaskTool::ALL.into_iter().map(declaration).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Unknown { name: String },
    Completed { tool: TaskTool, result: Value },
    Failed { tool: TaskTool, message: String },
}

impl ToolOutcome {
    pub fn response(&self) -> Value {
        match self {
            Self::Unknown { .. } => json!({ "error": UNKNOWN_TOOL_ERROR }),
            Self::Completed { result, .. } => result.clone(),
            Self::Failed { message, .. } => json!({ "error": message }),
        }
    }

    pub fn changed_tasks(&self) -> bool {
        matches!(self, Self::Completed { tool, .. } if tool.mutates())
    }
}

pub async fn dispatch_tool_call<T>(tasks: &TaskService<T>, call: &ToolCall) -> ToolOutcome
where
    T: ApiTransport,
{
    let Some(tool) = TaskTool::from_name(&call.name) else {
        warn!(tool = %call.name, "model requested an unknown tool");
        return ToolOutcome::Unknown {
            name: call.name.clone(),
        };
    };

    debug!(tool = tool.name(), "dispatching tool call");
    match run_tool(tasks, tool, call).await {
        Ok(result) => ToolOutcome::Completed { tool, result },
        Err(error) => {
            warn!(tool = tool.name(), %error, "tool call failed");
            ToolOutcome::Failed {
                tool,
                message: error.to_string(),
            }
        }
    }
}

async fn run_tool<T>(tasks: &TaskService<T>, tool: TaskTool, call: &ToolCall) -> Result<Value, InfraError>
where
    T: ApiTransport,
{
    match tool {
        TaskTool::CreateTask => {
            let title = call
                .string_arg("title")
                .ok_or_else(|| InfraError::ToolDispatch("create_task requires a title".to_string()))?;
            tasks.assistant_create(title, call.string_arg("description")).await
        }
        TaskTool::ListTasks => tasks.assistant_list().await,
        TaskTool::UpdateTask => {
            if call.id_arg().is_none() {
                return Err(InfraError::ToolDispatch("update_task requires an id".to_string()));
            }
            tasks.assistant_update(&call.args).await
        }
        TaskTool::DeleteTask => {
            let id = call
                .id_arg()
                .ok_or_else(|| InfraError::ToolDispatch("delete_task requires an id".to_string()))?;
            tasks.assistant_delete(&id).await
        }
    }
}
