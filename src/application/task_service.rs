use crate::application::api_client::ApiClient;
use crate::domain::models::{NewTask, Task, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::transport::ApiTransport;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

// Bare array, `{tasks}`, `{data: [..]}` or `{data: {tasks}}`.
pub fn normalize_task_list(body: Value) -> Result<Vec<Task>, InfraError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut object) => match (object.remove("tasks"), object.remove("data")) {
            (Some(Value::Array(items)), _) => items,
            (_, Some(Value::Array(items))) => items,
            (_, Some(Value::Object(mut data))) => match data.remove("tasks") {
                Some(Value::Array(items)) => items,
                _ => return Err(InfraError::Parse("task list: data.tasks is not an array".to_string())),
            },
            _ => return Err(InfraError::Parse("task list: no tasks array in response".to_string())),
        },
        other => {
            return Err(InfraError::Parse(format!(
                "task list: expected array or object, got {}",
                json_kind(&other)
            )));
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|error| InfraError::Parse(format!("task list item: {error}")))
        })
        .collect()
}

pub fn normalize_task(body: Value) -> Result<Task, InfraError> {
    let inner = match body {
        Value::Object(mut object) if !object.contains_key("title") => object
            .remove("task")
            .or_else(|| object.remove("data"))
            .unwrap_or(Value::Object(object)),
        other => other,
    };
    serde_json::from_value(inner).map_err(|error| InfraError::Parse(format!("task: {error}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn task_path(id: &str) -> Result<String, InfraError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(InfraError::InvalidInput("task id must not be empty".to_string()));
    }
    if id.contains(['/', '?', '#']) {
        return Err(InfraError::InvalidInput(format!("task id '{id}' is not a valid path segment")));
    }
    Ok(format!("/tasks/{id}"))
}

pub struct TaskService<T>
where
    T: ApiTransport,
{
    api: Arc<ApiClient<T>>,
}

impl<T> TaskService<T>
where
    T: ApiTransport,
{
    pub fn new(api: Arc<ApiClient<T>>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Task>, InfraError> {
        let tasks = normalize_task_list(self.api.get("/tasks").await?)?;
        debug!(count = tasks.len(), "tasks listed");
        Ok(tasks)
    }

    pub async fn create(&self, task: &NewTask) -> Result<Task, InfraError> {
        task.validate().map_err(InfraError::InvalidInput)?;
        normalize_task(self.api.post("/tasks", Some(serde_json::to_value(task)?)).await?)
    }

    pub async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        if patch.is_empty() {
            return Err(InfraError::InvalidInput("task update has no fields".to_string()));
        }
        normalize_task(self.api.put(&task_path(id)?, serde_json::to_value(patch)?).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), InfraError> {
        self.api.delete(&task_path(id)?).await?;
        Ok(())
    }

    pub async fn assistant_create(&self, title: &str, description: Option<&str>) -> Result<Value, InfraError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(InfraError::InvalidInput("title is required".to_string()));
        }
        let body = json!({ "title": title, "description": description.unwrap_or_default() });
        self.api.post("/mcp/task/create", Some(body)).await
    }

    pub async fn assistant_list(&self) -> Result<Value, InfraError> {
        self.api.post("/mcp/task/list", None).await
    }

    pub async fn assistant_update(&self, args: &Map<String, Value>) -> Result<Value, InfraError> {
        let has_id = match args.get("id") {
            Some(Value::String(id)) => !id.trim().is_empty(),
            Some(Value::Number(_)) => true,
            _ => false,
        };
        if !has_id {
            return Err(InfraError::InvalidInput("id is required".to_string()));
        }
        self.api
            .post("/mcp/task/update", Some(Value::Object(args.clone())))
            .await
    }

    pub async fn assistant_delete(&self, id: &str) -> Result<Value, InfraError> {
        self.api.delete(&task_path(id)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::api_client::tests::{FakeTransport, signed_in_session};
    use crate::domain::models::TaskStatus;
    use crate::infrastructure::transport::{ApiResponse, HttpMethod};

    fn service(transport: &Arc<FakeTransport>) -> TaskService<FakeTransport> {
        let (_storage, session) = signed_in_session("token");
        TaskService::new(Arc::new(ApiClient::new(Arc::clone(transport), session)))
    }

    #[test]
    fn every_list_shape_normalizes() {
        let task = json!({"id": "1", "title": "A", "status": "done"});
        for body in [
            json!([task.clone()]),
            json!({"tasks": [task.clone()]}),
            json!({"data": [task.clone()]}),
            json!({"data": {"tasks": [task.clone()]}}),
        ] {
            let tasks = normalize_task_list(body).expect("normalize");
            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].status, TaskStatus::Done);
        }
    }

    #[test]
    fn unknown_list_shapes_are_parse_errors() {
        for body in [json!({"items": []}), json!("tasks"), Value::Null, json!({"data": {"rows": []}})] {
            assert!(matches!(normalize_task_list(body), Err(InfraError::Parse(_))));
        }
    }

    #[test]
    fn single_task_envelopes_unwrap() {
        assert_eq!(normalize_task(json!({"task": {"_id": "a", "title": "T"}})).expect("task").id, "a");
        assert_eq!(normalize_task(json!({"data": {"id": 5, "title": "T"}})).expect("task").id, "5");
        assert_eq!(normalize_task(json!({"id": "b", "title": "T"})).expect("task").id, "b");
    }

    #[tokio::test]
    async fn list_reads_wrapped_response() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        transport.route(
            HttpMethod::Get,
            "/tasks",
            ApiResponse::new(200, r#"{"data":{"tasks":[{"id":"1","title":"Ship","status":"in_progress"}]}}"#),
        );
        let tasks = service(&transport).list().await.expect("list");
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn update_rejects_empty_patch_and_bad_ids() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        let service = service(&transport);
        assert!(matches!(
            service.update("1", &TaskPatch::default()).await,
            Err(InfraError::InvalidInput(_))
        ));
        assert!(matches!(service.delete("a/b").await, Err(InfraError::InvalidInput(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn assistant_delete_uses_task_route() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        service(&transport).assistant_delete(" 42 ").await.expect("delete");
        assert_eq!(transport.sent_to(HttpMethod::Delete, "/tasks/42"), 1);
    }

    #[tokio::test]
    async fn assistant_update_requires_id() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        let service = service(&transport);
        let mut args = Map::new();
        args.insert("status".to_string(), json!("done"));
        assert!(service.assistant_update(&args).await.is_err());

        args.insert("id".to_string(), json!(7));
        service.assistant_update(&args).await.expect("update");
        let sent = transport.sent();
        assert_eq!(sent[0].path, "/mcp/task/update");
        assert_eq!(sent[0].body, Some(json!({"id": 7, "status": "done"})));
    }
}
