use crate::domain::models::ToolCall;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    User,
    Model,
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelPart {
    Text(String),
    FunctionCall(ToolCall),
    FunctionResponse { name: String, response: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelContent {
    pub role: ModelRole,
    pub parts: Vec<ModelPart>,
}

impl ModelContent {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: ModelRole::User,
            parts: vec![ModelPart::Text(text.into())],
        }
    }

    pub fn function_call(call: ToolCall) -> Self {
        Self {
            role: ModelRole::Model,
            parts: vec![ModelPart::FunctionCall(call)],
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        let response = match response {
            Value::Object(_) => response,
            other => serde_json::json!({ "result": other }),
        };
        Self {
            role: ModelRole::Function,
            parts: vec![ModelPart::FunctionResponse {
                name: name.into(),
                response,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub contents: Vec<ModelContent>,
    pub tools: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub function_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
        }
    }

    pub fn call(call: ToolCall) -> Self {
        Self {
            text: None,
            function_calls: vec![call],
        }
    }

    pub fn first_call(&self) -> Option<&ToolCall> {
        self.function_calls.first()
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, InfraError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{GEMINI_API_BASE}/{}:generateContent", self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, InfraError> {
        if self.api_key.trim().is_empty() {
            return Err(InfraError::Model("gemini api key must not be empty".to_string()));
        }

        let body = GenerateContentRequest::from_request(request);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| InfraError::Model(format!("gemini request failed: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| InfraError::Model(format!("failed reading gemini response: {error}")))?;

        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|error| InfraError::Model(format!("invalid gemini response payload: {error}")))?;
        Ok(extract_reply(parsed))
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a ModelRequest) -> Self {
        let contents = request
            .contents
            .iter()
            .map(|content| WireContent {
                role: content.role,
                parts: content.parts.iter().map(WirePart::from_part).collect(),
            })
            .collect();
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: &request.tools,
            }]
        };
        Self { contents, tools }
    }
}

#[derive(Serialize)]
struct WireContent<'a> {
    role: ModelRole,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: WireFunctionCall<'a>,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: WireFunctionResponse<'a>,
    },
}

impl<'a> WirePart<'a> {
    fn from_part(part: &'a ModelPart) -> Self {
        match part {
            ModelPart::Text(text) => Self::Text { text },
            ModelPart::FunctionCall(call) => Self::FunctionCall {
                function_call: WireFunctionCall {
                    name: &call.name,
                    args: &call.args,
                },
            },
            ModelPart::FunctionResponse { name, response } => Self::FunctionResponse {
                function_response: WireFunctionResponse { name, response },
            },
        }
    }
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    args: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct WireFunctionResponse<'a> {
    name: &'a str,
    response: &'a Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResponse {
    text: Option<String>,
    function_call: Option<FunctionCallResponse>,
}

#[derive(Deserialize)]
struct FunctionCallResponse {
    name: String,
    #[serde(default)]
    args: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_reply(response: GenerateContentResponse) -> ModelReply {
    let parts = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    let mut text = String::new();
    let mut function_calls = Vec::new();
    for part in parts {
        if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
        if let Some(call) = part.function_call {
            function_calls.push(ToolCall::new(call.name, call.args.unwrap_or_default()));
        }
    }

    ModelReply {
        text: (!text.trim().is_empty()).then_some(text),
        function_calls,
    }
}

fn map_http_error(status: StatusCode, body: &str) -> InfraError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let detail = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{status_text}: {detail}"),
                _ => detail,
            }
        })
        .unwrap_or_else(|_| body.to_string());
    InfraError::Model(format!("gemini api error: http {}; {message}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_history_and_tools() {
        let mut args = Map::new();
        args.insert("title".to_string(), json!("Buy milk"));
        let request = ModelRequest {
            contents: vec![
                ModelContent::user_text("create a task"),
                ModelContent::function_call(ToolCall::new("create_task", args)),
                ModelContent::function_response("list_tasks", json!([])),
            ],
            tools: vec![FunctionDeclaration {
                name: "list_tasks".to_string(),
                description: "List all tasks".to_string(),
                parameters: json!({"type": "OBJECT", "properties": {}}),
            }],
        };

        let wire = serde_json::to_value(GenerateContentRequest::from_request(&request))
            .expect("serialize request");
        assert_eq!(
            wire,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "create a task"}]},
                    {"role": "model", "parts": [{"functionCall": {"name": "create_task", "args": {"title": "Buy milk"}}}]},
                    {"role": "function", "parts": [{"functionResponse": {"name": "list_tasks", "response": {"result": []}}}]}
                ],
                "tools": [{"functionDeclarations": [
                    {"name": "list_tasks", "description": "List all tasks", "parameters": {"type": "OBJECT", "properties": {}}}
                ]}]
            })
        );
    }

    #[test]
    fn reply_extracts_text_and_calls() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "delete_task", "args": {"id": "9"}}},
                {"text": "Deleting it."}
            ]}}]
        }))
        .expect("parse response");
        let reply = extract_reply(parsed);
        assert_eq!(reply.text.as_deref(), Some("Deleting it."));
        assert_eq!(reply.first_call().map(|call| call.name.as_str()), Some("delete_task"));
        assert_eq!(reply.first_call().and_then(|call| call.id_arg()), Some("9".to_string()));
    }

    #[test]
    fn empty_candidates_yield_empty_reply() {
        let parsed: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).expect("parse response");
        assert_eq!(extract_reply(parsed), ModelReply::default());
    }

    #[test]
    fn http_errors_carry_status_text() {
        let error = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert_eq!(
            error.to_string(),
            "Language model error: gemini api error: http 429; RESOURCE_EXHAUSTED: quota"
        );
    }
}
