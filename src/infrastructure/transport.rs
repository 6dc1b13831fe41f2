use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    pub bearer_token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer_token: None,
        }
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16()
    }

    pub fn json_body(&self) -> Value {
        if self.body.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }

    pub fn error_message(&self) -> String {
        let from_json = serde_json::from_str::<Value>(&self.body).ok().and_then(|value| {
            ["message", "detail", "error"].iter().find_map(|key| match value.get(*key) {
                Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
                Some(Value::Array(items)) if !items.is_empty() => Some(Value::Array(items.clone()).to_string()),
                _ => None,
            })
        });
        if let Some(message) = from_json {
            return message;
        }
        let trimmed = self.body.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("http {}", self.status))
    }

    pub fn into_error(self) -> InfraError {
        let message = self.error_message();
        if self.is_unauthorized() {
            InfraError::Unauthorized {
                status: self.status,
                message,
            }
        } else {
            InfraError::Http {
                status: self.status,
                message,
            }
        }
    }
}

#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApiTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestApiTransport {
    pub fn new(base_url: Url) -> Result<Self, InfraError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|error| InfraError::Network(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|error| InfraError::InvalidConfig(format!("invalid api path '{path}': {error}")))
    }
}

#[async_trait]
impl ApiTransport for ReqwestApiTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, InfraError> {
        let endpoint = self.endpoint(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), endpoint)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = request.bearer_token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            InfraError::Network(format!(
                "{} {} failed: {error}",
                request.method.as_str(),
                request.path
            ))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!(
                "failed reading response for {} {}: {error}",
                request.method.as_str(),
                request.path
            ))
        })?;
        Ok(ApiResponse { status, body })
    }
}
