use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Session storage error: {0}")]
    Storage(String),
    #[error("Unauthorized (http {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected response shape: {0}")]
    Parse(String),
    #[error("Language model error: {0}")]
    Model(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Tool dispatch error: {0}")]
    ToolDispatch(String),
}

impl InfraError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
