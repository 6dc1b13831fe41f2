use crate::application::refresh::{RefreshCoordinator, RefreshTicket, await_refresh};
use crate::application::session::SessionStore;
use crate::domain::models::User;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::transport::{ApiRequest, ApiResponse, ApiTransport, HttpMethod};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const REFRESH_PATH: &str = "/auth/refresh";

const UNREFRESHABLE_PATHS: [&str; 3] = ["/auth/login", "/auth/register", REFRESH_PATH];

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

pub struct ApiClient<T>
where
    T: ApiTransport,
{
    transport: Arc<T>,
    session: Arc<SessionStore>,
    refresh: RefreshCoordinator,
}

impl<T> ApiClient<T>
where
    T: ApiTransport,
{
    pub fn new(transport: Arc<T>, session: Arc<SessionStore>) -> Self {
        Self {
            transport,
            session,
            refresh: RefreshCoordinator::new(),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    pub async fn get(&self, path: &str) -> Result<Value, InfraError> {
        self.request(HttpMethod::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value, InfraError> {
        self.request(HttpMethod::Post, path, body).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, InfraError> {
        self.request(HttpMethod::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, InfraError> {
        self.request(HttpMethod::Delete, path, None).await
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, InfraError> {
        let sent_token = self.session.token();
        let request = ApiRequest::new(method, path)
            .with_body(body)
            .with_bearer(sent_token.clone());
        let response = self.transport.send(&request).await?;

        if !response.is_unauthorized() || UNREFRESHABLE_PATHS.contains(&path) {
            return into_result(response);
        }

        let token = self.recover_token(sent_token.as_deref(), response).await?;
        debug!(method = method.as_str(), path, "retrying request with refreshed token");
        // A retried request is never refreshed again; a second 401 surfaces as-is.
        let retried = self.transport.send(&request.with_bearer(Some(token))).await?;
        into_result(retried)
    }

    async fn recover_token(
        &self,
        sent_token: Option<&str>,
        rejected: ApiResponse,
    ) -> Result<String, InfraError> {
        let lease = match self.refresh.begin() {
            RefreshTicket::Follower(receiver) => return await_refresh(receiver).await,
            RefreshTicket::Leader(lease) => lease,
        };

        match (sent_token, self.session.token()) {
            (Some(sent), Some(current)) if sent != current => {
                debug!("token was replaced while the request was in flight");
                lease.succeed(&current);
                return Ok(current);
            }
            (Some(_), None) => {
                debug!("session ended while the request was in flight");
                lease.fail("session ended".to_string());
                return Err(rejected.into_error());
            }
            _ => {}
        }

        info!("access token rejected; refreshing session");
        match self.refresh_session().await {
            Ok(token) => {
                let released = lease.succeed(&token);
                info!(released, "session refreshed");
                Ok(token)
            }
            Err(error) => {
                warn!(%error, "session refresh failed; signing out");
                if let Err(clear_error) = self.session.invalidate() {
                    warn!(error = %clear_error, "failed to clear session after refresh failure");
                }
                lease.fail(error.to_string());
                Err(rejected.into_error())
            }
        }
    }

    async fn refresh_session(&self) -> Result<String, InfraError> {
        let body = match self.session.refresh_token() {
            Some(refresh_token) => json!({ "refresh_token": refresh_token }),
            None => json!({}),
        };
        let request = ApiRequest::new(HttpMethod::Post, REFRESH_PATH).with_body(Some(body));
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        let payload: RefreshPayload = serde_json::from_str(&response.body)
            .map_err(|error| InfraError::Parse(format!("refresh response: {error}")))?;
        if payload.access_token.trim().is_empty() {
            return Err(InfraError::Parse("refresh response carried an empty access token".to_string()));
        }
        self.session
            .apply_refresh(&payload.access_token, payload.user, payload.refresh_token)?;
        Ok(payload.access_token)
    }
}

fn into_result(response: ApiResponse) -> Result<Value, InfraError> {
    if response.is_success() {
        Ok(response.json_body())
    } else {
        Err(response.into_error())
    }
}
