use crate::application::api_client::ApiClient;
use crate::domain::models::{Session, User};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::transport::ApiTransport;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

const TOKEN_FIELDS: [&str; 4] = ["access_token", "refresh_token", "token_type", "expires_in"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

pub fn parse_login_response(body: Value) -> Result<Session, InfraError> {
    let Value::Object(mut object) = body else {
        return Err(InfraError::Parse("login response is not an object".to_string()));
    };

    let token = match object.remove("access_token") {
        Some(Value::String(token)) if !token.trim().is_empty() => token,
        _ => return Err(InfraError::Parse("login response has no access_token".to_string())),
    };
    let refresh_token = match object.get("refresh_token") {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
        _ => None,
    };

    let user_value = match object.remove("user") {
        Some(nested @ Value::Object(_)) => nested,
        _ => {
            for field in TOKEN_FIELDS {
                object.remove(field);
            }
            Value::Object(object)
        }
    };
    let user: User = serde_json::from_value(user_value)
        .map_err(|error| InfraError::Parse(format!("login user: {error}")))?;
    if user.email.trim().is_empty() && user.name.trim().is_empty() {
        return Err(InfraError::Parse("login response has no user".to_string()));
    }

    Ok(Session {
        token,
        user,
        refresh_token,
    })
}

fn unwrap_user(body: Value) -> Result<User, InfraError> {
    let inner = match body {
        Value::Object(mut object) if !object.contains_key("email") => object
            .remove("user")
            .or_else(|| object.remove("data"))
            .unwrap_or(Value::Object(object)),
        other => other,
    };
    serde_json::from_value(inner).map_err(|error| InfraError::Parse(format!("user profile: {error}")))
}

pub struct AuthService<T>
where
    T: ApiTransport,
{
    api: Arc<ApiClient<T>>,
}

impl<T> AuthService<T>
where
    T: ApiTransport,
{
    pub fn new(api: Arc<ApiClient<T>>) -> Self {
        Self { api }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, InfraError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(InfraError::InvalidInput("email and password are required".to_string()));
        }
        let body = self
            .api
            .post("/auth/login", Some(json!({ "email": email.trim(), "password": password })))
            .await?;
        let session = parse_login_response(body)?;
        self.api
            .session()
            .save(&session.token, &session.user, session.refresh_token.as_deref())?;
        info!(email = %session.user.email, "signed in");
        Ok(session)
    }

    pub async fn register(&self, registration: &Registration) -> Result<Value, InfraError> {
        if registration.email.trim().is_empty() || registration.password.is_empty() {
            return Err(InfraError::InvalidInput("email and password are required".to_string()));
        }
        self.api
            .post("/auth/register", Some(serde_json::to_value(registration)?))
            .await
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.api.session().invalidate()
    }
}

pub struct UserService<T>
where
    T: ApiTransport,
{
    api: Arc<ApiClient<T>>,
}

impl<T> UserService<T>
where
    T: ApiTransport,
{
    pub fn new(api: Arc<ApiClient<T>>) -> Self {
        Self { api }
    }

    pub async fn profile(&self) -> Result<User, InfraError> {
        unwrap_user(self.api.get("/users/").await?)
    }

    pub async fn update_profile(&self, user: &User) -> Result<User, InfraError> {
        let updated = unwrap_user(self.api.put("/users/", serde_json::to_value(user)?).await?)?;
        let session = self.api.session();
        if let Some(current) = session.current() {
            session.save(&current.token, &updated, current.refresh_token.as_deref())?;
        }
        Ok(updated)
    }

    pub async fn delete_account(&self) -> Result<(), InfraError> {
        self.api.delete("/users/").await?;
        self.api.session().invalidate()
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<Value, InfraError> {
        if change.old_password.is_empty() || change.new_password.is_empty() {
            return Err(InfraError::InvalidInput("both passwords are required".to_string()));
        }
        self.api
            .put("/users/change-password", serde_json::to_value(change)?)
            .await
    }
}
