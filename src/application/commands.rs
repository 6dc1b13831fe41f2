use crate::application::account::{AuthService, PasswordChange, Registration, UserService};
use crate::application::api_client::ApiClient;
use crate::application::assistant::{AssistantObserver, ChatSession, TurnOutcome};
use crate::application::session::SessionStore;
use crate::application::task_service::TaskService;
use crate::domain::analytics::{AnalyticsReport, DateWindow, compute_analytics};
use crate::domain::calendar::CalendarContext;
use crate::domain::models::{NewTask, Task, TaskPatch, TaskStatus, User};
use crate::domain::task_summary::TaskSummary;
use crate::infrastructure::config::{ClientConfig, SessionBackend};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::{GeminiClient, LanguageModel};
use crate::infrastructure::session_storage::{
    FileSessionStorage, KeyringSessionStorage, SessionStorage,
};
use crate::infrastructure::transport::{ApiTransport, ReqwestApiTransport};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AppState<T = ReqwestApiTransport>
where
    T: ApiTransport,
{
    config: ClientConfig,
    session: Arc<SessionStore>,
    tasks: Arc<TaskService<T>>,
    auth: AuthService<T>,
    users: UserService<T>,
}

impl AppState<ReqwestApiTransport> {
    pub fn new(config: ClientConfig) -> Result<Self, InfraError> {
        fs::create_dir_all(&config.data_dir)?;
        let storage: Arc<dyn SessionStorage> = match config.session_backend {
            SessionBackend::File => Arc::new(FileSessionStorage::in_dir(&config.data_dir)),
            SessionBackend::Keyring => Arc::new(KeyringSessionStorage::default()),
        };
        let transport = Arc::new(ReqwestApiTransport::new(config.api_base_url.clone())?);
        Self::with_parts(config, storage, transport)
    }
}

impl<T> AppState<T>
where
    T: ApiTransport,
{
    pub fn with_parts(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        transport: Arc<T>,
    ) -> Result<Self, InfraError> {
        let session = Arc::new(SessionStore::new(storage));
        if let Some(restored) = session.load()? {
            info!(email = %restored.user.email, "restored saved session");
        }
        let api = Arc::new(ApiClient::new(transport, Arc::clone(&session)));
        Ok(Self {
            tasks: Arc::new(TaskService::new(Arc::clone(&api))),
            auth: AuthService::new(Arc::clone(&api)),
            users: UserService::new(api),
            config,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn calendar(&self) -> CalendarContext {
        CalendarContext::now(self.config.timezone)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }

    pub fn chat_session(
        &self,
        observer: Arc<dyn AssistantObserver>,
    ) -> Result<ChatSession<GeminiClient, T>, InfraError> {
        let model = GeminiClient::new(self.config.require_gemini_api_key()?, self.config.model.clone());
        Ok(ChatSession::new(Arc::new(model), Arc::clone(&self.tasks), self.config.timezone).with_observer(observer))
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub email: String,
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: TaskSummary,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub handled: bool,
    pub reply: Option<String>,
}

#[derive(Debug, Default)]
pub struct LoggingObserver;

impl AssistantObserver for LoggingObserver {
    fn tasks_changed(&self) {
        info!("task list changed");
    }

    fn notify(&self, message: &str) {
        warn!(notice = message, "assistant action failed");
    }
}

pub async fn login_impl<T: ApiTransport>(
    state: &AppState<T>,
    email: String,
    password: String,
) -> Result<LoginResponse, InfraError> {
    let session = state.auth.login(&email, &password).await?;
    Ok(LoginResponse {
        email: session.user.email,
        name: session.user.name,
        role: session.user.role,
    })
}

pub async fn register_impl<T: ApiTransport>(
    state: &AppState<T>,
    name: String,
    email: String,
    password: String,
) -> Result<Value, InfraError> {
    state
        .auth
        .register(&Registration {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password,
        })
        .await
}

pub fn logout_impl<T: ApiTransport>(state: &AppState<T>) -> Result<bool, InfraError> {
    let was_signed_in = state.session.current().is_some();
    state.auth.logout()?;
    Ok(was_signed_in)
}

pub fn whoami_impl<T: ApiTransport>(state: &AppState<T>) -> Option<User> {
    state.session.current().map(|session| session.user)
}

pub async fn list_tasks_impl<T: ApiTransport>(state: &AppState<T>) -> Result<Vec<Task>, InfraError> {
    state.tasks.list().await
}

pub async fn create_task_impl<T: ApiTransport>(
    state: &AppState<T>,
    title: String,
    description: Option<String>,
) -> Result<Task, InfraError> {
    state.tasks.create(&NewTask::new(title, description)).await
}

pub async fn update_task_impl<T: ApiTransport>(
    state: &AppState<T>,
    task_id: String,
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
) -> Result<Task, InfraError> {
    let patch = TaskPatch {
        title: title.map(|value| value.trim().to_string()),
        description,
        status: status.as_deref().map(parse_task_status).transpose()?,
    };
    state.tasks.update(&task_id, &patch).await
}

pub async fn delete_task_impl<T: ApiTransport>(state: &AppState<T>, task_id: String) -> Result<bool, InfraError> {
    state.tasks.delete(&task_id).await?;
    Ok(true)
}

pub async fn task_summary_impl<T: ApiTransport>(state: &AppState<T>) -> Result<SummaryResponse, InfraError> {
    let tasks = state.tasks.list().await?;
    let summary = TaskSummary::from_tasks(&tasks, &state.calendar());
    Ok(SummaryResponse {
        text: summary.to_string(),
        summary,
    })
}

pub async fn analytics_impl<T: ApiTransport>(
    state: &AppState<T>,
    window: String,
    start: Option<String>,
    end: Option<String>,
) -> Result<AnalyticsReport, InfraError> {
    let window = resolve_window(&window, start.as_deref(), end.as_deref())?;
    let tasks = state.tasks.list().await?;
    Ok(compute_analytics(&tasks, window, &state.calendar()))
}

pub async fn get_profile_impl<T: ApiTransport>(state: &AppState<T>) -> Result<User, InfraError> {
    state.users.profile().await
}

pub async fn update_profile_impl<T: ApiTransport>(
    state: &AppState<T>,
    name: Option<String>,
    email: Option<String>,
) -> Result<User, InfraError> {
    if name.is_none() && email.is_none() {
        return Err(InfraError::InvalidInput("nothing to update".to_string()));
    }
    let mut user = state.users.profile().await?;
    if let Some(name) = name {
        user.name = name.trim().to_string();
    }
    if let Some(email) = email {
        user.email = email.trim().to_string();
    }
    state.users.update_profile(&user).await
}

pub async fn delete_account_impl<T: ApiTransport>(state: &AppState<T>) -> Result<bool, InfraError> {
    state.users.delete_account().await?;
    Ok(true)
}

pub async fn change_password_impl<T: ApiTransport>(
    state: &AppState<T>,
    old_password: String,
    new_password: String,
) -> Result<Value, InfraError> {
    state
        .users
        .change_password(&PasswordChange {
            old_password,
            new_password,
        })
        .await
}

pub async fn chat_turn_impl<M, T>(
    state: &AppState<T>,
    chat: &ChatSession<M, T>,
    message: String,
) -> ChatTurnResponse
where
    M: LanguageModel,
    T: ApiTransport,
{
    let tasks = match state.tasks.list().await {
        Ok(tasks) => tasks,
        Err(error) => {
            warn!(%error, "could not load tasks for assistant context");
            Vec::new()
        }
    };
    match chat.send(&message, &tasks).await {
        TurnOutcome::Ignored => ChatTurnResponse {
            handled: false,
            reply: None,
        },
        TurnOutcome::Replied(reply) => ChatTurnResponse {
            handled: true,
            reply: Some(reply),
        },
        TurnOutcome::Fallback => ChatTurnResponse {
            handled: true,
            reply: chat.messages().last().map(|message| message.text.clone()),
        },
    }
}

fn parse_task_status(value: &str) -> Result<TaskStatus, InfraError> {
    TaskStatus::parse(value).ok_or_else(|| {
        InfraError::InvalidInput(format!(
            "unsupported task status '{value}' (expected todo, in-progress or done)"
        ))
    })
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| InfraError::InvalidInput(format!("{field_name} must be YYYY-MM-DD: {error}")))
}

fn resolve_window(window: &str, start: Option<&str>, end: Option<&str>) -> Result<DateWindow, InfraError> {
    if window.trim().eq_ignore_ascii_case("custom") {
        let (Some(start), Some(end)) = (start, end) else {
            return Err(InfraError::InvalidInput("custom window needs --start and --end".to_string()));
        };
        return Ok(DateWindow::Custom {
            start: parse_date_input(start, "start")?,
            end: parse_date_input(end, "end")?,
        });
    }
    window.parse::<DateWindow>().map_err(InfraError::InvalidInput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::api_client::tests::FakeTransport;
    use crate::infrastructure::config::parse_base_url;
    use crate::infrastructure::session_storage::{ACCESS_TOKEN_KEY, InMemorySessionStorage, USER_KEY};
    use crate::infrastructure::transport::{ApiResponse, HttpMethod};
    use std::path::PathBuf;

    fn config() -> ClientConfig {
        ClientConfig {
            api_base_url: parse_base_url("http://localhost:8000").expect("url"),
            gemini_api_key: None,
            model: "gemini-flash-latest".to_string(),
            timezone: None,
            session_backend: SessionBackend::File,
            data_dir: PathBuf::from("unused"),
        }
    }

    fn state(transport: &Arc<FakeTransport>) -> (Arc<InMemorySessionStorage>, AppState<FakeTransport>) {
        let storage = Arc::new(InMemorySessionStorage::default());
        storage.set(ACCESS_TOKEN_KEY, "token").expect("seed token");
        storage
            .set(USER_KEY, r#"{"email":"ada@example.com","name":"Ada"}"#)
            .expect("seed user");
        let state = AppState::with_parts(
            config(),
            Arc::clone(&storage) as Arc<dyn SessionStorage>,
            Arc::clone(transport),
        )
        .expect("state");
        (storage, state)
    }

    #[test]
    fn saved_session_is_restored_on_start() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        let (_storage, state) = state(&transport);
        assert_eq!(whoami_impl(&state).map(|user| user.name), Some("Ada".to_string()));
    }

    #[test]
    fn logout_reports_previous_state() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        let (storage, state) = state(&transport);
        assert!(logout_impl(&state).expect("logout"));
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).expect("get"), None);
        assert!(!logout_impl(&state).expect("second logout"));
    }

    #[test]
    fn windows_parse_with_custom_dates() {
        assert_eq!(resolve_window("last7days", None, None).expect("window"), DateWindow::Last7Days);
        assert!(matches!(
            resolve_window("custom", Some("2026-03-01"), Some("2026-03-07")),
            Ok(DateWindow::Custom { .. })
        ));
        assert!(resolve_window("custom", Some("2026-03-01"), None).is_err());
        assert!(resolve_window("custom", Some("03/01/2026"), Some("2026-03-07")).is_err());
        assert!(resolve_window("fortnight", None, None).is_err());
    }

    #[tokio::test]
    async fn update_rejects_unknown_status_before_sending() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        let (_storage, state) = state(&transport);
        let result = update_task_impl(&state, "1".to_string(), None, None, Some("archived".to_string())).await;
        assert!(matches!(result, Err(InfraError::InvalidInput(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn summary_counts_listed_tasks() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        transport.route(
            HttpMethod::Get,
            "/tasks",
            ApiResponse::new(
                200,
                r#"{"tasks":[{"id":"1","title":"A","status":"done"},{"id":"2","title":"B","status":"in-progress"}]}"#,
            ),
        );
        let (_storage, state) = state(&transport);

        let response = task_summary_impl(&state).await.expect("summary");
        assert_eq!(response.summary.total, 2);
        assert_eq!(response.summary.pending, 1);
        assert!(response.text.starts_with("User summary:"));
    }

    #[test]
    fn chat_requires_an_api_key() {
        let transport = Arc::new(FakeTransport::accepting("token"));
        let (_storage, state) = state(&transport);
        assert!(matches!(
            state.chat_session(Arc::new(LoggingObserver)),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
