pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    AppState, LoggingObserver, analytics_impl, change_password_impl, chat_turn_impl,
    create_task_impl, delete_account_impl, delete_task_impl, get_profile_impl, list_tasks_impl,
    login_impl, logout_impl, register_impl, task_summary_impl, update_profile_impl,
    update_task_impl, whoami_impl,
};
use application::session::SessionEvent;
use cli::{Cli, Commands, ProfileCommands, TaskCommands};
use infrastructure::config::load_config_from_env;
use infrastructure::error::InfraError;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

fn emit<T: Serialize>(state: &AppState, command: &str, result: Result<T, InfraError>) -> Result<(), String> {
    let value = result.map_err(|error| state.command_error(command, &error))?;
    let rendered = serde_json::to_string_pretty(&value)
        .map_err(|error| state.command_error(command, &error.into()))?;
    println!("{rendered}");
    Ok(())
}

async fn read_secret<R>(lines: &mut Lines<R>, given: Option<String>, label: &str) -> Result<String, InfraError>
where
    R: AsyncBufRead + Unpin,
{
    if let Some(value) = given {
        return Ok(value);
    }
    let mut stderr = tokio::io::stderr();
    stderr.write_all(format!("{label}: ").as_bytes()).await?;
    stderr.flush().await?;
    let line = lines.next_line().await?.unwrap_or_default();
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return Err(InfraError::InvalidInput(format!("{label} is required")));
    }
    Ok(line.to_string())
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

fn watch_session(state: &AppState) {
    let mut events = state.session().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::TokenRefreshed { user, .. }) => {
                    debug!(user_included = user.is_some(), "session token refreshed");
                }
                Ok(SessionEvent::Invalidated) => info!("signed out; run `taskdash login` to continue"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "session events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn tasks(state: &AppState, command: TaskCommands) -> Result<(), String> {
    match command {
        TaskCommands::List => emit(state, "list_tasks", list_tasks_impl(state).await),
        TaskCommands::Create { title, description } => {
            emit(state, "create_task", create_task_impl(state, title, description).await)
        }
        TaskCommands::Update {
            id,
            title,
            description,
            status,
        } => emit(
            state,
            "update_task",
            update_task_impl(state, id, title, description, status).await,
        ),
        TaskCommands::Delete { id } => emit(state, "delete_task", delete_task_impl(state, id).await),
    }
}

async fn profile(state: &AppState, command: Option<ProfileCommands>) -> Result<(), String> {
    match command.unwrap_or(ProfileCommands::Show) {
        ProfileCommands::Show => emit(state, "get_profile", get_profile_impl(state).await),
        ProfileCommands::Update { name, email } => {
            emit(state, "update_profile", update_profile_impl(state, name, email).await)
        }
        ProfileCommands::Delete => emit(state, "delete_account", delete_account_impl(state).await),
        ProfileCommands::ChangePassword {
            old_password,
            new_password,
        } => {
            let mut input = stdin_lines();
            let passwords = async {
                let old = read_secret(&mut input, old_password, "Current password").await?;
                let new = read_secret(&mut input, new_password, "New password").await?;
                change_password_impl(state, old, new).await
            };
            emit(state, "change_password", passwords.await)
        }
    }
}

async fn chat(state: &AppState, message: Option<String>) -> Result<(), String> {
    let session = state
        .chat_session(Arc::new(LoggingObserver))
        .map_err(|error| state.command_error("chat", &error))?;

    if let Some(message) = message {
        let turn = chat_turn_impl(state, &session, message).await;
        if let Some(reply) = turn.reply {
            println!("{reply}");
        }
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout
            .write_all(b"> ")
            .await
            .map_err(|error| state.command_error("chat", &error.into()))?;
        stdout
            .flush()
            .await
            .map_err(|error| state.command_error("chat", &error.into()))?;
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|error| state.command_error("chat", &error.into()))?
        else {
            break;
        };
        let line = line.trim();
        if QUIT_COMMANDS.contains(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let turn = chat_turn_impl(state, &session, line.to_string()).await;
        if let Some(reply) = turn.reply {
            println!("{reply}\n");
        }
    }
    Ok(())
}

pub async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config_from_env().map_err(|error| {
        error!(%error, "failed to load configuration");
        error.to_string()
    })?;
    let state = AppState::new(config).map_err(|error| {
        error!(%error, "failed to initialize app state");
        error.to_string()
    })?;
    watch_session(&state);

    match cli.command {
        Commands::Login { email, password } => {
            let result = match read_secret(&mut stdin_lines(), password, "Password").await {
                Ok(password) => login_impl(&state, email, password).await,
                Err(error) => Err(error),
            };
            emit(&state, "login", result)
        }
        Commands::Register {
            name,
            email,
            password,
        } => {
            let result = match read_secret(&mut stdin_lines(), password, "Password").await {
                Ok(password) => register_impl(&state, name, email, password).await,
                Err(error) => Err(error),
            };
            emit(&state, "register", result)
        }
        Commands::Logout => emit(&state, "logout", logout_impl(&state)),
        Commands::Whoami => emit(&state, "whoami", Ok(whoami_impl(&state))),
        Commands::Tasks { command } => tasks(&state, command).await,
        Commands::Summary => {
            let summary = task_summary_impl(&state)
                .await
                .map_err(|error| state.command_error("summary", &error))?;
            println!("{}", summary.text);
            Ok(())
        }
        Commands::Analytics { window, start, end } => {
            emit(&state, "analytics", analytics_impl(&state, window, start, end).await)
        }
        Commands::Profile { command } => profile(&state, command).await,
        Commands::Chat { message } => chat(&state, message).await,
    }
}
