use crate::domain::models::{Session, User};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_storage::{
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SessionStorage, USER_KEY,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TokenRefreshed { token: String, user: Option<User> },
    Invalidated,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<User>,
    refresh_token: Option<String>,
}

pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            state: Mutex::new(SessionState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn load(&self) -> Result<Option<Session>, InfraError> {
        let mut state = self.lock();
        let token = self.storage.get(ACCESS_TOKEN_KEY)?;
        let raw_user = self.storage.get(USER_KEY)?;
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?;

        let user = match (&token, raw_user) {
            (Some(_), Some(raw)) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(error) => {
                    warn!(%error, "persisted user is unreadable; clearing session");
                    self.wipe(&mut state)?;
                    return Ok(None);
                }
            },
            (None, Some(_)) => {
                warn!("persisted user has no access token; clearing session");
                self.wipe(&mut state)?;
                return Ok(None);
            }
            (_, None) => None,
        };

        *state = SessionState {
            token,
            user,
            refresh_token,
        };
        Ok(Self::session_of(&state))
    }

    pub fn save(&self, token: &str, user: &User, refresh_token: Option<&str>) -> Result<(), InfraError> {
        let mut state = self.lock();
        self.storage.set(ACCESS_TOKEN_KEY, token)?;
        self.storage.set(USER_KEY, &serde_json::to_string(user)?)?;
        match refresh_token {
            Some(value) => self.storage.set(REFRESH_TOKEN_KEY, value)?,
            None => self.storage.remove(REFRESH_TOKEN_KEY)?,
        }
        *state = SessionState {
            token: Some(token.to_string()),
            user: Some(user.clone()),
            refresh_token: refresh_token.map(ToOwned::to_owned),
        };
        info!(email = %user.email, "session saved");
        Ok(())
    }

    pub fn apply_refresh(
        &self,
        token: &str,
        user: Option<User>,
        refresh_token: Option<String>,
    ) -> Result<(), InfraError> {
        {
            let mut state = self.lock();
            self.storage.set(ACCESS_TOKEN_KEY, token)?;
            if let Some(user) = user.as_ref() {
                self.storage.set(USER_KEY, &serde_json::to_string(user)?)?;
                state.user = Some(user.clone());
            }
            if let Some(refresh_token) = refresh_token {
                self.storage.set(REFRESH_TOKEN_KEY, &refresh_token)?;
                state.refresh_token = Some(refresh_token);
            }
            state.token = Some(token.to_string());
        }
        debug!("access token refreshed");
        let _ = self.events.send(SessionEvent::TokenRefreshed {
            token: token.to_string(),
            user,
        });
        Ok(())
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        let mut state = self.lock();
        self.wipe(&mut state)
    }

    pub fn invalidate(&self) -> Result<(), InfraError> {
        let cleared = self.clear();
        info!("session invalidated");
        let _ = self.events.send(SessionEvent::Invalidated);
        cleared
    }

    pub fn current(&self) -> Option<Session> {
        Self::session_of(&self.lock())
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    fn wipe(&self, state: &mut SessionState) -> Result<(), InfraError> {
        *state = SessionState::default();
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(USER_KEY)?;
        self.storage.remove(REFRESH_TOKEN_KEY)?;
        Ok(())
    }

    fn session_of(state: &SessionState) -> Option<Session> {
        match (&state.token, &state.user) {
            (Some(token), Some(user)) => Some(Session {
                token: token.clone(),
                user: user.clone(),
                refresh_token: state.refresh_token.clone(),
            }),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
