use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const APP_JSON: &str = "app.json";
const DEFAULT_MODEL: &str = "gemini-flash-latest";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    #[default]
    File,
    Keyring,
}

impl SessionBackend {
    fn parse(value: &str) -> Result<Self, InfraError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            other => Err(InfraError::InvalidConfig(format!(
                "unsupported session store '{other}' (expected file or keyring)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigFile {
    pub schema: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_store: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub timezone: Option<Tz>,
    pub session_backend: SessionBackend,
    pub data_dir: PathBuf,
}

impl ClientConfig {
    pub fn require_gemini_api_key(&self) -> Result<&str, InfraError> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            InfraError::InvalidConfig(
                "missing gemini api key (set one of: TASKDASH_GEMINI_API_KEY, GEMINI_API_KEY)"
                    .to_string(),
            )
        })
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "taskdash", "taskdash")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".taskdash"))
}

pub fn load_config_from_env() -> Result<ClientConfig, InfraError> {
    load_config_from_lookup(|key| std::env::var(key).ok())
}

pub fn load_config_from_lookup<F>(lookup: F) -> Result<ClientConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let data_dir = optional_lookup_value(&lookup, &["TASKDASH_HOME"])
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir);
    fs::create_dir_all(&data_dir)?;
    ensure_default_config(&data_dir)?;
    let file = read_app_config(&data_dir)?;

    let raw_base_url = optional_lookup_value(&lookup, &["TASKDASH_API_URL", "API_URL"])
        .or_else(|| non_blank(file.api_base_url.as_deref()))
        .ok_or_else(|| {
            InfraError::InvalidConfig(
                "missing api base url (set one of: TASKDASH_API_URL, API_URL, or apiBaseUrl in app.json)"
                    .to_string(),
            )
        })?;
    let api_base_url = parse_base_url(&raw_base_url)?;

    let model = optional_lookup_value(&lookup, &["TASKDASH_GEMINI_MODEL"])
        .or_else(|| non_blank(file.model.as_deref()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let timezone = optional_lookup_value(&lookup, &["TASKDASH_TIMEZONE"])
        .or_else(|| non_blank(file.timezone.as_deref()))
        .map(|raw| {
            raw.parse::<Tz>()
                .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{raw}': {error}")))
        })
        .transpose()?;

    let session_backend = optional_lookup_value(&lookup, &["TASKDASH_SESSION_STORE"])
        .or_else(|| non_blank(file.session_store.as_deref()))
        .map(|raw| SessionBackend::parse(&raw))
        .transpose()?
        .unwrap_or_default();

    Ok(ClientConfig {
        api_base_url,
        gemini_api_key: optional_lookup_value(&lookup, &["TASKDASH_GEMINI_API_KEY", "GEMINI_API_KEY"]),
        model,
        timezone,
        session_backend,
        data_dir,
    })
}

pub fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid api base url '{raw}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "api base url '{raw}' cannot be a base"
        )));
    }
    Ok(url)
}

pub fn ensure_default_config(data_dir: &Path) -> Result<(), InfraError> {
    let path = data_dir.join(APP_JSON);
    if !path.exists() {
        let defaults = AppConfigFile {
            schema: 1,
            ..AppConfigFile::default()
        };
        let formatted = serde_json::to_string_pretty(&defaults)?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_app_config(data_dir: &Path) -> Result<AppConfigFile, InfraError> {
    let path = data_dir.join(APP_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: AppConfigFile = serde_json::from_str(&raw)?;
    if parsed.schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            parsed.schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|key| lookup(key).and_then(|value| non_blank(Some(value.as_str()))))
}
