use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "ClinicDesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Quiet period before a free-text filter change re-runs the patient query.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(350);

/// Length of the upcoming-visits window in calendar days (both ends inclusive).
pub const UPCOMING_WINDOW_DAYS: u64 = 7;

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_BIND: &str = "CLINIC_DESK_BIND";
const ENV_DATABASE: &str = "CLINIC_DESK_DATABASE";
const ENV_REMOTE_URL: &str = "CLINIC_DESK_REMOTE_URL";
const ENV_REMOTE_KEY: &str = "CLINIC_DESK_REMOTE_KEY";
const ENV_TOKENS: &str = "CLINIC_DESK_TOKENS";
const ENV_TIMEOUT: &str = "CLINIC_DESK_TIMEOUT_SECS";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "clinic_desk=info,tower_http=info"
}

/// Get the application data directory
/// ~/ClinicDesk/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(home.join(APP_NAME))
}

/// Default location of the local store.
pub fn default_database_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("clinic.db"))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHomeDirectory,

    #[error("{variable} is invalid: {reason}")]
    Invalid {
        variable: &'static str,
        reason: String,
    },

    #[error("{variable} must be set when {requires} is set")]
    Missing {
        variable: &'static str,
        requires: &'static str,
    },
}

/// Which backend serves the four collections.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Sqlite {
        path: PathBuf,
    },
    Remote {
        url: String,
        key: String,
        timeout_secs: u64,
    },
}

/// A pre-shared bearer token mapped to a user identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticToken {
    pub token: String,
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub store: StoreConfig,
    pub tokens: Vec<StaticToken>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_raw = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            variable: ENV_BIND,
            reason: format!("{bind_raw}: {e}"),
        })?;

        let timeout_secs = match get(ENV_TIMEOUT) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        variable: ENV_TIMEOUT,
                        reason: format!("expected a positive number of seconds, got {raw}"),
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let store = match get(ENV_REMOTE_URL) {
            Some(url) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid {
                        variable: ENV_REMOTE_URL,
                        reason: format!("expected an http(s) URL, got {url}"),
                    });
                }
                let key = get(ENV_REMOTE_KEY).ok_or(ConfigError::Missing {
                    variable: ENV_REMOTE_KEY,
                    requires: ENV_REMOTE_URL,
                })?;
                StoreConfig::Remote {
                    url: url.trim_end_matches('/').to_string(),
                    key,
                    timeout_secs,
                }
            }
            None => StoreConfig::Sqlite {
                path: match get(ENV_DATABASE) {
                    Some(path) => PathBuf::from(path),
                    None => default_database_path()?,
                },
            },
        };

        let tokens = match get(ENV_TOKENS) {
            Some(raw) => parse_tokens(&raw)?,
            None => Vec::new(),
        };

        Ok(Self { bind, store, tokens })
    }
}

/// `token=user_id[:email]`, comma separated.
fn parse_tokens(raw: &str) -> Result<Vec<StaticToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let invalid = |reason: &str| ConfigError::Invalid {
                variable: ENV_TOKENS,
                reason: reason.to_string(),
            };
            let (token, identity) = pair
                .split_once('=')
                .ok_or_else(|| invalid("expected token=user_id[:email]"))?;
            let (user_id, email) = match identity.split_once(':') {
                Some((user, email)) => (user.trim(), Some(email.trim())),
                None => (identity.trim(), None),
            };
            if token.trim().is_empty() || user_id.is_empty() {
                return Err(invalid("token and user id must not be empty"));
            }
            Ok(StaticToken {
                token: token.trim().to_string(),
                user_id: user_id.to_string(),
                email: email.filter(|e| !e.is_empty()).map(String::from),
            })
        })
        .collect()
}
