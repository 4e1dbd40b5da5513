use std::{fs, io::ErrorKind, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    error::SettingsError,
    offline_queue::DEFAULT_MAX_RETRIES,
    session::{CredentialMode, ReconnectPolicy, SessionOptions},
};

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
    pub database_url: String,
    pub user_email: String,
    pub reconnect_enabled: bool,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub max_retries: u32,
    pub sending_timeout_ms: u64,
    pub auth_grace_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            database_url: "sqlite://./data/client.db".into(),
            user_email: String::new(),
            reconnect_enabled: true,
            reconnect_max_attempts: 5,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            max_retries: DEFAULT_MAX_RETRIES,
            sending_timeout_ms: 15_000,
            auth_grace_ms: 250,
        }
    }
}

impl ClientSettings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnect_enabled,
            max_attempts: self.reconnect_max_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }

    pub fn session_options(&self, credentials: CredentialMode) -> SessionOptions {
        SessionOptions {
            server_url: self.server_url.clone(),
            credentials,
            reconnect: self.reconnect_policy(),
        }
    }

    pub fn sending_timeout(&self) -> Duration {
        Duration::from_millis(self.sending_timeout_ms)
    }

    pub fn auth_grace(&self) -> Duration {
        Duration::from_millis(self.auth_grace_ms)
    }
}

/// Defaults, then `client.toml` in the working directory, then `APP__*`
/// environment variables.
pub fn load_settings() -> Result<ClientSettings, SettingsError> {
    load_settings_from(
        Path::new(DEFAULT_SETTINGS_FILE),
        |key| std::env::var(key).ok(),
    )
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings, SettingsError> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?,
        Err(err) if err.kind() == ErrorKind::NotFound => ClientSettings::default(),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    apply_env_overrides(&mut settings, env)?;
    Ok(settings)
}

fn apply_env_overrides(
    settings: &mut ClientSettings,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__USER_EMAIL") {
        settings.user_email = v;
    }
    if let Some(v) = env("APP__RECONNECT_ENABLED") {
        settings.reconnect_enabled = parse_value("APP__RECONNECT_ENABLED", v)?;
    }
    if let Some(v) = env("APP__RECONNECT_MAX_ATTEMPTS") {
        settings.reconnect_max_attempts = parse_value("APP__RECONNECT_MAX_ATTEMPTS", v)?;
    }
    if let Some(v) = env("APP__RECONNECT_BASE_DELAY_MS") {
        settings.reconnect_base_delay_ms = parse_value("APP__RECONNECT_BASE_DELAY_MS", v)?;
    }
    if let Some(v) = env("APP__RECONNECT_MAX_DELAY_MS") {
        settings.reconnect_max_delay_ms = parse_value("APP__RECONNECT_MAX_DELAY_MS", v)?;
    }
    if let Some(v) = env("APP__MAX_RETRIES") {
        settings.max_retries = parse_value("APP__MAX_RETRIES", v)?;
    }
    if let Some(v) = env("APP__SENDING_TIMEOUT_MS") {
        settings.sending_timeout_ms = parse_value("APP__SENDING_TIMEOUT_MS", v)?;
    }
    if let Some(v) = env("APP__AUTH_GRACE_MS") {
        settings.auth_grace_ms = parse_value("APP__AUTH_GRACE_MS", v)?;
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings =
            load_settings_from(&dir.path().join("client.toml"), env_from(&[])).expect("load");
        assert_eq!(settings, ClientSettings::default());
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn file_values_are_overridden_by_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.toml");
        fs::write(
            &path,
            "server_url = \"https://chat.example\"\nmax_retries = 5\nreconnect_enabled = false\n",
        )
        .expect("write");

        let settings = load_settings_from(
            &path,
            env_from(&[("APP__MAX_RETRIES", "4"), ("APP__USER_EMAIL", "a@example.com")]),
        )
        .expect("load");

        assert_eq!(settings.server_url, "https://chat.example");
        assert_eq!(settings.max_retries, 4);
        assert_eq!(settings.user_email, "a@example.com");
        assert!(!settings.reconnect_enabled);
        assert_eq!(settings.auth_grace_ms, ClientSettings::default().auth_grace_ms);
    }

    #[test]
    fn malformed_environment_value_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_settings_from(
            &dir.path().join("client.toml"),
            env_from(&[("APP__SENDING_TIMEOUT_MS", "soon")]),
        )
        .expect_err("invalid value");
        assert!(matches!(
            err,
            SettingsError::InvalidValue {
                key: "APP__SENDING_TIMEOUT_MS",
                ..
            }
        ));
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.toml");
        fs::write(&path, "max_retries = \"many\"").expect("write");
        let err = load_settings_from(&path, env_from(&[])).expect_err("parse error");
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn reconnect_policy_reflects_settings() {
        let settings = ClientSettings {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 1_000,
            ..ClientSettings::default()
        };
        let policy = settings.reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
        assert_eq!(settings.sending_timeout(), Duration::from_secs(15));
    }
}
