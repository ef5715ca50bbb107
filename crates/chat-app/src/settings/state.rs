use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tern_agent::{AgentConfig, DEFAULT_AGENT_ENDPOINT, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_ID};
use tern_storage::{DEFAULT_SCHEMA, DEFAULT_TABLE, RemoteTableConfig};

pub const SETTINGS_DIRECTORY_NAME: &str = "tern";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DATABASE_FILE_NAME: &str = "messages.db";
pub const ENV_PREFIX: &str = "TERN_";
/// Overrides the settings file location when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "TERN_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// PostgREST table plus the realtime websocket.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            schema: default_schema(),
            table: default_table(),
        }
    }
}

impl RemoteSettings {
    fn normalized(mut self) -> Self {
        self.url = self.url.trim().trim_end_matches('/').to_string();
        self.api_key = self.api_key.trim().to_string();
        self.schema = non_blank_or(self.schema, default_schema);
        self.table = non_blank_or(self.table, default_table);
        self
    }

    /// `None` until a project URL is configured.
    pub fn to_table_config(&self) -> Option<RemoteTableConfig> {
        if self.url.is_empty() {
            return None;
        }

        Some(
            RemoteTableConfig::new(&self.url, &self.api_key)
                .with_schema(&self.schema)
                .with_table(&self.table),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    #[serde(default)]
    pub remote: RemoteSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
            remote: RemoteSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            endpoint: default_agent_endpoint(),
            user_id: default_user_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AgentSettings {
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig::new(&self.endpoint)
            .with_user_id(&self.user_id)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        if self.store.sqlite_path.as_os_str().is_empty() {
            self.store.sqlite_path = default_sqlite_path();
        }
        self.store.remote = self.store.remote.normalized();

        self.agent.endpoint = non_blank_or(self.agent.endpoint, default_agent_endpoint);
        self.agent.user_id = non_blank_or(self.agent.user_id, default_user_id);
        if self.agent.timeout_secs == 0 {
            self.agent.timeout_secs = default_timeout_secs();
        }

        self
    }
}

/// Settings loaded once at startup plus the file they came from.
pub struct SettingsStore {
    settings: Settings,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".tern"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Layers defaults, the JSON file at `config_path` (if present) and `TERN_*`
    /// environment variables, in that order.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn open(config_path: PathBuf) -> Result<Self, SettingsError> {
        if !config_path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", config_path);
        }

        let settings = Self::figment(&config_path)
            .extract::<Settings>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: config_path.clone(),
            })?
            .normalized();

        Ok(Self {
            settings,
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: Box<figment::Error>,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_sqlite_path() -> PathBuf {
    dirs::data_dir()
        .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(".tern"))
        .join(DATABASE_FILE_NAME)
}

fn default_agent_endpoint() -> String {
    DEFAULT_AGENT_ENDPOINT.to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let directory = tempfile::tempdir().expect("temp dir");
        let store =
            SettingsStore::open(directory.path().join("absent.json")).expect("defaults load");

        let settings = store.settings();
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.agent.endpoint, DEFAULT_AGENT_ENDPOINT);
        assert_eq!(settings.agent.user_id, "NA");
        assert!(settings.store.remote.to_table_config().is_none());
    }

    #[test]
    fn environment_overrides_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{
                    "store": {
                        "backend": "remote",
                        "remote": { "url": "https://project.example.co/", "api_key": " anon " }
                    },
                    "agent": { "user_id": "from-file", "timeout_secs": 0 }
                }"#,
            )?;
            jail.set_env("TERN_AGENT__USER_ID", "from-env");

            let settings = SettingsStore::figment(Path::new(SETTINGS_FILE_NAME))
                .extract::<Settings>()?
                .normalized();

            assert_eq!(settings.store.backend, StoreBackend::Remote);
            assert_eq!(settings.agent.user_id, "from-env");
            assert_eq!(settings.agent.timeout_secs, DEFAULT_TIMEOUT_SECS);

            let remote = settings
                .store
                .remote
                .to_table_config()
                .expect("remote configured");
            assert_eq!(remote.url, "https://project.example.co");
            assert_eq!(remote.api_key, "anon");
            assert_eq!(remote.schema, DEFAULT_SCHEMA);
            assert_eq!(remote.table, DEFAULT_TABLE);
            Ok(())
        });
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let mut settings = Settings::default();
        settings.agent.endpoint = "   ".to_string();
        settings.agent.user_id = String::new();
        settings.store.remote.table = " ".to_string();

        let settings = settings.normalized();
        assert_eq!(settings.agent.endpoint, DEFAULT_AGENT_ENDPOINT);
        assert_eq!(settings.agent.user_id, DEFAULT_USER_ID);
        assert_eq!(settings.store.remote.table, DEFAULT_TABLE);
    }

    #[test]
    fn open_reads_the_settings_file() {
        let directory = tempfile::tempdir().expect("temp dir");
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "agent": { "endpoint": "http://127.0.0.1:9000/agent", "user_id": " someone " } }"#,
        )
        .expect("write settings");

        let store = SettingsStore::open(path.clone()).expect("file loads");
        assert_eq!(store.config_path(), path.as_path());
        assert_eq!(store.settings().agent.endpoint, "http://127.0.0.1:9000/agent");
        assert_eq!(store.settings().agent.user_id, "someone");
        assert_eq!(store.settings().store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let directory = tempfile::tempdir().expect("temp dir");
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "agent": { "timeout_secs": "soon" } }"#).expect("write");

        let Err(error) = SettingsStore::open(path.clone()) else {
            panic!("malformed settings must not load");
        };
        assert!(matches!(&error, SettingsError::Extract { path: failed, .. } if *failed == path));
    }

    #[test]
    fn agent_settings_map_to_client_config() {
        let agent = AgentSettings {
            endpoint: "http://localhost:1/agent".to_string(),
            user_id: "someone".to_string(),
            timeout_secs: 5,
        };

        let config = agent.to_agent_config();
        assert_eq!(config.endpoint, "http://localhost:1/agent");
        assert_eq!(config.user_id, "someone");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
