use serde::{Deserialize, Serialize};

use crate::api::ResourceFilter;
use crate::components::audio_manager::origin_of;

#[cfg(target_arch = "wasm32")]
use gloo_storage::{LocalStorage, Storage};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[cfg(not(target_arch = "wasm32"))]
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("settings are not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(target_arch = "wasm32")]
const SETTINGS_KEY: &str = "mediadesk.settings";
#[cfg(not(target_arch = "wasm32"))]
const SETTINGS_ROW: &str = "console_settings";

/// Console settings stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    pub api_base_url: String,
    /// Origin for relative media URLs. Empty means "use the page origin".
    #[serde(default)]
    pub origin_override: Option<String>,
    #[serde(default)]
    pub default_filter: ResourceFilter,
    #[serde(default = "default_notice_ttl_secs")]
    pub notice_ttl_secs: u32,
}

fn default_notice_ttl_secs() -> u32 {
    6
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            origin_override: None,
            default_filter: ResourceFilter::default(),
            notice_ttl_secs: default_notice_ttl_secs(),
        }
    }
}

impl ConsoleSettings {
    /// Configured origin for relative media URLs, if any.
    ///
    /// Off the web there is no page origin, so the API host stands in for it.
    pub fn media_origin(&self) -> Option<String> {
        let configured = self
            .origin_override
            .as_deref()
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string);
        if cfg!(target_arch = "wasm32") {
            configured
        } else {
            configured.or_else(|| origin_of(&self.api_base_url))
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn initialize_database() -> Result<(), DbError> {
    let conn = get_db_connection()?;
    create_tables(&conn)
}

#[cfg(target_arch = "wasm32")]
pub async fn initialize_database() -> Result<(), DbError> {
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn save_settings(settings: ConsoleSettings) -> Result<(), DbError> {
    let conn = get_db_connection()?;
    write_settings(&conn, &settings)
}

#[cfg(target_arch = "wasm32")]
pub async fn save_settings(settings: ConsoleSettings) -> Result<(), DbError> {
    LocalStorage::set(SETTINGS_KEY, settings).map_err(|e| DbError::Storage(e.to_string()))
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn load_settings() -> Result<ConsoleSettings, DbError> {
    let conn = get_db_connection()?;
    read_settings(&conn)
}

#[cfg(target_arch = "wasm32")]
pub async fn load_settings() -> Result<ConsoleSettings, DbError> {
    match LocalStorage::get(SETTINGS_KEY) {
        Ok(settings) => Ok(settings),
        Err(_) => Ok(ConsoleSettings::default()),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn create_tables(conn: &rusqlite::Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn write_settings(conn: &rusqlite::Connection, settings: &ConsoleSettings) -> Result<(), DbError> {
    let settings_json = serde_json::to_string(settings)?;
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        [SETTINGS_ROW, settings_json.as_str()],
    )?;
    Ok(())
}

/// Missing or unreadable rows fall back to defaults.
#[cfg(not(target_arch = "wasm32"))]
fn read_settings(conn: &rusqlite::Connection) -> Result<ConsoleSettings, DbError> {
    let result: Result<String, rusqlite::Error> = conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        [SETTINGS_ROW],
        |row: &rusqlite::Row| row.get(0),
    );

    match result {
        Ok(json) => Ok(serde_json::from_str(&json).unwrap_or_else(|err| {
            tracing::warn!("[settings] ignoring unreadable settings: {err}");
            ConsoleSettings::default()
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(ConsoleSettings::default()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn get_db_connection() -> Result<rusqlite::Connection, DbError> {
    let data_dir = dirs::data_dir()
        .map(|dir| dir.join("mediadesk"))
        .unwrap_or_else(|| std::path::PathBuf::from(".mediadesk"));
    std::fs::create_dir_all(&data_dir).map_err(|e| DbError::Storage(e.to_string()))?;
    let conn = rusqlite::Connection::open(data_dir.join("mediadesk.db"))?;
    create_tables(&conn)?;
    Ok(conn)
}
