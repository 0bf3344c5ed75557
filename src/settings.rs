use rusqlite::{params, Connection, Row};
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

const DEFAULT_DB_PATH: &str = "aura.db";
// Port the site backend listens on out of the box
const DEFAULT_API_BASE_URL: &str = "http://localhost:5001";

mod env {
    pub const API_URL: &str = "AURA_API_URL";
    pub const REQUEST_TIMEOUT_SECS: &str = "AURA_REQUEST_TIMEOUT_SECS";
    pub const DB_PATH: &str = "AURA_DB_PATH";
}

/* ================= DATABASE ================= */

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            api_base_url TEXT NOT NULL,
            request_timeout_secs INTEGER
        )",
        [],
    )?;

    // 0 seconds = wait for the server as long as it takes
    conn.execute(
        "INSERT OR IGNORE INTO settings (id, api_base_url, request_timeout_secs)
         VALUES (1, ?1, ?2)",
        params![DEFAULT_API_BASE_URL, 0_i64],
    )?;

    Ok(())
}

// negative or absurd values stored by hand are treated as "no timeout"
fn clamp_to_secs(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

pub fn load_settings(conn: &Connection) -> rusqlite::Result<Settings> {
    conn.query_row(
        "SELECT api_base_url, request_timeout_secs FROM settings WHERE id = 1",
        [],
        |row: &Row| {
            Ok(Settings {
                api_base_url: row.get::<_, String>(0)?,
                request_timeout_secs: clamp_to_secs(row.get::<_, Option<i64>>(1)?.unwrap_or(0)),
            })
        },
    )
}

impl Settings {
    /// Reads the persisted settings and layers the `AURA_*` environment
    /// variables on top.
    pub fn load() -> ClientResult<Self> {
        let path = std::env::var(env::DB_PATH).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let conn = Connection::open(&path)?;
        init_db(&conn)?;

        let mut settings = load_settings(&conn)?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        tracing::info!(
            api = %settings.api_base_url,
            timeout_secs = settings.request_timeout_secs,
            "settings loaded from {path}"
        );
        Ok(settings)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ClientResult<()> {
        if let Some(url) = lookup(env::API_URL) {
            self.api_base_url = url;
        }

        if let Some(raw) = lookup(env::REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!(
                    "{} must be a whole number of seconds, got '{raw}'",
                    env::REQUEST_TIMEOUT_SECS
                ))
            })?;
        }

        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        if self.api_base_url.is_empty() {
            return Err(ClientError::Config("api base url is empty".into()));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
