use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Secret name the signed-in token is kept under.
pub const ACCESS_TOKEN_SECRET: &str = "telex-access-token";

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Token record persisted as the value of [`ACCESS_TOKEN_SECRET`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Vec<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub username: String,
}

fn default_token_type() -> String {
    "bearer".into()
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("storage: open in-memory database")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    /// Creates the secret, or replaces its value when it already exists.
    pub fn put_secret(&self, name: &str, value: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!("storage: secret name required");
        }
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO secrets (name, value, created_at, updated_at)
VALUES (?1, ?2, ?3, ?3)
ON CONFLICT(name) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![name, value, now],
        )
        .with_context(|| format!("storage: write secret {name}"))?;
        Ok(())
    }

    pub fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT name, value, created_at, updated_at
FROM secrets
WHERE name = ?1
"#,
            params![name],
            |row| {
                let created: i64 = row.get(2)?;
                let updated: i64 = row.get(3)?;
                Ok(Secret {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    created_at: timestamp(created),
                    updated_at: timestamp(updated),
                })
            },
        )
        .optional()
        .with_context(|| format!("storage: read secret {name}"))
    }

    /// Returns whether a secret was removed.
    pub fn delete_secret(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM secrets WHERE name = ?1", params![name])
            .with_context(|| format!("storage: delete secret {name}"))?;
        Ok(removed > 0)
    }

    pub fn secret_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM secrets ORDER BY name ASC")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    pub fn save_token(&self, token: &StoredToken) -> Result<()> {
        if token.access_token.is_empty() {
            bail!("storage: access token required");
        }
        let encoded = serde_json::to_string(token).context("storage: encode token")?;
        self.put_secret(ACCESS_TOKEN_SECRET, &encoded)
    }

    pub fn load_token(&self) -> Result<Option<StoredToken>> {
        let Some(secret) = self.get_secret(ACCESS_TOKEN_SECRET)? else {
            return Ok(None);
        };
        let token = serde_json::from_str(&secret.value).context("storage: decode token")?;
        Ok(Some(token))
    }

    pub fn clear_token(&self) -> Result<bool> {
        self.delete_secret(ACCESS_TOKEN_SECRET)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("storage: apply migration {version}"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS secrets (
  name TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
"#];

pub fn default_path() -> Option<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join("telex").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn token(access: &str) -> StoredToken {
        StoredToken {
            access_token: access.into(),
            refresh_token: "refresh".into(),
            token_type: "bearer".into(),
            scope: vec!["identity".into(), "read".into()],
            expires_at: Utc.timestamp_opt(1_900_000_000, 0).single().unwrap(),
            username: "ferris".into(),
        }
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn put_secret_updates_existing_value() {
        let store = Store::in_memory().unwrap();
        store.put_secret("api", "one").unwrap();
        store.put_secret("api", "two").unwrap();
        let secret = store.get_secret("api").unwrap().unwrap();
        assert_eq!(secret.value, "two");
        assert_eq!(store.secret_names().unwrap(), vec!["api".to_string()]);
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let store = Store::in_memory().unwrap();
        store.put_secret("api", "value").unwrap();
        assert!(store.delete_secret("api").unwrap());
        assert!(!store.delete_secret("api").unwrap());
        assert!(store.get_secret("api").unwrap().is_none());
    }

    #[test]
    fn token_round_trips_through_secret() {
        let store = Store::in_memory().unwrap();
        assert!(store.load_token().unwrap().is_none());
        store.save_token(&token("abc")).unwrap();
        assert_eq!(store.load_token().unwrap(), Some(token("abc")));
        assert!(store.clear_token().unwrap());
        assert!(store.load_token().unwrap().is_none());
    }

    #[test]
    fn token_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        store.save_token(&token("persisted")).unwrap();
        store.close().unwrap();

        let reopened = Store::open(Options { path: Some(path) }).unwrap();
        let loaded = reopened.load_token().unwrap().unwrap();
        assert_eq!(loaded.access_token, "persisted");
    }

    #[test]
    fn empty_names_and_tokens_are_rejected() {
        let store = Store::in_memory().unwrap();
        assert!(store.put_secret(" ", "x").is_err());
        assert!(store.save_token(&token("")).is_err());
    }
}
