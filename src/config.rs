use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::auth;
use crate::reddit::{self, SortOption};

const DEFAULT_ENV_PREFIX: &str = "TELEX";

/// Unprefixed variable accepted for the authorization endpoint.
pub const AUTHORISATION_URL_ENV: &str = "AUTHORISATION_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "auth::default_user_agent")]
    pub user_agent: String,
    #[serde(default = "auth::default_scope")]
    pub scopes: Vec<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_authorization_url")]
    pub authorization_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: auth::default_user_agent(),
            scopes: auth::default_scope(),
            redirect_uri: default_redirect_uri(),
            authorization_url: default_authorization_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_redirect_uri() -> String {
    auth::Config::default().redirect_uri
}

fn default_authorization_url() -> String {
    auth::Config::default().auth_url
}

fn default_token_url() -> String {
    auth::Config::default().token_url
}

fn default_api_base_url() -> String {
    reddit::DEFAULT_BASE_URL.into()
}

fn default_request_timeout() -> Duration {
    reddit::DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    #[serde(default = "default_dark_mode")]
    pub dark_mode: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            dark_mode: default_dark_mode(),
        }
    }
}

fn default_dark_mode() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub show_nsfw: bool,
    #[serde(default)]
    pub default_sort: SortOption,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    pub fn auth_config(&self) -> auth::Config {
        let base = self.reddit.api_base_url.trim_end_matches('/');
        auth::Config {
            client_id: self.reddit.client_id.trim().to_string(),
            client_secret: self.reddit.client_secret.trim().to_string(),
            scope: self.reddit.scopes.clone(),
            user_agent: self.reddit.user_agent.clone(),
            auth_url: self.reddit.authorization_url.clone(),
            token_url: self.reddit.token_url.clone(),
            identity_url: format!("{base}/api/v1/me"),
            redirect_uri: self.reddit.redirect_uri.clone(),
            timeout: self.reddit.request_timeout,
            ..auth::Config::default()
        }
    }

    pub fn client_config(&self) -> reddit::ClientConfig {
        reddit::ClientConfig {
            user_agent: self.reddit.user_agent.clone(),
            base_url: Some(self.reddit.api_base_url.clone()),
            timeout: Some(self.reddit.request_timeout),
            http_client: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

/// A loaded config plus the environment overrides that were rejected.
/// Logging is not running while the config loads, so the caller reports them.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub config: Config,
    pub warnings: Vec<String>,
}

/// Reads the YAML file, when present, then applies environment overrides.
pub fn load(options: LoadOptions) -> Result<Loaded> {
    let path = options.config_file.clone().or_else(default_path);
    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    let warnings = apply_env(&mut cfg, prefix, env::vars());
    Ok(Loaded {
        config: cfg,
        warnings,
    })
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// `PREFIX_SECTION__KEY=value` sets `section.key`. The unprefixed
/// `AUTHORISATION_URL` is honoured unless the prefixed key is also set.
fn apply_env<I>(cfg: &mut Config, prefix: &str, vars: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let mut alias = None;
    let mut explicit_auth_url = false;
    let mut warnings = Vec::new();

    for (key, value) in vars {
        if key == AUTHORISATION_URL_ENV {
            alias = Some(value);
            continue;
        }
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            explicit_auth_url |= normalized == "reddit.authorization_url";
            if let Err(reason) = apply_env_value(cfg, &normalized, &value) {
                warnings.push(format!("ignoring {key}={value:?}: {reason}"));
            }
        }
    }

    if let Some(url) = alias.filter(|url| !url.trim().is_empty()) {
        if !explicit_auth_url {
            cfg.reddit.authorization_url = url;
        }
    }
    warnings
}

fn apply_env_value(cfg: &mut Config, key: &str, value: &str) -> Result<(), String> {
    let value = value.to_string();
    match key {
        "reddit.client_id" => cfg.reddit.client_id = value,
        "reddit.client_secret" => cfg.reddit.client_secret = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.redirect_uri" => cfg.reddit.redirect_uri = value,
        "reddit.authorization_url" => cfg.reddit.authorization_url = value,
        "reddit.token_url" => cfg.reddit.token_url = value,
        "reddit.api_base_url" => cfg.reddit.api_base_url = value,
        "reddit.scopes" => {
            cfg.reddit.scopes = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "reddit.request_timeout" => match humantime::parse_duration(&value) {
            Ok(duration) => cfg.reddit.request_timeout = duration,
            Err(err) => return Err(format!("invalid duration ({err})")),
        },
        "ui.dark_mode" => cfg.ui.dark_mode = parse_bool(&value),
        "feed.show_nsfw" => cfg.feed.show_nsfw = parse_bool(&value),
        "feed.default_sort" => match SortOption::from_key(&value) {
            Some(sort) => cfg.feed.default_sort = sort,
            None => return Err("unknown sort".into()),
        },
        "logging.level" => cfg.logging.level = value,
        "logging.file" => cfg.logging.file = Some(PathBuf::from(value)),
        _ => {}
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("telex").join("config.yaml"))
}

/// Writes the preferences view's toggles back to the config file, keeping
/// everything else in it.
pub fn save_preferences(path: Option<PathBuf>, dark_mode: bool, show_nsfw: bool) -> Result<PathBuf> {
    let path = if let Some(path) = path {
        path
    } else {
        default_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };
    cfg.ui.dark_mode = dark_mode;
    cfg.feed.show_nsfw = show_nsfw;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }
    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_file() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("TELEX_TEST_UNSET".into()),
        })
        .unwrap()
        .config;
        assert!(cfg.ui.dark_mode);
        assert!(!cfg.feed.show_nsfw);
        assert_eq!(cfg.feed.default_sort, SortOption::Best);
        assert_eq!(cfg.reddit.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.reddit.redirect_uri, default_redirect_uri());
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "reddit:\n  client_id: abc\n  request_timeout: 10s\nfeed:\n  default_sort: top\n  show_nsfw: true\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("TELEX_TEST_UNSET".into()),
        })
        .unwrap()
        .config;
        assert_eq!(cfg.reddit.client_id, "abc");
        assert_eq!(cfg.reddit.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.feed.default_sort, SortOption::Top);
        assert!(cfg.feed.show_nsfw);
        assert_eq!(cfg.reddit.scopes, auth::default_scope());
    }

    #[test]
    fn env_overrides_sections() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            "TELEX",
            vars(&[
                ("TELEX_UI__DARK_MODE", "false"),
                ("TELEX_FEED__DEFAULT_SORT", "Rising"),
                ("TELEX_REDDIT__SCOPES", "identity, read"),
                ("TELEX_REDDIT__REQUEST_TIMEOUT", "5s"),
                ("TELEX_LOGGING__LEVEL", "debug"),
                ("OTHER_UI__DARK_MODE", "true"),
            ]),
        );
        assert!(!cfg.ui.dark_mode);
        assert_eq!(cfg.feed.default_sort, SortOption::Rising);
        assert_eq!(cfg.reddit.scopes, vec!["identity", "read"]);
        assert_eq!(cfg.reddit.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = Config::default();
        let warnings = apply_env(
            &mut cfg,
            "TELEX",
            vars(&[
                ("TELEX_FEED__DEFAULT_SORT", "sideways"),
                ("TELEX_REDDIT__REQUEST_TIMEOUT", "soon"),
                ("TELEX_UI__DARK_MODE", "false"),
            ]),
        );
        assert_eq!(cfg.feed.default_sort, SortOption::Best);
        assert_eq!(cfg.reddit.request_timeout, reddit::DEFAULT_TIMEOUT);
        assert!(!cfg.ui.dark_mode);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("TELEX_FEED__DEFAULT_SORT") && warnings[0].contains("unknown sort"));
        assert!(warnings[1].contains("TELEX_REDDIT__REQUEST_TIMEOUT") && warnings[1].contains("invalid duration"));
    }

    #[test]
    fn valid_env_values_produce_no_warnings() {
        let mut cfg = Config::default();
        let warnings = apply_env(
            &mut cfg,
            "TELEX",
            vars(&[
                ("TELEX_FEED__DEFAULT_SORT", "new"),
                ("TELEX_REDDIT__REQUEST_TIMEOUT", "1m"),
                ("TELEX_SOMETHING__ELSE", "x"),
            ]),
        );
        assert!(warnings.is_empty());
        assert_eq!(cfg.reddit.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn authorisation_url_alias() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            "TELEX",
            vars(&[(AUTHORISATION_URL_ENV, "https://auth.example/authorize")]),
        );
        assert_eq!(cfg.reddit.authorization_url, "https://auth.example/authorize");

        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            "TELEX",
            vars(&[
                ("TELEX_REDDIT__AUTHORIZATION_URL", "https://explicit.example/"),
                (AUTHORISATION_URL_ENV, "https://alias.example/"),
            ]),
        );
        assert_eq!(cfg.reddit.authorization_url, "https://explicit.example/");
    }

    #[test]
    fn save_preferences_keeps_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telex").join("config.yaml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "reddit:\n  client_id: keep-me\n").unwrap();

        save_preferences(Some(path.clone()), false, true).unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.reddit.client_id, "keep-me");
        assert!(!saved.ui.dark_mode);
        assert!(saved.feed.show_nsfw);
    }

    #[test]
    fn derived_auth_and_client_configs() {
        let mut cfg = Config::default();
        cfg.reddit.client_id = " id ".into();
        cfg.reddit.api_base_url = "http://127.0.0.1:9/".into();
        let auth = cfg.auth_config();
        assert_eq!(auth.client_id, "id");
        assert_eq!(auth.identity_url, "http://127.0.0.1:9/api/v1/me");
        let client = cfg.client_config();
        assert_eq!(client.base_url.as_deref(), Some("http://127.0.0.1:9/"));
    }
}
