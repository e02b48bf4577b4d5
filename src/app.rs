use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::auth;
use crate::config;
use crate::data::Services;
use crate::logging;
use crate::reddit;
use crate::session;
use crate::storage;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    /// Browse canned sample data without signing in.
    pub offline: bool,
}

pub fn run() -> Result<()> {
    run_with(RunOptions::default())
}

pub fn run_with(opts: RunOptions) -> Result<()> {
    let config_path = opts.config_file.clone().or_else(config::default_path);
    let config::Loaded {
        config: cfg,
        warnings,
    } = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let display_path = friendly_path(config_path.as_deref());

    let log_path = logging::init(&cfg.logging).context("initialise logging")?;
    info!(
        version = crate::VERSION,
        config = %display_path,
        log = %log_path.display(),
        "telex starting"
    );
    for warning in &warnings {
        warn!("{warning}");
    }
    let config_notice = config_notice(&warnings);

    if opts.offline {
        let options = ui::Options {
            config: cfg,
            config_path,
            session: None,
            services: Some(Services::mock()),
            signed_in_user: None,
            status_message: config_notice
                .unwrap_or_else(|| "Offline mode: browsing sample data.".into()),
        };
        return ui::Model::new(options).run();
    }

    if cfg.reddit.client_id.trim().is_empty() {
        bail!(
            "reddit.client_id is not set. Register an installed app at \
             https://www.reddit.com/prefs/apps and add its client id to {display_path} \
             (or set TELEX_REDDIT__CLIENT_ID). Run with --offline to browse sample data."
        );
    }

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);
    let flow = Arc::new(auth::Flow::new(store.clone(), cfg.auth_config()).context("set up sign-in")?);
    let manager = Arc::new(session::Manager::new(store, flow));

    let mut status = config_notice.unwrap_or_default();
    let resumed = match manager.load_existing() {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "stored session discarded");
            status = format!("Stored session could not be used ({err}). Sign in again.");
            None
        }
    };

    let mut services = None;
    let mut signed_in_user = None;
    if let Some(session) = resumed {
        let provider = manager.token_provider()?;
        let client = reddit::Client::new(provider, cfg.client_config())
            .context("create reddit client")?;
        services = Some(Services::reddit(Arc::new(client)));
        info!(user = %session.username, "resumed session");
        signed_in_user = Some(session.username);
    }

    let options = ui::Options {
        config: cfg,
        config_path,
        session: Some(manager),
        services,
        signed_in_user,
        status_message: status,
    };
    let mut model = ui::Model::new(options);
    model.run()?;
    info!("telex exiting");
    Ok(())
}

/// Clears the stored token without starting the interface.
pub fn logout() -> Result<bool> {
    let store = storage::Store::open(storage::Options::default()).context("open storage")?;
    let removed = store.clear_token()?;
    store.close()?;
    Ok(removed)
}

/// Status line text for rejected environment overrides.
fn config_notice(warnings: &[String]) -> Option<String> {
    match warnings {
        [] => None,
        [only] => Some(format!("Config: {only}")),
        [first, rest @ ..] => Some(format!("Config: {first} (+{} more in the log)", rest.len())),
    }
}

fn friendly_path(path: Option<&Path>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/telex/config.yaml".to_string()
    }
}
