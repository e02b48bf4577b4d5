use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::RngCore;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tiny_http::{Header, Method, Response, Server};
use tracing::{debug, info, warn};
use url::Url;

use crate::reddit::{ApiError, OAuthToken, TokenProvider, UserDetails};
use crate::storage::{Store, StoredToken};

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;
const MAX_EXPIRES_IN: u64 = 365 * 24 * 60 * 60;

const HTML_SUCCESS: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Telex</title>
    <style>
      body { font-family: sans-serif; background: #16181d; color: #e6e8ee;
             display: flex; min-height: 100vh; align-items: center; justify-content: center; margin: 0; }
      main { text-align: center; }
      h1 { color: #ff6a3d; }
    </style>
  </head>
  <body>
    <main>
      <h1>Signed in</h1>
      <p>Telex is connected to your account. You can close this tab and return to the terminal.</p>
    </main>
  </body>
</html>"#;

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub scope: Vec<String>,
    pub user_agent: String,
    pub auth_url: String,
    pub token_url: String,
    pub identity_url: String,
    pub redirect_uri: String,
    pub refresh_skew: Duration,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scope: default_scope(),
            user_agent: default_user_agent(),
            auth_url: "https://www.reddit.com/api/v1/authorize".into(),
            token_url: "https://www.reddit.com/api/v1/access_token".into(),
            identity_url: "https://oauth.reddit.com/api/v1/me".into(),
            redirect_uri: "http://127.0.0.1:65010/telex/callback".into(),
            refresh_skew: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

pub fn default_scope() -> Vec<String> {
    [
        "identity",
        "read",
        "history",
        "mysubreddits",
        "vote",
        "submit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_user_agent() -> String {
    format!("{}:telex:v{}", std::env::consts::OS, crate::VERSION)
}

pub struct Flow {
    cfg: Config,
    store: Arc<Store>,
    client: Client,
}

type AuthResult = Result<String>;

/// A pending authorization. Dropping it stops the loopback listener.
pub struct AuthorizationRequest {
    pub browser_url: String,
    pub redirect_uri: String,
    pub state: String,
    verifier: String,
    tx: Sender<AuthResult>,
    rx: Receiver<AuthResult>,
    shutdown: Sender<()>,
}

impl AuthorizationRequest {
    /// Handle for completing the request by hand, for when the browser
    /// cannot reach the loopback listener.
    pub fn redirect_input(&self) -> RedirectInput {
        RedirectInput {
            state: self.state.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl Drop for AuthorizationRequest {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
    }
}

#[derive(Clone)]
pub struct RedirectInput {
    state: String,
    tx: Sender<AuthResult>,
}

impl RedirectInput {
    /// Accepts the URL the browser was redirected to.
    pub fn submit(&self, redirect: &str) -> Result<()> {
        let code = code_from_redirect(redirect, &self.state)?;
        self.tx
            .send(Ok(code))
            .map_err(|_| anyhow!("auth: no authorization pending"))
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(Err(anyhow!("auth: authorization cancelled")));
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub token: StoredToken,
}

impl Flow {
    pub fn new(store: Arc<Store>, cfg: Config) -> Result<Self> {
        if cfg.client_id.trim().is_empty() {
            bail!("auth: client id is required");
        }
        if cfg.user_agent.trim().is_empty() {
            bail!("auth: user agent is required");
        }
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("auth: build http client")?;

        Ok(Self { cfg, store, client })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn begin(&self) -> Result<AuthorizationRequest> {
        let verifier = random_string(64);
        let challenge = code_challenge(&verifier);
        let state = random_string(32);

        let redirect = Url::parse(&self.cfg.redirect_uri)
            .with_context(|| format!("auth: redirect uri {}", self.cfg.redirect_uri))?;
        let host = redirect.host_str().unwrap_or("127.0.0.1");
        let port = redirect.port().unwrap_or(0);
        let path = if redirect.path().is_empty() {
            "/".to_string()
        } else {
            redirect.path().to_string()
        };

        let server = Server::http(format!("{host}:{port}"))
            .map_err(|err| anyhow!("auth: listen on {host}:{port}: {err}"))?;
        let actual_addr = server.server_addr();
        let actual_redirect = Url::parse(&format!("http://{actual_addr}{path}"))?;
        let browser_url = self.authorize_url(actual_redirect.as_str(), &state, &challenge)?;

        let (tx, rx) = unbounded::<AuthResult>();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let listener_tx = tx.clone();
        let expected_state = state.clone();
        thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            match server.recv_timeout(Duration::from_millis(200)) {
                Ok(Some(request)) => {
                    if handle_redirect(request, &path, &expected_state, &listener_tx) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = listener_tx.send(Err(anyhow!("auth: listener failed: {err}")));
                    break;
                }
            }
        });

        info!(redirect = %actual_redirect, "authorization started");
        Ok(AuthorizationRequest {
            browser_url,
            redirect_uri: actual_redirect.to_string(),
            state,
            verifier,
            tx,
            rx,
            shutdown: shutdown_tx,
        })
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str, challenge: &str) -> Result<String> {
        let mut auth = Url::parse(&self.cfg.auth_url)
            .with_context(|| format!("auth: authorization url {}", self.cfg.auth_url))?;
        auth.query_pairs_mut()
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("response_type", "code")
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("duration", "permanent")
            .append_pair("scope", &self.cfg.scope.join(" "))
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(auth.to_string())
    }

    /// Blocks until the redirect arrives, either through the listener or a
    /// [`RedirectInput`], then exchanges the code and stores the token.
    pub fn complete(&self, authz: AuthorizationRequest) -> Result<Session> {
        let code = match authz.rx.recv() {
            Ok(result) => result?,
            Err(err) => bail!("auth: wait for redirect: {err}"),
        };
        let token = self.exchange_code(&code, &authz.redirect_uri, &authz.verifier)?;
        drop(authz);
        self.finish(token)
    }

    /// Completes with a redirect URL pasted by the user.
    pub fn complete_with_redirect(
        &self,
        authz: AuthorizationRequest,
        redirect: &str,
    ) -> Result<Session> {
        authz.redirect_input().submit(redirect)?;
        self.complete(authz)
    }

    pub fn resume(&self, stored: StoredToken) -> Result<Session> {
        if stored.access_token.is_empty() {
            bail!("auth: stored token incomplete");
        }
        let mut token = stored;
        if token.scope.is_empty() {
            token.scope = self.cfg.scope.clone();
        }
        if token.expires_at.timestamp() == 0 {
            token.expires_at = Utc::now() + chrono::Duration::hours(1);
        }
        Ok(Session {
            username: token.username.clone(),
            token,
        })
    }

    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        Arc::new(RefreshingTokenSource {
            cfg: self.cfg.clone(),
            client: self.client.clone(),
            store: self.store.clone(),
            refresh: Mutex::new(()),
        })
    }

    fn finish(&self, mut token: StoredToken) -> Result<Session> {
        let identity = self.fetch_identity(&token)?;
        token.username = identity.name.clone();
        self.store.save_token(&token)?;
        info!(user = %identity.name, "signed in");
        Ok(Session {
            username: identity.name,
            token,
        })
    }

    fn exchange_code(&self, code: &str, redirect_uri: &str, verifier: &str) -> Result<StoredToken> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];
        let payload = post_token(&self.client, &self.cfg, &form).context("auth: token request")?;
        if payload.access_token.is_empty() {
            bail!("auth: missing access token");
        }

        let mut scope = scope_list(&payload.scope);
        if scope.is_empty() {
            scope = self.cfg.scope.clone();
        }
        Ok(StoredToken {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            token_type: payload.token_type.unwrap_or_else(|| "bearer".into()),
            scope,
            expires_at: expiry(payload.expires_in),
            username: String::new(),
        })
    }

    fn fetch_identity(&self, token: &StoredToken) -> Result<UserDetails> {
        let resp = self
            .client
            .get(&self.cfg.identity_url)
            .header(USER_AGENT, self.cfg.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.access_token))
            .send()
            .context("auth: identity request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            bail!("auth: identity request failed ({status}): {body}");
        }

        let identity: UserDetails = resp.json().context("auth: decode identity")?;
        if identity.name.is_empty() {
            bail!("auth: identity missing name");
        }
        Ok(identity)
    }
}

/// Reads the stored token on every call and refreshes it when it is within
/// the configured skew of expiry.
struct RefreshingTokenSource {
    cfg: Config,
    client: Client,
    store: Arc<Store>,
    refresh: Mutex<()>,
}

impl TokenProvider for RefreshingTokenSource {
    fn token(&self) -> Result<OAuthToken> {
        let _guard = self.refresh.lock();
        let mut token = self
            .store
            .load_token()?
            .ok_or_else(|| anyhow!("auth: not signed in"))?;

        if needs_refresh(token.expires_at, self.cfg.refresh_skew, Utc::now()) {
            if token.refresh_token.is_empty() {
                warn!("token expired and no refresh token is available");
            } else {
                debug!("refreshing access token");
                token = refresh_token(&self.client, &self.cfg, &token)?;
                self.store.save_token(&token)?;
            }
        }

        Ok(OAuthToken {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_at: Some(token.expires_at.into()),
        })
    }
}

fn needs_refresh(expires_at: DateTime<Utc>, skew: Duration, now: DateTime<Utc>) -> bool {
    let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
    expires_at - skew <= now
}

fn refresh_token(client: &Client, cfg: &Config, current: &StoredToken) -> Result<StoredToken> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", current.refresh_token.as_str()),
    ];
    let payload = match post_token(client, cfg, &form) {
        Ok(payload) => payload,
        Err(err) if err.is::<TokenRejected>() => {
            warn!(error = %err, "refresh token rejected");
            return Err(anyhow::Error::new(ApiError::Unauthorized)
                .context(format!("auth: refresh token rejected: {err}")));
        }
        Err(err) => return Err(err.context("auth: refresh token request")),
    };
    if payload.access_token.is_empty() {
        bail!("auth: missing refreshed access token");
    }

    let mut scope = scope_list(&payload.scope);
    if scope.is_empty() {
        scope = current.scope.clone();
    }
    let refresh_token = if payload.refresh_token.is_empty() {
        current.refresh_token.clone()
    } else {
        payload.refresh_token
    };

    Ok(StoredToken {
        access_token: payload.access_token,
        refresh_token,
        token_type: payload
            .token_type
            .unwrap_or_else(|| current.token_type.clone()),
        scope,
        expires_at: expiry(payload.expires_in),
        username: current.username.clone(),
    })
}

/// Token endpoint calls authenticate with HTTP Basic; installed apps send an
/// empty secret.
fn post_token(client: &Client, cfg: &Config, form: &[(&str, &str)]) -> Result<TokenResponse> {
    let resp = client
        .post(&cfg.token_url)
        .header(USER_AGENT, cfg.user_agent.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .basic_auth(&cfg.client_id, Some(cfg.client_secret.as_str()))
        .form(form)
        .send()?;

    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if !status.is_success() {
        let detail = match serde_json::from_str::<TokenError>(&body) {
            Ok(err) => err.to_string(),
            Err(_) => body,
        };
        if matches!(status.as_u16(), 400 | 401) {
            return Err(TokenRejected {
                status: status.as_u16(),
                detail,
            }
            .into());
        }
        bail!("{status}: {detail}");
    }
    // The endpoint reports some failures with a 200 and an error body.
    if let Ok(err) = serde_json::from_str::<TokenError>(&body) {
        if !err.error.is_empty() {
            return Err(TokenRejected {
                status: status.as_u16(),
                detail: err.to_string(),
            }
            .into());
        }
    }
    serde_json::from_str(&body).context("decode token response")
}

fn expiry(expires_in: u64) -> DateTime<Utc> {
    let secs = match expires_in {
        0 => DEFAULT_EXPIRES_IN,
        secs => secs.min(MAX_EXPIRES_IN),
    };
    let now = Utc::now();
    chrono::Duration::try_seconds(secs as i64)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now)
}

fn scope_list(scope: &str) -> Vec<String> {
    scope
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Extracts the authorization code from the URL the provider redirected to.
/// Anything after `#` is ignored. Relative paths such as `/callback?code=..`
/// are accepted.
pub fn code_from_redirect(redirect: &str, expected_state: &str) -> Result<String> {
    let trimmed = redirect.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    if without_fragment.is_empty() {
        bail!("auth: redirect url is empty");
    }
    let url = if without_fragment.starts_with('/') {
        Url::parse(&format!("http://localhost{without_fragment}"))
    } else {
        Url::parse(without_fragment)
    }
    .context("auth: parse redirect url")?;

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if params.get("state").map(String::as_str) != Some(expected_state) {
        bail!("auth: authorization state mismatch");
    }
    if let Some(error) = params.get("error") {
        match params.get("error_description") {
            Some(description) if !description.is_empty() => {
                bail!("auth: authorization error: {error} ({description})")
            }
            _ => bail!("auth: authorization error: {error}"),
        }
    }
    match params.get("code") {
        Some(code) if !code.is_empty() => Ok(code.clone()),
        _ => bail!("auth: authorization code missing"),
    }
}

/// Returns true once the request settled the authorization.
fn handle_redirect(
    req: tiny_http::Request,
    path: &str,
    state: &str,
    tx: &Sender<AuthResult>,
) -> bool {
    let request_path = req.url().split('?').next().unwrap_or_default().to_string();
    if req.method() != &Method::Get || request_path != path {
        let _ = req.respond(Response::from_string("not found").with_status_code(404));
        return false;
    }

    match code_from_redirect(req.url(), state) {
        Ok(code) => {
            let mut response = Response::from_string(HTML_SUCCESS);
            if let Ok(header) =
                Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
            {
                response = response.with_header(header);
            }
            let _ = req.respond(response);
            let _ = tx.send(Ok(code));
        }
        Err(err) => {
            let _ = req.respond(Response::from_string(err.to_string()).with_status_code(400));
            let _ = tx.send(Err(err));
        }
    }
    true
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    scope: String,
}

/// The token endpoint refused the grant, e.g. a revoked refresh token.
#[derive(Debug, thiserror::Error)]
#[error("{status}: {detail}")]
struct TokenRejected {
    status: u16,
    detail: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default, rename = "error_description")]
    description: String,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.error.is_empty(), self.description.is_empty()) {
            (true, true) => write!(f, "unknown token error"),
            (false, true) => write!(f, "authorization error: {}", self.error),
            (true, false) => write!(f, "authorization error: {}", self.description),
            (false, false) => write!(
                f,
                "authorization error: {} ({})",
                self.error, self.description
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::mpsc;

    struct Seen {
        url: String,
        authorization: Option<String>,
        body: String,
    }

    /// Serves each canned response to one request, in order.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Seen>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok(mut request) = server.recv() else {
                    return;
                };
                let mut text = String::new();
                let _ = request.as_reader().read_to_string(&mut text);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.to_string());
                let seen = Seen {
                    url: request.url().to_string(),
                    authorization,
                    body: text,
                };
                let _ = request.respond(Response::from_string(body).with_status_code(status));
                let _ = tx.send(seen);
            }
        });
        (format!("http://{addr}"), rx)
    }

    fn flow(base: &str) -> (Flow, Arc<Store>) {
        let store = Arc::new(Store::in_memory().unwrap());
        let cfg = Config {
            client_id: "client".into(),
            client_secret: String::new(),
            token_url: format!("{base}/api/v1/access_token"),
            identity_url: format!("{base}/api/v1/me"),
            redirect_uri: "http://127.0.0.1:0/telex/callback".into(),
            timeout: Duration::from_secs(5),
            ..Config::default()
        };
        (Flow::new(store.clone(), cfg).unwrap(), store)
    }

    const TOKEN_BODY: &str = r#"{"access_token":"fresh","token_type":"bearer","expires_in":3600,"refresh_token":"again","scope":"identity read"}"#;
    const ME_BODY: &str = r#"{"id":"abc","name":"ferris"}"#;

    #[test]
    fn code_is_read_from_query_and_fragment_ignored() {
        let code = code_from_redirect(
            "http://127.0.0.1:65010/telex/callback?state=s1&code=xyz#_",
            "s1",
        )
        .unwrap();
        assert_eq!(code, "xyz");
        assert_eq!(
            code_from_redirect("/telex/callback?code=rel&state=s1", "s1").unwrap(),
            "rel"
        );
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let err = code_from_redirect("http://localhost/cb?state=other&code=x", "s1").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn provider_errors_are_reported() {
        let err = code_from_redirect("http://localhost/cb?state=s1&error=access_denied", "s1")
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert!(code_from_redirect("http://localhost/cb?state=s1", "s1").is_err());
        assert!(code_from_redirect("   ", "s1").is_err());
    }

    #[test]
    fn authorize_url_carries_pkce_and_scope() {
        let (flow, _) = flow("http://127.0.0.1:9");
        let raw = flow
            .authorize_url("http://127.0.0.1:65010/telex/callback", "st", "chal")
            .unwrap();
        let url = Url::parse(&raw).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client");
        assert_eq!(params["state"], "st");
        assert_eq!(params["code_challenge"], "chal");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["duration"], "permanent");
        assert!(params["scope"].contains("identity"));
    }

    #[test]
    fn challenge_is_sha256_of_verifier() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn loopback_redirect_completes_login() {
        let (base, seen) = serve(vec![(200, TOKEN_BODY), (200, ME_BODY)]);
        let (flow, store) = flow(&base);
        let authz = flow.begin().unwrap();
        assert!(authz.browser_url.contains("code_challenge="));

        let callback = format!("{}?state={}&code=the-code", authz.redirect_uri, authz.state);
        let resp = reqwest::blocking::get(&callback).unwrap();
        assert!(resp.status().is_success());

        let session = flow.complete(authz).unwrap();
        assert_eq!(session.username, "ferris");
        assert_eq!(session.token.access_token, "fresh");
        assert_eq!(store.load_token().unwrap().unwrap().username, "ferris");

        let token_request = seen.recv().unwrap();
        assert!(token_request.url.ends_with("/api/v1/access_token"));
        assert!(token_request.body.contains("code=the-code"));
        assert!(token_request.body.contains("grant_type=authorization_code"));
        assert!(token_request
            .authorization
            .unwrap_or_default()
            .starts_with("Basic "));
        let identity_request = seen.recv().unwrap();
        assert_eq!(identity_request.authorization.as_deref(), Some("Bearer fresh"));
    }

    #[test]
    fn pasted_redirect_completes_login() {
        let (base, _seen) = serve(vec![(200, TOKEN_BODY), (200, ME_BODY)]);
        let (flow, _) = flow(&base);
        let authz = flow.begin().unwrap();
        let pasted = format!("https://example.com/cb?state={}&code=manual#_", authz.state);
        let session = flow.complete_with_redirect(authz, &pasted).unwrap();
        assert_eq!(session.username, "ferris");
    }

    #[test]
    fn cancelled_authorization_fails() {
        let (flow, _) = flow("http://127.0.0.1:9");
        let authz = flow.begin().unwrap();
        authz.redirect_input().cancel();
        assert!(flow.complete(authz).is_err());
    }

    #[test]
    fn token_endpoint_errors_surface() {
        let (base, _seen) = serve(vec![(
            400,
            r#"{"error":"invalid_grant","error_description":"bad code"}"#,
        )]);
        let (flow, _) = flow(&base);
        let authz = flow.begin().unwrap();
        let pasted = format!("/telex/callback?state={}&code=bad", authz.state);
        let err = flow.complete_with_redirect(authz, &pasted).unwrap_err();
        assert!(format!("{err:#}").contains("invalid_grant"));
        assert!(!crate::reddit::is_unauthorized(&err));
    }

    fn expired_token() -> StoredToken {
        StoredToken {
            access_token: "stale".into(),
            refresh_token: "revoked".into(),
            token_type: "bearer".into(),
            scope: vec!["read".into()],
            expires_at: Utc::now() - chrono::Duration::minutes(5),
            username: "ferris".into(),
        }
    }

    #[test]
    fn revoked_refresh_token_reads_as_unauthorized() {
        for (status, body) in [
            (400, r#"{"error":"invalid_grant"}"#),
            (401, r#"{"message":"Unauthorized","error":401}"#),
            (200, r#"{"error":"invalid_grant"}"#),
        ] {
            let (base, _seen) = serve(vec![(status, body)]);
            let (flow, store) = flow(&base);
            store.save_token(&expired_token()).unwrap();
            let err = flow.token_provider().token().unwrap_err();
            assert!(
                crate::reddit::is_unauthorized(&err),
                "status {status}: {err:#}"
            );
        }
    }

    #[test]
    fn refresh_server_failure_is_not_unauthorized() {
        let (base, _seen) = serve(vec![(503, "upstream down")]);
        let (flow, store) = flow(&base);
        store.save_token(&expired_token()).unwrap();
        let err = flow.token_provider().token().unwrap_err();
        assert!(!crate::reddit::is_unauthorized(&err));
        assert!(format!("{err:#}").contains("upstream down"));
    }

    #[test]
    fn expiry_is_clamped_and_defaulted() {
        let now = Utc::now();
        let default = expiry(0) - now;
        assert!(default >= chrono::Duration::minutes(59));
        assert!(default <= chrono::Duration::minutes(61));

        let huge = expiry(u64::MAX) - now;
        assert!(huge <= chrono::Duration::days(366));
        assert!(huge >= chrono::Duration::days(364));
        assert!(expiry(10_000_000_000_000_000) > now);
    }

    #[test]
    fn provider_refreshes_expired_token() {
        let (base, seen) = serve(vec![(
            200,
            r#"{"access_token":"renewed","token_type":"bearer","expires_in":3600}"#,
        )]);
        let (flow, store) = flow(&base);
        store
            .save_token(&StoredToken {
                access_token: "stale".into(),
                refresh_token: "keep-me".into(),
                token_type: "bearer".into(),
                scope: vec!["read".into()],
                expires_at: Utc::now() - chrono::Duration::minutes(5),
                username: "ferris".into(),
            })
            .unwrap();

        let token = flow.token_provider().token().unwrap();
        assert_eq!(token.access_token, "renewed");
        let request = seen.recv().unwrap();
        assert!(request.body.contains("grant_type=refresh_token"));
        assert!(request.body.contains("refresh_token=keep-me"));

        let stored = store.load_token().unwrap().unwrap();
        assert_eq!(stored.access_token, "renewed");
        assert_eq!(stored.refresh_token, "keep-me");
        assert_eq!(stored.username, "ferris");
    }

    #[test]
    fn provider_uses_fresh_token_without_network() {
        let (flow, store) = flow("http://127.0.0.1:9");
        assert!(flow.token_provider().token().is_err());
        store
            .save_token(&StoredToken {
                access_token: "current".into(),
                refresh_token: "r".into(),
                token_type: "bearer".into(),
                scope: Vec::new(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
                username: "ferris".into(),
            })
            .unwrap();
        assert_eq!(flow.token_provider().token().unwrap().access_token, "current");
    }

    #[test]
    fn scopes_split_on_spaces_and_commas() {
        assert_eq!(scope_list("identity, read vote"), vec!["identity", "read", "vote"]);
        assert!(scope_list("  ").is_empty());
    }
}
