use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://oauth.reddit.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<OAuthToken>;
}

#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<u32>,
    pub extra: Vec<(String, String)>,
}

impl ListingOptions {
    fn into_params(self) -> Vec<(String, String)> {
        let mut params = vec![("raw_json".to_string(), "1".to_string())];
        if let Some(after) = self.after {
            params.push(("after".into(), after));
        }
        if let Some(before) = self.before {
            params.push(("before".into(), before));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        params.extend(self.extra);
        params
    }
}

/// Post ordering offered by the sort menu, in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Best,
    New,
    Hot,
    Top,
    Rising,
}

impl SortOption {
    pub const ALL: [SortOption; 5] = [
        SortOption::Best,
        SortOption::New,
        SortOption::Hot,
        SortOption::Top,
        SortOption::Rising,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Best => "best",
            SortOption::New => "new",
            SortOption::Hot => "hot",
            SortOption::Top => "top",
            SortOption::Rising => "rising",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortOption::Best => "Best",
            SortOption::New => "New",
            SortOption::Hot => "Hot",
            SortOption::Top => "Top",
            SortOption::Rising => "Rising",
        }
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn from_key(key: &str) -> Option<SortOption> {
        Self::ALL
            .iter()
            .copied()
            .find(|sort| sort.as_str().eq_ignore_ascii_case(key.trim()))
    }
}

/// Sections of a user's profile page, `About` excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileSection {
    Overview,
    Submitted,
    Comments,
    Upvoted,
    Downvoted,
}

impl ProfileSection {
    fn as_path(&self) -> &'static str {
        match self {
            ProfileSection::Overview => "overview",
            ProfileSection::Submitted => "submitted",
            ProfileSection::Comments => "comments",
            ProfileSection::Upvoted => "upvoted",
            ProfileSection::Downvoted => "downvoted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("reddit: unauthorized")]
    Unauthorized,
    #[error("reddit: forbidden")]
    Forbidden,
    #[error("reddit: not found")]
    NotFound,
    #[error("reddit: rate limited: {0}")]
    RateLimited(String),
    #[error("reddit: api error {status}: {body}")]
    Status { status: u16, body: String },
}

impl ApiError {
    fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound,
            429 => ApiError::RateLimited(body),
            _ => ApiError::Status { status, body },
        }
    }
}

/// True when `err` carries a 401 from the API, meaning the stored token is no
/// longer accepted.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ApiError>(),
            Some(ApiError::Unauthorized)
        )
    })
}

pub struct Client {
    token_provider: Arc<dyn TokenProvider>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    rate: RwLock<RateLimit>,
}

#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub used: f64,
    pub remaining: f64,
    pub reset_at: Option<SystemTime>,
}

impl Client {
    pub fn new(token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).with_context(|| format!("reddit: base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        Ok(Client {
            token_provider,
            http,
            user_agent: config.user_agent,
            base_url,
            rate: RwLock::new(RateLimit::default()),
        })
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate
            .read()
            .map(|rate| rate.clone())
            .unwrap_or_default()
    }

    pub fn me(&self) -> Result<UserDetails> {
        let resp = self.request(Method::GET, "/api/v1/me", &[], None)?;
        resp.json().context("reddit: decode user details")
    }

    pub fn listing(
        &self,
        subreddit: Option<&str>,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<Listing<Post>> {
        let path = match subreddit.map(normalize_subreddit).filter(|s| !s.is_empty()) {
            Some(name) => format!("/r/{}/{}", name, sort.as_str()),
            None => format!("/{}", sort.as_str()),
        };
        self.fetch_listing(&path, opts)
    }

    pub fn post_with_comments(&self, article: &str, opts: ListingOptions) -> Result<PostComments> {
        let article = article.trim().trim_start_matches("t3_");
        if article.is_empty() {
            bail!("reddit: post id is required");
        }
        let path = format!("/comments/{}", article);
        let params = opts.into_params();
        let resp = self.request(Method::GET, &path, &params, None)?;
        let payload: Vec<Value> = resp.json().context("reddit: decode comments payload")?;
        if payload.len() < 2 {
            bail!("reddit: comments payload missing elements");
        }
        let mut payload = payload.into_iter();
        let post_listing: ListingEnvelope<Post> =
            serde_json::from_value(payload.next().unwrap_or_default())
                .context("reddit: decode post listing")?;
        let post = post_listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data)
            .ok_or_else(|| anyhow!("reddit: post listing empty"))?;
        let comments = match payload.next() {
            Some(Value::Object(mut map)) => map
                .remove("data")
                .and_then(|mut data| data.get_mut("children").map(Value::take))
                .and_then(|children| match children {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(PostComments { post, comments })
    }

    pub fn user_about(&self, username: &str) -> Result<UserProfile> {
        let name = normalize_username(username)?;
        let path = format!("/user/{}/about", name);
        let resp = self.request(Method::GET, &path, &[], None)?;
        let thing: Thing<UserProfile> = resp.json().context("reddit: decode user profile")?;
        Ok(thing.data)
    }

    pub fn user_section(
        &self,
        username: &str,
        section: ProfileSection,
        opts: ListingOptions,
    ) -> Result<Listing<ProfileItem>> {
        let name = normalize_username(username)?;
        let path = format!("/user/{}/{}", name, section.as_path());
        let raw: Listing<Value> = self.fetch_listing(&path, opts)?;
        let mut items = Vec::with_capacity(raw.children.len());
        for thing in raw.children {
            match ProfileItem::from_thing(&thing.kind, thing.data) {
                Some(item) => items.push(Thing {
                    kind: thing.kind,
                    data: item,
                }),
                None => debug!(kind = %thing.kind, "skipping profile item"),
            }
        }
        Ok(Listing {
            after: raw.after,
            before: raw.before,
            children: items,
        })
    }

    pub fn subscribed_subreddits(&self, opts: ListingOptions) -> Result<Listing<Subreddit>> {
        self.fetch_listing("/subreddits/mine/subscriber", opts)
    }

    pub fn search_subreddits(&self, query: &str, opts: ListingOptions) -> Result<Listing<Subreddit>> {
        let opts = with_query(query, opts)?;
        self.fetch_listing("/subreddits/search", opts)
    }

    pub fn search_users(&self, query: &str, opts: ListingOptions) -> Result<Listing<UserSummary>> {
        let opts = with_query(query, opts)?;
        self.fetch_listing("/users/search", opts)
    }

    pub fn submit(&self, submission: &Submission) -> Result<SubmittedPost> {
        let form = submission.to_form()?;
        let resp = self.request(Method::POST, "/api/submit", &[], Some(form))?;
        let payload: SubmitResponse = resp.json().context("reddit: decode submit response")?;
        if let Some(err) = payload.json.errors.first() {
            let joined = err
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            bail!("reddit: submit error: {}", joined);
        }
        payload
            .json
            .data
            .ok_or_else(|| anyhow!("reddit: submit response empty"))
    }

    pub fn vote(&self, fullname: &str, dir: i32) -> Result<()> {
        if !(-1..=1).contains(&dir) {
            bail!("reddit: vote direction must be -1, 0, or 1");
        }
        let form = vec![
            ("id".to_string(), fullname.to_string()),
            ("dir".to_string(), dir.to_string()),
        ];
        self.request(Method::POST, "/api/vote", &[], Some(form))?;
        Ok(())
    }

    fn fetch_listing<T>(&self, path: &str, opts: ListingOptions) -> Result<Listing<T>>
    where
        T: DeserializeOwned,
    {
        let params = opts.into_params();
        let resp = self.request(Method::GET, path, &params, None)?;
        let listing: ListingEnvelope<T> = resp
            .json()
            .with_context(|| format!("reddit: decode listing {path}"))?;
        Ok(listing.data)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        form: Option<Vec<(String, String)>>,
    ) -> Result<Response> {
        let token = self.token_provider.token()?;
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        debug!(%method, path, "reddit request");
        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        req = req.header(AUTHORIZATION, format!("Bearer {}", token.access_token));
        if let Some(form_data) = form {
            req = req.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            req = req.form(&form_data);
        }

        let resp = req.send()?;
        self.capture_rate(resp.headers());
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            warn!(status, path, "reddit request failed");
            Err(ApiError::from_status(status, body).into())
        }
    }

    fn capture_rate(&self, headers: &HeaderMap) {
        let remaining = header_float(headers, "x-ratelimit-remaining");
        let used = header_float(headers, "x-ratelimit-used");
        let reset = header_float(headers, "x-ratelimit-reset");
        if remaining == 0.0 && used == 0.0 && reset == 0.0 {
            return;
        }
        let reset_at = Duration::try_from_secs_f64(reset.max(0.0))
            .ok()
            .and_then(|wait| SystemTime::now().checked_add(wait));
        if let Ok(mut rate) = self.rate.write() {
            rate.remaining = remaining;
            rate.used = used;
            rate.reset_at = reset_at;
        }
    }
}

fn header_float(headers: &HeaderMap, key: &str) -> f64 {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn with_query(query: &str, mut opts: ListingOptions) -> Result<ListingOptions> {
    let query = query.trim();
    if query.is_empty() {
        bail!("reddit: search query is required");
    }
    opts.extra.push(("q".into(), query.to_string()));
    Ok(opts)
}

pub fn normalize_subreddit(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches('/')
        .trim_start_matches("r/")
        .trim_end_matches('/')
}

fn normalize_username(raw: &str) -> Result<&str> {
    let name = raw
        .trim()
        .trim_start_matches('/')
        .trim_start_matches("u/")
        .trim_start_matches("user/");
    if name.is_empty() {
        bail!("reddit: username is required");
    }
    Ok(name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub after: Option<String>,
    pub before: Option<String>,
    pub children: Vec<Thing<T>>,
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        self.children.into_iter().map(|thing| thing.data).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub subreddit_name_prefixed: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub likes: Option<bool>,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub is_self: bool,
}

impl Post {
    pub fn subreddit_label(&self) -> String {
        if !self.subreddit_name_prefixed.is_empty() {
            self.subreddit_name_prefixed.clone()
        } else {
            format!("r/{}", self.subreddit)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileComment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub subreddit_name_prefixed: String,
    #[serde(default)]
    pub link_title: String,
    #[serde(default)]
    pub link_id: String,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone)]
pub enum ProfileItem {
    Post(Post),
    Comment(ProfileComment),
}

impl ProfileItem {
    fn from_thing(kind: &str, data: Value) -> Option<Self> {
        match kind {
            "t3" => serde_json::from_value(data).ok().map(ProfileItem::Post),
            "t1" => serde_json::from_value(data).ok().map(ProfileItem::Comment),
            _ => None,
        }
    }

    pub fn created_utc(&self) -> f64 {
        match self {
            ProfileItem::Post(post) => post.created_utc,
            ProfileItem::Comment(comment) => comment.created_utc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserSubreddit {
    #[serde(default)]
    pub display_name_prefixed: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub public_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserDetails {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub total_karma: i64,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
    #[serde(default)]
    pub icon_img: String,
    #[serde(default)]
    pub subreddit: Option<UserSubreddit>,
}

impl UserDetails {
    pub fn display_name(&self) -> String {
        self.subreddit
            .as_ref()
            .map(|sub| sub.display_name_prefixed.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("u/{}", self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub total_karma: i64,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub icon_img: String,
    #[serde(default)]
    pub subreddit: Option<UserSubreddit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserSummary {
    pub name: String,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Subreddit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub display_name_prefixed: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subscribers: i64,
    #[serde(default, rename = "over18")]
    pub over_18: bool,
    #[serde(default)]
    pub public_description: String,
}

/// Post details plus the raw top-level comment nodes. Comment nodes stay as
/// JSON so a single malformed reply does not fail the whole page.
#[derive(Debug, Clone)]
pub struct PostComments {
    pub post: Post,
    pub comments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionKind {
    Text { body: String },
    Link { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub subreddit: String,
    pub title: String,
    pub kind: SubmissionKind,
    pub nsfw: bool,
}

impl Submission {
    fn to_form(&self) -> Result<Vec<(String, String)>> {
        let subreddit = normalize_subreddit(&self.subreddit);
        if subreddit.is_empty() {
            bail!("reddit: submission subreddit is required");
        }
        if self.title.trim().is_empty() {
            bail!("reddit: submission title is required");
        }
        let mut form = vec![
            ("sr".to_string(), subreddit.to_string()),
            ("title".to_string(), self.title.trim().to_string()),
            ("api_type".to_string(), "json".to_string()),
            ("resubmit".to_string(), "true".to_string()),
        ];
        match &self.kind {
            SubmissionKind::Text { body } => {
                form.push(("kind".into(), "self".into()));
                form.push(("text".into(), body.clone()));
            }
            SubmissionKind::Link { url } => {
                form.push(("kind".into(), "link".into()));
                form.push(("url".into(), url.trim().to_string()));
            }
        }
        if self.nsfw {
            form.push(("nsfw".into(), "true".into()));
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubmittedPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    kind: String,
    data: Listing<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitResponse {
    json: SubmitResponseBody,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitResponseBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    #[serde(default)]
    data: Option<SubmittedPost>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::io::Read;
    use std::sync::mpsc;
    use std::thread;

    struct StaticToken(&'static str);

    impl TokenProvider for StaticToken {
        fn token(&self) -> Result<OAuthToken> {
            Ok(OAuthToken {
                access_token: self.0.to_string(),
                token_type: "bearer".into(),
                expires_at: None,
            })
        }
    }

    struct Captured {
        method: String,
        url: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Captured {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    fn serve_once(status: u16, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            if let Ok(mut request) = server.recv() {
                let mut text = String::new();
                let _ = request.as_reader().read_to_string(&mut text);
                let captured = Captured {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| (h.field.to_string(), h.value.to_string()))
                        .collect(),
                    body: text,
                };
                let _ = request.respond(tiny_http::Response::from_string(body).with_status_code(status));
                let _ = tx.send(captured);
            }
        });
        (format!("http://{}/", addr), rx)
    }

    fn client(base_url: String) -> Client {
        Client::new(
            Arc::new(StaticToken("secret-token")),
            ClientConfig {
                user_agent: "linux:telex:v0.1.0 (test)".into(),
                base_url: Some(base_url),
                timeout: Some(Duration::from_secs(5)),
                http_client: None,
            },
        )
        .unwrap()
    }

    fn rate_headers(remaining: &'static str, reset: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static(remaining));
        headers.insert("x-ratelimit-used", HeaderValue::from_static("4"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static(reset));
        headers
    }

    #[test]
    fn rate_limit_headers_are_recorded() {
        let client = client("http://127.0.0.1:9/".into());
        client.capture_rate(&rate_headers("596", "120"));
        let rate = client.rate_limit();
        assert_eq!(rate.remaining, 596.0);
        assert_eq!(rate.used, 4.0);
        let reset_at = rate.reset_at.unwrap();
        assert!(reset_at > SystemTime::now() + Duration::from_secs(60));
    }

    #[test]
    fn unrepresentable_reset_is_dropped() {
        let client = client("http://127.0.0.1:9/".into());
        for reset in ["1e300", "inf", "-5", "NaN"] {
            client.capture_rate(&rate_headers("10", reset));
            let rate = client.rate_limit();
            assert_eq!(rate.remaining, 10.0, "reset header {reset}");
            if reset == "-5" || reset == "NaN" {
                assert!(rate.reset_at.is_some(), "reset header {reset}");
            } else {
                assert!(rate.reset_at.is_none(), "reset header {reset}");
            }
        }
    }

    const EMPTY_LISTING: &str = r#"{"kind":"Listing","data":{"after":null,"before":null,"children":[]}}"#;

    #[test]
    fn requests_carry_bearer_and_user_agent() {
        let (base, rx) = serve_once(200, r#"{"name":"spez","total_karma":42}"#);
        let me = client(base).me().unwrap();
        assert_eq!(me.name, "spez");
        assert_eq!(me.total_karma, 42);
        assert_eq!(me.display_name(), "u/spez");

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "/api/v1/me");
        assert_eq!(req.header("Authorization"), Some("Bearer secret-token"));
        assert_eq!(req.header("User-Agent"), Some("linux:telex:v0.1.0 (test)"));
    }

    #[test]
    fn subreddit_listing_path_strips_prefix() {
        let (base, rx) = serve_once(200, EMPTY_LISTING);
        let listing = client(base)
            .listing(Some("r/rust"), SortOption::Top, ListingOptions::default())
            .unwrap();
        assert!(listing.children.is_empty());
        let req = rx.recv().unwrap();
        assert!(req.url.starts_with("/r/rust/top?"), "url was {}", req.url);
        assert!(req.url.contains("raw_json=1"));
    }

    #[test]
    fn front_page_listing_uses_sort_path() {
        let (base, rx) = serve_once(200, EMPTY_LISTING);
        client(base)
            .listing(
                None,
                SortOption::Best,
                ListingOptions {
                    limit: Some(25),
                    ..Default::default()
                },
            )
            .unwrap();
        let req = rx.recv().unwrap();
        assert!(req.url.starts_with("/best?"));
        assert!(req.url.contains("limit=25"));
    }

    #[test]
    fn search_sends_query_parameter() {
        let (base, rx) = serve_once(200, EMPTY_LISTING);
        client(base)
            .search_subreddits("rust lang", ListingOptions::default())
            .unwrap();
        let req = rx.recv().unwrap();
        assert!(req.url.starts_with("/subreddits/search?"));
        assert!(req.url.contains("q=rust+lang"), "url was {}", req.url);
    }

    #[test]
    fn empty_search_query_is_rejected_before_request() {
        let client = client("http://127.0.0.1:9/".into());
        assert!(client.search_users("   ", ListingOptions::default()).is_err());
    }

    #[test]
    fn unauthorized_maps_to_typed_error() {
        let (base, _rx) = serve_once(401, r#"{"message":"Unauthorized"}"#);
        let err = client(base).me().unwrap_err();
        assert!(is_unauthorized(&err));
    }

    #[test]
    fn server_error_keeps_status_and_body() {
        let (base, _rx) = serve_once(503, "upstream down");
        let err = client(base)
            .subscribed_subreddits(ListingOptions::default())
            .unwrap_err();
        match err.downcast_ref::<ApiError>() {
            Some(ApiError::Status { status, body }) => {
                assert_eq!(*status, 503);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn post_with_comments_returns_raw_children() {
        let (base, rx) = serve_once(
            200,
            r#"[
                {"kind":"Listing","data":{"after":null,"before":null,"children":[
                    {"kind":"t3","data":{"id":"abc","name":"t3_abc","title":"Hello","subreddit":"rust","author":"ferris"}}
                ]}},
                {"kind":"Listing","data":{"children":[
                    {"kind":"t1","data":{"author":"a","body":"first"}},
                    {"kind":"more","data":{"count":3}}
                ]}}
            ]"#,
        );
        let page = client(base)
            .post_with_comments("t3_abc", ListingOptions::default())
            .unwrap();
        assert_eq!(page.post.title, "Hello");
        assert_eq!(page.post.subreddit_label(), "r/rust");
        assert_eq!(page.comments.len(), 2);
        let req = rx.recv().unwrap();
        assert!(req.url.starts_with("/comments/abc?"));
    }

    #[test]
    fn user_section_skips_unknown_kinds() {
        let (base, rx) = serve_once(
            200,
            r#"{"kind":"Listing","data":{"after":"t1_z","before":null,"children":[
                {"kind":"t3","data":{"id":"p1","name":"t3_p1","title":"A post"}},
                {"kind":"t1","data":{"id":"c1","name":"t1_c1","body":"A comment","link_title":"Thread"}},
                {"kind":"t5","data":{"display_name":"rust"}}
            ]}}"#,
        );
        let listing = client(base)
            .user_section("u/ferris", ProfileSection::Overview, ListingOptions::default())
            .unwrap();
        assert_eq!(listing.after.as_deref(), Some("t1_z"));
        let items = listing.into_items();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], ProfileItem::Post(_)));
        assert!(matches!(items[1], ProfileItem::Comment(_)));
        let req = rx.recv().unwrap();
        assert!(req.url.starts_with("/user/ferris/overview?"));
    }

    #[test]
    fn submit_posts_form_and_surfaces_api_errors() {
        let (base, rx) = serve_once(
            200,
            r#"{"json":{"errors":[["SUBREDDIT_NOEXIST","that subreddit doesn't exist","sr"]]}}"#,
        );
        let submission = Submission {
            subreddit: "r/nowhere".into(),
            title: "Hello".into(),
            kind: SubmissionKind::Link {
                url: "https://example.com".into(),
            },
            nsfw: false,
        };
        let err = client(base).submit(&submission).unwrap_err();
        assert!(err.to_string().contains("SUBREDDIT_NOEXIST"));
        let req = rx.recv().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "/api/submit");
        assert!(req.body.contains("kind=link"));
        assert!(req.body.contains("sr=nowhere"));
        assert_eq!(
            req.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn vote_rejects_out_of_range_direction() {
        let client = client("http://127.0.0.1:9/".into());
        assert!(client.vote("t3_abc", 2).is_err());
    }

    #[test]
    fn sort_keys_round_trip_through_labels() {
        assert_eq!(SortOption::from_key("RISING"), Some(SortOption::Rising));
        assert_eq!(SortOption::from_key("controversial"), None);
        assert_eq!(SortOption::default().label(), "Best");
        assert_eq!(SortOption::Top.index(), 3);
    }
}
