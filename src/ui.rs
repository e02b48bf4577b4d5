use std::collections::HashSet;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use tracing::{debug, info, warn};

use crate::auth::RedirectInput;
use crate::comments::CommentRow;
use crate::compose::{Draft, DraftField, DraftTab};
use crate::config::{self, Config};
use crate::data::{self, PostDetail, Services};
use crate::format;
use crate::markdown::{self, MarkdownStyle};
use crate::nav::{Navigator, ProfileTab, View};
use crate::reddit::{self, SortOption};
use crate::session;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK_RATE: Duration = Duration::from_millis(120);
const HOMEPAGE_URL: &str = "https://telex.daimones.xyz";
const REPOSITORY_URL: &str = "https://github.com/believemanasseh/telex";
const WEB_BASE_URL: &str = "https://www.reddit.com";
const OFFLINE_USER: &str = "ferris";
const PREFERENCE_ITEMS: [&str; 2] = ["Dark mode", "Show NSFW content"];

#[derive(Debug, Clone, Copy)]
struct Palette {
    bg: Color,
    panel: Color,
    text: Color,
    muted: Color,
    accent: Color,
    selected_bg: Color,
    success: Color,
    error: Color,
    upvote: Color,
    downvote: Color,
}

impl Palette {
    fn new(dark_mode: bool) -> Self {
        if dark_mode {
            Self {
                bg: Color::Rgb(22, 24, 29),
                panel: Color::Rgb(30, 33, 40),
                text: Color::Rgb(230, 232, 238),
                muted: Color::Rgb(150, 156, 170),
                accent: Color::Rgb(255, 106, 61),
                selected_bg: Color::Rgb(52, 57, 70),
                success: Color::Rgb(140, 220, 140),
                error: Color::Rgb(240, 120, 120),
                upvote: Color::Rgb(255, 106, 61),
                downvote: Color::Rgb(120, 140, 255),
            }
        } else {
            Self {
                bg: Color::Rgb(250, 250, 250),
                panel: Color::Rgb(240, 241, 244),
                text: Color::Rgb(28, 28, 30),
                muted: Color::Rgb(100, 104, 112),
                accent: Color::Rgb(214, 72, 26),
                selected_bg: Color::Rgb(220, 224, 232),
                success: Color::Rgb(30, 130, 60),
                error: Color::Rgb(190, 40, 40),
                upvote: Color::Rgb(214, 72, 26),
                downvote: Color::Rgb(60, 80, 200),
            }
        }
    }

    fn depth_color(&self, depth: usize) -> Color {
        const DEPTH_COLORS: [Color; 5] = [
            Color::Rgb(250, 179, 135),
            Color::Rgb(166, 227, 161),
            Color::Rgb(203, 166, 247),
            Color::Rgb(137, 220, 235),
            Color::Rgb(249, 226, 175),
        ];
        if depth == 0 {
            self.accent
        } else {
            DEPTH_COLORS[(depth - 1) % DEPTH_COLORS.len()]
        }
    }

    fn vote_color(&self, likes: Option<bool>) -> Color {
        match likes {
            Some(true) => self.upvote,
            Some(false) => self.downvote,
            None => self.muted,
        }
    }
}

fn vote_from_likes(likes: Option<bool>) -> i32 {
    match likes {
        Some(true) => 1,
        Some(false) => -1,
        None => 0,
    }
}

fn likes_from_vote(vote: i32) -> Option<bool> {
    match vote {
        1 => Some(true),
        -1 => Some(false),
        _ => None,
    }
}

fn shift_vote(score: &mut i64, likes: &mut Option<bool>, from: i32, to: i32) {
    *score += (to - from) as i64;
    *likes = likes_from_vote(to);
}

fn move_selection(state: &mut ListState, len: usize, delta: i32) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as i64;
    let next = (current + delta as i64).clamp(0, len as i64 - 1);
    state.select(Some(next as usize));
}

fn clamp_selection(state: &mut ListState, len: usize) {
    if len == 0 {
        state.select(None);
    } else {
        let current = state.selected().unwrap_or(0).min(len - 1);
        state.select(Some(current));
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= TICK_RATE {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Overlay {
    SortMenu { selected: usize },
    Preferences { selected: usize },
    About,
    SearchPrompt { query: String },
}

#[derive(Default)]
struct AuthState {
    link: Option<String>,
    input: Option<RedirectInput>,
    paste: Option<String>,
    in_progress: bool,
}

#[derive(Debug, Clone, Default)]
struct SearchResults {
    subreddits: Vec<reddit::Subreddit>,
    users: Vec<reddit::UserSummary>,
}

enum SearchEntry<'a> {
    Subreddit(&'a reddit::Subreddit),
    User(&'a reddit::UserSummary),
}

#[derive(Default)]
struct ProfileState {
    username: String,
    about: Option<reddit::UserProfile>,
    items_all: Vec<reddit::ProfileItem>,
    items: Vec<reddit::ProfileItem>,
    list: ListState,
}

struct DetailState {
    detail: PostDetail,
    /// 0 is the post itself, `n` is comment row `n - 1`.
    selected: usize,
}

enum AsyncResponse {
    Feed {
        request_id: u64,
        result: Result<Vec<reddit::Post>>,
    },
    Post {
        request_id: u64,
        result: Result<PostDetail>,
    },
    Profile {
        request_id: u64,
        result: Result<(reddit::UserProfile, Vec<reddit::ProfileItem>)>,
    },
    Subreddits {
        request_id: u64,
        result: Result<Vec<reddit::Subreddit>>,
    },
    Search {
        request_id: u64,
        result: Result<SearchResults>,
    },
    Me {
        generation: u64,
        result: Result<reddit::UserDetails>,
    },
    Login {
        result: Result<String>,
    },
    Vote {
        generation: u64,
        fullname: String,
        requested: i32,
        previous: i32,
        result: Result<()>,
    },
    Submit {
        generation: u64,
        subreddit: String,
        result: Result<reddit::SubmittedPost>,
    },
}

pub struct Options {
    pub config: Config,
    /// Where preference changes are saved; `None` keeps them in memory.
    pub config_path: Option<PathBuf>,
    /// `None` runs offline against `services`.
    pub session: Option<Arc<session::Manager>>,
    pub services: Option<Services>,
    pub signed_in_user: Option<String>,
    pub status_message: String,
}

pub struct Model {
    nav: Navigator,
    config: Config,
    config_path: Option<PathBuf>,
    palette: Palette,
    session: Option<Arc<session::Manager>>,
    services: Option<Services>,
    me: Option<reddit::UserDetails>,
    status_message: String,
    status_is_error: bool,
    overlay: Option<Overlay>,
    auth: AuthState,
    feed_all: Vec<reddit::Post>,
    feed: Vec<reddit::Post>,
    feed_state: ListState,
    detail: Option<DetailState>,
    profile: ProfileState,
    subreddits_all: Vec<reddit::Subreddit>,
    subreddits: Vec<reddit::Subreddit>,
    subreddit_state: ListState,
    subreddit_filter: String,
    filter_editing: bool,
    search_all: SearchResults,
    search: SearchResults,
    search_state: ListState,
    draft: Draft,
    vote_in_flight: HashSet<String>,
    submit_in_flight: bool,
    loading_account: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    /// Bumped on sign-out; account-bound responses from an older session are dropped.
    session_generation: u64,
    pending_load: Option<u64>,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let palette = Palette::new(opts.config.ui.dark_mode);
        let mut model = Self {
            nav: Navigator::new(opts.config.feed.default_sort),
            palette,
            config: opts.config,
            config_path: opts.config_path,
            session: opts.session,
            services: opts.services,
            me: None,
            status_message: opts.status_message,
            status_is_error: false,
            overlay: None,
            auth: AuthState::default(),
            feed_all: Vec::new(),
            feed: Vec::new(),
            feed_state: ListState::default(),
            detail: None,
            profile: ProfileState::default(),
            subreddits_all: Vec::new(),
            subreddits: Vec::new(),
            subreddit_state: ListState::default(),
            subreddit_filter: String::new(),
            filter_editing: false,
            search_all: SearchResults::default(),
            search: SearchResults::default(),
            search_state: ListState::default(),
            draft: Draft::default(),
            vote_in_flight: HashSet::new(),
            submit_in_flight: false,
            loading_account: false,
            response_tx,
            response_rx,
            next_request_id: 0,
            session_generation: 0,
            pending_load: None,
            spinner: Spinner::new(),
            needs_redraw: true,
        };

        let resumed = model.services.is_some()
            && (model.session.is_none() || opts.signed_in_user.is_some());
        if resumed {
            model.enter_home(opts.signed_in_user);
        } else if model.status_message.is_empty() {
            model.status_message = "Press Enter to sign in with Reddit.".into();
        }
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = TICK_RATE
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => self.set_error(format!("Error: {err:#}")),
                        }
                        self.mark_dirty();
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= TICK_RATE {
                last_tick = Instant::now();
                if self.is_busy() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_busy(&self) -> bool {
        self.pending_load.is_some()
            || self.auth.in_progress
            || self.submit_in_flight
            || self.loading_account
            || !self.vote_in_flight.is_empty()
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.status_is_error = false;
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.status_is_error = true;
    }

    fn report_error(&mut self, context: &str, err: anyhow::Error) {
        if reddit::is_unauthorized(&err) {
            self.session_expired();
            return;
        }
        warn!(error = %format!("{err:#}"), "{}", context);
        self.set_error(format!("{context}: {err:#}"));
    }

    fn next_request(&mut self) -> u64 {
        self.next_request_id += 1;
        self.pending_load = Some(self.next_request_id);
        self.next_request_id
    }

    fn take_pending(&mut self, request_id: u64) -> bool {
        if self.pending_load == Some(request_id) {
            self.pending_load = None;
            true
        } else {
            debug!(request_id, "dropping stale response");
            false
        }
    }

    fn services(&mut self) -> Option<Services> {
        let services = self.services.clone();
        if services.is_none() {
            self.set_error("Sign in to load Reddit data.");
        }
        services
    }

    fn build_services(&self) -> Result<Services> {
        let Some(manager) = self.session.as_ref() else {
            return Ok(Services::mock());
        };
        let provider = manager.token_provider()?;
        let client = reddit::Client::new(provider, self.config.client_config())
            .context("create reddit client")?;
        Ok(Services::reddit(Arc::new(client)))
    }

    // Session

    fn enter_home(&mut self, username: Option<String>) {
        self.auth = AuthState::default();
        self.nav.sign_in();
        if let Some(user) = username.filter(|u| !u.is_empty()) {
            self.nav.set_current_user(user);
        }
        self.load_me();
        self.load_feed();
    }

    fn start_login(&mut self) -> Result<()> {
        if self.auth.in_progress {
            self.set_status("Sign-in already in progress. Esc cancels it.");
            return Ok(());
        }
        let Some(manager) = self.session.clone() else {
            if self.services.is_none() {
                self.services = Some(Services::mock());
            }
            self.enter_home(Some(OFFLINE_USER.into()));
            return Ok(());
        };

        let authz = manager
            .begin_login()
            .context("start Reddit authorization")?;
        let url = authz.browser_url.clone();
        self.auth.input = Some(authz.redirect_input());
        self.auth.link = Some(url.clone());
        self.auth.in_progress = true;

        match webbrowser::open(&url) {
            Ok(_) => self.set_status(
                "Authorize Telex in your browser. c copies the link, p pastes a redirect URL.",
            ),
            Err(err) => self.set_status(format!(
                "Open the link below to authorize (auto-open failed: {err})."
            )),
        }

        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = manager
                .complete_login(authz)
                .map(|session| session.username);
            let _ = tx.send(AsyncResponse::Login { result });
        });
        Ok(())
    }

    fn cancel_login(&mut self) {
        if let Some(input) = self.auth.input.take() {
            input.cancel();
        }
        self.auth.paste = None;
    }

    fn copy_auth_link(&mut self) -> Result<()> {
        let url = self
            .auth
            .link
            .clone()
            .ok_or_else(|| anyhow!("no authorization link yet"))?;
        let mut clipboard =
            arboard::Clipboard::new().map_err(|err| anyhow!("open clipboard: {err}"))?;
        clipboard
            .set_text(url)
            .map_err(|err| anyhow!("copy authorization link: {err}"))?;
        self.set_status("Authorization link copied to clipboard.");
        Ok(())
    }

    fn submit_pasted_redirect(&mut self) -> Result<()> {
        let pasted = self.auth.paste.take().unwrap_or_default();
        let input = self
            .auth
            .input
            .as_ref()
            .ok_or_else(|| anyhow!("no authorization pending"))?;
        input.submit(&pasted)?;
        self.set_status("Redirect accepted. Finishing sign-in…");
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        if let Some(manager) = self.session.as_ref() {
            manager.logout().context("log out")?;
        }
        self.reset_signed_out();
        self.set_status("Logged out. Press Enter to sign in again.");
        Ok(())
    }

    fn session_expired(&mut self) {
        if let Some(manager) = self.session.as_ref() {
            if let Err(err) = manager.logout() {
                warn!(error = %err, "failed to clear expired session");
            }
        }
        self.reset_signed_out();
        self.set_error("Session expired. Press Enter to sign in again.");
    }

    fn reset_signed_out(&mut self) {
        self.nav.sign_out();
        if self.session.is_some() {
            self.services = None;
        }
        self.me = None;
        self.overlay = None;
        self.pending_load = None;
        self.feed_all.clear();
        self.feed.clear();
        self.feed_state = ListState::default();
        self.detail = None;
        self.profile = ProfileState::default();
        self.subreddits_all.clear();
        self.subreddits.clear();
        self.subreddit_filter.clear();
        self.filter_editing = false;
        self.search_all = SearchResults::default();
        self.search = SearchResults::default();
        self.draft = Draft::default();
        self.auth = AuthState::default();
        self.vote_in_flight.clear();
        self.submit_in_flight = false;
        self.loading_account = false;
        self.session_generation += 1;
    }

    // Loading

    fn reload_view(&mut self, view: &View) {
        match view {
            View::Home => self.load_feed(),
            View::PostDetail { post_id } => self.load_post(post_id.clone()),
            View::Profile => self.load_profile(),
            View::Subreddits => self.load_subreddits(),
            View::Search { query } => self.run_search(query.clone()),
            View::Auth | View::NewPost => {}
        }
    }

    fn load_me(&mut self) {
        let Some(services) = self.services.clone() else {
            return;
        };
        self.loading_account = true;
        let generation = self.session_generation;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.profiles.load_me();
            let _ = tx.send(AsyncResponse::Me { generation, result });
        });
    }

    fn load_feed(&mut self) {
        let Some(services) = self.services() else {
            return;
        };
        let request_id = self.next_request();
        let subreddit = self.nav.current_subreddit().map(str::to_string);
        let sort = self.nav.sort();
        self.set_status(format!(
            "Loading {} ({})…",
            self.nav.feed_label(),
            sort.label()
        ));
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.feed.load_feed(subreddit.as_deref(), sort);
            let _ = tx.send(AsyncResponse::Feed { request_id, result });
        });
    }

    fn load_post(&mut self, post_id: String) {
        let Some(services) = self.services() else {
            return;
        };
        let request_id = self.next_request();
        let sort = self.nav.sort();
        self.set_status("Loading post…");
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.posts.load_post(&post_id, sort);
            let _ = tx.send(AsyncResponse::Post { request_id, result });
        });
    }

    fn load_profile(&mut self) {
        if self.profile.username.is_empty() {
            self.set_error("Profile not available until your account has loaded.");
            return;
        }
        let Some(services) = self.services() else {
            return;
        };
        let request_id = self.next_request();
        let username = self.profile.username.clone();
        let tab = self.nav.profile_tab();
        self.set_status(format!("Loading u/{username} ({})…", tab.label()));
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.profiles.load_profile(&username).and_then(|about| {
                let items = services.profiles.load_section(&username, tab)?;
                Ok((about, items))
            });
            let _ = tx.send(AsyncResponse::Profile { request_id, result });
        });
    }

    fn load_subreddits(&mut self) {
        let Some(services) = self.services() else {
            return;
        };
        let request_id = self.next_request();
        self.set_status("Loading subscriptions…");
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.subreddits.subscribed();
            let _ = tx.send(AsyncResponse::Subreddits { request_id, result });
        });
    }

    fn run_search(&mut self, query: String) {
        let Some(services) = self.services() else {
            return;
        };
        let request_id = self.next_request();
        self.set_status(format!("Searching for \"{query}\"…"));
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.subreddits.search_subreddits(&query).and_then(|subreddits| {
                let users = services.subreddits.search_users(&query)?;
                Ok(SearchResults { subreddits, users })
            });
            let _ = tx.send(AsyncResponse::Search { request_id, result });
        });
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Feed { request_id, result } => {
                if !self.take_pending(request_id) {
                    return;
                }
                match result {
                    Ok(posts) => {
                        self.feed_all = posts;
                        self.refilter();
                        self.feed_state
                            .select(if self.feed.is_empty() { None } else { Some(0) });
                        self.set_status(format!(
                            "{} · {} · {}",
                            self.nav.feed_label(),
                            self.nav.sort().label(),
                            format::plural(self.feed.len() as i64, "post", "posts")
                        ));
                    }
                    Err(err) => self.report_error("Failed to load feed", err),
                }
            }
            AsyncResponse::Post { request_id, result } => {
                if !self.take_pending(request_id) {
                    return;
                }
                match result {
                    Ok(detail) => {
                        let mut status = format::plural(
                            detail.comments.len() as i64,
                            "comment",
                            "comments",
                        );
                        if detail.comments.more > 0 {
                            status.push_str(&format!(
                                " · {} more not loaded",
                                detail.comments.more
                            ));
                        }
                        self.detail = Some(DetailState {
                            detail,
                            selected: 0,
                        });
                        self.set_status(status);
                    }
                    Err(err) => self.report_error("Failed to load post", err),
                }
            }
            AsyncResponse::Profile { request_id, result } => {
                if !self.take_pending(request_id) {
                    return;
                }
                match result {
                    Ok((about, items)) => {
                        self.profile.about = Some(about);
                        self.profile.items_all = items;
                        self.refilter();
                        self.profile.list.select(if self.profile.items.is_empty() {
                            None
                        } else {
                            Some(0)
                        });
                        self.set_status(format!(
                            "u/{} · {}",
                            self.profile.username,
                            self.nav.profile_tab().label()
                        ));
                    }
                    Err(err) => self.report_error("Failed to load profile", err),
                }
            }
            AsyncResponse::Subreddits { request_id, result } => {
                if !self.take_pending(request_id) {
                    return;
                }
                match result {
                    Ok(subreddits) => {
                        self.subreddits_all = subreddits;
                        self.refilter();
                        let visible = self.visible_subreddits().len();
                        self.subreddit_state.select(Some(0));
                        clamp_selection(&mut self.subreddit_state, visible);
                        self.set_status(format::plural(
                            self.subreddits.len() as i64,
                            "subscription",
                            "subscriptions",
                        ));
                    }
                    Err(err) => self.report_error("Failed to load subreddits", err),
                }
            }
            AsyncResponse::Search { request_id, result } => {
                if !self.take_pending(request_id) {
                    return;
                }
                match result {
                    Ok(results) => {
                        self.search_all = results;
                        self.refilter();
                        let entries = self.search_entries().len();
                        self.search_state.select(Some(0));
                        clamp_selection(&mut self.search_state, entries);
                        self.set_status(format!(
                            "{} · {}",
                            format::plural(self.search.subreddits.len() as i64, "subreddit", "subreddits"),
                            format::plural(self.search.users.len() as i64, "user", "users")
                        ));
                    }
                    Err(err) => self.report_error("Search failed", err),
                }
            }
            AsyncResponse::Me { generation, .. } if generation != self.session_generation => {}
            AsyncResponse::Me { result, .. } => {
                self.loading_account = false;
                match result {
                    Ok(me) => {
                        self.nav.set_current_user(me.name.clone());
                        self.me = Some(me);
                    }
                    Err(err) => self.report_error("Failed to load account", err),
                }
            }
            AsyncResponse::Login { result } => {
                self.auth.in_progress = false;
                self.auth.input = None;
                match result {
                    Ok(username) => {
                        info!(user = %username, "login complete");
                        match self.build_services() {
                            Ok(services) => {
                                self.services = Some(services);
                                self.enter_home(Some(username));
                            }
                            Err(err) => self.report_error("Signed in, but setup failed", err),
                        }
                    }
                    Err(err) => {
                        self.auth.link = None;
                        self.auth.paste = None;
                        self.report_error("Sign-in failed", err);
                    }
                }
            }
            AsyncResponse::Vote { generation, .. } if generation != self.session_generation => {}
            AsyncResponse::Vote {
                fullname,
                requested,
                previous,
                result,
                ..
            } => {
                self.vote_in_flight.remove(&fullname);
                if let Err(err) = result {
                    self.apply_vote(&fullname, requested, previous);
                    self.report_error("Vote failed", err);
                }
            }
            AsyncResponse::Submit { generation, .. } if generation != self.session_generation => {
                debug!("dropping submit result from a previous session");
            }
            AsyncResponse::Submit {
                subreddit, result, ..
            } => {
                self.submit_in_flight = false;
                match result {
                    Ok(post) => {
                        info!(id = %post.id, "post submitted");
                        self.draft = Draft::default();
                        self.nav.select_subreddit(&subreddit);
                        self.load_feed();
                        self.set_status(format!("Posted to r/{subreddit}."));
                    }
                    Err(err) => self.report_error("Submit failed", err),
                }
            }
        }
    }

    fn refilter(&mut self) {
        let show = self.config.feed.show_nsfw;
        self.feed = data::filter_nsfw(self.feed_all.clone(), show);
        clamp_selection(&mut self.feed_state, self.feed.len());
        self.subreddits = data::filter_nsfw(self.subreddits_all.clone(), show);
        let visible = self.visible_subreddits().len();
        clamp_selection(&mut self.subreddit_state, visible);
        self.search = SearchResults {
            subreddits: data::filter_nsfw(self.search_all.subreddits.clone(), show),
            users: self.search_all.users.clone(),
        };
        let entries = self.search_entries().len();
        clamp_selection(&mut self.search_state, entries);
        self.profile.items = data::filter_nsfw(self.profile.items_all.clone(), show);
        clamp_selection(&mut self.profile.list, self.profile.items.len());
    }

    fn visible_subreddits(&self) -> Vec<&reddit::Subreddit> {
        data::filter_subreddits(&self.subreddits, &self.subreddit_filter)
    }

    fn search_entries(&self) -> Vec<SearchEntry<'_>> {
        self.search
            .subreddits
            .iter()
            .map(SearchEntry::Subreddit)
            .chain(self.search.users.iter().map(SearchEntry::User))
            .collect()
    }

    // Votes and posts

    fn selected_votable(&self) -> Option<(String, Option<bool>)> {
        match self.nav.view() {
            View::Home => self
                .feed_state
                .selected()
                .and_then(|i| self.feed.get(i))
                .map(|post| (post.name.clone(), post.likes)),
            View::PostDetail { .. } => {
                let state = self.detail.as_ref()?;
                if state.selected == 0 {
                    let post = &state.detail.post;
                    Some((post.name.clone(), post.likes))
                } else {
                    state
                        .detail
                        .comments
                        .rows
                        .get(state.selected - 1)
                        .map(|row| (row.name.clone(), row.likes))
                }
            }
            View::Profile => match self
                .profile
                .list
                .selected()
                .and_then(|i| self.profile.items.get(i))?
            {
                reddit::ProfileItem::Post(post) => Some((post.name.clone(), post.likes)),
                reddit::ProfileItem::Comment(_) => None,
            },
            _ => None,
        }
    }

    fn vote_selected(&mut self, dir: i32) {
        let Some(services) = self.services() else {
            return;
        };
        let Some((fullname, likes)) = self.selected_votable() else {
            self.set_status("Nothing to vote on here.");
            return;
        };
        if fullname.is_empty() || self.vote_in_flight.contains(&fullname) {
            return;
        }
        let previous = vote_from_likes(likes);
        let requested = if previous == dir { 0 } else { dir };
        self.apply_vote(&fullname, previous, requested);
        self.vote_in_flight.insert(fullname.clone());
        self.set_status(match requested {
            1 => "Upvoted.",
            -1 => "Downvoted.",
            _ => "Vote cleared.",
        });

        let generation = self.session_generation;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.interactions.vote(&fullname, requested);
            let _ = tx.send(AsyncResponse::Vote {
                generation,
                fullname,
                requested,
                previous,
                result,
            });
        });
    }

    fn apply_vote(&mut self, fullname: &str, from: i32, to: i32) {
        for post in self.feed_all.iter_mut().chain(self.feed.iter_mut()) {
            if post.name == fullname {
                shift_vote(&mut post.score, &mut post.likes, from, to);
            }
        }
        if let Some(state) = self.detail.as_mut() {
            let post = &mut state.detail.post;
            if post.name == fullname {
                shift_vote(&mut post.score, &mut post.likes, from, to);
            }
            for row in state.detail.comments.rows.iter_mut() {
                if row.name == fullname {
                    shift_vote(&mut row.score, &mut row.likes, from, to);
                }
            }
        }
        let profile = &mut self.profile;
        for item in profile.items_all.iter_mut().chain(profile.items.iter_mut()) {
            if let reddit::ProfileItem::Post(post) = item {
                if post.name == fullname {
                    shift_vote(&mut post.score, &mut post.likes, from, to);
                }
            }
        }
    }

    fn open_post(&mut self, post_id: String) {
        if post_id.is_empty() {
            return;
        }
        self.detail = None;
        self.nav.open_post(post_id.clone());
        self.load_post(post_id);
    }

    fn open_profile_of(&mut self, username: String) {
        self.profile = ProfileState {
            username,
            ..ProfileState::default()
        };
        self.nav.open_profile();
        self.load_profile();
    }

    fn go_home(&mut self) {
        self.nav.go_home();
        self.detail = None;
        self.filter_editing = false;
        if self.feed_all.is_empty() && self.pending_load.is_none() {
            self.load_feed();
        } else {
            self.pending_load = None;
            self.set_status(self.nav.feed_label());
        }
    }

    fn select_subreddit(&mut self, name: &str) {
        self.nav.select_subreddit(name);
        self.filter_editing = false;
        self.load_feed();
    }

    fn submit_draft(&mut self) {
        if self.submit_in_flight {
            return;
        }
        let submission = match self.draft.submission() {
            Ok(submission) => submission,
            Err(err) => {
                self.set_error(err.to_string());
                return;
            }
        };
        let Some(services) = self.services() else {
            return;
        };
        self.submit_in_flight = true;
        self.set_status(format!("Posting to r/{}…", submission.subreddit));
        let generation = self.session_generation;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = services.submissions.submit(&submission);
            let _ = tx.send(AsyncResponse::Submit {
                generation,
                subreddit: submission.subreddit,
                result,
            });
        });
    }

    fn open_in_browser(&mut self) -> Result<()> {
        let Some(state) = self.detail.as_ref() else {
            return Ok(());
        };
        let post = &state.detail.post;
        let url = if post.is_self || post.url.is_empty() {
            format!("{WEB_BASE_URL}{}", post.permalink)
        } else {
            post.url.clone()
        };
        webbrowser::open(&url).with_context(|| format!("open {url}"))?;
        self.set_status(format!("Opened {url}"));
        Ok(())
    }

    fn set_preference(&mut self, index: usize) -> Result<()> {
        match index {
            0 => {
                self.config.ui.dark_mode = !self.config.ui.dark_mode;
                self.palette = Palette::new(self.config.ui.dark_mode);
            }
            _ => {
                self.config.feed.show_nsfw = !self.config.feed.show_nsfw;
                self.refilter();
            }
        }
        match self.config_path.clone() {
            Some(path) => {
                config::save_preferences(
                    Some(path),
                    self.config.ui.dark_mode,
                    self.config.feed.show_nsfw,
                )?;
                self.set_status("Preferences saved.");
            }
            None => self.set_status("Preferences applied."),
        }
        Ok(())
    }

    // Keys

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }
        if self.overlay.is_some() {
            return self.handle_overlay_key(key);
        }
        if self.auth.paste.is_some() {
            return self.handle_paste_key(key);
        }
        if self.filter_editing {
            self.handle_filter_key(key);
            return Ok(false);
        }
        if matches!(self.nav.view(), View::NewPost) {
            return self.handle_new_post_key(key);
        }
        if matches!(self.nav.view(), View::Auth) {
            return self.handle_auth_key(key);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc | KeyCode::Char('b') => {
                if self.nav.nav_button().is_some() {
                    self.go_home();
                }
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_in_view(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_in_view(-1),
            KeyCode::PageDown => self.move_in_view(10),
            KeyCode::PageUp => self.move_in_view(-10),
            KeyCode::Enter => self.activate_selection(),
            KeyCode::Char('s') => {
                self.overlay = Some(Overlay::SortMenu {
                    selected: self.nav.sort().index(),
                });
            }
            KeyCode::Char('r') => {
                if self.pending_load.is_none() {
                    let target = self.nav.reload_target();
                    self.reload_view(&target);
                }
            }
            KeyCode::Char('/') => {
                if matches!(self.nav.view(), View::Subreddits) {
                    self.filter_editing = true;
                } else {
                    self.overlay = Some(Overlay::SearchPrompt {
                        query: String::new(),
                    });
                }
            }
            KeyCode::Char('p') => match self.nav.current_user().map(str::to_string) {
                Some(user) => self.open_profile_of(user),
                None => self.set_error("Profile not available until your account has loaded."),
            },
            KeyCode::Char('g') => {
                self.nav.open_subreddits();
                self.subreddit_filter.clear();
                self.load_subreddits();
            }
            KeyCode::Char('n') => {
                self.draft = Draft::new(self.nav.current_subreddit());
                self.nav.open_new_post();
                self.set_status("New post: Tab moves between fields, Ctrl+S submits.");
            }
            KeyCode::Char('c') if matches!(self.nav.view(), View::Home) => {
                if self.nav.current_subreddit().is_some() {
                    self.nav.clear_subreddit();
                    self.load_feed();
                }
            }
            KeyCode::Char('u') => self.vote_selected(1),
            KeyCode::Char('d') => self.vote_selected(-1),
            KeyCode::Char('w') => self.open_in_browser()?,
            KeyCode::Char('o') => self.overlay = Some(Overlay::Preferences { selected: 0 }),
            KeyCode::Char('?') => self.overlay = Some(Overlay::About),
            KeyCode::Char('L') => self.logout()?,
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => self.shift_profile_tab(1),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => self.shift_profile_tab(-1),
            _ => {}
        }
        Ok(false)
    }

    fn handle_auth_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Enter | KeyCode::Char('l') => self.start_login()?,
            KeyCode::Char('c') => self.copy_auth_link()?,
            KeyCode::Char('p') if self.auth.in_progress => {
                self.auth.paste = Some(String::new());
                self.set_status("Paste the URL your browser was redirected to, then press Enter.");
            }
            KeyCode::Esc if self.auth.in_progress => self.cancel_login(),
            KeyCode::Char('o') => self.overlay = Some(Overlay::Preferences { selected: 0 }),
            KeyCode::Char('?') => self.overlay = Some(Overlay::About),
            _ => {}
        }
        Ok(false)
    }

    fn handle_paste_key(&mut self, key: KeyEvent) -> Result<bool> {
        let Some(buffer) = self.auth.paste.as_mut() else {
            return Ok(false);
        };
        match key.code {
            KeyCode::Esc => {
                self.auth.paste = None;
                self.set_status("Paste cancelled.");
            }
            KeyCode::Enter => self.submit_pasted_redirect()?,
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(ch) => buffer.push(ch),
            _ => {}
        }
        Ok(false)
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => self.filter_editing = false,
            KeyCode::Backspace => {
                self.subreddit_filter.pop();
            }
            KeyCode::Char(ch) => self.subreddit_filter.push(ch),
            _ => return,
        }
        self.subreddit_state.select(Some(0));
        let visible = self.visible_subreddits().len();
        clamp_selection(&mut self.subreddit_state, visible);
    }

    fn handle_new_post_key(&mut self, key: KeyEvent) -> Result<bool> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.go_home(),
            KeyCode::Char('s') if ctrl => self.submit_draft(),
            KeyCode::Char('x') if ctrl => {
                self.draft.nsfw = !self.draft.nsfw;
            }
            KeyCode::Right if ctrl => {
                let tab = self.draft.tab().shift(1);
                self.draft.set_tab(tab);
            }
            KeyCode::Left if ctrl => {
                let tab = self.draft.tab().shift(-1);
                self.draft.set_tab(tab);
            }
            KeyCode::Tab | KeyCode::Down => self.draft.focus_next(),
            KeyCode::BackTab | KeyCode::Up => self.draft.focus_previous(),
            KeyCode::Delete if self.draft.focus() == DraftField::Attachment => {
                let last = self.draft.attachments().len().checked_sub(1);
                if let Some(index) = last {
                    self.draft.remove_attachment(index);
                }
            }
            KeyCode::Enter => match self.draft.focus() {
                DraftField::Body => {
                    self.draft.insert_char('\n');
                }
                DraftField::Attachment => match self.draft.commit_attachment_input() {
                    Ok(()) => self.set_status(format::plural(
                        self.draft.attachments().len() as i64,
                        "attachment",
                        "attachments",
                    )),
                    Err(err) => self.set_error(err.to_string()),
                },
                _ => self.draft.focus_next(),
            },
            KeyCode::Backspace => self.draft.backspace(),
            KeyCode::Char(ch) if !ctrl => {
                if !self.draft.insert_char(ch) && self.draft.focus() == DraftField::Title {
                    self.set_error(format!(
                        "Titles are limited to {} characters.",
                        crate::compose::MAX_TITLE_CHARS
                    ));
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> Result<bool> {
        let Some(overlay) = self.overlay.take() else {
            return Ok(false);
        };
        match overlay {
            Overlay::SortMenu { selected } => {
                let len = SortOption::ALL.len();
                let pick = match key.code {
                    KeyCode::Esc | KeyCode::Char('s') | KeyCode::Char('q') => return Ok(false),
                    KeyCode::Char('j') | KeyCode::Down => {
                        self.overlay = Some(Overlay::SortMenu {
                            selected: (selected + 1) % len,
                        });
                        return Ok(false);
                    }
                    KeyCode::Char('k') | KeyCode::Up => {
                        self.overlay = Some(Overlay::SortMenu {
                            selected: (selected + len - 1) % len,
                        });
                        return Ok(false);
                    }
                    KeyCode::Enter => selected,
                    KeyCode::Char(ch) if ('1'..='5').contains(&ch) => ch as usize - '1' as usize,
                    _ => {
                        self.overlay = Some(Overlay::SortMenu { selected });
                        return Ok(false);
                    }
                };
                let sort = SortOption::ALL[pick.min(len - 1)];
                if let Some(target) = self.nav.set_sort(sort) {
                    self.reload_view(&target);
                }
            }
            Overlay::Preferences { selected } => match key.code {
                KeyCode::Esc | KeyCode::Char('o') | KeyCode::Char('q') => {}
                KeyCode::Char('j') | KeyCode::Down | KeyCode::Char('k') | KeyCode::Up => {
                    self.overlay = Some(Overlay::Preferences {
                        selected: (selected + 1) % PREFERENCE_ITEMS.len(),
                    });
                }
                KeyCode::Enter | KeyCode::Char(' ') => {
                    self.overlay = Some(Overlay::Preferences { selected });
                    self.set_preference(selected)?;
                }
                _ => self.overlay = Some(Overlay::Preferences { selected }),
            },
            Overlay::About => {}
            Overlay::SearchPrompt { mut query } => match key.code {
                KeyCode::Esc => {}
                KeyCode::Enter => {
                    let query = query.trim().to_string();
                    if query.is_empty() {
                        self.set_error("Type something to search for.");
                    } else {
                        self.search_all = SearchResults::default();
                        self.search = SearchResults::default();
                        self.nav.open_search(query.clone());
                        self.run_search(query);
                    }
                }
                KeyCode::Backspace => {
                    query.pop();
                    self.overlay = Some(Overlay::SearchPrompt { query });
                }
                KeyCode::Char(ch) => {
                    query.push(ch);
                    self.overlay = Some(Overlay::SearchPrompt { query });
                }
                _ => self.overlay = Some(Overlay::SearchPrompt { query }),
            },
        }
        Ok(false)
    }

    fn move_in_view(&mut self, delta: i32) {
        match self.nav.view() {
            View::Home => move_selection(&mut self.feed_state, self.feed.len(), delta),
            View::PostDetail { .. } => {
                if let Some(state) = self.detail.as_mut() {
                    let len = state.detail.comments.len() + 1;
                    let next = (state.selected as i64 + delta as i64).clamp(0, len as i64 - 1);
                    state.selected = next as usize;
                }
            }
            View::Profile => {
                move_selection(&mut self.profile.list, self.profile.items.len(), delta)
            }
            View::Subreddits => {
                let len = self.visible_subreddits().len();
                move_selection(&mut self.subreddit_state, len, delta);
            }
            View::Search { .. } => {
                let len = self.search_entries().len();
                move_selection(&mut self.search_state, len, delta);
            }
            View::Auth | View::NewPost => {}
        }
    }

    fn activate_selection(&mut self) {
        match self.nav.view() {
            View::Home => {
                let post_id = self
                    .feed_state
                    .selected()
                    .and_then(|i| self.feed.get(i))
                    .map(|post| post.id.clone());
                if let Some(id) = post_id {
                    self.open_post(id);
                }
            }
            View::Profile => {
                let target = self
                    .profile
                    .list
                    .selected()
                    .and_then(|i| self.profile.items.get(i))
                    .map(|item| match item {
                        reddit::ProfileItem::Post(post) => post.id.clone(),
                        reddit::ProfileItem::Comment(comment) => comment.link_id.clone(),
                    });
                if let Some(id) = target {
                    self.open_post(id);
                }
            }
            View::Subreddits => {
                let name = self
                    .subreddit_state
                    .selected()
                    .and_then(|i| self.visible_subreddits().get(i).map(|s| s.display_name.clone()));
                if let Some(name) = name {
                    self.select_subreddit(&name);
                }
            }
            View::Search { .. } => {
                enum Target {
                    Subreddit(String),
                    User(String),
                }
                let target = self.search_state.selected().and_then(|i| {
                    self.search_entries().get(i).map(|entry| match entry {
                        SearchEntry::Subreddit(sub) => Target::Subreddit(sub.display_name.clone()),
                        SearchEntry::User(user) => Target::User(user.name.clone()),
                    })
                });
                match target {
                    Some(Target::Subreddit(name)) => self.select_subreddit(&name),
                    Some(Target::User(name)) => self.open_profile_of(name),
                    None => {}
                }
            }
            View::PostDetail { .. } | View::Auth | View::NewPost => {}
        }
    }

    fn shift_profile_tab(&mut self, delta: i32) {
        if !matches!(self.nav.view(), View::Profile) || self.pending_load.is_some() {
            return;
        }
        let tab = self.nav.profile_tab().shift(delta);
        if self.nav.select_profile_tab(tab) {
            self.load_profile();
        }
    }

    // Drawing

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let palette = self.palette;
        let full = frame.size();
        frame.render_widget(
            Block::default().style(Style::default().bg(palette.bg).fg(palette.text)),
            full,
        );

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(full);

        frame.render_widget(
            Paragraph::new(self.header_line()).style(Style::default().bg(palette.panel)),
            layout[0],
        );

        let body = layout[1];
        match self.nav.view().clone() {
            View::Auth => self.draw_auth(frame, body),
            View::Home => self.draw_feed(frame, body),
            View::PostDetail { .. } => self.draw_detail(frame, body),
            View::Profile => self.draw_profile(frame, body),
            View::Subreddits => self.draw_subreddits(frame, body),
            View::Search { .. } => self.draw_search(frame, body),
            View::NewPost => self.draw_new_post(frame, body),
        }

        let status_text = if self.is_busy() {
            format!("{} {}", self.spinner.frame(), self.status_message)
        } else {
            self.status_message.clone()
        };
        let status_color = if self.status_is_error {
            palette.error
        } else {
            palette.text
        };
        frame.render_widget(
            Paragraph::new(status_text).style(
                Style::default()
                    .fg(status_color)
                    .bg(palette.selected_bg)
                    .add_modifier(Modifier::BOLD),
            ),
            layout[2],
        );
        frame.render_widget(
            Paragraph::new(self.footer_text())
                .style(
                    Style::default()
                        .fg(palette.muted)
                        .bg(palette.panel)
                        .add_modifier(Modifier::ITALIC),
                )
                .alignment(Alignment::Center),
            layout[3],
        );

        match self.overlay.clone() {
            Some(Overlay::SortMenu { selected }) => self.draw_sort_menu(frame, body, selected),
            Some(Overlay::Preferences { selected }) => {
                self.draw_preferences(frame, body, selected)
            }
            Some(Overlay::About) => self.draw_about(frame, body),
            Some(Overlay::SearchPrompt { query }) => self.draw_search_prompt(frame, body, &query),
            None => {}
        }
    }

    fn header_line(&self) -> Line<'static> {
        let p = self.palette;
        let mut spans = Vec::new();
        if let Some(button) = self.nav.nav_button() {
            spans.push(Span::styled(
                format!(" {} ", button.label()),
                Style::default()
                    .fg(p.bg)
                    .bg(p.accent)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            " Telex ",
            Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            self.nav.view().title(),
            Style::default().fg(p.text),
        ));
        if self.nav.is_signed_in() {
            spans.push(Span::styled(
                format!(
                    "  ·  {}  ·  Sort: {}",
                    self.nav.feed_label(),
                    self.nav.sort().label()
                ),
                Style::default().fg(p.muted),
            ));
            if let Some(user) = self.nav.current_user() {
                let mut account = format!("  ·  u/{user}");
                if let Some(me) = self.me.as_ref() {
                    account.push_str(&format!(
                        " ({} karma)",
                        format::compact_count(me.total_karma)
                    ));
                }
                spans.push(Span::styled(account, Style::default().fg(p.text)));
            }
        }
        Line::from(spans)
    }

    fn view_block(&self, title: String) -> Block<'static> {
        let p = self.palette;
        Block::default()
            .title(Span::styled(
                title,
                Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(p.selected_bg))
            .style(Style::default().bg(p.panel).fg(p.text))
    }

    fn highlight_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selected_bg)
            .add_modifier(Modifier::BOLD)
    }

    fn draw_auth(&self, frame: &mut Frame<'_>, area: Rect) {
        let p = self.palette;
        let mut lines = vec![
            Line::from(Span::styled(
                "Welcome to Telex",
                Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
            )),
            Line::default(),
            Line::from("A Reddit client for the terminal."),
            Line::default(),
        ];
        if self.auth.in_progress {
            lines.push(Line::from(
                "Waiting for Reddit to redirect back to Telex…",
            ));
            if let Some(link) = self.auth.link.as_ref() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    "Authorization link:",
                    Style::default().fg(p.muted),
                )));
                lines.push(Line::from(Span::styled(
                    link.clone(),
                    Style::default().fg(p.accent),
                )));
            }
            if let Some(paste) = self.auth.paste.as_ref() {
                lines.push(Line::default());
                lines.push(Line::from(vec![
                    Span::styled("Redirect URL: ", Style::default().fg(p.muted)),
                    Span::raw(format!("{paste}▏")),
                ]));
            }
        } else if self.session.is_none() {
            lines.push(Line::from("Press Enter to browse offline sample data."));
        } else {
            lines.push(Line::from(
                "Press Enter to sign in. Your browser will open Reddit's authorization page.",
            ));
        }
        let block = self.view_block(" Sign in ".into());
        frame.render_widget(
            Paragraph::new(lines)
                .block(block)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: false }),
            area,
        );
    }

    fn post_item(&self, post: &reddit::Post, width: usize) -> ListItem<'static> {
        let p = self.palette;
        let score = Span::styled(
            format!("▲ {:>5} ", format::compact_count(post.score)),
            Style::default().fg(p.vote_color(post.likes)),
        );
        let mut title_spans = vec![score];
        if post.stickied {
            title_spans.push(Span::styled("📌 ", Style::default().fg(p.success)));
        }
        if post.over_18 {
            title_spans.push(Span::styled("NSFW ", Style::default().fg(p.error)));
        }
        let title_width = width.saturating_sub(10).max(10);
        let title = textwrap::wrap(&post.title, title_width)
            .into_iter()
            .next()
            .map(|cow| cow.into_owned())
            .unwrap_or_default();
        title_spans.push(Span::styled(
            title,
            Style::default().fg(p.text).add_modifier(Modifier::BOLD),
        ));
        let meta = format!(
            "         {} · u/{} · {} · {}",
            post.subreddit_label(),
            post.author,
            format::submission_time_now(post.created_utc),
            format::plural(post.num_comments, "comment", "comments")
        );
        ListItem::new(vec![
            Line::from(title_spans),
            Line::from(Span::styled(meta, Style::default().fg(p.muted))),
        ])
    }

    fn draw_feed(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.view_block(format!(
            " {} · {} ",
            self.nav.feed_label(),
            self.nav.sort().label()
        ));
        let width = block.inner(area).width as usize;
        if self.feed.is_empty() {
            let message = if self.pending_load.is_some() {
                "Loading…"
            } else {
                "No posts to show."
            };
            frame.render_widget(Paragraph::new(message).block(block), area);
            return;
        }
        let items: Vec<ListItem<'static>> =
            self.feed.iter().map(|post| self.post_item(post, width)).collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(self.highlight_style())
            .highlight_symbol("▌");
        frame.render_stateful_widget(list, area, &mut self.feed_state);
    }

    fn comment_lines(&self, row: &CommentRow, width: usize, selected: bool) -> Vec<Line<'static>> {
        let p = self.palette;
        let indent = " ".repeat(row.indent());
        let color = p.depth_color(row.depth);
        let mut header_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
        if selected {
            header_style = header_style.bg(p.selected_bg);
        }
        let mut lines = vec![Line::from(vec![
            Span::raw(indent.clone()),
            Span::styled(format!("u/{}", row.author), header_style),
            Span::styled(
                format!(
                    " · {} points · {}",
                    row.score,
                    format::submission_time_now(row.created_utc)
                ),
                Style::default().fg(p.vote_color(row.likes)),
            ),
        ])];
        let body_width = width.saturating_sub(row.indent() + 2);
        let style = MarkdownStyle::new(self.config.ui.dark_mode);
        for line in markdown::render(&row.body, body_width, &style) {
            let mut spans = vec![
                Span::raw(indent.clone()),
                Span::styled("│ ", Style::default().fg(color)),
            ];
            spans.extend(line.spans);
            lines.push(Line::from(spans));
        }
        lines.push(Line::default());
        lines
    }

    /// Lines of the post page and the first line of each selectable block.
    fn detail_lines(&self, state: &DetailState, width: usize) -> (Vec<Line<'static>>, Vec<usize>) {
        let p = self.palette;
        let post = &state.detail.post;
        let mut lines = Vec::new();
        let mut anchors = vec![0];

        let mut title_style = Style::default().fg(p.text).add_modifier(Modifier::BOLD);
        if state.selected == 0 {
            title_style = title_style.bg(p.selected_bg);
        }
        for segment in textwrap::wrap(&post.title, width.max(10)) {
            lines.push(Line::from(Span::styled(segment.into_owned(), title_style)));
        }
        lines.push(Line::from(vec![
            Span::styled(
                format!("▲ {} ", format::compact_count(post.score)),
                Style::default().fg(p.vote_color(post.likes)),
            ),
            Span::styled(
                format!(
                    "· {} · u/{} · {}",
                    post.subreddit_label(),
                    post.author,
                    format::submission_time_now(post.created_utc)
                ),
                Style::default().fg(p.muted),
            ),
        ]));
        lines.push(Line::default());
        if !post.is_self && !post.url.is_empty() {
            lines.push(Line::from(Span::styled(
                post.url.clone(),
                Style::default().fg(p.accent),
            )));
            lines.push(Line::default());
        }
        let style = MarkdownStyle::new(self.config.ui.dark_mode);
        let body = markdown::render(&post.selftext, width, &style);
        if !body.is_empty() {
            lines.extend(body);
            lines.push(Line::default());
        }

        let tree = &state.detail.comments;
        lines.push(Line::from(Span::styled(
            format!(
                "── {} ──",
                format::plural(tree.len() as i64, "comment", "comments")
            ),
            Style::default().fg(p.muted),
        )));
        lines.push(Line::default());
        for (index, row) in tree.rows.iter().enumerate() {
            anchors.push(lines.len());
            lines.extend(self.comment_lines(row, width, state.selected == index + 1));
        }
        if tree.more > 0 {
            lines.push(Line::from(Span::styled(
                format!("{} more replies on reddit.com (w)", tree.more),
                Style::default().fg(p.muted),
            )));
        }
        (lines, anchors)
    }

    fn draw_detail(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.view_block(" Post ".into());
        let inner = block.inner(area);
        let Some(state) = self.detail.as_ref() else {
            frame.render_widget(Paragraph::new("Loading…").block(block), area);
            return;
        };
        let (lines, anchors) = self.detail_lines(state, inner.width as usize);
        let anchor = anchors.get(state.selected).copied().unwrap_or(0);
        let scroll = anchor.saturating_sub(1).min(u16::MAX as usize) as u16;
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .block(block)
                .scroll((scroll, 0)),
            area,
        );
    }

    fn draw_profile(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let p = self.palette;
        let block = self.view_block(format!(" u/{} ", self.profile.username));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(2),
                Constraint::Min(0),
            ])
            .split(inner);

        let tabs = Tabs::new(
            ProfileTab::ALL
                .iter()
                .map(|tab| Line::from(tab.label()))
                .collect::<Vec<_>>(),
        )
        .select(self.nav.profile_tab() as usize)
        .style(Style::default().fg(p.muted))
        .highlight_style(Style::default().fg(p.accent).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, chunks[0]);

        let about = match self.profile.about.as_ref() {
            Some(about) => format!(
                "{} karma · {} post · {} comment · joined {}",
                format::compact_count(about.total_karma),
                format::compact_count(about.link_karma),
                format::compact_count(about.comment_karma),
                format::submission_time_now(about.created_utc)
            ),
            None => String::new(),
        };
        frame.render_widget(
            Paragraph::new(about).style(Style::default().fg(p.muted)),
            chunks[1],
        );

        let width = chunks[2].width as usize;
        let items: Vec<ListItem<'static>> = self
            .profile
            .items
            .iter()
            .map(|item| match item {
                reddit::ProfileItem::Post(post) => self.post_item(post, width),
                reddit::ProfileItem::Comment(comment) => {
                    let preview = comment.body.lines().next().unwrap_or_default();
                    let preview = textwrap::wrap(preview, width.saturating_sub(4).max(10))
                        .into_iter()
                        .next()
                        .map(|cow| cow.into_owned())
                        .unwrap_or_default();
                    ListItem::new(vec![
                        Line::from(Span::styled(
                            format!(
                                "  {} · {} · {} points",
                                comment.subreddit_name_prefixed,
                                comment.link_title,
                                comment.score
                            ),
                            Style::default().fg(p.muted),
                        )),
                        Line::from(Span::styled(
                            format!("  {preview}"),
                            Style::default().fg(p.text),
                        )),
                    ])
                }
            })
            .collect();
        if items.is_empty() {
            let message = if self.pending_load.is_some() {
                "Loading…"
            } else {
                "Nothing here yet."
            };
            frame.render_widget(Paragraph::new(message), chunks[2]);
            return;
        }
        let list = List::new(items)
            .highlight_style(self.highlight_style())
            .highlight_symbol("▌");
        frame.render_stateful_widget(list, chunks[2], &mut self.profile.list);
    }

    fn subreddit_item(&self, sub: &reddit::Subreddit) -> ListItem<'static> {
        let p = self.palette;
        let mut head = vec![Span::styled(
            sub.display_name_prefixed.clone(),
            Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
        )];
        if sub.over_18 {
            head.push(Span::styled(" NSFW", Style::default().fg(p.error)));
        }
        head.push(Span::styled(
            format!(
                "  {} · {} members",
                sub.title,
                format::compact_count(sub.subscribers)
            ),
            Style::default().fg(p.muted),
        ));
        ListItem::new(Line::from(head))
    }

    fn draw_subreddits(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let p = self.palette;
        let block = self.view_block(" Subscribed subreddits ".into());
        let inner = block.inner(area);
        frame.render_widget(block, area);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(0)])
            .split(inner);

        let cursor = if self.filter_editing { "▏" } else { "" };
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled("Filter: ", Style::default().fg(p.muted)),
                Span::raw(format!("{}{cursor}", self.subreddit_filter)),
            ])),
            chunks[0],
        );

        let items: Vec<ListItem<'static>> = self
            .visible_subreddits()
            .into_iter()
            .map(|sub| self.subreddit_item(sub))
            .collect();
        if items.is_empty() {
            frame.render_widget(Paragraph::new("No matching subreddits."), chunks[1]);
            return;
        }
        let list = List::new(items)
            .highlight_style(self.highlight_style())
            .highlight_symbol("▌");
        frame.render_stateful_widget(list, chunks[1], &mut self.subreddit_state);
    }

    fn draw_search(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let p = self.palette;
        let block = self.view_block(format!(" {} ", self.nav.view().title()));
        let items: Vec<ListItem<'static>> = self
            .search_entries()
            .into_iter()
            .map(|entry| match entry {
                SearchEntry::Subreddit(sub) => self.subreddit_item(sub),
                SearchEntry::User(user) => ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("u/{}", user.name),
                        Style::default().fg(p.text).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!(
                            "  {} karma",
                            format::compact_count(user.link_karma + user.comment_karma)
                        ),
                        Style::default().fg(p.muted),
                    ),
                ])),
            })
            .collect();
        if items.is_empty() {
            let message = if self.pending_load.is_some() {
                "Searching…"
            } else {
                "No results."
            };
            frame.render_widget(Paragraph::new(message).block(block), area);
            return;
        }
        let list = List::new(items)
            .block(block)
            .highlight_style(self.highlight_style())
            .highlight_symbol("▌");
        frame.render_stateful_widget(list, area, &mut self.search_state);
    }

    fn draw_new_post(&self, frame: &mut Frame<'_>, area: Rect) {
        let p = self.palette;
        let block = self.view_block(" Create a post ".into());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(0)])
            .split(inner);
        let tab_index = DraftTab::ALL
            .iter()
            .position(|tab| *tab == self.draft.tab())
            .unwrap_or(0);
        let tabs = Tabs::new(
            DraftTab::ALL
                .iter()
                .map(|tab| Line::from(tab.label()))
                .collect::<Vec<_>>(),
        )
        .select(tab_index)
        .style(Style::default().fg(p.muted))
        .highlight_style(Style::default().fg(p.accent).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, chunks[0]);

        let mut lines = Vec::new();
        for field in self.draft.fields() {
            let focused = *field == self.draft.focus();
            let label_style = if focused {
                Style::default().fg(p.accent).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(p.muted)
            };
            let mut label = field.label().to_string();
            if *field == DraftField::Title {
                label.push_str(&format!(
                    " ({}/{})",
                    self.draft.title().chars().count(),
                    crate::compose::MAX_TITLE_CHARS
                ));
            }
            lines.push(Line::from(Span::styled(label, label_style)));
            let value = self.draft.value(*field);
            let cursor = if focused { "▏" } else { "" };
            let value_lines: Vec<&str> = value.split('\n').collect();
            let last = value_lines.len() - 1;
            for (i, text) in value_lines.into_iter().enumerate() {
                let suffix = if i == last { cursor } else { "" };
                lines.push(Line::from(format!("  {text}{suffix}")));
            }
            if *field == DraftField::Attachment {
                for path in self.draft.attachments() {
                    lines.push(Line::from(Span::styled(
                        format!("  📎 {}", path.display()),
                        Style::default().fg(p.success),
                    )));
                }
            }
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            format!(
                "NSFW: {}",
                if self.draft.nsfw { "yes" } else { "no" }
            ),
            Style::default().fg(p.muted),
        )));
        frame.render_widget(
            Paragraph::new(lines).wrap(Wrap { trim: false }),
            chunks[1],
        );
    }

    fn popup_block(&self, title: &str) -> Block<'static> {
        let p = self.palette;
        Block::default()
            .title(Span::styled(
                format!(" {title} "),
                Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(p.accent))
            .style(Style::default().bg(p.panel).fg(p.text))
    }

    fn draw_sort_menu(&self, frame: &mut Frame<'_>, area: Rect, selected: usize) {
        let popup = centered_rect(30, 50, area);
        frame.render_widget(Clear, popup);
        let current = self.nav.sort();
        let lines: Vec<Line<'static>> = SortOption::ALL
            .iter()
            .enumerate()
            .map(|(i, sort)| {
                let marker = if *sort == current { "●" } else { "○" };
                let mut style = Style::default().fg(self.palette.text);
                if i == selected {
                    style = self.highlight_style().fg(self.palette.accent);
                }
                Line::from(Span::styled(
                    format!(" {} {} {}", i + 1, marker, sort.label()),
                    style,
                ))
            })
            .collect();
        frame.render_widget(
            Paragraph::new(lines).block(self.popup_block("Sort by")),
            popup,
        );
    }

    fn draw_preferences(&self, frame: &mut Frame<'_>, area: Rect, selected: usize) {
        let popup = centered_rect(40, 40, area);
        frame.render_widget(Clear, popup);
        let values = [self.config.ui.dark_mode, self.config.feed.show_nsfw];
        let lines: Vec<Line<'static>> = PREFERENCE_ITEMS
            .iter()
            .zip(values)
            .enumerate()
            .map(|(i, (label, on))| {
                let mut style = Style::default().fg(self.palette.text);
                if i == selected {
                    style = self.highlight_style().fg(self.palette.accent);
                }
                Line::from(Span::styled(
                    format!(" [{}] {}", if on { "x" } else { " " }, label),
                    style,
                ))
            })
            .collect();
        frame.render_widget(
            Paragraph::new(lines).block(self.popup_block("Preferences")),
            popup,
        );
    }

    fn draw_about(&self, frame: &mut Frame<'_>, area: Rect) {
        let popup = centered_rect(60, 60, area);
        frame.render_widget(Clear, popup);
        let p = self.palette;
        let lines = vec![
            Line::from(Span::styled(
                format!("Telex {}", crate::VERSION),
                Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
            )),
            Line::from("A Reddit client for the terminal."),
            Line::default(),
            Line::from(format!("Website: {HOMEPAGE_URL}")),
            Line::from(format!("Source:  {REPOSITORY_URL}")),
            Line::from("License: GPL-3.0-or-later"),
            Line::default(),
            Line::from(Span::styled(
                "j/k move · Enter open · Esc back · s sort · r reload · / search",
                Style::default().fg(p.muted),
            )),
            Line::from(Span::styled(
                "p profile · g subreddits · n new post · u/d vote · o preferences · L log out",
                Style::default().fg(p.muted),
            )),
        ];
        frame.render_widget(
            Paragraph::new(lines)
                .block(self.popup_block("About"))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            popup,
        );
    }

    fn draw_search_prompt(&self, frame: &mut Frame<'_>, area: Rect, query: &str) {
        let popup = centered_rect(60, 20, area);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(format!("{query}▏")).block(self.popup_block("Search subreddits and users")),
            popup,
        );
    }

    fn footer_text(&self) -> String {
        if let Some(overlay) = self.overlay.as_ref() {
            return match overlay {
                Overlay::SortMenu { .. } => "j/k choose · 1-5 pick · Enter apply · Esc close",
                Overlay::Preferences { .. } => "j/k choose · Space toggle · Esc close",
                Overlay::About => "Any key closes",
                Overlay::SearchPrompt { .. } => "Type a query · Enter search · Esc cancel",
            }
            .to_string();
        }
        if self.auth.paste.is_some() {
            return "Paste the redirect URL · Enter submit · Esc cancel".into();
        }
        if self.filter_editing {
            return "Type to filter · Enter/Esc done".into();
        }
        let hints: &[&str] = match self.nav.view() {
            View::Auth if self.auth.in_progress => {
                &["c copy link", "p paste redirect", "Esc cancel", "q quit"]
            }
            View::Auth => &["Enter sign in", "o preferences", "? about", "q quit"],
            View::Home => &[
                "j/k move",
                "Enter open",
                "u/d vote",
                "s sort",
                "r reload",
                "/ search",
                "g subreddits",
                "p profile",
                "n new post",
                "c front page",
                "? about",
                "q quit",
            ],
            View::PostDetail { .. } => &[
                "j/k move",
                "u/d vote",
                "w open in browser",
                "s sort",
                "r reload",
                "Esc back",
                "q quit",
            ],
            View::Profile => &[
                "h/l tabs",
                "j/k move",
                "Enter open",
                "u/d vote",
                "r reload",
                "Esc home",
            ],
            View::Subreddits => &["j/k move", "Enter open", "/ filter", "r reload", "Esc home"],
            View::Search { .. } => &["j/k move", "Enter open", "/ new search", "Esc home"],
            View::NewPost => &[
                "Tab next field",
                "Ctrl+←/→ tab",
                "Ctrl+X NSFW",
                "Ctrl+S submit",
                "Esc home",
            ],
        };
        hints.join(" · ")
    }
}
