//! Which view is current, what the header shows, and the sort/subreddit
//! selection the feed loads with.

use tracing::debug;

use crate::reddit::{self, SortOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProfileTab {
    #[default]
    Overview,
    Posts,
    Comments,
    Upvoted,
    Downvoted,
}

impl ProfileTab {
    pub const ALL: [ProfileTab; 5] = [
        ProfileTab::Overview,
        ProfileTab::Posts,
        ProfileTab::Comments,
        ProfileTab::Upvoted,
        ProfileTab::Downvoted,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProfileTab::Overview => "Overview",
            ProfileTab::Posts => "Posts",
            ProfileTab::Comments => "Comments",
            ProfileTab::Upvoted => "Upvoted",
            ProfileTab::Downvoted => "Downvoted",
        }
    }

    pub fn section(&self) -> reddit::ProfileSection {
        match self {
            ProfileTab::Overview => reddit::ProfileSection::Overview,
            ProfileTab::Posts => reddit::ProfileSection::Submitted,
            ProfileTab::Comments => reddit::ProfileSection::Comments,
            ProfileTab::Upvoted => reddit::ProfileSection::Upvoted,
            ProfileTab::Downvoted => reddit::ProfileSection::Downvoted,
        }
    }

    pub fn shift(&self, delta: i32) -> ProfileTab {
        let len = Self::ALL.len() as i32;
        let idx = Self::ALL.iter().position(|t| t == self).unwrap_or(0) as i32;
        Self::ALL[(idx + delta).rem_euclid(len) as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Auth,
    Home,
    PostDetail {
        post_id: String,
    },
    Profile,
    Subreddits,
    Search {
        query: String,
    },
    NewPost,
}

impl View {
    pub fn title(&self) -> String {
        match self {
            View::Auth => "Sign in".into(),
            View::Home => "Home".into(),
            View::PostDetail { .. } => "Post".into(),
            View::Profile => "Profile".into(),
            View::Subreddits => "Subreddits".into(),
            View::Search { query } => format!("Search: {query}"),
            View::NewPost => "New Post".into(),
        }
    }
}

/// The single navigation affordance the header may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavButton {
    Back,
    Home,
}

impl NavButton {
    pub fn label(&self) -> &'static str {
        match self {
            NavButton::Back => "← Back",
            NavButton::Home => "⌂ Home",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    view: View,
    sort: SortOption,
    nav_button: Option<NavButton>,
    current_user: Option<String>,
    current_subreddit: Option<String>,
    profile_tab: ProfileTab,
    previous_profile_tab: Option<ProfileTab>,
}

impl Navigator {
    pub fn new(sort: SortOption) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn sort(&self) -> SortOption {
        self.sort
    }

    pub fn nav_button(&self) -> Option<NavButton> {
        self.nav_button
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    pub fn current_subreddit(&self) -> Option<&str> {
        self.current_subreddit.as_deref()
    }

    pub fn profile_tab(&self) -> ProfileTab {
        self.profile_tab
    }

    pub fn previous_profile_tab(&self) -> Option<ProfileTab> {
        self.previous_profile_tab
    }

    pub fn is_signed_in(&self) -> bool {
        !matches!(self.view, View::Auth)
    }

    /// Header label for the feed: the selected subreddit or the front page.
    pub fn feed_label(&self) -> String {
        match &self.current_subreddit {
            Some(name) => format!("r/{name}"),
            None => "Front page".into(),
        }
    }

    pub fn sign_in(&mut self) {
        self.view = View::Home;
        self.nav_button = None;
    }

    pub fn set_current_user(&mut self, user: impl Into<String>) {
        self.current_user = Some(user.into());
    }

    pub fn sign_out(&mut self) {
        let sort = self.sort;
        *self = Self::new(sort);
    }

    pub fn open_post(&mut self, post_id: impl Into<String>) {
        self.view = View::PostDetail {
            post_id: post_id.into(),
        };
        if self.nav_button.is_none() {
            self.nav_button = Some(NavButton::Back);
        }
    }

    pub fn open_profile(&mut self) {
        self.view = View::Profile;
        self.nav_button = Some(NavButton::Home);
    }

    pub fn open_subreddits(&mut self) {
        self.view = View::Subreddits;
        self.nav_button = Some(NavButton::Home);
    }

    pub fn open_search(&mut self, query: impl Into<String>) {
        self.view = View::Search {
            query: query.into(),
        };
        self.nav_button = Some(NavButton::Home);
    }

    pub fn open_new_post(&mut self) {
        self.view = View::NewPost;
        self.nav_button = Some(NavButton::Home);
    }

    /// Removes the header button and returns to the feed.
    pub fn go_home(&mut self) {
        self.view = View::Home;
        self.nav_button = None;
    }

    pub fn select_profile_tab(&mut self, tab: ProfileTab) -> bool {
        if tab == self.profile_tab {
            return false;
        }
        self.previous_profile_tab = Some(self.profile_tab);
        self.profile_tab = tab;
        true
    }

    pub fn select_subreddit(&mut self, name: &str) {
        let name = reddit::normalize_subreddit(name);
        self.current_subreddit = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        debug!(subreddit = ?self.current_subreddit, "subreddit selected");
        self.go_home();
    }

    pub fn clear_subreddit(&mut self) {
        self.current_subreddit = None;
    }

    /// Applies a new sort and reports which view has to be re-rendered, or
    /// `None` when the sort did not change.
    pub fn set_sort(&mut self, sort: SortOption) -> Option<View> {
        if sort == self.sort {
            return None;
        }
        self.sort = sort;
        Some(self.reload_target())
    }

    pub fn reload_target(&self) -> View {
        self.view.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_in() -> Navigator {
        let mut nav = Navigator::new(SortOption::Best);
        nav.sign_in();
        nav.set_current_user("ferris");
        nav
    }

    #[test]
    fn starts_on_auth_with_default_sort() {
        let nav = Navigator::default();
        assert_eq!(nav.view(), &View::Auth);
        assert_eq!(nav.sort(), SortOption::Best);
        assert!(!nav.is_signed_in());
        assert!(nav.nav_button().is_none());
    }

    #[test]
    fn opening_a_post_inserts_back_once() {
        let mut nav = signed_in();
        nav.open_post("abc");
        assert_eq!(nav.nav_button(), Some(NavButton::Back));
        nav.open_post("def");
        assert_eq!(nav.nav_button(), Some(NavButton::Back));
        assert_eq!(
            nav.view(),
            &View::PostDetail {
                post_id: "def".into()
            }
        );
    }

    #[test]
    fn post_from_profile_keeps_home_button() {
        let mut nav = signed_in();
        nav.open_profile();
        nav.open_post("abc");
        assert_eq!(nav.nav_button(), Some(NavButton::Home));
    }

    #[test]
    fn go_home_clears_nav_button() {
        let mut nav = signed_in();
        nav.open_subreddits();
        assert_eq!(nav.nav_button(), Some(NavButton::Home));
        nav.go_home();
        assert_eq!(nav.view(), &View::Home);
        assert!(nav.nav_button().is_none());
    }

    #[test]
    fn sort_change_reloads_current_view() {
        let mut nav = signed_in();
        assert_eq!(nav.set_sort(SortOption::Best), None);
        assert_eq!(nav.set_sort(SortOption::Top), Some(View::Home));
        nav.open_post("abc");
        assert_eq!(
            nav.set_sort(SortOption::New),
            Some(View::PostDetail {
                post_id: "abc".into()
            })
        );
        assert_eq!(nav.sort(), SortOption::New);
    }

    #[test]
    fn selecting_subreddit_returns_home() {
        let mut nav = signed_in();
        nav.open_subreddits();
        nav.select_subreddit("r/rust");
        assert_eq!(nav.current_subreddit(), Some("rust"));
        assert_eq!(nav.feed_label(), "r/rust");
        assert_eq!(nav.view(), &View::Home);
        assert!(nav.nav_button().is_none());
        nav.select_subreddit("  ");
        assert_eq!(nav.current_subreddit(), None);
    }

    #[test]
    fn profile_tab_tracks_previous() {
        let mut nav = signed_in();
        nav.open_profile();
        assert!(!nav.select_profile_tab(ProfileTab::Overview));
        assert!(nav.select_profile_tab(ProfileTab::Upvoted));
        assert_eq!(nav.previous_profile_tab(), Some(ProfileTab::Overview));
        assert_eq!(nav.profile_tab().shift(1), ProfileTab::Downvoted);
        assert_eq!(ProfileTab::Overview.shift(-1), ProfileTab::Downvoted);
    }

    #[test]
    fn sign_out_resets_everything_but_sort() {
        let mut nav = signed_in();
        nav.set_sort(SortOption::Rising);
        nav.select_subreddit("rust");
        nav.open_post("abc");
        nav.sign_out();
        assert_eq!(nav.view(), &View::Auth);
        assert_eq!(nav.current_user(), None);
        assert_eq!(nav.current_subreddit(), None);
        assert!(nav.nav_button().is_none());
        assert_eq!(nav.sort(), SortOption::Rising);
    }
}
