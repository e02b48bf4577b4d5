use std::sync::Arc;

use anyhow::{Context, Result};

use crate::comments::{self, CommentTree};
use crate::nav::ProfileTab;
use crate::reddit::{self, ListingOptions, SortOption};

const PAGE_SIZE: u32 = 50;

pub trait FeedService: Send + Sync {
    fn load_feed(&self, subreddit: Option<&str>, sort: SortOption) -> Result<Vec<reddit::Post>>;
}

pub trait PostService: Send + Sync {
    fn load_post(&self, post_id: &str, sort: SortOption) -> Result<PostDetail>;
}

pub trait ProfileService: Send + Sync {
    fn load_me(&self) -> Result<reddit::UserDetails>;
    fn load_profile(&self, username: &str) -> Result<reddit::UserProfile>;
    fn load_section(&self, username: &str, tab: ProfileTab) -> Result<Vec<reddit::ProfileItem>>;
}

pub trait SubredditService: Send + Sync {
    fn subscribed(&self) -> Result<Vec<reddit::Subreddit>>;
    fn search_subreddits(&self, query: &str) -> Result<Vec<reddit::Subreddit>>;
    fn search_users(&self, query: &str) -> Result<Vec<reddit::UserSummary>>;
}

pub trait InteractionService: Send + Sync {
    fn vote(&self, fullname: &str, dir: i32) -> Result<()>;
}

pub trait SubmissionService: Send + Sync {
    fn submit(&self, submission: &reddit::Submission) -> Result<reddit::SubmittedPost>;
}

/// A post with its comments already flattened for display.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: reddit::Post,
    pub comments: CommentTree,
}

/// The full set of services the UI talks to.
#[derive(Clone)]
pub struct Services {
    pub feed: Arc<dyn FeedService>,
    pub posts: Arc<dyn PostService>,
    pub profiles: Arc<dyn ProfileService>,
    pub subreddits: Arc<dyn SubredditService>,
    pub interactions: Arc<dyn InteractionService>,
    pub submissions: Arc<dyn SubmissionService>,
}

impl Services {
    pub fn reddit(client: Arc<reddit::Client>) -> Self {
        let service = Arc::new(RedditService::new(client));
        Self {
            feed: service.clone(),
            posts: service.clone(),
            profiles: service.clone(),
            subreddits: service.clone(),
            interactions: service.clone(),
            submissions: service,
        }
    }

    pub fn mock() -> Self {
        let service = Arc::new(MockService::default());
        Self {
            feed: service.clone(),
            posts: service.clone(),
            profiles: service.clone(),
            subreddits: service.clone(),
            interactions: service.clone(),
            submissions: service,
        }
    }
}

pub struct RedditService {
    client: Arc<reddit::Client>,
}

impl RedditService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

fn page() -> ListingOptions {
    ListingOptions {
        limit: Some(PAGE_SIZE),
        ..ListingOptions::default()
    }
}

/// Comment listings only know a subset of the post sorts.
pub fn comment_sort(sort: SortOption) -> &'static str {
    match sort {
        SortOption::New => "new",
        SortOption::Top => "top",
        SortOption::Best | SortOption::Hot | SortOption::Rising => "confidence",
    }
}

impl FeedService for RedditService {
    fn load_feed(&self, subreddit: Option<&str>, sort: SortOption) -> Result<Vec<reddit::Post>> {
        let listing = self
            .client
            .listing(subreddit, sort, page())
            .context("fetch feed")?;
        Ok(listing.into_items())
    }
}

impl PostService for RedditService {
    fn load_post(&self, post_id: &str, sort: SortOption) -> Result<PostDetail> {
        let mut opts = ListingOptions::default();
        opts.extra
            .push(("sort".into(), comment_sort(sort).to_string()));
        let payload = self
            .client
            .post_with_comments(post_id, opts)
            .context("fetch post")?;
        Ok(PostDetail {
            post: payload.post,
            comments: comments::flatten(&payload.comments),
        })
    }
}

impl ProfileService for RedditService {
    fn load_me(&self) -> Result<reddit::UserDetails> {
        self.client.me().context("fetch identity")
    }

    fn load_profile(&self, username: &str) -> Result<reddit::UserProfile> {
        self.client.user_about(username).context("fetch profile")
    }

    fn load_section(&self, username: &str, tab: ProfileTab) -> Result<Vec<reddit::ProfileItem>> {
        let listing = self
            .client
            .user_section(username, tab.section(), page())
            .with_context(|| format!("fetch profile {}", tab.label().to_lowercase()))?;
        Ok(listing.into_items())
    }
}

impl SubredditService for RedditService {
    fn subscribed(&self) -> Result<Vec<reddit::Subreddit>> {
        let mut opts = page();
        opts.limit = Some(100);
        let listing = self
            .client
            .subscribed_subreddits(opts)
            .context("fetch subscriptions")?;
        Ok(listing.into_items())
    }

    fn search_subreddits(&self, query: &str) -> Result<Vec<reddit::Subreddit>> {
        let listing = self
            .client
            .search_subreddits(query, page())
            .context("search subreddits")?;
        Ok(listing.into_items())
    }

    fn search_users(&self, query: &str) -> Result<Vec<reddit::UserSummary>> {
        let listing = self
            .client
            .search_users(query, page())
            .context("search users")?;
        Ok(listing.into_items())
    }
}

impl InteractionService for RedditService {
    fn vote(&self, fullname: &str, dir: i32) -> Result<()> {
        self.client.vote(fullname, dir).context("vote")
    }
}

impl SubmissionService for RedditService {
    fn submit(&self, submission: &reddit::Submission) -> Result<reddit::SubmittedPost> {
        self.client.submit(submission).context("submit post")
    }
}

/// Items that can be flagged as adult content.
pub trait Nsfw {
    fn is_nsfw(&self) -> bool;
}

impl Nsfw for reddit::Post {
    fn is_nsfw(&self) -> bool {
        self.over_18
    }
}

impl Nsfw for reddit::Subreddit {
    fn is_nsfw(&self) -> bool {
        self.over_18
    }
}

impl Nsfw for reddit::ProfileItem {
    fn is_nsfw(&self) -> bool {
        match self {
            reddit::ProfileItem::Post(post) => post.over_18,
            reddit::ProfileItem::Comment(_) => false,
        }
    }
}

pub fn filter_nsfw<T: Nsfw>(items: Vec<T>, show_nsfw: bool) -> Vec<T> {
    if show_nsfw {
        return items;
    }
    items.into_iter().filter(|item| !item.is_nsfw()).collect()
}

/// Case-insensitive substring match over the title or the prefixed name.
/// An empty query keeps everything.
pub fn filter_subreddits<'a>(
    subreddits: &'a [reddit::Subreddit],
    query: &str,
) -> Vec<&'a reddit::Subreddit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return subreddits.iter().collect();
    }
    subreddits
        .iter()
        .filter(|sub| {
            sub.title.to_lowercase().contains(&needle)
                || sub.display_name_prefixed.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Canned data for running without a network and for tests.
#[derive(Default)]
pub struct MockService {
    votes: parking_lot::Mutex<Vec<(String, i32)>>,
    submissions: parking_lot::Mutex<Vec<reddit::Submission>>,
}

impl MockService {
    pub fn votes(&self) -> Vec<(String, i32)> {
        self.votes.lock().clone()
    }

    pub fn submissions(&self) -> Vec<reddit::Submission> {
        self.submissions.lock().clone()
    }
}

fn mock_post(id: &str, title: &str, subreddit: &str) -> reddit::Post {
    reddit::Post {
        id: id.into(),
        name: format!("t3_{id}"),
        title: title.into(),
        subreddit: subreddit.into(),
        subreddit_name_prefixed: format!("r/{subreddit}"),
        author: "telex".into(),
        selftext: "Sample content for offline browsing.".into(),
        permalink: format!("/r/{subreddit}/comments/{id}/"),
        score: 1234,
        num_comments: 2,
        is_self: true,
        ..reddit::Post::default()
    }
}

impl FeedService for MockService {
    fn load_feed(&self, subreddit: Option<&str>, sort: SortOption) -> Result<Vec<reddit::Post>> {
        let sub = subreddit.map(reddit::normalize_subreddit).unwrap_or("telex");
        Ok(vec![
            mock_post("welcome", &format!("Welcome to Telex ({})", sort.label()), sub),
            mock_post("second", "A second post", sub),
        ])
    }
}

impl PostService for MockService {
    fn load_post(&self, post_id: &str, _sort: SortOption) -> Result<PostDetail> {
        let comments = serde_json::json!([
            {
                "kind": "t1",
                "data": {
                    "name": "t1_a",
                    "author": "ferris",
                    "body": "First!",
                    "score": 3,
                    "replies": {
                        "kind": "Listing",
                        "data": { "children": [
                            { "kind": "t1", "data": { "name": "t1_b", "author": "crab", "body": "A reply", "score": 1, "replies": "" } }
                        ] }
                    }
                }
            }
        ]);
        let children = comments.as_array().cloned().unwrap_or_default();
        Ok(PostDetail {
            post: mock_post(post_id.trim_start_matches("t3_"), "Mock post", "telex"),
            comments: comments::flatten(&children),
        })
    }
}

impl ProfileService for MockService {
    fn load_me(&self) -> Result<reddit::UserDetails> {
        Ok(reddit::UserDetails {
            id: "mock".into(),
            name: "ferris".into(),
            total_karma: 4321,
            link_karma: 4000,
            comment_karma: 321,
            ..reddit::UserDetails::default()
        })
    }

    fn load_profile(&self, username: &str) -> Result<reddit::UserProfile> {
        Ok(reddit::UserProfile {
            name: username.into(),
            total_karma: 4321,
            link_karma: 4000,
            comment_karma: 321,
            ..reddit::UserProfile::default()
        })
    }

    fn load_section(&self, _username: &str, tab: ProfileTab) -> Result<Vec<reddit::ProfileItem>> {
        let post = mock_post("mine", &format!("{} post", tab.label()), "telex");
        Ok(vec![reddit::ProfileItem::Post(post)])
    }
}

impl SubredditService for MockService {
    fn subscribed(&self) -> Result<Vec<reddit::Subreddit>> {
        Ok(["rust", "linux", "programming"]
            .iter()
            .map(|name| reddit::Subreddit {
                display_name: name.to_string(),
                display_name_prefixed: format!("r/{name}"),
                title: format!("The {name} community"),
                subscribers: 1000,
                ..reddit::Subreddit::default()
            })
            .collect())
    }

    fn search_subreddits(&self, query: &str) -> Result<Vec<reddit::Subreddit>> {
        let subs = self.subscribed()?;
        Ok(filter_subreddits(&subs, query).into_iter().cloned().collect())
    }

    fn search_users(&self, query: &str) -> Result<Vec<reddit::UserSummary>> {
        Ok(vec![reddit::UserSummary {
            name: query.trim().to_string(),
            link_karma: 10,
            comment_karma: 20,
        }])
    }
}

impl InteractionService for MockService {
    fn vote(&self, fullname: &str, dir: i32) -> Result<()> {
        self.votes.lock().push((fullname.to_string(), dir));
        Ok(())
    }
}

impl SubmissionService for MockService {
    fn submit(&self, submission: &reddit::Submission) -> Result<reddit::SubmittedPost> {
        self.submissions.lock().push(submission.clone());
        Ok(reddit::SubmittedPost {
            id: "new".into(),
            name: "t3_new".into(),
            url: format!("https://www.reddit.com/r/{}/comments/new/", submission.subreddit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(name: &str, title: &str, over_18: bool) -> reddit::Subreddit {
        reddit::Subreddit {
            display_name: name.into(),
            display_name_prefixed: format!("r/{name}"),
            title: title.into(),
            over_18,
            ..reddit::Subreddit::default()
        }
    }

    #[test]
    fn subreddit_filter_matches_title_or_name() {
        let subs = vec![
            sub("rust", "The Rust Programming Language", false),
            sub("linux", "Linux news", false),
            sub("golang", "Go", false),
        ];
        let names = |query: &str| -> Vec<String> {
            filter_subreddits(&subs, query)
                .into_iter()
                .map(|s| s.display_name.clone())
                .collect()
        };
        assert_eq!(names("PROGRAMMING"), vec!["rust"]);
        assert_eq!(names("r/lin"), vec!["linux"]);
        assert_eq!(names("  ").len(), 3);
        assert!(names("haskell").is_empty());
    }

    #[test]
    fn nsfw_items_are_hidden_unless_enabled() {
        let subs = vec![sub("safe", "Safe", false), sub("adult", "Adult", true)];
        assert_eq!(filter_nsfw(subs.clone(), true).len(), 2);
        let visible = filter_nsfw(subs, false);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].display_name, "safe");

        let mut post = mock_post("x", "x", "x");
        post.over_18 = true;
        assert!(filter_nsfw(vec![post], false).is_empty());
    }

    #[test]
    fn comment_sort_falls_back_to_confidence() {
        assert_eq!(comment_sort(SortOption::Best), "confidence");
        assert_eq!(comment_sort(SortOption::Rising), "confidence");
        assert_eq!(comment_sort(SortOption::New), "new");
        assert_eq!(comment_sort(SortOption::Top), "top");
    }

    #[test]
    fn mock_post_detail_is_flattened() {
        let services = Services::mock();
        let detail = services.posts.load_post("t3_abc", SortOption::Best).unwrap();
        assert_eq!(detail.post.id, "abc");
        assert_eq!(detail.comments.len(), 2);
        assert_eq!(detail.comments.rows[1].depth, 1);
    }

    #[test]
    fn mock_records_interactions() {
        let mock = MockService::default();
        mock.vote("t3_abc", 1).unwrap();
        assert_eq!(mock.votes(), vec![("t3_abc".to_string(), 1)]);
        let submission = reddit::Submission {
            subreddit: "rust".into(),
            title: "t".into(),
            kind: reddit::SubmissionKind::Text { body: String::new() },
            nsfw: false,
        };
        mock.submit(&submission).unwrap();
        assert_eq!(mock.submissions().len(), 1);
    }
}
