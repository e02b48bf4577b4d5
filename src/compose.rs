use std::path::{Path, PathBuf};

use url::Url;

use crate::reddit::{Submission, SubmissionKind};

pub const MAX_TITLE_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DraftTab {
    #[default]
    Text,
    Images,
    Link,
}

impl DraftTab {
    pub const ALL: [DraftTab; 3] = [DraftTab::Text, DraftTab::Images, DraftTab::Link];

    pub fn label(&self) -> &'static str {
        match self {
            DraftTab::Text => "Text",
            DraftTab::Images => "Images",
            DraftTab::Link => "Link",
        }
    }

    pub fn shift(&self, delta: i32) -> DraftTab {
        let len = Self::ALL.len() as i32;
        let idx = Self::ALL.iter().position(|t| t == self).unwrap_or(0) as i32;
        Self::ALL[(idx + delta).rem_euclid(len) as usize]
    }

    fn fields(&self) -> &'static [DraftField] {
        match self {
            DraftTab::Text => &[DraftField::Subreddit, DraftField::Title, DraftField::Body],
            DraftTab::Images => &[
                DraftField::Subreddit,
                DraftField::Title,
                DraftField::Attachment,
            ],
            DraftTab::Link => &[DraftField::Subreddit, DraftField::Title, DraftField::Url],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Subreddit,
    Title,
    Body,
    Url,
    Attachment,
}

impl DraftField {
    pub fn label(&self) -> &'static str {
        match self {
            DraftField::Subreddit => "Subreddit *",
            DraftField::Title => "Title *",
            DraftField::Body => "Body text (optional)",
            DraftField::Url => "Link URL *",
            DraftField::Attachment => "Add file (Enter)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("a subreddit is required")]
    MissingSubreddit,
    #[error("a title is required")]
    MissingTitle,
    #[error("titles are limited to {MAX_TITLE_CHARS} characters")]
    TitleTooLong,
    #[error("a link URL is required")]
    MissingUrl,
    #[error("link URL must be an http or https address")]
    InvalidUrl,
    #[error("attach at least one image")]
    MissingAttachment,
    #[error("file not found: {0}")]
    AttachmentNotFound(String),
    #[error("image posts cannot be submitted from the terminal yet")]
    ImagesUnsupported,
}

/// State of the new-post form across its three tabs. Every tab shares the
/// subreddit and title.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    tab: DraftTab,
    focus_index: usize,
    pub subreddit: String,
    title: String,
    pub body: String,
    pub url: String,
    pub attachment_input: String,
    attachments: Vec<PathBuf>,
    pub nsfw: bool,
}

impl Draft {
    pub fn new(subreddit: Option<&str>) -> Self {
        Self {
            subreddit: subreddit.unwrap_or_default().to_string(),
            ..Self::default()
        }
    }

    pub fn tab(&self) -> DraftTab {
        self.tab
    }

    pub fn set_tab(&mut self, tab: DraftTab) {
        self.tab = tab;
        self.focus_index = self.focus_index.min(tab.fields().len() - 1);
    }

    pub fn fields(&self) -> &'static [DraftField] {
        self.tab.fields()
    }

    pub fn focus(&self) -> DraftField {
        self.tab.fields()[self.focus_index]
    }

    pub fn focus_next(&mut self) {
        self.focus_index = (self.focus_index + 1) % self.tab.fields().len();
    }

    pub fn focus_previous(&mut self) {
        let len = self.tab.fields().len();
        self.focus_index = (self.focus_index + len - 1) % len;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    pub fn value(&self, field: DraftField) -> &str {
        match field {
            DraftField::Subreddit => &self.subreddit,
            DraftField::Title => &self.title,
            DraftField::Body => &self.body,
            DraftField::Url => &self.url,
            DraftField::Attachment => &self.attachment_input,
        }
    }

    /// Appends to the focused field. Returns false when the character was
    /// refused because the title is full.
    pub fn insert_char(&mut self, ch: char) -> bool {
        match self.focus() {
            DraftField::Title => {
                if ch == '\n' || self.title.chars().count() >= MAX_TITLE_CHARS {
                    return false;
                }
                self.title.push(ch);
            }
            DraftField::Subreddit => {
                if ch.is_whitespace() {
                    return false;
                }
                self.subreddit.push(ch);
            }
            DraftField::Body => self.body.push(ch),
            DraftField::Url => {
                if ch.is_whitespace() {
                    return false;
                }
                self.url.push(ch);
            }
            DraftField::Attachment => self.attachment_input.push(ch),
        }
        true
    }

    pub fn backspace(&mut self) {
        let target = match self.focus() {
            DraftField::Subreddit => &mut self.subreddit,
            DraftField::Title => &mut self.title,
            DraftField::Body => &mut self.body,
            DraftField::Url => &mut self.url,
            DraftField::Attachment => &mut self.attachment_input,
        };
        target.pop();
    }

    pub fn add_attachment(&mut self, path: impl AsRef<Path>) -> Result<(), DraftError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DraftError::AttachmentNotFound(path.display().to_string()));
        }
        let path = path.to_path_buf();
        if !self.attachments.contains(&path) {
            self.attachments.push(path);
        }
        Ok(())
    }

    /// Adds the path typed into the attachment field and clears it.
    pub fn commit_attachment_input(&mut self) -> Result<(), DraftError> {
        let raw = self.attachment_input.trim().to_string();
        if raw.is_empty() {
            return Ok(());
        }
        self.add_attachment(&raw)?;
        self.attachment_input.clear();
        Ok(())
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<PathBuf> {
        if index < self.attachments.len() {
            Some(self.attachments.remove(index))
        } else {
            None
        }
    }

    pub fn submission(&self) -> Result<Submission, DraftError> {
        let subreddit = crate::reddit::normalize_subreddit(&self.subreddit);
        if subreddit.is_empty() {
            return Err(DraftError::MissingSubreddit);
        }
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DraftError::MissingTitle);
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(DraftError::TitleTooLong);
        }
        let kind = match self.tab {
            DraftTab::Text => SubmissionKind::Text {
                body: self.body.trim_end().to_string(),
            },
            DraftTab::Link => {
                let raw = self.url.trim();
                if raw.is_empty() {
                    return Err(DraftError::MissingUrl);
                }
                match Url::parse(raw) {
                    Ok(url) if matches!(url.scheme(), "http" | "https") => SubmissionKind::Link {
                        url: url.to_string(),
                    },
                    _ => return Err(DraftError::InvalidUrl),
                }
            }
            DraftTab::Images => {
                if self.attachments.is_empty() {
                    return Err(DraftError::MissingAttachment);
                }
                return Err(DraftError::ImagesUnsupported);
            }
        };
        Ok(Submission {
            subreddit: subreddit.to_string(),
            title: title.to_string(),
            kind,
            nsfw: self.nsfw,
        })
    }
}
