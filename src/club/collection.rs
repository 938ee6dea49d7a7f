//! Book suggestion window between the genre poll and the book poll.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use teloxide::types::{ChatId, UserId};

use super::genres::MAX_POLL_OPTIONS;
use super::poll::SessionId;
use crate::error::{Error, Result};

/// Accepted suggestions per user per window.
pub const MAX_SUGGESTIONS_PER_USER: usize = 2;
/// Telegram's limit on the length of a poll option.
pub const MAX_SUGGESTION_CHARS: usize = 100;

const MIN_SIDE_CHARS: usize = 2;

/// Separator surrounded by whitespace: "Author - Title", "Author — Title".
static SPACED_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+[-–—]\s+(.+)$").expect("valid separator regex"));

/// Bare dash: "Author—Title". A bare hyphen belongs to a word ("Sci-Fi", "Jean-Paul").
static BARE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)[–—](.+)$").expect("valid separator regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Why a suggestion was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BadFormat,
    QuotaExceeded,
    Duplicate,
    WindowFull,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::BadFormat => "bad_format",
            Rejection::QuotaExceeded => "quota_exceeded",
            Rejection::Duplicate => "duplicate",
            Rejection::WindowFull => "window_full",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::BadFormat => "❌ Use the format: Author - Title",
            Rejection::QuotaExceeded => "❌ You have already suggested 2 books",
            Rejection::Duplicate => "❌ That book has already been suggested",
            Rejection::WindowFull => "❌ The ballot is full, no more suggestions this round",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSuggestion {
    /// Canonical "author - title" text
    pub text: String,
    pub submitted_by: UserId,
}

/// A successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub text: String,
    /// Suggestions this user may still make in the window
    pub remaining: usize,
}

/// Parse "author - title" into its canonical form.
pub fn parse_suggestion(raw: &str) -> std::result::Result<String, Rejection> {
    let text = raw.trim();
    let caps = SPACED_SEPARATOR
        .captures(text)
        .or_else(|| BARE_SEPARATOR.captures(text))
        .ok_or(Rejection::BadFormat)?;

    let author = collapse_whitespace(&caps[1]);
    let title = collapse_whitespace(&caps[2]);
    if author.chars().count() < MIN_SIDE_CHARS || title.chars().count() < MIN_SIDE_CHARS {
        return Err(Rejection::BadFormat);
    }

    let canonical = format!("{author} - {title}");
    if canonical.chars().count() > MAX_SUGGESTION_CHARS {
        return Err(Rejection::BadFormat);
    }
    Ok(canonical)
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

#[derive(Debug, Clone)]
pub struct CollectionWindow {
    pub id: SessionId,
    pub chat_id: ChatId,
    pub genre: String,
    pub suggestions: Vec<BookSuggestion>,
    pub expires_at: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn new(id: SessionId, chat_id: ChatId, genre: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id,
            chat_id,
            genre,
            suggestions: Vec::new(),
            expires_at,
        }
    }

    /// Validate and append a suggestion.
    pub fn submit(
        &mut self,
        user: UserId,
        raw_text: &str,
    ) -> std::result::Result<Accepted, Rejection> {
        let text = parse_suggestion(raw_text)?;

        let already = self.count_by(user);
        if already >= MAX_SUGGESTIONS_PER_USER {
            return Err(Rejection::QuotaExceeded);
        }

        let key = text.to_lowercase();
        if self.suggestions.iter().any(|s| s.text.to_lowercase() == key) {
            return Err(Rejection::Duplicate);
        }

        if self.suggestions.len() >= MAX_POLL_OPTIONS {
            return Err(Rejection::WindowFull);
        }

        self.suggestions.push(BookSuggestion {
            text: text.clone(),
            submitted_by: user,
        });
        Ok(Accepted {
            text,
            remaining: MAX_SUGGESTIONS_PER_USER - already - 1,
        })
    }

    /// Number of suggestions accepted from `user`.
    pub fn count_by(&self, user: UserId) -> usize {
        self.suggestions
            .iter()
            .filter(|s| s.submitted_by == user)
            .count()
    }

    /// Consume the window and return the book poll options in submission order.
    pub fn close(self) -> Result<Vec<String>> {
        if self.suggestions.len() < 2 {
            return Err(Error::InsufficientSuggestions {
                collected: self.suggestions.len(),
            });
        }
        Ok(self.suggestions.into_iter().map(|s| s.text).collect())
    }
}
