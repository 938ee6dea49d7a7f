//! Open poll sessions (genre or book).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use teloxide::types::{ChatId, MessageId, UserId};

use super::tally::counts_from_answers;

/// Process-unique identity of a poll session or collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Genre,
    Book,
}

impl PollKind {
    pub fn label(self) -> &'static str {
        match self {
            PollKind::Genre => "genre poll",
            PollKind::Book => "book poll",
        }
    }

    /// Book polls allow several answers, genre polls one.
    pub fn settings(self) -> PollSettings {
        PollSettings {
            anonymous: false,
            multiple_answers: matches!(self, PollKind::Book),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub anonymous: bool,
    pub multiple_answers: bool,
}

/// Platform reference to a sent poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollHandle {
    /// Id carried by vote updates
    pub poll_id: String,
    /// Message holding the poll; needed to stop it
    pub message_id: MessageId,
}

/// Why a session is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Deadline,
    Manual,
}

/// Result of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// The session was already closed (or replaced); nothing happened.
    AlreadyClosed,
}

#[derive(Debug, Clone)]
pub struct PollSession {
    pub id: SessionId,
    pub kind: PollKind,
    pub chat_id: ChatId,
    pub handle: PollHandle,
    pub options: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub is_rerun: bool,
    /// Latest answer of every voter, as reported by vote updates.
    pub answers: HashMap<UserId, Vec<usize>>,
}

impl PollSession {
    pub fn new(
        id: SessionId,
        kind: PollKind,
        chat_id: ChatId,
        handle: PollHandle,
        options: Vec<String>,
        expires_at: DateTime<Utc>,
        is_rerun: bool,
    ) -> Self {
        Self {
            id,
            kind,
            chat_id,
            handle,
            options,
            expires_at,
            is_rerun,
            answers: HashMap::new(),
        }
    }

    /// Record a voter's current choice. An empty choice retracts the vote.
    pub fn record_answer(&mut self, user: UserId, chosen: Vec<usize>) {
        let chosen: Vec<usize> = chosen
            .into_iter()
            .filter(|&i| i < self.options.len())
            .collect();
        if chosen.is_empty() {
            self.answers.remove(&user);
        } else {
            self.answers.insert(user, chosen);
        }
    }

    /// Per-option counts built from recorded answers.
    pub fn live_counts(&self) -> Vec<u32> {
        counts_from_answers(self.options.len(), self.answers.values())
    }

    pub fn voter_count(&self) -> usize {
        self.answers.len()
    }
}
