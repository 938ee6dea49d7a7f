//! Per-chat cycle state.
//!
//! A chat is in exactly one [`Phase`]; the session or window object of a
//! phase exists only inside its variant.

use chrono::{DateTime, Utc};

use super::collection::CollectionWindow;
use super::poll::{PollSession, SessionId};

#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    GenreVoting(PollSession),
    BookCollecting(CollectionWindow),
    BookVoting { genre: String, poll: PollSession },
}

/// Phase without its payload, for reporting and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    GenreVoting,
    BookCollecting,
    BookVoting,
}

impl PhaseKind {
    pub fn label(self) -> &'static str {
        match self {
            PhaseKind::Idle => "idle",
            PhaseKind::GenreVoting => "genre poll",
            PhaseKind::BookCollecting => "book collection",
            PhaseKind::BookVoting => "book poll",
        }
    }
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::GenreVoting(_) => PhaseKind::GenreVoting,
            Phase::BookCollecting(_) => PhaseKind::BookCollecting,
            Phase::BookVoting { .. } => PhaseKind::BookVoting,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }

    /// Identity of the open session or window.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Phase::Idle => None,
            Phase::GenreVoting(poll) | Phase::BookVoting { poll, .. } => Some(poll.id),
            Phase::BookCollecting(window) => Some(window.id),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Phase::Idle => None,
            Phase::GenreVoting(poll) | Phase::BookVoting { poll, .. } => Some(poll.expires_at),
            Phase::BookCollecting(window) => Some(window.expires_at),
        }
    }

    pub fn poll(&self) -> Option<&PollSession> {
        match self {
            Phase::GenreVoting(poll) | Phase::BookVoting { poll, .. } => Some(poll),
            _ => None,
        }
    }

    pub fn poll_mut(&mut self) -> Option<&mut PollSession> {
        match self {
            Phase::GenreVoting(poll) | Phase::BookVoting { poll, .. } => Some(poll),
            _ => None,
        }
    }

    pub fn window_mut(&mut self) -> Option<&mut CollectionWindow> {
        match self {
            Phase::BookCollecting(window) => Some(window),
            _ => None,
        }
    }
}
