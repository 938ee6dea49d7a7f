//! Book club cycle: genre poll, book collection, book poll.

pub mod collection;
pub mod cycle;
pub mod engine;
pub mod genres;
pub mod poll;
pub mod tally;
pub mod texts;

pub use collection::{parse_suggestion, Accepted, CollectionWindow, Rejection};
pub use cycle::{Phase, PhaseKind};
pub use engine::BookClub;
pub use poll::{CloseOutcome, CloseReason, PollHandle, PollKind, PollSession, PollSettings, SessionId};
pub use tally::{tally, Tally};
