//! Telegram Book Club Bot Library
//!
//! Runs a recurring book club cycle in group chats:
//! - Genre poll over a fixed catalog (one re-vote on ties)
//! - Timed collection of "Author - Title" suggestions, privately or via /suggest
//! - Book poll over the collected suggestions and a winner announcement
//! - Prometheus metrics for polls, suggestions and platform errors

pub mod bot;
pub mod club;
pub mod config;
pub mod error;
pub mod messenger;
pub mod metrics;
pub mod scheduler;

// Re-export common types
pub use club::{BookClub, Phase, PhaseKind};
pub use config::{ClubSettings, Config};
pub use error::{Error, Result};
pub use messenger::{Messenger, TelegramMessenger};
pub use scheduler::{Deadline, DeadlineScheduler};
