//! Chat-facing strings.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::cycle::Phase;

pub const GENRE_QUESTION: &str = "📚 Pick the genre of our next book:";
pub const GENRE_RERUN_QUESTION: &str = "⚖️ It's a tie! Pick one of the tied genres:";
pub const RULES: &str = "📜 Book club rules:\n\n\
    1. At most 2 suggestions per person\n\
    2. Format: \"Author - Title\"\n\
    3. Every vote has a time limit\n\
    4. Ties get one re-vote, then the first option wins";
pub const NO_COLLECTION: &str =
    "There is no book collection running right now. Wait for the genre poll to finish.";
pub const AMBIGUOUS_COLLECTION: &str = "Several groups are collecting books right now. \
    Send /suggest Author - Title in the group you want to suggest to.";
pub const GROUP_ONLY: &str = "Use /selectgenre in a group chat.";
pub const SUGGEST_USAGE: &str = "Usage: /suggest Author - Title";
pub const FORBIDDEN: &str = "⛔ Only club admins can do that.";
pub const NOTHING_RUNNING: &str = "Nothing is running. Start a cycle with /selectgenre.";
pub const CANCELLED: &str = "🛑 Book club cycle cancelled.";

pub fn welcome(name: &str) -> String {
    format!(
        "📚 Hi, {name}! I run the book club.\n\n\
         Commands:\n\
         /selectgenre - start a cycle: genre poll, suggestions, book poll\n\
         /suggest Author - Title - suggest a book during collection\n\
         /status - show what is running\n\
         /close - close the current phase early\n\
         /cancel - cancel the cycle\n\
         /rules - club rules\n\n\
         📝 You can also send suggestions to me privately as: Author - Title"
    )
}

pub fn minutes(duration: Duration) -> u64 {
    duration.as_secs().div_ceil(60).max(1)
}

pub fn genre_poll_opened(duration: Duration) -> String {
    format!("⏳ You have {} min to pick a genre!", minutes(duration))
}

pub fn already_running(phase: &str) -> String {
    format!("❌ A {phase} is already running in this chat.")
}

pub fn poll_failed() -> String {
    "❌ Could not create the poll. The cycle was reset, try /selectgenre again.".to_string()
}

pub fn close_failed_fallback() -> String {
    "⚠️ Could not close the poll on Telegram; counting the votes I received.".to_string()
}

pub fn no_votes() -> String {
    "❌ Nobody voted! The cycle is over.".to_string()
}

pub fn tie(options: &[String]) -> String {
    format!("⚖️ Tie between: {}. Re-voting!", options.join(", "))
}

pub fn tie_settled(winner: &str) -> String {
    format!("⚖️ No clear winner in the re-vote, so the first option wins: {winner}")
}

pub fn collection_started(genre: &str, duration: Duration) -> String {
    format!(
        "🎉 Genre chosen: {genre}!\n\
         Send me book suggestions privately (or /suggest here) as \"Author - Title\".\n\
         You have {} min, at most 2 books each.",
        minutes(duration)
    )
}

pub fn insufficient(collected: usize) -> String {
    format!("❌ Not enough suggestions ({collected}). At least 2 are needed, the cycle is over.")
}

pub fn book_question(genre: &str) -> String {
    format!("📚 Vote for the book ({genre}):")
}

pub fn book_rerun_question(genre: &str) -> String {
    format!("⚖️ Tie! Vote again for the book ({genre}):")
}

pub fn book_poll_opened(duration: Duration) -> String {
    format!("⏳ Voting is open for {} min!", minutes(duration))
}

pub fn winner(book: &str) -> String {
    format!("🏆 Winner: {book}")
}

pub fn accepted(book: &str, remaining: usize) -> String {
    format!("✅ \"{book}\" accepted! You can suggest {remaining} more.")
}

pub fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (expires_at - now).num_seconds().max(0);
    format!("{}:{:02} left", secs / 60, secs % 60)
}

/// Summary of a running phase for `/status`.
pub fn status(phase: &Phase, now: DateTime<Utc>) -> String {
    let left = phase
        .expires_at()
        .map(|at| remaining(at, now))
        .unwrap_or_default();
    match phase {
        Phase::Idle => NOTHING_RUNNING.to_string(),
        Phase::GenreVoting(poll) => format!(
            "🗳 Genre poll{} is open, {left}. Votes so far: {}.",
            if poll.is_rerun { " (re-vote)" } else { "" },
            poll.voter_count()
        ),
        Phase::BookCollecting(window) => {
            let mut text = format!("📝 Collecting {} books, {left}.", window.genre);
            if window.suggestions.is_empty() {
                text.push_str("\nNo suggestions yet.");
            }
            for (i, suggestion) in window.suggestions.iter().enumerate() {
                text.push_str(&format!("\n{}. {}", i + 1, suggestion.text));
            }
            text
        }
        Phase::BookVoting { genre, poll } => format!(
            "🗳 Book poll ({genre}){} is open, {left}. Votes so far: {}.",
            if poll.is_rerun { " re-vote" } else { "" },
            poll.voter_count()
        ),
    }
}
