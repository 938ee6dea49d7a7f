//! Default genre catalog

/// Telegram accepts at most this many options per poll.
pub const MAX_POLL_OPTIONS: usize = 10;

/// Genres offered in the genre poll unless `club.genres` overrides them.
pub const DEFAULT_GENRES: [&str; MAX_POLL_OPTIONS] = [
    "🚀 Science fiction",
    "🧙 Fantasy",
    "🕵️ Detective",
    "🔪 Thriller",
    "💘 Romance",
    "👻 Horror",
    "🏰 Historical",
    "📜 Biography",
    "🔬 Popular science",
    "🗺️ Adventure",
];
