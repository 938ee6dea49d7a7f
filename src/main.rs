//! Book club bot - main entry point

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use book_club_bot::config::CONFIG_FILE;
use book_club_bot::{bot, metrics, BookClub, Config, DeadlineScheduler, Error, TelegramMessenger};

#[derive(Parser)]
#[command(name = "book_club_bot")]
#[command(about = "Telegram book club: genre poll, book suggestions, book poll", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, env = "BOOK_CLUB_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("book_club_bot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err @ Error::ConfigMissing(_)) => {
            error!("Cannot start: {}", err);
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(url) = config.public_url.as_deref() {
        info!(%url, "Public URL configured");
    }

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    info!(
        genres = config.club.genres.len(),
        genre_poll_secs = config.club.genre_poll.as_secs(),
        collection_secs = config.club.collection.as_secs(),
        book_poll_secs = config.club.book_poll.as_secs(),
        "Starting book club bot"
    );

    let bot = Bot::new(config.token.clone());
    let (scheduler, mut deadlines) = DeadlineScheduler::new();
    let club = Arc::new(BookClub::new(
        TelegramMessenger::new(bot.clone()),
        scheduler,
        config.club,
    ));

    tokio::spawn({
        let club = club.clone();
        async move {
            while let Some(deadline) = deadlines.recv().await {
                club.on_deadline(deadline).await;
            }
        }
    });

    bot::run(bot, club).await;

    Ok(())
}
