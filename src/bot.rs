//! Telegram update handling: commands, callbacks, private suggestions and poll answers.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, PollAnswer, User,
};
use tracing::{debug, error, info, warn};

use crate::club::{texts, BookClub};
use crate::error::Result;
use crate::messenger::Messenger;

pub const SELECT_GENRE_CALLBACK: &str = "select_genre";
pub const SHOW_RULES_CALLBACK: &str = "show_rules";

/// A chat command understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClubCommand {
    Start,
    Help,
    SelectGenre,
    Rules,
    Status,
    Close,
    Cancel,
    /// `/suggest Author - Title`; the argument may be empty.
    Suggest(String),
}

impl ClubCommand {
    /// Parse `/name[@bot] [args]`. Unknown commands and plain text give `None`.
    ///
    /// A command addressed to another bot (`/start@OtherBot`) gives `None` once
    /// our own `username` is known.
    pub fn parse(text: &str, username: Option<&str>) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let (name, mention) = match head.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (head, None),
        };
        if let (Some(mention), Some(username)) = (mention, username) {
            if !mention.eq_ignore_ascii_case(username) {
                return None;
            }
        }
        let name = name.to_lowercase();

        let command = match name.as_str() {
            "start" => ClubCommand::Start,
            "help" => ClubCommand::Help,
            "selectgenre" | "select_genre" => ClubCommand::SelectGenre,
            "rules" => ClubCommand::Rules,
            "status" => ClubCommand::Status,
            "close" => ClubCommand::Close,
            "cancel" => ClubCommand::Cancel,
            "suggest" => ClubCommand::Suggest(args.to_string()),
            _ => return None,
        };
        Some(command)
    }
}

/// Run the long-polling dispatcher until Ctrl-C.
pub async fn run<M: Messenger>(bot: Bot, club: Arc<BookClub<M>>) {
    let username: Option<Arc<str>> = match bot.get_me().await {
        Ok(me) => me.user.username.map(Arc::from),
        Err(err) => {
            warn!("Failed to fetch bot username, accepting all mentions: {err}");
            None
        }
    };

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let club = club.clone();
            move |bot, msg| handle_message(bot, club.clone(), username.clone(), msg)
        }))
        .branch(Update::filter_callback_query().endpoint({
            let club = club.clone();
            move |bot, query| handle_callback(bot, club.clone(), query)
        }))
        .branch(Update::filter_poll_answer().endpoint({
            let club = club.clone();
            move |answer| handle_poll_answer(club.clone(), answer)
        }));

    info!("Book club bot is polling for updates");

    Dispatcher::builder(bot, handler)
        .default_handler(|update| async move {
            debug!(update_id = ?update.id, "Unhandled update");
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message<M: Messenger>(
    bot: Bot,
    club: Arc<BookClub<M>>,
    username: Option<Arc<str>>,
    msg: Message,
) -> ResponseResult<()> {
    let Some(text) = msg.text().map(str::trim) else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let private = msg.chat.is_private();

    let Some(command) = ClubCommand::parse(text, username.as_deref()) else {
        // Free text only counts as a suggestion in a private chat.
        if private && !text.starts_with('/') {
            log_outcome("suggestion", club.submit_direct(chat_id, user.id, text).await);
        }
        return Ok(());
    };

    debug!(chat_id = chat_id.0, user_id = user.id.0, ?command, "Command received");

    match command {
        ClubCommand::Start | ClubCommand::Help => {
            if let Err(err) = send_welcome(&bot, chat_id, &display_name(user)).await {
                error!("Failed to send welcome: {err}");
            }
        }
        ClubCommand::Rules => reply(&bot, chat_id, texts::RULES).await,
        ClubCommand::SelectGenre if private => reply(&bot, chat_id, texts::GROUP_ONLY).await,
        ClubCommand::SelectGenre => log_outcome("start", club.start_cycle(chat_id).await),
        ClubCommand::Status => {
            club.status(chat_id).await;
        }
        ClubCommand::Close => log_outcome("close", club.close_current(chat_id, user.id).await),
        ClubCommand::Cancel => log_outcome("cancel", club.cancel(chat_id, user.id).await),
        ClubCommand::Suggest(args) if args.is_empty() => {
            reply(&bot, chat_id, texts::SUGGEST_USAGE).await
        }
        ClubCommand::Suggest(args) if private => {
            log_outcome("suggestion", club.submit_direct(chat_id, user.id, &args).await)
        }
        ClubCommand::Suggest(args) => {
            log_outcome("suggestion", club.submit_in_chat(chat_id, user.id, &args).await)
        }
    }

    Ok(())
}

async fn handle_callback<M: Messenger>(
    bot: Bot,
    club: Arc<BookClub<M>>,
    query: CallbackQuery,
) -> ResponseResult<()> {
    let chat = query
        .message
        .as_ref()
        .map(|msg| (msg.chat.id, msg.chat.is_private()));

    match (query.data.as_deref(), chat) {
        (Some(SELECT_GENRE_CALLBACK), Some((chat_id, true))) => {
            reply(&bot, chat_id, texts::GROUP_ONLY).await
        }
        (Some(SELECT_GENRE_CALLBACK), Some((chat_id, false))) => {
            log_outcome("start", club.start_cycle(chat_id).await)
        }
        (Some(SHOW_RULES_CALLBACK), Some((chat_id, _))) => reply(&bot, chat_id, texts::RULES).await,
        (data, _) => debug!(?data, "Ignoring callback"),
    }

    if let Err(err) = bot.answer_callback_query(query.id.clone()).await {
        error!("Failed to answer callback: {err}");
    }
    Ok(())
}

async fn handle_poll_answer<M: Messenger>(
    club: Arc<BookClub<M>>,
    answer: PollAnswer,
) -> ResponseResult<()> {
    let chosen: Vec<usize> = answer
        .option_ids
        .iter()
        .filter_map(|&id| usize::try_from(id).ok())
        .collect();
    club.record_vote(&answer.poll_id, answer.user.id, chosen)
        .await;
    Ok(())
}

async fn send_welcome(bot: &Bot, chat_id: ChatId, name: &str) -> ResponseResult<()> {
    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("📚 Pick a genre", SELECT_GENRE_CALLBACK),
        InlineKeyboardButton::callback("📜 Rules", SHOW_RULES_CALLBACK),
    ]]);
    bot.send_message(chat_id, texts::welcome(name))
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn reply(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(err) = bot.send_message(chat_id, text.to_string()).await {
        error!(chat_id = chat_id.0, "Failed to send reply: {err}");
    }
}

/// The club already told the chat what went wrong; only log here.
fn log_outcome<T>(action: &str, result: Result<T>) {
    if let Err(err) = result {
        debug!(action, "Request not applied: {err}");
    }
}

fn display_name(user: &User) -> String {
    if !user.first_name.is_empty() {
        return user.first_name.clone();
    }
    match &user.username {
        Some(username) if !username.is_empty() => username.clone(),
        _ => user.id.0.to_string(),
    }
}
