//! Outbound calls to the messaging platform.

use std::future::Future;

use teloxide::prelude::*;

use crate::club::poll::{PollHandle, PollSettings};
use crate::error::{Error, Result};

/// What the cycle engine needs from the chat platform.
pub trait Messenger: Send + Sync + 'static {
    /// Send a plain text message.
    fn send_text(&self, chat_id: ChatId, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Send a poll and return the handle used to match votes and stop it.
    fn create_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        options: &[String],
        settings: PollSettings,
    ) -> impl Future<Output = Result<PollHandle>> + Send;

    /// Stop the poll and return the final vote count of every option, in option order.
    fn close_poll(
        &self,
        chat_id: ChatId,
        handle: &PollHandle,
    ) -> impl Future<Output = Result<Vec<u32>>> + Send;
}

/// [`Messenger`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.bot.send_message(chat_id, text.to_string()).await?;
        Ok(())
    }

    async fn create_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        options: &[String],
        settings: PollSettings,
    ) -> Result<PollHandle> {
        let sent = self
            .bot
            .send_poll(chat_id, question.to_string(), options.to_vec())
            .is_anonymous(settings.anonymous)
            .allows_multiple_answers(settings.multiple_answers)
            .await?;

        let poll = sent
            .poll()
            .ok_or_else(|| Error::Platform("sendPoll returned a message without a poll".into()))?;

        Ok(PollHandle {
            poll_id: poll.id.to_string(),
            message_id: sent.id,
        })
    }

    async fn close_poll(&self, chat_id: ChatId, handle: &PollHandle) -> Result<Vec<u32>> {
        let poll = self.bot.stop_poll(chat_id, handle.message_id).await?;
        Ok(poll
            .options
            .iter()
            .map(|option| u32::try_from(option.voter_count).unwrap_or(0))
            .collect())
    }
}
