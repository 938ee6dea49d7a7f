//! Phase deadlines keyed by chat and session.
//!
//! Each chat has at most one armed timer. When it fires, a [`Deadline`] is
//! delivered on the channel returned by [`DeadlineScheduler::new`]; the
//! receiver must check that the session is still current before acting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::club::poll::SessionId;

/// A timer that fired for `session_id` in `chat_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub chat_id: ChatId,
    pub session_id: SessionId,
}

type ArmedTimers = HashMap<ChatId, (SessionId, AbortHandle)>;

#[derive(Debug)]
pub struct DeadlineScheduler {
    tx: mpsc::UnboundedSender<Deadline>,
    armed: Arc<Mutex<ArmedTimers>>,
}

fn lock(armed: &Mutex<ArmedTimers>) -> MutexGuard<'_, ArmedTimers> {
    armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeadlineScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Deadline>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            armed: Arc::new(Mutex::new(HashMap::new())),
        };
        (scheduler, rx)
    }

    /// Arm the chat's timer for `session_id`, replacing any previous one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, chat_id: ChatId, session_id: SessionId, after: Duration) {
        let tx = self.tx.clone();
        let armed = Arc::clone(&self.armed);

        // Held until the new entry is in place so a fast timer cannot fire before it.
        let mut timers = lock(&self.armed);
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            {
                let mut timers = lock(&armed);
                if matches!(timers.get(&chat_id), Some((id, _)) if *id == session_id) {
                    timers.remove(&chat_id);
                }
            }
            if tx.send(Deadline { chat_id, session_id }).is_err() {
                debug!(chat_id = chat_id.0, %session_id, "Deadline receiver dropped");
            }
        });

        let previous = timers.insert(chat_id, (session_id, task.abort_handle()));
        drop(timers);
        if let Some((old_session, handle)) = previous {
            handle.abort();
            debug!(chat_id = chat_id.0, %old_session, "Replaced armed deadline");
        }
        debug!(chat_id = chat_id.0, %session_id, secs = after.as_secs(), "Deadline armed");
    }

    /// Cancel the chat's timer if it was armed for `session_id`.
    pub fn cancel(&self, chat_id: ChatId, session_id: SessionId) -> bool {
        let mut timers = lock(&self.armed);
        match timers.get(&chat_id) {
            Some((id, _)) if *id == session_id => {
                if let Some((_, handle)) = timers.remove(&chat_id) {
                    handle.abort();
                }
                debug!(chat_id = chat_id.0, %session_id, "Deadline cancelled");
                true
            }
            _ => false,
        }
    }

    /// Session the chat's timer is currently armed for.
    pub fn armed(&self, chat_id: ChatId) -> Option<SessionId> {
        lock(&self.armed).get(&chat_id).map(|(id, _)| *id)
    }
}
