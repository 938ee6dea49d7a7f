//! Cycle state machine: Idle → genre poll → book collection → book poll → Idle.
//!
//! Every chat has its own lock. A reaction (command, suggestion, vote update,
//! deadline) holds its chat's lock for its whole duration, including outbound
//! calls, so reactions in one chat never interleave. Other chats do not wait.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use teloxide::types::{ChatId, UserId};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::collection::{Accepted, CollectionWindow};
use super::cycle::{Phase, PhaseKind};
use super::poll::{CloseOutcome, CloseReason, PollKind, PollSession, SessionId};
use super::tally::{tally, Tally};
use super::texts;
use crate::config::ClubSettings;
use crate::error::{Error, Result};
use crate::messenger::Messenger;
use crate::metrics;
use crate::scheduler::{Deadline, DeadlineScheduler};

type Slot = Arc<Mutex<Phase>>;

/// Lookups across chats. Only written while the affected chat's slot is locked.
#[derive(Debug, Default)]
struct Index {
    /// Open poll id → chat
    polls: HashMap<String, ChatId>,
    collecting: HashSet<ChatId>,
    active: HashSet<ChatId>,
}

pub struct BookClub<M: Messenger> {
    messenger: M,
    scheduler: DeadlineScheduler,
    settings: ClubSettings,
    slots: std::sync::Mutex<HashMap<ChatId, Slot>>,
    index: std::sync::Mutex<Index>,
    next_session: AtomicU64,
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn deadline_after(duration: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

fn outcome_label(result: &Tally) -> &'static str {
    match result {
        Tally::NoVotes => "no_votes",
        Tally::Winner(_) => "winner",
        Tally::Tie(_) => "tie",
    }
}

impl<M: Messenger> BookClub<M> {
    pub fn new(messenger: M, scheduler: DeadlineScheduler, settings: ClubSettings) -> Self {
        Self {
            messenger,
            scheduler,
            settings,
            slots: std::sync::Mutex::new(HashMap::new()),
            index: std::sync::Mutex::new(Index::default()),
            next_session: AtomicU64::new(0),
        }
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    pub fn scheduler(&self) -> &DeadlineScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &ClubSettings {
        &self.settings
    }

    pub async fn phase(&self, chat_id: ChatId) -> PhaseKind {
        let Some(slot) = self.existing_slot(chat_id) else {
            return PhaseKind::Idle;
        };
        let phase = slot.lock().await;
        phase.kind()
    }

    /// A copy of the chat's current phase.
    pub async fn snapshot(&self, chat_id: ChatId) -> Phase {
        let Some(slot) = self.existing_slot(chat_id) else {
            return Phase::Idle;
        };
        let phase = slot.lock().await;
        phase.clone()
    }

    pub async fn current_session(&self, chat_id: ChatId) -> Option<SessionId> {
        let slot = self.existing_slot(chat_id)?;
        let phase = slot.lock().await;
        phase.session_id()
    }

    /// `/selectgenre`: open the genre poll if the chat is idle.
    pub async fn start_cycle(&self, chat_id: ChatId) -> Result<SessionId> {
        let slot = self.slot(chat_id);
        let mut phase = slot.lock().await;
        if !phase.is_idle() {
            let label = phase.kind().label();
            self.notify(chat_id, &texts::already_running(label)).await;
            return Err(Error::AlreadyActive(label.to_string()));
        }

        let genres = self.settings.genres.clone();
        let id = self
            .open_poll(
                chat_id,
                &mut phase,
                PollKind::Genre,
                texts::GENRE_QUESTION,
                genres,
                false,
                Phase::GenreVoting,
            )
            .await?;
        self.notify(chat_id, &texts::genre_poll_opened(self.settings.genre_poll))
            .await;
        Ok(id)
    }

    /// Close the session `session_id` of `chat_id`.
    ///
    /// Deadlines and `/close` both end up here; whichever comes second gets
    /// [`CloseOutcome::AlreadyClosed`].
    pub async fn close_session(
        &self,
        chat_id: ChatId,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Result<CloseOutcome> {
        let Some(slot) = self.existing_slot(chat_id) else {
            return Ok(CloseOutcome::AlreadyClosed);
        };
        let mut phase = slot.lock().await;
        if phase.session_id() != Some(session_id) {
            debug!(chat_id = chat_id.0, %session_id, ?reason, "Session already closed");
            return Ok(CloseOutcome::AlreadyClosed);
        }
        self.scheduler.cancel(chat_id, session_id);
        let closing = self.replace_phase(chat_id, &mut phase, Phase::Idle);
        info!(
            chat_id = chat_id.0,
            %session_id,
            phase = closing.kind().label(),
            ?reason,
            "Closing phase"
        );

        match closing {
            Phase::Idle => {}
            Phase::GenreVoting(poll) => self.finish_genre_poll(&mut phase, poll).await,
            Phase::BookCollecting(window) => self.finish_collection(&mut phase, window).await,
            Phase::BookVoting { genre, poll } => {
                self.finish_book_poll(&mut phase, genre, poll).await
            }
        }
        Ok(CloseOutcome::Closed)
    }

    /// A deadline timer fired.
    pub async fn on_deadline(&self, deadline: Deadline) {
        match self
            .close_session(deadline.chat_id, deadline.session_id, CloseReason::Deadline)
            .await
        {
            Ok(CloseOutcome::Closed) => {}
            Ok(CloseOutcome::AlreadyClosed) => {
                debug!(
                    chat_id = deadline.chat_id.0,
                    session_id = %deadline.session_id,
                    "Stale deadline ignored"
                );
            }
            Err(err) => {
                error!(chat_id = deadline.chat_id.0, "Deadline handling failed: {}", err);
            }
        }
    }

    /// `/close`: end the current phase early.
    pub async fn close_current(&self, chat_id: ChatId, user: UserId) -> Result<CloseOutcome> {
        if !self.settings.is_admin(user.0) {
            self.notify(chat_id, texts::FORBIDDEN).await;
            return Err(Error::Forbidden);
        }
        let Some(session_id) = self.current_session(chat_id).await else {
            self.notify(chat_id, texts::NOTHING_RUNNING).await;
            return Err(Error::NoActiveCycle);
        };
        self.close_session(chat_id, session_id, CloseReason::Manual)
            .await
    }

    /// `/cancel`: drop the cycle without announcing a result.
    pub async fn cancel(&self, chat_id: ChatId, user: UserId) -> Result<()> {
        if !self.settings.is_admin(user.0) {
            self.notify(chat_id, texts::FORBIDDEN).await;
            return Err(Error::Forbidden);
        }

        let slot = self.slot(chat_id);
        let mut phase = slot.lock().await;
        if phase.is_idle() {
            self.notify(chat_id, texts::NOTHING_RUNNING).await;
            return Err(Error::NoActiveCycle);
        }
        let cancelled = self.replace_phase(chat_id, &mut phase, Phase::Idle);
        if let Some(session_id) = cancelled.session_id() {
            self.scheduler.cancel(chat_id, session_id);
        }
        if let Some(poll) = cancelled.poll() {
            if let Err(err) = self.messenger.close_poll(chat_id, &poll.handle).await {
                warn!(chat_id = chat_id.0, "Failed to stop cancelled poll: {}", err);
                metrics::record_platform_error("close_poll");
            }
        }
        info!(chat_id = chat_id.0, phase = cancelled.kind().label(), "Cycle cancelled");
        self.notify(chat_id, texts::CANCELLED).await;
        Ok(())
    }

    /// A suggestion sent in a private chat; routed to the only open window.
    pub async fn submit_direct(
        &self,
        reply_to: ChatId,
        user: UserId,
        text: &str,
    ) -> Result<Accepted> {
        let collecting: Vec<ChatId> = lock(&self.index).collecting.iter().copied().collect();
        let chat_id = match collecting.as_slice() {
            [chat_id] => *chat_id,
            [] => {
                self.notify(reply_to, texts::NO_COLLECTION).await;
                return Err(Error::NoActiveCycle);
            }
            _ => {
                self.notify(reply_to, texts::AMBIGUOUS_COLLECTION).await;
                return Err(Error::AmbiguousCollection);
            }
        };
        self.submit_to_chat(chat_id, user, text, reply_to).await
    }

    /// `/suggest Author - Title` inside the group.
    pub async fn submit_in_chat(&self, chat_id: ChatId, user: UserId, text: &str) -> Result<Accepted> {
        self.submit_to_chat(chat_id, user, text, chat_id).await
    }

    /// A vote update. Returns false when the poll is not open anymore.
    pub async fn record_vote(&self, poll_id: &str, user: UserId, chosen: Vec<usize>) -> bool {
        let chat_id = lock(&self.index).polls.get(poll_id).copied();
        let Some(slot) = chat_id.and_then(|chat_id| self.existing_slot(chat_id)) else {
            debug!(poll_id, "Vote for a poll that is not open");
            return false;
        };

        let mut phase = slot.lock().await;
        match phase.poll_mut() {
            Some(poll) if poll.handle.poll_id == poll_id => {
                poll.record_answer(user, chosen);
                debug!(
                    chat_id = poll.chat_id.0,
                    session_id = %poll.id,
                    voters = poll.voter_count(),
                    "Vote recorded"
                );
                true
            }
            _ => {
                debug!(poll_id, "Poll closed before the vote arrived");
                false
            }
        }
    }

    /// `/status`: describe the current phase in the chat.
    pub async fn status(&self, chat_id: ChatId) -> PhaseKind {
        let (kind, text) = match self.existing_slot(chat_id) {
            Some(slot) => {
                let phase = slot.lock().await;
                (phase.kind(), texts::status(&phase, Utc::now()))
            }
            None => (PhaseKind::Idle, texts::NOTHING_RUNNING.to_string()),
        };
        self.notify(chat_id, &text).await;
        kind
    }
}

/// Transitions
impl<M: Messenger> BookClub<M> {
    fn next_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn slot(&self, chat_id: ChatId) -> Slot {
        lock(&self.slots)
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(Phase::Idle)))
            .clone()
    }

    fn existing_slot(&self, chat_id: ChatId) -> Option<Slot> {
        lock(&self.slots).get(&chat_id).cloned()
    }

    /// Swap the chat's phase and keep the cross-chat index in step. Returns the old phase.
    fn replace_phase(&self, chat_id: ChatId, current: &mut Phase, next: Phase) -> Phase {
        let old = std::mem::replace(current, next);

        let mut index = lock(&self.index);
        if let Some(poll) = old.poll() {
            index.polls.remove(&poll.handle.poll_id);
        }
        if let Some(poll) = current.poll() {
            index.polls.insert(poll.handle.poll_id.clone(), chat_id);
        }
        if matches!(current, Phase::BookCollecting(_)) {
            index.collecting.insert(chat_id);
        } else {
            index.collecting.remove(&chat_id);
        }
        if current.is_idle() {
            index.active.remove(&chat_id);
        } else {
            index.active.insert(chat_id);
        }
        metrics::set_active_cycles(index.active.len());
        old
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_poll<F>(
        &self,
        chat_id: ChatId,
        phase: &mut Phase,
        kind: PollKind,
        question: &str,
        options: Vec<String>,
        is_rerun: bool,
        into_phase: F,
    ) -> Result<SessionId>
    where
        F: FnOnce(PollSession) -> Phase + Send,
    {
        if !phase.is_idle() {
            return Err(Error::AlreadyActive(phase.kind().label().to_string()));
        }

        let duration = match kind {
            PollKind::Genre => self.settings.genre_poll,
            PollKind::Book => self.settings.book_poll,
        };

        let handle = match self
            .messenger
            .create_poll(chat_id, question, &options, kind.settings())
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                error!(chat_id = chat_id.0, kind = kind.label(), "Failed to create poll: {}", err);
                metrics::record_platform_error("create_poll");
                self.notify(chat_id, &texts::poll_failed()).await;
                return Err(err);
            }
        };

        let id = self.next_id();
        let session = PollSession::new(
            id,
            kind,
            chat_id,
            handle,
            options,
            deadline_after(duration),
            is_rerun,
        );
        self.replace_phase(chat_id, phase, into_phase(session));
        self.scheduler.arm(chat_id, id, duration);
        info!(chat_id = chat_id.0, session_id = %id, kind = kind.label(), is_rerun, "Poll opened");
        Ok(id)
    }

    fn start_collection(&self, chat_id: ChatId, phase: &mut Phase, genre: String) -> SessionId {
        let id = self.next_id();
        let duration = self.settings.collection;
        info!(chat_id = chat_id.0, session_id = %id, %genre, "Collection window opened");
        let window = CollectionWindow::new(id, chat_id, genre, deadline_after(duration));
        self.replace_phase(chat_id, phase, Phase::BookCollecting(window));
        self.scheduler.arm(chat_id, id, duration);
        id
    }

    async fn final_counts(&self, poll: &PollSession) -> Vec<u32> {
        match self.messenger.close_poll(poll.chat_id, &poll.handle).await {
            Ok(mut counts) => {
                if counts.len() != poll.options.len() {
                    warn!(
                        chat_id = poll.chat_id.0,
                        expected = poll.options.len(),
                        got = counts.len(),
                        "Poll returned an unexpected number of options"
                    );
                    counts.resize(poll.options.len(), 0);
                }
                counts
            }
            Err(err) => {
                warn!(
                    chat_id = poll.chat_id.0,
                    session_id = %poll.id,
                    "Failed to stop poll, using recorded votes: {}",
                    err
                );
                metrics::record_platform_error("close_poll");
                self.notify(poll.chat_id, &texts::close_failed_fallback())
                    .await;
                poll.live_counts()
            }
        }
    }

    async fn finish_genre_poll(&self, phase: &mut Phase, poll: PollSession) {
        let chat_id = poll.chat_id;
        let counts = self.final_counts(&poll).await;
        let result = tally(&counts);
        metrics::record_poll("genre", outcome_label(&result));
        info!(chat_id = chat_id.0, session_id = %poll.id, ?counts, ?result, "Genre poll tallied");

        let winner = match (&result, poll.is_rerun) {
            (Tally::NoVotes, false) => {
                self.notify(chat_id, &texts::no_votes()).await;
                return;
            }
            (Tally::Winner(index), _) => *index,
            (Tally::Tie(indices), false) => {
                let tied: Vec<String> = indices.iter().map(|&i| poll.options[i].clone()).collect();
                self.notify(chat_id, &texts::tie(&tied)).await;
                let reopened = self
                    .open_poll(
                        chat_id,
                        phase,
                        PollKind::Genre,
                        texts::GENRE_RERUN_QUESTION,
                        tied,
                        true,
                        Phase::GenreVoting,
                    )
                    .await;
                if reopened.is_ok() {
                    self.notify(chat_id, &texts::genre_poll_opened(self.settings.genre_poll))
                        .await;
                }
                return;
            }
            // A re-vote always settles: lowest tied index, or the first option without votes.
            (Tally::NoVotes | Tally::Tie(_), true) => {
                let first = result.resolve_first().unwrap_or(0);
                self.notify(chat_id, &texts::tie_settled(&poll.options[first]))
                    .await;
                first
            }
        };

        let genre = poll.options[winner].clone();
        self.start_collection(chat_id, phase, genre.clone());
        self.notify(
            chat_id,
            &texts::collection_started(&genre, self.settings.collection),
        )
        .await;
    }

    async fn finish_collection(&self, phase: &mut Phase, window: CollectionWindow) {
        let chat_id = window.chat_id;
        let genre = window.genre.clone();
        match window.close() {
            Ok(options) => {
                info!(chat_id = chat_id.0, count = options.len(), "Collection closed");
                let question = texts::book_question(&genre);
                let opened = self
                    .open_poll(
                        chat_id,
                        phase,
                        PollKind::Book,
                        &question,
                        options,
                        false,
                        move |poll| Phase::BookVoting { genre, poll },
                    )
                    .await;
                if opened.is_ok() {
                    self.notify(chat_id, &texts::book_poll_opened(self.settings.book_poll))
                        .await;
                }
            }
            Err(Error::InsufficientSuggestions { collected }) => {
                info!(chat_id = chat_id.0, collected, "Collection closed with too few suggestions");
                self.notify(chat_id, &texts::insufficient(collected)).await;
            }
            Err(err) => {
                warn!(chat_id = chat_id.0, "Collection close failed: {}", err);
                self.notify(chat_id, &err.to_string()).await;
            }
        }
    }

    async fn finish_book_poll(&self, phase: &mut Phase, genre: String, poll: PollSession) {
        let chat_id = poll.chat_id;
        let counts = self.final_counts(&poll).await;
        let result = tally(&counts);
        metrics::record_poll("book", outcome_label(&result));
        info!(chat_id = chat_id.0, session_id = %poll.id, ?counts, ?result, "Book poll tallied");

        match (&result, poll.is_rerun) {
            (Tally::NoVotes, false) => {
                self.notify(chat_id, &texts::no_votes()).await;
            }
            (Tally::Winner(index), _) => {
                self.notify(chat_id, &texts::winner(&poll.options[*index]))
                    .await;
            }
            (Tally::Tie(indices), false) => {
                let tied: Vec<String> = indices.iter().map(|&i| poll.options[i].clone()).collect();
                self.notify(chat_id, &texts::tie(&tied)).await;
                let question = texts::book_rerun_question(&genre);
                let reopened = self
                    .open_poll(
                        chat_id,
                        phase,
                        PollKind::Book,
                        &question,
                        tied,
                        true,
                        move |poll| Phase::BookVoting { genre, poll },
                    )
                    .await;
                if reopened.is_ok() {
                    self.notify(chat_id, &texts::book_poll_opened(self.settings.book_poll))
                        .await;
                }
            }
            (Tally::NoVotes | Tally::Tie(_), true) => {
                let book = &poll.options[result.resolve_first().unwrap_or(0)];
                self.notify(chat_id, &texts::tie_settled(book)).await;
                self.notify(chat_id, &texts::winner(book)).await;
            }
        }
    }

    /// Submit to `chat_id`'s window; replies go to `reply_to`.
    async fn submit_to_chat(
        &self,
        chat_id: ChatId,
        user: UserId,
        text: &str,
        reply_to: ChatId,
    ) -> Result<Accepted> {
        let Some(slot) = self.existing_slot(chat_id) else {
            self.notify(reply_to, texts::NO_COLLECTION).await;
            return Err(Error::NoActiveCycle);
        };
        let mut phase = slot.lock().await;
        let Some(window) = phase.window_mut() else {
            self.notify(reply_to, texts::NO_COLLECTION).await;
            return Err(Error::NoActiveCycle);
        };

        match window.submit(user, text) {
            Ok(accepted) => {
                metrics::record_suggestion("accepted");
                info!(
                    chat_id = window.chat_id.0,
                    user_id = user.0,
                    book = %accepted.text,
                    "Suggestion accepted"
                );
                self.notify(reply_to, &texts::accepted(&accepted.text, accepted.remaining))
                    .await;
                Ok(accepted)
            }
            Err(rejection) => {
                metrics::record_suggestion(rejection.as_str());
                debug!(
                    chat_id = window.chat_id.0,
                    user_id = user.0,
                    reason = rejection.as_str(),
                    "Suggestion rejected"
                );
                self.notify(reply_to, &rejection.to_string()).await;
                Err(Error::Rejected(rejection))
            }
        }
    }

    /// Send a message; failures are logged and never change the cycle.
    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(err) = self.messenger.send_text(chat_id, text).await {
            warn!(chat_id = chat_id.0, "Failed to send message: {}", err);
            metrics::record_platform_error("send_message");
        }
    }
}
