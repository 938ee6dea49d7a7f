//! Tests for the genre poll → collection → book poll cycle

use super::*;
use book_club_bot::club::{texts, CloseOutcome, CloseReason, Phase, PhaseKind, PollKind};

#[tokio::test]
async fn test_start_cycle_opens_genre_poll() {
    let h = harness();
    let session = h.club.start_cycle(GROUP).await.unwrap();

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::GenreVoting);
    assert_eq!(h.club.scheduler().armed(GROUP), Some(session));

    let poll = h.fake.last_poll();
    assert_eq!(poll.chat_id, GROUP);
    assert_eq!(poll.question, texts::GENRE_QUESTION);
    assert_eq!(poll.options, genres());
    assert_eq!(poll.settings, PollKind::Genre.settings());
    assert!(!poll.settings.multiple_answers);
}

#[tokio::test]
async fn test_start_cycle_twice_is_rejected() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();

    let err = h.club.start_cycle(GROUP).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyActive(_)));
    assert_eq!(h.fake.polls().len(), 1);
    assert!(h.fake.saw_text(GROUP, "already running"));
}

#[tokio::test]
async fn test_chats_run_independent_cycles() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.club.start_cycle(OTHER_GROUP).await.unwrap();

    assert_ne!(h.session(GROUP).await, h.session(OTHER_GROUP).await);
    assert_eq!(h.fake.polls().len(), 2);
}

#[tokio::test]
async fn test_genre_winner_opens_collection() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![1, 4, 2]);
    h.expire(GROUP).await;

    match h.club.snapshot(GROUP).await {
        Phase::BookCollecting(window) => {
            assert_eq!(window.genre, "Horror");
            assert!(window.suggestions.is_empty());
        }
        other => panic!("expected collection, got {:?}", other.kind()),
    }
    assert!(h.fake.saw_text(GROUP, "Genre chosen: Horror"));
    assert_eq!(h.fake.closed().len(), 1);
}

#[tokio::test]
async fn test_genre_tie_reruns_with_tied_options() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![0, 3, 3]);
    h.expire(GROUP).await;

    match h.club.snapshot(GROUP).await {
        Phase::GenreVoting(poll) => {
            assert!(poll.is_rerun);
            assert_eq!(poll.options, vec!["Horror".to_string(), "Sci-Fi".to_string()]);
        }
        other => panic!("expected genre re-vote, got {:?}", other.kind()),
    }
    assert_eq!(h.fake.last_poll().question, texts::GENRE_RERUN_QUESTION);
    assert!(h.fake.saw_text(GROUP, "Tie between: Horror, Sci-Fi"));
}

#[tokio::test]
async fn test_genre_rerun_tie_takes_first_option() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![0, 3, 3]);
    h.expire(GROUP).await;
    h.fake.queue_counts(vec![2, 2]);
    h.expire(GROUP).await;

    match h.club.snapshot(GROUP).await {
        Phase::BookCollecting(window) => assert_eq!(window.genre, "Horror"),
        other => panic!("expected collection, got {:?}", other.kind()),
    }
    assert!(h.fake.saw_text(GROUP, "first option wins: Horror"));
    // No third genre poll
    assert_eq!(h.fake.polls().len(), 2);
}

#[tokio::test]
async fn test_genre_without_votes_returns_to_idle() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![0, 0, 0]);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert!(h.fake.saw_text(GROUP, &texts::no_votes()));
    assert_eq!(h.club.scheduler().armed(GROUP), None);
}

#[tokio::test]
async fn test_collection_close_opens_book_poll() {
    let h = harness();
    h.start_collecting(GROUP).await;
    h.club
        .submit_in_chat(GROUP, ALICE, "Frank Herbert - Dune")
        .await
        .unwrap();
    h.club
        .submit_direct(ChatId(1), BOB, "Ursula Le Guin - The Dispossessed")
        .await
        .unwrap();
    h.expire(GROUP).await;

    let poll = h.fake.last_poll();
    assert_eq!(
        poll.options,
        vec![
            "Frank Herbert - Dune".to_string(),
            "Ursula Le Guin - The Dispossessed".to_string()
        ]
    );
    assert_eq!(poll.question, texts::book_question("Fantasy"));
    assert!(poll.settings.multiple_answers);
    assert!(!poll.settings.anonymous);
    assert_eq!(h.club.phase(GROUP).await, PhaseKind::BookVoting);
}

#[tokio::test]
async fn test_book_winner_is_announced() {
    let h = harness();
    h.start_collecting(GROUP).await;
    h.club.submit_in_chat(GROUP, ALICE, "Al - One").await.unwrap();
    h.club.submit_in_chat(GROUP, BOB, "Bo - Two").await.unwrap();
    h.expire(GROUP).await;
    h.fake.queue_counts(vec![1, 5]);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert!(h.fake.saw_text(GROUP, &texts::winner("Bo - Two")));
}

#[tokio::test]
async fn test_book_tie_reruns_then_settles_on_first() {
    let h = harness();
    h.start_collecting(GROUP).await;
    h.club.submit_in_chat(GROUP, ALICE, "Al - One").await.unwrap();
    h.club.submit_in_chat(GROUP, BOB, "Bo - Two").await.unwrap();
    h.club.submit_in_chat(GROUP, CAROL, "Cy - Three").await.unwrap();
    h.expire(GROUP).await;

    h.fake.queue_counts(vec![2, 0, 2]);
    h.expire(GROUP).await;
    let rerun = h.fake.last_poll();
    assert_eq!(rerun.options, vec!["Al - One".to_string(), "Cy - Three".to_string()]);
    assert_eq!(rerun.question, texts::book_rerun_question("Fantasy"));

    h.fake.queue_counts(vec![1, 1]);
    h.expire(GROUP).await;
    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert!(h.fake.saw_text(GROUP, &texts::winner("Al - One")));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    let session = h.session(GROUP).await;
    h.fake.queue_counts(vec![0, 0, 0]);

    let first = h
        .club
        .close_session(GROUP, session, CloseReason::Manual)
        .await
        .unwrap();
    let second = h
        .club
        .close_session(GROUP, session, CloseReason::Deadline)
        .await
        .unwrap();

    assert_eq!(first, CloseOutcome::Closed);
    assert_eq!(second, CloseOutcome::AlreadyClosed);
    assert_eq!(h.fake.closed().len(), 1);
}

#[tokio::test]
async fn test_stale_deadline_is_ignored() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    let genre_session = h.session(GROUP).await;
    h.fake.queue_counts(vec![3, 0, 0]);
    h.expire(GROUP).await;
    assert_eq!(h.club.phase(GROUP).await, PhaseKind::BookCollecting);

    h.club
        .on_deadline(Deadline {
            chat_id: GROUP,
            session_id: genre_session,
        })
        .await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::BookCollecting);
    assert_eq!(h.fake.closed().len(), 1);
}

#[tokio::test]
async fn test_deadline_timer_closes_phase() {
    let mut h = harness_with(ClubSettings {
        genre_poll: Duration::from_millis(10),
        ..settings()
    });
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![0, 1, 0]);

    let deadline = tokio::time::timeout(Duration::from_secs(2), h.deadlines.recv())
        .await
        .expect("deadline fired")
        .expect("channel open");
    h.club.on_deadline(deadline).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::BookCollecting);
}

#[tokio::test]
async fn test_close_failure_falls_back_to_recorded_votes() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    let poll = h.fake.last_poll();
    assert!(h.club.record_vote(&poll.handle.poll_id, ALICE, vec![2]).await);
    assert!(h.club.record_vote(&poll.handle.poll_id, BOB, vec![2]).await);
    assert!(h.club.record_vote(&poll.handle.poll_id, CAROL, vec![0]).await);

    h.fake.fail_close(true);
    h.expire(GROUP).await;

    assert!(h.fake.saw_text(GROUP, &texts::close_failed_fallback()));
    match h.club.snapshot(GROUP).await {
        Phase::BookCollecting(window) => assert_eq!(window.genre, "Sci-Fi"),
        other => panic!("expected collection, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_retracted_vote_is_not_counted() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    let poll = h.fake.last_poll();
    h.club.record_vote(&poll.handle.poll_id, ALICE, vec![1]).await;
    h.club.record_vote(&poll.handle.poll_id, ALICE, vec![]).await;

    h.fake.fail_close(true);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert!(h.fake.saw_text(GROUP, &texts::no_votes()));
}

#[tokio::test]
async fn test_vote_for_unknown_poll_is_ignored() {
    let h = harness();
    assert!(!h.club.record_vote("nope", ALICE, vec![0]).await);
}

#[tokio::test]
async fn test_poll_creation_failure_resets_to_idle() {
    let h = harness();
    h.fake.fail_create(true);

    let err = h.club.start_cycle(GROUP).await.unwrap_err();
    assert!(matches!(err, Error::Platform(_)));
    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert!(h.fake.saw_text(GROUP, &texts::poll_failed()));

    h.fake.fail_create(false);
    assert!(h.club.start_cycle(GROUP).await.is_ok());
}

#[tokio::test]
async fn test_manual_close_requires_admin() {
    let h = harness_with(ClubSettings {
        admins: [ALICE.0].into_iter().collect(),
        ..settings()
    });
    h.club.start_cycle(GROUP).await.unwrap();

    let err = h.club.close_current(GROUP, BOB).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden));
    assert_eq!(h.club.phase(GROUP).await, PhaseKind::GenreVoting);

    h.fake.queue_counts(vec![1, 0, 0]);
    let outcome = h.club.close_current(GROUP, ALICE).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Closed);
    assert_eq!(h.club.phase(GROUP).await, PhaseKind::BookCollecting);
}

#[tokio::test]
async fn test_close_without_cycle() {
    let h = harness();
    let err = h.club.close_current(GROUP, ALICE).await.unwrap_err();
    assert!(matches!(err, Error::NoActiveCycle));
    assert!(h.fake.saw_text(GROUP, texts::NOTHING_RUNNING));
}

#[tokio::test]
async fn test_cancel_stops_poll_and_resets() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    let session = h.session(GROUP).await;

    h.club.cancel(GROUP, ALICE).await.unwrap();

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert_eq!(h.club.scheduler().armed(GROUP), None);
    assert_eq!(h.fake.closed().len(), 1);
    assert!(h.fake.saw_text(GROUP, texts::CANCELLED));

    let outcome = h
        .club
        .close_session(GROUP, session, CloseReason::Deadline)
        .await
        .unwrap();
    assert_eq!(outcome, CloseOutcome::AlreadyClosed);
}

#[tokio::test]
async fn test_status_reports_phase() {
    let h = harness();
    assert_eq!(h.club.status(GROUP).await, PhaseKind::Idle);

    h.start_collecting(GROUP).await;
    h.club.submit_in_chat(GROUP, ALICE, "Al - One").await.unwrap();
    assert_eq!(h.club.status(GROUP).await, PhaseKind::BookCollecting);
    assert!(h.fake.saw_text(GROUP, "1. Al - One"));
}

#[tokio::test]
async fn test_short_count_list_is_padded() {
    let h = harness();
    h.start_collecting(GROUP).await;
    h.club.submit_in_chat(GROUP, ALICE, "Al - One").await.unwrap();
    h.club.submit_in_chat(GROUP, BOB, "Bo - Two").await.unwrap();
    h.expire(GROUP).await;

    // Platform reported a single option with five votes
    h.fake.queue_counts(vec![5]);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert!(h.fake.saw_text(GROUP, &texts::winner("Al - One")));
}

#[tokio::test]
async fn test_genre_rerun_without_votes_takes_first_option() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![0, 3, 3]);
    h.expire(GROUP).await;
    h.fake.queue_counts(vec![0, 0]);
    h.expire(GROUP).await;

    match h.club.snapshot(GROUP).await {
        Phase::BookCollecting(window) => assert_eq!(window.genre, "Horror"),
        other => panic!("expected collection, got {:?}", other.kind()),
    }
    assert!(h.fake.saw_text(GROUP, "first option wins: Horror"));
    assert!(!h.fake.saw_text(GROUP, &texts::no_votes()));
}

#[tokio::test]
async fn test_book_rerun_without_votes_announces_first_option() {
    let h = harness();
    h.start_collecting(GROUP).await;
    h.club.submit_in_chat(GROUP, ALICE, "Al - One").await.unwrap();
    h.club.submit_in_chat(GROUP, BOB, "Bo - Two").await.unwrap();
    h.expire(GROUP).await;
    h.fake.queue_counts(vec![2, 2]);
    h.expire(GROUP).await;
    h.fake.queue_counts(vec![0, 0]);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert_eq!(
        h.fake.texts(GROUP).last().map(String::as_str),
        Some(texts::winner("Al - One").as_str())
    );
    assert!(!h.fake.saw_text(GROUP, &texts::no_votes()));
}

#[tokio::test]
async fn test_book_poll_creation_failure_resets_to_idle() {
    let h = harness();
    h.start_collecting(GROUP).await;
    h.club.submit_in_chat(GROUP, ALICE, "Al - One").await.unwrap();
    h.club.submit_in_chat(GROUP, BOB, "Bo - Two").await.unwrap();

    h.fake.fail_create(true);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert_eq!(h.club.scheduler().armed(GROUP), None);
    assert!(h.fake.saw_text(GROUP, &texts::poll_failed()));
}

#[tokio::test]
async fn test_rerun_poll_creation_failure_resets_to_idle() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.fake.queue_counts(vec![0, 3, 3]);

    h.fake.fail_create(true);
    h.expire(GROUP).await;

    assert_eq!(h.club.phase(GROUP).await, PhaseKind::Idle);
    assert_eq!(h.club.scheduler().armed(GROUP), None);
    assert!(h.fake.saw_text(GROUP, &texts::poll_failed()));
    assert_eq!(h.fake.polls().len(), 1);
}

#[tokio::test]
async fn test_slow_close_does_not_block_other_chats() {
    let h = harness();
    h.club.start_cycle(GROUP).await.unwrap();
    h.club.start_cycle(OTHER_GROUP).await.unwrap();
    let other_poll = h.fake.last_poll();
    h.fake.slow_close(GROUP);

    let session = h.session(GROUP).await;
    let club = h.club.clone();
    let slow = tokio::spawn(async move {
        club.close_session(GROUP, session, CloseReason::Manual).await
    });
    tokio::task::yield_now().await;

    let vote = tokio::time::timeout(
        SLOW_CLOSE / 4,
        h.club.record_vote(&other_poll.handle.poll_id, ALICE, vec![0]),
    )
    .await
    .expect("other chat is not blocked");
    assert!(vote);
    let status = tokio::time::timeout(SLOW_CLOSE / 4, h.club.status(OTHER_GROUP))
        .await
        .expect("other chat is not blocked");
    assert_eq!(status, PhaseKind::GenreVoting);

    let outcome = slow.await.unwrap().unwrap();
    assert_eq!(outcome, CloseOutcome::Closed);
}
