use std::collections::HashMap;
use std::sync::Arc;

use debatearena_core::config::default_config;
use debatearena_core::llm::Purpose;
use debatearena_core::orchestrator::FinalResult;
use debatearena_core::session::FinalScores;
use debatearena_core::store::DebateStore;
use debatearena_core::{
    DebateEvent, DebateService, EventEmitter, MemoryStore, MockGenerator, Session,
    SessionRequest, SessionStatus, Side, StreamOutcome, Winner,
};
use uuid::Uuid;

struct Harness {
    service: Arc<DebateService>,
    store: Arc<MemoryStore>,
    mock: Arc<MockGenerator>,
    session_id: Uuid,
}

async fn harness(mock: MockGenerator) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(mock);
    let service = Arc::new(DebateService::new(
        default_config(),
        store.clone(),
        mock.clone(),
    ));
    let topic = service
        .create_topic("Should AI be regulated?", "")
        .await
        .unwrap();
    let session = service
        .create_session(SessionRequest::new(topic.id))
        .await
        .unwrap();
    Harness {
        service,
        store,
        mock,
        session_id: session.id,
    }
}

impl Harness {
    /// Stream the session, requesting a pause right after the first event
    /// matching `trigger`.
    async fn run_until(
        &self,
        trigger: impl Fn(&DebateEvent) -> bool,
    ) -> (StreamOutcome, Vec<DebateEvent>) {
        let (handle, mut rx) = self.service.spawn_stream(self.session_id);
        let mut events = Vec::new();
        let mut pause_sent = false;
        while let Some(event) = rx.recv().await {
            if let DebateEvent::DebatePaused {
                round, position, ..
            } = &event
            {
                // The pause is durable before anyone hears about it.
                let stored = self.session().await;
                assert_eq!(stored.status, SessionStatus::Paused);
                assert_eq!(
                    stored.checkpoint,
                    Some(format!("round_{}_{}", round, position))
                );
            }
            if !pause_sent && trigger(&event) {
                self.service.pause(self.session_id).await.unwrap();
                pause_sent = true;
            }
            events.push(event);
        }
        (handle.await.unwrap(), events)
    }

    async fn run(&self) -> (StreamOutcome, Vec<DebateEvent>) {
        self.run_until(|_| false).await
    }

    async fn session(&self) -> Session {
        self.service.session(self.session_id).await.unwrap()
    }

    async fn argument_counts(&self) -> HashMap<(u32, Side), usize> {
        let mut counts = HashMap::new();
        for argument in self.store.arguments(self.session_id).await.unwrap() {
            *counts.entry((argument.round, argument.side)).or_insert(0) += 1;
        }
        counts
    }
}

fn expected_result() -> FinalResult {
    // Mock judges score 80/81/82 for the affirmative and 78/79/80 for the
    // negative, so each round averages 81 and 79.
    FinalResult {
        scores: FinalScores {
            affirmative: 405.0,
            negative: 395.0,
            max_possible: 500.0,
        },
        winner: Winner::Affirmative,
    }
}

fn count(events: &[DebateEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

fn is_complete_argument(event: &DebateEvent, want_side: Side, want_round: u32) -> bool {
    matches!(
        event,
        DebateEvent::AiArgument { side, round, complete: true, .. }
            if *side == want_side && *round == want_round
    )
}

#[tokio::test(start_paused = true)]
async fn test_full_debate_runs_to_completion() {
    let h = harness(MockGenerator::new()).await;
    let (outcome, events) = h.run().await;

    assert_eq!(outcome, StreamOutcome::Completed(expected_result()));
    assert!(matches!(events.first(), Some(DebateEvent::DebateStart { rounds: 5, .. })));
    assert!(matches!(events.last(), Some(DebateEvent::DebateComplete { .. })));
    assert_eq!(count(&events, "round_complete"), 5);
    assert_eq!(count(&events, "debate_complete"), 1);
    assert_eq!(count(&events, "judging_start"), 1);
    assert_eq!(count(&events, "error"), 0);

    let judge_feedback_done = events
        .iter()
        .filter(|e| matches!(e, DebateEvent::JudgeFeedback { complete: true, .. }))
        .count();
    assert_eq!(judge_feedback_done, 3);

    let session = h.session().await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.winner, Some(Winner::Affirmative));
    assert_eq!(session.final_scores, Some(expected_result().scores));
    assert_eq!(session.checkpoint, None);

    assert!(h.argument_counts().await.values().all(|&n| n == 1));
    assert_eq!(h.store.arguments(h.session_id).await.unwrap().len(), 10);
    assert_eq!(h.store.moderator_messages(h.session_id).await.unwrap().len(), 20);
    assert_eq!(h.store.round_scores(h.session_id).await.unwrap().len(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_cumulative_scores_follow_round_averages() {
    let h = harness(MockGenerator::new()).await;
    let (_, events) = h.run().await;

    let totals: Vec<(f64, f64)> = events
        .iter()
        .filter_map(|e| match e {
            DebateEvent::CumulativeScoresUpdate {
                affirmative_total,
                negative_total,
                ..
            } => Some((*affirmative_total, *negative_total)),
            _ => None,
        })
        .collect();
    let expected: Vec<(f64, f64)> = (1..=5)
        .map(|r| (81.0 * f64::from(r), 79.0 * f64::from(r)))
        .collect();
    assert_eq!(totals, expected);
}

#[tokio::test(start_paused = true)]
async fn test_equal_totals_give_a_draw() {
    let h = harness(MockGenerator::new().with_scores(80.0, 80.0)).await;
    let (outcome, _) = h.run().await;

    let StreamOutcome::Completed(result) = outcome else {
        panic!("debate did not complete: {:?}", outcome);
    };
    assert_eq!(result.winner, Winner::Draw);
    assert_eq!(h.session().await.winner, Some(Winner::Draw));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_at_every_step_matches_uninterrupted_run() {
    let cases: [(&str, fn(&DebateEvent) -> bool); 4] = [
        ("affirmative_before", |e| {
            matches!(e, DebateEvent::RoundComplete { round: 1 })
        }),
        ("affirmative_after", |e| is_complete_argument(e, Side::Affirmative, 2)),
        ("negative_before", |e| {
            matches!(
                e,
                DebateEvent::ModeratorEvaluation {
                    side: Side::Affirmative,
                    round: 2,
                    complete: true,
                    ..
                }
            )
        }),
        ("negative_after", |e| is_complete_argument(e, Side::Negative, 2)),
    ];

    for (position, trigger) in cases {
        let h = harness(MockGenerator::new()).await;

        let (outcome, events) = h.run_until(trigger).await;
        assert_eq!(outcome, StreamOutcome::Paused, "{}", position);
        match events.last() {
            Some(DebateEvent::DebatePaused {
                round,
                position: reported,
                ..
            }) => {
                assert_eq!(*round, 2);
                assert_eq!(reported, position);
            }
            other => panic!("expected debate_paused, got {:?}", other),
        }
        let paused = h.session().await;
        assert_eq!(paused.status, SessionStatus::Paused);
        assert_eq!(
            paused.checkpoint.as_deref(),
            Some(format!("round_2_{}", position).as_str())
        );

        let (outcome, _) = h.run().await;
        assert_eq!(outcome, StreamOutcome::Completed(expected_result()), "{}", position);
        assert!(
            h.argument_counts().await.values().all(|&n| n == 1),
            "duplicate argument after resuming at {}",
            position
        );
        assert_eq!(h.store.arguments(h.session_id).await.unwrap().len(), 10);
        assert_eq!(h.store.moderator_messages(h.session_id).await.unwrap().len(), 20);
        assert_eq!(h.session().await.checkpoint, None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_negative_argument_does_not_regenerate_it() {
    let h = harness(MockGenerator::new()).await;

    let (outcome, _) = h
        .run_until(|e| is_complete_argument(e, Side::Negative, 3))
        .await;
    assert_eq!(outcome, StreamOutcome::Paused);
    assert_eq!(
        h.session().await.checkpoint.as_deref(),
        Some("round_3_negative_after")
    );
    let before = h.mock.calls().len();

    let (outcome, _) = h.run().await;
    assert_eq!(outcome, StreamOutcome::Completed(expected_result()));

    let resumed = &h.mock.calls()[before..];
    assert!(
        !resumed
            .iter()
            .any(|p| matches!(p, Purpose::Argument { round: 3, .. }))
    );
    assert!(resumed.contains(&Purpose::Summary {
        side: Side::Negative,
        round: 3
    }));
    assert!(!resumed.contains(&Purpose::Summary {
        side: Side::Affirmative,
        round: 3
    }));
    let round_three_judgments = resumed
        .iter()
        .filter(|p| matches!(p, Purpose::RoundJudgment { round: 3, .. }))
        .count();
    assert_eq!(round_three_judgments, 6);
    assert!(
        resumed
            .iter()
            .any(|p| matches!(p, Purpose::Argument { round: 4, .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_resume_keeps_the_precise_checkpoint() {
    let h = harness(MockGenerator::new()).await;

    let (outcome, _) = h
        .run_until(|e| is_complete_argument(e, Side::Negative, 3))
        .await;
    assert_eq!(outcome, StreamOutcome::Paused);

    h.service.resume(h.session_id).await.unwrap();
    let paused = h.service.pause(h.session_id).await.unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.checkpoint.as_deref(), Some("round_3_negative_after"));

    let (outcome, _) = h.run().await;
    assert_eq!(outcome, StreamOutcome::Completed(expected_result()));
    assert!(h.argument_counts().await.values().all(|&n| n == 1));
    assert_eq!(h.store.arguments(h.session_id).await.unwrap().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_stale_pause_request_does_not_stop_a_fresh_run() {
    let h = harness(MockGenerator::new()).await;
    h.service.start(h.session_id).await.unwrap();
    h.store
        .update_session(h.session_id, Box::new(|s: &mut Session| s.request_pause()))
        .await
        .unwrap();

    let (outcome, events) = h.run().await;
    assert_eq!(outcome, StreamOutcome::Completed(expected_result()));
    assert_eq!(count(&events, "debate_paused"), 0);
    assert!(!h.session().await.pause_requested);
}

#[tokio::test(start_paused = true)]
async fn test_legacy_round_checkpoint_restarts_the_round() {
    let h = harness(MockGenerator::new()).await;

    let (outcome, _) = h
        .run_until(|e| {
            matches!(
                e,
                DebateEvent::ModeratorEvaluation {
                    side: Side::Affirmative,
                    round: 3,
                    complete: true,
                    ..
                }
            )
        })
        .await;
    assert_eq!(outcome, StreamOutcome::Paused);

    h.store
        .update_session(
            h.session_id,
            Box::new(|s: &mut Session| {
                s.checkpoint = Some("round_3".to_string());
                Ok(())
            }),
        )
        .await
        .unwrap();

    let (outcome, events) = h.run().await;
    assert_eq!(outcome, StreamOutcome::Completed(expected_result()));
    assert!(matches!(
        events.iter().find(|e| e.name() == "round_start"),
        Some(DebateEvent::RoundStart { round: 3 })
    ));

    let counts = h.argument_counts().await;
    assert_eq!(counts[&(3, Side::Affirmative)], 2);
    assert_eq!(counts[&(3, Side::Negative)], 1);
    assert_eq!(counts[&(4, Side::Affirmative)], 1);
}

#[tokio::test(start_paused = true)]
async fn test_skip_to_end_finalizes_from_scored_rounds() {
    let h = harness(MockGenerator::new()).await;

    let (outcome, _) = h
        .run_until(|e| matches!(e, DebateEvent::RoundComplete { round: 2 }))
        .await;
    assert_eq!(outcome, StreamOutcome::Paused);

    let result = h.service.skip_to_end(h.session_id).await.unwrap();
    assert_eq!(result.scores.affirmative, 162.0);
    assert_eq!(result.scores.negative, 158.0);
    assert_eq!(result.scores.max_possible, 500.0);
    assert_eq!(result.winner, Winner::Affirmative);

    let session = h.session().await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.checkpoint, None);

    let (outcome, events) = h.run().await;
    assert_eq!(outcome, StreamOutcome::Failed);
    assert!(matches!(events.as_slice(), [DebateEvent::Error { .. }]));
}

#[tokio::test(start_paused = true)]
async fn test_second_stream_is_rejected_while_running() {
    let h = harness(MockGenerator::new()).await;
    let (handle, mut rx) = h.service.spawn_stream(h.session_id);
    assert!(matches!(rx.recv().await, Some(DebateEvent::DebateStart { .. })));

    let (emitter, mut second) = EventEmitter::channel();
    let outcome = h.service.stream(h.session_id, emitter).await;
    assert_eq!(outcome, StreamOutcome::Failed);
    match second.recv().await {
        Some(DebateEvent::Error { message }) => assert!(message.contains("already")),
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(h.service.skip_to_end(h.session_id).await.is_err());

    while rx.recv().await.is_some() {}
    assert_eq!(handle.await.unwrap(), StreamOutcome::Completed(expected_result()));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_session_fails_with_error_event() {
    let h = harness(MockGenerator::new()).await;
    let (emitter, mut rx) = EventEmitter::channel();

    let outcome = h.service.stream(Uuid::new_v4(), emitter).await;
    assert_eq!(outcome, StreamOutcome::Failed);
    assert!(matches!(rx.recv().await, Some(DebateEvent::Error { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_argument_chunks_build_the_stored_text() {
    let h = harness(MockGenerator::new()).await;
    let (_, events) = h.run().await;

    for argument in h.store.arguments(h.session_id).await.unwrap() {
        let mut text = String::new();
        let mut completions = 0;
        for event in &events {
            if let DebateEvent::AiArgument {
                side,
                chunk,
                complete,
                round,
            } = event
                && *side == argument.side
                && *round == argument.round
            {
                if *complete {
                    assert!(chunk.is_empty());
                    completions += 1;
                } else {
                    assert_eq!(completions, 0, "chunk after completion");
                    text.push_str(chunk);
                    assert!(argument.text.starts_with(&text));
                }
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(text, argument.text);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_judges_still_record_every_score() {
    let h = harness(
        MockGenerator::new()
            .fail_judge(2, Side::Affirmative)
            .malformed_judge(3, Side::Negative),
    )
    .await;
    let (outcome, events) = h.run().await;
    assert!(matches!(outcome, StreamOutcome::Completed(_)));

    assert_eq!(h.store.round_scores(h.session_id).await.unwrap().len(), 30);
    let first_round = events.iter().find_map(|e| match e {
        DebateEvent::RoundScoresUpdate {
            round: 1,
            affirmative_score,
            negative_score,
        } => Some((*affirmative_score, *negative_score)),
        _ => None,
    });
    // (80 + 75 + 82) / 3 and (78 + 79 + 75) / 3
    assert_eq!(first_round, Some((79.0, 77.33)));
}
