//! Run registry: one active run per document, event replay, retention

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use reading_copilot_server::config::RegistryConfig;
use reading_copilot_server::engine::{RunEvent, RunState};
use reading_copilot_server::registry::{RegistryError, RunRegistry, StartRunRequest};

use common::{engine_config, harness, GatedScorer, PagedLines, ScriptedScorer};

fn dense() -> StartRunRequest {
    StartRunRequest {
        density_target: Some(1.0),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_one_active_run_per_document() {
    let scorer = Arc::new(GatedScorer::new(0.9));
    let h = harness(Arc::new(PagedLines::uniform(4)), scorer.clone(), engine_config(2)).await;

    let first = h.registry.start(&h.document_id, dense()).await.unwrap();
    scorer.wait_for_calls(1).await;

    match h.registry.start(&h.document_id, dense()).await {
        Err(RegistryError::AlreadyRunning { run_id, document_id }) => {
            assert_eq!(run_id, first.run_id);
            assert_eq!(document_id, h.document_id);
        }
        other => panic!("expected AlreadyRunning, got {:?}", other.map(|s| s.state)),
    }

    let summary = h.documents.list().await;
    assert_eq!(summary[0].active_run.as_deref(), Some(first.run_id.as_str()));

    scorer.release(10);
    let done = h.registry.wait_for_completion(&h.document_id, &first.run_id).await.unwrap();
    assert_eq!(done.state, RunState::Completed);
    assert_eq!(done.emitted_count, 4);

    // The slot is free again
    let second = h.registry.start(&h.document_id, dense()).await.unwrap();
    assert_ne!(second.run_id, first.run_id);
    let done = h.registry.wait_for_completion(&h.document_id, &second.run_id).await.unwrap();
    assert_eq!(done.state, RunState::Completed);

    let runs = h.registry.list(&h.document_id).await;
    assert_eq!(runs.len(), 2);
}

#[tokio::test]
async fn test_cancel_through_registry() {
    let scorer = Arc::new(GatedScorer::new(0.9));
    let h = harness(Arc::new(PagedLines::uniform(6)), scorer.clone(), engine_config(2)).await;

    let run = h.registry.start(&h.document_id, dense()).await.unwrap();
    scorer.wait_for_calls(1).await;

    let cancelling = h.registry.cancel(&h.document_id, &run.run_id).await.unwrap();
    assert!(cancelling.cancel_requested);

    scorer.release(10);
    let done = h.registry.wait_for_completion(&h.document_id, &run.run_id).await.unwrap();
    assert_eq!(done.state, RunState::Cancelled);
    assert!(done.partial);

    // Idempotent once terminal
    for _ in 0..2 {
        let again = h.registry.cancel(&h.document_id, &run.run_id).await.unwrap();
        assert_eq!(again.state, RunState::Cancelled);
        assert_eq!(again.emitted_count, done.emitted_count);
    }

    let highlights = h.registry.fetch_highlights(&h.document_id, &run.run_id).await.unwrap();
    assert!(highlights.partial);
    assert_eq!(highlights.highlights.len(), done.emitted_count);
}

#[tokio::test]
async fn test_event_log_slices_and_replay() {
    let h = harness(
        Arc::new(PagedLines::uniform(4)),
        Arc::new(ScriptedScorer::constant(0.9)),
        engine_config(2),
    )
    .await;

    let run = h.registry.start(&h.document_id, dense()).await.unwrap();

    // Follow live from the start
    let live: Vec<_> = h
        .registry
        .subscribe(&h.document_id, &run.run_id, 0)
        .await
        .unwrap()
        .collect()
        .await;
    assert!(live.last().unwrap().event.is_terminal());
    assert!(live.iter().enumerate().all(|(i, e)| e.seq == i));

    let done = h.registry.wait_for_completion(&h.document_id, &run.run_id).await.unwrap();
    let highlight_events = live
        .iter()
        .filter(|e| matches!(e.event, RunEvent::Highlight { .. }))
        .count();
    assert_eq!(highlight_events, done.emitted_count);

    // Wait for the collector to see the channel close
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let slice = h.registry.events(&h.document_id, &run.run_id, 0).await.unwrap();
            if slice.complete {
                break slice;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("event log never closed");

    let tail = h.registry.events(&h.document_id, &run.run_id, 3).await.unwrap();
    assert_eq!(tail.events.len(), live.len() - 3);
    assert_eq!(tail.events[0].seq, 3);
    assert_eq!(tail.next_since, live.len());
    assert!(tail.complete);

    let past_end = h
        .registry
        .events(&h.document_id, &run.run_id, live.len() + 5)
        .await
        .unwrap();
    assert!(past_end.events.is_empty());
    assert_eq!(past_end.next_since, live.len() + 5);

    // Replay from a cursor after the run is over
    let replay: Vec<_> = h
        .registry
        .subscribe(&h.document_id, &run.run_id, 2)
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(replay.len(), live.len() - 2);
    assert_eq!(replay, live[2..].to_vec());
}

#[tokio::test]
async fn test_clear_during_run_keeps_later_highlights() {
    let scorer = Arc::new(GatedScorer::new(0.9));
    let h = harness(Arc::new(PagedLines::uniform(4)), scorer.clone(), engine_config(2)).await;

    let run = h.registry.start(&h.document_id, dense()).await.unwrap();
    scorer.wait_for_calls(1).await;

    // First batch lands, second one is held
    scorer.release(1);
    scorer.wait_for_calls(2).await;
    assert_eq!(h.documents.clear_highlights(&h.document_id).await.unwrap(), 2);

    scorer.release(1);
    let done = h.registry.wait_for_completion(&h.document_id, &run.run_id).await.unwrap();
    assert_eq!(done.state, RunState::Completed);
    assert_eq!(done.emitted_count, 4);

    let events: Vec<_> = h
        .registry
        .subscribe(&h.document_id, &run.run_id, 0)
        .await
        .unwrap()
        .collect()
        .await;
    let emitted: Vec<String> = events
        .iter()
        .filter_map(|e| match &e.event {
            RunEvent::Highlight { highlight, .. } => Some(highlight.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(emitted.len(), done.emitted_count);

    let document = h.documents.get(&h.document_id).await.unwrap();
    let kept: Vec<String> = document.highlights.iter().map(|h| h.id.clone()).collect();
    assert_eq!(kept, emitted[2..].to_vec());
    assert_eq!(h.persistence.count_highlights(&h.document_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_run_of_other_document_is_not_found() {
    let h = harness(
        Arc::new(PagedLines::uniform(2)),
        Arc::new(ScriptedScorer::constant(0.9)),
        engine_config(2),
    )
    .await;
    let run = h.registry.start(&h.document_id, dense()).await.unwrap();
    h.registry.wait_for_completion(&h.document_id, &run.run_id).await.unwrap();

    assert!(matches!(
        h.registry.fetch_highlights("another-document", &run.run_id).await,
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        h.registry.events(&h.document_id, "unknown-run", 0).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_retention_drops_unfetched_runs() {
    let h = harness(
        Arc::new(PagedLines::uniform(2)),
        Arc::new(ScriptedScorer::constant(0.9)),
        engine_config(2),
    )
    .await;
    let registry = RunRegistry::new(
        h.engine.clone(),
        RegistryConfig {
            retention_secs: 0,
            fetched_grace_secs: 3600,
            cleanup_interval_secs: 1,
        },
    );

    let run = registry.start(&h.document_id, dense()).await.unwrap();
    registry.wait_for_completion(&h.document_id, &run.run_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(registry.cleanup_expired().await, 1);
    assert!(matches!(
        registry.status(&h.document_id, &run.run_id).await,
        Err(RegistryError::NotFound(_))
    ));

    // Highlights stay on the document after the run record is gone
    let document = h.documents.get(&h.document_id).await.unwrap();
    assert_eq!(document.highlights_for_run(&run.run_id).count(), 2);
}

#[tokio::test]
async fn test_active_runs_are_never_cleaned_up() {
    let scorer = Arc::new(GatedScorer::new(0.9));
    let h = harness(Arc::new(PagedLines::uniform(2)), scorer.clone(), engine_config(2)).await;
    let registry = RunRegistry::new(
        h.engine.clone(),
        RegistryConfig {
            retention_secs: 0,
            fetched_grace_secs: 0,
            cleanup_interval_secs: 1,
        },
    );

    let run = registry.start(&h.document_id, dense()).await.unwrap();
    scorer.wait_for_calls(1).await;

    assert_eq!(registry.cleanup_expired().await, 0);
    assert_eq!(registry.len().await, 1);

    scorer.release(1);
    registry.wait_for_completion(&h.document_id, &run.run_id).await.unwrap();
}
