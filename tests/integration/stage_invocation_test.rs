//! Stage Invocation Integration Tests
//!
//! Drives the orchestrator against the scripted backend:
//! - Busy/result/progress lifecycle of a successful stage
//! - Failures keep the previous result and carry a readable message
//! - Authorization responses leave a resume ticket and redirect
//! - Results arriving after shutdown are dropped
//! - Server-push progress is reconciled with the simulation

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;

use seo_pipeline_api::ApiError;
use seo_pipeline_client::models::settings::ClientConfig;
use seo_pipeline_client::InvocationOutcome;
use seo_pipeline_core::{ProgressEvent, Stage, StageUpdate};

use crate::mock_backend::{harness, harness_with};

// ============================================================================
// Helpers
// ============================================================================

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn drain(rx: &mut broadcast::Receiver<StageUpdate>) -> Vec<StageUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

fn progress_values(updates: &[StageUpdate], stage: Stage) -> Vec<u8> {
    updates
        .iter()
        .filter_map(|u| match u {
            StageUpdate::Progress { stage: s, percent } if *s == stage => Some(*percent),
            _ => None,
        })
        .collect()
}

fn busy_flips(updates: &[StageUpdate], stage: Stage) -> Vec<bool> {
    updates
        .iter()
        .filter_map(|u| match u {
            StageUpdate::Busy { stage: s, busy } if *s == stage => Some(*busy),
            _ => None,
        })
        .collect()
}

fn url_progress(percent: f64) -> ProgressEvent {
    ProgressEvent::UrlSuccess {
        progress_percent: Some(percent),
        message: None,
    }
}

// ============================================================================
// Success path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_parsing_end_to_end() {
    let h = harness();
    let data = json!([{"url": "https://competitor.example/a", "words": 1200}]);
    h.backend.respond(
        Stage::Parsing,
        ms(50),
        Ok(json!({"success": true, "data": data.clone(), "message": "ok"})),
    );
    let mut updates = h.orchestrator.subscribe();

    let orchestrator = h.orchestrator.clone();
    let params = json!({"region": "213", "domain": "example.com"});
    let task = tokio::spawn(async move { orchestrator.invoke(Stage::Parsing, params).await });

    tokio::time::sleep(ms(10)).await;
    assert!(h.orchestrator.snapshot(Stage::Parsing).unwrap().busy);

    let outcome = task.await.unwrap();
    assert_eq!(outcome, InvocationOutcome::Completed { data: data.clone() });

    let snap = h.orchestrator.snapshot(Stage::Parsing).unwrap();
    assert!(!snap.busy);
    assert_eq!(snap.result, Some(data));
    assert_eq!(snap.message.as_deref(), Some("ok"));
    assert!(snap.error.is_none());

    tokio::time::sleep(ms(1500)).await;
    assert_eq!(h.orchestrator.snapshot(Stage::Parsing).unwrap().progress, 0);

    let updates = drain(&mut updates);
    assert_eq!(busy_flips(&updates, Stage::Parsing), vec![true, false]);
    let progress = progress_values(&updates, Stage::Parsing);
    assert_eq!(progress.iter().filter(|p| **p == 100).count(), 1);
    assert_eq!(progress.last(), Some(&0));

    let calls = h.backend.stage_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["domain"], "example.com");
}

#[tokio::test(start_paused = true)]
async fn test_success_message_clears_after_ttl() {
    let h = harness();
    h.backend.respond(
        Stage::Cleaning,
        ms(10),
        Ok(json!({"success": true, "data": {"removed": 3}, "message": "Cleaned"})),
    );

    h.orchestrator.invoke(Stage::Cleaning, json!({})).await;
    assert_eq!(
        h.orchestrator.snapshot(Stage::Cleaning).unwrap().message.as_deref(),
        Some("Cleaned")
    );

    tokio::time::sleep(ms(4100)).await;
    assert!(h.orchestrator.snapshot(Stage::Cleaning).unwrap().message.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_simulated_progress_stays_below_cap_while_busy() {
    let mut config = ClientConfig::default();
    config.registry.safety_timeout_secs = 600;
    let h = harness_with(config);
    h.backend.respond(
        Stage::Clustering,
        Duration::from_secs(120),
        Ok(json!({"success": true, "data": {"clusters": []}})),
    );
    let mut updates = h.orchestrator.subscribe();

    let orchestrator = h.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.invoke(Stage::Clustering, json!({})).await });

    tokio::time::sleep(Duration::from_secs(119)).await;
    let before = progress_values(&drain(&mut updates), Stage::Clustering);
    assert!(!before.is_empty());
    assert!(before.iter().all(|p| *p < 85));
    assert!(before.windows(2).all(|w| w[0] <= w[1]));

    assert!(task.await.unwrap().is_completed());
    tokio::time::sleep(ms(500)).await;
    let after = progress_values(&drain(&mut updates), Stage::Clustering);
    assert!(after.contains(&100));
}

#[tokio::test(start_paused = true)]
async fn test_distinct_stages_run_concurrently() {
    let h = harness();
    h.backend.respond(Stage::Frequencies, ms(300), Ok(json!({"success": true, "data": [1]})));
    h.backend.respond(Stage::DemandClicks, ms(100), Ok(json!({"success": true, "data": [2]})));

    let a = h.orchestrator.clone();
    let b = h.orchestrator.clone();
    let first = tokio::spawn(async move { a.invoke(Stage::Frequencies, json!({})).await });
    let second = tokio::spawn(async move { b.invoke(Stage::DemandClicks, json!({})).await });

    tokio::time::sleep(ms(150)).await;
    assert!(h.orchestrator.is_busy(Stage::Frequencies));
    assert!(!h.orchestrator.is_busy(Stage::DemandClicks));

    assert!(first.await.unwrap().is_completed());
    assert!(second.await.unwrap().is_completed());
}

// ============================================================================
// Failure path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_previous_result() {
    let h = harness();
    h.backend.respond(
        Stage::Competition,
        ms(10),
        Ok(json!({"success": true, "data": {"score": 7}})),
    );
    h.orchestrator.invoke(Stage::Competition, json!({})).await;

    h.backend.respond(
        Stage::Competition,
        ms(10),
        Ok(json!({
            "success": false,
            "detail": [
                {"loc": ["body", "region"], "msg": "field required"},
                {"loc": ["body", "keywords", 0], "msg": "too short"}
            ]
        })),
    );
    let outcome = h.orchestrator.invoke(Stage::Competition, json!({})).await;

    assert_eq!(
        outcome.error_message(),
        Some("region: field required; keywords.0: too short")
    );
    let snap = h.orchestrator.snapshot(Stage::Competition).unwrap();
    assert!(!snap.busy);
    assert_eq!(snap.result, Some(json!({"score": 7})));
    assert_eq!(snap.error.as_deref(), outcome.error_message());
    assert_eq!(snap.progress, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_becomes_stage_error() {
    let h = harness();
    h.backend.respond(
        Stage::Commercialization,
        ms(20),
        Err(ApiError::network("connection refused")),
    );

    let outcome = h.orchestrator.invoke(Stage::Commercialization, json!({})).await;

    assert_eq!(
        outcome,
        InvocationOutcome::Failed {
            message: "Network error: connection refused".to_string()
        }
    );
    assert!(!h.orchestrator.is_busy(Stage::Commercialization));
}

#[tokio::test(start_paused = true)]
async fn test_next_invocation_clears_error() {
    let h = harness();
    h.backend.respond(
        Stage::SearchSuggestions,
        ms(10),
        Ok(json!({"success": false, "message": "Quota exceeded"})),
    );
    h.orchestrator.invoke(Stage::SearchSuggestions, json!({})).await;
    assert!(h.orchestrator.snapshot(Stage::SearchSuggestions).unwrap().error.is_some());

    h.backend.respond(
        Stage::SearchSuggestions,
        ms(100),
        Ok(json!({"success": true, "data": []})),
    );
    let orchestrator = h.orchestrator.clone();
    let task = tokio::spawn(async move {
        orchestrator.invoke(Stage::SearchSuggestions, json!({})).await
    });
    tokio::time::sleep(ms(10)).await;
    assert!(h.orchestrator.snapshot(Stage::SearchSuggestions).unwrap().error.is_none());
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_safety_timeout_clears_busy_but_result_still_lands() {
    let h = harness();
    h.backend.respond(
        Stage::CollocationAnalysis,
        Duration::from_secs(60),
        Ok(json!({"success": true, "data": {"pmi": []}})),
    );
    let mut updates = h.orchestrator.subscribe();

    let orchestrator = h.orchestrator.clone();
    let task = tokio::spawn(async move {
        orchestrator.invoke(Stage::CollocationAnalysis, json!({})).await
    });

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!h.orchestrator.is_busy(Stage::CollocationAnalysis));
    assert!(!task.is_finished());

    assert!(task.await.unwrap().is_completed());
    let snap = h.orchestrator.snapshot(Stage::CollocationAnalysis).unwrap();
    assert_eq!(snap.result, Some(json!({"pmi": []})));
    assert_eq!(
        busy_flips(&drain(&mut updates), Stage::CollocationAnalysis),
        vec![true, false]
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_result_leaves_newer_invocation_progress_alone() {
    let h = harness();
    h.backend.respond(
        Stage::Parsing,
        Duration::from_secs(40),
        Ok(json!({"success": true, "data": ["old"]})),
    );
    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.invoke(Stage::Parsing, json!({})).await });

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!h.orchestrator.is_busy(Stage::Parsing));

    h.backend.respond(
        Stage::Parsing,
        Duration::from_secs(60),
        Ok(json!({"success": true, "data": ["new"]})),
    );
    let orchestrator = h.orchestrator.clone();
    let second = tokio::spawn(async move { orchestrator.invoke(Stage::Parsing, json!({})).await });
    tokio::time::sleep(ms(5500)).await;
    let before = h.orchestrator.snapshot(Stage::Parsing).unwrap().progress;
    assert!(before > 0);

    assert!(first.await.unwrap().is_completed());
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snap = h.orchestrator.snapshot(Stage::Parsing).unwrap();
    assert!(snap.busy);
    assert!(snap.progress >= before && snap.progress < 85);
    assert_eq!(snap.result, Some(json!(["old"])));

    assert!(second.await.unwrap().is_completed());
    let snap = h.orchestrator.snapshot(Stage::Parsing).unwrap();
    assert!(!snap.busy);
    assert_eq!(snap.result, Some(json!(["new"])));
}

#[tokio::test(start_paused = true)]
async fn test_late_failure_does_not_touch_newer_invocation() {
    let h = harness();
    h.backend.respond(
        Stage::Clustering,
        Duration::from_secs(40),
        Err(ApiError::network("connection reset")),
    );
    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.invoke(Stage::Clustering, json!({})).await });

    tokio::time::sleep(Duration::from_secs(31)).await;
    h.backend.respond(
        Stage::Clustering,
        Duration::from_secs(60),
        Ok(json!({"success": true, "data": {"clusters": 4}})),
    );
    let orchestrator = h.orchestrator.clone();
    let second = tokio::spawn(async move { orchestrator.invoke(Stage::Clustering, json!({})).await });
    tokio::time::sleep(ms(5500)).await;

    let stale = first.await.unwrap();
    assert_eq!(stale.error_message(), Some("Network error: connection reset"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snap = h.orchestrator.snapshot(Stage::Clustering).unwrap();
    assert!(snap.busy);
    assert!(snap.error.is_none());
    assert!(snap.progress > 0);

    assert!(second.await.unwrap().is_completed());
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_authorization_saves_ticket_and_redirects() {
    let h = harness();
    h.backend.respond(
        Stage::Parsing,
        ms(20),
        Ok(json!({"requires_auth": true, "auth_url": "https://oauth.example.com/authorize?state=1"})),
    );
    let params = json!({"region": "213", "domain": "example.com"});

    let outcome = h.orchestrator.invoke(Stage::Parsing, params.clone()).await;

    assert_eq!(
        outcome,
        InvocationOutcome::AuthorizationRequired {
            auth_url: "https://oauth.example.com/authorize?state=1".to_string()
        }
    );
    assert_eq!(h.redirector.opened().len(), 1);

    use seo_pipeline_client::storage::durable::DurableStore;
    assert_eq!(
        h.durable.get("autoResumeParsing").unwrap().as_deref(),
        Some("true")
    );
    let saved: Value =
        serde_json::from_str(&h.durable.get("parsingParams").unwrap().unwrap()).unwrap();
    assert_eq!(saved, params);

    let snap = h.orchestrator.snapshot(Stage::Parsing).unwrap();
    assert!(!snap.busy);
    assert!(snap.result.is_none());
    assert!(snap.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_authorization_for_non_resumable_stage_leaves_no_ticket() {
    let h = harness();
    h.backend.respond(
        Stage::KeywordsAnalysis,
        ms(20),
        Ok(json!({"requires_auth": true, "auth_url": "https://oauth.example.com/authorize"})),
    );

    let outcome = h.orchestrator.invoke(Stage::KeywordsAnalysis, json!({})).await;

    assert!(matches!(outcome, InvocationOutcome::AuthorizationRequired { .. }));
    assert!(h.durable.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_authorization_without_url_is_failure() {
    let h = harness();
    h.backend.respond(Stage::Parsing, ms(20), Ok(json!({"requires_auth": true})));

    let outcome = h.orchestrator.invoke(Stage::Parsing, json!({})).await;

    assert!(outcome
        .error_message()
        .unwrap()
        .contains("no authorization URL"));
    assert!(h.redirector.opened().is_empty());
    assert!(h.durable.is_empty());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_result_after_shutdown_is_dropped() {
    let h = harness();
    h.backend.respond(
        Stage::Frequencies,
        ms(200),
        Ok(json!({"success": true, "data": [1, 2, 3]})),
    );

    let orchestrator = h.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.invoke(Stage::Frequencies, json!({})).await });
    tokio::time::sleep(ms(50)).await;
    h.orchestrator.shutdown();

    assert_eq!(task.await.unwrap(), InvocationOutcome::Discarded);
    assert!(h.orchestrator.snapshot(Stage::Frequencies).unwrap().result.is_none());
    assert_eq!(
        h.orchestrator.invoke(Stage::Frequencies, json!({})).await,
        InvocationOutcome::Discarded
    );
}

// ============================================================================
// Server-push progress
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stream_progress_is_monotonic() {
    let mut config = ClientConfig::default();
    config.backend.streaming_stages = vec![Stage::Parsing];
    let h = harness_with(config);
    h.backend.stream(
        Stage::Parsing,
        vec![
            (ms(100), url_progress(40.0)),
            (ms(100), url_progress(30.0)),
            (ms(100), url_progress(25.0)),
            (ms(100), url_progress(60.0)),
        ],
    );
    h.backend.respond(Stage::Parsing, ms(600), Ok(json!({"success": true, "data": []})));
    let mut updates = h.orchestrator.subscribe();

    let outcome = h.orchestrator.invoke(Stage::Parsing, json!({})).await;
    assert!(outcome.is_completed());
    tokio::time::sleep(ms(500)).await;

    let progress = progress_values(&drain(&mut updates), Stage::Parsing);
    assert_eq!(&progress[..2], &[40, 60]);
    let peak = progress.iter().position(|p| *p == 100).unwrap();
    assert!(progress[..=peak].windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_fails_stage_even_if_request_succeeds() {
    let mut config = ClientConfig::default();
    config.backend.streaming_stages = vec![Stage::Parsing];
    let h = harness_with(config);
    h.backend.stream(
        Stage::Parsing,
        vec![
            (ms(50), url_progress(20.0)),
            (
                ms(50),
                ProgressEvent::Error {
                    message: Some("Search API quota exhausted".to_string()),
                },
            ),
        ],
    );
    h.backend.respond(Stage::Parsing, ms(300), Ok(json!({"success": true, "data": [1]})));
    let mut updates = h.orchestrator.subscribe();

    let outcome = h.orchestrator.invoke(Stage::Parsing, json!({})).await;
    tokio::time::sleep(ms(1500)).await;

    assert_eq!(
        outcome,
        InvocationOutcome::Failed {
            message: "Search API quota exhausted".to_string()
        }
    );
    let snap = h.orchestrator.snapshot(Stage::Parsing).unwrap();
    assert!(!snap.busy);
    assert_eq!(snap.error.as_deref(), Some("Search API quota exhausted"));
    assert!(snap.result.is_none());
    assert!(!progress_values(&drain(&mut updates), Stage::Parsing).contains(&100));
}

#[tokio::test(start_paused = true)]
async fn test_stream_complete_fast_forwards_before_response() {
    let mut config = ClientConfig::default();
    config.backend.streaming_stages = vec![Stage::Parsing];
    let h = harness_with(config);
    h.backend.stream(
        Stage::Parsing,
        vec![(
            ms(100),
            ProgressEvent::ParsingComplete {
                progress_percent: Some(70.0),
                message: Some("Parsed 10 pages".to_string()),
            },
        )],
    );
    h.backend.respond(Stage::Parsing, ms(2000), Ok(json!({"success": true, "data": []})));

    let orchestrator = h.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.invoke(Stage::Parsing, json!({})).await });

    tokio::time::sleep(ms(600)).await;
    assert_eq!(h.orchestrator.snapshot(Stage::Parsing).unwrap().progress, 100);
    assert!(h.orchestrator.is_busy(Stage::Parsing));

    assert!(task.await.unwrap().is_completed());
}
