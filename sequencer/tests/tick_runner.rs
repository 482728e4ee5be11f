//! Tick-level tests: batching, per-enrollment isolation, and summary counts

mod common;

use chrono::{Duration, Utc};

use common::{
    definition_with, profile, seed_enrollment, snapshot, transient, ScriptedEmailSender,
    ScriptedMessageSender,
};
use sequencer::services::{InMemoryEnrollmentStore, InMemorySequenceStore};
use sequencer::traits::EnrollmentStore;
use sequencer::{EngineConfig, SequencerEngine, TickRunner, TickSummary};
use shared::{Channel, EnrollmentStatus, LeadEnrollment, LeadId, TenantId};

fn runner(
    email: ScriptedEmailSender,
    messenger: ScriptedMessageSender,
    sequences: InMemorySequenceStore,
    enrollments: InMemoryEnrollmentStore,
    config: EngineConfig,
) -> TickRunner<ScriptedEmailSender, ScriptedMessageSender, InMemorySequenceStore, InMemoryEnrollmentStore>
{
    TickRunner::new(SequencerEngine::new(
        email, messenger, sequences, enrollments, config,
    ))
}

#[tokio::test]
async fn test_empty_store_yields_empty_summary() {
    let runner = runner(
        ScriptedEmailSender::always_ok(),
        ScriptedMessageSender::always_ok(),
        InMemorySequenceStore::new(),
        InMemoryEnrollmentStore::new(),
        EngineConfig::default(),
    );

    let summary = runner.run_tick(Utc::now()).await.unwrap();
    assert_eq!(summary, TickSummary::default());
}

#[tokio::test]
async fn test_mixed_batch_counts_each_outcome() {
    let email = ScriptedEmailSender::always_ok();
    let messenger = ScriptedMessageSender::with_responses(vec![transient("provider hiccup")]);
    let sequences = InMemorySequenceStore::new();
    let enrollments = InMemoryEnrollmentStore::new();

    let t0 = Utc::now();
    let tenant = TenantId::new();
    let email_definition = definition_with(tenant.clone(), &[(0, Channel::Email)]);
    let messaging_definition = definition_with(tenant.clone(), &[(0, Channel::Messaging)]);

    seed_enrollment(
        &sequences,
        &enrollments,
        email_definition.clone(),
        profile(Some("a@example.com"), None),
        t0,
    )
    .await;
    seed_enrollment(
        &sequences,
        &enrollments,
        email_definition,
        profile(Some("b@example.com"), None),
        t0,
    )
    .await;
    seed_enrollment(
        &sequences,
        &enrollments,
        messaging_definition,
        profile(None, Some("+15550001111")),
        t0,
    )
    .await;

    let runner = runner(
        email.clone(),
        messenger,
        sequences,
        enrollments,
        EngineConfig::default(),
    );
    let summary = runner.run_tick(t0).await.unwrap();

    assert_eq!(summary.evaluated, 3);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(email.sent_count().await, 2);
}

#[tokio::test]
async fn test_broken_enrollment_does_not_stall_the_batch() {
    let email = ScriptedEmailSender::always_ok();
    let sequences = InMemorySequenceStore::new();
    let enrollments = InMemoryEnrollmentStore::new();

    let t0 = Utc::now();
    let tenant = TenantId::new();

    // Healthy enrollment with a stored definition
    seed_enrollment(
        &sequences,
        &enrollments,
        definition_with(tenant.clone(), &[(0, Channel::Email)]),
        profile(Some("a@example.com"), None),
        t0,
    )
    .await;

    // Orphaned enrollment: its definition was never stored
    let orphan_definition = definition_with(tenant, &[(0, Channel::Email)]);
    let orphan = LeadEnrollment::enroll(
        LeadId::new(),
        &orphan_definition,
        profile(Some("b@example.com"), None),
        t0,
    )
    .unwrap();
    enrollments.insert(orphan).await.unwrap();

    let runner = runner(
        email.clone(),
        ScriptedMessageSender::always_ok(),
        sequences,
        enrollments,
        EngineConfig::default(),
    );
    let summary = runner.run_tick(t0).await.unwrap();

    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(email.sent_count().await, 1);
}

#[tokio::test]
async fn test_enrollment_completes_across_successive_ticks() {
    let email = ScriptedEmailSender::always_ok();
    let sequences = InMemorySequenceStore::new();
    let enrollments = InMemoryEnrollmentStore::new();

    let t0 = Utc::now();
    let id = seed_enrollment(
        &sequences,
        &enrollments,
        definition_with(TenantId::new(), &[(0, Channel::Email)]),
        profile(Some("a@example.com"), None),
        t0,
    )
    .await;

    let runner = runner(
        email.clone(),
        ScriptedMessageSender::always_ok(),
        sequences,
        enrollments.clone(),
        EngineConfig::default(),
    );

    let first = runner.run_tick(t0).await.unwrap();
    assert_eq!(first.dispatched, 1);
    assert_eq!(first.completed, 0);

    let second = runner.run_tick(t0 + Duration::seconds(30)).await.unwrap();
    assert_eq!(second.evaluated, 1);
    assert_eq!(second.completed, 1);

    // Terminal enrollments drop out of the due index
    let third = runner.run_tick(t0 + Duration::minutes(1)).await.unwrap();
    assert_eq!(third.evaluated, 0);

    let state = snapshot(&enrollments, &id).await.enrollment;
    assert_eq!(state.status, EnrollmentStatus::Completed);
    assert_eq!(email.sent_count().await, 1);
}

#[tokio::test]
async fn test_batch_size_bounds_a_tick() {
    let email = ScriptedEmailSender::always_ok();
    let sequences = InMemorySequenceStore::new();
    let enrollments = InMemoryEnrollmentStore::new();

    let t0 = Utc::now();
    let definition = definition_with(TenantId::new(), &[(0, Channel::Email)]);
    for index in 0..3 {
        seed_enrollment(
            &sequences,
            &enrollments,
            definition.clone(),
            profile(Some(&format!("lead{index}@example.com")), None),
            t0 + Duration::milliseconds(index),
        )
        .await;
    }

    let config = EngineConfig {
        tick_batch_size: 2,
        ..EngineConfig::default()
    };
    let runner = runner(
        email.clone(),
        ScriptedMessageSender::always_ok(),
        sequences,
        enrollments,
        config,
    );

    let summary = runner.run_tick(t0 + Duration::seconds(1)).await.unwrap();
    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(email.sent_count().await, 2);
}
