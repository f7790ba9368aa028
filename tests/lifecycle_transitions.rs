// ABOUTME: Tests for artifact lifecycle transitions through the state machine.
// ABOUTME: Table conformance, idempotence, authorization, concurrent writers and a proptest over trigger sequences.

use ccdeploy::authz::{Actor, Role, StaticAuthorizer};
use ccdeploy::broadcast::{ProgressBroadcaster, ProgressEvent, Topic};
use ccdeploy::error::ErrorKind;
use ccdeploy::lifecycle::{
    ArtifactStatus, LifecycleError, LifecycleMachine, Submission, Trigger, TriggerKind, next_status,
    target_status,
};
use ccdeploy::store::InMemoryStore;
use ccdeploy::types::{ArtifactId, ArtifactName};
use proptest::prelude::*;
use std::sync::Arc;

mod support;

use support::FaultyStore;

fn machine() -> (LifecycleMachine, Arc<ProgressBroadcaster>) {
    let broadcaster = Arc::new(ProgressBroadcaster::new(64));
    let machine = LifecycleMachine::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(StaticAuthorizer),
        Arc::clone(&broadcaster),
    );
    (machine, broadcaster)
}

fn admin() -> Actor {
    Actor::new("alice", Role::Admin)
}

fn trigger(kind: TriggerKind) -> Trigger {
    match kind {
        TriggerKind::ValidatePass => Trigger::ValidatePass,
        TriggerKind::ValidateFail => Trigger::ValidateFail {
            errors: vec!["missing go.mod".to_string()],
        },
        TriggerKind::Approve => Trigger::Approve,
        TriggerKind::Reject => Trigger::Reject {
            reason: "license header missing".to_string(),
        },
        TriggerKind::Deploy => Trigger::Deploy,
        TriggerKind::Activate => Trigger::Activate,
        TriggerKind::Deprecate => Trigger::Deprecate,
        TriggerKind::Submit => unreachable!("submit is not a transition"),
    }
}

async fn submitted(machine: &LifecycleMachine, version: &str) -> ArtifactId {
    let submission = Submission::new(ArtifactName::new("fabcar").unwrap(), version, "./chaincode/fabcar");
    machine.submit(submission, &admin()).await.unwrap().id
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn validate_pass_twice_stays_validated() {
    let (machine, broadcaster) = machine();
    let id = submitted(&machine, "1.0").await;
    let mut events = broadcaster.subscribe(Topic::Artifact(id.clone()));

    let first = machine
        .request_transition(&id, Trigger::ValidatePass, &Actor::system())
        .await
        .unwrap();
    let again = machine
        .request_transition(&id, Trigger::ValidatePass, &Actor::system())
        .await
        .unwrap();

    assert_eq!(first.status, ArtifactStatus::Validated);
    assert_eq!(again.status, ArtifactStatus::Validated);
    assert_eq!(again.last_transition_at, first.last_transition_at);

    match events.try_recv().unwrap() {
        ProgressEvent::ArtifactStatusChanged { from, to, trigger, .. } => {
            assert_eq!(from, ArtifactStatus::Uploaded);
            assert_eq!(to, ArtifactStatus::Validated);
            assert_eq!(trigger, TriggerKind::ValidatePass);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(events.try_recv().is_none(), "repeat must not notify again");
}

#[tokio::test]
async fn illegal_trigger_leaves_status_unchanged() {
    let (machine, _) = machine();
    let id = submitted(&machine, "1.0").await;

    let err = machine
        .request_transition(&id, Trigger::Deploy, &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: ArtifactStatus::Uploaded,
            trigger: TriggerKind::Deploy
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(machine.artifact(&id).await.unwrap().status, ArtifactStatus::Uploaded);
}

#[tokio::test]
async fn validate_fail_records_errors_and_can_be_repeated() {
    let (machine, _) = machine();
    let id = submitted(&machine, "1.0").await;

    let failed = machine
        .request_transition(
            &id,
            Trigger::ValidateFail {
                errors: vec!["missing go.mod".to_string()],
            },
            &Actor::system(),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, ArtifactStatus::Uploaded);
    assert_eq!(failed.validation_errors, vec!["missing go.mod"]);

    let refailed = machine
        .request_transition(
            &id,
            Trigger::ValidateFail {
                errors: vec!["vet: unreachable code".to_string()],
            },
            &Actor::system(),
        )
        .await
        .unwrap();
    assert_eq!(refailed.validation_errors, vec!["vet: unreachable code"]);
}

#[tokio::test]
async fn approval_and_rejection_record_who_and_why() {
    let (machine, _) = machine();
    let approved = submitted(&machine, "1.0").await;
    let rejected = submitted(&machine, "1.1").await;

    for id in [&approved, &rejected] {
        machine
            .request_transition(id, Trigger::ValidatePass, &Actor::system())
            .await
            .unwrap();
    }

    let a = machine
        .request_transition(&approved, Trigger::Approve, &admin())
        .await
        .unwrap();
    assert_eq!(a.approved_by.as_deref(), Some("alice"));

    let r = machine
        .request_transition(
            &rejected,
            Trigger::Reject {
                reason: "unsafe dependency".to_string(),
            },
            &admin(),
        )
        .await
        .unwrap();
    assert_eq!(r.status, ArtifactStatus::Rejected);
    assert_eq!(r.rejection_reason.as_deref(), Some("unsafe dependency"));

    let err = machine
        .request_transition(&rejected, Trigger::Approve, &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn role_table_is_enforced_before_anything_else() {
    let (machine, _) = machine();
    let id = submitted(&machine, "1.0").await;

    let viewer = Actor::new("eve", Role::Viewer);
    let err = machine
        .request_transition(&id, Trigger::ValidatePass, &viewer)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    machine
        .request_transition(&id, Trigger::ValidatePass, &Actor::system())
        .await
        .unwrap();
    let org_admin = Actor::new("bob", Role::OrgAdmin);
    let err = machine
        .request_transition(&id, Trigger::Approve, &org_admin)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // The system identity cannot approve either.
    let err = machine
        .request_transition(&id, Trigger::Approve, &Actor::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(machine.artifact(&id).await.unwrap().status, ArtifactStatus::Validated);
}

#[tokio::test]
async fn viewers_cannot_submit() {
    let (machine, _) = machine();
    let submission = Submission::new(ArtifactName::new("fabcar").unwrap(), "1.0", "./cc");
    let err = machine
        .submit(submission, &Actor::new("eve", Role::Viewer))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn duplicate_name_and_version_is_a_conflict() {
    let (machine, _) = machine();
    submitted(&machine, "1.0").await;

    let submission = Submission::new(ArtifactName::new("fabcar").unwrap(), "1.0", "./other");
    let err = machine.submit(submission, &admin()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn malformed_versions_are_rejected() {
    let (machine, _) = machine();
    for version in ["", "1.0 beta", "v1/2", "123456789012345678901"] {
        let submission = Submission::new(ArtifactName::new("fabcar").unwrap(), version, "./cc");
        let err = machine.submit(submission, &admin()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "version {version:?}");
    }
}

#[tokio::test]
async fn unknown_artifact_is_not_found() {
    let (machine, _) = machine();
    let err = machine
        .request_transition(&ArtifactId::new("nope"), Trigger::ValidatePass, &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Concurrent writers
// =============================================================================

async fn validated(machine: &LifecycleMachine, version: &str) -> ArtifactId {
    let id = submitted(machine, version).await;
    machine
        .request_transition(&id, Trigger::ValidatePass, &Actor::system())
        .await
        .unwrap();
    id
}

async fn activated(machine: &LifecycleMachine, version: &str) -> ccdeploy::lifecycle::Artifact {
    let id = validated(machine, version).await;
    machine.request_transition(&id, Trigger::Approve, &admin()).await.unwrap();
    machine.request_transition(&id, Trigger::Deploy, &admin()).await.unwrap();
    machine
        .request_transition(&id, Trigger::Activate, &Actor::system())
        .await
        .unwrap()
}

#[tokio::test]
async fn lost_compare_and_swap_is_a_concurrent_modification() {
    let store = FaultyStore::new();
    let broadcaster = Arc::new(ProgressBroadcaster::new(64));
    let machine = LifecycleMachine::new(store.clone(), Arc::new(StaticAuthorizer), Arc::clone(&broadcaster));
    let id = validated(&machine, "1.0").await;
    let mut events = broadcaster.subscribe(Topic::Artifact(id.clone()));
    store.contend_updates(true);

    let err = machine
        .request_transition(&id, Trigger::Approve, &admin())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    assert!(matches!(
        err,
        LifecycleError::ConcurrentModification {
            expected: ArtifactStatus::Validated,
            ..
        }
    ));
    assert!(err.to_string().contains("validated"));
    assert!(events.try_recv().is_none(), "a lost write must not notify");
    assert_eq!(machine.artifact(&id).await.unwrap().status, ArtifactStatus::Validated);
}

#[tokio::test]
async fn superseded_version_moved_on_by_someone_else_is_skipped() {
    let store = FaultyStore::new();
    let machine = LifecycleMachine::new(
        store.clone(),
        Arc::new(StaticAuthorizer),
        Arc::new(ProgressBroadcaster::new(64)),
    );
    let old = activated(&machine, "1.0").await;
    let new = activated(&machine, "2.0").await;
    store.contend_updates(true);

    let retired = machine.deprecate_superseded(&new).await.unwrap();

    assert!(retired.is_empty());
    assert_eq!(machine.artifact(&old.id).await.unwrap().status, ArtifactStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_approve_and_reject_have_exactly_one_winner() {
    for round in 0..20 {
        let (machine, broadcaster) = machine();
        let machine = Arc::new(machine);
        let id = validated(&machine, "1.0").await;
        let mut events = broadcaster.subscribe(Topic::Artifact(id.clone()));

        let race = |kind: TriggerKind| {
            let machine = Arc::clone(&machine);
            let id = id.clone();
            tokio::spawn(async move { machine.request_transition(&id, trigger(kind), &admin()).await })
        };
        let (approve, reject) = tokio::join!(race(TriggerKind::Approve), race(TriggerKind::Reject));
        let outcomes = [approve.unwrap(), reject.unwrap()];

        let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "round {round}: {outcomes:?}");
        let loser = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
        assert!(
            matches!(
                loser.kind(),
                ErrorKind::ConcurrentModification | ErrorKind::InvalidTransition
            ),
            "round {round}: {loser}"
        );

        let stored = machine.artifact(&id).await.unwrap();
        assert_eq!(stored.status, winners[0].status);
        assert!(events.try_recv().is_some());
        assert!(events.try_recv().is_none(), "round {round}: loser notified");
    }
}

// =============================================================================
// Properties
// =============================================================================

fn any_trigger() -> impl Strategy<Value = TriggerKind> {
    prop::sample::select(
        TriggerKind::ALL
            .into_iter()
            .filter(|k| *k != TriggerKind::Submit)
            .collect::<Vec<_>>(),
    )
}

proptest! {
    #[test]
    fn every_request_follows_the_table(kinds in prop::collection::vec(any_trigger(), 0..16)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let (machine, _) = machine();
            let id = submitted(&machine, "1.0").await;
            let mut status = ArtifactStatus::Uploaded;

            for kind in kinds {
                let result = machine.request_transition(&id, trigger(kind), &admin()).await;
                let expected = if target_status(kind) == Some(status) {
                    Some(status)
                } else {
                    next_status(status, kind)
                };

                match (result, expected) {
                    (Ok(artifact), Some(next)) => {
                        prop_assert_eq!(artifact.status, next);
                        status = next;
                    }
                    (Err(LifecycleError::InvalidTransition { from, trigger }), None) => {
                        prop_assert_eq!(from, status);
                        prop_assert_eq!(trigger, kind);
                    }
                    (other, expected) => {
                        prop_assert!(false, "{kind} from {status}: got {other:?}, expected {expected:?}");
                    }
                }

                prop_assert_eq!(machine.artifact(&id).await.unwrap().status, status);
            }
            Ok(())
        })?;
    }

    #[test]
    fn status_rank_never_decreases(kinds in prop::collection::vec(any_trigger(), 0..16)) {
        let mut status = ArtifactStatus::Uploaded;
        for kind in kinds {
            if let Some(next) = next_status(status, kind) {
                prop_assert!(next.rank() >= status.rank());
                status = next;
            }
        }
    }
}
