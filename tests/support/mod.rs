// ABOUTME: Test support utilities.
// ABOUTME: Scripted command executor, a small pipeline config and orchestrator helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use ccdeploy::authz::{Actor, Role};
use ccdeploy::config::Config;
use ccdeploy::executor::{CommandExecutor, CommandFailure, CommandOutput, CommandSpec};
use ccdeploy::lifecycle::{Artifact, ArtifactStatus, Submission, Trigger};
use ccdeploy::orchestrator::{DeploymentAttempt, Orchestrator, RunningMarker};
use ccdeploy::resilience::Clock;
use ccdeploy::store::{ClaimOutcome, InMemoryStore, LifecycleStore, SegmentKey, StoreError, WriteResult};
use ccdeploy::tracker::StepRecord;
use ccdeploy::types::{ArtifactId, ArtifactName, AttemptId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::Semaphore;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("ccdeploy=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// What one scripted call does.
#[derive(Debug, Clone)]
pub enum Reply {
    Stdout(String),
    Stderr(String),
    Fail(CommandFailure),
    Exit(i32, String),
    /// Never returns; only the caller's timeout ends it.
    Hang,
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Stdout(String::new())
    }

    pub fn timeout() -> Self {
        Reply::Fail(CommandFailure::Timeout(Duration::from_secs(10)))
    }

    pub fn refused() -> Self {
        Reply::Fail(CommandFailure::ConnectionRefused("dial tcp 127.0.0.1:7051".to_string()))
    }
}

/// Executor whose replies are scripted per program name.
///
/// Queued replies are used first, then the program's sticky reply, then
/// an empty successful output.
#[derive(Default)]
pub struct ScriptedExecutor {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn then(&self, program: &str, reply: Reply) -> &Self {
        self.queued
            .lock()
            .entry(program.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn always(&self, program: &str, reply: Reply) -> &Self {
        self.sticky.lock().insert(program.to_string(), reply);
        self
    }

    /// Make calls to `program` wait until the returned semaphore gets a permit.
    pub fn gate(&self, program: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .insert(program.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.program.clone()).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program)
            .count()
    }

    fn next_reply(&self, program: &str) -> Reply {
        if let Some(reply) = self
            .queued
            .lock()
            .get_mut(program)
            .and_then(|q| q.pop_front())
        {
            return reply;
        }
        self.sticky
            .lock()
            .get(program)
            .cloned()
            .unwrap_or_else(Reply::ok)
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &CommandSpec, _timeout: Duration) -> Result<CommandOutput, CommandFailure> {
        self.calls.lock().push(spec.clone());

        let gate = self.gates.lock().get(&spec.program).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let output = |exit_code, stdout: &str, stderr: &str| CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        };

        match self.next_reply(&spec.program) {
            Reply::Stdout(text) => Ok(output(0, &text, "")),
            Reply::Stderr(text) => Ok(output(0, "", &text)),
            Reply::Exit(code, stderr) => Ok(output(code, "", &stderr)),
            Reply::Fail(failure) => Err(failure),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Four steps named after their programs; `package` has a compensation.
pub const PIPELINE: &str = r#"
target: peer-network
command_timeout: 10s
retry:
  max_attempts: 3
  backoff:
    strategy: fixed
    delay: 1s
breaker:
  failure_threshold: 5
  success_threshold: 2
  reset_timeout: 30s
steps:
  - name: package
    program: package
    args: ["{name}_{version}.tar.gz", "{content}"]
    compensate:
      program: unpackage
      args: ["{name}_{version}.tar.gz"]
  - name: install
    program: install
    args: ["{name}_{version}.tar.gz"]
    capture:
      var: package_id
      after: "identifier: "
  - name: approve
    program: approve
    args: ["--channelID", "{segment}", "--package-id", "{package_id}"]
  - name: commit
    program: commit
    args: ["--channelID", "{segment}"]
"#;

pub fn pipeline() -> Config {
    Config::from_yaml(PIPELINE).unwrap()
}

pub fn admin() -> Actor {
    Actor::new("alice", Role::Admin)
}

pub fn developer() -> Actor {
    Actor::new("dev", Role::User)
}

pub fn orchestrator(config: Config, executor: Arc<ScriptedExecutor>) -> Orchestrator {
    init_tracing();
    Orchestrator::builder(config)
        .executor(executor)
        .store(Arc::new(InMemoryStore::new()))
        .build()
        .unwrap()
}

/// Orchestrator over a store the test keeps a handle to.
pub fn orchestrator_on(
    config: Config,
    executor: Arc<ScriptedExecutor>,
    store: Arc<dyn LifecycleStore>,
) -> Orchestrator {
    init_tracing();
    Orchestrator::builder(config)
        .executor(executor)
        .store(store)
        .build()
        .unwrap()
}

pub fn orchestrator_with_clock(
    config: Config,
    executor: Arc<ScriptedExecutor>,
    clock: Arc<dyn Clock>,
) -> Orchestrator {
    init_tracing();
    Orchestrator::builder(config)
        .executor(executor)
        .clock(clock)
        .build()
        .unwrap()
}

/// Submit `name@version` and take it to Approved.
pub async fn approved(orchestrator: &Orchestrator, name: &str, version: &str) -> ArtifactId {
    let submission = Submission::new(ArtifactName::new(name).unwrap(), version, format!("./chaincode/{name}"));
    let id = orchestrator
        .submit_artifact(submission, &developer())
        .await
        .unwrap();
    orchestrator
        .request_transition(&id, Trigger::ValidatePass, &Actor::system())
        .await
        .unwrap();
    orchestrator
        .request_transition(&id, Trigger::Approve, &admin())
        .await
        .unwrap();
    id
}

// =============================================================================
// Fault injection
// =============================================================================

/// An in-memory store that fails selected writes while a switch is on.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    terminal_writes_fail: AtomicBool,
    updates_contended: AtomicBool,
    release_fails: AtomicBool,
    status_at_release: Mutex<Vec<Option<ArtifactStatus>>>,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `put_attempt` fails for attempts in a terminal status.
    pub fn fail_terminal_writes(&self, on: bool) {
        self.terminal_writes_fail.store(on, Ordering::SeqCst);
    }

    /// `cas_update_artifact` reports that someone else got there first.
    pub fn contend_updates(&self, on: bool) {
        self.updates_contended.store(on, Ordering::SeqCst);
    }

    /// `release_running` fails.
    pub fn fail_release(&self, on: bool) {
        self.release_fails.store(on, Ordering::SeqCst);
    }

    pub fn attempt_count(&self) -> usize {
        self.inner.attempt_count()
    }

    /// The artifact's stored status each time a running marker was released.
    pub fn status_at_release(&self) -> Vec<Option<ArtifactStatus>> {
        self.status_at_release.lock().clone()
    }

    fn on(switch: &AtomicBool) -> bool {
        switch.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LifecycleStore for FaultyStore {
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        self.inner.insert_artifact(artifact).await
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError> {
        self.inner.get_artifact(id).await
    }

    async fn list_artifacts_by_name(&self, name: &str) -> Result<Vec<Artifact>, StoreError> {
        self.inner.list_artifacts_by_name(name).await
    }

    async fn cas_update_artifact(
        &self,
        expected: ArtifactStatus,
        artifact: &Artifact,
    ) -> Result<WriteResult, StoreError> {
        if Self::on(&self.updates_contended) {
            let current = self.inner.get_artifact(&artifact.id).await?.map(|a| a.status);
            return Ok(WriteResult::PreconditionFailed { current });
        }
        self.inner.cas_update_artifact(expected, artifact).await
    }

    async fn put_attempt(&self, attempt: &DeploymentAttempt) -> Result<(), StoreError> {
        if Self::on(&self.terminal_writes_fail) && attempt.status.is_terminal() {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.put_attempt(attempt).await
    }

    async fn get_attempt(&self, id: &AttemptId) -> Result<Option<DeploymentAttempt>, StoreError> {
        self.inner.get_attempt(id).await
    }

    async fn append_step(&self, attempt_id: &AttemptId, step: &StepRecord) -> Result<(), StoreError> {
        self.inner.append_step(attempt_id, step).await
    }

    async fn claim_running(
        &self,
        key: &SegmentKey,
        marker: &RunningMarker,
    ) -> Result<ClaimOutcome, StoreError> {
        self.inner.claim_running(key, marker).await
    }

    async fn release_running(&self, key: &SegmentKey, attempt_id: &AttemptId) -> Result<bool, StoreError> {
        if Self::on(&self.release_fails) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        let status = self.inner.get_artifact(&key.artifact_id).await?.map(|a| a.status);
        self.status_at_release.lock().push(status);
        self.inner.release_running(key, attempt_id).await
    }

    async fn running_attempt(&self, key: &SegmentKey) -> Result<Option<RunningMarker>, StoreError> {
        self.inner.running_attempt(key).await
    }
}
