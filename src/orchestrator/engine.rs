// ABOUTME: Orchestrator composition root and its builder.
// ABOUTME: Exposes the operations an API surface calls; attempts run on their own tokio tasks.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::authz::{Actor, Authorizer, StaticAuthorizer};
use crate::broadcast::{NotificationTransport, ProgressBroadcaster, Subscription, Topic};
use crate::config::Config;
use crate::executor::{CommandExecutor, ProcessExecutor};
use crate::lifecycle::{Artifact, ArtifactStatus, DeploymentStatus, LifecycleMachine, Submission, Trigger, TriggerKind};
use crate::resilience::{BreakerRegistry, BreakerSnapshot, Clock, RetryPolicy, RetryingExecutor, SystemClock};
use crate::store::{InMemoryStore, LifecycleStore};
use crate::types::{ArtifactId, AttemptId, SegmentName};

use super::attempt::{DeploymentAttempt, DeploymentStatusView};
use super::claim::RunningClaim;
use super::error::OrchestratorError;
use super::plan::{PlannedStep, StepPlan};
use super::report::{DeploymentOutcome, RollbackReport};

/// Shared state behind every clone of an [`Orchestrator`].
pub(super) struct Inner {
    pub(super) machine: LifecycleMachine,
    pub(super) store: Arc<dyn LifecycleStore>,
    pub(super) executor: RetryingExecutor,
    pub(super) broadcaster: Arc<ProgressBroadcaster>,
    pub(super) plan: StepPlan,
    pub(super) policy: RetryPolicy,
    pub(super) activate_on_success: bool,
}

impl Inner {
    pub(super) fn policy_for(&self, step: &PlannedStep) -> RetryPolicy {
        match step.timeout {
            Some(timeout) => self.policy.clone().with_timeout(timeout),
            None => self.policy.clone(),
        }
    }

    pub(super) async fn load_attempt(&self, id: &AttemptId) -> Result<DeploymentAttempt, OrchestratorError> {
        self.store
            .get_attempt(id)
            .await?
            .ok_or_else(|| OrchestratorError::AttemptNotFound(id.clone()))
    }

    /// Broadcast an attempt's status on its own topic and its artifact's.
    pub(super) fn publish_attempt(&self, attempt: &DeploymentAttempt) {
        let event = attempt.status_event();
        self.broadcaster
            .publish(&Topic::Deployment(attempt.id.clone()), &event);
        self.broadcaster
            .publish(&Topic::Artifact(attempt.artifact_id.clone()), &event);
    }
}

/// Coordinates the state machine, step tracker, retrying executor and broadcaster.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("steps", &self.inner.plan.names())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Register a new artifact; the actor must be allowed to submit.
    pub async fn submit_artifact(
        &self,
        submission: Submission,
        actor: &Actor,
    ) -> Result<ArtifactId, OrchestratorError> {
        Ok(self.inner.machine.submit(submission, actor).await?.id)
    }

    pub async fn get_artifact(&self, id: &ArtifactId) -> Result<Artifact, OrchestratorError> {
        Ok(self.inner.machine.artifact(id).await?)
    }

    pub async fn request_transition(
        &self,
        id: &ArtifactId,
        trigger: Trigger,
        actor: &Actor,
    ) -> Result<Artifact, OrchestratorError> {
        Ok(self.inner.machine.request_transition(id, trigger, actor).await?)
    }

    /// Claim the pair, persist a Running attempt and run its steps on a new task.
    pub async fn start_deployment(
        &self,
        artifact_id: &ArtifactId,
        segment: SegmentName,
        actor: &Actor,
    ) -> Result<DeploymentHandle, OrchestratorError> {
        let inner = &self.inner;
        inner.machine.authorize(actor, TriggerKind::Deploy)?;

        let artifact = inner.machine.artifact(artifact_id).await?;
        if artifact.status != ArtifactStatus::Approved {
            return Err(OrchestratorError::NotApproved {
                artifact: artifact.id,
                status: artifact.status,
            });
        }

        let mut attempt = DeploymentAttempt::new(
            artifact.id.clone(),
            segment,
            actor.clone(),
            inner.plan.names(),
        );
        attempt.transition(DeploymentStatus::Running)?;
        let claim = RunningClaim::acquire(Arc::clone(&inner.store), attempt.key(), attempt.id.clone()).await?;

        if let Err(e) = inner.store.put_attempt(&attempt).await {
            if let Err(release) = claim.release().await {
                tracing::error!(attempt = %attempt.id, error = %release, "could not release running marker");
            }
            return Err(e.into());
        }

        tracing::info!(
            attempt = %attempt.id,
            artifact = %artifact.label(),
            segment = %attempt.segment,
            initiator = %actor,
            "deployment started"
        );
        inner.publish_attempt(&attempt);

        let attempt_id = attempt.id.clone();
        let task = tokio::spawn(Arc::clone(inner).run(attempt, artifact, claim));

        Ok(DeploymentHandle { attempt_id, task })
    }

    pub async fn get_deployment_status(&self, id: &AttemptId) -> Result<DeploymentStatusView, OrchestratorError> {
        Ok(self.inner.load_attempt(id).await?.view())
    }

    /// Compensate a Failed attempt's completed steps in reverse order.
    pub async fn rollback(&self, id: &AttemptId, actor: &Actor) -> Result<RollbackReport, OrchestratorError> {
        self.inner.rollback(id, actor).await
    }

    pub fn subscribe_to_deployment(&self, id: &AttemptId) -> Subscription {
        self.inner.broadcaster.subscribe(Topic::Deployment(id.clone()))
    }

    pub fn subscribe_to_artifact(&self, id: &ArtifactId) -> Subscription {
        self.inner.broadcaster.subscribe(Topic::Artifact(id.clone()))
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.inner.executor.breakers().snapshots()
    }

    pub fn plan(&self) -> &StepPlan {
        &self.inner.plan
    }
}

/// A running attempt. Awaiting it yields the terminal outcome; dropping it detaches.
#[derive(Debug)]
pub struct DeploymentHandle {
    attempt_id: AttemptId,
    task: JoinHandle<Result<DeploymentOutcome, OrchestratorError>>,
}

impl DeploymentHandle {
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    pub async fn wait(self) -> Result<DeploymentOutcome, OrchestratorError> {
        self.task.await.map_err(|e| OrchestratorError::TaskAborted {
            attempt: self.attempt_id,
            reason: e.to_string(),
        })?
    }
}

/// Wires an [`Orchestrator`]; anything not supplied gets the in-process default.
pub struct OrchestratorBuilder {
    config: Config,
    store: Option<Arc<dyn LifecycleStore>>,
    executor: Option<Arc<dyn CommandExecutor>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    clock: Option<Arc<dyn Clock>>,
    transports: Vec<Arc<dyn NotificationTransport>>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            executor: None,
            authorizer: None,
            clock: None,
            transports: Vec::new(),
        }
    }

    pub fn store(mut self, store: Arc<dyn LifecycleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn build(self) -> crate::error::Result<Orchestrator> {
        let config = self.config;
        config.validate()?;
        let plan = StepPlan::from_config(&config)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let executor = self.executor.unwrap_or_else(|| Arc::new(ProcessExecutor::new()));
        let authorizer = self.authorizer.unwrap_or_else(|| Arc::new(StaticAuthorizer));

        let broadcaster = Arc::new(
            self.transports
                .into_iter()
                .fold(ProgressBroadcaster::new(config.subscriber_capacity), |b, t| {
                    b.with_transport(t)
                }),
        );
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone(), Arc::clone(&clock)));

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                machine: LifecycleMachine::new(Arc::clone(&store), authorizer, Arc::clone(&broadcaster)),
                store,
                executor: RetryingExecutor::new(executor, breakers, clock),
                broadcaster,
                policy: RetryPolicy::from_config(&config.retry, config.command_timeout),
                plan,
                activate_on_success: config.activate_on_success,
            }),
        })
    }
}
