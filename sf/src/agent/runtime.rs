//! Agent runtime
//!
//! Drives the [`StateMachine`] for many sessions at once. Per-session state
//! lives only in the [`CheckpointStore`]; the agent itself owns the session
//! gates and handles to live executor runs.
//!
//! Each session is single-threaded: an inbound message takes the session gate
//! with `try_lock` and gets a busy reply if another message holds it.
//! Executor completion takes the same gate with `lock`, reloads the
//! checkpoint and applies its result only if the task is still RUNNING, so a
//! cancellation always wins over a late result. A gate lives in the map only
//! while someone holds or waits on it.
//!
//! An agent assumes it is the only one driving its store: a RUNNING task
//! without a run in this process is treated as interrupted. The binary uses
//! [`AgentBuilder::build_exclusive`] to enforce that across processes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde_json::Value;
use slotstore::StoreLock;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::domain::{Checkpoint, SlotMap, Task, TaskKind, TaskMode, TemplateRegistry, task_id};
use crate::executor::{EchoExecutor, TaskExecutor};
use crate::extract::{KeywordExtractor, ValueExtractor};
use crate::planner::{DEFAULT_MAX_SUGGESTIONS, SlotPlanner};
use crate::state::{CheckpointStore, RecoveryStats, StateResponse, recover};
use crate::transport::{InboundEvent, OutboundEvent};

use super::error::AgentError;
use super::machine::{StateMachine, Step};

/// Default bound on one executor invocation
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Capacity of the asynchronous event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runtime tunables
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub execution_timeout: Duration,
    pub max_suggestions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }
}

pub struct AgentBuilder {
    store: CheckpointStore,
    registry: TemplateRegistry,
    executor: Arc<dyn TaskExecutor>,
    extractor: Arc<dyn ValueExtractor>,
    clock: Arc<dyn Clock>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn registry(mut self, registry: TemplateRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ValueExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Build without claiming the store; the caller keeps other agents off it
    pub fn build(self) -> Agent {
        debug!(config = ?self.config, "AgentBuilder::build: called");
        self.assemble(None)
    }

    /// Build after taking the store lock
    ///
    /// Fails while another agent, in this process or another, holds the
    /// store. The lock is released when the last handle to the agent drops.
    pub fn build_exclusive(self) -> Result<Agent, AgentError> {
        debug!(config = ?self.config, "AgentBuilder::build_exclusive: called");
        let lock = self.store.lock_exclusive()?;
        info!(path = %lock.path().display(), "Store lock acquired");
        Ok(self.assemble(Some(lock)))
    }

    fn assemble(self, lock: Option<StoreLock>) -> Agent {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Agent {
            inner: Arc::new(AgentInner {
                machine: StateMachine::new(SlotPlanner::new(self.config.max_suggestions)),
                registry: self.registry,
                store: self.store,
                executor: self.executor,
                extractor: self.extractor,
                clock: self.clock,
                config: self.config,
                gates: std::sync::Mutex::new(HashMap::new()),
                runs: Mutex::new(HashMap::new()),
                events,
                _lock: lock,
            }),
        }
    }
}

struct AgentInner {
    registry: TemplateRegistry,
    machine: StateMachine,
    store: CheckpointStore,
    executor: Arc<dyn TaskExecutor>,
    extractor: Arc<dyn ValueExtractor>,
    clock: Arc<dyn Clock>,
    config: AgentConfig,
    /// Per-session gates, keyed by session id; only touched briefly, never across an await
    gates: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Live executor runs, keyed by task id
    runs: Mutex<HashMap<String, AbortHandle>>,
    /// Asynchronous completion and failure events
    events: broadcast::Sender<OutboundEvent>,
    /// Held for the agent's lifetime when built exclusive
    _lock: Option<StoreLock>,
}

/// A held session gate
///
/// On drop the gate is released, and its map entry removed once no other
/// message or completion holds or waits on it.
struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    session_id: String,
    agent: Agent,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.agent.release_gate(&self.session_id);
    }
}

/// Cheap-to-clone handle to the agent
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Builder with the echo executor, keyword extractor and wall clock
    pub fn builder(store: CheckpointStore) -> AgentBuilder {
        AgentBuilder {
            store,
            registry: TemplateRegistry::builtin(),
            executor: Arc::new(EchoExecutor),
            extractor: Arc::new(KeywordExtractor),
            clock: Arc::new(SystemClock),
            config: AgentConfig::default(),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.inner.store
    }

    /// Subscribe to executor completion and failure events
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.inner.events.subscribe()
    }

    /// Finalize RUNNING checkpoints left by a previous process
    ///
    /// Only meaningful before this agent has started any executor, and only
    /// safe while no other process drives the store.
    pub async fn recover_interrupted(&self) -> StateResponse<RecoveryStats> {
        debug!("recover_interrupted: called");
        recover(&self.inner.store, self.inner.clock.as_ref()).await
    }

    /// Handle one inbound event; errors become `error` or `busy` events
    pub async fn handle(&self, event: InboundEvent) -> OutboundEvent {
        let session_id = event.session_id.clone();
        match self.try_handle(event).await {
            Ok(outbound) => outbound,
            Err(AgentError::ConcurrentAccess(session_id)) => {
                debug!(%session_id, "handle: session busy");
                OutboundEvent::Busy { session_id }
            }
            Err(e) => {
                warn!(?session_id, error = %e, "handle: request failed");
                OutboundEvent::Error {
                    session_id,
                    message: e.to_string(),
                }
            }
        }
    }

    pub async fn try_handle(&self, event: InboundEvent) -> Result<OutboundEvent, AgentError> {
        let session_id = event
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(crate::domain::session_id);
        debug!(%session_id, "try_handle: called");

        let _guard = self.try_enter(&session_id)?;

        let message = event.message.trim();
        match message.strip_prefix('/') {
            Some(command) => self.command(&session_id, command).await,
            None => self.message(&session_id, message).await,
        }
    }

    /// Clones are only made under the map lock, so a count of one means the
    /// map holds the last reference.
    fn gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.inner.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(session_id.to_string()).or_default())
    }

    fn release_gate(&self, session_id: &str) {
        let mut gates = self.inner.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if gates.get(session_id).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(session_id);
        }
    }

    fn guard(&self, session_id: &str, guard: OwnedMutexGuard<()>) -> SessionGuard {
        SessionGuard {
            guard: Some(guard),
            session_id: session_id.to_string(),
            agent: self.clone(),
        }
    }

    fn try_enter(&self, session_id: &str) -> Result<SessionGuard, AgentError> {
        match self.gate(session_id).try_lock_owned() {
            Ok(guard) => Ok(self.guard(session_id, guard)),
            Err(_) => {
                self.release_gate(session_id);
                Err(AgentError::ConcurrentAccess(session_id.to_string()))
            }
        }
    }

    async fn enter(&self, session_id: &str) -> SessionGuard {
        let guard = self.gate(session_id).lock_owned().await;
        self.guard(session_id, guard)
    }

    /// Checkpoint of the task currently bound to the session
    async fn current_checkpoint(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let Some(task_id) = self.inner.store.session_task(session_id).await? else {
            return Ok(None);
        };
        Ok(self.inner.store.load(&task_id).await?)
    }

    async fn is_live(&self, task_id: &str) -> bool {
        self.inner.runs.lock().await.contains_key(task_id)
    }

    /// A free-text message: an answer, or a request that starts a task
    async fn message(&self, session_id: &str, message: &str) -> Result<OutboundEvent, AgentError> {
        match self.current_checkpoint(session_id).await? {
            Some(checkpoint) if checkpoint.mode == TaskMode::NeedsInfo => {
                self.answer_required(checkpoint, message).await
            }
            Some(checkpoint) if checkpoint.mode == TaskMode::Running => {
                self.answer_running(checkpoint, message).await
            }
            Some(checkpoint) if checkpoint.mode == TaskMode::Completed && checkpoint.pending_optional.is_some() => {
                self.answer_completed(checkpoint, message).await
            }
            Some(checkpoint) => {
                debug!(task_id = %checkpoint.task_id, mode = %checkpoint.mode, "message: previous task is terminal");
                self.start_task(session_id, message).await
            }
            None => self.start_task(session_id, message).await,
        }
    }

    async fn start_task(&self, session_id: &str, request: &str) -> Result<OutboundEvent, AgentError> {
        if request.is_empty() {
            return Err(AgentError::InvalidCommand("describe a task to start".to_string()));
        }
        let inner = &self.inner;
        let now = inner.clock.now_ms();
        let template = Arc::clone(inner.registry.classify(request));
        let mut task = Task::new(task_id(), session_id, template, now);
        info!(%session_id, task_id = %task.id(), kind = %task.kind(), "Starting task");

        let step = inner.machine.start(&mut task, inner.clock.today(), now);
        inner.store.save(task.checkpoint()).await?;
        inner.store.bind_session(session_id, task.id(), now).await?;
        Ok(self.apply(&task, step).await)
    }

    async fn answer_required(&self, checkpoint: Checkpoint, message: &str) -> Result<OutboundEvent, AgentError> {
        let inner = &self.inner;
        let mut task = Task::restore(checkpoint, &inner.registry);
        if let Err(e) = inner.machine.verify_resume(&task) {
            warn!(task_id = %task.id(), error = %e, "Checkpoint does not match template");
            return self.fail_task(task, &e).await;
        }

        let today = inner.clock.today();
        let raw = self.extract(&task, task.cursor(), message).await;
        match inner.machine.answer(&mut task, &raw, today, inner.clock.now_ms()) {
            Ok(step) => {
                inner.store.save(task.checkpoint()).await?;
                Ok(self.apply(&task, step).await)
            }
            Err(AgentError::Validation { slot_id, rejection }) => {
                debug!(task_id = %task.id(), %slot_id, code = %rejection.code, "answer_required: rejected, re-asking");
                match inner.machine.current(&task, today, Some(rejection)) {
                    Some(question) => Ok(OutboundEvent::question(task.session_id(), task.id(), question)),
                    None => Err(AgentError::TemplateDrift(format!("cursor {} vanished", slot_id))),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_running(&self, checkpoint: Checkpoint, message: &str) -> Result<OutboundEvent, AgentError> {
        let inner = &self.inner;
        let mut task = Task::restore(checkpoint, &inner.registry);
        if let Err(e) = self.check_running(&task).await {
            return self.fail_task(task, &e).await;
        }
        if task.pending_optional().is_none() {
            debug!(task_id = %task.id(), "answer_running: nothing pending, still running");
            return Ok(self.running_event(&task));
        }

        let raw = self.extract(&task, task.pending_optional(), message).await;
        let step = inner
            .machine
            .answer_optional(&mut task, &raw, inner.clock.today(), inner.clock.now_ms());
        inner.store.save(task.checkpoint()).await?;
        Ok(self.apply(&task, step).await)
    }

    /// Answer to an optional follow-up the executor finished before
    ///
    /// The value is recorded on the checkpoint; the result is not recomputed.
    async fn answer_completed(&self, checkpoint: Checkpoint, message: &str) -> Result<OutboundEvent, AgentError> {
        let inner = &self.inner;
        let mut task = Task::restore(checkpoint, &inner.registry);
        if let Err(e) = inner.machine.verify_resume(&task) {
            warn!(task_id = %task.id(), error = %e, "Dropping follow-up that no longer matches the template");
            task.clear_pending_optional();
            inner.store.save(task.checkpoint()).await?;
            let session_id = task.session_id().to_string();
            return self.start_task(&session_id, message).await;
        }

        let raw = self.extract(&task, task.pending_optional(), message).await;
        let step = inner
            .machine
            .answer_optional(&mut task, &raw, inner.clock.today(), inner.clock.now_ms());
        inner.store.save(task.checkpoint()).await?;
        info!(task_id = %task.id(), "Recorded follow-up answer after completion");
        Ok(self.apply(&task, step).await)
    }

    /// A RUNNING task must match its template and have a live executor
    async fn check_running(&self, task: &Task) -> Result<(), AgentError> {
        self.inner.machine.verify_resume(task)?;
        if !self.is_live(task.id()).await {
            warn!(task_id = %task.id(), "Running task has no live executor");
            return Err(AgentError::ExecutionInterrupted);
        }
        Ok(())
    }

    /// Run the extractor for `slot_id`, falling back to the raw text
    async fn extract(&self, task: &Task, slot_id: Option<&str>, message: &str) -> String {
        let Some(slot) = slot_id.and_then(|id| task.template().slot(id)) else {
            return message.to_string();
        };
        let candidate = self
            .inner
            .extractor
            .extract(message, slot.slot_type(), self.inner.clock.today())
            .await;
        debug!(slot_id = %slot.id, ?candidate, "extract: done");
        candidate.unwrap_or_else(|| message.to_string())
    }

    /// Turn a transition into the reply event, starting the executor if asked
    async fn apply(&self, task: &Task, step: Step) -> OutboundEvent {
        match step {
            Step::Ask(question) => OutboundEvent::question(task.session_id(), task.id(), question),
            Step::Execute { slots, follow_up } => {
                self.spawn_execution(task.session_id(), task.id(), task.kind(), slots).await;
                match follow_up {
                    Some(question) => OutboundEvent::question(task.session_id(), task.id(), question),
                    None => self.running_event(task),
                }
            }
            Step::Noted { follow_up } => match follow_up {
                Some(question) => OutboundEvent::question(task.session_id(), task.id(), question),
                None => self.settled_event(task),
            },
        }
    }

    /// Reply once no question is pending: the stored result, or still running
    fn settled_event(&self, task: &Task) -> OutboundEvent {
        match (task.mode(), task.result()) {
            (TaskMode::Completed, Some(result)) => OutboundEvent::Completed {
                session_id: task.session_id().to_string(),
                task_id: task.id().to_string(),
                result: result.clone(),
            },
            _ => self.running_event(task),
        }
    }

    fn running_event(&self, task: &Task) -> OutboundEvent {
        OutboundEvent::Running {
            session_id: task.session_id().to_string(),
            task_id: task.id().to_string(),
            progress: self.inner.machine.planner().progress(task),
        }
    }

    /// Start the executor for a task that just entered RUNNING
    ///
    /// Called with the session gate held, so completion cannot be applied
    /// before the caller has replied.
    async fn spawn_execution(&self, session_id: &str, task_id: &str, kind: TaskKind, slots: SlotMap) {
        info!(%task_id, %kind, "Invoking executor");
        let mut runs = self.inner.runs.lock().await;

        let agent = self.clone();
        let executor = Arc::clone(&self.inner.executor);
        let timeout = self.inner.config.execution_timeout;
        let session = session_id.to_string();
        let task = task_id.to_string();

        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, executor.execute(kind, &slots)).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(AgentError::ExecutionFailure(e.reason)),
                Err(_) => Err(AgentError::ExecutionTimeout),
            };
            agent.finish_execution(&session, &task, outcome).await;
        });
        runs.insert(task_id.to_string(), handle.abort_handle());
    }

    async fn finish_execution(&self, session_id: &str, task_id: &str, outcome: Result<Value, AgentError>) {
        debug!(%task_id, ok = outcome.is_ok(), "finish_execution: called");
        let _guard = self.enter(session_id).await;
        self.inner.runs.lock().await.remove(task_id);

        match self.record_outcome(task_id, outcome).await {
            Ok(Some(event)) => {
                // No subscribers is fine; the checkpoint holds the outcome
                let _ = self.inner.events.send(event);
            }
            Ok(None) => {}
            Err(e) => warn!(%task_id, error = %e, "Failed to record executor outcome"),
        }
    }

    async fn record_outcome(
        &self,
        task_id: &str,
        outcome: Result<Value, AgentError>,
    ) -> Result<Option<OutboundEvent>, AgentError> {
        let inner = &self.inner;
        let Some(checkpoint) = inner.store.load(task_id).await? else {
            warn!(%task_id, "Executor finished for a task that no longer exists");
            return Ok(None);
        };
        if checkpoint.mode != TaskMode::Running {
            info!(%task_id, mode = %checkpoint.mode, "Discarding late executor result");
            return Ok(None);
        }

        let mut task = Task::restore(checkpoint, &inner.registry);
        let now = inner.clock.now_ms();
        let event = match outcome {
            Ok(result) => {
                inner.machine.complete(&mut task, result.clone(), now);
                OutboundEvent::Completed {
                    session_id: task.session_id().to_string(),
                    task_id: task.id().to_string(),
                    result,
                }
            }
            Err(e) => {
                let reason = e.reason();
                inner.machine.fail(&mut task, &reason, now);
                OutboundEvent::Failed {
                    session_id: task.session_id().to_string(),
                    task_id: task.id().to_string(),
                    reason,
                }
            }
        };
        inner.store.save(task.checkpoint()).await?;
        Ok(Some(event))
    }

    /// Finalize a task as FAILED and stop its executor, if any
    async fn fail_task(&self, mut task: Task, error: &AgentError) -> Result<OutboundEvent, AgentError> {
        let reason = error.reason();
        self.inner.machine.fail(&mut task, &reason, self.inner.clock.now_ms());
        self.inner.store.save(task.checkpoint()).await?;
        if let Some(run) = self.inner.runs.lock().await.remove(task.id()) {
            debug!(task_id = %task.id(), "fail_task: aborting executor");
            run.abort();
        }
        Ok(OutboundEvent::Failed {
            session_id: task.session_id().to_string(),
            task_id: task.id().to_string(),
            reason,
        })
    }

    async fn command(&self, session_id: &str, command: &str) -> Result<OutboundEvent, AgentError> {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next();
        debug!(%session_id, %name, ?arg, "command: called");

        match name.as_str() {
            "cancel" => self.cancel(session_id).await,
            "status" => self.status(session_id).await,
            "reset" => {
                let slot_id = arg.ok_or_else(|| AgentError::InvalidCommand("usage: /reset <slot-id>".to_string()))?;
                self.reset(session_id, slot_id).await
            }
            "skip" => self.skip(session_id).await,
            "close" => self.close(session_id).await,
            other => Err(AgentError::InvalidCommand(format!(
                "unknown command /{}; use /cancel, /status, /reset, /skip or /close",
                other
            ))),
        }
    }

    async fn active_task(&self, session_id: &str) -> Result<Task, AgentError> {
        match self.current_checkpoint(session_id).await? {
            Some(checkpoint) if !checkpoint.mode.is_terminal() => Ok(Task::restore(checkpoint, &self.inner.registry)),
            _ => Err(AgentError::InvalidCommand("no active task".to_string())),
        }
    }

    async fn cancel(&self, session_id: &str) -> Result<OutboundEvent, AgentError> {
        let task = self.active_task(session_id).await?;
        info!(%session_id, task_id = %task.id(), mode = %task.mode(), "Cancelling task");
        self.fail_task(task, &AgentError::Cancelled).await
    }

    async fn status(&self, session_id: &str) -> Result<OutboundEvent, AgentError> {
        let Some(checkpoint) = self.current_checkpoint(session_id).await? else {
            return Ok(OutboundEvent::Status {
                session_id: session_id.to_string(),
                task_id: None,
                mode: None,
                progress: None,
                summary: None,
                question: None,
                reason: None,
            });
        };

        let task = Task::restore(checkpoint, &self.inner.registry);
        let planner = self.inner.machine.planner();
        Ok(OutboundEvent::Status {
            session_id: session_id.to_string(),
            task_id: Some(task.id().to_string()),
            mode: Some(task.mode()),
            progress: Some(planner.progress(&task)),
            summary: planner.summary(&task),
            question: self.inner.machine.current(&task, self.inner.clock.today(), None),
            reason: task.reason().map(str::to_string),
        })
    }

    async fn reset(&self, session_id: &str, slot_id: &str) -> Result<OutboundEvent, AgentError> {
        let inner = &self.inner;
        let mut task = self.active_task(session_id).await?;
        if let Err(e) = inner.machine.verify_resume(&task) {
            return self.fail_task(task, &e).await;
        }
        let step = inner
            .machine
            .reset(&mut task, slot_id, inner.clock.today(), inner.clock.now_ms())?;
        inner.store.save(task.checkpoint()).await?;
        info!(task_id = %task.id(), %slot_id, "Slot reset");
        Ok(self.apply(&task, step).await)
    }

    async fn skip(&self, session_id: &str) -> Result<OutboundEvent, AgentError> {
        let inner = &self.inner;
        let checkpoint = self
            .current_checkpoint(session_id)
            .await?
            .filter(|c| matches!(c.mode, TaskMode::Running | TaskMode::Completed) && c.pending_optional.is_some())
            .ok_or_else(|| AgentError::InvalidCommand("no optional question to skip".to_string()))?;
        let mut task = Task::restore(checkpoint, &inner.registry);
        let liveness = match task.mode() {
            TaskMode::Running => self.check_running(&task).await,
            _ => Ok(()),
        };
        if let Err(e) = liveness {
            return self.fail_task(task, &e).await;
        }
        let step = inner.machine.skip(&mut task, inner.clock.today());
        inner.store.save(task.checkpoint()).await?;
        Ok(self.apply(&task, step).await)
    }

    async fn close(&self, session_id: &str) -> Result<OutboundEvent, AgentError> {
        let inner = &self.inner;
        if let Some(checkpoint) = self.current_checkpoint(session_id).await? {
            if !checkpoint.mode.is_terminal() {
                return Err(AgentError::InvalidCommand(
                    "task is still active; /cancel it first".to_string(),
                ));
            }
            inner.store.delete(&checkpoint.task_id).await?;
        }
        inner.store.unbind_session(session_id).await?;
        info!(%session_id, "Session closed");
        Ok(OutboundEvent::Closed {
            session_id: session_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use tempfile::TempDir;

    fn agent(temp: &TempDir) -> Agent {
        let store = CheckpointStore::open(temp.path()).unwrap();
        Agent::builder(store).clock(Arc::new(FixedClock::on(2025, 1, 1))).build()
    }

    async fn send(agent: &Agent, session: &str, message: &str) -> OutboundEvent {
        agent
            .handle(InboundEvent::new(Some(session.to_string()), message))
            .await
    }

    #[tokio::test]
    async fn test_first_contact_assigns_session() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        let event = agent.handle(InboundEvent::new(None, "research quantum computing")).await;
        let session_id = event.session_id().unwrap().to_string();
        assert!(session_id.starts_with("sess-"));
        match event {
            OutboundEvent::Question { slot_id, .. } => assert_eq!(slot_id, "research.topic"),
            other => panic!("expected question, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generic_task_completes_with_echo() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);
        let mut events = agent.subscribe();

        send(&agent, "sess-1", "water my plants").await;
        let reply = send(&agent, "sess-1", "the ferns on the balcony").await;
        match &reply {
            OutboundEvent::Question { slot_id, optional, .. } => {
                assert_eq!(slot_id, "task.priority");
                assert!(optional);
            }
            other => panic!("expected optional follow-up, got {:?}", other),
        }

        let done = events.recv().await.unwrap();
        match done {
            OutboundEvent::Completed { result, .. } => {
                assert_eq!(result["slots"]["task.details"]["value"], "the ferns on the balcony");
                // Optional values never reach the executor
                assert!(result["slots"].get("task.priority").is_none());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_command_and_empty_request() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        assert!(matches!(send(&agent, "sess-1", "/dance").await, OutboundEvent::Error { .. }));
        assert!(matches!(send(&agent, "sess-1", "   ").await, OutboundEvent::Error { .. }));
        assert!(matches!(send(&agent, "sess-1", "/cancel").await, OutboundEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_status_without_task() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        match send(&agent, "sess-1", "/status").await {
            OutboundEvent::Status { task_id, mode, .. } => {
                assert!(task_id.is_none());
                assert!(mode.is_none());
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    fn gate_count(agent: &Agent) -> usize {
        agent.inner.gates.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_session_gates_are_released() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);
        let mut events = agent.subscribe();

        for i in 0..50 {
            let session = format!("sess-{}", i);
            send(&agent, &session, "/status").await;
            assert!(matches!(send(&agent, &session, "/close").await, OutboundEvent::Closed { .. }));
        }
        assert!(matches!(send(&agent, "bad id/..", "hello").await, OutboundEvent::Error { .. }));
        assert_eq!(gate_count(&agent), 0);

        // Executor completion takes and releases the gate as well
        send(&agent, "sess-run", "water my plants").await;
        send(&agent, "sess-run", "the ferns").await;
        assert!(matches!(events.recv().await.unwrap(), OutboundEvent::Completed { .. }));
        for _ in 0..100 {
            if gate_count(&agent) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(gate_count(&agent), 0);
    }

    #[tokio::test]
    async fn test_build_exclusive_refuses_second_agent() {
        let temp = TempDir::new().unwrap();
        let first = Agent::builder(CheckpointStore::open(temp.path()).unwrap())
            .build_exclusive()
            .unwrap();

        let second = Agent::builder(CheckpointStore::open(temp.path()).unwrap()).build_exclusive();
        assert!(matches!(
            second,
            Err(AgentError::State(crate::state::StateError::StoreError(
                slotstore::StoreError::Locked(_)
            )))
        ));

        drop(first);
        assert!(
            Agent::builder(CheckpointStore::open(temp.path()).unwrap())
                .build_exclusive()
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_close_requires_terminal_task() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        send(&agent, "sess-1", "book a flight").await;
        assert!(matches!(send(&agent, "sess-1", "/close").await, OutboundEvent::Error { .. }));

        let cancelled = send(&agent, "sess-1", "/cancel").await;
        let task_id = cancelled.task_id().unwrap().to_string();
        assert!(matches!(cancelled, OutboundEvent::Failed { ref reason, .. } if reason == "cancelled"));

        assert!(matches!(send(&agent, "sess-1", "/close").await, OutboundEvent::Closed { .. }));
        assert!(agent.store().load(&task_id).await.unwrap().is_none());
        assert!(agent.store().session_task("sess-1").await.unwrap().is_none());
    }
}
