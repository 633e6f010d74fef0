//! Single-step and automatic pipeline runs.

use super::{
    AutoMode, EditedFields, ExecutionMode, RunReport, StageForms, WorkflowStepInfo,
    TRACING_TARGET,
};
use crate::auth::AuthorizationSignal;
use crate::backend::TaskBackend;
use crate::catalog::{StageId, StageParams};
use crate::client::{StageDispatcher, TaskSubmissionClient};
use crate::config::CoordinatorConfig;
use crate::core::{MainTask, StageOutcome, StageResult, StepStatus, SubTaskRef, SubTaskStatus};
use crate::errors::{CastflowError, PollError, PreconditionError, ValidationError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::observability;
use crate::pipeline::{PipelineBuilder, TerminalMode};
use crate::polling::{Clock, PollHandle, PollObserver, PollState, StatusPoller, TokioClock};
use crate::propagation::ResultPropagator;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

struct State {
    steps: Vec<WorkflowStepInfo>,
    forms: StageForms,
    mode: ExecutionMode,
    selected: StageId,
    main_task: Option<MainTask>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            steps: WorkflowStepInfo::initial(),
            forms: StageForms::default(),
            mode: ExecutionMode::Manual,
            selected: StageId::ParseLink,
            main_task: None,
        }
    }
}

/// Clears the busy flag and the active poll handle when a run ends.
struct RunGuard<'a> {
    busy: &'a AtomicBool,
    active: &'a Mutex<Option<PollHandle>>,
}

impl<'a> RunGuard<'a> {
    fn acquire(
        busy: &'a AtomicBool,
        active: &'a Mutex<Option<PollHandle>>,
    ) -> Result<Self, CastflowError> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CastflowError::Busy)?;
        Ok(Self { busy, active })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().take();
        self.busy.store(false, Ordering::Release);
    }
}

/// Reports failed status requests as events.
struct EventPollObserver<'a> {
    events: &'a dyn EventSink,
    stage: StageId,
}

impl PollObserver for EventPollObserver<'_> {
    fn on_poll_error(&self, error: &PollError, state: &PollState) {
        self.events.try_emit(
            events::POLL_ERROR,
            Some(json!({
                "stage": self.stage,
                "error": error.to_string(),
                "consecutive_errors": state.consecutive_errors,
                "interval_ms": u64::try_from(state.interval.as_millis()).unwrap_or(u64::MAX),
            })),
        );
    }
}

/// Drives the five-stage pipeline on behalf of one user.
///
/// All methods take `&self`; share the coordinator through an `Arc` to call
/// [`stop`](Self::stop) or [`cancel`](Self::cancel) while a run is active.
/// Only one run may be active at a time.
pub struct WorkflowCoordinator {
    config: CoordinatorConfig,
    backend: Arc<dyn TaskBackend>,
    clock: Arc<dyn Clock>,
    submission: TaskSubmissionClient,
    dispatcher: StageDispatcher,
    poller: StatusPoller,
    propagator: ResultPropagator,
    events: Arc<dyn EventSink>,
    state: RwLock<State>,
    steps_tx: watch::Sender<Vec<WorkflowStepInfo>>,
    busy: AtomicBool,
    active: Mutex<Option<PollHandle>>,
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("WorkflowCoordinator")
            .field("mode", &state.mode)
            .field("selected", &state.selected)
            .field("busy", &self.busy.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl WorkflowCoordinator {
    /// Creates a coordinator with the tokio clock and no event sink.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        backend: Arc<dyn TaskBackend>,
        auth: Arc<dyn AuthorizationSignal>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let poller = StatusPoller::new(backend.clone(), clock.clone(), config.polling.clone());
        let propagator = ResultPropagator::new(config.propagation.policy)
            .with_resource_base_url(config.propagation.resource_base_url.clone());
        let state = State::default();
        let (steps_tx, _rx) = watch::channel(state.steps.clone());

        Self {
            submission: TaskSubmissionClient::new(backend.clone()),
            dispatcher: StageDispatcher::new(backend.clone(), auth),
            poller,
            propagator,
            events: Arc::new(NoOpEventSink),
            state: RwLock::new(state),
            steps_tx,
            busy: AtomicBool::new(false),
            active: Mutex::new(None),
            config,
            backend,
            clock,
        }
    }

    /// Replaces the clock used for polling and advance delays.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.poller = StatusPoller::new(
            self.backend.clone(),
            clock.clone(),
            self.config.polling.clone(),
        );
        self.clock = clock;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Forms and selection
    // ------------------------------------------------------------------

    /// Selects the stage runs start from.
    pub fn select_stage(&self, stage: StageId) {
        self.state.write().selected = stage;
    }

    /// Returns the selected stage.
    #[must_use]
    pub fn selected_stage(&self) -> StageId {
        self.state.read().selected
    }

    /// Edits a stage's form and returns the fields that changed.
    pub fn edit_params<F>(&self, stage: StageId, f: F) -> Vec<String>
    where
        F: FnOnce(&mut StageParams),
    {
        self.state.write().forms.edit(stage, f)
    }

    /// Returns a copy of a stage's form.
    #[must_use]
    pub fn params(&self, stage: StageId) -> StageParams {
        self.state.read().forms.params(stage).clone()
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Returns every step.
    #[must_use]
    pub fn steps(&self) -> Vec<WorkflowStepInfo> {
        self.state.read().steps.clone()
    }

    /// Returns one step.
    #[must_use]
    pub fn step(&self, stage: StageId) -> WorkflowStepInfo {
        self.state.read().steps[stage.sequence_index()].clone()
    }

    /// Returns the execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.state.read().mode
    }

    /// Returns the most recently submitted main task.
    #[must_use]
    pub fn main_task(&self) -> Option<MainTask> {
        self.state.read().main_task.clone()
    }

    /// Returns true while a run is active.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Subscribes to the step list; a new value is published after every change.
    #[must_use]
    pub fn watch_steps(&self) -> watch::Receiver<Vec<WorkflowStepInfo>> {
        self.steps_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Runs only the selected stage. The mode stays `Manual`.
    pub async fn run_single_step(&self) -> Result<RunReport, CastflowError> {
        self.run(TerminalMode::SingleStep, ExecutionMode::Manual)
            .await
    }

    /// Runs from the selected stage through the mode's terminal stage.
    ///
    /// Only the selected stage is validated up front; later stages are
    /// filled by propagation and checked just before their dispatch. A
    /// failed stage aborts the run; earlier stages keep their results.
    pub async fn run_auto(&self, mode: AutoMode) -> Result<RunReport, CastflowError> {
        self.run(mode.terminal_mode(), mode.execution_mode()).await
    }

    /// Leaves the automatic mode.
    ///
    /// The in-flight poll finishes and its result is recorded; no further
    /// stage is dispatched. Returns false outside an automatic mode.
    pub fn stop(&self) -> bool {
        if !self.mode().is_auto() {
            return false;
        }
        tracing::info!(target: TRACING_TARGET, "Stop requested");
        self.set_mode(ExecutionMode::Manual);
        true
    }

    /// Cancels the active poll and leaves the automatic mode.
    ///
    /// The polled stage ends in error. Returns false when no run is active.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let Some(handle) = self.active.lock().clone() else {
            return false;
        };
        let reason = reason.into();
        tracing::info!(target: TRACING_TARGET, %reason, "Cancel requested");
        handle.cancel(reason);
        self.set_mode(ExecutionMode::Manual);
        true
    }

    /// Forces one immediate status poll for the active stage.
    pub fn refresh(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(handle) => {
                handle.refresh();
                true
            }
            None => false,
        }
    }

    /// Clears a failed stage back to pending. Its stored result is kept.
    pub fn reset(&self, stage: StageId) -> bool {
        let changed = self.update_step(stage, WorkflowStepInfo::reset);
        if changed {
            self.events
                .try_emit(events::STEP_RESET, Some(json!({ "stage": stage })));
        }
        changed
    }

    /// Restores every step, form and the selection to their initial state.
    pub fn reset_all(&self) -> Result<(), CastflowError> {
        if self.is_busy() {
            return Err(CastflowError::Busy);
        }
        {
            let mut state = self.state.write();
            *state = State::default();
            self.steps_tx.send_replace(state.steps.clone());
        }
        tracing::info!(target: TRACING_TARGET, "Workflow reset");
        for stage in StageId::ALL {
            self.events
                .try_emit(events::STEP_RESET, Some(json!({ "stage": stage })));
        }
        Ok(())
    }

    async fn run(
        &self,
        terminal: TerminalMode,
        mode: ExecutionMode,
    ) -> Result<RunReport, CastflowError> {
        let _guard = RunGuard::acquire(&self.busy, &self.active)?;
        let run_id = Uuid::new_v4();
        let (start, snapshot, edited) = {
            let state = self.state.read();
            (
                state.selected,
                state.forms.snapshot(),
                state.forms.edited_snapshot(),
            )
        };

        let span = observability::run_span(&run_id, mode.as_str(), start.sequence_index());
        self.execute(run_id, start, terminal, mode, snapshot, edited)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        start: StageId,
        terminal: TerminalMode,
        mode: ExecutionMode,
        snapshot: [StageParams; StageId::COUNT],
        edited: EditedFields,
    ) -> Result<RunReport, CastflowError> {
        let start_step = start.sequence_index();
        let requests = PipelineBuilder::build(start_step, terminal, &snapshot)?;
        self.check_no_failed_steps(requests.iter().map(|r| r.stage_id))?;
        self.dispatcher.preflight(start, &snapshot[start_step])?;
        if mode.is_auto() {
            self.check_materials(start_step, terminal, &snapshot)?;
        }

        let task = self.submission.submit(start_step, &requests).await?;
        tracing::Span::current().record("main_task_id", task.id);
        self.state.write().main_task = Some(task.clone());
        self.events.try_emit(
            events::TASK_SUBMITTED,
            Some(json!({
                "run_id": run_id.to_string(),
                "main_task_id": task.id,
                "start_step": start_step,
                "stages": requests.iter().map(|r| r.stage_id).collect::<Vec<_>>(),
            })),
        );
        self.set_mode(mode);

        let handle = PollHandle::new();
        *self.active.lock() = Some(handle.clone());

        let mut params: Vec<StageParams> = requests.into_iter().map(|r| r.params).collect();
        let mut report = RunReport {
            run_id,
            main_task_id: task.id,
            completed: Vec::new(),
            stopped: false,
        };

        for (offset, sub) in task.sub_tasks().iter().enumerate() {
            if offset > 0 {
                let delay = self.config.workflow.advance_delay();
                if !delay.is_zero() {
                    self.clock.sleep(delay).await;
                }
                if handle.is_cancelled() || self.mode() != mode {
                    tracing::info!(
                        target: TRACING_TARGET,
                        next = %sub.stage_id,
                        "Run stopped before advancing"
                    );
                    report.stopped = true;
                    break;
                }
            }

            let stage = sub.stage_id;
            let result = match self.run_stage(sub, &params[offset], &handle).await {
                Ok(result) => result,
                Err(err) => {
                    self.finish(&report, Some(&err));
                    return Err(err);
                }
            };
            report.completed.push(stage);

            if let (Some(next), Some(next_params)) = (stage.next(), params.get_mut(offset + 1)) {
                self.propagator.propagate(
                    stage,
                    &result.raw_payload,
                    next_params,
                    &edited[next.sequence_index()],
                );
            }
            self.propagate_to_form(stage, &result);
        }

        self.finish(&report, None);
        Ok(report)
    }

    /// Rejects a run that includes a stage still in error.
    fn check_no_failed_steps(
        &self,
        stages: impl IntoIterator<Item = StageId>,
    ) -> Result<(), PreconditionError> {
        let state = self.state.read();
        match stages
            .into_iter()
            .find(|stage| state.steps[stage.sequence_index()].status == StepStatus::Error)
        {
            Some(stage) => Err(PreconditionError::needs_reset(stage)),
            None => Ok(()),
        }
    }

    /// Rejects an automatic run that reaches video synthesis without a source video.
    fn check_materials(
        &self,
        start_step: usize,
        terminal: TerminalMode,
        snapshot: &[StageParams; StageId::COUNT],
    ) -> Result<(), ValidationError> {
        let video = StageId::SynthesizeVideo;
        let index = video.sequence_index();
        if !self.config.workflow.preflight_materials
            || start_step >= index
            || terminal.terminal_index(start_step) < index
        {
            return Ok(());
        }
        match &snapshot[index] {
            StageParams::SynthesizeVideo(p) if p.video_resource_id.is_some_and(|id| id != 0) => {
                Ok(())
            }
            _ => Err(ValidationError::missing(video, "videoResourceId")),
        }
    }

    async fn run_stage(
        &self,
        sub: &SubTaskRef,
        params: &StageParams,
        handle: &PollHandle,
    ) -> Result<StageResult, CastflowError> {
        let stage = sub.stage_id;
        self.dispatcher.preflight(stage, params)?;

        if !self.update_step(stage, |step| step.begin(sub.id)) {
            return Err(PreconditionError::needs_reset(stage).into());
        }
        self.events.try_emit(
            events::STEP_RUNNING,
            Some(json!({ "stage": stage, "sub_task_id": sub.id })),
        );

        if let Err(err) = self.dispatcher.dispatch(sub.id, stage, params).await {
            self.record_sub_task(sub.id, SubTaskStatus::Failed);
            self.fail_step(stage, err.to_string());
            return Err(err);
        }
        self.record_sub_task(sub.id, SubTaskStatus::Running);

        let observer = EventPollObserver {
            events: self.events.as_ref(),
            stage,
        };
        let outcome = self.poller.poll_until_terminal(sub.id, handle, &observer).await;
        if let Ok(outcome) = &outcome {
            self.record_sub_task(sub.id, outcome.sub_task_status());
        }
        match outcome {
            Ok(StageOutcome::Success(result)) => {
                self.update_step(stage, |step| step.succeed(result.clone()));
                tracing::info!(
                    target: TRACING_TARGET,
                    %stage,
                    sub_task_id = sub.id,
                    resource_id = ?result.resource_id,
                    "Stage succeeded"
                );
                self.events.try_emit(
                    events::STEP_SUCCEEDED,
                    Some(json!({ "stage": stage, "sub_task_id": sub.id, "result": &result })),
                );
                Ok(result)
            }
            Ok(StageOutcome::Failed { message }) => {
                self.fail_step(stage, message.clone());
                Err(CastflowError::StageFailed { stage, message })
            }
            Ok(StageOutcome::Canceled { reason }) => {
                self.fail_step(stage, format!("canceled: {reason}"));
                Err(CastflowError::Cancelled { stage, reason })
            }
            Err(err) => {
                self.fail_step(stage, err.to_string());
                Err(err.into())
            }
        }
    }

    fn record_sub_task(&self, sub_task_id: i64, status: SubTaskStatus) {
        if let Some(task) = self.state.write().main_task.as_mut() {
            task.record_status(sub_task_id, status);
        }
    }

    fn fail_step(&self, stage: StageId, message: String) {
        tracing::warn!(target: TRACING_TARGET, %stage, error = %message, "Stage failed");
        self.update_step(stage, |step| step.fail(message.clone()));
        self.events.try_emit(
            events::STEP_FAILED,
            Some(json!({ "stage": stage, "error": message })),
        );
    }

    fn propagate_to_form(&self, stage: StageId, result: &StageResult) {
        let report = self.state.write().forms.apply_propagation(
            &self.propagator,
            stage,
            &result.raw_payload,
        );
        if let Some(target) = report.target {
            self.events.try_emit(
                events::PARAMS_PROPAGATED,
                Some(json!({
                    "source": stage,
                    "target": target,
                    "written": report.written,
                    "preserved": report.preserved,
                })),
            );
        }
    }

    fn finish(&self, report: &RunReport, error: Option<&CastflowError>) {
        self.set_mode(ExecutionMode::Manual);
        match error {
            Some(err) => tracing::warn!(
                target: TRACING_TARGET,
                completed = ?report.completed,
                error = %err,
                "Run aborted"
            ),
            None => tracing::info!(
                target: TRACING_TARGET,
                completed = ?report.completed,
                stopped = report.stopped,
                "Run finished"
            ),
        }
        self.events.try_emit(
            events::RUN_FINISHED,
            Some(json!({
                "run_id": report.run_id.to_string(),
                "main_task_id": report.main_task_id,
                "completed": report.completed,
                "stopped": report.stopped,
                "error": error.map(CastflowError::to_dict),
            })),
        );
    }

    fn set_mode(&self, mode: ExecutionMode) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.mode, mode)
        };
        if previous != mode {
            tracing::debug!(target: TRACING_TARGET, from = %previous, to = %mode, "Mode changed");
            self.events.try_emit(
                events::MODE_CHANGED,
                Some(json!({ "from": previous, "to": mode })),
            );
        }
    }

    fn update_step<F>(&self, stage: StageId, f: F) -> bool
    where
        F: FnOnce(&mut WorkflowStepInfo) -> bool,
    {
        let mut state = self.state.write();
        let changed = f(&mut state.steps[stage.sequence_index()]);
        if changed {
            self.steps_tx.send_replace(state.steps.clone());
        }
        changed
    }
}
