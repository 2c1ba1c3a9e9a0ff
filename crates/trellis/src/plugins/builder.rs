use super::{HookResult, Plugin, RunStartedEvent};
use crate::{JobRunResult, StateEvent, StepLog, StepRunResult, WorkflowRunResult};

type OnStateChange = dyn Fn(StateEvent) + Send + Sync;
type OnLog = dyn Fn(StepLog) + Send + Sync;
type OnRunStarted = dyn Fn(RunStartedEvent) + Send + Sync;
type OnStepCompleted = dyn Fn(StepRunResult) + Send + Sync;
type OnJobCompleted = dyn Fn(JobRunResult) + Send + Sync;
type OnRunCompleted = dyn Fn(WorkflowRunResult) + Send + Sync;

pub struct PluginBuilder {
  name: &'static str,
  on_state_change: Option<Box<OnStateChange>>,
  on_log: Option<Box<OnLog>>,
  on_run_started: Option<Box<OnRunStarted>>,
  on_step_completed: Option<Box<OnStepCompleted>>,
  on_job_completed: Option<Box<OnJobCompleted>>,
  on_run_completed: Option<Box<OnRunCompleted>>,
}

impl PluginBuilder {
  pub fn new(name: &'static str) -> Self {
    PluginBuilder {
      name,
      on_state_change: None,
      on_log: None,
      on_run_started: None,
      on_step_completed: None,
      on_job_completed: None,
      on_run_completed: None,
    }
  }

  pub fn on_state_change<T>(mut self, on_state_change: T) -> Self
  where
    T: Fn(StateEvent) + 'static + Send + Sync,
  {
    self.on_state_change = Some(Box::new(on_state_change));
    self
  }

  pub fn on_log<T>(mut self, on_log: T) -> Self
  where
    T: Fn(StepLog) + 'static + Send + Sync,
  {
    self.on_log = Some(Box::new(on_log));
    self
  }

  pub fn on_run_started<T>(mut self, on_run_started: T) -> Self
  where
    T: Fn(RunStartedEvent) + 'static + Send + Sync,
  {
    self.on_run_started = Some(Box::new(on_run_started));
    self
  }

  pub fn on_step_completed<T>(mut self, on_step_completed: T) -> Self
  where
    T: Fn(StepRunResult) + 'static + Send + Sync,
  {
    self.on_step_completed = Some(Box::new(on_step_completed));
    self
  }

  pub fn on_job_completed<T>(mut self, on_job_completed: T) -> Self
  where
    T: Fn(JobRunResult) + 'static + Send + Sync,
  {
    self.on_job_completed = Some(Box::new(on_job_completed));
    self
  }

  pub fn on_run_completed<T>(mut self, on_run_completed: T) -> Self
  where
    T: Fn(WorkflowRunResult) + 'static + Send + Sync,
  {
    self.on_run_completed = Some(Box::new(on_run_completed));
    self
  }

  pub fn build(self) -> TrellisPlugin {
    TrellisPlugin {
      name: self.name,
      on_state_change: self.on_state_change,
      on_log: self.on_log,
      on_run_started: self.on_run_started,
      on_step_completed: self.on_step_completed,
      on_job_completed: self.on_job_completed,
      on_run_completed: self.on_run_completed,
    }
  }
}

/// Closure-backed [`Plugin`], for when declaring a struct is overkill.
pub struct TrellisPlugin {
  name: &'static str,
  on_state_change: Option<Box<OnStateChange>>,
  on_log: Option<Box<OnLog>>,
  on_run_started: Option<Box<OnRunStarted>>,
  on_step_completed: Option<Box<OnStepCompleted>>,
  on_job_completed: Option<Box<OnJobCompleted>>,
  on_run_completed: Option<Box<OnRunCompleted>>,
}

impl TrellisPlugin {
  pub fn builder(name: &'static str) -> PluginBuilder {
    PluginBuilder::new(name)
  }
}

impl Plugin for TrellisPlugin {
  fn name(&self) -> &'static str {
    self.name
  }

  fn on_state_change(&self, event: StateEvent) -> HookResult {
    if let Some(on_state_change) = &self.on_state_change {
      on_state_change(event);
    }

    Ok(())
  }

  fn on_log(&self, log: StepLog) -> HookResult {
    if let Some(on_log) = &self.on_log {
      on_log(log);
    }

    Ok(())
  }

  fn on_run_started(&self, event: RunStartedEvent) -> HookResult {
    if let Some(on_run_started) = &self.on_run_started {
      on_run_started(event);
    }

    Ok(())
  }

  fn on_step_completed(&self, result: StepRunResult) -> HookResult {
    if let Some(on_step_completed) = &self.on_step_completed {
      on_step_completed(result);
    }

    Ok(())
  }

  fn on_job_completed(&self, result: JobRunResult) -> HookResult {
    if let Some(on_job_completed) = &self.on_job_completed {
      on_job_completed(result);
    }

    Ok(())
  }

  fn on_run_completed(&self, result: WorkflowRunResult) -> HookResult {
    if let Some(on_run_completed) = &self.on_run_completed {
      on_run_completed(result);
    }

    Ok(())
  }
}
