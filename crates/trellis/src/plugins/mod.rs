mod builder;

pub use builder::{PluginBuilder, TrellisPlugin};

use crate::{
  EventKind, JobRunResult, Result, RunId, StateEvent, StepLog, StepRunResult, WorkflowRunResult,
};
use parking_lot::RwLock;
use std::sync::Arc;

pub type HookResult = Result<()>;

#[derive(Debug, Clone, PartialEq)]
pub struct RunStartedEvent {
  pub id: RunId,
  pub event: EventKind,
  pub workflow: Option<String>,
  /// Job keys in declaration order
  pub jobs: Vec<String>,
}

/// Observer of run progress. Hooks run inline on the engine's tasks, so
/// they should return quickly. Errors are logged and otherwise ignored.
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str;
  fn on_state_change(&self, _event: StateEvent) -> HookResult {
    Ok(())
  }
  fn on_log(&self, _log: StepLog) -> HookResult {
    Ok(())
  }
  fn on_run_started(&self, _event: RunStartedEvent) -> HookResult {
    Ok(())
  }
  fn on_step_completed(&self, _result: StepRunResult) -> HookResult {
    Ok(())
  }
  fn on_job_completed(&self, _result: JobRunResult) -> HookResult {
    Ok(())
  }
  /// Fired exactly once per run.
  fn on_run_completed(&self, _result: WorkflowRunResult) -> HookResult {
    Ok(())
  }
}

#[derive(Clone, Default)]
pub struct PluginManager {
  plugins: Arc<RwLock<Vec<Arc<dyn Plugin>>>>,
}

impl PluginManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replaces any plugin already registered under the same name.
  pub fn register<P: Plugin + 'static>(&self, plugin: P) {
    let mut plugins = self.plugins.write();
    plugins.retain(|p| p.name() != plugin.name());
    plugins.push(Arc::new(plugin));
  }

  pub fn unregister(&self, name: &str) {
    self.plugins.write().retain(|p| p.name() != name);
  }

  pub fn size(&self) -> usize {
    self.plugins.read().len()
  }

  pub fn on_state_change(&self, event: StateEvent) {
    self.each("on_state_change", |plugin| {
      plugin.on_state_change(event.clone())
    });
  }

  pub fn on_log(&self, log: StepLog) {
    self.each("on_log", |plugin| plugin.on_log(log.clone()));
  }

  pub fn on_run_started(&self, event: RunStartedEvent) {
    self.each("on_run_started", |plugin| {
      plugin.on_run_started(event.clone())
    });
  }

  pub fn on_step_completed(&self, result: StepRunResult) {
    self.each("on_step_completed", |plugin| {
      plugin.on_step_completed(result.clone())
    });
  }

  pub fn on_job_completed(&self, result: JobRunResult) {
    self.each("on_job_completed", |plugin| {
      plugin.on_job_completed(result.clone())
    });
  }

  pub fn on_run_completed(&self, result: WorkflowRunResult) {
    self.each("on_run_completed", |plugin| {
      plugin.on_run_completed(result.clone())
    });
  }

  fn each<F>(&self, hook: &str, call: F)
  where
    F: Fn(&dyn Plugin) -> HookResult,
  {
    // Hooks may register or unregister plugins
    let plugins = self.plugins.read().clone();

    for plugin in plugins {
      if let Err(err) = call(plugin.as_ref()) {
        log::error!("Plugin `{}` failed in {}: {}", plugin.name(), hook, err);
      }
    }
  }
}
