mod container_build;
mod docs_deploy;

pub use container_build::ContainerBuildAction;
pub use docs_deploy::DocsDeployAction;

use crate::{JobSignal, LogType, Outputs, PluginManager, Result, StepId, StepLog};
use parking_lot::Mutex;
use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

/// Everything a `uses:` step gets to see.
#[derive(Clone)]
pub struct ActionContext {
  pub id: StepId,
  /// The step's `with:` block, templates already rendered
  pub inputs: serde_json::Value,
  pub environments: BTreeMap<String, String>,
  pub signal: JobSignal,
  plugins: PluginManager,
}

impl ActionContext {
  pub fn new(id: StepId, inputs: serde_json::Value) -> Self {
    ActionContext {
      id,
      inputs,
      environments: BTreeMap::new(),
      signal: JobSignal::new(),
      plugins: PluginManager::new(),
    }
  }

  pub(crate) fn with_runtime(
    mut self,
    environments: BTreeMap<String, String>,
    signal: JobSignal,
    plugins: PluginManager,
  ) -> Self {
    self.environments = environments;
    self.signal = signal;
    self.plugins = plugins;
    self
  }

  /// String input, if present.
  pub fn input(&self, name: &str) -> Option<&str> {
    self.inputs.get(name).and_then(|value| value.as_str())
  }

  pub fn log(&self, message: impl Into<String>) {
    self.emit(LogType::Log, message.into());
  }

  pub fn error(&self, message: impl Into<String>) {
    self.emit(LogType::Error, message.into());
  }

  fn emit(&self, log_type: LogType, message: String) {
    self.plugins.on_log(StepLog {
      step_id: self.id.clone(),
      log_type,
      message,
      time: chrono::Utc::now(),
    });
  }
}

/// Implementation behind a `uses:` step. Returns the step's outputs; an
/// error fails the step and its message is kept on the step result.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
  async fn run(&self, ctx: ActionContext) -> Result<Outputs>;
}

#[derive(Clone, Default)]
pub struct Actions {
  actions: Arc<Mutex<HashMap<String, Arc<dyn Action>>>>,
}

impl Actions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<T>(&self, name: impl Into<String>, action: T)
  where
    T: Action + 'static,
  {
    self.actions.lock().insert(name.into(), Arc::new(action));
  }

  pub fn unregister(&self, name: &str) {
    self.actions.lock().remove(name);
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
    self.actions.lock().get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.actions.lock().contains_key(name)
  }

  pub fn size(&self) -> usize {
    self.actions.lock().len()
  }
}
