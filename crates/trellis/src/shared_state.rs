use crate::{Action, Actions, ConcurrencyGroups, Plugin, PluginManager};
use std::sync::Arc;

/// State shared by an engine and every run it starts. Cloning is cheap and
/// clones observe each other's registrations.
#[derive(Clone)]
pub struct TrellisSharedState(Arc<SharedState>);

struct SharedState {
  plugins: PluginManager,
  actions: Actions,
  groups: ConcurrencyGroups,
}

impl TrellisSharedState {
  pub fn new() -> Self {
    TrellisSharedState(Arc::new(SharedState {
      plugins: PluginManager::new(),
      actions: Actions::new(),
      groups: ConcurrencyGroups::new(),
    }))
  }

  pub fn register_plugin<P: Plugin + 'static>(&self, plugin: P) {
    self.0.plugins.register(plugin);
  }

  pub fn unregister_plugin(&self, name: &str) {
    self.0.plugins.unregister(name);
  }

  pub fn plugins(&self) -> PluginManager {
    self.0.plugins.clone()
  }

  pub fn register_action<T>(&self, name: impl Into<String>, action: T)
  where
    T: Action + 'static,
  {
    self.0.actions.register(name, action);
  }

  pub fn unregister_action(&self, name: &str) {
    self.0.actions.unregister(name);
  }

  pub fn actions(&self) -> Actions {
    self.0.actions.clone()
  }

  pub fn concurrency_groups(&self) -> ConcurrencyGroups {
    self.0.groups.clone()
  }
}

impl Default for TrellisSharedState {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ActionContext, Outputs, PluginBuilder, Result};

  struct Noop;

  #[async_trait::async_trait]
  impl Action for Noop {
    async fn run(&self, _ctx: ActionContext) -> Result<Outputs> {
      Ok(Outputs::new())
    }
  }

  #[test]
  fn clones_share_registrations() {
    let state = TrellisSharedState::new();
    let clone = state.clone();

    state.register_plugin(PluginBuilder::new("audit").build());
    state.register_action("noop", Noop);

    assert_eq!(clone.plugins().size(), 1);
    assert!(clone.actions().contains("noop"));

    clone.unregister_plugin("audit");
    clone.unregister_action("noop");

    assert_eq!(state.plugins().size(), 0);
    assert!(!state.actions().contains("noop"));
  }
}
