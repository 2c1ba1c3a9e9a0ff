use crate::{Condition, Template};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
  /// Shell command handed to the [`Runner`](crate::Runner)
  Run(Template),
  /// Registered action, with its `with:` inputs left unrendered
  Uses {
    action: String,
    with: serde_json::Value,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
  pub number: usize,
  pub id: Option<String>,
  pub name: Option<String>,
  pub condition: Option<Condition>,
  pub action: StepAction,
  pub continue_on_error: bool,
  pub environments: BTreeMap<String, Template>,
}

impl Step {
  /// Key under `steps.` in the expression context. Steps without an `id`
  /// are addressed by their index.
  pub fn context_key(&self) -> String {
    self
      .id
      .clone()
      .unwrap_or_else(|| self.number.to_string())
  }
}
