use super::{parser::WorkflowParser, Workflow};
use crate::{Error, Result, Trellis, UserWorkflow};

pub struct WorkflowBuilder {
  config: Option<String>,
}

impl WorkflowBuilder {
  pub fn new() -> Self {
    WorkflowBuilder { config: None }
  }

  pub fn config(mut self, config: impl Into<String>) -> Self {
    self.config = Some(config.into());
    self
  }

  /// Parses and validates the workflow against the actions registered on
  /// `trellis`.
  pub fn build(self, trellis: &Trellis) -> Result<Workflow> {
    let config = self
      .config
      .ok_or_else(|| Error::init_error("Workflow config is required"))?;

    let user_workflow = UserWorkflow::try_from(config)?;

    let parser = WorkflowParser {
      user_workflow,
      actions: trellis.actions(),
    };

    parser.parse()
  }
}

impl Default for WorkflowBuilder {
  fn default() -> Self {
    Self::new()
  }
}
