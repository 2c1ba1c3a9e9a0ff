mod builder;
mod graph;
mod job;
mod parser;
mod step;

pub use builder::WorkflowBuilder;
pub use graph::JobGraph;
pub use job::{CacheConfig, Job, JobMode};
pub use parser::WorkflowParser;
pub use step::{Step, StepAction};

use crate::{Template, Triggers};

#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
  pub group: Template,
  pub cancel_in_progress: bool,
}

/// A validated workflow. Immutable once built; every run of it shares the
/// same jobs and graph.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub name: Option<String>,
  pub triggers: Triggers,
  pub concurrency: Option<ConcurrencyConfig>,
  /// In declaration order
  pub jobs: Vec<Job>,
  pub graph: JobGraph,
}

impl Workflow {
  pub fn builder() -> WorkflowBuilder {
    WorkflowBuilder::new()
  }

  pub fn job(&self, key: &str) -> Option<&Job> {
    self.jobs.iter().find(|job| job.key == key)
  }
}
