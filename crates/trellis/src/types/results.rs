use crate::{EventKind, JobId, RunId, Status, StepId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Time = chrono::DateTime<chrono::Utc>;

pub type Outputs = BTreeMap<String, String>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepRunResult {
  pub id: StepId,
  pub name: Option<String>,
  pub status: Status,
  pub exit_code: Option<i32>,
  /// Diagnostic attached to a failed step, e.g. a backend error message
  pub error: Option<String>,
  pub outputs: Outputs,
  pub started_at: Option<Time>,
  pub completed_at: Option<Time>,
}

impl StepRunResult {
  /// A step that never started.
  pub fn not_run(id: StepId, name: Option<String>, status: Status) -> Self {
    StepRunResult {
      id,
      name,
      status,
      exit_code: None,
      error: None,
      outputs: Outputs::new(),
      started_at: None,
      completed_at: None,
    }
  }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobRunResult {
  pub id: JobId,
  pub status: Status,
  pub outputs: Outputs,
  pub cache_hit: Option<String>,
  pub started_at: Option<Time>,
  pub completed_at: Option<Time>,
  pub steps: Vec<StepRunResult>,
}

impl JobRunResult {
  pub fn not_run(id: JobId, status: Status) -> Self {
    JobRunResult {
      id,
      status,
      outputs: Outputs::new(),
      cache_hit: None,
      started_at: None,
      completed_at: None,
      steps: vec![],
    }
  }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowRunResult {
  pub id: RunId,
  pub event: EventKind,
  pub status: Status,
  pub started_at: Option<Time>,
  pub completed_at: Option<Time>,
  pub jobs: BTreeMap<String, JobRunResult>,
}

impl WorkflowRunResult {
  pub fn job(&self, key: &str) -> Option<&JobRunResult> {
    self.jobs.get(key)
  }
}
