use crate::{Job, PluginManager, RunId, StateEvent, Status, WorkflowRunResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
  pub status: Status,
  pub steps: Vec<Status>,
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
  pub id: RunId,
  pub status: Status,
  pub jobs: BTreeMap<String, JobSnapshot>,
}

impl RunSnapshot {
  pub fn job(&self, key: &str) -> Option<Status> {
    self.jobs.get(key).map(|job| job.status)
  }
}

struct ReporterState {
  snapshot: RunSnapshot,
  result: Option<WorkflowRunResult>,
}

/// Keeps the live status table of one run and forwards every transition to
/// plugins. Once [`finish`](StatusReporter::finish) has been called the
/// snapshot is frozen.
#[derive(Clone)]
pub struct StatusReporter {
  state: Arc<RwLock<ReporterState>>,
  plugins: PluginManager,
}

impl StatusReporter {
  pub fn new(id: RunId, jobs: &[Job], plugins: PluginManager) -> Self {
    let jobs = jobs
      .iter()
      .map(|job| {
        (
          job.key.clone(),
          JobSnapshot {
            status: Status::Pending,
            steps: vec![Status::Pending; job.steps.len()],
          },
        )
      })
      .collect();

    StatusReporter {
      state: Arc::new(RwLock::new(ReporterState {
        snapshot: RunSnapshot {
          id,
          status: Status::Pending,
          jobs,
        },
        result: None,
      })),
      plugins,
    }
  }

  pub fn snapshot(&self) -> RunSnapshot {
    self.state.read().snapshot.clone()
  }

  pub fn is_finished(&self) -> bool {
    self.state.read().result.is_some()
  }

  pub fn result(&self) -> Option<WorkflowRunResult> {
    self.state.read().result.clone()
  }

  /// Applies a transition. Ignored once the run has finished.
  pub fn update(&self, event: StateEvent) {
    {
      let mut state = self.state.write();
      if state.result.is_some() {
        log::trace!("Ignoring {:?} after the run finished", event);
        return;
      }

      let snapshot = &mut state.snapshot;
      match &event {
        StateEvent::RunStateUpdated { status, .. } => snapshot.status = *status,
        StateEvent::JobStateUpdated { id, status } => {
          if let Some(job) = snapshot.jobs.get_mut(id.job_key()) {
            job.status = *status;
          }
        }
        StateEvent::StepStateUpdated { id, status } => {
          if let Some(step) = snapshot
            .jobs
            .get_mut(id.job_key())
            .and_then(|job| job.steps.get_mut(id.step_number()))
          {
            *step = *status;
          }
        }
      }
    }

    self.plugins.on_state_change(event);
  }

  /// Freezes the snapshot to the final result and fires `on_run_completed`.
  /// Only the first call has any effect; returns whether it was this one.
  pub fn finish(&self, result: WorkflowRunResult) -> bool {
    {
      let mut state = self.state.write();
      if state.result.is_some() {
        return false;
      }

      let snapshot = &mut state.snapshot;
      snapshot.status = result.status;
      for (key, job) in &result.jobs {
        let entry = snapshot.jobs.entry(key.clone()).or_insert(JobSnapshot {
          status: job.status,
          steps: vec![],
        });
        entry.status = job.status;
        for step in &job.steps {
          if let Some(status) = entry.steps.get_mut(step.id.step_number()) {
            *status = step.status;
          }
        }
      }

      state.result = Some(result.clone());
    }

    self
      .plugins
      .on_state_change(StateEvent::run(result.id.clone(), result.status));
    self.plugins.on_run_completed(result);

    true
  }
}
