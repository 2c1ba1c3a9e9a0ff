use crate::{JobId, RunId, Status, StepId};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum StateEvent {
  RunStateUpdated { id: RunId, status: Status },
  JobStateUpdated { id: JobId, status: Status },
  StepStateUpdated { id: StepId, status: Status },
}

impl StateEvent {
  pub fn run(id: RunId, status: Status) -> Self {
    StateEvent::RunStateUpdated { id, status }
  }

  pub fn job(id: JobId, status: Status) -> Self {
    StateEvent::JobStateUpdated { id, status }
  }

  pub fn step(id: StepId, status: Status) -> Self {
    StateEvent::StepStateUpdated { id, status }
  }

  pub fn status(&self) -> Status {
    match self {
      StateEvent::RunStateUpdated { status, .. }
      | StateEvent::JobStateUpdated { status, .. }
      | StateEvent::StepStateUpdated { status, .. } => *status,
    }
  }
}
