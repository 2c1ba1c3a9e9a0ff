use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Id = String;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default, PartialOrd, Ord)]
pub struct RunId(Id);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default, PartialOrd, Ord)]
pub struct JobId(Id, Id);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default, PartialOrd, Ord)]
pub struct StepId(Id, Id, usize);

impl RunId {
  pub fn new(id: impl Into<String>) -> Self {
    RunId(id.into())
  }

  pub fn generate() -> Self {
    RunId(uuid::Uuid::new_v4().to_string())
  }

  pub fn inner(&self) -> &str {
    &self.0
  }
}

impl JobId {
  pub fn new(run_id: impl Into<String>, job_key: impl Into<String>) -> Self {
    JobId(run_id.into(), job_key.into())
  }

  pub fn run_id(&self) -> RunId {
    RunId(self.0.clone())
  }

  pub fn job_key(&self) -> &str {
    &self.1
  }

  pub fn step(&self, number: usize) -> StepId {
    StepId(self.0.clone(), self.1.clone(), number)
  }
}

impl StepId {
  pub fn new(run_id: impl Into<String>, job_key: impl Into<String>, number: usize) -> Self {
    StepId(run_id.into(), job_key.into(), number)
  }

  pub fn run_id(&self) -> RunId {
    RunId(self.0.clone())
  }

  pub fn job_id(&self) -> JobId {
    JobId(self.0.clone(), self.1.clone())
  }

  pub fn job_key(&self) -> &str {
    &self.1
  }

  pub fn step_number(&self) -> usize {
    self.2
  }
}

impl fmt::Display for RunId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.0, self.1)
  }
}

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.0, self.1, self.2)
  }
}

impl TryFrom<&str> for RunId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    if value.is_empty() {
      Err(Error::internal_runtime_error("RunId cannot be empty"))
    } else {
      Ok(RunId(value.to_string()))
    }
  }
}

impl TryFrom<&str> for JobId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value.split_once('/') {
      Some((run, job)) if !run.is_empty() && !job.is_empty() && !job.contains('/') => {
        Ok(JobId(run.to_string(), job.to_string()))
      }
      _ => Err(Error::internal_runtime_error(
        "JobId must be in the format of <run_id>/<job_key>",
      )),
    }
  }
}

impl TryFrom<&str> for StepId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() != 3 {
      return Err(Error::internal_runtime_error(
        "StepId must be in the format of <run_id>/<job_key>/<step_number>",
      ));
    }

    let number = parts[2]
      .parse::<usize>()
      .map_err(|_| Error::internal_runtime_error("Step number must be a number"))?;

    Ok(StepId(parts[0].to_string(), parts[1].to_string(), number))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_job_id() {
    let job_id = JobId::new("run", "build");
    assert_eq!(job_id.run_id(), RunId::new("run"));
    assert_eq!(job_id.job_key(), "build");
    assert_eq!(job_id.to_string(), "run/build");
    assert_eq!(job_id.step(2), StepId::new("run", "build", 2));
  }

  #[test]
  fn test_step_id() {
    let step_id = StepId::new("run", "build", 1);
    assert_eq!(step_id.job_id(), JobId::new("run", "build"));
    assert_eq!(step_id.step_number(), 1);
    assert_eq!(step_id.to_string(), "run/build/1");
  }

  #[test]
  fn test_generated_run_ids_differ() {
    assert_ne!(RunId::generate(), RunId::generate());
  }

  #[test]
  fn test_try_from() {
    assert_eq!(RunId::try_from("run").unwrap(), RunId::new("run"));
    assert!(RunId::try_from("").is_err());

    assert_eq!(
      JobId::try_from("run/build").unwrap(),
      JobId::new("run", "build")
    );
    assert!(JobId::try_from("run").is_err());
    assert!(JobId::try_from("run/").is_err());
    assert!(JobId::try_from("a/b/c").is_err());

    assert_eq!(
      StepId::try_from("run/build/3").unwrap(),
      StepId::new("run", "build", 3)
    );
    assert!(StepId::try_from("run/build").is_err());
    assert!(StepId::try_from("run/build/x").is_err());
  }
}
