//! Workflow file schema, as written by users.

use crate::{Error, EventKind, JobMode, Result};
use serde::{
  de::{MapAccess, Visitor},
  Deserialize, Deserializer, Serialize,
};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StringOrList {
  One(String),
  Many(Vec<String>),
}

impl StringOrList {
  pub fn into_vec(self) -> Vec<String> {
    match self {
      StringOrList::One(value) => vec![value],
      StringOrList::Many(values) => values,
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserTriggerRule {
  pub branches: Option<Vec<String>>,
  pub paths: Option<Vec<String>>,
  #[serde(rename = "paths-ignore")]
  pub paths_ignore: Option<Vec<String>>,
}

/// `push:` with no body is the same as `push: {}`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<UserTriggerRule>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Some(
    Option::<UserTriggerRule>::deserialize(deserializer)?.unwrap_or_default(),
  ))
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserTriggerRules {
  #[serde(default, deserialize_with = "present")]
  pub push: Option<UserTriggerRule>,
  #[serde(default, deserialize_with = "present")]
  pub pull_request: Option<UserTriggerRule>,
  #[serde(default, deserialize_with = "present")]
  pub schedule: Option<UserTriggerRule>,
  #[serde(default, deserialize_with = "present", alias = "workflow_dispatch")]
  pub manual: Option<UserTriggerRule>,
  pub priority: Option<Vec<EventKind>>,
}

impl UserTriggerRules {
  pub fn rules(&self) -> Vec<(EventKind, &UserTriggerRule)> {
    [
      (EventKind::Push, &self.push),
      (EventKind::PullRequest, &self.pull_request),
      (EventKind::Schedule, &self.schedule),
      (EventKind::Manual, &self.manual),
    ]
    .into_iter()
    .filter_map(|(kind, rule)| rule.as_ref().map(|rule| (kind, rule)))
    .collect()
  }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UserTriggers {
  Events(Vec<EventKind>),
  Rules(UserTriggerRules),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UserConcurrency {
  Group(String),
  Options {
    group: String,
    #[serde(rename = "cancel-in-progress", default)]
    cancel_in_progress: bool,
  },
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserCache {
  pub from: Option<StringOrList>,
  pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserCommandStep {
  pub id: Option<String>,
  pub name: Option<String>,
  pub run: String,
  #[serde(rename = "if")]
  pub condition: Option<String>,
  #[serde(rename = "continue-on-error")]
  pub continue_on_error: Option<bool>,
  pub env: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserActionStep {
  pub id: Option<String>,
  pub name: Option<String>,
  pub uses: String,
  pub with: Option<serde_yaml::Value>,
  #[serde(rename = "if")]
  pub condition: Option<String>,
  #[serde(rename = "continue-on-error")]
  pub continue_on_error: Option<bool>,
  pub env: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UserStep {
  Command(UserCommandStep),
  Action(UserActionStep),
}

impl UserStep {
  pub fn id(&self) -> Option<&str> {
    match self {
      UserStep::Command(step) => step.id.as_deref(),
      UserStep::Action(step) => step.id.as_deref(),
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserJob {
  pub name: Option<String>,
  pub needs: Option<StringOrList>,
  #[serde(rename = "if")]
  pub condition: Option<String>,
  pub mode: Option<JobMode>,
  pub timeout: Option<String>,
  pub cache: Option<UserCache>,
  pub outputs: Option<BTreeMap<String, String>>,
  pub steps: Option<Vec<UserStep>>,
}

impl UserJob {
  pub fn steps(&self) -> &[UserStep] {
    self.steps.as_deref().unwrap_or_default()
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserWorkflow {
  pub name: Option<String>,
  pub on: Option<UserTriggers>,
  pub concurrency: Option<UserConcurrency>,
  /// Declaration order is kept; it breaks ties between jobs that become
  /// ready together.
  #[serde(default, deserialize_with = "ordered_jobs")]
  pub jobs: Vec<(String, UserJob)>,
}

fn ordered_jobs<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, UserJob)>, D::Error>
where
  D: Deserializer<'de>,
{
  struct JobsVisitor;

  impl<'de> Visitor<'de> for JobsVisitor {
    type Value = Vec<(String, UserJob)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str("a mapping of job keys to jobs")
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
      Ok(vec![])
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
      A: MapAccess<'de>,
    {
      let mut jobs = Vec::new();
      while let Some((key, job)) = map.next_entry::<String, UserJob>()? {
        jobs.push((key, job));
      }
      Ok(jobs)
    }
  }

  deserializer.deserialize_any(JobsVisitor)
}

impl UserWorkflow {
  pub fn job(&self, key: &str) -> Option<&UserJob> {
    self.jobs.iter().find(|(k, _)| k == key).map(|(_, job)| job)
  }

  /// Structural checks that don't need the expression compiler. Dependency
  /// checks happen when the job graph is built.
  fn validate(workflow: &UserWorkflow) -> Result<()> {
    if workflow.jobs.is_empty() {
      return Err(Error::configuration_error(
        "Workflow must have at least one job",
      ));
    }

    for (idx, (key, job)) in workflow.jobs.iter().enumerate() {
      if workflow.jobs[..idx].iter().any(|(k, _)| k == key) {
        return Err(Error::configuration_error(format!(
          "Job `{}` is declared more than once",
          key
        )));
      }

      let is_stub = job.mode == Some(JobMode::Stub);
      if is_stub && !job.steps().is_empty() {
        return Err(Error::configuration_error(format!(
          "Stub job `{}` cannot have steps",
          key
        )));
      }

      if !is_stub && job.steps().is_empty() {
        return Err(Error::configuration_error(format!(
          "Job `{}` must have at least one step",
          key
        )));
      }

      let mut step_ids: Vec<&str> = Vec::new();
      for step_id in job.steps().iter().filter_map(UserStep::id) {
        if step_ids.contains(&step_id) {
          return Err(Error::configuration_error(format!(
            "Step id `{}` is used more than once in job `{}`",
            step_id, key
          )));
        }
        step_ids.push(step_id);
      }
    }

    Ok(())
  }
}

impl TryFrom<&str> for UserWorkflow {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> {
    let workflow = serde_yaml::from_str(value)
      .map_err(|e| Error::configuration_error(format!("Failed to parse workflow: {}", e)))?;

    Self::validate(&workflow)?;

    Ok(workflow)
  }
}

impl TryFrom<String> for UserWorkflow {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> {
    Self::try_from(value.as_str())
  }
}
