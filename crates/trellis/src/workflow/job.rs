use super::Step;
use crate::{Condition, Template};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
  #[default]
  Normal,
  /// Placeholder job with no steps. Waits for its `needs`, then succeeds.
  Stub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
  /// Keys tried in order at job start
  pub from: Vec<Template>,
  /// Key written when the job succeeds
  pub to: Option<Template>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
  pub key: String,
  pub name: Option<String>,
  pub needs: Vec<String>,
  pub condition: Option<Condition>,
  pub mode: JobMode,
  pub timeout: Option<Duration>,
  pub cache: Option<CacheConfig>,
  /// Rendered after the last step, visible to dependents as
  /// `needs.<key>.outputs.<name>`
  pub outputs: BTreeMap<String, Template>,
  pub steps: Vec<Step>,
}

impl Job {
  pub fn stub(key: impl Into<String>) -> Self {
    Job {
      key: key.into(),
      name: None,
      needs: vec![],
      condition: None,
      mode: JobMode::Stub,
      timeout: None,
      cache: None,
      outputs: BTreeMap::new(),
      steps: vec![],
    }
  }

  pub fn is_stub(&self) -> bool {
    self.mode == JobMode::Stub
  }
}
