use crate::{
  path_filter::{compile_patterns, matches_any},
  Error, PathFilter, Result, RunId,
};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  Push,
  PullRequest,
  Schedule,
  #[serde(alias = "workflow_dispatch")]
  Manual,
}

impl EventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EventKind::Push => "push",
      EventKind::PullRequest => "pull_request",
      EventKind::Schedule => "schedule",
      EventKind::Manual => "manual",
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Run creation request; the only way into the engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TriggerRequest {
  pub id: Option<RunId>,
  /// Event kinds carried by this request. Usually one, but a scheduled tick
  /// coalesced with a push carries both and `on.priority` picks the winner.
  pub events: Vec<EventKind>,
  pub changed_files: Vec<String>,
  pub branch: String,
  /// Target branch of a pull request
  pub base_branch: Option<String>,
  /// refs/heads/main / refs/tags/v1.0.0 / refs/pull/1/merge
  pub ref_name: String,
  pub sha: String,
  pub actor: String,
}

impl TriggerRequest {
  pub fn new(event: EventKind) -> Self {
    TriggerRequest {
      events: vec![event],
      ..Default::default()
    }
  }

  pub fn id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(RunId::new(id));
    self
  }

  pub fn also(mut self, event: EventKind) -> Self {
    if !self.events.contains(&event) {
      self.events.push(event);
    }
    self
  }

  pub fn branch(mut self, branch: impl Into<String>) -> Self {
    let branch = branch.into();
    self.ref_name = format!("refs/heads/{}", branch);
    self.branch = branch;
    self
  }

  pub fn base_branch(mut self, branch: impl Into<String>) -> Self {
    self.base_branch = Some(branch.into());
    self
  }

  pub fn sha(mut self, sha: impl Into<String>) -> Self {
    self.sha = sha.into();
    self
  }

  pub fn actor(mut self, actor: impl Into<String>) -> Self {
    self.actor = actor.into();
    self
  }

  pub fn changed_files<I, S>(mut self, files: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.changed_files = files.into_iter().map(Into::into).collect();
    self
  }
}

impl Default for TriggerRequest {
  fn default() -> Self {
    TriggerRequest {
      id: None,
      events: vec![EventKind::Push],
      changed_files: vec![],
      branch: "main".to_string(),
      base_branch: None,
      ref_name: "refs/heads/main".to_string(),
      sha: String::new(),
      actor: String::new(),
    }
  }
}

/// Matching rule for one event kind.
#[derive(Debug, Clone)]
pub struct TriggerRule {
  pub kind: EventKind,
  branches: Option<Vec<Pattern>>,
  paths: PathFilter,
}

impl TriggerRule {
  pub fn new(
    kind: EventKind,
    branches: Option<Vec<String>>,
    paths: Option<Vec<String>>,
    paths_ignore: Option<Vec<String>>,
  ) -> Result<Self> {
    let branches = match branches {
      Some(branches) => Some(compile_patterns(branches)?),
      None => None,
    };

    Ok(TriggerRule {
      kind,
      branches,
      paths: PathFilter::new(paths.unwrap_or_default(), paths_ignore.unwrap_or_default())?,
    })
  }

  pub fn any(kind: EventKind) -> Self {
    TriggerRule {
      kind,
      branches: None,
      paths: PathFilter::default(),
    }
  }

  pub fn is_match(&self, request: &TriggerRequest) -> bool {
    if let Some(branches) = &self.branches {
      let branch = match self.kind {
        EventKind::PullRequest => request.base_branch.as_deref().unwrap_or(&request.branch),
        _ => &request.branch,
      };

      if !matches_any(branches, branch) {
        log::trace!("Branch {} does not match {} trigger", branch, self.kind);
        return false;
      }
    }

    self.paths.matches(&request.changed_files)
  }
}

/// Compiled `on:` section of a workflow.
#[derive(Debug, Clone)]
pub struct Triggers {
  /// `None` accepts every event kind
  rules: Option<Vec<TriggerRule>>,
  /// Only what `on.priority` declares; there is no built-in order
  priority: Vec<EventKind>,
}

impl Triggers {
  pub fn any() -> Self {
    Triggers {
      rules: None,
      priority: vec![],
    }
  }

  pub fn new(rules: Vec<TriggerRule>, priority: Option<Vec<EventKind>>) -> Result<Self> {
    let priority = priority.unwrap_or_default();
    for (idx, kind) in priority.iter().enumerate() {
      if priority[..idx].contains(kind) {
        return Err(Error::configuration_error(format!(
          "Event `{}` appears more than once in trigger priority",
          kind
        )));
      }
    }

    Ok(Triggers {
      rules: Some(rules),
      priority,
    })
  }

  pub fn priority(&self) -> &[EventKind] {
    &self.priority
  }

  /// Picks the event kind this request runs as, or `None` if no rule fires.
  /// When several carried kinds match, `on.priority` must rank all of them.
  pub fn resolve(&self, request: &TriggerRequest) -> Result<Option<EventKind>> {
    let mut matched: Vec<EventKind> = vec![];
    for kind in &request.events {
      if matched.contains(kind) {
        continue;
      }
      let fires = match &self.rules {
        None => true,
        Some(rules) => rules
          .iter()
          .any(|rule| rule.kind == *kind && rule.is_match(request)),
      };
      if fires {
        matched.push(*kind);
      }
    }

    let resolved = match matched.as_slice() {
      [] => None,
      [kind] => Some(*kind),
      _ => {
        let unranked: Vec<&str> = matched
          .iter()
          .filter(|kind| !self.priority.contains(kind))
          .map(EventKind::as_str)
          .collect();
        if !unranked.is_empty() {
          return Err(Error::configuration_error(format!(
            "Events {} all match but `on.priority` does not rank {}",
            matched
              .iter()
              .map(EventKind::as_str)
              .collect::<Vec<_>>()
              .join(", "),
            unranked.join(", ")
          )));
        }

        self
          .priority
          .iter()
          .find(|kind| matched.contains(kind))
          .copied()
      }
    };

    log::trace!(
      "Resolved trigger {:?} for events {:?}",
      resolved,
      request.events
    );

    Ok(resolved)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strings(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|v| v.to_string()).collect())
  }

  #[test]
  fn push_branch_and_paths() {
    let rule = TriggerRule::new(
      EventKind::Push,
      strings(&["main", "release/*"]),
      strings(&["src/**"]),
      None,
    )
    .unwrap();

    let request = TriggerRequest::new(EventKind::Push)
      .branch("release/v1")
      .changed_files(["src/lib.rs"]);
    assert!(rule.is_match(&request));

    let request = TriggerRequest::new(EventKind::Push)
      .branch("feature/x")
      .changed_files(["src/lib.rs"]);
    assert!(!rule.is_match(&request));

    let request = TriggerRequest::new(EventKind::Push).changed_files(["README.md"]);
    assert!(!rule.is_match(&request));
  }

  #[test]
  fn pull_request_uses_base_branch() {
    let rule = TriggerRule::new(EventKind::PullRequest, strings(&["main"]), None, None).unwrap();

    let request = TriggerRequest::new(EventKind::PullRequest)
      .branch("feature/x")
      .base_branch("main");
    assert!(rule.is_match(&request));

    let request = TriggerRequest::new(EventKind::PullRequest)
      .branch("feature/x")
      .base_branch("develop");
    assert!(!rule.is_match(&request));
  }

  #[test]
  fn paths_ignore_suppresses() {
    let triggers = Triggers::new(
      vec![TriggerRule::new(EventKind::Push, None, None, strings(&["**/*.md"])).unwrap()],
      None,
    )
    .unwrap();

    let request = TriggerRequest::new(EventKind::Push).changed_files(["README.md", "book/a.md"]);
    assert_eq!(triggers.resolve(&request).unwrap(), None);

    let request = TriggerRequest::new(EventKind::Push).changed_files(["README.md", "Cargo.toml"]);
    assert_eq!(triggers.resolve(&request).unwrap(), Some(EventKind::Push));
  }

  #[test]
  fn unconfigured_event_does_not_trigger() {
    let triggers = Triggers::new(vec![TriggerRule::any(EventKind::PullRequest)], None).unwrap();

    assert_eq!(
      triggers.resolve(&TriggerRequest::new(EventKind::Push)).unwrap(),
      None
    );
  }

  #[test]
  fn explicit_priority() {
    let rules = vec![
      TriggerRule::any(EventKind::Push),
      TriggerRule::any(EventKind::Schedule),
    ];
    let request = TriggerRequest::new(EventKind::Push).also(EventKind::Schedule);

    let schedule_first = Triggers::new(
      rules.clone(),
      Some(vec![EventKind::Schedule, EventKind::Push]),
    )
    .unwrap();
    assert_eq!(
      schedule_first.resolve(&request).unwrap(),
      Some(EventKind::Schedule)
    );
    assert_eq!(schedule_first.priority().len(), 2);

    // A single matching kind needs no ranking
    let unranked = Triggers::new(rules, None).unwrap();
    assert_eq!(
      unranked
        .resolve(&TriggerRequest::new(EventKind::Push))
        .unwrap(),
      Some(EventKind::Push)
    );
  }

  #[test]
  fn several_matches_without_priority() {
    let rules = vec![
      TriggerRule::any(EventKind::Push),
      TriggerRule::any(EventKind::Schedule),
    ];
    let request = TriggerRequest::new(EventKind::Push).also(EventKind::Schedule);

    let err = Triggers::new(rules.clone(), None)
      .unwrap()
      .resolve(&request)
      .unwrap_err();
    assert_eq!(
      err,
      Error::configuration_error(
        "Events push, schedule all match but `on.priority` does not rank push, schedule"
      )
    );

    let partial = Triggers::new(rules, Some(vec![EventKind::Schedule])).unwrap();
    assert_eq!(
      partial.resolve(&request).unwrap_err(),
      Error::configuration_error(
        "Events push, schedule all match but `on.priority` does not rank push"
      )
    );
  }

  #[test]
  fn duplicate_priority() {
    let err = Triggers::new(vec![], Some(vec![EventKind::Push, EventKind::Push])).unwrap_err();

    assert_eq!(
      err,
      Error::configuration_error("Event `push` appears more than once in trigger priority")
    );
  }

  #[test]
  fn any_trigger() {
    let triggers = Triggers::any();

    assert_eq!(
      triggers
        .resolve(&TriggerRequest::new(EventKind::Schedule))
        .unwrap(),
      Some(EventKind::Schedule)
    );
    assert!(triggers
      .resolve(&TriggerRequest::new(EventKind::Schedule).also(EventKind::Manual))
      .is_err());
  }

  #[test]
  fn manual_alias() {
    let kind: EventKind = serde_yaml::from_str("workflow_dispatch").unwrap();
    assert_eq!(kind, EventKind::Manual);
  }
}
