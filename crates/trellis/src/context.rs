use crate::{CacheEntry, EventKind, Job, JobRunResult, RunId, StepRunResult, TriggerRequest};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// JSON document `if:` conditions and `${{ }}` templates are evaluated
/// against. See [`crate::expression`] for the available paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionContext(Value);

impl ExpressionContext {
  pub fn for_run(id: &RunId, event: EventKind, request: &TriggerRequest) -> Self {
    ExpressionContext(json!({
      "run_id": id.inner(),
      "event": event.as_str(),
      "branch": request.branch,
      "base_branch": request.base_branch,
      "ref": request.ref_name,
      "sha": request.sha,
      "actor": request.actor,
      "files": request.changed_files,
    }))
  }

  /// Context of a job: the run context plus the results of its direct
  /// dependencies.
  pub fn for_job(&self, job: &Job, results: &BTreeMap<String, JobRunResult>) -> Self {
    let needs: Map<String, Value> = job
      .needs
      .iter()
      .filter_map(|key| results.get(key).map(|result| (key, result)))
      .map(|(key, result)| {
        (
          key.clone(),
          json!({
            "result": result.status.as_str(),
            "outputs": result.outputs,
          }),
        )
      })
      .collect();

    let mut context = self.clone();
    context.insert("needs", Value::Object(needs));
    context.insert("steps", Value::Object(Map::new()));
    context
  }

  pub fn set_step(&mut self, key: &str, result: &StepRunResult) {
    let step = json!({
      "outcome": result.status.as_str(),
      "outputs": result.outputs,
    });

    match self.0.get_mut("steps") {
      Some(Value::Object(steps)) => {
        steps.insert(key.to_string(), step);
      }
      _ => {
        let mut steps = Map::new();
        steps.insert(key.to_string(), step);
        self.insert("steps", Value::Object(steps));
      }
    }
  }

  pub fn set_cache(&mut self, entry: Option<&CacheEntry>) {
    let cache = match entry {
      Some(entry) => json!({ "hit": true, "key": entry.key }),
      None => json!({ "hit": false, "key": null }),
    };
    self.insert("cache", cache);
  }

  pub fn data(&self) -> &Value {
    &self.0
  }

  fn insert(&mut self, key: &str, value: Value) {
    if let Value::Object(map) = &mut self.0 {
      map.insert(key.to_string(), value);
    }
  }
}
