use super::{CacheConfig, ConcurrencyConfig, Job, JobGraph, Step, StepAction, Workflow};
use crate::{
  expression::validate_value, Actions, Condition, Error, Result, Template, TriggerRule, Triggers,
  UserConcurrency, UserJob, UserStep, UserTriggers, UserWorkflow,
};
use std::collections::BTreeMap;

/// Compiles a [`UserWorkflow`] into a [`Workflow`]: expressions, globs and
/// durations are parsed here so that a bad workflow fails before any run
/// starts.
pub struct WorkflowParser {
  pub user_workflow: UserWorkflow,
  pub actions: Actions,
}

fn in_job(key: &str, err: Error) -> Error {
  match err {
    Error::ConfigurationError(message) => {
      Error::configuration_error(format!("Job `{}`: {}", key, message))
    }
    other => other,
  }
}

fn parse_condition(source: Option<String>) -> Result<Option<Condition>> {
  source.as_deref().map(Condition::parse).transpose()
}

fn parse_environments(
  environments: Option<BTreeMap<String, serde_yaml::Value>>,
) -> Result<BTreeMap<String, Template>> {
  let mut parsed = BTreeMap::new();

  for (name, value) in environments.unwrap_or_default() {
    let value = match value {
      serde_yaml::Value::String(s) => s,
      serde_yaml::Value::Number(n) => n.to_string(),
      serde_yaml::Value::Bool(b) => b.to_string(),
      serde_yaml::Value::Null => String::new(),
      _ => {
        return Err(Error::configuration_error(format!(
          "Environment variable `{}` must be a string, number or boolean",
          name
        )))
      }
    };

    parsed.insert(name, Template::parse(&value)?);
  }

  Ok(parsed)
}

fn parse_triggers(on: Option<UserTriggers>) -> Result<Triggers> {
  match on {
    None => Ok(Triggers::any()),
    Some(UserTriggers::Events(events)) => {
      Triggers::new(events.into_iter().map(TriggerRule::any).collect(), None)
    }
    Some(UserTriggers::Rules(rules)) => {
      let compiled = rules
        .rules()
        .into_iter()
        .map(|(kind, rule)| {
          TriggerRule::new(
            kind,
            rule.branches.clone(),
            rule.paths.clone(),
            rule.paths_ignore.clone(),
          )
        })
        .collect::<Result<Vec<_>>>()?;

      Triggers::new(compiled, rules.priority.clone())
    }
  }
}

fn parse_concurrency(concurrency: Option<UserConcurrency>) -> Result<Option<ConcurrencyConfig>> {
  let Some(concurrency) = concurrency else {
    return Ok(None);
  };

  let (group, cancel_in_progress) = match concurrency {
    UserConcurrency::Group(group) => (group, false),
    UserConcurrency::Options {
      group,
      cancel_in_progress,
    } => (group, cancel_in_progress),
  };

  Ok(Some(ConcurrencyConfig {
    group: Template::parse(&group)?,
    cancel_in_progress,
  }))
}

impl WorkflowParser {
  pub fn parse(self) -> Result<Workflow> {
    let user_workflow = self.user_workflow;

    let triggers = parse_triggers(user_workflow.on)?;
    let concurrency = parse_concurrency(user_workflow.concurrency)?;

    let mut jobs = Vec::with_capacity(user_workflow.jobs.len());
    for (key, job) in user_workflow.jobs {
      let job = Self::parse_job(&self.actions, &key, job).map_err(|err| in_job(&key, err))?;
      jobs.push(job);
    }

    let graph = JobGraph::build(&jobs)?;

    log::trace!(
      "Parsed workflow {:?} with jobs in order {:?}",
      user_workflow.name,
      graph.topological_order()
    );

    Ok(Workflow {
      name: user_workflow.name,
      triggers,
      concurrency,
      jobs,
      graph,
    })
  }

  fn parse_job(actions: &Actions, key: &str, job: UserJob) -> Result<Job> {
    let timeout = job
      .timeout
      .as_deref()
      .map(|timeout| {
        humantime::parse_duration(timeout).map_err(|err| {
          log::error!("Invalid timeout format: {}", err);
          Error::configuration_error(format!(
            "Invalid timeout `{}`. The format should look like `60m` or `1h`.",
            timeout
          ))
        })
      })
      .transpose()?;

    let cache = job
      .cache
      .map(|cache| -> Result<CacheConfig> {
        let from = cache
          .from
          .map(|from| from.into_vec())
          .unwrap_or_default()
          .iter()
          .map(|key| Template::parse(key))
          .collect::<Result<Vec<_>>>()?;
        let to = cache.to.as_deref().map(Template::parse).transpose()?;

        Ok(CacheConfig { from, to })
      })
      .transpose()?;

    let outputs = job
      .outputs
      .unwrap_or_default()
      .iter()
      .map(|(name, template)| Ok((name.clone(), Template::parse(template)?)))
      .collect::<Result<BTreeMap<_, _>>>()?;

    let steps = job
      .steps
      .unwrap_or_default()
      .into_iter()
      .enumerate()
      .map(|(number, step)| Self::parse_step(actions, number, step))
      .collect::<Result<Vec<_>>>()?;

    Ok(Job {
      key: key.to_string(),
      name: job.name,
      needs: job.needs.map(|needs| needs.into_vec()).unwrap_or_default(),
      condition: parse_condition(job.condition)?,
      mode: job.mode.unwrap_or_default(),
      timeout,
      cache,
      outputs,
      steps,
    })
  }

  fn parse_step(actions: &Actions, number: usize, step: UserStep) -> Result<Step> {
    let step = match step {
      UserStep::Command(step) => Step {
        number,
        id: step.id,
        name: step.name,
        condition: parse_condition(step.condition)?,
        action: StepAction::Run(Template::parse(&step.run)?),
        continue_on_error: step.continue_on_error.unwrap_or(false),
        environments: parse_environments(step.env)?,
      },
      UserStep::Action(step) => {
        if !actions.contains(&step.uses) {
          return Err(Error::configuration_error(format!(
            "Step {} uses unknown action `{}`",
            number, step.uses
          )));
        }

        let with = match step.with {
          Some(with) => serde_json::to_value(with).map_err(|err| {
            Error::configuration_error(format!("Invalid `with` of step {}: {}", number, err))
          })?,
          None => serde_json::Value::Null,
        };
        validate_value(&with)?;

        Step {
          number,
          id: step.id,
          name: step.name,
          condition: parse_condition(step.condition)?,
          action: StepAction::Uses {
            action: step.uses,
            with,
          },
          continue_on_error: step.continue_on_error.unwrap_or(false),
          environments: parse_environments(step.env)?,
        }
      }
    };

    Ok(step)
  }
}
