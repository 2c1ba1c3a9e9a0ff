use crate::{
  expression::render_value, ActionContext, Actions, CacheResolver, Command, Condition, Context,
  Error, ExpressionContext, Job, JobId, JobRunResult, JobSignal, Outputs, PayloadHandle,
  PluginManager, RunResult, Runner, Signal, StateEvent, Status, StatusContext, StatusReporter,
  Step, StepAction, StepLog, StepRunResult, StreamExt,
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};

/// How a step ended, before it is turned into a [`StepRunResult`].
struct StepOutcome {
  status: Status,
  exit_code: Option<i32>,
  error: Option<String>,
  outputs: Outputs,
}

impl StepOutcome {
  fn failed(error: impl Into<String>, exit_code: Option<i32>) -> Self {
    StepOutcome {
      status: Status::Failure,
      exit_code,
      error: Some(error.into()),
      outputs: Outputs::new(),
    }
  }

  fn interrupted(signal: Signal, timeout: Option<Duration>) -> Self {
    match signal {
      Signal::Cancel => StepOutcome {
        status: Status::Cancelled,
        exit_code: None,
        error: None,
        outputs: Outputs::new(),
      },
      Signal::Timeout => StepOutcome::failed(
        Error::timeout(timeout.unwrap_or_default()).to_string(),
        None,
      ),
    }
  }
}

/// Runs the steps of one job, in order, on the current task.
#[derive(Clone)]
pub struct JobExecutor {
  pub runner: Arc<dyn Runner>,
  pub actions: Actions,
  pub plugins: PluginManager,
  pub reporter: StatusReporter,
  pub cache: Option<CacheResolver>,
  pub default_timeout: Option<Duration>,
}

impl JobExecutor {
  pub async fn execute(
    &self,
    job: &Job,
    id: JobId,
    mut context: ExpressionContext,
    signal: JobSignal,
  ) -> JobRunResult {
    let started_at = chrono::Utc::now();
    let timeout = job.timeout.or(self.default_timeout);

    let cache_hit = self.restore_cache(job, &mut context).await;

    // Raises the job signal once the deadline passes
    let deadline = timeout.map(|timeout| {
      let signal = signal.clone();
      tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if signal.timeout().is_ok() {
          log::info!("Job deadline of {} passed", humantime::format_duration(timeout));
        }
      })
    });

    let mut steps = Vec::with_capacity(job.steps.len());
    let mut failed = false;
    let mut cancelled = false;
    let mut timed_out = false;

    for step in &job.steps {
      let step_id = id.step(step.number);

      let not_run = if cancelled || signal.is_cancelled() {
        cancelled = true;
        Some(Status::Cancelled)
      } else if timed_out || signal.is_timeout() {
        if !timed_out {
          // Deadline passed between two steps
          timed_out = true;
          failed = true;
        }
        Some(Status::Skipped)
      } else {
        let status = StatusContext {
          success: !failed,
          failure: failed,
          cancelled: false,
        };
        if Condition::should_run(step.condition.as_ref(), context.data(), status) {
          None
        } else {
          log::trace!("Step {} is skipped", step_id);
          Some(Status::Skipped)
        }
      };

      if let Some(status) = not_run {
        let result = StepRunResult::not_run(step_id.clone(), step.name.clone(), status);
        self.reporter.update(StateEvent::step(step_id, status));
        context.set_step(&step.context_key(), &result);
        steps.push(result);
        continue;
      }

      let started_at = chrono::Utc::now();
      self.reporter.update(StateEvent::step(step_id.clone(), Status::Running));

      let outcome = self.run_step(step, &id, &context, &signal, timeout).await;

      let result = StepRunResult {
        id: step_id.clone(),
        name: step.name.clone(),
        status: outcome.status,
        exit_code: outcome.exit_code,
        error: outcome.error,
        outputs: outcome.outputs,
        started_at: Some(started_at),
        completed_at: Some(chrono::Utc::now()),
      };

      log::info!(
        "Step {} finished with status {} in {}ms",
        step_id,
        result.status,
        (chrono::Utc::now() - started_at).num_milliseconds()
      );

      match result.status {
        Status::Cancelled => cancelled = true,
        Status::Failure => {
          if signal.is_timeout() {
            timed_out = true;
          }
          if step.continue_on_error {
            log::info!("Step {} failed but continues on error", step_id);
          } else {
            failed = true;
          }
        }
        _ => {}
      }

      self.reporter.update(StateEvent::step(step_id, result.status));
      self.plugins.on_step_completed(result.clone());
      context.set_step(&step.context_key(), &result);
      steps.push(result);
    }

    if let Some(deadline) = deadline {
      deadline.abort();
    }

    // Cancelled while the last step was still running
    let cancelled = cancelled || signal.is_cancelled();

    let status = if cancelled {
      Status::Cancelled
    } else if failed {
      Status::Failure
    } else {
      Status::Success
    };

    let outputs = if cancelled {
      Outputs::new()
    } else {
      job
        .outputs
        .iter()
        .map(|(name, template)| (name.clone(), template.render(context.data())))
        .collect()
    };

    if status == Status::Success {
      self.store_cache(job, &id, &context).await;
    }

    JobRunResult {
      id,
      status,
      outputs,
      cache_hit,
      started_at: Some(started_at),
      completed_at: Some(chrono::Utc::now()),
      steps,
    }
  }

  async fn restore_cache(&self, job: &Job, context: &mut ExpressionContext) -> Option<String> {
    let (Some(config), Some(resolver)) = (&job.cache, &self.cache) else {
      return None;
    };

    if config.from.is_empty() {
      context.set_cache(None);
      return None;
    }

    let keys: Vec<String> = config
      .from
      .iter()
      .map(|key| key.render(context.data()))
      .collect();

    let entry = match resolver.resolve(&keys).await {
      Ok(entry) => entry,
      Err(err) => {
        log::error!("Cache lookup for job {} failed: {}", job.key, err);
        None
      }
    };

    context.set_cache(entry.as_ref());
    entry.map(|entry| entry.key)
  }

  async fn store_cache(&self, job: &Job, id: &JobId, context: &ExpressionContext) {
    let (Some(config), Some(resolver)) = (&job.cache, &self.cache) else {
      return;
    };
    let Some(key) = &config.to else {
      return;
    };

    let key = key.render(context.data());
    resolver
      .store(
        &key,
        PayloadHandle::new(id.to_string()),
        resolver.write_scope(),
      )
      .await;
  }

  async fn run_step(
    &self,
    step: &Step,
    job_id: &JobId,
    context: &ExpressionContext,
    signal: &JobSignal,
    timeout: Option<Duration>,
  ) -> StepOutcome {
    let step_id = job_id.step(step.number);
    let environments: BTreeMap<String, String> = step
      .environments
      .iter()
      .map(|(name, value)| (name.clone(), value.render(context.data())))
      .collect();

    match &step.action {
      StepAction::Run(run) => {
        let ctx = Context {
          id: step_id.clone(),
          command: Command {
            name: step.name.clone(),
            run: run.render(context.data()),
            environments,
          },
          signal: signal.clone(),
        };

        let mut receiver = match self.runner.run(ctx).await {
          Ok(receiver) => receiver,
          Err(err) => {
            log::error!("Runner failed to start step {}: {}", step_id, err);
            return StepOutcome::failed(err.to_string(), Some(1));
          }
        };

        // A cancel is left to the runner through `Context::signal`; only the
        // job deadline abandons the step
        loop {
          tokio::select! {
            biased;
            _ = signal.timed_out() => {
              return StepOutcome::interrupted(Signal::Timeout, timeout);
            }
            log = receiver.next() => match log {
              Some(log) => self.plugins.on_log(StepLog {
                step_id: step_id.clone(),
                log_type: log.log_type,
                message: log.message,
                time: chrono::Utc::now(),
              }),
              None => break,
            },
          }
        }

        let outputs = receiver.outputs();
        match receiver.result() {
          Some(RunResult::Succeeded) => StepOutcome {
            status: Status::Success,
            exit_code: Some(0),
            error: None,
            outputs,
          },
          Some(RunResult::Failed { exit_code }) => StepOutcome {
            status: Status::Failure,
            exit_code: Some(exit_code),
            error: None,
            outputs,
          },
          // The runner may have stopped because of our own signal
          Some(RunResult::Cancelled) => match signal.signal() {
            Some(interrupted) => StepOutcome::interrupted(interrupted, timeout),
            None => StepOutcome {
              status: Status::Cancelled,
              exit_code: None,
              error: None,
              outputs,
            },
          },
          None => StepOutcome::failed(
            Error::internal_runtime_error("Runner stream ended without a result").to_string(),
            None,
          ),
        }
      }
      StepAction::Uses { action, with } => {
        let Some(implementation) = self.actions.get(action) else {
          return StepOutcome::failed(format!("Action `{}` is not registered", action), None);
        };

        let inputs = match render_value(with, context.data()) {
          Ok(inputs) => inputs,
          Err(err) => return StepOutcome::failed(err.to_string(), None),
        };

        let ctx = ActionContext::new(step_id.clone(), inputs).with_runtime(
          environments,
          signal.clone(),
          self.plugins.clone(),
        );

        tokio::select! {
          biased;
          _ = signal.timed_out() => StepOutcome::interrupted(Signal::Timeout, timeout),
          result = implementation.run(ctx) => match result {
            Ok(outputs) => StepOutcome {
              status: Status::Success,
              exit_code: None,
              error: None,
              outputs,
            },
            Err(err) => {
              log::error!("Action `{}` failed in step {}: {}", action, step_id, err);
              StepOutcome::failed(err.to_string(), None)
            }
          },
        }
      }
    }
  }
}
