use crate::{
  Condition, EventKind, ExpressionContext, JobExecutor, JobId, JobRunResult, JobSignal, RunId,
  StateEvent, Status, StatusContext, Workflow, WorkflowRunResult,
};
use std::{
  collections::{BTreeMap, HashMap, VecDeque},
  sync::Arc,
};
use tokio::sync::mpsc;

/// Everything the scheduler needs to drive one run.
pub struct RunContext {
  pub id: RunId,
  pub event: EventKind,
  pub workflow: Arc<Workflow>,
  pub context: ExpressionContext,
  /// Cancels the whole run
  pub signal: JobSignal,
  pub executor: JobExecutor,
}

/// Walks the job graph of a run. All status transitions of jobs happen on
/// this loop; executors only report back over a channel.
pub struct Scheduler {
  concurrency_limit: usize,
}

struct RunState {
  statuses: HashMap<String, Status>,
  results: BTreeMap<String, JobRunResult>,
  ready: VecDeque<String>,
  running: HashMap<String, JobSignal>,
  cancelled: bool,
}

impl Scheduler {
  pub fn new(concurrency_limit: usize) -> Self {
    Scheduler {
      concurrency_limit: concurrency_limit.max(1),
    }
  }

  pub async fn run(&self, ctx: RunContext) -> WorkflowRunResult {
    let started_at = chrono::Utc::now();
    let reporter = ctx.executor.reporter.clone();
    let (tx, mut rx) = mpsc::unbounded_channel::<JobRunResult>();

    let mut state = RunState {
      statuses: ctx
        .workflow
        .jobs
        .iter()
        .map(|job| (job.key.clone(), Status::Pending))
        .collect(),
      results: BTreeMap::new(),
      ready: VecDeque::new(),
      running: HashMap::new(),
      cancelled: false,
    };

    reporter.update(StateEvent::run(ctx.id.clone(), Status::Running));

    self.promote(&ctx, &mut state, ctx.workflow.graph.roots());

    loop {
      if !state.cancelled && ctx.signal.is_cancelled() {
        self.cancel(&ctx, &mut state);
      }

      if !state.cancelled {
        self.dispatch(&ctx, &mut state, &tx);
      }

      if state.running.is_empty() {
        break;
      }

      tokio::select! {
        Some(result) = rx.recv() => self.complete(&ctx, &mut state, result),
        _ = ctx.signal.recv(), if !state.cancelled => self.cancel(&ctx, &mut state),
        else => break,
      }
    }

    // Nothing left can become ready; only reachable through a bug in the
    // skip rule, so surface it instead of hanging.
    let stuck: Vec<String> = state
      .statuses
      .iter()
      .filter(|(_, status)| !status.is_terminal())
      .map(|(key, _)| key.clone())
      .collect();
    for key in stuck {
      log::error!("Job {} never became ready, marking it as skipped", key);
      self.settle(&ctx, &mut state, &key, Status::Skipped);
    }

    let status =
      Status::aggregate(state.statuses.values().copied()).unwrap_or(Status::Failure);

    let result = WorkflowRunResult {
      id: ctx.id.clone(),
      event: ctx.event,
      status,
      started_at: Some(started_at),
      completed_at: Some(chrono::Utc::now()),
      jobs: state.results,
    };

    log::info!(
      "Run {} finished with status {} in {}ms",
      ctx.id,
      status,
      (chrono::Utc::now() - started_at).num_milliseconds()
    );

    reporter.finish(result.clone());

    result
  }

  /// Evaluates each candidate whose dependencies are all terminal, moving it
  /// to the ready queue or to `skipped`. A skip settles a job, so its own
  /// dependents become candidates in turn.
  fn promote<'a>(&self, ctx: &'a RunContext, state: &mut RunState, candidates: Vec<&'a str>) {
    let mut candidates: VecDeque<&str> = candidates.into();

    while let Some(key) = candidates.pop_front() {
      if self.evaluate(ctx, state, key) == Some(Status::Skipped) {
        candidates.extend(ctx.workflow.graph.dependents(key));
      }
    }
  }

  fn evaluate(&self, ctx: &RunContext, state: &mut RunState, key: &str) -> Option<Status> {
    let job = ctx.workflow.job(key)?;
    if state.statuses.get(key) != Some(&Status::Pending) || state.ready.iter().any(|k| k == key) {
      return None;
    }

    let needs: Vec<Status> = ctx
      .workflow
      .graph
      .dependencies(key)
      .into_iter()
      .map(|need| state.statuses.get(need).copied().unwrap_or(Status::Pending))
      .collect();
    if !needs.iter().all(Status::is_terminal) {
      return None;
    }

    let status = StatusContext {
      success: needs.iter().all(Status::is_success),
      failure: needs.iter().any(Status::is_failure),
      cancelled: needs.iter().any(|s| *s == Status::Cancelled),
    };
    let context = ctx.context.for_job(job, &state.results);

    if job.is_stub() || Condition::should_run(job.condition.as_ref(), context.data(), status) {
      log::trace!("Job {} is ready", key);
      state.ready.push_back(key.to_string());
      Some(Status::Pending)
    } else {
      log::trace!("Job {} is skipped", key);
      self.settle(ctx, state, key, Status::Skipped);
      Some(Status::Skipped)
    }
  }

  fn dispatch(
    &self,
    ctx: &RunContext,
    state: &mut RunState,
    tx: &mpsc::UnboundedSender<JobRunResult>,
  ) {
    while state.running.len() < self.concurrency_limit {
      let Some(key) = state.ready.pop_front() else {
        break;
      };
      let Some(job) = ctx.workflow.job(&key).cloned() else {
        continue;
      };

      let id = JobId::new(ctx.id.inner(), &key);
      let signal = JobSignal::new();

      state.statuses.insert(key.clone(), Status::Running);
      state.running.insert(key.clone(), signal.clone());
      ctx
        .executor
        .reporter
        .update(StateEvent::job(id.clone(), Status::Running));

      if job.is_stub() {
        let now = chrono::Utc::now();
        let _ = tx.send(JobRunResult {
          started_at: Some(now),
          completed_at: Some(now),
          ..JobRunResult::not_run(id, Status::Success)
        });
        continue;
      }

      log::info!("Dispatching job {}", id);

      let executor = ctx.executor.clone();
      let context = ctx.context.for_job(&job, &state.results);
      let tx = tx.clone();
      tokio::spawn(async move {
        let result = executor.execute(&job, id, context, signal).await;
        let _ = tx.send(result);
      });
    }
  }

  fn complete(&self, ctx: &RunContext, state: &mut RunState, mut result: JobRunResult) {
    let key = result.id.job_key().to_string();
    state.running.remove(&key);

    log::info!("Job {} finished with status {}", result.id, result.status);

    if state.statuses.get(&key) == Some(&Status::Cancelled) {
      // Already reported when the run was cancelled
      result.status = Status::Cancelled;
      state.results.insert(key.clone(), result.clone());
    } else {
      state.statuses.insert(key.clone(), result.status);
      state.results.insert(key.clone(), result.clone());
      ctx
        .executor
        .reporter
        .update(StateEvent::job(result.id.clone(), result.status));
    }

    ctx.executor.plugins.on_job_completed(result);

    if !state.cancelled {
      self.promote(ctx, state, ctx.workflow.graph.dependents(&key));
    }
  }

  /// Stops dispatching. Waiting jobs are cancelled right away; running jobs
  /// are marked cancelled and their executors signalled.
  fn cancel(&self, ctx: &RunContext, state: &mut RunState) {
    log::info!("Cancelling run {}", ctx.id);
    state.cancelled = true;

    let waiting: Vec<String> = ctx
      .workflow
      .jobs
      .iter()
      .map(|job| job.key.clone())
      .filter(|key| state.statuses.get(key) == Some(&Status::Pending))
      .collect();
    for key in waiting {
      self.settle(ctx, state, &key, Status::Cancelled);
    }
    state.ready.clear();

    let running: Vec<(String, JobSignal)> = state
      .running
      .iter()
      .map(|(key, signal)| (key.clone(), signal.clone()))
      .collect();
    for (key, signal) in running {
      state.statuses.insert(key.clone(), Status::Cancelled);
      ctx.executor.reporter.update(StateEvent::job(
        JobId::new(ctx.id.inner(), &key),
        Status::Cancelled,
      ));
      if let Err(err) = signal.cancel() {
        log::trace!("Job {} already signalled: {}", key, err);
      }
    }
  }

  /// Records a job that never ran.
  fn settle(&self, ctx: &RunContext, state: &mut RunState, key: &str, status: Status) {
    let id = JobId::new(ctx.id.inner(), key);
    let mut result = JobRunResult::not_run(id.clone(), status);

    if let Some(job) = ctx.workflow.job(key) {
      result.steps = job
        .steps
        .iter()
        .map(|step| {
          crate::StepRunResult::not_run(id.step(step.number), step.name.clone(), status)
        })
        .collect();
      for step in &result.steps {
        ctx
          .executor
          .reporter
          .update(StateEvent::step(step.id.clone(), status));
      }
    }

    state.statuses.insert(key.to_string(), status);
    state.results.insert(key.to_string(), result.clone());
    ctx.executor.reporter.update(StateEvent::job(id, status));
    ctx.executor.plugins.on_job_completed(result);
  }
}
