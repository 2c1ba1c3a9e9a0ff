use parking_lot::Mutex;
use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};
use trellis::{
  async_trait, stream, Action, ActionContext, Context, EventKind, Outputs, RunResponse, RunResult,
  Runner, Status, Trellis, TriggerRequest, Workflow,
};

/// Commands containing `slow` take ten seconds unless the step is
/// interrupted; everything else finishes right away.
struct SlowRunner {
  commands: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Runner for SlowRunner {
  async fn run(&self, ctx: Context) -> RunResponse {
    let (tx, rx) = stream();
    let command = ctx.command.run;
    let signal = ctx.signal;
    self.commands.lock().push(command.clone());

    tokio::spawn(async move {
      if command.contains("slow") {
        tokio::select! {
          _ = tokio::time::sleep(Duration::from_secs(10)) => {}
          signal = signal.recv() => {
            tx.log(format!("Received {}", signal));
            tx.end(RunResult::Cancelled);
            return;
          }
        }
      }
      tx.succeeded();
    });

    Ok(rx)
  }
}

fn engine() -> (Trellis, Arc<Mutex<Vec<String>>>) {
  let commands = Arc::new(Mutex::new(vec![]));
  let trellis = Trellis::builder()
    .runner(SlowRunner {
      commands: commands.clone(),
    })
    .build()
    .unwrap();

  (trellis, commands)
}

const WORKFLOW: &str = r#"
jobs:
  build:
    steps:
      - run: slow build
      - run: package
  test:
    needs: [build]
    steps:
      - run: test
"#;

#[trellis_test::test]
async fn cancel_running_workflow() {
  let (trellis, commands) = engine();
  let workflow = Workflow::builder().config(WORKFLOW).build(&trellis).unwrap();

  let run = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap();
  let signal = run.signal();
  let reporter = run.reporter();

  let handle = tokio::spawn(run.run());

  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(reporter.snapshot().job("build"), Some(Status::Running));
  signal.cancel().unwrap();

  let result = handle.await.unwrap();

  assert_eq!(result.status, Status::Cancelled);

  let build = result.job("build").unwrap();
  assert_eq!(build.status, Status::Cancelled);
  assert_eq!(build.steps[0].status, Status::Cancelled);
  assert_eq!(build.steps[1].status, Status::Cancelled);

  let test = result.job("test").unwrap();
  assert_eq!(test.status, Status::Cancelled);
  assert_eq!(test.steps[0].status, Status::Cancelled);

  assert_eq!(commands.lock().clone(), vec!["slow build".to_string()]);
  assert_eq!(reporter.snapshot().status, Status::Cancelled);
}

/// Publishes after a delay and ignores the job signal, like a registry push.
struct Publish {
  published: Arc<AtomicBool>,
}

#[async_trait]
impl Action for Publish {
  async fn run(&self, _ctx: ActionContext) -> trellis::Result<Outputs> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    self.published.store(true, Ordering::SeqCst);

    let mut outputs = Outputs::new();
    outputs.insert("published".to_string(), "true".to_string());
    Ok(outputs)
  }
}

#[trellis_test::test]
async fn cancel_waits_for_the_running_action() {
  let published = Arc::new(AtomicBool::new(false));
  let (trellis, commands) = engine();
  trellis.register_action(
    "publish",
    Publish {
      published: published.clone(),
    },
  );

  let workflow = Workflow::builder()
    .config(
      r#"
jobs:
  release:
    steps:
      - uses: publish
      - run: announce
"#,
    )
    .build(&trellis)
    .unwrap();

  let run = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap();
  let signal = run.signal();
  let handle = tokio::spawn(run.run());

  tokio::time::sleep(Duration::from_millis(50)).await;
  signal.cancel().unwrap();
  let result = handle.await.unwrap();

  assert!(published.load(Ordering::SeqCst));
  assert_eq!(result.status, Status::Cancelled);

  let release = result.job("release").unwrap();
  assert_eq!(release.status, Status::Cancelled);
  assert_eq!(release.steps[0].status, Status::Success);
  assert_eq!(release.steps[0].outputs.get("published").unwrap(), "true");
  assert_eq!(release.steps[1].status, Status::Cancelled);
  assert!(commands.lock().is_empty());
}

#[trellis_test::test]
async fn cancel_before_start() {
  let (trellis, commands) = engine();
  let workflow = Workflow::builder().config(WORKFLOW).build(&trellis).unwrap();

  let run = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap();
  run.cancel().unwrap();

  let result = run.run().await;

  assert_eq!(result.status, Status::Cancelled);
  assert_eq!(result.jobs.len(), 2);
  assert!(result
    .jobs
    .values()
    .all(|job| job.status == Status::Cancelled));
  assert!(commands.lock().is_empty());
}

#[trellis_test::test]
async fn cancel_twice() {
  let (trellis, _) = engine();
  let workflow = Workflow::builder().config(WORKFLOW).build(&trellis).unwrap();

  let run = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap();

  run.cancel().unwrap();
  assert!(run.cancel().is_err());
}

#[trellis_test::test]
async fn job_timeout() {
  let (trellis, commands) = engine();
  let workflow = Workflow::builder()
    .config(
      r#"
jobs:
  build:
    timeout: 100ms
    steps:
      - run: slow build
      - run: package
  after:
    needs: [build]
    steps:
      - run: after
"#,
    )
    .build(&trellis)
    .unwrap();

  let result = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap()
    .run()
    .await;

  assert_eq!(result.status, Status::Failure);

  let build = result.job("build").unwrap();
  assert_eq!(build.status, Status::Failure);
  assert_eq!(build.steps[0].status, Status::Failure);
  assert_eq!(
    build.steps[0].error.as_deref(),
    Some("Timed out after 100ms")
  );
  assert_eq!(build.steps[1].status, Status::Skipped);

  assert_eq!(result.job("after").unwrap().status, Status::Skipped);
  assert_eq!(commands.lock().clone(), vec!["slow build".to_string()]);
}

#[trellis_test::test]
async fn timeout_on_continue_on_error_step() {
  let (trellis, _) = engine();
  let workflow = Workflow::builder()
    .config(
      r#"
jobs:
  build:
    timeout: 100ms
    steps:
      - continue-on-error: true
        run: slow warmup
      - run: package
"#,
    )
    .build(&trellis)
    .unwrap();

  let result = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap()
    .run()
    .await;

  let build = result.job("build").unwrap();
  assert_eq!(build.status, Status::Success);
  assert_eq!(build.steps[0].status, Status::Failure);
  assert_eq!(build.steps[1].status, Status::Skipped);
}

#[trellis_test::test]
async fn default_job_timeout() {
  let trellis = Trellis::builder()
    .runner(SlowRunner {
      commands: Arc::new(Mutex::new(vec![])),
    })
    .default_job_timeout(Duration::from_millis(100))
    .build()
    .unwrap();

  let workflow = Workflow::builder()
    .config(
      r#"
jobs:
  build:
    steps:
      - run: slow build
"#,
    )
    .build(&trellis)
    .unwrap();

  let result = trellis
    .trigger(&workflow, TriggerRequest::new(EventKind::Push))
    .unwrap()
    .unwrap()
    .run()
    .await;

  assert_eq!(result.status, Status::Failure);
  assert_eq!(
    result.job("build").unwrap().steps[0].error.as_deref(),
    Some("Timed out after 100ms")
  );
}
