use trellis::{
  stream, EventKind, MemoryCache, PluginBuilder, RunResult, StateEvent, Trellis, TriggerRequest,
  Workflow,
};

struct Runner;

#[trellis::async_trait]
impl trellis::Runner for Runner {
  async fn run(&self, ctx: trellis::Context) -> trellis::RunResponse {
    let (tx, rx) = stream();

    tokio::task::spawn(async move {
      tx.log(ctx.command.run);
      tx.end(RunResult::Succeeded);
    });

    Ok(rx)
  }
}

#[tokio::main]
async fn main() -> trellis::Result<()> {
  trellis_logger::init_logger_with_level(log::Level::Info);

  let status = PluginBuilder::new("status")
    .on_state_change(|event| {
      if let StateEvent::JobStateUpdated { id, status } = event {
        println!("{} is {}", id, status);
      }
    })
    .on_log(|log| println!("[{}] {}", log.step_id, log.message))
    .build();

  let trellis = Trellis::builder()
    .runner(Runner)
    .plugin(status)
    .cache(MemoryCache::new())
    .build()?;

  let workflow = Workflow::builder()
    .config(
      r#"
name: CI
on:
  push:
    paths-ignore:
      - "**/*.md"
jobs:
  build:
    cache:
      from:
        - target-${{ branch }}
      to: target-${{ branch }}
    steps:
      - run: cargo build --release
  test:
    needs: [build]
    steps:
      - run: cargo test
  lint:
    needs: [build]
    steps:
      - run: cargo clippy
  ci:
    mode: stub
    needs: [test, lint]
"#,
    )
    .build(&trellis)?;

  let request = TriggerRequest::new(EventKind::Push)
    .branch("main")
    .changed_files(["src/lib.rs"]);

  if let Some(run) = trellis.trigger(&workflow, request)? {
    let result = run.run().await;
    println!("Run {} finished: {}", result.id, result.status);
  }

  Ok(())
}
