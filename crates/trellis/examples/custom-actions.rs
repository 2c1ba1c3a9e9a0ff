use trellis::{
  stream, Action, ActionContext, EventKind, Outputs, RunResult, Trellis, TriggerRequest, Workflow,
};

struct Runner;

#[trellis::async_trait]
impl trellis::Runner for Runner {
  async fn run(&self, ctx: trellis::Context) -> trellis::RunResponse {
    let (tx, rx) = stream();

    tx.log(ctx.command.run);
    tx.end(RunResult::Succeeded);

    Ok(rx)
  }
}

/// `uses: semver` reads a version input and splits it into parts.
struct Semver;

#[trellis::async_trait]
impl Action for Semver {
  async fn run(&self, ctx: ActionContext) -> trellis::Result<Outputs> {
    let version = ctx
      .input("version")
      .ok_or_else(|| trellis::Error::step_failure("Missing input `version`"))?;
    ctx.log(format!("Parsing {}", version));

    let mut outputs = Outputs::new();
    for (name, part) in ["major", "minor", "patch"].iter().zip(version.split('.')) {
      outputs.insert(name.to_string(), part.to_string());
    }

    Ok(outputs)
  }
}

#[tokio::main]
async fn main() -> trellis::Result<()> {
  let trellis = Trellis::builder()
    .runner(Runner)
    .action("semver", Semver)
    .build()?;

  let workflow = Workflow::builder()
    .config(
      r#"
jobs:
  release:
    steps:
      - id: version
        uses: semver
        with:
          version: 1.4.2
      - run: echo major ${{ steps.version.outputs.major }}
"#,
    )
    .build(&trellis)?;

  if let Some(run) = trellis.trigger(&workflow, TriggerRequest::new(EventKind::Manual))? {
    let result = run.run().await;
    println!("{:#?}", result.job("release"));
  }

  Ok(())
}
