use crate::{stream::StreamReceiver, JobSignal, LogType, StepId};
use std::collections::BTreeMap;
pub use tokio_stream::{Stream, StreamExt};

#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
  Succeeded,
  Failed { exit_code: i32 },
  Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Log {
  pub log_type: LogType,
  pub message: String,
}

impl Log {
  pub fn log(message: impl Into<String>) -> Self {
    Self {
      log_type: LogType::Log,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      log_type: LogType::Error,
      message: message.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    self.log_type == LogType::Error
  }
}

/// A rendered `run:` step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
  pub name: Option<String>,
  pub run: String,
  pub environments: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Context {
  pub id: StepId,
  pub command: Command,
  /// Raised when the run is cancelled or the job deadline passes.
  pub signal: JobSignal,
}

pub type RunResponse = crate::Result<StreamReceiver>;

/// # Runner
/// Executes the `run:` steps of a workflow. `run` should hand back a
/// [`StreamReceiver`] quickly and do the actual work elsewhere (a spawned
/// task or thread), pushing logs and step outputs through the matching
/// [`StreamSender`](crate::StreamSender) and finishing with a [`RunResult`].
///
/// A runner that watches `ctx.signal` can stop early; one that doesn't is
/// abandoned when the signal fires and its step is recorded as cancelled or
/// timed out.
///
/// ## Example
///
/// ```rust
/// struct Shell;
///
/// #[trellis::async_trait]
/// impl trellis::Runner for Shell {
///   async fn run(&self, ctx: trellis::Context) -> trellis::RunResponse {
///     let (tx, rx) = trellis::stream();
///
///     tokio::task::spawn(async move {
///       tx.log(ctx.command.run);
///       tx.succeeded();
///     });
///
///     Ok(rx)
///   }
/// }
/// ```
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
  async fn run(&self, ctx: Context) -> RunResponse;
}
