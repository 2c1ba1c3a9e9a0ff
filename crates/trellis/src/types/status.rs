use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by steps, jobs and runs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  #[default]
  Pending,
  Running,
  Success,
  Failure,
  Skipped,
  Cancelled,
}

impl Status {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      Status::Success | Status::Failure | Status::Skipped | Status::Cancelled
    )
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Status::Success)
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, Status::Failure)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Status::Pending => "pending",
      Status::Running => "running",
      Status::Success => "success",
      Status::Failure => "failure",
      Status::Skipped => "skipped",
      Status::Cancelled => "cancelled",
    }
  }

  /// Worst-case aggregation of terminal statuses:
  /// failure > cancelled > skipped (only when every entry is skipped) > success.
  ///
  /// Returns `None` while any entry is still pending or running.
  pub fn aggregate<I>(statuses: I) -> Option<Status>
  where
    I: IntoIterator<Item = Status>,
  {
    let mut has_failure = false;
    let mut has_cancelled = false;
    let mut all_skipped = true;
    let mut is_empty = true;

    for status in statuses {
      if !status.is_terminal() {
        return None;
      }

      is_empty = false;
      match status {
        Status::Failure => has_failure = true,
        Status::Cancelled => has_cancelled = true,
        _ => {}
      }

      if status != Status::Skipped {
        all_skipped = false;
      }
    }

    let status = if has_failure {
      Status::Failure
    } else if has_cancelled {
      Status::Cancelled
    } else if all_skipped && !is_empty {
      Status::Skipped
    } else {
      Status::Success
    };

    Some(status)
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
