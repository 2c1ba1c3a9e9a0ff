mod error;
mod id;
mod results;
mod state_event;
mod status;
mod trigger;

pub use error::*;
pub use id::*;
pub use results::*;
pub use state_event::*;
pub use status::*;
pub use trigger::*;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
  Error,
  Log,
}

impl LogType {
  pub fn as_str(&self) -> &'static str {
    match self {
      LogType::Error => "error",
      LogType::Log => "log",
    }
  }
}

/// One line of step output forwarded to plugins.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StepLog {
  pub step_id: StepId,
  pub log_type: LogType,
  pub message: String,
  pub time: chrono::DateTime<chrono::Utc>,
}

impl Default for StepLog {
  fn default() -> Self {
    StepLog {
      step_id: StepId::default(),
      log_type: LogType::Log,
      message: String::new(),
      time: chrono::Utc::now(),
    }
  }
}
